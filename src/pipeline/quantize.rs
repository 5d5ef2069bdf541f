//! Palette reduction of RGBA images for indexed PNG output.
//!
//! Images that already use at most `max_colors` distinct colours keep them
//! exactly. Anything richer goes through NeuQuant (`color_quant`), the same
//! quantiser `image` uses for GIF frames, which learns a palette over all four
//! channels.
//!
//! Fully transparent pixels never take part in the learning: they all share a
//! reserved palette entry `[0, 0, 0, 0]`. Otherwise a small cut-out or rounded
//! corner could lose its transparency to a nearby opaque colour.

use color_quant::NeuQuant;
use image::RgbaImage;
use std::collections::HashMap;
use tracing::debug;

/// NeuQuant sampling factor: 1 looks at every pixel, 30 at every 30th.
const SAMPLE_FACTOR: i32 = 10;

const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];

/// An image reduced to a palette plus one palette index per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantized {
    /// RGBA palette entries, at most the requested number of colours.
    pub palette: Vec<[u8; 4]>,
    /// Row-major palette indices, one per pixel.
    pub indices: Vec<u8>,
}

impl Quantized {
    /// Alpha of each palette entry, cut after the last non-opaque one
    /// (the shape of a PNG `tRNS` chunk). `None` when every entry is opaque.
    pub fn alpha_table(&self) -> Option<Vec<u8>> {
        let last = self.palette.iter().rposition(|c| c[3] < u8::MAX)?;
        Some(self.palette[..=last].iter().map(|c| c[3]).collect())
    }
}

/// Quantise `img` to at most `max_colors` colours (clamped to 16..=256).
pub fn quantize_rgba(img: &RgbaImage, max_colors: usize) -> Quantized {
    let max_colors = max_colors.clamp(16, 256);

    if let Some(exact) = exact_palette(img, max_colors) {
        debug!("Kept {} exact colours", exact.palette.len());
        return exact;
    }

    let has_clear = img.pixels().any(|p| p.0[3] == 0);
    let reserved = usize::from(has_clear);

    let visible: Vec<u8> = img
        .pixels()
        .filter(|p| p.0[3] > 0)
        .flat_map(|p| p.0)
        .collect();
    let translucent = visible.chunks_exact(4).any(|c| c[3] < u8::MAX);
    let nq = NeuQuant::new(SAMPLE_FACTOR, max_colors - reserved, &visible);

    let mut palette = Vec::with_capacity(max_colors);
    if has_clear {
        palette.push(TRANSPARENT);
    }
    // Untrained neurons keep their initial alpha; without translucent input
    // every learned colour is opaque.
    palette.extend(nq.color_map_rgba().chunks_exact(4).map(|c| {
        let alpha = if translucent { c[3] } else { u8::MAX };
        [c[0], c[1], c[2], alpha]
    }));

    let mut cache: HashMap<[u8; 4], u8> = HashMap::new();
    let indices = img
        .pixels()
        .map(|p| {
            if p.0[3] == 0 {
                return 0;
            }
            *cache
                .entry(p.0)
                .or_insert_with(|| (nq.index_of(&p.0) + reserved) as u8)
        })
        .collect();

    debug!(
        "NeuQuant palette of {} colours ({} reserved transparent)",
        palette.len(),
        reserved
    );
    Quantized { palette, indices }
}

/// The image's own colours, if there are few enough.
///
/// Every fully transparent pixel counts as `[0, 0, 0, 0]`, whatever its
/// colour channels hold.
fn exact_palette(img: &RgbaImage, max_colors: usize) -> Option<Quantized> {
    let mut lookup: HashMap<[u8; 4], u8> = HashMap::new();
    let mut palette = Vec::new();
    let mut indices = Vec::with_capacity(img.pixels().len());

    for p in img.pixels() {
        let color = if p.0[3] == 0 { TRANSPARENT } else { p.0 };
        let idx = match lookup.get(&color) {
            Some(&idx) => idx,
            None => {
                if palette.len() == max_colors {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push(color);
                lookup.insert(color, idx);
                idx
            }
        };
        indices.push(idx);
    }

    Some(Quantized { palette, indices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn rainbow(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([
                (x * 255 / w.max(1)) as u8,
                (y * 255 / h.max(1)) as u8,
                ((x + y) % 256) as u8,
                255,
            ])
        })
    }

    #[test]
    fn few_colours_are_kept_exactly() {
        let red = Rgba([255, 0, 0, 255]);
        let clear = Rgba([0, 0, 0, 0]);
        let img = RgbaImage::from_fn(4, 2, |x, _| if x < 2 { red } else { clear });
        let q = quantize_rgba(&img, 256);

        assert_eq!(q.palette.len(), 2);
        for (px, &idx) in img.pixels().zip(&q.indices) {
            assert_eq!(q.palette[idx as usize], px.0);
        }
    }

    #[test]
    fn invisible_colours_collapse_to_one_entry() {
        let img = RgbaImage::from_fn(8, 1, |x, _| Rgba([x as u8 * 30, 10, 20, 0]));
        let q = quantize_rgba(&img, 256);
        assert_eq!(q.palette, vec![TRANSPARENT]);
        assert_eq!(q.alpha_table(), Some(vec![0]));
    }

    #[test]
    fn many_colours_fit_the_palette() {
        let img = rainbow(300, 200);
        let q = quantize_rgba(&img, 256);

        assert!(q.palette.len() <= 256);
        assert_eq!(q.indices.len(), 300 * 200);
        assert!(q.indices.iter().all(|&i| (i as usize) < q.palette.len()));
    }

    #[test]
    fn small_transparent_region_keeps_its_alpha() {
        let mut img = rainbow(256, 256);
        for y in 0..3 {
            for x in 0..3 {
                img.put_pixel(x, y, Rgba([200, 100, 50, 0]));
            }
        }
        let q = quantize_rgba(&img, 256);

        assert!(q.palette.len() <= 256);
        assert_eq!(q.palette[q.indices[0] as usize][3], 0);
        assert_eq!(q.palette[q.indices[2 * 256 + 2] as usize][3], 0);
        assert_eq!(q.palette[q.indices[256 * 128 + 128] as usize][3], 255);
        assert_eq!(q.alpha_table().map(|t| t[0]), Some(0));
    }

    #[test]
    fn opaque_palette_has_no_alpha_table() {
        let q = quantize_rgba(&rainbow(64, 64), 256);
        assert!(q.palette.iter().all(|c| c[3] == 255));
        assert_eq!(q.alpha_table(), None);
    }

    #[test]
    fn max_colours_is_respected() {
        let q = quantize_rgba(&rainbow(128, 128), 16);
        assert!(q.palette.len() <= 16);
        assert!(q.indices.iter().all(|&i| i < 16));
    }

    #[test]
    fn deterministic() {
        let img = rainbow(97, 61);
        assert_eq!(quantize_rgba(&img, 256), quantize_rgba(&img, 256));
    }
}
