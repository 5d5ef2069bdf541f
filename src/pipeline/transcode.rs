//! Image transcoding: raw image bytes → smaller re-encoded bytes.
//!
//! Per image, in order:
//!
//! 1. decode and detect transparency (alpha channel, or a palette with a
//!    transparent entry);
//! 2. scale down with Lanczos3 if the longer side exceeds `max_size`;
//! 3. transparent images become a 256-colour indexed PNG, everything else a
//!    JPEG at the configured quality.
//!
//! Once transparency is detected the image is always emitted as a quantised
//! PNG, even when a lossless PNG would be small: JPEG cannot carry alpha and
//! the palette reduction is where most of the saving comes from.

use crate::error::TranscodeError;
use crate::pipeline::quantize;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Palette size of the quantised PNG output.
pub const PALETTE_SIZE: usize = 256;

/// Codec chosen for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputCodec {
    /// Palette-quantised PNG, for images with transparency.
    QuantizedPng,
    /// Baseline JPEG, for opaque images.
    Jpeg,
}

impl OutputCodec {
    pub fn for_transparency(transparent: bool) -> Self {
        if transparent {
            OutputCodec::QuantizedPng
        } else {
            OutputCodec::Jpeg
        }
    }

    /// MIME type written to the node's `content-type`.
    pub fn content_type(self) -> &'static str {
        match self {
            OutputCodec::QuantizedPng => "image/png",
            OutputCodec::Jpeg => "image/jpeg",
        }
    }
}

/// A re-encoded image and the decisions that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoded {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub original_dimensions: (u32, u32),
    pub dimensions: (u32, u32),
    pub transparent: bool,
}

/// Decode, resize and re-encode one image.
///
/// # Arguments
/// * `bytes`    — encoded PNG, JPEG or GIF data
/// * `max_size` — cap on the longer side in pixels
/// * `quality`  — JPEG quality, clamped to 1–100
///
/// # Errors
/// [`TranscodeError::Decode`] if the bytes are not a readable image,
/// [`TranscodeError::Encode`] if the output encoder fails.
pub fn transcode(bytes: &[u8], max_size: u32, quality: u8) -> Result<Transcoded, TranscodeError> {
    let format =
        image::guess_format(bytes).map_err(|e| TranscodeError::Decode(e.to_string()))?;
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| TranscodeError::Decode(e.to_string()))?;

    let original_dimensions = img.dimensions();
    let transparent = has_transparency(bytes, &img, format);
    debug!(
        "Decoded {:?} {}x{} ({:?}, transparent={})",
        format,
        original_dimensions.0,
        original_dimensions.1,
        img.color(),
        transparent
    );

    let (width, height) = target_dimensions(original_dimensions.0, original_dimensions.1, max_size);
    let img = if (width, height) != original_dimensions {
        debug!(
            "Resizing {}x{} → {}x{}",
            original_dimensions.0, original_dimensions.1, width, height
        );
        img.resize_exact(width, height, FilterType::Lanczos3)
    } else {
        img
    };

    let codec = OutputCodec::for_transparency(transparent);
    let encoded = match codec {
        OutputCodec::QuantizedPng => encode_quantized_png(&img.to_rgba8())?,
        OutputCodec::Jpeg => encode_jpeg(&img, quality)?,
    };
    debug!(
        "Encoded {} → {} bytes ({} before)",
        codec.content_type(),
        encoded.len(),
        bytes.len()
    );

    Ok(Transcoded {
        bytes: encoded,
        content_type: codec.content_type(),
        original_dimensions,
        dimensions: (width, height),
        transparent,
    })
}

/// Dimensions after capping the longer side at `max_size`.
///
/// Both sides are scaled by `max_size / longest` and truncated, keeping the
/// aspect ratio; a side never drops below one pixel. Images that already
/// fit are returned unchanged.
pub fn target_dimensions(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_size {
        return (width, height);
    }
    let ratio = f64::from(max_size) / f64::from(longest);
    let scale = |side: u32| ((f64::from(side) * ratio) as u32).max(1);
    (scale(width), scale(height))
}

/// Whether the image needs an alpha-capable output format.
///
/// Decided from what the file declares rather than from the decoded pixels,
/// because `image` expands every kind of transparency to RGBA:
///
/// * PNG: an alpha colour type, or a palette with a `tRNS` chunk. A colour-key
///   `tRNS` on a grey or RGB image does not count.
/// * GIF: the first frame names a transparent palette index, whether or not
///   any pixel uses it.
/// * anything else: the decoded colour type carries alpha.
pub fn has_transparency(bytes: &[u8], img: &DynamicImage, format: ImageFormat) -> bool {
    let declared = match format {
        ImageFormat::Png => png_declares_alpha(bytes),
        ImageFormat::Gif => gif_declares_transparency(bytes),
        _ => None,
    };
    declared.unwrap_or_else(|| img.color().has_alpha())
}

fn png_declares_alpha(bytes: &[u8]) -> Option<bool> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    let info = reader.info();
    Some(match info.color_type {
        png::ColorType::Rgba | png::ColorType::GrayscaleAlpha => true,
        png::ColorType::Indexed => info.trns.is_some(),
        png::ColorType::Rgb | png::ColorType::Grayscale => false,
    })
}

fn gif_declares_transparency(bytes: &[u8]) -> Option<bool> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(bytes).ok()?;
    let frame = decoder.read_next_frame().ok()??;
    Some(frame.transparent.is_some())
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, TranscodeError> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| TranscodeError::Encode(e.to_string()))?;
    Ok(buf)
}

fn encode_quantized_png(rgba: &RgbaImage) -> Result<Vec<u8>, TranscodeError> {
    let q = quantize::quantize_rgba(rgba, PALETTE_SIZE);
    debug!("Quantised to {} colours", q.palette.len());

    let palette: Vec<u8> = q.palette.iter().flat_map(|c| [c[0], c[1], c[2]]).collect();

    let encode_err = |e: png::EncodingError| TranscodeError::Encode(e.to_string());
    let mut buf = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buf, rgba.width(), rgba.height());
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(palette);
        if let Some(trns) = q.alpha_table() {
            encoder.set_trns(trns);
        }
        encoder.set_compression(png::Compression::Best);
        // Indexed data rarely benefits from prediction filters.
        encoder.set_filter(png::FilterType::NoFilter);

        let mut writer = encoder.write_header().map_err(encode_err)?;
        writer.write_image_data(&q.indices).map_err(encode_err)?;
        writer.finish().map_err(encode_err)?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayAlphaImage, GrayImage, Luma, LumaA, Rgb, RgbImage, Rgba};
    use std::borrow::Cow;

    fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format)
            .expect("fixture encodes");
        buf
    }

    fn photo(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        }))
    }

    fn sticker(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            let inside = (x as i64 - w as i64 / 2).pow(2) + (y as i64 - h as i64 / 2).pow(2)
                < (w as i64 / 3).pow(2);
            if inside {
                Rgba([(x % 256) as u8, 80, (y % 256) as u8, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }))
    }

    /// PNG written directly with the `png` crate, for colour types and
    /// `tRNS` layouts `image` cannot produce.
    fn raw_png(
        w: u32,
        h: u32,
        color: png::ColorType,
        palette: Option<Vec<u8>>,
        trns: Option<Vec<u8>>,
        data: &[u8],
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buf, w, h);
            encoder.set_color(color);
            encoder.set_depth(png::BitDepth::Eight);
            if let Some(palette) = palette {
                encoder.set_palette(palette);
            }
            if let Some(trns) = trns {
                encoder.set_trns(trns);
            }
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(data).unwrap();
        }
        buf
    }

    /// Two-colour GIF whose frame names index 1 transparent but never uses it.
    fn gif_with_unused_transparent_index() -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut buf, 8, 8, &[200, 30, 30, 0, 0, 0]).unwrap();
            let mut frame = gif::Frame::default();
            frame.width = 8;
            frame.height = 8;
            frame.transparent = Some(1);
            frame.buffer = Cow::Owned(vec![0; 64]);
            encoder.write_frame(&frame).unwrap();
        }
        buf
    }

    #[test]
    fn target_dimensions_cases() {
        assert_eq!(target_dimensions(1600, 1200, 800), (800, 600));
        assert_eq!(target_dimensions(1200, 1600, 800), (600, 800));
        assert_eq!(target_dimensions(500, 500, 800), (500, 500));
        assert_eq!(target_dimensions(800, 10, 800), (800, 10));
        assert_eq!(target_dimensions(1000, 3, 800), (800, 2));
        assert_eq!(target_dimensions(10_000, 1, 800), (800, 1));
    }

    #[test]
    fn target_dimensions_never_exceed_cap() {
        for (w, h) in [(801, 1), (1023, 767), (4097, 3001), (999, 999)] {
            let (tw, th) = target_dimensions(w, h, 800);
            assert!(tw.max(th) <= 800, "{w}x{h} → {tw}x{th}");
            assert!(tw >= 1 && th >= 1);
        }
    }

    #[test]
    fn opaque_jpeg_is_resized_and_stays_jpeg() {
        let input = encode(photo(1600, 1200), ImageFormat::Jpeg);
        let out = transcode(&input, 800, 85).unwrap();

        assert_eq!(out.content_type, "image/jpeg");
        assert!(!out.transparent);
        assert_eq!(out.original_dimensions, (1600, 1200));
        assert_eq!(out.dimensions, (800, 600));

        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (800, 600));
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn opaque_png_becomes_jpeg() {
        let input = encode(photo(120, 90), ImageFormat::Png);
        let out = transcode(&input, 800, 85).unwrap();
        assert_eq!(out.content_type, "image/jpeg");
        assert_eq!(out.dimensions, (120, 90));
    }

    #[test]
    fn grayscale_becomes_rgb_jpeg() {
        let gray = DynamicImage::ImageLuma8(GrayImage::from_fn(64, 32, |x, _| Luma([(x * 4) as u8])));
        let out = transcode(&encode(gray, ImageFormat::Png), 800, 85).unwrap();
        assert_eq!(out.content_type, "image/jpeg");
        assert_eq!(image::load_from_memory(&out.bytes).unwrap().dimensions(), (64, 32));
    }

    #[test]
    fn transparent_png_becomes_indexed_png() {
        let input = encode(sticker(500, 500), ImageFormat::Png);
        let out = transcode(&input, 800, 85).unwrap();

        assert_eq!(out.content_type, "image/png");
        assert!(out.transparent);
        assert_eq!(out.dimensions, (500, 500));

        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (500, 500));
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.to_rgba8().get_pixel(0, 0).0[3], 0);
        assert_eq!(decoded.to_rgba8().get_pixel(250, 250).0[3], 255);
    }

    #[test]
    fn transparent_png_is_resized() {
        let input = encode(sticker(1000, 400), ImageFormat::Png);
        let out = transcode(&input, 800, 85).unwrap();
        assert_eq!(out.content_type, "image/png");
        assert_eq!(out.dimensions, (800, 320));
        assert_eq!(image::load_from_memory(&out.bytes).unwrap().dimensions(), (800, 320));
    }

    #[test]
    fn gif_transparency_follows_transparent_index() {
        let opaque = DynamicImage::ImageRgba8(RgbaImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                Rgba([200, 10, 10, 255])
            } else {
                Rgba([10, 10, 200, 255])
            }
        }));
        let out = transcode(&encode(opaque, ImageFormat::Gif), 800, 85).unwrap();
        assert_eq!(out.content_type, "image/jpeg");

        let holed = DynamicImage::ImageRgba8(RgbaImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                Rgba([200, 10, 10, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }));
        let out = transcode(&encode(holed, ImageFormat::Gif), 800, 85).unwrap();
        assert_eq!(out.content_type, "image/png");
    }

    #[test]
    fn gif_declared_transparency_counts_without_transparent_pixels() {
        let out = transcode(&gif_with_unused_transparent_index(), 800, 85).unwrap();
        assert!(out.transparent);
        assert_eq!(out.content_type, "image/png");
    }

    #[test]
    fn small_transparent_region_survives_many_colours() {
        let mut img = RgbaImage::from_fn(256, 256, |x, y| {
            Rgba([x as u8, y as u8, ((x * y) % 256) as u8, 255])
        });
        for y in 0..3 {
            for x in 0..3 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 0]));
            }
        }
        let input = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);

        let out = transcode(&input, 800, 85).unwrap();

        assert_eq!(out.content_type, "image/png");
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert!(decoded.color().has_alpha());
        let rgba = decoded.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0).0[3], 0);
        assert_eq!(rgba.get_pixel(2, 2).0[3], 0);
        assert_eq!(rgba.get_pixel(128, 128).0[3], 255);
    }

    #[test]
    fn indexed_png_with_trns_becomes_png() {
        let palette = vec![220, 20, 20, 20, 20, 220, 0, 0, 0];
        let indices: Vec<u8> = (0..16 * 16).map(|i| (i % 3) as u8).collect();
        let input = raw_png(
            16,
            16,
            png::ColorType::Indexed,
            Some(palette),
            Some(vec![255, 255, 0]),
            &indices,
        );

        let out = transcode(&input, 800, 85).unwrap();

        assert!(out.transparent);
        assert_eq!(out.content_type, "image/png");
        let decoded = image::load_from_memory(&out.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(2, 0).0[3], 0);
        assert_eq!(decoded.get_pixel(0, 0).0[3], 255);
    }

    #[test]
    fn indexed_png_without_trns_becomes_jpeg() {
        let indices: Vec<u8> = (0..16 * 16).map(|i| (i % 2) as u8).collect();
        let input = raw_png(
            16,
            16,
            png::ColorType::Indexed,
            Some(vec![220, 20, 20, 20, 20, 220]),
            None,
            &indices,
        );
        let out = transcode(&input, 800, 85).unwrap();
        assert_eq!(out.content_type, "image/jpeg");
    }

    #[test]
    fn grey_alpha_png_becomes_png() {
        let img = GrayAlphaImage::from_fn(32, 32, |x, y| {
            LumaA([(x * 8) as u8, if y < 8 { 0 } else { 255 }])
        });
        let input = encode(DynamicImage::ImageLumaA8(img), ImageFormat::Png);

        let out = transcode(&input, 800, 85).unwrap();

        assert_eq!(out.content_type, "image/png");
        let decoded = image::load_from_memory(&out.bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(5, 2).0[3], 0);
        assert_eq!(decoded.get_pixel(5, 20).0[3], 255);
    }

    #[test]
    fn rgb_png_with_colour_key_stays_jpeg() {
        let data: Vec<u8> = (0..16 * 16)
            .flat_map(|i| if i % 2 == 0 { [0, 0, 0] } else { [240, 200, 10] })
            .collect();
        // Colour key: black, as three 16-bit samples.
        let input = raw_png(16, 16, png::ColorType::Rgb, None, Some(vec![0; 6]), &data);

        let out = transcode(&input, 800, 85).unwrap();

        assert!(!out.transparent);
        assert_eq!(out.content_type, "image/jpeg");
    }

    #[test]
    fn lower_quality_means_fewer_bytes() {
        let input = encode(photo(300, 200), ImageFormat::Png);
        let low = transcode(&input, 800, 10).unwrap();
        let high = transcode(&input, 800, 95).unwrap();
        assert!(low.bytes.len() < high.bytes.len());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = transcode(b"definitely not an image", 800, 85).unwrap_err();
        assert!(matches!(err, TranscodeError::Decode(_)));

        // Valid PNG signature, truncated body.
        let mut truncated = encode(photo(10, 10), ImageFormat::Png);
        truncated.truncate(20);
        assert!(matches!(
            transcode(&truncated, 800, 85).unwrap_err(),
            TranscodeError::Decode(_)
        ));
    }
}
