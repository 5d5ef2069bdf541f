//! Configuration types for FB2 image compression.
//!
//! All compression behaviour is controlled through [`CompressionConfig`],
//! built via its [`CompressionConfigBuilder`]. The two image knobs are fixed
//! constants on the command line, but the library exposes them so callers
//! and tests can vary them.

use crate::error::Fb2CompressError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Cap on the longer image side, in pixels.
pub const DEFAULT_MAX_SIZE: u32 = 800;

/// JPEG quality factor used for opaque images.
pub const DEFAULT_QUALITY: u8 = 85;

/// Prefix prepended to the input file name to form the output file name.
pub const OUTPUT_PREFIX: &str = "compress_";

/// Configuration for one compression run.
///
/// Built via [`CompressionConfig::builder()`] or using
/// [`CompressionConfig::default()`].
///
/// # Example
/// ```rust
/// use fb2_compress::CompressionConfig;
///
/// let config = CompressionConfig::builder()
///     .max_size(1024)
///     .quality(80)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_size, 1024);
/// ```
#[derive(Clone)]
pub struct CompressionConfig {
    /// Maximum length of the longer image side in pixels. Default: 800.
    ///
    /// Images whose longer side exceeds this are scaled down proportionally;
    /// smaller images keep their dimensions.
    pub max_size: u32,

    /// JPEG quality (1–100) for images without transparency. Default: 85.
    pub quality: u8,

    /// Reporter receiving one event per decision, in document order.
    /// `None` keeps the run silent apart from `tracing` logs.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            quality: DEFAULT_QUALITY,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionConfig")
            .field("max_size", &self.max_size)
            .field("quality", &self.quality)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn CompressionProgressCallback>"),
            )
            .finish()
    }
}

impl CompressionConfig {
    /// Create a new builder for `CompressionConfig`.
    pub fn builder() -> CompressionConfigBuilder {
        CompressionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CompressionConfig`].
#[derive(Debug)]
pub struct CompressionConfigBuilder {
    config: CompressionConfig,
}

impl CompressionConfigBuilder {
    pub fn max_size(mut self, px: u32) -> Self {
        self.config.max_size = px;
        self
    }

    pub fn quality(mut self, quality: u8) -> Self {
        self.config.quality = quality;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CompressionConfig, Fb2CompressError> {
        let c = &self.config;
        if c.max_size == 0 {
            return Err(Fb2CompressError::InvalidConfig(
                "max_size must be ≥ 1 pixel".into(),
            ));
        }
        if !(1..=100).contains(&c.quality) {
            return Err(Fb2CompressError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.quality
            )));
        }
        Ok(self.config)
    }
}
