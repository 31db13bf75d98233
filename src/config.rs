//! Configuration types for document consolidation.
//!
//! All consolidation behaviour is controlled through [`ConsolidationConfig`],
//! built via its [`ConsolidationConfigBuilder`]. One struct holds every knob
//! so a config can be shared across concurrent runs and logged as a whole.

use crate::error::ConsolidationError;
use crate::progress::ProgressCallback;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

static RE_ARTIFACT_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9-]*$").expect("static regex"));

/// Configuration for a consolidation run.
///
/// Built via [`ConsolidationConfig::builder()`] or using
/// [`ConsolidationConfig::default()`].
///
/// # Example
/// ```rust
/// use case_consolidate::{ConsolidationConfig, PageSize};
///
/// let config = ConsolidationConfig::builder()
///     .page_size(PageSize::Letter)
///     .jpeg_quality(80)
///     .document_timeout_secs(10)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConsolidationConfig {
    /// Page size of image pages. Default: A4 portrait.
    ///
    /// Spliced PDF pages keep their own media box.
    pub page_size: PageSize,

    /// Margin on every side of an image page, in points. Default: 36 (half an inch).
    pub margin_pt: f32,

    /// JPEG quality of the canonical intermediate image format. Range: 10–95. Default: 75.
    ///
    /// Every raster input is re-encoded to baseline JPEG at this quality, which
    /// caps the artifact's size regardless of how the upload was compressed.
    pub jpeg_quality: u8,

    /// Longest edge, in pixels, of re-encoded image data. Default: 2400.
    ///
    /// An A4 page at 200 dpi is about 1650 × 2340 px; anything larger only
    /// inflates the artifact. Page placement is computed from the original
    /// dimensions, so this never changes an image's size on the page.
    pub max_embedded_pixels: u32,

    /// Decoder limit on image width or height, in pixels. Default: 16384.
    pub max_image_dimension: u32,

    /// Decoder allocation limit, in bytes. Default: 512 MiB.
    pub max_decode_alloc_bytes: u64,

    /// Ceiling on the summed `byte_size` of a run's inputs. Default: 256 MiB.
    ///
    /// The whole output is assembled in memory, so runs above this are
    /// rejected before any file is read.
    pub max_total_input_bytes: u64,

    /// Per-document processing timeout in seconds. Default: 30.
    ///
    /// A document that exceeds it is skipped with
    /// [`crate::error::DocumentError::Timeout`]; the run continues.
    pub document_timeout_secs: u64,

    /// Number of documents decoded or parsed ahead concurrently. Default: 4.
    ///
    /// Output order is always input order regardless of this value.
    pub concurrency: usize,

    /// Prefix of artifact file names. Default: `consolidated`.
    pub artifact_prefix: String,

    /// Optional per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            page_size: PageSize::default(),
            margin_pt: 36.0,
            jpeg_quality: 75,
            max_embedded_pixels: 2400,
            max_image_dimension: 16_384,
            max_decode_alloc_bytes: 512 * 1024 * 1024,
            max_total_input_bytes: 256 * 1024 * 1024,
            document_timeout_secs: 30,
            concurrency: 4,
            artifact_prefix: "consolidated".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConsolidationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsolidationConfig")
            .field("page_size", &self.page_size)
            .field("margin_pt", &self.margin_pt)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("max_embedded_pixels", &self.max_embedded_pixels)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("max_decode_alloc_bytes", &self.max_decode_alloc_bytes)
            .field("max_total_input_bytes", &self.max_total_input_bytes)
            .field("document_timeout_secs", &self.document_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("artifact_prefix", &self.artifact_prefix)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConsolidationProgressCallback>"),
            )
            .finish()
    }
}

impl ConsolidationConfig {
    /// Create a new builder for `ConsolidationConfig`.
    pub fn builder() -> ConsolidationConfigBuilder {
        ConsolidationConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn document_timeout(&self) -> Duration {
        Duration::from_secs(self.document_timeout_secs)
    }

    /// The subset of settings the page renderer needs, detached from the
    /// config so it can move into a blocking task.
    pub fn render_settings(&self) -> RenderSettings {
        let (page_width_pt, page_height_pt) = self.page_size.dimensions_pt();
        RenderSettings {
            page_width_pt,
            page_height_pt,
            margin_pt: self.margin_pt,
            jpeg_quality: self.jpeg_quality,
            max_embedded_pixels: self.max_embedded_pixels,
            max_image_dimension: self.max_image_dimension,
            max_decode_alloc_bytes: self.max_decode_alloc_bytes,
        }
    }
}

/// Builder for [`ConsolidationConfig`].
#[derive(Debug)]
pub struct ConsolidationConfigBuilder {
    config: ConsolidationConfig,
}

impl ConsolidationConfigBuilder {
    pub fn page_size(mut self, size: PageSize) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn margin_pt(mut self, margin: f32) -> Self {
        self.config.margin_pt = margin.max(0.0);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(10, 95);
        self
    }

    pub fn max_embedded_pixels(mut self, px: u32) -> Self {
        self.config.max_embedded_pixels = px.max(100);
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px.max(1);
        self
    }

    pub fn max_decode_alloc_bytes(mut self, bytes: u64) -> Self {
        self.config.max_decode_alloc_bytes = bytes;
        self
    }

    pub fn max_total_input_bytes(mut self, bytes: u64) -> Self {
        self.config.max_total_input_bytes = bytes;
        self
    }

    pub fn document_timeout_secs(mut self, secs: u64) -> Self {
        self.config.document_timeout_secs = secs.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn artifact_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.artifact_prefix = prefix.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConsolidationConfig, ConsolidationError> {
        let c = &self.config;
        let (w, h) = c.page_size.dimensions_pt();
        if !(w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
            return Err(ConsolidationError::InvalidConfig(format!(
                "Page size must be positive, got {w}×{h} pt"
            )));
        }
        if c.margin_pt * 2.0 >= w.min(h) {
            return Err(ConsolidationError::InvalidConfig(format!(
                "Margin {} pt leaves no printable area on a {w}×{h} pt page",
                c.margin_pt
            )));
        }
        if !RE_ARTIFACT_PREFIX.is_match(&c.artifact_prefix) {
            return Err(ConsolidationError::InvalidConfig(format!(
                "Artifact prefix must be alphanumeric or '-', got '{}'",
                c.artifact_prefix
            )));
        }
        if c.max_total_input_bytes == 0 {
            return Err(ConsolidationError::InvalidConfig(
                "Input size ceiling must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Page geometry ────────────────────────────────────────────────────────

/// Target page size of image pages, always portrait.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PageSize {
    /// ISO A4, 210 × 297 mm. (default)
    #[default]
    A4,
    /// US Letter, 8.5 × 11 in.
    Letter,
    /// Explicit width and height in points. Swapped if given landscape.
    Custom { width_pt: f32, height_pt: f32 },
}

impl PageSize {
    /// `(width, height)` in PDF points, portrait.
    pub fn dimensions_pt(&self) -> (f32, f32) {
        match *self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Custom {
                width_pt,
                height_pt,
            } => (width_pt.min(height_pt), width_pt.max(height_pt)),
        }
    }
}

/// Settings consumed by [`crate::pipeline::render`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    pub margin_pt: f32,
    pub jpeg_quality: u8,
    pub max_embedded_pixels: u32,
    pub max_image_dimension: u32,
    pub max_decode_alloc_bytes: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        ConsolidationConfig::default().render_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = ConsolidationConfig::builder().build().unwrap();
        assert_eq!(config.jpeg_quality, 75);
        assert_eq!(config.page_size, PageSize::A4);
        assert_eq!(config.artifact_prefix, "consolidated");
    }

    #[test]
    fn quality_is_clamped() {
        let c = ConsolidationConfig::builder().jpeg_quality(100).build().unwrap();
        assert_eq!(c.jpeg_quality, 95);
        let c = ConsolidationConfig::builder().jpeg_quality(1).build().unwrap();
        assert_eq!(c.jpeg_quality, 10);
    }

    #[test]
    fn bad_prefix_rejected() {
        let err = ConsolidationConfig::builder()
            .artifact_prefix("../evil")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConsolidationError::InvalidConfig(_)));
        assert!(ConsolidationConfig::builder()
            .artifact_prefix("os-merged")
            .build()
            .is_ok());
    }

    #[test]
    fn oversized_margin_rejected() {
        let err = ConsolidationConfig::builder()
            .margin_pt(400.0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("printable area"));
    }

    #[test]
    fn custom_page_is_portrait() {
        let size = PageSize::Custom {
            width_pt: 800.0,
            height_pt: 600.0,
        };
        assert_eq!(size.dimensions_pt(), (600.0, 800.0));
    }
}
