//! Page rendering: turn one raster image into one ready-to-embed page.
//!
//! ```text
//! bytes ──▶ decode ──▶ flatten colour ──▶ cap pixels ──▶ JPEG ──▶ placement
//!          (sniffed,   (alpha → white,    (longest edge   (bounded
//!           limited)    16-bit → 8-bit)    ≤ max px)       quality)
//! ```
//!
//! Everything here is CPU-bound and synchronous; the orchestrator runs it on
//! the blocking pool under a timeout. Every failure is a [`DocumentError`],
//! never a panic, so one bad upload only costs its own page.

use crate::config::RenderSettings;
use crate::error::DocumentError;
use crate::pipeline::encode::{encode_jpeg, EncodedImage};
use crate::pipeline::layout::{fit_to_page, Placement};
use image::error::UnsupportedErrorKind;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GrayImage, ImageError, ImageReader, Limits, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// One image page: the encoded image and where it goes.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: EncodedImage,
    /// Decoded dimensions before any pixel cap; placement is based on these.
    pub source_width: u32,
    pub source_height: u32,
    pub placement: Placement,
}

/// Render image `bytes` as a single page.
///
/// The format is sniffed from the bytes, not taken from the declared type:
/// a PNG uploaded as `photo.jpg` still renders.
pub fn render_image_as_page(
    bytes: &[u8],
    settings: &RenderSettings,
) -> Result<RenderedPage, DocumentError> {
    let decoded = decode(bytes, settings)?;
    let (source_width, source_height) = (decoded.width(), decoded.height());
    if source_width == 0 || source_height == 0 {
        return Err(DocumentError::EmptyImage {
            width: source_width,
            height: source_height,
        });
    }

    let flat = flatten_color(decoded)?;
    let capped = cap_pixels(flat, settings.max_embedded_pixels);
    let image = encode_jpeg(&capped, settings.jpeg_quality).map_err(|e| DocumentError::Encode {
        detail: e.to_string(),
    })?;

    let placement = fit_to_page(
        source_width,
        source_height,
        settings.page_width_pt,
        settings.page_height_pt,
        settings.margin_pt,
    );
    debug!(
        "Rendered {}x{} px image → {:.1}x{:.1} pt at ({:.1}, {:.1}), scale {:.3}",
        source_width,
        source_height,
        placement.width,
        placement.height,
        placement.x,
        placement.y,
        placement.scale
    );

    Ok(RenderedPage {
        image,
        source_width,
        source_height,
        placement,
    })
}

/// Decode with the format sniffed from magic bytes and decoder limits applied.
fn decode(bytes: &[u8], settings: &RenderSettings) -> Result<DynamicImage, DocumentError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DocumentError::Decode {
            detail: e.to_string(),
        })?;

    if reader.format().is_none() {
        return Err(DocumentError::Decode {
            detail: "unrecognised image format".into(),
        });
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(settings.max_image_dimension);
    limits.max_image_height = Some(settings.max_image_dimension);
    limits.max_alloc = Some(settings.max_decode_alloc_bytes);
    reader.limits(limits);

    reader.decode().map_err(map_image_error)
}

fn map_image_error(e: ImageError) -> DocumentError {
    match e {
        ImageError::Unsupported(ref u) => match u.kind() {
            UnsupportedErrorKind::Color(color) => DocumentError::UnsupportedColorModel {
                color: format!("{color:?}"),
            },
            _ => DocumentError::Decode {
                detail: e.to_string(),
            },
        },
        ImageError::Limits(ref l) => DocumentError::Decode {
            detail: format!("image exceeds decoder limits: {l}"),
        },
        other => DocumentError::Decode {
            detail: other.to_string(),
        },
    }
}

/// Reduce any supported colour model to 8-bit gray or RGB, compositing
/// transparency onto a white page.
fn flatten_color(img: DynamicImage) -> Result<DynamicImage, DocumentError> {
    match img.color() {
        ColorType::L8 | ColorType::Rgb8 => Ok(img),
        ColorType::L16 => Ok(DynamicImage::ImageLuma8(img.to_luma8())),
        ColorType::Rgb16 | ColorType::Rgb32F => Ok(DynamicImage::ImageRgb8(img.to_rgb8())),
        ColorType::La8 | ColorType::La16 => {
            let la = img.to_luma_alpha8();
            let gray = GrayImage::from_fn(la.width(), la.height(), |x, y| {
                let p = la.get_pixel(x, y).0;
                image::Luma([over_white(p[0], p[1])])
            });
            Ok(DynamicImage::ImageLuma8(gray))
        }
        ColorType::Rgba8 | ColorType::Rgba16 | ColorType::Rgba32F => {
            let rgba = img.to_rgba8();
            let rgb = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
                let [r, g, b, a] = rgba.get_pixel(x, y).0;
                image::Rgb([over_white(r, a), over_white(g, a), over_white(b, a)])
            });
            Ok(DynamicImage::ImageRgb8(rgb))
        }
        other => Err(DocumentError::UnsupportedColorModel {
            color: format!("{other:?}"),
        }),
    }
}

fn over_white(channel: u8, alpha: u8) -> u8 {
    let c = channel as u32;
    let a = alpha as u32;
    ((c * a + 255 * (255 - a) + 127) / 255) as u8
}

fn cap_pixels(img: DynamicImage, max_edge: u32) -> DynamicImage {
    if img.width().max(img.height()) <= max_edge {
        return img;
    }
    let resized = img.resize(max_edge, max_edge, FilterType::Triangle);
    debug!(
        "Downsampled {}x{} → {}x{} px",
        img.width(),
        img.height(),
        resized.width(),
        resized.height()
    );
    resized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::encode::PdfColorSpace;
    use image::{ImageFormat, LumaA, Rgba, RgbaImage};

    fn encode_as(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn renders_png() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 200, image::Rgb([9, 9, 9])));
        let page = render_image_as_page(&encode_as(&img, ImageFormat::Png), &RenderSettings::default())
            .expect("render");
        assert_eq!((page.source_width, page.source_height), (300, 200));
        assert_eq!(page.placement.scale, 1.0);
        assert_eq!(page.image.color_space, PdfColorSpace::DeviceRgb);
    }

    #[test]
    fn corrupt_bytes_are_a_decode_error() {
        let err = render_image_as_page(b"definitely not an image", &RenderSettings::default())
            .unwrap_err();
        assert!(matches!(err, DocumentError::Decode { .. }), "got {err:?}");
    }

    #[test]
    fn truncated_png_is_a_decode_error() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 50, image::Rgb([1, 2, 3])));
        let bytes = encode_as(&img, ImageFormat::Png);
        let err = render_image_as_page(&bytes[..bytes.len() / 2], &RenderSettings::default())
            .unwrap_err();
        assert!(matches!(err, DocumentError::Decode { .. }), "got {err:?}");
    }

    #[test]
    fn decoder_limits_apply() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, image::Rgb([0, 0, 0])));
        let settings = RenderSettings {
            max_image_dimension: 32,
            ..RenderSettings::default()
        };
        let err = render_image_as_page(&encode_as(&img, ImageFormat::Png), &settings).unwrap_err();
        assert!(matches!(err, DocumentError::Decode { .. }), "got {err:?}");
    }

    #[test]
    fn large_images_are_downsampled_but_placed_by_source_size() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(1000, 500, image::Rgb([0, 0, 0])));
        let settings = RenderSettings {
            max_embedded_pixels: 200,
            ..RenderSettings::default()
        };
        let page = render_image_as_page(&encode_as(&img, ImageFormat::Png), &settings).unwrap();
        assert_eq!((page.image.width, page.image.height), (200, 100));
        assert_eq!(page.source_width, 1000);
        assert!(page.placement.width > 500.0);
    }

    #[test]
    fn transparency_becomes_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        let flat = flatten_color(img).unwrap();
        assert_eq!(flat.to_rgb8().get_pixel(0, 0).0, [255, 255, 255]);

        let gray = DynamicImage::ImageLumaA8(image::ImageBuffer::from_pixel(1, 1, LumaA([0u8, 255])));
        let flat = flatten_color(gray).unwrap();
        assert_eq!(flat.color(), ColorType::L8);
        assert_eq!(flat.to_luma8().get_pixel(0, 0).0, [0]);
    }
}
