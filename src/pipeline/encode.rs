//! Image encoding: `DynamicImage` → baseline JPEG ready to embed as a PDF
//! image XObject with `/DCTDecode`.
//!
//! JPEG is the canonical intermediate format because a PDF reader decodes it
//! natively: the encoded bytes become the XObject stream unchanged, with no
//! further compression or pixel re-packing. The quality is bounded by config
//! so a batch of 20 MB phone photos does not produce a 400 MB artifact.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// PDF colour space of an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PdfColorSpace {
    DeviceGray,
    DeviceRgb,
}

impl PdfColorSpace {
    /// The PDF name for this colour space.
    pub fn pdf_name(&self) -> &'static [u8] {
        match self {
            PdfColorSpace::DeviceGray => b"DeviceGray",
            PdfColorSpace::DeviceRgb => b"DeviceRGB",
        }
    }
}

/// A JPEG stream plus what a PDF image dictionary needs to describe it.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub color_space: PdfColorSpace,
}

/// Encode an 8-bit grayscale or RGB image as JPEG at `quality` (1–100).
///
/// Any other pixel layout is converted to RGB first; callers flatten alpha
/// beforehand so transparency composites onto white rather than black.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<EncodedImage, image::ImageError> {
    let (width, height) = (img.width(), img.height());
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));

    let color_space = match img {
        DynamicImage::ImageLuma8(gray) => {
            encoder.write_image(gray.as_raw(), width, height, ExtendedColorType::L8)?;
            PdfColorSpace::DeviceGray
        }
        DynamicImage::ImageRgb8(rgb) => {
            encoder.write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)?;
            PdfColorSpace::DeviceRgb
        }
        other => {
            let rgb = other.to_rgb8();
            encoder.write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)?;
            PdfColorSpace::DeviceRgb
        }
    };

    debug!(
        "Encoded {}x{} {:?} → {} bytes JPEG (q={})",
        width,
        height,
        color_space,
        buf.len(),
        quality
    );

    Ok(EncodedImage {
        data: buf,
        width,
        height,
        color_space,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn encode_rgb_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 8, Rgb([255, 0, 0])));
        let enc = encode_jpeg(&img, 75).expect("encode should succeed");
        assert_eq!(enc.color_space, PdfColorSpace::DeviceRgb);
        assert_eq!((enc.width, enc.height), (10, 8));
        // SOI marker
        assert_eq!(&enc.data[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn gray_stays_gray() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(4, 4, Luma([128])));
        let enc = encode_jpeg(&img, 50).unwrap();
        assert_eq!(enc.color_space, PdfColorSpace::DeviceGray);
    }

    #[test]
    fn other_layouts_become_rgb() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([0, 0, 255, 255])));
        let enc = encode_jpeg(&img, 50).unwrap();
        assert_eq!(enc.color_space, PdfColorSpace::DeviceRgb);
    }

    #[test]
    fn lower_quality_is_smaller() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            Rgb([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 4) as u8])
        }));
        let hi = encode_jpeg(&img, 95).unwrap();
        let lo = encode_jpeg(&img, 10).unwrap();
        assert!(lo.data.len() < hi.data.len());
    }
}
