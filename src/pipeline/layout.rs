//! Page geometry for image pages.
//!
//! An image is measured at one point per pixel (72 dpi), scaled down, never
//! up, to fit inside the page minus its margins while keeping its aspect
//! ratio, then centred on both axes. Coordinates follow PDF convention:
//! origin at the bottom-left corner of the page.

use serde::{Deserialize, Serialize};

/// Where an image sits on its page, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub page_width: f32,
    pub page_height: f32,
    /// Left edge of the drawn image.
    pub x: f32,
    /// Bottom edge of the drawn image.
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Applied scale factor, always in `(0, 1]`.
    pub scale: f32,
}

/// Compute the placement of a `pixel_width × pixel_height` image.
///
/// Callers guarantee non-zero pixel dimensions and a margin that leaves a
/// positive printable area (both are validated upstream).
pub fn fit_to_page(
    pixel_width: u32,
    pixel_height: u32,
    page_width: f32,
    page_height: f32,
    margin: f32,
) -> Placement {
    let natural_w = pixel_width as f32;
    let natural_h = pixel_height as f32;
    let avail_w = (page_width - 2.0 * margin).max(1.0);
    let avail_h = (page_height - 2.0 * margin).max(1.0);

    let scale = (avail_w / natural_w).min(avail_h / natural_h).min(1.0);
    let width = natural_w * scale;
    let height = natural_h * scale;

    Placement {
        page_width,
        page_height,
        x: (page_width - width) / 2.0,
        y: (page_height - height) / 2.0,
        width,
        height,
        scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: (f32, f32) = (595.28, 841.89);

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn small_image_is_not_upscaled() {
        let p = fit_to_page(200, 100, A4.0, A4.1, 36.0);
        assert_eq!(p.scale, 1.0);
        assert_eq!((p.width, p.height), (200.0, 100.0));
        assert!(close(p.x, (A4.0 - 200.0) / 2.0));
        assert!(close(p.y, (A4.1 - 100.0) / 2.0));
    }

    #[test]
    fn wide_image_is_bounded_by_width() {
        let p = fit_to_page(4000, 1000, A4.0, A4.1, 36.0);
        assert!(close(p.width, A4.0 - 72.0));
        assert!(close(p.height, (A4.0 - 72.0) / 4.0));
        assert!(close(p.x, 36.0));
        // Centred vertically.
        assert!(close(p.y + p.height / 2.0, A4.1 / 2.0));
    }

    #[test]
    fn tall_image_is_bounded_by_height() {
        let p = fit_to_page(1000, 5000, A4.0, A4.1, 36.0);
        assert!(close(p.height, A4.1 - 72.0));
        assert!(close(p.y, 36.0));
        assert!(close(p.width / p.height, 0.2));
    }

    #[test]
    fn stays_inside_margins() {
        for (w, h) in [(1, 1), (595, 842), (3000, 3000), (10, 9000), (9000, 10)] {
            let p = fit_to_page(w, h, A4.0, A4.1, 20.0);
            assert!(p.x >= 20.0 - 0.01 && p.x + p.width <= A4.0 - 20.0 + 0.01);
            assert!(p.y >= 20.0 - 0.01 && p.y + p.height <= A4.1 - 20.0 + 0.01);
            assert!(p.scale > 0.0 && p.scale <= 1.0);
        }
    }
}
