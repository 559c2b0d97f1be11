//! Frame rendering: inversion, homography and warp in one pure step

use image::RgbaImage;
use std::borrow::Cow;

use crate::calibration::CalibrationModel;
use crate::color::inverted;
use crate::config::Quad;
use crate::transform::{PerspectiveTransform, TransformError};

/// Render the frame shown on the projector canvas.
///
/// The source is optionally color-inverted, then warped so that `source_quad`
/// lands on `destination_quad` in a canvas of `canvas_size`.
pub fn render_frame(
    source: &RgbaImage,
    source_quad: &Quad,
    destination_quad: &Quad,
    inverted_colors: bool,
    canvas_size: (u32, u32),
) -> Result<RgbaImage, TransformError> {
    let transform = PerspectiveTransform::compute(source_quad, destination_quad)?;
    tracing::debug!("Perspective matrix {:?}", transform.matrix());

    let source = if inverted_colors {
        Cow::Owned(inverted(source))
    } else {
        Cow::Borrowed(source)
    };

    let (width, height) = canvas_size;
    Ok(transform.warp_image(&source, width, height))
}

/// Render the frame for the model's current state
pub fn render_model(
    source: &RgbaImage,
    model: &CalibrationModel,
) -> Result<RgbaImage, TransformError> {
    render_frame(
        source,
        model.source_quad(),
        model.destination(),
        model.is_inverted(),
        model.geometry().canvas_size,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Point;
    use crate::transform::BACKGROUND;
    use image::Rgba;

    fn checker(size: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            if (x / 10 + y / 10) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    #[test]
    fn test_identity_render_matches_source() {
        let img = checker(40);
        let quad = Quad::from_rect(0.0, 0.0, 39.0, 39.0);
        let frame = render_frame(&img, &quad, &quad, false, (40, 40)).unwrap();
        assert_eq!(frame, img);
    }

    #[test]
    fn test_inverted_render() {
        let img = RgbaImage::from_pixel(20, 20, Rgba([10, 20, 30, 255]));
        let quad = Quad::from_rect(0.0, 0.0, 19.0, 19.0);
        let frame = render_frame(&img, &quad, &quad, true, (20, 20)).unwrap();
        assert_eq!(*frame.get_pixel(7, 7), Rgba([245, 235, 225, 255]));
    }

    #[test]
    fn test_scaled_render_fills_canvas_region() {
        let img = RgbaImage::from_pixel(100, 100, Rgba([90, 90, 90, 255]));
        let src = Quad::from_rect(0.0, 0.0, 100.0, 100.0);
        let dst = Quad::from_rect(0.0, 0.0, 320.0, 240.0);

        let frame = render_frame(&img, &src, &dst, false, (640, 480)).unwrap();
        assert_eq!(frame.dimensions(), (640, 480));
        assert_eq!(*frame.get_pixel(160, 120), Rgba([90, 90, 90, 255]));
        assert_eq!(*frame.get_pixel(500, 400), BACKGROUND);
    }

    #[test]
    fn test_degenerate_destination_is_error() {
        let img = checker(20);
        let src = Quad::from_rect(0.0, 0.0, 20.0, 20.0);
        let mut dst = src;
        dst.bottom_left = Point::new(10.0, 0.0);

        assert!(render_frame(&img, &src, &dst, false, (20, 20)).is_err());
    }
}
