//! Color inversion for projected patterns
//!
//! Dark cutting mats need the pattern drawn light-on-dark, so the operator
//! can flip every color channel of the source image before it is warped.

use image::RgbaImage;

/// Invert the color channels of an RGBA image in place (`v' = 255 - v`).
///
/// Alpha is left untouched. Applying this twice restores the original.
pub fn invert_colors(img: &mut RgbaImage) {
    for pixel in img.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        pixel.0 = [u8::MAX - r, u8::MAX - g, u8::MAX - b, a];
    }
}

/// Copy of `img` with inverted colors
pub fn inverted(img: &RgbaImage) -> RgbaImage {
    let mut out = img.clone();
    invert_colors(&mut out);
    out
}
