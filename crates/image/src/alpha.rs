//! Flattening transparency for encoders without an alpha channel.

use image::{DynamicImage, Rgb, RgbImage};

/// Composite `img` over a solid `background` and drop the alpha channel.
///
/// Opaque images are converted without blending.
pub fn flatten_alpha(img: &DynamicImage, background: [u8; 3]) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut output = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = f32::from(a) / 255.0;
        let blend = |fg: u8, bg: u8| {
            (f32::from(fg) * alpha + f32::from(bg) * (1.0 - alpha)).round() as u8
        };

        output.put_pixel(
            x,
            y,
            Rgb([
                blend(r, background[0]),
                blend(g, background[1]),
                blend(b, background[2]),
            ]),
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn test_flatten_over_white() {
        let mut img = RgbaImage::new(2, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255])); // opaque red
        img.put_pixel(0, 1, Rgba([0, 0, 0, 128])); // half black
        img.put_pixel(1, 0, Rgba([0, 0, 255, 0])); // invisible blue
        img.put_pixel(1, 1, Rgba([255, 255, 0, 255])); // opaque yellow

        let flat = flatten_alpha(&DynamicImage::ImageRgba8(img), [255, 255, 255]);

        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(flat.get_pixel(0, 1), &Rgb([127, 127, 127]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 1), &Rgb([255, 255, 0]));
    }

    #[test]
    fn test_flatten_respects_background() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([10, 20, 30, 0]));
        let flat = flatten_alpha(&DynamicImage::ImageRgba8(img), [1, 2, 3]);
        assert_eq!(flat.get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_opaque_image_unchanged() {
        let img = image::RgbImage::from_pixel(3, 1, Rgb([9, 8, 7]));
        let flat = flatten_alpha(&DynamicImage::ImageRgb8(img.clone()), [255, 255, 255]);
        assert_eq!(flat, img);
    }
}
