//! In-memory fixtures for unit tests.

use crate::registry::FileInput;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

/// Opaque RGBA PNG with pseudo-random pixels, so it does not compress away.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x9E37_79B9 ^ width.wrapping_mul(31).wrapping_add(height);
    let img = RgbaImage::from_fn(width, height, |_, _| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let [r, g, b, _] = state.to_le_bytes();
        Rgba([r, g, b, 255])
    });
    encode_png(img)
}

/// PNG filled with a single RGBA colour.
pub fn rgba_png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    encode_png(RgbaImage::from_pixel(width, height, Rgba(rgba)))
}

/// PNG whose header is intact but whose pixel data is cut in half.
pub fn corrupt_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = png_bytes(width, height);
    bytes.truncate(bytes.len() / 2);
    bytes
}

pub fn png_file(name: &str, width: u32, height: u32) -> FileInput {
    FileInput::new(name, "image/png", png_bytes(width, height))
}

pub fn corrupt_png_file(name: &str, width: u32, height: u32) -> FileInput {
    FileInput::new(name, "image/png", corrupt_png_bytes(width, height))
}

pub fn text_file(name: &str) -> FileInput {
    FileInput::new(name, "text/plain", b"just some notes".to_vec())
}

fn encode_png(img: RgbaImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("encode fixture");
    buffer.into_inner()
}
