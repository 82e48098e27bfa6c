//! Archive roots and payload builders for pipeline tests.

use std::io::Cursor;

use anyhow::Result;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use tempfile::TempDir;

/// An HTML error page of the kind CDNs serve instead of a missing asset.
pub const ERROR_PAGE: &str =
    "<!DOCTYPE html>\n<html><head><title>404 Not Found</title></head><body>Not Found</body></html>";

/// A small stylesheet with comments and redundant whitespace.
pub const SAMPLE_CSS: &str = "/* theme */\nbody {\n  margin: 0;\n  color: #333;\n}\n\n/* links */\na:hover {\n  color: red;\n}\n";

/// A small script the validator accepts.
pub const SAMPLE_JS: &str = "function greet(name) {\n  return 'hello ' + name;\n}\n";

/// Fresh temporary directory used as an archive root.
///
/// # Errors
///
/// Returns an error when the directory cannot be created.
pub fn temp_root() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix("sitevault-").tempdir()?)
}

/// Encode `image` in `format`.
///
/// # Errors
///
/// Returns an error when encoding fails.
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format)?;
    Ok(bytes)
}

/// Single-colour PNG.
///
/// # Errors
///
/// Returns an error when encoding fails.
pub fn solid_png(width: u32, height: u32, colour: [u8; 4]) -> Result<Vec<u8>> {
    encode(
        &DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(colour))),
        ImageFormat::Png,
    )
}

/// Single-colour JPEG.
///
/// # Errors
///
/// Returns an error when encoding fails.
pub fn solid_jpeg(width: u32, height: u32, colour: [u8; 3]) -> Result<Vec<u8>> {
    encode(
        &DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(colour))),
        ImageFormat::Jpeg,
    )
}

/// Opaque RGB noise PNG; barely compressible, so its size tracks its area.
///
/// # Errors
///
/// Returns an error when encoding fails.
pub fn noise_png(width: u32, height: u32, seed: u32) -> Result<Vec<u8>> {
    let mut noise = Lcg::new(seed);
    let image = RgbImage::from_fn(width, height, |_, _| {
        Rgb([noise.next_byte(), noise.next_byte(), noise.next_byte()])
    });
    encode(&DynamicImage::ImageRgb8(image), ImageFormat::Png)
}

/// RGBA PNG whose left half is fully transparent and right half opaque noise.
///
/// # Errors
///
/// Returns an error when encoding fails.
pub fn half_transparent_png(width: u32, height: u32, seed: u32) -> Result<Vec<u8>> {
    let mut noise = Lcg::new(seed);
    let half = width / 2;
    let image = RgbaImage::from_fn(width, height, |x, _| {
        if x < half {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([noise.next_byte(), noise.next_byte(), noise.next_byte(), 255])
        }
    });
    encode(&DynamicImage::ImageRgba8(image), ImageFormat::Png)
}

/// Deterministic linear congruential generator for reproducible noise.
struct Lcg(u32);

impl Lcg {
    const fn new(seed: u32) -> Self {
        Self(seed)
    }

    fn next_byte(&mut self) -> u8 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.0.to_be_bytes()[0]
    }
}
