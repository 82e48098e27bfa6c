//! Raster image recompression.
//!
//! The output format follows the destination suffix; conversion between raster
//! formats is expected. Work here is CPU bound and runs on the blocking pool.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageError, ImageFormat, Rgb, RgbImage};

/// Raster format an image destination asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageTarget {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageTarget {
    /// Target for a destination path; `None` for SVG and unknown suffixes.
    pub(crate) fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    pub(crate) const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    const fn format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::Webp => ImageFormat::WebP,
            Self::Gif => ImageFormat::Gif,
        }
    }
}

/// What happened to one image.
#[derive(Debug)]
pub(crate) enum ImageResult {
    /// Re-encoded bytes replace the input.
    Encoded {
        bytes: Vec<u8>,
        width: u32,
        height: u32,
    },
    /// Re-encoding would not help; keep the input.
    Unchanged,
}

/// Decode, flatten, downscale, and re-encode `bytes` for `target`.
pub(crate) fn recompress(
    bytes: &[u8],
    target: ImageTarget,
    max_dimension: u32,
    jpeg_quality: u8,
) -> Result<ImageResult, ImageError> {
    let source_format = image::guess_format(bytes).ok();
    let decoded = image::load_from_memory(bytes)?;
    let (width, height) = decoded.dimensions();
    let needs_resize = width.max(height) > max_dimension;
    let same_format = source_format == Some(target.format());

    if target == ImageTarget::Gif && same_format && !needs_resize {
        return Ok(ImageResult::Unchanged);
    }

    let resized = if needs_resize {
        decoded.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        decoded
    };
    let (out_width, out_height) = resized.dimensions();
    let encoded = encode(&resized, target, jpeg_quality)?;

    if same_format && !needs_resize && encoded.len() >= bytes.len() {
        return Ok(ImageResult::Unchanged);
    }
    Ok(ImageResult::Encoded {
        bytes: encoded,
        width: out_width,
        height: out_height,
    })
}

fn encode(
    image: &DynamicImage,
    target: ImageTarget,
    jpeg_quality: u8,
) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Vec::new();
    let mut cursor = Cursor::new(&mut buffer);
    match target {
        ImageTarget::Jpeg => {
            let flattened = flatten_onto_white(image);
            let encoder = JpegEncoder::new_with_quality(&mut cursor, jpeg_quality);
            flattened.write_with_encoder(encoder)?;
        }
        ImageTarget::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut cursor,
                CompressionType::Best,
                PngFilter::Adaptive,
            );
            image.write_with_encoder(encoder)?;
        }
        ImageTarget::Webp => {
            let rgba = image.to_rgba8();
            let encoder = WebPEncoder::new_lossless(&mut cursor);
            rgba.write_with_encoder(encoder)?;
        }
        ImageTarget::Gif => {
            image.write_to(&mut cursor, ImageFormat::Gif)?;
        }
    }
    Ok(buffer)
}

/// Composite onto opaque white; images without alpha convert directly.
pub(crate) fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u16::from(a);
        let blend = |channel: u8| {
            let value = (u16::from(channel) * alpha + 255 * (255 - alpha) + 127) / 255;
            u8::try_from(value).unwrap_or(u8::MAX)
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    #[test]
    fn target_follows_destination_suffix() {
        assert_eq!(
            ImageTarget::from_path(Path::new("a/b.JPEG")),
            Some(ImageTarget::Jpeg)
        );
        assert_eq!(
            ImageTarget::from_path(Path::new("x.webp")),
            Some(ImageTarget::Webp)
        );
        assert_eq!(ImageTarget::from_path(Path::new("logo.svg")), None);
        assert_eq!(ImageTarget::from_path(Path::new("noext")), None);
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([10, 20, 30, 0]));
        rgba.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(flat.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn large_images_are_downscaled_proportionally() {
        let rgba = RgbaImage::from_pixel(400, 100, Rgba([200, 10, 10, 255]));
        let result = recompress(&png_bytes(&rgba), ImageTarget::Jpeg, 200, 85).expect("recompress");
        match result {
            ImageResult::Encoded { bytes, width, height } => {
                assert_eq!((width, height), (200, 50));
                let decoded = image::load_from_memory(&bytes).expect("decode");
                assert_eq!(decoded.dimensions(), (200, 50));
            }
            ImageResult::Unchanged => panic!("expected re-encode"),
        }
    }

    #[test]
    fn small_images_are_never_upscaled() {
        let rgba = RgbaImage::from_pixel(16, 8, Rgba([0, 0, 0, 255]));
        let result =
            recompress(&png_bytes(&rgba), ImageTarget::Webp, 2000, 85).expect("recompress");
        if let ImageResult::Encoded { width, height, .. } = result {
            assert_eq!((width, height), (16, 8));
        }
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        assert!(recompress(b"\x89PNG\r\n\x1a\nbroken", ImageTarget::Png, 2000, 85).is_err());
    }
}
