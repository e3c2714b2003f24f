//! Per-format encoders.
//!
//! JPEG goes through mozjpeg for progressive scans, PNG and AVIF through the
//! `image` codecs, and lossy WebP through libwebp because the `image` WebP
//! encoder is lossless only.

use crate::models::OutputFormat;
use image::codecs::avif::AvifEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::error::{EncodingError, ImageFormatHint};
use image::{DynamicImage, ImageError, ImageFormat, ImageResult};

/// rav1e speed, 1 (slowest) to 10 (fastest).
pub const AVIF_SPEED: u8 = 6;

/// Encode `img` as `format`. `quality` is 1-100 and is ignored for PNG, which
/// is always written losslessly at maximum compression.
pub fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> ImageResult<Vec<u8>> {
    let quality = quality.clamp(1, 100);
    let mut buffer = Vec::new();

    match format {
        OutputFormat::Jpeg => return encode_progressive_jpeg(img, quality),
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buffer,
                CompressionType::Best,
                PngFilterType::Adaptive,
            );
            img.write_with_encoder(encoder)?;
        }
        OutputFormat::Webp => {
            let rgba = img.to_rgba8();
            let encoded = webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height())
                .encode_simple(false, quality as f32)
                .map_err(|e| {
                    ImageError::Encoding(EncodingError::new(
                        ImageFormatHint::Exact(ImageFormat::WebP),
                        format!("libwebp encoding failed: {:?}", e),
                    ))
                })?;
            buffer.extend_from_slice(&encoded);
        }
        OutputFormat::Avif => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(AvifEncoder::new_with_speed_quality(
                &mut buffer,
                AVIF_SPEED,
                quality,
            ))?;
        }
    }

    Ok(buffer)
}

fn encode_progressive_jpeg(img: &DynamicImage, quality: u8) -> ImageResult<Vec<u8>> {
    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(quality as f32);
    comp.set_progressive_mode();
    comp.set_optimize_coding(true);

    let mut comp = comp.start_compress(Vec::new())?;
    comp.write_scanlines(&rgb)?;
    Ok(comp.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 128, 255])
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_encode_jpeg_decodes_back() {
        let bytes = encode(&gradient(32, 16), OutputFormat::Jpeg, 85).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }

    #[test]
    fn test_encode_jpeg_is_progressive() {
        let bytes = encode(&gradient(64, 48), OutputFormat::Jpeg, 85).unwrap();
        // SOF2 marks a progressive DCT frame
        assert!(bytes.windows(2).any(|marker| marker == [0xFF, 0xC2]));
    }

    #[test]
    fn test_encode_png_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 40])));
        let bytes = encode(&img, OutputFormat::Png, 85).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(3, 3), &Rgba([10, 20, 30, 40]));
    }

    #[test]
    fn test_encode_webp() {
        let bytes = encode(&gradient(40, 20), OutputFormat::Webp, 80).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::WebP);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 20));
    }

    #[test]
    fn test_encode_avif_produces_avif_container() {
        let bytes = encode(&gradient(16, 16), OutputFormat::Avif, 50).unwrap();
        assert_eq!(&bytes[4..12], b"ftypavif");
    }

    #[test]
    fn test_lower_jpeg_quality_is_smaller() {
        let img = gradient(128, 128);
        let high = encode(&img, OutputFormat::Jpeg, 95).unwrap();
        let low = encode(&img, OutputFormat::Jpeg, 20).unwrap();
        assert!(low.len() < high.len());
    }
}
