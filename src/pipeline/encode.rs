//! Image encoding: `DynamicImage` → PNG [`RasterImage`] → base64 `ImageData`.
//!
//! PNG is lossless, so the same pixels always give the same bytes and text
//! edges stay crisp for the model. `detail: "high"` asks GPT-4-class models
//! for the full tile budget; fine print is lost without it.

use crate::pipeline::render::RasterImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

pub const PNG_MIME: &str = "image/png";

/// Encode a rendered page as PNG.
pub fn encode_png(img: &DynamicImage, page_num: usize) -> Result<RasterImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Page {}: encoded {}x{} PNG, {} bytes", page_num, img.width(), img.height(), buf.len());

    Ok(RasterImage {
        page_num,
        width: img.width(),
        height: img.height(),
        mime_type: PNG_MIME,
        bytes: buf,
    })
}

/// Wrap a raster image as a base64 attachment for the VLM API.
pub fn to_image_data(image: &RasterImage) -> ImageData {
    ImageData::new(STANDARD.encode(&image.bytes), image.mime_type).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }))
    }

    #[test]
    fn png_carries_dimensions_and_page() {
        let raster = encode_png(&sample(12, 7), 4).expect("encode should succeed");
        assert_eq!((raster.width, raster.height), (12, 7));
        assert_eq!(raster.page_num, 4);
        assert_eq!(raster.mime_type, "image/png");
        assert_eq!(&raster.bytes[1..4], b"PNG");
    }

    #[test]
    fn encoding_is_byte_identical_for_identical_pixels() {
        let a = encode_png(&sample(40, 30), 1).unwrap();
        let b = encode_png(&sample(40, 30), 1).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn image_data_is_base64_png() {
        let raster = encode_png(&sample(3, 3), 1).unwrap();
        let data = to_image_data(&raster);
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, raster.bytes);
    }
}
