//! Conversions between image files, pixel buffers and the base64 text the
//! image service takes as inline data.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::codecs::png::PngEncoder;
use image::{ColorType, GrayImage, ImageEncoder as _, ImageFormat, RgbaImage};

use crate::error::{EditError, Result};

/// Upload formats the image service accepts.
pub const SUPPORTED_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];

/// An encoded image carried as base64 text plus its MIME type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    /// Wraps an image file's bytes, sniffing the format from its header.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mime_type = sniff_mime(bytes).ok_or(EditError::UnsupportedFormat)?;
        Ok(Self {
            mime_type: mime_type.to_owned(),
            data: STANDARD.encode(bytes),
        })
    }

    /// Wraps bytes already known to be PNG.
    pub fn png(bytes: &[u8]) -> Self {
        Self {
            mime_type: "image/png".to_owned(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(self.data.as_bytes())?)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// File extension matching the MIME type, for save dialogs.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.split(';').next().unwrap_or_default().trim() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "png",
        }
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        _ => None,
    }
}

/// Decodes any supported image file to RGBA8.
pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

pub fn encode_png_gray(image: &GrayImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::L8,
    )?;
    Ok(buf)
}

pub fn encode_png_rgba(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    fn tiny_png() -> Vec<u8> {
        let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        encode_png_rgba(&img).expect("encode")
    }

    #[test]
    fn detects_png() {
        let inline = InlineImage::from_bytes(&tiny_png()).expect("png is supported");
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.extension(), "png");
        assert!(inline.data_url().starts_with("data:image/png;base64,iVBOR"));
    }

    #[test]
    fn detects_jpeg_from_magic_bytes() {
        let header = [0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F', 0];
        let inline = InlineImage::from_bytes(&header).expect("jpeg header");
        assert_eq!(inline.mime_type, "image/jpeg");
        assert_eq!(inline.extension(), "jpg");
    }

    #[test]
    fn rejects_non_images() {
        assert!(matches!(
            InlineImage::from_bytes(b"hello world"),
            Err(EditError::UnsupportedFormat)
        ));
        assert!(matches!(
            InlineImage::from_bytes(&[]),
            Err(EditError::UnsupportedFormat)
        ));
    }

    #[test]
    fn decode_returns_original_bytes() {
        let bytes = tiny_png();
        let inline = InlineImage::png(&bytes);
        assert_eq!(inline.decode().expect("valid base64"), bytes);

        let broken = InlineImage {
            mime_type: "image/png".to_owned(),
            data: "not base64!!".to_owned(),
        };
        assert!(matches!(broken.decode(), Err(EditError::Decode(_))));
    }

    #[test]
    fn gray_png_keeps_dimensions_and_values() {
        let mut mask = GrayImage::new(4, 5);
        mask.put_pixel(1, 2, Luma([255]));
        let png = encode_png_gray(&mask).expect("encode");
        let back = image::load_from_memory(&png).expect("decode").to_luma8();
        assert_eq!(back.dimensions(), (4, 5));
        assert_eq!(back.get_pixel(1, 2).0, [255]);
        assert_eq!(back.get_pixel(0, 0).0, [0]);
    }

    #[test]
    fn mime_parameters_do_not_break_extension() {
        let inline = InlineImage {
            mime_type: "image/webp; charset=binary".to_owned(),
            data: String::new(),
        };
        assert_eq!(inline.extension(), "webp");
    }
}
