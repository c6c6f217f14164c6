//! Image decode/encode helpers shared by the preview and HD paths.

use bytes::Bytes;
use image::{GrayImage, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

use crate::error::CompositeError;

/// Output formats produced by the service. Previews are JPEG, HD renders and
/// masks are PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
}

impl OutputFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Jpeg => ImageFormat::Jpeg,
        }
    }
}

/// Encoded image bytes plus the dimensions recorded on the stored reference.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Bytes,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

fn decode(data: &[u8]) -> Result<image::DynamicImage, CompositeError> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| CompositeError::Decode(image::ImageError::IoError(e)))?
        .decode()
        .map_err(CompositeError::Decode)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(CompositeError::EmptyImage);
    }
    Ok(img)
}

pub fn decode_rgb(data: &[u8]) -> Result<RgbImage, CompositeError> {
    Ok(decode(data)?.to_rgb8())
}

/// Decode a mask. Colour masks are reduced to luma.
pub fn decode_luma(data: &[u8]) -> Result<GrayImage, CompositeError> {
    Ok(decode(data)?.to_luma8())
}

pub fn dimensions(data: &[u8]) -> Result<(u32, u32), CompositeError> {
    let img = decode(data)?;
    Ok((img.width(), img.height()))
}

pub fn encode_rgb(img: &RgbImage, format: OutputFormat) -> Result<EncodedImage, CompositeError> {
    let mut buffer = Vec::with_capacity((img.width() * img.height() * 3) as usize);
    img.write_to(&mut Cursor::new(&mut buffer), format.image_format())
        .map_err(CompositeError::Encode)?;
    Ok(EncodedImage {
        data: Bytes::from(buffer),
        format,
        width: img.width(),
        height: img.height(),
    })
}

pub fn encode_mask(mask: &GrayImage) -> Result<EncodedImage, CompositeError> {
    let mut buffer = Vec::new();
    mask.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(CompositeError::Encode)?;
    Ok(EncodedImage {
        data: Bytes::from(buffer),
        format: OutputFormat::Png,
        width: mask.width(),
        height: mask.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_png_round_trip_keeps_pixels() {
        let img = RgbImage::from_pixel(7, 5, Rgb([10, 200, 30]));
        let encoded = encode_rgb(&img, OutputFormat::Png).unwrap();
        assert_eq!((encoded.width, encoded.height), (7, 5));
        assert_eq!(decode_rgb(&encoded.data).unwrap(), img);
    }

    #[test]
    fn test_jpeg_encoding_keeps_dimensions() {
        let img = RgbImage::from_pixel(33, 17, Rgb([120, 120, 120]));
        let encoded = encode_rgb(&img, OutputFormat::Jpeg).unwrap();
        assert_eq!(encoded.format.content_type(), "image/jpeg");
        assert_eq!(dimensions(&encoded.data).unwrap(), (33, 17));
    }

    #[test]
    fn test_colour_mask_decodes_to_luma() {
        let img = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        let encoded = encode_rgb(&img, OutputFormat::Png).unwrap();
        let mask = decode_luma(&encoded.data).unwrap();
        assert!(mask.pixels().all(|p| *p == Luma([255])));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(matches!(
            decode_rgb(b"definitely not an image"),
            Err(CompositeError::Decode(_))
        ));
    }
}
