//! Bitmap I/O collaborator.
//!
//! Texture packing needs to read source bitmaps pixel by pixel and write the
//! synthesized results; [`BitmapProvider`] isolates that from the pipeline so
//! tests can run against in-memory images.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};
use rootcause::Report;

use crate::export::texture::{ImageFormat, TextureError};

pub trait BitmapProvider {
    /// Decode the bitmap at `path` into RGBA8 pixels.
    fn load(&self, path: &Path) -> Result<RgbaImage, Report<TextureError>>;

    /// Raw file contents, used when an image is embedded without re-encoding.
    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, Report<TextureError>>;

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn encode(
        &self,
        image: &RgbaImage,
        format: ImageFormat,
        quality: u8,
    ) -> Result<Vec<u8>, Report<TextureError>> {
        encode_image(image, format, quality)
    }

    fn save(
        &self,
        image: &RgbaImage,
        path: &Path,
        format: ImageFormat,
        quality: u8,
    ) -> Result<(), Report<TextureError>> {
        let bytes = self.encode(image, format, quality)?;
        std::fs::write(path, bytes).map_err(|e| {
            Report::new(TextureError::Write {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), Report<TextureError>> {
        std::fs::copy(from, to).map(|_| ()).map_err(|e| {
            Report::new(TextureError::Write {
                path: to.display().to_string(),
                reason: e.to_string(),
            })
        })
    }
}

/// Encode RGBA8 pixels as PNG or JPEG. JPEG drops the alpha channel.
pub fn encode_image(
    image: &RgbaImage,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, Report<TextureError>> {
    let mut buf = Vec::new();
    let result = match format {
        ImageFormat::Png => PngEncoder::new(&mut buf).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        ),
        ImageFormat::Jpeg => {
            let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
        }
    };
    result.map_err(|e| {
        Report::new(TextureError::Encode {
            format,
            reason: e.to_string(),
        })
    })?;
    Ok(buf)
}

/// Bitmap provider backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsBitmaps;

impl FsBitmaps {
    #[cfg(feature = "dds")]
    fn load_dds(bytes: &[u8]) -> Result<RgbaImage, Report<TextureError>> {
        let dds = image_dds::ddsfile::Dds::read(&mut Cursor::new(bytes))
            .map_err(|e| Report::new(TextureError::DdsParse(e.to_string())))?;

        image_dds::image_from_dds(&dds, 0)
            .map_err(|e| Report::new(TextureError::DdsDecode(e.to_string())))
    }

    #[cfg(not(feature = "dds"))]
    fn load_dds(_bytes: &[u8]) -> Result<RgbaImage, Report<TextureError>> {
        Err(Report::new(TextureError::DdsDecode(
            "built without the `dds` feature".to_string(),
        )))
    }
}

impl BitmapProvider for FsBitmaps {
    fn load(&self, path: &Path) -> Result<RgbaImage, Report<TextureError>> {
        let bytes = self.read_bytes(path)?;
        let is_dds = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("dds"));
        if is_dds {
            return Self::load_dds(&bytes);
        }

        let decoded = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| e.to_string())
            .and_then(|reader| reader.decode().map_err(|e| e.to_string()))
            .map_err(|reason| {
                Report::new(TextureError::Load {
                    path: path.display().to_string(),
                    reason,
                })
            })?;
        Ok(decoded.to_rgba8())
    }

    fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, Report<TextureError>> {
        std::fs::read(path).map_err(|e| {
            Report::new(TextureError::Load {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_encoding_round_trips_pixels() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 128]));
        img.put_pixel(1, 0, image::Rgba([0, 255, 0, 255]));

        let bytes = encode_image(&img, ImageFormat::Png, 100).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }

    #[test]
    fn jpeg_encoding_drops_alpha() {
        let img = RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 0]));
        let bytes = encode_image(&img, ImageFormat::Jpeg, 90).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let err = FsBitmaps.load(Path::new("/nonexistent/texture.png")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/texture.png"));
    }
}
