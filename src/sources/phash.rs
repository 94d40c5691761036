use anyhow::{Context, Result};
use image::{DynamicImage, RgbaImage};
use image_hasher::{HashAlg, HasherConfig};

/// Raw RGBA clipboard image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

impl ClipboardImage {
    pub fn to_dynamic_image(&self) -> Result<DynamicImage> {
        let width = u32::try_from(self.width).context("image width out of range")?;
        let height = u32::try_from(self.height).context("image height out of range")?;
        let buffer = RgbaImage::from_raw(width, height, self.rgba.clone())
            .context("clipboard image buffer does not match its dimensions")?;
        Ok(DynamicImage::ImageRgba8(buffer))
    }
}

/// Perceptual fingerprint used to tell whether the clipboard image changed.
///
/// Dimensions are part of the fingerprint so a resized copy counts as new.
pub fn fingerprint_image(image: &DynamicImage) -> String {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(16, 16)
        .to_hasher();

    let hash = hasher.hash_image(image);
    format!("{}x{}:{}", image.width(), image.height(), hash.to_base64())
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, image::ImageFormat::Png)
        .context("failed to encode clipboard image as PNG")?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(size: usize, invert: bool) -> ClipboardImage {
        let mut rgba = Vec::with_capacity(size * size * 4);
        for y in 0..size {
            for x in 0..size {
                let on = ((x / 4 + y / 4) % 2 == 0) != invert;
                let v = if on { 255 } else { 0 };
                rgba.extend_from_slice(&[v, v, v, 255]);
            }
        }
        ClipboardImage {
            width: size,
            height: size,
            rgba,
        }
    }

    #[test]
    fn identical_images_share_a_fingerprint() {
        let a = checkerboard(32, false).to_dynamic_image().unwrap();
        let b = checkerboard(32, false).to_dynamic_image().unwrap();
        assert_eq!(fingerprint_image(&a), fingerprint_image(&b));
    }

    #[test]
    fn different_sizes_differ() {
        let a = checkerboard(32, false).to_dynamic_image().unwrap();
        let b = checkerboard(64, false).to_dynamic_image().unwrap();
        assert_ne!(fingerprint_image(&a), fingerprint_image(&b));
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let image = ClipboardImage {
            width: 10,
            height: 10,
            rgba: vec![0; 12],
        };
        assert!(image.to_dynamic_image().is_err());
    }

    #[test]
    fn encodes_png_signature() {
        let image = checkerboard(8, false).to_dynamic_image().unwrap();
        let png = encode_png(&image).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
