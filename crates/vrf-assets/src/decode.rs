use image::ImageError;

use vrf_core::Image;

use crate::error::AssetError;

/// Decode a compressed image file (PNG, JPEG, ...) into RGBA8.
pub fn decode_image(name: &str, bytes: &[u8]) -> Result<Image, AssetError> {
    let img = image::load_from_memory(bytes).map_err(|e| match e {
        ImageError::Unsupported(_) => AssetError::UnsupportedFormat(name.to_string()),
        other => AssetError::TextureDecode(name.to_string(), other.to_string()),
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Image::from_rgba(name, width, height, rgba.into_raw())
        .ok_or_else(|| AssetError::TextureDecode(name.to_string(), "pixel buffer size mismatch".into()))
}

/// Convert packed ARGB8888 pixels to an RGBA8 image.
pub fn image_from_argb(name: &str, width: u32, height: u32, pixels: &[u32]) -> Result<Image, AssetError> {
    let expected = (width as usize).checked_mul(height as usize);
    if expected != Some(pixels.len()) {
        return Err(AssetError::TextureDecode(
            name.to_string(),
            format!("expected {}x{} pixels, got {}", width, height, pixels.len()),
        ));
    }
    let mut rgba = Vec::with_capacity(pixels.len() * 4);
    for &argb in pixels {
        let [a, r, g, b] = argb.to_be_bytes();
        rgba.extend_from_slice(&[r, g, b, a]);
    }
    Image::from_rgba(name, width, height, rgba)
        .ok_or_else(|| AssetError::TextureDecode(name.to_string(), "pixel buffer size mismatch".into()))
}

#[cfg(test)]
pub(crate) fn encode_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png() {
        let png = encode_png(3, 2, [10, 20, 30, 255]);
        let img = decode_image("t.png", &png).unwrap();
        assert_eq!((img.width, img.height), (3, 2));
        assert_eq!(img.pixel(2, 1), Some([10, 20, 30, 255]));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode_image("junk.png", b"definitely not an image").is_err());
    }

    #[test]
    fn argb_is_reordered() {
        let img = image_from_argb("e", 1, 1, &[0x80_11_22_33]).unwrap();
        assert_eq!(img.pixel(0, 0), Some([0x11, 0x22, 0x33, 0x80]));
        assert!(image_from_argb("e", 2, 2, &[0; 3]).is_err());
    }

    #[test]
    fn huge_argb_dimensions_are_an_error() {
        let err = image_from_argb("e", 70_000, 70_000, &[0u32; 4]).unwrap_err();
        assert!(matches!(err, AssetError::TextureDecode(..)));
        assert!(image_from_argb("e", u32::MAX, u32::MAX, &[]).is_err());
    }
}
