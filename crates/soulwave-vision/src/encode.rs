use image::{codecs::jpeg::JpegEncoder, ColorType};
use soulwave_types::{vision::RGBA_CHANNELS, Result};

use crate::vision_error;

/// Encode packed RGBA pixels as a baseline JPEG. Alpha is dropped.
pub fn encode_jpeg(width: u32, height: u32, rgba: &[u8], quality: u8) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize * RGBA_CHANNELS;
    if rgba.len() != expected || expected == 0 {
        return Err(vision_error(format!(
            "cannot encode {}x{} from {} bytes",
            width,
            height,
            rgba.len()
        )));
    }

    let rgb: Vec<u8> = rgba
        .chunks_exact(RGBA_CHANNELS)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(&rgb, width, height, ColorType::Rgb8)
        .map_err(|err| vision_error(format!("jpeg encode failed: {err}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_decodable_jpeg() {
        let rgba = [90u8, 90, 90, 255].repeat(8 * 6);
        let bytes = encode_jpeg(8, 6, &rgba, 90).expect("encode");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).expect("decode").to_rgb8();
        assert_eq!(decoded.dimensions(), (8, 6));
        let px = decoded.get_pixel(3, 3);
        assert!((i16::from(px[0]) - 90).abs() <= 3);
    }

    #[test]
    fn rejects_empty_or_short_input() {
        assert!(encode_jpeg(0, 0, &[], 90).is_err());
        assert!(encode_jpeg(2, 2, &[0; 8], 90).is_err());
    }
}
