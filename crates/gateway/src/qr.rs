use std::io::Cursor;

use {
    anyhow::{Result, anyhow, bail},
    image::{ImageFormat, Luma},
    qrcode::QrCode,
};

/// Smallest edge, in pixels, of a rendered pairing code.
const MIN_EDGE: u32 = 256;

/// Encode a pairing QR payload as a PNG image.
pub fn render_png(payload: &str) -> Result<Vec<u8>> {
    let payload = payload.trim();
    if payload.is_empty() {
        bail!("QR payload is empty");
    }

    let code = QrCode::new(payload.as_bytes())
        .map_err(|err| anyhow!("failed to encode QR payload: {err}"))?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(MIN_EDGE, MIN_EDGE)
        .quiet_zone(true)
        .build();

    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    #[test]
    fn renders_png() {
        let png = render_png("2@abcdefghijklmnop,qrstuvwxyz==,0123456789==").unwrap();
        assert!(png.starts_with(PNG_MAGIC));

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert!(decoded.width() >= MIN_EDGE);
        assert_eq!(decoded.width(), decoded.height());
    }

    #[test]
    fn empty_payload_is_rejected() {
        assert!(render_png("   ").is_err());
    }
}
