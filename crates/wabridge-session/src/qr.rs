//! QR pairing code publication.
//!
//! The raw pairing payload is rendered as a medium error-correction QR PNG
//! of at least 256 px and published as a `data:image/png;base64,…` URL so a
//! UI can show it without touching the filesystem.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};

const TARGET_SIZE: u32 = 256;
const QUIET_ZONE_MODULES: u32 = 4;

/// Render a pairing payload as a PNG data URL.
///
/// Returns `None` when the payload does not fit into a QR code; the raw
/// string is still published in that case.
pub fn qr_png_data_url(payload: &str) -> Option<String> {
    if payload.is_empty() {
        return None;
    }

    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M).ok()?;
    let width = code.width() as u32;
    let colors = code.to_colors();

    let modules = width + 2 * QUIET_ZONE_MODULES;
    let scale = TARGET_SIZE.div_ceil(modules).max(1);
    let size = modules * scale;

    let mut img = GrayImage::from_pixel(size, size, Luma([0xFF]));
    for y in 0..width {
        for x in 0..width {
            if colors[(y * width + x) as usize] != Color::Dark {
                continue;
            }
            let px = (x + QUIET_ZONE_MODULES) * scale;
            let py = (y + QUIET_ZONE_MODULES) * scale;
            for dy in 0..scale {
                for dx in 0..scale {
                    img.put_pixel(px + dx, py + dy, Luma([0x00]));
                }
            }
        }
    }

    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .ok()?;

    Some(format!("data:image/png;base64,{}", BASE64.encode(&png)))
}
