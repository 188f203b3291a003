//! QR code rendering for extracted links.
//!
//! Produces a PNG with error-correction level H so a small badge carrying the
//! overlay caption can sit in the centre without breaking scanning.

use std::io::Cursor;
use std::ops::RangeInclusive;

use image::{ImageFormat, Rgb, RgbImage};
use qrcode::{EcLevel, QrCode};
use thiserror::Error;

/// Rendering failures. None of these abort forwarding.
#[derive(Debug, Error)]
pub enum QrError {
    #[error("QR encoding failed: {0}")]
    Encode(#[from] qrcode::types::QrError),

    #[error("PNG encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Accepted pixels per module.
pub const BOX_SIZE_RANGE: RangeInclusive<u32> = 1..=50;
/// Accepted quiet zone widths, in modules.
pub const MARGIN_RANGE: RangeInclusive<u32> = 0..=16;

/// Static styling for rendered codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrStyle {
    pub foreground: [u8; 3],
    pub background: [u8; 3],
    /// Pixels per module.
    pub box_size: u32,
    /// Quiet zone width in modules.
    pub margin: u32,
    /// Short caption drawn in the centre badge. Empty disables the badge.
    pub overlay: String,
}

impl Default for QrStyle {
    fn default() -> Self {
        Self {
            foreground: [0x00, 0x00, 0x00],
            background: [0xFF, 0xFF, 0xFF],
            box_size: 10,
            margin: 4,
            overlay: "SCAN".to_string(),
        }
    }
}

/// Parse a `#RRGGBB` (or `RRGGBB`) colour.
pub fn parse_hex_color(input: &str) -> Option<[u8; 3]> {
    let hex = input.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// Render `link` as a PNG image.
pub fn render_link(link: &str, style: &QrStyle) -> Result<Vec<u8>, QrError> {
    let code = QrCode::with_error_correction_level(link.as_bytes(), EcLevel::H)?;
    let box_size = style.box_size.clamp(*BOX_SIZE_RANGE.start(), *BOX_SIZE_RANGE.end());

    let modules = code
        .render::<Rgb<u8>>()
        .quiet_zone(false)
        .module_dimensions(box_size, box_size)
        .dark_color(Rgb(style.foreground))
        .light_color(Rgb(style.background))
        .build();

    let pad = style.margin.min(*MARGIN_RANGE.end()) * box_size;
    let mut canvas = RgbImage::from_pixel(
        modules.width() + 2 * pad,
        modules.height() + 2 * pad,
        Rgb(style.background),
    );
    image::imageops::replace(&mut canvas, &modules, pad as i64, pad as i64);

    if !style.overlay.trim().is_empty() {
        draw_badge(&mut canvas, modules.width(), style);
    }

    let mut bytes = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
/// Badge may span at most this share of the code's width (in percent).
const BADGE_MAX_WIDTH_PCT: u32 = 40;

/// Draw the overlay caption in a bordered box at the centre of the canvas.
fn draw_badge(canvas: &mut RgbImage, code_width: u32, style: &QrStyle) {
    let text: Vec<char> = style.overlay.trim().to_uppercase().chars().collect();
    let max_width = code_width * BADGE_MAX_WIDTH_PCT / 100;

    // Largest scale whose text fits, then drop characters if even scale 1 is too wide.
    let text_width = |n: usize, scale: u32| n as u32 * (GLYPH_W + 1) * scale - scale;
    let mut scale = (style.box_size / 3).max(1);
    while scale > 1 && text_width(text.len(), scale) + 4 * scale > max_width {
        scale -= 1;
    }
    let mut count = text.len();
    while count > 0 && text_width(count, scale) + 4 * scale > max_width {
        count -= 1;
    }
    if count == 0 {
        return;
    }

    let inner_w = text_width(count, scale);
    let inner_h = GLYPH_H * scale;
    let pad = 2 * scale;
    let badge_w = inner_w + 2 * pad;
    let badge_h = inner_h + 2 * pad;
    let x0 = (canvas.width() - badge_w) / 2;
    let y0 = (canvas.height() - badge_h) / 2;

    let fg = Rgb(style.foreground);
    let bg = Rgb(style.background);
    for y in y0..y0 + badge_h {
        for x in x0..x0 + badge_w {
            let edge = x < x0 + scale
                || x >= x0 + badge_w - scale
                || y < y0 + scale
                || y >= y0 + badge_h - scale;
            canvas.put_pixel(x, y, if edge { fg } else { bg });
        }
    }

    for (i, c) in text.iter().take(count).enumerate() {
        let gx = x0 + pad + i as u32 * (GLYPH_W + 1) * scale;
        let rows = glyph(*c);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        canvas.put_pixel(
                            gx + col * scale + dx,
                            y0 + pad + row as u32 * scale + dy,
                            fg,
                        );
                    }
                }
            }
        }
    }
}

/// 5x7 bitmap rows for the badge font (uppercase ASCII, digits, a few symbols).
fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        ' ' => [0x00; 7],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: &str = "https://app.binance.com/uni-qr/cart/12345";

    #[test]
    fn test_render_png_dimensions() {
        let style = QrStyle::default();
        let png = render_link(LINK, &style).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let modules = QrCode::with_error_correction_level(LINK.as_bytes(), EcLevel::H)
            .unwrap()
            .width() as u32;
        let img = image::load_from_memory(&png).unwrap().to_rgb8();
        let side = (modules + 2 * style.margin) * style.box_size;
        assert_eq!(img.dimensions(), (side, side));
        assert_eq!(img.get_pixel(0, 0), &Rgb(style.background));
    }

    #[test]
    fn test_render_is_deterministic() {
        let style = QrStyle {
            foreground: [0x12, 0x34, 0x56],
            overlay: "Answer!".into(),
            ..QrStyle::default()
        };
        assert_eq!(render_link(LINK, &style).unwrap(), render_link(LINK, &style).unwrap());
    }

    #[test]
    fn test_badge_uses_foreground() {
        let style = QrStyle {
            foreground: [200, 0, 0],
            ..QrStyle::default()
        };
        let img = image::load_from_memory(&render_link(LINK, &style).unwrap())
            .unwrap()
            .to_rgb8();
        let (w, h) = img.dimensions();
        let centre_row: Vec<_> = (0..w).map(|x| *img.get_pixel(x, h / 2)).collect();
        assert!(centre_row.contains(&Rgb([200, 0, 0])));
    }

    #[test]
    fn test_oversized_payload_fails() {
        let huge = "x".repeat(4000);
        assert!(matches!(
            render_link(&huge, &QrStyle::default()),
            Err(QrError::Encode(_))
        ));
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#FF8000"), Some([255, 128, 0]));
        assert_eq!(parse_hex_color("00ff00"), Some([0, 255, 0]));
        assert_eq!(parse_hex_color("#FFF"), None);
        assert_eq!(parse_hex_color("zzzzzz"), None);
    }
}
