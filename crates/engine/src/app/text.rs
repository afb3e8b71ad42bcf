//! Minimal 3x5 bitmap font used for message boxes.

use super::surface::Color;

pub(crate) const GLYPH_WIDTH: i32 = 3;
pub(crate) const GLYPH_HEIGHT: i32 = 5;

type Glyph = [u8; GLYPH_HEIGHT as usize];

const BLANK: Glyph = [0, 0, 0, 0, 0];

const DIGITS: [Glyph; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

const LETTERS: [Glyph; 26] = [
    [0b010, 0b101, 0b111, 0b101, 0b101],
    [0b110, 0b101, 0b110, 0b101, 0b110],
    [0b111, 0b100, 0b100, 0b100, 0b111],
    [0b110, 0b101, 0b101, 0b101, 0b110],
    [0b111, 0b100, 0b110, 0b100, 0b111],
    [0b111, 0b100, 0b110, 0b100, 0b100],
    [0b111, 0b100, 0b101, 0b101, 0b111],
    [0b101, 0b101, 0b111, 0b101, 0b101],
    [0b111, 0b010, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b001, 0b101, 0b111],
    [0b101, 0b101, 0b110, 0b101, 0b101],
    [0b100, 0b100, 0b100, 0b100, 0b111],
    [0b101, 0b111, 0b111, 0b101, 0b101],
    [0b101, 0b111, 0b111, 0b111, 0b101],
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b110, 0b101, 0b110, 0b100, 0b100],
    [0b111, 0b101, 0b101, 0b111, 0b001],
    [0b110, 0b101, 0b110, 0b101, 0b101],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b010, 0b010, 0b010, 0b010],
    [0b101, 0b101, 0b101, 0b101, 0b111],
    [0b101, 0b101, 0b101, 0b101, 0b010],
    [0b101, 0b101, 0b111, 0b111, 0b101],
    [0b101, 0b101, 0b010, 0b101, 0b101],
    [0b101, 0b101, 0b010, 0b010, 0b010],
    [0b111, 0b001, 0b010, 0b100, 0b111],
];

fn glyph_for(ch: char) -> Glyph {
    match ch {
        '0'..='9' => DIGITS[(ch as u8 - b'0') as usize],
        'A'..='Z' => LETTERS[(ch as u8 - b'A') as usize],
        'a'..='z' => LETTERS[(ch as u8 - b'a') as usize],
        '!' => [0b010, 0b010, 0b010, 0b000, 0b010],
        '?' => [0b111, 0b001, 0b011, 0b000, 0b010],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '\'' => [0b010, 0b010, 0b000, 0b000, 0b000],
        _ => BLANK,
    }
}

/// Writes `line` into a top-down RGBA buffer, clipping at every edge.
#[allow(clippy::too_many_arguments)]
pub(crate) fn draw_text_rows(
    rgba: &mut [u8],
    width: u32,
    height: u32,
    left: i32,
    top: i32,
    line: &str,
    color: Color,
    scale: i32,
) {
    let scale = scale.max(1);
    let advance = (GLYPH_WIDTH + 1) * scale;
    let mut x = left;
    for ch in line.chars() {
        draw_glyph(rgba, width, height, x, top, glyph_for(ch), color, scale);
        x += advance;
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_glyph(
    rgba: &mut [u8],
    width: u32,
    height: u32,
    x: i32,
    y: i32,
    glyph: Glyph,
    color: Color,
    scale: i32,
) {
    let width_i32 = width as i32;
    let height_i32 = height as i32;
    for (row_index, row_bits) in glyph.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if row_bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            for sy in 0..scale {
                let py = y + row_index as i32 * scale + sy;
                if py < 0 || py >= height_i32 {
                    continue;
                }
                for sx in 0..scale {
                    let px = x + col * scale + sx;
                    if px < 0 || px >= width_i32 {
                        continue;
                    }
                    let offset = (py as usize * width as usize + px as usize) * 4;
                    rgba[offset..offset + 4].copy_from_slice(&color);
                }
            }
        }
    }
}
