//! Software draw surfaces.
//!
//! Pixels are stored as RGBA rows from the top down, while every placement
//! API takes y-up coordinates with the origin at the bottom-left corner, the
//! same convention used for world and map positions.

use tracing::warn;

use super::geometry::{Rect, Vec2};
use super::text::{draw_text_rows, GLYPH_HEIGHT};

pub type Color = [u8; 4];

pub const TRANSPARENT: Color = [0, 0, 0, 0];

/// Largest width or height, in pixels, of any surface or bitmap.
pub const MAX_SURFACE_SIDE: u32 = 8192;

/// Byte length of a `width` x `height` RGBA buffer, or `None` past
/// [`MAX_SURFACE_SIDE`].
pub(crate) fn rgba_len(width: u32, height: u32) -> Option<usize> {
    if width > MAX_SURFACE_SIDE || height > MAX_SURFACE_SIDE {
        return None;
    }
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(4)
}

/// Falls back to an empty buffer when the size is out of range.
fn checked_dimensions(kind: &'static str, width: u32, height: u32) -> (u32, u32, usize) {
    match rgba_len(width, height) {
        Some(len) => (width, height, len),
        None => {
            warn!(kind, width, height, max = MAX_SURFACE_SIDE, "oversized_surface_emptied");
            (0, 0, 0)
        }
    }
}

/// A decoded image, rows stored top-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Bitmap {
    /// Returns `None` when `rgba` does not hold exactly `width * height` pixels.
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        if rgba_len(width, height) != Some(rgba.len()) {
            return None;
        }
        Some(Self {
            width,
            height,
            rgba,
        })
    }

    /// Sizes past [`MAX_SURFACE_SIDE`] produce an empty bitmap.
    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        let (width, height, len) = checked_dimensions("bitmap", width, height);
        let mut rgba = Vec::with_capacity(len);
        for _ in 0..len / 4 {
            rgba.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            rgba,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width as f32, self.height as f32)
    }

    /// Pixel at storage coordinates (row 0 is the top row).
    pub fn pixel(&self, x: u32, row: u32) -> Option<Color> {
        if x >= self.width || row >= self.height {
            return None;
        }
        let offset = (row as usize * self.width as usize + x as usize) * 4;
        let mut color = TRANSPARENT;
        color.copy_from_slice(&self.rgba[offset..offset + 4]);
        Some(color)
    }

    pub(crate) fn copy_tile_into(
        &self,
        dst: &mut Bitmap,
        src_left: u32,
        src_top: u32,
        tile_width: u32,
        tile_height: u32,
        dst_left: i32,
        dst_top: i32,
    ) {
        for ty in 0..tile_height {
            let src_row = src_top + ty;
            let dst_row = dst_top + ty as i32;
            if src_row >= self.height || dst_row < 0 || dst_row >= dst.height as i32 {
                continue;
            }
            for tx in 0..tile_width {
                let src_x = src_left + tx;
                let dst_x = dst_left + tx as i32;
                if src_x >= self.width || dst_x < 0 || dst_x >= dst.width as i32 {
                    continue;
                }
                let src_offset = (src_row as usize * self.width as usize + src_x as usize) * 4;
                let dst_offset = (dst_row as usize * dst.width as usize + dst_x as usize) * 4;
                write_if_opaque(&mut dst.rgba, dst_offset, &self.rgba[src_offset..src_offset + 4]);
            }
        }
    }
}

/// A fixed-size RGBA canvas that views and scenes draw into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Surface {
    /// Sizes past [`MAX_SURFACE_SIDE`] produce an empty surface.
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height, len) = checked_dimensions("surface", width, height);
        Self {
            width,
            height,
            rgba: vec![0; len],
        }
    }

    /// Sized to cover `rect`, rounding fractional extents up.
    pub fn sized_for(rect: &Rect) -> Self {
        let width = rect.width().max(0.0).ceil() as u32;
        let height = rect.height().max(0.0).ceil() as u32;
        Self::new(width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width as f32, self.height as f32)
    }

    pub fn clear(&mut self, color: Color) {
        for chunk in self.rgba.chunks_exact_mut(4) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Pixel at y-up coordinates.
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let row = self.height - 1 - y;
        let offset = (row as usize * self.width as usize + x as usize) * 4;
        let mut color = TRANSPARENT;
        color.copy_from_slice(&self.rgba[offset..offset + 4]);
        Some(color)
    }

    /// Draws `bitmap` centred on `center`.
    pub fn draw_bitmap_centered(&mut self, bitmap: &Bitmap, center: Vec2) {
        let left = (center.x - bitmap.width as f32 * 0.5).round() as i32;
        let bottom = (center.y - bitmap.height as f32 * 0.5).round() as i32;
        let top = self.height as i32 - (bottom + bitmap.height as i32);
        blit(
            &mut self.rgba,
            self.width,
            self.height,
            &bitmap.rgba,
            bitmap.width,
            bitmap.height,
            left,
            top,
        );
    }

    /// Samples `region` (y-up, in bitmap pixels) of `bitmap` 1:1 onto the
    /// surface, anchoring the region's bottom-left at the surface's.
    pub fn draw_bitmap_region(&mut self, bitmap: &Bitmap, region: &Rect) {
        let src_left = region.min.x.floor() as i32;
        let src_top = (bitmap.height as f32 - region.max.y).floor() as i32;
        let rows = (region.height().ceil() as i32).min(self.height as i32);
        let cols = (region.width().ceil() as i32).min(self.width as i32);
        let dst_top_offset = self.height as i32 - rows;

        for row in 0..rows {
            let src_row = src_top + row;
            if src_row < 0 || src_row >= bitmap.height as i32 {
                continue;
            }
            let dst_row = (dst_top_offset + row) as usize;
            for col in 0..cols {
                let src_x = src_left + col;
                if src_x < 0 || src_x >= bitmap.width as i32 {
                    continue;
                }
                let src_offset = (src_row as usize * bitmap.width as usize + src_x as usize) * 4;
                let dst_offset = (dst_row * self.width as usize + col as usize) * 4;
                write_if_opaque(
                    &mut self.rgba,
                    dst_offset,
                    &bitmap.rgba[src_offset..src_offset + 4],
                );
            }
        }
    }

    /// Composites another surface centred on `center`.
    pub fn draw_surface_centered(&mut self, source: &Surface, center: Vec2) {
        let left = (center.x - source.width as f32 * 0.5).round() as i32;
        let bottom = (center.y - source.height as f32 * 0.5).round() as i32;
        let top = self.height as i32 - (bottom + source.height as i32);
        blit(
            &mut self.rgba,
            self.width,
            self.height,
            &source.rgba,
            source.width,
            source.height,
            left,
            top,
        );
    }

    pub fn fill_rect(&mut self, rect: &Rect, color: Color) {
        let start_x = (rect.min.x.floor() as i32).max(0);
        let end_x = (rect.max.x.ceil() as i32).min(self.width as i32);
        let start_y = (rect.min.y.floor() as i32).max(0);
        let end_y = (rect.max.y.ceil() as i32).min(self.height as i32);
        if start_x >= end_x || start_y >= end_y {
            return;
        }
        for y in start_y..end_y {
            let row = (self.height as i32 - 1 - y) as usize;
            for x in start_x..end_x {
                let offset = (row * self.width as usize + x as usize) * 4;
                self.rgba[offset..offset + 4].copy_from_slice(&color);
            }
        }
    }

    /// Draws text with the built-in 3x5 font. Unlike the other placement
    /// calls, `left`/`top` are measured from the top-left corner, since text
    /// flows downwards.
    pub fn draw_text(&mut self, left: i32, top: i32, text: &str, color: Color, scale: i32) {
        let line_advance = (GLYPH_HEIGHT + 2) * scale.max(1);
        for (index, line) in text.lines().enumerate() {
            draw_text_rows(
                &mut self.rgba,
                self.width,
                self.height,
                left,
                top + index as i32 * line_advance,
                line,
                color,
                scale,
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn blit(
    dst: &mut [u8],
    dst_width: u32,
    dst_height: u32,
    src: &[u8],
    src_width: u32,
    src_height: u32,
    left: i32,
    top: i32,
) {
    let draw_left = left.max(0);
    let draw_top = top.max(0);
    let draw_right = (left + src_width as i32).min(dst_width as i32);
    let draw_bottom = (top + src_height as i32).min(dst_height as i32);
    if draw_left >= draw_right || draw_top >= draw_bottom {
        return;
    }

    for out_y in draw_top..draw_bottom {
        let src_row = (out_y - top) as usize;
        for out_x in draw_left..draw_right {
            let src_x = (out_x - left) as usize;
            let src_offset = (src_row * src_width as usize + src_x) * 4;
            let dst_offset = (out_y as usize * dst_width as usize + out_x as usize) * 4;
            write_if_opaque(dst, dst_offset, &src[src_offset..src_offset + 4]);
        }
    }
}

fn write_if_opaque(dst: &mut [u8], offset: usize, pixel: &[u8]) {
    if pixel[3] == 0 {
        return;
    }
    dst[offset..offset + 4].copy_from_slice(pixel);
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = [255, 0, 0, 255];
    const BLUE: Color = [0, 0, 255, 255];

    #[test]
    fn from_rgba_rejects_wrong_length() {
        assert!(Bitmap::from_rgba(2, 2, vec![0; 15]).is_none());
        assert!(Bitmap::from_rgba(2, 2, vec![0; 16]).is_some());
        assert!(Bitmap::from_rgba(u32::MAX, u32::MAX, Vec::new()).is_none());
    }

    #[test]
    fn oversized_buffers_come_back_empty() {
        let surface = Surface::sized_for(&Rect::from_size(1e12, 1e12));
        assert_eq!((surface.width(), surface.height()), (0, 0));
        assert!(surface.rgba().is_empty());

        let bitmap = Bitmap::filled(MAX_SURFACE_SIDE + 1, 1, RED);
        assert_eq!((bitmap.width(), bitmap.height()), (0, 0));
        assert_eq!(rgba_len(MAX_SURFACE_SIDE, 2), Some(MAX_SURFACE_SIDE as usize * 8));
    }

    #[test]
    fn pixel_at_uses_bottom_left_origin() {
        let mut surface = Surface::new(4, 4);
        surface.fill_rect(&Rect::new(0.0, 0.0, 1.0, 1.0), RED);

        assert_eq!(surface.pixel_at(0, 0), Some(RED));
        assert_eq!(surface.pixel_at(0, 3), Some(TRANSPARENT));
        assert_eq!(surface.pixel_at(4, 0), None);
    }

    #[test]
    fn centered_bitmap_is_clipped_at_edges() {
        let mut surface = Surface::new(4, 4);
        let sprite = Bitmap::filled(2, 2, BLUE);
        surface.draw_bitmap_centered(&sprite, Vec2::new(0.0, 0.0));

        assert_eq!(surface.pixel_at(0, 0), Some(BLUE));
        assert_eq!(surface.pixel_at(1, 0), Some(TRANSPARENT));
        assert_eq!(surface.pixel_at(0, 1), Some(TRANSPARENT));
    }

    #[test]
    fn transparent_source_pixels_are_skipped() {
        let mut surface = Surface::new(2, 2);
        surface.clear(RED);
        let ghost = Bitmap::filled(2, 2, TRANSPARENT);
        surface.draw_bitmap_centered(&ghost, Vec2::new(1.0, 1.0));

        assert_eq!(surface.pixel_at(0, 0), Some(RED));
        assert_eq!(surface.pixel_at(1, 1), Some(RED));
    }

    #[test]
    fn region_sampling_flips_rows_into_y_up_space() {
        // 2x2 bitmap: top row red, bottom row blue.
        let mut rgba = Vec::new();
        rgba.extend_from_slice(&RED);
        rgba.extend_from_slice(&RED);
        rgba.extend_from_slice(&BLUE);
        rgba.extend_from_slice(&BLUE);
        let bitmap = Bitmap::from_rgba(2, 2, rgba).expect("bitmap");

        let mut surface = Surface::new(2, 1);
        surface.draw_bitmap_region(&bitmap, &Rect::new(0.0, 0.0, 2.0, 1.0));
        assert_eq!(surface.pixel_at(0, 0), Some(BLUE));

        surface.draw_bitmap_region(&bitmap, &Rect::new(0.0, 1.0, 2.0, 2.0));
        assert_eq!(surface.pixel_at(1, 0), Some(RED));
    }

    #[test]
    fn surface_composite_lands_at_center() {
        let mut dest = Surface::new(6, 6);
        let mut panel = Surface::new(2, 2);
        panel.clear(RED);
        dest.draw_surface_centered(&panel, Vec2::new(3.0, 3.0));

        assert_eq!(dest.pixel_at(2, 2), Some(RED));
        assert_eq!(dest.pixel_at(3, 3), Some(RED));
        assert_eq!(dest.pixel_at(4, 4), Some(TRANSPARENT));
        assert_eq!(dest.pixel_at(1, 1), Some(TRANSPARENT));
    }

    #[test]
    fn text_drawing_never_writes_out_of_bounds() {
        let mut surface = Surface::new(3, 3);
        surface.draw_text(-5, -5, "HELLO\nWORLD", RED, 2);
        surface.draw_text(100, 100, "X", RED, 1);
        assert_eq!(surface.rgba().len(), 3 * 3 * 4);
    }
}
