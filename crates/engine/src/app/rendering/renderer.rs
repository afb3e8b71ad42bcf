use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture};
use tracing::warn;
use winit::window::Window;

use crate::app::Surface;

/// Physical size of the window surface the frame is scaled onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Presents composed scene surfaces through a `pixels` frame buffer.
///
/// The buffer keeps the configured window size; `pixels` scales it onto
/// whatever physical size the window currently has.
pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    buffer_width: u32,
    buffer_height: u32,
    viewport: Viewport,
    warned_size_mismatch: bool,
}

impl Renderer {
    pub fn new(window: Arc<Window>, buffer_width: u32, buffer_height: u32) -> Result<Self, Error> {
        let size = window.inner_size();
        let viewport = Viewport {
            width: size.width,
            height: size.height,
        };
        let pixels =
            Self::build_pixels(Arc::clone(&window), buffer_width, buffer_height, viewport)?;
        Ok(Self {
            window,
            pixels,
            buffer_width,
            buffer_height,
            viewport,
            warned_size_mismatch: false,
        })
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.viewport = Viewport { width, height };
        self.pixels = Self::build_pixels(
            Arc::clone(&self.window),
            self.buffer_width,
            self.buffer_height,
            self.viewport,
        )?;
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        buffer_width: u32,
        buffer_height: u32,
        viewport: Viewport,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(viewport.width, viewport.height, window);
        Pixels::new(buffer_width, buffer_height, surface)
    }

    pub fn present(&mut self, surface: &Surface) -> Result<(), Error> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Ok(());
        }
        if !copy_surface_into(self.pixels.frame_mut(), surface) && !self.warned_size_mismatch {
            warn!(
                surface_width = surface.width(),
                surface_height = surface.height(),
                buffer_width = self.buffer_width,
                buffer_height = self.buffer_height,
                "present_size_mismatch"
            );
            self.warned_size_mismatch = true;
        }
        self.pixels.render()
    }
}

/// Copies when the sizes agree; otherwise leaves `frame` alone.
fn copy_surface_into(frame: &mut [u8], surface: &Surface) -> bool {
    let source = surface.rgba();
    if frame.len() != source.len() {
        return false;
    }
    frame.copy_from_slice(source);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_matching_surface() {
        let mut surface = Surface::new(2, 1);
        surface.clear([9, 8, 7, 255]);
        let mut frame = vec![0u8; 8];
        assert!(copy_surface_into(&mut frame, &surface));
        assert_eq!(frame, vec![9, 8, 7, 255, 9, 8, 7, 255]);
    }

    #[test]
    fn size_mismatch_leaves_frame_untouched() {
        let surface = Surface::new(2, 2);
        let mut frame = vec![1u8; 8];
        assert!(!copy_surface_into(&mut frame, &surface));
        assert_eq!(frame, vec![1u8; 8]);
    }
}
