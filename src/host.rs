//! The narrow slice of the host platform Eidolon consumes.
//!
//! A host supplies drawing surfaces, a clock, one-shot timers, image decoding
//! and input delivery. `browser` implements it on top of web-sys, `headless`
//! implements it in memory.
use crate::input::InputEvent;
use anyhow::{anyhow, Result};
use std::rc::Rc;

// ==================== Value Types ====================
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// red, green, blue, alpha
pub type Rgba = [u8; 4];

/// What the host reports about a piece of text laid out in the current font.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextMetrics {
    pub width: f64,
    pub ascent: f64,
    pub descent: f64,
}

/// Decoded RGBA copy of an image, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(anyhow!(
                "pixel buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `None` when (x, y) falls outside the buffer
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.data[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Opaque handle of an armed host timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerHandle(pub i32);

// ==================== Host Traits ====================
pub trait HostImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// A 2D drawing surface with ambient style state (fill/stroke color, font,
/// line width). Style setters affect every later draw call until changed.
pub trait Surface {
    type Image: HostImage;

    fn width(&self) -> u32;
    fn height(&self) -> u32;

    fn set_fill_style(&mut self, color: &str);
    fn set_stroke_style(&mut self, color: &str);
    fn set_font(&mut self, font: &str);
    fn set_line_width(&mut self, width: f64);

    fn fill_rect(&mut self, rect: Rect);
    /// region blit: `src` of `image` is stretched onto `dest`
    fn draw_image(&mut self, image: &Self::Image, src: Rect, dest: Rect) -> Result<()>;
    fn stroke_line(&mut self, from: Point, to: Point);
    fn put_pixel(&mut self, x: i32, y: i32, rgba: Rgba) -> Result<()>;
    fn fill_text(&mut self, text: &str, at: Point) -> Result<()>;
    fn stroke_text(&mut self, text: &str, at: Point) -> Result<()>;
    fn measure_text(&self, text: &str) -> Result<TextMetrics>;

    /// Copy all of `source` onto all of `self`, stretching as needed.
    fn composite_from(&mut self, source: &Self) -> Result<()>;
}

pub trait Host: 'static {
    type Image: HostImage + 'static;
    type Surface: Surface<Image = Self::Image> + 'static;

    /// The already-sized display surface identified by `element_id`.
    fn onscreen(&self, element_id: &str) -> Result<Self::Surface>;
    fn offscreen(&self, width: u32, height: u32) -> Result<Self::Surface>;

    /// Wall-clock milliseconds; only differences are meaningful.
    fn now_ms(&self) -> f64;
    /// Run `callback` once, `delay_ms` from now, on the same thread.
    fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> Result<TimerHandle>;

    /// Start decoding `source`. `on_load` is invoked later, at most once, on
    /// success. Failures are never reported.
    fn request_image(&self, source: &str, on_load: Box<dyn FnOnce()>) -> Result<Self::Image>;
    fn image_pixels(&self, image: &Self::Image) -> Result<PixelBuffer>;

    /// Route pointer and keyboard events for `element_id` into `sink`.
    fn attach_input(&self, element_id: &str, sink: Rc<dyn Fn(InputEvent)>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_buffer_rejects_wrong_length() {
        assert!(PixelBuffer::new(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn pixel_buffer_reads_row_major() {
        let mut data = vec![0; 2 * 2 * 4];
        // (1, 1) is the last pixel
        data[12..16].copy_from_slice(&[9, 8, 7, 6]);
        let buffer = PixelBuffer::new(2, 2, data).unwrap();
        assert_eq!(buffer.pixel(1, 1), Some([9, 8, 7, 6]));
        assert_eq!(buffer.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(buffer.pixel(2, 0), None);
        assert_eq!(buffer.pixel(-1, 0), None);
    }
}
