//! In-memory host
//! - software RGBA surfaces (nearest-neighbour scaling, no blending)
//! - a manual clock and a queue of one-shot timers
//! - image decodes that complete only when told to
//!
//! Used by the test suite; also handy for running a frame function offscreen.
use crate::host::{Host, HostImage, PixelBuffer, Point, Rect, Rgba, Surface, TextMetrics, TimerHandle};
use crate::input::InputEvent;
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

const TRANSPARENT: Rgba = [0, 0, 0, 0];
const BLACK: Rgba = [0, 0, 0, 255];
// width of one glyph relative to the font size, for measure_text
const GLYPH_ASPECT: f64 = 0.6;
const DEFAULT_FONT: &str = "10px sans-serif";

static NAMED_COLORS: Lazy<HashMap<&'static str, Rgba>> = Lazy::new(|| {
    HashMap::from([
        ("transparent", TRANSPARENT),
        ("black", BLACK),
        ("white", [255, 255, 255, 255]),
        ("red", [255, 0, 0, 255]),
        ("green", [0, 128, 0, 255]),
        ("lime", [0, 255, 0, 255]),
        ("blue", [0, 0, 255, 255]),
        ("yellow", [255, 255, 0, 255]),
        ("cyan", [0, 255, 255, 255]),
        ("magenta", [255, 0, 255, 255]),
        ("gray", [128, 128, 128, 255]),
        ("grey", [128, 128, 128, 255]),
        ("orange", [255, 165, 0, 255]),
        ("purple", [128, 0, 128, 255]),
    ])
});

/// CSS-ish color: a few names, `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn parse_color(color: &str) -> Option<Rgba> {
    let color = color.trim().to_ascii_lowercase();
    if let Some(rgba) = NAMED_COLORS.get(color.as_str()) {
        return Some(*rgba);
    }
    let hex = color.strip_prefix('#')?;
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
    match hex.len() {
        3 => {
            let mut rgba = [0, 0, 0, 255];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                rgba[i] = v * 16 + v;
            }
            Some(rgba)
        }
        6 => Some([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255]),
        8 => Some([channel(0..2)?, channel(2..4)?, channel(4..6)?, channel(6..8)?]),
        _ => None,
    }
}

/// leading "<n>px" of a font string
fn font_px(font: &str) -> f64 {
    font.split_whitespace()
        .find_map(|part| part.strip_suffix("px")?.parse::<f64>().ok())
        .unwrap_or(10.0)
}

// ==================== Images ====================
#[derive(Debug, Clone)]
pub struct HeadlessImage {
    pixels: Rc<PixelBuffer>,
}

impl HostImage for HeadlessImage {
    fn width(&self) -> u32 {
        self.pixels.width()
    }

    fn height(&self) -> u32 {
        self.pixels.height()
    }
}

// ==================== Surface ====================
/// Text isn't rasterized; each call is recorded instead.
#[derive(Debug, Clone, PartialEq)]
pub enum TextOp {
    Fill {
        text: String,
        at: Point,
        font: String,
        color: String,
    },
    Stroke {
        text: String,
        at: Point,
        color: String,
        line_width: f64,
    },
}

pub struct HeadlessSurface {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    fill_style: String,
    stroke_style: String,
    font: String,
    line_width: f64,
    text_ops: Vec<TextOp>,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            fill_style: "black".into(),
            stroke_style: "black".into(),
            font: DEFAULT_FONT.into(),
            line_width: 1.0,
            text_ops: Vec::new(),
        }
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        let offset = self.offset(x, y)?;
        let px = &self.pixels[offset..offset + 4];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn text_ops(&self) -> &[TextOp] {
        &self.text_ops
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.width || y as u32 >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 4)
    }

    fn write(&mut self, x: i32, y: i32, rgba: Rgba) {
        if let Some(offset) = self.offset(x, y) {
            self.pixels[offset..offset + 4].copy_from_slice(&rgba);
        }
    }

    fn style_color(style: &str) -> Rgba {
        parse_color(style).unwrap_or_else(|| {
            log::warn!("headless: unsupported color '{}', using black", style);
            BLACK
        })
    }

    /// Nearest-neighbour copy of `src` (read through `sample`) onto `dest`.
    /// Fully transparent source pixels are skipped.
    fn blit(&mut self, src: Rect, dest: Rect, sample: impl Fn(i32, i32) -> Option<Rgba>) {
        if dest.width <= 0.0 || dest.height <= 0.0 {
            return;
        }
        let x_step = src.width / dest.width;
        let y_step = src.height / dest.height;
        let (x0, y0) = (dest.x.round() as i32, dest.y.round() as i32);
        let (x1, y1) = (
            (dest.x + dest.width).round() as i32,
            (dest.y + dest.height).round() as i32,
        );
        for dy in y0.max(0)..y1.min(self.height as i32) {
            for dx in x0.max(0)..x1.min(self.width as i32) {
                let sx = src.x + ((dx - x0) as f64 + 0.5) * x_step;
                let sy = src.y + ((dy - y0) as f64 + 0.5) * y_step;
                match sample(sx.floor() as i32, sy.floor() as i32) {
                    Some(rgba) if rgba[3] > 0 => self.write(dx, dy, rgba),
                    _ => {}
                }
            }
        }
    }

    fn stamp(&mut self, x: i32, y: i32, size: i32, rgba: Rgba) {
        let half = size / 2;
        for sy in (y - half)..(y - half + size.max(1)) {
            for sx in (x - half)..(x - half + size.max(1)) {
                self.write(sx, sy, rgba);
            }
        }
    }
}

impl Surface for HeadlessSurface {
    type Image = HeadlessImage;

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_fill_style(&mut self, color: &str) {
        self.fill_style = color.to_string();
    }

    fn set_stroke_style(&mut self, color: &str) {
        self.stroke_style = color.to_string();
    }

    fn set_font(&mut self, font: &str) {
        self.font = font.to_string();
    }

    fn set_line_width(&mut self, width: f64) {
        self.line_width = width;
    }

    fn fill_rect(&mut self, rect: Rect) {
        let rgba = Self::style_color(&self.fill_style);
        let (x0, y0) = (rect.x.round() as i32, rect.y.round() as i32);
        let (x1, y1) = (
            (rect.x + rect.width).round() as i32,
            (rect.y + rect.height).round() as i32,
        );
        for y in y0.max(0)..y1.min(self.height as i32) {
            for x in x0.max(0)..x1.min(self.width as i32) {
                self.write(x, y, rgba);
            }
        }
    }

    fn draw_image(&mut self, image: &HeadlessImage, src: Rect, dest: Rect) -> Result<()> {
        let pixels = image.pixels.clone();
        self.blit(src, dest, |x, y| pixels.pixel(x, y));
        Ok(())
    }

    // Bresenham, stamping a line_width square at every step
    fn stroke_line(&mut self, from: Point, to: Point) {
        let rgba = Self::style_color(&self.stroke_style);
        let size = self.line_width.round() as i32;
        let (mut x, mut y) = (from.x.round() as i32, from.y.round() as i32);
        let (x1, y1) = (to.x.round() as i32, to.y.round() as i32);
        let dx = (x1 - x).abs();
        let dy = -(y1 - y).abs();
        let sx = if x < x1 { 1 } else { -1 };
        let sy = if y < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.stamp(x, y, size, rgba);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    fn put_pixel(&mut self, x: i32, y: i32, rgba: Rgba) -> Result<()> {
        self.write(x, y, rgba);
        Ok(())
    }

    fn fill_text(&mut self, text: &str, at: Point) -> Result<()> {
        self.text_ops.push(TextOp::Fill {
            text: text.to_string(),
            at,
            font: self.font.clone(),
            color: self.fill_style.clone(),
        });
        Ok(())
    }

    fn stroke_text(&mut self, text: &str, at: Point) -> Result<()> {
        self.text_ops.push(TextOp::Stroke {
            text: text.to_string(),
            at,
            color: self.stroke_style.clone(),
            line_width: self.line_width,
        });
        Ok(())
    }

    fn measure_text(&self, text: &str) -> Result<TextMetrics> {
        let px = font_px(&self.font);
        Ok(TextMetrics {
            width: text.chars().count() as f64 * px * GLYPH_ASPECT,
            ascent: px * 0.8,
            descent: px * 0.2,
        })
    }

    fn composite_from(&mut self, source: &Self) -> Result<()> {
        let src = Rect::new(0.0, 0.0, source.width as f64, source.height as f64);
        let dest = Rect::new(0.0, 0.0, self.width as f64, self.height as f64);
        // straight copy, transparent pixels included
        self.pixels.fill(0);
        let x_step = src.width / dest.width;
        let y_step = src.height / dest.height;
        for dy in 0..self.height as i32 {
            for dx in 0..self.width as i32 {
                let sx = ((dx as f64 + 0.5) * x_step).floor() as i32;
                let sy = ((dy as f64 + 0.5) * y_step).floor() as i32;
                if let Some(rgba) = source.pixel(sx, sy) {
                    self.write(dx, dy, rgba);
                }
            }
        }
        Ok(())
    }
}

// ==================== Host ====================
struct PendingTimer {
    handle: TimerHandle,
    due: f64,
    callback: Box<dyn FnOnce()>,
}

type InputSink = Rc<dyn Fn(InputEvent)>;

#[derive(Default)]
pub struct HeadlessHost {
    displays: RefCell<HashMap<String, (u32, u32)>>,
    sources: RefCell<HashMap<String, HeadlessImage>>,
    now: Cell<f64>,
    next_timer: Cell<i32>,
    timers: RefCell<Vec<PendingTimer>>,
    decodes: RefCell<Vec<(String, Box<dyn FnOnce()>)>>,
    input: RefCell<HashMap<String, InputSink>>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a display surface of the given size available under `element_id`.
    pub fn add_display(&self, element_id: &str, width: u32, height: u32) {
        self.displays
            .borrow_mut()
            .insert(element_id.to_string(), (width, height));
    }

    /// Make `source` decodable as a solid-color image.
    pub fn add_image(&self, source: &str, width: u32, height: u32, color: Rgba) {
        let data = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        // length is exact by construction
        if let Ok(buffer) = PixelBuffer::new(width, height, data) {
            self.add_image_pixels(source, buffer);
        }
    }

    pub fn add_image_pixels(&self, source: &str, pixels: PixelBuffer) {
        self.sources.borrow_mut().insert(
            source.to_string(),
            HeadlessImage {
                pixels: Rc::new(pixels),
            },
        );
    }

    // -------------------- clock & timers --------------------
    pub fn set_now(&self, now_ms: f64) {
        self.now.set(now_ms);
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Fire the earliest armed timer, `lateness` ms after it was due (host
    /// scheduling jitter). Returns false when nothing is armed.
    pub fn fire_next_timer(&self, lateness: f64) -> bool {
        let next = {
            let mut timers = self.timers.borrow_mut();
            let earliest = timers
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.due.total_cmp(&b.1.due))
                .map(|(index, _)| index);
            earliest.map(|index| timers.remove(index))
        };
        let Some(timer) = next else {
            return false;
        };
        self.now.set(self.now.get().max(timer.due + lateness));
        (timer.callback)();
        true
    }

    /// Move the clock forward `ms`, firing every timer that falls due on the
    /// way, in due order (including timers armed by those timers).
    pub fn advance(&self, ms: f64) {
        let target = self.now.get() + ms;
        loop {
            let next_due = self
                .timers
                .borrow()
                .iter()
                .map(|timer| timer.due)
                .min_by(|a, b| a.total_cmp(b));
            match next_due {
                Some(due) if due <= target => {
                    self.fire_next_timer(0.0);
                }
                _ => break,
            }
        }
        self.now.set(target);
    }

    // -------------------- decodes --------------------
    /// Sources with a decode still in flight, in request order.
    pub fn pending_loads(&self) -> Vec<String> {
        self.decodes
            .borrow()
            .iter()
            .map(|(source, _)| source.clone())
            .collect()
    }

    /// Deliver the load notification of the oldest in-flight decode of
    /// `source`. Returns false if there is none.
    pub fn complete_load(&self, source: &str) -> bool {
        let next = {
            let mut decodes = self.decodes.borrow_mut();
            decodes
                .iter()
                .position(|(pending, _)| pending == source)
                .map(|index| decodes.remove(index))
        };
        match next {
            Some((_, on_load)) => {
                on_load();
                true
            }
            None => false,
        }
    }

    pub fn complete_all_loads(&self) {
        for source in self.pending_loads() {
            self.complete_load(&source);
        }
    }

    // -------------------- input --------------------
    /// Deliver an input event to whatever is attached to `element_id`.
    pub fn dispatch(&self, element_id: &str, event: InputEvent) -> bool {
        let sink = self.input.borrow().get(element_id).cloned();
        match sink {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }
}

impl Host for HeadlessHost {
    type Image = HeadlessImage;
    type Surface = HeadlessSurface;

    fn onscreen(&self, element_id: &str) -> Result<HeadlessSurface> {
        let (width, height) = self
            .displays
            .borrow()
            .get(element_id)
            .copied()
            .ok_or_else(|| anyhow!("No display found with ID : '{}'", element_id))?;
        Ok(HeadlessSurface::new(width, height))
    }

    fn offscreen(&self, width: u32, height: u32) -> Result<HeadlessSurface> {
        Ok(HeadlessSurface::new(width, height))
    }

    fn now_ms(&self) -> f64 {
        self.now.get()
    }

    fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> Result<TimerHandle> {
        let id = self.next_timer.get() + 1;
        self.next_timer.set(id);
        let handle = TimerHandle(id);
        self.timers.borrow_mut().push(PendingTimer {
            handle,
            due: self.now.get() + delay_ms as f64,
            callback,
        });
        Ok(handle)
    }

    /// Unknown sources behave like a failed decode: an empty image whose
    /// load never completes.
    fn request_image(&self, source: &str, on_load: Box<dyn FnOnce()>) -> Result<HeadlessImage> {
        match self.sources.borrow().get(source) {
            Some(image) => {
                self.decodes
                    .borrow_mut()
                    .push((source.to_string(), on_load));
                Ok(image.clone())
            }
            None => {
                log::debug!("headless: no image registered for '{}'", source);
                Ok(HeadlessImage {
                    pixels: Rc::new(PixelBuffer::new(0, 0, Vec::new())?),
                })
            }
        }
    }

    fn image_pixels(&self, image: &HeadlessImage) -> Result<PixelBuffer> {
        Ok(image.pixels.as_ref().clone())
    }

    fn attach_input(&self, element_id: &str, sink: Rc<dyn Fn(InputEvent)>) -> Result<()> {
        self.input.borrow_mut().insert(element_id.to_string(), sink);
        Ok(())
    }
}

impl std::fmt::Debug for PendingTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTimer")
            .field("handle", &self.handle)
            .field("due", &self.due)
            .finish()
    }
}
