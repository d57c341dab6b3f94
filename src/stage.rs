//! The dual surface and the drawing helpers handed to the frame function.
//!
//! ```text
//! ┌──────────── frame fn ────────────┐          ┌──────────────┐
//! │ fill_canvas / draw_image / text  ├─────────►│  offscreen   │ logical w x h
//! └──────────────────────────────────┘          └──────┬───────┘
//!                                                      │ composite (once per tick,
//!                                                      ▼  stretched by scale)
//!                                               ┌──────────────┐
//!                                               │   onscreen   │ display w x h
//!                                               └──────────────┘
//! ```
//!
//! Styling is ambient, like the host API underneath: `set_fill_style`,
//! `set_fill_font` and friends stick until changed. `fill_text` takes its
//! style explicitly and applies it before drawing.
use crate::error::{EidolonError, Result};
use crate::host::{Host, HostImage, Point, Rect, Rgba, Surface, TextMetrics};
use crate::input::{InputEvent, InputSnapshot};
use crate::loader::LoadGate;
use std::fmt::Display;
use std::rc::Rc;

/// stroke width used by `draw_line`
pub const LINE_WIDTH: f64 = 4.0;

pub struct Stage<H: Host> {
    host: Rc<H>,
    onscreen: H::Surface,
    offscreen: H::Surface,
    scale_x: f64,
    scale_y: f64,
    pub(crate) images: LoadGate<H::Image>,
    input: InputSnapshot,
    // text + position of the latest fill_text, for stroke_prev_text
    prev_text: Option<(String, Point)>,
}

/// Log an error a drawing helper can't hand back to the frame function.
fn absorb<T, E: Display>(op: &str, result: std::result::Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            log::warn!("{}: {}", op, err);
            None
        }
    }
}

impl<H: Host> Stage<H> {
    pub fn new(host: Rc<H>, element_id: &str, logical_width: u32, logical_height: u32) -> Result<Self> {
        if logical_width == 0 || logical_height == 0 {
            return Err(EidolonError::SurfaceInit(format!(
                "logical size must be non-zero, got {}x{}",
                logical_width, logical_height
            )));
        }
        let onscreen = host
            .onscreen(element_id)
            .map_err(|err| EidolonError::SurfaceInit(format!("onscreen '{}': {:#}", element_id, err)))?;
        let offscreen = host
            .offscreen(logical_width, logical_height)
            .map_err(|err| EidolonError::SurfaceInit(format!("offscreen: {:#}", err)))?;
        // computed once, dimensions never change afterwards
        let scale_x = onscreen.width() as f64 / logical_width as f64;
        let scale_y = onscreen.height() as f64 / logical_height as f64;
        if scale_x <= 0.0 || scale_y <= 0.0 {
            return Err(EidolonError::SurfaceInit(format!(
                "display surface '{}' has zero size",
                element_id
            )));
        }
        log::debug!(
            "stage {}x{} on '{}' {}x{} (scale {}, {})",
            logical_width,
            logical_height,
            element_id,
            onscreen.width(),
            onscreen.height(),
            scale_x,
            scale_y
        );
        Ok(Self {
            host,
            onscreen,
            offscreen,
            scale_x,
            scale_y,
            images: LoadGate::new(),
            input: InputSnapshot::default(),
            prev_text: None,
        })
    }

    // ==================== Surfaces ====================
    /// (scale_x, scale_y): display size over logical size
    pub fn scale(&self) -> (f64, f64) {
        (self.scale_x, self.scale_y)
    }

    pub fn logical_size(&self) -> (u32, u32) {
        (self.offscreen.width(), self.offscreen.height())
    }

    /// The offscreen surface, for anything the helpers don't cover.
    pub fn surface(&mut self) -> &mut H::Surface {
        &mut self.offscreen
    }

    pub fn onscreen(&self) -> &H::Surface {
        &self.onscreen
    }

    /// Copy offscreen onto onscreen, stretched to the display size.
    pub fn composite(&mut self) {
        absorb("composite", self.onscreen.composite_from(&self.offscreen));
    }

    // ==================== Input ====================
    pub fn input(&self) -> &InputSnapshot {
        &self.input
    }

    pub(crate) fn handle_input(&mut self, event: &InputEvent) {
        let scale = self.scale();
        self.input.apply(event, scale);
    }

    pub(crate) fn end_frame(&mut self) {
        self.input.end_frame();
    }

    // ==================== Images ====================
    /// Loaded image by name; `None` while it is still decoding or unknown.
    pub fn image(&self, name: &str) -> Option<&H::Image> {
        self.images
            .get(name)
            .ok()
            .filter(|pending| pending.loaded)
            .map(|pending| &pending.image)
    }

    pub fn images_ready(&self) -> bool {
        self.images.is_complete()
    }

    /// Draw a whole image at (x, y), unscaled.
    pub fn draw_image(&mut self, name: &str, x: f64, y: f64) {
        let Some(pending) = absorb("draw_image", self.images.get(name)) else {
            return;
        };
        let image = &pending.image;
        let (w, h) = (image.width() as f64, image.height() as f64);
        absorb(
            "draw_image",
            self.offscreen
                .draw_image(image, Rect::new(0.0, 0.0, w, h), Rect::new(x, y, w, h)),
        );
    }

    /// Draw the `src` region of an image (e.g. one cell of a sprite sheet)
    /// at `at`. `dest_size` stretches it; `None` or a non-positive side keeps
    /// the source size for that side.
    pub fn draw_image_full(&mut self, name: &str, at: Point, src: Rect, dest_size: Option<(f64, f64)>) {
        let Some(pending) = absorb("draw_image_full", self.images.get(name)) else {
            return;
        };
        let (dest_w, dest_h) = dest_size.unwrap_or((0.0, 0.0));
        let dest_w = if dest_w <= 0.0 { src.width } else { dest_w };
        let dest_h = if dest_h <= 0.0 { src.height } else { dest_h };
        absorb(
            "draw_image_full",
            self.offscreen
                .draw_image(&pending.image, src, Rect::new(at.x, at.y, dest_w, dest_h)),
        );
    }

    /// Prepare an image for `get_pixel` by keeping an RGBA copy of it.
    pub fn image_setup_pixels(&mut self, name: &str) {
        let host = self.host.clone();
        let Some(pending) = absorb("image_setup_pixels", self.images.get_mut(name)) else {
            return;
        };
        if pending.pixels.is_some() {
            absorb::<(), _>(
                "image_setup_pixels",
                Err(EidolonError::AlreadyConfigured(name.to_string())),
            );
            return;
        }
        pending.pixels = absorb("image_setup_pixels", host.image_pixels(&pending.image));
    }

    /// RGBA of one pixel of a set-up image; `None` if unknown, not set up,
    /// or out of bounds.
    pub fn get_pixel(&self, name: &str, x: i32, y: i32) -> Option<Rgba> {
        let pending = absorb("get_pixel", self.images.get(name))?;
        let Some(pixels) = pending.pixels.as_ref() else {
            log::warn!("get_pixel: image_setup_pixels was never called for {}", name);
            return None;
        };
        pixels.pixel(x, y)
    }

    // ==================== Shapes & Pixels ====================
    pub fn fill_canvas(&mut self, color: &str) {
        let (w, h) = self.logical_size();
        self.offscreen.set_fill_style(color);
        self.offscreen
            .fill_rect(Rect::new(0.0, 0.0, w as f64, h as f64));
    }

    /// Uses the current stroke style.
    pub fn draw_line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64) {
        self.offscreen.set_line_width(LINE_WIDTH);
        self.offscreen
            .stroke_line(Point { x: x0, y: y0 }, Point { x: x1, y: y1 });
    }

    pub fn set_pixel(&mut self, x: i32, y: i32, rgba: Rgba) {
        absorb("set_pixel", self.offscreen.put_pixel(x, y, rgba));
    }

    /// `set_pixel` with full alpha.
    pub fn set_pixel_rgb(&mut self, x: i32, y: i32, r: u8, g: u8, b: u8) {
        self.set_pixel(x, y, [r, g, b, 255]);
    }

    // ==================== Text ====================
    pub fn set_fill_style(&mut self, color: &str) {
        self.offscreen.set_fill_style(color);
    }

    pub fn set_stroke_style(&mut self, color: &str) {
        self.offscreen.set_stroke_style(color);
    }

    /// Font becomes `"<size>px <name>"`.
    pub fn set_fill_font(&mut self, font_name: &str, font_size: impl Display) {
        self.offscreen
            .set_font(&format!("{}px {}", font_size, font_name));
    }

    pub fn fill_text(
        &mut self,
        font_name: &str,
        font_size: impl Display,
        color: &str,
        text: &str,
        x: f64,
        y: f64,
    ) {
        self.set_fill_style(color);
        self.set_fill_font(font_name, font_size);
        self.fill_text_b(text, x, y);
    }

    /// Text with whatever style is current.
    pub fn fill_text_b(&mut self, text: &str, x: f64, y: f64) {
        let at = Point { x, y };
        self.prev_text = Some((text.to_string(), at));
        absorb("fill_text", self.offscreen.fill_text(text, at));
    }

    /// Outline the text of the latest `fill_text`/`fill_text_b` call.
    pub fn stroke_prev_text(&mut self, color: &str, line_width: f64) {
        let Some((text, at)) = self.prev_text.as_ref() else {
            log::warn!("stroke_prev_text: no text drawn yet");
            return;
        };
        self.offscreen.set_stroke_style(color);
        self.offscreen.set_line_width(line_width);
        absorb("stroke_prev_text", self.offscreen.stroke_text(text, *at));
    }

    pub fn measure_text(&self, text: &str) -> Option<TextMetrics> {
        absorb("measure_text", self.offscreen.measure_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessHost, TextOp};
    use approx::assert_relative_eq;

    fn stage(display: (u32, u32), logical: (u32, u32)) -> (Rc<HeadlessHost>, Stage<HeadlessHost>) {
        let host = Rc::new(HeadlessHost::new());
        host.add_display("canvas", display.0, display.1);
        let stage = Stage::new(host.clone(), "canvas", logical.0, logical.1).unwrap();
        (host, stage)
    }

    /// Register one image straight into the gate, already loaded.
    fn with_image(host: &HeadlessHost, stage: &mut Stage<HeadlessHost>, name: &str, w: u32, h: u32, color: Rgba) {
        host.add_image(name, w, h, color);
        let generation = stage.images.begin(Box::new(|| {}));
        let id = stage.images.next_ticket();
        let image = host.request_image(name, Box::new(|| {})).unwrap();
        stage.images.insert(name, id, image);
        let _ = stage.images.seal();
        let _ = stage.images.notify(generation, id);
    }

    #[test]
    fn equal_sizes_scale_by_one() {
        let (_, stage) = stage((640, 480), (640, 480));
        let (sx, sy) = stage.scale();
        assert_relative_eq!(sx, 1.0);
        assert_relative_eq!(sy, 1.0);
    }

    #[test]
    fn half_logical_size_scales_by_two() {
        let (_, stage) = stage((640, 480), (320, 240));
        let (sx, sy) = stage.scale();
        assert_relative_eq!(sx, 2.0);
        assert_relative_eq!(sy, 2.0);
    }

    #[test]
    fn missing_display_is_surface_init_error() {
        let host = Rc::new(HeadlessHost::new());
        let result = Stage::new(host, "nowhere", 10, 10);
        assert!(matches!(result, Err(EidolonError::SurfaceInit(_))));
    }

    #[test]
    fn zero_logical_size_is_surface_init_error() {
        let host = Rc::new(HeadlessHost::new());
        host.add_display("canvas", 10, 10);
        assert!(matches!(
            Stage::new(host, "canvas", 0, 10),
            Err(EidolonError::SurfaceInit(_))
        ));
    }

    #[test]
    fn drawing_targets_offscreen_until_composite() {
        let (_, mut stage) = stage((4, 4), (2, 2));
        stage.fill_canvas("red");
        assert_eq!(stage.onscreen().pixel(3, 3), Some([0, 0, 0, 0]));
        stage.composite();
        assert_eq!(stage.onscreen().pixel(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(stage.onscreen().pixel(3, 3), Some([255, 0, 0, 255]));
    }

    #[test]
    fn set_pixel_defaults_to_opaque() {
        let (_, mut stage) = stage((4, 4), (4, 4));
        stage.set_pixel_rgb(1, 2, 10, 20, 30);
        stage.set_pixel(2, 2, [1, 2, 3, 4]);
        assert_eq!(stage.surface().pixel(1, 2), Some([10, 20, 30, 255]));
        assert_eq!(stage.surface().pixel(2, 2), Some([1, 2, 3, 4]));
    }

    #[test]
    fn draw_image_blits_whole_image() {
        let (host, mut stage) = stage((8, 8), (8, 8));
        with_image(&host, &mut stage, "check1.png", 2, 2, [0, 255, 0, 255]);
        stage.draw_image("check1.png", 3.0, 4.0);
        let surface = stage.surface();
        assert_eq!(surface.pixel(3, 4), Some([0, 255, 0, 255]));
        assert_eq!(surface.pixel(4, 5), Some([0, 255, 0, 255]));
        assert_eq!(surface.pixel(5, 5), Some([0, 0, 0, 0]));
    }

    #[test]
    fn draw_image_full_defaults_dest_to_source_size() {
        let (host, mut stage) = stage((8, 8), (8, 8));
        with_image(&host, &mut stage, "sheet.png", 4, 4, [0, 0, 255, 255]);
        stage.draw_image_full("sheet.png", Point { x: 0.0, y: 0.0 }, Rect::new(0.0, 0.0, 2.0, 2.0), None);
        assert_eq!(stage.surface().pixel(1, 1), Some([0, 0, 255, 255]));
        assert_eq!(stage.surface().pixel(2, 2), Some([0, 0, 0, 0]));

        stage.draw_image_full(
            "sheet.png",
            Point { x: 4.0, y: 4.0 },
            Rect::new(0.0, 0.0, 2.0, 2.0),
            Some((4.0, -1.0)),
        );
        assert_eq!(stage.surface().pixel(7, 5), Some([0, 0, 255, 255]));
        assert_eq!(stage.surface().pixel(7, 6), Some([0, 0, 0, 0]));
    }

    #[test]
    fn unknown_image_is_absorbed() {
        let (_, mut stage) = stage((4, 4), (4, 4));
        stage.draw_image("ghost.png", 0.0, 0.0);
        stage.image_setup_pixels("ghost.png");
        assert_eq!(stage.get_pixel("ghost.png", 0, 0), None);
    }

    #[test]
    fn get_pixel_requires_setup_and_setup_is_once() {
        let (host, mut stage) = stage((4, 4), (4, 4));
        with_image(&host, &mut stage, "abcd0.png", 3, 3, [7, 7, 7, 255]);
        assert_eq!(stage.get_pixel("abcd0.png", 1, 1), None);
        stage.image_setup_pixels("abcd0.png");
        stage.image_setup_pixels("abcd0.png");
        assert_eq!(stage.get_pixel("abcd0.png", 1, 1), Some([7, 7, 7, 255]));
        assert_eq!(stage.get_pixel("abcd0.png", 3, 0), None);
    }

    #[test]
    fn stroke_prev_text_reuses_last_text_and_position() {
        let (_, mut stage) = stage((4, 4), (4, 4));
        stage.stroke_prev_text("black", 2.0);
        stage.fill_text("Arial", 24, "#ff0000", "Eidolon", 10.0, 20.0);
        stage.stroke_prev_text("black", 2.0);
        let ops = stage.surface().text_ops().to_vec();
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[0],
            TextOp::Fill {
                text: "Eidolon".into(),
                at: Point { x: 10.0, y: 20.0 },
                font: "24px Arial".into(),
                color: "#ff0000".into(),
            }
        );
        assert_eq!(
            ops[1],
            TextOp::Stroke {
                text: "Eidolon".into(),
                at: Point { x: 10.0, y: 20.0 },
                color: "black".into(),
                line_width: 2.0,
            }
        );
    }

    #[test]
    fn measure_text_uses_current_font() {
        let (_, mut stage) = stage((4, 4), (4, 4));
        stage.set_fill_font("Arial", 10);
        let narrow = stage.measure_text("abcd").unwrap();
        stage.set_fill_font("Arial", 20);
        let wide = stage.measure_text("abcd").unwrap();
        assert_relative_eq!(wide.width, narrow.width * 2.0);
    }
}
