use crate::host::{Host, HostImage, PixelBuffer, Point, Rect, Rgba, Surface, TextMetrics, TimerHandle};
use crate::input::{InputEvent, PointerKind};
use anyhow::{anyhow, Result};
use std::future::Future;
use std::rc::Rc;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{Clamped, JsCast, JsValue};

#[rustfmt::skip]
use web_sys::{
    Document,
    Window,
    CanvasRenderingContext2d,
    Event,
    HtmlCanvasElement,
    HtmlImageElement,
    ImageData,
    KeyboardEvent,
    MouseEvent,
};

// ==================== Constants ====================
// Constants related to HTML elements
mod html {
    pub const CANVAS: &str = "canvas";
    pub const CONTEXT_2D: &str = "2d";
    /// pointer events Eidolon listens to on its canvas
    pub const POINTER_EVENTS: [&str; 4] = ["click", "mousedown", "mouseup", "mousemove"];
    pub const KEYDOWN: &str = "keydown";
}

// ==================== DOM Helpers ====================
pub fn window() -> Result<Window> {
    web_sys::window().ok_or_else(|| anyhow!("Window not found"))
}

pub fn document() -> Result<Document> {
    window()?
        .document()
        .ok_or_else(|| anyhow!("No Document Found"))
}

pub fn canvas(element_id: &str) -> Result<HtmlCanvasElement> {
    document()?
        .get_element_by_id(element_id)
        .ok_or_else(|| anyhow!("No Canvas Element found with ID : '{}'", element_id))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|element| anyhow!("Error converting {:#?} to HtmlCanvasElement", element))
}

/// Detached canvas, never added to the document.
pub fn new_canvas(width: u32, height: u32) -> Result<HtmlCanvasElement> {
    let canvas = document()?
        .create_element(html::CANVAS)
        .map_err(|err| anyhow!("Could not create canvas element : {:#?}", err))?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|element| anyhow!("Error converting {:#?} to HtmlCanvasElement", element))?;
    canvas.set_width(width);
    canvas.set_height(height);
    Ok(canvas)
}

pub fn context(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d> {
    canvas
        .get_context(html::CONTEXT_2D)
        // Result<Option<Object>, JsValue>
        // - map error(JsValue) to Error (anyhow)
        // - map the None case to an error as well
        .map_err(|js_value| anyhow!("Error getting context : {:#?}", js_value))?
        .ok_or_else(|| anyhow!("No 2d context found"))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|element| {
            anyhow!(
                "Error converting {:#?} to CanvasRenderingContext2d",
                element
            )
        })
}

pub fn new_image() -> Result<HtmlImageElement> {
    HtmlImageElement::new().map_err(|err| anyhow!("Could not create image element : {:#?}", err))
}

/// Milliseconds from the page's performance clock.
pub fn now() -> Result<f64> {
    Ok(window()?
        .performance()
        .ok_or_else(|| anyhow!("Performance object not found"))?
        .now())
}

pub fn spawn_local<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

// ==================== Logging ====================
/// Route `log` records to the browser console. Safe to call more than once,
/// only the first call picks the level. `Off` installs nothing.
pub fn init_logging(level: log::LevelFilter) {
    let Some(level) = level.to_level() else {
        return;
    };
    if console_log::init_with_level(level).is_err() {
        log::debug!("console logger already installed");
    }
}

fn js_err(what: &str, err: JsValue) -> anyhow::Error {
    anyhow!("{} : {:#?}", what, err)
}

// ==================== Host ====================
#[derive(Debug, Clone)]
pub struct BrowserImage(HtmlImageElement);

impl HostImage for BrowserImage {
    fn width(&self) -> u32 {
        self.0.width()
    }

    fn height(&self) -> u32 {
        self.0.height()
    }
}

/// A canvas element and its 2d context.
pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
}

impl CanvasSurface {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self> {
        let context = context(&canvas)?;
        Ok(Self { canvas, context })
    }

    pub fn context(&self) -> &CanvasRenderingContext2d {
        &self.context
    }
}

impl Surface for CanvasSurface {
    type Image = BrowserImage;

    fn width(&self) -> u32 {
        self.canvas.width()
    }

    fn height(&self) -> u32 {
        self.canvas.height()
    }

    fn set_fill_style(&mut self, color: &str) {
        self.context.set_fill_style_str(color);
    }

    fn set_stroke_style(&mut self, color: &str) {
        self.context.set_stroke_style_str(color);
    }

    fn set_font(&mut self, font: &str) {
        self.context.set_font(font);
    }

    fn set_line_width(&mut self, width: f64) {
        self.context.set_line_width(width);
    }

    fn fill_rect(&mut self, rect: Rect) {
        self.context
            .fill_rect(rect.x, rect.y, rect.width, rect.height);
    }

    fn draw_image(&mut self, image: &BrowserImage, src: Rect, dest: Rect) -> Result<()> {
        self.context
            .draw_image_with_html_image_element_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
                &image.0,
                src.x,
                src.y,
                src.width,
                src.height,
                dest.x,
                dest.y,
                dest.width,
                dest.height,
            )
            .map_err(|err| js_err("drawImage failed", err))
    }

    fn stroke_line(&mut self, from: Point, to: Point) {
        self.context.begin_path();
        self.context.move_to(from.x, from.y);
        self.context.line_to(to.x, to.y);
        self.context.stroke();
    }

    fn put_pixel(&mut self, x: i32, y: i32, rgba: Rgba) -> Result<()> {
        let pixel = ImageData::new_with_u8_clamped_array(Clamped(&rgba[..]), 1)
            .map_err(|err| js_err("Could not create ImageData", err))?;
        self.context
            .put_image_data(&pixel, x as f64, y as f64)
            .map_err(|err| js_err("putImageData failed", err))
    }

    fn fill_text(&mut self, text: &str, at: Point) -> Result<()> {
        self.context
            .fill_text(text, at.x, at.y)
            .map_err(|err| js_err("fillText failed", err))
    }

    fn stroke_text(&mut self, text: &str, at: Point) -> Result<()> {
        self.context
            .stroke_text(text, at.x, at.y)
            .map_err(|err| js_err("strokeText failed", err))
    }

    fn measure_text(&self, text: &str) -> Result<TextMetrics> {
        let metrics = self
            .context
            .measure_text(text)
            .map_err(|err| js_err("measureText failed", err))?;
        Ok(TextMetrics {
            width: metrics.width(),
            ascent: metrics.actual_bounding_box_ascent(),
            descent: metrics.actual_bounding_box_descent(),
        })
    }

    fn composite_from(&mut self, source: &Self) -> Result<()> {
        self.context
            .draw_image_with_html_canvas_element_and_sw_and_sh_and_dx_and_dy_and_dw_and_dh(
                &source.canvas,
                0.0,
                0.0,
                source.width() as f64,
                source.height() as f64,
                0.0,
                0.0,
                self.width() as f64,
                self.height() as f64,
            )
            .map_err(|err| js_err("composite drawImage failed", err))
    }
}

/// Host backed by the page: canvases, `setTimeout`, `<img>` decoding and
/// DOM mouse/keyboard events.
#[derive(Debug, Default)]
pub struct BrowserHost;

impl BrowserHost {
    pub fn new() -> Self {
        Self
    }
}

impl Host for BrowserHost {
    type Image = BrowserImage;
    type Surface = CanvasSurface;

    fn onscreen(&self, element_id: &str) -> Result<CanvasSurface> {
        CanvasSurface::new(canvas(element_id)?)
    }

    fn offscreen(&self, width: u32, height: u32) -> Result<CanvasSurface> {
        CanvasSurface::new(new_canvas(width, height)?)
    }

    fn now_ms(&self) -> f64 {
        now().unwrap_or_else(|err| {
            log::warn!("{:#}", err);
            js_sys::Date::now()
        })
    }

    fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> Result<TimerHandle> {
        // once_into_js frees the closure after its single call
        let callback = Closure::once_into_js(move || callback());
        let handle = window()?
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                callback.unchecked_ref(),
                delay_ms as i32,
            )
            .map_err(|err| js_err("setTimeout failed", err))?;
        Ok(TimerHandle(handle))
    }

    fn request_image(&self, source: &str, on_load: Box<dyn FnOnce()>) -> Result<BrowserImage> {
        let image = new_image()?;
        let success_callback = Closure::once_into_js(move || on_load());
        let failed_source = source.to_string();
        // decode failures are only logged, the batch waiting on it stalls
        let error_callback = Closure::once_into_js(move |_err: JsValue| {
            log::warn!("image failed to load, batch will not complete: {}", failed_source);
        });
        image.set_onload(Some(success_callback.unchecked_ref()));
        image.set_onerror(Some(error_callback.unchecked_ref()));
        image.set_src(source);
        Ok(BrowserImage(image))
    }

    fn image_pixels(&self, image: &BrowserImage) -> Result<PixelBuffer> {
        let (width, height) = (image.width(), image.height());
        let scratch = new_canvas(width, height)?;
        let context = context(&scratch)?;
        context
            .draw_image_with_html_image_element(&image.0, 0.0, 0.0)
            .map_err(|err| js_err("drawImage failed", err))?;
        let data = context
            .get_image_data(0.0, 0.0, width as f64, height as f64)
            .map_err(|err| js_err("getImageData failed", err))?
            .data();
        PixelBuffer::new(width, height, data.0)
    }

    fn attach_input(&self, element_id: &str, sink: Rc<dyn Fn(InputEvent)>) -> Result<()> {
        let canvas = canvas(element_id)?;
        for kind in html::POINTER_EVENTS {
            let sink = sink.clone();
            let listener = Closure::wrap(Box::new(move |event: Event| {
                if let Some(event) = pointer_event(&event) {
                    sink(event);
                }
            }) as Box<dyn FnMut(Event)>);
            canvas
                .add_event_listener_with_callback(kind, listener.as_ref().unchecked_ref())
                .map_err(|err| js_err("addEventListener failed", err))?;
            // listeners live as long as the page
            listener.forget();
        }

        let listener = Closure::wrap(Box::new(move |event: Event| {
            if let Some(event) = event.dyn_ref::<KeyboardEvent>() {
                sink(InputEvent::Key { code: event.code() });
            }
        }) as Box<dyn FnMut(Event)>);
        canvas
            .add_event_listener_with_callback(html::KEYDOWN, listener.as_ref().unchecked_ref())
            .map_err(|err| js_err("addEventListener failed", err))?;
        listener.forget();
        Ok(())
    }
}

fn pointer_event(event: &Event) -> Option<InputEvent> {
    let kind = match event.type_().as_str() {
        "click" => PointerKind::Click,
        "mousedown" => PointerKind::Down,
        "mouseup" => PointerKind::Up,
        "mousemove" => PointerKind::Move,
        _ => return None,
    };
    let mouse = event.dyn_ref::<MouseEvent>()?;
    Some(InputEvent::pointer(
        kind,
        mouse.offset_x() as f64,
        mouse.offset_y() as f64,
    ))
}
