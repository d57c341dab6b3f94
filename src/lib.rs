//! Eidolon: a small canvas wrapper for games and other animated pages.
//!
//! Usage:
//! 1. build an [`Eidolon`] over a canvas (the display) and a logical size
//! 2. `load_images` with a continuation that runs once everything decoded
//! 3. in that continuation, `start_animation` with a per-frame function
//! 4. the frame function draws through [`Stage`] and reads its input
//!    snapshot; at the end of every tick the offscreen drawing is
//!    composited onto the canvas
//!
//! TABLE
//! ┌──────────────┬─────────────────────────────────────────────────┐
//! │ Module       │ Role                                            │
//! ├──────────────┼─────────────────────────────────────────────────┤
//! │ engine.rs    │ Eidolon aggregate + tick loop                   │
//! │ loader.rs    │ image load gate (one continuation per batch)    │
//! │ stage.rs     │ dual surface, composite, drawing helpers        │
//! │ input.rs     │ pointer snapshot with edge-triggered flags      │
//! │ host.rs      │ traits the platform implements                  │
//! │ browser.rs   │ web-sys host (canvas, setTimeout, <img>, DOM)   │
//! │ headless.rs  │ in-memory host for tests and offscreen runs     │
//! │ demo.rs      │ bouncing check mark demo                        │
//! └──────────────┴─────────────────────────────────────────────────┘
// ==================== Imports ====================
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsValue;

pub mod browser;
pub mod config;
pub mod demo;
pub mod engine;
pub mod error;
pub mod headless;
pub mod host;
pub mod input;
pub mod loader;
pub mod stage;

pub use config::EidolonConfig;
pub use engine::{Eidolon, FrameFn};
pub use error::{EidolonError, Result};
pub use host::{Host, HostImage, PixelBuffer, Point, Rect, Rgba, Surface, TextMetrics};
pub use input::{InputEvent, InputSnapshot, PointerKind};
pub use stage::Stage;

// ==================== Main Functions ====================
/// Main entry for Webassembly module, runs the demo with default settings
/// on the `<canvas id="canvas">` element.
#[wasm_bindgen]
pub fn main_js() -> std::result::Result<(), JsValue> {
    start_demo(EidolonConfig::default())
}

/// Same as `main_js`, with settings passed from JavaScript, e.g.
/// `main_with_config({ elementId: "id_canvas", tickIntervalMs: 16 })`.
#[wasm_bindgen]
pub fn main_with_config(config: JsValue) -> std::result::Result<(), JsValue> {
    let config: EidolonConfig = serde_wasm_bindgen::from_value(config)?;
    start_demo(config)
}

fn start_demo(config: EidolonConfig) -> std::result::Result<(), JsValue> {
    // setup better panic messages for debugging
    console_error_panic_hook::set_once();
    browser::init_logging(config.level_filter());

    let host = Rc::new(browser::BrowserHost::new());
    let eidolon = Eidolon::with_config(host, &config).map_err(to_js)?;

    // spawns a new asynchronous task in local thread, for web assembly
    // environment, using wasm_bindgen_futures
    browser::spawn_local(async move {
        if let Err(err) = demo::run_async(eidolon).await {
            log::error!("demo failed: {}", err);
        }
    });
    Ok(())
}

fn to_js(err: EidolonError) -> JsValue {
    JsValue::from_str(&err.to_string())
}
