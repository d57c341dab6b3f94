//! Demo: a check mark bouncing around a gray canvas, an animated sprite
//! sheet, and a stroked title. Hold the button and move the pointer to drag
//! the check mark around.
use crate::engine::Eidolon;
use crate::error::Result;
use crate::host::{Host, Point, Rect};
use crate::input::InputSnapshot;
use crate::stage::Stage;
use rand::Rng;

pub const CHECK_IMAGE: &str = "check1.png";
pub const SHEET_IMAGE: &str = "abcd0.png";
pub const TITLE: &str = "Eidolon Test Program";

// check mark is 70 x 70
const ICON_SIZE: f64 = 70.0;
const BASE_SPEED: f64 = 2.0;
// sprite sheet: 4 cells of 32 x 32, each shown for 16 ticks
const SHEET_CELLS: u32 = 4;
const TICKS_PER_CELL: u32 = 16;
const CELL_SIZE: f64 = 32.0;

fn random_sign(rng: &mut impl Rng) -> f64 {
    if rng.gen_bool(0.5) {
        -1.0
    } else {
        1.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bouncer {
    pub x: f64,
    pub y: f64,
    vx: f64,
    vy: f64,
    width: f64,
    height: f64,
    frame_count: u32,
    cell: u32,
}

impl Bouncer {
    /// Random start position inside a `width` x `height` playfield.
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_rng(width, height, &mut rand::thread_rng())
    }

    pub fn from_rng(width: u32, height: u32, rng: &mut impl Rng) -> Self {
        let (width, height) = (width as f64, height as f64);
        let x = (rng.gen::<f64>() * (width - ICON_SIZE)).floor();
        let y = (rng.gen::<f64>() * (height - ICON_SIZE)).floor();
        let mut bouncer = Self::at(width, height, x, y);
        bouncer.vx *= random_sign(rng);
        bouncer.vy *= random_sign(rng);
        bouncer
    }

    fn at(width: f64, height: f64, x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            vx: BASE_SPEED,
            vy: BASE_SPEED,
            width,
            height,
            frame_count: 0,
            cell: 0,
        }
    }

    /// Sprite sheet cell currently shown.
    pub fn cell(&self) -> u32 {
        self.cell
    }

    pub fn velocity(&self) -> (f64, f64) {
        (self.vx, self.vy)
    }

    fn update(&mut self, input: &InputSnapshot) {
        if input.moved_this_frame && input.pointer_down {
            // dragging: jump to the pointer with a fresh random heading
            let mut rng = rand::thread_rng();
            self.x = input.pointer_x;
            self.y = input.pointer_y;
            self.vx = BASE_SPEED * random_sign(&mut rng);
            self.vy = BASE_SPEED * random_sign(&mut rng);
        } else {
            self.x += self.vx;
            self.y += self.vy;
        }

        let (max_x, max_y) = (self.width - ICON_SIZE, self.height - ICON_SIZE);
        if self.x < 0.0 {
            self.x = 0.0;
            self.vx = BASE_SPEED;
        } else if self.x >= max_x {
            self.x = max_x - 1.0;
            self.vx = -BASE_SPEED;
        }
        if self.y < 0.0 {
            self.y = 0.0;
            self.vy = BASE_SPEED;
        } else if self.y >= max_y {
            self.y = max_y - 1.0;
            self.vy = -BASE_SPEED;
        }

        self.frame_count += 1;
        if self.frame_count >= TICKS_PER_CELL {
            self.frame_count = 0;
            self.cell = (self.cell + 1) % SHEET_CELLS;
        }
    }

    /// The per-frame function.
    pub fn frame<H: Host>(&mut self, stage: &mut Stage<H>, _elapsed_ms: f64) -> anyhow::Result<()> {
        let input = *stage.input();
        self.update(&input);

        // Draw order matters : background -> foreground
        stage.fill_canvas("gray");

        stage.set_fill_font("Georgia", 48);
        let metrics = stage.measure_text(TITLE).unwrap_or_default();
        let text_height = metrics.ascent - metrics.descent;
        stage.fill_text(
            "Georgia",
            48,
            "dodgerblue",
            TITLE,
            (self.width - metrics.width) / 2.0,
            (self.height - text_height) / 2.0,
        );
        stage.stroke_prev_text("black", 2.0);

        stage.draw_image_full(
            SHEET_IMAGE,
            Point { x: 64.0, y: 64.0 },
            Rect::new(self.cell as f64 * CELL_SIZE, 0.0, CELL_SIZE, CELL_SIZE),
            Some((96.0, 64.0)),
        );
        stage.draw_image(CHECK_IMAGE, self.x, self.y);
        Ok(())
    }
}

/// Load the demo images, then animate at the configured tick interval.
pub fn run<H: Host>(eidolon: &Eidolon<H>) -> Result<()> {
    let (width, height) = eidolon.with_stage(|stage| stage.logical_size())?;
    let mut bouncer = Bouncer::new(width, height);
    let starter = eidolon.clone();
    eidolon.load_images(&[CHECK_IMAGE, SHEET_IMAGE], move || {
        log::info!("demo images loaded, starting animation");
        let started = starter.start(move |stage: &mut Stage<H>, elapsed| bouncer.frame(stage, elapsed));
        if let Err(err) = started {
            log::error!("could not start demo: {}", err);
        }
    })
}

/// `run`, awaiting the images instead of passing a continuation.
pub async fn run_async<H: Host>(eidolon: Eidolon<H>) -> Result<()> {
    let (width, height) = eidolon.with_stage(|stage| stage.logical_size())?;
    let mut bouncer = Bouncer::new(width, height);
    eidolon.load_images_async(&[CHECK_IMAGE, SHEET_IMAGE]).await?;
    log::info!("demo images loaded, starting animation");
    eidolon.start(move |stage: &mut Stage<H>, elapsed| bouncer.frame(stage, elapsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessHost, TextOp};
    use crate::input::{InputEvent, PointerKind};
    use approx::assert_relative_eq;
    use futures::FutureExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::rc::Rc;

    #[test]
    fn random_start_stays_inside_playfield() {
        for _ in 0..32 {
            let bouncer = Bouncer::new(640, 480);
            assert!((0.0..570.0).contains(&bouncer.x));
            assert!((0.0..410.0).contains(&bouncer.y));
            let (vx, vy) = bouncer.velocity();
            assert_relative_eq!(vx.abs(), BASE_SPEED);
            assert_relative_eq!(vy.abs(), BASE_SPEED);
        }
    }

    #[test]
    fn seeded_start_is_reproducible() {
        let first = Bouncer::from_rng(640, 480, &mut StdRng::seed_from_u64(7));
        let second = Bouncer::from_rng(640, 480, &mut StdRng::seed_from_u64(7));
        assert_eq!(first, second);
        assert_eq!(first.x, first.x.floor());
        assert!((0.0..570.0).contains(&first.x));
        assert!((0.0..410.0).contains(&first.y));
    }

    #[test]
    fn bounces_off_right_and_bottom_edges() {
        let mut bouncer = Bouncer::at(640.0, 480.0, 569.0, 409.0);
        bouncer.update(&InputSnapshot::default());
        assert_relative_eq!(bouncer.x, 569.0);
        assert_relative_eq!(bouncer.y, 409.0);
        assert_eq!(bouncer.velocity(), (-BASE_SPEED, -BASE_SPEED));
    }

    #[test]
    fn bounces_off_left_edge() {
        let mut bouncer = Bouncer::at(640.0, 480.0, 1.0, 100.0);
        bouncer.vx = -BASE_SPEED;
        bouncer.update(&InputSnapshot::default());
        assert_relative_eq!(bouncer.x, 0.0);
        assert_relative_eq!(bouncer.velocity().0, BASE_SPEED);
    }

    #[test]
    fn drag_moves_to_pointer() {
        let mut bouncer = Bouncer::at(640.0, 480.0, 10.0, 10.0);
        let input = InputSnapshot {
            pointer_x: 200.0,
            pointer_y: 150.0,
            pointer_down: true,
            moved_this_frame: true,
            ..InputSnapshot::default()
        };
        bouncer.update(&input);
        assert_relative_eq!(bouncer.x, 200.0);
        assert_relative_eq!(bouncer.y, 150.0);
    }

    #[test]
    fn sheet_cell_advances_every_sixteen_ticks() {
        let mut bouncer = Bouncer::at(640.0, 480.0, 100.0, 100.0);
        for _ in 0..15 {
            bouncer.update(&InputSnapshot::default());
        }
        assert_eq!(bouncer.cell(), 0);
        bouncer.update(&InputSnapshot::default());
        assert_eq!(bouncer.cell(), 1);
        for _ in 0..(16 * 3) {
            bouncer.update(&InputSnapshot::default());
        }
        assert_eq!(bouncer.cell(), 0);
    }

    #[test]
    fn demo_runs_once_images_load() {
        let host = Rc::new(HeadlessHost::new());
        host.add_display("canvas", 640, 480);
        host.add_image(CHECK_IMAGE, 70, 70, [0, 200, 0, 255]);
        host.add_image(SHEET_IMAGE, 128, 32, [200, 0, 0, 255]);
        let eidolon = Eidolon::new(host.clone(), "canvas", 640, 480).unwrap();

        run(&eidolon).unwrap();
        assert!(!eidolon.is_running());
        host.complete_all_loads();
        assert!(eidolon.is_running());

        host.dispatch("canvas", InputEvent::pointer(PointerKind::Down, 300.0, 300.0));
        host.advance(30.0);

        eidolon
            .with_stage(|stage| {
                let onscreen = stage.onscreen();
                // dragged check mark, sprite cell, gray background
                assert_eq!(onscreen.pixel(310, 310), Some([0, 200, 0, 255]));
                assert_eq!(onscreen.pixel(100, 100), Some([200, 0, 0, 255]));
                assert_eq!(onscreen.pixel(5, 470), Some([128, 128, 128, 255]));
            })
            .unwrap();
        eidolon
            .with_stage(|stage| {
                let ops = stage.surface().text_ops().to_vec();
                assert!(matches!(&ops[0], TextOp::Fill { text, .. } if text == TITLE));
                assert!(matches!(&ops[1], TextOp::Stroke { line_width, .. } if *line_width == 2.0));
            })
            .unwrap();
    }

    #[test]
    fn async_demo_starts_after_loads() {
        let host = Rc::new(HeadlessHost::new());
        host.add_display("canvas", 640, 480);
        host.add_image(CHECK_IMAGE, 70, 70, [0, 200, 0, 255]);
        host.add_image(SHEET_IMAGE, 128, 32, [200, 0, 0, 255]);
        let eidolon = Eidolon::new(host.clone(), "canvas", 640, 480).unwrap();

        let mut running = Box::pin(run_async(eidolon.clone()));
        assert!(running.as_mut().now_or_never().is_none());
        host.complete_all_loads();
        assert!(matches!(running.now_or_never(), Some(Ok(()))));
        assert!(eidolon.is_running());
    }
}
