use crate::config::{EidolonConfig, DEFAULT_TICK_INTERVAL_MS};
use crate::error::{EidolonError, Result};
use crate::host::{Host, TimerHandle};
use crate::input::{InputEvent, InputSnapshot};
use crate::loader::{Generation, ImageId};
use crate::stage::Stage;
// ELI5: everything runs on one thread (browser event loop), so Rc RefCell > Mutex
use futures::channel::oneshot;
use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};

/// Called once per tick with the stage and the milliseconds since the
/// previous tick (or since `start_animation` for the first one).
///
/// An `Err` is logged and costs only that frame's work: the composite, the
/// re-arm and the edge-flag reset still happen.
pub type FrameFn<H> = Box<dyn FnMut(&mut Stage<H>, f64) -> anyhow::Result<()>>;

/// TABLE
/// ┌──────────────────────── Tick ─────────────────────────┐
/// │ 1. stale run or stopped?      → do nothing, no re-arm │
/// │ 2. frame_fn(stage, now - last)                        │
/// │ 3. composite offscreen → onscreen                     │
/// │ 4. last = now, re-arm `interval` from *now*           │
/// │ 5. clear clicked/moved edge flags                     │
/// └───────────────────────────────────────────────────────┘
/// Re-arming from `now` instead of a fixed virtual clock lets drift
/// accumulate under timer jitter. That is accepted.
struct FrameClock {
    last_tick: f64,
    interval_ms: u32,
    stopped: bool,
    timer: Option<TimerHandle>,
    // bumped by every start; timers carry the run they were armed for
    run: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self {
            last_tick: 0.0,
            interval_ms: DEFAULT_TICK_INTERVAL_MS,
            stopped: true,
            timer: None,
            run: 0,
        }
    }
}

/// Surface, image batch, frame clock and input snapshot of one animated
/// canvas. Cloning gives another handle to the same instance.
pub struct Eidolon<H: Host> {
    host: Rc<H>,
    stage: Rc<RefCell<Stage<H>>>,
    clock: Rc<RefCell<FrameClock>>,
    frame_fn: Rc<RefCell<Option<FrameFn<H>>>>,
    default_interval_ms: u32,
}

impl<H: Host> Clone for Eidolon<H> {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            stage: self.stage.clone(),
            clock: self.clock.clone(),
            frame_fn: self.frame_fn.clone(),
            default_interval_ms: self.default_interval_ms,
        }
    }
}

impl<H: Host> Eidolon<H> {
    /// Wrap the display surface `element_id` (already sized) with a
    /// `logical_width` x `logical_height` offscreen surface.
    pub fn new(host: Rc<H>, element_id: &str, logical_width: u32, logical_height: u32) -> Result<Self> {
        let stage = Stage::new(host.clone(), element_id, logical_width, logical_height)?;
        let stage = Rc::new(RefCell::new(stage));

        // weak: the host holds the sink, the stage holds the host
        let weak = Rc::downgrade(&stage);
        host.attach_input(
            element_id,
            Rc::new(move |event: InputEvent| deliver_input(&weak, &event)),
        )
        .map_err(|err| EidolonError::SurfaceInit(format!("input for '{}': {:#}", element_id, err)))?;

        Ok(Self {
            host,
            stage,
            clock: Rc::new(RefCell::new(FrameClock::default())),
            frame_fn: Rc::new(RefCell::new(None)),
            default_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        })
    }

    pub fn with_config(host: Rc<H>, config: &EidolonConfig) -> Result<Self> {
        let mut eidolon = Self::new(
            host,
            &config.element_id,
            config.logical_width,
            config.logical_height,
        )?;
        eidolon.default_interval_ms = config.tick_interval_ms;
        Ok(eidolon)
    }

    /// Run `f` against the stage outside of a tick, e.g. to draw a loading
    /// screen. Fails with `Reentrant` from inside the frame function, which
    /// already holds the stage.
    pub fn with_stage<R>(&self, f: impl FnOnce(&mut Stage<H>) -> R) -> Result<R> {
        let mut stage = self
            .stage
            .try_borrow_mut()
            .map_err(|_| EidolonError::Reentrant("with_stage"))?;
        Ok(f(&mut *stage))
    }

    pub fn scale(&self) -> Result<(f64, f64)> {
        self.with_stage(|stage| stage.scale())
    }

    pub fn input(&self) -> Result<InputSnapshot> {
        self.with_stage(|stage| *stage.input())
    }

    /// Feed one input event into the snapshot, as the host's listeners do.
    pub fn handle_input(&self, event: InputEvent) {
        deliver_input(&Rc::downgrade(&self.stage), &event);
    }

    // ==================== Image Loading ====================
    /// Start loading `names` as a new batch, abandoning any previous one.
    /// `on_complete` runs exactly once, after every image has loaded; for
    /// an empty list it runs before this returns. A failed decode stalls the
    /// batch forever.
    pub fn load_images<S: AsRef<str>>(&self, names: &[S], on_complete: impl FnOnce() + 'static) -> Result<()> {
        let generation = self
            .stage
            .try_borrow_mut()
            .map_err(|_| EidolonError::Reentrant("load_images"))?
            .images
            .begin(Box::new(on_complete));

        for name in names {
            let name = name.as_ref();
            let id = self.stage.borrow_mut().images.next_ticket();
            let weak = Rc::downgrade(&self.stage);
            // no stage borrow is held while the host is called
            let image = self.host.request_image(
                name,
                Box::new(move || on_image_loaded(&weak, generation, id)),
            )?;
            self.stage.borrow_mut().images.insert(name, id, image);
        }
        log::debug!("loading {} image(s)", names.len());

        let ready = self.stage.borrow_mut().images.seal();
        if let Some(on_complete) = ready {
            on_complete();
        }
        Ok(())
    }

    /// `load_images` as a future. Resolves with an error if the batch is
    /// superseded by another `load_images` call before it completes.
    pub fn load_images_async<S: AsRef<str>>(&self, names: &[S]) -> impl Future<Output = Result<()>> {
        let (tx, rx) = oneshot::channel::<()>();
        let started = self.load_images(names, move || {
            let _ = tx.send(());
        });
        async move {
            started?;
            // a dropped sender means the batch was abandoned
            rx.await.map_err(|_| {
                EidolonError::Host("image batch superseded before it completed".to_string())
            })?;
            Ok::<(), EidolonError>(())
        }
    }

    // ==================== Tick Loop ====================
    /// `start_animation` with the configured interval (30ms unless
    /// configured otherwise).
    pub fn start(&self, frame_fn: impl FnMut(&mut Stage<H>, f64) -> anyhow::Result<()> + 'static) -> Result<()> {
        self.start_animation(frame_fn, self.default_interval_ms)
    }

    /// Idle → Running. Arms the first tick `interval_ms` from now.
    pub fn start_animation(
        &self,
        frame_fn: impl FnMut(&mut Stage<H>, f64) -> anyhow::Result<()> + 'static,
        interval_ms: u32,
    ) -> Result<()> {
        let run = {
            let mut clock = self
                .clock
                .try_borrow_mut()
                .map_err(|_| EidolonError::Reentrant("start_animation"))?;
            if !clock.stopped {
                return Err(EidolonError::AlreadyRunning);
            }
            // the frame fn slot is busy while a frame is executing
            let mut slot = self
                .frame_fn
                .try_borrow_mut()
                .map_err(|_| EidolonError::Reentrant("start_animation"))?;
            *slot = Some(Box::new(frame_fn));

            clock.run += 1;
            clock.stopped = false;
            clock.interval_ms = interval_ms;
            clock.last_tick = self.host.now_ms();
            clock.run
        };
        log::debug!("animation started, tick every {}ms", interval_ms);

        match self.arm(run, interval_ms) {
            Ok(handle) => {
                self.clock.borrow_mut().timer = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.clock.borrow_mut().stopped = true;
                self.release_frame_fn();
                Err(err.into())
            }
        }
    }

    /// Running → Idle. Takes effect at the next tick: a timer already in
    /// flight still fires but does nothing. Calling it twice is harmless.
    pub fn stop(&self) {
        {
            let mut clock = self.clock.borrow_mut();
            if !clock.stopped {
                log::debug!("animation stopped");
            }
            clock.stopped = true;
        }
        self.release_frame_fn();
    }

    pub fn is_running(&self) -> bool {
        !self.clock.borrow().stopped
    }

    /// Handle of the timer that will drive the next tick, if one is in flight.
    pub fn armed_timer(&self) -> Option<TimerHandle> {
        self.clock.borrow().timer
    }

    // An idle loop must not keep the frame fn alive: it may hold clones of
    // this handle. The slot is busy while a frame runs, tick releases it then.
    fn release_frame_fn(&self) {
        let released = match self.frame_fn.try_borrow_mut() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        drop(released);
    }

    fn arm(&self, run: u64, delay_ms: u32) -> anyhow::Result<TimerHandle> {
        let next = self.clone();
        self.host
            .set_timeout(delay_ms, Box::new(move || next.tick(run)))
    }

    fn tick(&self, run: u64) {
        let last_tick = {
            let mut clock = self.clock.borrow_mut();
            if clock.run != run {
                log::debug!("ignoring timer from an earlier run");
                return;
            }
            clock.timer = None;
            (!clock.stopped).then_some(clock.last_tick)
        };
        let Some(last_tick) = last_tick else {
            self.release_frame_fn();
            return;
        };

        let now = self.host.now_ms();
        {
            let mut stage = self.stage.borrow_mut();
            if let Some(frame_fn) = self.frame_fn.borrow_mut().as_mut() {
                if let Err(err) = frame_fn(&mut *stage, now - last_tick) {
                    log::error!("frame function failed: {:#}", err);
                }
            }
            stage.composite();
        }

        // the frame may have stopped (or stopped and restarted) the loop
        let interval_ms = {
            let mut clock = self.clock.borrow_mut();
            clock.last_tick = now;
            (!clock.stopped && clock.run == run).then_some(clock.interval_ms)
        };
        if let Some(interval_ms) = interval_ms {
            match self.arm(run, interval_ms) {
                Ok(handle) => self.clock.borrow_mut().timer = Some(handle),
                Err(err) => {
                    log::error!("could not re-arm tick timer, stopping: {:#}", err);
                    self.clock.borrow_mut().stopped = true;
                }
            }
        }
        if !self.is_running() {
            self.release_frame_fn();
        }

        self.stage.borrow_mut().end_frame();
    }
}

fn deliver_input<H: Host>(stage: &Weak<RefCell<Stage<H>>>, event: &InputEvent) {
    let Some(stage) = stage.upgrade() else {
        return;
    };
    match stage.try_borrow_mut() {
        Ok(mut stage) => stage.handle_input(event),
        Err(_) => log::warn!("input event dropped, stage busy: {:?}", event),
    };
}

fn on_image_loaded<H: Host>(stage: &Weak<RefCell<Stage<H>>>, generation: Generation, id: ImageId) {
    let Some(stage) = stage.upgrade() else {
        return;
    };
    let ready = match stage.try_borrow_mut() {
        Ok(mut stage) => stage.images.notify(generation, id),
        Err(_) => {
            log::warn!("image load notification dropped, stage busy");
            None
        }
    };
    // borrow released: the continuation may call back into Eidolon
    if let Some(on_complete) = ready {
        on_complete();
    }
}
