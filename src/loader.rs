//! Image load gate
//! - one batch of named images is pending at a time
//! - every decode completion flips one entry to loaded
//! - the batch continuation fires exactly once, when the last entry flips
//!
//! ELI5: the continuation is stored as `Option<Box<dyn FnOnce()>>` and firing
//! means `take()`-ing it out. Once taken there is nothing left to call, so a
//! duplicate notification after completion can't fire it again.
use crate::error::{EidolonError, Result};
use crate::host::PixelBuffer;
use std::collections::HashMap;

pub type Continuation = Box<dyn FnOnce()>;

/// Identity of one decode request. Notifications carry this, not the name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId(u64);

/// Which batch a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

pub struct PendingImage<I> {
    pub id: ImageId,
    pub loaded: bool,
    pub image: I,
    /// RGBA copy, present once `image_setup_pixels` ran for this image
    pub pixels: Option<PixelBuffer>,
}

pub struct LoadGate<I> {
    generation: Generation,
    next_id: u64,
    images: HashMap<String, PendingImage<I>>,
    on_complete: Option<Continuation>,
    // no completion check until every request of the batch is registered
    sealed: bool,
}

impl<I> Default for LoadGate<I> {
    fn default() -> Self {
        Self {
            generation: Generation(0),
            next_id: 0,
            images: HashMap::new(),
            on_complete: None,
            sealed: false,
        }
    }
}

impl<I> LoadGate<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the current batch, pending or not, and open a new one.
    pub fn begin(&mut self, on_complete: Continuation) -> Generation {
        if !self.images.is_empty() && !self.is_complete() {
            log::debug!(
                "abandoning image batch with {} pending load(s)",
                self.images.values().filter(|pending| !pending.loaded).count()
            );
        }
        self.generation = Generation(self.generation.0 + 1);
        self.images.clear();
        self.on_complete = Some(on_complete);
        self.sealed = false;
        self.generation
    }

    pub fn next_ticket(&mut self) -> ImageId {
        self.next_id += 1;
        ImageId(self.next_id)
    }

    /// Register a requested image. A repeated name replaces the earlier entry,
    /// whose notification will then match nothing and be ignored.
    pub fn insert(&mut self, name: &str, id: ImageId, image: I) {
        self.images.insert(
            name.to_string(),
            PendingImage {
                id,
                loaded: false,
                image,
                pixels: None,
            },
        );
    }

    /// All requests are registered: from now on completion may fire. Returns
    /// the continuation if the batch is already complete (empty batch).
    #[must_use]
    pub fn seal(&mut self) -> Option<Continuation> {
        self.sealed = true;
        self.try_complete()
    }

    /// A decode finished. Returns the continuation when this completion was
    /// the last one missing. The caller runs it after releasing its borrow.
    #[must_use]
    pub fn notify(&mut self, generation: Generation, id: ImageId) -> Option<Continuation> {
        if generation != self.generation {
            log::debug!("ignoring load notification from superseded batch");
            return None;
        }
        match self.images.values_mut().find(|pending| pending.id == id) {
            Some(pending) => pending.loaded = true,
            None => {
                log::warn!("load notification matched no image in the current batch");
                return None;
            }
        }
        self.try_complete()
    }

    fn try_complete(&mut self) -> Option<Continuation> {
        if self.sealed && self.on_complete.is_some() && self.all_loaded() {
            log::debug!("image batch complete ({} image(s))", self.images.len());
            return self.on_complete.take();
        }
        None
    }

    fn all_loaded(&self) -> bool {
        self.images.values().all(|pending| pending.loaded)
    }

    /// Continuation has fired for the current batch.
    pub fn is_complete(&self) -> bool {
        self.sealed && self.on_complete.is_none()
    }

    pub fn get(&self, name: &str) -> Result<&PendingImage<I>> {
        self.images
            .get(name)
            .ok_or_else(|| EidolonError::ImageNotFound(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut PendingImage<I>> {
        self.images
            .get_mut(name)
            .ok_or_else(|| EidolonError::ImageNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<u32>>, Continuation) {
        let count = Rc::new(Cell::new(0));
        let inner = count.clone();
        (count, Box::new(move || inner.set(inner.get() + 1)))
    }

    fn run(continuation: Option<Continuation>) {
        if let Some(continuation) = continuation {
            continuation();
        }
    }

    fn batch(gate: &mut LoadGate<()>, names: &[&str], done: Continuation) -> (Generation, Vec<ImageId>) {
        let generation = gate.begin(done);
        let ids = names
            .iter()
            .map(|name| {
                let id = gate.next_ticket();
                gate.insert(name, id, ());
                id
            })
            .collect();
        run(gate.seal());
        (generation, ids)
    }

    #[test]
    fn reverse_order_fires_once_after_last() {
        let (count, done) = counter();
        let mut gate = LoadGate::new();
        let (generation, ids) = batch(&mut gate, &["a.png", "b.png"], done);

        run(gate.notify(generation, ids[1]));
        assert_eq!(count.get(), 0);
        run(gate.notify(generation, ids[0]));
        assert_eq!(count.get(), 1);
        assert!(gate.is_complete());
    }

    #[test]
    fn every_interleaving_of_three_fires_exactly_once() {
        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in orders {
            let (count, done) = counter();
            let mut gate = LoadGate::new();
            let (generation, ids) = batch(&mut gate, &["a", "b", "c"], done);
            for (step, index) in order.iter().enumerate() {
                run(gate.notify(generation, ids[*index]));
                let expected = if step == 2 { 1 } else { 0 };
                assert_eq!(count.get(), expected, "order {:?} step {}", order, step);
            }
        }
    }

    #[test]
    fn duplicate_notification_after_completion_does_not_refire() {
        let (count, done) = counter();
        let mut gate = LoadGate::new();
        let (generation, ids) = batch(&mut gate, &["a"], done);
        run(gate.notify(generation, ids[0]));
        run(gate.notify(generation, ids[0]));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn stale_notification_from_superseded_batch_is_ignored() {
        let (old_count, old_done) = counter();
        let (new_count, new_done) = counter();
        let mut gate = LoadGate::new();
        let (old_generation, old_ids) = batch(&mut gate, &["a"], old_done);
        let (generation, ids) = batch(&mut gate, &["a", "b"], new_done);

        run(gate.notify(old_generation, old_ids[0]));
        assert_eq!(old_count.get(), 0);
        assert!(!gate.get("a").unwrap().loaded);

        run(gate.notify(generation, ids[0]));
        run(gate.notify(generation, ids[1]));
        assert_eq!(new_count.get(), 1);
        assert_eq!(old_count.get(), 0);
    }

    #[test]
    fn unknown_id_is_ignored() {
        let (count, done) = counter();
        let mut gate = LoadGate::new();
        let (generation, _) = batch(&mut gate, &["a"], done);
        let stray = gate.next_ticket();
        assert!(gate.notify(generation, stray).is_none());
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn empty_batch_completes_on_seal() {
        let (count, done) = counter();
        let mut gate: LoadGate<()> = LoadGate::new();
        batch(&mut gate, &[], done);
        assert_eq!(count.get(), 1);
        assert!(gate.is_complete());
    }

    #[test]
    fn no_completion_before_seal() {
        let (count, done) = counter();
        let mut gate = LoadGate::new();
        let generation = gate.begin(done);
        let id = gate.next_ticket();
        gate.insert("a", id, ());
        assert!(gate.notify(generation, id).is_none());
        run(gate.seal());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn missing_name_is_image_not_found() {
        let gate: LoadGate<()> = LoadGate::new();
        assert!(matches!(
            gate.get("nope.png"),
            Err(EidolonError::ImageNotFound(name)) if name == "nope.png"
        ));
    }
}
