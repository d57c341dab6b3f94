//! Pointer state as seen by the frame function.
//!
//! Edge flags (`clicked_this_frame`, `moved_this_frame`) are raised by events
//! here but only ever lowered by the tick loop, after the frame that saw them.
//! A frame therefore observes each edge exactly once.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Move,
    Down,
    Up,
    Click,
}

/// Input as delivered by the host, in display (onscreen) coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Pointer {
        kind: PointerKind,
        offset_x: f64,
        offset_y: f64,
    },
    Key {
        code: String,
    },
}

impl InputEvent {
    pub fn pointer(kind: PointerKind, offset_x: f64, offset_y: f64) -> Self {
        InputEvent::Pointer {
            kind,
            offset_x,
            offset_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputSnapshot {
    /// logical (game) coordinates, already divided by the composite scale
    pub pointer_x: f64,
    pub pointer_y: f64,
    pub clicked_this_frame: bool,
    pub pointer_down: bool,
    pub moved_this_frame: bool,
}

impl InputSnapshot {
    /// Fold one event into the snapshot. `scale` is (scale_x, scale_y) of the
    /// dual surface.
    pub fn apply(&mut self, event: &InputEvent, scale: (f64, f64)) {
        match event {
            InputEvent::Pointer {
                kind,
                offset_x,
                offset_y,
            } => {
                match kind {
                    PointerKind::Click => self.clicked_this_frame = true,
                    PointerKind::Move => self.moved_this_frame = true,
                    // down/up also refresh the position, so count as a move
                    PointerKind::Down => {
                        self.pointer_down = true;
                        self.moved_this_frame = true;
                    }
                    PointerKind::Up => {
                        self.pointer_down = false;
                        self.moved_this_frame = true;
                    }
                }
                self.pointer_x = offset_x / scale.0;
                self.pointer_y = offset_y / scale.1;
            }
            InputEvent::Key { code } => {
                log::debug!("keydown ignored: {}", code);
            }
        }
    }

    /// Lower the edge flags. Called by the tick loop only.
    pub(crate) fn end_frame(&mut self) {
        self.clicked_this_frame = false;
        self.moved_this_frame = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn move_maps_display_to_logical_coordinates() {
        let mut input = InputSnapshot::default();
        input.apply(&InputEvent::pointer(PointerKind::Move, 100.0, 100.0), (2.0, 2.0));
        assert_relative_eq!(input.pointer_x, 50.0);
        assert_relative_eq!(input.pointer_y, 50.0);
        assert!(input.moved_this_frame);
        assert!(!input.clicked_this_frame);
    }

    #[test]
    fn down_and_up_track_button_and_position() {
        let mut input = InputSnapshot::default();
        input.apply(&InputEvent::pointer(PointerKind::Down, 10.0, 20.0), (1.0, 1.0));
        assert!(input.pointer_down);
        assert!(input.moved_this_frame);
        input.end_frame();
        input.apply(&InputEvent::pointer(PointerKind::Up, 30.0, 40.0), (1.0, 1.0));
        assert!(!input.pointer_down);
        assert!(input.moved_this_frame);
        assert_relative_eq!(input.pointer_x, 30.0);
        assert_relative_eq!(input.pointer_y, 40.0);
    }

    #[test]
    fn click_sets_edge_flag_until_end_of_frame() {
        let mut input = InputSnapshot::default();
        input.apply(&InputEvent::pointer(PointerKind::Click, 5.0, 6.0), (1.0, 1.0));
        assert!(input.clicked_this_frame);
        input.end_frame();
        assert!(!input.clicked_this_frame);
        assert!(!input.moved_this_frame);
        // level state survives the frame boundary
        assert_relative_eq!(input.pointer_x, 5.0);
    }

    #[test]
    fn key_events_leave_snapshot_alone() {
        let mut input = InputSnapshot::default();
        input.apply(
            &InputEvent::Key {
                code: "Space".into(),
            },
            (1.0, 1.0),
        );
        assert_eq!(input, InputSnapshot::default());
    }
}
