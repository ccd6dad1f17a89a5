// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Event surface: maps raw pointer and key input to an ordered list of
//! [`Intent`]s.
//!
//! The surface reads the current view but never mutates a model. Camera
//! gestures come out as [`Intent::Commit`] view deltas computed against the
//! view passed in, so every event is resolved against the state left by the
//! previous one.

use cad_sync_proto::{AnimationChange, ControlMode, Delta, FieldGroup, ViewChange, ViewState};
use glam::Vec2;

use crate::camera;
use crate::view;

/// Pointer movement below this (viewport fraction) still counts as a click.
pub const CLICK_SLOP: f32 = 0.005;

/// Mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    /// Left button; drags follow the control mode.
    Primary,
    /// Right button; drags always pan.
    Secondary,
}

/// Held modifier keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// Shift.
    pub shift: bool,
    /// Control.
    pub ctrl: bool,
    /// Meta / command.
    pub meta: bool,
}

impl Modifiers {
    /// True when a click should toggle instead of replace.
    pub fn additive(self) -> bool {
        self.shift || self.ctrl || self.meta
    }
}

/// Key presses the surface understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Escape.
    Escape,
    /// A printable character.
    Char(char),
}

/// Raw input. Coordinates are normalized to `[0, 1]`, origin top-left.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// Button pressed.
    PointerDown {
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
        /// Button.
        button: PointerButton,
    },
    /// Pointer moved.
    PointerMove {
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
    },
    /// Button released.
    PointerUp {
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
        /// Modifiers held at release.
        modifiers: Modifiers,
    },
    /// Wheel notches; positive scrolls away from the user and zooms out.
    Wheel {
        /// Notch count.
        delta: f32,
    },
    /// Key pressed.
    Key(Key),
    /// Double click.
    DoubleClick {
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
    },
    /// Pointer left the canvas.
    Leave,
    /// Animation slider dragged.
    Scrub {
        /// Track path.
        track: String,
        /// Relative time; clamped to `[0, 1]`.
        time: f32,
    },
}

/// What an input asks the view to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Pick and select; `additive` toggles instead of replacing.
    Pick {
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
        /// Toggle instead of replace.
        additive: bool,
    },
    /// Probe for the hover highlight. Transient.
    Hover {
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
    },
    /// Drop the hover highlight. Transient.
    ClearHover,
    /// Local change to apply and synchronize.
    Commit(Delta),
    /// Move the camera target to the point under the pointer.
    Recenter {
        /// X coordinate.
        x: f32,
        /// Y coordinate.
        y: f32,
    },
    /// Empty the selection.
    ClearSelection,
    /// Hide the selected shapes, or show them when all are hidden.
    ToggleSelectedVisibility,
    /// Return the camera to its home position.
    ResetCamera,
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    button: PointerButton,
    start: Vec2,
    last: Vec2,
    moved: bool,
}

/// Pointer gesture state.
#[derive(Debug, Default)]
pub struct Surface {
    drag: Option<Drag>,
}

impl Surface {
    /// Idle surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a button is held.
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Map one event to intents, in the order they must be applied.
    pub fn handle(&mut self, event: InputEvent, view: &ViewState) -> Vec<Intent> {
        match event {
            InputEvent::PointerDown { x, y, button } => {
                let at = Vec2::new(x, y);
                self.drag = Some(Drag {
                    button,
                    start: at,
                    last: at,
                    moved: false,
                });
                Vec::new()
            }
            InputEvent::PointerMove { x, y } => {
                let at = Vec2::new(x, y);
                let Some(drag) = &mut self.drag else {
                    return vec![Intent::Hover { x, y }];
                };
                if !drag.moved && at.distance(drag.start) <= CLICK_SLOP {
                    return Vec::new();
                }
                drag.moved = true;
                let delta = at - drag.last;
                drag.last = at;
                let cam = &view.camera;
                let next = match (drag.button, view.control) {
                    (PointerButton::Secondary, _) | (PointerButton::Primary, ControlMode::Pan) => {
                        camera::pan(cam, delta, view.speeds.pan)
                    }
                    (PointerButton::Primary, ControlMode::Orbit) => {
                        camera::orbit(cam, delta, view.speeds.rotate, view.camera_control)
                    }
                    (PointerButton::Primary, ControlMode::None) => return Vec::new(),
                };
                camera_commits(view, next)
            }
            InputEvent::PointerUp { x, y, modifiers } => match self.drag.take() {
                Some(drag) if !drag.moved => vec![Intent::Pick {
                    x,
                    y,
                    additive: modifiers.additive(),
                }],
                _ => Vec::new(),
            },
            InputEvent::Wheel { delta } => {
                if delta == 0.0 || !delta.is_finite() {
                    return Vec::new();
                }
                camera_commits(view, camera::zoom(&view.camera, -delta, view.speeds.zoom))
            }
            InputEvent::DoubleClick { x, y } => {
                self.drag = None;
                vec![Intent::Recenter { x, y }]
            }
            InputEvent::Key(key) => key_intents(key, view),
            InputEvent::Leave => {
                self.drag = None;
                vec![Intent::ClearHover]
            }
            InputEvent::Scrub { track, time } => {
                if !time.is_finite() {
                    return Vec::new();
                }
                vec![Intent::Commit(Delta::Animation {
                    change: AnimationChange::Position {
                        track,
                        time: time.clamp(0.0, 1.0),
                    },
                    version: 0,
                })]
            }
        }
    }
}

/// View deltas that move the camera of `view` to `next`.
pub fn camera_commits(view: &ViewState, next: cad_scene_port::CameraState) -> Vec<Intent> {
    let mut target = view.clone();
    target.camera = next;
    view::diff(view, &target)
        .into_iter()
        .filter(|d| d.group() == FieldGroup::View)
        .map(Intent::Commit)
        .collect()
}

fn key_intents(key: Key, view: &ViewState) -> Vec<Intent> {
    let commit = |c: ViewChange| vec![Intent::Commit(Delta::view(c, 0))];
    match key {
        Key::Escape => vec![Intent::ClearSelection],
        Key::Char('o') => camera_commits(view, camera::toggle_projection(&view.camera)),
        Key::Char('a') => commit(ViewChange::Axes(!view.options.axes)),
        Key::Char('g') => {
            let mut grid = view.options.grid;
            grid[0] = !grid[0];
            commit(ViewChange::Grid(grid))
        }
        Key::Char('h') => vec![Intent::ToggleSelectedVisibility],
        Key::Char('r') => vec![Intent::ResetCamera],
        Key::Char(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_scene_port::ProjectionKind;

    fn down(x: f32, y: f32) -> InputEvent {
        InputEvent::PointerDown {
            x,
            y,
            button: PointerButton::Primary,
        }
    }

    fn up(x: f32, y: f32, modifiers: Modifiers) -> InputEvent {
        InputEvent::PointerUp { x, y, modifiers }
    }

    #[test]
    fn click_without_motion_picks() {
        let view = ViewState::default();
        let mut s = Surface::new();
        assert!(s.handle(down(0.5, 0.5), &view).is_empty());
        let intents = s.handle(up(0.5, 0.5, Modifiers::default()), &view);
        assert_eq!(
            intents,
            vec![Intent::Pick {
                x: 0.5,
                y: 0.5,
                additive: false
            }]
        );
    }

    #[test]
    fn shift_click_is_additive() {
        let view = ViewState::default();
        let mut s = Surface::new();
        s.handle(down(0.2, 0.2), &view);
        let mods = Modifiers {
            shift: true,
            ..Modifiers::default()
        };
        assert!(matches!(
            s.handle(up(0.2, 0.2, mods), &view).as_slice(),
            [Intent::Pick { additive: true, .. }]
        ));
    }

    #[test]
    fn drag_orbits_and_does_not_pick() {
        let view = ViewState::default();
        let mut s = Surface::new();
        s.handle(down(0.5, 0.5), &view);
        let intents = s.handle(InputEvent::PointerMove { x: 0.6, y: 0.5 }, &view);
        assert!(!intents.is_empty());
        assert!(intents.iter().all(|i| matches!(
            i,
            Intent::Commit(Delta::View { .. })
        )));
        assert!(s.handle(up(0.6, 0.5, Modifiers::default()), &view).is_empty());
    }

    #[test]
    fn control_mode_none_ignores_drags() {
        let view = ViewState {
            control: ControlMode::None,
            ..ViewState::default()
        };
        let mut s = Surface::new();
        s.handle(down(0.5, 0.5), &view);
        assert!(s
            .handle(InputEvent::PointerMove { x: 0.9, y: 0.9 }, &view)
            .is_empty());
    }

    #[test]
    fn wheel_zooms() {
        let view = ViewState::default();
        let intents = Surface::new().handle(InputEvent::Wheel { delta: -1.0 }, &view);
        assert!(matches!(
            intents.as_slice(),
            [Intent::Commit(Delta::View {
                change: ViewChange::Zoom(z),
                ..
            })] if *z > 1.0
        ));
    }

    #[test]
    fn keys_map_to_intents() {
        let view = ViewState::default();
        let mut s = Surface::new();
        assert_eq!(
            s.handle(InputEvent::Key(Key::Escape), &view),
            vec![Intent::ClearSelection]
        );
        assert_eq!(
            s.handle(InputEvent::Key(Key::Char('o')), &view),
            vec![Intent::Commit(Delta::view(
                ViewChange::Projection(ProjectionKind::Perspective),
                0
            ))]
        );
        assert_eq!(
            s.handle(InputEvent::Key(Key::Char('a')), &view),
            vec![Intent::Commit(Delta::view(
                ViewChange::Axes(!view.options.axes),
                0
            ))]
        );
        assert!(s.handle(InputEvent::Key(Key::Char('z')), &view).is_empty());
    }

    #[test]
    fn hover_only_when_idle() {
        let view = ViewState::default();
        let mut s = Surface::new();
        assert_eq!(
            s.handle(InputEvent::PointerMove { x: 0.1, y: 0.1 }, &view),
            vec![Intent::Hover { x: 0.1, y: 0.1 }]
        );
        assert_eq!(s.handle(InputEvent::Leave, &view), vec![Intent::ClearHover]);
    }

    #[test]
    fn scrub_commits_a_clamped_position() {
        let view = ViewState::default();
        let mut s = Surface::new();
        let scrub = |time| InputEvent::Scrub {
            track: "/arm".into(),
            time,
        };
        assert_eq!(
            s.handle(scrub(1.5), &view),
            vec![Intent::Commit(Delta::Animation {
                change: AnimationChange::Position {
                    track: "/arm".into(),
                    time: 1.0,
                },
                version: 0,
            })]
        );
        assert!(s.handle(scrub(f32::NAN), &view).is_empty());
    }
}
