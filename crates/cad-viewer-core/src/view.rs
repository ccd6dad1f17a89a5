// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! View state model: camera, clipping, helpers, controls and animation.
//!
//! Fields are replaced directly (last writer wins, no blending). Every
//! change is validated before anything is written.

use cad_scene_port::{same_f32, same_vec3, CameraState, ClipPlane};
use cad_sync_proto::{
    AnimationChange, AnimationPosition, CameraControl, Delta, Playback, ViewChange, ViewState,
};
use tracing::warn;

use crate::error::RejectReason;

/// What an accepted view delta changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEffect {
    /// Value already current.
    Unchanged,
    /// Camera fields changed.
    Camera,
    /// Clip planes or clip mode changed.
    ClipPlanes,
    /// Render options (lights, edges, helpers) changed.
    Options,
    /// Controls changed; nothing to draw.
    Controls,
    /// Animation position, tracks or loop flag changed.
    Animation,
}

fn finite(v: f32, what: &str) -> Result<f32, RejectReason> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(RejectReason::malformed(format!("{what} is not finite")))
    }
}

fn finite3(v: [f32; 3], what: &str) -> Result<[f32; 3], RejectReason> {
    if v.iter().all(|c| c.is_finite()) {
        Ok(v)
    } else {
        Err(RejectReason::malformed(format!("{what} is not finite")))
    }
}

fn positive(v: f32, what: &str) -> Result<f32, RejectReason> {
    if finite(v, what)? > 0.0 {
        Ok(v)
    } else {
        Err(RejectReason::malformed(format!("{what} must be positive")))
    }
}

/// Normalize an edge color to `#rrggbb`.
pub fn normalize_color(raw: &str) -> Result<String, RejectReason> {
    let hex = raw.strip_prefix('#').unwrap_or(raw);
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(format!("#{}", hex.to_ascii_lowercase()))
    } else {
        Err(RejectReason::malformed(format!("bad edge color {raw:?}")))
    }
}

fn set_vec3(slot: &mut [f32; 3], v: [f32; 3], what: &str) -> Result<bool, RejectReason> {
    let v = finite3(v, what)?;
    if same_vec3(*slot, v) {
        return Ok(false);
    }
    *slot = v;
    Ok(true)
}

fn set_f32(slot: &mut f32, v: f32) -> bool {
    if same_f32(*slot, v) {
        return false;
    }
    *slot = v;
    true
}

fn set_eq<T: PartialEq>(slot: &mut T, v: T) -> bool {
    if *slot == v {
        return false;
    }
    *slot = v;
    true
}

fn same_planes(a: &[ClipPlane], b: &[ClipPlane]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            same_vec3(x.normal, y.normal) && same_f32(x.offset, y.offset) && x.enabled == y.enabled
        })
}

/// Apply one view change to `state`. All-or-nothing.
pub fn apply_view_change(
    state: &mut ViewState,
    change: &ViewChange,
) -> Result<ViewEffect, RejectReason> {
    use ViewEffect::{Camera, ClipPlanes, Controls, Options, Unchanged};

    let cam = &mut state.camera;
    let opts = &mut state.options;
    let (changed, effect) = match change {
        ViewChange::Position(v) => (set_vec3(&mut cam.position, *v, "position")?, Camera),
        ViewChange::Target(v) => (set_vec3(&mut cam.target, *v, "target")?, Camera),
        ViewChange::Up(v) => {
            if v.iter().all(|c| *c == 0.0) {
                return Err(RejectReason::malformed("up vector is zero"));
            }
            (set_vec3(&mut cam.up, *v, "up")?, Camera)
        }
        ViewChange::Quaternion(q) => {
            if let Some(q) = q {
                if !q.iter().all(|c| c.is_finite()) {
                    return Err(RejectReason::malformed("quaternion is not finite"));
                }
                if state.camera_control == CameraControl::Orbit {
                    warn!("quaternion ignored under orbit controls");
                    return Ok(Unchanged);
                }
            }
            (set_eq(&mut cam.quaternion, *q), Camera)
        }
        ViewChange::FovY(v) => {
            let v = positive(*v, "fov")?;
            if v >= core::f32::consts::PI {
                return Err(RejectReason::malformed("fov must be below pi"));
            }
            (set_f32(&mut cam.fov_y_radians, v), Camera)
        }
        ViewChange::OrthoScale(v) => (
            set_f32(&mut cam.ortho_scale, positive(*v, "ortho scale")?),
            Camera,
        ),
        ViewChange::Projection(p) => (set_eq(&mut cam.projection, *p), Camera),
        ViewChange::Zoom(v) => (set_f32(&mut cam.zoom, positive(*v, "zoom")?), Camera),
        ViewChange::ClipPlanes(planes) => {
            if let Some(bad) = planes.iter().position(|p| !p.is_valid()) {
                return Err(RejectReason::malformed(format!("clip plane {bad} is invalid")));
            }
            if same_planes(&state.clip_planes, planes) {
                (false, ClipPlanes)
            } else {
                state.clip_planes.clone_from(planes);
                (true, ClipPlanes)
            }
        }
        ViewChange::ClipIntersection(v) => (set_eq(&mut state.clip_intersection, *v), ClipPlanes),
        ViewChange::Grid(v) => (set_eq(&mut opts.grid, *v), Options),
        ViewChange::Axes(v) => (set_eq(&mut opts.axes, *v), Options),
        ViewChange::Axes0(v) => (set_eq(&mut opts.axes0, *v), Options),
        ViewChange::Ticks(v) => {
            if *v == 0 {
                return Err(RejectReason::malformed("ticks must be positive"));
            }
            (set_eq(&mut opts.ticks, *v), Options)
        }
        ViewChange::AmbientIntensity(v) => (
            set_f32(&mut opts.ambient_intensity, finite(*v, "ambient intensity")?),
            Options,
        ),
        ViewChange::DirectIntensity(v) => (
            set_f32(&mut opts.direct_intensity, finite(*v, "direct intensity")?),
            Options,
        ),
        ViewChange::EdgeColor(c) => (set_eq(&mut opts.edge_color, normalize_color(c)?), Options),
        ViewChange::Transparent(v) => (set_eq(&mut opts.transparent, *v), Options),
        ViewChange::BlackEdges(v) => (set_eq(&mut opts.black_edges, *v), Options),
        ViewChange::ControlMode(m) => (set_eq(&mut state.control, *m), Controls),
        ViewChange::CameraControl(c) => {
            if state.camera_control == *c {
                (false, Controls)
            } else {
                state.camera_control = *c;
                state.camera = CameraState::default();
                (true, Camera)
            }
        }
        ViewChange::Speeds(s) => {
            if !s.is_valid() {
                return Err(RejectReason::malformed("control speeds must be positive"));
            }
            (set_eq(&mut state.speeds, *s), Controls)
        }
    };
    Ok(if changed { effect } else { Unchanged })
}

/// Apply one animation change to `state`. All-or-nothing.
pub fn apply_animation_change(
    state: &mut ViewState,
    change: &AnimationChange,
) -> Result<ViewEffect, RejectReason> {
    let anim = &mut state.animation;
    let changed = match change {
        AnimationChange::Position { track, time } => {
            let time = finite(*time, "animation time")?;
            if !(0.0..=1.0).contains(&time) {
                return Err(RejectReason::malformed(format!(
                    "animation time {time} outside [0, 1]"
                )));
            }
            if !anim.knows_track(track) {
                return Err(RejectReason::UnknownTrack(track.clone()));
            }
            let unchanged = anim
                .position
                .as_ref()
                .is_some_and(|p| &p.track == track && same_f32(p.time, time));
            if unchanged {
                false
            } else {
                anim.position = Some(AnimationPosition {
                    track: track.clone(),
                    time,
                });
                true
            }
        }
        AnimationChange::Tracks(tracks) => {
            for t in tracks {
                t.validate()
                    .map_err(|e| RejectReason::malformed(format!("track {}: {e}", t.path)))?;
            }
            if anim.tracks == *tracks {
                false
            } else {
                anim.tracks.clone_from(tracks);
                let stale = anim
                    .position
                    .as_ref()
                    .is_some_and(|p| !anim.knows_track(&p.track));
                if stale {
                    anim.position = None;
                }
                true
            }
        }
        AnimationChange::Loop(v) => set_eq(&mut anim.looping, *v),
    };
    Ok(if changed {
        ViewEffect::Animation
    } else {
        ViewEffect::Unchanged
    })
}

/// Check a whole view state (used for full states).
pub fn validate_view(state: &ViewState) -> Result<(), RejectReason> {
    if !state.camera.is_valid() {
        return Err(RejectReason::malformed("camera is invalid"));
    }
    if state.clip_planes.iter().any(|p| !p.is_valid()) {
        return Err(RejectReason::malformed("clip plane is invalid"));
    }
    if !state.speeds.is_valid() {
        return Err(RejectReason::malformed("control speeds must be positive"));
    }
    normalize_color(&state.options.edge_color)?;
    for t in &state.animation.tracks {
        t.validate()
            .map_err(|e| RejectReason::malformed(format!("track {}: {e}", t.path)))?;
    }
    if let Some(p) = &state.animation.position {
        if !(0.0..=1.0).contains(&p.time) {
            return Err(RejectReason::malformed("animation time outside [0, 1]"));
        }
    }
    Ok(())
}

/// View and animation deltas that turn `prev` into `next`.
///
/// Track lists are kernel-owned and never diffed. Deltas are tagged with
/// revision 0.
pub fn diff(prev: &ViewState, next: &ViewState) -> Vec<Delta> {
    let mut out = Vec::new();
    let mut push = |c: ViewChange| out.push(Delta::view(c, 0));
    let (a, b) = (&prev.camera, &next.camera);
    if !same_vec3(a.position, b.position) {
        push(ViewChange::Position(b.position));
    }
    if !same_vec3(a.target, b.target) {
        push(ViewChange::Target(b.target));
    }
    if !same_vec3(a.up, b.up) {
        push(ViewChange::Up(b.up));
    }
    if a.quaternion != b.quaternion {
        push(ViewChange::Quaternion(b.quaternion));
    }
    if !same_f32(a.fov_y_radians, b.fov_y_radians) {
        push(ViewChange::FovY(b.fov_y_radians));
    }
    if !same_f32(a.ortho_scale, b.ortho_scale) {
        push(ViewChange::OrthoScale(b.ortho_scale));
    }
    if a.projection != b.projection {
        push(ViewChange::Projection(b.projection));
    }
    if !same_f32(a.zoom, b.zoom) {
        push(ViewChange::Zoom(b.zoom));
    }
    if !same_planes(&prev.clip_planes, &next.clip_planes) {
        push(ViewChange::ClipPlanes(next.clip_planes.clone()));
    }
    if prev.clip_intersection != next.clip_intersection {
        push(ViewChange::ClipIntersection(next.clip_intersection));
    }
    let (a, b) = (&prev.options, &next.options);
    if a.grid != b.grid {
        push(ViewChange::Grid(b.grid));
    }
    if a.axes != b.axes {
        push(ViewChange::Axes(b.axes));
    }
    if a.axes0 != b.axes0 {
        push(ViewChange::Axes0(b.axes0));
    }
    if a.ticks != b.ticks {
        push(ViewChange::Ticks(b.ticks));
    }
    if !same_f32(a.ambient_intensity, b.ambient_intensity) {
        push(ViewChange::AmbientIntensity(b.ambient_intensity));
    }
    if !same_f32(a.direct_intensity, b.direct_intensity) {
        push(ViewChange::DirectIntensity(b.direct_intensity));
    }
    if a.edge_color != b.edge_color {
        push(ViewChange::EdgeColor(b.edge_color.clone()));
    }
    if a.transparent != b.transparent {
        push(ViewChange::Transparent(b.transparent));
    }
    if a.black_edges != b.black_edges {
        push(ViewChange::BlackEdges(b.black_edges));
    }
    if prev.control != next.control {
        push(ViewChange::ControlMode(next.control));
    }
    if prev.camera_control != next.camera_control {
        push(ViewChange::CameraControl(next.camera_control));
    }
    if prev.speeds != next.speeds {
        push(ViewChange::Speeds(next.speeds));
    }

    let (a, b) = (&prev.animation, &next.animation);
    if let Some(pos) = &b.position {
        let same = a
            .position
            .as_ref()
            .is_some_and(|p| p.track == pos.track && same_f32(p.time, pos.time));
        if !same {
            out.push(Delta::Animation {
                change: AnimationChange::Position {
                    track: pos.track.clone(),
                    time: pos.time,
                },
                version: 0,
            });
        }
    }
    if a.looping != b.looping {
        out.push(Delta::Animation {
            change: AnimationChange::Loop(b.looping),
            version: 0,
        });
    }
    out
}

/// Owner of the live [`ViewState`] plus local-only playback.
#[derive(Debug, Default)]
pub struct ViewModel {
    state: ViewState,
    playhead: f32,
}

impl ViewModel {
    /// Model at the default view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current view.
    pub fn snapshot(&self) -> &ViewState {
        &self.state
    }

    /// Apply a view or animation delta.
    pub fn apply_delta(&mut self, delta: &Delta) -> Result<ViewEffect, RejectReason> {
        match delta {
            Delta::View { change, .. } => apply_view_change(&mut self.state, change),
            Delta::Animation { change, .. } => apply_animation_change(&mut self.state, change),
            other => Err(RejectReason::malformed(format!(
                "{:?} delta is not a view delta",
                other.group()
            ))),
        }
    }

    /// Replace the whole view. Playback restarts stopped.
    pub fn replace(&mut self, state: ViewState) {
        self.state = state;
        self.playhead = 0.0;
    }

    /// Local playback position in `[0, 1]`.
    pub fn playhead(&self) -> f32 {
        self.playhead
    }

    /// Local playback state.
    pub fn playback(&self) -> Playback {
        self.state.animation.playback
    }

    /// Start playback at `speed`.
    ///
    /// Playback needs loaded tracks and the loop flag; otherwise the
    /// request is rejected.
    pub fn play(&mut self, speed: f32) -> Result<(), RejectReason> {
        let speed = positive(speed, "animation speed")?;
        let anim = &self.state.animation;
        if anim.tracks.is_empty() {
            return Err(RejectReason::malformed("no animation tracks loaded"));
        }
        if !anim.looping {
            return Err(RejectReason::malformed("animation loop is disabled"));
        }
        self.state.animation.playback = Playback::Playing(speed);
        Ok(())
    }

    /// Resume at the previous speed (1.0 if none).
    pub fn resume(&mut self) -> Result<(), RejectReason> {
        match self.state.animation.playback {
            Playback::Playing(_) => Ok(()),
            _ => self.play(1.0),
        }
    }

    /// Halt at the current playhead.
    pub fn pause(&mut self) {
        if matches!(self.state.animation.playback, Playback::Playing(_)) {
            self.state.animation.playback = Playback::Paused;
        }
    }

    /// Halt and rewind.
    pub fn stop(&mut self) {
        self.state.animation.playback = Playback::Stopped;
        self.playhead = 0.0;
    }

    /// Advance local playback by `dt_secs`.
    pub fn advance(&mut self, dt_secs: f32) {
        let Playback::Playing(speed) = self.state.animation.playback else {
            return;
        };
        let duration = self
            .state
            .animation
            .tracks
            .iter()
            .filter_map(|t| t.times.last().copied())
            .fold(0.0_f32, f32::max);
        if duration <= 0.0 {
            return;
        }
        let next = self.playhead + dt_secs * speed / duration;
        self.playhead = if next >= 1.0 {
            if self.state.animation.looping {
                next.fract()
            } else {
                self.state.animation.playback = Playback::Stopped;
                1.0
            }
        } else {
            next
        };
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use cad_scene_port::ProjectionKind;
    use cad_sync_proto::AnimationTrack;

    #[test]
    fn same_value_is_unchanged() {
        let mut view = ViewState::default();
        let effect = apply_view_change(&mut view, &ViewChange::Zoom(1.0)).unwrap();
        assert_eq!(effect, ViewEffect::Unchanged);
        let effect = apply_view_change(&mut view, &ViewChange::Zoom(2.0)).unwrap();
        assert_eq!(effect, ViewEffect::Camera);
    }

    #[test]
    fn invalid_zoom_leaves_state() {
        let mut view = ViewState::default();
        let before = view.clone();
        assert!(apply_view_change(&mut view, &ViewChange::Zoom(0.0)).is_err());
        assert!(apply_view_change(&mut view, &ViewChange::Position([f32::NAN, 0.0, 0.0])).is_err());
        assert_eq!(view, before);
    }

    #[test]
    fn edge_color_is_normalized() {
        let mut view = ViewState::default();
        apply_view_change(&mut view, &ViewChange::EdgeColor("FF8800".into())).unwrap();
        assert_eq!(view.options.edge_color, "#ff8800");
        assert!(apply_view_change(&mut view, &ViewChange::EdgeColor("#ff88".into())).is_err());
    }

    #[test]
    fn control_style_change_resets_camera() {
        let mut view = ViewState::default();
        view.camera.zoom = 3.0;
        let effect =
            apply_view_change(&mut view, &ViewChange::CameraControl(CameraControl::Orbit))
                .unwrap();
        assert_eq!(effect, ViewEffect::Camera);
        assert_eq!(view.camera, CameraState::default());
    }

    #[test]
    fn quaternion_ignored_under_orbit() {
        let mut view = ViewState {
            camera_control: CameraControl::Orbit,
            ..ViewState::default()
        };
        let effect =
            apply_view_change(&mut view, &ViewChange::Quaternion(Some([0.0, 0.0, 0.0, 1.0])))
                .unwrap();
        assert_eq!(effect, ViewEffect::Unchanged);
        assert_eq!(view.camera.quaternion, None);
    }

    #[test]
    fn animation_time_must_be_fraction() {
        let mut view = ViewState::default();
        let change = AnimationChange::Position {
            track: "/a".into(),
            time: 1.5,
        };
        assert!(matches!(
            apply_animation_change(&mut view, &change),
            Err(RejectReason::MalformedPayload(_))
        ));
    }

    #[test]
    fn animation_track_must_exist() {
        let mut view = ViewState::default();
        view.animation.tracks =
            vec![AnimationTrack::new("/a", "rz", vec![0.0, 2.0], vec![vec![0.0], vec![90.0]]).unwrap()];
        let change = AnimationChange::Position {
            track: "/b".into(),
            time: 0.5,
        };
        assert_eq!(
            apply_animation_change(&mut view, &change),
            Err(RejectReason::UnknownTrack("/b".into()))
        );
    }

    #[test]
    fn diff_lists_changed_fields_only() {
        let prev = ViewState::default();
        let mut next = prev.clone();
        next.camera.projection = ProjectionKind::Perspective;
        next.options.axes = true;
        let deltas = diff(&prev, &next);
        assert_eq!(
            deltas,
            vec![
                Delta::view(ViewChange::Projection(ProjectionKind::Perspective), 0),
                Delta::view(ViewChange::Axes(true), 0),
            ]
        );
        assert!(diff(&next, &next).is_empty());
    }

    #[test]
    fn playback_needs_tracks_and_loops() {
        let mut model = ViewModel::new();
        assert!(model.play(1.0).is_err());
        let mut state = ViewState::default();
        state.animation.tracks =
            vec![AnimationTrack::new("/a", "rz", vec![0.0, 2.0], vec![vec![0.0], vec![90.0]]).unwrap()];
        model.replace(state);
        model.play(1.0).unwrap();
        model.advance(1.0);
        assert!((model.playhead() - 0.5).abs() < 1e-6);
        model.advance(1.5);
        assert!((model.playhead() - 0.25).abs() < 1e-6);
        model.pause();
        assert_eq!(model.playback(), Playback::Paused);
        model.stop();
        assert!(model.playhead().abs() < f32::EPSILON);
    }
}
