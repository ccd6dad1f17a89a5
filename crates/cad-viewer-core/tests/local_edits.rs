// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Local gestures, lazy decodes and renderer failure handling.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use cad_scene_codec::{MockRenderer, RenderCall};
use cad_scene_port::{PickHit, RenderError, SubShapeKind};
use cad_sync_proto::{
    AnimationChange, AnimationTrack, AttributeKey, AttributePayload, AttributeUpdate,
    ClientMessage, Delta, FullState, KernelCommand, KernelMessage, Playback, PlaybackAction,
    ShapeChange, TreeOp, ViewState,
};
use cad_viewer_core::{
    BindingStatus, CadView, InputEvent, Key, PointerButton, Reconciler, RecordingTransport,
    ViewerConfig,
};
use common::*;

#[test]
fn local_toggle_renders_now_and_reports_on_tick() {
    let mut v = loaded(shapes_ab(), 1);
    v.set_visible(id("B"), false).unwrap();

    assert_eq!(v.renderer().visibility.get(&id("B")), Some(&(false, false)));
    assert!(v.transport().sent().is_empty(), "nothing leaves before the tick");

    v.tick(Duration::from_secs(1));
    let sent = v.transport().sent();
    let attrs = sent_attributes(sent);
    assert_eq!(attrs.len(), 1);
    assert_eq!(attrs[0].key, AttributeKey::States);

    v.tick(Duration::from_secs(2));
    assert_eq!(v.transport().sent().len(), 1, "reported exactly once");
}

#[test]
fn reapplying_a_value_makes_no_renderer_call() {
    let mut v = loaded(shapes_ab(), 1);
    let delta = deltas(
        AttributeKey::States,
        vec![Delta::shape("B", ShapeChange::Visible(false), 0)],
    );
    v.handle_inbound(delta.clone());
    let calls = v.renderer().calls.len();
    let snapshot = v.scene().clone();
    v.handle_inbound(delta);
    assert_eq!(v.renderer().calls.len(), calls);
    assert_eq!(v.scene(), &snapshot);
}

#[test]
fn visibility_burst_is_not_blocked_by_pending_decode() {
    let mut v = loaded(shapes_ab(), 1);
    v.handle_inbound(deltas(
        AttributeKey::States,
        vec![Delta::shape("B", ShapeChange::Mesh(triangle_at(5.0)), 0)],
    ));
    assert!(v.reconciler().scene_model().decodes().is_pending(&id("B")));

    for i in 0..10 {
        v.handle_inbound(deltas(
            AttributeKey::States,
            vec![Delta::shape("B", ShapeChange::Visible(i % 2 == 1), 0)],
        ));
    }
    assert_eq!(v.renderer().visibility.get(&id("B")), Some(&(true, true)));
    assert_eq!(v.renderer().upload_count(&id("B")), 1, "no re-upload for toggles");

    v.run_decodes(4);
    assert_eq!(v.renderer().upload_count(&id("B")), 2, "new payload uploads once");
}

#[test]
fn decode_for_removed_shape_is_discarded() {
    let mut v = loaded(shapes_ab(), 1);
    v.handle_inbound(deltas(
        AttributeKey::States,
        vec![Delta::shape("B", ShapeChange::Mesh(triangle_at(2.0)), 0)],
    ));
    let tasks = v.reconciler().scene_model().decodes().pending();
    assert_eq!(tasks, 1);

    v.handle_inbound(deltas(
        AttributeKey::Tree,
        vec![Delta::tree(TreeOp::Remove { shape_id: id("B") }, 1)],
    ));
    assert_eq!(v.run_decodes(4), 0, "removal abandons the pending decode");
    assert!(!v.scene().contains(&id("B")));
    assert!(!v.renderer().meshes.contains_key(&id("B")));
}

#[test]
fn decode_completed_after_removal_does_not_recreate_shape() {
    let mut r = Reconciler::new(&config());
    r.apply_full_state(FullState {
        tree_version: 1,
        shapes: shapes_ab(),
        view: ViewState::default(),
        selection: vec![],
    })
    .unwrap();
    let tasks = r.take_decodes(4);
    assert_eq!(tasks.len(), 1);

    r.apply_inbound(AttributeUpdate::deltas(
        AttributeKey::Tree,
        vec![Delta::tree(TreeOp::Remove { shape_id: id("A") }, 1)],
    ));
    for task in tasks {
        let result = task.run();
        assert!(r.complete_decode(task, result).is_empty());
    }
    assert!(r.scene().is_empty());
    assert!(r.scene().check_forest().is_ok());
}

#[test]
fn newer_payload_supersedes_queued_one() {
    let mut v = loaded(shapes_ab(), 1);
    v.handle_inbound(deltas(
        AttributeKey::States,
        vec![
            Delta::shape("B", ShapeChange::Mesh(triangle_at(1.0)), 0),
            Delta::shape("B", ShapeChange::Mesh(triangle_at(2.0)), 0),
        ],
    ));
    v.run_decodes(8);
    assert_eq!(v.renderer().upload_count(&id("B")), 2);
    let mesh = &v.renderer().meshes[&id("B")];
    assert!((mesh.positions[0] - 2.0).abs() < f32::EPSILON);
}

#[test]
fn corrupt_payload_keeps_last_good_mesh() {
    let mut v = loaded(shapes_ab(), 1);
    let before = v.renderer().meshes[&id("B")].clone();
    let mut bad = triangle();
    bad.blob = bytes::Bytes::from_static(&[0x84, 0x01]);
    v.handle_inbound(deltas(
        AttributeKey::States,
        vec![Delta::shape("B", ShapeChange::Mesh(bad), 0)],
    ));
    v.run_decodes(4);
    assert_eq!(v.renderer().meshes[&id("B")], before);
    assert_eq!(v.renderer().upload_count(&id("B")), 1);
}

#[test]
fn camera_drag_is_coalesced_per_frame() {
    let mut v = loaded(vec![solid("A")], 1);
    v.handle_input(InputEvent::PointerDown {
        x: 0.5,
        y: 0.5,
        button: PointerButton::Primary,
    });
    for step in 1..=20u64 {
        let x = 0.5 + step as f32 * 0.01;
        v.handle_input(InputEvent::PointerMove { x, y: 0.5 });
        v.tick(Duration::from_millis(1000 + step * 2));
    }
    v.tick(Duration::from_millis(2000));

    let camera_msgs = sent_attributes(v.transport().sent())
        .into_iter()
        .filter(|u| u.key == AttributeKey::Camera)
        .count();
    // 40 ms of drag at a 16 ms interval, plus the trailing flush.
    assert!(camera_msgs >= 2, "drag is reported");
    assert!(camera_msgs <= 4, "drag is coalesced, got {camera_msgs}");
    assert_ne!(v.view().camera.position, [1.0, 1.0, 1.0]);
}

#[test]
fn camera_is_not_reported_without_view_sync() {
    let mut v = CadView::new(
        ViewerConfig::default(),
        MockRenderer::new(),
        RecordingTransport::new(),
    )
    .unwrap();
    v.handle_inbound(full_state(vec![solid("A")], 1));
    v.handle_input(InputEvent::Wheel { delta: -1.0 });
    v.tick(Duration::from_secs(1));
    assert!(v.view().camera.zoom > 1.0);
    assert!(v.transport().sent().is_empty());
}

#[test]
fn renderer_failure_is_reported_once_and_view_keeps_syncing() {
    let mut v = loaded(shapes_ab(), 1);
    v.renderer_mut()
        .fail_with(RenderError::ContextLost("gpu reset".into()));

    v.handle_inbound(deltas(
        AttributeKey::States,
        vec![Delta::shape("B", ShapeChange::Visible(false), 0)],
    ));
    v.handle_inbound(deltas(
        AttributeKey::States,
        vec![Delta::shape("B", ShapeChange::Visible(true), 0)],
    ));
    v.tick(Duration::from_secs(1));

    assert!(matches!(v.status(), BindingStatus::Unavailable(_)));
    let unavailable = v
        .transport()
        .sent()
        .iter()
        .filter(|m| matches!(m, ClientMessage::RendererUnavailable { .. }))
        .count();
    assert_eq!(unavailable, 1);
    assert!(v.scene().get(&id("B")).unwrap().visible, "models still track the kernel");

    v.handle_inbound(KernelMessage::Command(KernelCommand::ExportImage { msg_id: 9 }));
    assert!(v.transport().sent().iter().any(|m| matches!(
        m,
        ClientMessage::ExportResult { msg_id: 9, image } if image.is_empty()
    )));
}

#[test]
fn export_command_answers_with_image() {
    let mut v = loaded(vec![solid("A")], 1);
    v.handle_inbound(KernelMessage::Command(KernelCommand::ExportImage { msg_id: 3 }));
    match v.transport().sent() {
        [ClientMessage::ExportResult { msg_id, image }] => {
            assert_eq!(*msg_id, 3);
            assert_eq!(&image[1..4], b"PNG");
        }
        other => panic!("unexpected outbound {other:?}"),
    }
}

#[test]
fn resize_command_reaches_renderer() {
    let mut v = loaded(vec![solid("A")], 1);
    v.handle_inbound(KernelMessage::Command(KernelCommand::Resize {
        width: 1024,
        height: 768,
        dpr: 2.0,
    }));
    assert_eq!(v.renderer().viewport, (1024, 768, 2.0));
    v.handle_inbound(KernelMessage::Command(KernelCommand::Resize {
        width: 0,
        height: 768,
        dpr: 2.0,
    }));
    assert_eq!(v.renderer().viewport, (1024, 768, 2.0));
}

#[test]
fn animate_needs_tracks_and_advances_locally() {
    let mut v = loaded(vec![solid("A")], 1);
    v.handle_inbound(KernelMessage::Command(KernelCommand::Animate {
        msg_id: 1,
        speed: 1.0,
    }));
    assert_eq!(v.reconciler().view_model().playback(), Playback::Stopped);

    let track = AnimationTrack::new("A", "rz", vec![0.0, 2.0], vec![vec![0.0], vec![90.0]]).unwrap();
    v.handle_inbound(deltas(
        AttributeKey::Tracks,
        vec![Delta::Animation {
            change: AnimationChange::Tracks(vec![track]),
            version: 0,
        }],
    ));
    v.handle_inbound(KernelMessage::Command(KernelCommand::Animate {
        msg_id: 2,
        speed: 1.0,
    }));
    assert_eq!(v.reconciler().view_model().playback(), Playback::Playing(1.0));

    v.tick(Duration::from_secs(10));
    v.tick(Duration::from_millis(10_500));
    assert!((v.reconciler().view_model().playhead() - 0.25).abs() < 1e-4);

    v.handle_inbound(KernelMessage::Command(KernelCommand::ControlAnimation {
        msg_id: 3,
        action: PlaybackAction::Stop,
    }));
    assert_eq!(v.reconciler().view_model().playback(), Playback::Stopped);
    assert!(v.reconciler().view_model().playhead().abs() < f32::EPSILON);
    assert!(v.transport().sent().is_empty(), "playback is local");
}

#[test]
fn scrub_burst_reports_one_position_per_frame() {
    let mut v = loaded(vec![solid("A")], 1);
    let track = AnimationTrack::new("A", "rz", vec![0.0, 2.0], vec![vec![0.0], vec![90.0]]).unwrap();
    v.handle_inbound(deltas(
        AttributeKey::Tracks,
        vec![Delta::Animation {
            change: AnimationChange::Tracks(vec![track]),
            version: 0,
        }],
    ));

    let burst = [(0, 0.1), (3, 0.2), (6, 0.3), (9, 0.4), (12, 0.5), (15, 0.6), (30, 0.7)];
    for (at_ms, time) in burst {
        v.scrub("A", time);
        v.tick(Duration::from_millis(1000 + at_ms));
    }

    let positions: Vec<f32> = sent_attributes(v.transport().sent())
        .into_iter()
        .filter(|u| u.key == AttributeKey::Animation)
        .flat_map(|u| match &u.payload {
            AttributePayload::Deltas(d) => d.clone(),
            AttributePayload::Full(_) => Vec::new(),
        })
        .filter_map(|d| match d {
            Delta::Animation {
                change: AnimationChange::Position { time, .. },
                ..
            } => Some(time),
            _ => None,
        })
        .collect();
    assert_eq!(positions, vec![0.1, 0.7], "first scrub, then the newest one");
}

#[test]
fn hide_key_toggles_selected_shapes() {
    let mut v = loaded(vec![solid("A"), solid("B")], 1);
    v.select(id("A")).unwrap();
    v.handle_input(InputEvent::Key(Key::Char('h')));
    assert!(!v.scene().get(&id("A")).unwrap().visible);
    assert!(v.scene().get(&id("B")).unwrap().visible);
    v.handle_input(InputEvent::Key(Key::Char('h')));
    assert!(v.scene().get(&id("A")).unwrap().visible);
}

#[test]
fn escape_clears_selection_and_reports_it() {
    let mut v = loaded(vec![solid("A")], 1);
    v.select(id("A")).unwrap();
    v.tick(Duration::from_secs(1));
    v.handle_input(InputEvent::Key(Key::Escape));
    v.tick(Duration::from_secs(2));
    assert!(v.selection().is_empty());
    let selections: Vec<_> = sent_attributes(v.transport().sent())
        .into_iter()
        .filter(|u| u.key == AttributeKey::Selection)
        .collect();
    assert_eq!(selections.len(), 2);
}

#[test]
fn hover_is_never_synchronized() {
    let mut v = loaded(vec![solid("A")], 1);
    v.renderer_mut().script_pick(
        0.3,
        0.3,
        PickHit {
            shape_id: id("A"),
            sub_kind: SubShapeKind::Edge,
            sub_index: 0,
            point: [0.0, 0.0, 0.0],
        },
    );
    v.handle_input(InputEvent::PointerMove { x: 0.3, y: 0.3 });
    v.tick(Duration::from_secs(1));
    assert_eq!(v.selection().hovered(), Some(&id("A")));
    assert_eq!(v.renderer().highlight.hovered, Some(id("A")));
    assert!(v.transport().sent().is_empty());
}

#[test]
fn unselectable_shapes_are_not_picked() {
    let mut v = loaded(vec![solid("A")], 1);
    v.set_selectable(id("A"), false).unwrap();
    v.renderer_mut().script_pick(
        0.5,
        0.5,
        PickHit {
            shape_id: id("A"),
            sub_kind: SubShapeKind::Face,
            sub_index: 0,
            point: [0.0, 0.0, 0.0],
        },
    );
    v.handle_input(InputEvent::PointerDown {
        x: 0.5,
        y: 0.5,
        button: PointerButton::Primary,
    });
    v.handle_input(InputEvent::PointerUp {
        x: 0.5,
        y: 0.5,
        modifiers: cad_viewer_core::Modifiers::default(),
    });
    assert!(v.selection().is_empty());
    assert!(!v
        .transport()
        .sent()
        .iter()
        .any(|m| matches!(m, ClientMessage::Pick(_))));
}

#[test]
fn dispose_is_idempotent() {
    let mut v = loaded(shapes_ab(), 1);
    v.dispose();
    v.dispose();
    assert_eq!(v.status(), &BindingStatus::Disposed);
    assert!(v.renderer().disposed);
    assert!(v.scene().is_empty());
    assert_eq!(
        v.renderer().count_calls(|c| matches!(c, RenderCall::Clear)),
        1,
        "only the initial full state cleared the renderer"
    );
}
