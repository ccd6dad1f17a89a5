// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replay harness tests: library path and the CLI binary.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use std::io::{Cursor, Write};

use assert_cmd::Command;
use cad_replay::replay::{parse_log, replay, ReplayStep};
use cad_scene_codec::encode_mesh;
use cad_scene_port::{MeshBuffers, MeshFormat, Shape, ShapeId, ShapeKind};
use cad_sync_proto::{
    AttributeKey, AttributeUpdate, Delta, FullState, KernelMessage, ShapeChange, TreeOp,
    ViewState,
};
use cad_viewer_core::ViewerConfig;
use predicates::str::contains;

fn solid(id: &str) -> Shape {
    let mesh = encode_mesh(&MeshBuffers {
        format: MeshFormat::Triangles,
        positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        normals: vec![],
        indices: vec![0, 1, 2],
    })
    .unwrap();
    Shape::new(id, ShapeKind::Solid).with_mesh(mesh)
}

fn session() -> Vec<ReplayStep> {
    vec![
        ReplayStep::Inbound {
            message: KernelMessage::Attribute(AttributeUpdate::full(FullState {
                tree_version: 4,
                shapes: vec![Shape::new("A", ShapeKind::Group), solid("B").with_parent("A")],
                view: ViewState::default(),
                selection: vec![ShapeId::new("B")],
            })),
        },
        ReplayStep::Tick { at_ms: 0 },
        ReplayStep::Local {
            delta: Delta::shape("B", ShapeChange::Visible(false), 0),
        },
        ReplayStep::Local {
            delta: Delta::shape("ghost", ShapeChange::Visible(false), 0),
        },
        ReplayStep::Tick { at_ms: 100 },
        ReplayStep::Inbound {
            message: KernelMessage::Attribute(AttributeUpdate::deltas(
                AttributeKey::Tree,
                vec![Delta::tree(
                    TreeOp::Add {
                        shape: solid("C").with_parent("nowhere"),
                    },
                    4,
                )],
            )),
        },
    ]
}

fn jsonl(steps: &[ReplayStep]) -> String {
    let mut out = String::from("# recorded session\n\n");
    for step in steps {
        out.push_str(&serde_json::to_string(step).unwrap());
        out.push('\n');
    }
    out
}

#[test]
fn log_round_trips_through_jsonl() {
    let steps = session();
    let parsed = parse_log(Cursor::new(jsonl(&steps))).unwrap();
    assert_eq!(parsed, steps);
}

#[test]
fn replay_reports_final_state_and_traffic() {
    let report = replay(&session(), ViewerConfig::default(), None).unwrap();

    assert_eq!(report.steps, 6);
    assert_eq!(report.tree_version, 4);
    assert_eq!(report.shapes, 2);
    assert_eq!(report.selected, vec![ShapeId::new("B")]);
    assert!(report.awaiting_full_state);
    assert_eq!(report.renderer, "ready");
    assert_eq!(report.rejected_local, 1);
    assert_eq!(report.uploads, 1);
    assert_eq!(report.removals, 0);
    assert_eq!(report.outbound.get("attr"), Some(&1));
    assert_eq!(report.outbound.get("needs_full_state"), Some(&1));
}

#[test]
fn zero_budget_leaves_meshes_pending() {
    let report = replay(&session(), ViewerConfig::default(), Some(0)).unwrap();
    assert_eq!(report.uploads, 0);
}

#[test]
fn report_lists_every_outbound_op() {
    let report = replay(&session(), ViewerConfig::default(), None).unwrap();
    let mut out = Vec::new();
    report.write_to(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("tree_version: 4\n"));
    assert!(text.contains("selected: B\n"));
    assert!(text.contains("outbound.attr: 1\n"));
    assert!(text.contains("outbound.needs_full_state: 1\n"));
}

#[test]
fn bad_line_is_named_in_the_error() {
    let log = format!("{}{{\"step\":\"warp\"}}\n", jsonl(&session()[..1]));
    let err = parse_log(Cursor::new(log)).unwrap_err();
    assert!(format!("{err:#}").contains("line 4"), "{err:#}");
}

#[test]
fn cli_replays_a_log_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(jsonl(&session()).as_bytes()).unwrap();

    Command::cargo_bin("cad-replay")
        .unwrap()
        .arg("--log")
        .arg(file.path())
        .assert()
        .success()
        .stdout(contains("shapes: 2"))
        .stdout(contains("awaiting_full_state: true"));
}

#[test]
fn cli_fails_on_missing_log() {
    Command::cargo_bin("cad-replay")
        .unwrap()
        .args(["--log", "/nonexistent/session.jsonl"])
        .assert()
        .failure()
        .stderr(contains("open /nonexistent/session.jsonl"));
}
