// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use cad_scene_codec::{encode_mesh, MockRenderer};
use cad_scene_port::{MeshBuffers, MeshFormat, MeshPayload, Shape, ShapeId, ShapeKind};
use cad_sync_proto::{
    AttributeKey, AttributeUpdate, ClientMessage, Delta, FullState, KernelMessage, ViewState,
};
use cad_viewer_core::{CadView, RecordingTransport, ViewerConfig};
use std::time::Duration;

/// View under test: mock renderer plus recording transport.
pub type TestView = CadView<MockRenderer, RecordingTransport>;

/// Config with view sync on, so camera echoes are observable.
pub fn config() -> ViewerConfig {
    ViewerConfig {
        sync_view: true,
        ..ViewerConfig::default()
    }
}

pub fn view() -> TestView {
    CadView::new(config(), MockRenderer::new(), RecordingTransport::new())
        .expect("default config is valid")
}

/// One-triangle mesh payload.
pub fn triangle() -> MeshPayload {
    encode_mesh(&MeshBuffers {
        format: MeshFormat::Triangles,
        positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        normals: vec![],
        indices: vec![0, 1, 2],
    })
    .expect("triangle encodes")
}

/// Triangle payload with a distinguishing x offset.
pub fn triangle_at(x: f32) -> MeshPayload {
    encode_mesh(&MeshBuffers {
        format: MeshFormat::Triangles,
        positions: vec![x, 0.0, 0.0, x + 1.0, 0.0, 0.0, x, 1.0, 0.0],
        normals: vec![],
        indices: vec![0, 1, 2],
    })
    .expect("triangle encodes")
}

pub fn solid(id: &str) -> Shape {
    Shape::new(id, ShapeKind::Solid).with_mesh(triangle())
}

/// `{A: root group, B: solid child of A}`.
pub fn shapes_ab() -> Vec<Shape> {
    vec![
        Shape::new("A", ShapeKind::Group),
        solid("B").with_parent("A"),
    ]
}

pub fn full_state(shapes: Vec<Shape>, tree_version: u64) -> KernelMessage {
    KernelMessage::Attribute(AttributeUpdate::full(FullState {
        tree_version,
        shapes,
        view: ViewState::default(),
        selection: vec![],
    }))
}

pub fn deltas(key: AttributeKey, deltas: Vec<Delta>) -> KernelMessage {
    KernelMessage::Attribute(AttributeUpdate::deltas(key, deltas))
}

pub fn id(s: &str) -> ShapeId {
    ShapeId::new(s)
}

/// Loaded view with every pending mesh uploaded and the sent log cleared.
pub fn loaded(shapes: Vec<Shape>, tree_version: u64) -> TestView {
    let mut v = view();
    v.handle_inbound(full_state(shapes, tree_version));
    v.run_decodes(usize::MAX);
    v.tick(Duration::ZERO);
    v.transport_mut().take_sent();
    v
}

/// Outbound attribute updates in send order.
pub fn sent_attributes(sent: &[ClientMessage]) -> Vec<&AttributeUpdate> {
    sent.iter()
        .filter_map(|m| match m {
            ClientMessage::Attribute(u) => Some(u),
            _ => None,
        })
        .collect()
}
