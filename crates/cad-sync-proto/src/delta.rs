// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deltas: minimal tagged descriptions of one state change.
//!
//! Every delta carries the version (tree) or revision (other groups) of its
//! field group that it was computed against.

use cad_scene_port::{ClipPlane, Material, MeshPayload, ProjectionKind, Shape, ShapeId};
use serde::{Deserialize, Serialize};

use crate::view::{AnimationTrack, CameraControl, ControlMode, ControlSpeeds};

/// Independent field groups, each with its own revision counter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    /// Forest structure.
    Tree,
    /// Per-shape fields.
    Shapes,
    /// Camera, clipping, helpers, controls.
    View,
    /// Highlighted shapes.
    Selection,
    /// Animation tracks and position.
    Animation,
}

impl FieldGroup {
    /// Every group, in a stable order.
    pub const ALL: [FieldGroup; 5] = [
        FieldGroup::Tree,
        FieldGroup::Shapes,
        FieldGroup::View,
        FieldGroup::Selection,
        FieldGroup::Animation,
    ];
}

/// Change to one field of one shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ShapeChange {
    /// Face visibility.
    Visible(bool),
    /// Edge overlay visibility.
    EdgesVisible(bool),
    /// Whether picks may resolve to the shape.
    Selectable(bool),
    /// Material hints.
    Material(Material),
    /// New mesh payload (decoded lazily).
    Mesh(MeshPayload),
}

/// Structural change to the forest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TreeOp {
    /// Insert a shape under `shape.parent` (or as a root).
    Add {
        /// The new shape; its `children` list is ignored.
        shape: Shape,
    },
    /// Remove a shape and its whole subtree.
    Remove {
        /// Shape to remove.
        shape_id: ShapeId,
    },
    /// Move a shape under a new parent (or to the roots).
    Reparent {
        /// Shape to move.
        shape_id: ShapeId,
        /// New parent; `None` makes the shape a root.
        parent_id: Option<ShapeId>,
    },
}

impl TreeOp {
    /// Id of the shape the operation targets.
    pub fn shape_id(&self) -> &ShapeId {
        match self {
            TreeOp::Add { shape } => &shape.id,
            TreeOp::Remove { shape_id } | TreeOp::Reparent { shape_id, .. } => shape_id,
        }
    }
}

/// Change to one view field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ViewChange {
    /// Camera position.
    Position([f32; 3]),
    /// Camera look-at target.
    Target([f32; 3]),
    /// Camera up vector.
    Up([f32; 3]),
    /// Trackball orientation.
    Quaternion(Option<[f32; 4]>),
    /// Perspective field of view (radians).
    FovY(f32),
    /// Orthographic scale.
    OrthoScale(f32),
    /// Projection kind.
    Projection(ProjectionKind),
    /// Camera zoom.
    Zoom(f32),
    /// Whole clip plane list.
    ClipPlanes(Vec<ClipPlane>),
    /// Intersection clipping.
    ClipIntersection(bool),
    /// Grid per plane (xy, xz, yz).
    Grid([bool; 3]),
    /// Axes helper.
    Axes(bool),
    /// Axes helper at the origin.
    Axes0(bool),
    /// Grid tick count.
    Ticks(u32),
    /// Ambient light intensity.
    AmbientIntensity(f32),
    /// Directional light intensity.
    DirectIntensity(f32),
    /// Edge color (`#rrggbb`).
    EdgeColor(String),
    /// Transparent solids.
    Transparent(bool),
    /// Black edges.
    BlackEdges(bool),
    /// Pointer-drag mode.
    ControlMode(ControlMode),
    /// Camera control style.
    CameraControl(CameraControl),
    /// Pointer sensitivity.
    Speeds(ControlSpeeds),
}

/// Change to the animation group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum AnimationChange {
    /// Scrub position.
    Position {
        /// Track path.
        track: String,
        /// Relative time in `[0, 1]`.
        time: f32,
    },
    /// Replace the track list.
    Tracks(Vec<AnimationTrack>),
    /// Loop flag.
    Loop(bool),
}

/// One state change, scoped to a field group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Delta {
    /// Per-shape field change.
    Shapes {
        /// Target shape.
        shape_id: ShapeId,
        /// The change.
        change: ShapeChange,
        /// Shapes revision the delta was computed against.
        version: u64,
    },
    /// Structural change.
    Tree {
        /// The operation.
        op: TreeOp,
        /// Tree version the delta was computed against.
        version: u64,
    },
    /// View field change.
    View {
        /// The change.
        change: ViewChange,
        /// View revision the delta was computed against.
        version: u64,
    },
    /// Selection replacement.
    Selection {
        /// Highlighted shapes.
        ids: Vec<ShapeId>,
        /// Selection revision the delta was computed against.
        version: u64,
    },
    /// Animation change.
    Animation {
        /// The change.
        change: AnimationChange,
        /// Animation revision the delta was computed against.
        version: u64,
    },
}

impl Delta {
    /// Field group this delta belongs to.
    pub fn group(&self) -> FieldGroup {
        match self {
            Delta::Shapes { .. } => FieldGroup::Shapes,
            Delta::Tree { .. } => FieldGroup::Tree,
            Delta::View { .. } => FieldGroup::View,
            Delta::Selection { .. } => FieldGroup::Selection,
            Delta::Animation { .. } => FieldGroup::Animation,
        }
    }

    /// Declared version or revision.
    pub fn version(&self) -> u64 {
        match self {
            Delta::Shapes { version, .. }
            | Delta::Tree { version, .. }
            | Delta::View { version, .. }
            | Delta::Selection { version, .. }
            | Delta::Animation { version, .. } => *version,
        }
    }

    /// Replace the declared version or revision.
    pub fn with_version(mut self, v: u64) -> Self {
        match &mut self {
            Delta::Shapes { version, .. }
            | Delta::Tree { version, .. }
            | Delta::View { version, .. }
            | Delta::Selection { version, .. }
            | Delta::Animation { version, .. } => *version = v,
        }
        self
    }

    /// Shape field delta.
    pub fn shape(shape_id: impl Into<ShapeId>, change: ShapeChange, version: u64) -> Self {
        Delta::Shapes {
            shape_id: shape_id.into(),
            change,
            version,
        }
    }

    /// Structural delta.
    pub fn tree(op: TreeOp, version: u64) -> Self {
        Delta::Tree { op, version }
    }

    /// View field delta.
    pub fn view(change: ViewChange, version: u64) -> Self {
        Delta::View { change, version }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn shape_delta_json_shape() {
        let d = Delta::shape("B", ShapeChange::Visible(false), 3);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "scope": "shapes",
                "shape_id": "B",
                "change": { "field": "visible", "value": false },
                "version": 3
            })
        );
    }

    #[test]
    fn tree_delta_parses_from_json() {
        let json = r#"{
            "scope": "tree",
            "op": { "op": "reparent", "shape_id": "/a/b", "parent_id": null },
            "version": 5
        }"#;
        let d: Delta = serde_json::from_str(json).unwrap();
        assert_eq!(d.group(), FieldGroup::Tree);
        assert_eq!(d.version(), 5);
        assert!(matches!(
            d,
            Delta::Tree { op: TreeOp::Reparent { ref shape_id, parent_id: None }, .. }
                if shape_id.as_str() == "/a/b"
        ));
    }

    #[test]
    fn with_version_retags() {
        let d = Delta::view(ViewChange::Zoom(2.0), 1).with_version(9);
        assert_eq!(d.version(), 9);
        assert_eq!(d.group(), FieldGroup::View);
    }
}
