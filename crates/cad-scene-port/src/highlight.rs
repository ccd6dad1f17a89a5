// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Highlight and pick types for selection and hover feedback.

use crate::types::ShapeId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Highlight state for selection/hover feedback.
///
/// Renderers use this to apply visual emphasis (outline, tint, etc.)
/// to selected or hovered shapes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HighlightState {
    /// Currently selected shapes, in id order.
    pub selected: Vec<ShapeId>,
    /// Currently hovered shape (if any). Never synchronized.
    pub hovered: Option<ShapeId>,
}

/// Which sub-element of a shape a pick ray hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum SubShapeKind {
    /// A face (triangle group) of a solid.
    Face,
    /// An edge (polyline) of a wire or solid.
    Edge,
    /// A vertex.
    Vertex,
}

/// Result of a successful pick ray cast.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PickHit {
    /// Shape that was hit.
    pub shape_id: ShapeId,
    /// Kind of the sub-element.
    pub sub_kind: SubShapeKind,
    /// Index of the face/edge/vertex within the shape.
    pub sub_index: u32,
    /// World-space hit point.
    pub point: [f32; 3],
}
