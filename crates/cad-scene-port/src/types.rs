// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Core scene types for the rendering port contract.
//!
//! These types are pure domain objects. Mesh payloads stay opaque here;
//! decoding into [`MeshBuffers`] is done by cad-scene-codec.

use bytes::Bytes;
use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable, kernel-assigned shape identifier.
///
/// Ids are path-like strings (`/assembly/part_1`) in practice, but the core
/// treats them as opaque.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct ShapeId(pub String);

impl ShapeId {
    /// Create an id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ShapeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ShapeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a displayable shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum ShapeKind {
    /// Closed solid or face set, rendered as triangles.
    Solid,
    /// Edge set, rendered as polylines.
    Wire,
    /// Vertex set, rendered as points.
    Vertex,
    /// Assembly node with no geometry of its own.
    Group,
}

impl ShapeKind {
    /// Mesh format this kind carries, or `None` for groups.
    pub fn mesh_format(self) -> Option<MeshFormat> {
        match self {
            ShapeKind::Solid => Some(MeshFormat::Triangles),
            ShapeKind::Wire => Some(MeshFormat::Polylines),
            ShapeKind::Vertex => Some(MeshFormat::Points),
            ShapeKind::Group => None,
        }
    }
}

/// RGBA color with 8-bit components.
pub type ColorRgba8 = [u8; 4];

/// Surface material hints.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    /// Base color.
    pub color: ColorRgba8,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
    /// Metalness hint in `[0, 1]`.
    pub metalness: f32,
    /// Roughness hint in `[0, 1]`.
    pub roughness: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: [0xe8, 0xb0, 0x24, 0xff],
            opacity: 1.0,
            metalness: 0.3,
            roughness: 0.65,
        }
    }
}

impl Material {
    /// True when every scalar is finite and inside `[0, 1]`.
    pub fn is_valid(&self) -> bool {
        [self.opacity, self.metalness, self.roughness]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v))
    }
}

/// Format tag for an encoded mesh payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
#[repr(u8)]
pub enum MeshFormat {
    /// Indexed triangles with per-vertex normals.
    Triangles = 0,
    /// Indexed line segments (index pairs).
    Polylines = 1,
    /// Unindexed points.
    Points = 2,
}

/// Opaque encoded mesh blob plus its format tag.
///
/// The blob is reference counted, so cloning a payload (and therefore a
/// whole scene snapshot) never copies geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeshPayload {
    /// Geometry layout of the encoded blob.
    pub format: MeshFormat,
    /// Encoded bytes (see cad-scene-codec for the layout).
    pub blob: Bytes,
}

impl MeshPayload {
    /// Wrap an encoded blob.
    pub fn new(format: MeshFormat, blob: impl Into<Bytes>) -> Self {
        Self {
            format,
            blob: blob.into(),
        }
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.blob.len()
    }

    /// True for an empty blob.
    pub fn is_empty(&self) -> bool {
        self.blob.is_empty()
    }
}

/// Decoded mesh in the fixed upload layout.
///
/// `positions` and `normals` are xyz triples; `indices` address vertices.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshBuffers {
    /// Geometry layout.
    pub format: MeshFormat,
    /// Vertex positions (3 floats per vertex).
    pub positions: Vec<f32>,
    /// Vertex normals (3 floats per vertex, or empty).
    pub normals: Vec<f32>,
    /// Vertex indices.
    pub indices: Vec<u32>,
}

impl MeshBuffers {
    /// Empty buffers of the given layout.
    pub fn empty(format: MeshFormat) -> Self {
        Self {
            format,
            positions: Vec::new(),
            normals: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Number of vertices described by `positions`.
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

/// A node of the scene forest.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Shape {
    /// Stable identifier.
    pub id: ShapeId,
    /// Shape kind.
    pub kind: ShapeKind,
    /// Parent id; `None` for roots.
    #[cfg_attr(feature = "serde", serde(default))]
    pub parent: Option<ShapeId>,
    /// Ordered child ids.
    #[cfg_attr(feature = "serde", serde(default))]
    pub children: Vec<ShapeId>,
    /// Mesh payload reference (last successfully decoded payload).
    #[cfg_attr(feature = "serde", serde(default))]
    pub mesh: Option<MeshPayload>,
    /// Material hints.
    #[cfg_attr(feature = "serde", serde(default))]
    pub material: Material,
    /// Face visibility.
    pub visible: bool,
    /// Edge overlay visibility.
    pub edges_visible: bool,
    /// Whether picks may resolve to this shape.
    pub selectable: bool,
}

impl Shape {
    /// A visible, selectable shape with default material and no geometry.
    pub fn new(id: impl Into<ShapeId>, kind: ShapeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            parent: None,
            children: Vec::new(),
            mesh: None,
            material: Material::default(),
            visible: true,
            edges_visible: true,
            selectable: true,
        }
    }

    /// Builder: set the parent id.
    pub fn with_parent(mut self, parent: impl Into<ShapeId>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Builder: attach a mesh payload.
    pub fn with_mesh(mut self, mesh: MeshPayload) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Builder: set the material.
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }
}

/// Maximum number of deltas accepted in a single attribute update.
///
/// This limit prevents runaway batches from triggering excessive
/// allocations during decoding.
pub const MAX_BATCH: usize = 10_000;
