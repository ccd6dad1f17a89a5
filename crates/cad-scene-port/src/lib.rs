// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scene port contract for the CAD viewer.
//!
//! This crate defines the domain types shared by the sync core and the
//! rendering capability, plus the [`RenderPort`] trait that capability
//! implements. It contains NO codec logic; mesh blobs are decoded by
//! cad-scene-codec and wire messages live in cad-sync-proto.
//!
//! # Design Principles
//!
//! - **Renderers are dumb**: they upload, toggle and draw. State, versions and
//!   echo decisions belong to the core.
//! - **No time ownership**: all timing comes from the host frame loop.
//! - **Stable string ids**: shapes are addressed by kernel-assigned ids, never
//!   by renderer handles.
//!
//! # Crate Features
//!
//! - `serde`: derives `Serialize`/`Deserialize` on every port type.

mod camera;
mod canon;
mod clip;
mod highlight;
mod options;
mod port;
mod types;

pub use camera::{CameraState, ProjectionKind};
pub use canon::{canonicalize_f32, canonicalize_vec3, same_f32, same_vec3};
pub use clip::{default_clip_planes, ClipPlane};
pub use highlight::{HighlightState, PickHit, SubShapeKind};
pub use options::RenderOptions;
pub use port::{RenderError, RenderPort};
pub use types::{
    ColorRgba8, Material, MeshBuffers, MeshFormat, MeshPayload, Shape, ShapeId, ShapeKind,
    MAX_BATCH,
};
