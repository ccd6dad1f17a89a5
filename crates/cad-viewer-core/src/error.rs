// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reject reasons shared by the models, the reconciler and the binding.

use cad_scene_port::ShapeId;
use thiserror::Error;

/// Why a delta, decode result or renderer call was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The delta names a shape that doesn't exist.
    #[error("unknown shape {0}")]
    UnknownShape(ShapeId),
    /// The delta names a parent that doesn't exist.
    #[error("unknown parent {0}")]
    UnknownParent(ShapeId),
    /// The delta was computed against a version older than `current - 1`.
    #[error("stale version {declared} (current {current})")]
    StaleVersion {
        /// Version declared by the delta.
        declared: u64,
        /// Local version when it arrived.
        current: u64,
    },
    /// The value failed validation.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    /// The rendering capability is gone.
    #[error("rendering capability unavailable: {0}")]
    CapabilityUnavailable(String),
    /// An add names an id that already exists.
    #[error("shape {0} already exists")]
    DuplicateShape(ShapeId),
    /// A reparent would put a shape under its own subtree.
    #[error("reparenting {0} would create a cycle")]
    CycleDetected(ShapeId),
    /// An animation delta names a track that isn't loaded.
    #[error("unknown animation track {0}")]
    UnknownTrack(String),
}

impl RejectReason {
    /// True for rejects that mean the local forest disagrees with the
    /// kernel's, which only a full state can repair.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            RejectReason::UnknownShape(_)
                | RejectReason::UnknownParent(_)
                | RejectReason::StaleVersion { .. }
                | RejectReason::DuplicateShape(_)
                | RejectReason::CycleDetected(_)
        )
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        RejectReason::MalformedPayload(msg.into())
    }
}
