// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Wire schema for the CAD viewer sync channel.
//!
//! The kernel and the viewer exchange attribute updates (full state or
//! delta batches keyed by [`AttributeKey`]) and custom commands. Frames are
//! CBOR `OpEnvelope`s; see [`wire`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod delta;
mod message;
mod view;
pub mod wire;

pub use delta::{AnimationChange, Delta, FieldGroup, ShapeChange, TreeOp, ViewChange};
pub use message::{
    AttributeKey, AttributePayload, AttributeUpdate, ClientMessage, FullState, KernelCommand,
    KernelMessage, PickMessage, PlaybackAction,
};
pub use view::{
    AnimationPosition, AnimationState, AnimationTrack, CameraControl, ControlMode, ControlSpeeds,
    Playback, TrackError, ViewState,
};

/// Envelope carried by every frame.
///
/// * `op` – operation name (`attr`, `pick`, `resize`, ...).
/// * `ts` – logical timestamp of the sender.
/// * `payload` – operation specific body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpEnvelope<P> {
    /// Operation name.
    pub op: String,
    /// Logical timestamp (monotonic per sender).
    pub ts: u64,
    /// Operation-specific body.
    pub payload: P,
}

/// Errors raised while framing or validating channel messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// CBOR encoding failed.
    #[error("encode error: {0}")]
    Encode(String),
    /// CBOR decoding failed or the payload didn't match its op.
    #[error("decode error: {0}")]
    Decode(String),
    /// The envelope named an op this side doesn't accept.
    #[error("unknown op {0}")]
    UnknownOp(String),
    /// The envelope op and the payload variant disagree.
    #[error("op {op} carries a {payload} payload")]
    OpMismatch {
        /// Envelope op.
        op: String,
        /// Op implied by the payload.
        payload: &'static str,
    },
    /// Unrecognized attribute key.
    #[error("unknown attribute key {0}")]
    UnknownKey(String),
    /// A delta's scope doesn't belong under the attribute key.
    #[error("{group:?} delta sent under attribute {key}")]
    ScopeMismatch {
        /// Attribute key of the update.
        key: AttributeKey,
        /// Group of the offending delta.
        group: FieldGroup,
    },
    /// Too many deltas in one update.
    #[error("batch of {len} deltas exceeds limit {max}")]
    BatchTooLarge {
        /// Deltas in the update.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },
    /// The `shapes` key carried deltas instead of a full state.
    #[error("attribute shapes requires a full state")]
    ExpectedFullState,
    /// A full state arrived under a delta key.
    #[error("full state sent under attribute {0}")]
    UnexpectedFullState(AttributeKey),
}
