// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Channel messages: attribute updates, kernel commands and client messages.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use cad_scene_port::{Shape, ShapeId, SubShapeKind};
use serde::{Deserialize, Serialize};

use crate::delta::{AnimationChange, Delta};
use crate::view::ViewState;
use crate::WireError;

/// Synchronized attribute of the viewer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKey {
    /// Full state (tree, view, selection, tracks, version stamp).
    Shapes,
    /// Shape field deltas.
    States,
    /// Structural deltas.
    Tree,
    /// Animation track list.
    Tracks,
    /// View deltas, including clip planes.
    Camera,
    /// Selection deltas.
    Selection,
    /// Animation position and loop deltas.
    Animation,
}

impl AttributeKey {
    /// Wire name of the key.
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeKey::Shapes => "shapes",
            AttributeKey::States => "states",
            AttributeKey::Tree => "tree",
            AttributeKey::Tracks => "tracks",
            AttributeKey::Camera => "camera",
            AttributeKey::Selection => "selection",
            AttributeKey::Animation => "animation",
        }
    }

    /// True when `delta` may travel under this key.
    pub fn admits(self, delta: &Delta) -> bool {
        match (self, delta) {
            (AttributeKey::States, Delta::Shapes { .. })
            | (AttributeKey::Tree, Delta::Tree { .. })
            | (AttributeKey::Camera, Delta::View { .. })
            | (AttributeKey::Selection, Delta::Selection { .. })
            | (
                AttributeKey::Tracks,
                Delta::Animation {
                    change: AnimationChange::Tracks(_),
                    ..
                },
            ) => true,
            (AttributeKey::Animation, Delta::Animation { change, .. }) => {
                !matches!(change, AnimationChange::Tracks(_))
            }
            _ => false,
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeKey {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "shapes" => AttributeKey::Shapes,
            "states" => AttributeKey::States,
            "tree" => AttributeKey::Tree,
            "tracks" => AttributeKey::Tracks,
            "camera" => AttributeKey::Camera,
            "selection" => AttributeKey::Selection,
            "animation" => AttributeKey::Animation,
            other => return Err(WireError::UnknownKey(other.to_owned())),
        })
    }
}

/// Complete authoritative state, sent initially and on resync.
///
/// Shapes travel as a flat list with parent pointers; child lists are
/// rebuilt by the receiver in list order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullState {
    /// Version stamp of the tree.
    pub tree_version: u64,
    /// Every shape, parents before or after children in any order.
    pub shapes: Vec<Shape>,
    /// View state, including animation tracks.
    #[serde(default)]
    pub view: ViewState,
    /// Highlighted shapes.
    #[serde(default)]
    pub selection: Vec<ShapeId>,
}

/// Body of an attribute update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AttributePayload {
    /// Replace every model.
    Full(Box<FullState>),
    /// Apply deltas in order.
    Deltas(Vec<Delta>),
}

/// New value of one synchronized attribute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttributeUpdate {
    /// Attribute being updated.
    pub key: AttributeKey,
    /// New value.
    pub payload: AttributePayload,
}

impl AttributeUpdate {
    /// Full-state update under the `shapes` key.
    pub fn full(state: FullState) -> Self {
        Self {
            key: AttributeKey::Shapes,
            payload: AttributePayload::Full(Box::new(state)),
        }
    }

    /// Delta batch under `key`.
    pub fn deltas(key: AttributeKey, deltas: Vec<Delta>) -> Self {
        Self {
            key,
            payload: AttributePayload::Deltas(deltas),
        }
    }

    /// Check key/payload agreement and the batch size limit.
    pub fn validate(&self, max_batch: usize) -> Result<(), WireError> {
        match (&self.payload, self.key) {
            (AttributePayload::Full(_), AttributeKey::Shapes) => Ok(()),
            (AttributePayload::Full(_), key) => Err(WireError::UnexpectedFullState(key)),
            (AttributePayload::Deltas(_), AttributeKey::Shapes) => Err(WireError::ExpectedFullState),
            (AttributePayload::Deltas(deltas), key) => {
                if deltas.len() > max_batch {
                    return Err(WireError::BatchTooLarge {
                        len: deltas.len(),
                        max: max_batch,
                    });
                }
                match deltas.iter().find(|d| !key.admits(d)) {
                    Some(d) => Err(WireError::ScopeMismatch {
                        key,
                        group: d.group(),
                    }),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Animation control verb.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackAction {
    /// Start or resume.
    Play,
    /// Halt at the current position.
    Pause,
    /// Halt and rewind.
    Stop,
}

/// Custom command sent by the kernel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum KernelCommand {
    /// Resize the drawing area.
    Resize {
        /// Width in CSS pixels.
        width: u32,
        /// Height in CSS pixels.
        height: u32,
        /// Device pixel ratio.
        #[serde(default = "unit_dpr")]
        dpr: f32,
    },
    /// Capture the current frame.
    ExportImage {
        /// Correlation id echoed in the result.
        msg_id: u64,
    },
    /// Acknowledgement of a full-state request.
    NeedsFullStateAck {
        /// Tree version the kernel saw in the request.
        tree_version: u64,
    },
    /// Start playback at `speed`.
    Animate {
        /// Correlation id.
        msg_id: u64,
        /// Speed factor.
        speed: f32,
    },
    /// Play, pause or stop.
    ControlAnimation {
        /// Correlation id.
        msg_id: u64,
        /// Verb.
        action: PlaybackAction,
    },
}

fn unit_dpr() -> f32 {
    1.0
}

impl KernelCommand {
    /// Envelope op for this command.
    pub fn op_name(&self) -> &'static str {
        match self {
            KernelCommand::Resize { .. } => "resize",
            KernelCommand::ExportImage { .. } => "export_image",
            KernelCommand::NeedsFullStateAck { .. } => "needs_full_state_ack",
            KernelCommand::Animate { .. } => "animate",
            KernelCommand::ControlAnimation { .. } => "control_animation",
        }
    }
}

/// Anything the kernel sends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum KernelMessage {
    /// Attribute change.
    Attribute(AttributeUpdate),
    /// Custom command.
    Command(KernelCommand),
}

impl KernelMessage {
    /// Envelope op for this message.
    pub fn op_name(&self) -> &'static str {
        match self {
            KernelMessage::Attribute(_) => "attr",
            KernelMessage::Command(cmd) => cmd.op_name(),
        }
    }
}

/// Pick result reported to the kernel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PickMessage {
    /// Picked shape.
    pub shape_id: ShapeId,
    /// Face, edge or vertex.
    pub sub_kind: SubShapeKind,
    /// Index of the sub-element.
    pub sub_index: u32,
    /// World-space hit point.
    pub point: [f32; 3],
}

/// Anything the client sends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// Outbound attribute echo.
    Attribute(AttributeUpdate),
    /// Pick result.
    Pick(PickMessage),
    /// Request for a full state after a structural reject.
    NeedsFullState {
        /// Local tree version at the time of the request.
        tree_version: u64,
    },
    /// Answer to an export command.
    ExportResult {
        /// Correlation id of the command.
        msg_id: u64,
        /// Encoded image, or empty when the renderer is gone.
        image: Bytes,
    },
    /// The rendering capability failed; the view no longer draws.
    RendererUnavailable {
        /// Failure description.
        reason: String,
    },
}

impl ClientMessage {
    /// Envelope op for this message.
    pub fn op_name(&self) -> &'static str {
        match self {
            ClientMessage::Attribute(_) => "attr",
            ClientMessage::Pick(_) => "pick",
            ClientMessage::NeedsFullState { .. } => "needs_full_state",
            ClientMessage::ExportResult { .. } => "export_result",
            ClientMessage::RendererUnavailable { .. } => "renderer_unavailable",
        }
    }
}
