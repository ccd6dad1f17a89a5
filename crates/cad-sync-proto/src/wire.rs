// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CBOR framing for channel messages.
//!
//! Every frame is a CBOR `OpEnvelope { op, ts, payload }`. The op string
//! selects the payload type; attribute updates travel under op `attr`.

use ciborium::value::Value;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    AttributeUpdate, ClientMessage, KernelCommand, KernelMessage, OpEnvelope, PickMessage,
    WireError,
};
use cad_scene_port::MAX_BATCH;

/// Encode to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| WireError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    ciborium::from_reader(bytes).map_err(|e| WireError::Decode(e.to_string()))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, WireError> {
    Value::serialized(value).map_err(|e| WireError::Encode(e.to_string()))
}

fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, WireError> {
    value
        .deserialized()
        .map_err(|e| WireError::Decode(e.to_string()))
}

fn envelope(op: &str, ts: u64, payload: Value) -> Result<Vec<u8>, WireError> {
    to_cbor(&OpEnvelope {
        op: op.to_owned(),
        ts,
        payload,
    })
}

/// Encode a kernel message with the provided logical timestamp.
pub fn encode_kernel_message(msg: &KernelMessage, ts: u64) -> Result<Vec<u8>, WireError> {
    let payload = match msg {
        KernelMessage::Attribute(update) => to_value(update)?,
        KernelMessage::Command(cmd) => to_value(cmd)?,
    };
    envelope(msg.op_name(), ts, payload)
}

/// Decode bytes into `(KernelMessage, ts)`.
///
/// Attribute updates are validated against [`MAX_BATCH`] and their key's
/// scope before they are returned.
pub fn decode_kernel_message(bytes: &[u8]) -> Result<(KernelMessage, u64), WireError> {
    let env: OpEnvelope<Value> = from_cbor(bytes)?;
    let msg = match env.op.as_str() {
        "attr" => {
            let update: AttributeUpdate = from_value(&env.payload)?;
            update.validate(MAX_BATCH)?;
            KernelMessage::Attribute(update)
        }
        "resize" | "export_image" | "needs_full_state_ack" | "animate" | "control_animation" => {
            let cmd: KernelCommand = from_value(&env.payload)?;
            if cmd.op_name() != env.op {
                return Err(WireError::OpMismatch {
                    op: env.op,
                    payload: cmd.op_name(),
                });
            }
            KernelMessage::Command(cmd)
        }
        _ => return Err(WireError::UnknownOp(env.op)),
    };
    Ok((msg, env.ts))
}

/// Encode a client message with the provided logical timestamp.
pub fn encode_client_message(msg: &ClientMessage, ts: u64) -> Result<Vec<u8>, WireError> {
    let payload = match msg {
        ClientMessage::Attribute(update) => to_value(update)?,
        ClientMessage::Pick(pick) => to_value(pick)?,
        other => to_value(other)?,
    };
    envelope(msg.op_name(), ts, payload)
}

/// Decode bytes into `(ClientMessage, ts)`.
pub fn decode_client_message(bytes: &[u8]) -> Result<(ClientMessage, u64), WireError> {
    let env: OpEnvelope<Value> = from_cbor(bytes)?;
    let msg = match env.op.as_str() {
        "attr" => {
            let update: AttributeUpdate = from_value(&env.payload)?;
            update.validate(MAX_BATCH)?;
            ClientMessage::Attribute(update)
        }
        "pick" => ClientMessage::Pick(from_value::<PickMessage>(&env.payload)?),
        "needs_full_state" | "export_result" | "renderer_unavailable" => {
            let msg: ClientMessage = from_value(&env.payload)?;
            if msg.op_name() != env.op {
                return Err(WireError::OpMismatch {
                    op: env.op,
                    payload: msg.op_name(),
                });
            }
            msg
        }
        _ => return Err(WireError::UnknownOp(env.op)),
    };
    Ok((msg, env.ts))
}
