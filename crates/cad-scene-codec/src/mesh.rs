// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CBOR encoding and decoding for mesh payload blobs.
//!
//! Blob layout (version 1):
//!
//! ``[version: u8, positions: bytes, normals: bytes, indices: bytes]``
//!
//! * positions/normals are little-endian `f32` xyz triples
//! * indices are little-endian `u32`
//! * the geometry layout (triangles/polylines/points) travels in the
//!   [`MeshPayload`] format tag, not in the blob

use cad_scene_port::{MeshBuffers, MeshFormat, MeshPayload};
use minicbor::{Decoder, Encoder};
use thiserror::Error;

/// Current mesh blob version.
pub const MESH_BLOB_VERSION: u8 = 1;

/// Errors raised while encoding or decoding mesh blobs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshCodecError {
    /// The CBOR envelope was malformed or truncated.
    #[error("cbor error: {0}")]
    Cbor(String),
    /// The blob was produced by an unknown codec version.
    #[error("unsupported mesh blob version {0}")]
    Version(u8),
    /// Extra bytes followed the blob.
    #[error("trailing bytes after mesh blob")]
    TrailingBytes,
    /// A buffer length is not a multiple of its element stride.
    #[error("{buffer} buffer length {len} is not a multiple of {stride}")]
    Stride {
        /// Buffer name.
        buffer: &'static str,
        /// Byte length found.
        len: usize,
        /// Required stride in bytes.
        stride: usize,
    },
    /// Normals are present but don't match the vertex count.
    #[error("expected {expected} normal floats, got {actual}")]
    NormalCount {
        /// Float count required by positions.
        expected: usize,
        /// Float count found.
        actual: usize,
    },
    /// Index count doesn't fit the geometry layout.
    #[error("{count} indices do not form {format:?} primitives")]
    IndexCount {
        /// Layout the payload claims.
        format: MeshFormat,
        /// Index count found.
        count: usize,
    },
    /// An index addresses a vertex that doesn't exist.
    #[error("index {index} out of range for {vertices} vertices")]
    IndexOutOfRange {
        /// Offending index.
        index: u32,
        /// Vertex count.
        vertices: usize,
    },
    /// A position or normal is NaN or infinite.
    #[error("non-finite float in {0} buffer")]
    NonFinite(&'static str),
    /// Encoding failed.
    #[error("encode error: {0}")]
    Encode(String),
}

impl From<minicbor::decode::Error> for MeshCodecError {
    fn from(err: minicbor::decode::Error) -> Self {
        MeshCodecError::Cbor(err.to_string())
    }
}

// ============================================================================
// Little-endian buffer helpers
// ============================================================================

fn f32s_to_le(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn u32s_to_le(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn le_to_f32s(buffer: &'static str, bytes: &[u8]) -> Result<Vec<f32>, MeshCodecError> {
    if bytes.len() % 12 != 0 {
        return Err(MeshCodecError::Stride {
            buffer,
            len: bytes.len(),
            stride: 12,
        });
    }
    let out: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if out.iter().any(|v| !v.is_finite()) {
        return Err(MeshCodecError::NonFinite(buffer));
    }
    Ok(out)
}

fn le_to_u32s(bytes: &[u8]) -> Result<Vec<u32>, MeshCodecError> {
    if bytes.len() % 4 != 0 {
        return Err(MeshCodecError::Stride {
            buffer: "indices",
            len: bytes.len(),
            stride: 4,
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

// ============================================================================
// Validation
// ============================================================================

/// Check decoded buffers against the invariants of their layout.
pub fn validate_mesh(mesh: &MeshBuffers) -> Result<(), MeshCodecError> {
    if mesh.positions.len() % 3 != 0 {
        return Err(MeshCodecError::Stride {
            buffer: "positions",
            len: mesh.positions.len() * 4,
            stride: 12,
        });
    }
    if mesh.positions.iter().any(|v| !v.is_finite()) {
        return Err(MeshCodecError::NonFinite("positions"));
    }
    if mesh.normals.iter().any(|v| !v.is_finite()) {
        return Err(MeshCodecError::NonFinite("normals"));
    }
    if !mesh.normals.is_empty() && mesh.normals.len() != mesh.positions.len() {
        return Err(MeshCodecError::NormalCount {
            expected: mesh.positions.len(),
            actual: mesh.normals.len(),
        });
    }

    let count = mesh.indices.len();
    let shape_ok = match mesh.format {
        MeshFormat::Triangles => count % 3 == 0,
        MeshFormat::Polylines => count % 2 == 0,
        MeshFormat::Points => count == 0,
    };
    if !shape_ok {
        return Err(MeshCodecError::IndexCount {
            format: mesh.format,
            count,
        });
    }

    let vertices = mesh.vertex_count();
    if let Some(&index) = mesh.indices.iter().find(|&&i| i as usize >= vertices) {
        return Err(MeshCodecError::IndexOutOfRange { index, vertices });
    }
    Ok(())
}

// ============================================================================
// Public encode/decode functions
// ============================================================================

/// Encode mesh buffers into a payload blob.
///
/// The buffers are validated first, so a payload produced here always
/// decodes.
pub fn encode_mesh(mesh: &MeshBuffers) -> Result<MeshPayload, MeshCodecError> {
    validate_mesh(mesh)?;
    let mut buf = Vec::new();
    let mut e = Encoder::new(&mut buf);
    e.array(4)
        .and_then(|e| e.u8(MESH_BLOB_VERSION))
        .and_then(|e| e.bytes(&f32s_to_le(&mesh.positions)))
        .and_then(|e| e.bytes(&f32s_to_le(&mesh.normals)))
        .and_then(|e| e.bytes(&u32s_to_le(&mesh.indices)))
        .map_err(|err| MeshCodecError::Encode(err.to_string()))?;
    Ok(MeshPayload::new(mesh.format, buf))
}

/// Decode a payload blob into upload-ready buffers.
pub fn decode_mesh(payload: &MeshPayload) -> Result<MeshBuffers, MeshCodecError> {
    let bytes: &[u8] = &payload.blob;
    let mut d = Decoder::new(bytes);
    let len = d
        .array()?
        .ok_or_else(|| MeshCodecError::Cbor("expected definite array for mesh blob".into()))?;
    if len != 4 {
        return Err(MeshCodecError::Cbor(format!(
            "mesh blob expected 4 fields, got {len}"
        )));
    }
    let version = d.u8()?;
    if version != MESH_BLOB_VERSION {
        return Err(MeshCodecError::Version(version));
    }
    let positions = le_to_f32s("positions", d.bytes()?)?;
    let normals = le_to_f32s("normals", d.bytes()?)?;
    let indices = le_to_u32s(d.bytes()?)?;
    if d.position() < bytes.len() {
        return Err(MeshCodecError::TrailingBytes);
    }

    let mesh = MeshBuffers {
        format: payload.format,
        positions,
        normals,
        indices,
    };
    validate_mesh(&mesh)?;
    Ok(mesh)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn triangle() -> MeshBuffers {
        MeshBuffers {
            format: MeshFormat::Triangles,
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            normals: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            indices: vec![0, 1, 2],
        }
    }

    fn raw_blob(version: u8, positions: &[u8], normals: &[u8], indices: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut e = Encoder::new(&mut buf);
        e.array(4).unwrap();
        e.u8(version).unwrap();
        e.bytes(positions).unwrap();
        e.bytes(normals).unwrap();
        e.bytes(indices).unwrap();
        buf
    }

    #[test]
    fn triangle_survives_encoding() {
        let mesh = triangle();
        let payload = encode_mesh(&mesh).unwrap();
        assert_eq!(payload.format, MeshFormat::Triangles);
        assert_eq!(decode_mesh(&payload).unwrap(), mesh);
    }

    #[test]
    fn points_without_normals_are_valid() {
        let mesh = MeshBuffers {
            format: MeshFormat::Points,
            positions: vec![1.0, 2.0, 3.0],
            normals: vec![],
            indices: vec![],
        };
        let payload = encode_mesh(&mesh).unwrap();
        assert_eq!(decode_mesh(&payload).unwrap().vertex_count(), 1);
    }

    #[test]
    fn reject_trailing_garbage() {
        let mut payload = encode_mesh(&triangle()).unwrap();
        let mut bytes = payload.blob.to_vec();
        bytes.push(0xFF);
        payload.blob = bytes.into();
        assert_eq!(decode_mesh(&payload), Err(MeshCodecError::TrailingBytes));
    }

    #[test]
    fn reject_invalid_version() {
        let blob = raw_blob(99, &[], &[], &[]);
        let payload = MeshPayload::new(MeshFormat::Points, blob);
        assert_eq!(decode_mesh(&payload), Err(MeshCodecError::Version(99)));
    }

    #[test]
    fn reject_misaligned_positions() {
        let blob = raw_blob(1, &[0u8; 10], &[], &[]);
        let payload = MeshPayload::new(MeshFormat::Points, blob);
        assert!(matches!(
            decode_mesh(&payload),
            Err(MeshCodecError::Stride {
                buffer: "positions",
                ..
            })
        ));
    }

    #[test]
    fn reject_out_of_range_index() {
        let mut mesh = triangle();
        mesh.indices = vec![0, 1, 7];
        assert_eq!(
            encode_mesh(&mesh),
            Err(MeshCodecError::IndexOutOfRange {
                index: 7,
                vertices: 3
            })
        );
    }

    #[test]
    fn reject_partial_triangle() {
        let mut mesh = triangle();
        mesh.indices = vec![0, 1];
        assert!(matches!(
            encode_mesh(&mesh),
            Err(MeshCodecError::IndexCount { count: 2, .. })
        ));
    }

    #[test]
    fn reject_indexed_points() {
        let mesh = MeshBuffers {
            format: MeshFormat::Points,
            positions: vec![0.0; 3],
            normals: vec![],
            indices: vec![0],
        };
        assert!(encode_mesh(&mesh).is_err());
    }

    #[test]
    fn reject_nan_in_wire_bytes() {
        let mut positions = Vec::new();
        for v in [f32::NAN, 0.0, 0.0] {
            positions.extend_from_slice(&v.to_le_bytes());
        }
        let payload = MeshPayload::new(MeshFormat::Points, raw_blob(1, &positions, &[], &[]));
        assert_eq!(
            decode_mesh(&payload),
            Err(MeshCodecError::NonFinite("positions"))
        );
    }

    #[test]
    fn reject_normal_count_mismatch() {
        let mut mesh = triangle();
        mesh.normals.truncate(3);
        assert!(matches!(
            encode_mesh(&mesh),
            Err(MeshCodecError::NormalCount { .. })
        ));
    }

    #[test]
    fn drill_truncated_cbor() {
        let payload = encode_mesh(&triangle()).unwrap();
        let full = payload.blob.to_vec();

        // Try decoding every possible truncated prefix
        for len in 0..full.len() {
            let truncated = MeshPayload::new(MeshFormat::Triangles, full[..len].to_vec());
            assert!(
                decode_mesh(&truncated).is_err(),
                "Decoding should fail for truncated input of length {}",
                len
            );
        }
    }
}
