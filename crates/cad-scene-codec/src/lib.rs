// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mesh payload codec and test harness for cad-scene-port.
//!
//! This crate provides:
//! - CBOR encode/decode for mesh blobs in the fixed upload layout
//! - MockRenderer for headless testing of the sync core
//!
//! # Design
//!
//! Decoding is deliberately separated from the port contract.
//! This keeps cad-scene-port pure and lets the core schedule decodes
//! off its reconciliation path.

mod mesh;
mod mock_renderer;

pub use mesh::*;
pub use mock_renderer::*;
