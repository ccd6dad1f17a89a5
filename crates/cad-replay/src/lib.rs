// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CAD viewer replay harness.
//!
//! Feeds a recorded session (kernel messages, ticks, local edits) through a
//! headless viewer backed by the mock renderer and reports where it ended up.

pub mod replay;
