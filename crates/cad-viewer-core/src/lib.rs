// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! cad-viewer-core: client-side sync core of the CAD viewer.
//!
//! The kernel owns the truth; this crate keeps a local copy of the scene
//! forest, the view and the selection, applies kernel deltas as they arrive,
//! reports local gestures back without echoing kernel values, and drives a
//! [`cad_scene_port::RenderPort`] with the minimal set of calls.
//!
//! Data flows one way:
//!
//! ```text
//! transport -> reconciler -> models -> binding -> renderer
//! input -> surface -> reconciler -> (flush on tick) -> transport
//! ```
//!
//! Everything is single-threaded and cooperative; time only enters through
//! [`CadView::tick`].
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]

mod binding;
mod cad_view;
pub mod camera;
mod config;
mod decode;
mod error;
mod reconciler;
pub mod scene;
mod selection;
pub mod surface;
mod throttle;
mod transport;
pub mod view;

pub use binding::{BindingStatus, RendererBinding};
pub use cad_view::CadView;
pub use config::{
    ConfigError, ConfigService, ConfigStore, MemoryConfigStore, Theme, ViewerConfig,
    MIN_CAD_WIDTH, MIN_TREE_WIDTH, VIEWER_CONFIG_KEY,
};
pub use decode::{DecodeQueue, DecodeTask};
pub use error::RejectReason;
pub use reconciler::{Reconciler, RenderEffect};
pub use scene::{AppliedEffect, DecodeEffect, SceneModel, SceneTree};
pub use selection::{SelectionModel, SelectionState};
pub use surface::{InputEvent, Intent, Key, Modifiers, PointerButton, Surface};
pub use throttle::FrameGate;
pub use transport::{ChannelTransport, RecordingTransport, Transport, TransportError};
pub use view::{ViewEffect, ViewModel};
