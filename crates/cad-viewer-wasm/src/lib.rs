// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! CAD viewer browser glue: WASM bindings over `cad-viewer-core`.
//!
//! One [`CadViewerHandle`] wraps one `CadView`. The page owns the kernel
//! socket and the drawing code; this crate only moves bytes and events.
//!
//! # Usage (from JavaScript)
//!
//! ```js
//! import init, { CadViewerHandle } from 'cad-viewer-wasm';
//!
//! await init();
//! const viewer = new CadViewerHandle(threeBridge, JSON.stringify({ theme: 'dark' }));
//!
//! socket.onmessage = (ev) => viewer.push_frame(new Uint8Array(ev.data));
//!
//! function frame(now) {
//!   viewer.pump(256);
//!   viewer.tick(now);
//!   for (const out of viewer.drain_outbound()) socket.send(out);
//!   requestAnimationFrame(frame);
//! }
//! requestAnimationFrame(frame);
//! ```
//!
//! `threeBridge` is any object with the renderer methods listed in
//! [`JsRenderer`]; pick results come back as
//! `{ shape_id, sub_kind: 'face' | 'edge' | 'vertex', sub_index, point }`.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::cargo)]
#![allow(clippy::module_name_repetitions)]

mod js_renderer;
mod queue;

use std::time::Duration;

use cad_scene_port::ShapeId;
use cad_viewer_core::{
    BindingStatus, CadView, ConfigService, ConfigStore, InputEvent, Key, MemoryConfigStore,
    Modifiers, PointerButton, VIEWER_CONFIG_KEY,
};
use js_sys::{Array, Uint8Array};
use wasm_bindgen::prelude::*;

pub use js_renderer::JsRenderer;
pub use queue::FrameQueue;

/// DOM `MouseEvent.button` for the primary button.
const DOM_BUTTON_PRIMARY: u8 = 0;
/// DOM `MouseEvent.button` for the secondary button.
const DOM_BUTTON_SECONDARY: u8 = 2;

fn js_error(err: impl std::fmt::Display) -> JsError {
    JsError::new(&err.to_string())
}

/// One viewer instance bound to a JS renderer.
///
/// Single-threaded; create one handle per canvas.
#[wasm_bindgen]
pub struct CadViewerHandle {
    view: CadView<JsRenderer, FrameQueue>,
}

#[wasm_bindgen]
impl CadViewerHandle {
    // ─── Construction ────────────────────────────────────────────────────────

    /// Creates a viewer drawing through `renderer`.
    ///
    /// `config_json` is an optional JSON viewer config; missing fields take
    /// their defaults.
    ///
    /// # Errors
    ///
    /// Throws when the config does not parse or violates a constraint
    /// (for example a drawing area narrower than 640 px).
    #[wasm_bindgen(constructor)]
    pub fn new(renderer: JsValue, config_json: Option<String>) -> Result<CadViewerHandle, JsError> {
        #[cfg(feature = "console-panic")]
        console_error_panic_hook::set_once();

        let store = MemoryConfigStore::new();
        if let Some(json) = config_json {
            store
                .save_raw(VIEWER_CONFIG_KEY, json.as_bytes())
                .map_err(js_error)?;
        }
        let config = ConfigService::new(store).load_viewer().map_err(js_error)?;
        let view = CadView::new(config, JsRenderer::new(renderer), FrameQueue::new())
            .map_err(js_error)?;
        Ok(Self { view })
    }

    // ─── Kernel frames ───────────────────────────────────────────────────────

    /// Queues one CBOR frame from the kernel for the next [`Self::pump`].
    pub fn push_frame(&mut self, frame: &[u8]) {
        self.view.transport_mut().push_inbound(frame.to_vec());
    }

    /// Handles one CBOR frame immediately.
    ///
    /// # Errors
    ///
    /// Throws when the frame is not a valid kernel message.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), JsError> {
        self.view.handle_frame(frame).map_err(js_error)
    }

    /// Applies up to `max` queued frames. Returns how many were handled.
    pub fn pump(&mut self, max: u32) -> u32 {
        let n = self.view.pump(max as usize);
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// Drains encoded client frames (one `Uint8Array` each) for the socket.
    pub fn drain_outbound(&mut self) -> Array {
        self.view
            .transport_mut()
            .take_outbound()
            .iter()
            .map(|frame| Uint8Array::from(frame.as_slice()))
            .collect()
    }

    /// Stops producing outbound frames; call when the socket closes.
    pub fn close_transport(&mut self) {
        self.view.transport_mut().close();
    }

    // ─── Frame loop ──────────────────────────────────────────────────────────

    /// Frame tick with the `requestAnimationFrame` timestamp in milliseconds.
    pub fn tick(&mut self, now_ms: f64) {
        let now = if now_ms.is_finite() && now_ms > 0.0 {
            Duration::from_secs_f64(now_ms / 1000.0)
        } else {
            Duration::ZERO
        };
        self.view.tick(now);
    }

    /// Resizes the drawing area.
    pub fn resize(&mut self, width: u32, height: u32, dpr: f32) {
        self.view.resize(width, height, dpr);
    }

    /// Releases the renderer. Safe to call more than once.
    pub fn dispose(&mut self) {
        self.view.dispose();
    }

    // ─── Input ───────────────────────────────────────────────────────────────

    /// Pointer pressed at normalized `(x, y)` with a DOM button code.
    pub fn pointer_down(&mut self, x: f32, y: f32, button: u8) {
        let button = match button {
            DOM_BUTTON_PRIMARY => PointerButton::Primary,
            DOM_BUTTON_SECONDARY => PointerButton::Secondary,
            _ => return,
        };
        self.view
            .handle_input(InputEvent::PointerDown { x, y, button });
    }

    /// Pointer moved to normalized `(x, y)`.
    pub fn pointer_move(&mut self, x: f32, y: f32) {
        self.view.handle_input(InputEvent::PointerMove { x, y });
    }

    /// Pointer released at normalized `(x, y)`.
    #[allow(clippy::fn_params_excessive_bools)]
    pub fn pointer_up(&mut self, x: f32, y: f32, shift: bool, ctrl: bool, meta: bool) {
        self.view.handle_input(InputEvent::PointerUp {
            x,
            y,
            modifiers: Modifiers { shift, ctrl, meta },
        });
    }

    /// Wheel scrolled; positive `delta` zooms out.
    pub fn wheel(&mut self, delta: f32) {
        self.view.handle_input(InputEvent::Wheel { delta });
    }

    /// Double click at normalized `(x, y)`.
    pub fn double_click(&mut self, x: f32, y: f32) {
        self.view.handle_input(InputEvent::DoubleClick { x, y });
    }

    /// Pointer left the canvas.
    pub fn pointer_leave(&mut self) {
        self.view.handle_input(InputEvent::Leave);
    }

    /// Animation slider moved to relative `time` on `track`.
    pub fn scrub(&mut self, track: &str, time: f32) {
        self.view.scrub(track, time);
    }

    /// Key pressed; takes `KeyboardEvent.key`.
    pub fn key(&mut self, key: &str) {
        let key = if key == "Escape" {
            Key::Escape
        } else {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Char(c),
                _ => return,
            }
        };
        self.view.handle_input(InputEvent::Key(key));
    }

    // ─── Local edits ─────────────────────────────────────────────────────────

    /// Shows or hides a shape and its subtree.
    ///
    /// # Errors
    ///
    /// Throws for an unknown shape id.
    pub fn set_visible(&mut self, shape_id: &str, visible: bool) -> Result<(), JsError> {
        self.view
            .set_visible(ShapeId::new(shape_id), visible)
            .map_err(js_error)
    }

    /// Shows or hides a shape's edges.
    ///
    /// # Errors
    ///
    /// Throws for an unknown shape id.
    pub fn set_edges_visible(&mut self, shape_id: &str, visible: bool) -> Result<(), JsError> {
        self.view
            .set_edges_visible(ShapeId::new(shape_id), visible)
            .map_err(js_error)
    }

    /// Allows or forbids picking a shape.
    ///
    /// # Errors
    ///
    /// Throws for an unknown shape id.
    pub fn set_selectable(&mut self, shape_id: &str, selectable: bool) -> Result<(), JsError> {
        self.view
            .set_selectable(ShapeId::new(shape_id), selectable)
            .map_err(js_error)
    }

    /// Replaces the selection with one shape (tree-panel click).
    ///
    /// # Errors
    ///
    /// Throws for an unknown shape id.
    pub fn select(&mut self, shape_id: &str) -> Result<(), JsError> {
        self.view.select(ShapeId::new(shape_id)).map_err(js_error)
    }

    /// Toggles one shape in the selection.
    ///
    /// # Errors
    ///
    /// Throws for an unknown shape id.
    pub fn toggle_selection(&mut self, shape_id: &str) -> Result<(), JsError> {
        self.view
            .toggle_selection(ShapeId::new(shape_id))
            .map_err(js_error)
    }

    /// Clears the selection.
    pub fn clear_selection(&mut self) {
        self.view.clear_selection();
    }

    // ─── Inspection ──────────────────────────────────────────────────────────

    /// Current structural version of the tree.
    pub fn tree_version(&self) -> u64 {
        self.view.scene().version()
    }

    /// Number of shapes in the tree.
    pub fn shape_count(&self) -> u32 {
        u32::try_from(self.view.scene().len()).unwrap_or(u32::MAX)
    }

    /// Selected shape ids in id order.
    pub fn selection(&self) -> Array {
        self.view
            .selection()
            .ids()
            .iter()
            .map(|id| JsValue::from_str(id.as_str()))
            .collect()
    }

    /// True while a full state has been requested and not yet received.
    pub fn awaiting_full_state(&self) -> bool {
        self.view.reconciler().awaiting_full_state()
    }

    /// `"ready"`, `"disposed"` or `"unavailable: <reason>"`.
    pub fn status(&self) -> String {
        match self.view.status() {
            BindingStatus::Ready => "ready".to_owned(),
            BindingStatus::Disposed => "disposed".to_owned(),
            BindingStatus::Unavailable(reason) => format!("unavailable: {reason}"),
        }
    }
}
