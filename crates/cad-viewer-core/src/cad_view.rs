// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-widget facade: one [`CadView`] owns the models of one viewer
//! instance, its renderer binding and its kernel transport.
//!
//! Nothing here is global. The host drives the view through three entry
//! points: [`CadView::handle_inbound`] (or [`CadView::pump`]),
//! [`CadView::handle_input`] and [`CadView::tick`].

use std::time::Duration;

use bytes::Bytes;
use cad_scene_port::{CameraState, Material, PickHit, RenderPort, ShapeId};
use cad_sync_proto::wire::decode_kernel_message;
use cad_sync_proto::{
    AttributePayload, ClientMessage, Delta, KernelCommand, KernelMessage, PlaybackAction,
    ShapeChange, ViewState, WireError,
};
use tracing::{debug, info, warn};

use crate::binding::{BindingStatus, RendererBinding};
use crate::camera;
use crate::config::{ConfigError, ViewerConfig};
use crate::error::RejectReason;
use crate::reconciler::{Reconciler, RenderEffect};
use crate::scene::SceneTree;
use crate::selection::SelectionState;
use crate::surface::{camera_commits, InputEvent, Intent, Surface};
use crate::transport::{Transport, TransportError};

/// One viewer instance.
pub struct CadView<R, T> {
    config: ViewerConfig,
    reconciler: Reconciler,
    binding: RendererBinding<R>,
    transport: T,
    surface: Surface,
    home_camera: CameraState,
    last_tick: Option<Duration>,
    transport_closed: bool,
}

impl<R: RenderPort, T: Transport> CadView<R, T> {
    /// Build a view; the renderer is sized from the config.
    pub fn new(config: ViewerConfig, renderer: R, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut binding = RendererBinding::new(renderer);
        binding.resize(config.cad_width, config.height, 1.0);
        Ok(Self {
            reconciler: Reconciler::new(&config),
            config,
            binding,
            transport,
            surface: Surface::new(),
            home_camera: CameraState::default(),
            last_tick: None,
            transport_closed: false,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Model owner.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Current forest.
    pub fn scene(&self) -> &SceneTree {
        self.reconciler.scene()
    }

    /// Current view.
    pub fn view(&self) -> &ViewState {
        self.reconciler.view()
    }

    /// Current selection.
    pub fn selection(&self) -> &SelectionState {
        self.reconciler.selection()
    }

    /// Renderer health.
    pub fn status(&self) -> &BindingStatus {
        self.binding.status()
    }

    /// Renderer binding.
    pub fn binding(&self) -> &RendererBinding<R> {
        &self.binding
    }

    /// Borrow the renderer.
    pub fn renderer(&self) -> &R {
        self.binding.renderer()
    }

    /// Mutably borrow the renderer.
    pub fn renderer_mut(&mut self) -> &mut R {
        self.binding.renderer_mut()
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ─── Inbound ────────────────────────────────────────────────────────

    /// Drain up to `max` messages from the transport. Returns the count.
    pub fn pump(&mut self, max: usize) -> usize {
        let msgs = self.transport.drain_inbound(max);
        let n = msgs.len();
        for msg in msgs {
            self.handle_inbound(msg);
        }
        n
    }

    /// Decode and handle one CBOR frame.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), WireError> {
        let (msg, _ts) = decode_kernel_message(frame)?;
        self.handle_inbound(msg);
        Ok(())
    }

    /// Handle one kernel message.
    pub fn handle_inbound(&mut self, msg: KernelMessage) {
        match msg {
            KernelMessage::Attribute(update) => {
                let full = matches!(update.payload, AttributePayload::Full(_));
                let effects = self.reconciler.apply_inbound(update);
                if full && effects.contains(&RenderEffect::Reload) {
                    self.home_camera = self.reconciler.view().camera;
                }
                self.render_effects(&effects);
            }
            KernelMessage::Command(cmd) => self.handle_command(cmd),
        }
        self.send_outbound();
    }

    fn handle_command(&mut self, cmd: KernelCommand) {
        match cmd {
            KernelCommand::Resize { width, height, dpr } => {
                self.resize(width, height, dpr);
            }
            KernelCommand::ExportImage { msg_id } => {
                let image = self.binding.export_image().unwrap_or_default();
                if image.is_empty() {
                    warn!(msg_id, "export requested without a renderer");
                }
                self.reconciler.push_outbound(ClientMessage::ExportResult {
                    msg_id,
                    image: Bytes::from(image),
                });
            }
            KernelCommand::NeedsFullStateAck { tree_version } => {
                info!(tree_version, "kernel acknowledged full-state request");
            }
            KernelCommand::Animate { msg_id, speed } => {
                if let Err(reason) = self.reconciler.view_model_mut().play(speed) {
                    warn!(msg_id, %reason, "animate rejected");
                }
            }
            KernelCommand::ControlAnimation { msg_id, action } => {
                let playback = self.reconciler.view_model_mut();
                match action {
                    PlaybackAction::Play => {
                        if let Err(reason) = playback.resume() {
                            warn!(msg_id, %reason, "play rejected");
                        }
                    }
                    PlaybackAction::Pause => playback.pause(),
                    PlaybackAction::Stop => playback.stop(),
                }
            }
        }
    }

    /// Resize the drawing area. Degenerate sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32, dpr: f32) {
        if width == 0 || height == 0 || !dpr.is_finite() || dpr <= 0.0 {
            warn!(width, height, dpr, "ignoring degenerate resize");
            return;
        }
        self.binding.resize(width, height, dpr);
    }

    // ─── Frame loop ─────────────────────────────────────────────────────

    /// Frame tick: advance playback, run the decode budget, flush local
    /// changes and draw.
    pub fn tick(&mut self, now: Duration) {
        let dt = self
            .last_tick
            .map_or(Duration::ZERO, |last| now.saturating_sub(last));
        self.last_tick = Some(now);
        self.reconciler
            .view_model_mut()
            .advance(dt.as_secs_f32());
        self.run_decodes(self.config.decode_budget);
        self.reconciler.flush(now);
        self.send_outbound();
        self.binding.render();
    }

    /// Decode up to `budget` pending meshes and upload the results.
    pub fn run_decodes(&mut self, budget: usize) -> usize {
        let tasks = self.reconciler.take_decodes(budget);
        let n = tasks.len();
        for task in tasks {
            let result = task.run();
            let effects = self.reconciler.complete_decode(task, result);
            self.render_effects(&effects);
        }
        n
    }

    /// Release the renderer and drop every model. Idempotent.
    pub fn dispose(&mut self) {
        self.binding.dispose();
        self.reconciler.reset();
        self.surface = Surface::new();
        debug!("view disposed");
    }

    // ─── Input and local gestures ───────────────────────────────────────

    /// Handle one input event.
    pub fn handle_input(&mut self, event: InputEvent) {
        let intents = self.surface.handle(event, self.reconciler.view());
        for intent in intents {
            self.apply_intent(intent);
        }
        self.send_outbound();
    }

    /// Move the animation scrub position. Reported at most once per frame
    /// interval, newest value first.
    pub fn scrub(&mut self, track: impl Into<String>, time: f32) {
        self.handle_input(InputEvent::Scrub {
            track: track.into(),
            time,
        });
    }

    fn apply_intent(&mut self, intent: Intent) {
        match intent {
            Intent::Pick { x, y, additive } => {
                let effects = match self.pick_selectable(x, y) {
                    Some(hit) => {
                        self.reconciler.report_pick(&hit);
                        if additive {
                            self.reconciler.toggle_selected(hit.shape_id)
                        } else {
                            self.reconciler.select_only(hit.shape_id)
                        }
                    }
                    None if !additive => self.reconciler.clear_selection(),
                    None => Vec::new(),
                };
                self.render_effects(&effects);
            }
            Intent::Hover { x, y } => {
                let id = self.pick_selectable(x, y).map(|hit| hit.shape_id);
                let effects = self.reconciler.set_hovered(id);
                self.render_effects(&effects);
            }
            Intent::ClearHover => {
                let effects = self.reconciler.set_hovered(None);
                self.render_effects(&effects);
            }
            Intent::Commit(delta) => {
                if let Err(reason) = self.apply_local(&delta) {
                    warn!(%reason, "local change rejected");
                }
            }
            Intent::Recenter { x, y } => {
                if let Some(hit) = self.binding.pick(x, y) {
                    let next = camera::recenter(&self.reconciler.view().camera, hit.point);
                    self.commit_camera(next);
                }
            }
            Intent::ClearSelection => {
                let effects = self.reconciler.clear_selection();
                self.render_effects(&effects);
            }
            Intent::ToggleSelectedVisibility => self.toggle_selected_visibility(),
            Intent::ResetCamera => self.commit_camera(self.home_camera),
        }
    }

    fn commit_camera(&mut self, next: CameraState) {
        for intent in camera_commits(self.reconciler.view(), next) {
            self.apply_intent(intent);
        }
    }

    fn pick_selectable(&mut self, x: f32, y: f32) -> Option<PickHit> {
        let hit = self.binding.pick(x, y)?;
        match self.reconciler.scene().get(&hit.shape_id) {
            Some(shape) if shape.selectable => Some(hit),
            Some(_) => None,
            None => {
                debug!(shape = %hit.shape_id, "pick resolved to unknown shape");
                None
            }
        }
    }

    fn toggle_selected_visibility(&mut self) {
        let ids = self.reconciler.selection().ids();
        if ids.is_empty() {
            return;
        }
        let scene = self.reconciler.scene();
        let show = ids
            .iter()
            .all(|id| scene.get(id).is_some_and(|s| !s.visible));
        for id in ids {
            if let Err(reason) = self.set_visible(id, show) {
                warn!(%reason, "visibility toggle rejected");
            }
        }
    }

    /// Apply a local change now; it is reported on the next tick.
    pub fn apply_local(&mut self, delta: &Delta) -> Result<(), RejectReason> {
        let effects = self.reconciler.apply_local(delta)?;
        self.render_effects(&effects);
        Ok(())
    }

    /// Show or hide a shape and its subtree.
    pub fn set_visible(&mut self, id: ShapeId, visible: bool) -> Result<(), RejectReason> {
        self.apply_local(&Delta::shape(id, ShapeChange::Visible(visible), 0))
    }

    /// Show or hide a shape's edges.
    pub fn set_edges_visible(&mut self, id: ShapeId, visible: bool) -> Result<(), RejectReason> {
        self.apply_local(&Delta::shape(id, ShapeChange::EdgesVisible(visible), 0))
    }

    /// Change a shape's material.
    pub fn set_material(&mut self, id: ShapeId, material: Material) -> Result<(), RejectReason> {
        self.apply_local(&Delta::shape(id, ShapeChange::Material(material), 0))
    }

    /// Allow or forbid picking a shape.
    pub fn set_selectable(&mut self, id: ShapeId, selectable: bool) -> Result<(), RejectReason> {
        self.apply_local(&Delta::shape(id, ShapeChange::Selectable(selectable), 0))
    }

    /// Replace the selection with one known shape.
    pub fn select(&mut self, id: ShapeId) -> Result<(), RejectReason> {
        if !self.reconciler.scene().contains(&id) {
            return Err(RejectReason::UnknownShape(id));
        }
        let effects = self.reconciler.select_only(id);
        self.render_effects(&effects);
        Ok(())
    }

    /// Toggle one known shape in the selection.
    pub fn toggle_selection(&mut self, id: ShapeId) -> Result<(), RejectReason> {
        if !self.reconciler.scene().contains(&id) {
            return Err(RejectReason::UnknownShape(id));
        }
        let effects = self.reconciler.toggle_selected(id);
        self.render_effects(&effects);
        Ok(())
    }

    /// Clear the selection.
    pub fn clear_selection(&mut self) {
        let effects = self.reconciler.clear_selection();
        self.render_effects(&effects);
    }

    // ─── Plumbing ───────────────────────────────────────────────────────

    fn render_effects(&mut self, effects: &[RenderEffect]) {
        if effects.is_empty() {
            return;
        }
        self.binding.apply(
            effects,
            self.reconciler.scene(),
            self.reconciler.view(),
            self.reconciler.selection(),
        );
    }

    fn send_outbound(&mut self) {
        if let Some(reason) = self.binding.take_failure() {
            self.reconciler
                .push_outbound(ClientMessage::RendererUnavailable { reason });
        }
        for msg in self.reconciler.take_outbound() {
            match self.transport.send(msg) {
                Ok(()) => self.transport_closed = false,
                Err(TransportError::Closed) if self.transport_closed => {
                    debug!("transport still closed; dropping message");
                }
                Err(err) => {
                    warn!(error = %err, "failed to send to kernel");
                    self.transport_closed = err == TransportError::Closed;
                }
            }
        }
    }
}
