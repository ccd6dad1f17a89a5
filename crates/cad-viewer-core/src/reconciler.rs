// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reconciler: the only writer of the scene, view and selection models.
//!
//! Inbound kernel deltas are validated and applied immediately. Local
//! gestures are applied locally at once and reported on the next frame
//! flush. Outbound deltas are computed as `diff(kernel_known, local)`: the
//! reconciler keeps the last state the kernel is known to hold per field
//! group and updates it with every kernel delta, so kernel values are never
//! echoed and values the kernel already holds are never sent.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use cad_scene_codec::MeshCodecError;
use cad_scene_port::{MeshBuffers, PickHit, ShapeId};
use cad_sync_proto::{
    AttributeKey, AttributePayload, AttributeUpdate, ClientMessage, Delta, FieldGroup, FullState,
    PickMessage, ViewState,
};
use tracing::{debug, info, warn};

use crate::config::ViewerConfig;
use crate::decode::DecodeTask;
use crate::error::RejectReason;
use crate::scene::{self, AppliedEffect, DecodeEffect, SceneModel, SceneTree};
use crate::selection::{SelectionModel, SelectionState};
use crate::throttle::FrameGate;
use crate::view::{
    self, apply_animation_change, apply_view_change, normalize_color, validate_view, ViewEffect,
    ViewModel,
};

/// Work the renderer binding must do after a model change.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderEffect {
    /// Everything was replaced; drop renderer state and re-sync.
    Reload,
    /// A decoded mesh is ready for upload.
    MeshReady {
        /// Shape the mesh belongs to.
        shape_id: ShapeId,
        /// Upload-ready buffers.
        buffers: MeshBuffers,
    },
    /// Shapes were removed.
    Removed(Vec<ShapeId>),
    /// Visibility or material of a shape (and its subtree) may have changed.
    ShapeState(ShapeId),
    /// Camera changed.
    Camera,
    /// Clip planes changed.
    ClipPlanes,
    /// Render options changed.
    Options,
    /// Selection or hover changed.
    Highlight,
}

/// Owner of the models and the per-group revision counters.
#[derive(Debug)]
pub struct Reconciler {
    scene: SceneModel,
    view: ViewModel,
    selection: SelectionModel,
    revisions: BTreeMap<FieldGroup, u64>,
    kernel_shapes: Option<SceneTree>,
    kernel_view: ViewState,
    kernel_selection: Vec<ShapeId>,
    awaiting_full_state: bool,
    dirty: BTreeSet<FieldGroup>,
    view_gate: FrameGate,
    animation_gate: FrameGate,
    sync_view: bool,
    max_batch: usize,
    outbox: Vec<ClientMessage>,
}

impl Reconciler {
    /// Empty models configured from `config`.
    pub fn new(config: &ViewerConfig) -> Self {
        let interval = config.frame_interval();
        Self {
            scene: SceneModel::new(),
            view: ViewModel::new(),
            selection: SelectionModel::new(),
            revisions: FieldGroup::ALL.iter().map(|g| (*g, 0)).collect(),
            kernel_shapes: None,
            kernel_view: ViewState::default(),
            kernel_selection: Vec::new(),
            awaiting_full_state: false,
            dirty: BTreeSet::new(),
            view_gate: FrameGate::new(interval),
            animation_gate: FrameGate::new(interval),
            sync_view: config.sync_view,
            max_batch: config.max_batch,
            outbox: Vec::new(),
        }
    }

    /// Current forest.
    pub fn scene(&self) -> &SceneTree {
        self.scene.snapshot()
    }

    /// Scene model (decode queue access).
    pub fn scene_model(&self) -> &SceneModel {
        &self.scene
    }

    /// Current view.
    pub fn view(&self) -> &ViewState {
        self.view.snapshot()
    }

    /// View model (local playback).
    pub fn view_model(&self) -> &ViewModel {
        &self.view
    }

    pub(crate) fn view_model_mut(&mut self) -> &mut ViewModel {
        &mut self.view
    }

    /// Current selection.
    pub fn selection(&self) -> &SelectionState {
        self.selection.snapshot()
    }

    /// Revision counter of a field group.
    pub fn revision(&self, group: FieldGroup) -> u64 {
        self.revisions.get(&group).copied().unwrap_or(0)
    }

    /// True while a full-state request is outstanding.
    pub fn awaiting_full_state(&self) -> bool {
        self.awaiting_full_state
    }

    /// True when local changes wait for the next flush.
    pub fn has_pending_changes(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drain queued outbound messages.
    pub fn take_outbound(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn push_outbound(&mut self, msg: ClientMessage) {
        self.outbox.push(msg);
    }

    fn bump(&mut self, group: FieldGroup) {
        let rev = self.revisions.entry(group).or_insert(0);
        *rev = rev.saturating_add(1);
    }

    // ─── Inbound ────────────────────────────────────────────────────────

    /// Apply one kernel attribute update.
    ///
    /// Rejected deltas are logged and skipped; structural rejects request a
    /// full state once.
    pub fn apply_inbound(&mut self, update: AttributeUpdate) -> Vec<RenderEffect> {
        if let Err(err) = update.validate(self.max_batch) {
            warn!(key = %update.key, error = %err, "dropping invalid attribute update");
            return Vec::new();
        }
        match update.payload {
            AttributePayload::Full(state) => match self.apply_full_state(*state) {
                Ok(effects) => effects,
                Err(reason) => {
                    warn!(%reason, "rejected full state");
                    Vec::new()
                }
            },
            AttributePayload::Deltas(deltas) => {
                let mut effects = Vec::new();
                for delta in &deltas {
                    let group = delta.group();
                    if group == FieldGroup::Tree && self.awaiting_full_state {
                        debug!(version = delta.version(), "dropping structural delta while awaiting full state");
                        continue;
                    }
                    match self.apply_kernel_delta(delta) {
                        Ok(mut fx) => effects.append(&mut fx),
                        Err(reason) if group == FieldGroup::Tree && reason.is_structural() => {
                            warn!(%reason, "structural delta rejected");
                            self.request_full_state();
                        }
                        Err(reason) => {
                            warn!(key = %update.key, %reason, "delta rejected");
                        }
                    }
                }
                effects
            }
        }
    }

    /// Replace every model from an authoritative full state.
    ///
    /// The state is validated as a whole before anything is replaced.
    pub fn apply_full_state(&mut self, state: FullState) -> Result<Vec<RenderEffect>, RejectReason> {
        let FullState {
            tree_version,
            shapes,
            mut view,
            selection,
        } = state;
        validate_view(&view)?;
        view.options.edge_color = normalize_color(&view.options.edge_color)?;
        let (tree, meshes) = SceneTree::from_shapes(shapes, tree_version)?;
        let selection: Vec<ShapeId> = selection
            .into_iter()
            .filter(|id| {
                let known = tree.contains(id);
                if !known {
                    warn!(shape = %id, "full state selects unknown shape");
                }
                known
            })
            .collect();

        info!(
            tree_version,
            shapes = tree.len(),
            meshes = meshes.len(),
            "applying full state"
        );
        self.scene.replace(tree, meshes);
        self.view.replace(view.clone());
        self.selection.reset();
        self.selection.replace_all(selection.iter().cloned());
        self.kernel_view = view;
        self.kernel_selection = self.selection.snapshot().ids();
        self.kernel_shapes = None;
        self.dirty.clear();
        self.view_gate.reset();
        self.animation_gate.reset();
        self.awaiting_full_state = false;
        for group in FieldGroup::ALL {
            self.bump(group);
        }
        Ok(vec![RenderEffect::Reload])
    }

    fn apply_kernel_delta(&mut self, delta: &Delta) -> Result<Vec<RenderEffect>, RejectReason> {
        let group = delta.group();
        let (changed, effects) = match group {
            FieldGroup::Tree | FieldGroup::Shapes => {
                let effect = self.scene.apply_delta(delta)?;
                if let Some(base) = &mut self.kernel_shapes {
                    if let Err(reason) = base.apply(delta) {
                        debug!(%reason, "kernel baseline diverged from delta");
                    }
                }
                self.scene_effects(effect)
            }
            FieldGroup::View | FieldGroup::Animation => {
                let effect = self.view.apply_delta(delta)?;
                let baseline = match delta {
                    Delta::View { change, .. } => apply_view_change(&mut self.kernel_view, change),
                    Delta::Animation { change, .. } => {
                        apply_animation_change(&mut self.kernel_view, change)
                    }
                    _ => Ok(ViewEffect::Unchanged),
                };
                if let Err(reason) = baseline {
                    debug!(%reason, "kernel baseline diverged from delta");
                }
                view_effects(effect)
            }
            FieldGroup::Selection => {
                let changed = self.selection.apply_delta(delta, self.scene.snapshot())?;
                self.kernel_selection = self.selection.snapshot().ids();
                let effects = if changed {
                    vec![RenderEffect::Highlight]
                } else {
                    Vec::new()
                };
                (changed, effects)
            }
        };
        if changed {
            self.bump(group);
        }
        Ok(effects)
    }

    /// Ask the kernel for a full state unless a request is outstanding.
    pub fn request_full_state(&mut self) {
        if self.awaiting_full_state {
            return;
        }
        let tree_version = self.scene.snapshot().version();
        info!(tree_version, "requesting full state");
        self.awaiting_full_state = true;
        self.outbox
            .push(ClientMessage::NeedsFullState { tree_version });
    }

    fn scene_effects(&mut self, effect: AppliedEffect) -> (bool, Vec<RenderEffect>) {
        match effect {
            AppliedEffect::Unchanged => (false, Vec::new()),
            AppliedEffect::Visibility(id)
            | AppliedEffect::Material(id)
            | AppliedEffect::Reparented(id) => (true, vec![RenderEffect::ShapeState(id)]),
            AppliedEffect::Selectable(_)
            | AppliedEffect::MeshQueued { .. }
            | AppliedEffect::Added { .. } => (true, Vec::new()),
            AppliedEffect::Removed(ids) => {
                let mut effects = vec![RenderEffect::Removed(ids)];
                let scene = self.scene.snapshot();
                self.kernel_selection.retain(|id| scene.contains(id));
                if self.selection.prune(scene) {
                    effects.push(RenderEffect::Highlight);
                }
                (true, effects)
            }
        }
    }

    // ─── Decodes ────────────────────────────────────────────────────────

    /// Hand out up to `budget` pending decode tasks.
    pub fn take_decodes(&mut self, budget: usize) -> Vec<DecodeTask> {
        self.scene.take_decodes(budget)
    }

    /// Install a decode result. Results for removed or superseded payloads
    /// are discarded.
    pub fn complete_decode(
        &mut self,
        task: DecodeTask,
        result: Result<MeshBuffers, MeshCodecError>,
    ) -> Vec<RenderEffect> {
        let payload = task.payload.clone();
        match self.scene.complete_decode(task, result) {
            Ok(DecodeEffect::Installed { shape_id, buffers }) => {
                if let Some(base) = &mut self.kernel_shapes {
                    base.set_mesh(&shape_id, payload);
                }
                self.bump(FieldGroup::Shapes);
                vec![
                    RenderEffect::MeshReady {
                        shape_id: shape_id.clone(),
                        buffers,
                    },
                    RenderEffect::ShapeState(shape_id),
                ]
            }
            Ok(DecodeEffect::Superseded) | Err(_) => Vec::new(),
        }
    }

    // ─── Local gestures ─────────────────────────────────────────────────

    /// Apply a local change now; it is reported on the next flush.
    pub fn apply_local(&mut self, delta: &Delta) -> Result<Vec<RenderEffect>, RejectReason> {
        let group = delta.group();
        let (changed, effects) = match group {
            FieldGroup::Tree | FieldGroup::Shapes => {
                if self.kernel_shapes.is_none() {
                    self.kernel_shapes = Some(self.scene.snapshot().clone());
                }
                let delta = if group == FieldGroup::Tree {
                    delta.clone().with_version(self.scene.snapshot().version())
                } else {
                    delta.clone()
                };
                let effect = self.scene.apply_delta(&delta)?;
                self.scene_effects(effect)
            }
            FieldGroup::View | FieldGroup::Animation => view_effects(self.view.apply_delta(delta)?),
            FieldGroup::Selection => {
                let changed = self.selection.apply_delta(delta, self.scene.snapshot())?;
                let effects = if changed {
                    vec![RenderEffect::Highlight]
                } else {
                    Vec::new()
                };
                (changed, effects)
            }
        };
        if changed {
            self.bump(group);
            self.dirty.insert(group);
        }
        Ok(effects)
    }

    fn selection_changed(&mut self, changed: bool) -> Vec<RenderEffect> {
        if !changed {
            return Vec::new();
        }
        self.bump(FieldGroup::Selection);
        self.dirty.insert(FieldGroup::Selection);
        vec![RenderEffect::Highlight]
    }

    /// Replace the selection with one shape.
    pub fn select_only(&mut self, id: ShapeId) -> Vec<RenderEffect> {
        let changed = self.selection.select_only(id);
        self.selection_changed(changed)
    }

    /// Toggle one shape in the selection.
    pub fn toggle_selected(&mut self, id: ShapeId) -> Vec<RenderEffect> {
        let changed = self.selection.toggle(id);
        self.selection_changed(changed)
    }

    /// Clear the selection.
    pub fn clear_selection(&mut self) -> Vec<RenderEffect> {
        let changed = self.selection.clear();
        self.selection_changed(changed)
    }

    /// Set the transient hover highlight. Never synchronized.
    pub fn set_hovered(&mut self, id: Option<ShapeId>) -> Vec<RenderEffect> {
        if self.selection.set_hovered(id) {
            vec![RenderEffect::Highlight]
        } else {
            Vec::new()
        }
    }

    /// Remember a pick and report it to the kernel.
    pub fn report_pick(&mut self, hit: &PickHit) {
        self.selection.record_pick(hit.clone());
        self.outbox.push(ClientMessage::Pick(PickMessage {
            shape_id: hit.shape_id.clone(),
            sub_kind: hit.sub_kind,
            sub_index: hit.sub_index,
            point: hit.point,
        }));
    }

    // ─── Flush ──────────────────────────────────────────────────────────

    /// Report local changes to the kernel.
    ///
    /// View and animation changes are coalesced to one message per frame
    /// interval; the newest value wins.
    pub fn flush(&mut self, now: Duration) {
        if self.dirty.remove(&FieldGroup::Tree) | self.dirty.remove(&FieldGroup::Shapes) {
            self.flush_shapes();
        }
        if self.dirty.remove(&FieldGroup::Selection) {
            self.flush_selection();
        }
        if self.dirty.contains(&FieldGroup::View) && self.view_gate.ready(now) {
            self.dirty.remove(&FieldGroup::View);
            self.flush_view();
        }
        if self.dirty.contains(&FieldGroup::Animation) && self.animation_gate.ready(now) {
            self.dirty.remove(&FieldGroup::Animation);
            self.flush_animation();
        }
    }

    fn flush_shapes(&mut self) {
        let Some(base) = self.kernel_shapes.take() else {
            return;
        };
        let rev = self.revision(FieldGroup::Shapes);
        let (tree, fields): (Vec<Delta>, Vec<Delta>) = scene::diff(&base, self.scene.snapshot())
            .into_iter()
            .partition(|d| d.group() == FieldGroup::Tree);
        let fields = fields.into_iter().map(|d| d.with_version(rev)).collect();
        self.send_deltas(AttributeKey::Tree, tree);
        self.send_deltas(AttributeKey::States, fields);
    }

    fn flush_selection(&mut self) {
        let ids = self.selection.snapshot().ids();
        if ids == self.kernel_selection {
            debug!("selection equals kernel state; nothing to send");
            return;
        }
        let version = self.revision(FieldGroup::Selection);
        self.kernel_selection.clone_from(&ids);
        self.send_deltas(
            AttributeKey::Selection,
            vec![Delta::Selection { ids, version }],
        );
    }

    fn flush_view(&mut self) {
        let rev = self.revision(FieldGroup::View);
        let local = self.view.snapshot();
        let deltas: Vec<Delta> = view::diff(&self.kernel_view, local)
            .into_iter()
            .filter(|d| d.group() == FieldGroup::View)
            .map(|d| d.with_version(rev))
            .collect();
        if !self.sync_view {
            if !deltas.is_empty() {
                debug!(count = deltas.len(), "view sync disabled; not reporting view changes");
            }
            return;
        }
        let animation = std::mem::take(&mut self.kernel_view.animation);
        self.kernel_view = local.clone();
        self.kernel_view.animation = animation;
        self.send_deltas(AttributeKey::Camera, deltas);
    }

    fn flush_animation(&mut self) {
        let rev = self.revision(FieldGroup::Animation);
        let local = self.view.snapshot();
        let deltas: Vec<Delta> = view::diff(&self.kernel_view, local)
            .into_iter()
            .filter(|d| d.group() == FieldGroup::Animation)
            .map(|d| d.with_version(rev))
            .collect();
        self.kernel_view
            .animation
            .position
            .clone_from(&local.animation.position);
        self.kernel_view.animation.looping = local.animation.looping;
        self.send_deltas(AttributeKey::Animation, deltas);
    }

    fn send_deltas(&mut self, key: AttributeKey, deltas: Vec<Delta>) {
        if deltas.is_empty() {
            debug!(key = %key, "no difference from kernel state; nothing to send");
            return;
        }
        for chunk in deltas.chunks(self.max_batch.max(1)) {
            self.outbox.push(ClientMessage::Attribute(AttributeUpdate::deltas(
                key,
                chunk.to_vec(),
            )));
        }
    }

    /// Drop all models and pending work.
    pub fn reset(&mut self) {
        self.scene = SceneModel::new();
        self.view = ViewModel::new();
        self.selection.reset();
        self.kernel_shapes = None;
        self.kernel_view = ViewState::default();
        self.kernel_selection.clear();
        self.dirty.clear();
        self.outbox.clear();
        self.awaiting_full_state = false;
    }
}

fn view_effects(effect: ViewEffect) -> (bool, Vec<RenderEffect>) {
    let effects = match effect {
        ViewEffect::Unchanged => return (false, Vec::new()),
        ViewEffect::Camera => vec![RenderEffect::Camera],
        ViewEffect::ClipPlanes => vec![RenderEffect::ClipPlanes],
        ViewEffect::Options => vec![RenderEffect::Options],
        ViewEffect::Controls | ViewEffect::Animation => Vec::new(),
    };
    (true, effects)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use cad_scene_port::{Shape, ShapeKind};
    use cad_sync_proto::{ShapeChange, TreeOp, ViewChange};

    fn reconciler() -> Reconciler {
        let mut r = Reconciler::new(&ViewerConfig {
            sync_view: true,
            ..ViewerConfig::default()
        });
        let state = FullState {
            tree_version: 4,
            shapes: vec![
                Shape::new("A", ShapeKind::Group),
                Shape::new("B", ShapeKind::Solid).with_parent("A"),
            ],
            view: ViewState::default(),
            selection: vec![],
        };
        r.apply_inbound(AttributeUpdate::full(state));
        r
    }

    #[test]
    fn kernel_delta_is_not_echoed() {
        let mut r = reconciler();
        let effects = r.apply_inbound(AttributeUpdate::deltas(
            AttributeKey::States,
            vec![Delta::shape("B", ShapeChange::Visible(false), 0)],
        ));
        assert_eq!(effects, vec![RenderEffect::ShapeState(ShapeId::new("B"))]);
        r.flush(Duration::from_secs(1));
        assert!(r.take_outbound().is_empty());
        assert_eq!(r.scene().version(), 4);
    }

    #[test]
    fn local_change_is_reported_once() {
        let mut r = reconciler();
        r.apply_local(&Delta::shape("B", ShapeChange::Visible(false), 0))
            .unwrap();
        assert!(r.take_outbound().is_empty(), "nothing before the flush");
        r.flush(Duration::ZERO);
        let out = r.take_outbound();
        assert_eq!(out.len(), 1);
        r.flush(Duration::from_secs(1));
        assert!(r.take_outbound().is_empty());
    }

    #[test]
    fn local_change_reverted_before_flush_sends_nothing() {
        let mut r = reconciler();
        r.apply_local(&Delta::shape("B", ShapeChange::Visible(false), 0))
            .unwrap();
        r.apply_local(&Delta::shape("B", ShapeChange::Visible(true), 0))
            .unwrap();
        r.flush(Duration::ZERO);
        assert!(r.take_outbound().is_empty());
    }

    #[test]
    fn kernel_overrides_pending_local_change() {
        let mut r = reconciler();
        r.apply_local(&Delta::view(ViewChange::Zoom(2.0), 0)).unwrap();
        r.apply_inbound(AttributeUpdate::deltas(
            AttributeKey::Camera,
            vec![Delta::view(ViewChange::Zoom(2.0), 0)],
        ));
        r.flush(Duration::ZERO);
        assert!(r.take_outbound().is_empty());
    }

    #[test]
    fn stale_structural_delta_requests_resync_once() {
        let mut r = reconciler();
        let stale = |id: &str| {
            Delta::tree(
                TreeOp::Remove {
                    shape_id: ShapeId::new(id),
                },
                1,
            )
        };
        r.apply_inbound(AttributeUpdate::deltas(
            AttributeKey::Tree,
            vec![stale("B"), stale("A")],
        ));
        let out = r.take_outbound();
        assert_eq!(out, vec![ClientMessage::NeedsFullState { tree_version: 4 }]);
        assert!(r.awaiting_full_state());
    }

    #[test]
    fn view_changes_are_coalesced_per_frame() {
        let mut r = reconciler();
        r.apply_local(&Delta::view(ViewChange::Zoom(2.0), 0)).unwrap();
        r.flush(Duration::from_millis(100));
        assert_eq!(r.take_outbound().len(), 1);

        r.apply_local(&Delta::view(ViewChange::Zoom(3.0), 0)).unwrap();
        r.flush(Duration::from_millis(105));
        r.apply_local(&Delta::view(ViewChange::Zoom(4.0), 0)).unwrap();
        r.flush(Duration::from_millis(110));
        assert!(r.take_outbound().is_empty());

        r.flush(Duration::from_millis(120));
        let out = r.take_outbound();
        assert_eq!(
            out,
            vec![ClientMessage::Attribute(AttributeUpdate::deltas(
                AttributeKey::Camera,
                vec![Delta::view(ViewChange::Zoom(4.0), r.revision(FieldGroup::View))],
            ))]
        );
    }

    #[test]
    fn batched_structural_edits_apply_in_order_on_kernel() {
        let mut r = reconciler();
        for id in ["X", "Y", "Z"] {
            let shape = Shape::new(id, ShapeKind::Group).with_parent("A");
            r.apply_local(&Delta::tree(TreeOp::Add { shape }, 0)).unwrap();
        }
        r.flush(Duration::ZERO);

        let tree: Vec<Delta> = r
            .take_outbound()
            .into_iter()
            .flat_map(|m| match m {
                ClientMessage::Attribute(AttributeUpdate {
                    key: AttributeKey::Tree,
                    payload: AttributePayload::Deltas(d),
                }) => d,
                _ => Vec::new(),
            })
            .collect();
        assert_eq!(tree.iter().map(Delta::version).collect::<Vec<_>>(), vec![4, 5, 6]);

        let (mut kernel, _) = SceneTree::from_shapes(
            vec![
                Shape::new("A", ShapeKind::Group),
                Shape::new("B", ShapeKind::Solid).with_parent("A"),
            ],
            4,
        )
        .unwrap();
        for d in &tree {
            assert!(kernel.apply(d).is_ok(), "{d:?} rejected at {}", kernel.version());
        }
        assert_eq!(kernel.breadth_first(), r.scene().breadth_first());
    }

    #[test]
    fn unsynced_view_keeps_kernel_baseline() {
        let mut r = Reconciler::new(&ViewerConfig::default());
        r.apply_inbound(AttributeUpdate::full(FullState {
            tree_version: 1,
            shapes: vec![],
            view: ViewState::default(),
            selection: vec![],
        }));
        r.apply_local(&Delta::view(ViewChange::Zoom(2.0), 0)).unwrap();
        r.flush(Duration::ZERO);
        assert!(r.take_outbound().is_empty());
        assert_eq!(r.kernel_view.camera, ViewState::default().camera);
    }
}
