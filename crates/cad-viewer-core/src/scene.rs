// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scene model: the shape forest and its structural version.
//!
//! The forest is an arena (`BTreeMap<ShapeId, Shape>`) plus an ordered root
//! list; each shape holds its ordered child ids and a parent pointer. Every
//! mutation validates first and mutates second, so a rejected delta leaves
//! the tree untouched.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use cad_scene_codec::MeshCodecError;
use cad_scene_port::{MeshBuffers, MeshPayload, Shape, ShapeId};
use cad_sync_proto::{Delta, ShapeChange, TreeOp};
use tracing::{debug, warn};

use crate::decode::{DecodeQueue, DecodeTask};
use crate::error::RejectReason;

/// What an accepted scene delta changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedEffect {
    /// The value was already current; the renderer needs no call.
    Unchanged,
    /// Face or edge visibility of a shape changed (affects its subtree).
    Visibility(ShapeId),
    /// Material of a shape changed.
    Material(ShapeId),
    /// Pickability of a shape changed.
    Selectable(ShapeId),
    /// A new payload is waiting for decode.
    MeshQueued {
        /// Shape the payload belongs to.
        shape_id: ShapeId,
        /// Decode ticket.
        ticket: u64,
    },
    /// A shape was inserted.
    Added {
        /// New shape.
        shape_id: ShapeId,
        /// Decode ticket when the shape arrived with a payload.
        ticket: Option<u64>,
    },
    /// Shapes removed, parent before children.
    Removed(Vec<ShapeId>),
    /// A shape moved under a new parent.
    Reparented(ShapeId),
}

/// Outcome of completing a decode task.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeEffect {
    /// The payload became the shape's last-good mesh.
    Installed {
        /// Shape that received the mesh.
        shape_id: ShapeId,
        /// Upload-ready buffers.
        buffers: MeshBuffers,
    },
    /// A newer payload for the same shape is pending; this result was dropped.
    Superseded,
}

/// Ordered forest of shapes with a structural version counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneTree {
    shapes: BTreeMap<ShapeId, Shape>,
    roots: Vec<ShapeId>,
    version: u64,
}

impl SceneTree {
    /// An empty forest at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a forest from a flat shape list with parent pointers.
    ///
    /// Child lists are rebuilt in list order. Mesh payloads are split off
    /// and returned separately; they only enter the tree once decoded.
    pub fn from_shapes(
        shapes: Vec<Shape>,
        version: u64,
    ) -> Result<(Self, Vec<(ShapeId, MeshPayload)>), RejectReason> {
        let mut tree = SceneTree {
            version,
            ..SceneTree::default()
        };
        let mut order = Vec::with_capacity(shapes.len());
        let mut meshes = Vec::new();
        for mut shape in shapes {
            if tree.shapes.contains_key(&shape.id) {
                return Err(RejectReason::DuplicateShape(shape.id));
            }
            check_mesh_kind(&shape, shape.mesh.as_ref())?;
            if let Some(mesh) = shape.mesh.take() {
                meshes.push((shape.id.clone(), mesh));
            }
            shape.children.clear();
            order.push((shape.id.clone(), shape.parent.clone()));
            tree.shapes.insert(shape.id.clone(), shape);
        }
        for (id, parent) in order {
            match parent {
                None => tree.roots.push(id),
                Some(parent) => match tree.shapes.get_mut(&parent) {
                    Some(p) => p.children.push(id),
                    None => return Err(RejectReason::UnknownParent(parent)),
                },
            }
        }
        if let Err(id) = tree.find_cycle() {
            return Err(RejectReason::CycleDetected(id));
        }
        Ok((tree, meshes))
    }

    /// Structural version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of shapes.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// True when the forest has no shapes.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Look up a shape.
    pub fn get(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.get(id)
    }

    /// True when the shape exists.
    pub fn contains(&self, id: &ShapeId) -> bool {
        self.shapes.contains_key(id)
    }

    /// Root ids in order.
    pub fn roots(&self) -> &[ShapeId] {
        &self.roots
    }

    /// Shapes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }

    /// `id` and all its descendants, parent before children.
    pub fn subtree(&self, id: &ShapeId) -> Vec<ShapeId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(next) = queue.pop_front() {
            if let Some(shape) = self.shapes.get(&next) {
                queue.extend(shape.children.iter().cloned());
                out.push(next);
            }
        }
        out
    }

    /// Every shape, parents before children, roots in order.
    pub fn breadth_first(&self) -> Vec<ShapeId> {
        let mut out = Vec::with_capacity(self.shapes.len());
        for root in &self.roots {
            out.extend(self.subtree(root));
        }
        out
    }

    /// True when `ancestor` is `id` or lies on its parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: &ShapeId, id: &ShapeId) -> bool {
        let mut cursor = Some(id);
        let mut steps = 0;
        while let Some(cur) = cursor {
            if cur == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.shapes.len() {
                return false;
            }
            cursor = self.shapes.get(cur).and_then(|s| s.parent.as_ref());
        }
        false
    }

    /// Faces visible: the shape and all its ancestors are visible.
    pub fn effective_visible(&self, id: &ShapeId) -> bool {
        let mut cursor = self.shapes.get(id);
        let mut steps = 0;
        while let Some(shape) = cursor {
            if !shape.visible {
                return false;
            }
            steps += 1;
            if steps > self.shapes.len() {
                return false;
            }
            cursor = shape.parent.as_ref().and_then(|p| self.shapes.get(p));
        }
        true
    }

    /// Verify the forest invariant: child lists and parent pointers agree,
    /// every non-root has an existing parent, and there are no cycles.
    pub fn check_forest(&self) -> Result<(), String> {
        for shape in self.shapes.values() {
            match &shape.parent {
                None => {
                    if !self.roots.contains(&shape.id) {
                        return Err(format!("{} has no parent but is not a root", shape.id));
                    }
                }
                Some(p) => {
                    let parent = self
                        .shapes
                        .get(p)
                        .ok_or_else(|| format!("{} has missing parent {p}", shape.id))?;
                    if !parent.children.contains(&shape.id) {
                        return Err(format!("{p} does not list child {}", shape.id));
                    }
                }
            }
            for child in &shape.children {
                let c = self
                    .shapes
                    .get(child)
                    .ok_or_else(|| format!("{} lists missing child {child}", shape.id))?;
                if c.parent.as_ref() != Some(&shape.id) {
                    return Err(format!("{child} does not point back to {}", shape.id));
                }
            }
        }
        self.find_cycle()
            .map_err(|id| format!("cycle through {id}"))
    }

    fn find_cycle(&self) -> Result<(), ShapeId> {
        let reachable = self.breadth_first();
        if reachable.len() == self.shapes.len() {
            return Ok(());
        }
        let seen: BTreeSet<&ShapeId> = reachable.iter().collect();
        match self.shapes.keys().find(|id| !seen.contains(id)) {
            Some(id) => Err(id.clone()),
            None => Ok(()),
        }
    }

    /// Apply a shape or tree delta without scheduling decodes.
    ///
    /// Mesh payloads are validated but not installed; tickets in the
    /// returned effect are 0.
    pub fn apply(&mut self, delta: &Delta) -> Result<AppliedEffect, RejectReason> {
        self.apply_with(delta, |_, _| 0)
    }

    /// Apply a shape or tree delta, handing new payloads to `queue_mesh`.
    pub fn apply_with(
        &mut self,
        delta: &Delta,
        queue_mesh: impl FnMut(&ShapeId, &MeshPayload) -> u64,
    ) -> Result<AppliedEffect, RejectReason> {
        match delta {
            Delta::Shapes {
                shape_id, change, ..
            } => self.apply_change(shape_id, change, queue_mesh),
            Delta::Tree { op, version } => self.apply_op(op, *version, queue_mesh),
            other => Err(RejectReason::malformed(format!(
                "{:?} delta is not a scene delta",
                other.group()
            ))),
        }
    }

    fn apply_change(
        &mut self,
        id: &ShapeId,
        change: &ShapeChange,
        mut queue_mesh: impl FnMut(&ShapeId, &MeshPayload) -> u64,
    ) -> Result<AppliedEffect, RejectReason> {
        let shape = self
            .shapes
            .get_mut(id)
            .ok_or_else(|| RejectReason::UnknownShape(id.clone()))?;
        let effect = match change {
            ShapeChange::Visible(v) => {
                if shape.visible == *v {
                    return Ok(AppliedEffect::Unchanged);
                }
                shape.visible = *v;
                AppliedEffect::Visibility(id.clone())
            }
            ShapeChange::EdgesVisible(v) => {
                if shape.edges_visible == *v {
                    return Ok(AppliedEffect::Unchanged);
                }
                shape.edges_visible = *v;
                AppliedEffect::Visibility(id.clone())
            }
            ShapeChange::Selectable(v) => {
                if shape.selectable == *v {
                    return Ok(AppliedEffect::Unchanged);
                }
                shape.selectable = *v;
                AppliedEffect::Selectable(id.clone())
            }
            ShapeChange::Material(m) => {
                if !m.is_valid() {
                    return Err(RejectReason::malformed(format!("material for {id}")));
                }
                if shape.material == *m {
                    return Ok(AppliedEffect::Unchanged);
                }
                shape.material = *m;
                AppliedEffect::Material(id.clone())
            }
            ShapeChange::Mesh(payload) => {
                check_mesh_kind(shape, Some(payload))?;
                if shape.mesh.as_ref() == Some(payload) {
                    return Ok(AppliedEffect::Unchanged);
                }
                AppliedEffect::MeshQueued {
                    shape_id: id.clone(),
                    ticket: queue_mesh(id, payload),
                }
            }
        };
        Ok(effect)
    }

    fn apply_op(
        &mut self,
        op: &TreeOp,
        declared: u64,
        mut queue_mesh: impl FnMut(&ShapeId, &MeshPayload) -> u64,
    ) -> Result<AppliedEffect, RejectReason> {
        let current = self.version;
        if declared.saturating_add(1) < current {
            return Err(RejectReason::StaleVersion { declared, current });
        }
        let effect = match op {
            TreeOp::Add { shape } => {
                if self.shapes.contains_key(&shape.id) {
                    return Err(RejectReason::DuplicateShape(shape.id.clone()));
                }
                if let Some(parent) = &shape.parent {
                    if !self.shapes.contains_key(parent) {
                        return Err(RejectReason::UnknownParent(parent.clone()));
                    }
                }
                check_mesh_kind(shape, shape.mesh.as_ref())?;

                let mut shape = shape.clone();
                shape.children.clear();
                let mesh = shape.mesh.take();
                let id = shape.id.clone();
                self.attach(&id, shape.parent.as_ref());
                self.shapes.insert(id.clone(), shape);
                let ticket = mesh.map(|m| queue_mesh(&id, &m));
                AppliedEffect::Added {
                    shape_id: id,
                    ticket,
                }
            }
            TreeOp::Remove { shape_id } => {
                let parent = self
                    .shapes
                    .get(shape_id)
                    .ok_or_else(|| RejectReason::UnknownShape(shape_id.clone()))?
                    .parent
                    .clone();
                let removed = self.subtree(shape_id);
                self.detach(shape_id, parent.as_ref());
                for id in &removed {
                    self.shapes.remove(id);
                }
                AppliedEffect::Removed(removed)
            }
            TreeOp::Reparent {
                shape_id,
                parent_id,
            } => {
                let old_parent = self
                    .shapes
                    .get(shape_id)
                    .ok_or_else(|| RejectReason::UnknownShape(shape_id.clone()))?
                    .parent
                    .clone();
                if let Some(p) = parent_id {
                    if !self.shapes.contains_key(p) {
                        return Err(RejectReason::UnknownParent(p.clone()));
                    }
                    if self.is_ancestor_or_self(shape_id, p) {
                        return Err(RejectReason::CycleDetected(shape_id.clone()));
                    }
                }
                self.detach(shape_id, old_parent.as_ref());
                self.attach(shape_id, parent_id.as_ref());
                if let Some(shape) = self.shapes.get_mut(shape_id) {
                    shape.parent.clone_from(parent_id);
                }
                AppliedEffect::Reparented(shape_id.clone())
            }
        };
        self.version = current.max(declared).saturating_add(1);
        Ok(effect)
    }

    fn attach(&mut self, id: &ShapeId, parent: Option<&ShapeId>) {
        match parent.and_then(|p| self.shapes.get_mut(p)) {
            Some(p) => p.children.push(id.clone()),
            None => self.roots.push(id.clone()),
        }
    }

    fn detach(&mut self, id: &ShapeId, parent: Option<&ShapeId>) {
        match parent.and_then(|p| self.shapes.get_mut(p)) {
            Some(p) => p.children.retain(|c| c != id),
            None => self.roots.retain(|c| c != id),
        }
    }

    pub(crate) fn set_mesh(&mut self, id: &ShapeId, payload: MeshPayload) -> bool {
        match self.shapes.get_mut(id) {
            Some(shape) => {
                shape.mesh = Some(payload);
                true
            }
            None => false,
        }
    }
}

fn check_mesh_kind(shape: &Shape, mesh: Option<&MeshPayload>) -> Result<(), RejectReason> {
    match (mesh, shape.kind.mesh_format()) {
        (None, _) => Ok(()),
        (Some(m), Some(expected)) if m.format == expected => Ok(()),
        (Some(m), _) => Err(RejectReason::malformed(format!(
            "{:?} mesh on {:?} shape {}",
            m.format, shape.kind, shape.id
        ))),
    }
}

/// Deltas that turn `prev` into `next`.
///
/// Order: adds (parents first), reparents, field changes, removes. The i-th
/// tree delta is tagged with `prev`'s version plus i, so applying them in
/// order on top of `prev` never trips the stale check. Field deltas are
/// tagged with 0; callers retag them with their revision counters.
pub fn diff(prev: &SceneTree, next: &SceneTree) -> Vec<Delta> {
    let mut out = Vec::new();
    let mut fields = Vec::new();
    let mut version = prev.version;
    let mut stamp = || {
        let v = version;
        version += 1;
        v
    };

    for id in next.breadth_first() {
        let Some(shape) = next.get(&id) else {
            continue;
        };
        match prev.get(&id) {
            None => {
                let mut added = shape.clone();
                added.children.clear();
                out.push(Delta::tree(TreeOp::Add { shape: added }, stamp()));
            }
            Some(old) => {
                if old.parent != shape.parent {
                    out.push(Delta::tree(
                        TreeOp::Reparent {
                            shape_id: id.clone(),
                            parent_id: shape.parent.clone(),
                        },
                        stamp(),
                    ));
                }
                field_changes(old, shape, &mut fields);
            }
        }
    }
    out.append(&mut fields);

    for id in prev.breadth_first() {
        if next.contains(&id) {
            continue;
        }
        let parent_gone = prev
            .get(&id)
            .and_then(|s| s.parent.as_ref())
            .is_some_and(|p| !next.contains(p));
        if !parent_gone {
            out.push(Delta::tree(TreeOp::Remove { shape_id: id }, stamp()));
        }
    }
    out
}

fn field_changes(old: &Shape, new: &Shape, out: &mut Vec<Delta>) {
    let id = &new.id;
    if old.visible != new.visible {
        out.push(Delta::shape(id.clone(), ShapeChange::Visible(new.visible), 0));
    }
    if old.edges_visible != new.edges_visible {
        out.push(Delta::shape(
            id.clone(),
            ShapeChange::EdgesVisible(new.edges_visible),
            0,
        ));
    }
    if old.selectable != new.selectable {
        out.push(Delta::shape(
            id.clone(),
            ShapeChange::Selectable(new.selectable),
            0,
        ));
    }
    if old.material != new.material {
        out.push(Delta::shape(id.clone(), ShapeChange::Material(new.material), 0));
    }
    if old.mesh != new.mesh {
        if let Some(mesh) = &new.mesh {
            out.push(Delta::shape(id.clone(), ShapeChange::Mesh(mesh.clone()), 0));
        }
    }
}

/// Owner of the live [`SceneTree`] and its pending mesh decodes.
#[derive(Debug, Default)]
pub struct SceneModel {
    tree: SceneTree,
    decodes: DecodeQueue,
}

impl SceneModel {
    /// Empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current forest.
    pub fn snapshot(&self) -> &SceneTree {
        &self.tree
    }

    /// Pending decode tasks.
    pub fn decodes(&self) -> &DecodeQueue {
        &self.decodes
    }

    /// Apply a shape or tree delta. All-or-nothing.
    pub fn apply_delta(&mut self, delta: &Delta) -> Result<AppliedEffect, RejectReason> {
        let decodes = &mut self.decodes;
        let effect = self
            .tree
            .apply_with(delta, |id, payload| decodes.enqueue(id, payload.clone()))?;
        if let AppliedEffect::Removed(ids) = &effect {
            for id in ids {
                self.decodes.forget(id);
            }
        }
        Ok(effect)
    }

    /// Replace the whole forest; queues a decode for every payload.
    pub fn replace(&mut self, tree: SceneTree, meshes: Vec<(ShapeId, MeshPayload)>) {
        self.tree = tree;
        self.decodes.clear();
        for (id, payload) in meshes {
            self.decodes.enqueue(&id, payload);
        }
    }

    /// Hand out up to `budget` decode tasks.
    pub fn take_decodes(&mut self, budget: usize) -> Vec<DecodeTask> {
        self.decodes.take(budget)
    }

    /// Install the result of a decode task.
    ///
    /// Results for shapes that no longer exist are rejected `UnknownShape`;
    /// a failed decode keeps the last-good mesh.
    pub fn complete_decode(
        &mut self,
        task: DecodeTask,
        result: Result<MeshBuffers, MeshCodecError>,
    ) -> Result<DecodeEffect, RejectReason> {
        if !self.tree.contains(&task.shape_id) {
            debug!(shape = %task.shape_id, ticket = task.ticket, "discarding decode for removed shape");
            return Err(RejectReason::UnknownShape(task.shape_id));
        }
        if !self.decodes.settle(&task) {
            debug!(shape = %task.shape_id, ticket = task.ticket, "discarding superseded decode");
            return Ok(DecodeEffect::Superseded);
        }
        match result {
            Ok(buffers) => {
                self.tree.set_mesh(&task.shape_id, task.payload);
                Ok(DecodeEffect::Installed {
                    shape_id: task.shape_id,
                    buffers,
                })
            }
            Err(err) => {
                warn!(shape = %task.shape_id, error = %err, "mesh decode failed; keeping last-good mesh");
                Err(RejectReason::malformed(err.to_string()))
            }
        }
    }
}
