// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Selection state: highlighted shapes, last pick and the transient hover.

use std::collections::BTreeSet;

use cad_scene_port::{HighlightState, PickHit, ShapeId};
use cad_sync_proto::Delta;

use crate::error::RejectReason;
use crate::scene::SceneTree;

/// Highlighted ids plus the last pick. Hover is local only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionState {
    ids: BTreeSet<ShapeId>,
    last_pick: Option<PickHit>,
    hovered: Option<ShapeId>,
}

impl SelectionState {
    /// Highlighted ids in id order.
    pub fn ids(&self) -> Vec<ShapeId> {
        self.ids.iter().cloned().collect()
    }

    /// True when `id` is highlighted.
    pub fn contains(&self, id: &ShapeId) -> bool {
        self.ids.contains(id)
    }

    /// True when nothing is highlighted.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Most recent pick, if any.
    pub fn last_pick(&self) -> Option<&PickHit> {
        self.last_pick.as_ref()
    }

    /// Hovered shape, if any.
    pub fn hovered(&self) -> Option<&ShapeId> {
        self.hovered.as_ref()
    }

    /// Renderer highlight for this selection.
    pub fn highlight(&self) -> HighlightState {
        HighlightState {
            selected: self.ids(),
            hovered: self.hovered.clone(),
        }
    }
}

/// Owner of the live [`SelectionState`].
#[derive(Debug, Default)]
pub struct SelectionModel {
    state: SelectionState,
}

impl SelectionModel {
    /// Empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current selection.
    pub fn snapshot(&self) -> &SelectionState {
        &self.state
    }

    /// Apply a selection delta; every id must exist in `scene`.
    pub fn apply_delta(&mut self, delta: &Delta, scene: &SceneTree) -> Result<bool, RejectReason> {
        let Delta::Selection { ids, .. } = delta else {
            return Err(RejectReason::malformed(format!(
                "{:?} delta is not a selection delta",
                delta.group()
            )));
        };
        if let Some(missing) = ids.iter().find(|id| !scene.contains(id)) {
            return Err(RejectReason::UnknownShape(missing.clone()));
        }
        Ok(self.replace_all(ids.iter().cloned()))
    }

    /// Replace the whole set. Returns true when it changed.
    pub fn replace_all(&mut self, ids: impl IntoIterator<Item = ShapeId>) -> bool {
        let next: BTreeSet<ShapeId> = ids.into_iter().collect();
        if next == self.state.ids {
            return false;
        }
        self.state.ids = next;
        true
    }

    /// Select exactly one shape.
    pub fn select_only(&mut self, id: ShapeId) -> bool {
        self.replace_all([id])
    }

    /// Add or remove one shape.
    pub fn toggle(&mut self, id: ShapeId) -> bool {
        if !self.state.ids.remove(&id) {
            self.state.ids.insert(id);
        }
        true
    }

    /// Clear the selection and the last pick.
    pub fn clear(&mut self) -> bool {
        self.state.last_pick = None;
        self.replace_all(std::iter::empty())
    }

    /// Remember the last pick.
    pub fn record_pick(&mut self, hit: PickHit) {
        self.state.last_pick = Some(hit);
    }

    /// Set the hovered shape. Returns true when it changed.
    pub fn set_hovered(&mut self, id: Option<ShapeId>) -> bool {
        if self.state.hovered == id {
            return false;
        }
        self.state.hovered = id;
        true
    }

    /// Drop ids that no longer exist. Returns true when anything was dropped.
    pub fn prune(&mut self, scene: &SceneTree) -> bool {
        let before = self.state.ids.len();
        self.state.ids.retain(|id| scene.contains(id));
        if self
            .state
            .hovered
            .as_ref()
            .is_some_and(|h| !scene.contains(h))
        {
            self.state.hovered = None;
        }
        if self
            .state
            .last_pick
            .as_ref()
            .is_some_and(|p| !scene.contains(&p.shape_id))
        {
            self.state.last_pick = None;
        }
        before != self.state.ids.len()
    }

    /// Reset to empty.
    pub fn reset(&mut self) {
        self.state = SelectionState::default();
    }
}
