// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Renderer binding: turns [`RenderEffect`]s into the minimal set of
//! [`RenderPort`] calls.
//!
//! The binding caches what it last told the renderer and skips calls whose
//! value is unchanged. Geometry is uploaded only for decoded payloads and
//! re-uploaded wholesale only after a full-state reload. The first renderer
//! error moves the binding to [`BindingStatus::Unavailable`]; every later
//! call is a no-op.

use std::collections::{BTreeMap, BTreeSet};

use cad_scene_port::{
    CameraState, ClipPlane, HighlightState, Material, PickHit, RenderError, RenderOptions,
    RenderPort, ShapeId,
};
use cad_sync_proto::ViewState;
use tracing::{debug, error};

use crate::reconciler::RenderEffect;
use crate::scene::SceneTree;
use crate::selection::SelectionState;

/// Health of the rendering capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingStatus {
    /// Calls go through.
    Ready,
    /// The renderer failed; nothing is drawn any more.
    Unavailable(String),
    /// Resources were released.
    Disposed,
}

/// Stateful adapter over a [`RenderPort`].
#[derive(Debug)]
pub struct RendererBinding<R> {
    renderer: R,
    status: BindingStatus,
    failure: Option<String>,
    uploaded: BTreeSet<ShapeId>,
    visibility: BTreeMap<ShapeId, (bool, bool)>,
    materials: BTreeMap<ShapeId, Material>,
    camera: Option<CameraState>,
    clip: Option<(Vec<ClipPlane>, bool)>,
    options: Option<RenderOptions>,
    highlight: Option<HighlightState>,
}

impl<R: RenderPort> RendererBinding<R> {
    /// Bind a renderer.
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            status: BindingStatus::Ready,
            failure: None,
            uploaded: BTreeSet::new(),
            visibility: BTreeMap::new(),
            materials: BTreeMap::new(),
            camera: None,
            clip: None,
            options: None,
            highlight: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> &BindingStatus {
        &self.status
    }

    /// True while calls go through.
    pub fn is_ready(&self) -> bool {
        self.status == BindingStatus::Ready
    }

    /// Borrow the renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Mutably borrow the renderer.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Failure reason not yet reported to the kernel, if any.
    pub fn take_failure(&mut self) -> Option<String> {
        self.failure.take()
    }

    /// Shapes with uploaded geometry.
    pub fn uploaded(&self) -> &BTreeSet<ShapeId> {
        &self.uploaded
    }

    fn fail(&mut self, err: &RenderError) {
        let reason = err.to_string();
        error!(%reason, "renderer unavailable");
        self.status = BindingStatus::Unavailable(reason.clone());
        self.failure = Some(reason);
    }

    fn guard<T>(&mut self, result: Result<T, RenderError>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(err) => {
                self.fail(&err);
                None
            }
        }
    }

    /// Apply effects in order against the current models.
    pub fn apply(
        &mut self,
        effects: &[RenderEffect],
        scene: &SceneTree,
        view: &ViewState,
        selection: &SelectionState,
    ) {
        for effect in effects {
            if !self.is_ready() {
                return;
            }
            match effect {
                RenderEffect::Reload => self.reload(view, selection),
                RenderEffect::MeshReady { shape_id, buffers } => {
                    if !scene.contains(shape_id) {
                        debug!(shape = %shape_id, "skipping upload for removed shape");
                        continue;
                    }
                    let r = self.renderer.upload_mesh(shape_id, buffers);
                    if self.guard(r).is_some() {
                        self.uploaded.insert(shape_id.clone());
                        self.visibility.remove(shape_id);
                        self.materials.remove(shape_id);
                    }
                }
                RenderEffect::Removed(ids) => {
                    for id in ids {
                        if self.uploaded.remove(id) {
                            self.visibility.remove(id);
                            self.materials.remove(id);
                            let r = self.renderer.remove_mesh(id);
                            if self.guard(r).is_none() {
                                return;
                            }
                        }
                    }
                }
                RenderEffect::ShapeState(id) => {
                    for sid in scene.subtree(id) {
                        self.sync_shape(scene, &sid);
                    }
                }
                RenderEffect::Camera => self.sync_camera(&view.camera),
                RenderEffect::ClipPlanes => {
                    self.sync_clip(&view.clip_planes, view.clip_intersection);
                }
                RenderEffect::Options => self.sync_options(&view.options),
                RenderEffect::Highlight => self.sync_highlight(&selection.highlight()),
            }
        }
    }

    fn reload(&mut self, view: &ViewState, selection: &SelectionState) {
        let r = self.renderer.clear();
        if self.guard(r).is_none() {
            return;
        }
        self.uploaded.clear();
        self.visibility.clear();
        self.materials.clear();
        self.camera = None;
        self.clip = None;
        self.options = None;
        self.highlight = None;
        self.sync_camera(&view.camera);
        self.sync_clip(&view.clip_planes, view.clip_intersection);
        self.sync_options(&view.options);
        self.sync_highlight(&selection.highlight());
    }

    fn sync_shape(&mut self, scene: &SceneTree, id: &ShapeId) {
        if !self.is_ready() || !self.uploaded.contains(id) {
            return;
        }
        let Some(shape) = scene.get(id) else {
            return;
        };
        let shown = scene.effective_visible(id);
        let vis = (shown, shown && shape.edges_visible);
        if self.visibility.get(id) != Some(&vis) {
            let r = self.renderer.set_visibility(id, vis.0, vis.1);
            if self.guard(r).is_none() {
                return;
            }
            self.visibility.insert(id.clone(), vis);
        }
        if self.materials.get(id) != Some(&shape.material) {
            let r = self.renderer.set_material(id, &shape.material);
            if self.guard(r).is_some() {
                self.materials.insert(id.clone(), shape.material);
            }
        }
    }

    fn sync_camera(&mut self, camera: &CameraState) {
        if !self.is_ready() || self.camera.as_ref() == Some(camera) {
            return;
        }
        let r = self.renderer.set_camera(camera);
        if self.guard(r).is_some() {
            self.camera = Some(*camera);
        }
    }

    fn sync_clip(&mut self, planes: &[ClipPlane], intersection: bool) {
        if !self.is_ready()
            || self
                .clip
                .as_ref()
                .is_some_and(|(p, i)| p.as_slice() == planes && *i == intersection)
        {
            return;
        }
        let r = self.renderer.set_clip_planes(planes, intersection);
        if self.guard(r).is_some() {
            self.clip = Some((planes.to_vec(), intersection));
        }
    }

    fn sync_options(&mut self, options: &RenderOptions) {
        if !self.is_ready() || self.options.as_ref() == Some(options) {
            return;
        }
        let r = self.renderer.set_render_options(options);
        if self.guard(r).is_some() {
            self.options = Some(options.clone());
        }
    }

    fn sync_highlight(&mut self, highlight: &HighlightState) {
        if !self.is_ready() || self.highlight.as_ref() == Some(highlight) {
            return;
        }
        let r = self.renderer.set_highlight(highlight);
        if self.guard(r).is_some() {
            self.highlight = Some(highlight.clone());
        }
    }

    /// Pick at normalized coordinates. `None` when nothing was hit or the
    /// renderer is gone.
    pub fn pick(&mut self, x: f32, y: f32) -> Option<PickHit> {
        if !self.is_ready() {
            return None;
        }
        let r = self.renderer.pick(x, y);
        self.guard(r).flatten()
    }

    /// Resize the viewport.
    pub fn resize(&mut self, width: u32, height: u32, dpr: f32) {
        if self.is_ready() {
            self.renderer.resize(width, height, dpr);
        }
    }

    /// Draw a frame.
    pub fn render(&mut self) {
        if self.is_ready() {
            self.renderer.render();
        }
    }

    /// Capture the current frame.
    pub fn export_image(&mut self) -> Option<Vec<u8>> {
        if !self.is_ready() {
            return None;
        }
        let r = self.renderer.export_image();
        self.guard(r)
    }

    /// Release every renderer resource. Idempotent.
    pub fn dispose(&mut self) {
        if self.status == BindingStatus::Disposed {
            return;
        }
        self.renderer.dispose();
        self.status = BindingStatus::Disposed;
        self.uploaded.clear();
        self.visibility.clear();
        self.materials.clear();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use cad_scene_codec::{MockRenderer, RenderCall};
    use cad_scene_port::{MeshBuffers, MeshFormat, Shape, ShapeKind};

    fn scene() -> SceneTree {
        SceneTree::from_shapes(
            vec![
                Shape::new("A", ShapeKind::Group),
                Shape::new("B", ShapeKind::Solid).with_parent("A"),
            ],
            1,
        )
        .unwrap()
        .0
    }

    fn mesh() -> MeshBuffers {
        MeshBuffers {
            format: MeshFormat::Triangles,
            positions: vec![0.0; 9],
            normals: vec![],
            indices: vec![0, 1, 2],
        }
    }

    #[test]
    fn unchanged_camera_is_not_resent() {
        let mut b = RendererBinding::new(MockRenderer::new());
        let (scene, view, sel) = (scene(), ViewState::default(), SelectionState::default());
        b.apply(&[RenderEffect::Camera, RenderEffect::Camera], &scene, &view, &sel);
        assert_eq!(b.renderer().count_calls(|c| *c == RenderCall::Camera), 1);
    }

    #[test]
    fn visibility_follows_ancestors_without_reupload() {
        let mut b = RendererBinding::new(MockRenderer::new());
        let mut scene = scene();
        let (view, sel) = (ViewState::default(), SelectionState::default());
        let b_id = ShapeId::new("B");
        b.apply(
            &[RenderEffect::MeshReady {
                shape_id: b_id.clone(),
                buffers: mesh(),
            }],
            &scene,
            &view,
            &sel,
        );
        b.apply(&[RenderEffect::ShapeState(b_id.clone())], &scene, &view, &sel);
        assert_eq!(b.renderer().visibility.get(&b_id), Some(&(true, true)));

        scene
            .apply(&cad_sync_proto::Delta::shape(
                "A",
                cad_sync_proto::ShapeChange::Visible(false),
                0,
            ))
            .unwrap();
        b.apply(&[RenderEffect::ShapeState(ShapeId::new("A"))], &scene, &view, &sel);
        assert_eq!(b.renderer().visibility.get(&b_id), Some(&(false, false)));
        assert_eq!(b.renderer().upload_count(&b_id), 1);
    }

    #[test]
    fn first_error_marks_unavailable_once() {
        let mut renderer = MockRenderer::new();
        renderer.fail_with(RenderError::ContextLost("gpu reset".into()));
        let mut b = RendererBinding::new(renderer);
        let (scene, view, sel) = (scene(), ViewState::default(), SelectionState::default());
        b.apply(&[RenderEffect::Camera, RenderEffect::Options], &scene, &view, &sel);
        assert!(matches!(b.status(), BindingStatus::Unavailable(_)));
        assert!(b.take_failure().is_some());
        assert!(b.take_failure().is_none());
        assert!(b.pick(0.5, 0.5).is_none());
        assert!(b.export_image().is_none());
    }
}
