// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mock renderer for headless testing of the sync core.
//!
//! MockRenderer tracks renderer state in maps without any GPU work and
//! records every call, so tests can assert on exactly which mutations the
//! renderer binding issued.

use std::collections::{BTreeMap, HashMap};

use cad_scene_port::{
    CameraState, ClipPlane, HighlightState, Material, MeshBuffers, PickHit, RenderError,
    RenderOptions, RenderPort, ShapeId,
};

/// One recorded renderer call.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderCall {
    /// `upload_mesh` for a shape.
    Upload(ShapeId),
    /// `remove_mesh` for a shape.
    Remove(ShapeId),
    /// `set_visibility` for a shape.
    Visibility(ShapeId, bool, bool),
    /// `set_material` for a shape.
    Material(ShapeId),
    /// `set_camera`.
    Camera,
    /// `set_clip_planes` with the plane count.
    ClipPlanes(usize),
    /// `set_render_options`.
    Options,
    /// `set_highlight`.
    Highlight,
    /// `pick` at normalized coordinates.
    Pick(f32, f32),
    /// `clear`.
    Clear,
    /// `export_image`.
    Export,
}

/// Mock rendering capability.
///
/// Pick results are scripted with [`MockRenderer::script_pick`]; every
/// other call just updates in-memory state.
#[derive(Debug, Default)]
pub struct MockRenderer {
    /// Uploaded geometry per shape.
    pub meshes: BTreeMap<ShapeId, MeshBuffers>,
    /// Face/edge visibility per shape.
    pub visibility: BTreeMap<ShapeId, (bool, bool)>,
    /// Material per shape.
    pub materials: BTreeMap<ShapeId, Material>,
    /// Current camera state.
    pub camera: CameraState,
    /// Current clip planes.
    pub clip_planes: Vec<ClipPlane>,
    /// Whether clip planes intersect.
    pub clip_intersection: bool,
    /// Current render options.
    pub options: RenderOptions,
    /// Current highlight state.
    pub highlight: HighlightState,
    /// Every call in order.
    pub calls: Vec<RenderCall>,
    /// Number of render calls.
    pub render_count: u32,
    /// Current viewport dimensions.
    pub viewport: (u32, u32, f32),
    /// Whether dispose has been called.
    pub disposed: bool,
    picks: Vec<((f32, f32), PickHit)>,
    fail_next: Option<RenderError>,
    uploads: HashMap<ShapeId, u32>,
}

impl MockRenderer {
    /// Create a new mock renderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a pick at `(x, y)` (normalized, ±0.01) return `hit`.
    pub fn script_pick(&mut self, x: f32, y: f32, hit: PickHit) {
        self.picks.push(((x, y), hit));
    }

    /// Fail the next fallible call with `err`, then keep failing.
    ///
    /// Mirrors a lost context: once gone, it stays gone.
    pub fn fail_with(&mut self, err: RenderError) {
        self.fail_next = Some(err);
    }

    /// Number of uploads issued for a shape.
    pub fn upload_count(&self, shape: &ShapeId) -> u32 {
        self.uploads.get(shape).copied().unwrap_or(0)
    }

    /// Total number of uploads across all shapes.
    pub fn total_uploads(&self) -> u32 {
        self.uploads.values().sum()
    }

    /// Count recorded calls matching a predicate.
    pub fn count_calls(&self, pred: impl Fn(&RenderCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn check(&self) -> Result<(), RenderError> {
        match &self.fail_next {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl RenderPort for MockRenderer {
    fn upload_mesh(&mut self, shape: &ShapeId, mesh: &MeshBuffers) -> Result<(), RenderError> {
        self.check()?;
        self.calls.push(RenderCall::Upload(shape.clone()));
        *self.uploads.entry(shape.clone()).or_insert(0) += 1;
        self.meshes.insert(shape.clone(), mesh.clone());
        Ok(())
    }

    fn remove_mesh(&mut self, shape: &ShapeId) -> Result<(), RenderError> {
        self.check()?;
        self.calls.push(RenderCall::Remove(shape.clone()));
        self.meshes.remove(shape);
        self.visibility.remove(shape);
        self.materials.remove(shape);
        Ok(())
    }

    fn set_visibility(
        &mut self,
        shape: &ShapeId,
        faces: bool,
        edges: bool,
    ) -> Result<(), RenderError> {
        self.check()?;
        if !self.meshes.contains_key(shape) {
            return Err(RenderError::MissingHandle(shape.clone()));
        }
        self.calls
            .push(RenderCall::Visibility(shape.clone(), faces, edges));
        self.visibility.insert(shape.clone(), (faces, edges));
        Ok(())
    }

    fn set_material(&mut self, shape: &ShapeId, material: &Material) -> Result<(), RenderError> {
        self.check()?;
        if !self.meshes.contains_key(shape) {
            return Err(RenderError::MissingHandle(shape.clone()));
        }
        self.calls.push(RenderCall::Material(shape.clone()));
        self.materials.insert(shape.clone(), *material);
        Ok(())
    }

    fn set_camera(&mut self, camera: &CameraState) -> Result<(), RenderError> {
        self.check()?;
        self.calls.push(RenderCall::Camera);
        self.camera = *camera;
        Ok(())
    }

    fn set_clip_planes(
        &mut self,
        planes: &[ClipPlane],
        intersection: bool,
    ) -> Result<(), RenderError> {
        self.check()?;
        self.calls.push(RenderCall::ClipPlanes(planes.len()));
        self.clip_planes = planes.to_vec();
        self.clip_intersection = intersection;
        Ok(())
    }

    fn set_render_options(&mut self, options: &RenderOptions) -> Result<(), RenderError> {
        self.check()?;
        self.calls.push(RenderCall::Options);
        self.options = options.clone();
        Ok(())
    }

    fn set_highlight(&mut self, highlight: &HighlightState) -> Result<(), RenderError> {
        self.check()?;
        self.calls.push(RenderCall::Highlight);
        self.highlight = highlight.clone();
        Ok(())
    }

    fn pick(&mut self, x: f32, y: f32) -> Result<Option<PickHit>, RenderError> {
        self.check()?;
        self.calls.push(RenderCall::Pick(x, y));
        let hit = self
            .picks
            .iter()
            .find(|((px, py), _)| (px - x).abs() <= 0.01 && (py - y).abs() <= 0.01)
            .map(|(_, hit)| hit.clone());
        Ok(hit)
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        self.check()?;
        self.calls.push(RenderCall::Clear);
        self.meshes.clear();
        self.visibility.clear();
        self.materials.clear();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32, dpr: f32) {
        self.viewport = (width, height, dpr);
    }

    fn render(&mut self) {
        self.render_count += 1;
    }

    fn export_image(&mut self) -> Result<Vec<u8>, RenderError> {
        self.check()?;
        self.calls.push(RenderCall::Export);
        // PNG signature; enough for callers that only sniff the format.
        Ok(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.meshes.clear();
        self.visibility.clear();
        self.materials.clear();
        self.picks.clear();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use cad_scene_port::{MeshFormat, SubShapeKind};

    fn mesh() -> MeshBuffers {
        MeshBuffers {
            format: MeshFormat::Points,
            positions: vec![0.0, 0.0, 0.0],
            normals: vec![],
            indices: vec![],
        }
    }

    #[test]
    fn test_upload_counts_per_shape() {
        let mut renderer = MockRenderer::new();
        let a = ShapeId::new("a");
        renderer.upload_mesh(&a, &mesh()).unwrap();
        renderer.upload_mesh(&a, &mesh()).unwrap();
        assert_eq!(renderer.upload_count(&a), 2);
        assert_eq!(renderer.total_uploads(), 2);
        assert_eq!(renderer.meshes.len(), 1);
    }

    #[test]
    fn test_visibility_requires_handle() {
        let mut renderer = MockRenderer::new();
        let err = renderer
            .set_visibility(&ShapeId::new("ghost"), false, false)
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingHandle(_)));
    }

    #[test]
    fn test_scripted_pick() {
        let mut renderer = MockRenderer::new();
        let hit = PickHit {
            shape_id: ShapeId::new("a"),
            sub_kind: SubShapeKind::Face,
            sub_index: 3,
            point: [1.0, 2.0, 3.0],
        };
        renderer.script_pick(0.5, 0.25, hit.clone());
        assert_eq!(renderer.pick(0.505, 0.25).unwrap(), Some(hit));
        assert_eq!(renderer.pick(0.9, 0.9).unwrap(), None);
    }

    #[test]
    fn test_context_loss_is_sticky() {
        let mut renderer = MockRenderer::new();
        renderer.fail_with(RenderError::ContextLost("gpu reset".into()));
        assert!(renderer.set_camera(&CameraState::default()).is_err());
        assert!(renderer.clear().is_err());
        assert!(renderer.calls.is_empty());
    }

    #[test]
    fn test_resize_and_render() {
        let mut renderer = MockRenderer::new();
        renderer.resize(1920, 1080, 2.0);
        renderer.render();
        renderer.render();
        assert_eq!(renderer.viewport, (1920, 1080, 2.0));
        assert_eq!(renderer.render_count, 2);
    }

    #[test]
    fn test_dispose() {
        let mut renderer = MockRenderer::new();
        renderer.upload_mesh(&ShapeId::new("a"), &mesh()).unwrap();
        assert!(!renderer.disposed);
        renderer.dispose();
        assert!(renderer.disposed);
        assert!(renderer.meshes.is_empty());
    }
}
