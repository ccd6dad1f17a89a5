// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! [`RenderPort`] over a JS renderer object.
//!
//! The object is duck-typed: each port method calls the JS method of the
//! same name (`upload_mesh`, `set_camera`, ...) with plain objects and
//! typed arrays. A thrown exception becomes a [`RenderError::Backend`].

use cad_scene_port::{
    CameraState, ClipPlane, HighlightState, Material, MeshBuffers, MeshFormat, PickHit,
    ProjectionKind, RenderError, RenderOptions, RenderPort, ShapeId, SubShapeKind,
};
use js_sys::{Array, Float32Array, Function, Object, Reflect, Uint32Array, Uint8Array};
use tracing::warn;
use wasm_bindgen::{JsCast, JsValue};

/// Adapter that forwards port calls to a JS object.
pub struct JsRenderer {
    target: JsValue,
}

impl JsRenderer {
    /// Wrap a JS renderer object.
    pub fn new(target: JsValue) -> Self {
        Self { target }
    }

    fn call(&self, name: &str, args: &[JsValue]) -> Result<JsValue, RenderError> {
        let f = Reflect::get(&self.target, &JsValue::from_str(name)).map_err(js_err)?;
        let f: Function = f
            .dyn_into()
            .map_err(|_| RenderError::Backend(format!("renderer has no `{name}` method")))?;
        let args: Array = args.iter().collect();
        f.apply(&self.target, &args).map_err(js_err)
    }

    /// Fire-and-forget call for the infallible port methods.
    fn notify(&self, name: &str, args: &[JsValue]) {
        if let Err(err) = self.call(name, args) {
            warn!(method = name, error = %err, "renderer call failed");
        }
    }
}

fn js_err(err: JsValue) -> RenderError {
    RenderError::Backend(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}

fn object(fields: &[(&str, JsValue)]) -> Result<JsValue, RenderError> {
    let obj = Object::new();
    for (key, value) in fields {
        Reflect::set(&obj, &JsValue::from_str(key), value).map_err(js_err)?;
    }
    Ok(obj.into())
}

fn num(x: f32) -> JsValue {
    JsValue::from_f64(f64::from(x))
}

fn floats(v: &[f32]) -> JsValue {
    Float32Array::from(v).into()
}

fn camera_object(c: &CameraState) -> Result<JsValue, RenderError> {
    let projection = match c.projection {
        ProjectionKind::Perspective => "perspective",
        ProjectionKind::Orthographic => "orthographic",
    };
    object(&[
        ("position", floats(&c.position)),
        ("target", floats(&c.target)),
        ("up", floats(&c.up)),
        ("quaternion", c.quaternion.map_or(JsValue::NULL, |q| floats(&q))),
        ("projection", JsValue::from_str(projection)),
        ("fov_y_radians", num(c.fov_y_radians)),
        ("ortho_scale", num(c.ortho_scale)),
        ("zoom", num(c.zoom)),
        ("near", num(c.near)),
        ("far", num(c.far)),
    ])
}

fn options_object(o: &RenderOptions) -> Result<JsValue, RenderError> {
    let grid: Array = o.grid.iter().map(|g| JsValue::from_bool(*g)).collect();
    object(&[
        ("ambient_intensity", num(o.ambient_intensity)),
        ("direct_intensity", num(o.direct_intensity)),
        ("edge_color", JsValue::from_str(&o.edge_color)),
        ("transparent", JsValue::from_bool(o.transparent)),
        ("black_edges", JsValue::from_bool(o.black_edges)),
        ("axes", JsValue::from_bool(o.axes)),
        ("axes0", JsValue::from_bool(o.axes0)),
        ("grid", grid.into()),
        ("ticks", JsValue::from(o.ticks)),
    ])
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_pick(hit: &JsValue) -> Result<PickHit, RenderError> {
    let field = |name: &str| Reflect::get(hit, &JsValue::from_str(name)).map_err(js_err);
    let malformed = |what: &str| RenderError::Backend(format!("malformed pick result: {what}"));

    let shape_id = field("shape_id")?
        .as_string()
        .ok_or_else(|| malformed("shape_id"))?;
    let sub_kind = match field("sub_kind")?.as_string().as_deref() {
        Some("face") => SubShapeKind::Face,
        Some("edge") => SubShapeKind::Edge,
        Some("vertex") => SubShapeKind::Vertex,
        _ => return Err(malformed("sub_kind")),
    };
    let sub_index = field("sub_index")?
        .as_f64()
        .filter(|i| *i >= 0.0 && i.fract() == 0.0)
        .ok_or_else(|| malformed("sub_index"))? as u32;
    let coords = Array::from(&field("point")?);
    let mut point = [0.0f32; 3];
    for (i, slot) in point.iter_mut().enumerate() {
        *slot = coords
            .get(i as u32)
            .as_f64()
            .ok_or_else(|| malformed("point"))? as f32;
    }
    Ok(PickHit {
        shape_id: ShapeId::new(shape_id),
        sub_kind,
        sub_index,
        point,
    })
}

impl RenderPort for JsRenderer {
    fn upload_mesh(&mut self, shape: &ShapeId, mesh: &MeshBuffers) -> Result<(), RenderError> {
        let format = match mesh.format {
            MeshFormat::Triangles => "triangles",
            MeshFormat::Polylines => "polylines",
            MeshFormat::Points => "points",
        };
        let buffers = object(&[
            ("format", JsValue::from_str(format)),
            ("positions", floats(&mesh.positions)),
            ("normals", floats(&mesh.normals)),
            ("indices", Uint32Array::from(mesh.indices.as_slice()).into()),
        ])?;
        self.call("upload_mesh", &[JsValue::from_str(shape.as_str()), buffers])
            .map(drop)
    }

    fn remove_mesh(&mut self, shape: &ShapeId) -> Result<(), RenderError> {
        self.call("remove_mesh", &[JsValue::from_str(shape.as_str())])
            .map(drop)
    }

    fn set_visibility(
        &mut self,
        shape: &ShapeId,
        faces: bool,
        edges: bool,
    ) -> Result<(), RenderError> {
        self.call(
            "set_visibility",
            &[
                JsValue::from_str(shape.as_str()),
                JsValue::from_bool(faces),
                JsValue::from_bool(edges),
            ],
        )
        .map(drop)
    }

    fn set_material(&mut self, shape: &ShapeId, material: &Material) -> Result<(), RenderError> {
        let color: Array = material.color.iter().map(|c| JsValue::from(*c)).collect();
        let material = object(&[
            ("color", color.into()),
            ("opacity", num(material.opacity)),
            ("metalness", num(material.metalness)),
            ("roughness", num(material.roughness)),
        ])?;
        self.call("set_material", &[JsValue::from_str(shape.as_str()), material])
            .map(drop)
    }

    fn set_camera(&mut self, camera: &CameraState) -> Result<(), RenderError> {
        self.call("set_camera", &[camera_object(camera)?]).map(drop)
    }

    fn set_clip_planes(
        &mut self,
        planes: &[ClipPlane],
        intersection: bool,
    ) -> Result<(), RenderError> {
        let list = Array::new();
        for p in planes {
            list.push(&object(&[
                ("normal", floats(&p.normal)),
                ("offset", num(p.offset)),
                ("enabled", JsValue::from_bool(p.enabled)),
            ])?);
        }
        self.call(
            "set_clip_planes",
            &[list.into(), JsValue::from_bool(intersection)],
        )
        .map(drop)
    }

    fn set_render_options(&mut self, options: &RenderOptions) -> Result<(), RenderError> {
        self.call("set_render_options", &[options_object(options)?])
            .map(drop)
    }

    fn set_highlight(&mut self, highlight: &HighlightState) -> Result<(), RenderError> {
        let selected: Array = highlight
            .selected
            .iter()
            .map(|id| JsValue::from_str(id.as_str()))
            .collect();
        let hovered = highlight
            .hovered
            .as_ref()
            .map_or(JsValue::NULL, |id| JsValue::from_str(id.as_str()));
        let state = object(&[("selected", selected.into()), ("hovered", hovered)])?;
        self.call("set_highlight", &[state]).map(drop)
    }

    fn pick(&mut self, x: f32, y: f32) -> Result<Option<PickHit>, RenderError> {
        let hit = self.call("pick", &[num(x), num(y)])?;
        if hit.is_null() || hit.is_undefined() {
            return Ok(None);
        }
        parse_pick(&hit).map(Some)
    }

    fn clear(&mut self) -> Result<(), RenderError> {
        self.call("clear", &[]).map(drop)
    }

    fn resize(&mut self, width: u32, height: u32, dpr: f32) {
        self.notify(
            "resize",
            &[JsValue::from(width), JsValue::from(height), num(dpr)],
        );
    }

    fn render(&mut self) {
        self.notify("render", &[]);
    }

    fn export_image(&mut self) -> Result<Vec<u8>, RenderError> {
        let image = self.call("export_image", &[])?;
        Ok(Uint8Array::new(&image).to_vec())
    }

    fn dispose(&mut self) {
        self.notify("dispose", &[]);
    }
}
