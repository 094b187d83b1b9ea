//! A software [`GlHost`] that records every call.
//!
//! Used by the headless runner and by tests. It draws nothing but models enough of a GLES context
//! for a guest to get through start-up: object lifetime, shader compile and program link status
//! with info logs, a handful of integer queries, `getError`, framebuffer completeness and
//! `readPixels` returning the clear colour.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;
use serde_json::{json, Value};

use crate::consts::*;
use crate::host::{ContextAttributes, ContextProvider, ContextVersion, GlHost, HostError};

/// One recorded host call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostCall {
    pub name: &'static str,
    pub args: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Shader,
    Program,
    Buffer,
    Texture,
    VertexArray,
    Framebuffer,
    Renderbuffer,
}

impl ObjectKind {
    fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Shader => "shader",
            ObjectKind::Program => "program",
            ObjectKind::Buffer => "buffer",
            ObjectKind::Texture => "texture",
            ObjectKind::VertexArray => "vertex array",
            ObjectKind::Framebuffer => "framebuffer",
            ObjectKind::Renderbuffer => "renderbuffer",
        }
    }
}

/// An object owned by a [`RecordingHost`]. Deliberately not `Clone`: the bridge must hand each one
/// back exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct HostObject {
    kind: ObjectKind,
    id: u32,
}

impl HostObject {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct RecordedLocation {
    id: u32,
    program: u32,
    name: String,
}

impl RecordedLocation {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the program the location was queried from.
    pub fn program(&self) -> u32 {
        self.program
    }
}

#[derive(Debug, Default)]
struct ShaderState {
    kind: u32,
    source: String,
    compiled: bool,
    log: String,
}

#[derive(Debug, Default)]
struct ProgramState {
    attached: Vec<u32>,
    linked: bool,
    log: String,
    attrib_bindings: BTreeMap<String, u32>,
}

fn id_of(object: Option<&HostObject>) -> Value {
    object.map_or(Value::Null, |o| json!(o.id))
}

fn location_of(location: Option<&RecordedLocation>) -> Value {
    location.map_or(Value::Null, |l| json!(l.id))
}

/// Names declared by statements starting with one of `keywords`, in source order.
fn declared_names(source: &str, keywords: &[&str]) -> Vec<String> {
    source
        .split([';', '\n'])
        .filter_map(|statement| {
            let mut tokens = statement.split_whitespace();
            let first = tokens.next()?;
            if !keywords.contains(&first) {
                return None;
            }
            let last = tokens.last()?;
            Some(last.split('[').next().unwrap_or(last).to_owned())
        })
        .collect()
}

pub struct RecordingHost {
    version: ContextVersion,
    attributes: ContextAttributes,
    extensions: BTreeSet<String>,
    calls: Vec<HostCall>,

    next_id: u32,
    object_limit: Option<usize>,
    live: BTreeMap<u32, ObjectKind>,
    destroyed: usize,
    double_destroys: usize,

    shaders: BTreeMap<u32, ShaderState>,
    programs: BTreeMap<u32, ProgramState>,
    attached_framebuffers: BTreeSet<u32>,
    bound_framebuffer: Option<u32>,

    errors: VecDeque<u32>,
    viewport: [i32; 4],
    clear_color: [f32; 4],
    unpack_alignment: i32,
    pack_alignment: i32,
}

impl RecordingHost {
    pub fn new(version: ContextVersion) -> Self {
        Self {
            version,
            attributes: ContextAttributes::default(),
            extensions: BTreeSet::new(),
            calls: Vec::new(),
            next_id: 1,
            object_limit: None,
            live: BTreeMap::new(),
            destroyed: 0,
            double_destroys: 0,
            shaders: BTreeMap::new(),
            programs: BTreeMap::new(),
            attached_framebuffers: BTreeSet::new(),
            bound_framebuffer: None,
            errors: VecDeque::new(),
            viewport: [0; 4],
            clear_color: [0.0; 4],
            unpack_alignment: 4,
            pack_alignment: 4,
        }
    }

    pub fn with_extension(mut self, name: &str) -> Self {
        self.extensions.insert(name.to_owned());
        self
    }

    /// Fail object creation with `OUT_OF_MEMORY` once `limit` objects are live.
    pub fn set_object_limit(&mut self, limit: Option<usize>) {
        self.object_limit = limit;
    }

    pub fn version(&self) -> ContextVersion {
        self.version
    }

    pub fn attributes(&self) -> &ContextAttributes {
        &self.attributes
    }

    pub fn calls(&self) -> &[HostCall] {
        &self.calls
    }

    pub fn calls_named(&self, name: &str) -> Vec<&HostCall> {
        self.calls.iter().filter(|call| call.name == name).collect()
    }

    pub fn take_calls(&mut self) -> Vec<HostCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn live_objects(&self) -> usize {
        self.live.len()
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed
    }

    /// Destroy calls for objects that were already gone. Always 0 for a correct bridge.
    pub fn double_destroys(&self) -> usize {
        self.double_destroys
    }

    fn record(&mut self, name: &'static str, args: Value) {
        self.calls.push(HostCall { name, args });
    }

    fn create(&mut self, name: &'static str, kind: ObjectKind) -> Result<HostObject, HostError> {
        if self.object_limit.is_some_and(|limit| self.live.len() >= limit) {
            self.errors.push_back(OUT_OF_MEMORY);
            self.record(name, json!({ "error": "out_of_memory" }));
            return Err(HostError::OutOfMemory(kind.as_str()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.live.insert(id, kind);
        self.record(name, json!({ "id": id }));
        Ok(HostObject { kind, id })
    }

    fn destroy(&mut self, name: &'static str, object: HostObject) {
        if self.live.remove(&object.id).is_some() {
            self.destroyed += 1;
        } else {
            self.double_destroys += 1;
        }
        self.shaders.remove(&object.id);
        self.programs.remove(&object.id);
        self.record(name, json!({ "id": object.id }));
    }

    fn error(&mut self, code: u32) {
        self.errors.push_back(code);
    }

    fn shader_sources(&self, program: u32, kind: Option<u32>) -> Vec<&str> {
        let Some(state) = self.programs.get(&program) else {
            return Vec::new();
        };
        state
            .attached
            .iter()
            .filter_map(|id| self.shaders.get(id))
            .filter(|shader| kind.map_or(true, |k| shader.kind == k))
            .map(|shader| shader.source.as_str())
            .collect()
    }
}

impl GlHost for RecordingHost {
    type Shader = HostObject;
    type Program = HostObject;
    type UniformLocation = RecordedLocation;
    type Buffer = HostObject;
    type Texture = HostObject;
    type VertexArray = HostObject;
    type Framebuffer = HostObject;
    type Renderbuffer = HostObject;

    fn has_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.viewport = [x, y, width, height];
        self.record("viewport", json!([x, y, width, height]));
    }

    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.clear_color = [r, g, b, a];
        self.record("clearColor", json!([r, g, b, a]));
    }

    fn clear_depth(&mut self, depth: f32) {
        self.record("clearDepth", json!([depth]));
    }

    fn clear(&mut self, mask: u32) {
        self.record("clear", json!([mask]));
    }

    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        self.record("colorMask", json!([r, g, b, a]));
    }

    fn depth_mask(&mut self, flag: bool) {
        self.record("depthMask", json!([flag]));
    }

    fn stencil_mask(&mut self, mask: u32) {
        self.record("stencilMask", json!([mask]));
    }

    fn cull_face(&mut self, mode: u32) {
        self.record("cullFace", json!([mode]));
    }

    fn front_face(&mut self, mode: u32) {
        self.record("frontFace", json!([mode]));
    }

    fn enable(&mut self, cap: u32) {
        self.record("enable", json!([cap]));
    }

    fn disable(&mut self, cap: u32) {
        self.record("disable", json!([cap]));
    }

    fn depth_func(&mut self, func: u32) {
        self.record("depthFunc", json!([func]));
    }

    fn blend_func(&mut self, src: u32, dst: u32) {
        self.record("blendFunc", json!([src, dst]));
    }

    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.record(
            "blendFuncSeparate",
            json!([src_rgb, dst_rgb, src_alpha, dst_alpha]),
        );
    }

    fn stencil_func(&mut self, func: u32, reference: i32, mask: u32) {
        self.record("stencilFunc", json!([func, reference, mask]));
    }

    fn stencil_op(&mut self, fail: u32, zfail: u32, zpass: u32) {
        self.record("stencilOp", json!([fail, zfail, zpass]));
    }

    fn stencil_op_separate(&mut self, face: u32, fail: u32, zfail: u32, zpass: u32) {
        self.record("stencilOpSeparate", json!([face, fail, zfail, zpass]));
    }

    fn pixel_store_i32(&mut self, pname: u32, param: i32) {
        let valid = matches!(param, 1 | 2 | 4 | 8);
        match pname {
            UNPACK_ALIGNMENT if valid => self.unpack_alignment = param,
            PACK_ALIGNMENT if valid => self.pack_alignment = param,
            UNPACK_ALIGNMENT | PACK_ALIGNMENT => self.error(INVALID_VALUE),
            _ => {}
        }
        self.record("pixelStorei", json!([pname, param]));
    }

    fn active_texture(&mut self, unit: u32) {
        self.record("activeTexture", json!([unit]));
    }

    fn get_error(&mut self) -> u32 {
        self.errors.pop_front().unwrap_or(NO_ERROR)
    }

    fn get_parameter_i32(&mut self, pname: u32) -> Vec<i32> {
        match pname {
            VIEWPORT => self.viewport.to_vec(),
            MAX_TEXTURE_SIZE => vec![4096],
            UNPACK_ALIGNMENT => vec![self.unpack_alignment],
            PACK_ALIGNMENT => vec![self.pack_alignment],
            _ => Vec::new(),
        }
    }

    fn create_shader(&mut self, kind: u32) -> Result<HostObject, HostError> {
        let shader = self.create("createShader", ObjectKind::Shader)?;
        self.shaders.insert(
            shader.id,
            ShaderState {
                kind,
                ..Default::default()
            },
        );
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: HostObject) {
        self.destroy("deleteShader", shader);
    }

    fn shader_source(&mut self, shader: &HostObject, source: &str) {
        if let Some(state) = self.shaders.get_mut(&shader.id) {
            state.source = source.to_owned();
        }
        self.record("shaderSource", json!({ "shader": shader.id, "source": source }));
    }

    fn compile_shader(&mut self, shader: &HostObject) {
        if let Some(state) = self.shaders.get_mut(&shader.id) {
            let directive = state.source.lines().find(|line| line.trim_start().starts_with("#error"));
            (state.compiled, state.log) = match directive {
                _ if state.source.trim().is_empty() => (false, "ERROR: 0:0: empty shader source".to_owned()),
                Some(line) => (false, format!("ERROR: 0:1: {}", line.trim())),
                None => (true, String::new()),
            };
        }
        self.record("compileShader", json!({ "shader": shader.id }));
    }

    fn get_shader_parameter(&mut self, shader: &HostObject, pname: u32) -> i32 {
        let Some(state) = self.shaders.get(&shader.id) else {
            self.error(INVALID_VALUE);
            return 0;
        };
        match pname {
            COMPILE_STATUS => state.compiled as i32,
            SHADER_TYPE => state.kind as i32,
            DELETE_STATUS => 0,
            INFO_LOG_LENGTH if state.log.is_empty() => 0,
            INFO_LOG_LENGTH => state.log.len() as i32 + 1,
            _ => {
                self.error(INVALID_ENUM);
                0
            }
        }
    }

    fn get_shader_info_log(&mut self, shader: &HostObject) -> String {
        self.shaders
            .get(&shader.id)
            .map(|state| state.log.clone())
            .unwrap_or_default()
    }

    fn create_program(&mut self) -> Result<HostObject, HostError> {
        let program = self.create("createProgram", ObjectKind::Program)?;
        self.programs.insert(program.id, ProgramState::default());
        Ok(program)
    }

    fn delete_program(&mut self, program: HostObject) {
        self.destroy("deleteProgram", program);
    }

    fn attach_shader(&mut self, program: &HostObject, shader: &HostObject) {
        match self.programs.get_mut(&program.id) {
            Some(state) if !state.attached.contains(&shader.id) => state.attached.push(shader.id),
            _ => self.error(INVALID_OPERATION),
        }
        self.record("attachShader", json!({ "program": program.id, "shader": shader.id }));
    }

    fn detach_shader(&mut self, program: &HostObject, shader: &HostObject) {
        if let Some(state) = self.programs.get_mut(&program.id) {
            state.attached.retain(|&id| id != shader.id);
        }
        self.record("detachShader", json!({ "program": program.id, "shader": shader.id }));
    }

    fn link_program(&mut self, program: &HostObject) {
        let compiled = |kind| {
            self.programs.get(&program.id).is_some_and(|state| {
                state.attached.iter().any(|id| {
                    self.shaders
                        .get(id)
                        .is_some_and(|s| s.kind == kind && s.compiled)
                })
            })
        };
        let log = match (compiled(VERTEX_SHADER), compiled(FRAGMENT_SHADER)) {
            (true, true) => String::new(),
            (false, _) => "ERROR: no compiled vertex shader attached".to_owned(),
            (_, false) => "ERROR: no compiled fragment shader attached".to_owned(),
        };
        if let Some(state) = self.programs.get_mut(&program.id) {
            state.linked = log.is_empty();
            state.log = log;
        }
        self.record("linkProgram", json!({ "program": program.id }));
    }

    fn get_program_parameter(&mut self, program: &HostObject, pname: u32) -> i32 {
        let Some(state) = self.programs.get(&program.id) else {
            self.error(INVALID_VALUE);
            return 0;
        };
        match pname {
            LINK_STATUS => state.linked as i32,
            ATTACHED_SHADERS => state.attached.len() as i32,
            DELETE_STATUS => 0,
            INFO_LOG_LENGTH if state.log.is_empty() => 0,
            INFO_LOG_LENGTH => state.log.len() as i32 + 1,
            _ => {
                self.error(INVALID_ENUM);
                0
            }
        }
    }

    fn get_program_info_log(&mut self, program: &HostObject) -> String {
        self.programs
            .get(&program.id)
            .map(|state| state.log.clone())
            .unwrap_or_default()
    }

    fn bind_attrib_location(&mut self, program: &HostObject, index: u32, name: &str) {
        if let Some(state) = self.programs.get_mut(&program.id) {
            state.attrib_bindings.insert(name.to_owned(), index);
        }
        self.record(
            "bindAttribLocation",
            json!({ "program": program.id, "index": index, "name": name }),
        );
    }

    fn get_attrib_location(&mut self, program: &HostObject, name: &str) -> i32 {
        let Some(state) = self.programs.get(&program.id).filter(|s| s.linked) else {
            self.error(INVALID_OPERATION);
            return -1;
        };
        if let Some(&index) = state.attrib_bindings.get(name) {
            return index as i32;
        }
        self.shader_sources(program.id, Some(VERTEX_SHADER))
            .into_iter()
            .flat_map(|source| declared_names(source, &["attribute", "in"]))
            .position(|declared| declared == name)
            .map_or(-1, |index| index as i32)
    }

    fn get_uniform_location(&mut self, program: &HostObject, name: &str) -> Option<RecordedLocation> {
        if !self.programs.get(&program.id).is_some_and(|s| s.linked) {
            self.error(INVALID_OPERATION);
            return None;
        }
        let declared = self
            .shader_sources(program.id, None)
            .into_iter()
            .any(|source| declared_names(source, &["uniform"]).iter().any(|n| n == name));
        if !declared {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;
        Some(RecordedLocation {
            id,
            program: program.id,
            name: name.to_owned(),
        })
    }

    fn use_program(&mut self, program: Option<&HostObject>) {
        self.record("useProgram", json!({ "program": id_of(program) }));
    }

    fn uniform_1i(&mut self, location: Option<&RecordedLocation>, x: i32) {
        self.record("uniform1i", json!({ "location": location_of(location), "x": x }));
    }

    fn uniform_1f(&mut self, location: Option<&RecordedLocation>, x: f32) {
        self.record("uniform1f", json!({ "location": location_of(location), "x": x }));
    }

    fn uniform_2f(&mut self, location: Option<&RecordedLocation>, x: f32, y: f32) {
        self.record(
            "uniform2f",
            json!({ "location": location_of(location), "values": [x, y] }),
        );
    }

    fn uniform_3f(&mut self, location: Option<&RecordedLocation>, x: f32, y: f32, z: f32) {
        self.record(
            "uniform3f",
            json!({ "location": location_of(location), "values": [x, y, z] }),
        );
    }

    fn uniform_4f(&mut self, location: Option<&RecordedLocation>, x: f32, y: f32, z: f32, w: f32) {
        self.record(
            "uniform4f",
            json!({ "location": location_of(location), "values": [x, y, z, w] }),
        );
    }

    fn uniform_1fv(&mut self, location: Option<&RecordedLocation>, values: &[f32]) {
        self.record("uniform1fv", json!({ "location": location_of(location), "values": values }));
    }

    fn uniform_2fv(&mut self, location: Option<&RecordedLocation>, values: &[f32]) {
        self.record("uniform2fv", json!({ "location": location_of(location), "values": values }));
    }

    fn uniform_3fv(&mut self, location: Option<&RecordedLocation>, values: &[f32]) {
        self.record("uniform3fv", json!({ "location": location_of(location), "values": values }));
    }

    fn uniform_4fv(&mut self, location: Option<&RecordedLocation>, values: &[f32]) {
        self.record("uniform4fv", json!({ "location": location_of(location), "values": values }));
    }

    fn uniform_matrix_3fv(&mut self, location: Option<&RecordedLocation>, transpose: bool, values: &[f32]) {
        self.record(
            "uniformMatrix3fv",
            json!({ "location": location_of(location), "transpose": transpose, "values": values }),
        );
    }

    fn uniform_matrix_4fv(&mut self, location: Option<&RecordedLocation>, transpose: bool, values: &[f32]) {
        self.record(
            "uniformMatrix4fv",
            json!({ "location": location_of(location), "transpose": transpose, "values": values }),
        );
    }

    fn create_buffer(&mut self) -> Result<HostObject, HostError> {
        self.create("createBuffer", ObjectKind::Buffer)
    }

    fn delete_buffer(&mut self, buffer: HostObject) {
        self.destroy("deleteBuffer", buffer);
    }

    fn bind_buffer(&mut self, target: u32, buffer: Option<&HostObject>) {
        self.record("bindBuffer", json!({ "target": target, "buffer": id_of(buffer) }));
    }

    fn buffer_data(&mut self, target: u32, data: &[u8], usage: u32) {
        self.record(
            "bufferData",
            json!({ "target": target, "data": data, "usage": usage }),
        );
    }

    fn buffer_data_size(&mut self, target: u32, size: i32, usage: u32) {
        self.record(
            "bufferDataSize",
            json!({ "target": target, "size": size, "usage": usage }),
        );
    }

    fn buffer_sub_data(&mut self, target: u32, offset: i32, data: &[u8]) {
        self.record(
            "bufferSubData",
            json!({ "target": target, "offset": offset, "data": data }),
        );
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.record("enableVertexAttribArray", json!([index]));
    }

    fn disable_vertex_attrib_array(&mut self, index: u32) {
        self.record("disableVertexAttribArray", json!([index]));
    }

    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        self.record(
            "vertexAttribPointer",
            json!([index, size, ty, normalized, stride, offset]),
        );
    }

    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        self.record("vertexAttribDivisor", json!([index, divisor]));
    }

    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32) {
        self.record("drawArrays", json!([mode, first, count]));
    }

    fn draw_elements(&mut self, mode: u32, count: i32, ty: u32, offset: i32) {
        self.record("drawElements", json!([mode, count, ty, offset]));
    }

    fn draw_elements_instanced(&mut self, mode: u32, count: i32, ty: u32, offset: i32, instances: i32) {
        self.record(
            "drawElementsInstanced",
            json!([mode, count, ty, offset, instances]),
        );
    }

    fn create_texture(&mut self) -> Result<HostObject, HostError> {
        self.create("createTexture", ObjectKind::Texture)
    }

    fn delete_texture(&mut self, texture: HostObject) {
        self.destroy("deleteTexture", texture);
    }

    fn bind_texture(&mut self, target: u32, texture: Option<&HostObject>) {
        self.record("bindTexture", json!({ "target": target, "texture": id_of(texture) }));
    }

    fn tex_image_2d(
        &mut self,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        border: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        self.record(
            "texImage2D",
            json!({
                "target": target,
                "level": level,
                "internal_format": internal_format,
                "width": width,
                "height": height,
                "border": border,
                "format": format,
                "type": ty,
                "pixels": pixels.map(<[u8]>::len),
            }),
        );
    }

    fn tex_sub_image_2d(
        &mut self,
        target: u32,
        level: i32,
        x_offset: i32,
        y_offset: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: Option<&[u8]>,
    ) {
        self.record(
            "texSubImage2D",
            json!({
                "target": target,
                "level": level,
                "offset": [x_offset, y_offset],
                "width": width,
                "height": height,
                "format": format,
                "type": ty,
                "pixels": pixels.map(<[u8]>::len),
            }),
        );
    }

    fn tex_parameter_i32(&mut self, target: u32, pname: u32, param: i32) {
        self.record("texParameteri", json!([target, pname, param]));
    }

    fn generate_mipmap(&mut self, target: u32) {
        self.record("generateMipmap", json!([target]));
    }

    fn read_pixels(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &mut [u8],
    ) {
        if format == RGBA && ty == UNSIGNED_BYTE {
            let rgba = self.clear_color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
            let count = (width.max(0) as usize) * (height.max(0) as usize);
            for pixel in pixels.chunks_exact_mut(4).take(count) {
                pixel.copy_from_slice(&rgba);
            }
        } else {
            pixels.fill(0);
        }
        self.record(
            "readPixels",
            json!([x, y, width, height, format, ty, pixels.len()]),
        );
    }

    fn create_vertex_array(&mut self) -> Result<HostObject, HostError> {
        if self.version == ContextVersion::Fallback {
            return Err(HostError::Unsupported("createVertexArray"));
        }
        self.create("createVertexArray", ObjectKind::VertexArray)
    }

    fn delete_vertex_array(&mut self, vertex_array: HostObject) {
        self.destroy("deleteVertexArray", vertex_array);
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<&HostObject>) {
        self.record("bindVertexArray", json!({ "vertex_array": id_of(vertex_array) }));
    }

    fn create_vertex_array_oes(&mut self) -> Result<HostObject, HostError> {
        if !self.has_extension(OES_VERTEX_ARRAY_OBJECT) {
            return Err(HostError::Unsupported("createVertexArrayOES"));
        }
        self.create("createVertexArrayOES", ObjectKind::VertexArray)
    }

    fn delete_vertex_array_oes(&mut self, vertex_array: HostObject) {
        self.destroy("deleteVertexArrayOES", vertex_array);
    }

    fn bind_vertex_array_oes(&mut self, vertex_array: Option<&HostObject>) {
        self.record(
            "bindVertexArrayOES",
            json!({ "vertex_array": id_of(vertex_array) }),
        );
    }

    fn create_framebuffer(&mut self) -> Result<HostObject, HostError> {
        self.create("createFramebuffer", ObjectKind::Framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: HostObject) {
        self.attached_framebuffers.remove(&framebuffer.id);
        if self.bound_framebuffer == Some(framebuffer.id) {
            self.bound_framebuffer = None;
        }
        self.destroy("deleteFramebuffer", framebuffer);
    }

    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<&HostObject>) {
        self.bound_framebuffer = framebuffer.map(HostObject::id);
        self.record(
            "bindFramebuffer",
            json!({ "target": target, "framebuffer": id_of(framebuffer) }),
        );
    }

    fn check_framebuffer_status(&mut self, target: u32) -> u32 {
        self.record("checkFramebufferStatus", json!([target]));
        match self.bound_framebuffer {
            None => FRAMEBUFFER_COMPLETE,
            Some(id) if self.attached_framebuffers.contains(&id) => FRAMEBUFFER_COMPLETE,
            Some(_) => FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT,
        }
    }

    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<&HostObject>,
        level: i32,
    ) {
        if let (Some(fb), Some(_)) = (self.bound_framebuffer, texture) {
            self.attached_framebuffers.insert(fb);
        }
        self.record(
            "framebufferTexture2D",
            json!({
                "target": target,
                "attachment": attachment,
                "texture_target": texture_target,
                "texture": id_of(texture),
                "level": level,
            }),
        );
    }

    fn framebuffer_renderbuffer(
        &mut self,
        target: u32,
        attachment: u32,
        renderbuffer_target: u32,
        renderbuffer: Option<&HostObject>,
    ) {
        if let (Some(fb), Some(_)) = (self.bound_framebuffer, renderbuffer) {
            self.attached_framebuffers.insert(fb);
        }
        self.record(
            "framebufferRenderbuffer",
            json!({
                "target": target,
                "attachment": attachment,
                "renderbuffer_target": renderbuffer_target,
                "renderbuffer": id_of(renderbuffer),
            }),
        );
    }

    fn blit_framebuffer(&mut self, src: [i32; 4], dst: [i32; 4], mask: u32, filter: u32) {
        self.record(
            "blitFramebuffer",
            json!({ "src": src, "dst": dst, "mask": mask, "filter": filter }),
        );
    }

    fn draw_buffers(&mut self, buffers: &[u32]) {
        self.record("drawBuffers", json!({ "buffers": buffers }));
    }

    fn create_renderbuffer(&mut self) -> Result<HostObject, HostError> {
        self.create("createRenderbuffer", ObjectKind::Renderbuffer)
    }

    fn delete_renderbuffer(&mut self, renderbuffer: HostObject) {
        self.destroy("deleteRenderbuffer", renderbuffer);
    }

    fn bind_renderbuffer(&mut self, target: u32, renderbuffer: Option<&HostObject>) {
        self.record(
            "bindRenderbuffer",
            json!({ "target": target, "renderbuffer": id_of(renderbuffer) }),
        );
    }

    fn renderbuffer_storage(&mut self, target: u32, internal_format: u32, width: i32, height: i32) {
        self.record(
            "renderbufferStorage",
            json!([target, internal_format, width, height]),
        );
    }

    fn renderbuffer_storage_multisample(
        &mut self,
        target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        self.record(
            "renderbufferStorageMultisample",
            json!([target, samples, internal_format, width, height]),
        );
    }
}

/// Hands out [`RecordingHost`]s, simulating which context versions a platform offers.
#[derive(Debug, Clone)]
pub struct RecordingProvider {
    pub primary: bool,
    pub fallback: bool,
    pub extensions: Vec<String>,
    /// Advertise a primary context but fail to create it.
    pub fail_primary_creation: bool,
    pub object_limit: Option<usize>,
}

impl RecordingProvider {
    pub fn primary() -> Self {
        Self {
            primary: true,
            fallback: true,
            extensions: vec![OES_VERTEX_ARRAY_OBJECT.to_owned()],
            fail_primary_creation: false,
            object_limit: None,
        }
    }

    pub fn fallback_only(vertex_array_extension: bool) -> Self {
        let mut extensions = Vec::new();
        if vertex_array_extension {
            extensions.push(OES_VERTEX_ARRAY_OBJECT.to_owned());
        }
        Self {
            primary: false,
            fallback: true,
            extensions,
            fail_primary_creation: false,
            object_limit: None,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            primary: false,
            fallback: false,
            extensions: Vec::new(),
            fail_primary_creation: false,
            object_limit: None,
        }
    }
}

impl ContextProvider for RecordingProvider {
    type Host = RecordingHost;

    fn supports(&self, version: ContextVersion) -> bool {
        match version {
            ContextVersion::Primary => self.primary,
            ContextVersion::Fallback => self.fallback,
        }
    }

    fn create(&mut self, version: ContextVersion, attributes: &ContextAttributes) -> Option<RecordingHost> {
        if !self.supports(version) {
            return None;
        }
        if version == ContextVersion::Primary && self.fail_primary_creation {
            return None;
        }
        let mut host = RecordingHost::new(version);
        host.attributes = attributes.clone();
        host.object_limit = self.object_limit;
        for extension in &self.extensions {
            host.extensions.insert(extension.clone());
        }
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_are_found_in_statement_order() {
        let source = "attribute vec3 a_pos;\nattribute vec2 a_uv; uniform mat4 u_mvp[2];\nvoid main() {}";
        assert_eq!(declared_names(source, &["attribute"]), ["a_pos", "a_uv"]);
        assert_eq!(declared_names(source, &["uniform"]), ["u_mvp"]);
    }

    #[test]
    fn object_limit_raises_out_of_memory() {
        let mut host = RecordingHost::new(ContextVersion::Primary);
        host.set_object_limit(Some(1));
        let buffer = host.create_buffer().unwrap();
        assert_eq!(host.create_buffer(), Err(HostError::OutOfMemory("buffer")));
        assert_eq!(host.get_error(), OUT_OF_MEMORY);
        assert_eq!(host.get_error(), NO_ERROR);
        host.delete_buffer(buffer);
        assert!(host.create_texture().is_ok());
    }

    #[test]
    fn core_vertex_arrays_are_missing_on_fallback() {
        let mut host = RecordingHost::new(ContextVersion::Fallback)
            .with_extension(OES_VERTEX_ARRAY_OBJECT);
        assert!(host.create_vertex_array().is_err());
        assert!(host.create_vertex_array_oes().is_ok());
    }

    #[test]
    fn framebuffer_needs_an_attachment() {
        let mut host = RecordingHost::new(ContextVersion::Primary);
        let fb = host.create_framebuffer().unwrap();
        host.bind_framebuffer(FRAMEBUFFER, Some(&fb));
        assert_eq!(
            host.check_framebuffer_status(FRAMEBUFFER),
            FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT
        );
        let tex = host.create_texture().unwrap();
        host.framebuffer_texture_2d(FRAMEBUFFER, COLOR_ATTACHMENT0, TEXTURE_2D, Some(&tex), 0);
        assert_eq!(host.check_framebuffer_status(FRAMEBUFFER), FRAMEBUFFER_COMPLETE);
    }
}
