//! The host graphics API as seen by the bridge.
//!
//! [`GlHost`] is the narrow surface the call forwarder needs: one method per entry point, objects
//! as associated types. The bridge never remaps enum values; every `u32` enum argument is the
//! host's native constant.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("host is out of {0} objects")]
    OutOfMemory(&'static str),
    #[error("{0} is not supported by this context")]
    Unsupported(&'static str),
    #[error("host context lost")]
    ContextLost,
}

/// Context versions the bridge knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextVersion {
    /// GLES 3 / WebGL 2: vertex array objects are core.
    Primary,
    /// GLES 2 / WebGL 1: vertex array objects come from `OES_vertex_array_object`.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerPreference {
    #[default]
    Default,
    HighPerformance,
    LowPower,
}

/// Attributes requested when creating the host context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextAttributes {
    pub alpha: bool,
    pub antialias: bool,
    pub depth: bool,
    pub stencil: bool,
    pub premultiplied_alpha: bool,
    pub preserve_drawing_buffer: bool,
    pub fail_if_major_performance_caveat: bool,
    pub power_preference: PowerPreference,
}

impl Default for ContextAttributes {
    fn default() -> Self {
        Self {
            alpha: true,
            antialias: true,
            depth: true,
            stencil: true,
            premultiplied_alpha: true,
            preserve_drawing_buffer: true,
            fail_if_major_performance_caveat: false,
            power_preference: PowerPreference::Default,
        }
    }
}

/// Source of host contexts, probed once at session start.
pub trait ContextProvider {
    type Host: GlHost;

    /// Whether the platform advertises `version` at all.
    fn supports(&self, version: ContextVersion) -> bool;

    /// Create a context. `None` means creation failed even though the version may be advertised.
    fn create(&mut self, version: ContextVersion, attributes: &ContextAttributes) -> Option<Self::Host>;
}

pub trait GlHost {
    type Shader;
    type Program;
    type UniformLocation;
    type Buffer;
    type Texture;
    type VertexArray;
    type Framebuffer;
    type Renderbuffer;

    fn has_extension(&self, name: &str) -> bool;

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32);
    fn clear_depth(&mut self, depth: f32);
    fn clear(&mut self, mask: u32);
    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool);
    fn depth_mask(&mut self, flag: bool);
    fn stencil_mask(&mut self, mask: u32);
    fn cull_face(&mut self, mode: u32);
    fn front_face(&mut self, mode: u32);
    fn enable(&mut self, cap: u32);
    fn disable(&mut self, cap: u32);
    fn depth_func(&mut self, func: u32);
    fn blend_func(&mut self, src: u32, dst: u32);
    fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32);
    fn stencil_func(&mut self, func: u32, reference: i32, mask: u32);
    fn stencil_op(&mut self, fail: u32, zfail: u32, zpass: u32);
    fn stencil_op_separate(&mut self, face: u32, fail: u32, zfail: u32, zpass: u32);
    fn pixel_store_i32(&mut self, pname: u32, param: i32);
    fn active_texture(&mut self, unit: u32);
    fn get_error(&mut self) -> u32;
    /// Integer (or integer-array) state query. An empty result means the host had no value.
    fn get_parameter_i32(&mut self, pname: u32) -> Vec<i32>;

    fn create_shader(&mut self, kind: u32) -> Result<Self::Shader, HostError>;
    fn delete_shader(&mut self, shader: Self::Shader);
    fn shader_source(&mut self, shader: &Self::Shader, source: &str);
    fn compile_shader(&mut self, shader: &Self::Shader);
    fn get_shader_parameter(&mut self, shader: &Self::Shader, pname: u32) -> i32;
    fn get_shader_info_log(&mut self, shader: &Self::Shader) -> String;

    fn create_program(&mut self) -> Result<Self::Program, HostError>;
    fn delete_program(&mut self, program: Self::Program);
    fn attach_shader(&mut self, program: &Self::Program, shader: &Self::Shader);
    fn detach_shader(&mut self, program: &Self::Program, shader: &Self::Shader);
    fn link_program(&mut self, program: &Self::Program);
    fn get_program_parameter(&mut self, program: &Self::Program, pname: u32) -> i32;
    fn get_program_info_log(&mut self, program: &Self::Program) -> String;
    fn bind_attrib_location(&mut self, program: &Self::Program, index: u32, name: &str);
    fn get_attrib_location(&mut self, program: &Self::Program, name: &str) -> i32;
    fn get_uniform_location(
        &mut self,
        program: &Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;
    fn use_program(&mut self, program: Option<&Self::Program>);

    fn uniform_1i(&mut self, location: Option<&Self::UniformLocation>, x: i32);
    fn uniform_1f(&mut self, location: Option<&Self::UniformLocation>, x: f32);
    fn uniform_2f(&mut self, location: Option<&Self::UniformLocation>, x: f32, y: f32);
    fn uniform_3f(&mut self, location: Option<&Self::UniformLocation>, x: f32, y: f32, z: f32);
    fn uniform_4f(
        &mut self,
        location: Option<&Self::UniformLocation>,
        x: f32,
        y: f32,
        z: f32,
        w: f32,
    );
    fn uniform_1fv(&mut self, location: Option<&Self::UniformLocation>, values: &[f32]);
    fn uniform_2fv(&mut self, location: Option<&Self::UniformLocation>, values: &[f32]);
    fn uniform_3fv(&mut self, location: Option<&Self::UniformLocation>, values: &[f32]);
    fn uniform_4fv(&mut self, location: Option<&Self::UniformLocation>, values: &[f32]);
    fn uniform_matrix_3fv(
        &mut self,
        location: Option<&Self::UniformLocation>,
        transpose: bool,
        values: &[f32],
    );
    fn uniform_matrix_4fv(
        &mut self,
        location: Option<&Self::UniformLocation>,
        transpose: bool,
        values: &[f32],
    );

    fn create_buffer(&mut self) -> Result<Self::Buffer, HostError>;
    fn delete_buffer(&mut self, buffer: Self::Buffer);
    fn bind_buffer(&mut self, target: u32, buffer: Option<&Self::Buffer>);
    fn buffer_data(&mut self, target: u32, data: &[u8], usage: u32);
    /// Allocate `size` bytes of storage without uploading contents.
    fn buffer_data_size(&mut self, target: u32, size: i32, usage: u32);
    fn buffer_sub_data(&mut self, target: u32, offset: i32, data: &[u8]);

    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn disable_vertex_attrib_array(&mut self, index: u32);
    fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    );
    fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32);
    fn draw_arrays(&mut self, mode: u32, first: i32, count: i32);
    fn draw_elements(&mut self, mode: u32, count: i32, ty: u32, offset: i32);
    fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        ty: u32,
        offset: i32,
        instances: i32,
    );

    fn create_texture(&mut self) -> Result<Self::Texture, HostError>;
    fn delete_texture(&mut self, texture: Self::Texture);
    fn bind_texture(&mut self, target: u32, texture: Option<&Self::Texture>);
    #[allow(clippy::too_many_arguments)]
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
    );
    #[allow(clippy::too_many_arguments)]
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
    );
    fn tex_parameter_i32(&mut self, target: u32, pname: u32, param: i32);
    fn generate_mipmap(&mut self, target: u32);
    #[allow(clippy::too_many_arguments)]
    fn read_pixels(
        &mut self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels: &mut [u8],
    );

    fn create_vertex_array(&mut self) -> Result<Self::VertexArray, HostError>;
    fn delete_vertex_array(&mut self, vertex_array: Self::VertexArray);
    fn bind_vertex_array(&mut self, vertex_array: Option<&Self::VertexArray>);

    /// `OES_vertex_array_object` entry points, only used on fallback contexts.
    fn create_vertex_array_oes(&mut self) -> Result<Self::VertexArray, HostError> {
        Err(HostError::Unsupported("createVertexArrayOES"))
    }

    fn delete_vertex_array_oes(&mut self, vertex_array: Self::VertexArray) {
        drop(vertex_array);
    }

    fn bind_vertex_array_oes(&mut self, _vertex_array: Option<&Self::VertexArray>) {}

    fn create_framebuffer(&mut self) -> Result<Self::Framebuffer, HostError>;
    fn delete_framebuffer(&mut self, framebuffer: Self::Framebuffer);
    fn bind_framebuffer(&mut self, target: u32, framebuffer: Option<&Self::Framebuffer>);
    fn check_framebuffer_status(&mut self, target: u32) -> u32;
    fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Option<&Self::Texture>,
        level: i32,
    );
    fn framebuffer_renderbuffer(
        &mut self,
        target: u32,
        attachment: u32,
        renderbuffer_target: u32,
        renderbuffer: Option<&Self::Renderbuffer>,
    );
    #[allow(clippy::too_many_arguments)]
    fn blit_framebuffer(
        &mut self,
        src: [i32; 4],
        dst: [i32; 4],
        mask: u32,
        filter: u32,
    );
    fn draw_buffers(&mut self, buffers: &[u32]);

    fn create_renderbuffer(&mut self) -> Result<Self::Renderbuffer, HostError>;
    fn delete_renderbuffer(&mut self, renderbuffer: Self::Renderbuffer);
    fn bind_renderbuffer(&mut self, target: u32, renderbuffer: Option<&Self::Renderbuffer>);
    fn renderbuffer_storage(&mut self, target: u32, internal_format: u32, width: i32, height: i32);
    fn renderbuffer_storage_multisample(
        &mut self,
        target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    );
}
