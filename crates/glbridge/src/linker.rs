//! Wasmtime glue: installs the guest's `env` imports into a [`Linker`].
//!
//! Every import resolves the guest's exported `memory`, hands the bridge a bounds-checked
//! [`GuestMemory`] over it and converts a failed call into a warning plus a zero return. Handles
//! and enums arrive as `i32` and are reinterpreted as `u32`; a negative handle is just an
//! out-of-range one.

use wasmtime::{Caller, Extern, Linker};

use crate::bridge::{Bridge, BridgeError};
use crate::completion::SamplerParams;
use crate::host::GlHost;
use glbridge_mem::GuestMemory;

pub const IMPORT_MODULE: &str = "env";

/// Store data that carries a [`Bridge`].
pub trait BridgeHost: 'static {
    type Gl: GlHost + 'static;

    fn bridge(&mut self) -> &mut Bridge<Self::Gl>;
}

impl<H: GlHost + 'static> BridgeHost for Bridge<H> {
    type Gl = H;

    fn bridge(&mut self) -> &mut Bridge<H> {
        self
    }
}

fn bridge<'a, T: BridgeHost>(caller: &'a mut Caller<'_, T>) -> &'a mut Bridge<T::Gl> {
    let bridge = caller.data_mut().bridge();
    bridge.stats().inc_calls();
    bridge
}

/// Run `f` against the bridge and the guest's current memory, reporting failures as `fallback`.
fn with_guest<T: BridgeHost, R>(
    caller: &mut Caller<'_, T>,
    op: &'static str,
    fallback: R,
    f: impl FnOnce(&mut Bridge<T::Gl>, &mut GuestMemory<'_>) -> Result<R, BridgeError>,
) -> R {
    let Some(memory) = caller.get_export("memory").and_then(Extern::into_memory) else {
        return bridge(caller).report_or(op, Err(BridgeError::NoGuestMemory), fallback);
    };
    let (bytes, data) = memory.data_and_store_mut(&mut *caller);
    let bridge = data.bridge();
    bridge.stats().inc_calls();
    let mut mem = GuestMemory::new(bytes);
    let result = f(&mut *bridge, &mut mem);
    bridge.report_or(op, result, fallback)
}

fn with_bridge<T: BridgeHost, R: Default>(
    caller: &mut Caller<'_, T>,
    op: &'static str,
    f: impl FnOnce(&mut Bridge<T::Gl>) -> Result<R, BridgeError>,
) -> R {
    let bridge = bridge(caller);
    let result = f(&mut *bridge);
    bridge.report(op, result)
}

fn text<T: BridgeHost>(
    caller: &mut Caller<'_, T>,
    op: &'static str,
    ptr: i32,
    len: i32,
    f: impl FnOnce(&mut Bridge<T::Gl>, &str),
) {
    with_guest(caller, op, (), |bridge, mem| {
        let text = glbridge_mem::read_str(mem, ptr as u32, len as u32)?;
        f(bridge, &*text);
        Ok(())
    })
}

/// Define every `env` import the guest may use.
pub fn add_to_linker<T: BridgeHost>(linker: &mut Linker<T>) -> wasmtime::Result<()> {
    add_state(linker)?;
    add_shaders(linker)?;
    add_uniforms(linker)?;
    add_buffers(linker)?;
    add_textures(linker)?;
    add_framebuffers(linker)?;
    add_platform(linker)?;
    Ok(())
}

fn add_state<T: BridgeHost>(linker: &mut Linker<T>) -> wasmtime::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        "glViewport",
        |mut caller: Caller<'_, T>, x: i32, y: i32, w: i32, h: i32| {
            bridge(&mut caller).viewport(x, y, w, h);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glClearColor",
        |mut caller: Caller<'_, T>, r: f32, g: f32, b: f32, a: f32| {
            bridge(&mut caller).clear_color(r, g, b, a);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glClearDepthf",
        |mut caller: Caller<'_, T>, depth: f32| bridge(&mut caller).clear_depth(depth),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glClear",
        |mut caller: Caller<'_, T>, mask: i32| bridge(&mut caller).clear(mask as u32),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glColorMask",
        |mut caller: Caller<'_, T>, r: i32, g: i32, b: i32, a: i32| {
            bridge(&mut caller).color_mask(r != 0, g != 0, b != 0, a != 0);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDepthMask",
        |mut caller: Caller<'_, T>, flag: i32| bridge(&mut caller).depth_mask(flag != 0),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glStencilMask",
        |mut caller: Caller<'_, T>, mask: i32| bridge(&mut caller).stencil_mask(mask as u32),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glCullFace",
        |mut caller: Caller<'_, T>, mode: i32| bridge(&mut caller).cull_face(mode as u32),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glFrontFace",
        |mut caller: Caller<'_, T>, mode: i32| bridge(&mut caller).front_face(mode as u32),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glEnable",
        |mut caller: Caller<'_, T>, cap: i32| bridge(&mut caller).enable(cap as u32),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDisable",
        |mut caller: Caller<'_, T>, cap: i32| bridge(&mut caller).disable(cap as u32),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDepthFunc",
        |mut caller: Caller<'_, T>, func: i32| bridge(&mut caller).depth_func(func as u32),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBlendFunc",
        |mut caller: Caller<'_, T>, src: i32, dst: i32| {
            bridge(&mut caller).blend_func(src as u32, dst as u32);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBlendFuncSeparate",
        |mut caller: Caller<'_, T>, src_rgb: i32, dst_rgb: i32, src_a: i32, dst_a: i32| {
            bridge(&mut caller).blend_func_separate(
                src_rgb as u32,
                dst_rgb as u32,
                src_a as u32,
                dst_a as u32,
            );
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glStencilFunc",
        |mut caller: Caller<'_, T>, func: i32, reference: i32, mask: i32| {
            bridge(&mut caller).stencil_func(func as u32, reference, mask as u32);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glStencilOp",
        |mut caller: Caller<'_, T>, fail: i32, zfail: i32, zpass: i32| {
            bridge(&mut caller).stencil_op(fail as u32, zfail as u32, zpass as u32);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glStencilOpSeparate",
        |mut caller: Caller<'_, T>, face: i32, fail: i32, zfail: i32, zpass: i32| {
            bridge(&mut caller).stencil_op_separate(
                face as u32,
                fail as u32,
                zfail as u32,
                zpass as u32,
            );
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glPixelStorei",
        |mut caller: Caller<'_, T>, pname: i32, param: i32| {
            bridge(&mut caller).pixel_store_i32(pname as u32, param);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glActiveTexture",
        |mut caller: Caller<'_, T>, unit: i32| bridge(&mut caller).active_texture(unit as u32),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGetError",
        |mut caller: Caller<'_, T>| -> i32 { bridge(&mut caller).get_error() as i32 },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGetIntegerv",
        |mut caller: Caller<'_, T>, pname: i32, ptr: i32| {
            with_guest(&mut caller, "glGetIntegerv", (), |b, mem| {
                b.get_integer_v(mem, pname as u32, ptr as u32)
            });
        },
    )?;
    Ok(())
}

fn add_shaders<T: BridgeHost>(linker: &mut Linker<T>) -> wasmtime::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        "glCreateShader",
        |mut caller: Caller<'_, T>, kind: i32| -> i32 {
            with_bridge(&mut caller, "glCreateShader", |b| b.create_shader(kind as u32)) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDeleteShader",
        |mut caller: Caller<'_, T>, shader: i32| {
            with_bridge(&mut caller, "glDeleteShader", |b| b.delete_shader(shader as u32));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glShaderSource",
        |mut caller: Caller<'_, T>, shader: i32, count: i32, strings: i32, lengths: i32| {
            with_guest(&mut caller, "glShaderSource", (), |b, mem| {
                b.shader_source(mem, shader as u32, count, strings as u32, lengths as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glCompileShader",
        |mut caller: Caller<'_, T>, shader: i32| {
            with_bridge(&mut caller, "glCompileShader", |b| b.compile_shader(shader as u32));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGetShaderiv",
        |mut caller: Caller<'_, T>, shader: i32, pname: i32, ptr: i32| {
            with_guest(&mut caller, "glGetShaderiv", (), |b, mem| {
                b.get_shader_iv(mem, shader as u32, pname as u32, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGetShaderInfoLog",
        |mut caller: Caller<'_, T>, shader: i32, buf_size: i32, length: i32, log: i32| {
            with_guest(&mut caller, "glGetShaderInfoLog", (), |b, mem| {
                b.get_shader_info_log(mem, shader as u32, buf_size, length as u32, log as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glCreateProgram",
        |mut caller: Caller<'_, T>| -> i32 {
            with_bridge(&mut caller, "glCreateProgram", |b| b.create_program()) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDeleteProgram",
        |mut caller: Caller<'_, T>, program: i32| {
            with_bridge(&mut caller, "glDeleteProgram", |b| b.delete_program(program as u32));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glAttachShader",
        |mut caller: Caller<'_, T>, program: i32, shader: i32| {
            with_bridge(&mut caller, "glAttachShader", |b| {
                b.attach_shader(program as u32, shader as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDetachShader",
        |mut caller: Caller<'_, T>, program: i32, shader: i32| {
            with_bridge(&mut caller, "glDetachShader", |b| {
                b.detach_shader(program as u32, shader as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBindAttribLocation",
        |mut caller: Caller<'_, T>, program: i32, index: i32, name: i32, name_len: i32| {
            with_guest(&mut caller, "glBindAttribLocation", (), |b, mem| {
                b.bind_attrib_location(mem, program as u32, index as u32, name as u32, name_len as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glLinkProgram",
        |mut caller: Caller<'_, T>, program: i32| {
            with_bridge(&mut caller, "glLinkProgram", |b| b.link_program(program as u32));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGetProgramiv",
        |mut caller: Caller<'_, T>, program: i32, pname: i32, ptr: i32| {
            with_guest(&mut caller, "glGetProgramiv", (), |b, mem| {
                b.get_program_iv(mem, program as u32, pname as u32, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGetProgramInfoLog",
        |mut caller: Caller<'_, T>, program: i32, buf_size: i32, length: i32, log: i32| {
            with_guest(&mut caller, "glGetProgramInfoLog", (), |b, mem| {
                b.get_program_info_log(mem, program as u32, buf_size, length as u32, log as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGetAttribLocation",
        |mut caller: Caller<'_, T>, program: i32, name: i32| -> i32 {
            with_guest(&mut caller, "glGetAttribLocation", -1, |b, mem| {
                b.get_attrib_location(mem, program as u32, name as u32)
            })
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGetUniformLocation",
        |mut caller: Caller<'_, T>, program: i32, name: i32| -> i32 {
            with_guest(&mut caller, "glGetUniformLocation", 0, |b, mem| {
                b.get_uniform_location(mem, program as u32, name as u32)
            }) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUseProgram",
        |mut caller: Caller<'_, T>, program: i32| {
            with_bridge(&mut caller, "glUseProgram", |b| b.use_program(program as u32));
        },
    )?;
    Ok(())
}

fn add_uniforms<T: BridgeHost>(linker: &mut Linker<T>) -> wasmtime::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniform1i",
        |mut caller: Caller<'_, T>, loc: i32, x: i32| {
            with_bridge(&mut caller, "glUniform1i", |b| b.uniform_1i(loc as u32, x));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniform1f",
        |mut caller: Caller<'_, T>, loc: i32, x: f32| {
            with_bridge(&mut caller, "glUniform1f", |b| b.uniform_1f(loc as u32, x));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniform2f",
        |mut caller: Caller<'_, T>, loc: i32, x: f32, y: f32| {
            with_bridge(&mut caller, "glUniform2f", |b| b.uniform_2f(loc as u32, x, y));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniform3f",
        |mut caller: Caller<'_, T>, loc: i32, x: f32, y: f32, z: f32| {
            with_bridge(&mut caller, "glUniform3f", |b| b.uniform_3f(loc as u32, x, y, z));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniform4f",
        |mut caller: Caller<'_, T>, loc: i32, x: f32, y: f32, z: f32, w: f32| {
            with_bridge(&mut caller, "glUniform4f", |b| b.uniform_4f(loc as u32, x, y, z, w));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniform1fv",
        |mut caller: Caller<'_, T>, loc: i32, count: i32, ptr: i32| {
            with_guest(&mut caller, "glUniform1fv", (), |b, mem| {
                b.uniform_1fv(mem, loc as u32, count, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniform2fv",
        |mut caller: Caller<'_, T>, loc: i32, count: i32, ptr: i32| {
            with_guest(&mut caller, "glUniform2fv", (), |b, mem| {
                b.uniform_2fv(mem, loc as u32, count, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniform3fv",
        |mut caller: Caller<'_, T>, loc: i32, count: i32, ptr: i32| {
            with_guest(&mut caller, "glUniform3fv", (), |b, mem| {
                b.uniform_3fv(mem, loc as u32, count, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniform4fv",
        |mut caller: Caller<'_, T>, loc: i32, count: i32, ptr: i32| {
            with_guest(&mut caller, "glUniform4fv", (), |b, mem| {
                b.uniform_4fv(mem, loc as u32, count, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniformMatrix3fv",
        |mut caller: Caller<'_, T>, loc: i32, count: i32, transpose: i32, ptr: i32| {
            with_guest(&mut caller, "glUniformMatrix3fv", (), |b, mem| {
                b.uniform_matrix_3fv(mem, loc as u32, count, transpose != 0, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glUniformMatrix4fv",
        |mut caller: Caller<'_, T>, loc: i32, count: i32, transpose: i32, ptr: i32| {
            with_guest(&mut caller, "glUniformMatrix4fv", (), |b, mem| {
                b.uniform_matrix_4fv(mem, loc as u32, count, transpose != 0, ptr as u32)
            });
        },
    )?;
    Ok(())
}

fn add_buffers<T: BridgeHost>(linker: &mut Linker<T>) -> wasmtime::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        "glCreateBuffer",
        |mut caller: Caller<'_, T>| -> i32 {
            with_bridge(&mut caller, "glCreateBuffer", |b| b.create_buffer()) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGenBuffers",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glGenBuffers", (), |b, mem| b.gen_buffers(mem, n, ptr as u32));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDeleteBuffer",
        |mut caller: Caller<'_, T>, buffer: i32| {
            with_bridge(&mut caller, "glDeleteBuffer", |b| b.delete_buffer(buffer as u32));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDeleteBuffers",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glDeleteBuffers", (), |b, mem| {
                b.delete_buffers(mem, n, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBindBuffer",
        |mut caller: Caller<'_, T>, target: i32, buffer: i32| {
            with_bridge(&mut caller, "glBindBuffer", |b| {
                b.bind_buffer(target as u32, buffer as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBufferData",
        |mut caller: Caller<'_, T>, target: i32, size: i32, ptr: i32, usage: i32| {
            with_guest(&mut caller, "glBufferData", (), |b, mem| {
                b.buffer_data(mem, target as u32, size, ptr as u32, usage as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBufferSubData",
        |mut caller: Caller<'_, T>, target: i32, offset: i32, size: i32, ptr: i32| {
            with_guest(&mut caller, "glBufferSubData", (), |b, mem| {
                b.buffer_sub_data(mem, target as u32, offset, size, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glEnableVertexAttribArray",
        |mut caller: Caller<'_, T>, index: i32| {
            bridge(&mut caller).enable_vertex_attrib_array(index as u32);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDisableVertexAttribArray",
        |mut caller: Caller<'_, T>, index: i32| {
            bridge(&mut caller).disable_vertex_attrib_array(index as u32);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glVertexAttribPointer",
        |mut caller: Caller<'_, T>,
         index: i32,
         size: i32,
         ty: i32,
         normalized: i32,
         stride: i32,
         offset: i32| {
            bridge(&mut caller).vertex_attrib_pointer(
                index as u32,
                size,
                ty as u32,
                normalized != 0,
                stride,
                offset,
            );
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glVertexAttribDivisor",
        |mut caller: Caller<'_, T>, index: i32, divisor: i32| {
            bridge(&mut caller).vertex_attrib_divisor(index as u32, divisor as u32);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDrawArrays",
        |mut caller: Caller<'_, T>, mode: i32, first: i32, count: i32| {
            bridge(&mut caller).draw_arrays(mode as u32, first, count);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDrawElements",
        |mut caller: Caller<'_, T>, mode: i32, count: i32, ty: i32, offset: i32| {
            bridge(&mut caller).draw_elements(mode as u32, count, ty as u32, offset);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDrawElementsInstanced",
        |mut caller: Caller<'_, T>, mode: i32, count: i32, ty: i32, offset: i32, instances: i32| {
            bridge(&mut caller).draw_elements_instanced(
                mode as u32,
                count,
                ty as u32,
                offset,
                instances,
            );
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glCreateVertexArray",
        |mut caller: Caller<'_, T>| -> i32 {
            with_bridge(&mut caller, "glCreateVertexArray", |b| b.create_vertex_array()) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGenVertexArrays",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glGenVertexArrays", (), |b, mem| {
                b.gen_vertex_arrays(mem, n, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDeleteVertexArrays",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glDeleteVertexArrays", (), |b, mem| {
                b.delete_vertex_arrays(mem, n, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBindVertexArray",
        |mut caller: Caller<'_, T>, vertex_array: i32| {
            with_bridge(&mut caller, "glBindVertexArray", |b| {
                b.bind_vertex_array(vertex_array as u32)
            });
        },
    )?;
    Ok(())
}

fn add_textures<T: BridgeHost>(linker: &mut Linker<T>) -> wasmtime::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        "glCreateTexture",
        |mut caller: Caller<'_, T>| -> i32 {
            with_bridge(&mut caller, "glCreateTexture", |b| b.create_texture()) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGenTextures",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glGenTextures", (), |b, mem| {
                b.gen_textures(mem, n, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDeleteTextures",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glDeleteTextures", (), |b, mem| {
                b.delete_textures(mem, n, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBindTexture",
        |mut caller: Caller<'_, T>, target: i32, texture: i32| {
            with_bridge(&mut caller, "glBindTexture", |b| {
                b.bind_texture(target as u32, texture as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glTexImage2D",
        |mut caller: Caller<'_, T>,
         target: i32,
         level: i32,
         internal_format: i32,
         width: i32,
         height: i32,
         border: i32,
         format: i32,
         ty: i32,
         ptr: i32| {
            with_guest(&mut caller, "glTexImage2D", (), |b, mem| {
                b.tex_image_2d(
                    mem,
                    target as u32,
                    level,
                    internal_format,
                    width,
                    height,
                    border,
                    format as u32,
                    ty as u32,
                    ptr as u32,
                )
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glTexSubImage2D",
        |mut caller: Caller<'_, T>,
         target: i32,
         level: i32,
         x: i32,
         y: i32,
         width: i32,
         height: i32,
         format: i32,
         ty: i32,
         ptr: i32| {
            with_guest(&mut caller, "glTexSubImage2D", (), |b, mem| {
                b.tex_sub_image_2d(
                    mem,
                    target as u32,
                    level,
                    x,
                    y,
                    width,
                    height,
                    format as u32,
                    ty as u32,
                    ptr as u32,
                )
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glTexParameteri",
        |mut caller: Caller<'_, T>, target: i32, pname: i32, param: i32| {
            bridge(&mut caller).tex_parameter_i32(target as u32, pname as u32, param);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGenerateMipmap",
        |mut caller: Caller<'_, T>, target: i32| {
            bridge(&mut caller).generate_mipmap(target as u32);
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glLoadTexture",
        |mut caller: Caller<'_, T>, url: i32, url_len: i32| -> i32 {
            with_guest(&mut caller, "glLoadTexture", 0, |b, mem| {
                b.load_texture(mem, url as u32, url_len as u32)
            }) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "jsLoadTextureIMG",
        |mut caller: Caller<'_, T>,
         data: i32,
         data_len: i32,
         mime: i32,
         mime_len: i32,
         width_ptr: i32,
         height_ptr: i32,
         min_filter: i32,
         mag_filter: i32,
         wrap_s: i32,
         wrap_t: i32|
         -> i32 {
            let sampler = SamplerParams {
                min_filter: min_filter as u32,
                mag_filter: mag_filter as u32,
                wrap_s: wrap_s as u32,
                wrap_t: wrap_t as u32,
            };
            with_guest(&mut caller, "jsLoadTextureIMG", 0, |b, mem| {
                b.load_texture_image(
                    mem,
                    data as u32,
                    data_len as u32,
                    mime as u32,
                    mime_len as u32,
                    width_ptr as u32,
                    height_ptr as u32,
                    sampler,
                )
            }) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glReadPixels",
        |mut caller: Caller<'_, T>,
         x: i32,
         y: i32,
         width: i32,
         height: i32,
         format: i32,
         ty: i32,
         ptr: i32| {
            with_guest(&mut caller, "glReadPixels", (), |b, mem| {
                b.read_pixels(mem, x, y, width, height, format as u32, ty as u32, ptr as u32)
            });
        },
    )?;
    Ok(())
}

fn add_framebuffers<T: BridgeHost>(linker: &mut Linker<T>) -> wasmtime::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        "glCreateFramebuffer",
        |mut caller: Caller<'_, T>| -> i32 {
            with_bridge(&mut caller, "glCreateFramebuffer", |b| b.create_framebuffer()) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGenFramebuffers",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glGenFramebuffers", (), |b, mem| {
                b.gen_framebuffers(mem, n, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDeleteFramebuffer",
        |mut caller: Caller<'_, T>, framebuffer: i32| {
            with_bridge(&mut caller, "glDeleteFramebuffer", |b| {
                b.delete_framebuffer(framebuffer as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDeleteFramebuffers",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glDeleteFramebuffers", (), |b, mem| {
                b.delete_framebuffers(mem, n, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBindFramebuffer",
        |mut caller: Caller<'_, T>, target: i32, framebuffer: i32| {
            with_bridge(&mut caller, "glBindFramebuffer", |b| {
                b.bind_framebuffer(target as u32, framebuffer as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glCheckFramebufferStatus",
        |mut caller: Caller<'_, T>, target: i32| -> i32 {
            bridge(&mut caller).check_framebuffer_status(target as u32) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glFramebufferTexture2D",
        |mut caller: Caller<'_, T>,
         target: i32,
         attachment: i32,
         texture_target: i32,
         texture: i32,
         level: i32| {
            with_bridge(&mut caller, "glFramebufferTexture2D", |b| {
                b.framebuffer_texture_2d(
                    target as u32,
                    attachment as u32,
                    texture_target as u32,
                    texture as u32,
                    level,
                )
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glFramebufferRenderbuffer",
        |mut caller: Caller<'_, T>,
         target: i32,
         attachment: i32,
         renderbuffer_target: i32,
         renderbuffer: i32| {
            with_bridge(&mut caller, "glFramebufferRenderbuffer", |b| {
                b.framebuffer_renderbuffer(
                    target as u32,
                    attachment as u32,
                    renderbuffer_target as u32,
                    renderbuffer as u32,
                )
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBlitFramebuffer",
        |mut caller: Caller<'_, T>,
         src_x0: i32,
         src_y0: i32,
         src_x1: i32,
         src_y1: i32,
         dst_x0: i32,
         dst_y0: i32,
         dst_x1: i32,
         dst_y1: i32,
         mask: i32,
         filter: i32| {
            bridge(&mut caller).blit_framebuffer(
                [src_x0, src_y0, src_x1, src_y1],
                [dst_x0, dst_y0, dst_x1, dst_y1],
                mask as u32,
                filter as u32,
            );
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDrawBuffers",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glDrawBuffers", (), |b, mem| b.draw_buffers(mem, n, ptr as u32));
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glCreateRenderbuffer",
        |mut caller: Caller<'_, T>| -> i32 {
            with_bridge(&mut caller, "glCreateRenderbuffer", |b| b.create_renderbuffer()) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glGenRenderbuffers",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glGenRenderbuffers", (), |b, mem| {
                b.gen_renderbuffers(mem, n, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDeleteRenderbuffer",
        |mut caller: Caller<'_, T>, renderbuffer: i32| {
            with_bridge(&mut caller, "glDeleteRenderbuffer", |b| {
                b.delete_renderbuffer(renderbuffer as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glDeleteRenderbuffers",
        |mut caller: Caller<'_, T>, n: i32, ptr: i32| {
            with_guest(&mut caller, "glDeleteRenderbuffers", (), |b, mem| {
                b.delete_renderbuffers(mem, n, ptr as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glBindRenderbuffer",
        |mut caller: Caller<'_, T>, target: i32, renderbuffer: i32| {
            with_bridge(&mut caller, "glBindRenderbuffer", |b| {
                b.bind_renderbuffer(target as u32, renderbuffer as u32)
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glRenderbufferStorage",
        |mut caller: Caller<'_, T>, target: i32, internal_format: i32, width: i32, height: i32| {
            bridge(&mut caller).renderbuffer_storage(
                target as u32,
                internal_format as u32,
                width,
                height,
            );
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "glRenderbufferStorageMultisample",
        |mut caller: Caller<'_, T>,
         target: i32,
         samples: i32,
         internal_format: i32,
         width: i32,
         height: i32| {
            bridge(&mut caller).renderbuffer_storage_multisample(
                target as u32,
                samples,
                internal_format as u32,
                width,
                height,
            );
        },
    )?;
    Ok(())
}

fn add_platform<T: BridgeHost>(linker: &mut Linker<T>) -> wasmtime::Result<()> {
    linker.func_wrap(
        IMPORT_MODULE,
        "wasm_performance_now",
        |mut caller: Caller<'_, T>| -> f64 { bridge(&mut caller).platform().now_ms() },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "wasm_log_write",
        |mut caller: Caller<'_, T>, ptr: i32, len: i32| {
            text(&mut caller, "wasm_log_write", ptr, len, |b, text| {
                b.platform_mut().log_write(text);
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "wasm_log_flush",
        |mut caller: Caller<'_, T>| bridge(&mut caller).platform_mut().log_flush(),
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "wasm_set_cursor",
        |mut caller: Caller<'_, T>, ptr: i32, len: i32| {
            text(&mut caller, "wasm_set_cursor", ptr, len, |b, text| {
                b.platform_mut().set_cursor(text);
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "wasm_open_link",
        |mut caller: Caller<'_, T>, ptr: i32, len: i32| {
            text(&mut caller, "wasm_open_link", ptr, len, |b, text| {
                b.platform_mut().open_link(text);
            });
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "wasm_key_down",
        |mut caller: Caller<'_, T>, key: i32| -> i32 {
            bridge(&mut caller).platform().key_down(key as u32) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "wasm_button_down",
        |mut caller: Caller<'_, T>, gamepad: i32, button: i32| -> i32 {
            bridge(&mut caller)
                .platform()
                .button_down(gamepad as u32, button as u32) as i32
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "wasm_stick_x",
        |mut caller: Caller<'_, T>, gamepad: i32, stick: i32| -> f32 {
            bridge(&mut caller).platform().stick_x(gamepad as u32, stick as u32)
        },
    )?;
    linker.func_wrap(
        IMPORT_MODULE,
        "wasm_stick_y",
        |mut caller: Caller<'_, T>, gamepad: i32, stick: i32| -> f32 {
            bridge(&mut caller).platform().stick_y(gamepad as u32, stick as u32)
        },
    )?;
    Ok(())
}

/// Apply finished texture loads against the guest's current memory.
///
/// Call between frames, outside any guest export.
pub fn pump_completions<T: BridgeHost>(store: &mut wasmtime::Store<T>, memory: wasmtime::Memory) -> usize {
    let (bytes, data) = memory.data_and_store_mut(store);
    let mut mem = GuestMemory::new(bytes);
    data.bridge().pump_completions(&mut mem)
}

/// Block up to `timeout` for outstanding loads, applying them as they finish.
pub fn drain_completions<T: BridgeHost>(
    store: &mut wasmtime::Store<T>,
    memory: wasmtime::Memory,
    timeout: std::time::Duration,
) -> usize {
    let (bytes, data) = memory.data_and_store_mut(store);
    let mut mem = GuestMemory::new(bytes);
    data.bridge().drain_completions(&mut mem, timeout)
}

#[cfg(test)]
mod tests {
    use wasmtime::{Engine, Store};

    use super::*;
    use crate::test_util;

    #[test]
    fn imports_are_registered_under_env() {
        let engine = Engine::default();
        let mut linker = Linker::new(&engine);
        add_to_linker(&mut linker).unwrap();

        let mut store = Store::new(&engine, test_util::bridge());
        for name in ["glCreateShader", "glTexImage2D", "jsLoadTextureIMG", "wasm_stick_y"] {
            assert!(
                linker.get(&mut store, IMPORT_MODULE, name).is_some(),
                "{name} missing"
            );
        }
    }
}
