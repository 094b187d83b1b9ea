//! Shaders, programs and uniforms.

use glbridge_handles::{Category, Handle};
use glbridge_mem::{read_cstr, read_sources, read_str, ElementType, GuestMemory, MemoryError};
use tracing::{debug, error};

use super::{non_negative, required, Bridge, BridgeError};
use crate::consts::{COMPILE_STATUS, LINK_STATUS};
use crate::host::GlHost;

/// Copy an info log into a guest buffer of `buf_size` bytes, NUL-terminated and truncated.
///
/// Writes nothing into the buffer when `buf_size <= 0` or the pointer is null; stores the number
/// of bytes written (excluding the NUL) at `length_ptr` when that is non-null.
pub(crate) fn write_info_log(
    mem: &mut GuestMemory<'_>,
    log: &str,
    buf_size: i32,
    length_ptr: u32,
    info_log_ptr: u32,
) -> Result<(), BridgeError> {
    let capacity = usize::try_from(buf_size).unwrap_or(0);
    let mut written = 0;
    if capacity > 0 && info_log_ptr != 0 {
        written = log.len().min(capacity - 1);
        let mut bytes = Vec::with_capacity(written + 1);
        bytes.extend_from_slice(&log.as_bytes()[..written]);
        bytes.push(0);
        mem.write_bytes(info_log_ptr, &bytes)?;
    }
    if length_ptr != 0 {
        mem.write_i32(length_ptr, written as i32)?;
    }
    Ok(())
}

impl<H: GlHost> Bridge<H> {
    pub fn create_shader(&mut self, kind: u32) -> Result<Handle, BridgeError> {
        let shader = self.ctx.host_mut().create_shader(kind)?;
        Ok(self.shaders.allocate(shader)?)
    }

    pub fn delete_shader(&mut self, handle: Handle) -> Result<(), BridgeError> {
        if let Some(shader) = self.shaders.release(handle)? {
            self.ctx.host_mut().delete_shader(shader);
        }
        Ok(())
    }

    /// `glShaderSource`: join `count` fragments (each followed by a newline) into one source.
    pub fn shader_source(
        &mut self,
        mem: &GuestMemory<'_>,
        handle: Handle,
        count: i32,
        strings_ptr: u32,
        lengths_ptr: u32,
    ) -> Result<(), BridgeError> {
        let count = non_negative("fragment count", count)?;
        let shader = required(self.shaders.resolve(handle)?, Category::Shader)?;
        let source = read_sources(mem, count, strings_ptr, lengths_ptr)?;
        self.ctx.host_mut().shader_source(shader, &source);
        Ok(())
    }

    pub fn compile_shader(&mut self, handle: Handle) -> Result<(), BridgeError> {
        let shader = required(self.shaders.resolve(handle)?, Category::Shader)?;
        let host = self.ctx.host_mut();
        host.compile_shader(shader);
        if host.get_shader_parameter(shader, COMPILE_STATUS) == 0 {
            let log = host.get_shader_info_log(shader);
            debug!(shader = handle, %log, "shader failed to compile");
        }
        Ok(())
    }

    pub fn get_shader_iv(
        &mut self,
        mem: &mut GuestMemory<'_>,
        handle: Handle,
        pname: u32,
        params_ptr: u32,
    ) -> Result<(), BridgeError> {
        let shader = required(self.shaders.resolve(handle)?, Category::Shader)?;
        let value = self.ctx.host_mut().get_shader_parameter(shader, pname);
        if let Some(mut out) = mem.view_mut(params_ptr, 1, ElementType::U32)? {
            out.set_i32(0, value);
        }
        Ok(())
    }

    pub fn get_shader_info_log(
        &mut self,
        mem: &mut GuestMemory<'_>,
        handle: Handle,
        buf_size: i32,
        length_ptr: u32,
        info_log_ptr: u32,
    ) -> Result<(), BridgeError> {
        let shader = required(self.shaders.resolve(handle)?, Category::Shader)?;
        let log = self.ctx.host_mut().get_shader_info_log(shader);
        if !log.is_empty() {
            debug!(shader = handle, %log, "shader info log");
        }
        write_info_log(mem, &log, buf_size, length_ptr, info_log_ptr)
    }

    pub fn create_program(&mut self) -> Result<Handle, BridgeError> {
        let program = self.ctx.host_mut().create_program()?;
        Ok(self.programs.allocate(program)?)
    }

    pub fn delete_program(&mut self, handle: Handle) -> Result<(), BridgeError> {
        if let Some(program) = self.programs.release(handle)? {
            self.ctx.host_mut().delete_program(program);
            self.forget_uniforms(handle);
        }
        Ok(())
    }

    /// Release every uniform handle issued for `program`.
    fn forget_uniforms(&mut self, program: Handle) {
        let mut stale = Vec::new();
        self.uniform_names.retain(|(owner, _), uniform| {
            if *owner == program {
                stale.push(*uniform);
                false
            } else {
                true
            }
        });
        for uniform in stale {
            if let Err(err) = self.uniforms.release(uniform) {
                debug!(program, uniform, error = %err, "uniform handle already gone");
            }
        }
    }

    pub fn attach_shader(&mut self, program: Handle, shader: Handle) -> Result<(), BridgeError> {
        let program = required(self.programs.resolve(program)?, Category::Program)?;
        let shader = required(self.shaders.resolve(shader)?, Category::Shader)?;
        self.ctx.host_mut().attach_shader(program, shader);
        Ok(())
    }

    pub fn detach_shader(&mut self, program: Handle, shader: Handle) -> Result<(), BridgeError> {
        let program = required(self.programs.resolve(program)?, Category::Program)?;
        let shader = required(self.shaders.resolve(shader)?, Category::Shader)?;
        self.ctx.host_mut().detach_shader(program, shader);
        Ok(())
    }

    /// `glBindAttribLocation` with a length-prefixed name.
    pub fn bind_attrib_location(
        &mut self,
        mem: &GuestMemory<'_>,
        program: Handle,
        index: u32,
        name_ptr: u32,
        name_len: u32,
    ) -> Result<(), BridgeError> {
        let program = required(self.programs.resolve(program)?, Category::Program)?;
        let name = read_str(mem, name_ptr, name_len)?;
        self.ctx.host_mut().bind_attrib_location(program, index, &name);
        Ok(())
    }

    /// Link `handle`. A failed link is logged with the host's diagnostics and otherwise left for
    /// the guest to discover through `glGetProgramiv` / `glGetProgramInfoLog`.
    ///
    /// Uniform handles issued before the link refer to the previous link and are released.
    pub fn link_program(&mut self, handle: Handle) -> Result<(), BridgeError> {
        let program = required(self.programs.resolve(handle)?, Category::Program)?;
        let host = self.ctx.host_mut();
        host.link_program(program);
        if host.get_program_parameter(program, LINK_STATUS) == 0 {
            let log = host.get_program_info_log(program);
            error!(program = handle, %log, "error linking program");
        }
        self.forget_uniforms(handle);
        Ok(())
    }

    pub fn get_program_iv(
        &mut self,
        mem: &mut GuestMemory<'_>,
        handle: Handle,
        pname: u32,
        params_ptr: u32,
    ) -> Result<(), BridgeError> {
        let program = required(self.programs.resolve(handle)?, Category::Program)?;
        let value = self.ctx.host_mut().get_program_parameter(program, pname);
        if let Some(mut out) = mem.view_mut(params_ptr, 1, ElementType::U32)? {
            out.set_i32(0, value);
        }
        Ok(())
    }

    pub fn get_program_info_log(
        &mut self,
        mem: &mut GuestMemory<'_>,
        handle: Handle,
        buf_size: i32,
        length_ptr: u32,
        info_log_ptr: u32,
    ) -> Result<(), BridgeError> {
        let program = required(self.programs.resolve(handle)?, Category::Program)?;
        let log = self.ctx.host_mut().get_program_info_log(program);
        write_info_log(mem, &log, buf_size, length_ptr, info_log_ptr)
    }

    /// `glGetAttribLocation` with a NUL-terminated name. `-1` when the attribute is unknown.
    pub fn get_attrib_location(
        &mut self,
        mem: &GuestMemory<'_>,
        program: Handle,
        name_ptr: u32,
    ) -> Result<i32, BridgeError> {
        let program = required(self.programs.resolve(program)?, Category::Program)?;
        let name = read_cstr(mem, name_ptr)?;
        Ok(self.ctx.host_mut().get_attrib_location(program, &name))
    }

    /// `glGetUniformLocation` with a NUL-terminated name.
    ///
    /// Repeated lookups of one name on one program return the same handle. Unknown names get a
    /// handle too; uniform calls through it reach the host with no location and are ignored
    /// there. Handles live until the program is relinked or deleted.
    pub fn get_uniform_location(
        &mut self,
        mem: &GuestMemory<'_>,
        program: Handle,
        name_ptr: u32,
    ) -> Result<Handle, BridgeError> {
        let owner = program;
        let program = required(self.programs.resolve(owner)?, Category::Program)?;
        let key = (owner, read_cstr(mem, name_ptr)?.into_owned());
        if let Some(&uniform) = self.uniform_names.get(&key) {
            return Ok(uniform);
        }
        let location = self.ctx.host_mut().get_uniform_location(program, &key.1);
        let uniform = self.uniforms.allocate(location)?;
        self.uniform_names.insert(key, uniform);
        Ok(uniform)
    }

    pub fn use_program(&mut self, handle: Handle) -> Result<(), BridgeError> {
        let program = self.programs.resolve(handle)?;
        self.ctx.host_mut().use_program(program);
        Ok(())
    }

    pub fn uniform_1i(&mut self, location: Handle, x: i32) -> Result<(), BridgeError> {
        let location = self.uniforms.resolve(location)?.and_then(Option::as_ref);
        self.ctx.host_mut().uniform_1i(location, x);
        Ok(())
    }

    pub fn uniform_1f(&mut self, location: Handle, x: f32) -> Result<(), BridgeError> {
        let location = self.uniforms.resolve(location)?.and_then(Option::as_ref);
        self.ctx.host_mut().uniform_1f(location, x);
        Ok(())
    }

    pub fn uniform_2f(&mut self, location: Handle, x: f32, y: f32) -> Result<(), BridgeError> {
        let location = self.uniforms.resolve(location)?.and_then(Option::as_ref);
        self.ctx.host_mut().uniform_2f(location, x, y);
        Ok(())
    }

    pub fn uniform_3f(&mut self, location: Handle, x: f32, y: f32, z: f32) -> Result<(), BridgeError> {
        let location = self.uniforms.resolve(location)?.and_then(Option::as_ref);
        self.ctx.host_mut().uniform_3f(location, x, y, z);
        Ok(())
    }

    pub fn uniform_4f(
        &mut self,
        location: Handle,
        x: f32,
        y: f32,
        z: f32,
        w: f32,
    ) -> Result<(), BridgeError> {
        let location = self.uniforms.resolve(location)?.and_then(Option::as_ref);
        self.ctx.host_mut().uniform_4f(location, x, y, z, w);
        Ok(())
    }

    /// Shared body of the array uniform uploads: `count` groups of `components` floats.
    fn uniform_floats(
        &mut self,
        mem: &GuestMemory<'_>,
        location: Handle,
        count: i32,
        components: u32,
        value_ptr: u32,
        upload: impl FnOnce(&mut H, Option<&H::UniformLocation>, &[f32]),
    ) -> Result<(), BridgeError> {
        let count = non_negative("uniform count", count)?;
        let floats = count.checked_mul(components).ok_or(MemoryError::Overflow {
            ptr: value_ptr,
            count,
            width: components as usize * 4,
        })?;
        if floats == 0 {
            return Ok(());
        }
        let location = self.uniforms.resolve(location)?.and_then(Option::as_ref);
        let Some(view) = mem.view(value_ptr, floats, ElementType::F32)? else {
            return Ok(());
        };
        upload(self.ctx.host_mut(), location, &view.to_f32s());
        Ok(())
    }

    pub fn uniform_1fv(
        &mut self,
        mem: &GuestMemory<'_>,
        location: Handle,
        count: i32,
        value_ptr: u32,
    ) -> Result<(), BridgeError> {
        self.uniform_floats(mem, location, count, 1, value_ptr, |host, loc, v| {
            host.uniform_1fv(loc, v)
        })
    }

    pub fn uniform_2fv(
        &mut self,
        mem: &GuestMemory<'_>,
        location: Handle,
        count: i32,
        value_ptr: u32,
    ) -> Result<(), BridgeError> {
        self.uniform_floats(mem, location, count, 2, value_ptr, |host, loc, v| {
            host.uniform_2fv(loc, v)
        })
    }

    pub fn uniform_3fv(
        &mut self,
        mem: &GuestMemory<'_>,
        location: Handle,
        count: i32,
        value_ptr: u32,
    ) -> Result<(), BridgeError> {
        self.uniform_floats(mem, location, count, 3, value_ptr, |host, loc, v| {
            host.uniform_3fv(loc, v)
        })
    }

    pub fn uniform_4fv(
        &mut self,
        mem: &GuestMemory<'_>,
        location: Handle,
        count: i32,
        value_ptr: u32,
    ) -> Result<(), BridgeError> {
        self.uniform_floats(mem, location, count, 4, value_ptr, |host, loc, v| {
            host.uniform_4fv(loc, v)
        })
    }

    pub fn uniform_matrix_3fv(
        &mut self,
        mem: &GuestMemory<'_>,
        location: Handle,
        count: i32,
        transpose: bool,
        value_ptr: u32,
    ) -> Result<(), BridgeError> {
        self.uniform_floats(mem, location, count, 9, value_ptr, |host, loc, v| {
            host.uniform_matrix_3fv(loc, transpose, v)
        })
    }

    pub fn uniform_matrix_4fv(
        &mut self,
        mem: &GuestMemory<'_>,
        location: Handle,
        count: i32,
        transpose: bool,
        value_ptr: u32,
    ) -> Result<(), BridgeError> {
        self.uniform_floats(mem, location, count, 16, value_ptr, |host, loc, v| {
            host.uniform_matrix_4fv(loc, transpose, v)
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use glbridge_handles::HandleError;

    use super::*;
    use crate::consts::*;
    use crate::test_util::{bridge, put_cstr, put_str};

    fn shader_with_source(bridge: &mut Bridge<crate::RecordingHost>, kind: u32, source: &str) -> Handle {
        let mut buf = vec![0u8; 256];
        put_str(&mut buf, 128, source);
        buf[16..20].copy_from_slice(&128u32.to_le_bytes());
        buf[32..36].copy_from_slice(&(source.len() as u32).to_le_bytes());
        let mem = GuestMemory::new(&mut buf);

        let shader = bridge.create_shader(kind).unwrap();
        bridge.shader_source(&mem, shader, 1, 16, 32).unwrap();
        bridge.compile_shader(shader).unwrap();
        shader
    }

    #[test]
    fn info_log_is_truncated_to_buffer_size() {
        let mut buf = vec![0xEEu8; 32];
        let mut mem = GuestMemory::new(&mut buf);
        write_info_log(&mut mem, "0123456789", 4, 0, 8).unwrap();
        drop(mem);
        assert_eq!(&buf[8..12], b"012\0");
        assert_eq!(buf[12], 0xEE);
    }

    #[test]
    fn info_log_reports_written_length() {
        let mut buf = vec![0u8; 64];
        let mut mem = GuestMemory::new(&mut buf);
        write_info_log(&mut mem, "abc", 16, 4, 8).unwrap();
        assert_eq!(mem.read_u32(4).unwrap(), 3);

        write_info_log(&mut mem, "abc", 0, 4, 8).unwrap();
        assert_eq!(mem.read_u32(4).unwrap(), 0);
    }

    #[test]
    fn info_log_destination_is_bounds_checked() {
        let mut buf = vec![0u8; 16];
        let mut mem = GuestMemory::new(&mut buf);
        assert!(write_info_log(&mut mem, "a long diagnostic", 64, 0, 8).is_err());
    }

    #[test]
    fn compile_status_and_log_are_queryable() {
        let mut bridge = bridge();
        let good = shader_with_source(&mut bridge, VERTEX_SHADER, "void main() {}");
        let bad = shader_with_source(&mut bridge, FRAGMENT_SHADER, "#error nope");

        let mut buf = vec![0u8; 128];
        let mut mem = GuestMemory::new(&mut buf);
        bridge.get_shader_iv(&mut mem, good, COMPILE_STATUS, 4).unwrap();
        bridge.get_shader_iv(&mut mem, bad, COMPILE_STATUS, 8).unwrap();
        assert_eq!(mem.read_u32(4).unwrap(), 1);
        assert_eq!(mem.read_u32(8).unwrap(), 0);

        bridge.get_shader_info_log(&mut mem, bad, 64, 12, 32).unwrap();
        let len = mem.read_u32(12).unwrap();
        assert!(len > 0);
        let log = read_str(&mem, 32, len).unwrap().into_owned();
        assert!(log.contains("nope"), "{log}");
    }

    #[test]
    fn failed_link_is_reported_not_thrown() {
        let mut bridge = bridge();
        let vs = shader_with_source(&mut bridge, VERTEX_SHADER, "void main() {}");
        let program = bridge.create_program().unwrap();
        bridge.attach_shader(program, vs).unwrap();
        bridge.link_program(program).unwrap();

        let mut buf = vec![0u8; 64];
        let mut mem = GuestMemory::new(&mut buf);
        bridge.get_program_iv(&mut mem, program, LINK_STATUS, 4).unwrap();
        assert_eq!(mem.read_u32(4).unwrap(), 0);
    }

    #[test]
    fn linked_program_resolves_uniforms_and_attribs() {
        let mut bridge = bridge();
        let vs = shader_with_source(&mut bridge, VERTEX_SHADER, "attribute vec3 a_pos;");
        let fs = shader_with_source(&mut bridge, FRAGMENT_SHADER, "uniform vec4 u_color;");
        let program = bridge.create_program().unwrap();
        bridge.attach_shader(program, vs).unwrap();
        bridge.attach_shader(program, fs).unwrap();
        bridge.link_program(program).unwrap();
        bridge.use_program(program).unwrap();

        let mut buf = vec![0u8; 128];
        put_cstr(&mut buf, 16, "u_color");
        put_cstr(&mut buf, 48, "a_pos");
        put_cstr(&mut buf, 64, "missing");
        for (i, f) in [0.25f32, 0.5, 0.75, 1.0].iter().enumerate() {
            buf[80 + i * 4..84 + i * 4].copy_from_slice(&f.to_le_bytes());
        }
        let mem = GuestMemory::new(&mut buf);

        assert_eq!(bridge.get_attrib_location(&mem, program, 48).unwrap(), 0);
        assert_eq!(bridge.get_attrib_location(&mem, program, 64).unwrap(), -1);

        let color = bridge.get_uniform_location(&mem, program, 16).unwrap();
        let missing = bridge.get_uniform_location(&mem, program, 64).unwrap();
        assert_ne!(color, missing);

        bridge.uniform_4fv(&mem, color, 1, 80).unwrap();
        bridge.uniform_1f(missing, 3.0).unwrap();

        let calls = bridge.host().calls_named("uniform4fv");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args["values"], json!([0.25, 0.5, 0.75, 1.0]));
        assert_eq!(bridge.host().calls_named("uniform1f")[0].args["location"], json!(null));
    }

    #[test]
    fn uniform_handles_are_shared_and_die_with_their_program() {
        let mut bridge = bridge();
        let vs = shader_with_source(&mut bridge, VERTEX_SHADER, "void main() {}");
        let fs = shader_with_source(&mut bridge, FRAGMENT_SHADER, "uniform vec4 u_color;");
        let program = bridge.create_program().unwrap();
        bridge.attach_shader(program, vs).unwrap();
        bridge.attach_shader(program, fs).unwrap();
        bridge.link_program(program).unwrap();

        let mut buf = vec![0u8; 64];
        put_cstr(&mut buf, 16, "u_color");
        let mem = GuestMemory::new(&mut buf);
        let first = bridge.get_uniform_location(&mem, program, 16).unwrap();
        for _ in 0..100 {
            assert_eq!(bridge.get_uniform_location(&mem, program, 16).unwrap(), first);
        }
        assert_eq!(bridge.live_count(Category::UniformLocation), 1);

        bridge.delete_program(program).unwrap();
        assert_eq!(bridge.live_count(Category::UniformLocation), 0);
        assert!(matches!(
            bridge.uniform_1f(first, 1.0),
            Err(BridgeError::Handle(HandleError::Released {
                category: Category::UniformLocation,
                ..
            }))
        ));
        assert!(bridge.host().calls_named("uniform1f").is_empty());
    }

    #[test]
    fn relink_reissues_uniform_handles() {
        let mut bridge = bridge();
        let vs = shader_with_source(&mut bridge, VERTEX_SHADER, "uniform float u_time;");
        let fs = shader_with_source(&mut bridge, FRAGMENT_SHADER, "void main() {}");
        let program = bridge.create_program().unwrap();
        bridge.attach_shader(program, vs).unwrap();
        bridge.attach_shader(program, fs).unwrap();

        let mut buf = vec![0u8; 64];
        put_cstr(&mut buf, 16, "u_time");
        let mem = GuestMemory::new(&mut buf);
        // Looked up before linking: no location yet.
        let early = bridge.get_uniform_location(&mem, program, 16).unwrap();
        bridge.link_program(program).unwrap();
        assert!(bridge.uniform_1f(early, 0.5).is_err());

        let linked = bridge.get_uniform_location(&mem, program, 16).unwrap();
        bridge.uniform_1f(linked, 0.5).unwrap();
        let calls = bridge.host().calls_named("uniform1f");
        assert_eq!(calls.len(), 1);
        assert_ne!(calls[0].args["location"], json!(null));
    }

    #[test]
    fn matrix_upload_reads_count_times_sixteen_floats() {
        let mut bridge = bridge();
        let vs = shader_with_source(&mut bridge, VERTEX_SHADER, "uniform mat4 u_mvp;");
        let fs = shader_with_source(&mut bridge, FRAGMENT_SHADER, "void main() {}");
        let program = bridge.create_program().unwrap();
        bridge.attach_shader(program, vs).unwrap();
        bridge.attach_shader(program, fs).unwrap();
        bridge.link_program(program).unwrap();

        let mut buf = vec![0u8; 256];
        put_cstr(&mut buf, 8, "u_mvp");
        let mem = GuestMemory::new(&mut buf);
        let mvp = bridge.get_uniform_location(&mem, program, 8).unwrap();

        bridge.uniform_matrix_4fv(&mem, mvp, 2, false, 64).unwrap();
        let calls = bridge.host().calls_named("uniformMatrix4fv");
        assert_eq!(calls[0].args["values"].as_array().map(Vec::len), Some(32));

        // 4 matrices would run past the end of memory.
        assert!(bridge.uniform_matrix_4fv(&mem, mvp, 4, false, 64).is_err());
        assert_eq!(bridge.host().calls_named("uniformMatrix4fv").len(), 1);
    }

    #[test]
    fn attach_requires_real_objects() {
        let mut bridge = bridge();
        let program = bridge.create_program().unwrap();
        assert!(matches!(
            bridge.attach_shader(program, 0),
            Err(BridgeError::NullHandle {
                category: Category::Shader
            })
        ));
        assert!(bridge.attach_shader(program, 7).is_err());
        assert!(bridge.host().calls_named("attachShader").is_empty());
    }

    #[test]
    fn bind_attrib_location_uses_length_prefixed_name() {
        let mut bridge = bridge();
        let program = bridge.create_program().unwrap();
        let mut buf = vec![0u8; 32];
        put_str(&mut buf, 4, "a_uvXYZ");
        let mem = GuestMemory::new(&mut buf);
        bridge.bind_attrib_location(&mem, program, 2, 4, 4).unwrap();
        let calls = bridge.host().calls_named("bindAttribLocation");
        assert_eq!(calls[0].args["name"], json!("a_uv"));
        assert_eq!(calls[0].args["index"], json!(2));
    }
}
