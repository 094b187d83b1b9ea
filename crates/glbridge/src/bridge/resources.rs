//! Buffers, textures, vertex arrays, framebuffers and renderbuffers.

use glbridge_handles::Handle;
use glbridge_mem::{ElementType, GuestMemory};

use super::{gen_into, non_negative, read_handles, Bridge, BridgeError};
use crate::host::GlHost;
use crate::pixels;

impl<H: GlHost> Bridge<H> {
    pub fn create_buffer(&mut self) -> Result<Handle, BridgeError> {
        let buffer = self.ctx.host_mut().create_buffer()?;
        Ok(self.buffers.allocate(buffer)?)
    }

    pub fn gen_buffers(&mut self, mem: &mut GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        gen_into(mem, n, ptr, || self.create_buffer())
    }

    pub fn delete_buffer(&mut self, handle: Handle) -> Result<(), BridgeError> {
        if let Some(buffer) = self.buffers.release(handle)? {
            self.ctx.host_mut().delete_buffer(buffer);
        }
        Ok(())
    }

    pub fn delete_buffers(&mut self, mem: &GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        for handle in read_handles(mem, n, ptr)? {
            let result = self.delete_buffer(handle);
            self.note_batch_release("glDeleteBuffers", result);
        }
        Ok(())
    }

    pub fn bind_buffer(&mut self, target: u32, handle: Handle) -> Result<(), BridgeError> {
        let buffer = self.buffers.resolve(handle)?;
        self.ctx.host_mut().bind_buffer(target, buffer);
        Ok(())
    }

    /// `glBufferData`. A null pointer sizes the store without uploading; size 0 does nothing.
    pub fn buffer_data(
        &mut self,
        mem: &GuestMemory<'_>,
        target: u32,
        size: i32,
        data_ptr: u32,
        usage: u32,
    ) -> Result<(), BridgeError> {
        let len = non_negative("buffer size", size)?;
        if len == 0 {
            return Ok(());
        }
        match mem.view(data_ptr, len, ElementType::U8)? {
            Some(data) => self.ctx.host_mut().buffer_data(target, data.as_bytes(), usage),
            None => self.ctx.host_mut().buffer_data_size(target, size, usage),
        }
        Ok(())
    }

    pub fn buffer_sub_data(
        &mut self,
        mem: &GuestMemory<'_>,
        target: u32,
        offset: i32,
        size: i32,
        data_ptr: u32,
    ) -> Result<(), BridgeError> {
        non_negative("buffer offset", offset)?;
        let len = non_negative("buffer size", size)?;
        if len == 0 {
            return Ok(());
        }
        if let Some(data) = mem.view(data_ptr, len, ElementType::U8)? {
            self.ctx.host_mut().buffer_sub_data(target, offset, data.as_bytes());
        }
        Ok(())
    }

    pub fn enable_vertex_attrib_array(&mut self, index: u32) {
        self.ctx.host_mut().enable_vertex_attrib_array(index);
    }

    pub fn disable_vertex_attrib_array(&mut self, index: u32) {
        self.ctx.host_mut().disable_vertex_attrib_array(index);
    }

    pub fn vertex_attrib_pointer(
        &mut self,
        index: u32,
        size: i32,
        ty: u32,
        normalized: bool,
        stride: i32,
        offset: i32,
    ) {
        self.ctx
            .host_mut()
            .vertex_attrib_pointer(index, size, ty, normalized, stride, offset);
    }

    pub fn vertex_attrib_divisor(&mut self, index: u32, divisor: u32) {
        self.ctx.host_mut().vertex_attrib_divisor(index, divisor);
    }

    pub fn draw_arrays(&mut self, mode: u32, first: i32, count: i32) {
        self.ctx.host_mut().draw_arrays(mode, first, count);
    }

    pub fn draw_elements(&mut self, mode: u32, count: i32, ty: u32, offset: i32) {
        self.ctx.host_mut().draw_elements(mode, count, ty, offset);
    }

    pub fn draw_elements_instanced(
        &mut self,
        mode: u32,
        count: i32,
        ty: u32,
        offset: i32,
        instances: i32,
    ) {
        self.ctx
            .host_mut()
            .draw_elements_instanced(mode, count, ty, offset, instances);
    }

    pub fn create_texture(&mut self) -> Result<Handle, BridgeError> {
        let texture = self.ctx.host_mut().create_texture()?;
        Ok(self.textures.allocate(texture)?)
    }

    pub fn gen_textures(&mut self, mem: &mut GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        gen_into(mem, n, ptr, || self.create_texture())
    }

    pub fn delete_texture(&mut self, handle: Handle) -> Result<(), BridgeError> {
        if let Some(texture) = self.textures.release(handle)? {
            self.ctx.host_mut().delete_texture(texture);
        }
        Ok(())
    }

    pub fn delete_textures(&mut self, mem: &GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        for handle in read_handles(mem, n, ptr)? {
            let result = self.delete_texture(handle);
            self.note_batch_release("glDeleteTextures", result);
        }
        Ok(())
    }

    pub fn bind_texture(&mut self, target: u32, handle: Handle) -> Result<(), BridgeError> {
        let texture = self.textures.resolve(handle)?;
        self.ctx.host_mut().bind_texture(target, texture);
        Ok(())
    }

    /// Byte length and element type of a client pixel rectangle.
    fn pixel_region(
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        alignment: u32,
    ) -> Result<(u32, ElementType), BridgeError> {
        let element = ElementType::for_pixel_type(ty).ok_or(BridgeError::UnsupportedPixelType(ty))?;
        let bpp = pixels::bytes_per_pixel(format, ty)
            .ok_or(BridgeError::UnsupportedPixelFormat { format, ty })?;
        let w = non_negative("width", width)?;
        let h = non_negative("height", height)?;
        let len = pixels::image_byte_len(w, h, bpp, alignment)
            .and_then(|len| u32::try_from(len).ok())
            .ok_or(BridgeError::ImageTooLarge { width, height })?;
        Ok((len, element))
    }

    /// Resolve the upload source for a texture call.
    ///
    /// The data is viewed with the element type `ty` implies and must cover the whole rectangle;
    /// a null pointer or an empty rectangle uploads nothing.
    fn unpack_source<'m>(
        &self,
        mem: &'m GuestMemory<'_>,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        data_ptr: u32,
    ) -> Result<Option<&'m [u8]>, BridgeError> {
        let (len, element) =
            Self::pixel_region(width, height, format, ty, self.pixel_store.unpack_alignment)?;
        if len == 0 {
            return Ok(None);
        }
        let count = len.div_ceil(element.byte_width() as u32);
        Ok(mem.view(data_ptr, count, element)?.map(|view| view.as_bytes()))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn tex_image_2d(
        &mut self,
        mem: &GuestMemory<'_>,
        target: u32,
        level: i32,
        internal_format: i32,
        width: i32,
        height: i32,
        border: i32,
        format: u32,
        ty: u32,
        data_ptr: u32,
    ) -> Result<(), BridgeError> {
        let pixels = self.unpack_source(mem, width, height, format, ty, data_ptr)?;
        self.ctx.host_mut().tex_image_2d(
            target,
            level,
            internal_format,
            width,
            height,
            border,
            format,
            ty,
            pixels,
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn tex_sub_image_2d(
        &mut self,
        mem: &GuestMemory<'_>,
        target: u32,
        level: i32,
        x_offset: i32,
        y_offset: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        data_ptr: u32,
    ) -> Result<(), BridgeError> {
        let pixels = self.unpack_source(mem, width, height, format, ty, data_ptr)?;
        self.ctx.host_mut().tex_sub_image_2d(
            target, level, x_offset, y_offset, width, height, format, ty, pixels,
        );
        Ok(())
    }

    pub fn tex_parameter_i32(&mut self, target: u32, pname: u32, param: i32) {
        self.ctx.host_mut().tex_parameter_i32(target, pname, param);
    }

    pub fn generate_mipmap(&mut self, target: u32) {
        self.ctx.host_mut().generate_mipmap(target);
    }

    /// `glReadPixels` into guest memory, sized with the tracked `PACK_ALIGNMENT`.
    #[allow(clippy::too_many_arguments)]
    pub fn read_pixels(
        &mut self,
        mem: &mut GuestMemory<'_>,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        format: u32,
        ty: u32,
        pixels_ptr: u32,
    ) -> Result<(), BridgeError> {
        let (len, element) =
            Self::pixel_region(width, height, format, ty, self.pixel_store.pack_alignment)?;
        if len == 0 {
            return Ok(());
        }
        let count = len.div_ceil(element.byte_width() as u32);
        if let Some(mut out) = mem.view_mut(pixels_ptr, count, element)? {
            self.ctx
                .host_mut()
                .read_pixels(x, y, width, height, format, ty, out.as_bytes_mut());
        }
        Ok(())
    }

    pub fn create_vertex_array(&mut self) -> Result<Handle, BridgeError> {
        let vertex_array = self.ctx.create_vertex_array()?;
        Ok(self.vertex_arrays.allocate(vertex_array)?)
    }

    pub fn gen_vertex_arrays(&mut self, mem: &mut GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        gen_into(mem, n, ptr, || self.create_vertex_array())
    }

    pub fn delete_vertex_array(&mut self, handle: Handle) -> Result<(), BridgeError> {
        if let Some(vertex_array) = self.vertex_arrays.release(handle)? {
            self.ctx.delete_vertex_array(vertex_array);
        }
        Ok(())
    }

    pub fn delete_vertex_arrays(&mut self, mem: &GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        for handle in read_handles(mem, n, ptr)? {
            let result = self.delete_vertex_array(handle);
            self.note_batch_release("glDeleteVertexArrays", result);
        }
        Ok(())
    }

    pub fn bind_vertex_array(&mut self, handle: Handle) -> Result<(), BridgeError> {
        let vertex_array = self.vertex_arrays.resolve(handle)?;
        self.ctx.bind_vertex_array(vertex_array);
        Ok(())
    }

    pub fn create_framebuffer(&mut self) -> Result<Handle, BridgeError> {
        let framebuffer = self.ctx.host_mut().create_framebuffer()?;
        Ok(self.framebuffers.allocate(framebuffer)?)
    }

    pub fn gen_framebuffers(&mut self, mem: &mut GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        gen_into(mem, n, ptr, || self.create_framebuffer())
    }

    pub fn delete_framebuffer(&mut self, handle: Handle) -> Result<(), BridgeError> {
        if let Some(framebuffer) = self.framebuffers.release(handle)? {
            self.ctx.host_mut().delete_framebuffer(framebuffer);
        }
        Ok(())
    }

    pub fn delete_framebuffers(&mut self, mem: &GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        for handle in read_handles(mem, n, ptr)? {
            let result = self.delete_framebuffer(handle);
            self.note_batch_release("glDeleteFramebuffers", result);
        }
        Ok(())
    }

    pub fn bind_framebuffer(&mut self, target: u32, handle: Handle) -> Result<(), BridgeError> {
        let framebuffer = self.framebuffers.resolve(handle)?;
        self.ctx.host_mut().bind_framebuffer(target, framebuffer);
        Ok(())
    }

    pub fn check_framebuffer_status(&mut self, target: u32) -> u32 {
        self.ctx.host_mut().check_framebuffer_status(target)
    }

    pub fn framebuffer_texture_2d(
        &mut self,
        target: u32,
        attachment: u32,
        texture_target: u32,
        texture: Handle,
        level: i32,
    ) -> Result<(), BridgeError> {
        let texture = self.textures.resolve(texture)?;
        self.ctx
            .host_mut()
            .framebuffer_texture_2d(target, attachment, texture_target, texture, level);
        Ok(())
    }

    pub fn framebuffer_renderbuffer(
        &mut self,
        target: u32,
        attachment: u32,
        renderbuffer_target: u32,
        renderbuffer: Handle,
    ) -> Result<(), BridgeError> {
        let renderbuffer = self.renderbuffers.resolve(renderbuffer)?;
        self.ctx.host_mut().framebuffer_renderbuffer(
            target,
            attachment,
            renderbuffer_target,
            renderbuffer,
        );
        Ok(())
    }

    pub fn blit_framebuffer(&mut self, src: [i32; 4], dst: [i32; 4], mask: u32, filter: u32) {
        self.ctx.host_mut().blit_framebuffer(src, dst, mask, filter);
    }

    pub fn draw_buffers(&mut self, mem: &GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        let n = non_negative("draw buffer count", n)?;
        let buffers = mem
            .view(ptr, n, ElementType::U32)?
            .map(|view| view.to_u32s())
            .unwrap_or_default();
        self.ctx.host_mut().draw_buffers(&buffers);
        Ok(())
    }

    pub fn create_renderbuffer(&mut self) -> Result<Handle, BridgeError> {
        let renderbuffer = self.ctx.host_mut().create_renderbuffer()?;
        Ok(self.renderbuffers.allocate(renderbuffer)?)
    }

    pub fn gen_renderbuffers(&mut self, mem: &mut GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        gen_into(mem, n, ptr, || self.create_renderbuffer())
    }

    pub fn delete_renderbuffer(&mut self, handle: Handle) -> Result<(), BridgeError> {
        if let Some(renderbuffer) = self.renderbuffers.release(handle)? {
            self.ctx.host_mut().delete_renderbuffer(renderbuffer);
        }
        Ok(())
    }

    pub fn delete_renderbuffers(&mut self, mem: &GuestMemory<'_>, n: i32, ptr: u32) -> Result<(), BridgeError> {
        for handle in read_handles(mem, n, ptr)? {
            let result = self.delete_renderbuffer(handle);
            self.note_batch_release("glDeleteRenderbuffers", result);
        }
        Ok(())
    }

    pub fn bind_renderbuffer(&mut self, target: u32, handle: Handle) -> Result<(), BridgeError> {
        let renderbuffer = self.renderbuffers.resolve(handle)?;
        self.ctx.host_mut().bind_renderbuffer(target, renderbuffer);
        Ok(())
    }

    pub fn renderbuffer_storage(&mut self, target: u32, internal_format: u32, width: i32, height: i32) {
        self.ctx
            .host_mut()
            .renderbuffer_storage(target, internal_format, width, height);
    }

    pub fn renderbuffer_storage_multisample(
        &mut self,
        target: u32,
        samples: i32,
        internal_format: u32,
        width: i32,
        height: i32,
    ) {
        self.ctx.host_mut().renderbuffer_storage_multisample(
            target,
            samples,
            internal_format,
            width,
            height,
        );
    }
}
