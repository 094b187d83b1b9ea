//! The call forwarder.
//!
//! [`Bridge`] owns everything one guest session needs: the negotiated host context, one handle
//! table per resource category, tracked pixel-store state, pending texture loads and the platform
//! collaborators. Methods take guest integers (handles, pointers, GL enums) exactly as the guest
//! passes them and return `Result`; the wasm glue turns errors into a log line plus a zero value.

mod program;
mod resources;

use std::collections::BTreeMap;
use std::sync::Arc;

use glbridge_handles::{Category, Handle, HandleError, HandleTable};
use glbridge_mem::{ElementType, GuestMemory, MemoryError, TypedViewMut};
use tracing::{debug, warn};

use crate::completion::{
    AssetLoader, DeferredDecoder, FsAssetLoader, ImageDecoder, PendingLoad, ThreadedDecoder,
};
use crate::config::{BridgeConfig, DecoderMode};
use crate::context::GlContext;
use crate::host::{GlHost, HostError};
use crate::pixels::PixelStore;
use crate::platform::Platform;
use crate::stats::BridgeStats;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Handle(#[from] HandleError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("{category} handle 0 does not name an object here")]
    NullHandle { category: Category },
    #[error("negative {what}: {value}")]
    NegativeCount { what: &'static str, value: i32 },
    #[error("unsupported pixel type 0x{0:x}")]
    UnsupportedPixelType(u32),
    #[error("unsupported pixel format 0x{format:x} for type 0x{ty:x}")]
    UnsupportedPixelFormat { format: u32, ty: u32 },
    #[error("{width}x{height} image does not fit in guest memory")]
    ImageTooLarge { width: i32, height: i32 },
    #[error("guest module does not export its memory")]
    NoGuestMemory,
}

pub(crate) fn non_negative(what: &'static str, value: i32) -> Result<u32, BridgeError> {
    u32::try_from(value).map_err(|_| BridgeError::NegativeCount { what, value })
}

/// Require a real object where GL does not accept "no object".
pub(crate) fn required<T>(object: Option<&T>, category: Category) -> Result<&T, BridgeError> {
    object.ok_or(BridgeError::NullHandle { category })
}

/// Handles named by a guest `u32` array, copied out so the view is not held across host calls.
pub(crate) fn read_handles(
    mem: &GuestMemory<'_>,
    n: i32,
    ptr: u32,
) -> Result<Vec<Handle>, BridgeError> {
    let n = non_negative("handle count", n)?;
    Ok(mem
        .view(ptr, n, ElementType::U32)?
        .map(|view| view.to_u32s().into_owned())
        .unwrap_or_default())
}

/// Fill a guest `u32` array with freshly created handles.
///
/// The destination is bounds-checked before anything is created.
pub(crate) fn gen_into(
    mem: &mut GuestMemory<'_>,
    n: i32,
    ptr: u32,
    mut create: impl FnMut() -> Result<Handle, BridgeError>,
) -> Result<(), BridgeError> {
    let n = non_negative("handle count", n)?;
    let Some(mut out) = mem.view_mut(ptr, n, ElementType::U32)? else {
        return Ok(());
    };
    for index in 0..n as usize {
        let handle = create()?;
        out.set_u32(index, handle);
    }
    Ok(())
}

pub(crate) fn write_i32s(view: &mut TypedViewMut<'_>, values: &[i32]) {
    for (index, &value) in values.iter().enumerate() {
        view.set_i32(index, value);
    }
}

pub struct Bridge<H: GlHost> {
    pub(crate) ctx: GlContext<H>,

    pub(crate) shaders: HandleTable<H::Shader>,
    pub(crate) programs: HandleTable<H::Program>,
    pub(crate) uniforms: HandleTable<Option<H::UniformLocation>>,
    /// Uniform handles already issued, keyed by owning program handle and uniform name.
    pub(crate) uniform_names: BTreeMap<(Handle, String), Handle>,
    pub(crate) buffers: HandleTable<H::Buffer>,
    pub(crate) textures: HandleTable<H::Texture>,
    pub(crate) vertex_arrays: HandleTable<H::VertexArray>,
    pub(crate) framebuffers: HandleTable<H::Framebuffer>,
    pub(crate) renderbuffers: HandleTable<H::Renderbuffer>,

    pub(crate) pixel_store: PixelStore,

    pub(crate) decoder: Box<dyn ImageDecoder>,
    pub(crate) pending: BTreeMap<u64, PendingLoad>,
    pub(crate) next_ticket: u64,
    pub(crate) memory_epoch: u64,

    platform: Platform,
    pub(crate) stats: BridgeStats,
}

impl<H: GlHost> Bridge<H> {
    /// Build a bridge over a negotiated context, choosing the decoder from `config`.
    pub fn new(ctx: GlContext<H>, config: &BridgeConfig) -> std::io::Result<Self> {
        let loader: Arc<dyn AssetLoader> = Arc::new(FsAssetLoader::new(&config.asset_root));
        let decoder: Box<dyn ImageDecoder> = match config.decoder {
            DecoderMode::Threaded => Box::new(ThreadedDecoder::new(loader)?),
            DecoderMode::Deferred => Box::new(DeferredDecoder::new(loader)),
        };
        Ok(Self::with_decoder(ctx, config, decoder))
    }

    pub fn with_decoder(
        ctx: GlContext<H>,
        config: &BridgeConfig,
        decoder: Box<dyn ImageDecoder>,
    ) -> Self {
        let table = |category| config.zero_handle(category);
        Self {
            ctx,
            shaders: HandleTable::new(Category::Shader, table(Category::Shader)),
            programs: HandleTable::new(Category::Program, table(Category::Program)),
            uniforms: HandleTable::new(
                Category::UniformLocation,
                table(Category::UniformLocation),
            ),
            uniform_names: BTreeMap::new(),
            buffers: HandleTable::new(Category::Buffer, table(Category::Buffer)),
            textures: HandleTable::new(Category::Texture, table(Category::Texture)),
            vertex_arrays: HandleTable::new(Category::VertexArray, table(Category::VertexArray)),
            framebuffers: HandleTable::new(Category::Framebuffer, table(Category::Framebuffer)),
            renderbuffers: HandleTable::new(
                Category::Renderbuffer,
                table(Category::Renderbuffer),
            ),
            pixel_store: PixelStore::default(),
            decoder,
            pending: BTreeMap::new(),
            next_ticket: 0,
            memory_epoch: 0,
            platform: Platform::new(),
            stats: BridgeStats::new(),
        }
    }

    pub fn context(&self) -> &GlContext<H> {
        &self.ctx
    }

    pub fn host(&self) -> &H {
        self.ctx.host()
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.ctx.host_mut()
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut Platform {
        &mut self.platform
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn pixel_store(&self) -> PixelStore {
        self.pixel_store
    }

    /// Live object count for `category`.
    pub fn live_count(&self, category: Category) -> usize {
        match category {
            Category::Shader => self.shaders.live_count(),
            Category::Program => self.programs.live_count(),
            Category::UniformLocation => self.uniforms.live_count(),
            Category::Buffer => self.buffers.live_count(),
            Category::Texture => self.textures.live_count(),
            Category::VertexArray => self.vertex_arrays.live_count(),
            Category::Framebuffer => self.framebuffers.live_count(),
            Category::Renderbuffer => self.renderbuffers.live_count(),
        }
    }

    /// Log and count a failed call, yielding the value the guest sees instead.
    pub fn report<T: Default>(&self, op: &'static str, result: Result<T, BridgeError>) -> T {
        self.report_or(op, result, T::default())
    }

    pub fn report_or<T>(&self, op: &'static str, result: Result<T, BridgeError>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                match &err {
                    BridgeError::Handle(_) | BridgeError::NullHandle { .. } => {
                        self.stats.inc_invalid_handles();
                    }
                    BridgeError::Memory(_) | BridgeError::NoGuestMemory => {
                        self.stats.inc_memory_faults();
                    }
                    BridgeError::Host(_) => self.stats.inc_host_errors(),
                    BridgeError::NegativeCount { .. }
                    | BridgeError::UnsupportedPixelType(_)
                    | BridgeError::UnsupportedPixelFormat { .. }
                    | BridgeError::ImageTooLarge { .. } => self.stats.inc_invalid_arguments(),
                }
                warn!(op, error = %err, "bridge call skipped");
                fallback
            }
        }
    }

    /// Release `handle` from a batch, logging instead of failing on duplicates and stale entries.
    pub(crate) fn note_batch_release(&self, op: &'static str, result: Result<(), BridgeError>) {
        if let Err(BridgeError::Handle(err @ HandleError::Released { .. })) = &result {
            self.stats.inc_double_releases();
            warn!(op, error = %err, "duplicate handle in batch delete");
            return;
        }
        self.report(op, result);
    }

    /// Guest memory was torn down or replaced; pending completions must not write into it.
    pub fn reset_guest_memory(&mut self) {
        self.memory_epoch += 1;
        debug!(epoch = self.memory_epoch, "guest memory reset");
    }

    /// Destroy every live host object and forget pending loads.
    pub fn teardown(&mut self) {
        let abandoned = self.pending.len();
        self.pending.clear();
        let host = self.ctx.host_mut();
        for shader in self.shaders.drain() {
            host.delete_shader(shader);
        }
        for program in self.programs.drain() {
            host.delete_program(program);
        }
        self.uniforms.drain();
        self.uniform_names.clear();
        for buffer in self.buffers.drain() {
            host.delete_buffer(buffer);
        }
        for texture in self.textures.drain() {
            host.delete_texture(texture);
        }
        for framebuffer in self.framebuffers.drain() {
            host.delete_framebuffer(framebuffer);
        }
        for renderbuffer in self.renderbuffers.drain() {
            host.delete_renderbuffer(renderbuffer);
        }
        for vertex_array in self.vertex_arrays.drain() {
            self.ctx.delete_vertex_array(vertex_array);
        }
        debug!(abandoned, "bridge torn down");
    }

    pub fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.ctx.host_mut().viewport(x, y, width, height);
    }

    pub fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.ctx.host_mut().clear_color(r, g, b, a);
    }

    pub fn clear_depth(&mut self, depth: f32) {
        self.ctx.host_mut().clear_depth(depth);
    }

    pub fn clear(&mut self, mask: u32) {
        self.ctx.host_mut().clear(mask);
    }

    pub fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        self.ctx.host_mut().color_mask(r, g, b, a);
    }

    pub fn depth_mask(&mut self, flag: bool) {
        self.ctx.host_mut().depth_mask(flag);
    }

    pub fn stencil_mask(&mut self, mask: u32) {
        self.ctx.host_mut().stencil_mask(mask);
    }

    pub fn cull_face(&mut self, mode: u32) {
        self.ctx.host_mut().cull_face(mode);
    }

    pub fn front_face(&mut self, mode: u32) {
        self.ctx.host_mut().front_face(mode);
    }

    pub fn enable(&mut self, cap: u32) {
        self.ctx.host_mut().enable(cap);
    }

    pub fn disable(&mut self, cap: u32) {
        self.ctx.host_mut().disable(cap);
    }

    pub fn depth_func(&mut self, func: u32) {
        self.ctx.host_mut().depth_func(func);
    }

    pub fn blend_func(&mut self, src: u32, dst: u32) {
        self.ctx.host_mut().blend_func(src, dst);
    }

    pub fn blend_func_separate(&mut self, src_rgb: u32, dst_rgb: u32, src_alpha: u32, dst_alpha: u32) {
        self.ctx
            .host_mut()
            .blend_func_separate(src_rgb, dst_rgb, src_alpha, dst_alpha);
    }

    pub fn stencil_func(&mut self, func: u32, reference: i32, mask: u32) {
        self.ctx.host_mut().stencil_func(func, reference, mask);
    }

    pub fn stencil_op(&mut self, fail: u32, zfail: u32, zpass: u32) {
        self.ctx.host_mut().stencil_op(fail, zfail, zpass);
    }

    pub fn stencil_op_separate(&mut self, face: u32, fail: u32, zfail: u32, zpass: u32) {
        self.ctx.host_mut().stencil_op_separate(face, fail, zfail, zpass);
    }

    /// Forward `pixelStorei`, tracking the alignments used to size pixel transfers.
    pub fn pixel_store_i32(&mut self, pname: u32, param: i32) {
        if !self.pixel_store.apply(pname, param) {
            debug!(pname, param, "ignoring invalid pixel store alignment");
        }
        self.ctx.host_mut().pixel_store_i32(pname, param);
    }

    pub fn active_texture(&mut self, unit: u32) {
        self.ctx.host_mut().active_texture(unit);
    }

    pub fn get_error(&mut self) -> u32 {
        self.ctx.host_mut().get_error()
    }

    /// `glGetIntegerv`: write the (possibly multi-valued) parameter to `params_ptr`.
    ///
    /// A parameter the host has no value for is reported as a single `0`.
    pub fn get_integer_v(
        &mut self,
        mem: &mut GuestMemory<'_>,
        pname: u32,
        params_ptr: u32,
    ) -> Result<(), BridgeError> {
        let mut values = self.ctx.host_mut().get_parameter_i32(pname);
        if values.is_empty() {
            values.push(0);
        }
        let count = u32::try_from(values.len()).unwrap_or(u32::MAX);
        if let Some(mut out) = mem.view_mut(params_ptr, count, ElementType::U32)? {
            write_i32s(&mut out, &values);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::*;
    use crate::recording::RecordingHost;
    use crate::test_util::bridge;

    #[test]
    fn integer_queries_write_every_component() {
        let mut bridge = bridge();
        bridge.viewport(1, 2, 300, 400);
        let mut buf = vec![0u8; 64];
        let mut mem = GuestMemory::new(&mut buf);
        bridge.get_integer_v(&mut mem, VIEWPORT, 16).unwrap();
        let values: Vec<u32> = (0..4).map(|i| mem.read_u32(16 + i * 4).unwrap()).collect();
        assert_eq!(values, [1, 2, 300, 400]);
    }

    #[test]
    fn unknown_integer_query_writes_single_zero() {
        let mut bridge = bridge();
        let mut buf = vec![0xFFu8; 16];
        let mut mem = GuestMemory::new(&mut buf);
        bridge.get_integer_v(&mut mem, 0xFFFF, 4).unwrap();
        assert_eq!(mem.read_u32(4).unwrap(), 0);
        assert_eq!(mem.read_u32(8).unwrap(), 0xFFFF_FFFF);
    }

    #[test]
    fn integer_query_out_of_bounds_is_rejected() {
        let mut bridge = bridge();
        let mut buf = vec![0u8; 8];
        let mut mem = GuestMemory::new(&mut buf);
        assert!(matches!(
            bridge.get_integer_v(&mut mem, VIEWPORT, 4),
            Err(BridgeError::Memory(MemoryError::OutOfBounds { .. }))
        ));
    }

    #[test]
    fn pixel_store_tracks_alignment_and_forwards() {
        let mut bridge = bridge();
        bridge.pixel_store_i32(UNPACK_ALIGNMENT, 1);
        bridge.pixel_store_i32(PACK_ALIGNMENT, 7);
        assert_eq!(bridge.pixel_store().unpack_alignment, 1);
        assert_eq!(bridge.pixel_store().pack_alignment, 4);
        assert_eq!(bridge.host().calls_named("pixelStorei").len(), 2);
    }

    #[test]
    fn report_counts_and_substitutes_fallback() {
        let bridge = bridge();
        let value: u32 = bridge.report(
            "glBindTexture",
            Err(BridgeError::Handle(HandleError::OutOfRange {
                category: Category::Texture,
                handle: 9,
            })),
        );
        assert_eq!(value, 0);
        assert_eq!(bridge.report_or("glGetAttribLocation", Err(BridgeError::NoGuestMemory), -1), -1);
        let stats = bridge.stats().snapshot();
        assert_eq!(stats.invalid_handles, 1);
        assert_eq!(stats.memory_faults, 1);
        assert_eq!(stats.invalid_arguments, 0);
    }

    #[test]
    fn rejected_arguments_are_counted() {
        let mut bridge = bridge();
        let mut buf = vec![0u8; 64];
        let mut mem = GuestMemory::new(&mut buf);
        let result = bridge.gen_buffers(&mut mem, -2, 0);
        bridge.report("glGenBuffers", result);
        bridge.report::<()>("glTexImage2D", Err(BridgeError::UnsupportedPixelType(0xBEEF)));
        bridge.report::<()>(
            "glReadPixels",
            Err(BridgeError::ImageTooLarge {
                width: i32::MAX,
                height: i32::MAX,
            }),
        );

        let stats = bridge.stats().snapshot();
        assert_eq!(stats.invalid_arguments, 3);
        assert_eq!(stats.invalid_handles + stats.memory_faults + stats.host_errors, 0);
        assert!(stats.to_json().contains("\"invalid_arguments\":3"));
        assert_eq!(bridge.live_count(Category::Buffer), 0);
    }

    #[test]
    fn teardown_destroys_everything_once() {
        let mut bridge = bridge();
        let shader = bridge.create_shader(VERTEX_SHADER).unwrap();
        bridge.create_buffer().unwrap();
        bridge.create_texture().unwrap();
        bridge.create_vertex_array().unwrap();
        bridge.delete_shader(shader).unwrap();
        bridge.teardown();

        let host: &RecordingHost = bridge.host();
        assert_eq!(host.calls_named("deleteShader").len(), 1);
        assert_eq!(host.calls_named("deleteBuffer").len(), 1);
        assert_eq!(host.calls_named("deleteTexture").len(), 1);
        assert_eq!(host.calls_named("deleteVertexArray").len(), 1);
        assert_eq!(host.live_objects(), 0);
        assert_eq!(bridge.live_count(Category::Texture), 0);
    }
}
