//! Guest graphics bridge.
//!
//! A WebAssembly guest written against a GLES-style C API passes plain integers for objects and
//! raw offsets into its linear memory for data. This crate turns those calls into calls on a
//! [`GlHost`]: handle tables map guest integers to host objects, [`glbridge_mem::GuestMemory`]
//! bounds-checks every pointer, and asynchronous texture decodes complete back into the guest
//! between frames.
//!
//! The crate is host-agnostic. [`RecordingHost`] is a software host that records every call, used
//! by the headless runner and by tests; [`linker::add_to_linker`] installs the whole import
//! surface into a Wasmtime linker.

mod bridge;
pub mod completion;
pub mod config;
pub mod consts;
pub mod context;
pub mod host;
pub mod pixels;
pub mod platform;
pub mod recording;
pub mod stats;

#[cfg(not(target_arch = "wasm32"))]
pub mod linker;

pub use bridge::{Bridge, BridgeError};
pub use completion::{
    AssetLoader, DecodeError, DecodedImage, DeferredDecoder, FsAssetLoader, ImageDecoder,
    SamplerParams, ThreadedDecoder,
};
pub use config::{BridgeConfig, DecoderMode};
pub use context::{ContextError, GlContext, VertexArrayDispatch};
pub use host::{ContextAttributes, ContextProvider, ContextVersion, GlHost, HostError};
pub use platform::{GamepadMapping, GamepadState, Platform, PlatformHooks};
pub use recording::{HostCall, RecordingHost, RecordingProvider};
pub use stats::{BridgeStats, BridgeStatsSnapshot};

pub use glbridge_handles::{Category, Handle, HandleError, ZeroHandle};
pub use glbridge_mem::{GuestMemory, MemoryError};
