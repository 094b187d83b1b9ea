//! Host context negotiation.
//!
//! The bridge prefers a primary (GLES3 / WebGL2) context. When the platform does not advertise
//! one it falls back to GLES2 / WebGL1 and routes vertex array objects through
//! `OES_vertex_array_object`. Which path applies is decided once here; the call forwarder only
//! sees a [`VertexArrayDispatch`] tag.

use tracing::{debug, info};

use crate::consts::OES_VERTEX_ARRAY_OBJECT;
use crate::host::{ContextAttributes, ContextProvider, ContextVersion, GlHost, HostError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("the platform supports a primary context, but initialization failed")]
    PrimaryCreationFailed,
    #[error("no supported graphics context is available")]
    Unavailable,
    #[error("fallback context is missing the {OES_VERTEX_ARRAY_OBJECT} extension")]
    MissingVertexArrayExtension,
}

/// How vertex array object calls reach the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexArrayDispatch {
    Core,
    Oes,
}

pub struct GlContext<H> {
    host: H,
    version: ContextVersion,
    vertex_arrays: VertexArrayDispatch,
}

impl<H: GlHost> GlContext<H> {
    pub fn negotiate<P>(provider: &mut P, attributes: &ContextAttributes) -> Result<Self, ContextError>
    where
        P: ContextProvider<Host = H>,
    {
        if provider.supports(ContextVersion::Primary) {
            let host = provider
                .create(ContextVersion::Primary, attributes)
                .ok_or(ContextError::PrimaryCreationFailed)?;
            info!(version = ?ContextVersion::Primary, "graphics context created");
            return Ok(Self {
                host,
                version: ContextVersion::Primary,
                vertex_arrays: VertexArrayDispatch::Core,
            });
        }

        debug!("primary context unsupported, trying fallback");
        let host = provider
            .create(ContextVersion::Fallback, attributes)
            .ok_or(ContextError::Unavailable)?;
        if !host.has_extension(OES_VERTEX_ARRAY_OBJECT) {
            return Err(ContextError::MissingVertexArrayExtension);
        }
        info!(version = ?ContextVersion::Fallback, "graphics context created");
        Ok(Self {
            host,
            version: ContextVersion::Fallback,
            vertex_arrays: VertexArrayDispatch::Oes,
        })
    }

    /// Wrap an already-created host. `OES` dispatch is chosen for fallback contexts.
    pub fn from_host(host: H, version: ContextVersion) -> Self {
        let vertex_arrays = match version {
            ContextVersion::Primary => VertexArrayDispatch::Core,
            ContextVersion::Fallback => VertexArrayDispatch::Oes,
        };
        Self {
            host,
            version,
            vertex_arrays,
        }
    }

    pub fn version(&self) -> ContextVersion {
        self.version
    }

    pub fn vertex_array_dispatch(&self) -> VertexArrayDispatch {
        self.vertex_arrays
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn create_vertex_array(&mut self) -> Result<H::VertexArray, HostError> {
        match self.vertex_arrays {
            VertexArrayDispatch::Core => self.host.create_vertex_array(),
            VertexArrayDispatch::Oes => self.host.create_vertex_array_oes(),
        }
    }

    pub fn delete_vertex_array(&mut self, vertex_array: H::VertexArray) {
        match self.vertex_arrays {
            VertexArrayDispatch::Core => self.host.delete_vertex_array(vertex_array),
            VertexArrayDispatch::Oes => self.host.delete_vertex_array_oes(vertex_array),
        }
    }

    pub fn bind_vertex_array(&mut self, vertex_array: Option<&H::VertexArray>) {
        match self.vertex_arrays {
            VertexArrayDispatch::Core => self.host.bind_vertex_array(vertex_array),
            VertexArrayDispatch::Oes => self.host.bind_vertex_array_oes(vertex_array),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingProvider;

    #[test]
    fn primary_context_uses_core_vertex_arrays() {
        let mut provider = RecordingProvider::primary();
        let mut ctx = GlContext::negotiate(&mut provider, &ContextAttributes::default()).unwrap();
        assert_eq!(ctx.version(), ContextVersion::Primary);
        assert_eq!(ctx.vertex_array_dispatch(), VertexArrayDispatch::Core);

        ctx.create_vertex_array().unwrap();
        assert_eq!(ctx.host().calls_named("createVertexArray").len(), 1);
        assert!(ctx.host().calls_named("createVertexArrayOES").is_empty());
    }

    #[test]
    fn fallback_context_routes_through_extension() {
        let mut provider = RecordingProvider::fallback_only(true);
        let mut ctx = GlContext::negotiate(&mut provider, &ContextAttributes::default()).unwrap();
        assert_eq!(ctx.version(), ContextVersion::Fallback);
        assert_eq!(ctx.vertex_array_dispatch(), VertexArrayDispatch::Oes);

        let vao = ctx.create_vertex_array().unwrap();
        ctx.bind_vertex_array(Some(&vao));
        ctx.delete_vertex_array(vao);
        let host = ctx.host();
        assert_eq!(host.calls_named("createVertexArrayOES").len(), 1);
        assert_eq!(host.calls_named("bindVertexArrayOES").len(), 1);
        assert_eq!(host.calls_named("deleteVertexArrayOES").len(), 1);
        assert!(host.calls_named("createVertexArray").is_empty());
    }

    #[test]
    fn fallback_without_extension_is_fatal() {
        let mut provider = RecordingProvider::fallback_only(false);
        assert_eq!(
            GlContext::negotiate(&mut provider, &ContextAttributes::default()).err(),
            Some(ContextError::MissingVertexArrayExtension)
        );
    }

    #[test]
    fn primary_creation_failure_does_not_fall_back() {
        let mut provider = RecordingProvider::primary();
        provider.fail_primary_creation = true;
        assert_eq!(
            GlContext::negotiate(&mut provider, &ContextAttributes::default()).err(),
            Some(ContextError::PrimaryCreationFailed)
        );
    }

    #[test]
    fn nothing_creatable_is_fatal() {
        let mut provider = RecordingProvider::unavailable();
        assert_eq!(
            GlContext::negotiate(&mut provider, &ContextAttributes::default()).err(),
            Some(ContextError::Unavailable)
        );
    }
}
