//! Compile backends.
//!
//! A backend turns an entry module plus a [`ModuleHost`] into joined script
//! and style output. The bundler owns filtering, entry detection and
//! resolution policy; the backend only walks and emits.

pub mod linker;
pub mod scan;

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::error::BackendResult;

pub use linker::LinkerBackend;

/// Outcome of resolving one import specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A key of the virtual source map.
    Virtual(String),
    /// A binary asset replaced by a generated placeholder module.
    Asset { id: String, source: String },
    /// Left for the runtime (bare package or last-resort external).
    External(String),
}

/// Resolution and loading services a backend calls back into.
pub trait ModuleHost: Send + Sync {
    /// Resolve `specifier` as imported from the module at `importer`.
    fn resolve(&self, specifier: &str, importer: &str) -> Resolution;

    /// Load the content of a virtual module.
    fn load(&self, path: &str) -> Option<String>;
}

/// Output of a successful backend build.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
    pub code: String,
    pub css: String,
    pub warnings: Vec<String>,
    /// Virtual modules included in the graph, in emission order.
    pub modules: Vec<String>,
}

/// A compilation engine.
#[async_trait]
pub trait CompileBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// One-time heavyweight setup.
    ///
    /// May return [`BackendError::AlreadyInitialized`](crate::BackendError)
    /// when another caller won the race; the bundler treats that as success.
    async fn initialize(&self) -> BackendResult<()> {
        Ok(())
    }

    /// Build the module graph rooted at `entry`.
    async fn build(&self, entry: &str, host: &dyn ModuleHost) -> BackendResult<BuildOutput>;
}

static SHARED_LINKER: OnceLock<Arc<LinkerBackend>> = OnceLock::new();

/// Process-wide built-in backend shared by every default bundler.
pub fn shared_linker() -> Arc<LinkerBackend> {
    SHARED_LINKER
        .get_or_init(|| Arc::new(LinkerBackend::new()))
        .clone()
}
