//! previewforge Bundler
//!
//! Turns an in-memory map of AI-generated source files into a runnable
//! preview bundle without touching disk:
//!
//! - [`path`]: logical path algebra shared by every other module
//! - [`filter`]: candidate filtering and the "looks like source" sniff
//! - [`entry`]: bootstrap / root-component entry detection
//! - [`wrapper`]: the synthetic mount wrapper template
//! - [`resolver`]: import resolution against the virtual filesystem
//! - [`backend`]: the compile backend trait and the built-in linker
//! - [`Bundler`]: the non-throwing facade tying them together

pub mod assets;
pub mod backend;
pub mod bundler;
pub mod channel;
pub mod entry;
pub mod error;
pub mod filter;
pub mod path;
pub mod resolver;
pub mod wrapper;

use std::collections::BTreeMap;

/// Logical path to source text.
pub type SourceMap = BTreeMap<String, String>;

pub use backend::{shared_linker, BuildOutput, CompileBackend, LinkerBackend, ModuleHost, Resolution};
pub use bundler::{BundleError, BundleErrorKind, BundleResult, Bundler, BundlerOptions};
pub use channel::{PreviewErrorPayload, PreviewMessage, PREVIEW_ERROR_TYPE};
pub use entry::{detect_entry, EntryInfo};
pub use error::{BackendError, BackendMessage, BackendResult};
pub use resolver::VirtualResolver;
