//! The bundler facade.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::backend::{shared_linker, CompileBackend};
use crate::entry::{detect_entry, EntryInfo};
use crate::error::{BackendError, BackendMessage, BackendResult};
use crate::filter::{file_kind, prepare, FileKind};
use crate::resolver::VirtualResolver;
use crate::wrapper::{render_wrapper, WrapperSlots};
use crate::SourceMap;

/// Tunables of a [`Bundler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerOptions {
    /// DOM id the synthetic wrapper mounts into.
    pub mount_element_id: String,
    /// Message type the wrapper posts on render failure.
    pub error_channel: String,
    /// Reserved source-map key of the synthetic wrapper.
    pub wrapper_key: String,
    /// Drop files whose content fails the source sniff test.
    pub skip_invalid_content: bool,
}

impl Default for BundlerOptions {
    fn default() -> Self {
        Self {
            mount_element_id: "root".to_string(),
            error_channel: crate::channel::PREVIEW_ERROR_TYPE.to_string(),
            wrapper_key: "__forge_entry__.jsx".to_string(),
            skip_invalid_content: true,
        }
    }
}

impl BundlerOptions {
    pub fn with_mount_element(mut self, id: impl Into<String>) -> Self {
        self.mount_element_id = id.into();
        self
    }

    pub fn with_error_channel(mut self, channel: impl Into<String>) -> Self {
        self.error_channel = channel.into();
        self
    }

    pub fn with_skip_invalid_content(mut self, skip: bool) -> Self {
        self.skip_invalid_content = skip;
        self
    }
}

/// Build-time failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleErrorKind {
    NoFiles,
    NoBundleableFiles,
    NoEntryPoint,
    UnresolvedFile,
    Compile,
}

/// A build error with an optional location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleError {
    pub kind: BundleErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl BundleError {
    pub fn new(kind: BundleErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
            column: None,
        }
    }

    /// Render as raw error text with a stack-style location fragment, the
    /// shape the classifier's location extractor understands.
    pub fn to_raw(&self) -> String {
        match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(column)) => {
                format!("{}\n    at {}:{}:{}", self.message, file, line, column)
            }
            (Some(file), Some(line), None) => format!("{}\n    at {}:{}:1", self.message, file, line),
            (Some(file), None, _) => format!("{}\n    at {}", self.message, file),
            _ => self.message.clone(),
        }
    }
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line, self.column) {
            (Some(file), Some(line), Some(column)) => {
                write!(f, "{}:{}:{}: {}", file, line, column, self.message)
            }
            (Some(file), _, _) => write!(f, "{}: {}", file, self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

impl From<BackendMessage> for BundleError {
    fn from(message: BackendMessage) -> Self {
        let kind = if message.text.starts_with("Could not load") {
            BundleErrorKind::UnresolvedFile
        } else {
            BundleErrorKind::Compile
        };
        Self {
            kind,
            message: message.text,
            file: message.file,
            line: message.line,
            column: message.column,
        }
    }
}

/// Outcome of one [`Bundler::bundle`] call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleResult {
    pub success: bool,
    pub code: String,
    pub css: String,
    /// Bare import specifiers left for dependency installation.
    pub externals: Vec<String>,
    pub errors: Vec<BundleError>,
    pub warnings: Vec<String>,
    pub entry_point: Option<EntryInfo>,
}

impl BundleResult {
    fn failure(error: BundleError) -> Self {
        Self {
            errors: vec![error],
            ..Default::default()
        }
    }

    /// Errors rendered as classifier input.
    pub fn raw_errors(&self) -> Vec<String> {
        self.errors.iter().map(BundleError::to_raw).collect()
    }
}

/// Builds a runnable bundle from an in-memory source map.
pub struct Bundler {
    backend: Arc<dyn CompileBackend>,
    options: BundlerOptions,
    initialized: OnceCell<()>,
}

impl Default for Bundler {
    fn default() -> Self {
        Self::new()
    }
}

impl Bundler {
    /// Bundler on the process-wide built-in backend.
    pub fn new() -> Self {
        Self::with_backend(shared_linker())
    }

    pub fn with_backend(backend: Arc<dyn CompileBackend>) -> Self {
        Self {
            backend,
            options: BundlerOptions::default(),
            initialized: OnceCell::new(),
        }
    }

    pub fn with_options(mut self, options: BundlerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &BundlerOptions {
        &self.options
    }

    /// Initialize the backend at most once.
    ///
    /// Concurrent callers await the same initialization. A backend that
    /// reports it was already initialized elsewhere counts as ready.
    pub async fn ensure_initialized(&self) -> BackendResult<()> {
        self.initialized
            .get_or_try_init(|| async {
                match self.backend.initialize().await {
                    Ok(()) | Err(BackendError::AlreadyInitialized) => {
                        debug!("Backend {} ready", self.backend.name());
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            })
            .await
            .map(|_| ())
    }

    /// Bundle `files`. Never fails; problems are reported in the result.
    pub async fn bundle(&self, files: &SourceMap) -> BundleResult {
        if files.is_empty() {
            return BundleResult::failure(BundleError::new(
                BundleErrorKind::NoFiles,
                "No files to bundle",
            ));
        }

        let prepared = prepare(files, self.options.skip_invalid_content);
        let mut warnings: Vec<String> = prepared
            .skipped_invalid
            .iter()
            .map(|path| format!("Skipped {path}: content does not look like source code"))
            .collect();

        if prepared.files.is_empty() {
            return BundleResult {
                warnings,
                ..BundleResult::failure(BundleError::new(
                    BundleErrorKind::NoBundleableFiles,
                    "No bundleable files",
                ))
            };
        }

        let Some(entry) = detect_entry(&prepared.files) else {
            let available: Vec<&str> = prepared.files.keys().map(String::as_str).collect();
            return BundleResult {
                warnings,
                ..BundleResult::failure(BundleError::new(
                    BundleErrorKind::NoEntryPoint,
                    format!("No entry point found. Available files: {}", available.join(", ")),
                ))
            };
        };

        let mut graph = prepared.files;
        let build_entry = if entry.is_self_mounting {
            entry.file.clone()
        } else {
            let slots = WrapperSlots::new(&entry.file)
                .with_error_channel(&self.options.error_channel)
                .with_mount_element(&self.options.mount_element_id);
            let wrapper_key = free_key(&graph, &self.options.wrapper_key);
            if wrapper_key != self.options.wrapper_key {
                warn!(
                    "{} is a project file; mounting through {} instead",
                    self.options.wrapper_key, wrapper_key
                );
                warnings.push(format!(
                    "Project file {} shadows the preview wrapper; wrapper renamed to {}",
                    self.options.wrapper_key, wrapper_key
                ));
            }
            graph.insert(wrapper_key.clone(), render_wrapper(&slots));
            wrapper_key
        };

        info!(
            "Bundling {} file(s) from entry {} via {}",
            graph.len(),
            entry.file,
            self.backend.name()
        );

        if let Err(e) = self.ensure_initialized().await {
            error!("Backend initialization failed: {}", e);
            return BundleResult {
                warnings,
                entry_point: Some(entry),
                ..BundleResult::failure(BundleError::new(BundleErrorKind::Compile, e.to_string()))
            };
        }

        let resolver = VirtualResolver::new(&graph);
        let built = self.backend.build(&build_entry, &resolver).await;
        warnings.extend(resolver.warnings());
        let externals = resolver.externals();

        let output = match built {
            Ok(output) => output,
            Err(e) => {
                let errors = match e {
                    BackendError::BuildFailed(messages) => {
                        messages.into_iter().map(BundleError::from).collect()
                    }
                    BackendError::MissingModule(path) => vec![BundleError {
                        file: Some(path.clone()),
                        ..BundleError::new(
                            BundleErrorKind::UnresolvedFile,
                            format!("Could not load \"{path}\""),
                        )
                    }],
                    other => vec![BundleError::new(BundleErrorKind::Compile, other.to_string())],
                };
                error!("Build failed with {} error(s)", errors.len());
                return BundleResult {
                    success: false,
                    code: String::new(),
                    css: String::new(),
                    externals,
                    errors,
                    warnings,
                    entry_point: Some(entry),
                };
            }
        };

        warnings.extend(output.warnings);
        let mut css = output.css;
        for (path, content) in &graph {
            if file_kind(path) != Some(FileKind::Style) {
                continue;
            }
            let raw = content.trim();
            if raw.is_empty() || css.contains(raw) {
                continue;
            }
            warn!("Appending unreferenced stylesheet {}", path);
            css.push_str(&format!("/* {path} */\n{raw}\n"));
        }

        info!("Bundle built: {} module(s), {} external(s)", output.modules.len(), externals.len());

        BundleResult {
            success: true,
            code: output.code,
            css,
            externals,
            errors: Vec::new(),
            warnings,
            entry_point: Some(entry),
        }
    }
}

/// `key`, or its first `stem-N.ext` variant not already taken in `graph`.
fn free_key(graph: &SourceMap, key: &str) -> String {
    if !graph.contains_key(key) {
        return key.to_string();
    }
    let (stem, ext) = match key.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => (stem, Some(ext)),
        _ => (key, None),
    };
    (1u32..)
        .map(|n| match ext {
            Some(ext) => format!("{stem}-{n}.{ext}"),
            None => format!("{stem}-{n}"),
        })
        .find(|candidate| !graph.contains_key(candidate))
        .unwrap_or_else(|| key.to_string())
}
