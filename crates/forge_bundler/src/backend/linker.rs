//! Built-in linking backend.
//!
//! Walks the module graph through a [`ModuleHost`], rewrites ES module
//! syntax into a small CommonJS-style registry and runs the structural
//! checks from [`scan`](super::scan). TypeScript and JSX syntax inside
//! module bodies is passed through untouched; transpiling it is the job of
//! the preview surface or of an alternate backend.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::{Captures, Regex};
use tracing::{debug, info};

use super::scan::{check_structure, exported_names, line_col, undeclared_jsx_components, ExportSet};
use super::{BuildOutput, CompileBackend, ModuleHost, Resolution};
use crate::error::{BackendError, BackendMessage, BackendResult};
use crate::filter::{file_kind, FileKind};

static IMPORT_STMT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s+(type\s+)?(?:([\w$*\s{},]+?)\s+from\s+)?['"]([^'"\n]+)['"][ \t]*;?"#)
        .unwrap()
});

static REEXPORT_STMT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*export\s+(type\s+)?(\*(?:\s+as\s+[A-Za-z_$][\w$]*)?|\{[^}]*\})\s*from\s*['"]([^'"\n]+)['"][ \t]*;?"#,
    )
    .unwrap()
});

static DYNAMIC_IMPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bimport\(\s*['"]([^'"\n]+)['"]\s*\)"#).unwrap());

static REQUIRE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\brequire\(\s*['"]([^'"\n]+)['"]\s*\)"#).unwrap());

static EXPORT_DEFAULT_NAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^([ \t]*)export\s+default\s+((?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)|class\s+([A-Za-z_$][\w$]*))",
    )
    .unwrap()
});

static EXPORT_DEFAULT_EXPR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bexport\s+default\s+").unwrap());

static EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^([ \t]*)export\s+((?:async\s+)?(?:abstract\s+)?(?:function\s*\*?|class|const|let|var|enum)\s+([A-Za-z_$][\w$]*))",
    )
    .unwrap()
});

static EXPORT_TYPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([ \t]*)export\s+((?:declare\s+)?(?:type|interface)\s)").unwrap()
});

static EXPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bexport\s+(type\s+)?\{([^}]*)\}[ \t]*;?").unwrap());

const PRELUDE: &str = r#"(function () {
  var __forge_registry = {};
  var __forge_cache = {};
  var __forge_externals = (typeof window !== "undefined" && window.__forge_externals) || {};
  function __forge_define(id, factory) {
    __forge_registry[id] = factory;
  }
  function __forge_default(m) {
    return m && m.__esModule ? m.default : m;
  }
  function __forge_reexport(target, source) {
    Object.keys(source).forEach(function (key) {
      if (key !== "default" && key !== "__esModule") {
        target[key] = source[key];
      }
    });
  }
  function __forge_require(id) {
    if (__forge_cache[id]) {
      return __forge_cache[id].exports;
    }
    var factory = __forge_registry[id];
    if (!factory) {
      if (id in __forge_externals) {
        return __forge_externals[id];
      }
      throw new Error("Module not found: " + id);
    }
    var module = { exports: {} };
    __forge_cache[id] = module;
    factory(module, module.exports);
    return module.exports;
  }
"#;

fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Binding forms of one import clause.
#[derive(Debug, Default, PartialEq, Eq)]
struct ImportClause {
    default: Option<String>,
    namespace: Option<String>,
    /// `(imported, local)` pairs, type-only entries dropped.
    named: Vec<(String, String)>,
}

impl ImportClause {
    fn parse(clause: &str) -> Self {
        let mut parsed = Self::default();
        let mut rest = clause.trim();

        if !rest.starts_with('{') && !rest.starts_with('*') && !rest.is_empty() {
            let (default, tail) = rest.split_once(',').unwrap_or((rest, ""));
            parsed.default = Some(default.trim().to_string());
            rest = tail.trim();
        }

        if let Some(ns) = rest.strip_prefix('*') {
            let ns = ns.trim().trim_start_matches("as").trim();
            parsed.namespace = Some(ns.to_string());
        } else if let Some(inner) = rest.strip_prefix('{') {
            let inner = inner.trim_end().trim_end_matches('}');
            for item in inner.split(',') {
                let item = item.trim();
                if item.is_empty() || item.starts_with("type ") {
                    continue;
                }
                let (imported, local) = match item.split_once(" as ") {
                    Some((imported, local)) => (imported.trim(), local.trim()),
                    None => (item, item),
                };
                parsed.named.push((imported.to_string(), local.to_string()));
            }
        }

        parsed
    }

    /// Names the target module must export.
    fn required_exports(&self) -> Vec<String> {
        let mut names: Vec<String> = self.named.iter().map(|(imported, _)| imported.clone()).collect();
        if self.default.is_some() {
            names.push("default".to_string());
        }
        names
    }

    fn render(&self, module_ref: &str, temp_index: usize) -> String {
        let bindings = usize::from(self.default.is_some())
            + usize::from(self.namespace.is_some())
            + usize::from(!self.named.is_empty());

        if bindings == 0 {
            return format!("{module_ref};");
        }

        let mut out = String::new();
        let source = if bindings > 1 {
            let temp = format!("__forge_m{temp_index}");
            out.push_str(&format!("const {temp} = {module_ref}; "));
            temp
        } else {
            module_ref.to_string()
        };

        if let Some(default) = &self.default {
            out.push_str(&format!("const {default} = __forge_default({source}); "));
        }
        if let Some(namespace) = &self.namespace {
            out.push_str(&format!("const {namespace} = {source}; "));
        }
        if !self.named.is_empty() {
            let fields: Vec<String> = self
                .named
                .iter()
                .map(|(imported, local)| {
                    if imported == local {
                        imported.clone()
                    } else {
                        format!("{imported}: {local}")
                    }
                })
                .collect();
            out.push_str(&format!("const {{ {} }} = {source}; ", fields.join(", ")));
        }

        out.trim_end().to_string()
    }
}

/// Rewrite `export` forms of a module body into assignments on `exports`.
fn rewrite_exports(source: &str) -> String {
    let mut trailer: Vec<String> = Vec::new();

    let body = EXPORT_DEFAULT_NAMED.replace_all(source, |caps: &Captures| {
        let name = caps.get(3).or_else(|| caps.get(4)).map(|m| m.as_str()).unwrap_or_default();
        trailer.push(format!("exports.default = {name};"));
        format!("{}{}", &caps[1], &caps[2])
    });
    let body = EXPORT_DEFAULT_EXPR.replace_all(&body, "exports.default = ");
    let body = EXPORT_DECL.replace_all(&body, |caps: &Captures| {
        let name = &caps[3];
        trailer.push(format!("exports.{name} = {name};"));
        format!("{}{}", &caps[1], &caps[2])
    });
    let body = EXPORT_TYPE_DECL.replace_all(&body, "$1$2");
    let body = EXPORT_LIST.replace_all(&body, |caps: &Captures| {
        if caps.get(1).is_some() {
            return String::new();
        }
        for item in caps[2].split(',') {
            let item = item.trim();
            if item.is_empty() || item.starts_with("type ") {
                continue;
            }
            let (local, exported) = match item.split_once(" as ") {
                Some((local, exported)) => (local.trim(), exported.trim()),
                None => (item, item),
            };
            trailer.push(format!("exports.{exported} = {local};"));
        }
        String::new()
    });

    let mut out = String::from("exports.__esModule = true;\n");
    out.push_str(&body);
    if !trailer.is_empty() {
        out.push('\n');
        out.push_str(&trailer.join("\n"));
    }
    out
}

/// Mutable state of one link run.
struct LinkRun<'h> {
    host: &'h dyn ModuleHost,
    queue: VecDeque<String>,
    visited: HashSet<String>,
    defines: Vec<(String, String)>,
    modules: Vec<String>,
    css: String,
    css_seen: HashSet<String>,
    errors: Vec<BackendMessage>,
    export_cache: HashMap<String, ExportSet>,
    temp_counter: usize,
}

impl<'h> LinkRun<'h> {
    fn new(host: &'h dyn ModuleHost) -> Self {
        Self {
            host,
            queue: VecDeque::new(),
            visited: HashSet::new(),
            defines: Vec::new(),
            modules: Vec::new(),
            css: String::new(),
            css_seen: HashSet::new(),
            errors: Vec::new(),
            export_cache: HashMap::new(),
            temp_counter: 0,
        }
    }

    fn enqueue(&mut self, path: &str) {
        if self.visited.insert(path.to_string()) {
            self.queue.push_back(path.to_string());
        }
    }

    fn error_at(&mut self, text: impl Into<String>, file: &str, source: &str, offset: usize) {
        let (line, column) = line_col(source, offset);
        self.errors.push(BackendMessage::new(text).at(file, line, column));
    }

    fn exports_of(&mut self, path: &str) -> Option<&ExportSet> {
        if !self.export_cache.contains_key(path) {
            let source = self.host.load(path)?;
            self.export_cache.insert(path.to_string(), exported_names(&source));
        }
        self.export_cache.get(path)
    }

    fn run(&mut self, entry: &str) {
        self.enqueue(entry);
        while let Some(path) = self.queue.pop_front() {
            self.process(&path);
        }
    }

    fn process(&mut self, path: &str) {
        let Some(source) = self.host.load(path) else {
            self.errors
                .push(BackendMessage::new(format!("Could not load \"{path}\"")).in_file(path));
            return;
        };

        debug!("Linking module {}", path);
        self.modules.push(path.to_string());

        match file_kind(path) {
            Some(FileKind::Data) => match serde_json::from_str::<serde_json::Value>(&source) {
                Ok(_) => self
                    .defines
                    .push((path.to_string(), format!("module.exports = {};", source.trim()))),
                Err(e) => self.errors.push(
                    BackendMessage::new(format!("Invalid JSON: {e}")).at(
                        path,
                        e.line() as u32,
                        e.column() as u32,
                    ),
                ),
            },
            Some(FileKind::Style) => self.add_css(path, &source),
            Some(FileKind::Script) | None => self.process_script(path, &source),
        }
    }

    fn process_script(&mut self, path: &str, source: &str) {
        if let Some(issue) = check_structure(source) {
            self.error_at(issue.message, path, source, issue.offset);
            return;
        }

        for (name, offset) in undeclared_jsx_components(source) {
            self.error_at(format!("ReferenceError: {name} is not defined"), path, source, offset);
        }

        let body = self.rewrite_imports(path, source);
        let body = rewrite_exports(&body);
        self.defines.push((path.to_string(), body));
    }

    fn add_css(&mut self, path: &str, content: &str) {
        if self.css_seen.insert(path.to_string()) {
            self.css.push_str(&format!("/* {path} */\n{}\n", content.trim_end()));
        }
    }

    /// Resolve an import and return the registry id to require, or `None`
    /// when the import was a stylesheet folded into the CSS output.
    fn link(
        &mut self,
        specifier: &str,
        importer: &str,
        source: &str,
        offset: usize,
        required: &[String],
    ) -> Option<String> {
        match self.host.resolve(specifier, importer) {
            Resolution::Virtual(target) => {
                match file_kind(&target) {
                    Some(FileKind::Style) => {
                        if let Some(css) = self.host.load(&target) {
                            self.add_css(&target, &css);
                            self.modules.push(target);
                        }
                        return None;
                    }
                    Some(FileKind::Script) if !required.is_empty() => {
                        let missing: Vec<String> = match self.exports_of(&target) {
                            Some(exports) => required
                                .iter()
                                .filter(|name| !exports.provides(name))
                                .cloned()
                                .collect(),
                            None => Vec::new(),
                        };
                        for name in missing {
                            self.error_at(
                                format!("No matching export in \"{target}\" for import \"{name}\""),
                                importer,
                                source,
                                offset,
                            );
                        }
                    }
                    _ => {}
                }
                self.enqueue(&target);
                Some(target)
            }
            Resolution::Asset { id, source: asset } => {
                if self.visited.insert(id.clone()) {
                    self.defines.push((id.clone(), rewrite_exports(&asset)));
                }
                Some(id)
            }
            Resolution::External(specifier) => Some(specifier),
        }
    }

    fn rewrite_imports(&mut self, path: &str, source: &str) -> String {
        let body = IMPORT_STMT.replace_all(source, |caps: &Captures| {
            if caps.get(1).is_some() {
                return String::new();
            }
            let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let clause = ImportClause::parse(caps.get(2).map(|m| m.as_str()).unwrap_or(""));
            let required = clause.required_exports();
            match self.link(&caps[3], path, source, offset, &required) {
                Some(id) => {
                    self.temp_counter += 1;
                    clause.render(&format!("__forge_require({})", quote(&id)), self.temp_counter)
                }
                None if clause.default.is_some() || clause.namespace.is_some() => {
                    let name = clause.default.as_ref().or(clause.namespace.as_ref()).cloned().unwrap_or_default();
                    format!("const {name} = {{}};")
                }
                None => String::new(),
            }
        });

        let body = REEXPORT_STMT.replace_all(&body, |caps: &Captures| {
            if caps.get(1).is_some() {
                return String::new();
            }
            let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
            let form = caps[2].trim().to_string();
            let Some(id) = self.link(&caps[3], path, source, offset, &[]) else {
                return String::new();
            };
            let module_ref = format!("__forge_require({})", quote(&id));

            if let Some(ns) = form.strip_prefix('*') {
                let ns = ns.trim().trim_start_matches("as").trim();
                if ns.is_empty() {
                    return format!("__forge_reexport(exports, {module_ref});");
                }
                return format!("exports.{ns} = {module_ref};");
            }

            let inner = form.trim_start_matches('{').trim_end_matches('}');
            let assignments: Vec<String> = inner
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty() && !item.starts_with("type "))
                .map(|item| {
                    let (local, exported) = item
                        .split_once(" as ")
                        .map(|(l, e)| (l.trim(), e.trim()))
                        .unwrap_or((item, item));
                    format!("exports.{exported} = __m.{local};")
                })
                .collect();
            format!("(function (__m) {{ {} }})({module_ref});", assignments.join(" "))
        });

        let body = DYNAMIC_IMPORT.replace_all(&body, |caps: &Captures| {
            let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
            match self.link(&caps[1], path, source, offset, &[]) {
                Some(id) => format!("Promise.resolve(__forge_require({}))", quote(&id)),
                None => "Promise.resolve({})".to_string(),
            }
        });

        REQUIRE_CALL
            .replace_all(&body, |caps: &Captures| {
                let offset = caps.get(0).map(|m| m.start()).unwrap_or(0);
                match self.link(&caps[1], path, source, offset, &[]) {
                    Some(id) => format!("__forge_require({})", quote(&id)),
                    None => "({})".to_string(),
                }
            })
            .into_owned()
    }

    fn finish(self, entry: &str) -> BackendResult<BuildOutput> {
        if !self.errors.is_empty() {
            return Err(BackendError::BuildFailed(self.errors));
        }

        let mut code = String::from(PRELUDE);
        for (id, body) in &self.defines {
            code.push_str(&format!(
                "__forge_define({}, function (module, exports) {{\n{}\n}});\n",
                quote(id),
                body
            ));
        }
        code.push_str(&format!("__forge_require({});\n}})();\n", quote(entry)));

        Ok(BuildOutput {
            code,
            css: self.css,
            warnings: Vec::new(),
            modules: self.modules,
        })
    }
}

/// The default, dependency-free compile backend.
#[derive(Debug, Default)]
pub struct LinkerBackend {
    initialized: AtomicBool,
}

impl LinkerBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link synchronously.
    pub fn link(&self, entry: &str, host: &dyn ModuleHost) -> BackendResult<BuildOutput> {
        let mut run = LinkRun::new(host);
        run.run(entry);
        run.finish(entry)
    }
}

#[async_trait]
impl CompileBackend for LinkerBackend {
    fn name(&self) -> &str {
        "linker"
    }

    async fn initialize(&self) -> BackendResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(BackendError::AlreadyInitialized);
        }
        // Compile the pattern set up front so the first build pays nothing.
        LazyLock::force(&IMPORT_STMT);
        LazyLock::force(&REEXPORT_STMT);
        LazyLock::force(&DYNAMIC_IMPORT);
        LazyLock::force(&REQUIRE_CALL);
        LazyLock::force(&EXPORT_DEFAULT_NAMED);
        LazyLock::force(&EXPORT_DECL);
        LazyLock::force(&EXPORT_LIST);
        info!("Linker backend initialized");
        Ok(())
    }

    async fn build(&self, entry: &str, host: &dyn ModuleHost) -> BackendResult<BuildOutput> {
        self.link(entry, host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::VirtualResolver;
    use crate::SourceMap;

    fn files(entries: &[(&str, &str)]) -> SourceMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_import_clause_parse() {
        assert_eq!(
            ImportClause::parse("React, { useState, useEffect as ue, type FC }"),
            ImportClause {
                default: Some("React".into()),
                namespace: None,
                named: vec![
                    ("useState".into(), "useState".into()),
                    ("useEffect".into(), "ue".into()),
                ],
            }
        );
        assert_eq!(
            ImportClause::parse("* as Icons").namespace.as_deref(),
            Some("Icons")
        );
        assert_eq!(ImportClause::parse(""), ImportClause::default());
    }

    #[test]
    fn test_import_clause_render() {
        let clause = ImportClause::parse("React, { useState }");
        assert_eq!(
            clause.render("__forge_require(\"react\")", 1),
            "const __forge_m1 = __forge_require(\"react\"); const React = __forge_default(__forge_m1); const { useState } = __forge_m1;"
        );
        let side_effect = ImportClause::parse("");
        assert_eq!(side_effect.render("__forge_require(\"x\")", 2), "__forge_require(\"x\");");
    }

    #[test]
    fn test_rewrite_exports() {
        let out = rewrite_exports(
            "export default function App() {}\nexport const a = 1;\nconst b = 2;\nexport { b as beta };\nexport interface P {}",
        );
        assert!(out.starts_with("exports.__esModule = true;"));
        assert!(out.contains("\nfunction App() {}"));
        assert!(out.contains("\nconst a = 1;"));
        assert!(out.contains("exports.default = App;"));
        assert!(out.contains("exports.a = a;"));
        assert!(out.contains("exports.beta = b;"));
        assert!(out.contains("\ninterface P {}"));
        assert!(!out.contains("export "));
    }

    #[test]
    fn test_link_graph_with_css_and_externals() {
        let map = files(&[
            ("main.tsx", "import React from 'react';\nimport App from './App';\nimport './index.css';\ncreateRoot(el).render(<App />);"),
            ("App.tsx", "import { Button } from './components/Button';\nexport default function App() { return <Button />; }"),
            ("components/Button.tsx", "export function Button() { return <button />; }"),
            ("index.css", "body { margin: 0; }"),
        ]);
        let resolver = VirtualResolver::new(&map);
        let output = LinkerBackend::new().link("main.tsx", &resolver).unwrap();

        assert!(output.code.contains("__forge_define(\"App.tsx\""));
        assert!(output.code.contains("__forge_define(\"components/Button.tsx\""));
        assert!(output.code.contains("__forge_require(\"main.tsx\");"));
        assert!(output.css.contains("body { margin: 0; }"));
        assert_eq!(resolver.externals(), vec!["react".to_string()]);
        assert_eq!(output.modules[0], "main.tsx");
    }

    #[test]
    fn test_link_reports_missing_named_export() {
        let map = files(&[
            ("App.tsx", "import { Card } from './Card';\nexport default function App() { return <Card />; }"),
            ("Card.tsx", "export function Tile() { return null; }"),
        ]);
        let resolver = VirtualResolver::new(&map);
        let err = LinkerBackend::new().link("App.tsx", &resolver).unwrap_err();
        match err {
            BackendError::BuildFailed(messages) => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].text, "No matching export in \"Card.tsx\" for import \"Card\"");
                assert_eq!(messages[0].file.as_deref(), Some("App.tsx"));
                assert_eq!(messages[0].line, Some(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_link_collects_all_errors() {
        let map = files(&[
            ("App.tsx", "import Broken from './Broken';\nexport default function App() { return <Nope />; }"),
            ("Broken.tsx", "export default function Broken() {"),
        ]);
        let resolver = VirtualResolver::new(&map);
        let err = LinkerBackend::new().link("App.tsx", &resolver).unwrap_err();
        let BackendError::BuildFailed(messages) = err else {
            panic!("expected build failure");
        };
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.text == "ReferenceError: Nope is not defined"));
        assert!(messages
            .iter()
            .any(|m| m.text.starts_with("Unexpected end of file") && m.file.as_deref() == Some("Broken.tsx")));
    }

    #[test]
    fn test_asset_and_json_modules() {
        let map = files(&[
            ("App.tsx", "import logo from './logo.png';\nimport data from './data.json';\nexport default function App() { return null; }"),
            ("data.json", "{\"items\": [1, 2]}"),
        ]);
        let resolver = VirtualResolver::new(&map);
        let output = LinkerBackend::new().link("App.tsx", &resolver).unwrap();
        assert!(output.code.contains("__forge_define(\"asset:logo.png\""));
        assert!(output.code.contains("data:image/gif;base64"));
        assert!(output.code.contains("module.exports = {\"items\": [1, 2]};"));
    }

    #[tokio::test]
    async fn test_initialize_reports_second_call() {
        let backend = LinkerBackend::new();
        assert!(backend.initialize().await.is_ok());
        assert!(matches!(
            backend.initialize().await,
            Err(BackendError::AlreadyInitialized)
        ));
    }
}
