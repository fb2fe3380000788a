//! Fix strategy dispatch.
//!
//! A diagnosis becomes either a direct patch (`fixed_code`) or a repair
//! directive (`ai_prompt`) for the external repair collaborator. Only the
//! known-identifier import case patches directly.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::ClassifiedError;
use crate::identifiers::{lookup, ImportStyle, KnownIdentifier};
use crate::kind::ErrorKind;

static REQUESTED_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:requested module ['"]([^'"]+)['"] )?does not provide an export named ['"]?([\w$]+)"#).unwrap()
});

static NO_MATCHING_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"No matching export in "([^"]+)" for import "([^"]+)""#).unwrap());

static NO_EXPORTED_MEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Module ['"]{1,2}([^'"]+)['"]{1,2} has no exported member ['"]([\w$]+)['"]"#).unwrap()
});

static UNDEFINED_IDENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b([A-Za-z_$][\w$]*) is not defined|Cannot find name ['"]([\w$]+)['"]"#).unwrap()
});

static UNRESOLVED_MODULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:Cannot find module|Could not resolve|Failed to resolve import|Can't resolve)\s+['"]([^'"]+)['"]"#)
        .unwrap()
});

static NULL_ACCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Cannot read propert(?:y|ies) of (undefined|null)(?: \(reading ['"]([^'"]+)['"]\))?"#).unwrap()
});

static NOT_A_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\w$.\[\]]+) is not a function").unwrap());

static NOT_ASSIGNABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Type '([^']+)' is not assignable to type '([^']+)'").unwrap());

static MISSING_PROPERTY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Property '([\w$]+)' does not exist on type '([^']+)'").unwrap());

static USED_BEFORE_INIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Cannot access ['"]?([\w$]+)['"]? before initialization"#).unwrap()
});

static UNEXPECTED_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"Unexpected (?:token\s*['"`]?([^'"`\s]*)['"`]?|"([^"]+)")"#).unwrap()
});

static HOOK_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"React Hook "?([\w$]+)"?"#).unwrap());

/// Outcome of applying a fix strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_code: Option<String>,
    pub description: String,
    pub strategy: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_file: Option<String>,
}

impl FixResult {
    fn patch(error: &ClassifiedError, fixed_code: String, description: impl Into<String>) -> Self {
        Self {
            success: true,
            fixed_code: Some(fixed_code),
            description: description.into(),
            strategy: error.kind,
            ai_prompt: None,
            target_file: error.file.clone(),
        }
    }

    fn directive(error: &ClassifiedError, description: impl Into<String>, prompt: String) -> Self {
        Self {
            success: true,
            fixed_code: None,
            description: description.into(),
            strategy: error.kind,
            ai_prompt: Some(prompt),
            target_file: error.file.clone(),
        }
    }

    fn uninterpretable(error: &ClassifiedError, description: impl Into<String>) -> Self {
        Self {
            success: false,
            fixed_code: None,
            description: description.into(),
            strategy: error.kind,
            ai_prompt: None,
            target_file: error.file.clone(),
        }
    }

    /// Whether this result carries a patch that applies without a collaborator.
    pub fn is_direct_patch(&self) -> bool {
        self.success && self.fixed_code.is_some()
    }
}

fn error_text(error: &ClassifiedError) -> &str {
    if error.original_error.trim().is_empty() {
        &error.message
    } else {
        &error.original_error
    }
}

/// " at line L, column C" as far as known.
fn position(error: &ClassifiedError) -> String {
    match (error.line, error.column) {
        (Some(line), Some(column)) => format!(" at line {line}, column {column}"),
        (Some(line), None) => format!(" at line {line}"),
        _ => String::new(),
    }
}

fn build_prompt(error: &ClassifiedError, source: &str, instruction: &str) -> String {
    let file = error.file.as_deref().unwrap_or("the affected file");
    let mut prompt = format!(
        "Fix the {} in {}.\n\nError: {}\n",
        error.kind.label().to_lowercase(),
        file,
        error.message
    );
    if let Some(location) = error.location() {
        prompt.push_str(&format!("Location: {location}\n"));
    }
    let offending = error
        .line
        .filter(|line| *line >= 1)
        .and_then(|line| source.lines().nth(line as usize - 1))
        .map(str::trim)
        .filter(|line| !line.is_empty());
    if let Some(line) = offending {
        prompt.push_str(&format!("Offending line: {line}\n"));
    }
    prompt.push_str(&format!("\n{instruction}\n\nReturn the complete corrected file content only."));
    prompt
}

fn generic(error: &ClassifiedError, source: &str) -> FixResult {
    let instruction = format!("Diagnose and fix the problem. Hint: {}", error.suggestion);
    FixResult::directive(
        error,
        format!("Requested repair for {}", error.kind.label().to_lowercase()),
        build_prompt(error, source, &instruction),
    )
}

/// Apply the strategy for `error.kind` to `source`.
pub fn apply_strategy(error: &ClassifiedError, source: &str) -> FixResult {
    debug!("Applying {} strategy", error.kind);
    match error.kind {
        ErrorKind::ImportMissing => fix_import(error, source),
        ErrorKind::TypeError => fix_type_error(error, source),
        ErrorKind::Runtime => fix_runtime(error, source),
        ErrorKind::Syntax => fix_syntax(error, source),
        ErrorKind::LifecycleViolation => fix_lifecycle(error, source),
        ErrorKind::Style | ErrorKind::Unknown => generic(error, source),
    }
}

fn fix_import(error: &ClassifiedError, source: &str) -> FixResult {
    let text = error_text(error);

    let missing_export = NO_MATCHING_EXPORT
        .captures(text)
        .or_else(|| NO_EXPORTED_MEMBER.captures(text))
        .map(|c| (c.get(1).map(|m| m.as_str().to_string()), c[2].to_string()))
        .or_else(|| {
            REQUESTED_EXPORT
                .captures(text)
                .map(|c| (c.get(1).map(|m| m.as_str().to_string()), c[2].to_string()))
        });
    if let Some((module, name)) = missing_export {
        let module = module.unwrap_or_else(|| "the imported module".to_string());
        let instruction = format!(
            "`{module}` does not export `{name}`. Change the import to a name `{module}` actually exports, switch between default and named import as appropriate, or add the missing export to `{module}` if it is a project file."
        );
        return FixResult::directive(
            error,
            format!("`{module}` has no export `{name}`"),
            build_prompt(error, source, &instruction),
        );
    }

    if let Some(caps) = UNDEFINED_IDENT.captures(text) {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();

        if let Some(known) = lookup(name) {
            if let Some(fixed) = add_import(source, known) {
                return FixResult::patch(
                    error,
                    fixed,
                    format!("Added import of `{}` from '{}'", known.name, known.module),
                );
            }
        }

        let instruction = format!(
            "`{name}` is used but never imported or declared. Import it from the module that provides it, or define it in this file (for a component, create a simple implementation)."
        );
        return FixResult::directive(
            error,
            format!("`{name}` is not defined"),
            build_prompt(error, source, &instruction),
        );
    }

    if let Some(caps) = UNRESOLVED_MODULE.captures(text) {
        let module = &caps[1];
        let instruction = format!(
            "The import `{module}` cannot be resolved. Fix the import path to an existing file, or remove the import and inline what it provided."
        );
        return FixResult::directive(
            error,
            format!("Module `{module}` cannot be resolved"),
            build_prompt(error, source, &instruction),
        );
    }

    FixResult::uninterpretable(error, "Could not identify the missing import")
}

/// Splice `known` into an existing import from its module, or prepend a
/// new import. `None` when the identifier is already imported from there.
pub fn add_import(source: &str, known: &KnownIdentifier) -> Option<String> {
    let pattern = format!(
        r#"(?m)^import\s+([^;'"]*?)\s+from\s+['"]{}['"]"#,
        regex::escape(known.module)
    );
    let existing = Regex::new(&pattern).ok()?;

    for caps in existing.captures_iter(source) {
        let Some(clause) = caps.get(1) else {
            continue;
        };
        if is_type_only(clause.as_str()) {
            continue;
        }
        match merge_clause(clause.as_str(), known) {
            Merge::Merged(merged) => {
                let mut fixed = String::with_capacity(source.len() + known.name.len() + 4);
                fixed.push_str(&source[..clause.start()]);
                fixed.push_str(&merged);
                fixed.push_str(&source[clause.end()..]);
                return Some(fixed);
            }
            Merge::AlreadyPresent => return None,
            Merge::Incompatible => {}
        }
    }

    let statement = match known.style {
        ImportStyle::Named => format!("import {{ {} }} from '{}';\n", known.name, known.module),
        ImportStyle::Default => format!("import {} from '{}';\n", known.name, known.module),
    };

    // Directive prologues ('use client') must stay first.
    let directive_end = leading_directive_end(source);
    let mut fixed = String::with_capacity(source.len() + statement.len());
    fixed.push_str(&source[..directive_end]);
    fixed.push_str(&statement);
    fixed.push_str(&source[directive_end..]);
    Some(fixed)
}

/// `import type ...` binds no values, so nothing may be merged into it.
fn is_type_only(clause: &str) -> bool {
    clause
        .trim_start()
        .strip_prefix("type")
        .is_some_and(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '{'))
}

fn leading_directive_end(source: &str) -> usize {
    let mut end = 0;
    for line in source.split_inclusive('\n') {
        let trimmed = line.trim();
        let is_directive = (trimmed.starts_with("'use ") || trimmed.starts_with("\"use "))
            && trimmed.trim_end_matches(';').ends_with(['\'', '"']);
        if !is_directive {
            break;
        }
        end += line.len();
    }
    if end > 0 && !source[..end].ends_with('\n') {
        // A directive without a trailing newline: keep the statement on its own line.
        return 0;
    }
    end
}

enum Merge {
    Merged(String),
    AlreadyPresent,
    Incompatible,
}

fn merge_clause(clause: &str, known: &KnownIdentifier) -> Merge {
    let clause = clause.trim();
    if clause.contains('*') {
        return Merge::Incompatible;
    }

    let (mut default_binding, mut names) = match clause.find('{') {
        Some(open) => {
            let default_part = clause[..open].trim().trim_end_matches(',').trim().to_string();
            let inner = clause[open + 1..].trim_end().trim_end_matches('}');
            let names: Vec<String> = inner
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            (default_part, names)
        }
        None => (clause.to_string(), Vec::new()),
    };

    match known.style {
        ImportStyle::Named => {
            let bound = names
                .iter()
                .any(|n| n == known.name || n.ends_with(&format!(" as {}", known.name)));
            if bound {
                return Merge::AlreadyPresent;
            }
            names.push(known.name.to_string());
        }
        ImportStyle::Default => {
            if default_binding == known.name {
                return Merge::AlreadyPresent;
            }
            if !default_binding.is_empty() {
                return Merge::Incompatible;
            }
            default_binding = known.name.to_string();
        }
    }

    let merged = match (default_binding.is_empty(), names.is_empty()) {
        (true, _) => format!("{{ {} }}", names.join(", ")),
        (false, true) => default_binding,
        (false, false) => format!("{}, {{ {} }}", default_binding, names.join(", ")),
    };
    Merge::Merged(merged)
}

fn fix_type_error(error: &ClassifiedError, source: &str) -> FixResult {
    let text = error_text(error);

    let (description, instruction) = if let Some(caps) = NULL_ACCESS.captures(text) {
        let nullish = &caps[1];
        match caps.get(2) {
            Some(property) => (
                format!("Reading `{}` of {nullish}", property.as_str()),
                format!(
                    "A value is {nullish} when `.{}` is read from it. Initialize state with a sensible default (for example an empty array), guard the access with optional chaining, or render a fallback until the data exists.",
                    property.as_str()
                ),
            ),
            None => (
                format!("Property access on {nullish}"),
                format!("A value is {nullish} when a property is read from it. Add a guard or a default value."),
            ),
        }
    } else if let Some(caps) = NOT_A_FUNCTION.captures(text) {
        let callee = &caps[1];
        (
            format!("`{callee}` is not a function"),
            format!(
                "`{callee}` is called but is not a function. Check that it is imported correctly (default vs named) and that the value has the expected type, e.g. that `.map` is called on an array."
            ),
        )
    } else if let Some(caps) = NOT_ASSIGNABLE.captures(text) {
        (
            format!("`{}` is not assignable to `{}`", &caps[1], &caps[2]),
            format!(
                "A value of type `{}` is used where `{}` is expected. Convert the value or correct the declared type.",
                &caps[1], &caps[2]
            ),
        )
    } else if let Some(caps) = MISSING_PROPERTY.captures(text) {
        (
            format!("`{}` missing on `{}`", &caps[1], &caps[2]),
            format!(
                "Property `{}` does not exist on type `{}`. Add it to the type definition or use a property that exists.",
                &caps[1], &caps[2]
            ),
        )
    } else {
        return generic(error, source);
    };

    FixResult::directive(error, description, build_prompt(error, source, &instruction))
}

fn fix_runtime(error: &ClassifiedError, source: &str) -> FixResult {
    let text = error_text(error);

    if text.contains("Maximum call stack size exceeded") || text.contains("too much recursion") {
        let instruction = "The code recurses without end. Look for a component that renders itself, a function that calls itself without a base case, or an effect that updates state listed in its own dependency array. Add the missing dependency array or break the cycle.";
        return FixResult::directive(
            error,
            "Infinite recursion",
            build_prompt(error, source, instruction),
        );
    }

    if let Some(caps) = USED_BEFORE_INIT.captures(text) {
        let instruction = format!(
            "`{}` is read before its declaration has run. Move the declaration above its first use.",
            &caps[1]
        );
        return FixResult::directive(
            error,
            format!("`{}` used before initialization", &caps[1]),
            build_prompt(error, source, &instruction),
        );
    }

    if text.contains("ReferenceError") {
        let name = UNDEFINED_IDENT
            .captures(text)
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().to_string());
        let instruction = match &name {
            Some(name) => format!("`{name}` does not exist at runtime. Import or declare it."),
            None => "A referenced name does not exist at runtime. Import or declare it.".to_string(),
        };
        return FixResult::directive(
            error,
            "Reference error",
            build_prompt(error, source, &instruction),
        );
    }

    generic(error, source)
}

fn fix_syntax(error: &ClassifiedError, source: &str) -> FixResult {
    let text = error_text(error);
    let at = position(error);

    let (description, instruction) = if text.contains("Unterminated string") || text.contains("Unterminated template") {
        (
            format!("Unterminated literal{at}"),
            format!("A string or template literal opened{at} is never closed. Add the missing closing quote or backtick."),
        )
    } else if text.contains("Unexpected end of input") || text.contains("Unexpected end of file") {
        (
            format!("Unexpected end of input{at}"),
            "The file ends before all brackets, braces or JSX tags are closed. It was probably truncated; complete the remaining code and close every open block.".to_string(),
        )
    } else if let Some(caps) = UNEXPECTED_TOKEN.captures(text) {
        let token = caps
            .get(1)
            .filter(|m| !m.as_str().is_empty())
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or("token");
        (
            format!("Unexpected `{token}`{at}"),
            format!("There is an unexpected `{token}`{at}. Check for a missing or extra bracket, comma or closing JSX tag just before it."),
        )
    } else {
        return generic(error, source);
    };

    FixResult::directive(error, description, build_prompt(error, source, &instruction))
}

fn fix_lifecycle(error: &ClassifiedError, source: &str) -> FixResult {
    let text = error_text(error);
    let hook = HOOK_NAME
        .captures(text)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| "the hook".to_string());

    let (description, instruction) = if text.contains("called conditionally") {
        (
            format!("`{hook}` called conditionally"),
            format!("Move `{hook}` to the top level of the component so it runs on every render, before any early return. Put the condition inside the hook's callback instead."),
        )
    } else if text.contains("Invalid hook call")
        || text.contains("is called in function")
        || text.contains("cannot be called")
    {
        (
            format!("`{hook}` called outside a component"),
            format!("`{hook}` is called outside the body of a function component or custom hook. Move the call into a component, or turn the surrounding function into a custom hook whose name starts with `use`."),
        )
    } else if text.contains("Rendered more hooks") || text.contains("Rendered fewer hooks") {
        (
            "Hook count changed between renders".to_string(),
            "The number of hooks differs between renders. Remove early returns placed before hook calls and never call hooks inside loops or conditions.".to_string(),
        )
    } else {
        return generic(error, source);
    };

    FixResult::directive(error, description, build_prompt(error, source, &instruction))
}
