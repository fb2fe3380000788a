//! Raw error text to typed diagnosis.
//!
//! Classification walks an ordered pattern table and stops at the first
//! match. Confidence values are static per pattern; only the fallback path
//! uses a fixed low confidence.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::kind::ErrorKind;

/// Confidence assigned when no pattern matches.
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

/// Minimum confidence for automatic repair.
pub const AUTO_FIX_THRESHOLD: f64 = 0.7;

/// Kinds a repair attempt may be spent on.
pub const AUTO_FIXABLE_KINDS: [ErrorKind; 4] = [
    ErrorKind::ImportMissing,
    ErrorKind::TypeError,
    ErrorKind::Syntax,
    ErrorKind::LifecycleViolation,
];

/// Stack fragment: `at name (file:line:col)` or `at file:line:col`.
static STACK_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bat\s+(?:[^\s(]+\s+)?\(?([^\s()]+?):(\d+):(\d+)\)?").unwrap()
});

/// Bare `file.ext:line:col` or `file.ext(line,col)` reference.
static BARE_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w@./-]+\.(?:tsx|ts|jsx|js|mjs|cjs|css|json))(?::(\d+)(?::(\d+))?|\((\d+),(\d+)\))?")
        .unwrap()
});

static URL_ORIGIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9+.-]*://[^/]*").unwrap());

type SuggestionFn = Box<dyn Fn(&Captures, &str) -> String + Send + Sync>;

/// One entry of the classification table.
pub struct ErrorPattern {
    pub kind: ErrorKind,
    pub regex: Regex,
    pub confidence: f64,
    suggestion: SuggestionFn,
}

impl ErrorPattern {
    pub fn new<F>(kind: ErrorKind, pattern: &str, confidence: f64, suggestion: F) -> Result<Self, regex::Error>
    where
        F: Fn(&Captures, &str) -> String + Send + Sync + 'static,
    {
        Ok(Self {
            kind,
            regex: Regex::new(pattern)?,
            confidence,
            suggestion: Box::new(suggestion),
        })
    }
}

impl std::fmt::Debug for ErrorPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorPattern")
            .field("kind", &self.kind)
            .field("regex", &self.regex.as_str())
            .field("confidence", &self.confidence)
            .finish()
    }
}

/// A raw error reduced to a typed, located, scored diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub original_error: String,
    pub suggestion: String,
    pub confidence: f64,
    /// Remaining lines of the raw error (usually the stack).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ClassifiedError {
    /// Location as `file:line:col`, as far as known.
    pub fn location(&self) -> Option<String> {
        let file = self.file.as_ref()?;
        Some(match (self.line, self.column) {
            (Some(line), Some(column)) => format!("{file}:{line}:{column}"),
            (Some(line), None) => format!("{file}:{line}"),
            _ => file.clone(),
        })
    }
}

fn p<F>(kind: ErrorKind, pattern: &str, confidence: f64, suggestion: F) -> ErrorPattern
where
    F: Fn(&Captures, &str) -> String + Send + Sync + 'static,
{
    ErrorPattern::new(kind, pattern, confidence, suggestion).unwrap()
}

fn cap<'c>(caps: &'c Captures, index: usize) -> &'c str {
    caps.get(index).map(|m| m.as_str()).unwrap_or("")
}

/// The built-in classification table, in match order.
pub fn default_patterns() -> Vec<ErrorPattern> {
    use ErrorKind::*;

    vec![
        // Missing imports and exports
        p(ImportMissing, r#"does not provide an export named ['"]?([\w$]+)['"]?"#, 0.9, |c, _| {
            format!("The imported module does not export `{}`. Import an existing export or add the missing export.", cap(c, 1))
        }),
        p(ImportMissing, r#"No matching export in "([^"]+)" for import "([^"]+)""#, 0.9, |c, _| {
            format!("`{}` does not export `{}`. Use the name it actually exports or add the export.", cap(c, 1), cap(c, 2))
        }),
        p(ImportMissing, r#"Module ['"]{1,2}([^'"]+)['"]{1,2} has no exported member ['"]([\w$]+)['"]"#, 0.9, |c, _| {
            format!("`{}` has no exported member `{}`.", cap(c, 1), cap(c, 2))
        }),
        p(ImportMissing, r#"(?:Cannot find module|Could not resolve|Failed to resolve import|Module not found:.*?Can't resolve)\s+['"]([^'"]+)['"]"#, 0.9, |c, _| {
            format!("The module `{}` cannot be resolved. Check the path or create the file.", cap(c, 1))
        }),
        p(ImportMissing, r#"Cannot find name ['"]([\w$]+)['"]"#, 0.85, |c, _| {
            format!("`{}` is used but never imported or declared.", cap(c, 1))
        }),
        p(ImportMissing, r"\b([A-Za-z_$][\w$]*) is not defined", 0.85, |c, _| {
            format!("`{}` is used but never imported or declared. Add the missing import or define it.", cap(c, 1))
        }),
        // Hook rules
        p(LifecycleViolation, r#"React Hook "?([\w$]+)"? is called conditionally"#, 0.85, |c, _| {
            format!("Move `{}` to the top level of the component, before any early return or condition.", cap(c, 1))
        }),
        p(LifecycleViolation, r"Invalid hook call", 0.85, |_, _| {
            "Hooks may only be called inside the body of a function component or custom hook.".to_string()
        }),
        p(LifecycleViolation, r#"React Hook "?([\w$]+)"? (?:is called in function|cannot be called)"#, 0.85, |c, _| {
            format!("`{}` is called outside a component or custom hook.", cap(c, 1))
        }),
        p(LifecycleViolation, r"Rendered (more|fewer) hooks than", 0.8, |c, _| {
            format!("A render called {} hooks than the previous one; hooks must run unconditionally in the same order.", cap(c, 1))
        }),
        // Type errors
        p(TypeError, r#"Cannot read propert(?:y|ies) of (undefined|null)(?: \(reading ['"]([^'"]+)['"]\))?"#, 0.8, |c, _| {
            let property = cap(c, 2);
            if property.is_empty() {
                format!("A value is {} when it is accessed. Guard it or provide a default.", cap(c, 1))
            } else {
                format!("Reading `{}` from a value that is {}. Guard it with optional chaining or provide a default.", property, cap(c, 1))
            }
        }),
        p(TypeError, r"([\w$.\[\]]+) is not a function", 0.8, |c, _| {
            format!("`{}` is not callable here. Check its type and how it is imported.", cap(c, 1))
        }),
        p(TypeError, r"Type '([^']+)' is not assignable to type '([^']+)'", 0.8, |c, _| {
            format!("A `{}` is passed where `{}` is expected.", cap(c, 1), cap(c, 2))
        }),
        p(TypeError, r"Property '([\w$]+)' does not exist on type '([^']+)'", 0.8, |c, _| {
            format!("`{}` is not declared on `{}`. Add it to the type or use an existing property.", cap(c, 1), cap(c, 2))
        }),
        // Syntax
        p(Syntax, r"Unterminated (?:string|template)(?: literal| constant)?", 0.85, |_, _| {
            "Close the unterminated string or template literal.".to_string()
        }),
        p(Syntax, r"Unexpected end of (?:input|file)", 0.85, |_, _| {
            "The file ends before every block is closed; it is probably truncated.".to_string()
        }),
        p(Syntax, r#"Unexpected (?:token\s*['"`]?([^'"`\s]*)['"`]?|"([^"]+)")"#, 0.8, |c, _| {
            let token = if cap(c, 1).is_empty() { cap(c, 2) } else { cap(c, 1) };
            format!("Unexpected `{token}`; check the surrounding brackets and JSX.")
        }),
        p(Syntax, r"SyntaxError", 0.7, |_, _| "Fix the syntax error at the reported location.".to_string()),
        // Runtime
        p(Runtime, r"Maximum call stack size exceeded|too much recursion", 0.8, |_, _| {
            "Infinite recursion: look for a component that renders itself or an effect that updates its own dependency.".to_string()
        }),
        p(Runtime, r"Too many re-renders", 0.8, |_, _| {
            "State is set during render. Move the update into an event handler or effect.".to_string()
        }),
        p(Runtime, r#"Cannot access ['"]?([\w$]+)['"]? before initialization"#, 0.75, |c, _| {
            format!("`{}` is used before its declaration runs; reorder the declarations.", cap(c, 1))
        }),
        p(Runtime, r"ReferenceError", 0.6, |_, _| "A name is referenced that does not exist at runtime.".to_string()),
        // Style and markup
        p(Style, r"Invalid DOM property `([\w-]+)`(?:\. Did you mean `([\w-]+)`)?", 0.6, |c, _| {
            match c.get(2) {
                Some(fix) => format!("Rename `{}` to `{}`.", cap(c, 1), fix.as_str()),
                None => format!("`{}` is not a valid DOM property.", cap(c, 1)),
            }
        }),
        p(Style, r"The `([^`]+)` class does not exist", 0.6, |c, _| {
            format!("The utility class `{}` is not defined by the stylesheet.", cap(c, 1))
        }),
        p(Style, r#"unique "key" prop"#, 0.6, |_, _| "Give each element rendered from a list a stable `key`.".to_string()),
        p(Style, r"(?i)unknown (?:css )?property|unknown at rule|Unsupported style property", 0.6, |_, _| {
            "Remove or correct the unknown style property.".to_string()
        }),
    ]
}

fn normalize_file(raw: &str) -> String {
    let without_origin = URL_ORIGIN.replace(raw, "");
    let path = without_origin.split(['?', '#']).next().unwrap_or("");
    path.trim_start_matches("./").trim_start_matches('/').to_string()
}

fn parse_u32(caps: &Captures, index: usize) -> Option<u32> {
    caps.get(index).and_then(|m| m.as_str().parse().ok())
}

/// Pull `(file, line, column)` out of raw error text.
pub fn extract_location(raw: &str) -> (Option<String>, Option<u32>, Option<u32>) {
    if let Some(caps) = STACK_LOCATION.captures(raw) {
        return (
            Some(normalize_file(cap(&caps, 1))),
            parse_u32(&caps, 2),
            parse_u32(&caps, 3),
        );
    }
    if let Some(caps) = BARE_LOCATION.captures(raw) {
        let line = parse_u32(&caps, 2).or_else(|| parse_u32(&caps, 4));
        let column = parse_u32(&caps, 3).or_else(|| parse_u32(&caps, 5));
        return (Some(normalize_file(cap(&caps, 1))), line, column);
    }
    (None, None, None)
}

/// First meaningful line of the raw text, without console prefixes.
fn headline(raw: &str) -> (String, Option<String>) {
    let trimmed = raw.trim();
    let (first, rest) = match trimmed.split_once('\n') {
        Some((first, rest)) => (first, Some(rest)),
        None => (trimmed, None),
    };
    let first = first.trim();
    let first = first.strip_prefix("Uncaught ").unwrap_or(first);
    let context = rest
        .map(str::trim)
        .filter(|rest| !rest.is_empty())
        .map(str::to_string);
    (first.to_string(), context)
}

/// Ordered-table error classifier.
#[derive(Debug)]
pub struct ErrorClassifier {
    patterns: Vec<ErrorPattern>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self {
            patterns: default_patterns(),
        }
    }

    /// Add a pattern that is tried before the built-in table.
    pub fn with_pattern(mut self, pattern: ErrorPattern) -> Self {
        self.patterns.insert(0, pattern);
        self
    }

    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.patterns
    }

    /// Classify one raw error. Never fails.
    pub fn classify(&self, raw: &str) -> ClassifiedError {
        let (message, context) = headline(raw);
        let (file, line, column) = extract_location(raw);

        for pattern in &self.patterns {
            if let Some(caps) = pattern.regex.captures(raw) {
                debug!("Classified as {} ({:.2}): {}", pattern.kind, pattern.confidence, message);
                return ClassifiedError {
                    kind: pattern.kind,
                    suggestion: (pattern.suggestion)(&caps, raw),
                    confidence: pattern.confidence,
                    message,
                    file,
                    line,
                    column,
                    original_error: raw.to_string(),
                    context,
                };
            }
        }

        debug!("No pattern matched: {}", message);
        ClassifiedError {
            kind: ErrorKind::Unknown,
            suggestion: "Review the error output and the recently changed code.".to_string(),
            confidence: FALLBACK_CONFIDENCE,
            message,
            file,
            line,
            column,
            original_error: raw.to_string(),
            context,
        }
    }

    /// Classify, deduplicate by `(kind, message)` and sort by confidence.
    pub fn classify_many<S: AsRef<str>>(&self, raws: &[S]) -> Vec<ClassifiedError> {
        let mut seen = HashSet::new();
        let mut classified: Vec<ClassifiedError> = raws
            .iter()
            .map(|raw| self.classify(raw.as_ref()))
            .filter(|c| seen.insert((c.kind, c.message.clone())))
            .collect();
        classified.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        classified
    }
}

static DEFAULT_CLASSIFIER: LazyLock<ErrorClassifier> = LazyLock::new(ErrorClassifier::new);

/// Classify with the built-in table.
pub fn classify(raw: &str) -> ClassifiedError {
    DEFAULT_CLASSIFIER.classify(raw)
}

/// [`ErrorClassifier::classify_many`] with the built-in table.
pub fn classify_many<S: AsRef<str>>(raws: &[S]) -> Vec<ClassifiedError> {
    DEFAULT_CLASSIFIER.classify_many(raws)
}

/// Whether a repair attempt may be spent on this diagnosis.
pub fn is_auto_fixable(error: &ClassifiedError) -> bool {
    AUTO_FIXABLE_KINDS.contains(&error.kind) && error.confidence >= AUTO_FIX_THRESHOLD
}
