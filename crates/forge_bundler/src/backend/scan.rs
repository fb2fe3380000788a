//! Heuristic structural checks over script sources.
//!
//! None of this is a parser. The checks catch the failure shapes that
//! dominate AI-generated code (truncated files, unclosed strings, missing
//! component definitions, imports of names a sibling never exported) and
//! report them with a location.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

static JSX_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([A-Z][A-Za-z0-9_$]*)").unwrap());

static EXPORT_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)\bexport\s+(?:declare\s+)?(?:async\s+)?(?:abstract\s+)?(?:function\s*\*?|class|const|let|var|enum)\s+([A-Za-z_$][\w$]*)",
    )
    .unwrap()
});

static EXPORT_TYPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\bexport\s+(?:declare\s+)?(?:type|interface)\s+([A-Za-z_$][\w$]*)").unwrap()
});

static EXPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bexport\s+(?:type\s+)?\{([^}]*)\}").unwrap());

static EXPORT_STAR_AS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bexport\s+\*\s+as\s+([A-Za-z_$][\w$]*)").unwrap());

static EXPORT_OPAQUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s+\*\s+from\b|\bexport\s+(?:const|let|var)\s*[\{\[]|\bmodule\.exports\b|\bexports\.[A-Za-z_$]").unwrap()
});

static EXPORT_DEFAULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bexport\s+default\b").unwrap());

/// A structural problem found in a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralIssue {
    pub message: String,
    pub offset: usize,
}

impl StructuralIssue {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

/// 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() as u32 + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() as u32 + 1;
    (line, column)
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Keywords after which an expression begins.
const EXPRESSION_KEYWORDS: [&str; 18] = [
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await", "import", "export", "default", "from",
];

fn is_expression_keyword(word: &str) -> bool {
    EXPRESSION_KEYWORDS.contains(&word)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

/// The last significant token seen in script context.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Punct(char),
    Word(String),
    /// A string, template, regex or JSX element.
    Value,
}

enum Halt {
    Eof,
    Issue(StructuralIssue),
}

/// Character scanner for bracket balance and literal termination.
///
/// JSX is parsed speculatively. When an apparent element cannot be
/// completed, the scanner rewinds and reads the `<` as an operator, so
/// TypeScript generics never produce a report of their own.
struct Scanner {
    chars: Vec<(usize, char)>,
    end: usize,
    i: usize,
    stack: Vec<(char, usize)>,
    previous: Option<Token>,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.char_indices().collect(),
            end: source.len(),
            i: 0,
            stack: Vec::new(),
            previous: None,
        }
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.i + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.i).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn expression_expected(&self) -> bool {
        match &self.previous {
            None => true,
            Some(Token::Punct(c)) => "(,=:[!&|?{};+-*%~^>}".contains(*c),
            Some(Token::Word(word)) => is_expression_keyword(word),
            Some(Token::Value) => false,
        }
    }

    /// A `'` after a plain identifier is an apostrophe in prose, not a
    /// string opener.
    fn quote_opens_string(&self) -> bool {
        match &self.previous {
            Some(Token::Word(word)) => is_expression_keyword(word),
            Some(Token::Value) => false,
            _ => true,
        }
    }

    /// Scan script until EOF, or until the bracket at depth `base` closes.
    fn scan_code(&mut self, base: Option<usize>) -> Result<(), Halt> {
        while let Some(c) = self.peek(0) {
            let offset = self.offset();

            match c {
                '/' if self.peek(1) == Some('/') => {
                    while self.peek(0).is_some_and(|c| c != '\n') {
                        self.i += 1;
                    }
                    continue;
                }
                '/' if self.peek(1) == Some('*') => {
                    self.skip_block_comment(offset)?;
                    continue;
                }
                '/' if self.peek(1) != Some('>') && self.expression_expected() && self.skip_regex() => {
                    self.previous = Some(Token::Value);
                    continue;
                }
                '"' | '\'' if c == '"' || self.quote_opens_string() => {
                    self.skip_string(c, offset)?;
                    self.previous = Some(Token::Value);
                    continue;
                }
                '`' => {
                    self.skip_template(offset)?;
                    self.previous = Some(Token::Value);
                    continue;
                }
                '<' if self.expression_expected()
                    && self.peek(1).is_some_and(|n| n == '>' || is_ident_start(n)) =>
                {
                    if self.try_jsx() {
                        self.previous = Some(Token::Value);
                        continue;
                    }
                }
                c if is_ident_char(c) => {
                    let start = self.i;
                    while self.peek(0).is_some_and(is_ident_char) {
                        self.i += 1;
                    }
                    let word = self.chars[start..self.i].iter().map(|(_, c)| *c).collect();
                    self.previous = Some(Token::Word(word));
                    continue;
                }
                '(' | '[' | '{' => self.stack.push((c, offset)),
                ')' | ']' | '}' => match self.stack.pop() {
                    Some((open, _)) if closer_for(open) == c => {
                        if base.is_some_and(|depth| self.stack.len() < depth) {
                            self.i += 1;
                            self.previous = Some(Token::Punct(c));
                            return Ok(());
                        }
                    }
                    _ => {
                        return Err(Halt::Issue(StructuralIssue::new(
                            format!("Unexpected \"{c}\""),
                            offset,
                        )))
                    }
                },
                _ => {}
            }

            if !c.is_whitespace() {
                self.previous = Some(Token::Punct(c));
            }
            self.i += 1;
        }

        Err(Halt::Eof)
    }

    fn skip_block_comment(&mut self, offset: usize) -> Result<(), Halt> {
        self.i += 2;
        loop {
            match (self.peek(0), self.peek(1)) {
                (Some('*'), Some('/')) => {
                    self.i += 2;
                    return Ok(());
                }
                (Some(_), _) => self.i += 1,
                (None, _) => {
                    return Err(Halt::Issue(StructuralIssue::new("Unterminated comment", offset)))
                }
            }
        }
    }

    fn skip_string(&mut self, quote: char, offset: usize) -> Result<(), Halt> {
        self.i += 1;
        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    return Err(Halt::Issue(StructuralIssue::new(
                        "Unterminated string literal",
                        offset,
                    )))
                }
                Some('\\') => self.i += 2,
                Some(q) if q == quote => {
                    self.i += 1;
                    return Ok(());
                }
                Some(_) => self.i += 1,
            }
        }
    }

    fn skip_template(&mut self, offset: usize) -> Result<(), Halt> {
        self.i += 1;
        loop {
            match self.peek(0) {
                None => {
                    return Err(Halt::Issue(StructuralIssue::new(
                        "Unterminated template literal",
                        offset,
                    )))
                }
                Some('\\') => self.i += 2,
                Some('`') => {
                    self.i += 1;
                    return Ok(());
                }
                Some('$') if self.peek(1) == Some('{') => {
                    self.stack.push(('{', self.offset() + 1));
                    let depth = self.stack.len();
                    self.i += 2;
                    self.previous = Some(Token::Punct('{'));
                    self.scan_code(Some(depth))?;
                }
                Some(_) => self.i += 1,
            }
        }
    }

    /// Skip a regex literal starting at the current `/`. Returns false,
    /// leaving the position untouched, when the line holds no closing `/`.
    fn skip_regex(&mut self) -> bool {
        let mut j = self.i + 1;
        let mut in_class = false;
        while let Some(&(_, c)) = self.chars.get(j) {
            match c {
                '\n' => return false,
                '\\' => j += 1,
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => {
                    j += 1;
                    while self.chars.get(j).is_some_and(|(_, flag)| is_ident_char(*flag)) {
                        j += 1;
                    }
                    self.i = j;
                    return true;
                }
                _ => {}
            }
            j += 1;
        }
        false
    }

    fn try_jsx(&mut self) -> bool {
        let (i, stack) = (self.i, self.stack.clone());
        if self.jsx_element().is_some() {
            return true;
        }
        self.i = i;
        self.stack = stack;
        false
    }

    fn skip_whitespace(&mut self) {
        while self.peek(0).is_some_and(char::is_whitespace) {
            self.i += 1;
        }
    }

    fn jsx_element(&mut self) -> Option<()> {
        self.i += 1;
        if self.peek(0) == Some('>') {
            self.i += 1;
            return self.jsx_children();
        }
        while self.peek(0).is_some_and(|c| is_ident_char(c) || ".-:".contains(c)) {
            self.i += 1;
        }

        loop {
            self.skip_whitespace();
            match self.peek(0)? {
                '/' if self.peek(1) == Some('>') => {
                    self.i += 2;
                    return Some(());
                }
                '>' => {
                    self.i += 1;
                    return self.jsx_children();
                }
                '{' => self.jsx_braces()?,
                c if is_ident_start(c) => {
                    while self.peek(0).is_some_and(|c| is_ident_char(c) || c == '-' || c == ':') {
                        self.i += 1;
                    }
                    self.skip_whitespace();
                    if self.peek(0) != Some('=') {
                        continue;
                    }
                    self.i += 1;
                    self.skip_whitespace();
                    match self.peek(0)? {
                        quote @ ('"' | '\'') => {
                            self.i += 1;
                            while self.peek(0)? != quote {
                                self.i += 1;
                            }
                            self.i += 1;
                        }
                        '{' => self.jsx_braces()?,
                        '<' => self.jsx_element()?,
                        _ => return None,
                    }
                }
                _ => return None,
            }
        }
    }

    /// Text and nested children up to the matching closing tag.
    fn jsx_children(&mut self) -> Option<()> {
        loop {
            match self.peek(0)? {
                '{' => self.jsx_braces()?,
                '<' if self.peek(1) == Some('/') => {
                    while self.peek(0)? != '>' {
                        self.i += 1;
                    }
                    self.i += 1;
                    return Some(());
                }
                '<' if self.peek(1).is_some_and(|n| n == '>' || is_ident_start(n)) => {
                    self.jsx_element()?
                }
                '<' => return None,
                _ => self.i += 1,
            }
        }
    }

    fn jsx_braces(&mut self) -> Option<()> {
        self.stack.push(('{', self.offset()));
        let depth = self.stack.len();
        self.i += 1;
        self.previous = Some(Token::Punct('{'));
        self.scan_code(Some(depth)).ok()
    }
}

/// Check bracket balance and literal termination.
///
/// Returns the first issue found, if any.
pub fn check_structure(source: &str) -> Option<StructuralIssue> {
    let mut scanner = Scanner::new(source);
    if let Err(Halt::Issue(issue)) = scanner.scan_code(None) {
        return Some(issue);
    }

    scanner.stack.last().map(|(open, opened_at)| {
        let (line, _) = line_col(source, *opened_at);
        StructuralIssue::new(
            format!(
                "Unexpected end of file: \"{}\" opened on line {} is never closed",
                open, line
            ),
            source.len(),
        )
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Capitalized JSX tags whose name is never bound elsewhere in the module.
///
/// A name counts as bound if it occurs anywhere outside a tag position
/// (import, declaration, destructured prop, even a comment). Returns the
/// name and offset of each first offending tag.
pub fn undeclared_jsx_components(source: &str) -> Vec<(String, usize)> {
    let mut seen = BTreeSet::new();
    let mut undeclared = Vec::new();

    for caps in JSX_TAG.captures_iter(source) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let name = &caps[1];
        let start = whole.start();

        let preceded_ok = source[..start]
            .chars()
            .next_back()
            .map(|p| p.is_whitespace() || "({>?:,=[;&|".contains(p))
            .unwrap_or(true);
        let followed_ok = source[whole.end()..]
            .chars()
            .next()
            .map(|n| n.is_whitespace() || n == '/' || n == '>' || n == '.')
            .unwrap_or(false);

        if !preceded_ok || !followed_ok || !seen.insert(name.to_string()) {
            continue;
        }

        if !is_bound_outside_tags(source, name) {
            undeclared.push((name.to_string(), start));
        }
    }

    undeclared
}

fn is_bound_outside_tags(source: &str, name: &str) -> bool {
    source.match_indices(name).any(|(at, _)| {
        let before = source[..at].chars().next_back();
        let after = source[at + name.len()..].chars().next();
        if before.is_some_and(is_ident_char) || after.is_some_and(is_ident_char) {
            return false;
        }
        let prefix = &source[..at];
        !(prefix.ends_with('<') || prefix.ends_with("</"))
    })
}

/// What a module is known to export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSet {
    pub names: BTreeSet<String>,
    pub has_default: bool,
    /// The module re-exports or assigns exports in a way that cannot be
    /// enumerated, so named-import checks must be skipped.
    pub opaque: bool,
}

impl ExportSet {
    pub fn provides(&self, name: &str) -> bool {
        if name == "default" {
            return self.has_default || self.opaque;
        }
        self.opaque || self.names.contains(name)
    }
}

/// Enumerate the exports of a script module.
pub fn exported_names(source: &str) -> ExportSet {
    let mut exports = ExportSet {
        opaque: EXPORT_OPAQUE.is_match(source),
        has_default: EXPORT_DEFAULT.is_match(source),
        ..Default::default()
    };

    for caps in EXPORT_DECL.captures_iter(source) {
        exports.names.insert(caps[1].to_string());
    }
    for caps in EXPORT_TYPE_DECL.captures_iter(source) {
        exports.names.insert(caps[1].to_string());
    }
    for caps in EXPORT_STAR_AS.captures_iter(source) {
        exports.names.insert(caps[1].to_string());
    }
    for caps in EXPORT_LIST.captures_iter(source) {
        for item in caps[1].split(',') {
            let item = item.trim().trim_start_matches("type ").trim();
            if item.is_empty() {
                continue;
            }
            let exported = item.rsplit(" as ").next().unwrap_or(item).trim();
            if exported == "default" {
                exports.has_default = true;
            } else {
                exports.names.insert(exported.to_string());
            }
        }
    }

    exports
}
