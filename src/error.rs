//! Load-time error taxonomy.
//!
//! Nothing in here is raised on its own during a load pass. The loader and the
//! graph builder push [`LoadError`]s into a plain `Vec` and only the public
//! boundary (`RecognitionEngine::load_rules`) wraps them into a
//! [`RuleLoadErrors`] aggregate.

use std::fmt;
use std::path::{Path, PathBuf};

/// Category of a single load problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadErrorKind {
    /// A `.rule` file could not be read or parsed.
    MalformedRule,
    /// A `.ruleblock` file (header or any member) could not be read or parsed.
    MalformedBlock,
    /// An identifier was declared more than once across the rule set.
    DuplicateId,
    /// An `After` entry names an identifier that does not exist.
    UnknownAfterReference,
    /// A group of rules orders itself after itself.
    CircularDependency,
}

impl fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadErrorKind::MalformedRule => "malformed rule",
            LoadErrorKind::MalformedBlock => "malformed block",
            LoadErrorKind::DuplicateId => "duplicate id",
            LoadErrorKind::UnknownAfterReference => "unknown after reference",
            LoadErrorKind::CircularDependency => "circular dependency",
        };
        f.write_str(s)
    }
}

/// Where a problem was found: a file, optionally narrowed to a rule id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub rule: Option<String>,
}

impl SourceLocation {
    pub fn file(path: impl AsRef<Path>) -> Self {
        SourceLocation { path: path.as_ref().to_path_buf(), rule: None }
    }

    pub fn rule(path: impl AsRef<Path>, id: impl Into<String>) -> Self {
        SourceLocation { path: path.as_ref().to_path_buf(), rule: Some(id.into()) }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.rule {
            Some(id) => write!(f, "{} [{}]", self.path.display(), id),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// One problem found during a load pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail} ({location})")]
pub struct LoadError {
    pub kind: LoadErrorKind,
    pub detail: String,
    pub location: SourceLocation,
}

impl LoadError {
    pub fn new(kind: LoadErrorKind, detail: impl Into<String>, location: SourceLocation) -> Self {
        LoadError { kind, detail: detail.into(), location }
    }
}

/// Every error found during a single `load_rules` call, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to load rules: {} error(s){}", .errors.len(), render_list(.errors))]
pub struct RuleLoadErrors {
    pub errors: Vec<LoadError>,
}

impl RuleLoadErrors {
    pub fn new(errors: Vec<LoadError>) -> Self {
        RuleLoadErrors { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LoadError> {
        self.errors.iter()
    }

    /// Number of errors of the given kind.
    pub fn count(&self, kind: LoadErrorKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }
}

impl IntoIterator for RuleLoadErrors {
    type Item = LoadError;
    type IntoIter = std::vec::IntoIter<LoadError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a RuleLoadErrors {
    type Item = &'a LoadError;
    type IntoIter = std::slice::Iter<'a, LoadError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

fn render_list(errors: &[LoadError]) -> String {
    errors.iter().map(|e| format!("\n  - {e}")).collect()
}

/// Problems compiling a `Match` or guard pattern.
#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("unterminated `{open}` starting at offset {offset}")]
    Unterminated { open: char, offset: usize },

    #[error("unexpected `{found}` at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("invalid regex `{source_text}`: {error}")]
    Regex {
        source_text: String,
        #[source]
        error: regex::Error,
    },
}
