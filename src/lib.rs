extern crate self as chronotag;

#[macro_use]
mod macros;
mod api;
mod engine;
mod error;
mod pattern;
mod rule;
mod rule_file;


use std::collections::BTreeSet;

pub use api::{LoadOptions, RecognitionEngine, TaggedSpan, tagged_spans};
pub use engine::{LoadedRuleSet, RuleHits, TagMetrics};
pub use error::{LoadError, LoadErrorKind, PatternError, RuleLoadErrors, SourceLocation};
pub use pattern::{Element, Pattern, Quantifier, TokenPattern};
pub use rule::{BlockMode, Guard, GuardScope, RuleBlock, RuleDescriptor, RuleFlags, RuleItem};
pub use rule_file::{FileKind, HeaderRuleParser, RuleParser};

// --- Caller-owned token data --------------------------------------------------

/// Half-open token range `[start, end)` within one sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Range {
    /// Index of the first covered token.
    pub start: usize,
    /// Index one past the last covered token.
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Range { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An annotation added by a rule match.
///
/// A tag's identity is its kind plus the span it covers: every token of one
/// match carries an equal `Tag`, and re-applying the same match is a no-op on
/// the token's [`TagSet`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub kind: String,
    pub span: Range,
}

impl Tag {
    pub fn new(kind: impl Into<String>, span: Range) -> Self {
        Tag { kind: kind.into(), span }
    }
}

/// Ordered set of tags on one token. Ordered so that iteration (and therefore
/// any output derived from it) is reproducible.
pub type TagSet = BTreeSet<Tag>;

/// A single input token: surface text, part-of-speech label and the tags the
/// engine has attached so far.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Token {
    pub text: String,
    pub pos: String,
    pub tags: TagSet,
}

impl Token {
    pub fn new(text: impl Into<String>, pos: impl Into<String>) -> Self {
        Token { text: text.into(), pos: pos.into(), tags: TagSet::new() }
    }
}

/// An index-addressable sequence of tokens.
pub type Sentence = Vec<Token>;

/// Build a sentence from `(text, pos)` pairs with empty tag sets.
pub fn sentence<S: AsRef<str>, P: AsRef<str>>(pairs: &[(S, P)]) -> Sentence {
    pairs.iter().map(|(text, pos)| Token::new(text.as_ref(), pos.as_ref())).collect()
}
