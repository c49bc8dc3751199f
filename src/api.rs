use crate::engine::{self, LoadedRuleSet, TagMetrics, Tagger};
use crate::error::RuleLoadErrors;
use crate::rule_file::{FileKind, HeaderRuleParser, RuleParser};
use crate::{Range, Sentence, Token};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, warn};

/// Options that affect how a rule directory is read.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Extension (without dot) of single-rule files.
    pub rule_extension: String,
    /// Extension (without dot) of rule block files.
    pub block_extension: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions { recursive: true, rule_extension: "rule".to_string(), block_extension: "ruleblock".to_string() }
    }
}

impl LoadOptions {
    /// Classify `path` by extension; `None` for files the loader ignores.
    pub fn file_kind(&self, path: &Path) -> Option<FileKind> {
        let ext = path.extension()?.to_str()?;
        if ext == self.rule_extension {
            Some(FileKind::Rule)
        } else if ext == self.block_extension {
            Some(FileKind::Block)
        } else {
            None
        }
    }
}

/// Recognition rule engine.
///
/// Holds the currently loaded rule set. `load_rules` replaces it wholesale on
/// success and leaves it untouched on failure; `tag` works from a snapshot, so
/// a concurrent reload never exposes a half-replaced set.
///
/// # Example
/// ```no_run
/// use chronotag::{RecognitionEngine, sentence};
///
/// let engine = RecognitionEngine::new();
/// engine.load_rules("rules/").expect("rules load");
/// let tagged = engine.tag(vec![sentence(&[("on", "IN"), ("Friday", "NNP")])]);
/// assert_eq!(tagged[0][1].tags.len(), 1);
/// ```
pub struct RecognitionEngine {
    rules: RwLock<Arc<LoadedRuleSet>>,
    options: LoadOptions,
    parser: Box<dyn RuleParser>,
}

impl std::fmt::Debug for RecognitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionEngine")
            .field("rules", &self.rule_set().order())
            .field("options", &self.options)
            .field("parser", &"<dyn RuleParser>")
            .finish()
    }
}

impl Default for RecognitionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionEngine {
    /// Engine with no rules, default [`LoadOptions`] and the header-format parser.
    pub fn new() -> Self {
        Self::with_options(LoadOptions::default())
    }

    pub fn with_options(options: LoadOptions) -> Self {
        RecognitionEngine {
            rules: RwLock::new(Arc::new(LoadedRuleSet::default())),
            options,
            parser: Box::new(HeaderRuleParser),
        }
    }

    /// Replace the rule-file parser.
    pub fn with_parser(mut self, parser: impl RuleParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Load every rule under `dir`.
    ///
    /// On success the new set replaces the current one. On failure the
    /// current set is kept and every problem found in the pass is returned.
    pub fn load_rules(&self, dir: impl AsRef<Path>) -> Result<(), RuleLoadErrors> {
        let dir = dir.as_ref();
        match engine::load_directory(dir, &self.options, self.parser.as_ref()) {
            Ok(loaded) => {
                let loaded = Arc::new(loaded);
                *self.rules.write().unwrap_or_else(PoisonError::into_inner) = loaded;
                Ok(())
            }
            Err(errors) => {
                warn!(path = %dir.display(), errors = errors.len(), "rule load failed; keeping previous rule set");
                Err(RuleLoadErrors::new(errors))
            }
        }
    }

    /// Snapshot of the currently published rule set.
    pub fn rule_set(&self) -> Arc<LoadedRuleSet> {
        Arc::clone(&*self.rules.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Top-level rule and block ids in execution order.
    pub fn rule_order(&self) -> Vec<String> {
        self.rule_set().order().into_iter().map(str::to_string).collect()
    }

    /// Tag `sentences` and hand them back.
    pub fn tag(&self, mut sentences: Vec<Sentence>) -> Vec<Sentence> {
        self.tag_in_place(&mut sentences);
        sentences
    }

    /// Tag `sentences` in place.
    pub fn tag_in_place(&self, sentences: &mut [Sentence]) {
        self.tag_with_metrics(sentences);
    }

    /// Tag `sentences` in place and report what the run did.
    pub fn tag_with_metrics(&self, sentences: &mut [Sentence]) -> TagMetrics {
        let start = Instant::now();
        let rules = self.rule_set();
        let tagger = Tagger::new(&rules);

        let mut metrics = TagMetrics::default();
        for sentence in sentences.iter_mut() {
            tagger.tag_sentence(sentence, &mut metrics);
        }
        metrics.total = start.elapsed();

        debug!(
            sentences = metrics.sentences,
            matches = metrics.matches,
            tags_added = metrics.tags_added,
            elapsed = ?metrics.total,
            "tagged sentences"
        );
        metrics
    }
}

/// A recognised span, as seen from the caller's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSpan {
    pub kind: String,
    pub start: usize,
    pub end: usize,
    /// Covered token texts joined by single spaces.
    pub text: String,
}

/// Distinct tags present in `sentence`, ordered by span then kind.
pub fn tagged_spans(sentence: &[Token]) -> Vec<TaggedSpan> {
    let mut tags: Vec<(Range, &str)> =
        sentence.iter().flat_map(|t| t.tags.iter()).map(|tag| (tag.span, tag.kind.as_str())).collect();
    tags.sort_unstable();
    tags.dedup();

    tags.into_iter()
        .map(|(span, kind)| TaggedSpan {
            kind: kind.to_string(),
            start: span.start,
            end: span.end,
            text: sentence
                .get(span.start..span.end)
                .unwrap_or_default()
                .iter()
                .map(|t| t.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        })
        .collect()
}
