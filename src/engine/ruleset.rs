//! The validated, ordered rule set.
//!
//! This is the *static* side of the engine: produced once by a successful load
//! and then only read. `RecognitionEngine` publishes it behind an `Arc` so a
//! tagging run keeps using the set it started with even if a reload swaps in a
//! new one meanwhile.
//!
//! ## Invariants
//!
//! - `items` is in execution order: every item comes after everything its
//!   `After` entries name.
//! - Identifiers (top-level and block members) are unique.
//! - `feedback` is false whenever every reader of a tag kind runs after all of
//!   that kind's producers.

use crate::rule::{RuleDescriptor, RuleItem};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct LoadedRuleSet {
    items: Vec<RuleItem>,
    source: Option<PathBuf>,
    feedback: bool,
}

impl LoadedRuleSet {
    pub(crate) fn new(items: Vec<RuleItem>, source: &Path) -> Self {
        let rules: Vec<&RuleDescriptor> = items.iter().flat_map(RuleItem::rules).collect();
        let feedback =
            rules.iter().enumerate().any(|(pos, reader)| rules[pos..].iter().any(|p| reader.reads_output_of(p)));
        LoadedRuleSet { items, source: Some(source.to_path_buf()), feedback }
    }

    /// True when some rule reads a tag kind produced by itself or by a rule
    /// that runs later, so one pass over a sentence may not be enough.
    pub fn has_feedback(&self) -> bool {
        self.feedback
    }

    /// The directory this set was loaded from (`None` before any load).
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Number of top-level slots (rules and blocks).
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Top-level items in execution order.
    pub fn items(&self) -> &[RuleItem] {
        &self.items
    }

    /// Top-level identifiers in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.items.iter().map(RuleItem::id).collect()
    }

    /// Every rule, block members included, in the order they are attempted.
    pub fn rules(&self) -> impl Iterator<Item = &RuleDescriptor> {
        self.items.iter().flat_map(RuleItem::rules)
    }

    /// Look up a rule or block member by id.
    pub fn rule(&self, id: &str) -> Option<&RuleDescriptor> {
        self.rules().find(|r| r.id == id)
    }
}
