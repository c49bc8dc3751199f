//! Tagging run metrics.
//!
//! Collected by `RecognitionEngine::tag_with_metrics` to observe what a run
//! did: how many rule slots were attempted, which rules matched and how many
//! tags were added or squelched. `RecognitionEngine::tag` gathers the same
//! counters and drops them.
//!
//! Counters are summed over every sentence in the run.

use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagMetrics {
    /// Total elapsed time for the run.
    pub total: Duration,
    /// Number of sentences processed.
    pub sentences: usize,
    /// Rule passes over sentences; more than `sentences` only when a rule
    /// set feeds tags back into itself.
    pub passes: usize,
    /// Number of rules attempted (block members counted individually).
    pub rules_attempted: usize,
    /// Number of accepted matches (after guards).
    pub matches: usize,
    /// Number of matches rejected by a guard.
    pub guarded: usize,
    /// Number of tags newly inserted into token tag sets.
    pub tags_added: usize,
    /// Number of tags removed by squelch rules.
    pub tags_removed: usize,
    /// Per-rule match counts, in rule order, for rules that matched at least once.
    pub hits: Vec<RuleHits>,
}

/// Matches produced by a single rule over a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHits {
    pub rule: String,
    pub matches: usize,
}

impl TagMetrics {
    pub(crate) fn record_hits(&mut self, rule: &str, matches: usize) {
        if matches == 0 {
            return;
        }
        self.matches += matches;
        match self.hits.iter_mut().find(|h| h.rule == rule) {
            Some(h) => h.matches += matches,
            None => self.hits.push(RuleHits { rule: rule.to_string(), matches }),
        }
    }
}
