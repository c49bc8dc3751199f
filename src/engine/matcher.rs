//! Rule application.
//!
//! Tagging walks the loaded rule set in execution order and, for each slot,
//! scans the sentence once:
//!
//! ```text
//! for slot in rules (execution order)
//!   Rule  ─▶ find_iter ─▶ guards ─▶ add Tag{kind, span} to covered tokens
//!   Block ─▶ members in declared order (RunUntilSuccess stops at first hit)
//! ```
//!
//! A rule's matches are all found against the sentence as it was before the
//! rule ran and applied afterwards; the next rule sees the result. Tag sets are
//! sets, so applying a match that is already present changes nothing.
//!
//! The loader orders readers of `{kind}` after its producers, so one pass is
//! normally enough. When a rule reads its own output (or a declared `After`
//! forces a reader first), the whole pass repeats until the sentence stops
//! changing.

use super::metrics::TagMetrics;
use super::ruleset::LoadedRuleSet;
use crate::rule::{BlockMode, GuardScope, RuleBlock, RuleDescriptor, RuleItem};
use crate::{Range, Tag, Token};
use std::collections::HashSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use tracing::{debug, trace, warn};

/// Applies a [`LoadedRuleSet`] to sentences. Holds nothing between sentences.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tagger<'a> {
    rules: &'a LoadedRuleSet,
}

impl<'a> Tagger<'a> {
    pub(crate) fn new(rules: &'a LoadedRuleSet) -> Self {
        Tagger { rules }
    }

    /// Tag one sentence. Rule sets with feedback are re-run until a pass
    /// leaves the sentence as it found it, or a state repeats.
    pub(crate) fn tag_sentence(&self, sentence: &mut [Token], metrics: &mut TagMetrics) {
        metrics.sentences += 1;
        if !self.rules.has_feedback() {
            self.run_pass(sentence, metrics);
            metrics.passes += 1;
            return;
        }

        let mut seen = HashSet::from([state_hash(sentence)]);
        for pass in 1..=MAX_PASSES {
            let before = sentence.to_vec();
            self.run_pass(sentence, metrics);
            metrics.passes += 1;
            if before[..] == sentence[..] {
                return;
            }
            if !seen.insert(state_hash(sentence)) {
                debug!(pass, "tag passes revisit an earlier state; stopping");
                return;
            }
        }
        warn!(passes = MAX_PASSES, "tagging did not settle; keeping the last pass");
    }

    fn run_pass(&self, sentence: &mut [Token], metrics: &mut TagMetrics) {
        for item in self.rules.items() {
            match item {
                RuleItem::Rule(rule) => {
                    apply_rule(rule, sentence, metrics);
                }
                RuleItem::Block(block) => apply_block(block, sentence, metrics),
            }
        }
    }
}

/// Upper bound on passes over one sentence for rule sets with feedback.
const MAX_PASSES: usize = 256;

fn state_hash(sentence: &[Token]) -> u64 {
    let mut hasher = DefaultHasher::new();
    sentence.hash(&mut hasher);
    hasher.finish()
}

fn apply_block(block: &RuleBlock, sentence: &mut [Token], metrics: &mut TagMetrics) {
    for member in &block.members {
        let matched = apply_rule(member, sentence, metrics);
        if matched > 0 && block.mode == BlockMode::RunUntilSuccess {
            trace!(block = %block.id, member = %member.id, "block satisfied");
            break;
        }
    }
}

/// Apply one rule; returns the number of accepted matches.
fn apply_rule(rule: &RuleDescriptor, sentence: &mut [Token], metrics: &mut TagMetrics) -> usize {
    metrics.rules_attempted += 1;

    let mut accepted = Vec::new();
    for span in rule.pattern.find_iter(sentence) {
        if guards_pass(rule, sentence, span) {
            accepted.push(span);
        } else {
            metrics.guarded += 1;
        }
    }

    for span in &accepted {
        let covered = &mut sentence[span.start..span.end];
        match &rule.tag_kind {
            _ if rule.is_squelch() => {
                for token in covered {
                    metrics.tags_removed += token.tags.len();
                    token.tags.clear();
                }
            }
            Some(kind) => {
                let tag = Tag::new(kind.as_str(), *span);
                for token in covered {
                    if token.tags.insert(tag.clone()) {
                        metrics.tags_added += 1;
                    }
                }
            }
            None => {}
        }
    }

    if !accepted.is_empty() {
        debug!(rule = %rule.id, matches = accepted.len(), squelch = rule.is_squelch(), "rule matched");
    }
    metrics.record_hits(&rule.id, accepted.len());
    accepted.len()
}

fn guards_pass(rule: &RuleDescriptor, tokens: &[Token], span: Range) -> bool {
    rule.guards.iter().all(|guard| {
        let scope = match guard.scope {
            GuardScope::Sentence => tokens,
            GuardScope::Before => &tokens[..span.start],
            GuardScope::After => &tokens[span.end..],
        };
        guard.pattern.occurs_in(scope) != guard.negated
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_file::{FileKind, HeaderRuleParser, RuleParser};
    use crate::engine::graph::RuleGraph;
    use std::path::Path;

    /// Build a rule set from `(file name, contents)` pairs, in order.
    fn rules(files: &[(&str, &str)]) -> LoadedRuleSet {
        let mut items = Vec::new();
        for (name, source) in files {
            let kind = if name.ends_with(".ruleblock") { FileKind::Block } else { FileKind::Rule };
            items.extend(HeaderRuleParser.parse(Path::new(name), kind, source).unwrap());
        }
        LoadedRuleSet::new(RuleGraph::build(items).unwrap().into_ordered(), Path::new("mem"))
    }

    fn tag(rules: &LoadedRuleSet, text: &str) -> (Vec<Token>, TagMetrics) {
        let mut sentence: Vec<Token> = text.split_whitespace().map(|w| Token::new(w, "POS")).collect();
        let mut metrics = TagMetrics::default();
        Tagger::new(rules).tag_sentence(&mut sentence, &mut metrics);
        (sentence, metrics)
    }

    fn counts(sentence: &[Token]) -> Vec<usize> {
        sentence.iter().map(|t| t.tags.len()).collect()
    }

    #[test]
    fn tags_every_token_of_a_match() {
        let set = rules(&[("last.rule", "Type: date\nMatch: <last> <Thursday>\n")]);
        let (sentence, metrics) = tag(&set, "We went shopping last Thursday");

        assert_eq!(counts(&sentence), vec![0, 0, 0, 1, 1]);
        assert_eq!(sentence[3].tags, sentence[4].tags);
        let tag = sentence[3].tags.iter().next().unwrap();
        assert_eq!(tag.kind, "date");
        assert_eq!(tag.span, Range::new(3, 5));
        assert_eq!(metrics.matches, 1);
        assert_eq!(metrics.tags_added, 2);
    }

    #[test]
    fn before_guard_needs_preceding_context() {
        let set = rules(&[("on.rule", "Type: date\nMatch: <Thursday>\nBefore-Guard: <on>$\n")]);

        assert_eq!(counts(&tag(&set, "We went shopping on Thursday").0), vec![0, 0, 0, 0, 1]);
        let (sentence, metrics) = tag(&set, "We went shopping last Thursday");
        assert_eq!(counts(&sentence), vec![0, 0, 0, 0, 0]);
        assert_eq!(metrics.guarded, 1);
    }

    #[test]
    fn negated_and_sentence_guards() {
        let set = rules(&[(
            "may.rule",
            "Type: date\nMatch: <May>\nGuard: <in>\nAfter-Guard: !^<I>\n",
        )]);

        assert_eq!(counts(&tag(&set, "back in May").0), vec![0, 0, 1]);
        assert_eq!(counts(&tag(&set, "in May I left").0), vec![0, 0, 0, 0]);
        assert_eq!(counts(&tag(&set, "May I come").0), vec![0, 0, 0]);
    }

    #[test]
    fn later_rules_see_earlier_tags() {
        let set = rules(&[
            ("relative.rule", "Type: date\nAfter: weekday\nMatch: <last> {date}\n"),
            ("weekday.rule", "Type: date\nMatch: <Friday>\n"),
        ]);
        let (sentence, _) = tag(&set, "see you last Friday");
        assert_eq!(counts(&sentence), vec![0, 0, 1, 2]);
    }

    #[test]
    fn squelch_clears_covered_tokens() {
        let set = rules(&[
            ("may.rule", "Type: date\nMatch: <May>\n"),
            ("modal.rule", "After: may\nSquelch: true\nMatch: <May> <I>\n"),
        ]);
        let (sentence, metrics) = tag(&set, "May I go in May");
        assert_eq!(counts(&sentence), vec![0, 0, 0, 0, 1]);
        assert_eq!(metrics.tags_removed, 1);
    }

    #[test]
    fn retagging_is_a_no_op() {
        let set = rules(&[
            ("weekday.rule", "Type: date\nMatch: <Friday>\n"),
            ("relative.rule", "Type: date\nAfter: weekday\nMatch: <last> {date}\n"),
        ]);
        let (mut sentence, _) = tag(&set, "last Friday");
        let first = sentence.clone();

        let mut metrics = TagMetrics::default();
        Tagger::new(&set).tag_sentence(&mut sentence, &mut metrics);
        assert_eq!(sentence, first);
        assert_eq!(metrics.tags_added, 0);
    }

    #[test]
    fn reader_declared_before_producer_still_sees_its_tags() {
        let set = rules(&[
            ("a_relative.rule", "Type: date\nMatch: <last> {date}\n"),
            ("b_weekday.rule", "Type: date\nMatch: <Friday>\n"),
        ]);
        assert_eq!(set.order(), vec!["b_weekday", "a_relative"]);
        assert!(!set.has_feedback());

        let (sentence, metrics) = tag(&set, "last Friday");
        assert_eq!(counts(&sentence), vec![1, 2]);
        assert_eq!(metrics.passes, 1);
    }

    #[test]
    fn self_feeding_rule_runs_to_a_fixed_point() {
        let set = rules(&[
            ("chain.rule", "Type: date\nMatch: <x> {date}\n"),
            ("day.rule", "Type: date\nMatch: <D>\n"),
        ]);
        assert!(set.has_feedback());

        let (mut sentence, metrics) = tag(&set, "x x x D");
        assert_eq!(counts(&sentence), vec![1, 2, 2, 2]);
        assert!(metrics.passes > 1);

        let first = sentence.clone();
        let mut again = TagMetrics::default();
        Tagger::new(&set).tag_sentence(&mut sentence, &mut again);
        assert_eq!(sentence, first);
        assert_eq!(again.passes, 1);
    }

    #[test]
    fn run_until_success_stops_at_first_matching_member() {
        let block = "Block-Type: run-until-success\n---\nType: date\nMatch: <Friday>\n---\nType: time\nMatch: <noon>\n";
        let set = rules(&[("days.ruleblock", block)]);

        let (sentence, metrics) = tag(&set, "Friday at noon");
        assert_eq!(counts(&sentence), vec![1, 0, 0]);
        assert_eq!(metrics.rules_attempted, 1);

        let (sentence, metrics) = tag(&set, "today at noon");
        assert_eq!(counts(&sentence), vec![0, 0, 1]);
        assert_eq!(metrics.rules_attempted, 2);
    }

    #[test]
    fn run_all_applies_every_member() {
        let block = "Block-Type: run-all\n---\nType: date\nMatch: <Friday>\n---\nType: time\nMatch: <noon>\n";
        let set = rules(&[("days.ruleblock", block)]);

        let (sentence, metrics) = tag(&set, "Friday at noon");
        assert_eq!(counts(&sentence), vec![1, 0, 1]);
        assert_eq!(metrics.hits.len(), 2);
        assert_eq!(metrics.hits[0].rule, "days#1");
    }
}
