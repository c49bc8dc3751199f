//! Parsed rule descriptors.
//!
//! These are the immutable values a [`RuleParser`](crate::RuleParser) produces
//! from rule files. Nothing here validates cross-rule structure; that is the
//! graph builder's job (`engine/graph.rs`).

use crate::error::SourceLocation;
use crate::pattern::Pattern;
use std::fmt;

bitflags::bitflags! {
    /// Per-rule behaviour switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RuleFlags: u8 {
        /// Word regexes are matched case-sensitively.
        const CASE_SENSITIVE = 1 << 0;
        /// Matches clear the covered tokens' tags instead of adding one.
        const SQUELCH        = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardScope {
    /// The whole sentence.
    Sentence,
    /// Tokens before the match.
    Before,
    /// Tokens after the match.
    After,
}

/// A pattern that must (or, when `negated`, must not) occur around a match.
#[derive(Debug, Clone)]
pub struct Guard {
    pub scope: GuardScope,
    pub negated: bool,
    pub pattern: Pattern,
}

/// One parsed rule.
#[derive(Debug, Clone)]
pub struct RuleDescriptor {
    pub id: String,
    pub pattern: Pattern,
    /// Kind of tag produced on match. `None` only for squelch rules.
    pub tag_kind: Option<String>,
    /// Identifiers this rule must run after.
    pub after: Vec<String>,
    /// Enclosing block id, `None` for top-level rules.
    pub block: Option<String>,
    pub guards: Vec<Guard>,
    pub flags: RuleFlags,
    pub location: SourceLocation,
}

impl RuleDescriptor {
    pub fn is_squelch(&self) -> bool {
        self.flags.contains(RuleFlags::SQUELCH)
    }

    /// Kind of tag this rule adds, if any.
    pub fn produces(&self) -> Option<&str> {
        if self.is_squelch() { None } else { self.tag_kind.as_deref() }
    }

    /// Tag kinds read by the `Match` pattern and the guards (`None` = any tag).
    pub fn reads(&self) -> Vec<Option<&str>> {
        let mut kinds = self.pattern.tag_kinds();
        for kind in self.guards.iter().flat_map(|g| g.pattern.tag_kinds()) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// True when this rule reads tags of a kind `other` produces.
    pub fn reads_output_of(&self, other: &RuleDescriptor) -> bool {
        let Some(produced) = other.produces() else {
            return false;
        };
        self.reads().into_iter().any(|kind| kind.is_none_or(|k| k == produced))
    }
}

/// How a block runs its members against a sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    /// Apply every member in declared order.
    RunAll,
    /// Apply members in order, stopping after the first one that matched.
    RunUntilSuccess,
}

impl BlockMode {
    pub fn from_name(name: &str) -> Option<BlockMode> {
        match name.trim().to_ascii_lowercase().as_str() {
            "run-all" => Some(BlockMode::RunAll),
            "run-until-success" => Some(BlockMode::RunUntilSuccess),
            _ => None,
        }
    }
}

impl fmt::Display for BlockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BlockMode::RunAll => "run-all",
            BlockMode::RunUntilSuccess => "run-until-success",
        })
    }
}

/// A named, ordered group of rules occupying one slot in the rule order.
#[derive(Debug, Clone)]
pub struct RuleBlock {
    pub id: String,
    pub after: Vec<String>,
    pub mode: BlockMode,
    pub members: Vec<RuleDescriptor>,
    pub location: SourceLocation,
}

/// A top-level entry of a rule set.
#[derive(Debug, Clone)]
pub enum RuleItem {
    Rule(RuleDescriptor),
    Block(RuleBlock),
}

impl RuleItem {
    pub fn id(&self) -> &str {
        match self {
            RuleItem::Rule(r) => &r.id,
            RuleItem::Block(b) => &b.id,
        }
    }

    pub fn after(&self) -> &[String] {
        match self {
            RuleItem::Rule(r) => &r.after,
            RuleItem::Block(b) => &b.after,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            RuleItem::Rule(r) => &r.location,
            RuleItem::Block(b) => &b.location,
        }
    }

    /// The rules this item runs: itself, or a block's members.
    pub fn rules(&self) -> &[RuleDescriptor] {
        match self {
            RuleItem::Rule(r) => std::slice::from_ref(r),
            RuleItem::Block(b) => &b.members,
        }
    }

    /// Rules nested in this item (empty for plain rules).
    pub fn members(&self) -> &[RuleDescriptor] {
        match self {
            RuleItem::Rule(_) => &[],
            RuleItem::Block(b) => &b.members,
        }
    }
}

impl From<RuleDescriptor> for RuleItem {
    fn from(rule: RuleDescriptor) -> Self {
        RuleItem::Rule(rule)
    }
}

impl From<RuleBlock> for RuleItem {
    fn from(block: RuleBlock) -> Self {
        RuleItem::Block(block)
    }
}
