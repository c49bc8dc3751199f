//! Loading and tagging engine.
//!
//! This module is the internal core behind [`RecognitionEngine`]. It is split
//! into focused submodules under `src/engine/`:
//!
//! ## How the parts work together
//!
//! ```text
//! rule dir ── scan_directory ───┬─ RuleParser per file     (loader.rs)
//!                               │
//!                               v
//!                      RuleGraph::build                    (graph.rs)
//!                        - duplicate ids
//!                        - unknown After references
//!                        - cycles (one error per SCC)
//!                        - readers after producers of a tag kind
//!                               │
//!                               v
//!                      into_ordered ─▶ LoadedRuleSet       (ruleset.rs)
//!                               │
//! sentences ── Tagger ──────────┘                          (matcher.rs)
//!                - rules in execution order
//!                - tags added with set semantics
//!                               │
//!                               v
//!                         TagMetrics                       (metrics.rs)
//! ```
//!
//! Loading is all-or-nothing: every file and every structural check is
//! evaluated, and a `LoadedRuleSet` only exists when nothing failed. Tagging
//! never fails once a set is loaded; a non-match just adds nothing.
//!
//! ## Debugging
//!
//! Load progress is logged at `info`/`debug` and rule hits at `debug`/`trace`
//! through `tracing`; the CLI honours `RUST_LOG` (e.g.
//! `RUST_LOG=chronotag=debug`).
//!
//! [`RecognitionEngine`]: crate::RecognitionEngine

#[path = "engine/graph.rs"]
mod graph;
#[path = "engine/loader.rs"]
mod loader;
#[path = "engine/matcher.rs"]
mod matcher;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/ruleset.rs"]
mod ruleset;

pub(crate) use loader::load_directory;
pub(crate) use matcher::Tagger;
pub use metrics::{RuleHits, TagMetrics};
pub use ruleset::LoadedRuleSet;
