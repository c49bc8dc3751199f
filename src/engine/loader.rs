//! Directory loading.
//!
//! A load pass is a pure function from a directory to either a
//! [`LoadedRuleSet`] or the full list of problems:
//!
//! ```text
//! walk dir (sorted) ──▶ parse each file ──┬──▶ items ──▶ RuleGraph::build
//!                                         └──▶ parse errors ───────┐
//!                                                                  ▼
//!                                      errors = parse ++ structural
//! ```
//!
//! Nothing short-circuits: every file is read and parsed and the graph is
//! built from whatever parsed cleanly, so one pass reports everything.

use super::graph::RuleGraph;
use super::ruleset::LoadedRuleSet;
use crate::api::LoadOptions;
use crate::error::{LoadError, SourceLocation};
use crate::rule::RuleItem;
use crate::rule_file::{FileKind, RuleParser};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Everything a directory walk produced before structural validation.
#[derive(Debug, Default)]
pub(crate) struct ScanOutcome {
    pub items: Vec<RuleItem>,
    pub errors: Vec<LoadError>,
    pub files: usize,
}

/// Walk `dir` in file-name order and parse every rule / block file.
pub(crate) fn scan_directory(dir: &Path, options: &LoadOptions, parser: &dyn RuleParser) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().unwrap_or(dir).to_path_buf();
                warn!(path = %path.display(), error = %err, "failed to read rule directory");
                outcome.errors.push(LoadError::new(
                    FileKind::Rule.error_kind(),
                    format!("cannot read directory: {err}"),
                    SourceLocation::file(path),
                ));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let Some(kind) = options.file_kind(path) else {
            debug!(path = %path.display(), "skipping non-rule file");
            continue;
        };
        outcome.files += 1;

        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read rule file");
                outcome.errors.push(LoadError::new(
                    kind.error_kind(),
                    format!("cannot read file: {err}"),
                    SourceLocation::file(path),
                ));
                continue;
            }
        };

        match parser.parse(path, kind, &source) {
            Ok(items) => {
                debug!(path = %path.display(), items = items.len(), "parsed rule file");
                outcome.items.extend(items);
            }
            Err(errors) => {
                for err in &errors {
                    warn!(path = %path.display(), error = %err, "malformed rule file");
                }
                outcome.errors.extend(errors);
            }
        }
    }

    outcome
}

/// Run a full load pass over `dir`.
pub(crate) fn load_directory(
    dir: &Path,
    options: &LoadOptions,
    parser: &dyn RuleParser,
) -> Result<LoadedRuleSet, Vec<LoadError>> {
    let ScanOutcome { items, mut errors, files } = scan_directory(dir, options, parser);
    debug!(path = %dir.display(), files, items = items.len(), parse_errors = errors.len(), "scanned rule directory");

    match RuleGraph::build(items) {
        Ok(graph) if errors.is_empty() => {
            let slots = graph.len();
            let rules = LoadedRuleSet::new(graph.into_ordered(), dir);
            info!(path = %dir.display(), files, slots, rules = rules.rules().count(), "loaded rule set");
            Ok(rules)
        }
        Ok(_) => Err(errors),
        Err(structural) => {
            errors.extend(structural);
            Err(errors)
        }
    }
}
