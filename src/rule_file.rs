//! Rule file front-end.
//!
//! The loader only needs *something* that turns a file into rule items or
//! errors; that seam is the [`RuleParser`] trait. [`HeaderRuleParser`] is the
//! default implementation for a plain `Key: value` header format:
//!
//! ```text
//! # friday.rule                    # weekdays.ruleblock
//! Id: friday                       Id: weekdays
//! Type: date                       Block-Type: run-until-success
//! Match: <Friday~NNP>              ---
//! Before-Guard: !<last>$           Type: date
//!                                  Match: <Friday>
//!                                  ---
//!                                  Type: date
//!                                  Match: <Thursday>
//! ```
//!
//! A file fails as a whole: the first problem found in a file becomes its one
//! `MalformedRule` / `MalformedBlock` error.

use crate::error::{LoadError, LoadErrorKind, SourceLocation};
use crate::pattern::Pattern;
use crate::rule::{BlockMode, Guard, GuardScope, RuleBlock, RuleDescriptor, RuleFlags, RuleItem};
use std::path::Path;

/// What kind of file the loader found (decided by extension).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Rule,
    Block,
}

impl FileKind {
    /// Error category used for problems inside a file of this kind.
    pub fn error_kind(self) -> LoadErrorKind {
        match self {
            FileKind::Rule => LoadErrorKind::MalformedRule,
            FileKind::Block => LoadErrorKind::MalformedBlock,
        }
    }
}

/// Turns the contents of one rule file into rule items.
pub trait RuleParser: Send + Sync {
    fn parse(&self, path: &Path, kind: FileKind, source: &str) -> Result<Vec<RuleItem>, Vec<LoadError>>;
}

/// Parser for the `Key: value` header format (`*.rule` / `*.ruleblock`).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderRuleParser;

impl RuleParser for HeaderRuleParser {
    fn parse(&self, path: &Path, kind: FileKind, source: &str) -> Result<Vec<RuleItem>, Vec<LoadError>> {
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let item = match kind {
            FileKind::Rule => parse_rule(source, &stem, path).map(RuleItem::Rule),
            FileKind::Block => parse_block(source, &stem, path).map(RuleItem::Block),
        };
        item.map(|item| vec![item])
            .map_err(|detail| vec![LoadError::new(kind.error_kind(), detail, SourceLocation::file(path))])
    }
}

const RULE_FIELDS: &[&str] =
    &["id", "after", "type", "match", "squelch", "case-sensitive", "guard", "before-guard", "after-guard"];
const BLOCK_FIELDS: &[&str] = &["id", "after", "block-type"];
const REPEATABLE: &[&str] = &["after", "guard", "before-guard", "after-guard"];

#[derive(Debug)]
struct Field<'a> {
    key: String,
    value: &'a str,
    line: usize,
}

/// Split numbered lines into `Key: value` fields, skipping blanks and comments.
fn parse_fields<'a>(lines: &[(usize, &'a str)]) -> Result<Vec<Field<'a>>, String> {
    let header = regex!(r"^([A-Za-z][A-Za-z-]*)\s*:(.*)$");
    let mut fields = Vec::new();
    for &(line, text) in lines {
        let text = text.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let caps = header.captures(text).ok_or_else(|| format!("line {line}: expected `Key: value`, found `{text}`"))?;
        let (Some(key), Some(value)) = (caps.get(1), caps.get(2)) else {
            return Err(format!("line {line}: expected `Key: value`, found `{text}`"));
        };
        fields.push(Field { key: key.as_str().to_ascii_lowercase(), value: value.as_str().trim(), line });
    }
    Ok(fields)
}

/// Reject unknown keys and repeated single-valued keys.
fn check_keys(fields: &[Field<'_>], allowed: &[&str]) -> Result<(), String> {
    for (idx, field) in fields.iter().enumerate() {
        if !allowed.contains(&field.key.as_str()) {
            return Err(format!("line {}: unknown field `{}`", field.line, field.key));
        }
        if !REPEATABLE.contains(&field.key.as_str()) && fields[..idx].iter().any(|f| f.key == field.key) {
            return Err(format!("line {}: field `{}` given more than once", field.line, field.key));
        }
    }
    Ok(())
}

fn single<'f, 'a>(fields: &'f [Field<'a>], key: &str) -> Option<&'f Field<'a>> {
    fields.iter().find(|f| f.key == key)
}

fn parse_bool(field: &Field<'_>) -> Result<bool, String> {
    match field.value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Ok(true),
        "false" | "no" => Ok(false),
        other => Err(format!("line {}: `{}` expects true or false, found `{}`", field.line, field.key, other)),
    }
}

fn parse_id(fields: &[Field<'_>], default: &str) -> Result<String, String> {
    match single(fields, "id") {
        Some(f) if f.value.is_empty() => Err(format!("line {}: `id` must not be empty", f.line)),
        Some(f) => Ok(f.value.to_string()),
        None => Ok(default.to_string()),
    }
}

/// Collect `After` values; each line may hold a comma-separated list.
fn parse_after(fields: &[Field<'_>]) -> Vec<String> {
    let mut after: Vec<String> = Vec::new();
    for f in fields.iter().filter(|f| f.key == "after") {
        for id in f.value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !after.iter().any(|a| a == id) {
                after.push(id.to_string());
            }
        }
    }
    after
}

fn build_rule(fields: &[Field<'_>], default_id: &str, block: Option<&str>, path: &Path) -> Result<RuleDescriptor, String> {
    check_keys(fields, RULE_FIELDS)?;
    if block.is_some() {
        if let Some(f) = single(fields, "after") {
            return Err(format!("line {}: `after` is not allowed on block members", f.line));
        }
    }

    let id = parse_id(fields, default_id)?;

    let mut flags = RuleFlags::empty();
    if let Some(f) = single(fields, "case-sensitive") {
        flags.set(RuleFlags::CASE_SENSITIVE, parse_bool(f)?);
    }
    if let Some(f) = single(fields, "squelch") {
        flags.set(RuleFlags::SQUELCH, parse_bool(f)?);
    }
    let case_sensitive = flags.contains(RuleFlags::CASE_SENSITIVE);

    let tag_kind = match single(fields, "type") {
        _ if flags.contains(RuleFlags::SQUELCH) => None,
        Some(f) if !f.value.is_empty() => Some(f.value.to_string()),
        Some(f) => return Err(format!("line {}: `type` must not be empty", f.line)),
        None => return Err("missing required field `type`".to_string()),
    };

    let pattern = match single(fields, "match") {
        Some(f) => Pattern::parse(f.value, case_sensitive)
            .map_err(|e| format!("line {}: invalid `match` pattern: {e}", f.line))?,
        None => return Err("missing required field `match`".to_string()),
    };

    let mut guards = Vec::new();
    for f in fields {
        let scope = match f.key.as_str() {
            "guard" => GuardScope::Sentence,
            "before-guard" => GuardScope::Before,
            "after-guard" => GuardScope::After,
            _ => continue,
        };
        let (negated, source) = match f.value.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, f.value),
        };
        let pattern = Pattern::parse(source, case_sensitive)
            .map_err(|e| format!("line {}: invalid `{}` pattern: {e}", f.line, f.key))?;
        guards.push(Guard { scope, negated, pattern });
    }

    Ok(RuleDescriptor {
        location: SourceLocation::rule(path, &id),
        id,
        pattern,
        tag_kind,
        after: parse_after(fields),
        block: block.map(str::to_string),
        guards,
        flags,
    })
}

fn numbered(source: &str) -> Vec<(usize, &str)> {
    source.lines().enumerate().map(|(i, l)| (i + 1, l)).collect()
}

fn is_blank(lines: &[(usize, &str)]) -> bool {
    lines.iter().all(|(_, l)| l.trim().is_empty() || l.trim().starts_with('#'))
}

fn parse_rule(source: &str, default_id: &str, path: &Path) -> Result<RuleDescriptor, String> {
    let lines = numbered(source);
    if is_blank(&lines) {
        return Err("file is empty".to_string());
    }
    build_rule(&parse_fields(&lines)?, default_id, None, path)
}

fn parse_block(source: &str, default_id: &str, path: &Path) -> Result<RuleBlock, String> {
    let lines = numbered(source);
    if is_blank(&lines) {
        return Err("file is empty".to_string());
    }

    // Header first, then one section per member.
    let mut sections: Vec<Vec<(usize, &str)>> = vec![Vec::new()];
    for (n, line) in lines {
        if line.trim() == "---" {
            sections.push(Vec::new());
        } else if let Some(current) = sections.last_mut() {
            current.push((n, line));
        }
    }

    let header = parse_fields(&sections[0])?;
    check_keys(&header, BLOCK_FIELDS)?;
    let id = parse_id(&header, default_id)?;
    let mode = match single(&header, "block-type") {
        Some(f) => BlockMode::from_name(f.value)
            .ok_or_else(|| format!("line {}: unknown block type `{}`", f.line, f.value))?,
        None => return Err("missing required field `block-type`".to_string()),
    };

    let mut members = Vec::new();
    for section in sections[1..].iter().filter(|s| !is_blank(s)) {
        let n = members.len() + 1;
        let fields = parse_fields(section).map_err(|e| format!("member {n}: {e}"))?;
        let member = build_rule(&fields, &format!("{id}#{n}"), Some(&id), path).map_err(|e| format!("member {n}: {e}"))?;
        members.push(member);
    }
    if members.is_empty() {
        return Err(format!("block `{id}` declares no member rules"));
    }

    Ok(RuleBlock { location: SourceLocation::rule(path, &id), id, after: parse_after(&header), mode, members })
}
