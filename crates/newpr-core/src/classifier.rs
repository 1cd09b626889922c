//! Classifier interface boundary.
//!
//! The classifier itself — whatever model or heuristic produces an initial
//! `path -> group_id` mapping — lives outside this crate (spec.md §1's
//! explicit non-goal). What lives here is the *boundary*: the input/output
//! shapes a classifier implementation must produce, and a tolerant parser
//! for when that output arrives as JSON text rather than already-typed
//! data (spec.md §9: "JSON repair at classifier boundaries").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Group, GroupId};

/// What the pipeline gives a classifier to work with.
pub struct ClassifierInput<'a> {
    /// Candidate groups the classifier may assign paths to.
    pub candidate_groups: &'a [Group],
    /// Every path touched anywhere in the commit range.
    pub changed_paths: &'a [String],
    /// One-line summaries per changed path (e.g. diffstat), if available.
    pub file_summaries: &'a BTreeMap<String, String>,
    /// Commit subject lines in the range, oldest first.
    pub commit_messages: &'a [String],
}

/// What a classifier produces.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierOutput {
    /// Initial ownership assignment. Need not cover every changed path —
    /// the pipeline's fallback rule covers the rest.
    pub assignments: BTreeMap<String, GroupId>,
    /// An optional extra group the classifier invents for paths that don't
    /// fit any candidate (e.g. a catch-all "shared foundation" group).
    pub shared_foundation: Option<Group>,
}

/// Anything implementing a classifier satisfies this trait; the pipeline
/// itself never calls a model — callers own that integration and hand the
/// pipeline a `ClassifierOutput` (or raw text to repair-parse below).
pub trait Classifier {
    /// Classify the input. Implementations external to this crate may call
    /// out to a model; failures should be surfaced as an `Err` so the
    /// pipeline's fallback rule can take over deterministically.
    fn classify(&self, input: &ClassifierInput<'_>) -> Result<ClassifierOutput, String>;
}

/// Advisory warning raised while repairing or falling back on classifier
/// output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifierWarning(pub String);

/// Parse classifier output that may be malformed JSON: strip a surrounding
/// markdown code fence if present, balance trailing braces/brackets, trim
/// a dangling unterminated string, then parse as a `{path: group_id}`
/// object. Returns `None` (never panics) if no repair strategy yields
/// valid JSON.
#[must_use]
pub fn repair(raw: &str) -> Option<BTreeMap<String, String>> {
    let candidates = [
        raw.to_owned(),
        strip_code_fence(raw),
        balance_brackets(&strip_code_fence(raw)),
        trim_dangling_string(&balance_brackets(&strip_code_fence(raw))),
    ];
    candidates
        .iter()
        .find_map(|candidate| serde_json::from_str::<BTreeMap<String, String>>(candidate).ok())
}

/// Strip a ```` ```json ... ``` ```` or ```` ``` ... ``` ```` fence if the
/// text is wrapped in one; otherwise returns the input unchanged.
fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return raw.to_owned();
    };
    let body = after_open
        .strip_prefix("json")
        .unwrap_or(after_open)
        .trim_start_matches(['\n', '\r']);
    body.rsplit_once("```").map_or_else(|| raw.to_owned(), |(before, _)| before.to_owned())
}

/// Append whatever closing braces/brackets are needed to balance the
/// text's open/close count, in the order the open delimiters appeared.
fn balance_brackets(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                stack.pop();
            }
            _ => {}
        }
    }
    let mut repaired = text.to_owned();
    if in_string {
        repaired.push('"');
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    repaired
}

/// If the text ends mid-string-literal (an odd number of unescaped `"`),
/// truncate back to the last safely-closed value rather than guess at
/// intent; `balance_brackets` already closes the string, so this mainly
/// exists to strip a trailing dangling comma before the close we added.
fn trim_dangling_string(text: &str) -> String {
    text.replace(",}", "}").replace(",]", "]")
}

/// The pipeline's own deterministic fallback: every changed path not
/// covered by `assignments` goes to `fallback_group`, with a warning.
#[must_use]
pub fn apply_fallback(
    mut assignments: BTreeMap<String, GroupId>,
    changed_paths: &[String],
    fallback_group: &GroupId,
) -> (BTreeMap<String, GroupId>, Vec<ClassifierWarning>) {
    let mut warnings = Vec::new();
    for path in changed_paths {
        assignments.entry(path.clone()).or_insert_with(|| {
            warnings.push(ClassifierWarning(format!(
                "path '{path}' left unclassified; assigned to fallback group '{}'",
                fallback_group.as_str()
            )));
            fallback_group.clone()
        });
    }
    (assignments, warnings)
}
