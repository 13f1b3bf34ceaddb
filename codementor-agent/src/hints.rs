//! Hint batch analysis
//!
//! Checks mentor output for the expected shape (five numbered hints) and for
//! lines copied from the solver's code. Findings are appended to the mentor's
//! handoff result as a note; the supervisor model makes the actual call.

use crate::handoff::{handoff_target, HandoffReview};
use codementor_runtime::{Role, ToolContext};
use std::collections::HashMap;

/// Number of hints a complete batch holds
pub const HINTS_PER_BATCH: usize = 5;

/// Leads every review note line appended to mentor output
pub const REVIEW_NOTE_TAG: &str = "[hint review]";

/// Code lines shorter than this are too generic to count as a leak
const MIN_LEAK_LINE_CHARS: usize = 12;

/// Numbered hints parsed from mentor output
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HintBatch {
    pub hints: Vec<String>,
}

impl HintBatch {
    /// Collect numbered items (`1.`, `2)`, `Hint 3:`, `**4.**`) in order.
    ///
    /// Only the next number in sequence starts a new hint, so nested lists
    /// inside a hint stay part of it.
    pub fn parse(text: &str) -> Self {
        let mut hints: Vec<String> = Vec::new();

        for line in text.lines() {
            match item_number(line) {
                Some((n, rest)) if n == hints.len() + 1 => hints.push(rest.to_string()),
                _ => {
                    if let Some(current) = hints.last_mut() {
                        if !line.trim().is_empty() {
                            if !current.is_empty() {
                                current.push('\n');
                            }
                            current.push_str(line.trim_end());
                        }
                    }
                }
            }
        }

        Self { hints }
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.hints.len() == HINTS_PER_BATCH
    }
}

fn item_number(line: &str) -> Option<(usize, &str)> {
    let s = line.trim_start().trim_start_matches(['#', '*', ' ']);
    let s = match s.get(..4) {
        Some(word) if word.eq_ignore_ascii_case("hint") => s[4..].trim_start(),
        _ => s,
    };

    let digits = s.find(|c: char| !c.is_ascii_digit())?;
    if digits == 0 {
        return None;
    }
    let n = s[..digits].parse().ok()?;
    let rest = s[digits..].strip_prefix(['.', ')', ':'])?;
    Some((n, rest.trim_start_matches(['*', ' ']).trim()))
}

/// Non-trivial lines inside fenced code blocks, whitespace-normalised
pub fn solution_code_lines(solution: &str) -> Vec<String> {
    let mut in_fence = false;
    let mut lines = Vec::new();

    for line in solution.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if !in_fence {
            continue;
        }
        let normalized = normalize(line);
        if normalized.chars().count() >= MIN_LEAK_LINE_CHARS
            && normalized.chars().any(char::is_alphanumeric)
            && !lines.contains(&normalized)
        {
            lines.push(normalized);
        }
    }

    lines
}

/// Solution code lines that appear verbatim in `hints`
pub fn leaked_lines(hints: &str, solution: &str) -> Vec<String> {
    let haystack: String = hints.lines().map(normalize).collect::<Vec<_>>().join("\n");
    solution_code_lines(solution)
        .into_iter()
        .filter(|line| haystack.contains(line.as_str()))
        .collect()
}

fn normalize(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `text` without review note lines, trailing whitespace trimmed
pub fn strip_review_notes(text: &str) -> String {
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with(REVIEW_NOTE_TAG))
        .collect();
    kept.join("\n").trim_end().to_string()
}

/// Reviews mentor output against the latest solver answer in the conversation
pub struct MentorReview {
    solver: String,
}

impl MentorReview {
    /// `solver` is the agent name whose handoff results hold the solution
    pub fn new(solver: impl Into<String>) -> Self {
        Self { solver: solver.into() }
    }

    /// Most recent output of the solver handoff in `ctx`
    fn latest_solution<'a>(&self, ctx: &'a ToolContext) -> Option<&'a str> {
        let mut call_targets: HashMap<&str, &str> = HashMap::new();
        let mut latest = None;

        for msg in &ctx.messages {
            match msg.role {
                Role::Assistant => {
                    for call in msg.tool_calls.iter().flatten() {
                        if let Some(target) = handoff_target(&call.name) {
                            call_targets.insert(&call.id, target);
                        }
                    }
                }
                Role::Tool => {
                    let target = msg.tool_call_id.as_deref().and_then(|id| call_targets.get(id));
                    if target == Some(&self.solver.as_str()) {
                        latest = Some(msg.text());
                    }
                }
                _ => {}
            }
        }

        latest
    }
}

impl HandoffReview for MentorReview {
    fn review(&self, output: &str, ctx: &ToolContext) -> Option<String> {
        let mut findings = Vec::new();

        let batch = HintBatch::parse(output);
        if !batch.is_complete() {
            findings.push(format!(
                "expected {} numbered hints, found {}",
                HINTS_PER_BATCH,
                batch.len()
            ));
        }

        if let Some(solution) = self.latest_solution(ctx) {
            let leaked = leaked_lines(output, solution);
            if !leaked.is_empty() {
                let quoted: Vec<String> = leaked.iter().map(|l| format!("`{}`", l)).collect();
                findings.push(format!(
                    "{} line(s) of solution code appear verbatim: {}",
                    leaked.len(),
                    quoted.join(", ")
                ));
            }
        }

        if findings.is_empty() {
            None
        } else {
            Some(format!("{} {}.", REVIEW_NOTE_TAG, findings.join("; ")))
        }
    }
}
