//! Human-readable code allocation.
//!
//! Every epic and task carries a project-scoped code like `ACME-12` or
//! `ACME-E3`. Codes are allocated by scanning the codes already in use,
//! taking the highest numeric suffix for the relevant sequence, and
//! returning max + 1. Epics use an `E` infix and count independently of
//! tasks, so `ACME-E3` and `ACME-3` can coexist.
//!
//! The allocators are pure and infallible. Callers doing a batch of
//! creates must insert each returned code into their working set before
//! asking for the next one; persistence-level uniqueness is the
//! caller's responsibility.

use std::collections::HashSet;

/// Allocate the next task code for a project prefix
///
/// Task codes have the shape `{PREFIX}-{n}`. Codes whose suffix is not
/// purely numeric (epic codes included) are ignored.
pub fn next_task_code(prefix: &str, existing: &HashSet<String>) -> String {
    let next = max_suffix(&format!("{prefix}-"), existing) + 1;
    format!("{prefix}-{next}")
}

/// Allocate the next epic code for a project prefix
///
/// Epic codes have the shape `{PREFIX}-E{n}` and draw from their own
/// sequence.
pub fn next_epic_code(prefix: &str, existing: &HashSet<String>) -> String {
    let next = max_suffix(&format!("{prefix}-E"), existing) + 1;
    format!("{prefix}-E{next}")
}

fn max_suffix(code_prefix: &str, existing: &HashSet<String>) -> u64 {
    existing
        .iter()
        .filter_map(|code| numeric_suffix(code, code_prefix))
        .max()
        .unwrap_or(0)
}

fn numeric_suffix(code: &str, code_prefix: &str) -> Option<u64> {
    let rest = code.strip_prefix(code_prefix)?;
    if rest.is_empty() || !rest.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}
