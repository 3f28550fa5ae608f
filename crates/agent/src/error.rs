//! Flattening of nested failures into one user-facing message.

use crate::AgentError;

/// Aggregates nested deeper than this are not expanded further.
pub const MAX_UNWRAP_DEPTH: usize = 16;

const TOO_DEEP: &str = "nested failure";

/// Render `err` as a single line.
///
/// Aggregates are expanded depth-first, left to right, and their leaves
/// joined with `", "`. Every other error renders as its `Display` text.
pub fn unwrap_error(err: &AgentError) -> String {
    unwrap_at(err, 0)
}

fn unwrap_at(err: &AgentError, depth: usize) -> String {
    match err {
        AgentError::Aggregate(children) if !children.is_empty() => {
            if depth >= MAX_UNWRAP_DEPTH {
                return TOO_DEEP.to_string();
            }
            children
                .iter()
                .map(|child| unwrap_at(child, depth + 1))
                .collect::<Vec<_>>()
                .join(", ")
        }
        other => other.to_string(),
    }
}
