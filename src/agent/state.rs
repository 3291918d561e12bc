//! Execution state for one engine run.
//!
//! Tracks consumed tokens, iterations, the append-only execution log,
//! and the bounded visited-code map used for loop detection.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

use crate::core::short_hash;

/// Capacity of the visited-code map.
pub const VISITED_CAPACITY: usize = 50;
/// How many entries are evicted (oldest first) when capacity is hit.
pub const VISITED_EVICTION: usize = 10;
/// How much of the code body feeds the loop-detection hash.
const HASH_PREFIX_CHARS: usize = 100;

/// What a log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryAction {
    /// Sandbox code execution.
    Code,
    /// A context query issued through the sandbox.
    Query,
    /// Sub-agent recursion.
    Recurse,
    /// An observation pushed back into the transcript.
    Observe,
    /// The final answer.
    Final,
}

/// One entry in the execution log.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionEntry {
    /// Epoch milliseconds when the step finished.
    pub timestamp: u64,
    /// Step kind.
    pub action: EntryAction,
    /// Step input (code body, sub-goal, raw response).
    pub input: String,
    /// Step output (observation, answer).
    pub output: String,
    /// Tokens the step consumed.
    pub tokens_used: u32,
    /// Wall-clock duration of the step in milliseconds.
    pub duration_ms: u64,
    /// Error string for failed steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Which cap stopped a truncated run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationReason {
    /// Recursion depth cap.
    Depth,
    /// Token budget cap.
    Budget,
    /// Wall-clock cap.
    Timeout,
    /// Iteration cap.
    Iterations,
}

impl TruncationReason {
    /// Human-readable cap description for the truncated answer text.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Depth => "recursion depth limit reached",
            Self::Budget => "token budget exhausted",
            Self::Timeout => "time limit reached",
            Self::Iterations => "iteration limit reached",
        }
    }
}

/// Bounded memory of code the model has already run.
///
/// Keyed by the short hash of the first 100 characters; values are
/// last-seen epoch milliseconds with a monotone insertion counter for
/// deterministic oldest-first eviction.
#[derive(Debug, Default)]
pub struct VisitedCode {
    entries: HashMap<String, (u64, u64)>,
    counter: u64,
}

impl VisitedCode {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of remembered hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `code` and reports whether it was already seen.
    ///
    /// On a repeat the last-seen timestamp updates. On a new entry the
    /// map is bounded: when it would exceed [`VISITED_CAPACITY`], the
    /// [`VISITED_EVICTION`] oldest entries (by insertion order) are
    /// dropped first.
    pub fn record(&mut self, code: &str) -> bool {
        let prefix: String = code.chars().take(HASH_PREFIX_CHARS).collect();
        let key = short_hash(prefix.as_bytes());
        let now = now_millis();

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.0 = now;
            return true;
        }

        if self.entries.len() >= VISITED_CAPACITY {
            let mut by_age: Vec<(String, u64)> = self
                .entries
                .iter()
                .map(|(k, &(_, order))| (k.clone(), order))
                .collect();
            by_age.sort_by_key(|(_, order)| *order);
            for (key, _) in by_age.into_iter().take(VISITED_EVICTION) {
                self.entries.remove(&key);
            }
        }

        self.counter += 1;
        self.entries.insert(key, (now, self.counter));
        false
    }
}

/// Mutable state for one engine invocation at one depth.
#[derive(Debug)]
pub struct ExecutionState {
    /// Recursion depth (0 for the root).
    pub depth: usize,
    /// Tokens consumed so far, sub-agents included.
    pub consumed_tokens: u32,
    /// Iterations completed at this depth.
    pub iterations: usize,
    /// Append-only execution log.
    pub log: Vec<ExecutionEntry>,
    /// Loop-detection memory.
    pub visited: VisitedCode,
    /// When this invocation started.
    pub started: Instant,
}

impl ExecutionState {
    /// Creates fresh state for an invocation at `depth`.
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            depth,
            consumed_tokens: 0,
            iterations: 0,
            log: Vec::new(),
            visited: VisitedCode::new(),
            started: Instant::now(),
        }
    }

    /// Appends a log entry stamped with the current time.
    pub fn push_entry(
        &mut self,
        action: EntryAction,
        input: impl Into<String>,
        output: impl Into<String>,
        tokens_used: u32,
        duration_ms: u64,
        error: Option<String>,
    ) {
        self.log.push(ExecutionEntry {
            timestamp: now_millis(),
            action,
            input: input.into(),
            output: output.into(),
            tokens_used,
            duration_ms,
            error,
        });
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_detects_repeats() {
        let mut visited = VisitedCode::new();
        assert!(!visited.record("return ctx.length()"));
        assert!(visited.record("return ctx.length()"));
        assert!(!visited.record("return ctx.lines()"));
        assert_eq!(visited.len(), 2);
    }

    #[test]
    fn test_only_prefix_matters() {
        let mut visited = VisitedCode::new();
        let base = "x".repeat(100);
        assert!(!visited.record(&format!("{base}AAA")));
        // Same first 100 chars → considered a repeat.
        assert!(visited.record(&format!("{base}BBB")));
    }

    #[test]
    fn test_capacity_bound_and_eviction() {
        let mut visited = VisitedCode::new();
        for i in 0..VISITED_CAPACITY {
            assert!(!visited.record(&format!("snippet number {i}")));
        }
        assert_eq!(visited.len(), VISITED_CAPACITY);

        // One more evicts the ten oldest, then inserts.
        assert!(!visited.record("one more snippet"));
        assert_eq!(visited.len(), VISITED_CAPACITY - VISITED_EVICTION + 1);

        // The earliest snippets are gone; a late one survives.
        assert!(!visited.record("snippet number 0"));
        assert!(visited.record(&format!("snippet number {}", VISITED_CAPACITY - 1)));
    }

    #[test]
    fn test_map_never_exceeds_capacity() {
        let mut visited = VisitedCode::new();
        for i in 0..500 {
            visited.record(&format!("unique snippet {i}"));
            assert!(visited.len() <= VISITED_CAPACITY);
        }
    }

    #[test]
    fn test_push_entry_appends_in_order() {
        let mut state = ExecutionState::new(0);
        state.push_entry(EntryAction::Code, "return 1", "1", 10, 5, None);
        state.push_entry(EntryAction::Final, "", "done", 20, 1, None);
        assert_eq!(state.log.len(), 2);
        assert_eq!(state.log[0].action, EntryAction::Code);
        assert_eq!(state.log[1].action, EntryAction::Final);
        assert_eq!(state.log[1].tokens_used, 20);
    }
}
