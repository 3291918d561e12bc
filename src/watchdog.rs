//! Cooperative watchdog for agent runs.
//!
//! Watches three signals: repeated reads of the same file, steps that
//! produce no new output, and total elapsed time. A breach never kills
//! anything; the engine checks [`Watchdog::verdict`] at the top of
//! each iteration and terminates through its own truncation path.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::core::short_hash;

/// Why the watchdog wants the run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Breach {
    /// One file was read more times than allowed.
    FileReads {
        /// The configured per-file cap.
        limit: usize,
    },
    /// Too many consecutive steps produced no new output.
    Stalled {
        /// The configured stalled-step cap.
        limit: usize,
    },
    /// The elapsed ceiling passed.
    Elapsed {
        /// The configured ceiling.
        limit: Duration,
    },
}

/// Watchdog thresholds.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogConfig {
    /// Maximum reads of any single file.
    pub max_file_reads: usize,
    /// Maximum consecutive steps with repeated output.
    pub max_stalled_steps: usize,
    /// Total elapsed ceiling.
    pub max_elapsed: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            max_file_reads: 10,
            max_stalled_steps: 5,
            max_elapsed: Duration::from_secs(300),
        }
    }
}

/// Per-run watchdog state.
#[derive(Debug)]
pub struct Watchdog {
    config: WatchdogConfig,
    file_reads: HashMap<String, usize>,
    stalled_steps: usize,
    last_output: Option<String>,
    started: Instant,
}

impl Watchdog {
    /// Creates a watchdog; the elapsed clock starts now.
    #[must_use]
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            file_reads: HashMap::new(),
            stalled_steps: 0,
            last_output: None,
            started: Instant::now(),
        }
    }

    /// Records one read of `path`.
    pub fn record_file_read(&mut self, path: &str) {
        *self.file_reads.entry(path.to_string()).or_insert(0) += 1;
    }

    /// Records a step's output; identical consecutive outputs count as
    /// stalled.
    pub fn record_step(&mut self, output: &str) {
        let digest = short_hash(output.as_bytes());
        if self.last_output.as_deref() == Some(digest.as_str()) {
            self.stalled_steps += 1;
        } else {
            self.stalled_steps = 0;
            self.last_output = Some(digest);
        }
    }

    /// Returns the first breached threshold, if any.
    #[must_use]
    pub fn verdict(&self) -> Option<Breach> {
        if self.started.elapsed() >= self.config.max_elapsed {
            return Some(Breach::Elapsed {
                limit: self.config.max_elapsed,
            });
        }
        if self.stalled_steps >= self.config.max_stalled_steps {
            return Some(Breach::Stalled {
                limit: self.config.max_stalled_steps,
            });
        }
        if self
            .file_reads
            .values()
            .any(|&n| n > self.config.max_file_reads)
        {
            return Some(Breach::FileReads {
                limit: self.config.max_file_reads,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WatchdogConfig {
        WatchdogConfig {
            max_file_reads: 2,
            max_stalled_steps: 2,
            max_elapsed: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_fresh_watchdog_has_no_verdict() {
        let dog = Watchdog::new(config());
        assert_eq!(dog.verdict(), None);
    }

    #[test]
    fn test_file_read_breach() {
        let mut dog = Watchdog::new(config());
        dog.record_file_read("a.ts");
        dog.record_file_read("a.ts");
        assert_eq!(dog.verdict(), None);
        dog.record_file_read("a.ts");
        assert!(matches!(dog.verdict(), Some(Breach::FileReads { .. })));
    }

    #[test]
    fn test_stalled_steps_breach() {
        let mut dog = Watchdog::new(config());
        dog.record_step("same");
        dog.record_step("same");
        dog.record_step("same");
        assert!(matches!(dog.verdict(), Some(Breach::Stalled { .. })));
    }

    #[test]
    fn test_new_output_resets_stall() {
        let mut dog = Watchdog::new(config());
        dog.record_step("one");
        dog.record_step("one");
        dog.record_step("two");
        dog.record_step("two");
        assert_eq!(dog.verdict(), None);
    }

    #[test]
    fn test_elapsed_breach() {
        let dog = Watchdog::new(WatchdogConfig {
            max_elapsed: Duration::ZERO,
            ..config()
        });
        assert!(matches!(dog.verdict(), Some(Breach::Elapsed { .. })));
    }
}
