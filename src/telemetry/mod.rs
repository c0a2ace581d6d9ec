//! Token accounting
//!
//! Process-wide cumulative tallies of input, output, and thinking tokens
//! across every model call. This is legitimate shared state: it lives behind
//! one narrow interface (`add` returning a snapshot) and the mutex is held
//! only for the duration of the integer additions — the event-bus broadcast
//! happens after release.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Cumulative token totals. Monotonically non-decreasing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenTally {
    pub total_input: u64,
    pub total_output: u64,
    pub total_thinking: u64,
    pub call_count: u64,
}

/// Per-call deltas from one completed model call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenDelta {
    pub input: u64,
    pub output: u64,
    pub thinking: u64,
}

pub struct TokenAccountant {
    tally: Mutex<TokenTally>,
}

impl TokenAccountant {
    pub fn new() -> Self {
        Self {
            tally: Mutex::new(TokenTally::default()),
        }
    }

    /// Record one completed call and return the new totals.
    pub fn add(&self, delta: TokenDelta) -> TokenTally {
        let mut tally = self.tally.lock();
        tally.total_input += delta.input;
        tally.total_output += delta.output;
        tally.total_thinking += delta.thinking;
        tally.call_count += 1;
        *tally
    }

    /// Record an estimated input count before a large-context call so the
    /// client meter moves immediately. The authoritative usage is added on
    /// completion; the slight over-count is accepted.
    pub fn add_input_estimate(&self, estimated_tokens: u64) -> TokenTally {
        let mut tally = self.tally.lock();
        tally.total_input += estimated_tokens;
        *tally
    }

    pub fn snapshot(&self) -> TokenTally {
        *self.tally.lock()
    }
}

impl Default for TokenAccountant {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_are_monotone() {
        let accountant = TokenAccountant::new();
        let mut previous = accountant.snapshot();
        for i in 0..20u64 {
            let snap = accountant.add(TokenDelta {
                input: i * 10,
                output: i,
                thinking: i * 3,
            });
            assert!(snap.total_input >= previous.total_input);
            assert!(snap.total_output >= previous.total_output);
            assert!(snap.total_thinking >= previous.total_thinking);
            assert_eq!(snap.call_count, previous.call_count + 1);
            previous = snap;
        }
    }

    #[test]
    fn estimate_does_not_count_a_call() {
        let accountant = TokenAccountant::new();
        let snap = accountant.add_input_estimate(500);
        assert_eq!(snap.total_input, 500);
        assert_eq!(snap.call_count, 0);
    }

    #[test]
    fn concurrent_adds_are_all_counted() {
        use std::sync::Arc;
        let accountant = Arc::new(TokenAccountant::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let acc = Arc::clone(&accountant);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        acc.add(TokenDelta { input: 1, output: 1, thinking: 1 });
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = accountant.snapshot();
        assert_eq!(snap.call_count, 800);
        assert_eq!(snap.total_input, 800);
    }
}
