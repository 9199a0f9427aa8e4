//! Polling budget.
//!
//! Every link operation spins on transport readiness at most `max` times.
//! The budget is an iteration cap, not wall-clock time.

/// Counts polling iterations against a hard cap (`maxLoopCnt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopBudget {
    max: u32,
    used: u32,
}

impl LoopBudget {
    /// Create a budget allowing `max` iterations.
    pub const fn new(max: u32) -> Self {
        Self { max, used: 0 }
    }

    /// Consume one iteration. Returns `false` once the cap has been reached.
    pub fn tick(&mut self) -> bool {
        if self.used >= self.max {
            return false;
        }
        self.used += 1;
        true
    }

    /// Iterations consumed so far.
    pub fn used(&self) -> u32 {
        self.used
    }

    /// Iterations still available.
    pub fn remaining(&self) -> u32 {
        self.max - self.used
    }

    /// The configured cap.
    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }
}
