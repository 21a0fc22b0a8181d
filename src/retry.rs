//! Retry and reconnect budgets.
//!
//! Two scopes that never mix: a [`RetryPolicy`] re-attempts one send or receive on the same
//! connection without delay, a [`ReconnectBudget`] bounds how many full sessions one candidate
//! may go through. Bootstrap only uses the former; its own failure is fatal.

use std::fmt;

// One numbered attempt out of a fixed total, printed as `n/total`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub total: u32,
}

impl Attempt {
    pub fn is_last(&self) -> bool {
        self.number == self.total
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.total)
    }
}

fn numbered(total: u32) -> impl Iterator<Item = Attempt> {
    (1..=total).map(move |number| Attempt { number, total })
}

/// Bounded immediate re-attempts of a single transport operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
}

impl RetryPolicy {
    // A budget of zero would never run the operation at all.
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts
    }

    pub fn attempts(&self) -> impl Iterator<Item = Attempt> {
        numbered(self.attempts)
    }
}

/// Bounded full re-bootstraps of a session for one candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectBudget {
    rounds: u32,
}

impl ReconnectBudget {
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds: rounds.max(1),
        }
    }

    pub fn max_rounds(&self) -> u32 {
        self.rounds
    }

    pub fn rounds(&self) -> impl Iterator<Item = Attempt> {
        numbered(self.rounds)
    }
}
