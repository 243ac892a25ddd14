//! Expire timer
//!
//! One countdown decides both whether an open notification still receives
//! updates and when it closes on its own. A zero timeout arms the timer
//! without a deadline: the notification stays eligible for updates and never
//! closes by itself.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum State {
    #[default]
    Disarmed,
    Armed(Option<Instant>),
}

#[derive(Debug, Clone, Default)]
pub struct DebounceTimer {
    state: State,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, State::Armed(_))
    }

    /// Next expiry, if any
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            State::Armed(deadline) => deadline,
            State::Disarmed => None,
        }
    }

    /// (Re)start the countdown from `now`.
    pub fn arm(&mut self, now: Instant, timeout: Duration) {
        let deadline = (!timeout.is_zero()).then(|| now + timeout);
        self.state = State::Armed(deadline);
    }

    pub fn disarm(&mut self) {
        self.state = State::Disarmed;
    }

    /// Time left before expiry, zero once the deadline has passed.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline().map(|d| d.saturating_duration_since(now))
    }

    /// Disarm and report `true` if the deadline has passed.
    pub fn take_expired(&mut self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                self.state = State::Disarmed;
                true
            }
            _ => false,
        }
    }
}
