// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 ReVibe

//! Reconnect backoff: capped exponential growth with jitter.

use std::time::Duration;

use rand::Rng;

/// Base delay for the first reconnect attempt.
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the delay regardless of attempt count.
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff with full jitter over the upper half of the window.
///
/// Delay for attempt `n` is drawn from `[cap/2, cap]` where
/// `cap = min(base * 2^n, max)`, so repeated failures against an overloaded
/// endpoint spread out instead of retrying in lockstep.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self::with_bounds(BASE_DELAY, MAX_DELAY)
    }

    pub fn with_bounds(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Next delay to wait before reconnecting; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(16);
        let cap = self
            .base
            .saturating_mul(1u32 << exponent)
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);

        let cap_ms = cap.as_millis() as u64;
        if cap_ms <= 1 {
            return cap;
        }
        let jittered = rand::thread_rng().gen_range(cap_ms / 2..=cap_ms);
        Duration::from_millis(jittered)
    }

    /// Reset after a healthy connection is established.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
