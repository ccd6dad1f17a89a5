// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Frame-rate gate for outbound coalescing.
//!
//! Time comes from the host's frame loop; the gate never reads a clock.

use std::time::Duration;

/// Opens at most once per interval.
#[derive(Debug, Clone, Copy)]
pub struct FrameGate {
    interval: Duration,
    last: Option<Duration>,
}

impl FrameGate {
    /// Gate with the given minimum spacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Minimum spacing between openings.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True (and re-armed) when at least one interval passed since the last
    /// opening. A clock that runs backwards re-opens the gate.
    pub fn ready(&mut self, now: Duration) -> bool {
        let open = match self.last {
            None => true,
            Some(last) => now < last || now - last >= self.interval,
        };
        if open {
            self.last = Some(now);
        }
        open
    }

    /// Forget the last opening.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
