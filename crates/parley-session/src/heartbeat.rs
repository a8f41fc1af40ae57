//! STOMP heart-beat negotiation and liveness tracking.

use std::time::Duration;

/// Negotiated heart-beat schedule. `None` disables a direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeartbeatPlan {
    /// How often we must write something.
    pub send_every: Option<Duration>,
    /// How often we expect to hear something.
    pub expect_every: Option<Duration>,
}

/// Combine our `(cx, cy)` offer with the server's `(sx, sy)` reply.
///
/// Outgoing runs at `max(cx, sy)` and incoming at `max(cy, sx)`; a zero on
/// either side disables that direction.
#[must_use]
pub fn negotiate(client: (u64, u64), server: (u64, u64)) -> HeartbeatPlan {
    let (cx, cy) = client;
    let (sx, sy) = server;
    let pick = |ours: u64, theirs: u64| {
        (ours != 0 && theirs != 0).then(|| Duration::from_millis(ours.max(theirs)))
    };
    HeartbeatPlan {
        send_every: pick(cx, sy),
        expect_every: pick(cy, sx),
    }
}

/// Outcome of one liveness check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatCheck {
    /// Something arrived since the previous check.
    Alive,
    /// Silent interval, still within tolerance.
    Missed(u32),
    /// Too many consecutive silent intervals.
    TimedOut(u32),
}

/// Alive flag plus missed-interval counter.
///
/// Inbound activity of any kind sets the flag. Each check clears it, and a
/// check that finds it already clear counts a miss. A fresh monitor starts
/// clear, so the first interval after CONNECTED needs real traffic.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    alive: bool,
    missed: u32,
    max_missed: u32,
}

impl HeartbeatMonitor {
    /// Monitor that times out after `max_missed` silent intervals (min 1).
    #[must_use]
    pub fn new(max_missed: u32) -> Self {
        Self {
            alive: false,
            missed: 0,
            max_missed: max_missed.max(1),
        }
    }

    /// Record inbound data.
    pub fn record_activity(&mut self) {
        self.alive = true;
    }

    /// Evaluate one interval.
    pub fn check(&mut self) -> HeartbeatCheck {
        if self.alive {
            self.alive = false;
            self.missed = 0;
            return HeartbeatCheck::Alive;
        }
        self.missed += 1;
        if self.missed >= self.max_missed {
            HeartbeatCheck::TimedOut(self.missed)
        } else {
            HeartbeatCheck::Missed(self.missed)
        }
    }

    /// Consecutive silent intervals so far.
    pub fn missed(&self) -> u32 {
        self.missed
    }
}
