#![forbid(unsafe_code)]

//! Deadline timers driven by the host's clock. Nothing here sleeps; the owner calls
//! `fire_if_due(now)` from its tick and acts on `true`.

use draftkeep_kernel_contracts::MonotonicTimeNs;

/// Fires once after `interval` of quiet. Re-arming always replaces the previous deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Debouncer {
    interval_ns: u64,
    deadline: Option<MonotonicTimeNs>,
}

impl Debouncer {
    pub fn from_ms(interval_ms: u64) -> Self {
        Self {
            interval_ns: interval_ms.saturating_mul(1_000_000),
            deadline: None,
        }
    }

    pub fn arm(&mut self, now: MonotonicTimeNs) {
        self.deadline = Some(now.saturating_add_ns(self.interval_ns));
    }

    /// Returns true when a pending deadline was dropped.
    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<MonotonicTimeNs> {
        self.deadline
    }

    pub fn fire_if_due(&mut self, now: MonotonicTimeNs) -> bool {
        match self.deadline {
            Some(d) if now >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Fires at most once per `interval`: the first trigger arms it, later triggers ride along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throttle {
    interval_ns: u64,
    deadline: Option<MonotonicTimeNs>,
}

impl Throttle {
    pub fn from_ms(interval_ms: u64) -> Self {
        Self {
            interval_ns: interval_ms.saturating_mul(1_000_000),
            deadline: None,
        }
    }

    /// Returns true when this call armed a new deadline.
    pub fn arm(&mut self, now: MonotonicTimeNs) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now.saturating_add_ns(self.interval_ns));
        true
    }

    pub fn cancel(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn fire_if_due(&mut self, now: MonotonicTimeNs) -> bool {
        match self.deadline {
            Some(d) if now >= d => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// Recurring fixed-period timer. A missed period fires once, then reschedules from `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTimer {
    period_ns: u64,
    next_due: Option<MonotonicTimeNs>,
}

impl IntervalTimer {
    pub fn from_ms(period_ms: u64) -> Self {
        Self {
            period_ns: period_ms.saturating_mul(1_000_000),
            next_due: None,
        }
    }

    pub fn start(&mut self, now: MonotonicTimeNs) {
        if self.period_ns == 0 {
            return;
        }
        self.next_due = Some(now.saturating_add_ns(self.period_ns));
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn fire_if_due(&mut self, now: MonotonicTimeNs) -> bool {
        match self.next_due {
            Some(d) if now >= d => {
                self.next_due = Some(now.saturating_add_ns(self.period_ns));
                true
            }
            _ => false,
        }
    }
}
