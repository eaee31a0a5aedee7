//! Per-port exponential backoff gating repeated spawn failures (§3, §4.3.2).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::time::Duration;

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};

// Layer 3: Internal module imports
// (none)

/// Consecutive spawn failures before backoff gating kicks in.
pub const MAX_SPAWN_FAILURES: u32 = 5;

/// Base delay for the exponential backoff formula.
pub const BASE_BACKOFF: Duration = Duration::from_millis(5000);

/// Per-port backoff bookkeeping. Created on first failed spawn for a port,
/// compounded on each subsequent failure, deleted on success.
#[derive(Debug, Clone, Copy)]
pub struct BackoffRecord {
    /// Number of consecutive spawn failures recorded for this port.
    pub count: u32,
    /// Timestamp of the most recent spawn attempt.
    pub last_attempt: DateTime<Utc>,
}

impl BackoffRecord {
    /// Delay required before another attempt is allowed, given `count`
    /// failures: `BASE_BACKOFF_MS * 2^(count - MAX_SPAWN_FAILURES)`, only
    /// once `count >= MAX_SPAWN_FAILURES`.
    fn required_delay(count: u32) -> Duration {
        if count < MAX_SPAWN_FAILURES {
            return Duration::ZERO;
        }
        let exponent = count - MAX_SPAWN_FAILURES;
        BASE_BACKOFF.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX))
    }

    /// `true` if a spawn attempt may proceed right now.
    fn allows_attempt_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_at(now).is_zero()
    }

    /// Time left before another attempt is allowed, zero if one may proceed
    /// right now.
    fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        let delay = Self::required_delay(self.count);
        if delay.is_zero() {
            return Duration::ZERO;
        }
        let elapsed = (now - self.last_attempt).to_std().unwrap_or(Duration::ZERO);
        delay.saturating_sub(elapsed)
    }
}

/// The pool-wide table of per-port backoff records.
#[derive(Debug, Clone, Default)]
pub struct BackoffTable {
    records: HashMap<u16, BackoffRecord>,
}

impl BackoffTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.3.2 step 1: consult the record for `port`. Returns `false` if the
    /// spawn attempt must be aborted (backoff window not yet elapsed).
    pub fn should_attempt(&self, port: u16, now: DateTime<Utc>) -> bool {
        match self.records.get(&port) {
            Some(record) => record.allows_attempt_at(now),
            None => true,
        }
    }

    /// §4.3.2 step 2: update (or create) the record's `last_attempt`,
    /// preserving `count`, before the spawn is actually attempted.
    pub fn record_attempt(&mut self, port: u16, now: DateTime<Utc>) {
        self.records
            .entry(port)
            .and_modify(|r| r.last_attempt = now)
            .or_insert(BackoffRecord {
                count: 0,
                last_attempt: now,
            });
    }

    /// §4.3.2 step 5: startup succeeded; delete the record for this port.
    pub fn record_success(&mut self, port: u16) {
        self.records.remove(&port);
    }

    /// §4.3.2 steps 6/7: startup (or the spawn itself) failed; increment
    /// `count`, creating the record if this is the first failure.
    pub fn record_failure(&mut self, port: u16, now: DateTime<Utc>) {
        self.records
            .entry(port)
            .and_modify(|r| r.count += 1)
            .or_insert(BackoffRecord {
                count: 1,
                last_attempt: now,
            });
    }

    /// Current failure count for a port (0 if no record exists).
    pub fn failure_count(&self, port: u16) -> u32 {
        self.records.get(&port).map_or(0, |r| r.count)
    }

    /// Milliseconds left before `should_attempt` would allow a spawn for
    /// this port, 0 if no record exists or the window has already elapsed.
    pub fn remaining_ms(&self, port: u16, now: DateTime<Utc>) -> u64 {
        self.records
            .get(&port)
            .map_or(0, |r| r.remaining_at(now).as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_port_always_allows_attempt() {
        let table = BackoffTable::new();
        assert!(table.should_attempt(9000, Utc::now()));
    }

    #[test]
    fn below_threshold_always_allows_attempt() {
        let mut table = BackoffTable::new();
        let now = Utc::now();
        for _ in 0..(MAX_SPAWN_FAILURES - 1) {
            table.record_failure(9000, now);
        }
        assert!(table.should_attempt(9000, now));
    }

    #[test]
    fn at_threshold_gates_until_base_backoff_elapses() {
        let mut table = BackoffTable::new();
        let t0 = Utc::now();
        for _ in 0..MAX_SPAWN_FAILURES {
            table.record_failure(9000, t0);
        }
        table.record_attempt(9000, t0);

        assert!(!table.should_attempt(9000, t0 + chrono::Duration::milliseconds(1000)));
        assert!(table.should_attempt(9000, t0 + chrono::Duration::milliseconds(5001)));
    }

    #[test]
    fn second_overflow_doubles_the_wait() {
        let mut table = BackoffTable::new();
        let t0 = Utc::now();
        for _ in 0..(MAX_SPAWN_FAILURES + 1) {
            table.record_failure(9000, t0);
        }
        table.record_attempt(9000, t0);

        // count - MAX = 1 => 2 * BASE_BACKOFF_MS = 10_000ms
        assert!(!table.should_attempt(9000, t0 + chrono::Duration::milliseconds(9_999)));
        assert!(table.should_attempt(9000, t0 + chrono::Duration::milliseconds(10_001)));
    }

    #[test]
    fn success_clears_the_record() {
        let mut table = BackoffTable::new();
        let t0 = Utc::now();
        table.record_failure(9000, t0);
        table.record_failure(9000, t0);
        assert_eq!(table.failure_count(9000), 2);

        table.record_success(9000);
        assert_eq!(table.failure_count(9000), 0);
        assert!(table.should_attempt(9000, t0));
    }

    #[test]
    fn reentry_during_the_window_updates_last_attempt() {
        let mut table = BackoffTable::new();
        let t0 = Utc::now();
        for _ in 0..MAX_SPAWN_FAILURES {
            table.record_failure(9000, t0);
        }
        table.record_attempt(9000, t0);

        // Re-entry at t0+1s updates last_attempt even though the call itself
        // is a no-op; the next window is measured from here.
        let t1 = t0 + chrono::Duration::milliseconds(1000);
        assert!(!table.should_attempt(9000, t1));
        table.record_attempt(9000, t1);
        assert!(!table.should_attempt(9000, t1 + chrono::Duration::milliseconds(4_000)));
        assert!(table.should_attempt(9000, t1 + chrono::Duration::milliseconds(5_001)));
    }

    #[test]
    fn backoff_is_per_port() {
        let mut table = BackoffTable::new();
        let t0 = Utc::now();
        for _ in 0..MAX_SPAWN_FAILURES {
            table.record_failure(9000, t0);
        }
        table.record_attempt(9000, t0);

        assert!(!table.should_attempt(9000, t0));
        assert!(table.should_attempt(9001, t0));
    }
}
