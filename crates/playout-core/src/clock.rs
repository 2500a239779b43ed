//! Single source of "now" for a session.
//!
//! No other subsystem may invent time or derive "now" from buffer counts,
//! viewer activity, or decoder state — every deadline in the engine is
//! computed from the pair fixed here at session start.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Abstraction over "now", real or deterministic.
///
/// `(epoch_utc, epoch_mono)` is fixed once per session by `set_session_epoch`
/// and is immutable thereafter; a second call is a programming error.
pub trait Clock: Send + Sync {
    /// Current UTC time in microseconds since the Unix epoch.
    fn now_utc_us(&self) -> i64;

    /// Current monotonic time in nanoseconds, relative to an arbitrary but
    /// fixed origin for the process.
    fn now_mono_ns(&self) -> i64;

    /// Block the calling thread until the monotonic clock reaches
    /// `mono_ns`. Returns immediately if `mono_ns` has already passed.
    fn sleep_until(&self, mono_ns: i64);

    /// Fix the session epoch. May only be called once; a second call panics
    /// — this is INV: the epoch pair is immutable after session start, and
    /// violating it is a fatal programming error, not a recoverable one.
    fn set_session_epoch(&self, epoch_utc_us: i64, epoch_mono_ns: i64);

    /// The session epoch, if it has been set.
    fn session_epoch(&self) -> Option<(i64, i64)>;
}

/// Real wall-clock implementation backed by `SystemTime`/`Instant`.
pub struct RealClock {
    process_start: std::time::Instant,
    epoch_utc_us: AtomicI64,
    epoch_mono_ns: AtomicI64,
    epoch_set: AtomicU64,
}

impl RealClock {
    pub fn new() -> Self {
        Self {
            process_start: std::time::Instant::now(),
            epoch_utc_us: AtomicI64::new(0),
            epoch_mono_ns: AtomicI64::new(0),
            epoch_set: AtomicU64::new(0),
        }
    }

    fn mono_ns_since_start(&self) -> i64 {
        self.process_start.elapsed().as_nanos() as i64
    }
}

impl Default for RealClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for RealClock {
    fn now_utc_us(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as i64
    }

    fn now_mono_ns(&self) -> i64 {
        self.mono_ns_since_start()
    }

    fn sleep_until(&self, mono_ns: i64) {
        let now = self.now_mono_ns();
        if mono_ns > now {
            std::thread::sleep(Duration::from_nanos((mono_ns - now) as u64));
        }
    }

    fn set_session_epoch(&self, epoch_utc_us: i64, epoch_mono_ns: i64) {
        let prev = self.epoch_set.fetch_add(1, Ordering::SeqCst);
        assert_eq!(
            prev, 0,
            "session epoch is immutable after session start; set_session_epoch called twice"
        );
        self.epoch_utc_us.store(epoch_utc_us, Ordering::SeqCst);
        self.epoch_mono_ns.store(epoch_mono_ns, Ordering::SeqCst);
    }

    fn session_epoch(&self) -> Option<(i64, i64)> {
        if self.epoch_set.load(Ordering::SeqCst) == 0 {
            None
        } else {
            Some((
                self.epoch_utc_us.load(Ordering::SeqCst),
                self.epoch_mono_ns.load(Ordering::SeqCst),
            ))
        }
    }
}

/// Deterministic clock for contract tests. Advances only on explicit
/// `advance(ns)` calls; `sleep_until` is a no-op busy-check against the
/// current synthetic time rather than a real sleep, which is what gives
/// INV-TIME-MODE-EQUIVALENCE its bit-identical behavior versus `RealClock`
/// for everything downstream of deadline arithmetic.
pub struct TestClock {
    mono_ns: AtomicI64,
    utc_us: AtomicI64,
    epoch_utc_us: AtomicI64,
    epoch_mono_ns: AtomicI64,
    epoch_set: AtomicU64,
}

impl TestClock {
    pub fn new(start_utc_us: i64) -> Self {
        Self {
            mono_ns: AtomicI64::new(0),
            utc_us: AtomicI64::new(start_utc_us),
            epoch_utc_us: AtomicI64::new(0),
            epoch_mono_ns: AtomicI64::new(0),
            epoch_set: AtomicU64::new(0),
        }
    }

    /// Advance the synthetic clock by exactly `ns` nanoseconds. This is the
    /// only way time moves in test mode.
    pub fn advance(&self, ns: i64) {
        self.mono_ns.fetch_add(ns, Ordering::SeqCst);
        self.utc_us.fetch_add(ns / 1000, Ordering::SeqCst);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for TestClock {
    fn now_utc_us(&self) -> i64 {
        self.utc_us.load(Ordering::SeqCst)
    }

    fn now_mono_ns(&self) -> i64 {
        self.mono_ns.load(Ordering::SeqCst)
    }

    fn sleep_until(&self, mono_ns: i64) {
        // Deterministic mode never blocks; the caller is expected to have
        // advanced the clock to `mono_ns` (or beyond) before relying on the
        // wait having "happened". We only assert we haven't been asked to
        // travel backwards in an inconsistent way.
        let now = self.now_mono_ns();
        if mono_ns > now {
            self.mono_ns.store(mono_ns, Ordering::SeqCst);
        }
    }

    fn set_session_epoch(&self, epoch_utc_us: i64, epoch_mono_ns: i64) {
        let prev = self.epoch_set.fetch_add(1, Ordering::SeqCst);
        assert_eq!(
            prev, 0,
            "session epoch is immutable after session start; set_session_epoch called twice"
        );
        self.epoch_utc_us.store(epoch_utc_us, Ordering::SeqCst);
        self.epoch_mono_ns.store(epoch_mono_ns, Ordering::SeqCst);
    }

    fn session_epoch(&self) -> Option<(i64, i64)> {
        if self.epoch_set.load(Ordering::SeqCst) == 0 {
            None
        } else {
            Some((
                self.epoch_utc_us.load(Ordering::SeqCst),
                self.epoch_mono_ns.load(Ordering::SeqCst),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advance_is_explicit() {
        let clock = TestClock::new(0);
        assert_eq!(clock.now_mono_ns(), 0);
        clock.advance(1_000_000);
        assert_eq!(clock.now_mono_ns(), 1_000_000);
    }

    #[test]
    fn test_session_epoch_set_once() {
        let clock = TestClock::new(0);
        clock.set_session_epoch(1000, 2000);
        assert_eq!(clock.session_epoch(), Some((1000, 2000)));
    }

    #[test]
    #[should_panic(expected = "immutable")]
    fn test_session_epoch_second_set_panics() {
        let clock = TestClock::new(0);
        clock.set_session_epoch(1000, 2000);
        clock.set_session_epoch(1000, 3000);
    }

    #[test]
    fn test_sleep_until_advances_to_target() {
        let clock = TestClock::new(0);
        clock.sleep_until(5_000);
        assert_eq!(clock.now_mono_ns(), 5_000);
    }

    #[test]
    fn test_real_clock_mono_nondecreasing() {
        let clock = RealClock::new();
        let a = clock.now_mono_ns();
        let b = clock.now_mono_ns();
        assert!(b >= a);
    }
}
