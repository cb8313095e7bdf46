//! Time Sources
//!
//! Every expiration decision in TtlKV is made against a [`Clock`] that reports
//! the current instant as whole seconds since the Unix epoch (UTC).
//!
//! Expiration instants are absolute, so the only arithmetic needed is
//! `now + ttl`. The clock is injected into the service so tests can drive
//! time by hand with [`ManualClock`] instead of sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of the current time in epoch seconds.
pub trait Clock: Send + Sync {
    /// Returns the current instant as seconds since the Unix epoch.
    fn now(&self) -> i64;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> i64 {
        unix_now().as_secs() as i64
    }
}

/// A clock that only moves when told to.
///
/// # Example
///
/// ```
/// use ttlkv::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1000);
/// clock.advance(59);
/// assert_eq!(clock.now(), 1059);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Moves the clock to an absolute instant.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Time elapsed since the Unix epoch, or zero if the system clock is set
/// before it.
pub fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Computes the absolute expiration instant for an entry written at `now`.
///
/// Saturates instead of overflowing, so an enormous TTL means "effectively
/// never" rather than wrapping into the past.
#[inline]
pub fn expires_at(now: i64, ttl_secs: u64) -> i64 {
    let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
    now.saturating_add(ttl)
}
