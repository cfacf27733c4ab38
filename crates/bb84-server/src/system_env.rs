//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` draws every photon bit, basis and id from OS entropy and
//! stamps packets with the system wall clock.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bb84_core::Environment;

/// Production environment using the system clock and cryptographic RNG.
///
/// - `unix_millis()` reads `SystemTime::now()`
/// - `sleep()` delegates to `tokio::time::sleep()`
/// - `random_bytes()` uses `getrandom`
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Unreachable on supported platforms. Zeros keep the server up but
            // make every basis rectilinear, so shout about it.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
