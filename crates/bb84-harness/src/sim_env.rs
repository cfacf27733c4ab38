//! Simulated environment for deterministic testing.
//!
//! Seeded ChaCha RNG plus a virtual clock. Two environments built from the
//! same seed produce the same photons, bases, interceptions and session ids.

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use bb84_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Virtual clock origin (2024-01-01T00:00:00Z).
pub const SIM_EPOCH_MILLIS: u64 = 1_704_067_200_000;

/// Deterministic environment.
///
/// Clones share the RNG stream and the clock, so every component of one
/// simulated world draws from a single sequence.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    clock: Arc<AtomicU64>,
}

impl SimEnv {
    /// Environment seeded with `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            clock: Arc::new(AtomicU64::new(SIM_EPOCH_MILLIS)),
        }
    }

    /// Move the virtual clock forward.
    pub fn advance_time(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.clock.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("clock", &self.clock.load(Ordering::SeqCst)).finish()
    }
}

impl Environment for SimEnv {
    fn unix_millis(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    /// Advances the virtual clock and completes immediately.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance_time(duration);
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // A panicking test thread must not wedge the remaining draws.
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
