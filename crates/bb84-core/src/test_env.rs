//! Seeded environment for unit tests.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::env::Environment;

#[derive(Clone)]
pub(crate) struct SeededEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    clock: Arc<AtomicU64>,
}

impl SeededEnv {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            clock: Arc::new(AtomicU64::new(1_700_000_000_000)),
        }
    }
}

impl Environment for SeededEnv {
    fn unix_millis(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().expect("rng mutex poisoned").fill_bytes(buffer);
    }
}
