//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples protocol logic from system resources
//! (wall clock, randomness, sleeping). This enables:
//!
//! - Deterministic Simulation: a seeded RNG and virtual clock make every
//!   photon, basis choice and interception reproducible.
//!
//! - Production Runtime: the server plugs in OS entropy and the system clock
//!   without any change to the protocol logic.
//!
//! # Invariants
//!
//! - Monotonicity: `unix_millis()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleeping.
///
/// Every random draw made by the channel simulator and the session (bits,
/// bases, packet ids, session ids) goes through this trait.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current wall-clock time in Unix milliseconds.
    ///
    /// Used for packet and envelope timestamps only; protocol decisions never
    /// depend on it.
    fn unix_millis(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it should only be used
    /// by driver code (not protocol logic).
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    ///
    /// # Invariants
    ///
    /// - Determinism during simulations: Given the same RNG seed, this produces
    ///   the same sequence of bytes
    /// - Unpredictability in production: Uses OS entropy
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates 16 random bytes, the raw material for ids.
    fn random_id_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        bytes
    }

    /// Fair coin flip.
    fn random_bool(&self) -> bool {
        let mut byte = [0u8; 1];
        self.random_bytes(&mut byte);
        byte[0] & 1 == 1
    }
}
