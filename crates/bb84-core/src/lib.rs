//! BB84 protocol engine.
//!
//! Pure protocol logic with no I/O: the quantum channel simulator, key
//! sifting and QBER estimation, the one-time-pad cipher, and the session
//! state machine that ties them together.
//!
//! # Architecture
//!
//! ```text
//! bb84-core
//!   ├─ Environment   (time + randomness, injected)
//!   ├─ channel       (bit/basis generation, encode, measure, intercept)
//!   ├─ sifting       (sift, qber, finalize)
//!   ├─ otp           (repeating-key XOR + base64)
//!   └─ Session       (phase machine orchestrating the above)
//! ```
//!
//! Randomness always comes from an [`Environment`], so a seeded
//! implementation makes whole protocol runs reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod env;
mod error;
pub mod otp;
pub mod session;
pub mod sifting;

#[cfg(test)]
mod test_env;

pub use env::Environment;
pub use error::SessionError;
pub use session::{Session, SessionConfig, TransmitOutcome};
pub use sifting::SiftResult;
