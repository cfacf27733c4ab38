//! Deterministic simulation harness for BB84 sessions.
//!
//! Drives the real [`bb84_server::ServerDriver`] in-process with a seeded
//! environment, so whole protocol runs (photons, basis choices,
//! interceptions, session ids) replay identically from a seed.
//!
//! - [`SimEnv`]: seeded RNG and virtual clock
//! - [`World`]: driver plus per-connection inboxes
//! - [`participant`]: scripted Alice, Bob and Eve
//! - [`Scenario`]: one full run with oracles

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod participant;
pub mod scenario;
pub mod sim_env;
pub mod world;

pub use participant::{Alice, Bob, Eve};
pub use scenario::{Oracle, Outcome, Scenario, ScenarioError};
pub use sim_env::SimEnv;
pub use world::{Participant, World};
