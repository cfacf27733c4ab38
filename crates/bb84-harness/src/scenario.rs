//! Scenario runner.
//!
//! A scenario scripts one complete BB84 run through the server driver:
//! Alice, Bob and optionally Eve join, Alice transmits, Bob measures, bases
//! are published, the QBER is checked and Alice tries to finalize. If a key
//! comes out and a message is configured, Alice sends it under the one-time
//! pad and Bob decrypts it.
//!
//! Oracles run against the finished [`World`] and can fail the scenario.

use bb84_core::SessionConfig;
use bb84_proto::{ClientMessage, Phase, Role};
use bb84_server::{DriverConfig, DriverError};
use thiserror::Error;

use crate::{
    participant::{Alice, Bob, Eve},
    sim_env::SimEnv,
    world::World,
};

/// Check run against the final world state.
pub type Oracle = Box<dyn Fn(&World) -> Result<(), String>>;

/// Why a scenario failed.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The driver returned an error instead of actions.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// A participant expected a message that never arrived.
    #[error("{role} never received {expected}")]
    MissingMessage {
        /// Waiting participant
        role: Role,
        /// What it was waiting for
        expected: &'static str,
    },

    /// An oracle rejected the final state.
    #[error("oracle failed: {0}")]
    Oracle(String),
}

/// Observable result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Phase the session ended in
    pub phase: Phase,
    /// Raw bits Alice sent
    pub raw_len: usize,
    /// Sifted key length
    pub sifted_len: usize,
    /// Measured error rate
    pub qber: f64,
    /// Final key length, 0 when finalization was refused
    pub final_key_len: usize,
    /// Reason Alice's finalization was refused, if it was
    pub refusal: Option<String>,
    /// What Bob decrypted, if a message was sent
    pub received: Option<String>,
}

impl Outcome {
    /// True if both parties hold a final key.
    pub fn key_established(&self) -> bool {
        self.phase == Phase::Complete && self.final_key_len > 0
    }
}

/// Builder for one scripted run.
pub struct Scenario {
    seed: u64,
    bits: usize,
    eavesdrop: bool,
    session: SessionConfig,
    message: Option<String>,
    oracles: Vec<Oracle>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario {
    /// Honest 20-bit run with seed 0.
    pub fn new() -> Self {
        Self {
            seed: 0,
            bits: 20,
            eavesdrop: false,
            session: SessionConfig::default(),
            message: None,
            oracles: Vec::new(),
        }
    }

    /// RNG seed for the whole run.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of raw bits Alice prepares.
    #[must_use]
    pub fn with_bits(mut self, bits: usize) -> Self {
        self.bits = bits;
        self
    }

    /// Let Eve intercept the transmission.
    #[must_use]
    pub fn with_eavesdropper(mut self, active: bool) -> Self {
        self.eavesdrop = active;
        self
    }

    /// Session configuration (threshold and enforcement).
    #[must_use]
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// Message Alice sends once a key exists.
    #[must_use]
    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        self.message = Some(text.into());
        self
    }

    /// Add an oracle.
    #[must_use]
    pub fn oracle(mut self, oracle: Oracle) -> Self {
        self.oracles.push(oracle);
        self
    }

    /// Execute the run.
    pub fn run(self) -> Result<Outcome, ScenarioError> {
        let env = SimEnv::with_seed(self.seed);
        let config = DriverConfig { session: self.session, ..DriverConfig::default() };
        let mut world = World::new(env.clone(), config);

        let mut alice = Alice::new(world.join(Role::Alice)?);
        let bob = Bob::new(world.join(Role::Bob)?);
        let eve = Eve::new(world.join(Role::Eve)?);

        if self.eavesdrop {
            world.submit(eve.conn_id(), eve.set_active(true))?;
        }

        let transmit = alice.transmit(&env, self.bits);
        world.submit(alice.conn_id(), transmit)?;

        let report = world
            .participant(bob.conn_id())
            .and_then(|inbox| bob.measure(&env, inbox))
            .ok_or(ScenarioError::MissingMessage { role: Role::Bob, expected: "photons" })?;
        world.submit(bob.conn_id(), report)?;

        world.submit(alice.conn_id(), alice.publish_bases())?;
        world.submit(alice.conn_id(), ClientMessage::CheckErrorRate)?;
        world.submit(alice.conn_id(), ClientMessage::FinalizeKey)?;

        let refusal = world
            .participant(alice.conn_id())
            .and_then(|inbox| inbox.rejections().last())
            .map(|(_, reason)| reason.to_string());

        let mut received = None;
        if let Some(text) = &self.message {
            let composed = world
                .participant(alice.conn_id())
                .and_then(|inbox| alice.compose(&env, inbox, Role::Bob, text));
            if let Some(message) = composed {
                world.submit(alice.conn_id(), message)?;
                received = world.participant(bob.conn_id()).and_then(|inbox| bob.read(inbox).pop());
            }
        }

        let state = world.session().state();
        let outcome = Outcome {
            phase: state.phase,
            raw_len: state.alice.sent_photons.len(),
            sifted_len: state.alice.sifted_key.len(),
            qber: state.qber,
            final_key_len: state.alice.final_key.len(),
            refusal,
            received,
        };

        for oracle in &self.oracles {
            oracle(&world).map_err(ScenarioError::Oracle)?;
        }

        Ok(outcome)
    }
}
