//! Scripted participants.
//!
//! Each script decides what its role sends next from what it has seen in its
//! inbox. Scripts hold only the private state a real participant would keep
//! locally (Alice's prepared bits); everything else is read back from the
//! server's messages.

use bb84_core::{Environment, channel, otp};
use bb84_proto::{ClientMessage, OtpEnvelope, QuantumBit, Role};

use crate::world::Participant;

/// The sender.
#[derive(Debug, Clone)]
pub struct Alice {
    conn_id: u64,
    prepared: Vec<QuantumBit>,
}

impl Alice {
    /// Script for the connection joined as Alice.
    pub fn new(conn_id: u64) -> Self {
        Self { conn_id, prepared: Vec::new() }
    }

    /// Connection id.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Bits prepared for the current run.
    pub fn prepared(&self) -> &[QuantumBit] {
        &self.prepared
    }

    /// Prepare `n` fresh bits and encode them for transmission.
    pub fn transmit(&mut self, env: &impl Environment, n: usize) -> ClientMessage {
        self.prepared = channel::generate_bit_sequence(env, n);
        ClientMessage::Transmit { photons: channel::encode_all(env, &self.prepared) }
    }

    /// Publish the prepared bits and bases for sifting.
    pub fn publish_bases(&self) -> ClientMessage {
        ClientMessage::PublishBases { bits: self.prepared.clone() }
    }

    /// Encrypt `text` under the final key Alice last saw.
    ///
    /// Returns `None` until the session has produced a final key.
    pub fn compose(
        &self,
        env: &impl Environment,
        inbox: &Participant,
        to: Role,
        text: &str,
    ) -> Option<ClientMessage> {
        let key = &inbox.latest_snapshot()?.alice.final_key;
        if key.is_empty() {
            return None;
        }

        Some(ClientMessage::RelayMessage(OtpEnvelope {
            id: format!("{:016x}", env.random_u64()),
            from: Role::Alice,
            to,
            plaintext: text.to_string(),
            ciphertext: otp::encrypt(text, key),
            timestamp: env.unix_millis(),
        }))
    }
}

/// The receiver.
#[derive(Debug, Clone, Copy)]
pub struct Bob {
    conn_id: u64,
}

impl Bob {
    /// Script for the connection joined as Bob.
    pub fn new(conn_id: u64) -> Self {
        Self { conn_id }
    }

    /// Connection id.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Measure the last delivered batch, each photon in a random basis.
    ///
    /// Returns `None` if nothing has been delivered.
    pub fn measure(&self, env: &impl Environment, inbox: &Participant) -> Option<ClientMessage> {
        let photons = inbox.delivered_photons()?;

        let bits = photons
            .iter()
            .map(|photon| {
                let basis = channel::generate_basis(env);
                QuantumBit::new(channel::measure(env, photon, basis).bit, basis)
            })
            .collect();

        Some(ClientMessage::ReportMeasurements { bits })
    }

    /// Decrypt every relayed message with Bob's final key.
    pub fn read(&self, inbox: &Participant) -> Vec<String> {
        let key = inbox.latest_snapshot().map(|s| s.bob.final_key.as_slice()).unwrap_or_default();
        inbox.relayed().map(|envelope| otp::decrypt(&envelope.ciphertext, key)).collect()
    }
}

/// The eavesdropper.
#[derive(Debug, Clone, Copy)]
pub struct Eve {
    conn_id: u64,
}

impl Eve {
    /// Script for the connection joined as Eve.
    pub fn new(conn_id: u64) -> Self {
        Self { conn_id }
    }

    /// Connection id.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Start or stop intercepting.
    pub fn set_active(&self, active: bool) -> ClientMessage {
        ClientMessage::SetEavesdropping { active }
    }
}
