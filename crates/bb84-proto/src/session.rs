//! Session snapshot payloads.
//!
//! The snapshot is the complete authoritative state of one protocol run. It is
//! published whole on every mutation; participants never receive diffs.

use serde::{Deserialize, Serialize};

use crate::types::{Bit, InterceptedPhoton, Phase, PhotonPacket, QuantumBit, Role, SessionId};

/// Default QBER abort threshold.
pub const DEFAULT_QBER_THRESHOLD: f64 = 0.11;

/// Sender's view of the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AliceState {
    /// Prepared bits with their encoding bases (published at basis comparison)
    pub bits: Vec<QuantumBit>,
    /// Packets as Alice sent them
    pub sent_photons: Vec<PhotonPacket>,
    /// Alice's half of the sifted key
    pub sifted_key: Vec<Bit>,
    /// Alice's final key
    pub final_key: Vec<Bit>,
}

/// Receiver's view of the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BobState {
    /// Measured bits with the bases Bob chose
    pub bits: Vec<QuantumBit>,
    /// Packets as they arrived at Bob
    pub received_photons: Vec<PhotonPacket>,
    /// Bob's half of the sifted key
    pub sifted_key: Vec<Bit>,
    /// Bob's final key
    pub final_key: Vec<Bit>,
}

/// Eavesdropper's view of the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EveState {
    /// Interception log for the current round
    pub intercepted_photons: Vec<InterceptedPhoton>,
    /// Whether the next transmission will be intercepted
    pub active: bool,
}

/// Full state of a session generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session generation id
    pub id: SessionId,
    /// Sender state
    pub alice: AliceState,
    /// Receiver state
    pub bob: BobState,
    /// Eavesdropper state
    pub eve: EveState,
    /// Current phase
    pub phase: Phase,
    /// Quantum bit error rate, meaningful from `error_check` onward
    pub qber: f64,
    /// Abort threshold for `qber`
    pub threshold: f64,
}

impl SessionSnapshot {
    /// Fresh, empty session in the `setup` phase.
    pub fn new(id: SessionId, threshold: f64) -> Self {
        Self {
            id,
            alice: AliceState::default(),
            bob: BobState::default(),
            eve: EveState::default(),
            phase: Phase::Setup,
            qber: 0.0,
            threshold,
        }
    }

    /// True once both parties hold a final key.
    pub fn has_final_key(&self) -> bool {
        self.phase == Phase::Complete && !self.alice.final_key.is_empty()
    }
}

/// One-time-pad message relayed between participants.
///
/// The server treats the envelope as opaque and only routes it by `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpEnvelope {
    /// Sender-chosen message id
    pub id: String,
    /// Originating role
    pub from: Role,
    /// Recipient role
    pub to: Role,
    /// Plaintext as typed by the sender
    pub plaintext: String,
    /// Base64 ciphertext
    pub ciphertext: String,
    /// Unix milliseconds
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_snapshot_is_empty() {
        let snapshot =
            SessionSnapshot::new(SessionId::from_random_bytes([1; 16]), DEFAULT_QBER_THRESHOLD);

        assert_eq!(snapshot.phase, Phase::Setup);
        assert!(snapshot.alice.bits.is_empty());
        assert!(snapshot.bob.received_photons.is_empty());
        assert!(!snapshot.eve.active);
        assert!(!snapshot.has_final_key());
        assert!((snapshot.qber - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_json_field_names() {
        let snapshot =
            SessionSnapshot::new(SessionId::from_random_bytes([1; 16]), DEFAULT_QBER_THRESHOLD);
        let value = serde_json::to_value(&snapshot).unwrap();

        for key in ["id", "alice", "bob", "eve", "phase", "qber", "threshold"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert!(value["alice"].get("sent_photons").is_some());
        assert!(value["bob"].get("received_photons").is_some());
        assert!(value["eve"].get("intercepted_photons").is_some());
        assert_eq!(value["phase"], "setup");
    }

    #[test]
    fn snapshot_json_roundtrip() {
        let mut snapshot = SessionSnapshot::new(SessionId::from_random_bytes([9; 16]), 0.2);
        snapshot.alice.sifted_key = vec![Bit::One, Bit::Zero];
        snapshot.bob.sifted_key = vec![Bit::One, Bit::One];
        snapshot.phase = Phase::Sifting;

        let json = serde_json::to_string(&snapshot).unwrap();
        let decoded: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, snapshot);
    }
}
