//! Fuzz target for [`ServerDriver`] event handling
//!
//! Prevent session corruption through out-of-order or unauthorized actions
//!
//! # Strategy
//!
//! - Event sequences: arbitrary connects, disconnects and client messages
//!   over a small pool of connection slots
//! - Role probing: every action from every role, joined or not
//! - Phase probing: transmit, report, publish, check and finalize in any
//!   order, with and without Eve
//!
//! # Invariants
//!
//! - Only `UnknownConnection` escapes `process_event`; everything else is a
//!   `rejected` reply
//! - A rejected action leaves the session snapshot untouched
//! - Rejections go to the sender only
//! - The registry never exceeds `max_connections`
//! - Sifted keys always have equal length
//! - NEVER panic

#![no_main]

use arbitrary::Arbitrary;
use bb84_core::{Environment, SessionConfig};
use bb84_harness::SimEnv;
use bb84_proto::{
    Basis, Bit, ClientMessage, OtpEnvelope, PhotonId, PhotonPacket, QuantumBit, Role,
    ServerMessage,
};
use bb84_server::{DriverConfig, DriverError, ServerAction, ServerDriver, ServerEvent};
use libfuzzer_sys::fuzz_target;

const SLOTS: u64 = 6;
const MAX_CONNECTIONS: usize = 4;

#[derive(Debug, Clone, Arbitrary)]
enum DriverEvent {
    Connect { slot: u8 },
    Disconnect { slot: u8 },
    Message { slot: u8, message: FuzzedMessage },
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzedMessage {
    Join { role: u8 },
    Transmit { bits: Vec<(bool, bool)> },
    Report { bits: Vec<(bool, bool)> },
    Publish { bits: Vec<(bool, bool)> },
    CheckErrorRate,
    FinalizeKey,
    SetEavesdropping { active: bool },
    Restart,
    Relay { from: u8, to: u8, text: String },
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    seed: u64,
    enforce_roles: bool,
    enforce_threshold: bool,
    events: Vec<DriverEvent>,
}

fuzz_target!(|input: FuzzInput| {
    let config = DriverConfig {
        max_connections: MAX_CONNECTIONS,
        enforce_roles: input.enforce_roles,
        session: SessionConfig {
            enforce_threshold: input.enforce_threshold,
            ..SessionConfig::default()
        },
    };

    let mut driver = ServerDriver::new(SimEnv::with_seed(input.seed), config);

    for event in input.events {
        let (event, sender) = match event {
            DriverEvent::Connect { slot } => {
                (ServerEvent::ConnectionAccepted { conn_id: conn_id(slot) }, None)
            },
            DriverEvent::Disconnect { slot } => (
                ServerEvent::ConnectionClosed {
                    conn_id: conn_id(slot),
                    reason: "fuzz".to_string(),
                },
                None,
            ),
            DriverEvent::Message { slot, message } => {
                let conn_id = conn_id(slot);
                let message = build_message(&message, driver.env().unix_millis());
                (ServerEvent::MessageReceived { conn_id, message }, Some(conn_id))
            },
        };

        let before = driver.session().snapshot();

        match driver.process_event(event) {
            Ok(actions) => {
                let rejected: Vec<_> = actions
                    .iter()
                    .filter_map(|action| match action {
                        ServerAction::SendToConnection {
                            conn_id,
                            message: ServerMessage::Rejected { .. },
                        } => Some(*conn_id),
                        _ => None,
                    })
                    .collect();

                if !rejected.is_empty() {
                    assert_eq!(rejected.len(), 1, "one rejection per message");
                    assert_eq!(Some(rejected[0]), sender, "rejection must go to the sender");
                    assert_eq!(*driver.session().state(), before, "rejected action mutated state");
                }
            },
            Err(err) => {
                assert!(matches!(err, DriverError::UnknownConnection(_)), "unexpected {err}");
                assert_eq!(*driver.session().state(), before);
            },
        }

        assert!(driver.registry().len() <= MAX_CONNECTIONS);
        let state = driver.session().state();
        assert_eq!(state.alice.sifted_key.len(), state.bob.sifted_key.len());
    }
});

fn conn_id(slot: u8) -> u64 {
    u64::from(slot) % SLOTS + 1
}

fn role(byte: u8) -> Role {
    match byte % 3 {
        0 => Role::Alice,
        1 => Role::Bob,
        _ => Role::Eve,
    }
}

fn quantum_bits(bits: &[(bool, bool)]) -> Vec<QuantumBit> {
    bits.iter()
        .map(|&(bit, diagonal)| {
            QuantumBit::new(
                Bit::from(bit),
                if diagonal { Basis::Diagonal } else { Basis::Rectilinear },
            )
        })
        .collect()
}

fn build_message(message: &FuzzedMessage, timestamp: u64) -> ClientMessage {
    match message {
        FuzzedMessage::Join { role: r } => ClientMessage::Join { role: role(*r) },
        FuzzedMessage::Transmit { bits } => ClientMessage::Transmit {
            photons: quantum_bits(bits)
                .into_iter()
                .enumerate()
                .map(|(i, qb)| PhotonPacket {
                    id: PhotonId::from_random_bytes((i as u128).to_be_bytes()),
                    bit: qb.bit,
                    basis: qb.basis,
                    timestamp,
                })
                .collect(),
        },
        FuzzedMessage::Report { bits } => {
            ClientMessage::ReportMeasurements { bits: quantum_bits(bits) }
        },
        FuzzedMessage::Publish { bits } => ClientMessage::PublishBases { bits: quantum_bits(bits) },
        FuzzedMessage::CheckErrorRate => ClientMessage::CheckErrorRate,
        FuzzedMessage::FinalizeKey => ClientMessage::FinalizeKey,
        FuzzedMessage::SetEavesdropping { active } => {
            ClientMessage::SetEavesdropping { active: *active }
        },
        FuzzedMessage::Restart => ClientMessage::Restart,
        FuzzedMessage::Relay { from, to, text } => ClientMessage::RelayMessage(OtpEnvelope {
            id: "fuzz".to_string(),
            from: role(*from),
            to: role(*to),
            plaintext: text.clone(),
            ciphertext: String::new(),
            timestamp,
        }),
    }
}
