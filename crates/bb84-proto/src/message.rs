//! Wire messages exchanged between participants and the server.
//!
//! Messages are JSON objects tagged as `{"type": "...", "data": ...}`. Unit
//! variants omit `data`.

use serde::{Deserialize, Serialize};

use crate::{
    session::{OtpEnvelope, SessionSnapshot},
    types::{Bit, PhotonPacket, QuantumBit, Role},
};

/// Action requested by a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Register this connection under a role
    Join {
        /// Claimed role
        role: Role,
    },
    /// Alice sends her encoded photons
    Transmit {
        /// Packets in transmission order
        photons: Vec<PhotonPacket>,
    },
    /// Bob reports measurement outcomes
    ReportMeasurements {
        /// Measured bit and Bob's basis per photon
        bits: Vec<QuantumBit>,
    },
    /// Alice publishes her bits and bases for sifting
    PublishBases {
        /// Alice's prepared bits
        bits: Vec<QuantumBit>,
    },
    /// Alice asks for the QBER estimate
    CheckErrorRate,
    /// Alice asks for final key derivation
    FinalizeKey,
    /// Eve toggles interception
    SetEavesdropping {
        /// New interception state
        active: bool,
    },
    /// Replace the session with a fresh one
    Restart,
    /// Forward an OTP envelope to its recipient
    RelayMessage(OtpEnvelope),
}

impl ClientMessage {
    /// Short action name used in logs and rejections.
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Transmit { .. } => "transmit",
            Self::ReportMeasurements { .. } => "report_measurements",
            Self::PublishBases { .. } => "publish_bases",
            Self::CheckErrorRate => "check_error_rate",
            Self::FinalizeKey => "finalize_key",
            Self::SetEavesdropping { .. } => "set_eavesdropping",
            Self::Restart => "restart",
            Self::RelayMessage(_) => "relay_message",
        }
    }
}

/// Message published by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full authoritative session state
    SessionUpdated(Box<SessionSnapshot>),
    /// Roles currently held by connected participants
    RosterUpdated {
        /// Held roles in join order
        roles: Vec<Role>,
    },
    /// Photons arriving at the receiver (after any interception)
    PhotonsDelivered {
        /// Packets as delivered
        photons: Vec<PhotonPacket>,
    },
    /// Eve intercepted the last transmission
    Intercepted {
        /// Number of packets intercepted
        count: usize,
    },
    /// Sifted keys are ready
    Sifted {
        /// Alice's sifted key
        alice_key: Vec<Bit>,
        /// Bob's sifted key
        bob_key: Vec<Bit>,
    },
    /// OTP envelope forwarded from another participant
    MessageRelayed(OtpEnvelope),
    /// The requested action was refused
    Rejected {
        /// Action name
        action: String,
        /// Human readable reason
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::Basis;

    #[test]
    fn unit_variant_has_only_type() {
        let value = serde_json::to_value(ClientMessage::CheckErrorRate).unwrap();
        assert_eq!(value, json!({ "type": "check_error_rate" }));
    }

    #[test]
    fn join_parses_from_json() {
        let message: ClientMessage =
            serde_json::from_value(json!({ "type": "join", "data": { "role": "bob" } })).unwrap();
        assert_eq!(message, ClientMessage::Join { role: Role::Bob });
    }

    #[test]
    fn report_measurements_parses_from_json() {
        let message: ClientMessage = serde_json::from_value(json!({
            "type": "report_measurements",
            "data": { "bits": [{ "bit": 1, "basis": "diagonal" }] }
        }))
        .unwrap();

        assert_eq!(
            message,
            ClientMessage::ReportMeasurements {
                bits: vec![QuantumBit::new(Bit::One, Basis::Diagonal)]
            }
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result = serde_json::from_value::<ClientMessage>(json!({ "type": "launch" }));
        assert!(result.is_err());
    }

    #[test]
    fn action_names() {
        assert_eq!(ClientMessage::Restart.action_name(), "restart");
        assert_eq!(
            ClientMessage::SetEavesdropping { active: true }.action_name(),
            "set_eavesdropping"
        );
    }

    #[test]
    fn intercepted_event_json() {
        let value = serde_json::to_value(ServerMessage::Intercepted { count: 20 }).unwrap();
        assert_eq!(value, json!({ "type": "intercepted", "data": { "count": 20 } }));
    }
}
