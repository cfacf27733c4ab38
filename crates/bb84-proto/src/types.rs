//! Core value types shared by every participant.
//!
//! These are the building blocks of a BB84 run: raw bits, the two conjugate
//! bases, participant roles, protocol phases, and the photon packets that
//! travel over the simulated quantum channel.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use uuid::Uuid;

/// A classical bit, serialized as the JSON number `0` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Bit {
    /// Logical zero
    Zero = 0,
    /// Logical one
    One = 1,
}

impl Bit {
    /// Numeric value of the bit (0 or 1).
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Bit from the low bit of a byte.
    pub fn from_low_bit(byte: u8) -> Self {
        if byte & 1 == 1 { Self::One } else { Self::Zero }
    }
}

impl From<bool> for Bit {
    fn from(value: bool) -> Self {
        if value { Self::One } else { Self::Zero }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Encoding/measurement frame for a photon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Basis {
    /// Horizontal/vertical polarization (+)
    Rectilinear,
    /// 45°/135° polarization (×)
    Diagonal,
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rectilinear => f.write_str("rectilinear"),
            Self::Diagonal => f.write_str("diagonal"),
        }
    }
}

/// Participant role in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sender
    Alice,
    /// Receiver
    Bob,
    /// Eavesdropper
    Eve,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alice => f.write_str("alice"),
            Self::Bob => f.write_str("bob"),
            Self::Eve => f.write_str("eve"),
        }
    }
}

/// Protocol phase of a session.
///
/// `KeyGeneration` is part of the declared phase set but no transition
/// reaches it; final key derivation goes straight from `ErrorCheck` to
/// `Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the sender to transmit
    #[default]
    Setup,
    /// Photons delivered, receiver measuring
    Transmission,
    /// Bases compared, sifted keys available
    Sifting,
    /// QBER computed
    ErrorCheck,
    /// Declared, unreachable
    KeyGeneration,
    /// Final key established
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Transmission => "transmission",
            Self::Sifting => "sifting",
            Self::ErrorCheck => "error_check",
            Self::KeyGeneration => "key_generation",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// A bit together with the basis it was prepared or measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuantumBit {
    /// Bit value
    pub bit: Bit,
    /// Basis used
    pub basis: Basis,
}

impl QuantumBit {
    /// Create a new quantum bit.
    pub fn new(bit: Bit, basis: Basis) -> Self {
        Self { bit, basis }
    }
}

/// Opaque unique identifier of a photon packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotonId(Uuid);

impl PhotonId {
    /// Build an identifier from 16 random bytes.
    pub fn from_random_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

impl fmt::Display for PhotonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one session generation. Changes on every restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Build an identifier from 16 random bytes.
    pub fn from_random_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Builder::from_random_bytes(bytes).into_uuid())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A bit/basis pair in flight over the simulated quantum channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotonPacket {
    /// Unique packet id
    pub id: PhotonId,
    /// Encoded bit
    pub bit: Bit,
    /// Encoding basis
    pub basis: Basis,
    /// Send time, Unix milliseconds
    pub timestamp: u64,
}

impl PhotonPacket {
    /// The bit/basis pair carried by this packet.
    pub fn quantum_bit(&self) -> QuantumBit {
        QuantumBit::new(self.bit, self.basis)
    }
}

/// Eve's record of one intercepted packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptedPhoton {
    /// The packet as sent by Alice
    #[serde(flatten)]
    pub photon: PhotonPacket,
    /// Basis Eve measured in
    pub eve_basis: Basis,
    /// Bit Eve observed (and re-sent)
    pub eve_measurement: Bit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Bit::One).unwrap(), "1");
        assert_eq!(serde_json::from_str::<Bit>("0").unwrap(), Bit::Zero);
        assert!(serde_json::from_str::<Bit>("2").is_err());
    }

    #[test]
    fn basis_and_role_are_lowercase() {
        assert_eq!(serde_json::to_string(&Basis::Diagonal).unwrap(), "\"diagonal\"");
        assert_eq!(serde_json::to_string(&Role::Eve).unwrap(), "\"eve\"");
    }

    #[test]
    fn phase_is_snake_case() {
        assert_eq!(serde_json::to_string(&Phase::ErrorCheck).unwrap(), "\"error_check\"");
        assert_eq!(Phase::KeyGeneration.to_string(), "key_generation");
        assert_eq!(Phase::default(), Phase::Setup);
    }

    #[test]
    fn bit_from_low_bit() {
        assert_eq!(Bit::from_low_bit(0xfe), Bit::Zero);
        assert_eq!(Bit::from_low_bit(0x01), Bit::One);
    }

    #[test]
    fn intercepted_photon_flattens_packet() {
        let photon = PhotonPacket {
            id: PhotonId::from_random_bytes([7; 16]),
            bit: Bit::One,
            basis: Basis::Rectilinear,
            timestamp: 42,
        };
        let record =
            InterceptedPhoton { photon, eve_basis: Basis::Diagonal, eve_measurement: Bit::Zero };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["bit"], 1);
        assert_eq!(value["basis"], "rectilinear");
        assert_eq!(value["eve_basis"], "diagonal");
        assert_eq!(value["eve_measurement"], 0);
        assert_eq!(value["timestamp"], 42);
    }

    #[test]
    fn ids_are_v4_uuids() {
        let id = SessionId::from_random_bytes([0xab; 16]);
        let text = id.to_string();
        // version nibble
        assert_eq!(&text[14..15], "4");
    }
}
