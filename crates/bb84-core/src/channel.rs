//! Quantum channel simulator.
//!
//! Classical stand-in for the photon channel: bits and bases are drawn from
//! the environment RNG, photons are plain packets, and measurement follows
//! the BB84 rule. A measurement in the preparation basis returns the encoded
//! bit; a measurement in the conjugate basis returns a fresh uniform bit and
//! never reveals the original.
//!
//! Eavesdropping is modelled as intercept-resend: Eve measures every packet
//! in a basis of her own choosing and forwards a new packet carrying what she
//! saw. That substitution is the only way the channel is perturbed.

use bb84_proto::{Basis, Bit, InterceptedPhoton, PhotonId, PhotonPacket, QuantumBit};

use crate::env::Environment;

/// Outcome of measuring one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Observed bit
    pub bit: Bit,
    /// Whether the measurement basis matched the preparation basis
    pub correct: bool,
}

/// Result of intercepting a batch of packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interception {
    /// Packets as forwarded to the receiver
    pub delivered: Vec<PhotonPacket>,
    /// Eve's record, one entry per packet, in channel order
    pub log: Vec<InterceptedPhoton>,
}

/// Uniform random bit.
pub fn generate_bit(env: &impl Environment) -> Bit {
    Bit::from(env.random_bool())
}

/// Uniform random basis.
pub fn generate_basis(env: &impl Environment) -> Basis {
    if env.random_bool() { Basis::Diagonal } else { Basis::Rectilinear }
}

/// `n` independent bit/basis pairs for the sender to prepare.
pub fn generate_bit_sequence(env: &impl Environment, n: usize) -> Vec<QuantumBit> {
    (0..n).map(|_| QuantumBit::new(generate_bit(env), generate_basis(env))).collect()
}

/// Wrap a bit/basis pair into a packet with a fresh id and send timestamp.
pub fn encode(env: &impl Environment, bit: Bit, basis: Basis) -> PhotonPacket {
    PhotonPacket {
        id: PhotonId::from_random_bytes(env.random_id_bytes()),
        bit,
        basis,
        timestamp: env.unix_millis(),
    }
}

/// Encode a whole prepared sequence, preserving order.
pub fn encode_all(env: &impl Environment, bits: &[QuantumBit]) -> Vec<PhotonPacket> {
    bits.iter().map(|qb| encode(env, qb.bit, qb.basis)).collect()
}

/// Measure `packet` in `basis`.
///
/// Matching basis is deterministic. A mismatched basis draws a new random
/// bit on every call.
pub fn measure(env: &impl Environment, packet: &PhotonPacket, basis: Basis) -> Measurement {
    if packet.basis == basis {
        Measurement { bit: packet.bit, correct: true }
    } else {
        Measurement { bit: generate_bit(env), correct: false }
    }
}

/// Intercept-resend attack over a batch of packets.
///
/// Each forwarded packet keeps the original id and timestamp but carries
/// Eve's measured bit in Eve's basis. Must run before delivery to the
/// receiver.
pub fn intercept(env: &impl Environment, packets: &[PhotonPacket]) -> Interception {
    let mut delivered = Vec::with_capacity(packets.len());
    let mut log = Vec::with_capacity(packets.len());

    for packet in packets {
        let eve_basis = generate_basis(env);
        let observed = measure(env, packet, eve_basis);

        delivered.push(PhotonPacket { bit: observed.bit, basis: eve_basis, ..packet.clone() });
        log.push(InterceptedPhoton {
            photon: packet.clone(),
            eve_basis,
            eve_measurement: observed.bit,
        });
    }

    tracing::debug!(count = packets.len(), "photons intercepted");

    Interception { delivered, log }
}
