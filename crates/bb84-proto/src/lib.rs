//! BB84 wire protocol.
//!
//! Data model for a BB84 key-exchange session, the messages participants and
//! the server exchange, and the frame codec that carries them.
//!
//! # Layers
//!
//! - [`types`]: bits, bases, roles, phases, photon packets
//! - [`session`]: the authoritative session snapshot and OTP envelopes
//! - [`message`]: client actions and server events
//! - [`frame`]: 12-byte header + JSON payload framing

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod frame;
pub mod message;
pub mod session;
pub mod types;

pub use error::ProtoError;
pub use frame::{Frame, FrameHeader};
pub use message::{ClientMessage, ServerMessage};
pub use session::{
    AliceState, BobState, DEFAULT_QBER_THRESHOLD, EveState, OtpEnvelope, SessionSnapshot,
};
pub use types::{
    Basis, Bit, InterceptedPhoton, Phase, PhotonId, PhotonPacket, QuantumBit, Role, SessionId,
};
