//! Fuzz target for frame decoding
//!
//! # Strategy
//!
//! - Well-formed headers around arbitrary payloads, with the declared size
//!   optionally skewed from the real one
//! - Raw byte soup
//!
//! # Invariants
//!
//! - NEVER panic on any input
//! - A decoded frame's payload length equals its declared size
//! - A payload that parses as a client message survives re-encoding

#![no_main]

use arbitrary::Arbitrary;
use bb84_proto::{
    ClientMessage, Frame, FrameHeader,
    frame::{MAGIC, VERSION},
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum FuzzInput {
    Structured { flags: u8, skew: i8, payload: Vec<u8> },
    Raw(Vec<u8>),
}

fuzz_target!(|input: FuzzInput| {
    let bytes = match input {
        FuzzInput::Structured { flags, skew, payload } => {
            let declared = (payload.len() as i64 + i64::from(skew)).clamp(0, i64::from(u32::MAX));
            let mut bytes = Vec::with_capacity(FrameHeader::SIZE + payload.len());
            bytes.extend_from_slice(&MAGIC);
            bytes.push(VERSION);
            bytes.push(flags);
            bytes.extend_from_slice(&[0, 0]);
            bytes.extend_from_slice(&(declared as u32).to_be_bytes());
            bytes.extend_from_slice(&payload);
            bytes
        },
        FuzzInput::Raw(bytes) => bytes,
    };

    let Ok(frame) = Frame::decode(&bytes) else {
        return;
    };
    assert_eq!(frame.payload.len(), frame.header.payload_size() as usize);

    let Ok(message) = frame.to_message::<ClientMessage>() else {
        return;
    };
    let encoded = Frame::from_message(&message).expect("decoded message re-encodes").to_bytes();
    let again: ClientMessage = Frame::decode(&encoded)
        .expect("re-encoded frame decodes")
        .to_message()
        .expect("re-encoded payload parses");
    assert_eq!(again, message);
});
