//! Checksummed frame codec for the liftlink serial protocol.
//!
//! This is the byte-level core of liftlink. Every message crossing the
//! serial link is framed with a start-of-frame marker, a correlation id,
//! a payload length, a type tag, and CRC-16 checksums over header and
//! payload:
//!
//! ```text
//! ┌─────────┬────────┬──────────┬──────────┬─────────────┬───────────┬──────────────┐
//! │ SOF (1) │ ID (1) │ LEN (2)  │ TYPE (1) │ HEAD_CRC(2) │ PAYLOAD   │ PAYLOAD_CRC  │
//! │ 0x01    │        │ (BE)     │          │ (BE)        │ LEN bytes │ (2, BE)      │
//! └─────────┴────────┴──────────┴──────────┴─────────────┴───────────┴──────────────┘
//! ```
//!
//! Corrupt input never surfaces as an error: the decoder drops the partial
//! frame, logs it, and resynchronizes on the next start marker.

pub mod codec;
pub mod decoder;
pub mod error;

pub use codec::{encode_frame, Frame, FrameConfig, HEADER_SIZE, MAX_PAYLOAD, SOF_BYTE};
pub use decoder::Decoder;
pub use error::{FrameError, Result};
