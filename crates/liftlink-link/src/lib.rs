//! Duplex byte-link abstraction for liftlink.
//!
//! The transport core above this crate only ever needs two primitives from
//! the physical link: write a slice of bytes, and poll for available bytes
//! with a bounded wait. On the device that link is a UART; on a host it is
//! a socket. This crate defines the [`ByteLink`] trait capturing exactly
//! that boundary, plus a stream-backed implementation so the whole stack
//! runs and is tested without serial hardware.

pub mod error;
#[cfg(unix)]
pub mod stream;
pub mod traits;

pub use error::{LinkError, Result};
#[cfg(unix)]
pub use stream::{LinkListener, StreamLink};
pub use traits::{ByteLink, LinkRx, LinkTx};
