use std::time::Duration;

use crate::error::Result;

/// Receiving half of a duplex byte link.
///
/// `recv` polls for whatever bytes are available, waiting at most `wait`.
/// Returning `Ok(0)` means nothing arrived within the wait — it is not an
/// end-of-stream signal. A closed link is reported as [`LinkError::Closed`]
/// so the caller can distinguish silence from disconnection.
///
/// [`LinkError::Closed`]: crate::error::LinkError::Closed
pub trait LinkRx: Send + 'static {
    /// Read up to `buf.len()` bytes, waiting at most `wait` for the first.
    fn recv(&mut self, buf: &mut [u8], wait: Duration) -> Result<usize>;
}

/// Transmitting half of a duplex byte link.
pub trait LinkTx: Send + 'static {
    /// Write the whole buffer to the link (blocking).
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// A duplex byte link that can be split into independent halves.
///
/// The receive half is owned exclusively by the transport's receive loop;
/// the transmit half lives under the transport guard alongside the codec
/// and listener state. Splitting up front is what lets the loop poll the
/// link without ever holding the guard across a wait.
pub trait ByteLink: Send + 'static {
    type Rx: LinkRx;
    type Tx: LinkTx;

    /// Split the link into its receive and transmit halves.
    fn split(self) -> Result<(Self::Rx, Self::Tx)>;
}
