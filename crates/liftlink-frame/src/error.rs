/// Errors that can occur while encoding frames.
///
/// Decoding has no error surface: corrupt or oversized input is dropped
/// inside the decoder as a transport-level integrity filter.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the maximum a frame can carry.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
