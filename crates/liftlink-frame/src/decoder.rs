use bytes::{BufMut, BytesMut};
use tracing::{trace, warn};

use crate::codec::{Frame, FrameConfig, CRC16, SOF_BYTE};

/// Incremental decode state. One variant per wire field being awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitStart,
    AwaitId,
    AwaitLen { got: u8 },
    AwaitType,
    AwaitHeaderChecksum { got: u8 },
    AwaitPayload,
    AwaitPayloadChecksum { got: u8 },
}

/// Streaming frame decoder.
///
/// Feed it bytes in arbitrary chunks; it yields completed frames and keeps
/// partial decode state across calls. Corrupt frames (checksum mismatch,
/// oversized length declaration, parser timeout) are dropped and counted,
/// never surfaced as errors.
pub struct Decoder {
    config: FrameConfig,
    state: DecodeState,
    /// Raw header bytes (`SOF..TYPE`), kept for the head CRC check.
    head: [u8; 5],
    id: u8,
    len: u16,
    frame_type: u8,
    /// Accumulator for the 2-byte checksum fields.
    crc_acc: u16,
    payload: BytesMut,
    /// Ticks since the last byte advanced a mid-frame parse.
    idle_ticks: u16,
    dropped: u64,
}

impl Decoder {
    /// Create a decoder with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a decoder with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            config,
            state: DecodeState::AwaitStart,
            head: [0u8; 5],
            id: 0,
            len: 0,
            frame_type: 0,
            crc_acc: 0,
            payload: BytesMut::new(),
            idle_ticks: 0,
            dropped: 0,
        }
    }

    /// Append bytes to the decode state, lazily yielding completed frames.
    ///
    /// Chunk boundaries are irrelevant: feeding one byte at a time yields
    /// the same frames as feeding everything at once.
    pub fn feed<'d, 'b>(&'d mut self, bytes: &'b [u8]) -> Feed<'d, 'b> {
        Feed {
            decoder: self,
            bytes,
            pos: 0,
        }
    }

    /// Advance the parser timeout.
    ///
    /// A parse that has sat mid-frame for `parser_timeout_ticks` without a
    /// byte advancing it is discarded silently, returning the decoder to
    /// the hunt for the next start marker.
    pub fn tick(&mut self) {
        if self.state == DecodeState::AwaitStart {
            return;
        }
        self.idle_ticks = self.idle_ticks.saturating_add(1);
        if self.idle_ticks >= self.config.parser_timeout_ticks {
            warn!(
                idle_ticks = self.idle_ticks,
                "parser timeout, discarding partial frame"
            );
            self.drop_frame();
        }
    }

    /// Number of frames dropped for corruption or parser timeout.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Current decoder configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn drop_frame(&mut self) {
        self.dropped += 1;
        self.reset();
    }

    fn reset(&mut self) {
        self.state = DecodeState::AwaitStart;
        self.payload.clear();
        self.idle_ticks = 0;
    }

    fn push(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            DecodeState::AwaitStart => {
                if byte == SOF_BYTE {
                    self.head[0] = byte;
                    self.idle_ticks = 0;
                    self.state = DecodeState::AwaitId;
                } else {
                    trace!(byte, "ignoring noise byte outside frame");
                }
                None
            }
            DecodeState::AwaitId => {
                self.id = byte;
                self.head[1] = byte;
                self.idle_ticks = 0;
                self.state = DecodeState::AwaitLen { got: 0 };
                None
            }
            DecodeState::AwaitLen { got } => {
                self.head[2 + got as usize] = byte;
                self.idle_ticks = 0;
                if got == 1 {
                    self.len = u16::from_be_bytes([self.head[2], self.head[3]]);
                    self.state = DecodeState::AwaitType;
                } else {
                    self.state = DecodeState::AwaitLen { got: got + 1 };
                }
                None
            }
            DecodeState::AwaitType => {
                self.frame_type = byte;
                self.head[4] = byte;
                self.crc_acc = 0;
                self.idle_ticks = 0;
                self.state = DecodeState::AwaitHeaderChecksum { got: 0 };
                None
            }
            DecodeState::AwaitHeaderChecksum { got } => {
                self.crc_acc = (self.crc_acc << 8) | u16::from(byte);
                self.idle_ticks = 0;
                if got == 0 {
                    self.state = DecodeState::AwaitHeaderChecksum { got: 1 };
                    return None;
                }
                let expected = CRC16.checksum(&self.head);
                if self.crc_acc != expected {
                    warn!(
                        got = self.crc_acc,
                        expected, "head checksum mismatch, dropping frame"
                    );
                    self.drop_frame();
                    return None;
                }
                if self.len as usize > self.config.max_payload {
                    warn!(
                        len = self.len,
                        max = self.config.max_payload,
                        "oversized frame declaration, dropping frame"
                    );
                    self.drop_frame();
                    return None;
                }
                if self.len == 0 {
                    return Some(self.complete());
                }
                self.payload.clear();
                self.state = DecodeState::AwaitPayload;
                None
            }
            DecodeState::AwaitPayload => {
                self.payload.put_u8(byte);
                self.idle_ticks = 0;
                if self.payload.len() == self.len as usize {
                    self.crc_acc = 0;
                    self.state = DecodeState::AwaitPayloadChecksum { got: 0 };
                }
                None
            }
            DecodeState::AwaitPayloadChecksum { got } => {
                self.crc_acc = (self.crc_acc << 8) | u16::from(byte);
                self.idle_ticks = 0;
                if got == 0 {
                    self.state = DecodeState::AwaitPayloadChecksum { got: 1 };
                    return None;
                }
                let expected = CRC16.checksum(&self.payload);
                if self.crc_acc != expected {
                    warn!(
                        got = self.crc_acc,
                        expected, "payload checksum mismatch, dropping frame"
                    );
                    self.drop_frame();
                    return None;
                }
                Some(self.complete())
            }
        }
    }

    fn complete(&mut self) -> Frame {
        let frame = Frame {
            id: self.id,
            frame_type: self.frame_type,
            payload: self.payload.split().freeze(),
        };
        self.reset();
        frame
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy frame iterator returned by [`Decoder::feed`].
///
/// Finite per call; unconsumed input bytes stay unread until the iterator
/// is advanced, and decode state carries over to the next `feed`.
pub struct Feed<'d, 'b> {
    decoder: &'d mut Decoder,
    bytes: &'b [u8],
    pos: usize,
}

impl Iterator for Feed<'_, '_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        while self.pos < self.bytes.len() {
            let byte = self.bytes[self.pos];
            self.pos += 1;
            if let Some(frame) = self.decoder.push(byte) {
                return Some(frame);
            }
        }
        None
    }
}
