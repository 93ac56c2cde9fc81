//! Application payload shapes carried inside frames.
//!
//! The field layouts here mirror the packed structs in the device
//! firmware byte for byte; order and widths are a compile-time contract
//! between both ends of the link. Everything else on the wire is opaque
//! to this layer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PeerError, Result};

/// Frame type tag: liveness probe (query, expects an echo response).
pub const MSG_TYPE_HEARTBEAT: u8 = 0x01;
/// Frame type tag: emergency stop (fire-and-forget, high priority on the device).
pub const MSG_TYPE_ESTOP: u8 = 0x02;
/// Frame type tag: command request/response (correlated).
pub const MSG_TYPE_COMMAND: u8 = 0x03;
/// Frame type tag: unsolicited state event.
pub const MSG_TYPE_EVENT: u8 = 0x04;

/// Maximum parameter/data bytes in a command request or response.
pub const MAX_COMMAND_DATA: usize = 16;

/// Wire size of an encoded command request.
pub const REQUEST_WIRE_LEN: usize = 1 + MAX_COMMAND_DATA + 1;
/// Wire size of an encoded command response.
pub const RESPONSE_WIRE_LEN: usize = 2 + MAX_COMMAND_DATA + 1;
/// Wire size of an encoded state event.
pub const EVENT_WIRE_LEN: usize = 2;

/// Outcome code in a command response.
///
/// Opaque to this layer beyond the mapping; operational meaning belongs
/// to the application. Unknown codes pass through unmodified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    ErrUnknown,
    ErrInvalid,
    ErrBusy,
    Other(u8),
}

impl CommandStatus {
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            0x00 => CommandStatus::Ok,
            0x01 => CommandStatus::ErrUnknown,
            0x02 => CommandStatus::ErrInvalid,
            0x03 => CommandStatus::ErrBusy,
            other => CommandStatus::Other(other),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            CommandStatus::Ok => 0x00,
            CommandStatus::ErrUnknown => 0x01,
            CommandStatus::ErrInvalid => 0x02,
            CommandStatus::ErrBusy => 0x03,
            CommandStatus::Other(byte) => byte,
        }
    }

    pub fn is_ok(self) -> bool {
        self == CommandStatus::Ok
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandStatus::Ok => write!(f, "ok"),
            CommandStatus::ErrUnknown => write!(f, "err_unknown"),
            CommandStatus::ErrInvalid => write!(f, "err_invalid"),
            CommandStatus::ErrBusy => write!(f, "err_busy"),
            CommandStatus::Other(byte) => write!(f, "status_{byte}"),
        }
    }
}

/// A command sent to the device, expecting a correlated response.
///
/// Wire layout: `command_id (1) | params (16, zero-padded) | params_len (1)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command_id: u8,
    params: Bytes,
}

impl CommandRequest {
    /// Create a request; params are limited to [`MAX_COMMAND_DATA`] bytes.
    pub fn new(command_id: u8, params: impl Into<Bytes>) -> Result<Self> {
        let params = params.into();
        if params.len() > MAX_COMMAND_DATA {
            return Err(PeerError::FieldTooLong {
                field: "command params",
                len: params.len(),
                max: MAX_COMMAND_DATA,
            });
        }
        Ok(Self { command_id, params })
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(REQUEST_WIRE_LEN);
        buf.put_u8(self.command_id);
        buf.put_slice(&self.params);
        buf.put_bytes(0, MAX_COMMAND_DATA - self.params.len());
        buf.put_u8(self.params.len() as u8);
        buf.freeze()
    }

    pub fn from_wire(payload: &[u8]) -> Result<Self> {
        if payload.len() < REQUEST_WIRE_LEN {
            return Err(PeerError::MalformedPayload {
                what: "command request",
                len: payload.len(),
                need: REQUEST_WIRE_LEN,
            });
        }
        let params_len = usize::min(payload[REQUEST_WIRE_LEN - 1] as usize, MAX_COMMAND_DATA);
        Ok(Self {
            command_id: payload[0],
            params: Bytes::copy_from_slice(&payload[1..1 + params_len]),
        })
    }
}

/// The device's answer to a [`CommandRequest`].
///
/// Wire layout: `command_id (1) | status (1) | data (16, zero-padded) | data_len (1)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    /// Echo of the request's command id.
    pub command_id: u8,
    pub status: CommandStatus,
    data: Bytes,
}

impl CommandResponse {
    /// Create a response; data is limited to [`MAX_COMMAND_DATA`] bytes.
    pub fn new(command_id: u8, status: CommandStatus, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() > MAX_COMMAND_DATA {
            return Err(PeerError::FieldTooLong {
                field: "response data",
                len: data.len(),
                max: MAX_COMMAND_DATA,
            });
        }
        Ok(Self {
            command_id,
            status,
            data,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn to_wire(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(RESPONSE_WIRE_LEN);
        buf.put_u8(self.command_id);
        buf.put_u8(self.status.to_wire());
        buf.put_slice(&self.data);
        buf.put_bytes(0, MAX_COMMAND_DATA - self.data.len());
        buf.put_u8(self.data.len() as u8);
        buf.freeze()
    }

    pub fn from_wire(payload: &[u8]) -> Result<Self> {
        if payload.len() < RESPONSE_WIRE_LEN {
            return Err(PeerError::MalformedPayload {
                what: "command response",
                len: payload.len(),
                need: RESPONSE_WIRE_LEN,
            });
        }
        let data_len = usize::min(payload[RESPONSE_WIRE_LEN - 1] as usize, MAX_COMMAND_DATA);
        Ok(Self {
            command_id: payload[0],
            status: CommandStatus::from_wire(payload[1]),
            data: Bytes::copy_from_slice(&payload[2..2 + data_len]),
        })
    }
}

/// An unsolicited state change reported by the device.
///
/// Wire layout: `event_type (1) | data (1)`. Carries no correlation id
/// beyond its frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateEvent {
    pub event_type: u8,
    pub data: u8,
}

impl StateEvent {
    pub fn new(event_type: u8, data: u8) -> Self {
        Self { event_type, data }
    }

    pub fn to_wire(self) -> [u8; EVENT_WIRE_LEN] {
        [self.event_type, self.data]
    }

    pub fn from_wire(payload: &[u8]) -> Result<Self> {
        if payload.len() < EVENT_WIRE_LEN {
            return Err(PeerError::MalformedPayload {
                what: "state event",
                len: payload.len(),
                need: EVENT_WIRE_LEN,
            });
        }
        Ok(Self {
            event_type: payload[0],
            data: payload[1],
        })
    }
}
