//! Serialization of single RCON packets, independent of any socket.

use crate::errors::{DecodingError, EncodingError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::mem::size_of;

/// Smallest possible body: request ID, packet type and the two NUL bytes.
pub const MIN_BODY_LEN: usize = size_of::<i32>() * 2 + 2;

/// Request ID the server answers with when authentication failed.
pub const AUTH_FAILED_ID: i32 = -1;

/// Packet types sent and recieved by the client.
///
/// The auth response shares its value with [`RconPacketType::RunCommand`],
/// see [`RconPacketType::AUTH_RESPONSE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RconPacketType {
    /// Output of a command.
    Response,
    /// Run a command.
    RunCommand,
    /// Authenticate with the password.
    Login,
}

impl RconPacketType {
    /// Type of the reply to a [`RconPacketType::Login`] packet.
    pub const AUTH_RESPONSE: Self = Self::RunCommand;
}

impl From<RconPacketType> for i32 {
    fn from(packet_type: RconPacketType) -> Self {
        match packet_type {
            RconPacketType::Response => 0,
            RconPacketType::RunCommand => 2,
            RconPacketType::Login => 3,
        }
    }
}

/// A single protocol unit.
///
/// The packet type is kept as the raw integer: servers disagree on what they
/// send back, and the client only relies on the request ID and the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    /// Client-assigned correlation ID, echoed by the server.
    pub request_id: i32,
    /// Raw packet type.
    pub packet_type: i32,
    /// UTF-8 text without the terminating NUL bytes.
    pub payload: String,
}

impl RconPacket {
    /// Build a packet. Nothing is validated until [`RconPacket::encode`].
    pub fn new(request_id: i32, packet_type: impl Into<i32>, payload: impl Into<String>) -> Self {
        Self {
            request_id,
            packet_type: packet_type.into(),
            payload: payload.into(),
        }
    }

    /// Serialize the packet into a complete frame, length prefix included.
    ///
    /// # Errors
    /// Returns [`EncodingError`] if the payload contains a NUL byte or the body
    /// would be longer than `max_len`.
    pub fn encode(&self, max_len: usize) -> Result<Bytes, EncodingError> {
        let len = validate_payload(&self.payload, max_len)?;

        let mut bytes = BytesMut::with_capacity(size_of::<i32>() + len as usize);

        bytes.put_i32_le(len);
        bytes.put_i32_le(self.request_id);
        bytes.put_i32_le(self.packet_type);
        bytes.put(self.payload.as_bytes());
        bytes.put_u16(0x00_00);

        Ok(bytes.freeze())
    }

    /// Deserialize one frame body, i.e. everything after the length prefix.
    ///
    /// The two trailing bytes are dropped without being inspected.
    ///
    /// # Errors
    /// Returns [`DecodingError`] if the body is too short or the payload is not
    /// valid UTF-8.
    pub fn decode(mut body: Bytes) -> Result<Self, DecodingError> {
        if body.len() < MIN_BODY_LEN {
            return Err(DecodingError::TooShort(body.len()));
        }

        let request_id = body.get_i32_le();
        let packet_type = body.get_i32_le();

        body.truncate(body.len() - 2);
        let payload = String::from_utf8(body.to_vec())?;

        Ok(Self {
            request_id,
            packet_type,
            payload,
        })
    }
}

/// Check that `payload` can be sent in a frame of at most `max_len` body bytes.
///
/// Returns the body length of the resulting frame. A body that does not fit
/// the [i32] length prefix is too long whatever `max_len` says.
///
/// # Errors
/// Same conditions as [`RconPacket::encode`].
pub fn validate_payload(payload: &str, max_len: usize) -> Result<i32, EncodingError> {
    if payload.as_bytes().contains(&0) {
        return Err(EncodingError::NulInPayload);
    }

    let len = body_len(payload);
    if len > max_len {
        return Err(EncodingError::PayloadTooLong { len, max: max_len });
    }

    i32::try_from(len).map_err(|_| EncodingError::PayloadTooLong {
        len,
        max: i32::MAX as usize,
    })
}

/// Get the *remaining length* of the packet given its payload.
///
/// Remaining length here refers to the length of the packet in bytes excluding
/// the first four bytes which communicate this value: two [i32]s (request ID
/// and type), the payload, and **TWO** 0 bytes.
fn body_len(payload: &str) -> usize {
    payload.len() + MIN_BODY_LEN
}
