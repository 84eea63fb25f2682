//! Control-message codec.
//!
//! Every control packet starts with a 1-byte tag in `0xD1..=0xD6`; the body
//! is a fixed byte layout per tag. Any inbound frame whose first byte falls
//! outside the reserved range is not a protocol message at all - it belongs
//! to the host, tag included, and decoding reports [`DecodeError::NotControl`]
//! so the caller can pass it through untouched.

use alloc::vec::Vec;

use crate::types::{LogicalId, Mac};

pub const TAG_GATEWAY_ANNOUNCE: u8 = 0xD1;
pub const TAG_NODE_ID_REQUEST: u8 = 0xD2;
pub const TAG_NODE_ID_ASSIGN: u8 = 0xD3;
pub const TAG_NODE_ID_ACK: u8 = 0xD4;
pub const TAG_NODE_PING: u8 = 0xD5;
pub const TAG_GATEWAY_PONG: u8 = 0xD6;

/// True if `tag` lies in the reserved control range.
#[inline]
pub fn is_control_tag(tag: u8) -> bool {
    (TAG_GATEWAY_ANNOUNCE..=TAG_GATEWAY_PONG).contains(&tag)
}

/// Decoding failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Zero-length frame.
    Empty,
    /// First byte is outside the control range; the frame is host payload.
    NotControl,
    /// Control tag with a body shorter than its layout requires.
    UnexpectedEof,
}

/// The six control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Periodic gateway broadcast carrying the gateway's radio MAC.
    GatewayAnnounce { mac: Mac },
    /// Id request from a joining device, carrying its radio MAC.
    NodeIdRequest { mac: Mac },
    /// Id grant; MAC-filtered by receivers since it rides a transport
    /// broadcast.
    NodeIdAssign { id: LogicalId, mac: Mac },
    /// Confirmation that an assigned id was adopted.
    NodeIdAck,
    /// Node-to-gateway liveness probe.
    NodePing,
    /// Gateway's answer to a ping.
    GatewayPong,
}

/// Cursor over an inbound frame body.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.pos >= self.buf.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn read_mac(&mut self) -> Result<Mac, DecodeError> {
        if self.pos + 6 > self.buf.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buf[self.pos..self.pos + 6]);
        self.pos += 6;
        Ok(mac)
    }
}

impl Message {
    pub fn tag(&self) -> u8 {
        match self {
            Message::GatewayAnnounce { .. } => TAG_GATEWAY_ANNOUNCE,
            Message::NodeIdRequest { .. } => TAG_NODE_ID_REQUEST,
            Message::NodeIdAssign { .. } => TAG_NODE_ID_ASSIGN,
            Message::NodeIdAck => TAG_NODE_ID_ACK,
            Message::NodePing => TAG_NODE_PING,
            Message::GatewayPong => TAG_GATEWAY_PONG,
        }
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8);
        buf.push(self.tag());
        match self {
            Message::GatewayAnnounce { mac } | Message::NodeIdRequest { mac } => {
                buf.extend_from_slice(mac);
            }
            Message::NodeIdAssign { id, mac } => {
                buf.push(*id);
                buf.extend_from_slice(mac);
            }
            Message::NodeIdAck | Message::NodePing | Message::GatewayPong => {}
        }
        buf
    }

    pub fn decode_from_slice(buf: &[u8]) -> Result<Message, DecodeError> {
        let (&tag, body) = buf.split_first().ok_or(DecodeError::Empty)?;
        if !is_control_tag(tag) {
            return Err(DecodeError::NotControl);
        }
        let mut r = Reader::new(body);
        match tag {
            TAG_GATEWAY_ANNOUNCE => Ok(Message::GatewayAnnounce { mac: r.read_mac()? }),
            TAG_NODE_ID_REQUEST => Ok(Message::NodeIdRequest { mac: r.read_mac()? }),
            TAG_NODE_ID_ASSIGN => Ok(Message::NodeIdAssign {
                id: r.read_u8()?,
                mac: r.read_mac()?,
            }),
            TAG_NODE_ID_ACK => Ok(Message::NodeIdAck),
            TAG_NODE_PING => Ok(Message::NodePing),
            _ => Ok(Message::GatewayPong),
        }
    }
}
