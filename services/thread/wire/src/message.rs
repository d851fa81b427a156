//! MLE message framing.
//!
//! A datagram starts with a security suite byte. Secured messages carry a
//! [`SecurityHeader`] before the command byte; the TLV sequence follows.

use crate::error::WireError;
use crate::header::{SecurityHeader, SECURITY_SUITE_NONE, SECURITY_SUITE_SECURED};
use crate::tlv::{TlvIter, TlvWriter};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default capacity for outbound MLE payloads
pub const DEFAULT_MESSAGE_CAPACITY: usize = 1024;

/// MLE command types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MleCommand {
    /// Link Request
    LinkRequest = 0,
    /// Link Accept
    LinkAccept = 1,
    /// Link Accept and Request
    LinkAcceptAndRequest = 2,
    /// Link Reject
    LinkReject = 3,
    /// Advertisement
    Advertisement = 4,
    /// Update
    Update = 5,
    /// Update Request
    UpdateRequest = 6,
    /// Data Request
    DataRequest = 7,
    /// Data Response
    DataResponse = 8,
    /// Parent Request
    ParentRequest = 9,
    /// Parent Response
    ParentResponse = 10,
    /// Child ID Request
    ChildIdRequest = 11,
    /// Child ID Response
    ChildIdResponse = 12,
    /// Child Update Request
    ChildUpdateRequest = 13,
    /// Child Update Response
    ChildUpdateResponse = 14,
    /// Announce
    Announce = 15,
    /// Discovery Request
    DiscoveryRequest = 16,
    /// Discovery Response
    DiscoveryResponse = 17,
}

impl TryFrom<u8> for MleCommand {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MleCommand::*;
        Ok(match value {
            0 => LinkRequest,
            1 => LinkAccept,
            2 => LinkAcceptAndRequest,
            3 => LinkReject,
            4 => Advertisement,
            5 => Update,
            6 => UpdateRequest,
            7 => DataRequest,
            8 => DataResponse,
            9 => ParentRequest,
            10 => ParentResponse,
            11 => ChildIdRequest,
            12 => ChildIdResponse,
            13 => ChildUpdateRequest,
            14 => ChildUpdateResponse,
            15 => Announce,
            16 => DiscoveryRequest,
            17 => DiscoveryResponse,
            other => return Err(WireError::UnknownCommand(other)),
        })
    }
}

impl fmt::Display for MleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A framed MLE message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MleMessage {
    /// Security header, `None` for unsecured discovery messages
    pub security: Option<SecurityHeader>,
    /// Command type
    pub command: MleCommand,
    /// TLV sequence
    pub payload: Bytes,
}

impl MleMessage {
    /// Create an unsecured message
    pub fn new(command: MleCommand, payload: Bytes) -> Self {
        Self {
            security: None,
            command,
            payload,
        }
    }

    /// Attach a security header
    pub fn with_security(mut self, security: SecurityHeader) -> Self {
        self.security = Some(security);
        self
    }

    /// Iterate the TLVs of the payload
    pub fn tlvs(&self) -> TlvIter<'_> {
        TlvIter::new(&self.payload)
    }

    /// Encoded size
    pub fn encoded_len(&self) -> usize {
        1 + self.security.map_or(0, |s| s.encoded_len()) + 1 + self.payload.len()
    }

    /// Encode into a datagram
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        match &self.security {
            Some(header) => {
                buf.put_u8(SECURITY_SUITE_SECURED);
                header.encode(&mut buf);
            }
            None => buf.put_u8(SECURITY_SUITE_NONE),
        }
        buf.put_u8(self.command as u8);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a datagram
    pub fn decode(datagram: &[u8]) -> Result<Self, WireError> {
        let mut buf = datagram;
        if !buf.has_remaining() {
            return Err(WireError::Truncated);
        }
        let security = match buf.get_u8() {
            SECURITY_SUITE_SECURED => Some(SecurityHeader::decode(&mut buf)?),
            SECURITY_SUITE_NONE => None,
            other => return Err(WireError::Security(other)),
        };
        if !buf.has_remaining() {
            return Err(WireError::Truncated);
        }
        let command = MleCommand::try_from(buf.get_u8())?;

        let mut tlvs = TlvIter::new(buf);
        for _ in tlvs.by_ref() {}
        if tlvs.is_truncated() {
            return Err(WireError::Truncated);
        }

        Ok(Self {
            security,
            command,
            payload: Bytes::copy_from_slice(buf),
        })
    }
}

/// Builder for outbound MLE messages
#[derive(Debug)]
pub struct MessageBuilder {
    command: MleCommand,
    security: Option<SecurityHeader>,
    tlvs: TlvWriter,
}

impl MessageBuilder {
    /// Start a message with the default payload capacity
    pub fn new(command: MleCommand) -> Self {
        Self::with_capacity(command, DEFAULT_MESSAGE_CAPACITY)
    }

    /// Start a message with an explicit payload capacity
    pub fn with_capacity(command: MleCommand, capacity: usize) -> Self {
        Self {
            command,
            security: None,
            tlvs: TlvWriter::new(capacity),
        }
    }

    /// Set the security header
    pub fn security(mut self, security: SecurityHeader) -> Self {
        self.security = Some(security);
        self
    }

    /// Command being built
    pub fn command(&self) -> MleCommand {
        self.command
    }

    /// TLV writer for the payload
    pub fn tlvs(&mut self) -> &mut TlvWriter {
        &mut self.tlvs
    }

    /// Finish the message
    pub fn build(self) -> MleMessage {
        MleMessage {
            security: self.security,
            command: self.command,
            payload: self.tlvs.freeze(),
        }
    }
}
