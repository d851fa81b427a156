//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer ended before the declared structure did
    #[error("truncated input")]
    Truncated,

    /// TLV value has the wrong width for its type
    #[error("tlv {tlv} length {actual}, expected {expected}")]
    Length {
        /// TLV type byte
        tlv: u8,
        /// Expected value length
        expected: usize,
        /// Declared value length
        actual: usize,
    },

    /// Outgoing message capacity exceeded
    #[error("buffer full: need {needed} bytes, {available} available")]
    BufferFull {
        /// Bytes the append required
        needed: usize,
        /// Bytes left in the message
        available: usize,
    },

    /// Unknown MLE command type
    #[error("unknown command {0}")]
    UnknownCommand(u8),

    /// Unsupported security level or key id mode
    #[error("unsupported security control {0:#04x}")]
    Security(u8),

    /// Structurally invalid content
    #[error("malformed {0}")]
    Malformed(&'static str),
}
