//! Stanza envelopes as handed over by the connection.

use bytes::Bytes;
use std::fmt;

/// IQ type attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IqKind {
    /// Request for information
    Get,
    /// Request that changes state, e.g. an SI offer
    Set,
    /// Successful response
    Result,
    /// Error response
    Error,
}

impl fmt::Display for IqKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IqKind::Get => "get",
            IqKind::Set => "set",
            IqKind::Result => "result",
            IqKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// An IQ stanza with its child payload
#[derive(Debug, Clone)]
pub struct ClientIq {
    /// Sender address
    pub from: String,
    /// IQ type
    pub kind: IqKind,
    /// Encoded child element
    pub query: Bytes,
}

/// Anything the connection can deliver on a reply channel
#[derive(Debug, Clone)]
pub enum Stanza {
    /// An IQ response
    Iq(ClientIq),
    /// Any other top-level element, carried by name
    Other(String),
}
