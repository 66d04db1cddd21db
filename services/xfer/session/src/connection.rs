//! The connection capability the negotiation core runs on.
//!
//! Stanza encoding, IQ id bookkeeping and reply correlation all live behind
//! this trait. The core only asks three things of a connection: what a peer
//! advertises, to send a request and hand back the reply channel, and a
//! source of randomness for session ids.

use async_trait::async_trait;
use bytes::Bytes;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use tokio::sync::oneshot;
use xfer_wire::{IqKind, Stanza};

/// Errors raised by the connection when sending a request
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The connection is not open
    #[error("connection closed")]
    Closed,
    /// Transport failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The connection refused to send the request
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// A randomness source could not produce the requested bytes
#[derive(Error, Debug)]
#[error("failed to read random bytes: {0}")]
pub struct RandomnessFailure(pub String);

/// Byte source backing session id generation
pub trait RandomSource: Send + Sync {
    /// Fill `buf` completely or fail
    fn fill(&self, buf: &mut [u8]) -> Result<(), RandomnessFailure>;
}

/// Operating system CSPRNG
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), RandomnessFailure> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| RandomnessFailure(e.to_string()))
    }
}

/// Messaging connection capability
#[async_trait]
pub trait Connection: Send + Sync {
    /// Features advertised by `peer`, or `None` when the query itself failed
    async fn discover_features(&self, peer: &str) -> Option<Vec<String>>;

    /// Send an IQ request carrying `payload` to `peer`.
    ///
    /// The returned receiver yields the correlated reply, or is closed without
    /// a value if none ever arrives.
    async fn send_request(
        &self,
        peer: &str,
        kind: IqKind,
        payload: Bytes,
    ) -> Result<oneshot::Receiver<Stanza>, ConnectionError>;

    /// Randomness bound to this connection
    fn rand(&self) -> &dyn RandomSource;
}
