//! Transfer error types.

use crate::connection::ConnectionError;
use std::path::PathBuf;
use thiserror::Error;
use xfer_wire::{FormShapeError, WireError};

/// Everything a transfer can fail with, as seen through its control
#[derive(Error, Debug)]
pub enum TransferError {
    /// The feature query itself failed
    #[error("problem discovering the features of the peer")]
    Discovery,

    /// Peer does not advertise stream initiation
    #[error("peer doesn't support stream initiation")]
    NoSupport,

    /// Peer advertises stream initiation but no profile
    #[error("peer doesn't support any stream initiation profiles")]
    NoProfiles,

    /// Nothing is registered to move bytes with
    #[error("no sending mechanisms are registered")]
    NoMechanisms,

    /// The local file could not be inspected
    #[error("cannot access {path:?}: {source}")]
    FileAccess {
        /// File that was offered
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The offer could not be encoded
    #[error("failed to encode offer: {0}")]
    Offer(#[source] WireError),

    /// The offer could not be sent
    #[error("failed to send offer: {0}")]
    Send(#[from] ConnectionError),

    /// Peer answered the offer with an error
    #[error("received error from peer when offering to send file")]
    PeerRejected,

    /// The reply channel delivered something other than an IQ
    #[error("invalid stanza type {0:?} in reply to offer")]
    UnexpectedStanza(String),

    /// The reply payload is not a stream initiation element
    #[error("malformed reply from peer: {0}")]
    MalformedReply(#[source] WireError),

    /// The reply is not a valid submit form
    #[error("invalid data sent from peer for file sending: {0}")]
    InvalidSubmitForm(#[from] FormShapeError),

    /// The peer selected a mechanism this side cannot run
    #[error("invalid sending mechanism {0:?} sent from peer for file sending")]
    UnsupportedMechanism(String),

    /// The reply channel closed without a reply
    #[error("no response received to offer of sending a file")]
    NoResponse,

    /// The running mechanism failed
    #[error("mechanism failed: {0}")]
    Mechanism(String),

    /// The transfer was canceled
    #[error("transfer canceled")]
    Canceled,

    /// Every producer went away without reporting an outcome
    #[error("transfer ended without a result")]
    Abandoned,
}
