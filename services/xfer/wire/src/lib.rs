//! Stream initiation payloads, data forms, IQ envelopes and CBOR codec for xfer.
//!
//! This crate holds the protocol-level vocabulary shared by the negotiation
//! core and whatever connection carries it: the stream initiation (SI) offer,
//! the feature-negotiation data form, the submit-form shape check and the
//! payload codec.
//!
//! ## Exchange
//!
//! ```text
//! sender                                   peer
//!   | -- disco#info query ------------------> |
//!   | <------------- features (si, profiles)  |
//!   | -- IQ set: SI offer (form, options) --> |
//!   | <------ IQ result: SI submit (1 value)  |
//!   | == selected mechanism moves bytes ===== |
//! ```
//!
//! XML stanza encoding and IQ id correlation belong to the connection; the SI
//! payload itself travels as canonical CBOR of [`StreamInitiation`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod form;
pub mod si;
pub mod stanza;

// Re-export main types
pub use codec::{decode_si, encode_si};
pub use error::{FormShapeError, WireError};
pub use form::{validate_submit, DataForm, FormField, FormOption, FormType};
pub use si::{FeatureNegotiation, FileMeta, StreamInitiation};
pub use stanza::{ClientIq, IqKind, Stanza};

/// Stream initiation namespace; a peer must advertise it to take offers
pub const NS_SI: &str = "http://jabber.org/protocol/si";

/// Prefix shared by every stream initiation profile feature
pub const NS_SI_PROFILE_PREFIX: &str = "http://jabber.org/protocol/si/profile/";

/// The file transfer profile
pub const PROFILE_FILE_TRANSFER: &str = "http://jabber.org/protocol/si/profile/file-transfer";

/// In-band bytestreams mechanism identifier
pub const NS_IBB: &str = "http://jabber.org/protocol/ibb";

/// Name of the form field that carries the transport mechanism choice
pub const STREAM_METHOD_FIELD: &str = "stream-method";
