//! CBOR encoding of stream initiation payloads.
//!
//! The connection wraps these bytes in its IQ stanza; the negotiation core
//! only ever sees the payload.

use crate::error::WireError;
use crate::si::StreamInitiation;
use bytes::Bytes;
use tracing::trace;

/// Encode a stream initiation element
pub fn encode_si(si: &StreamInitiation) -> Result<Bytes, WireError> {
    let mut buf = Vec::new();
    ciborium::into_writer(si, &mut buf).map_err(|_| WireError::Encode)?;
    trace!("Encoded SI payload id={:?} ({} bytes)", si.id, buf.len());
    Ok(Bytes::from(buf))
}

/// Decode a stream initiation element
pub fn decode_si(raw: &[u8]) -> Result<StreamInitiation, WireError> {
    ciborium::from_reader(raw).map_err(|e| WireError::Decode(format!("{:?}", e)))
}
