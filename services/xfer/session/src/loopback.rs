//! In-memory connection for development and testing.
//!
//! [`LoopbackConnection`] plays both the transport and a scripted peer: it
//! answers feature queries from a fixed list and replies to every request
//! according to a [`PeerReply`].

use crate::connection::{Connection, ConnectionError, OsRandom, RandomSource, RandomnessFailure};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;
use xfer_wire::{
    decode_si, encode_si, ClientIq, IqKind, Stanza, StreamInitiation, NS_SI,
    PROFILE_FILE_TRANSFER, STREAM_METHOD_FIELD,
};

/// How the simulated peer answers a request
#[derive(Debug, Clone)]
pub enum PeerReply {
    /// Accept the offer with its first mechanism
    SelectFirst,
    /// Accept the offer with the given mechanism
    Select(String),
    /// Answer with an error IQ
    Error,
    /// Answer with a result IQ carrying these payload bytes
    Raw(Bytes),
    /// Answer with a non-IQ stanza of this name
    NonIq(String),
    /// Never answer; the reply channel is closed
    NoReply,
}

/// A request that went through the connection
#[derive(Debug, Clone)]
pub struct SentRequest {
    /// Addressee
    pub peer: String,
    /// IQ type
    pub kind: IqKind,
    /// Payload bytes
    pub payload: Bytes,
}

/// Always fails; models a broken randomness source
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingRandom;

impl RandomSource for FailingRandom {
    fn fill(&self, _buf: &mut [u8]) -> Result<(), RandomnessFailure> {
        Err(RandomnessFailure("randomness source unavailable".to_string()))
    }
}

/// Repeats a fixed byte pattern
#[derive(Debug, Clone)]
pub struct FixedRandom {
    pattern: Vec<u8>,
}

impl FixedRandom {
    /// Source that yields `pattern` over and over
    pub fn new(pattern: Vec<u8>) -> Self {
        Self { pattern }
    }
}

impl RandomSource for FixedRandom {
    fn fill(&self, buf: &mut [u8]) -> Result<(), RandomnessFailure> {
        if self.pattern.is_empty() {
            return Err(RandomnessFailure("empty pattern".to_string()));
        }
        for (dst, src) in buf.iter_mut().zip(self.pattern.iter().cycle()) {
            *dst = *src;
        }
        Ok(())
    }
}

/// In-memory connection with a scripted peer
pub struct LoopbackConnection {
    features: Option<Vec<String>>,
    reply: PeerReply,
    reply_delay: Option<Duration>,
    send_fails: bool,
    rand: Box<dyn RandomSource>,
    sent: Mutex<Vec<SentRequest>>,
}

impl std::fmt::Debug for LoopbackConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackConnection")
            .field("features", &self.features)
            .field("reply", &self.reply)
            .field("reply_delay", &self.reply_delay)
            .field("send_fails", &self.send_fails)
            .finish()
    }
}

impl LoopbackConnection {
    /// Start configuring a connection
    pub fn builder() -> LoopbackBuilder {
        LoopbackBuilder::default()
    }

    /// Requests sent so far
    pub fn sent_requests(&self) -> Vec<SentRequest> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn answer(&self, peer: &str, payload: &[u8]) -> Option<Stanza> {
        let iq = |kind, query| {
            Stanza::Iq(ClientIq {
                from: peer.to_string(),
                kind,
                query,
            })
        };

        let select = |mechanism: String| match encode_si(&StreamInitiation::submit(mechanism)) {
            Ok(query) => iq(IqKind::Result, query),
            Err(_) => iq(IqKind::Error, Bytes::new()),
        };

        match &self.reply {
            PeerReply::SelectFirst => {
                let first = decode_si(payload).ok().and_then(|offer| {
                    offer
                        .feature
                        .form
                        .options_of(STREAM_METHOD_FIELD)
                        .first()
                        .map(|m| m.to_string())
                });
                Some(match first {
                    Some(mechanism) => select(mechanism),
                    None => iq(IqKind::Error, Bytes::new()),
                })
            }
            PeerReply::Select(mechanism) => Some(select(mechanism.clone())),
            PeerReply::Error => Some(iq(IqKind::Error, Bytes::new())),
            PeerReply::Raw(bytes) => Some(iq(IqKind::Result, bytes.clone())),
            PeerReply::NonIq(name) => Some(Stanza::Other(name.clone())),
            PeerReply::NoReply => None,
        }
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    async fn discover_features(&self, peer: &str) -> Option<Vec<String>> {
        debug!("Loopback feature query for {}", peer);
        self.features.clone()
    }

    async fn send_request(
        &self,
        peer: &str,
        kind: IqKind,
        payload: Bytes,
    ) -> Result<oneshot::Receiver<Stanza>, ConnectionError> {
        if self.send_fails {
            return Err(ConnectionError::Closed);
        }

        let answer = self.answer(peer, &payload);
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentRequest {
                peer: peer.to_string(),
                kind,
                payload,
            });

        let (tx, rx) = oneshot::channel();
        match self.reply_delay {
            Some(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(stanza) = answer {
                        let _ = tx.send(stanza);
                    }
                });
            }
            None => {
                if let Some(stanza) = answer {
                    let _ = tx.send(stanza);
                }
            }
        }

        Ok(rx)
    }

    fn rand(&self) -> &dyn RandomSource {
        self.rand.as_ref()
    }
}

/// Builder for [`LoopbackConnection`]
pub struct LoopbackBuilder {
    features: Option<Vec<String>>,
    reply: PeerReply,
    reply_delay: Option<Duration>,
    send_fails: bool,
    rand: Box<dyn RandomSource>,
}

impl Default for LoopbackBuilder {
    fn default() -> Self {
        Self {
            features: Some(vec![NS_SI.to_string(), PROFILE_FILE_TRANSFER.to_string()]),
            reply: PeerReply::SelectFirst,
            reply_delay: None,
            send_fails: false,
            rand: Box::new(OsRandom),
        }
    }
}

impl LoopbackBuilder {
    /// Features the peer advertises
    pub fn features(mut self, features: Vec<String>) -> Self {
        self.features = Some(features);
        self
    }

    /// Make feature queries fail
    pub fn discovery_fails(mut self) -> Self {
        self.features = None;
        self
    }

    /// How the peer answers requests
    pub fn reply(mut self, reply: PeerReply) -> Self {
        self.reply = reply;
        self
    }

    /// Hold every answer back for `delay`
    pub fn reply_delay(mut self, delay: Duration) -> Self {
        self.reply_delay = Some(delay);
        self
    }

    /// Make every send fail
    pub fn send_fails(mut self) -> Self {
        self.send_fails = true;
        self
    }

    /// Randomness source for session ids
    pub fn random(mut self, rand: impl RandomSource + 'static) -> Self {
        self.rand = Box::new(rand);
        self
    }

    /// Build the connection
    pub fn build(self) -> LoopbackConnection {
        LoopbackConnection {
            features: self.features,
            reply: self.reply,
            reply_delay: self.reply_delay,
            send_fails: self.send_fails,
            rand: self.rand,
            sent: Mutex::new(Vec::new()),
        }
    }
}
