//! Outbound stream initiation.
//!
//! One [`Negotiation`] drives one send attempt through
//!
//! ```text
//! Init -> Discovering -> Offering -> AwaitingPeerResponse -> Dispatching -> Delegated
//!              \              \                \                  \
//!               +--------------+----------------+------------------+--> Failed
//! ```
//!
//! Everything up to sending the offer runs inside [`Negotiator::initiate_send`];
//! waiting for the peer and dispatching run on a spawned task so the caller
//! gets its [`TransferControl`] back straight away. Failures are reported on
//! the control and end the attempt; nothing is retried.

use crate::connection::{Connection, RandomnessFailure};
use crate::control::{CancelSignal, TransferControl, TransferReporter, DEFAULT_PROGRESS_CAPACITY};
use crate::discovery::discover_profiles;
use crate::error::TransferError;
use crate::registry::MechanismRegistry;
use crate::sid::SessionId;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use xfer_wire::{
    decode_si, encode_si, validate_submit, FileMeta, IqKind, Stanza, StreamInitiation,
    PROFILE_FILE_TRANSFER,
};

/// Negotiator configuration
#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    /// Unread progress updates a control buffers before dropping new ones
    pub progress_capacity: usize,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }
}

/// Receives user-facing informational messages
pub trait Notifier: Send + Sync {
    /// Informational message
    fn info(&self, message: &str);
}

/// Notifier that writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn info(&self, message: &str) {
        info!(component = "negotiation", "{}", message);
    }
}

/// What an executor gets to work with once a mechanism is agreed
pub struct NegotiationContext {
    peer: String,
    file: PathBuf,
    sid: SessionId,
    meta: FileMeta,
    reporter: TransferReporter,
}

impl fmt::Debug for NegotiationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationContext")
            .field("peer", &self.peer)
            .field("file", &self.file)
            .field("sid", &self.sid)
            .field("meta", &self.meta)
            .finish()
    }
}

impl NegotiationContext {
    /// Receiving peer
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Local file being sent
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Negotiated session id
    pub fn sid(&self) -> &SessionId {
        &self.sid
    }

    /// Metadata that was offered
    pub fn file_meta(&self) -> &FileMeta {
        &self.meta
    }

    /// Producer side of the transfer's control
    pub fn reporter(&self) -> &TransferReporter {
        &self.reporter
    }

    /// Cancel signal shared with the caller
    pub fn cancel_signal(&self) -> &CancelSignal {
        self.reporter.cancel_signal()
    }
}

/// Where a negotiation currently is
#[derive(Debug)]
pub enum NegotiationState {
    /// Not started
    Init,
    /// About to query the peer's features
    Discovering,
    /// Peer supports SI; about to send the offer
    Offering {
        /// Profiles the peer advertised
        profiles: Vec<String>,
    },
    /// Offer sent, reply pending
    AwaitingPeerResponse {
        /// Session id of the offer
        sid: SessionId,
        /// File metadata of the offer
        meta: FileMeta,
        /// Reply channel from the connection
        reply: oneshot::Receiver<Stanza>,
    },
    /// Peer picked a mechanism we have
    Dispatching {
        /// Session id of the offer
        sid: SessionId,
        /// File metadata of the offer
        meta: FileMeta,
        /// Selected mechanism
        mechanism: String,
    },
    /// Executor has run
    Delegated,
    /// Error reported on the control
    Failed,
}

impl NegotiationState {
    /// Short state name for logs
    pub fn name(&self) -> &'static str {
        match self {
            NegotiationState::Init => "init",
            NegotiationState::Discovering => "discovering",
            NegotiationState::Offering { .. } => "offering",
            NegotiationState::AwaitingPeerResponse { .. } => "awaiting-peer-response",
            NegotiationState::Dispatching { .. } => "dispatching",
            NegotiationState::Delegated => "delegated",
            NegotiationState::Failed => "failed",
        }
    }

    /// Whether no further transition is possible
    pub fn is_final(&self) -> bool {
        matches!(self, NegotiationState::Delegated | NegotiationState::Failed)
    }
}

/// One outbound send attempt
pub struct Negotiation {
    conn: Arc<dyn Connection>,
    registry: Arc<MechanismRegistry>,
    notifier: Arc<dyn Notifier>,
    peer: String,
    file: PathBuf,
    /// Handed to the executor on delegation
    reporter: Option<TransferReporter>,
    state: NegotiationState,
}

impl Negotiation {
    /// Prepare an attempt to send `file` to `peer`, reporting on `reporter`
    pub fn new(
        conn: Arc<dyn Connection>,
        registry: Arc<MechanismRegistry>,
        notifier: Arc<dyn Notifier>,
        peer: impl Into<String>,
        file: impl Into<PathBuf>,
        reporter: TransferReporter,
    ) -> Self {
        Self {
            conn,
            registry,
            notifier,
            peer: peer.into(),
            file: file.into(),
            reporter: Some(reporter),
            state: NegotiationState::Init,
        }
    }

    /// Current state
    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    /// Perform one transition.
    ///
    /// Only session id generation can fail here; every other failure moves
    /// the negotiation to `Failed` and is reported on the control.
    pub async fn advance(&mut self) -> Result<(), RandomnessFailure> {
        let state = std::mem::replace(&mut self.state, NegotiationState::Failed);
        let from = state.name();

        self.state = match state {
            NegotiationState::Init => NegotiationState::Discovering,
            NegotiationState::Discovering => self.on_discovering().await,
            NegotiationState::Offering { profiles } => self.on_offering(profiles).await?,
            NegotiationState::AwaitingPeerResponse { sid, meta, reply } => {
                self.on_awaiting_reply(sid, meta, reply).await
            }
            NegotiationState::Dispatching {
                sid,
                meta,
                mechanism,
            } => self.on_dispatching(sid, meta, mechanism).await,
            done @ (NegotiationState::Delegated | NegotiationState::Failed) => done,
        };

        debug!(
            "Negotiation with {}: {} -> {}",
            self.peer,
            from,
            self.state.name()
        );
        Ok(())
    }

    /// Advance until the offer is out (or the attempt failed before that)
    pub async fn run_until_offered(&mut self) -> Result<(), RandomnessFailure> {
        while !self.state.is_final()
            && !matches!(self.state, NegotiationState::AwaitingPeerResponse { .. })
        {
            self.advance().await?;
        }
        Ok(())
    }

    /// Advance until the attempt is delegated or failed
    pub async fn run(mut self) -> Result<(), RandomnessFailure> {
        while !self.state.is_final() {
            self.advance().await?;
        }
        Ok(())
    }

    fn fail(&self, err: TransferError) -> NegotiationState {
        warn!("Sending {:?} to {} failed: {}", self.file, self.peer, err);
        if let Some(reporter) = &self.reporter {
            reporter.report_error(err);
        }
        NegotiationState::Failed
    }

    async fn on_discovering(&self) -> NegotiationState {
        match discover_profiles(self.conn.as_ref(), &self.peer).await {
            Ok(profiles) => NegotiationState::Offering { profiles },
            Err(e) => self.fail(e),
        }
    }

    async fn on_offering(
        &self,
        profiles: Vec<String>,
    ) -> Result<NegotiationState, RandomnessFailure> {
        if !profiles.iter().any(|p| p == PROFILE_FILE_TRANSFER) {
            debug!(
                "{} does not list the file transfer profile, offering anyway: {:?}",
                self.peer, profiles
            );
        }

        if self.registry.is_empty() {
            return Ok(self.fail(TransferError::NoMechanisms));
        }

        let meta = match self.file_meta().await {
            Ok(meta) => meta,
            Err(source) => {
                return Ok(self.fail(TransferError::FileAccess {
                    path: self.file.clone(),
                    source,
                }))
            }
        };

        let sid = SessionId::generate(self.conn.rand()).map_err(|e| {
            error!("Cannot generate session id for {}: {}", self.peer, e);
            e
        })?;

        let offer =
            StreamInitiation::file_offer(sid.as_str(), meta.clone(), self.registry.mechanisms());
        let payload = match encode_si(&offer) {
            Ok(payload) => payload,
            Err(e) => return Ok(self.fail(TransferError::Offer(e))),
        };

        match self.conn.send_request(&self.peer, IqKind::Set, payload).await {
            Ok(reply) => {
                debug!("Offered {} ({} bytes) to {} as {}", meta.name, meta.size, self.peer, sid);
                Ok(NegotiationState::AwaitingPeerResponse { sid, meta, reply })
            }
            Err(e) => Ok(self.fail(TransferError::Send(e))),
        }
    }

    async fn file_meta(&self) -> std::io::Result<FileMeta> {
        let stat = tokio::fs::metadata(&self.file).await?;
        if !stat.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }

        let name = self
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(FileMeta {
            name,
            size: stat.len(),
        })
    }

    async fn on_awaiting_reply(
        &self,
        sid: SessionId,
        meta: FileMeta,
        reply: oneshot::Receiver<Stanza>,
    ) -> NegotiationState {
        let iq = match reply.await {
            Ok(Stanza::Iq(iq)) => iq,
            Ok(Stanza::Other(name)) => return self.fail(TransferError::UnexpectedStanza(name)),
            Err(_) => return self.fail(TransferError::NoResponse),
        };

        if iq.kind != IqKind::Result {
            return self.fail(TransferError::PeerRejected);
        }

        let answer = match decode_si(&iq.query) {
            Ok(answer) => answer,
            Err(e) => return self.fail(TransferError::MalformedReply(e)),
        };

        let mechanism = match validate_submit(&answer.feature.form) {
            Ok(mechanism) => mechanism.to_string(),
            Err(e) => return self.fail(TransferError::InvalidSubmitForm(e)),
        };

        if self.registry.dispatch(&mechanism).is_none() {
            return self.fail(TransferError::UnsupportedMechanism(mechanism));
        }

        NegotiationState::Dispatching {
            sid,
            meta,
            mechanism,
        }
    }

    async fn on_dispatching(
        &mut self,
        sid: SessionId,
        meta: FileMeta,
        mechanism: String,
    ) -> NegotiationState {
        let executor = match self.registry.dispatch(&mechanism) {
            Some(executor) => executor,
            None => return self.fail(TransferError::UnsupportedMechanism(mechanism)),
        };

        let Some(reporter) = self.reporter.take() else {
            return NegotiationState::Failed;
        };

        self.notifier.info(&format!(
            "Started sending of {} to {}",
            self.file.display(),
            self.peer
        ));

        let ctx = NegotiationContext {
            peer: self.peer.clone(),
            file: self.file.clone(),
            sid,
            meta,
            reporter,
        };

        debug!("Delegating {} to mechanism {}", ctx.sid, mechanism);
        executor.execute(self.conn.clone(), ctx).await;
        NegotiationState::Delegated
    }
}

/// Entry point for outbound transfers over one connection
#[derive(Clone)]
pub struct Negotiator {
    conn: Arc<dyn Connection>,
    registry: Arc<MechanismRegistry>,
    notifier: Arc<dyn Notifier>,
    config: NegotiatorConfig,
}

impl fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiator")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl Negotiator {
    /// Create a negotiator dispatching to `registry`
    pub fn new(conn: Arc<dyn Connection>, registry: Arc<MechanismRegistry>) -> Self {
        Self {
            conn,
            registry,
            notifier: Arc::new(TracingNotifier),
            config: NegotiatorConfig::default(),
        }
    }

    /// Replace the notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: NegotiatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Offer `file` to `peer`.
    ///
    /// Returns once the offer has been sent or the attempt failed before
    /// that; the outcome arrives on the returned control. A failing
    /// randomness source is fatal and is the only error returned here.
    pub async fn initiate_send(
        &self,
        peer: &str,
        file: impl AsRef<Path>,
    ) -> Result<TransferControl, RandomnessFailure> {
        let (control, reporter) = TransferControl::channel(self.config.progress_capacity);
        let mut negotiation = Negotiation::new(
            self.conn.clone(),
            self.registry.clone(),
            self.notifier.clone(),
            peer,
            file.as_ref(),
            reporter,
        );

        negotiation.run_until_offered().await?;

        if !negotiation.state().is_final() {
            tokio::spawn(async move {
                if let Err(e) = negotiation.run().await {
                    error!("Negotiation aborted: {}", e);
                }
            });
        }

        Ok(control)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::TransferEvent;
    use crate::loopback::{FailingRandom, LoopbackConnection, PeerReply};
    use crate::registry::TransferExecutor;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use xfer_wire::{DataForm, FeatureNegotiation, NS_SI, STREAM_METHOD_FIELD};

    /// Keeps every context it is handed so tests can inspect and finish them
    #[derive(Default)]
    struct HoldingExecutor {
        held: Mutex<Vec<NegotiationContext>>,
    }

    #[async_trait]
    impl TransferExecutor for HoldingExecutor {
        async fn execute(&self, _conn: Arc<dyn Connection>, ctx: NegotiationContext) {
            self.held.lock().unwrap().push(ctx);
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl Notifier for RecordingNotifier {
        fn info(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    fn temp_file(contents: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    fn registry_with(mechanism: &str, executor: Arc<HoldingExecutor>) -> Arc<MechanismRegistry> {
        Arc::new(MechanismRegistry::builder().register(mechanism, executor).build())
    }

    async fn wait_for_held(executor: &HoldingExecutor) {
        for _ in 0..100 {
            if !executor.held.lock().unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("executor was never called");
    }

    #[tokio::test]
    async fn test_selected_mechanism_gets_the_transfer() {
        let file = temp_file(b"hello world");
        let executor = Arc::new(HoldingExecutor::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let conn = Arc::new(
            LoopbackConnection::builder()
                .reply(PeerReply::Select("M1".into()))
                .build(),
        );

        let negotiator = Negotiator::new(conn.clone(), registry_with("M1", executor.clone()))
            .with_notifier(notifier.clone());
        let mut control = negotiator
            .initiate_send("bob@example.org/res", file.path())
            .await
            .unwrap();

        wait_for_held(&executor).await;

        let messages = notifier.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Started sending of"));
        assert!(messages[0].ends_with("to bob@example.org/res"));

        // The controller itself reports nothing
        assert!(control.try_next_event().is_none());

        let ctx = executor.held.lock().unwrap().pop().unwrap();
        assert_eq!(ctx.peer(), "bob@example.org/res");
        assert_eq!(ctx.file_meta().size, 11);
        assert!(SessionId::is_well_formed(ctx.sid().as_str()));

        ctx.reporter().report_progress(11);
        ctx.reporter().report_done();
        drop(ctx);

        assert_eq!(control.wait().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_offer_carries_file_and_registered_mechanisms() {
        let file = temp_file(&[0u8; 2048]);
        let noop = Arc::new(HoldingExecutor::default());
        let registry = Arc::new(
            MechanismRegistry::builder()
                .register("urn:m:b", noop.clone())
                .register("urn:m:a", noop.clone())
                .build(),
        );
        let conn = Arc::new(LoopbackConnection::builder().reply(PeerReply::NoReply).build());

        let negotiator = Negotiator::new(conn.clone(), registry);
        let _control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();

        let sent = conn.sent_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].peer, "bob@example.org");
        assert_eq!(sent[0].kind, IqKind::Set);

        let offer = decode_si(&sent[0].payload).unwrap();
        assert!(SessionId::is_well_formed(&offer.id));
        assert_eq!(offer.profile, PROFILE_FILE_TRANSFER);
        let meta = offer.file.unwrap();
        assert_eq!(meta.size, 2048);
        assert_eq!(
            Some(meta.name.as_str()),
            file.path().file_name().and_then(|n| n.to_str())
        );
        assert_eq!(
            offer.feature.form.options_of(STREAM_METHOD_FIELD),
            vec!["urn:m:a", "urn:m:b"]
        );
    }

    #[tokio::test]
    async fn test_every_offer_gets_a_fresh_sid() {
        let file = temp_file(b"x");
        let conn = Arc::new(LoopbackConnection::builder().reply(PeerReply::NoReply).build());
        let negotiator = Negotiator::new(
            conn.clone(),
            registry_with("M1", Arc::new(HoldingExecutor::default())),
        );

        for _ in 0..3 {
            let control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();
            assert!(matches!(control.wait().await, Err(TransferError::NoResponse)));
        }

        let sids: std::collections::HashSet<String> = conn
            .sent_requests()
            .iter()
            .map(|r| decode_si(&r.payload).unwrap().id)
            .collect();
        assert_eq!(sids.len(), 3);
    }

    #[tokio::test]
    async fn test_error_reply_is_rejection() {
        let file = temp_file(b"x");
        let conn = Arc::new(LoopbackConnection::builder().reply(PeerReply::Error).build());
        let negotiator =
            Negotiator::new(conn, registry_with("M1", Arc::new(HoldingExecutor::default())));

        let mut control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = control.next_event().await {
            events.push(event);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], TransferEvent::Error(TransferError::PeerRejected)));
    }

    #[tokio::test]
    async fn test_unregistered_selection_is_unsupported() {
        let file = temp_file(b"x");
        let executor = Arc::new(HoldingExecutor::default());
        let conn = Arc::new(
            LoopbackConnection::builder()
                .reply(PeerReply::Select("M2".into()))
                .build(),
        );
        let negotiator = Negotiator::new(conn, registry_with("M1", executor.clone()));

        let control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();

        match control.wait().await {
            Err(TransferError::UnsupportedMechanism(m)) => assert_eq!(m, "M2"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(executor.held.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_reply_channel_is_no_response() {
        let file = temp_file(b"x");
        let conn = Arc::new(LoopbackConnection::builder().reply(PeerReply::NoReply).build());
        let negotiator =
            Negotiator::new(conn, registry_with("M1", Arc::new(HoldingExecutor::default())));

        let mut control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();

        let mut errors = 0;
        while let Some(event) = control.next_event().await {
            match event {
                TransferEvent::Error(TransferError::NoResponse) => errors += 1,
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_malformed_replies() {
        let file = temp_file(b"x");
        let offer_form = StreamInitiation {
            id: String::new(),
            profile: String::new(),
            file: None,
            feature: FeatureNegotiation {
                form: DataForm::stream_method_offer(["M1"]),
            },
        };

        let cases = vec![
            PeerReply::Raw(bytes::Bytes::from_static(b"\xffgarbage")),
            PeerReply::Raw(encode_si(&offer_form).unwrap()),
            PeerReply::NonIq("message".into()),
        ];

        for reply in cases {
            let conn = Arc::new(LoopbackConnection::builder().reply(reply).build());
            let negotiator =
                Negotiator::new(conn, registry_with("M1", Arc::new(HoldingExecutor::default())));
            let control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();

            match control.wait().await {
                Err(TransferError::MalformedReply(_))
                | Err(TransferError::InvalidSubmitForm(_))
                | Err(TransferError::UnexpectedStanza(_)) => {}
                other => panic!("unexpected outcome {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_send_failure_reaches_the_control() {
        let file = temp_file(b"x");
        let conn = Arc::new(LoopbackConnection::builder().send_fails().build());
        let negotiator =
            Negotiator::new(conn, registry_with("M1", Arc::new(HoldingExecutor::default())));

        let control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();
        assert!(matches!(control.wait().await, Err(TransferError::Send(_))));
    }

    #[tokio::test]
    async fn test_discovery_failures_never_offer() {
        let file = temp_file(b"x");
        let cases = vec![
            LoopbackConnection::builder().discovery_fails().build(),
            LoopbackConnection::builder().features(vec![PROFILE_FILE_TRANSFER.to_string()]).build(),
            LoopbackConnection::builder().features(vec![NS_SI.to_string()]).build(),
        ];

        for conn in cases {
            let conn = Arc::new(conn);
            let negotiator = Negotiator::new(
                conn.clone(),
                registry_with("M1", Arc::new(HoldingExecutor::default())),
            );
            let control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();

            match control.wait().await {
                Err(TransferError::Discovery)
                | Err(TransferError::NoSupport)
                | Err(TransferError::NoProfiles) => {}
                other => panic!("unexpected outcome {:?}", other),
            }
            assert!(conn.sent_requests().is_empty());
        }
    }

    #[tokio::test]
    async fn test_any_profile_is_enough_to_offer() {
        let file = temp_file(b"x");
        let conn = Arc::new(
            LoopbackConnection::builder()
                .features(vec![
                    NS_SI.to_string(),
                    "http://jabber.org/protocol/si/profile/other".to_string(),
                ])
                .reply(PeerReply::Error)
                .build(),
        );
        let negotiator = Negotiator::new(
            conn.clone(),
            registry_with("M1", Arc::new(HoldingExecutor::default())),
        );

        let control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();
        assert!(matches!(control.wait().await, Err(TransferError::PeerRejected)));
        assert_eq!(conn.sent_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_and_empty_registry_never_offer() {
        let conn = Arc::new(LoopbackConnection::builder().build());
        let negotiator = Negotiator::new(
            conn.clone(),
            registry_with("M1", Arc::new(HoldingExecutor::default())),
        );
        let control = negotiator
            .initiate_send("bob@example.org", "/nonexistent/dir/file.bin")
            .await
            .unwrap();
        assert!(matches!(control.wait().await, Err(TransferError::FileAccess { .. })));

        let file = temp_file(b"x");
        let negotiator = Negotiator::new(conn.clone(), Arc::new(MechanismRegistry::default()));
        let control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();
        assert!(matches!(control.wait().await, Err(TransferError::NoMechanisms)));

        assert!(conn.sent_requests().is_empty());
    }

    #[tokio::test]
    async fn test_randomness_failure_is_fatal() {
        let file = temp_file(b"x");
        let conn = Arc::new(LoopbackConnection::builder().random(FailingRandom).build());
        let negotiator = Negotiator::new(
            conn.clone(),
            registry_with("M1", Arc::new(HoldingExecutor::default())),
        );

        assert!(negotiator.initiate_send("bob@example.org", file.path()).await.is_err());
        assert!(conn.sent_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_returns_before_reply() {
        let file = temp_file(b"x");
        let conn = Arc::new(
            LoopbackConnection::builder()
                .reply(PeerReply::Error)
                .reply_delay(Duration::from_secs(3600))
                .build(),
        );
        let negotiator =
            Negotiator::new(conn, registry_with("M1", Arc::new(HoldingExecutor::default())));

        let mut control = negotiator.initiate_send("bob@example.org", file.path()).await.unwrap();
        assert!(control.try_next_event().is_none());
        assert!(matches!(control.wait().await, Err(TransferError::PeerRejected)));
    }

    #[tokio::test]
    async fn test_transitions_step_by_step() {
        let file = temp_file(b"abc");
        let executor = Arc::new(HoldingExecutor::default());
        let conn = Arc::new(LoopbackConnection::builder().reply(PeerReply::SelectFirst).build());
        let (_control, reporter) = TransferControl::channel(4);

        let mut negotiation = Negotiation::new(
            conn,
            registry_with("M1", executor.clone()),
            Arc::new(TracingNotifier),
            "bob@example.org",
            file.path(),
            reporter,
        );

        let expected = [
            "discovering",
            "offering",
            "awaiting-peer-response",
            "dispatching",
            "delegated",
        ];
        for name in expected {
            negotiation.advance().await.unwrap();
            assert_eq!(negotiation.state().name(), name);
        }

        negotiation.advance().await.unwrap();
        assert_eq!(negotiation.state().name(), "delegated");
        assert_eq!(executor.held.lock().unwrap().len(), 1);
    }
}
