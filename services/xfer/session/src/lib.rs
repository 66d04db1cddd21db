//! Feature discovery, SI offers, reply handling, mechanism dispatch and
//! transfer control for xfer.
//!
//! This crate negotiates outbound file transfers over a messaging connection:
//! it checks what the peer supports, offers the file with a fresh session id,
//! waits for the peer's choice of mechanism and hands the transfer to the
//! executor registered for it.
//!
//! ## Features
//!
//! - **Transfer Control**: one ordered event stream per transfer with at most
//!   one terminal event and non-blocking reporting
//! - **Feature Discovery**: stream initiation support and profile extraction
//! - **Mechanism Registry**: injected, immutable table of executors
//! - **Negotiation**: explicit state machine, one handler per transition
//! - **Loopback Connection**: scripted in-memory peer for development and tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use xfer_session::{
//!     Connection, LoopbackConnection, MechanismRegistry, NegotiationContext, Negotiator,
//!     TransferEvent, TransferExecutor,
//! };
//!
//! struct Instant;
//!
//! #[async_trait]
//! impl TransferExecutor for Instant {
//!     async fn execute(&self, _conn: Arc<dyn Connection>, ctx: NegotiationContext) {
//!         ctx.reporter().report_progress(ctx.file_meta().size);
//!         ctx.reporter().report_done();
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = MechanismRegistry::builder()
//!     .register("urn:example:instant", Arc::new(Instant))
//!     .build();
//! let negotiator = Negotiator::new(
//!     Arc::new(LoopbackConnection::builder().build()),
//!     Arc::new(registry),
//! );
//!
//! let mut control = negotiator.initiate_send("bob@example.org/res", "report.pdf").await?;
//! while let Some(event) = control.next_event().await {
//!     match event {
//!         TransferEvent::Progress(n) => println!("{} bytes", n),
//!         TransferEvent::Done => println!("done"),
//!         TransferEvent::Error(e) => println!("failed: {}", e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod control;
pub mod discovery;
pub mod error;
pub mod loopback;
pub mod negotiation;
pub mod registry;
pub mod sid;

// Re-export main types
pub use connection::{Connection, ConnectionError, OsRandom, RandomSource, RandomnessFailure};
pub use control::{
    CancelSignal, TransferControl, TransferEvent, TransferReporter, DEFAULT_PROGRESS_CAPACITY,
    MAX_PROGRESS_CAPACITY,
};
pub use discovery::{classify_features, discover_profiles};
pub use error::TransferError;
pub use loopback::{
    FailingRandom, FixedRandom, LoopbackBuilder, LoopbackConnection, PeerReply, SentRequest,
};
pub use negotiation::{
    Negotiation, NegotiationContext, NegotiationState, Negotiator, NegotiatorConfig, Notifier,
    TracingNotifier,
};
pub use registry::{MechanismRegistry, MechanismRegistryBuilder, TransferExecutor};
pub use sid::SessionId;
