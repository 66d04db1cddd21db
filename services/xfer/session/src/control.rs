//! Caller-facing transfer control.
//!
//! A transfer reports through one ordered stream of [`TransferEvent`]s plus a
//! cancel signal. The consumer holds the [`TransferControl`]; the negotiation
//! task and, after delegation, the mechanism executor hold the
//! [`TransferReporter`].
//!
//! ## Delivery contract
//!
//! Reporting never blocks:
//!
//! - progress goes through `try_send` into a bounded queue. When the queue is
//!   full the update is dropped and counted; the next update carries the newer
//!   running total anyway.
//! - the terminal event (`Error` or `Done`) is sent through a permit reserved
//!   when the control is created. It is always queued, even behind a full
//!   progress queue, and there is exactly one such permit, so at most one
//!   terminal event can ever be delivered.
//! - reports to a consumer that has gone away are discarded.
//!
//! After the terminal event the cancel signal is raised once, by whichever
//! side sees the terminal event first, so a still running executor unwinds.

use crate::error::TransferError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// Default number of progress updates that can queue up unread
pub const DEFAULT_PROGRESS_CAPACITY: usize = 1000;

/// Largest accepted progress capacity; larger requests are clamped to it
pub const MAX_PROGRESS_CAPACITY: usize = 1 << 20;

/// One entry of a transfer's event stream
#[derive(Debug)]
pub enum TransferEvent {
    /// Running count of bytes moved
    Progress(u64),
    /// The transfer failed
    Error(TransferError),
    /// The transfer completed
    Done,
}

impl TransferEvent {
    /// Whether this event ends the transfer
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferEvent::Progress(_))
    }
}

/// Cancel signal shared by both sides of a transfer
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal; returns `true` only for the call that raised it
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|cancelled| {
            if *cancelled {
                false
            } else {
                *cancelled = true;
                true
            }
        })
    }

    /// Whether the signal has been raised
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal is raised
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

struct ReporterInner {
    tx: mpsc::Sender<TransferEvent>,
    /// Reserved slot for the single terminal event; `None` once used
    terminal: Mutex<Option<mpsc::OwnedPermit<TransferEvent>>>,
    cancel: CancelSignal,
    dropped_progress: AtomicU64,
}

impl ReporterInner {
    fn terminal(&self) -> MutexGuard<'_, Option<mpsc::OwnedPermit<TransferEvent>>> {
        self.terminal.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Producer side of a transfer control
#[derive(Clone)]
pub struct TransferReporter {
    inner: Arc<ReporterInner>,
}

impl std::fmt::Debug for TransferReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferReporter")
            .field("finished", &self.is_finished())
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

impl TransferReporter {
    /// Report the running byte count; dropped if the queue is full
    pub fn report_progress(&self, bytes: u64) {
        let terminal = self.inner.terminal();
        if terminal.is_none() {
            trace!("Ignoring progress {} after terminal event", bytes);
            return;
        }

        match self.inner.tx.try_send(TransferEvent::Progress(bytes)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.inner.dropped_progress.fetch_add(1, Ordering::Relaxed);
                trace!("Progress queue full, dropped update {}", bytes);
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Report failure; returns `false` if a terminal event was already sent
    pub fn report_error(&self, err: TransferError) -> bool {
        self.finish(TransferEvent::Error(err))
    }

    /// Report completion; returns `false` if a terminal event was already sent
    pub fn report_done(&self) -> bool {
        self.finish(TransferEvent::Done)
    }

    fn finish(&self, event: TransferEvent) -> bool {
        let permit = self.inner.terminal().take();
        match permit {
            Some(permit) => {
                debug!("Transfer finished: {:?}", event);
                permit.send(event);
                self.inner.cancel.cancel();
                true
            }
            None => {
                debug!("Ignoring second terminal event {:?}", event);
                false
            }
        }
    }

    /// Whether a terminal event has been reported
    pub fn is_finished(&self) -> bool {
        self.inner.terminal().is_none()
    }

    /// Number of progress updates dropped because the queue was full
    pub fn dropped_progress(&self) -> u64 {
        self.inner.dropped_progress.load(Ordering::Relaxed)
    }

    /// The shared cancel signal
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.inner.cancel
    }
}

/// Consumer side of a transfer
#[derive(Debug)]
pub struct TransferControl {
    events: mpsc::Receiver<TransferEvent>,
    cancel: CancelSignal,
    finished: bool,
}

impl TransferControl {
    /// Create a linked control and reporter with room for `progress_capacity`
    /// unread progress updates, clamped to `1..=MAX_PROGRESS_CAPACITY`
    pub fn channel(progress_capacity: usize) -> (TransferControl, TransferReporter) {
        let capacity = progress_capacity.clamp(1, MAX_PROGRESS_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity + 1);
        // Fresh channel, so the reservation cannot fail; the fallback keeps
        // the reporter usable for progress with no terminal slot.
        let permit = tx.clone().try_reserve_owned().ok();
        let cancel = CancelSignal::new();

        let reporter = TransferReporter {
            inner: Arc::new(ReporterInner {
                tx,
                terminal: Mutex::new(permit),
                cancel: cancel.clone(),
                dropped_progress: AtomicU64::new(0),
            }),
        };

        let control = TransferControl {
            events: rx,
            cancel,
            finished: false,
        };

        (control, reporter)
    }

    /// Next event, or `None` once the stream is over
    pub async fn next_event(&mut self) -> Option<TransferEvent> {
        if self.finished {
            return None;
        }
        let event = self.events.recv().await;
        self.observe(event)
    }

    /// Next event if one is already queued
    pub fn try_next_event(&mut self) -> Option<TransferEvent> {
        if self.finished {
            return None;
        }
        match self.events.try_recv() {
            Ok(event) => self.observe(Some(event)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => self.observe(None),
        }
    }

    fn observe(&mut self, event: Option<TransferEvent>) -> Option<TransferEvent> {
        match &event {
            Some(e) if e.is_terminal() => {
                self.finished = true;
                self.cancel.cancel();
            }
            None => self.finished = true,
            _ => {}
        }
        event
    }

    /// Ask the running mechanism to stop; returns `true` for the call that
    /// raised the signal
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// The shared cancel signal
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Drain the stream to its outcome, returning the last progress count on
    /// success
    pub async fn wait(mut self) -> Result<u64, TransferError> {
        let mut last = 0;
        while let Some(event) = self.next_event().await {
            match event {
                TransferEvent::Progress(n) => last = n,
                TransferEvent::Done => return Ok(last),
                TransferEvent::Error(e) => return Err(e),
            }
        }
        Err(TransferError::Abandoned)
    }
}
