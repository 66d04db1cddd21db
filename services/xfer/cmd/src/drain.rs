//! Drain mechanism: reads the offered file and discards it.
//!
//! Lets the negotiation path be exercised end to end against the loopback
//! peer without a real bytestream.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};
use xfer_session::{Connection, NegotiationContext, TransferError, TransferExecutor};

/// Mechanism id the drain executor registers under
pub const DRAIN_MECHANISM: &str = "urn:redb:xfer:drain";

/// Reads the file chunk by chunk, reporting progress as it goes
#[derive(Debug, Clone)]
pub struct DrainExecutor {
    chunk_size: usize,
}

impl DrainExecutor {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    async fn drain(&self, ctx: &NegotiationContext) -> Result<u64, TransferError> {
        let mut file = tokio::fs::File::open(ctx.file())
            .await
            .map_err(|source| TransferError::FileAccess {
                path: ctx.file().to_path_buf(),
                source,
            })?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut total = 0u64;

        loop {
            let n = tokio::select! {
                read = file.read(&mut buf) => {
                    read.map_err(|e| TransferError::Mechanism(e.to_string()))?
                }
                _ = ctx.cancel_signal().cancelled() => return Err(TransferError::Canceled),
            };
            if n == 0 {
                return Ok(total);
            }
            total += n as u64;
            ctx.reporter().report_progress(total);
        }
    }
}

#[async_trait]
impl TransferExecutor for DrainExecutor {
    async fn execute(&self, _conn: Arc<dyn Connection>, ctx: NegotiationContext) {
        debug!("Draining {:?} for {}", ctx.file(), ctx.sid());

        match self.drain(&ctx).await {
            Ok(total) => {
                info!("Drained {} bytes of {}", total, ctx.file_meta().name);
                ctx.reporter().report_done();
            }
            Err(e) => {
                ctx.reporter().report_error(e);
            }
        }
    }
}
