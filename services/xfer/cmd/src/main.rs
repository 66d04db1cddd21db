//! xfer command line tool.
//!
//! Runs one outbound file transfer negotiation against the in-memory loopback
//! peer and streams the outcome, so offers, replies and dispatch can be
//! exercised without a messaging server.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use xfer_session::{
    LoopbackConnection, MechanismRegistry, Negotiator, PeerReply, TransferEvent,
};
use xfer_wire::{NS_SI, PROFILE_FILE_TRANSFER};

mod config;
mod drain;
mod logging;

use config::XferConfig;
use drain::{DrainExecutor, DRAIN_MECHANISM};
use logging::XferLogFormatter;

/// Outbound file transfer negotiation
#[derive(Parser, Debug)]
#[command(name = "xfer", version, about = "Stream initiation file transfer negotiation")]
struct Args {
    /// Shared config file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Offer a file to the loopback peer and run the selected mechanism
    Send(SendArgs),
}

#[derive(clap::Args, Debug)]
struct SendArgs {
    /// Peer address, e.g. bob@example.org/laptop
    #[arg(long)]
    peer: String,

    /// File to send
    #[arg(long)]
    file: PathBuf,

    /// Feature the peer advertises (repeatable); defaults to SI + file transfer
    #[arg(long = "peer-feature")]
    peer_features: Vec<String>,

    /// How the peer answers the offer
    #[arg(long, value_enum, default_value_t = ReplyMode::SelectFirst)]
    peer_reply: ReplyMode,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ReplyMode {
    /// Accept with the first offered mechanism
    SelectFirst,
    /// Answer with an error
    Error,
    /// Never answer
    Drop,
    /// Answer with an undecodable payload
    Garbage,
}

impl From<ReplyMode> for PeerReply {
    fn from(mode: ReplyMode) -> Self {
        match mode {
            ReplyMode::SelectFirst => PeerReply::SelectFirst,
            ReplyMode::Error => PeerReply::Error,
            ReplyMode::Drop => PeerReply::NoReply,
            ReplyMode::Garbage => PeerReply::Raw(b"\xffnot a stream initiation".to_vec().into()),
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => XferConfig::load_from_file(path)?,
        None => XferConfig::from_env(),
    };
    let log_level = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());

    // An explicit --log-level beats RUST_LOG, which beats the config file
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) if args.log_level.is_none() => filter,
        _ => EnvFilter::new("warn")
            .add_directive(format!("xfer={}", log_level).parse()?)
            .add_directive(format!("xfer_session={}", log_level).parse()?)
            .add_directive(format!("xfer_wire={}", log_level).parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .event_format(XferLogFormatter::new("xfer"))
        .init();

    match args.command {
        Command::Send(send) => run_send(&config, send).await,
    }
}

async fn run_send(config: &XferConfig, args: SendArgs) -> anyhow::Result<ExitCode> {
    let features = if args.peer_features.is_empty() {
        vec![NS_SI.to_string(), PROFILE_FILE_TRANSFER.to_string()]
    } else {
        args.peer_features
    };

    let conn = LoopbackConnection::builder()
        .features(features)
        .reply(args.peer_reply.into())
        .build();

    let registry = MechanismRegistry::builder()
        .register(
            DRAIN_MECHANISM,
            Arc::new(DrainExecutor::new(config.drain.chunk_size)),
        )
        .build();

    let negotiator = Negotiator::new(Arc::new(conn), Arc::new(registry))
        .with_config(config.negotiator_config());

    let size = tokio::fs::metadata(&args.file).await.map(|m| m.len()).ok();
    let mut control = match negotiator.initiate_send(&args.peer, &args.file).await {
        Ok(control) => control,
        Err(e) => {
            error!("Cannot negotiate transfer: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    while let Some(event) = control.next_event().await {
        match event {
            TransferEvent::Progress(n) => match size {
                Some(total) if total > 0 => {
                    info!("{:?}: {}/{} bytes ({}%)", args.file, n, total, n * 100 / total)
                }
                _ => info!("{:?}: {} bytes", args.file, n),
            },
            TransferEvent::Done => {
                info!("Sending {:?} to {} finished", args.file, args.peer);
                return Ok(ExitCode::SUCCESS);
            }
            TransferEvent::Error(e) => {
                warn!("Sending {:?} to {} failed: {}", args.file, args.peer, e);
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    warn!("Sending {:?} to {} ended without a result", args.file, args.peer);
    Ok(ExitCode::FAILURE)
}
