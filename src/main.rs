use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use peerbridge::relay::RelayServer;
use peerbridge::session::media::LogSink;
use peerbridge::{Config, Role, Session, TlsMaterial};

#[derive(Parser)]
#[command(name = "peerbridge")]
#[command(about = "Two-peer media/data sessions over a WebSocket signaling relay", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay
    Relay {
        /// Listen address, host:port
        #[arg(long)]
        addr: Option<String>,
    },
    /// Connect as the offering peer
    Offer {
        #[command(flatten)]
        conn: ConnectArgs,
    },
    /// Connect as the answering peer
    Answer {
        #[command(flatten)]
        conn: ConnectArgs,
    },
}

#[derive(Args)]
struct ConnectArgs {
    /// Relay URL, e.g. ws://127.0.0.1:8765
    #[arg(long)]
    relay_url: Option<String>,

    /// PEM certificate trusted for wss relays; a client identity with --key-file
    #[arg(long)]
    cert_file: Option<PathBuf>,

    /// PEM private key forming a client identity together with --cert-file
    #[arg(long, requires = "cert_file")]
    key_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Relay { addr } => {
            let addr = addr.unwrap_or_else(|| config.relay.bind_address.clone());
            RelayServer::new(addr).run().await
        }
        Commands::Offer { conn } => run_session(Role::Offerer, conn, &config).await,
        Commands::Answer { conn } => run_session(Role::Answerer, conn, &config).await,
    }
}

async fn run_session(role: Role, conn: ConnectArgs, config: &Config) -> Result<()> {
    let mut session_config = config.session_config();
    if let Some(url) = conn.relay_url {
        session_config.relay_url = url;
    }
    let tls = TlsMaterial {
        cert_file: conn.cert_file,
        key_file: conn.key_file,
    };

    // Camera capture is a device concern outside this crate; without a
    // MediaSource the session is data-channel only and still renders any
    // inbound tracks through the sink.
    let session = Session::connect(role, session_config, tls, Arc::new(LogSink), None)
        .await
        .context("failed to reach the signaling relay")?;
    let shutdown = session.shutdown_signal();

    tokio::select! {
        result = session.run() => result.context("session ended"),
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            let _ = shutdown.send(true);
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("peerbridge={default},peerbridge_relay={default}"))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
