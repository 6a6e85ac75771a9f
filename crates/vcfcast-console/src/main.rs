//! vcfcast console binary.
//!
//! # Usage
//!
//! ```bash
//! # Dry run with the default delays
//! vcfcast-console < session.jsonl
//!
//! # Faster demo where every fifth delivery fails
//! vcfcast-console --send-delay-ms 200 --loopback-fail-every 5 < session.jsonl
//! ```
//!
//! Commands are read from stdin, notifications and status events are written
//! to stdout as JSON lines, logs go to stderr. After stdin closes the console
//! keeps reporting running broadcasts until Ctrl-C.

use std::{sync::Arc, time::Duration};

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vcfcast_app::{BroadcastConfig, Coordinator, CoordinatorConfig};
use vcfcast_console::{Console, ContactFetcher, LoopbackConfig, LoopbackTransport, SystemEnv};
use vcfcast_core::CardReader;
use vcfcast_link::LinkConfig;

/// vcfcast console
#[derive(Parser, Debug)]
#[command(name = "vcfcast-console")]
#[command(about = "Broadcast a message to contacts from a VCF file (loopback dry run)")]
#[command(version)]
struct Args {
    /// Pause between two deliveries, in milliseconds
    #[arg(long, default_value = "1500")]
    send_delay_ms: u64,

    /// Report progress every N deliveries
    #[arg(long, default_value = "10")]
    progress_every: usize,

    /// Bound on waiting for the transport to connect, in seconds
    #[arg(long, default_value = "15")]
    connect_timeout_secs: u64,

    /// Bound on waiting for the pairing code to be entered, in seconds
    #[arg(long, default_value = "60")]
    pairing_timeout_secs: u64,

    /// Automatic reconnects after a transient disconnect (capped at 3)
    #[arg(long, default_value = "1")]
    max_reconnects: u32,

    /// Bound on downloading a contact file from a link, in seconds
    #[arg(long, default_value = "30")]
    fetch_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Make every Nth loopback delivery fail (0 never fails)
    #[arg(long, default_value = "0")]
    loopback_fail_every: usize,

    /// Time until a requested pairing code counts as entered, in milliseconds
    #[arg(long, default_value = "3000")]
    loopback_pairing_delay_ms: u64,
}

impl Args {
    fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            broadcast: BroadcastConfig {
                send_delay: Duration::from_millis(self.send_delay_ms),
                progress_every: self.progress_every,
            },
            link: LinkConfig {
                connect_timeout: Duration::from_secs(self.connect_timeout_secs),
                pairing_timeout: Duration::from_secs(self.pairing_timeout_secs),
                max_reconnects: self.max_reconnects,
                ..LinkConfig::default()
            },
            ..CoordinatorConfig::default()
        }
    }

    fn loopback_config(&self) -> LoopbackConfig {
        LoopbackConfig {
            pairing_delay: Duration::from_millis(self.loopback_pairing_delay_ms),
            fail_every: self.loopback_fail_every,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = args.coordinator_config();
    tracing::info!(
        send_delay_ms = args.send_delay_ms,
        progress_every = config.broadcast.progress_every,
        reconnects = config.link.reconnect_limit(),
        "vcfcast console starting"
    );

    let env = SystemEnv::new();
    let transport = Arc::new(LoopbackTransport::new(env, args.loopback_config()));
    let (coordinator, outbound) =
        Coordinator::new(env, transport, Arc::new(CardReader::new()), config);

    let fetcher = ContactFetcher::new(Duration::from_secs(args.fetch_timeout_secs))?;
    let console = Console::new(coordinator, outbound, tokio::io::stdout()).with_fetcher(fetcher);
    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "cannot listen for ctrl-c");
        }
    };
    console.run(BufReader::new(tokio::io::stdin()), shutdown).await?;

    tracing::info!("vcfcast console stopped");
    Ok(())
}
