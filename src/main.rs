use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use remote_host::router::RequestMeta;
use remote_host::MatchError;

#[derive(Parser)]
#[command(name = "remote-host", version, about = "Match request addresses against resolved host names")]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate addresses against the configured matcher
    Check {
        /// Remote addresses to evaluate
        #[arg(required = true)]
        addrs: Vec<IpAddr>,
        /// Value for the forwarded header (used when the matcher is `forwarded`)
        #[arg(long)]
        forwarded_for: Option<String>,
    },
    /// Serve a guarded endpoint that only matching clients can reach
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = remote_host::config::load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level)),
        )
        .init();
    info!(path = cli.config.as_str(), "config loaded");

    let matcher = Arc::new(remote_host::config::build_matcher(&config)?);

    match cli.command {
        Command::Check {
            addrs,
            forwarded_for,
        } => {
            let header = matcher.config().header.clone();
            for addr in addrs {
                let mut req = RequestMeta::new(SocketAddr::new(addr, 0));
                if let Some(value) = &forwarded_for {
                    req = req.with_header(&header, value);
                }
                match matcher.matches(&req).await {
                    Ok(matched) => println!("{}\t{}", addr, if matched { "match" } else { "no-match" }),
                    Err(MatchError::Resolution(e)) => {
                        println!("{}\terror: {}: {}", addr, e.host(), e)
                    }
                    Err(e) => println!("{}\terror: {}", addr, e),
                }
            }
        }
        Command::Serve => {
            let handle = remote_host::api::start(&config.api, matcher)?;
            tokio::select! {
                _ = handle => {}
                _ = tokio::signal::ctrl_c() => info!("shutting down"),
            }
        }
    }

    Ok(())
}
