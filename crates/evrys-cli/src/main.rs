//! evrys binary: runs the ingestion service or publishes events to one.

use std::net::SocketAddr;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod signal;

use commands::{publish, serve};

#[derive(Parser)]
#[command(name = "evrys", version)]
#[command(about = "CloudEvents ingestion service and publisher")]
struct Cli {
    /// Log filter, e.g. `info` or `evrys_server=debug`
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion service until SIGINT or SIGTERM
    Serve {
        /// Path to the TOML configuration file
        #[arg(long, env = "EVRYS_CONFIG_PATH", default_value = "config.toml")]
        config: String,
        /// Listen address, overriding `[server]` in the configuration
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Publish to an ingestion service
    Publish {
        #[command(subcommand)]
        target: PublishTarget,
    },
}

#[derive(Subcommand)]
enum PublishTarget {
    /// Append events read from a file, stdin, or the command line
    Events {
        /// Input file, or `-` for stdin
        #[arg(default_value = "-")]
        input: String,
        /// Base URL of the ingestion service
        #[arg(long, env = "EVRYS_ENDPOINT")]
        endpoint: Option<String>,
        /// Input encoding: json or binary
        #[arg(long, default_value = "json")]
        format: String,
        /// Concurrent appends
        #[arg(long, default_value_t = evrys_publish::DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// An event as JSON; repeatable, replaces the input
        #[arg(long = "event")]
        events: Vec<String>,
    },
}

/// Installs the global subscriber. Logs go to stderr so stdout stays clean
/// for command output.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config, addr } => {
            serve::run(serve::Args {
                config,
                addr,
                log_level: cli.log_level,
                log_json: cli.log_json,
            })
            .await
        }
        Commands::Publish {
            target:
                PublishTarget::Events {
                    input,
                    endpoint,
                    format,
                    concurrency,
                    events,
                },
        } => {
            init_tracing(cli.log_level.as_deref().unwrap_or("warn"), cli.log_json);
            publish::run(publish::Args {
                input,
                endpoint,
                format,
                concurrency,
                events,
            })
            .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
