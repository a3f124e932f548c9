//! CLI entry point: `ts-core serve` runs the time-synchronization server;
//! `ts-core query` issues a one-shot control-protocol request against a
//! running instance's in-process server (a local subcommand that builds
//! its own `Server` rather than dialing a socket, since the transport is
//! out of scope here).

use clap::{Parser, Subcommand};
use std::sync::Arc;
use ts_core::bintime::to_bintime_duration;
use ts_core::config::Config;
use ts_core::counter::{self, SourceSystem};
use ts_core::logging::{self, LogConfig, LogFormat, LogLevel};
use ts_core::server::Server;

#[derive(Parser, Debug)]
#[command(name = "ts-core", about = "NTP-disciplined time-synchronization core")]
struct Cli {
    #[arg(long, env = "TS_LOG")]
    log_level: Option<LogLevel>,

    #[arg(long, env = "TS_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the time-synchronization server, optionally polling an NTP source.
    Serve {
        /// Remote NTP server hostname to poll at startup.
        #[arg(long)]
        source: Option<String>,
        /// NTP service/port name.
        #[arg(long, default_value = "ntp")]
        service: String,
    },
    /// Query the server's keeper/counters/sources state.
    Query {
        #[command(subcommand)]
        what: QueryTarget,
    },
}

#[derive(Subcommand, Debug)]
enum QueryTarget {
    Keeper,
    Counters,
    Sources,
}

fn wall_now() -> ts_core::bintime::Bintime {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    to_bintime_duration(since_epoch)
}

fn bootstrap_server() -> Server {
    counter::init(&[Arc::new(SourceSystem::new())]);
    Server::new(counter::frequency())
}

fn main() {
    let cli = Cli::parse();
    let config = Config::from_env();
    let log_config = LogConfig::from_env(cli.log_level, cli.log_format);
    logging::init_logging(&log_config);

    match cli.command {
        Command::Serve { source, service } => {
            let mut server = bootstrap_server();
            let node = source.or(config.source_node);
            let service = if service == "ntp" {
                config.source_service
            } else {
                service
            };
            if let Some(node) = node {
                let cfg = ts_core::api::TimeSourceConfigNtp { node, service };
                match server.handle_add_source(None, cfg) {
                    Ok(_) => tracing::info!("time source added"),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to add time source");
                        std::process::exit(1);
                    }
                }
            }
            tracing::info!("ts-core server ready (no socket transport in this build)");
            let reply = server.handle_get_keeper(wall_now());
            println!("{}", serde_json::to_string_pretty(&reply).unwrap());
        }
        Command::Query { what } => {
            let server = bootstrap_server();
            let reply = match what {
                QueryTarget::Keeper => server.handle_get_keeper(wall_now()),
                QueryTarget::Counters => server.handle_list_counters(None),
                QueryTarget::Sources => server.handle_list_sources(None),
            };
            println!("{}", serde_json::to_string_pretty(&reply).unwrap());
        }
    }
}
