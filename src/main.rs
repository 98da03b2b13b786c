//! # Daedalus Ground Station
//!
//! Bridge between a CanSat's serial telemetry downlink and live dashboard
//! viewers.
//!
//! The binary loads its configuration, starts one telemetry source (the
//! serial radio by default, the built-in simulation with `--sim`), and
//! runs until interrupted.

use anyhow::{Context, Result};
use tokio::time::{interval, Duration};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use daedalus_gs::config::Config;
use daedalus_gs::station::GroundStation;

/// Seconds between periodic session status log lines
const STATUS_LOG_INTERVAL_SECS: u64 = 10;

/// File name prefix for the daily rolling station log
const LOG_FILE_PREFIX: &str = "ground.jsonl";

/// Parsed command line
#[derive(Debug, PartialEq, Eq)]
struct CliArgs {
    config_path: Option<String>,
    sim: bool,
}

/// Parse the command line: an optional config path plus flags
fn parse_args<I: Iterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut parsed = CliArgs { config_path: None, sim: false };

    for arg in args {
        match arg.as_str() {
            "--sim" => parsed.sim = true,
            flag if flag.starts_with('-') => {
                anyhow::bail!("Unknown flag: {} (usage: daedalus-gs [config.toml] [--sim])", flag)
            }
            path => {
                if parsed.config_path.is_some() {
                    anyhow::bail!("More than one config path given");
                }
                parsed.config_path = Some(path.to_string());
            }
        }
    }

    Ok(parsed)
}

/// Set up console logging plus a daily rolling JSON line log
///
/// The returned guard must stay alive for the process lifetime; dropping
/// it flushes and stops the background log writer.
fn init_logging(log_dir: &str) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir))?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

/// Main entry point for the ground station
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Parse the command line and load configuration
///    - Set up console and rolling file logging
///    - Assemble the station and start the chosen telemetry source
///
/// 2. **Main Loop**
///    - Log a session status line every 10 seconds
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the active source session
///    - Log the final session counters
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the log
/// directory cannot be created. Serial trouble is not fatal: the session
/// keeps retrying the port until stopped.
#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    let config = match &args.config_path {
        Some(path) => {
            Config::load(path).with_context(|| format!("Failed to load config from {}", path))?
        }
        None => Config::default(),
    };

    let _log_guard = init_logging(&config.log_dir)?;

    info!("Daedalus ground station v{} starting...", env!("CARGO_PKG_VERSION"));
    match &args.config_path {
        Some(path) => info!("Configuration loaded from {}", path),
        None => info!("No config path given, using built-in defaults"),
    }

    let sim_period_ms = config.sim.period_ms;
    let station = GroundStation::new(config);

    if args.sim {
        station.start_sim(sim_period_ms).await;
    } else {
        station.start_serial().await;
    }

    info!("Press Ctrl+C to exit");
    let mut status_interval = interval(Duration::from_secs(STATUS_LOG_INTERVAL_SECS));

    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                let health = station.health();
                info!(
                    "Session: {} records received, {} lost, persistence {}",
                    health.received,
                    health.lost,
                    if health.persist_ok { "ok" } else { "degraded" },
                );
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    station.stop().await;
    let health = station.health();
    info!(
        "Session closed: {} records received, {} lost",
        health.received, health.lost
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args<'a>(list: &'a [&'a str]) -> impl Iterator<Item = String> + 'a {
        list.iter().map(|s| s.to_string())
    }

    #[test]
    fn test_status_interval_constant() {
        assert_eq!(STATUS_LOG_INTERVAL_SECS, 10);
    }

    #[test]
    fn test_parse_args_defaults() {
        let parsed = parse_args(args(&[])).unwrap();
        assert_eq!(parsed, CliArgs { config_path: None, sim: false });
    }

    #[test]
    fn test_parse_args_config_path_and_sim() {
        let parsed = parse_args(args(&["station.toml", "--sim"])).unwrap();
        assert_eq!(parsed.config_path.as_deref(), Some("station.toml"));
        assert!(parsed.sim);
    }

    #[test]
    fn test_parse_args_rejects_unknown_flag() {
        assert!(parse_args(args(&["--verbose"])).is_err());
    }

    #[test]
    fn test_parse_args_rejects_second_path() {
        assert!(parse_args(args(&["a.toml", "b.toml"])).is_err());
    }
}
