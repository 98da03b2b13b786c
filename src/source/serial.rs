//! # Serial Telemetry Session
//!
//! Pumps the radio's USB serial link: newline-delimited telemetry in,
//! command frames out. The link is opened 8N1 at the configured baud rate;
//! when it drops, the session keeps retrying the open at a fixed interval
//! until it is stopped, so unplugging the radio mid-flight is survivable.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{GroundStationError, Result};
use crate::event::{SourceNotice, StationEvent};
use crate::hub::BroadcastHub;
use crate::ingest::IngestPipeline;
use crate::source::{SessionHandle, SourceKind};
use crate::status::{SourceState, StationStatus};

/// Outbound command frames queued per session
const UPLINK_QUEUE_DEPTH: usize = 16;

/// Why a pump run ended
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// Stop requested; do not reconnect
    Stopped,

    /// Link dropped or errored; reconnect applies
    Disconnected,
}

/// Open the configured serial port with 8N1 framing
///
/// # Arguments
///
/// * `config` - Port path, baud rate, and reconnect policy
///
/// # Returns
///
/// * `Result<SerialStream>` - Opened serial port
///
/// # Errors
///
/// Returns [`GroundStationError::Serial`] if the port cannot be opened
pub fn open_port(config: &SerialConfig) -> Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    let port = tokio_serial::new(config.port.as_str(), config.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| {
            GroundStationError::Serial(format!("Failed to open {}: {}", config.port, e))
        })?;

    Ok(port)
}

/// Start a serial session task and hand back its control handle
pub fn spawn(
    config: SerialConfig,
    pipeline: IngestPipeline,
    hub: Arc<BroadcastHub>,
    status: Arc<StationStatus>,
) -> SessionHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let (uplink_tx, uplink_rx) = mpsc::channel(UPLINK_QUEUE_DEPTH);

    let task = tokio::spawn(run(config, pipeline, hub, status, uplink_rx, stop_rx));
    SessionHandle::new(SourceKind::Serial, stop_tx, Some(uplink_tx), task)
}

/// Session body: open, pump, reconnect, until stopped
async fn run(
    config: SerialConfig,
    mut pipeline: IngestPipeline,
    hub: Arc<BroadcastHub>,
    status: Arc<StationStatus>,
    mut uplink_rx: mpsc::Receiver<String>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let retry_delay = Duration::from_millis(config.reconnect_interval_ms.max(1));

    loop {
        let port = match open_port(&config) {
            Ok(port) => port,
            Err(error) => {
                warn!(
                    "Cannot open {}, retrying in {} ms: {}",
                    config.port, config.reconnect_interval_ms, error
                );
                status.set_source(SourceState::Reconnecting { port: config.port.clone() });
                if wait_for_retry(retry_delay, &mut stop_rx).await {
                    break;
                }
                continue;
            }
        };

        info!("Serial link up: {} at {} baud", config.port, config.baud_rate);
        status.set_source(SourceState::Serial {
            port: config.port.clone(),
            baud_rate: config.baud_rate,
        });
        hub.publish(&StationEvent::Source(SourceNotice::connected(&config.port)));

        let (reader, writer) = tokio::io::split(port);
        match pump(reader, writer, &mut pipeline, &mut uplink_rx, &mut stop_rx).await {
            SessionEnd::Stopped => break,
            SessionEnd::Disconnected => {
                warn!(
                    "Serial link lost: {}, retrying every {} ms",
                    config.port, config.reconnect_interval_ms
                );
                hub.publish(&StationEvent::Source(SourceNotice::disconnected(&config.port)));
                status.set_source(SourceState::Reconnecting { port: config.port.clone() });
                if wait_for_retry(retry_delay, &mut stop_rx).await {
                    break;
                }
            }
        }
    }

    info!("Serial session on {} ended", config.port);
    hub.publish(&StationEvent::Source(SourceNotice::stopped(&config.port)));
    status.set_source(SourceState::Idle);
}

/// Sleep out the reconnect interval; true means stop was requested
async fn wait_for_retry(delay: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        changed = stop_rx.changed() => {
            let _ = changed;
            true
        }
        _ = tokio::time::sleep(delay) => false,
    }
}

/// Pump one open link until it drops or the session is stopped
///
/// Branch priority: stop requests first, then outbound command frames so a
/// chatty downlink cannot starve the uplink, then inbound lines.
async fn pump<R, W>(
    reader: R,
    mut writer: W,
    pipeline: &mut IngestPipeline,
    uplink_rx: &mut mpsc::Receiver<String>,
    stop_rx: &mut watch::Receiver<bool>,
) -> SessionEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                let _ = changed;
                return SessionEnd::Stopped;
            }

            frame = uplink_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(error) = transmit(&mut writer, &frame).await {
                        warn!("Uplink write failed: {}", error);
                        return SessionEnd::Disconnected;
                    }
                }
                // Queue sender gone means the session handle was dropped
                None => return SessionEnd::Stopped,
            },

            line = lines.next_line() => match line {
                Ok(Some(line)) => pipeline.process_line(&line),
                Ok(None) => {
                    debug!("Serial stream reached EOF");
                    return SessionEnd::Disconnected;
                }
                Err(error) => {
                    warn!("Serial read failed: {}", error);
                    return SessionEnd::Disconnected;
                }
            },
        }
    }
}

/// Write one command frame terminated by CRLF and push it out
async fn transmit<W: AsyncWrite + Unpin>(writer: &mut W, frame: &str) -> std::io::Result<()> {
    writer.write_all(frame.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    info!("Transmitted command frame: {}", frame);
    Ok(())
}
