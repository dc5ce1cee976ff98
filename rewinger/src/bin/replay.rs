use clap::Parser;
use log::{info, warn};
use miette::{IntoDiagnostic, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

use rewinger::config::clamp_speed;
use rewinger::network::UdpTransport;
use rewinger::recording::{load_log, recordings_dir, Player, RecordingManager, ReplayOptions};
use rewinger::{init_logging, ReplayCli, VERSION};
use rewinger_core::{build_schedule, ReplayError};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ReplayCli::parse();
    init_logging(&args.verbose);
    info!("replay {} starting", VERSION);

    let log = match load_log(&args.path, args.strict) {
        Ok(log) => log,
        Err(e) => {
            if matches!(e, ReplayError::FileNotFound(_)) {
                let recordings = RecordingManager::existing(recordings_dir())
                    .map(|m| m.list_recordings())
                    .unwrap_or_default();
                if !recordings.is_empty() {
                    info!("Recordings available:");
                    for r in recordings {
                        info!("  {} ({} bytes)", r.path.display(), r.size);
                    }
                }
            }
            return Err(e).into_diagnostic();
        }
    };
    info!(
        "{}: {} sessions, {} records, {} malformed rows skipped",
        args.path.display(),
        log.session_count(),
        log.record_count(),
        log.skipped.len()
    );
    if !log.metadata.is_empty() {
        let m = &log.metadata;
        info!(
            "Recorded aircraft: callsign {:?}, registration {:?}, type {:?}, ICAO {:?}",
            m.callsign, m.registration, m.aircraft_type, m.icao_address
        );
    }

    let speed = clamp_speed(args.speed);
    if speed != args.speed {
        warn!("Speed {} out of range, using {}", args.speed, speed);
    }

    let overrides = args.metadata.clone().into_metadata();
    let bursts = build_schedule(&log.entries, args.mode, &overrides);
    if bursts.is_empty() {
        warn!("Nothing to replay in {}", args.path.display());
        return Ok(());
    }

    let destination = SocketAddr::new(args.address, args.port);
    let transport = UdpTransport::sender_for(destination).into_diagnostic()?;
    let options = ReplayOptions { destination, speed };
    let player = Player::new(transport, bursts, options, log.skipped.len() as u64);

    Toplevel::new(move |s| async move {
        s.start(SubsystemBuilder::new("Player", move |s: SubsystemHandle| {
            player.run(s)
        }));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .into_diagnostic()
}
