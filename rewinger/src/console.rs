//! Operator console on stdin.
//!
//! | Command       | Effect |
//! |---------------|--------|
//! | `arm`         | wait for the next valid fix, then record |
//! | `stop`        | stop recording and release the log |
//! | `status`      | one-line recorder status |
//! | `status json` | recorder status as JSON |
//! | `quit`        | shut down |

use anyhow::bail;
use log::{debug, warn};
use std::io::BufRead;
use tokio::sync::mpsc;
use tokio_graceful_shutdown::SubsystemHandle;

use crate::recording::{RecorderCommand, RecorderHandle, RecorderStatus, RecordingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Arm,
    Stop,
    Status { json: bool },
    Help,
    Quit,
}

/// Parse one input line; blank lines are `None`.
pub fn parse_command(line: &str) -> anyhow::Result<Option<ConsoleCommand>> {
    let words: Vec<String> = line
        .split_whitespace()
        .map(|w| w.to_ascii_lowercase())
        .collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();

    let command = match words.as_slice() {
        [] => return Ok(None),
        ["arm"] => ConsoleCommand::Arm,
        ["stop"] => ConsoleCommand::Stop,
        ["status"] => ConsoleCommand::Status { json: false },
        ["status", "json"] => ConsoleCommand::Status { json: true },
        ["help"] | ["?"] => ConsoleCommand::Help,
        ["quit"] | ["exit"] => ConsoleCommand::Quit,
        _ => bail!("Unknown command '{}', try 'help'", line.trim()),
    };
    Ok(Some(command))
}

pub fn format_status(status: &RecorderStatus) -> String {
    let feed = if status.connected { "feed ok" } else { "no feed" };
    let mut position = match &status.latest_position {
        Some(p) => format!(
            "{:.5},{:.5} {:.0} m {:.0}°",
            p.latitude, p.longitude, p.altitude_msl_m, p.track_true_deg
        ),
        None => "no fix".to_string(),
    };
    if let Some(a) = &status.latest_attitude {
        position.push_str(&format!(
            " hdg {:.0}° pitch {:.1}° roll {:.1}°",
            a.heading_true_deg, a.pitch_deg, a.roll_deg
        ));
    }
    format!(
        "{} | {} | {} rows, {} invalid fixes skipped, {} malformed dropped | {} | {} traffic | {}",
        status.state,
        feed,
        status.stats.rows_written,
        status.stats.invalid_skipped,
        status.malformed_dropped,
        position,
        status.traffic.len(),
        status.log_path.display()
    )
}

const HELP: &str = "Commands: arm, stop, status [json], help, quit";

pub struct Console {
    handle: RecorderHandle,
}

impl Console {
    pub fn new(handle: RecorderHandle) -> Self {
        Console { handle }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), RecordingError> {
        let (tx, mut rx) = mpsc::channel::<String>(8);

        // Blocking stdin reads get their own thread so they never hold up runtime shutdown
        let spawned = std::thread::Builder::new()
            .name("console".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    match line {
                        Ok(line) => {
                            if tx.blocking_send(line).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            });
        if let Err(e) = spawned {
            warn!("Console unavailable: {}", e);
        } else {
            println!("{}", HELP);
        }

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    break;
                },
                line = rx.recv() => {
                    match line {
                        Some(line) => self.execute(&line, &subsys).await,
                        None => {
                            debug!("Console: stdin closed");
                            subsys.on_shutdown_requested().await;
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn execute(&self, line: &str, subsys: &SubsystemHandle) {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) => {
                println!("{}", e);
                return;
            }
        };

        match command {
            ConsoleCommand::Arm => self.send(RecorderCommand::Arm).await,
            ConsoleCommand::Stop => self.send(RecorderCommand::Stop).await,
            ConsoleCommand::Status { json: false } => {
                println!("{}", format_status(&self.handle.status.borrow()));
            }
            ConsoleCommand::Status { json: true } => {
                let status = self.handle.status.borrow().clone();
                match serde_json::to_string_pretty(&status) {
                    Ok(json) => println!("{}", json),
                    Err(e) => warn!("Cannot serialize status: {}", e),
                }
            }
            ConsoleCommand::Help => println!("{}", HELP),
            ConsoleCommand::Quit => subsys.request_shutdown(),
        }
    }

    async fn send(&self, command: RecorderCommand) {
        if self.handle.commands.send(command).await.is_err() {
            warn!("Recorder is not running");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewinger_core::protocol::{AircraftMetadata, AttitudeSample, PositionSample};
    use rewinger_core::{RecorderState, RecorderStats};
    use std::path::PathBuf;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("arm").unwrap(), Some(ConsoleCommand::Arm));
        assert_eq!(parse_command("  STOP \n").unwrap(), Some(ConsoleCommand::Stop));
        assert_eq!(
            parse_command("status json").unwrap(),
            Some(ConsoleCommand::Status { json: true })
        );
        assert_eq!(parse_command("exit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(parse_command("").unwrap(), None);
        assert!(parse_command("record now").is_err());
    }

    #[test]
    fn test_format_status() {
        let status = RecorderStatus {
            state: RecorderState::Recording,
            log_path: PathBuf::from("/tmp/flight.csv"),
            stats: RecorderStats {
                rows_written: 42,
                invalid_skipped: 3,
                sessions: 1,
            },
            malformed_dropped: 1,
            connected: true,
            last_receive_unix_ms: Some(1_700_000_000_000),
            latest_position: Some(PositionSample {
                simulator: String::new(),
                longitude: 8.54321,
                latitude: 47.46472,
                altitude_msl_m: 432.1,
                track_true_deg: 271.5,
                ground_speed_mps: 61.7,
            }),
            latest_attitude: Some(AttitudeSample {
                simulator: String::new(),
                heading_true_deg: 273.4,
                pitch_deg: 2.5,
                roll_deg: -1.3,
            }),
            traffic: Vec::new(),
            metadata: AircraftMetadata::default(),
        };
        let line = format_status(&status);
        assert!(line.starts_with(
            "recording | feed ok | 42 rows, 3 invalid fixes skipped, 1 malformed dropped"
        ));
        assert!(line.contains("47.46472,8.54321 432 m 272° hdg 273° pitch 2.5° roll -1.3°"));
        assert!(line.contains("| 0 traffic |"));
        assert!(line.ends_with("/tmp/flight.csv"));

        let idle = format_status(&RecorderStatus::default());
        assert!(idle.starts_with("idle | no feed | 0 rows"));
        assert!(idle.contains("| no fix |"));
    }
}
