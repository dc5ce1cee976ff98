//! Live ingestion - receives the simulator feed and records it.
//!
//! Two subsystems share nothing but a channel: the [`Receiver`] decodes
//! datagrams and queues them, the [`Recorder`] is the only owner of the
//! [`RecorderEngine`] and handles messages and operator commands one at a
//! time.

use log::{debug, error, info, trace, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};

use rewinger_core::protocol::{
    decode_datagram, AircraftMetadata, AttitudeSample, Message, PositionSample, TrafficSample,
};
use rewinger_core::{Outcome, RecorderEngine, RecorderError, RecorderState, RecorderStats};

use super::log_file::CsvLogTarget;
use super::RecordingError;
use crate::config::{CONNECTED_TIMEOUT, MESSAGE_QUEUE_DEPTH, STATUS_INTERVAL, TRAFFIC_TIMEOUT};
use crate::network::{UdpTransport, MAX_DATAGRAM_SIZE, RECEIVE_TIMEOUT};

/// A decoded datagram and when it arrived
#[derive(Debug, Clone)]
pub struct Received {
    pub message: Message,
    pub received_unix_ms: u64,
}

/// Operator commands for the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderCommand {
    Arm,
    Stop,
}

/// Recorder status, published after every change and every [`STATUS_INTERVAL`]
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    pub state: RecorderState,
    pub log_path: PathBuf,
    pub stats: RecorderStats,
    /// Datagrams that failed to decode
    pub malformed_dropped: u64,
    /// A message arrived within [`CONNECTED_TIMEOUT`]
    pub connected: bool,
    pub last_receive_unix_ms: Option<u64>,
    pub latest_position: Option<PositionSample>,
    pub latest_attitude: Option<AttitudeSample>,
    /// Traffic heard within [`TRAFFIC_TIMEOUT`], ordered by ICAO address
    pub traffic: Vec<TrafficSample>,
    pub metadata: AircraftMetadata,
}

/// Current time as Unix milliseconds
pub fn now_unix_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

// =============================================================================
// Receiver
// =============================================================================

pub struct Receiver {
    transport: UdpTransport,
    tx: mpsc::Sender<Received>,
    malformed: Arc<AtomicU64>,
}

impl Receiver {
    pub fn new(transport: UdpTransport, tx: mpsc::Sender<Received>, malformed: Arc<AtomicU64>) -> Self {
        Receiver {
            transport,
            tx,
            malformed,
        }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), RecordingError> {
        info!("Listening for simulator data on {}", self.transport.local_addr());
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    debug!("Receiver: shutdown");
                    break;
                },
                r = self.transport.receive(&mut buf, RECEIVE_TIMEOUT) => {
                    match r {
                        Ok(Some((len, from))) => {
                            if !self.handle_datagram(&buf[..len], from).await {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            // e.g. ICMP port unreachable surfaced on the next recv
                            warn!("{}", e);
                        }
                    }
                }
            }
        }

        self.transport.close();
        Ok(())
    }

    /// Returns false once the recorder has gone away
    async fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> bool {
        match decode_datagram(data) {
            Ok(message) => {
                let received = Received {
                    message,
                    received_unix_ms: now_unix_ms(),
                };
                self.tx.send(received).await.is_ok()
            }
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                debug!("{}: dropped datagram: {}", from, e);
                true
            }
        }
    }
}

// =============================================================================
// Recorder
// =============================================================================

/// Traffic targets by ICAO address, with the time each was last heard
#[derive(Debug, Default)]
pub struct LiveTraffic {
    targets: BTreeMap<String, (TrafficSample, u64)>,
}

fn is_fresh(seen_unix_ms: u64, now_unix_ms: u64, timeout: std::time::Duration) -> bool {
    (now_unix_ms.saturating_sub(seen_unix_ms) as u128) < timeout.as_millis()
}

impl LiveTraffic {
    pub fn update(&mut self, sample: TrafficSample, now_unix_ms: u64) {
        self.targets
            .insert(sample.icao_address.clone(), (sample, now_unix_ms));
    }

    /// Targets heard within [`TRAFFIC_TIMEOUT`] of `now_unix_ms`
    pub fn active(&self, now_unix_ms: u64) -> Vec<TrafficSample> {
        self.targets
            .values()
            .filter(|(_, seen)| is_fresh(*seen, now_unix_ms, TRAFFIC_TIMEOUT))
            .map(|(sample, _)| sample.clone())
            .collect()
    }

    /// Forget targets older than [`TRAFFIC_TIMEOUT`]
    pub fn expire(&mut self, now_unix_ms: u64) {
        self.targets
            .retain(|_, (_, seen)| is_fresh(*seen, now_unix_ms, TRAFFIC_TIMEOUT));
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

pub struct Recorder {
    engine: RecorderEngine<CsvLogTarget>,
    messages: mpsc::Receiver<Received>,
    commands: mpsc::Receiver<RecorderCommand>,
    status: watch::Sender<RecorderStatus>,
    malformed: Arc<AtomicU64>,
    traffic: LiveTraffic,
    last_receive_unix_ms: Option<u64>,
}

impl Recorder {
    pub fn new(
        engine: RecorderEngine<CsvLogTarget>,
        messages: mpsc::Receiver<Received>,
        commands: mpsc::Receiver<RecorderCommand>,
        malformed: Arc<AtomicU64>,
    ) -> Self {
        let (status, _) = watch::channel(RecorderStatus::default());
        let recorder = Recorder {
            engine,
            messages,
            commands,
            status,
            malformed,
            traffic: LiveTraffic::default(),
            last_receive_unix_ms: None,
        };
        recorder.publish();
        recorder
    }

    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.status.subscribe()
    }

    pub async fn run(mut self, subsys: SubsystemHandle) -> Result<(), RecordingError> {
        self.publish();

        let mut status_timer = interval(STATUS_INTERVAL);
        status_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = subsys.on_shutdown_requested() => {
                    debug!("Recorder: shutdown");
                    break;
                },
                _ = status_timer.tick() => {
                    self.traffic.expire(now_unix_ms());
                    self.publish();
                },
                Some(received) = self.messages.recv() => {
                    self.handle_message(received);
                },
                Some(command) = self.commands.recv() => {
                    self.handle_command(command);
                },
            }
        }

        // Release the log so buffered rows reach the disk
        if self.engine.state() != RecorderState::Idle {
            self.handle_command(RecorderCommand::Stop);
        }
        Ok(())
    }

    pub fn status(&self) -> RecorderStatus {
        self.status_at(now_unix_ms())
    }

    /// Status as seen at `now_unix_ms`; feed and traffic freshness depend on it
    pub fn status_at(&self, now_unix_ms: u64) -> RecorderStatus {
        let engine = &self.engine;
        RecorderStatus {
            state: engine.state(),
            log_path: engine.target().path().to_path_buf(),
            stats: engine.stats(),
            malformed_dropped: self.malformed.load(Ordering::Relaxed),
            connected: self
                .last_receive_unix_ms
                .is_some_and(|at| is_fresh(at, now_unix_ms, CONNECTED_TIMEOUT)),
            last_receive_unix_ms: self.last_receive_unix_ms,
            latest_position: engine.latest_position().cloned(),
            latest_attitude: engine.latest_attitude().cloned(),
            traffic: self.traffic.active(now_unix_ms),
            metadata: engine.metadata().clone(),
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.status());
    }

    pub fn handle_message(&mut self, received: Received) {
        let kind = received.message.kind();
        self.last_receive_unix_ms = Some(received.received_unix_ms);
        if let Message::Traffic(traffic) = &received.message {
            if traffic.is_valid() {
                self.traffic.update(traffic.clone(), received.received_unix_ms);
            }
        }
        self.traffic.expire(received.received_unix_ms);

        match self
            .engine
            .on_message(received.message, received.received_unix_ms)
        {
            Ok(Outcome::Started) => {
                info!(
                    "Valid position received, recording to {}",
                    self.engine.target().path().display()
                );
            }
            Ok(Outcome::InvalidPosition) => {
                debug!("Skipping {} at (0,0)", kind);
            }
            Ok(Outcome::MetadataUpdated) => {
                let m = self.engine.metadata();
                info!(
                    "Aircraft: {} {} ({}) callsign '{}'",
                    m.aircraft_type, m.registration, m.icao_address, m.callsign
                );
            }
            Ok(outcome) => {
                trace!("{}: {:?}", kind, outcome);
            }
            Err(e) => {
                error!("Recording aborted: {}", e);
            }
        }
        self.publish();
    }

    pub fn handle_command(&mut self, command: RecorderCommand) {
        match command {
            RecorderCommand::Arm => match self.engine.arm() {
                Ok(()) => info!(
                    "Armed, waiting for a valid position fix (log {})",
                    self.engine.target().path().display()
                ),
                Err(RecorderError::AlreadyArmed) => warn!("Already {}", self.engine.state()),
                Err(e) => error!("Cannot arm: {}", e),
            },
            RecorderCommand::Stop => {
                let stats = self.engine.stats();
                match self.engine.stop() {
                    Ok(()) => info!("Recording stopped, {} rows written", stats.rows_written),
                    Err(RecorderError::NotRecording) => warn!("Not recording"),
                    Err(e) => error!("Recording stopped with error: {}", e),
                }
            }
        }
        self.publish();
    }
}

// =============================================================================
// Wiring
// =============================================================================

/// Handles to a running recorder
#[derive(Clone)]
pub struct RecorderHandle {
    pub commands: mpsc::Sender<RecorderCommand>,
    pub status: watch::Receiver<RecorderStatus>,
}

/// Start the Receiver and Recorder subsystems.
pub fn start(
    subsys: &SubsystemHandle,
    transport: UdpTransport,
    engine: RecorderEngine<CsvLogTarget>,
) -> RecorderHandle {
    let (message_tx, message_rx) = mpsc::channel(MESSAGE_QUEUE_DEPTH);
    let (command_tx, command_rx) = mpsc::channel(8);
    let malformed = Arc::new(AtomicU64::new(0));

    let recorder = Recorder::new(engine, message_rx, command_rx, malformed.clone());
    let status_rx = recorder.subscribe();
    let receiver = Receiver::new(transport, message_tx, malformed);

    subsys.start(SubsystemBuilder::new("Receiver", move |s: SubsystemHandle| {
        receiver.run(s)
    }));
    subsys.start(SubsystemBuilder::new("Recorder", move |s: SubsystemHandle| {
        recorder.run(s)
    }));

    RecorderHandle {
        commands: command_tx,
        status: status_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::load_log;
    use rewinger_core::protocol::decode;
    use rewinger_core::{LogEntry, RecordPayload};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_graceful_shutdown::Toplevel;

    fn recorder(path: &std::path::Path) -> Recorder {
        let (_message_tx, message_rx) = mpsc::channel(1);
        let (_command_tx, command_rx) = mpsc::channel(1);
        let engine = RecorderEngine::new(CsvLogTarget::new(path), AircraftMetadata::default());
        Recorder::new(engine, message_rx, command_rx, Arc::new(AtomicU64::new(0)))
    }

    fn received(line: &str, at: u64) -> Received {
        Received {
            message: decode(line).unwrap(),
            received_unix_ms: at,
        }
    }

    #[test]
    fn test_commands_update_status() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flight.csv");
        let mut recorder = recorder(&path);
        let status = recorder.subscribe();
        assert_eq!(status.borrow().state, RecorderState::Idle);

        recorder.handle_command(RecorderCommand::Arm);
        assert_eq!(status.borrow().state, RecorderState::Armed);

        recorder.handle_message(received("XGPS,12.34,56.78,100,90,10", 1_000));
        assert_eq!(status.borrow().state, RecorderState::Recording);
        // Held until its attitude or the next fix arrives
        assert_eq!(status.borrow().stats.rows_written, 0);
        assert_eq!(
            status.borrow().latest_position.as_ref().map(|p| p.latitude),
            Some(56.78)
        );

        recorder.handle_command(RecorderCommand::Stop);
        assert_eq!(status.borrow().state, RecorderState::Idle);
        assert_eq!(status.borrow().stats.rows_written, 1);
        assert_eq!(status.borrow().log_path, path);

        // Stop while idle is reported, not fatal
        recorder.handle_command(RecorderCommand::Stop);
        assert_eq!(status.borrow().state, RecorderState::Idle);
    }

    #[test]
    fn test_connected_follows_last_receive() {
        let dir = TempDir::new().unwrap();
        let mut recorder = recorder(&dir.path().join("flight.csv"));
        assert!(!recorder.status_at(0).connected);

        recorder.handle_message(received("XATT,91,2,3", 10_000));
        let status = recorder.status_at(14_999);
        assert!(status.connected);
        assert_eq!(status.last_receive_unix_ms, Some(10_000));
        assert_eq!(
            status.latest_attitude.as_ref().map(|a| a.heading_true_deg),
            Some(91.0)
        );
        assert!(!recorder.status_at(15_000).connected);
    }

    #[test]
    fn test_traffic_expires() {
        let dir = TempDir::new().unwrap();
        let mut recorder = recorder(&dir.path().join("flight.csv"));

        recorder.handle_message(received("XTRAFFIC,4B1805,47.4,8.5,3000,0,1,90,120,SWR1", 1_000));
        recorder.handle_message(received("XTRAFFIC,3C6444,47.5,8.6,5000,0,1,180,200,DLH2", 20_000));
        // Zero position never enters the table
        recorder.handle_message(received("XTRAFFIC,ABCDEF,0,0,0,0,1,0,0,NONE", 20_000));
        // Same target again replaces the earlier sample
        recorder.handle_message(received("XTRAFFIC,4B1805,47.41,8.5,3100,0,1,90,120,SWR1", 2_000));

        let icaos = |status: &RecorderStatus| -> Vec<String> {
            status.traffic.iter().map(|t| t.icao_address.clone()).collect()
        };
        assert_eq!(icaos(&recorder.status_at(25_000)), vec!["3C6444", "4B1805"]);
        assert_eq!(recorder.status_at(25_000).traffic[1].latitude, 47.41);
        assert_eq!(icaos(&recorder.status_at(32_000)), vec!["3C6444"]);
        assert!(recorder.status_at(50_000).traffic.is_empty());

        // Expired targets are also dropped from the table itself
        recorder.handle_message(received("XATT,0,0,0", 40_000));
        assert_eq!(recorder.traffic.len(), 1);
    }

    #[test]
    fn test_unwritable_log_stays_idle() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened for append
        let mut recorder = recorder(dir.path());
        recorder.handle_command(RecorderCommand::Arm);
        assert_eq!(recorder.status().state, RecorderState::Idle);
    }

    #[tokio::test]
    async fn test_live_feed_is_recorded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("live.csv");

        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = transport.local_addr();
        let mut engine = RecorderEngine::new(CsvLogTarget::new(&path), AircraftMetadata::default());
        engine.arm().unwrap();

        let toplevel = Toplevel::new(move |s| async move {
            let mut handle = start(&s, transport, engine);
            let sender = UdpTransport::sender().unwrap();
            for line in [
                "XGPS,0,0,100,90,10",
                "garbage",
                "XGPS,12.34,56.78,100,90,10",
                "XATT,90,1,2",
                "XGPS,12.35,56.79,110,91,11",
            ] {
                sender.send(line, addr).await.unwrap();
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            let _ = handle
                .status
                .wait_for(|status| {
                    status.stats.rows_written == 1
                        && status.latest_position.as_ref().map(|p| p.latitude) == Some(56.79)
                })
                .await;
            assert_eq!(handle.status.borrow().malformed_dropped, 1);
            assert_eq!(handle.status.borrow().stats.invalid_skipped, 1);
            s.request_shutdown();
        })
        .handle_shutdown_requests(Duration::from_secs(2));

        tokio::time::timeout(Duration::from_secs(10), toplevel)
            .await
            .expect("recorder did not shut down")
            .unwrap();

        let log = load_log(&path, true).unwrap();
        assert_eq!(log.session_count(), 1);
        // The last fix is written without attitude when the recorder stops
        assert_eq!(log.record_count(), 2);
        let positions: Vec<(f64, Option<f64>)> = log
            .entries
            .iter()
            .filter_map(|entry| match entry {
                LogEntry::Record(record) => match &record.payload {
                    RecordPayload::Position { position, attitude } => {
                        Some((position.latitude, attitude.as_ref().map(|a| a.pitch_deg)))
                    }
                    _ => None,
                },
                LogEntry::Session(_) => None,
            })
            .collect();
        assert_eq!(positions, vec![(56.78, Some(1.0)), (56.79, None)]);
    }
}
