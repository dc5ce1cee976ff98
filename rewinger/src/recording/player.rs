//! Timed replay - sends a schedule of protocol lines over UDP.
//!
//! Every burst is due at `start + offset / speed`, measured from a single
//! start instant, so scheduling jitter never accumulates over a long replay.
//! Cancellation is checked between bursts; what was already sent stays sent.

use log::{debug, info, warn};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tokio_graceful_shutdown::SubsystemHandle;
use tokio_util::sync::CancellationToken;

use rewinger_core::replay::datagram_count;
use rewinger_core::ScheduledBurst;

use super::RecordingError;
use crate::config::clamp_speed;
use crate::network::UdpTransport;

#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    pub destination: SocketAddr,
    /// Playback speed multiplier (1.0 = original timing)
    pub speed: f64,
}

/// Outcome of a replay run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub bursts_sent: u64,
    pub datagrams_sent: u64,
    /// Sends that failed; counted, never retried
    pub send_failures: u64,
    /// Log rows skipped while loading
    pub skipped_rows: u64,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

fn due_after(offset_ms: u64, speed: f64) -> Duration {
    Duration::from_secs_f64(offset_ms as f64 / 1000.0 / speed)
}

/// Send `bursts` at their scheduled offsets until done or `cancel` fires.
pub async fn run_replay(
    transport: &UdpTransport,
    bursts: &[ScheduledBurst],
    options: &ReplayOptions,
    cancel: &CancellationToken,
) -> ReplayReport {
    let speed = clamp_speed(options.speed);
    let mut report = ReplayReport::default();
    let start = Instant::now();

    for burst in bursts {
        let due = start + due_after(burst.offset_ms, speed);
        tokio::select! {
            _ = cancel.cancelled() => {
                report.cancelled = true;
                break;
            }
            _ = tokio::time::sleep_until(due) => {}
        }

        for line in &burst.lines {
            match transport.send(line, options.destination).await {
                Ok(()) => report.datagrams_sent += 1,
                Err(e) => {
                    warn!("{}", e);
                    report.send_failures += 1;
                }
            }
        }
        report.bursts_sent += 1;
        debug!(
            "Burst {}/{} at {} ms",
            report.bursts_sent,
            bursts.len(),
            burst.offset_ms
        );
    }

    report.elapsed_ms = start.elapsed().as_millis() as u64;
    report
}

/// Replay subsystem. Requests program shutdown when the schedule is done.
pub struct Player {
    transport: UdpTransport,
    bursts: Vec<ScheduledBurst>,
    options: ReplayOptions,
    skipped_rows: u64,
}

impl Player {
    pub fn new(
        transport: UdpTransport,
        bursts: Vec<ScheduledBurst>,
        options: ReplayOptions,
        skipped_rows: u64,
    ) -> Self {
        Player {
            transport,
            bursts,
            options,
            skipped_rows,
        }
    }

    pub async fn run(self, subsys: SubsystemHandle) -> Result<(), RecordingError> {
        let total_ms = self.bursts.last().map(|b| b.offset_ms).unwrap_or(0);
        info!(
            "Replaying {} datagrams to {} over {:.1} s at {}x",
            datagram_count(&self.bursts),
            self.options.destination,
            total_ms as f64 / 1000.0 / clamp_speed(self.options.speed),
            clamp_speed(self.options.speed)
        );

        let cancel = CancellationToken::new();
        let mut report = {
            let replay = run_replay(&self.transport, &self.bursts, &self.options, &cancel);
            tokio::pin!(replay);

            tokio::select! {
                report = &mut replay => report,
                _ = subsys.on_shutdown_requested() => {
                    cancel.cancel();
                    replay.await
                }
            }
        };
        report.skipped_rows = self.skipped_rows;

        if report.cancelled {
            info!("Replay stopped after {} of {} bursts", report.bursts_sent, self.bursts.len());
        }
        info!(
            "Replay finished: {} datagrams sent, {} send failures, {} malformed rows skipped",
            report.datagrams_sent, report.send_failures, report.skipped_rows
        );

        self.transport.close();
        subsys.request_shutdown();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{load_log, CsvLogTarget};
    use rewinger_core::protocol::{decode, AircraftMetadata};
    use rewinger_core::{build_schedule, RecorderEngine, ReplayMode};
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::TempDir;

    fn burst(offset_ms: u64, line: &str) -> ScheduledBurst {
        ScheduledBurst {
            offset_ms,
            lines: vec![line.to_string()],
        }
    }

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    /// Collect `count` datagrams with their arrival times
    async fn collect(
        receiver: UdpTransport,
        count: usize,
    ) -> Vec<(std::time::Instant, String)> {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        while out.len() < count {
            match receiver.receive(&mut buf, Duration::from_secs(5)).await {
                Ok(Some((len, _))) => out.push((
                    std::time::Instant::now(),
                    String::from_utf8_lossy(&buf[..len]).into_owned(),
                )),
                _ => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn test_replay_timing() {
        let receiver = UdpTransport::bind(localhost()).unwrap();
        let options = ReplayOptions {
            destination: receiver.local_addr(),
            speed: 1.0,
        };
        let collector = tokio::spawn(collect(receiver, 3));

        let sender = UdpTransport::sender().unwrap();
        let bursts = vec![burst(0, "A"), burst(1000, "B"), burst(1500, "C")];
        let report = run_replay(&sender, &bursts, &options, &CancellationToken::new()).await;
        assert_eq!(report.datagrams_sent, 3);
        assert_eq!(report.send_failures, 0);
        assert!(!report.cancelled);

        let received = collector.await.unwrap();
        assert_eq!(received.len(), 3);
        let lines: Vec<&str> = received.iter().map(|(_, l)| l.as_str()).collect();
        assert_eq!(lines, vec!["A", "B", "C"]);

        let gap1 = received[1].0 - received[0].0;
        let gap2 = received[2].0 - received[1].0;
        assert!(
            gap1 >= Duration::from_millis(950) && gap1 <= Duration::from_millis(1050),
            "first gap {:?}",
            gap1
        );
        assert!(
            gap2 >= Duration::from_millis(450) && gap2 <= Duration::from_millis(550),
            "second gap {:?}",
            gap2
        );
    }

    #[tokio::test]
    async fn test_replay_speed() {
        let receiver = UdpTransport::bind(localhost()).unwrap();
        let options = ReplayOptions {
            destination: receiver.local_addr(),
            speed: 4.0,
        };
        let collector = tokio::spawn(collect(receiver, 2));

        let sender = UdpTransport::sender().unwrap();
        let bursts = vec![burst(0, "A"), burst(1000, "B")];
        run_replay(&sender, &bursts, &options, &CancellationToken::new()).await;

        let received = collector.await.unwrap();
        let gap = received[1].0 - received[0].0;
        assert!(
            gap >= Duration::from_millis(200) && gap <= Duration::from_millis(300),
            "gap {:?}",
            gap
        );
    }

    #[tokio::test]
    async fn test_replay_cancel_between_bursts() {
        let receiver = UdpTransport::bind(localhost()).unwrap();
        let options = ReplayOptions {
            destination: receiver.local_addr(),
            speed: 1.0,
        };
        let sender = UdpTransport::sender().unwrap();
        let bursts = vec![burst(0, "A"), burst(10_000, "B")];

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let report = run_replay(&sender, &bursts, &options, &cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.bursts_sent, 1);
        assert_eq!(report.datagrams_sent, 1);
        assert!(report.elapsed_ms < 5_000);
    }

    #[tokio::test]
    async fn test_send_failures_are_counted() {
        let sender = UdpTransport::sender().unwrap();
        // An IPv6 destination cannot be reached from an IPv4 socket
        let options = ReplayOptions {
            destination: "[::1]:49002".parse().unwrap(),
            speed: 1.0,
        };
        let bursts = vec![burst(0, "A"), burst(10, "B")];
        let report = run_replay(&sender, &bursts, &options, &CancellationToken::new()).await;
        assert_eq!(report.bursts_sent, 2);
        assert_eq!(report.datagrams_sent, 0);
        assert_eq!(report.send_failures, 2);
    }

    #[tokio::test]
    async fn test_record_then_replay_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("roundtrip.csv");

        let mut engine =
            RecorderEngine::new(CsvLogTarget::new(&path), AircraftMetadata::default());
        engine.arm().unwrap();
        for (line, at) in [
            ("XGPS,12.34,56.78,100,90,10", 10_000),
            ("XGPS,0,0,100,90,10", 10_250),
            ("XGPS,12.35,56.79,110,91,11", 10_500),
        ] {
            engine.on_message(decode(line).unwrap(), at).unwrap();
        }
        engine.stop().unwrap();

        let log = load_log(&path, true).unwrap();
        assert_eq!(log.record_count(), 2);

        let bursts = build_schedule(&log.entries, ReplayMode::Gps, &AircraftMetadata::default());
        let receiver = UdpTransport::bind(localhost()).unwrap();
        let options = ReplayOptions {
            destination: receiver.local_addr(),
            speed: 1.0,
        };
        let collector = tokio::spawn(collect(receiver, 2));
        let sender = UdpTransport::sender().unwrap();
        run_replay(&sender, &bursts, &options, &CancellationToken::new()).await;

        let lines: Vec<String> = collector.await.unwrap().into_iter().map(|(_, l)| l).collect();
        assert_eq!(
            lines,
            vec![
                "XGPS,12.34,56.78,100,90,10".to_string(),
                "XGPS,12.35,56.79,110,91,11".to_string()
            ]
        );
    }
}
