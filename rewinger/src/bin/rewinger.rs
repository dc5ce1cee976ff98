use clap::Parser;
use log::info;
use miette::{IntoDiagnostic, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

use rewinger::console::Console;
use rewinger::network::UdpTransport;
use rewinger::recording::{self, default_log_path, CsvLogTarget};
use rewinger::{init_logging, Cli, VERSION};
use rewinger_core::RecorderEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_logging(&args.verbose);
    info!("rewinger {} starting", VERSION);

    let log_path = args.log.clone().unwrap_or_else(default_log_path);

    // A port that cannot be bound is fatal before anything else starts
    let transport = UdpTransport::bind(SocketAddr::new(args.bind, args.port)).into_diagnostic()?;
    info!(
        "Listening on {}, appending to {}",
        transport.local_addr(),
        log_path.display()
    );

    let mut engine = RecorderEngine::new(
        CsvLogTarget::new(&log_path),
        args.metadata.clone().into_metadata(),
    );
    if args.arm {
        engine.arm().into_diagnostic()?;
        info!("Armed, recording starts at the first valid fix");
    }

    Toplevel::new(move |s| async move {
        let handle = recording::recorder::start(&s, transport, engine);
        let console = Console::new(handle);
        s.start(SubsystemBuilder::new("Console", move |s: SubsystemHandle| {
            console.run(s)
        }));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .into_diagnostic()
}
