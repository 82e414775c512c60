use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use devicebridge::{
    BridgeConfig, DebugEvent, DeviceBridge, JsonAppCatalog, LogSink, SessionEnd, SessionResult,
};
use gdb_remote::TcpStubConnector;
use signal_hook::iterator::Signals;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "devicebridge",
    about = "Launch and monitor an installed app through a GDB-remote debug stub",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "DEVICEBRIDGE_STUB",
        default_value = "127.0.0.1:2331",
        help = "host:port where the device's debug stub is reachable"
    )]
    stub: String,

    #[arg(
        long,
        env = "DEVICEBRIDGE_CATALOG",
        help = "JSON file mapping bundle ids to Container, Path and CFBundleExecutable"
    )]
    catalog: PathBuf,

    #[arg(long = "bundle-id", help = "Bundle id of the app to launch")]
    bundle_id: String,

    #[arg(
        long = "env",
        default_value = "",
        allow_hyphen_values = true,
        help = "Whitespace-separated KEY=VALUE entries for the launched process"
    )]
    environment: String,

    #[arg(
        long = "args",
        default_value = "",
        allow_hyphen_values = true,
        help = "Whitespace-separated arguments for the launched process"
    )]
    arguments: String,

    #[arg(long, help = "Detach right after a successful launch")]
    detach: bool,

    #[arg(
        long = "connect-timeout-ms",
        default_value_t = 5000,
        help = "How long to wait for the stub connection"
    )]
    connect_timeout_ms: u64,
}

fn main() -> ExitCode {
    setup_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("devicebridge: {message}");
            ExitCode::FAILURE
        }
    }
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<ExitCode, String> {
    let config = BridgeConfig::from_env().map_err(|error| error.to_string())?;
    let catalog = JsonAppCatalog::load(&cli.catalog).map_err(|error| error.to_string())?;
    if catalog.is_empty() {
        warn!(path = %cli.catalog.display(), "app catalog has no entries");
    } else {
        info!(apps = catalog.len(), path = %cli.catalog.display(), "loaded app catalog");
    }

    let connector = TcpStubConnector::new(cli.stub.clone())
        .with_connect_timeout(Duration::from_millis(cli.connect_timeout_ms.max(1)));
    debug!(stub = connector.address(), "using debug stub");
    let sink: Arc<dyn LogSink> = Arc::new(print_event);
    let bridge = Arc::new(
        DeviceBridge::new(Arc::new(connector), Arc::new(catalog), sink, config)
            .map_err(|error| format!("could not start worker pool: {error}"))?,
    );

    let mut signals = Signals::new([libc::SIGINT, libc::SIGTERM])
        .map_err(|error| format!("could not register signal handlers: {error}"))?;
    let signal_handle = signals.handle();
    let stopper = Arc::clone(&bridge);
    let signal_thread = thread::spawn(move || {
        for signal in signals.forever() {
            debug!(signal, "stop signal received");
            stopper.stop_debugging();
        }
    });

    let ticket = bridge.start_debugging(
        &cli.bundle_id,
        cli.detach,
        &cli.environment,
        &cli.arguments,
    );
    let result = ticket.wait();

    signal_handle.close();
    let _ = signal_thread.join();

    Ok(exit_code(result))
}

fn print_event(event: DebugEvent) {
    match event {
        DebugEvent::Output(text) => print!("{text}"),
        DebugEvent::SessionFailed(message) => eprintln!("{message}"),
        other => println!("{other}"),
    }
}

fn exit_code(result: SessionResult) -> ExitCode {
    match result {
        Ok(report) => {
            info!(end = ?report.end, status = ?report.exit_status, "session ended");
            match (report.end, report.exit_status) {
                (_, Some(status)) => {
                    ExitCode::from(u8::try_from(status.rem_euclid(256)).unwrap_or(1))
                }
                (SessionEnd::ReceiveFailed(_), None) => ExitCode::FAILURE,
                (_, None) => ExitCode::SUCCESS,
            }
        }
        Err(session_error) => {
            error!(%session_error, "session failed");
            ExitCode::FAILURE
        }
    }
}
