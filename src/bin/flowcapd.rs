//! Process entrypoint: loads configuration, wires a capture loop to a
//! publisher, installs cooperative signal handling, and runs until told to
//! stop.
//!
//! Composition grounded on `examples/original_source/src/main.py`'s
//! `NetworkCaptureApplication`; SIGINT/SIGTERM wiring grounded on
//! `daily-co-synthetic-network`'s `rush` binary's use of `signal_hook::flag`.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag as signal_flag;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flowcap::capture::CaptureLoop;
use flowcap::config::Config;
use flowcap::driver::MockDriverAdapter;
use flowcap::publisher::{MockBusClient, Publisher};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn config_path() -> String {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return path;
            }
        } else if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = config_path();
    let config = match Config::load(&path) {
        Ok(config) => config,
        Err(err) => {
            error!(path = %path, error = %err, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    // No real DriverAdapter binding is fabricated for this crate (see
    // DESIGN.md); the in-memory mock stands in until one is plugged in.
    let driver = MockDriverAdapter::new();
    let mut capture = CaptureLoop::new(driver, config.capture.clone());

    let term = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        if let Err(err) = signal_flag::register(signal, Arc::clone(&term)) {
            error!(signal, error = %err, "failed to register signal handler");
            return ExitCode::FAILURE;
        }
    }
    let stop = capture.stop_flag();
    std::thread::spawn(move || {
        while !term.load(std::sync::atomic::Ordering::Relaxed) {
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    if let Err(err) = capture.initialize() {
        error!(error = %err, "failed to initialize capture loop");
        return ExitCode::FAILURE;
    }

    let mut publisher = Publisher::new(MockBusClient::default());
    info!(
        topic = %config.bus.topic,
        bootstrap_servers = %config.bus.bootstrap_servers,
        "starting flowcapd"
    );

    let result = capture.run(|feature_vector| {
        publisher.emit(&feature_vector);
    });

    let capture_stats = capture.stats();
    let publisher_stats = publisher.stats();
    info!(
        runtime_secs = capture_stats.runtime_secs,
        packets_captured = capture_stats.packets_captured,
        avg_packets_per_second = capture_stats.avg_packets_per_second,
        messages_sent = publisher_stats.messages_sent,
        publish_errors = publisher_stats.errors,
        "final statistics"
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "capture loop terminated with an error");
            ExitCode::FAILURE
        }
    }
}
