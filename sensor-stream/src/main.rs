//! SensorStream daemon
//!
//! Streams frames from the configured sensor source to a remote collector.
//! Reads one command per line from stdin:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `connect` | Open the connection to the configured collector |
//! | `disconnect` | Close it |
//! | `start` | Subscribe to the sensor source and begin building frames |
//! | `stop` | Unsubscribe |
//! | `status` | Print counters and connection state |
//! | `quit` | Stop, disconnect and exit |
//!
//! Connection notifications are printed as they arrive.

use crossbeam_channel::{Receiver, select, tick, unbounded};
use sensor_stream::config::Config;
use sensor_stream::error::{Error, Result};
use sensor_stream::pipeline::Pipeline;
use std::env;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// How often the main loop checks the shutdown flag and stalls
const TICK: Duration = Duration::from_millis(200);

enum Event {
    Command(String),
    Tick,
    Closed,
}

/// Parse config path from command line arguments.
///
/// Supports:
/// - `sensor-stream <path>` (positional)
/// - `sensor-stream --config <path>` (flag-based)
/// - `sensor-stream -c <path>` (short flag)
///
/// Defaults to `sensor-stream.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "sensor-stream.toml".to_string()
}

/// Forward stdin lines to the main loop. Sends `quit` on EOF.
fn spawn_command_reader() -> Result<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim().to_lowercase();
                if !line.is_empty() && tx.send(line).is_err() {
                    return;
                }
            }
            let _ = tx.send("quit".to_string());
        })?;
    Ok(rx)
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let loaded = Config::load(&config_path);

    // Configured level is the default; RUST_LOG still wins
    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("SensorStream v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);
    let config = loaded?;

    let mut pipeline = Pipeline::from_config(&config)?;
    log::info!(
        "Frame layout: {} | collector {}",
        pipeline.layout().describe(),
        config.network.address()
    );

    // Notification printer exits once the client (and its notifier) is dropped
    let notifications = pipeline.subscribe();
    let printer = thread::Builder::new()
        .name("notifications".to_string())
        .spawn(move || {
            for notification in notifications.iter() {
                println!("{}", notification);
            }
        })?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let commands = spawn_command_reader()?;
    let ticker = tick(TICK);
    let status_interval = Duration::from_secs(config.logging.status_interval_secs);
    let mut last_status = Instant::now();

    println!("Commands: connect, disconnect, start, stop, status, quit");

    while running.load(Ordering::Relaxed) {
        let event = select! {
            recv(commands) -> line => line.map_or(Event::Closed, Event::Command),
            recv(ticker) -> _ => Event::Tick,
        };

        match event {
            Event::Command(line) => {
                let status = match line.as_str() {
                    "connect" => pipeline.connect(),
                    "disconnect" => pipeline.disconnect(),
                    "start" => pipeline.start(),
                    "stop" => pipeline.stop(),
                    "status" => {
                        println!("{}", pipeline.stats());
                        continue;
                    }
                    "quit" | "exit" => break,
                    other => {
                        println!("Unknown command '{}'", other);
                        continue;
                    }
                };
                println!("{}: {}", line, status);
            }
            Event::Tick => {
                pipeline.poll_stall();
                if !status_interval.is_zero() && last_status.elapsed() >= status_interval {
                    log::info!("{}", pipeline.stats());
                    last_status = Instant::now();
                }
            }
            Event::Closed => break,
        }
    }

    log::info!("Shutting down...");
    pipeline.stop();
    pipeline.disconnect();
    drop(pipeline);

    if printer.join().is_err() {
        log::error!("Notification printer panicked");
    }

    log::info!("SensorStream stopped");
    Ok(())
}
