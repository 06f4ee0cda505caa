//! Pipeline: wires a sensor source through the aggregator into the stream client.
//!
//! ```text
//! SensorSource threads ──▶ SampleAggregator ──▶ TelemetryStreamClient ──▶ TCP
//!        (callback)          (one mutex)          (stream-writer thread)
//! ```
//!
//! Streaming (`start`/`stop`) and connectivity (`connect`/`disconnect`) are
//! independent: frames completed while not connected are counted and
//! dropped, and a connection without an active source simply carries
//! nothing.
//!
//! A sample whose width disagrees with its channel is a configuration bug.
//! It faults the pipeline: sampling stops and `start` is refused from then on.

use crate::config::Config;
use crate::core::source::{SampleCallback, SensorSource};
use crate::core::types::{CommandStatus, SensorSample};
use crate::error::{Error, Result};
use crate::fusion::aggregator::{AggregatorStats, SampleAggregator, SampleOutcome};
use crate::fusion::layout::FrameLayout;
use crate::streaming::client::{ClientStats, TelemetryStreamClient};
use crate::streaming::notify::{ConnectionState, Notification};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// State shared with the sample callback
struct Shared {
    active: AtomicBool,
    fault: Mutex<Option<String>>,
    frames_unsent: AtomicU64,
    samples_rejected: AtomicU64,
}

/// Point-in-time view of the whole pipeline
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub active: bool,
    pub connection: ConnectionState,
    pub fault: Option<String>,
    /// Completed frames dropped because no connection was up
    pub frames_unsent: u64,
    /// Samples refused by the aggregator
    pub samples_rejected: u64,
    pub aggregator: AggregatorStats,
    pub client: ClientStats,
}

impl fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | frames: {} emitted, {} sent, {} unsent, {} dropped | samples: {} accepted, {} discarded, {} replaced | stalls: {}",
            if self.active { "streaming" } else { "idle" },
            self.connection,
            self.aggregator.frames_emitted,
            self.client.frames_sent,
            self.frames_unsent,
            self.client.frames_dropped,
            self.aggregator.samples_accepted,
            self.aggregator.samples_discarded,
            self.aggregator.samples_replaced,
            self.aggregator.stalls,
        )?;
        if !self.aggregator.missing_channels.is_empty() {
            write!(f, " | waiting on: {}", self.aggregator.missing_channels.join(", "))?;
        }
        if let Some(fault) = &self.fault {
            write!(f, " | FAULT: {}", fault)?;
        }
        Ok(())
    }
}

/// Composition root owning the source, aggregator and client
pub struct Pipeline {
    layout: Arc<FrameLayout>,
    aggregator: Arc<SampleAggregator>,
    client: Arc<TelemetryStreamClient>,
    source: Box<dyn SensorSource>,
    shared: Arc<Shared>,
    address: String,
    connect_timeout: Duration,
}

impl Pipeline {
    /// Build a pipeline for `config` fed by `source`
    pub fn new(config: &Config, source: Box<dyn SensorSource>) -> Result<Self> {
        let layout = Arc::new(config.frame_layout()?);
        let aggregator = Arc::new(SampleAggregator::new(
            Arc::clone(&layout),
            config.frame.readiness,
            config.frame.stall_warn(),
        ));
        let client = Arc::new(TelemetryStreamClient::new(config.network.client_config())?);

        log::info!(
            "Pipeline ready: {} ({:?}), collector {}",
            layout.describe(),
            config.frame.readiness,
            config.network.address()
        );

        Ok(Self {
            layout,
            aggregator,
            client,
            source,
            shared: Arc::new(Shared {
                active: AtomicBool::new(false),
                fault: Mutex::new(None),
                frames_unsent: AtomicU64::new(0),
                samples_rejected: AtomicU64::new(0),
            }),
            address: config.network.address(),
            connect_timeout: config.network.connect_timeout(),
        })
    }

    /// Build a pipeline with the source named in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = crate::devices::create_source(&config.source)?;
        Self::new(config, source)
    }

    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn fault(&self) -> Option<String> {
        self.shared.fault.lock().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Connection notifications (see [`Notification`])
    pub fn subscribe(&self) -> Receiver<Notification> {
        self.client.subscribe()
    }

    /// Connect to the configured collector (asynchronous)
    pub fn connect(&self) -> CommandStatus {
        self.client.connect(&self.address, self.connect_timeout)
    }

    pub fn disconnect(&self) -> CommandStatus {
        self.client.disconnect()
    }

    /// Subscribe to the source and begin aggregating
    pub fn start(&mut self) -> CommandStatus {
        if let Some(fault) = self.fault() {
            return CommandStatus::Failed(format!("pipeline faulted: {}", fault));
        }
        if self.is_active() {
            return CommandStatus::AlreadyInState;
        }

        self.aggregator.reset();
        self.shared.active.store(true, Ordering::Release);

        let callback = self.sample_callback();
        if let Err(e) = self.source.subscribe(self.layout.channels(), callback) {
            self.shared.active.store(false, Ordering::Release);
            if matches!(e, Error::ChannelDimensionMismatch { .. }) {
                self.raise_fault(&e);
            }
            log::error!("Failed to start sensor source: {}", e);
            return CommandStatus::Failed(e.to_string());
        }

        log::info!("Streaming started");
        CommandStatus::Ok
    }

    /// Unsubscribe from the source and drop the partial cycle
    pub fn stop(&mut self) -> CommandStatus {
        // A fault already cleared the flag but the source may still be subscribed
        let was_active = self.shared.active.swap(false, Ordering::AcqRel);
        if !was_active && self.fault().is_none() {
            return CommandStatus::AlreadyInState;
        }

        let result = self.source.unsubscribe();
        self.aggregator.reset();
        match result {
            Ok(()) => {
                log::info!("Streaming stopped");
                if was_active {
                    CommandStatus::Ok
                } else {
                    CommandStatus::AlreadyInState
                }
            }
            Err(e) => {
                log::error!("Failed to stop sensor source: {}", e);
                CommandStatus::Failed(e.to_string())
            }
        }
    }

    /// Report a stalled cycle even when no samples are arriving
    pub fn poll_stall(&self) -> bool {
        self.is_active() && self.aggregator.poll_stall()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            active: self.is_active(),
            connection: self.client.state(),
            fault: self.fault(),
            frames_unsent: self.shared.frames_unsent.load(Ordering::Relaxed),
            samples_rejected: self.shared.samples_rejected.load(Ordering::Relaxed),
            aggregator: self.aggregator.stats(),
            client: self.client.stats(),
        }
    }

    fn raise_fault(&self, error: &Error) {
        let mut fault = self.shared.fault.lock();
        if fault.is_none() {
            *fault = Some(error.to_string());
        }
    }

    fn sample_callback(&self) -> SampleCallback {
        let aggregator = Arc::clone(&self.aggregator);
        let client = Arc::clone(&self.client);
        let shared = Arc::clone(&self.shared);

        Arc::new(move |sample: SensorSample| {
            if !shared.active.load(Ordering::Acquire) {
                return;
            }

            match aggregator.on_sample(sample.channel, &sample.values) {
                Ok(SampleOutcome::Completed(frame)) => match client.send(frame) {
                    Ok(()) => {}
                    Err(Error::NotConnected) => {
                        shared.frames_unsent.fetch_add(1, Ordering::Relaxed);
                    }
                    // Counted by the client
                    Err(Error::SendQueueFull) => {}
                    Err(e) => log::warn!("Frame send failed: {}", e),
                },
                Ok(_) => {}
                Err(e @ Error::ChannelDimensionMismatch { .. }) => {
                    shared.samples_rejected.fetch_add(1, Ordering::Relaxed);
                    // Only the first thread to flip the flag reports the fault
                    if shared.active.swap(false, Ordering::AcqRel) {
                        log::error!("Pipeline faulted, sampling halted: {}", e);
                        let mut fault = shared.fault.lock();
                        if fault.is_none() {
                            *fault = Some(e.to_string());
                        }
                    }
                }
                Err(e) => {
                    shared.samples_rejected.fetch_add(1, Ordering::Relaxed);
                    log::warn!("Sample rejected: {}", e);
                }
            }
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shared.active.store(false, Ordering::Release);
        if let Err(e) = self.source.unsubscribe() {
            log::warn!("Sensor source did not stop cleanly: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ChannelId;
    use crate::fusion::layout::ChannelSpec;

    /// Source that hands the callback back to the test
    #[derive(Default)]
    struct ManualSource {
        callback: Arc<Mutex<Option<SampleCallback>>>,
        fail_with: Option<fn() -> Error>,
    }

    impl SensorSource for ManualSource {
        fn subscribe(&mut self, _channels: &[ChannelSpec], callback: SampleCallback) -> Result<()> {
            if let Some(make) = self.fail_with {
                return Err(make());
            }
            *self.callback.lock() = Some(callback);
            Ok(())
        }

        fn unsubscribe(&mut self) -> Result<()> {
            self.callback.lock().take();
            Ok(())
        }
    }

    const CONFIG: &str = r#"
[network]
host = "127.0.0.1"
port = 9

[frame]
stall_warn_ms = 0

[[frame.channels]]
name = "accel"
dimension = 3

[[frame.channels]]
name = "gyro"
dimension = 3
"#;

    fn pipeline() -> (Pipeline, Arc<Mutex<Option<SampleCallback>>>) {
        let source = ManualSource::default();
        let handle = Arc::clone(&source.callback);
        let config = Config::from_toml(CONFIG).unwrap();
        (Pipeline::new(&config, Box::new(source)).unwrap(), handle)
    }

    fn push(handle: &Arc<Mutex<Option<SampleCallback>>>, channel: usize, values: &[f32]) {
        let callback = handle.lock().clone().expect("not subscribed");
        callback(SensorSample::new(ChannelId(channel), values.to_vec()));
    }

    #[test]
    fn test_start_stop_statuses() {
        let (mut pipeline, _) = pipeline();
        assert_eq!(pipeline.stop(), CommandStatus::AlreadyInState);
        assert_eq!(pipeline.start(), CommandStatus::Ok);
        assert_eq!(pipeline.start(), CommandStatus::AlreadyInState);
        assert_eq!(pipeline.stop(), CommandStatus::Ok);
        assert_eq!(pipeline.stop(), CommandStatus::AlreadyInState);
    }

    #[test]
    fn test_frames_counted_while_disconnected() {
        let (mut pipeline, handle) = pipeline();
        pipeline.start();

        push(&handle, 0, &[1.0, 2.0, 3.0]);
        push(&handle, 1, &[0.0, 0.0, 0.0]);

        let stats = pipeline.stats();
        assert_eq!(stats.aggregator.frames_emitted, 1);
        assert_eq!(stats.frames_unsent, 1);
        assert_eq!(stats.client.frames_sent, 0);
    }

    #[test]
    fn test_dimension_mismatch_faults() {
        let (mut pipeline, handle) = pipeline();
        pipeline.start();

        push(&handle, 0, &[1.0, 2.0]);
        assert!(!pipeline.is_active());
        assert!(pipeline.fault().unwrap().contains("accel"));

        // Further samples are ignored
        push(&handle, 0, &[1.0, 2.0, 3.0]);
        assert_eq!(pipeline.stats().aggregator.samples_accepted, 0);

        assert!(matches!(pipeline.start(), CommandStatus::Failed(_)));
        assert_eq!(pipeline.stop(), CommandStatus::AlreadyInState);
    }

    #[test]
    fn test_subscribe_failure_reported() {
        let source = ManualSource {
            fail_with: Some(|| Error::Source("sensor unavailable".to_string())),
            ..ManualSource::default()
        };
        let config = Config::from_toml(CONFIG).unwrap();
        let mut pipeline = Pipeline::new(&config, Box::new(source)).unwrap();

        assert!(matches!(pipeline.start(), CommandStatus::Failed(_)));
        assert!(!pipeline.is_active());
        assert!(pipeline.fault().is_none());
    }

    #[test]
    fn test_stop_resets_partial_cycle() {
        let (mut pipeline, handle) = pipeline();
        pipeline.start();
        push(&handle, 0, &[1.0, 2.0, 3.0]);
        assert_eq!(pipeline.stats().aggregator.missing_channels, vec!["gyro"]);

        pipeline.stop();
        assert!(pipeline.stats().aggregator.missing_channels.is_empty());
    }

    #[test]
    fn test_disconnect_when_idle() {
        let (pipeline, _) = pipeline();
        assert_eq!(pipeline.disconnect(), CommandStatus::AlreadyInState);
        assert_eq!(pipeline.connection_state(), ConnectionState::Disconnected);
    }
}
