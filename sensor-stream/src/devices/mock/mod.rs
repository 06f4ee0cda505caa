//! Simulated sensor source for running without hardware
//!
//! [`MockSensorSource`] produces every subscribed channel on its own thread,
//! so samples reach the pipeline concurrently and in no fixed order, the
//! same way independent hardware sensors report.
//!
//! # Configuration
//!
//! ```toml
//! [source]
//! type = "mock"
//! rate_hz = 50.0        # per channel
//! random_seed = 42      # 0 = random each run
//! noise_stddev = 0.02
//! ```
//!
//! # Thread Model
//!
//! ```text
//!              subscribe()
//!                  │ spawns one per channel
//!       ┌──────────┼──────────┐
//!       ▼          ▼          ▼
//! ┌──────────┐┌──────────┐┌──────────┐
//! │mock-accel││mock-gyro ││mock-...  │──▶ SampleCallback
//! └──────────┘└──────────┘└──────────┘
//! ```
//!
//! Each thread starts after a short random delay so channels drift in and
//! out of phase with each other. `unsubscribe()` raises the shutdown flag
//! and joins every thread.

mod motion_sim;
mod noise;

use crate::config::SourceConfig;
use crate::core::source::{SampleCallback, SensorSource};
use crate::core::types::{ChannelId, SensorSample};
use crate::error::{Error, Result};
use crate::fusion::layout::{ChannelSpec, MAX_DIMENSION};

use motion_sim::ChannelSignal;
use noise::NoiseGenerator;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Longest single sleep, bounds how long `unsubscribe` waits on a thread
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Simulated multi-channel motion sensor
pub struct MockSensorSource {
    config: SourceConfig,
    period: Duration,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl MockSensorSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let period = config.sample_period()?;
        Ok(Self {
            config,
            period,
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Vec::new(),
        })
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    fn check_channel(spec: &ChannelSpec) -> Result<()> {
        let producible = if spec.converter.is_quaternion() {
            3..=4
        } else {
            1..=MAX_DIMENSION
        };
        if producible.contains(&spec.dimension) {
            Ok(())
        } else {
            Err(Error::Source(format!(
                "cannot produce {} values for channel '{}' (supported: {}-{})",
                spec.dimension,
                spec.name,
                producible.start(),
                producible.end()
            )))
        }
    }

    fn stop_threads(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::error!("Mock channel thread panicked");
            }
        }
    }
}

impl SensorSource for MockSensorSource {
    fn subscribe(&mut self, channels: &[ChannelSpec], callback: SampleCallback) -> Result<()> {
        if self.is_running() {
            return Err(Error::Source("mock source already subscribed".to_string()));
        }
        for spec in channels {
            Self::check_channel(spec)?;
        }

        // Fresh flag per subscription so late threads from a previous run
        // cannot observe a cleared flag
        self.shutdown = Arc::new(AtomicBool::new(false));
        let period = self.period;
        let mut jitter = NoiseGenerator::new(self.config.random_seed);

        for spec in channels {
            let signal = ChannelSignal::new(
                spec,
                NoiseGenerator::for_channel(self.config.random_seed, spec.id.index()),
                self.config.noise_stddev,
            );
            let start_delay = period.mul_f32(jitter.uniform());
            let shutdown = Arc::clone(&self.shutdown);
            let callback = Arc::clone(&callback);
            let channel = spec.id;

            let spawned = thread::Builder::new()
                .name(format!("mock-{}", spec.name))
                .spawn(move || {
                    channel_loop(channel, signal, period, start_delay, shutdown, callback);
                });

            match spawned {
                Ok(handle) => self.handles.push(handle),
                Err(e) => {
                    self.stop_threads();
                    return Err(Error::Source(format!(
                        "failed to spawn thread for channel '{}': {}",
                        spec.name, e
                    )));
                }
            }
        }

        log::info!(
            "Mock source producing {} channel(s) at {:.1} Hz",
            channels.len(),
            self.config.rate_hz
        );
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<()> {
        if self.is_running() {
            self.stop_threads();
            log::info!("Mock source stopped");
        }
        Ok(())
    }
}

impl Drop for MockSensorSource {
    fn drop(&mut self) {
        self.stop_threads();
    }
}

fn channel_loop(
    channel: ChannelId,
    mut signal: ChannelSignal,
    period: Duration,
    start_delay: Duration,
    shutdown: Arc<AtomicBool>,
    callback: SampleCallback,
) {
    let epoch = Instant::now();
    let mut next = epoch + start_delay;

    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now < next {
            thread::sleep((next - now).min(SHUTDOWN_POLL));
            continue;
        }

        let t = (now - epoch).as_secs_f32();
        callback(SensorSample::new(channel, signal.sample(t)));

        next += period;
        // Fell far behind (suspended or overloaded): skip ahead instead of bursting
        if next + period < now {
            next = now + period;
        }
    }

    log::debug!("Mock channel {} exiting", channel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AngleUnit, Converter};
    use crate::fusion::layout::{ChannelDef, FrameLayout};
    use parking_lot::Mutex;

    fn source(rate_hz: f32) -> MockSensorSource {
        MockSensorSource::new(SourceConfig {
            source_type: "mock".to_string(),
            rate_hz,
            random_seed: 42,
            noise_stddev: 0.0,
        })
        .unwrap()
    }

    fn layout() -> FrameLayout {
        FrameLayout::define(vec![
            ChannelDef::identity("accel", 3),
            ChannelDef::new(
                "rotation",
                4,
                Converter::Quaternion {
                    unit: AngleUnit::Radians,
                    passthrough: false,
                },
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_rejects_out_of_range_rate() {
        for rate_hz in [0.0, -1.0, 1e-30, 1e30, f32::NAN] {
            let result = MockSensorSource::new(SourceConfig {
                rate_hz,
                ..SourceConfig::default()
            });
            assert!(matches!(result, Err(Error::Config(_))), "rate {} accepted", rate_hz);
        }
    }

    #[test]
    fn test_delivers_every_channel_at_its_dimension() {
        let layout = layout();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: SampleCallback = Arc::new(move |sample: SensorSample| {
            sink.lock().push((sample.channel, sample.values.len()));
        });

        let mut src = source(200.0);
        src.subscribe(layout.channels(), callback).unwrap();
        thread::sleep(Duration::from_millis(100));
        src.unsubscribe().unwrap();

        let seen = seen.lock();
        assert!(seen.contains(&(ChannelId(0), 3)));
        assert!(seen.contains(&(ChannelId(1), 4)));
        assert!(seen.iter().all(|&(id, len)| layout.channel(id).unwrap().dimension == len));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let layout = layout();
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let callback: SampleCallback = Arc::new(move |_: SensorSample| *sink.lock() += 1);

        let mut src = source(500.0);
        src.subscribe(layout.channels(), callback).unwrap();
        thread::sleep(Duration::from_millis(50));
        src.unsubscribe().unwrap();
        assert!(!src.is_running());

        let after_stop = *count.lock();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*count.lock(), after_stop);
    }

    #[test]
    fn test_double_subscribe_rejected() {
        let layout = layout();
        let callback: SampleCallback = Arc::new(|_: SensorSample| {});
        let mut src = source(50.0);
        src.subscribe(layout.channels(), Arc::clone(&callback)).unwrap();
        let second = src.subscribe(layout.channels(), callback);
        assert!(matches!(second, Err(Error::Source(_))));
        src.unsubscribe().unwrap();
    }

    #[test]
    fn test_unproducible_dimension_fails_before_threads_start() {
        let bad = ChannelSpec {
            id: ChannelId(0),
            name: "orientation".to_string(),
            dimension: 2,
            converter: Converter::Quaternion {
                unit: AngleUnit::Radians,
                passthrough: false,
            },
            byte_offset: 0,
        };
        let callback: SampleCallback = Arc::new(|_: SensorSample| {});
        let mut src = source(50.0);
        let err = src.subscribe(&[bad], callback).unwrap_err();
        assert!(matches!(err, Error::Source(ref msg) if msg.contains("orientation")));
        assert!(!src.is_running());
    }

    #[test]
    fn test_unsubscribe_when_idle() {
        let mut src = source(50.0);
        assert!(src.unsubscribe().is_ok());
    }
}
