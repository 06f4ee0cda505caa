//! Configuration for SensorStream
//!
//! Loads configuration from a TOML file. The collector address has no
//! built-in default and must always be configured.
//!
//! ```toml
//! [network]
//! host = "10.0.0.157"
//! port = 1234
//!
//! [frame]
//! readiness = "first_wins"
//!
//! [[frame.channels]]
//! name = "accel"
//! dimension = 3
//!
//! [[frame.channels]]
//! name = "gyro"
//! dimension = 3
//! converter = "quaternion"
//! angle_unit = "radians"
//!
//! [source]
//! type = "mock"
//! ```

use crate::core::types::{AngleUnit, Converter};
use crate::error::{Error, Result};
use crate::fusion::aggregator::ReadinessPolicy;
use crate::fusion::layout::{ChannelDef, FrameLayout};
use crate::streaming::client::StreamClientConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub frame: FrameConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Collector connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Collector host name or IP address
    pub host: String,

    /// Collector TCP port
    pub port: u16,

    /// Give up on a connect attempt after this long
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Tear the connection down if a single write blocks this long
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Frames allowed to wait for the writer thread
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

/// Frame layout and aggregation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FrameConfig {
    /// What to do with a second sample for a channel already ready this cycle
    #[serde(default)]
    pub readiness: ReadinessPolicy,

    /// Warn when a cycle stays incomplete this long (0 disables)
    #[serde(default = "default_stall_warn_ms")]
    pub stall_warn_ms: u64,

    /// Channels in frame order
    pub channels: Vec<ChannelConfig>,
}

/// Conversion applied to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConverterKind {
    #[default]
    Identity,
    Quaternion,
}

/// One channel of the frame
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    pub name: String,

    /// Input values per sample (1-4)
    pub dimension: usize,

    #[serde(default)]
    pub converter: ConverterKind,

    /// Unit of Euler angles (quaternion channels only)
    #[serde(default)]
    pub angle_unit: AngleUnit,

    /// Reserve a fifth slot carrying the fourth input value (quaternion channels only)
    #[serde(default)]
    pub passthrough: bool,
}

/// Sample producer settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// Source type ("mock")
    #[serde(rename = "type", default = "default_source_type")]
    pub source_type: String,

    /// Samples per second per channel
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f32,

    /// Noise seed (0 = random each run)
    #[serde(default)]
    pub random_seed: u64,

    /// Gaussian noise added to every value
    #[serde(default = "default_noise_stddev")]
    pub noise_stddev: f32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error); RUST_LOG overrides
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Seconds between status lines in the daemon (0 disables)
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_write_timeout_ms() -> u64 {
    1000
}

fn default_send_queue_capacity() -> usize {
    64
}

fn default_stall_warn_ms() -> u64 {
    1000
}

fn default_source_type() -> String {
    "mock".to_string()
}

fn default_rate_hz() -> f32 {
    50.0
}

fn default_noise_stddev() -> f32 {
    0.02
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_status_interval_secs() -> u64 {
    10
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_type: default_source_type(),
            rate_hz: default_rate_hz(),
            random_seed: 0,
            noise_stddev: default_noise_stddev(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl SourceConfig {
    /// Slowest accepted per-channel rate
    pub const MIN_RATE_HZ: f32 = 0.01;
    /// Fastest accepted per-channel rate
    pub const MAX_RATE_HZ: f32 = 10_000.0;

    /// Time between samples on one channel
    pub fn sample_period(&self) -> Result<Duration> {
        let rate = self.rate_hz;
        if !(Self::MIN_RATE_HZ..=Self::MAX_RATE_HZ).contains(&rate) {
            return Err(Error::Config(format!(
                "source.rate_hz must be within {}-{} Hz, got {}",
                Self::MIN_RATE_HZ,
                Self::MAX_RATE_HZ,
                rate
            )));
        }
        Duration::try_from_secs_f32(1.0 / rate)
            .map_err(|e| Error::Config(format!("source.rate_hz {}: {}", rate, e)))
    }
}

impl ChannelConfig {
    fn to_def(&self) -> ChannelDef {
        let converter = match self.converter {
            ConverterKind::Identity => Converter::Identity,
            ConverterKind::Quaternion => Converter::Quaternion {
                unit: self.angle_unit,
                passthrough: self.passthrough,
            },
        };
        ChannelDef::new(&self.name, self.dimension, converter)
    }
}

impl NetworkConfig {
    /// `host:port` string for the stream client
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            // Bare IPv6 literal
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn client_config(&self) -> StreamClientConfig {
        StreamClientConfig {
            write_timeout: Some(Duration::from_millis(self.write_timeout_ms)),
            send_queue_capacity: self.send_queue_capacity,
            nodelay: true,
        }
    }
}

impl FrameConfig {
    pub fn stall_warn(&self) -> Option<Duration> {
        (self.stall_warn_ms > 0).then(|| Duration::from_millis(self.stall_warn_ms))
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Example
    /// ```no_run
    /// use sensor_stream::config::Config;
    ///
    /// let config = Config::load("sensor-stream.toml")?;
    /// # Ok::<(), sensor_stream::Error>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.network.host.trim().is_empty() {
            return Err(Error::Config("network.host must not be empty".to_string()));
        }
        if self.network.port == 0 {
            return Err(Error::Config("network.port must not be 0".to_string()));
        }
        if self.network.connect_timeout_ms == 0 {
            return Err(Error::Config(
                "network.connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.network.write_timeout_ms == 0 {
            return Err(Error::Config(
                "network.write_timeout_ms must be positive".to_string(),
            ));
        }
        if self.network.send_queue_capacity == 0 {
            return Err(Error::Config(
                "network.send_queue_capacity must be positive".to_string(),
            ));
        }
        self.source.sample_period()?;
        for channel in &self.frame.channels {
            if channel.converter == ConverterKind::Identity && channel.passthrough {
                return Err(Error::Config(format!(
                    "channel '{}': passthrough only applies to quaternion channels",
                    channel.name
                )));
            }
        }
        self.frame_layout()?;
        Ok(())
    }

    /// Build the frame layout described by `[[frame.channels]]`
    pub fn frame_layout(&self) -> Result<FrameLayout> {
        let defs = self.frame.channels.iter().map(ChannelConfig::to_def).collect();
        Ok(FrameLayout::define(defs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LayoutError;
    use std::io::Write;

    const LAYOUT_A: &str = include_str!("../configs/variant_a.toml");
    const LAYOUT_B: &str = include_str!("../configs/variant_b.toml");
    const LAYOUT_C: &str = include_str!("../configs/variant_c.toml");
    const LAYOUT_D: &str = include_str!("../configs/variant_d.toml");

    #[test]
    fn test_shipped_layouts() {
        let sizes = [(LAYOUT_A, 36), (LAYOUT_B, 36), (LAYOUT_C, 16), (LAYOUT_D, 28)];
        for (text, size) in sizes {
            let config = Config::from_toml(text).unwrap();
            assert_eq!(config.frame_layout().unwrap().size(), size);
        }
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml(
            r#"
[network]
host = "127.0.0.1"
port = 1234

[[frame.channels]]
name = "accel"
dimension = 3
"#,
        )
        .unwrap();

        assert_eq!(config.network.connect_timeout(), Duration::from_millis(5000));
        assert_eq!(config.network.send_queue_capacity, 64);
        assert_eq!(config.frame.readiness, ReadinessPolicy::FirstWins);
        assert_eq!(config.frame.stall_warn(), Some(Duration::from_millis(1000)));
        assert_eq!(config.source.source_type, "mock");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.network.address(), "127.0.0.1:1234");
    }

    #[test]
    fn test_address_required() {
        let err = Config::from_toml(
            r#"
[network]
port = 1234

[[frame.channels]]
name = "accel"
dimension = 3
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TomlParse(_)));
    }

    #[test]
    fn test_rejects_zero_port() {
        let err = Config::from_toml(
            r#"
[network]
host = "10.0.0.157"
port = 0

[[frame.channels]]
name = "accel"
dimension = 3
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_layout_error_surfaces() {
        let err = Config::from_toml(
            r#"
[network]
host = "10.0.0.157"
port = 1234

[[frame.channels]]
name = "accel"
dimension = 3

[[frame.channels]]
name = "accel"
dimension = 3
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::Layout(LayoutError::DuplicateChannel(ref name)) if name == "accel"
        ));
    }

    #[test]
    fn test_passthrough_needs_quaternion() {
        let err = Config::from_toml(
            r#"
[network]
host = "10.0.0.157"
port = 1234

[[frame.channels]]
name = "accel"
dimension = 4
passthrough = true
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_latest_wins_and_degrees() {
        let config = Config::from_toml(
            r#"
[network]
host = "::1"
port = 9000

[frame]
readiness = "latest_wins"
stall_warn_ms = 0

[[frame.channels]]
name = "orientation"
dimension = 3
converter = "quaternion"
angle_unit = "degrees"
"#,
        )
        .unwrap();

        assert_eq!(config.frame.readiness, ReadinessPolicy::LatestWins);
        assert_eq!(config.frame.stall_warn(), None);
        assert_eq!(config.network.address(), "[::1]:9000");
        let layout = config.frame_layout().unwrap();
        assert_eq!(
            layout.channels()[0].converter,
            Converter::Quaternion {
                unit: AngleUnit::Degrees,
                passthrough: false
            }
        );
    }

    #[test]
    fn test_rate_bounds() {
        for rate in ["1e-30", "0.0", "-5.0", "1e30", "nan"] {
            let text = LAYOUT_D.replace("rate_hz = 50.0", &format!("rate_hz = {}", rate));
            let err = Config::from_toml(&text).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "rate {} accepted", rate);
        }

        let config = Config::from_toml(&LAYOUT_D.replace("rate_hz = 50.0", "rate_hz = 0.01")).unwrap();
        assert_eq!(config.source.sample_period().unwrap(), Duration::from_secs(100));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LAYOUT_D.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.frame.channels.len(), 2);
        assert_eq!(config.network.port, 1234);
    }

    #[test]
    fn test_round_trip_toml() {
        let config = Config::from_toml(LAYOUT_B).unwrap();
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("[network]"));
        assert!(text.contains("[[frame.channels]]"));
        let reparsed = Config::from_toml(&text).unwrap();
        assert_eq!(reparsed.frame_layout().unwrap(), config.frame_layout().unwrap());
    }
}
