//! Core data types for channels, samples and command results.
//!
//! Key types for sensor source implementers:
//! - [`SensorSample`]: One push from a channel, delivered to the pipeline callback
//! - [`ChannelId`]: Position of a channel in the configured frame layout
//! - [`Converter`]: How a channel's raw values are turned into frame floats

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a channel within its frame layout (declaration order)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub usize);

impl ChannelId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Unit of Euler angles fed to a quaternion channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleUnit {
    #[default]
    Radians,
    Degrees,
}

/// Conversion applied to a channel's values before they are encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Converter {
    /// Values are written as-is
    #[default]
    Identity,
    /// (azimuth, pitch, roll) are converted to a (w, x, y, z) quaternion.
    ///
    /// With `passthrough` set, a trailing slot carries the fourth input
    /// value unconverted (0.0 when the input has only three values).
    Quaternion { unit: AngleUnit, passthrough: bool },
}

impl Converter {
    /// Number of f32 slots this converter writes for an input of `dimension` values
    pub fn output_floats(&self, dimension: usize) -> usize {
        match self {
            Converter::Identity => dimension,
            Converter::Quaternion {
                passthrough: false, ..
            } => 4,
            Converter::Quaternion {
                passthrough: true, ..
            } => 5,
        }
    }

    pub fn is_quaternion(&self) -> bool {
        matches!(self, Converter::Quaternion { .. })
    }
}

/// A single push from a sensor channel
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    pub channel: ChannelId,
    pub values: Vec<f32>,
    /// Source timestamp in microseconds since epoch
    pub timestamp_us: u64,
}

impl SensorSample {
    pub fn new(channel: ChannelId, values: Vec<f32>) -> Self {
        Self {
            channel,
            values,
            timestamp_us: now_us(),
        }
    }
}

/// Result of a command issued by the command surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    /// Command accepted and applied (or dispatched, for asynchronous commands)
    Ok,
    /// Target state was already in effect; nothing changed
    AlreadyInState,
    /// Command could not be carried out
    Failed(String),
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Ok => write!(f, "ok"),
            CommandStatus::AlreadyInState => write!(f, "already in state"),
            CommandStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Current time in microseconds since the Unix epoch
#[inline]
pub fn now_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
