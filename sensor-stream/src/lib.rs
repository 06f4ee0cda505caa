//! SensorStream - fused motion-sensor telemetry over TCP
//!
//! Samples from independently-timed sensor channels are gathered into one
//! fixed-size little-endian frame per cycle and streamed to a remote
//! collector over a single persistent connection.
//!
//! ## Modules
//!
//! - [`fusion`]: frame layout, quaternion conversion, per-cycle aggregation
//! - [`streaming`]: wire encoding and the connection state machine
//! - [`pipeline`]: composition root driven by the command surface
//! - [`devices`]: sensor source implementations
//!
//! ## Features
//!
//! - `mock`: simulated sensor source for hardware-free runs (default)

pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod fusion;
pub mod pipeline;
pub mod streaming;

// Re-export commonly used types
pub use crate::config::Config;
pub use crate::core::source::{SampleCallback, SensorSource};
pub use crate::core::types::{ChannelId, CommandStatus, SensorSample};
pub use crate::error::{Error, LayoutError, Result};
pub use crate::pipeline::{Pipeline, PipelineStats};
