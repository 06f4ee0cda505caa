//! TCP telemetry streaming

pub mod client;
pub mod notify;
pub mod wire;

pub use client::{ClientStats, StreamClientConfig, TelemetryStreamClient};
pub use notify::{ConnectionState, Notification};
pub use wire::Frame;
