//! Core abstractions for sensor sources.
//!
//! - [`source::SensorSource`]: Trait to implement for new sample producers
//! - [`types`]: Channel ids, samples, converters and command results

pub mod source;
pub mod types;
