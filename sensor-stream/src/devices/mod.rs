//! Sensor source implementations

#[cfg(feature = "mock")]
pub mod mock;

use crate::config::SourceConfig;
use crate::core::source::SensorSource;
use crate::error::{Error, Result};

/// Create a sensor source based on configuration
pub fn create_source(config: &SourceConfig) -> Result<Box<dyn SensorSource>> {
    match config.source_type.as_str() {
        #[cfg(feature = "mock")]
        "mock" => {
            let source = mock::MockSensorSource::new(config.clone())?;
            Ok(Box::new(source))
        }
        other => Err(Error::Config(format!("unknown source type '{}'", other))),
    }
}
