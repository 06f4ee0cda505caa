//! SensorSource trait definition

use crate::core::types::SensorSample;
use crate::error::Result;
use crate::fusion::layout::ChannelSpec;
use std::sync::Arc;

/// Callback invoked by a source for every sample it produces.
///
/// May be called concurrently from several threads (typically one per channel).
pub type SampleCallback = Arc<dyn Fn(SensorSample) + Send + Sync>;

/// Sensor source trait for sample producers
pub trait SensorSource: Send {
    /// Start delivering samples for `channels` to `callback`
    ///
    /// The source should:
    /// 1. Check it can produce every channel at its declared dimension
    /// 2. Start whatever threads or registrations it needs
    /// 3. Tag each sample with the channel's [`ChannelId`](crate::core::types::ChannelId)
    fn subscribe(&mut self, channels: &[ChannelSpec], callback: SampleCallback) -> Result<()>;

    /// Stop delivering samples. Must be safe to call when not subscribed.
    fn unsubscribe(&mut self) -> Result<()>;
}
