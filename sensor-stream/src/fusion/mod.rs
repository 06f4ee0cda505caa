//! Sample fusion: layout, quaternion conversion and per-cycle aggregation.

pub mod aggregator;
pub mod layout;
pub mod quaternion;

pub use aggregator::{AggregatorStats, ReadinessPolicy, SampleAggregator, SampleOutcome};
pub use layout::{ChannelDef, ChannelSpec, FrameLayout};
pub use quaternion::Quaternion;
