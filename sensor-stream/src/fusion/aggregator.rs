//! Per-cycle sample aggregation.
//!
//! Sensor channels push samples independently and from different threads.
//! The aggregator keeps one pending frame, sets a readiness bit per channel
//! as its sample lands, and hands out the frame from whichever call sets the
//! last bit. All of this happens under a single mutex: one update per
//! channel per cycle keeps contention negligible.
//!
//! # Readiness policy
//!
//! | Policy | Second sample for a ready channel |
//! |--------|-----------------------------------|
//! | `FirstWins` (default) | Discarded; the first sample stays in the frame |
//! | `LatestWins` | Overwrites the slot; readiness unchanged |
//!
//! `FirstWins` bounds latency to one sample per channel at the cost of
//! dropping samples produced between readiness and emission.
//!
//! # Stalls
//!
//! A cycle missing a channel never completes. The aggregator records when a
//! cycle started and, once it has been open longer than the configured
//! threshold, logs the missing channels and bumps the stall counter.

use crate::core::types::ChannelId;
use crate::error::{Error, Result};
use crate::fusion::layout::FrameLayout;
use crate::streaming::wire::{self, Frame};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What happens to a sample for a channel already ready this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    #[default]
    FirstWins,
    LatestWins,
}

/// Result of feeding one sample to the aggregator
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Sample stored, cycle still waiting on other channels
    Accepted,
    /// Channel already ready this cycle, sample dropped
    Discarded,
    /// Channel already ready this cycle, slot overwritten
    Replaced,
    /// Sample completed the cycle
    Completed(Frame),
}

/// Snapshot of aggregator counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatorStats {
    pub frames_emitted: u64,
    pub samples_accepted: u64,
    pub samples_discarded: u64,
    pub samples_replaced: u64,
    /// Cycles that stayed incomplete past the stall threshold
    pub stalls: u64,
    /// Channels the current cycle is still waiting for
    pub missing_channels: Vec<String>,
    /// Time since the first sample of the current cycle
    pub cycle_age: Option<Duration>,
}

/// In-progress frame
struct PendingFrame {
    buffer: Vec<u8>,
    ready: u64,
    started_at: Option<Instant>,
    stall_reported: bool,
}

struct AggregatorState {
    pending: PendingFrame,
    sequence: u64,
    frames_emitted: u64,
    samples_accepted: u64,
    samples_discarded: u64,
    samples_replaced: u64,
    stalls: u64,
}

/// Collects one sample per channel and emits complete frames
pub struct SampleAggregator {
    layout: Arc<FrameLayout>,
    policy: ReadinessPolicy,
    stall_warn: Option<Duration>,
    full_mask: u64,
    state: Mutex<AggregatorState>,
}

impl SampleAggregator {
    /// Create an aggregator for `layout`.
    ///
    /// `stall_warn` of `None` disables stall reporting.
    pub fn new(
        layout: Arc<FrameLayout>,
        policy: ReadinessPolicy,
        stall_warn: Option<Duration>,
    ) -> Self {
        let full_mask = layout.full_mask();
        let buffer = wire::empty_frame(&layout);
        Self {
            layout,
            policy,
            stall_warn,
            full_mask,
            state: Mutex::new(AggregatorState {
                pending: PendingFrame {
                    buffer,
                    ready: 0,
                    started_at: None,
                    stall_reported: false,
                },
                sequence: 0,
                frames_emitted: 0,
                samples_accepted: 0,
                samples_discarded: 0,
                samples_replaced: 0,
                stalls: 0,
            }),
        }
    }

    pub fn layout(&self) -> &Arc<FrameLayout> {
        &self.layout
    }

    pub fn policy(&self) -> ReadinessPolicy {
        self.policy
    }

    /// Feed one sample.
    ///
    /// Returns [`SampleOutcome::Completed`] from the call that fills the last
    /// missing channel; the pending frame is reset before returning.
    pub fn on_sample(&self, channel: ChannelId, values: &[f32]) -> Result<SampleOutcome> {
        let spec = self
            .layout
            .channel(channel)
            .ok_or(Error::UnknownChannel(channel.index()))?;

        if values.len() != spec.dimension {
            return Err(Error::ChannelDimensionMismatch {
                channel: spec.name.clone(),
                expected: spec.dimension,
                actual: values.len(),
            });
        }

        let bit = 1u64 << channel.index();
        let now = Instant::now();
        let mut state = self.state.lock();

        self.check_stall(&mut state, now);

        if state.pending.ready & bit != 0 {
            return Ok(match self.policy {
                ReadinessPolicy::FirstWins => {
                    state.samples_discarded += 1;
                    log::trace!("Discarded sample for {} (already ready)", spec.name);
                    SampleOutcome::Discarded
                }
                ReadinessPolicy::LatestWins => {
                    wire::encode_channel(spec, values, &mut state.pending.buffer);
                    state.samples_replaced += 1;
                    SampleOutcome::Replaced
                }
            });
        }

        if state.pending.ready == 0 {
            state.pending.started_at = Some(now);
        }

        wire::encode_channel(spec, values, &mut state.pending.buffer);
        state.pending.ready |= bit;
        state.samples_accepted += 1;

        if state.pending.ready != self.full_mask {
            return Ok(SampleOutcome::Accepted);
        }

        // Cycle complete: hand out the buffer and start over
        let bytes = std::mem::replace(
            &mut state.pending.buffer,
            wire::empty_frame(&self.layout),
        );
        state.pending.ready = 0;
        state.pending.started_at = None;
        state.pending.stall_reported = false;
        state.sequence += 1;
        state.frames_emitted += 1;

        log::trace!("Frame {} complete ({} bytes)", state.sequence, bytes.len());

        Ok(SampleOutcome::Completed(Frame::new(state.sequence, bytes)))
    }

    /// Check the current cycle against the stall threshold.
    ///
    /// Called on every sample; callers may also poll it so a cycle that stops
    /// receiving samples altogether is still reported. Returns true if the
    /// current cycle is stalled.
    pub fn poll_stall(&self) -> bool {
        let mut state = self.state.lock();
        self.check_stall(&mut state, Instant::now())
    }

    fn check_stall(&self, state: &mut AggregatorState, now: Instant) -> bool {
        let (Some(threshold), Some(started)) = (self.stall_warn, state.pending.started_at) else {
            return false;
        };
        let age = now.saturating_duration_since(started);
        if age < threshold {
            return false;
        }
        if !state.pending.stall_reported {
            state.pending.stall_reported = true;
            state.stalls += 1;
            log::warn!(
                "Frame {} stalled for {:?}, waiting on: {}",
                state.sequence + 1,
                age,
                self.missing_names(state.pending.ready).join(", ")
            );
        }
        true
    }

    fn missing_names(&self, ready: u64) -> Vec<String> {
        self.layout
            .channels()
            .iter()
            .filter(|c| ready & (1u64 << c.id.index()) == 0)
            .map(|c| c.name.clone())
            .collect()
    }

    /// Drop the in-progress cycle
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.pending.buffer.fill(0);
        state.pending.ready = 0;
        state.pending.started_at = None;
        state.pending.stall_reported = false;
    }

    pub fn stats(&self) -> AggregatorStats {
        let state = self.state.lock();
        let missing_channels = if state.pending.ready == 0 {
            Vec::new()
        } else {
            self.missing_names(state.pending.ready)
        };
        AggregatorStats {
            frames_emitted: state.frames_emitted,
            samples_accepted: state.samples_accepted,
            samples_discarded: state.samples_discarded,
            samples_replaced: state.samples_replaced,
            stalls: state.stalls,
            missing_channels,
            cycle_age: state.pending.started_at.map(|t| t.elapsed()),
        }
    }
}
