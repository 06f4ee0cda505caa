//! Frame layout: channel order, widths and byte offsets.
//!
//! A layout is defined once from an ordered channel list and stays fixed for
//! the life of a pipeline. Channels are packed back to back in declaration
//! order, each slot holding little-endian f32 values:
//!
//! ```text
//! ┌──────────────┬────────────────────┬──────────────┐
//! │ accel (3×f32)│ gyro quat (4×f32)  │ magnet (3×f32)│
//! │ offset 0     │ offset 12          │ offset 28     │
//! └──────────────┴────────────────────┴──────────────┘
//! ```

use crate::core::types::{ChannelId, Converter};
use crate::error::LayoutError;
use std::collections::HashSet;

/// Upper bound on channels per frame (one readiness bit each)
pub const MAX_CHANNELS: usize = 64;

/// Largest input vector a channel may declare
pub const MAX_DIMENSION: usize = 4;

/// Size of one encoded value
pub const FLOAT_BYTES: usize = 4;

/// Channel declaration passed to [`FrameLayout::define`]
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDef {
    pub name: String,
    pub dimension: usize,
    pub converter: Converter,
}

impl ChannelDef {
    pub fn new(name: &str, dimension: usize, converter: Converter) -> Self {
        Self {
            name: name.to_string(),
            dimension,
            converter,
        }
    }

    pub fn identity(name: &str, dimension: usize) -> Self {
        Self::new(name, dimension, Converter::Identity)
    }
}

/// A channel placed in a frame
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    pub id: ChannelId,
    pub name: String,
    /// Number of input values per sample
    pub dimension: usize,
    pub converter: Converter,
    pub byte_offset: usize,
}

impl ChannelSpec {
    /// Number of f32 slots occupied in the frame
    #[inline]
    pub fn output_floats(&self) -> usize {
        self.converter.output_floats(self.dimension)
    }

    #[inline]
    pub fn width_bytes(&self) -> usize {
        self.output_floats() * FLOAT_BYTES
    }

    /// Byte range of this channel within the frame
    #[inline]
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.byte_offset..self.byte_offset + self.width_bytes()
    }
}

/// Ordered, immutable set of channels making up one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameLayout {
    channels: Vec<ChannelSpec>,
    total_bytes: usize,
}

impl FrameLayout {
    /// Build a layout from channel declarations in frame order.
    pub fn define(defs: Vec<ChannelDef>) -> Result<Self, LayoutError> {
        if defs.is_empty() {
            return Err(LayoutError::Empty);
        }
        if defs.len() > MAX_CHANNELS {
            return Err(LayoutError::TooManyChannels(defs.len()));
        }

        let mut seen = HashSet::with_capacity(defs.len());
        let mut channels = Vec::with_capacity(defs.len());
        let mut offset = 0usize;

        for (index, def) in defs.into_iter().enumerate() {
            if def.dimension == 0 || def.dimension > MAX_DIMENSION {
                return Err(LayoutError::InvalidDimension {
                    channel: def.name,
                    dimension: def.dimension,
                });
            }
            if def.converter.is_quaternion() && def.dimension < 3 {
                return Err(LayoutError::QuaternionInput {
                    channel: def.name,
                    dimension: def.dimension,
                });
            }
            if !seen.insert(def.name.clone()) {
                return Err(LayoutError::DuplicateChannel(def.name));
            }

            let spec = ChannelSpec {
                id: ChannelId(index),
                name: def.name,
                dimension: def.dimension,
                converter: def.converter,
                byte_offset: offset,
            };
            offset += spec.width_bytes();
            channels.push(spec);
        }

        Ok(Self {
            channels,
            total_bytes: offset,
        })
    }

    /// Total frame size in bytes
    #[inline]
    pub fn size(&self) -> usize {
        self.total_bytes
    }

    /// Number of channels
    #[inline]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Always false for a defined layout; kept for API symmetry with `len`
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn channels(&self) -> &[ChannelSpec] {
        &self.channels
    }

    pub fn channel(&self, id: ChannelId) -> Option<&ChannelSpec> {
        self.channels.get(id.index())
    }

    pub fn channel_id(&self, name: &str) -> Option<ChannelId> {
        self.channels.iter().find(|c| c.name == name).map(|c| c.id)
    }

    /// Byte offset of the named channel
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        self.channels
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.byte_offset)
    }

    /// Bitmask with one bit set per channel
    #[inline]
    pub(crate) fn full_mask(&self) -> u64 {
        if self.channels.len() == MAX_CHANNELS {
            u64::MAX
        } else {
            (1u64 << self.channels.len()) - 1
        }
    }

    /// One-line description, e.g. `accel[3]@0 gyro[q4]@12 (28 bytes)`
    pub fn describe(&self) -> String {
        let parts: Vec<String> = self
            .channels
            .iter()
            .map(|c| match c.converter {
                Converter::Identity => format!("{}[{}]@{}", c.name, c.dimension, c.byte_offset),
                Converter::Quaternion { .. } => {
                    format!("{}[q{}]@{}", c.name, c.output_floats(), c.byte_offset)
                }
            })
            .collect();
        format!("{} ({} bytes)", parts.join(" "), self.total_bytes)
    }
}
