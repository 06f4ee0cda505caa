//! Binary frame encoding
//!
//! # Wire Format
//!
//! A frame is a fixed-length run of IEEE-754 single-precision floats:
//!
//! ```text
//! ┌────────────┬────────────┬─────┬────────────┐
//! │ f32 LE     │ f32 LE     │ ... │ f32 LE     │
//! │ channel 0  │ channel 0  │     │ channel N  │
//! └────────────┴────────────┴─────┴────────────┘
//! ```
//!
//! - **Byte order**: little-endian for every value
//! - **Length**: [`FrameLayout::size`], known to the receiver a priori
//! - **Framing**: none. No length prefix, no delimiter, no handshake
//!
//! Quaternion channels are written as (w, x, y, z), followed by the
//! passthrough value when the channel reserves that slot.

use crate::core::types::Converter;
use crate::fusion::layout::{ChannelSpec, FLOAT_BYTES, FrameLayout};
use crate::fusion::quaternion;

/// A completed frame ready to be written to the socket
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Cycle number assigned by the aggregator (starts at 1)
    pub sequence: u64,
    bytes: Vec<u8>,
}

impl Frame {
    pub fn new(sequence: u64, bytes: Vec<u8>) -> Self {
        Self { sequence, bytes }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Value in float slot `index`, if the frame is long enough
    pub fn f32_at(&self, index: usize) -> Option<f32> {
        let start = index * FLOAT_BYTES;
        let raw = self.bytes.get(start..start + FLOAT_BYTES)?;
        Some(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

/// Write `values` as consecutive little-endian f32 starting at `slot[0]`
#[inline]
pub fn put_f32s(slot: &mut [u8], values: &[f32]) {
    for (chunk, value) in slot.chunks_exact_mut(FLOAT_BYTES).zip(values) {
        chunk.copy_from_slice(&value.to_le_bytes());
    }
}

/// Encode one channel's sample into its slot of `frame`.
///
/// `values` must already be checked against `spec.dimension`.
pub fn encode_channel(spec: &ChannelSpec, values: &[f32], frame: &mut [u8]) {
    let slot = &mut frame[spec.byte_range()];

    match spec.converter {
        Converter::Identity => put_f32s(slot, values),
        Converter::Quaternion { unit, passthrough } => {
            let q = quaternion::convert(values[0], values[1], values[2], unit);
            let mut out = [0.0f32; 5];
            out[..4].copy_from_slice(&q.to_array());
            if passthrough {
                out[4] = values.get(3).copied().unwrap_or(0.0);
            }
            put_f32s(slot, &out[..spec.output_floats()]);
        }
    }
}

/// Zeroed buffer sized for `layout`
pub fn empty_frame(layout: &FrameLayout) -> Vec<u8> {
    vec![0u8; layout.size()]
}
