//! Motion model behind the simulated channels
//!
//! The device sways slowly about all three axes while its heading turns at a
//! constant rate. Identity channels see a per-axis sinusoid; quaternion
//! channels are fed the matching Euler angles:
//!
//! | Axis | Signal |
//! |------|--------|
//! | azimuth | `HEADING_RATE * t`, wrapped to (-π, π] |
//! | pitch | `PITCH_AMPLITUDE * sin(2π · 0.20 · t)` |
//! | roll | `ROLL_AMPLITUDE * sin(2π · 0.35 · t)` |
//!
//! A fourth quaternion input carries the scalar component of the device's
//! rotation vector, as rotation-vector sensors report it.

use super::noise::NoiseGenerator;
use crate::core::types::{AngleUnit, Converter};
use crate::fusion::layout::ChannelSpec;
use std::f32::consts::{PI, TAU};

/// Heading change in rad/s
const HEADING_RATE: f32 = 0.25;
const PITCH_AMPLITUDE: f32 = 0.15;
const ROLL_AMPLITUDE: f32 = 0.10;
const PITCH_FREQ_HZ: f32 = 0.20;
const ROLL_FREQ_HZ: f32 = 0.35;

/// Amplitude of identity-channel sinusoids
const AXIS_AMPLITUDE: f32 = 1.0;

/// Generates values for one channel at a point in time
pub struct ChannelSignal {
    dimension: usize,
    converter: Converter,
    /// Per-channel phase offset in seconds
    phase: f32,
    noise: NoiseGenerator,
    noise_stddev: f32,
}

impl ChannelSignal {
    pub fn new(spec: &ChannelSpec, noise: NoiseGenerator, noise_stddev: f32) -> Self {
        Self {
            dimension: spec.dimension,
            converter: spec.converter,
            phase: spec.id.index() as f32 * 0.5,
            noise,
            noise_stddev,
        }
    }

    /// Values for time `t` (seconds since subscribe), exactly `dimension` long
    pub fn sample(&mut self, t: f32) -> Vec<f32> {
        let t = t + self.phase;
        let mut values = match self.converter {
            Converter::Identity => (0..self.dimension)
                .map(|axis| {
                    let freq = 0.1 * (axis as f32 + 1.0);
                    AXIS_AMPLITUDE * (TAU * freq * t).sin()
                })
                .collect::<Vec<_>>(),
            Converter::Quaternion { unit, .. } => {
                let (azimuth, pitch, roll) = euler_at(t);
                let mut angles = vec![
                    to_unit(azimuth, unit),
                    to_unit(pitch, unit),
                    to_unit(roll, unit),
                ];
                if self.dimension == 4 {
                    angles.push((azimuth * 0.5).cos());
                }
                angles
            }
        };
        self.noise.perturb(&mut values, self.noise_stddev);
        values
    }
}

/// (azimuth, pitch, roll) in radians
fn euler_at(t: f32) -> (f32, f32, f32) {
    let azimuth = wrap_angle(HEADING_RATE * t);
    let pitch = PITCH_AMPLITUDE * (TAU * PITCH_FREQ_HZ * t).sin();
    let roll = ROLL_AMPLITUDE * (TAU * ROLL_FREQ_HZ * t).sin();
    (azimuth, pitch, roll)
}

#[inline]
fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI { PI } else { wrapped }
}

#[inline]
fn to_unit(radians: f32, unit: AngleUnit) -> f32 {
    match unit {
        AngleUnit::Radians => radians,
        AngleUnit::Degrees => radians.to_degrees(),
    }
}
