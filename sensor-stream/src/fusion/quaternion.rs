//! Euler angle to quaternion conversion for orientation channels.
//!
//! ## Composition order
//!
//! Each axis is turned into a half-angle quaternion:
//!
//! ```text
//! qz = (cos(az/2),    0,           0,            sin(az/2))
//! qy = (cos(pitch/2), 0,           sin(pitch/2), 0)
//! qx = (cos(roll/2),  sin(roll/2), 0,            0)
//! ```
//!
//! and the three are combined with the fixed component formulas in
//! [`compose`]. The formulas only read `w` and `x` of `qy`, so pitch
//! contributes through its cosine alone and roll ends up on the `y` axis.
//! The component order is reproduced exactly; it is not the textbook ZYX
//! product and must stay bit-compatible.
//!
//! No normalization is applied. Callers must not assume `|q| = 1`.

use crate::core::types::AngleUnit;

/// Orientation quaternion in (w, x, y, z) order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Components in wire order
    #[inline]
    pub fn to_array(self) -> [f32; 4] {
        [self.w, self.x, self.y, self.z]
    }

    /// Euclidean norm, for callers that want to check drift
    pub fn norm(self) -> f32 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Double-precision working quaternion
#[derive(Debug, Clone, Copy)]
struct Q64 {
    w: f64,
    x: f64,
    y: f64,
    z: f64,
}

impl Q64 {
    fn about_z(angle: f64) -> Self {
        let half = angle / 2.0;
        Self {
            w: half.cos(),
            x: 0.0,
            y: 0.0,
            z: half.sin(),
        }
    }

    fn about_y(angle: f64) -> Self {
        let half = angle / 2.0;
        Self {
            w: half.cos(),
            x: 0.0,
            y: half.sin(),
            z: 0.0,
        }
    }

    fn about_x(angle: f64) -> Self {
        let half = angle / 2.0;
        Self {
            w: half.cos(),
            x: half.sin(),
            y: 0.0,
            z: 0.0,
        }
    }
}

/// Combine the per-axis quaternions. Component formulas are fixed.
#[inline]
fn compose(qz: Q64, qy: Q64, qx: Q64) -> Q64 {
    Q64 {
        w: qz.w * qy.w * qx.w - qz.x * qy.x * qx.w - qz.y * qy.w * qx.x - qz.z * qy.x * qx.x,
        x: qz.w * qy.x * qx.w + qz.x * qy.w * qx.w + qz.y * qy.x * qx.x - qz.z * qy.w * qx.x,
        y: qz.w * qy.w * qx.x + qz.x * qy.x * qx.x + qz.y * qy.w * qx.w - qz.z * qy.x * qx.w,
        z: qz.w * qy.x * qx.x - qz.x * qy.w * qx.x + qz.y * qy.x * qx.w + qz.z * qy.w * qx.w,
    }
}

/// Convert (azimuth, pitch, roll) to a quaternion.
///
/// Arithmetic runs in f64 and is narrowed to f32 once, so identical inputs
/// always give bit-identical outputs.
pub fn convert(azimuth: f32, pitch: f32, roll: f32, unit: AngleUnit) -> Quaternion {
    let (az, pi, ro) = match unit {
        AngleUnit::Radians => (azimuth as f64, pitch as f64, roll as f64),
        AngleUnit::Degrees => (
            (azimuth as f64).to_radians(),
            (pitch as f64).to_radians(),
            (roll as f64).to_radians(),
        ),
    };

    let q = compose(Q64::about_z(az), Q64::about_y(pi), Q64::about_x(ro));

    Quaternion {
        w: q.w as f32,
        x: q.x as f32,
        y: q.y as f32,
        z: q.z as f32,
    }
}
