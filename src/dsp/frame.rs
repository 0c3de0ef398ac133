//! # Sample Frames and Fixed-Point Conversion
//!
//! The tape stores audio as 16-bit signed integers, the way the hardware
//! delay this plugin models does. All computation happens in `f32`
//! normalized to roughly `[-1, 1]`. Crossing from float to fixed point
//! always *saturates*: a value of 1.3 becomes 32767, never a wrapped
//! negative number. Wraparound would turn a loud peak into a full-scale
//! click of the opposite sign.
//!
//! ```text
//!   f32  ──× 32768──► truncate ──► clip16 ──► i16   (storage)
//!   i16  ──÷ 32768──────────────────────────► f32   (computation)
//! ```

use std::ops::{Add, Mul, Sub};

/// Scale between normalized floats and 16-bit fixed point.
pub const FIXED_POINT_SCALE: f32 = 32768.0;

/// A stereo pair of 16-bit samples, as stored on the tape.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SampleFrame {
    pub l: i16,
    pub r: i16,
}

/// A stereo pair of normalized float samples.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FloatFrame {
    pub l: f32,
    pub r: f32,
}

impl SampleFrame {
    pub const SILENCE: Self = Self { l: 0, r: 0 };

    pub const fn new(l: i16, r: i16) -> Self {
        Self { l, r }
    }

    /// Saturating conversion from a normalized float frame.
    pub fn from_float(frame: FloatFrame) -> Self {
        Self {
            l: to_fixed(frame.l),
            r: to_fixed(frame.r),
        }
    }

    /// Convert to normalized floats.
    pub fn to_float(self) -> FloatFrame {
        FloatFrame {
            l: f32::from(self.l) / FIXED_POINT_SCALE,
            r: f32::from(self.r) / FIXED_POINT_SCALE,
        }
    }

    /// The raw integer values as floats, without normalization. The read
    /// path interpolates in this domain and normalizes afterwards.
    pub fn to_raw(self) -> FloatFrame {
        FloatFrame {
            l: f32::from(self.l),
            r: f32::from(self.r),
        }
    }
}

impl FloatFrame {
    pub const ZERO: Self = Self { l: 0.0, r: 0.0 };

    pub const fn new(l: f32, r: f32) -> Self {
        Self { l, r }
    }
}

impl Add for FloatFrame {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            l: self.l + rhs.l,
            r: self.r + rhs.r,
        }
    }
}

impl Sub for FloatFrame {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            l: self.l - rhs.l,
            r: self.r - rhs.r,
        }
    }
}

impl Mul<f32> for FloatFrame {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self {
            l: self.l * rhs,
            r: self.r * rhs,
        }
    }
}

/// Saturate a 32-bit integer into the 16-bit range.
#[inline]
pub fn clip16(x: i32) -> i16 {
    x.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Normalized float to saturated fixed point. The float is truncated toward
/// zero first; `as i32` already saturates on overflow and maps NaN to 0.
#[inline]
pub fn to_fixed(x: f32) -> i16 {
    clip16((x * FIXED_POINT_SCALE) as i32)
}

/// Rational soft limiter.
///
/// ```text
/// f(x) = x * (27 + x²) / (27 + 9x²)
/// ```
///
/// Near zero the slope is 1; around ±3 it flattens out to ±1. Used both for
/// the biased tape saturation in the feedback path and for the analog-style
/// output conversion.
#[inline]
pub fn soft_limit(x: f32) -> f32 {
    x * (27.0 + x * x) / (27.0 + 9.0 * x * x)
}

/// Soft-clipped conversion to fixed point: compresses the signal through
/// [`soft_limit`] at half gain before saturating.
#[inline]
pub fn soft_convert(x: f32) -> i16 {
    clip16((soft_limit(x * 0.5) * FIXED_POINT_SCALE) as i32)
}
