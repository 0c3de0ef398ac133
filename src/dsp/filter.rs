//! # One-Pole Filters
//!
//! Two flavours of the simplest possible IIR filter live here:
//!
//! - [`one_pole`]: the bare exponential smoother `y += a * (x - y)`, used to
//!   glide the delay time and the tape speed so that control changes never
//!   produce audible steps.
//! - [`OnePole`]: a trapezoidal (zero-delay feedback) one-pole with both a
//!   lowpass and a highpass output, used in the textured feedback path to
//!   strip rumble and to model tape head high-frequency loss.
//!
//! ## Frequency Mapping
//!
//! Cutoffs are given as *normalized* frequencies (cycles per sample, so
//! 0.5 is Nyquist). The trapezoidal integrator gain is `g = tan(π f)`,
//! evaluated with a polynomial approximation that is accurate well past
//! the frequencies this plugin ever asks for:
//!
//! ```text
//! tan(π f) ≈ f · (π + f² · (0.326·π³ + 0.1823·π⁵ · f²))
//! ```
//!
//! ## The Filter Equation
//!
//! ```text
//! lp    = (g · x + s) / (1 + g)
//! s'    = g · (x - lp) + lp
//! hp    = x - lp
//! ```
//!
//! where `s` is the integrator state. The highpass output is exactly the
//! complement of the lowpass, so DC always disappears from it.

use std::f32::consts::PI;

/// Which output of the [`OnePole`] to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    LowPass,
    HighPass,
}

/// A trapezoidal one-pole filter with lowpass and highpass outputs.
#[derive(Debug, Clone)]
pub struct OnePole {
    /// Integrator gain, `tan(π f)`.
    g: f32,
    /// Cached `1 / (1 + g)`.
    gi: f32,
    /// Integrator state.
    state: f32,
}

impl Default for OnePole {
    fn default() -> Self {
        Self::new()
    }
}

impl OnePole {
    /// A filter at normalized cutoff 0.01 with cleared state.
    pub fn new() -> Self {
        let mut filter = Self {
            g: 0.0,
            gi: 1.0,
            state: 0.0,
        };
        filter.set_frequency(0.01);
        filter
    }

    /// Set the cutoff as a normalized frequency (cycles per sample).
    ///
    /// Negative values are treated as zero, which freezes the lowpass
    /// output at its current state.
    pub fn set_frequency(&mut self, frequency: f32) {
        self.g = fast_tan(frequency.max(0.0));
        self.gi = 1.0 / (1.0 + self.g);
    }

    /// Process one sample and return the requested output.
    #[inline]
    pub fn process(&mut self, mode: FilterMode, input: f32) -> f32 {
        let lp = (self.g * input + self.state) * self.gi;
        self.state = self.g * (input - lp) + lp;
        match mode {
            FilterMode::LowPass => lp,
            FilterMode::HighPass => input - lp,
        }
    }

    /// Clear the integrator state.
    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

/// `tan(π f)` for small normalized frequencies.
#[inline]
fn fast_tan(f: f32) -> f32 {
    const A: f32 = 3.260e-1 * PI * PI * PI;
    const B: f32 = 1.823e-1 * PI * PI * PI * PI * PI;
    let f2 = f * f;
    f * (PI + f2 * (A + B * f2))
}

/// One step of an exponential smoother: move `state` a fraction
/// `coefficient` of the way towards `target`.
#[inline]
pub fn one_pole(state: &mut f32, target: f32, coefficient: f32) {
    *state += coefficient * (target - *state);
}
