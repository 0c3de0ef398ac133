//! # Equal-Power Crossfade
//!
//! The dry/wet control blends the input with the tape signal through two
//! complementary curves:
//!
//! ```text
//! fade_in(x)  = sin(x · π/2)     (wet gain)
//! fade_out(x) = cos(x · π/2)     (dry gain)
//! ```
//!
//! Since `sin² + cos² = 1` the total power stays constant across the knob,
//! avoiding the loudness dip in the middle of a linear crossfade. The
//! curves are tabulated once at construction and read with linear
//! interpolation, so the audio path never calls `sin`/`cos`.

/// Number of table segments. Tables hold `SEGMENTS + 1` points.
const SEGMENTS: usize = 256;

/// Pre-computed fade-in / fade-out tables.
#[derive(Debug, Clone)]
pub struct Crossfade {
    fade_in: [f32; SEGMENTS + 1],
    fade_out: [f32; SEGMENTS + 1],
}

impl Default for Crossfade {
    fn default() -> Self {
        Self::new()
    }
}

impl Crossfade {
    pub fn new() -> Self {
        let mut fade_in = [0.0; SEGMENTS + 1];
        let mut fade_out = [0.0; SEGMENTS + 1];
        for (i, (fin, fout)) in fade_in.iter_mut().zip(fade_out.iter_mut()).enumerate() {
            let phase = i as f64 / SEGMENTS as f64 * std::f64::consts::FRAC_PI_2;
            *fin = phase.sin() as f32;
            *fout = phase.cos() as f32;
        }
        Self { fade_in, fade_out }
    }

    /// `(fade_in, fade_out)` gains for a dry/wet position in `[0, 1]`.
    /// Out-of-range positions are clamped.
    #[inline]
    pub fn gains(&self, position: f32) -> (f32, f32) {
        (
            lookup(&self.fade_in, position),
            lookup(&self.fade_out, position),
        )
    }
}

#[inline]
fn lookup(table: &[f32; SEGMENTS + 1], position: f32) -> f32 {
    let index = position.clamp(0.0, 1.0) * SEGMENTS as f32;
    let integral = index as usize;
    if integral >= SEGMENTS {
        return table[SEGMENTS];
    }
    let fractional = index - integral as f32;
    let a = table[integral];
    let b = table[integral + 1];
    a + (b - a) * fractional
}
