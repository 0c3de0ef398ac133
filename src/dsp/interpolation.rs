//! # Interpolation Kernels
//!
//! The tape runs at a variable speed relative to the sample clock, so both
//! sides of the delay deal with positions *between* samples:
//!
//! - The **write** side converts the continuous input signal into tape
//!   cells. At half speed each input sample covers two cells, and the cell
//!   in between has to be synthesized from the recent input history.
//! - The **read** side converts a fractional tape position back into an
//!   output sample.
//!
//! Both sides take four consecutive points `[xm1, x0, x1, x2]` and a
//! fractional position `t` in `[0, 1)`.
//!
//! ```text
//!            write side                      read side
//!   points   [h2, h1, h0, mix]               [tape[i], tape[i+1], tape[i+2], tape[i+3]]
//!   nearest  mix                             tape[i]
//!   linear   h0 → mix                        tape[i] → tape[i+1]
//!   hermite  h1 → h0 (4-point spline)        tape[i+1] → tape[i+2] (4-point spline)
//! ```
//!
//! The kernel pair is picked once per block ([`Interpolation::kernel`]) so
//! the per-sample loop calls through a function pointer instead of
//! branching on the mode.

use super::frame::FloatFrame;

/// Reconstruction kernel used for both writing and reading the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Zero-order hold.
    Nearest,
    /// Straight line between two neighbours.
    Linear,
    /// 4-point, 3rd-order Hermite spline.
    #[default]
    Hermite,
}

/// A kernel function over four points and a fractional position.
pub type KernelFn = fn(&[FloatFrame; 4], f32) -> FloatFrame;

/// The write/read kernel pair for one [`Interpolation`] mode.
#[derive(Clone, Copy)]
pub struct Kernel {
    pub write: KernelFn,
    pub read: KernelFn,
}

impl Interpolation {
    pub fn kernel(self) -> Kernel {
        match self {
            Self::Nearest => Kernel {
                write: write_nearest,
                read: read_nearest,
            },
            Self::Linear => Kernel {
                write: write_linear,
                read: read_linear,
            },
            Self::Hermite => Kernel {
                write: hermite,
                read: hermite,
            },
        }
    }
}

fn write_nearest(points: &[FloatFrame; 4], _t: f32) -> FloatFrame {
    points[3]
}

fn write_linear(points: &[FloatFrame; 4], t: f32) -> FloatFrame {
    points[2] + (points[3] - points[2]) * t
}

fn read_nearest(points: &[FloatFrame; 4], _t: f32) -> FloatFrame {
    points[0]
}

fn read_linear(points: &[FloatFrame; 4], t: f32) -> FloatFrame {
    points[0] + (points[1] - points[0]) * t
}

/// Hermite spline between `x0` and `x1`, in the factored form that needs
/// only three multiplies per channel for the polynomial itself.
fn hermite(points: &[FloatFrame; 4], t: f32) -> FloatFrame {
    let [xm1, x0, x1, x2] = *points;
    let c = (x1 - xm1) * 0.5;
    let v = x0 - x1;
    let w = c + v;
    let a = w + v + (x2 - x0) * 0.5;
    let b_neg = w + a;
    (((a * t) - b_neg) * t + c) * t + x0
}
