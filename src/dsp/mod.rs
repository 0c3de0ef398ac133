//! # DSP (Digital Signal Processing) Building Blocks
//!
//! - **`engine`**: the variable-speed tape delay. Owns the tape, the write
//!   cursor, the control ramps and the feedback topologies.
//! - **`delay_line`**: the circular tape itself, with a record head that
//!   can move in both directions.
//! - **`interpolation`**: nearest, linear and Hermite kernels for
//!   recording and playing back between samples.
//! - **`filter`**: one-pole smoothers and the trapezoidal one-pole used in
//!   the textured feedback loop.
//! - **`crossfade`**: equal-power dry/wet curves.
//! - **`framer`**: fixed 60-frame blocks between the host and the engine.
//! - **`frame`**: stereo frames and saturating fixed-point conversion.

pub mod crossfade;
pub mod delay_line;
pub mod engine;
pub mod filter;
pub mod frame;
pub mod framer;
pub mod interpolation;
