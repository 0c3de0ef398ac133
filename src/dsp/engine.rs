//! # Variable-Speed Tape Delay Engine
//!
//! The engine models a tape loop whose transport speed can be varied
//! continuously, including running in reverse. The input is recorded onto
//! the tape at the current speed and played back a fixed *tape distance*
//! behind the record head, so slowing the tape down both lengthens the
//! delay and pitches the repeats down, exactly like a tape echo.
//!
//! ## Signal Flow (one sample)
//!
//! ```text
//!                    ┌──────────── topology ────────────┐
//!  input ──┬────────►(+)──► write kernel ──► tape ──► read kernel ──► × low-speed gain ──┬──► wet
//!          │          ▲     (0 or 1 cell per           (fractional                       │
//!          │          │      tick at speed s)           tape position)                   │
//!          │          └────────── feedback (× 1.1 headroom) ◄────────────────────────────┘
//!          │
//!          └────────────────────────────── dry ──► crossfade(dry, wet) ──► saturate ──► output
//! ```
//!
//! ## Controls
//!
//! Controls arrive once per block as a [`ControlState`]. Within the block
//! every control is ramped linearly from the previous block's targets to
//! the new ones, so a block boundary never shows up as a step. On top of
//! the ramp, delay time and tape speed are glided with one-pole smoothers:
//! delay time very slowly (so time changes are heard as tape-style pitch
//! bends rather than jumps), speed more quickly.
//!
//! ## Write Path
//!
//! A fractional accumulator tracks how far the tape has travelled since
//! the last recorded cell. Each input sample adds `1 / speed` to it; a cell
//! is recorded every time the accumulator is below one. At full speed that
//! is exactly one cell per sample; at half speed one cell every second
//! sample; the cells in between are synthesized from the recent history
//! of the record signal with the selected [`Interpolation`] kernel.
//!
//! ## Read Path
//!
//! The playback position sits `time` cells behind the record head,
//! corrected by how far the tape has moved since the last recorded cell.
//! The position is fractional; the read kernel reconstructs the signal
//! from four tape cells around it.

use nih_plug::nih_debug_assert_eq;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use thiserror::Error;

use super::crossfade::Crossfade;
use super::delay_line::DelayLine;
use super::filter::{one_pole, FilterMode, OnePole};
use super::frame::{
    soft_convert, soft_limit, to_fixed, FloatFrame, SampleFrame, FIXED_POINT_SCALE,
};
use super::interpolation::Interpolation;

/// Tape length used by the plugin, in frames.
pub const DEFAULT_CAPACITY: usize = 8192 + 4096;

/// Smallest tape that leaves room for the time mapping and the four read taps.
pub const MIN_CAPACITY: usize = 16;

/// Gain applied to every feedback path on top of the feedback control.
/// Lets the loop run slightly above unity for self-oscillation.
pub const FEEDBACK_HEADROOM: f32 = 1.1;

/// Slowest tape speed, as a fraction of the sample clock.
pub const MIN_SPEED: f32 = 0.001;

/// Fastest tape speed.
pub const MAX_SPEED: f32 = 1.0;

/// Below this speed the wet signal fades out quadratically.
pub const LOW_SPEED_FADE: f32 = 0.01;

/// Seed of the tape hiss generator for [`DelayEngine::new`].
pub const DEFAULT_SEED: u64 = 0x5eed_7a9e;

/// Cells kept clear at either end of the delay time range.
const TIME_MARGIN: f32 = 5.0;

const TIME_SMOOTHING: f32 = 0.00002;
const RATE_SMOOTHING: f32 = 0.007;

/// Normalized cutoff of the rumble filter in the textured feedback path.
const RUMBLE_CUTOFF: f32 = 0.0008;
const HISS_LEVEL: f32 = 0.002;
const SATURATION_DRIVE: f32 = 1.4;
const SATURATION_BIAS: f32 = 0.1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("tape capacity of {capacity} frames is too small (minimum is {minimum})")]
    CapacityTooSmall { capacity: usize, minimum: usize },
}

/// How the feedback signal is routed back onto the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    /// The loop is left open: the right input is the feed into the loop,
    /// the left playback is routed to the right record channel. The main
    /// output crossfades between the two inputs, the auxiliary output
    /// carries the tape.
    #[default]
    OpenLoop,
    /// Two independent delays, one per channel.
    DualDelay,
    /// Dual delay with hiss, rumble filtering, head loss and biased
    /// saturation in the loop. The output is soft clipped.
    Textured,
    /// Channels swap on every pass through the loop.
    PingPong,
}

impl Topology {
    pub const ALL: [Self; 4] = [
        Self::OpenLoop,
        Self::DualDelay,
        Self::Textured,
        Self::PingPong,
    ];

    /// Map the persisted selector value to a topology. Values wrap, so the
    /// selector can be cycled by incrementing it.
    pub fn from_index(index: u32) -> Self {
        Self::ALL[index as usize % Self::ALL.len()]
    }

    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Control targets for one block. All values are normalized:
///
/// - `time`: delay as a fraction of the tape, `[0, 1]`
/// - `feedback`: loop gain before headroom, `[0, 1]`
/// - `drywet`: crossfade position, `[0, 1]`
/// - `rate`: signed tape speed, `[-1, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlState {
    pub time: f32,
    pub feedback: f32,
    pub drywet: f32,
    pub rate: f32,
}

impl ControlState {
    /// The same controls with every value forced into its range. NaN
    /// becomes zero, infinities land on the nearest edge.
    pub fn clamped(self) -> Self {
        Self {
            time: bounded(self.time, 0.0, 1.0),
            feedback: bounded(self.feedback, 0.0, 1.0),
            drywet: bounded(self.drywet, 0.0, 1.0),
            rate: bounded(self.rate, -1.0, 1.0),
        }
    }
}

/// `f32::clamp` passes NaN through, and a NaN reaching the smoothers would
/// stay there for good.
#[inline]
fn bounded(x: f32, min: f32, max: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(min, max)
    }
}

/// Per-sample linear ramp of the controls across one block. `time` is
/// already converted to tape cells.
#[derive(Debug, Clone, Copy)]
struct ControlRamp {
    value: ControlState,
    increment: ControlState,
}

impl ControlRamp {
    fn new(start: ControlState, end: ControlState, size: usize) -> Self {
        let steps = size.max(1) as f32;
        Self {
            value: start,
            increment: ControlState {
                time: (end.time - start.time) / steps,
                feedback: (end.feedback - start.feedback) / steps,
                drywet: (end.drywet - start.drywet) / steps,
                rate: (end.rate - start.rate) / steps,
            },
        }
    }

    #[inline]
    fn advance(&mut self) {
        self.value.time += self.increment.time;
        self.value.feedback += self.increment.feedback;
        self.value.drywet += self.increment.drywet;
        self.value.rate += self.increment.rate;
    }
}

/// Quadratic fade of the wet signal near standstill. At very low speeds
/// the write cursor and the read position straddle a cell boundary and
/// the playback jumps; fading the wet path out there hides the click.
#[inline]
pub(crate) fn low_speed_gain(speed: f32) -> f32 {
    let gain = (speed / LOW_SPEED_FADE).clamp(0.0, 1.0);
    gain * gain
}

/// The variable-speed tape delay.
///
/// One instance owns its tape and all of its state; instances never share
/// anything. [`DelayEngine::process_block`] is allocation-free.
pub struct DelayEngine {
    tape: DelayLine,
    interpolation: Interpolation,
    crossfade: Crossfade,

    /// Targets of the previous block, where the next ramp starts.
    /// Initially all zero.
    previous: ControlState,

    /// Tape travel since the last recorded cell, in cells. Starts at 0, so
    /// the first sample always records.
    write_position: f32,

    /// The last three record signals, newest first. Starts silent.
    history: [FloatFrame; 3],

    /// The previous playback sample, fed back on the next sample.
    feedback_sample: FloatFrame,

    /// Smoothed delay time in cells. Starts at 0.
    lp_time: f32,

    /// Smoothed signed tape speed. Starts at 0 (standstill).
    lp_rate: f32,

    /// Fixed highpass per channel in the textured loop.
    rumble: [OnePole; 2],

    /// Feedback-dependent lowpass per channel in the textured loop.
    head_loss: [OnePole; 2],

    hiss: Pcg32,
    seed: u64,

    /// Fractional tape position of the last playback sample.
    read_position: f32,
}

impl DelayEngine {
    /// Create an engine with a silent tape of `capacity` frames.
    pub fn new(capacity: usize, interpolation: Interpolation) -> Result<Self, EngineError> {
        Self::with_seed(capacity, interpolation, DEFAULT_SEED)
    }

    /// Like [`DelayEngine::new`] with an explicit seed for the tape hiss.
    pub fn with_seed(
        capacity: usize,
        interpolation: Interpolation,
        seed: u64,
    ) -> Result<Self, EngineError> {
        if capacity < MIN_CAPACITY {
            return Err(EngineError::CapacityTooSmall {
                capacity,
                minimum: MIN_CAPACITY,
            });
        }

        let mut rumble = [OnePole::new(), OnePole::new()];
        for filter in &mut rumble {
            filter.set_frequency(RUMBLE_CUTOFF);
        }

        Ok(Self {
            tape: DelayLine::new(capacity),
            interpolation,
            crossfade: Crossfade::new(),
            previous: ControlState::default(),
            write_position: 0.0,
            history: [FloatFrame::ZERO; 3],
            feedback_sample: FloatFrame::ZERO,
            lp_time: 0.0,
            lp_rate: 0.0,
            rumble,
            head_loss: [OnePole::new(), OnePole::new()],
            hiss: Pcg32::seed_from_u64(seed),
            seed,
            read_position: 0.0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.tape.capacity()
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// Switch the reconstruction kernel. Takes effect on the next block.
    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
    }

    /// Where the next cell will be recorded.
    pub fn write_head(&self) -> usize {
        self.tape.head()
    }

    /// Tape position of the most recent playback sample.
    pub fn read_position(&self) -> f32 {
        self.read_position
    }

    /// Controls the next block's ramp starts from.
    pub fn previous_controls(&self) -> ControlState {
        self.previous
    }

    /// Smoothed delay time, in cells.
    pub fn smoothed_time(&self) -> f32 {
        self.lp_time
    }

    /// Smoothed signed tape speed.
    pub fn smoothed_rate(&self) -> f32 {
        self.lp_rate
    }

    /// Delay in tape cells for a normalized `time` control.
    pub fn delay_cells(&self, time: f32) -> f32 {
        time.clamp(0.0, 1.0) * (self.tape.capacity() as f32 - 2.0 * TIME_MARGIN) + TIME_MARGIN
    }

    /// Jump straight to `controls`: the next ramp starts there and the
    /// time and speed smoothers are settled on them. Used after a reset so
    /// the engine does not spend seconds gliding from zero.
    pub fn snap(&mut self, controls: ControlState) {
        let controls = controls.clamped();
        self.previous = controls;
        self.lp_time = self.delay_cells(controls.time);
        self.lp_rate = controls.rate;
    }

    /// Erase the tape and clear all signal state. Control state (ramp start
    /// and smoothers) is kept; call [`DelayEngine::snap`] to move it.
    pub fn clear(&mut self) {
        self.tape.clear();
        self.write_position = 0.0;
        self.history = [FloatFrame::ZERO; 3];
        self.feedback_sample = FloatFrame::ZERO;
        self.read_position = 0.0;
        for filter in self.rumble.iter_mut().chain(self.head_loss.iter_mut()) {
            filter.reset();
        }
        self.hiss = Pcg32::seed_from_u64(self.seed);
    }

    /// Process one block.
    ///
    /// `input` and `output` should have the same length; if they do not,
    /// only the common prefix is processed. Controls are ramped from the
    /// previous block's targets to `controls` across the block.
    pub fn process_block(
        &mut self,
        input: &[SampleFrame],
        output: &mut [SampleFrame],
        controls: &ControlState,
        topology: Topology,
    ) {
        nih_debug_assert_eq!(input.len(), output.len());
        let size = input.len().min(output.len());
        let target = controls.clamped();

        let start = ControlState {
            time: self.delay_cells(self.previous.time),
            ..self.previous
        };
        let end = ControlState {
            time: self.delay_cells(target.time),
            ..target
        };
        let mut ramp = ControlRamp::new(start, end, size);
        let kernel = self.interpolation.kernel();

        for (input, output) in input.iter().zip(output.iter_mut()).take(size) {
            let controls = ramp.value;

            // Step 1: GLIDE time and speed.
            //
            // The ramp alone would turn a knob move into a 60-sample
            // slope; the smoothers stretch it further. Time glides very
            // slowly, so moving the time knob bends the pitch of the
            // repeats like dragging a tape head.
            one_pole(&mut self.lp_time, controls.time, TIME_SMOOTHING);
            one_pole(&mut self.lp_rate, controls.rate, RATE_SMOOTHING);

            // Step 2: SPLIT the rate into speed and direction.
            //
            // The tape never stops completely: at standstill it still
            // crawls at MIN_SPEED, in the direction of the last sign.
            let speed = self.lp_rate.abs().clamp(MIN_SPEED, MAX_SPEED);
            let direction: i32 = if self.lp_rate > 0.0 { 1 } else { -1 };

            // Step 3: FEED BACK the previous playback sample, routed by
            // the topology.
            let dry = input.to_float();
            let (send, feedback) = self.feedback(topology, dry, controls.feedback);
            let mix = send + feedback;

            // Step 4: RECORD onto the tape.
            //
            // At full speed this records exactly one cell. Slower, the
            // accumulator often stays above one and nothing is recorded
            // this tick; the cells that are recorded are interpolated
            // between the last record signals, at the position where the
            // tape actually passed the head.
            let points = [self.history[2], self.history[1], self.history[0], mix];
            while self.write_position < 1.0 {
                let cell = (kernel.write)(&points, self.write_position);
                self.tape.write(SampleFrame::from_float(cell));
                self.write_position += 1.0 / speed;
                self.tape.step(direction);
            }
            self.write_position -= 1.0;
            self.history = [mix, self.history[0], self.history[1]];

            // Step 5: PLAY BACK from behind the record head.
            //
            // The distance is `lp_time` cells, corrected by how far the
            // tape has moved since the last recorded cell, so playback
            // glides smoothly between cells instead of stepping.
            let position = self.tape.wrap_position(
                self.tape.head() as f32
                    - self.write_position * speed * direction as f32
                    - self.lp_time,
            );
            let integral = position as usize;
            let fractional = position - integral as f32;
            let taps = self.tape.taps(integral).map(SampleFrame::to_raw);
            // Step 6: FADE the wet signal near standstill, where playback
            // hops across cell boundaries and would click.
            let wet = (kernel.read)(&taps, fractional)
                * (low_speed_gain(speed) / FIXED_POINT_SCALE);

            self.feedback_sample = wet;
            self.read_position = position;

            // Step 7: MIX dry and wet on equal-power curves, then convert
            // back to 16 bits. The textured topology compresses softly;
            // the others saturate hard at full scale.
            let (fade_in, fade_out) = self.crossfade.gains(controls.drywet);
            *output = match topology {
                Topology::OpenLoop => SampleFrame {
                    l: to_fixed(fade_out * dry.l + fade_in * dry.r),
                    r: to_fixed(wet.r),
                },
                Topology::Textured => {
                    let blend = dry * fade_out + wet * fade_in;
                    SampleFrame {
                        l: soft_convert(blend.l * 2.0),
                        r: soft_convert(blend.r * 2.0),
                    }
                }
                Topology::DualDelay | Topology::PingPong => {
                    SampleFrame::from_float(dry * fade_out + wet * fade_in)
                }
            };

            // Step 8: ADVANCE the control ramps.
            ramp.advance();
        }

        self.previous = target;
    }

    /// Returns the input part of the record signal and the feedback part.
    #[inline]
    fn feedback(
        &mut self,
        topology: Topology,
        dry: FloatFrame,
        feedback: f32,
    ) -> (FloatFrame, FloatFrame) {
        let gain = feedback * FEEDBACK_HEADROOM;
        let previous = self.feedback_sample;
        match topology {
            Topology::OpenLoop => (
                FloatFrame::new(dry.l, 0.0),
                FloatFrame::new(dry.r * gain, previous.l),
            ),
            Topology::DualDelay => (dry, previous * gain),
            Topology::PingPong => (dry, FloatFrame::new(previous.r, previous.l) * gain),
            Topology::Textured => {
                let hiss = FloatFrame::new(self.hiss.gen::<f32>(), self.hiss.gen::<f32>());
                let noisy = previous + hiss * HISS_LEVEL;
                let loop_gain = feedback * (2.0 - feedback) * FEEDBACK_HEADROOM;
                let l = self.texture(0, noisy.l, feedback, loop_gain);
                let r = self.texture(1, noisy.r, feedback, loop_gain);
                (dry, FloatFrame::new(l, r))
            }
        }
    }

    /// One channel of the textured loop: rumble filter, head loss, biased
    /// saturation. The bias is removed again after the shaper so silence
    /// stays silent.
    #[inline]
    fn texture(&mut self, channel: usize, x: f32, feedback: f32, loop_gain: f32) -> f32 {
        let head_loss = &mut self.head_loss[channel];
        head_loss.set_frequency(feedback / 12.0);
        let x = self.rumble[channel].process(FilterMode::HighPass, x);
        let x = loop_gain * head_loss.process(FilterMode::LowPass, x);
        // Bias subtracted before the 1/1.4 scaling, so zero maps to zero.
        (soft_limit(x * SATURATION_DRIVE + SATURATION_BIAS) - soft_limit(SATURATION_BIAS))
            / SATURATION_DRIVE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 60;

    /// `delay_cells(0.5)` is exactly 517 on this tape.
    const TEST_CAPACITY: usize = 1034;
    const TEST_DELAY: usize = 517;

    fn impulse_input(len: usize) -> Vec<SampleFrame> {
        let mut input = vec![SampleFrame::SILENCE; len];
        input[0] = SampleFrame::new(i16::MAX, i16::MAX);
        input
    }

    /// Deterministic pseudo-random test signal.
    fn noise_input(len: usize, seed: u64) -> Vec<SampleFrame> {
        let mut rng = Pcg32::seed_from_u64(seed);
        (0..len)
            .map(|_| SampleFrame::new(rng.gen_range(-20000..20000), rng.gen_range(-20000..20000)))
            .collect()
    }

    /// Run `input` through the engine in fixed blocks with constant controls.
    fn run(
        engine: &mut DelayEngine,
        input: &[SampleFrame],
        controls: &ControlState,
        topology: Topology,
    ) -> Vec<SampleFrame> {
        let mut output = vec![SampleFrame::SILENCE; input.len()];
        for (inp, out) in input.chunks(BLOCK).zip(output.chunks_mut(BLOCK)) {
            engine.process_block(inp, out, controls, topology);
        }
        output
    }

    fn wet_controls(feedback: f32) -> ControlState {
        ControlState {
            time: 0.5,
            feedback,
            drywet: 1.0,
            rate: 1.0,
        }
    }

    fn snapped_engine(interpolation: Interpolation, controls: ControlState) -> DelayEngine {
        let mut engine = DelayEngine::new(TEST_CAPACITY, interpolation).unwrap();
        engine.snap(controls);
        engine
    }

    #[test]
    fn test_rejects_tiny_tape() {
        assert_eq!(
            DelayEngine::new(4, Interpolation::Linear).err(),
            Some(EngineError::CapacityTooSmall {
                capacity: 4,
                minimum: MIN_CAPACITY
            })
        );
        assert!(DelayEngine::new(MIN_CAPACITY, Interpolation::Linear).is_ok());
    }

    #[test]
    fn test_delay_cells_mapping() {
        let engine = DelayEngine::new(TEST_CAPACITY, Interpolation::Nearest).unwrap();
        assert_eq!(engine.delay_cells(0.0), 5.0);
        assert_eq!(engine.delay_cells(0.5), TEST_DELAY as f32);
        assert_eq!(engine.delay_cells(1.0), (TEST_CAPACITY - 5) as f32);
        assert_eq!(engine.delay_cells(3.0), engine.delay_cells(1.0));
    }

    #[test]
    fn test_topology_index_wraps() {
        for topology in Topology::ALL {
            assert_eq!(Topology::from_index(topology.index()), topology);
        }
        assert_eq!(Topology::from_index(4), Topology::OpenLoop);
        assert_eq!(Topology::from_index(7), Topology::PingPong);
    }

    #[test]
    fn test_low_speed_gain() {
        assert_eq!(low_speed_gain(1.0), 1.0);
        assert_eq!(low_speed_gain(LOW_SPEED_FADE), 1.0);
        assert!((low_speed_gain(0.005) - 0.25).abs() < 1e-6);
        assert!((low_speed_gain(MIN_SPEED) - 0.01).abs() < 1e-6);
        // Continuous across the fade threshold.
        let below = low_speed_gain(LOW_SPEED_FADE - 1e-6);
        assert!((below - 1.0).abs() < 1e-3);
    }

    /// A single impulse comes back once, `delay - 1` samples later with
    /// nearest-neighbour interpolation, and nothing else is heard.
    #[test]
    fn test_impulse_reappears_after_delay() {
        let controls = wet_controls(0.0);
        let mut engine = snapped_engine(Interpolation::Nearest, controls);

        let output = run(&mut engine, &impulse_input(1200), &controls, Topology::DualDelay);

        let echo = TEST_DELAY - 1;
        assert_eq!(output[echo], SampleFrame::new(i16::MAX, i16::MAX));
        for (i, frame) in output.iter().enumerate() {
            if i != echo {
                assert_eq!(*frame, SampleFrame::SILENCE, "unexpected signal at {i}");
            }
        }
    }

    /// With feedback the impulse returns as a decaying train, each repeat
    /// about `feedback × headroom` of the previous one.
    #[test]
    fn test_feedback_produces_decaying_train() {
        let controls = wet_controls(0.5);
        let mut engine = snapped_engine(Interpolation::Nearest, controls);

        let output = run(&mut engine, &impulse_input(3600), &controls, Topology::DualDelay);

        let echoes: Vec<usize> = (1..=6).map(|k| k * TEST_DELAY - 1).collect();
        for pair in echoes.windows(2) {
            let a = f32::from(output[pair[0]].l);
            let b = f32::from(output[pair[1]].l);
            let ratio = b / a;
            assert!(
                (ratio - 0.5 * FEEDBACK_HEADROOM).abs() < 0.01,
                "ratio {ratio} between {a} and {b}"
            );
            assert_eq!(output[pair[1]].l, output[pair[1]].r);
        }
        for (i, frame) in output.iter().enumerate() {
            if !echoes.contains(&i) && i < echoes[5] {
                assert_eq!(*frame, SampleFrame::SILENCE, "unexpected signal at {i}");
            }
        }
    }

    /// Ping-pong swaps the channels on each pass.
    #[test]
    fn test_ping_pong_alternates_channels() {
        let controls = wet_controls(0.5);
        let mut engine = snapped_engine(Interpolation::Nearest, controls);

        let mut input = vec![SampleFrame::SILENCE; 1800];
        input[0] = SampleFrame::new(i16::MAX, 0);
        let output = run(&mut engine, &input, &controls, Topology::PingPong);

        let first = output[TEST_DELAY - 1];
        let second = output[2 * TEST_DELAY - 1];
        let third = output[3 * TEST_DELAY - 1];
        assert!(first.l > 30000 && first.r == 0, "{first:?}");
        assert!(second.l == 0 && second.r > 15000, "{second:?}");
        assert!(third.l > 8000 && third.r == 0, "{third:?}");
    }

    /// In the open loop the main output crossfades between the inputs and
    /// the left playback is recorded onto the right channel.
    #[test]
    fn test_open_loop_routing() {
        let dry = ControlState {
            drywet: 0.0,
            ..wet_controls(0.0)
        };
        let mut engine = snapped_engine(Interpolation::Nearest, dry);
        let input = noise_input(120, 3);
        let output = run(&mut engine, &input, &dry, Topology::OpenLoop);
        for (inp, out) in input.iter().zip(&output) {
            assert_eq!(out.l, inp.l);
        }

        let wet = wet_controls(0.0);
        let mut engine = snapped_engine(Interpolation::Nearest, wet);
        let input = noise_input(120, 3);
        let output = run(&mut engine, &input, &wet, Topology::OpenLoop);
        for (inp, out) in input.iter().zip(&output) {
            assert_eq!(out.l, inp.r);
        }

        // Left playback at `delay - 1` is recorded on the right one sample
        // later and played back one full delay after that.
        let mut engine = snapped_engine(Interpolation::Nearest, wet);
        let mut input = vec![SampleFrame::SILENCE; 1200];
        input[0] = SampleFrame::new(i16::MAX, 0);
        let output = run(&mut engine, &input, &wet, Topology::OpenLoop);
        assert_eq!(output[2 * TEST_DELAY - 1].r, i16::MAX);
        assert_eq!(output[TEST_DELAY - 1].r, 0);
    }

    /// Once feedback is off and the tape has been fully rewritten with
    /// silence, the output is silent in every topology and kernel.
    #[test]
    fn test_silence_after_flush() {
        for interpolation in [
            Interpolation::Nearest,
            Interpolation::Linear,
            Interpolation::Hermite,
        ] {
            for topology in Topology::ALL {
                let loud = ControlState {
                    time: 0.3,
                    feedback: 0.9,
                    drywet: 0.5,
                    rate: 1.0,
                };
                let mut engine = snapped_engine(interpolation, loud);
                run(&mut engine, &noise_input(1200, 11), &loud, topology);

                let quiet = ControlState {
                    feedback: 0.0,
                    ..loud
                };
                let silence = vec![SampleFrame::SILENCE; 1800];
                let output = run(&mut engine, &silence, &quiet, topology);

                for (i, frame) in output.iter().enumerate().skip(1200) {
                    assert_eq!(
                        *frame,
                        SampleFrame::SILENCE,
                        "{interpolation:?}/{topology:?}: signal at {i}"
                    );
                }
            }
        }
    }

    /// Runaway feedback saturates on the tape instead of wrapping: a
    /// positive input never produces a negative output.
    #[test]
    fn test_runaway_feedback_saturates() {
        let controls = ControlState {
            time: 0.05,
            feedback: 1.0,
            drywet: 0.5,
            rate: 1.0,
        };
        let mut engine = snapped_engine(Interpolation::Nearest, controls);
        let input = vec![SampleFrame::new(29500, 29500); 3000];
        let output = run(&mut engine, &input, &controls, Topology::DualDelay);

        assert!(output.iter().all(|f| f.l >= 0 && f.r >= 0));
        assert_eq!(output.last().map(|f| f.l), Some(i16::MAX));
    }

    /// The dry/wet ramp picks up exactly where the previous block ended:
    /// the step across the block boundary is no larger than the steps
    /// inside the blocks.
    #[test]
    fn test_ramp_is_continuous_across_blocks() {
        let start = ControlState {
            time: 0.5,
            feedback: 0.0,
            drywet: 0.0,
            rate: 1.0,
        };
        let mut engine = snapped_engine(Interpolation::Linear, start);
        let input = vec![SampleFrame::new(16384, 16384); BLOCK];
        let mut output = vec![SampleFrame::SILENCE; 2 * BLOCK];

        let (first, second) = output.split_at_mut(BLOCK);
        let middle = ControlState { drywet: 0.5, ..start };
        engine.process_block(&input, first, &middle, Topology::DualDelay);
        assert_eq!(engine.previous_controls(), middle);
        let end = ControlState { drywet: 1.0, ..start };
        engine.process_block(&input, second, &end, Topology::DualDelay);

        let steps: Vec<i32> = output
            .windows(2)
            .map(|w| (i32::from(w[1].l) - i32::from(w[0].l)).abs())
            .collect();
        let largest_inside = steps
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != BLOCK - 1)
            .map(|(_, s)| *s)
            .max()
            .unwrap();
        let boundary = steps[BLOCK - 1];
        assert!(boundary > 0);
        assert!(
            boundary <= largest_inside + 1,
            "boundary step {boundary}, largest step inside {largest_inside}"
        );
    }

    /// Positive and negative speeds move playback through the tape in
    /// opposite directions at the same pace.
    #[test]
    fn test_direction_symmetry() {
        let progression = |rate: f32| -> f32 {
            let fill = wet_controls(0.0);
            let mut engine = snapped_engine(Interpolation::Hermite, fill);
            run(&mut engine, &noise_input(1200, 5), &fill, Topology::DualDelay);

            let controls = ControlState { rate, ..fill };
            engine.snap(controls);
            let silence = vec![SampleFrame::SILENCE; BLOCK];
            let mut out = vec![SampleFrame::SILENCE; BLOCK];
            engine.process_block(&silence, &mut out, &controls, Topology::DualDelay);

            let capacity = engine.capacity() as f32;
            let mut total = 0.0;
            let mut last = engine.read_position();
            for _ in 0..BLOCK {
                engine.process_block(&silence[..1], &mut out[..1], &controls, Topology::DualDelay);
                let mut delta = engine.read_position() - last;
                if delta > capacity / 2.0 {
                    delta -= capacity;
                } else if delta < -capacity / 2.0 {
                    delta += capacity;
                }
                total += delta;
                last = engine.read_position();
            }
            total
        };

        let forward = progression(0.5);
        let backward = progression(-0.5);
        assert!(forward > 0.0 && backward < 0.0, "{forward} / {backward}");
        assert!((forward + backward).abs() < 1.0, "{forward} / {backward}");
        assert!((forward - 0.5 * BLOCK as f32).abs() < 1.0, "{forward}");
    }

    /// At standstill the speed clamps to the minimum: the record head
    /// barely moves and nothing blows up.
    #[test]
    fn test_standstill_is_clamped() {
        let controls = ControlState {
            rate: 0.0,
            ..wet_controls(0.8)
        };
        let mut engine = snapped_engine(Interpolation::Hermite, controls);
        let output = run(&mut engine, &noise_input(600, 9), &controls, Topology::DualDelay);

        // One cell at the first sample, then one per 1 / MIN_SPEED samples.
        assert_eq!(engine.write_head(), TEST_CAPACITY - 1);
        assert!(engine.read_position().is_finite());
        assert_eq!(output.len(), 600);
    }

    /// A NaN control is treated as zero for that block; the smoothers
    /// stay finite and the engine recovers as soon as the controls do.
    #[test]
    fn test_nan_controls_do_not_stick() {
        let controls = wet_controls(0.0);
        let mut engine = snapped_engine(Interpolation::Nearest, controls);
        let input = vec![SampleFrame::new(10000, 10000); BLOCK];

        let broken = ControlState {
            time: f32::NAN,
            feedback: f32::NAN,
            drywet: f32::NAN,
            rate: f32::NAN,
        };
        assert_eq!(broken.clamped(), ControlState::default());
        run(&mut engine, &input, &broken, Topology::DualDelay);
        assert!(engine.smoothed_rate().is_finite());
        assert!(engine.smoothed_time().is_finite());

        let long_input = vec![SampleFrame::new(10000, 10000); 100 * BLOCK];
        let output = run(&mut engine, &long_input, &controls, Topology::DualDelay);
        assert!((engine.smoothed_rate() - 1.0).abs() < 1e-3);
        let last = output.last().map(|f| f.l).unwrap_or(0);
        assert!(last > 9900, "wet output {last}");
    }

    #[test]
    fn test_infinite_controls_clamp_to_edges() {
        let controls = ControlState {
            time: f32::INFINITY,
            feedback: f32::NEG_INFINITY,
            drywet: 0.5,
            rate: f32::NEG_INFINITY,
        }
        .clamped();
        assert_eq!(controls.time, 1.0);
        assert_eq!(controls.feedback, 0.0);
        assert_eq!(controls.rate, -1.0);
    }

    /// Switching the kernel on a live engine behaves exactly like an
    /// engine built with that kernel.
    #[test]
    fn test_set_interpolation_switches_kernel() {
        let controls = ControlState {
            rate: 0.45,
            ..wet_controls(0.3)
        };
        let input = noise_input(1200, 17);

        let mut switched = snapped_engine(Interpolation::Nearest, controls);
        switched.set_interpolation(Interpolation::Hermite);
        assert_eq!(switched.interpolation(), Interpolation::Hermite);
        let mut fresh = snapped_engine(Interpolation::Hermite, controls);
        let mut nearest = snapped_engine(Interpolation::Nearest, controls);

        let expected = run(&mut fresh, &input, &controls, Topology::DualDelay);
        assert_eq!(
            run(&mut switched, &input, &controls, Topology::DualDelay),
            expected
        );
        assert_ne!(
            run(&mut nearest, &input, &controls, Topology::DualDelay),
            expected
        );
    }

    /// Identical engines produce bit-identical output; the tape hiss only
    /// changes with the seed.
    #[test]
    fn test_determinism() {
        let controls = ControlState {
            time: 0.1,
            feedback: 0.8,
            drywet: 0.7,
            rate: 0.6,
        };
        let input = noise_input(2400, 21);

        let seeded = |seed: u64| {
            let mut engine =
                DelayEngine::with_seed(TEST_CAPACITY, Interpolation::Hermite, seed).unwrap();
            engine.snap(controls);
            engine
        };

        for topology in Topology::ALL {
            let mut a = seeded(1);
            let mut b = seeded(1);
            assert_eq!(
                run(&mut a, &input, &controls, topology),
                run(&mut b, &input, &controls, topology),
                "{topology:?}"
            );
        }

        let mut a = seeded(1);
        let mut b = seeded(2);
        assert_ne!(
            run(&mut a, &input, &controls, Topology::Textured),
            run(&mut b, &input, &controls, Topology::Textured)
        );
    }

    /// Clearing restores the freshly constructed behaviour, hiss included.
    #[test]
    fn test_clear_restarts_identically() {
        let controls = ControlState {
            time: 0.2,
            feedback: 0.7,
            drywet: 0.6,
            rate: 0.8,
        };
        let input = noise_input(600, 8);

        let mut engine = snapped_engine(Interpolation::Linear, controls);
        let first = run(&mut engine, &input, &controls, Topology::Textured);
        engine.clear();
        engine.snap(controls);
        let second = run(&mut engine, &input, &controls, Topology::Textured);
        assert_eq!(first, second);
    }

    /// The time smoother glides slowly towards the target.
    #[test]
    fn test_time_glides() {
        let controls = wet_controls(0.0);
        let mut engine = DelayEngine::new(TEST_CAPACITY, Interpolation::Linear).unwrap();
        engine.snap(ControlState { time: 0.0, ..controls });

        run(&mut engine, &vec![SampleFrame::SILENCE; 600], &controls, Topology::DualDelay);

        let time = engine.smoothed_time();
        assert!(time > 8.0 && time < 15.0, "smoothed time {time}");
    }

    /// The textured loop removes its saturation bias again: a silent loop
    /// stays silent instead of recording a DC offset.
    #[test]
    fn test_textured_loop_has_no_offset() {
        let mut engine = DelayEngine::new(TEST_CAPACITY, Interpolation::Linear).unwrap();
        for _ in 0..100 {
            assert_eq!(engine.texture(0, 0.0, 0.0, 0.0), 0.0);
        }
        let (_, feedback) = engine.feedback(Topology::Textured, FloatFrame::ZERO, 0.0);
        assert_eq!(feedback, FloatFrame::ZERO);
    }

    /// The textured topology soft clips its output where the others clip hard.
    #[test]
    fn test_textured_output_is_soft_clipped() {
        let dry = ControlState {
            drywet: 0.0,
            ..wet_controls(0.0)
        };
        let input = vec![SampleFrame::new(i16::MAX, i16::MAX); BLOCK];

        let mut engine = snapped_engine(Interpolation::Linear, dry);
        let soft = run(&mut engine, &input, &dry, Topology::Textured);
        let mut engine = snapped_engine(Interpolation::Linear, dry);
        let hard = run(&mut engine, &input, &dry, Topology::DualDelay);

        for (soft, hard) in soft.iter().zip(&hard) {
            assert_eq!(hard.l, i16::MAX);
            assert!(soft.l > 25_300 && soft.l < 25_700, "soft output {}", soft.l);
        }
    }

    /// A DC level in the textured loop passes at first and then drains
    /// away through the rumble highpass.
    #[test]
    fn test_textured_loop_removes_dc() {
        let mut engine = DelayEngine::new(TEST_CAPACITY, Interpolation::Linear).unwrap();
        let output: Vec<f32> = (0..5000)
            .map(|_| engine.texture(0, 0.5, 0.5, 1.0))
            .collect();

        let peak = output[..200].iter().fold(0.0_f32, |m, &y| m.max(y));
        assert!(peak > 0.3, "peak {peak}");
        assert!(output[4999].abs() < 1e-4, "settled at {}", output[4999]);
    }

    /// More feedback opens the head-loss lowpass: a sine well above the
    /// low-feedback cutoff comes through louder.
    #[test]
    fn test_feedback_opens_head_loss() {
        let swing = |feedback: f32| {
            let mut engine = DelayEngine::new(TEST_CAPACITY, Interpolation::Linear).unwrap();
            let output: Vec<f32> = (0..3000)
                .map(|i| {
                    let x = 0.3 * (std::f32::consts::TAU * 0.05 * i as f32).sin();
                    engine.texture(1, x, feedback, 1.0)
                })
                .collect();
            let settled = &output[2000..];
            let max = settled.iter().fold(f32::MIN, |m, &y| m.max(y));
            let min = settled.iter().fold(f32::MAX, |m, &y| m.min(y));
            max - min
        };

        let dark = swing(0.1);
        let bright = swing(0.9);
        assert!(dark > 0.05 && dark < 0.15, "dark swing {dark}");
        assert!(bright > 3.0 * dark, "bright swing {bright}, dark swing {dark}");
    }
}
