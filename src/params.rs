//! # Plugin Parameters
//!
//! Parameters are the knobs the user sees in the DAW. The engine does its
//! own per-block ramping and smoothing, so none of these use nih-plug's
//! smoothers: the plugin samples the plain values once per engine block
//! and hands them over as a [`ControlState`].
//!
//! Every parameter ID is part of saved presets and projects. Once
//! published, never change them.
//!
//! ## Speed Curve
//!
//! The speed knob covers both directions of tape travel: fully left is
//! full speed backwards, the middle is standstill, fully right is full
//! speed forwards. The knob position goes through a cubic so that most
//! of the travel is spent on slow speeds, where small changes are most
//! audible:
//!
//! ```text
//! rate = (2 · knob − 1)³
//!
//! knob   0.0   0.25    0.5   0.75   1.0
//! rate  -1.0  -0.125   0.0  0.125   1.0
//! ```

use std::sync::Arc;

use nih_plug::prelude::*;

use crate::dsp::engine::{ControlState, Topology};
use crate::dsp::interpolation::Interpolation;

/// Host-facing mirror of [`Topology`].
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyChoice {
    #[id = "open"]
    #[name = "Open Loop"]
    OpenLoop,

    #[id = "dual"]
    #[name = "Dual Delay"]
    DualDelay,

    #[id = "tape"]
    #[name = "Tape"]
    Textured,

    #[id = "pingpong"]
    #[name = "Ping-Pong"]
    PingPong,
}

impl From<TopologyChoice> for Topology {
    fn from(choice: TopologyChoice) -> Self {
        match choice {
            TopologyChoice::OpenLoop => Topology::OpenLoop,
            TopologyChoice::DualDelay => Topology::DualDelay,
            TopologyChoice::Textured => Topology::Textured,
            TopologyChoice::PingPong => Topology::PingPong,
        }
    }
}

/// Host-facing mirror of [`Interpolation`].
#[derive(Enum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationChoice {
    #[id = "zoh"]
    #[name = "Nearest"]
    Nearest,

    #[id = "linear"]
    #[name = "Linear"]
    Linear,

    #[id = "hermite"]
    #[name = "Hermite"]
    Hermite,
}

impl From<InterpolationChoice> for Interpolation {
    fn from(choice: InterpolationChoice) -> Self {
        match choice {
            InterpolationChoice::Nearest => Interpolation::Nearest,
            InterpolationChoice::Linear => Interpolation::Linear,
            InterpolationChoice::Hermite => Interpolation::Hermite,
        }
    }
}

/// Map the speed knob to a signed tape rate.
pub fn rate_curve(knob: f32) -> f32 {
    let bipolar = knob.clamp(0.0, 1.0) * 2.0 - 1.0;
    bipolar * bipolar * bipolar
}

/// All user-facing parameters of the tape delay.
#[derive(Params)]
pub struct PluginParams {
    /// **Speed**: tape transport speed and direction. See the module docs
    /// for the curve.
    #[id = "speed"]
    pub speed: FloatParam,

    /// **Time**: distance between record and playback head, as a fraction
    /// of the tape. At full speed the whole tape is roughly a quarter of a
    /// second at 48 kHz; slower speeds stretch it.
    #[id = "time"]
    pub time: FloatParam,

    /// **Feedback**: how much of the playback returns to the tape. The
    /// engine adds 10% headroom on top, so the top of the range
    /// self-oscillates.
    #[id = "fdbk"]
    pub feedback: FloatParam,

    /// **Dry/Wet**: equal-power crossfade between input and tape. In the
    /// open loop topology it crossfades between the two inputs instead.
    #[id = "mix"]
    pub mix: FloatParam,

    /// **Topology**: feedback routing. Persisted with the project.
    #[id = "shape"]
    pub topology: EnumParam<TopologyChoice>,

    /// **Interpolation**: reconstruction kernel for recording and playback.
    /// Read once per engine block like the other controls. Not automatable.
    #[id = "interp"]
    pub interpolation: EnumParam<InterpolationChoice>,
}

impl Default for PluginParams {
    fn default() -> Self {
        Self {
            speed: FloatParam::new("Speed", 1.0, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("x")
                .with_value_to_string(Arc::new(|knob| format!("{:+.3}", rate_curve(knob)))),

            time: FloatParam::new("Time", 0.5, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            feedback: FloatParam::new(
                "Feedback",
                0.40, // A handful of repeats
                FloatRange::Linear { min: 0.0, max: 1.0 },
            )
            .with_unit("%")
            .with_value_to_string(formatters::v2s_f32_percentage(1))
            .with_string_to_value(formatters::s2v_f32_percentage()),

            mix: FloatParam::new("Dry/Wet", 0.50, FloatRange::Linear { min: 0.0, max: 1.0 })
                .with_unit("%")
                .with_value_to_string(formatters::v2s_f32_percentage(1))
                .with_string_to_value(formatters::s2v_f32_percentage()),

            topology: EnumParam::new("Topology", TopologyChoice::OpenLoop),

            interpolation: EnumParam::new("Interpolation", InterpolationChoice::Hermite)
                .non_automatable(),
        }
    }
}

impl PluginParams {
    /// Snapshot of the current targets for the next engine block.
    pub fn controls(&self) -> ControlState {
        ControlState {
            time: self.time.value(),
            feedback: self.feedback.value(),
            drywet: self.mix.value(),
            rate: rate_curve(self.speed.value()),
        }
    }

    pub fn topology(&self) -> Topology {
        self.topology.value().into()
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation.value().into()
    }
}
