//! # Tapeworm Delay: A Variable-Speed Tape Delay Plugin
//!
//! A tape-style delay built with [nih-plug](https://github.com/robbert-vdh/nih-plug),
//! exported as CLAP, VST3 and (through clap-wrapper) AUv2. The tape runs
//! at a variable speed in either direction, so the repeats can be slowed
//! down, pitched, frozen and played backwards. Four feedback topologies
//! route the loop differently: open loop, dual delay, a noisy saturated
//! "tape" loop, and ping-pong.
//!
//! ## Signal Flow
//!
//! ```text
//!  host ──► f32 → i16 ──► [ input block (60) ]
//!                                │  every 60 samples
//!                                ▼
//!                         ┌─────────────┐   ControlState (sampled once per block)
//!                         │ DelayEngine │ ◄──────────────── params
//!                         └─────────────┘
//!                                │
//!                                ▼
//!  host ◄── i16 → f32 ◄── [ output block (60) ]
//! ```
//!
//! The engine is updated at a fixed cadence of one control snapshot per
//! 60-sample block, independent of the host's buffer size. Samples are
//! queued into a block and played back one block later, so the plugin
//! reports 60 samples of latency.

pub mod dsp;
mod params;

use std::num::NonZeroU32;
use std::sync::Arc;

use dsp::engine::{DelayEngine, DEFAULT_CAPACITY, MIN_SPEED};
use dsp::framer::{BlockFramer, BLOCK_SIZE};
use nih_plug::prelude::*;
use params::PluginParams;

/// The main plugin struct.
///
/// Parameters are shared with the host through the `Arc`; everything else
/// is owned by the audio thread.
struct TapewormDelay {
    params: Arc<PluginParams>,

    /// Built in `initialize()`, where the tape is allocated.
    engine: Option<DelayEngine>,

    /// Queues host samples into engine blocks.
    framer: BlockFramer,
}

impl Default for TapewormDelay {
    fn default() -> Self {
        Self {
            params: Arc::new(PluginParams::default()),
            engine: None,
            framer: BlockFramer::new(),
        }
    }
}

impl Plugin for TapewormDelay {
    const NAME: &'static str = "Tapeworm Delay";
    const VENDOR: &'static str = "Loveless Audio";
    const URL: &'static str = "";
    const EMAIL: &'static str = "";
    const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    // Stereo first. In mono the single channel feeds both sides of the
    // tape and receives the left output.
    const AUDIO_IO_LAYOUTS: &'static [AudioIOLayout] = &[
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(2),
            main_output_channels: NonZeroU32::new(2),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
        AudioIOLayout {
            main_input_channels: NonZeroU32::new(1),
            main_output_channels: NonZeroU32::new(1),
            aux_input_ports: &[],
            aux_output_ports: &[],
            names: PortNames::const_default(),
        },
    ];

    const MIDI_INPUT: MidiConfig = MidiConfig::None;

    // Controls are read once per engine block; sample-accurate automation
    // would only split host buffers for nothing.
    const SAMPLE_ACCURATE_AUTOMATION: bool = false;

    type SysExMessage = ();
    type BackgroundTask = ();

    fn params(&self) -> Arc<dyn Params> {
        self.params.clone()
    }

    /// Allocates the tape.
    fn initialize(
        &mut self,
        _audio_io_layout: &AudioIOLayout,
        _buffer_config: &BufferConfig,
        context: &mut impl InitContext<Self>,
    ) -> bool {
        let interpolation = self.params.interpolation();
        let mut engine = match DelayEngine::new(DEFAULT_CAPACITY, interpolation) {
            Ok(engine) => engine,
            Err(err) => {
                nih_log!("Could not build the delay engine: {err}");
                return false;
            }
        };
        engine.snap(self.params.controls());

        nih_log!(
            "Tape ready: {} frames, {:?} interpolation",
            engine.capacity(),
            engine.interpolation()
        );

        self.engine = Some(engine);
        self.framer.clear();
        context.set_latency_samples(BLOCK_SIZE as u32);

        true
    }

    /// Erase the tape and the block queues, and settle the engine on the
    /// current knob positions.
    fn reset(&mut self) {
        self.framer.clear();
        if let Some(engine) = self.engine.as_mut() {
            engine.clear();
            engine.snap(self.params.controls());
        }
    }

    fn process(
        &mut self,
        buffer: &mut Buffer,
        _aux: &mut AuxiliaryBuffers,
        _context: &mut impl ProcessContext<Self>,
    ) -> ProcessStatus {
        let Some(engine) = self.engine.as_mut() else {
            return ProcessStatus::Normal;
        };

        let params = &self.params;
        for mut channel_samples in buffer.iter_samples() {
            let mut channels = channel_samples.iter_mut();
            let Some(left) = channels.next() else {
                continue;
            };
            let right = channels.next();

            // Whenever a full block is queued, the engine runs on it with
            // a fresh control snapshot.
            let output = self.framer.push(*left, right.as_deref().copied(), |input, output| {
                engine.set_interpolation(params.interpolation());
                engine.process_block(input, output, &params.controls(), params.topology());
            });

            *left = output.l;
            if let Some(right) = right {
                *right = output.r;
            }
        }

        // With feedback the loop can ring (or self-oscillate) forever.
        // Without it the tail is one pass over the tape at the current
        // speed, plus the block queue.
        let controls = self.params.controls();
        if controls.feedback > 0.0 {
            return ProcessStatus::KeepAlive;
        }
        let speed = controls.rate.abs().max(MIN_SPEED);
        let tape_pass = engine.capacity() as f32 / speed;
        ProcessStatus::Tail(tape_pass as u32 + 2 * BLOCK_SIZE as u32)
    }
}

impl ClapPlugin for TapewormDelay {
    const CLAP_ID: &'static str = "com.loveless-audio.tapeworm-delay";
    const CLAP_DESCRIPTION: Option<&'static str> =
        Some("A variable-speed tape delay with four feedback topologies");
    const CLAP_MANUAL_URL: Option<&'static str> = None;
    const CLAP_SUPPORT_URL: Option<&'static str> = None;
    const CLAP_FEATURES: &'static [ClapFeature] = &[
        ClapFeature::AudioEffect,
        ClapFeature::Stereo,
        ClapFeature::Delay,
    ];
}

impl Vst3Plugin for TapewormDelay {
    const VST3_CLASS_ID: [u8; 16] = *b"TapewormDelay001";

    const VST3_SUBCATEGORIES: &'static [Vst3SubCategory] =
        &[Vst3SubCategory::Fx, Vst3SubCategory::Delay];
}

nih_export_clap!(TapewormDelay);
nih_export_vst3!(TapewormDelay);

// AUv2 entry point for Logic Pro, wrapping the CLAP export.
clap_wrapper::export_auv2!();
