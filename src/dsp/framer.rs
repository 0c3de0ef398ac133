//! # Block Framing
//!
//! Hosts call `process()` with whatever buffer size they like, but the
//! engine runs on fixed blocks of [`BLOCK_SIZE`] frames with one control
//! snapshot each. [`BlockFramer`] sits in between: host samples are queued
//! into an input block, and the output is played back from the block the
//! engine processed last.
//!
//! ```text
//!  host sample n ──► input[(n + 1) % 60]
//!                         │  when the slot index wraps to 0:
//!                         ▼  engine(input → output)
//!  host output n ◄── output[(n + 1) % 60]       (sample n − 60)
//! ```
//!
//! Slot 0 is filled *after* the block containing it has been handed to the
//! engine, so it holds the oldest sample of the next block and every block
//! is processed in chronological order. Every sample comes back exactly
//! [`BLOCK_SIZE`] samples later.

use super::frame::{FloatFrame, SampleFrame};

/// Engine block length: controls are sampled once per block. This is also
/// the latency the plugin reports.
pub const BLOCK_SIZE: usize = 60;

/// Fixed-size block queue between the host and the engine.
pub struct BlockFramer {
    /// Host samples waiting for the next engine block.
    input: [SampleFrame; BLOCK_SIZE],

    /// The last processed block, played back while the next one fills.
    output: [SampleFrame; BLOCK_SIZE],

    /// Current slot in both blocks.
    frame: usize,
}

impl Default for BlockFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockFramer {
    pub fn new() -> Self {
        Self {
            input: [SampleFrame::SILENCE; BLOCK_SIZE],
            output: [SampleFrame::SILENCE; BLOCK_SIZE],
            frame: 0,
        }
    }

    /// Silence both queues and restart at slot 0.
    pub fn clear(&mut self) {
        self.input = [SampleFrame::SILENCE; BLOCK_SIZE];
        self.output = [SampleFrame::SILENCE; BLOCK_SIZE];
        self.frame = 0;
    }

    /// Queue one host frame and return the frame to play now.
    ///
    /// Without a right channel (mono) the left sample feeds both sides of
    /// the tape. `process` runs once every [`BLOCK_SIZE`] calls with a full
    /// input block and the output block to fill.
    #[inline]
    pub fn push<F>(&mut self, left: f32, right: Option<f32>, process: F) -> FloatFrame
    where
        F: FnOnce(&[SampleFrame], &mut [SampleFrame]),
    {
        self.frame += 1;
        if self.frame >= BLOCK_SIZE {
            self.frame = 0;
            process(&self.input, &mut self.output);
        }

        let right = right.unwrap_or(left);
        self.input[self.frame] = SampleFrame::from_float(FloatFrame::new(left, right));
        self.output[self.frame].to_float()
    }
}
