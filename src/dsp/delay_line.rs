//! # Tape Loop (Ring Buffer)
//!
//! The delay memory is a circular "tape" of 16-bit stereo frames with a
//! single record head. Unlike a fixed-speed delay line, the record head
//! can move in either direction: when the tape runs backwards the head
//! steps to lower indices, wrapping from the start of the buffer to the
//! end.
//!
//! ```text
//!      index:   0   1   2   3   4   5   6   7
//!             ┌───┬───┬───┬───┬───┬───┬───┬───┐
//!             │   │   │   │ ▲ │   │   │   │   │
//!             └───┴───┴───┴─┼─┴───┴───┴───┴───┘
//!                           head
//!      step(+1): 3 → 4          step(-1): 3 → 2
//!      step(+1) at 7 → 0        step(-1) at 0 → 7
//! ```
//!
//! Reading happens at arbitrary positions: [`DelayLine::taps`] returns four
//! consecutive frames starting at an index, wrapping forward, for the
//! interpolation kernels.
//!
//! The buffer is allocated once in [`DelayLine::new`]; nothing on the audio
//! path allocates.

use super::frame::SampleFrame;

/// A circular buffer of stereo frames with a bidirectional record head.
pub struct DelayLine {
    /// The tape. Starts silent.
    buffer: Vec<SampleFrame>,

    /// Where the next frame will be recorded.
    head: usize,
}

impl DelayLine {
    /// Create a silent tape holding `capacity` frames.
    ///
    /// `capacity` must be non-zero; the engine validates this before
    /// building its tape.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![SampleFrame::SILENCE; capacity],
            head: 0,
        }
    }

    /// Number of frames on the tape.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Current record head position.
    pub fn head(&self) -> usize {
        self.head
    }

    /// Record a frame at the head. Does not move the head.
    #[inline]
    pub fn write(&mut self, frame: SampleFrame) {
        self.buffer[self.head] = frame;
    }

    /// Move the head one cell forward (`direction > 0`) or backward
    /// (`direction < 0`), wrapping at both ends.
    #[inline]
    pub fn step(&mut self, direction: i32) {
        if direction >= 0 {
            self.head += 1;
            if self.head >= self.buffer.len() {
                self.head = 0;
            }
        } else if self.head == 0 {
            self.head = self.buffer.len() - 1;
        } else {
            self.head -= 1;
        }
    }

    /// The frame at `index` and its three forward neighbours.
    #[inline]
    pub fn taps(&self, index: usize) -> [SampleFrame; 4] {
        let len = self.buffer.len();
        let i = index % len;
        [
            self.buffer[i],
            self.buffer[(i + 1) % len],
            self.buffer[(i + 2) % len],
            self.buffer[(i + 3) % len],
        ]
    }

    /// Wrap a fractional position into `[0, len)`. Negative positions are
    /// moved forward by whole buffer lengths.
    #[inline]
    pub fn wrap_position(&self, mut position: f32) -> f32 {
        let len = self.buffer.len() as f32;
        while position < 0.0 {
            position += len;
        }
        while position >= len {
            position -= len;
        }
        position
    }

    /// Erase the tape and park the head at zero.
    pub fn clear(&mut self) {
        self.buffer.fill(SampleFrame::SILENCE);
        self.head = 0;
    }
}
