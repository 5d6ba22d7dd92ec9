//! Output scheduling
//!
//! Pictures bumped out of the DPB wait in a FIFO until more than
//! `preferred_output_delay` of them are queued, so a pipelined backend can
//! keep several pictures in flight before the first one is displayed.

use std::collections::VecDeque;
use std::time::Duration;

use super::picture::PictureRef;
use crate::util::Rational;

/// One bumped picture and the frame it was decoded from
#[derive(Debug, Clone)]
pub struct OutputEntry {
    pub frame_number: u32,
    pub picture: PictureRef,
}

/// FIFO between the DPB and `output_picture`
#[derive(Debug, Default)]
pub struct OutputQueue {
    entries: VecDeque<OutputEntry>,
    delay: u32,
}

impl OutputQueue {
    pub fn new(delay: u32) -> Self {
        OutputQueue {
            entries: VecDeque::with_capacity(delay as usize + 1),
            delay,
        }
    }

    /// Preferred output delay in pictures
    pub fn delay(&self) -> u32 {
        self.delay
    }

    pub fn set_delay(&mut self, delay: u32) {
        self.delay = delay;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, frame_number: u32, picture: PictureRef) {
        self.entries.push_back(OutputEntry {
            frame_number,
            picture,
        });
    }

    /// Next entry to hand out, once more than `delay` entries are queued
    pub fn pop_ready(&mut self) -> Option<OutputEntry> {
        if self.entries.len() > self.delay as usize {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// Take every entry regardless of the delay, oldest first
    pub fn drain(&mut self) -> impl Iterator<Item = OutputEntry> + '_ {
        self.entries.drain(..)
    }
}

/// Frame rate used when neither VUI nor VPS carries timing information
pub const DEFAULT_FRAMERATE: Rational = Rational { num: 25, den: 1 };

/// Decoder latency reported to the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyInfo {
    /// Time the first picture of a sequence waits before it can be output
    pub min: Duration,
    /// Time a picture can stay in the decoder at most
    pub max: Duration,
}

impl LatencyInfo {
    /// Latency of a sequence
    ///
    /// The minimum covers the reorder depth plus the output delay, the
    /// maximum a full DPB plus the output delay. A non-positive `framerate`
    /// falls back to [`DEFAULT_FRAMERATE`].
    pub fn compute(
        max_num_reorder_pics: u32,
        max_dpb_size: u32,
        output_delay: u32,
        framerate: Option<Rational>,
    ) -> Self {
        let fps = framerate
            .filter(|r| r.is_positive())
            .unwrap_or(DEFAULT_FRAMERATE);

        let min_frames = u64::from(max_num_reorder_pics) + u64::from(output_delay);
        let max_frames = u64::from(max_dpb_size) + u64::from(output_delay);

        LatencyInfo {
            min: fps.frames_to_duration(min_frames).unwrap_or_default(),
            max: fps.frames_to_duration(max_frames).unwrap_or(Duration::MAX),
        }
    }
}
