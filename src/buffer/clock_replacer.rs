//! Clock replacement policy.
//!
//! Frames sit on a circular list indexed by frame id. Unpinning a frame makes
//! it a candidate and sets its reference flag. The clock hand sweeps the
//! candidates, clearing set flags, and evicts the first candidate whose flag
//! is already clear.

use parking_lot::Mutex;

use crate::common::FrameId;

use super::Replacer;

struct ClockState {
    /// Whether each frame is currently a victim candidate
    in_replacer: Vec<bool>,
    /// Reference flag per frame, set on unpin
    ref_flag: Vec<bool>,
    /// Current position of the clock hand
    hand: usize,
    /// Number of candidates
    size: usize,
}

/// Clock-based approximation of LRU.
pub struct ClockReplacer {
    num_frames: usize,
    state: Mutex<ClockState>,
}

impl ClockReplacer {
    /// Creates a clock replacer tracking frame ids `0..num_frames`.
    pub fn new(num_frames: usize) -> Self {
        Self {
            num_frames,
            state: Mutex::new(ClockState {
                in_replacer: vec![false; num_frames],
                ref_flag: vec![false; num_frames],
                hand: 0,
                size: 0,
            }),
        }
    }

    /// Returns the current clock hand position.
    pub fn hand_position(&self) -> usize {
        self.state.lock().hand
    }

    fn in_range(&self, frame_id: FrameId) -> bool {
        frame_id.as_usize() < self.num_frames
    }
}

impl Replacer for ClockReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if state.size == 0 {
            return None;
        }

        // Every candidate has its flag cleared within one revolution, so this
        // finds a victim within two.
        loop {
            let pos = state.hand;
            state.hand = (pos + 1) % self.num_frames;

            if !state.in_replacer[pos] {
                continue;
            }
            if state.ref_flag[pos] {
                state.ref_flag[pos] = false;
                continue;
            }

            state.in_replacer[pos] = false;
            state.size -= 1;
            return Some(FrameId::new(pos as u32));
        }
    }

    fn pin(&self, frame_id: FrameId) {
        if !self.in_range(frame_id) {
            return;
        }
        let mut state = self.state.lock();
        let pos = frame_id.as_usize();
        if state.in_replacer[pos] {
            state.in_replacer[pos] = false;
            state.ref_flag[pos] = false;
            state.size -= 1;
        }
    }

    fn unpin(&self, frame_id: FrameId) {
        if !self.in_range(frame_id) {
            return;
        }
        let mut state = self.state.lock();
        let pos = frame_id.as_usize();
        if !state.in_replacer[pos] {
            state.in_replacer[pos] = true;
            state.size += 1;
        }
        state.ref_flag[pos] = true;
    }

    fn size(&self) -> usize {
        self.state.lock().size
    }
}

impl std::fmt::Debug for ClockReplacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ClockReplacer")
            .field("num_frames", &self.num_frames)
            .field("hand", &state.hand)
            .field("size", &state.size)
            .finish()
    }
}
