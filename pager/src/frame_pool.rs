use std::collections::VecDeque;

use crate::FrameIndex;

/// One physical slot's worth of bytes.
pub struct Frame {
    bytes: Box<[u8]>,
}

impl Frame {
    pub fn new(frame_size: usize) -> Self {
        Frame {
            bytes: vec![0; frame_size].into_boxed_slice(),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Tracks which frame slots are unclaimed. Frame contents live elsewhere.
pub struct FramePool {
    free_frames: VecDeque<FrameIndex>,
    in_use: Vec<bool>,
}

impl FramePool {
    pub fn new(frame_count: usize) -> Self {
        FramePool {
            free_frames: (0..frame_count).collect(),
            in_use: vec![false; frame_count],
        }
    }

    /// `None` means every frame is committed; the caller evicts.
    pub fn try_acquire_free(&mut self) -> Option<FrameIndex> {
        let frame_index = self.free_frames.pop_front()?;

        self.in_use[frame_index] = true;

        Some(frame_index)
    }

    /// Returns false if the frame was already free or out of range.
    pub fn release(&mut self, frame_index: FrameIndex) -> bool {
        match self.in_use.get_mut(frame_index) {
            Some(in_use) if *in_use => {
                *in_use = false;
                self.free_frames.push_back(frame_index);
                true
            }
            _ => false,
        }
    }

    pub fn is_free(&self, frame_index: FrameIndex) -> bool {
        matches!(self.in_use.get(frame_index), Some(false))
    }

    pub fn free_count(&self) -> usize {
        self.free_frames.len()
    }

    pub fn capacity(&self) -> usize {
        self.in_use.len()
    }
}
