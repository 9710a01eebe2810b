// SPDX-License-Identifier: MIT

//! Fan-out and replay buffer (spec.md §4.F).
//!
//! Each Session Runtime owns one [`FanoutRing`]: a bounded ring of recent
//! outbound frames tagged with monotonic sequence numbers, sized to cover
//! roughly one full turn end-to-end (spec.md §9 "Ring buffer size... choose
//! the smallest size that still covers one normal turn"). The ring only
//! answers "what did I miss since id N"; the attach-time `state` snapshot
//! is always built fresh by the runtime, not served from here.

use gueridon_core::FolderName;
use std::collections::VecDeque;
use std::sync::Arc;

/// Frames are capped at whichever of these limits is hit first.
pub const RING_MAX_FRAMES: usize = 500;
pub const RING_MAX_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    State,
    Delta,
}

/// One outbound frame: a monotonic sequence id, the folder it belongs to,
/// and a pre-serialized JSON payload ready for wire delivery.
#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: u64,
    pub folder: FolderName,
    pub kind: FrameKind,
    pub payload: Arc<str>,
}

/// Bounded ring of recent frames for one Session Runtime.
pub struct FanoutRing {
    frames: VecDeque<Frame>,
    next_seq: u64,
    total_bytes: usize,
    max_frames: usize,
    max_bytes: usize,
}

impl Default for FanoutRing {
    fn default() -> Self {
        Self::new(RING_MAX_FRAMES, RING_MAX_BYTES)
    }
}

impl FanoutRing {
    pub fn new(max_frames: usize, max_bytes: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            next_seq: 1,
            total_bytes: 0,
            max_frames,
            max_bytes,
        }
    }

    /// Assign the next sequence id, append to the ring, and return the
    /// frame the caller should hand to every currently attached client.
    pub fn push(&mut self, folder: FolderName, kind: FrameKind, payload: impl Into<Arc<str>>) -> Frame {
        let payload = payload.into();
        let frame = Frame {
            seq: self.next_seq,
            folder,
            kind,
            payload,
        };
        self.next_seq += 1;
        self.total_bytes += frame.payload.len();
        self.frames.push_back(frame.clone());
        self.evict_overflow();
        frame
    }

    fn evict_overflow(&mut self) {
        while self.frames.len() > self.max_frames || self.total_bytes > self.max_bytes {
            let Some(dropped) = self.frames.pop_front() else {
                break;
            };
            self.total_bytes = self.total_bytes.saturating_sub(dropped.payload.len());
        }
    }

    /// Oldest sequence id still retained, if any.
    pub fn oldest_seq(&self) -> Option<u64> {
        self.frames.front().map(|f| f.seq)
    }

    /// Frames strictly after `last_seen_seq`, or `None` if `last_seen_seq`
    /// has already aged out of the ring (spec.md §4.F "Frames older than
    /// the ring's retention are not recoverable").
    pub fn replay_since(&self, last_seen_seq: u64) -> Option<Vec<Frame>> {
        match self.oldest_seq() {
            Some(oldest) if oldest <= last_seen_seq + 1 => Some(
                self.frames
                    .iter()
                    .filter(|f| f.seq > last_seen_seq)
                    .cloned()
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder() -> FolderName {
        FolderName::new("alpha")
    }

    #[test]
    fn push_assigns_monotonic_sequence() {
        let mut ring = FanoutRing::default();
        let f1 = ring.push(folder(), FrameKind::Delta, "a");
        let f2 = ring.push(folder(), FrameKind::Delta, "b");
        assert_eq!(f1.seq, 1);
        assert_eq!(f2.seq, 2);
    }

    #[test]
    fn evicts_oldest_frame_count_first() {
        let mut ring = FanoutRing::new(2, RING_MAX_BYTES);
        ring.push(folder(), FrameKind::Delta, "a");
        ring.push(folder(), FrameKind::Delta, "b");
        ring.push(folder(), FrameKind::Delta, "c");
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.oldest_seq(), Some(2));
    }

    #[test]
    fn evicts_by_byte_budget() {
        let mut ring = FanoutRing::new(RING_MAX_FRAMES, 5);
        ring.push(folder(), FrameKind::Delta, "abc");
        ring.push(folder(), FrameKind::Delta, "def");
        // total would be 6 bytes, over budget of 5, so the first is evicted.
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.oldest_seq(), Some(2));
    }

    #[test]
    fn replay_since_returns_frames_after_id() {
        let mut ring = FanoutRing::default();
        ring.push(folder(), FrameKind::Delta, "a");
        ring.push(folder(), FrameKind::Delta, "b");
        ring.push(folder(), FrameKind::Delta, "c");
        let replay = ring.replay_since(1).unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay[0].seq, 2);
        assert_eq!(replay[1].seq, 3);
    }

    #[test]
    fn replay_since_none_when_aged_out() {
        let mut ring = FanoutRing::new(2, RING_MAX_BYTES);
        ring.push(folder(), FrameKind::Delta, "a");
        ring.push(folder(), FrameKind::Delta, "b");
        ring.push(folder(), FrameKind::Delta, "c");
        // seq 1 has been evicted; asking for anything after it is unrecoverable.
        assert!(ring.replay_since(1).is_none());
    }

    #[test]
    fn replay_since_latest_seen_is_empty_not_none() {
        let mut ring = FanoutRing::default();
        ring.push(folder(), FrameKind::Delta, "a");
        let replay = ring.replay_since(1).unwrap();
        assert!(replay.is_empty());
    }
}
