// SPDX-License-Identifier: MIT

//! Delta conflator (spec.md §4.D): batches raw `stream-block-delta`
//! payloads arriving within a flush window so a stream of single-byte
//! text deltas does not flood the fan-out.
//!
//! This type is the synchronous accumulator only. The ~50 ms flush timer
//! itself is armed by the session runtime's event loop (spec.md §4.E),
//! which calls [`Conflator::flush`] on timer expiry or immediately before
//! routing any non-delta event, per the ordering guarantee in spec.md §5
//! ("non-delta events... must observe the merged state before they are
//! processed").

use crate::event::StreamDelta;
use indexmap::IndexMap;

/// The part of a `stream-block-delta` that participates in merge identity:
/// (block-index, delta-kind). Payloads for the same key concatenate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PendingKey {
    index: u32,
    kind: DeltaKindTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DeltaKindTag {
    Text,
    Thinking,
    InputJson,
    Signature,
}

impl StreamDelta {
    fn kind_tag(&self) -> DeltaKindTag {
        match self {
            StreamDelta::Text(_) => DeltaKindTag::Text,
            StreamDelta::Thinking(_) => DeltaKindTag::Thinking,
            StreamDelta::InputJson(_) => DeltaKindTag::InputJson,
            StreamDelta::Signature(_) => DeltaKindTag::Signature,
        }
    }

    fn payload(&self) -> &str {
        match self {
            StreamDelta::Text(s)
            | StreamDelta::Thinking(s)
            | StreamDelta::InputJson(s)
            | StreamDelta::Signature(s) => s,
        }
    }

    fn rebuild(kind: DeltaKindTag, payload: String) -> Self {
        match kind {
            DeltaKindTag::Text => StreamDelta::Text(payload),
            DeltaKindTag::Thinking => StreamDelta::Thinking(payload),
            DeltaKindTag::InputJson => StreamDelta::InputJson(payload),
            DeltaKindTag::Signature => StreamDelta::Signature(payload),
        }
    }
}

/// Accumulates raw block-deltas between flushes, preserving the arrival
/// order of each key's first contribution (spec.md §5: "the conflator
/// inserting merged deltas at the position of the first contributing raw
/// delta").
#[derive(Debug, Default)]
pub struct Conflator {
    pending: IndexMap<PendingKey, String>,
}

impl Conflator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fold one raw delta into the pending table.
    pub fn ingest(&mut self, index: u32, delta: StreamDelta) {
        let key = PendingKey {
            index,
            kind: delta.kind_tag(),
        };
        self.pending
            .entry(key)
            .or_default()
            .push_str(delta.payload());
    }

    /// Drain the pending table, returning one merged delta per key in the
    /// order each key was first inserted.
    pub fn flush(&mut self) -> Vec<(u32, StreamDelta)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, payload)| (key.index, StreamDelta::rebuild(key.kind, payload)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_same_key_payloads() {
        let mut c = Conflator::new();
        c.ingest(0, StreamDelta::Text("Hello ".into()));
        c.ingest(0, StreamDelta::Text("world".into()));
        let flushed = c.flush();
        assert_eq!(flushed, vec![(0, StreamDelta::Text("Hello world".into()))]);
        assert!(c.is_empty());
    }

    #[test]
    fn keeps_distinct_indices_and_kinds_separate() {
        let mut c = Conflator::new();
        c.ingest(0, StreamDelta::Text("a".into()));
        c.ingest(1, StreamDelta::Text("b".into()));
        c.ingest(0, StreamDelta::InputJson("{}".into()));
        let flushed = c.flush();
        assert_eq!(flushed.len(), 3);
    }

    #[test]
    fn preserves_first_insertion_order() {
        let mut c = Conflator::new();
        c.ingest(2, StreamDelta::Text("z".into()));
        c.ingest(0, StreamDelta::Text("a".into()));
        c.ingest(2, StreamDelta::Text("z2".into()));
        let flushed = c.flush();
        assert_eq!(flushed[0].0, 2);
        assert_eq!(flushed[1].0, 0);
    }

    #[test]
    fn flush_clears_table() {
        let mut c = Conflator::new();
        c.ingest(0, StreamDelta::Text("a".into()));
        c.flush();
        assert!(c.flush().is_empty());
    }
}
