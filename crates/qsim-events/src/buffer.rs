//! Per-partition event buffers and the deterministic merge.
//!
//! # Ordering
//!
//! Each partition appends to its own [`EventBuffer`] during a step; no
//! locking is involved.  After the barrier the orchestrator merges all
//! buffers by the key
//!
//! ```text
//! (time, partition id, intra-partition sequence number)
//! ```
//!
//! which depends only on what each partition did, never on thread
//! scheduling.  Sequential and parallel runs therefore produce identical
//! streams.

use qsim_core::{PartitionId, SimTime};

use crate::{Event, EventKind};

/// An event tagged with its merge key.
#[derive(Clone, Debug, PartialEq)]
pub struct SequencedEvent {
    pub partition: PartitionId,
    pub seq:       u64,
    pub event:     Event,
}

/// Append-only event sink owned by one partition.
#[derive(Debug)]
pub struct EventBuffer {
    partition: PartitionId,
    next_seq:  u64,
    events:    Vec<SequencedEvent>,
}

impl EventBuffer {
    pub fn new(partition: PartitionId) -> Self {
        Self { partition, next_seq: 0, events: Vec::new() }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Record `kind` at `time`.
    #[inline]
    pub fn emit(&mut self, time: SimTime, kind: EventKind) {
        self.events.push(SequencedEvent {
            partition: self.partition,
            seq:       self.next_seq,
            event:     Event::new(time, kind),
        });
        self.next_seq += 1;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events emitted since the last `take`, in emission order.
    pub fn events(&self) -> impl Iterator<Item = &Event> + '_ {
        self.events.iter().map(|e| &e.event)
    }

    /// Remove and return everything buffered.  Sequence numbers keep
    /// counting across takes.
    pub fn take(&mut self) -> Vec<SequencedEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Merge per-partition batches into one stream ordered by
/// `(time, partition, seq)`.
pub fn merge_buffers<I>(batches: I) -> Vec<Event>
where
    I: IntoIterator<Item = Vec<SequencedEvent>>,
{
    let mut all: Vec<SequencedEvent> = batches.into_iter().flatten().collect();
    all.sort_by_key(|e| (e.event.time, e.partition, e.seq));
    all.into_iter().map(|e| e.event).collect()
}
