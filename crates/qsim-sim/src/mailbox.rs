//! Cross-partition message passing.
//!
//! One `Mutex<Vec<Message>>` per ordered partition pair.  A cell is written
//! only by its source partition during a step and drained only by its target
//! after the barrier, so the locks are never contended.

use std::sync::Mutex;

use qsim_core::{LinkId, PartitionId, SimTime};
use qsim_engine::{PersonAgent, QVehicle, StorageSync};

#[derive(Debug)]
pub enum Message {
    /// A vehicle crossed onto a link owned by the target.
    Vehicle { link: LinkId, vehicle: QVehicle, entered_at: SimTime },
    /// A teleporting agent arriving on a link owned by the target.
    Teleport { arrival: SimTime, agent: PersonAgent },
    /// Storage the owner of `link` freed or gave to departures; update the
    /// mirror.
    StorageSync { link: LinkId, sync: StorageSync },
}

pub struct Mailboxes {
    n:     usize,
    cells: Vec<Mutex<Vec<Message>>>,
}

impl Mailboxes {
    pub fn new(n: usize) -> Self {
        Self { n, cells: (0..n * n).map(|_| Mutex::new(Vec::new())).collect() }
    }

    #[inline]
    fn cell(&self, from: PartitionId, to: PartitionId) -> &Mutex<Vec<Message>> {
        &self.cells[from.index() * self.n + to.index()]
    }

    /// Append `messages` to the `from → to` cell.
    pub fn post(&self, from: PartitionId, to: PartitionId, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        let mut cell = self.cell(from, to).lock().unwrap_or_else(|e| e.into_inner());
        cell.extend(messages);
    }

    /// Everything addressed to `to`, in ascending source order.
    pub fn drain_for(&self, to: PartitionId) -> Vec<Message> {
        let mut out = Vec::new();
        for from in 0..self.n {
            let mut cell = self.cell(PartitionId(from as u32), to).lock().unwrap_or_else(|e| e.into_inner());
            out.append(&mut cell);
        }
        out
    }

    /// `true` if no message is in flight.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.lock().map_or(true, |v| v.is_empty()))
    }
}
