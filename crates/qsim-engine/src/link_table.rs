//! A partition's view of every network link.
//!
//! Indexed by `LinkId` over the whole network so lookups stay O(1).  Each
//! slot is one of:
//!
//! | Slot       | Meaning                                                     |
//! |------------|-------------------------------------------------------------|
//! | `Local`    | owned here (to-node in this partition); full queue state    |
//! | `SplitOut` | owned elsewhere, from-node here; storage mirror only        |
//! | `Foreign`  | neither end here; never touched                             |

use qsim_core::{LinkId, PartitionId, SimConfig};
use qsim_network::{Network, Partitioning};

use crate::link_queue::{LinkOccupancy, LinkQueue, SplitOutLink, StorageSync};
use crate::{EngineError, EngineResult};

#[derive(Debug)]
pub enum LinkSlot {
    Local(LinkQueue),
    SplitOut(SplitOutLink),
    Foreign,
}

#[derive(Debug)]
pub struct LinkTable {
    partition: PartitionId,
    slots:     Vec<LinkSlot>,
    /// Ids of `Local` slots, ascending.
    local_ids: Vec<LinkId>,
}

impl LinkTable {
    pub fn new(network: &Network, partitioning: &Partitioning, partition: PartitionId, config: &SimConfig) -> Self {
        let mut local_ids = Vec::new();
        let slots = network
            .links
            .iter()
            .map(|link| {
                let owner = partitioning.owner_of_link(network, link.id);
                let upstream = partitioning.upstream_of_link(network, link.id);
                if owner == partition {
                    local_ids.push(link.id);
                    let q = LinkQueue::new(
                        link,
                        config.time_step_secs,
                        config.flow_capacity_factor,
                        config.storage_capacity_factor,
                    );
                    LinkSlot::Local(if upstream != partition { q.with_upstream(upstream) } else { q })
                } else if upstream == partition {
                    LinkSlot::SplitOut(SplitOutLink::new(link, owner, config.storage_capacity_factor))
                } else {
                    LinkSlot::Foreign
                }
            })
            .collect();
        Self { partition, slots, local_ids }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    /// Owned link ids, ascending.
    pub fn local_ids(&self) -> &[LinkId] {
        &self.local_ids
    }

    pub fn slot(&self, link: LinkId) -> Option<&LinkSlot> {
        self.slots.get(link.index())
    }

    pub fn local(&self, link: LinkId) -> Option<&LinkQueue> {
        match self.slots.get(link.index()) {
            Some(LinkSlot::Local(q)) => Some(q),
            _ => None,
        }
    }

    pub fn local_mut(&mut self, link: LinkId) -> Option<&mut LinkQueue> {
        match self.slots.get_mut(link.index()) {
            Some(LinkSlot::Local(q)) => Some(q),
            _ => None,
        }
    }

    /// Like [`local_mut`](Self::local_mut) but a missing link is an error.
    pub fn expect_local(&mut self, link: LinkId) -> EngineResult<&mut LinkQueue> {
        self.local_mut(link).ok_or(EngineError::ForeignLink(link))
    }

    /// Storage headroom on `link` as seen from this partition.
    pub fn has_space_for(&self, link: LinkId, pce: f64) -> bool {
        match self.slots.get(link.index()) {
            Some(LinkSlot::Local(q)) => q.has_space_for(pce),
            Some(LinkSlot::SplitOut(s)) => s.has_space_for(pce),
            _ => false,
        }
    }

    pub fn split_out_mut(&mut self, link: LinkId) -> Option<&mut SplitOutLink> {
        match self.slots.get_mut(link.index()) {
            Some(LinkSlot::SplitOut(s)) => Some(s),
            _ => None,
        }
    }

    /// Apply storage changes reported by the owner of `link`.
    pub fn sync_mirror(&mut self, link: LinkId, sync: StorageSync) {
        if let Some(s) = self.split_out_mut(link) {
            s.apply(sync);
        }
    }

    /// Iterate owned queues, ascending by id.
    pub fn local_queues(&self) -> impl Iterator<Item = &LinkQueue> + '_ {
        self.slots.iter().filter_map(|s| match s {
            LinkSlot::Local(q) => Some(q),
            _ => None,
        })
    }

    pub fn local_queues_mut(&mut self) -> impl Iterator<Item = &mut LinkQueue> + '_ {
        self.slots.iter_mut().filter_map(|s| match s {
            LinkSlot::Local(q) => Some(q),
            _ => None,
        })
    }

    /// Vehicles on owned links.
    pub fn vehicle_count(&self) -> usize {
        self.local_queues().map(LinkQueue::vehicle_count).sum()
    }

    pub fn occupancy(&self) -> Vec<LinkOccupancy> {
        self.local_queues().map(LinkQueue::occupancy).collect()
    }
}
