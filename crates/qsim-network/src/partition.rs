//! Assignment of network nodes to partitions.
//!
//! # Ownership rule
//!
//! A link belongs to the partition of its **to-node**: that partition holds
//! the link's queue state and runs the node mover that drains it.  A link
//! whose from-node lies in another partition is a *split link*; the upstream
//! partition moves vehicles onto it through a mailbox and keeps a storage
//! mirror so the spillback check stays local.

use qsim_core::{LinkId, NodeId, PartitionId};

use crate::{Network, NetworkError, NetworkResult};

/// Node → partition map for one network.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partitioning {
    node_partition: Vec<PartitionId>,
    count:          usize,
}

impl Partitioning {
    /// Every node in partition 0.
    pub fn single(network: &Network) -> Self {
        Self { node_partition: vec![PartitionId(0); network.node_count()], count: 1 }
    }

    /// Split the node id range into `count` contiguous blocks of (nearly)
    /// equal size.  Node `i` goes to partition `i * count / node_count`.
    pub fn contiguous(network: &Network, count: usize) -> NetworkResult<Self> {
        if count == 0 {
            return Err(NetworkError::Partition("partition count must be at least 1".into()));
        }
        let n = network.node_count();
        let node_partition = (0..n)
            .map(|i| PartitionId((i * count / n.max(1)) as u32))
            .collect();
        Ok(Self { node_partition, count })
    }

    /// Use an explicit assignment (one entry per node).  The partition count
    /// is one more than the largest id used.
    pub fn from_assignment(network: &Network, assignment: Vec<u32>) -> NetworkResult<Self> {
        if assignment.len() != network.node_count() {
            return Err(NetworkError::Partition(format!(
                "assignment has {} entries for {} nodes",
                assignment.len(),
                network.node_count()
            )));
        }
        let count = assignment.iter().copied().max().map_or(1, |m| m as usize + 1);
        Ok(Self {
            node_partition: assignment.into_iter().map(PartitionId).collect(),
            count,
        })
    }

    /// Number of partitions.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn node_count(&self) -> usize {
        self.node_partition.len()
    }

    #[inline]
    pub fn partition_of_node(&self, node: NodeId) -> PartitionId {
        self.node_partition[node.index()]
    }

    /// The partition that holds `link`'s queue.
    #[inline]
    pub fn owner_of_link(&self, network: &Network, link: LinkId) -> PartitionId {
        self.partition_of_node(network.link(link).to)
    }

    /// The partition whose node mover feeds `link`.
    #[inline]
    pub fn upstream_of_link(&self, network: &Network, link: LinkId) -> PartitionId {
        self.partition_of_node(network.link(link).from)
    }

    /// `true` if `link` crosses a partition boundary.
    #[inline]
    pub fn is_split(&self, network: &Network, link: LinkId) -> bool {
        self.owner_of_link(network, link) != self.upstream_of_link(network, link)
    }

    /// Nodes of partition `p`, ascending.
    pub fn nodes_of(&self, p: PartitionId) -> Vec<NodeId> {
        self.node_partition
            .iter()
            .enumerate()
            .filter(|(_, q)| **q == p)
            .map(|(i, _)| NodeId(i as u32))
            .collect()
    }
}
