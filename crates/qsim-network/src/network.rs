//! Network representation and builder.
//!
//! # Data layout
//!
//! Links are stored in a `Vec<Link>` indexed by `LinkId`; ids are handed out
//! sequentially by [`NetworkBuilder::add_link`] and never reordered.
//!
//! Node adjacency uses **Compressed Sparse Row (CSR)** arrays, once for
//! incoming and once for outgoing links.  Given a `NodeId n`, its in-links
//! occupy the slice:
//!
//! ```text
//! node_in_links[ node_in_start[n] .. node_in_start[n+1] ]
//! ```
//!
//! Within each slice links are sorted by ascending `LinkId`.  The node mover
//! relies on this: iterating `in_links(node)` is already the deterministic
//! tie-break order.
//!
//! # Spatial index
//!
//! An R-tree (via `rstar`) maps coordinates to the nearest `NodeId`.  Used
//! when building synthetic plans to snap home/work locations to the network.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use qsim_core::{Coord, LinkId, NodeId};

use crate::{NetworkError, NetworkResult};

/// Length of road one vehicle occupies in a standing queue, in metres.
/// Used to derive storage capacity when a link does not declare one.
pub const DEFAULT_CELL_SIZE_M: f64 = 7.5;

// ── R-tree node entry ─────────────────────────────────────────────────────────

#[derive(Clone)]
struct NodeEntry {
    point: [f64; 2],
    id:    NodeId,
}

impl RTreeObject for NodeEntry {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

impl PointDistance for NodeEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.point[0] - point[0];
        let dy = self.point[1] - point[1];
        dx * dx + dy * dy
    }
}

// ── Link ──────────────────────────────────────────────────────────────────────

/// One directed link with its physical parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Link {
    pub id:   LinkId,
    pub from: NodeId,
    pub to:   NodeId,
    /// Metres.
    pub length_m: f64,
    /// Free-flow speed in m/s.
    pub free_speed: f64,
    /// Outflow capacity in vehicles (PCE) per second.
    pub flow_capacity: f64,
    /// Space for standing vehicles, in PCE.
    pub storage_capacity: f64,
    pub lanes: f64,
}

impl Link {
    /// Free-flow traversal time in seconds.
    #[inline]
    pub fn free_flow_travel_secs(&self) -> f64 {
        self.length_m / self.free_speed
    }
}

/// Link parameters passed to [`NetworkBuilder::add_link`].
#[derive(Clone, Debug, PartialEq)]
pub struct LinkAttributes {
    pub length_m:      f64,
    pub free_speed:    f64,
    /// Vehicles per second.
    pub flow_capacity: f64,
    pub lanes:         f64,
    /// Explicit storage capacity; derived from length and lanes when `None`.
    pub storage_capacity: Option<f64>,
}

impl LinkAttributes {
    /// Single-lane link with derived storage.
    pub fn new(length_m: f64, free_speed: f64, flow_capacity: f64) -> Self {
        Self { length_m, free_speed, flow_capacity, lanes: 1.0, storage_capacity: None }
    }

    /// Same as [`new`](Self::new) with the capacity given per hour.
    pub fn per_hour(length_m: f64, free_speed: f64, capacity_per_hour: f64) -> Self {
        Self::new(length_m, free_speed, capacity_per_hour / 3_600.0)
    }

    pub fn with_lanes(mut self, lanes: f64) -> Self {
        self.lanes = lanes;
        self
    }

    pub fn with_storage(mut self, storage_capacity: f64) -> Self {
        self.storage_capacity = Some(storage_capacity);
        self
    }
}

// ── Network ───────────────────────────────────────────────────────────────────

/// Immutable directed network: links plus CSR adjacency and a spatial index.
///
/// Do not construct directly; use [`NetworkBuilder`].
pub struct Network {
    /// Coordinate of each node.  Indexed by `NodeId`.
    pub node_coord: Vec<Coord>,

    /// All links, indexed by `LinkId`.
    pub links: Vec<Link>,

    // ── CSR adjacency ─────────────────────────────────────────────────────
    /// In-links of node `n` are `node_in_links[node_in_start[n]..node_in_start[n+1]]`.
    pub node_in_start: Vec<u32>,
    pub node_in_links: Vec<LinkId>,

    /// Out-links of node `n` are `node_out_links[node_out_start[n]..node_out_start[n+1]]`.
    pub node_out_start: Vec<u32>,
    pub node_out_links: Vec<LinkId>,

    spatial_idx: RTree<NodeEntry>,
}

impl Network {
    /// A network with no nodes or links.
    pub fn empty() -> Self {
        Self {
            node_coord:     Vec::new(),
            links:          Vec::new(),
            node_in_start:  vec![0],
            node_in_links:  Vec::new(),
            node_out_start: vec![0],
            node_out_links: Vec::new(),
            spatial_idx:    RTree::new(),
        }
    }

    // ── Graph dimensions ──────────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.node_coord.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_coord.is_empty()
    }

    // ── Lookups ───────────────────────────────────────────────────────────

    /// The link with id `id`.
    ///
    /// # Panics
    /// Panics if `id` is not a link of this network; use
    /// [`get_link`](Self::get_link) for ids from untrusted input.
    #[inline]
    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.index()]
    }

    #[inline]
    pub fn get_link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.index())
    }

    #[inline]
    pub fn contains_link(&self, id: LinkId) -> bool {
        id.index() < self.links.len()
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.node_coord.len()).map(|i| NodeId(i as u32))
    }

    /// Incoming links of `node`, ascending by id.
    #[inline]
    pub fn in_links(&self, node: NodeId) -> &[LinkId] {
        let start = self.node_in_start[node.index()] as usize;
        let end   = self.node_in_start[node.index() + 1] as usize;
        &self.node_in_links[start..end]
    }

    /// Outgoing links of `node`, ascending by id.
    #[inline]
    pub fn out_links(&self, node: NodeId) -> &[LinkId] {
        let start = self.node_out_start[node.index()] as usize;
        let end   = self.node_out_start[node.index() + 1] as usize;
        &self.node_out_links[start..end]
    }

    /// `true` if a vehicle at the end of `from` can continue onto `to`.
    #[inline]
    pub fn is_connected(&self, from: LinkId, to: LinkId) -> bool {
        match (self.get_link(from), self.get_link(to)) {
            (Some(a), Some(b)) => a.to == b.from,
            _ => false,
        }
    }

    // ── Spatial queries ───────────────────────────────────────────────────

    /// The node closest to `coord`, or `None` for an empty network.
    pub fn nearest_node(&self, coord: Coord) -> Option<NodeId> {
        self.spatial_idx
            .nearest_neighbor(&[coord.x, coord.y])
            .map(|e| e.id)
    }

    /// Up to `k` nodes ordered by ascending distance from `coord`.
    pub fn k_nearest_nodes(&self, coord: Coord, k: usize) -> Vec<NodeId> {
        self.spatial_idx
            .nearest_neighbor_iter(&[coord.x, coord.y])
            .take(k)
            .map(|e| e.id)
            .collect()
    }
}

// ── NetworkBuilder ────────────────────────────────────────────────────────────

/// Construct a [`Network`] incrementally, then call [`build`](Self::build).
///
/// # Example
///
/// ```
/// use qsim_core::Coord;
/// use qsim_network::{LinkAttributes, NetworkBuilder};
///
/// let mut b = NetworkBuilder::new();
/// let a = b.add_node(Coord::new(0.0, 0.0));
/// let c = b.add_node(Coord::new(1_000.0, 0.0));
/// let l = b.add_link(a, c, LinkAttributes::per_hour(1_000.0, 13.9, 1_800.0));
/// let net = b.build().unwrap();
/// assert_eq!(net.link(l).to, c);
/// assert_eq!(net.link(l).storage_capacity, 1_000.0 / 7.5);
/// ```
pub struct NetworkBuilder {
    nodes:     Vec<Coord>,
    raw_links: Vec<(NodeId, NodeId, LinkAttributes)>,
    cell_size: f64,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self { nodes: Vec::new(), raw_links: Vec::new(), cell_size: DEFAULT_CELL_SIZE_M }
    }

    /// Pre-allocate for the expected number of nodes and links.
    pub fn with_capacity(nodes: usize, links: usize) -> Self {
        Self {
            nodes:     Vec::with_capacity(nodes),
            raw_links: Vec::with_capacity(links),
            cell_size: DEFAULT_CELL_SIZE_M,
        }
    }

    /// Override the queue length one vehicle occupies (default 7.5 m).
    pub fn effective_cell_size(mut self, metres: f64) -> Self {
        self.cell_size = metres;
        self
    }

    /// Add a node and return its `NodeId` (sequential from 0).
    pub fn add_node(&mut self, coord: Coord) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(coord);
        id
    }

    /// Add a directed link and return its `LinkId` (sequential from 0).
    pub fn add_link(&mut self, from: NodeId, to: NodeId, attrs: LinkAttributes) -> LinkId {
        let id = LinkId(self.raw_links.len() as u32);
        self.raw_links.push((from, to, attrs));
        id
    }

    pub fn node_count(&self) -> usize { self.nodes.len() }
    pub fn link_count(&self) -> usize { self.raw_links.len() }

    /// Validate all links and produce the immutable [`Network`].
    pub fn build(self) -> NetworkResult<Network> {
        let node_count = self.nodes.len();
        let mut links = Vec::with_capacity(self.raw_links.len());

        for (i, (from, to, attrs)) in self.raw_links.into_iter().enumerate() {
            let id = LinkId(i as u32);
            for node in [from, to] {
                if node.index() >= node_count {
                    return Err(NetworkError::UnknownNode { link: id, node });
                }
            }
            let storage = attrs
                .storage_capacity
                .unwrap_or(attrs.length_m * attrs.lanes / self.cell_size);
            let checks = [
                ("length", attrs.length_m),
                ("free speed", attrs.free_speed),
                ("flow capacity", attrs.flow_capacity),
                ("lanes", attrs.lanes),
                ("storage capacity", storage),
            ];
            for (what, value) in checks {
                if !(value > 0.0) || !value.is_finite() {
                    return Err(NetworkError::InvalidLink {
                        link:   id,
                        reason: format!("{what} must be positive and finite, got {value}"),
                    });
                }
            }
            links.push(Link {
                id,
                from,
                to,
                length_m: attrs.length_m,
                free_speed: attrs.free_speed,
                flow_capacity: attrs.flow_capacity,
                storage_capacity: storage,
                lanes: attrs.lanes,
            });
        }

        // Links are pushed in id order, so a stable counting sort by node
        // keeps each node's slice ascending by LinkId.
        let (node_in_start, node_in_links) = csr(node_count, &links, |l| l.to);
        let (node_out_start, node_out_links) = csr(node_count, &links, |l| l.from);

        let entries: Vec<NodeEntry> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, c)| NodeEntry { point: [c.x, c.y], id: NodeId(i as u32) })
            .collect();
        let spatial_idx = RTree::bulk_load(entries);

        Ok(Network {
            node_coord: self.nodes,
            links,
            node_in_start,
            node_in_links,
            node_out_start,
            node_out_links,
            spatial_idx,
        })
    }
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build CSR row pointers and the link column for the node chosen by `key`.
fn csr(node_count: usize, links: &[Link], key: impl Fn(&Link) -> NodeId) -> (Vec<u32>, Vec<LinkId>) {
    let mut start = vec![0u32; node_count + 1];
    for l in links {
        start[key(l).index() + 1] += 1;
    }
    for i in 1..=node_count {
        start[i] += start[i - 1];
    }
    let mut fill = start.clone();
    let mut column = vec![LinkId::INVALID; links.len()];
    for l in links {
        let slot = &mut fill[key(l).index()];
        column[*slot as usize] = l.id;
        *slot += 1;
    }
    (start, column)
}
