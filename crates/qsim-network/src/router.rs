//! Free-flow routing.
//!
//! The engine only executes routes it is given.  This router exists for
//! plan producers and demos that need a plausible link sequence between two
//! locations.
//!
//! # Cost units
//!
//! Costs are free-flow travel times in **milliseconds** (`u64`) so that the
//! heap ordering is exact.  `Route` exposes the total in seconds.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use qsim_core::{LinkId, NodeId};

use crate::network::Network;
use crate::NetworkError;

// ── Route ─────────────────────────────────────────────────────────────────────

/// An ordered list of links and its free-flow travel time.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Links to traverse in order.
    pub links: Vec<LinkId>,
    /// Sum of free-flow travel times in seconds.
    pub travel_secs: f64,
}

impl Route {
    /// `true` if source and destination coincide.
    pub fn is_trivial(&self) -> bool {
        self.links.is_empty()
    }
}

// ── Router trait ──────────────────────────────────────────────────────────────

/// Pluggable routing engine.
///
/// Implementations must be `Send + Sync` so plan producers can route from
/// several threads.
pub trait Router: Send + Sync {
    /// Links leading from node `from` to node `to`.
    fn route(&self, network: &Network, from: NodeId, to: NodeId) -> Result<Route, NetworkError>;

    /// The intermediate links of a leg that starts on `from` and ends on
    /// `to`: the route between the end of `from` and the start of `to`.
    fn route_between_links(
        &self,
        network: &Network,
        from:    LinkId,
        to:      LinkId,
    ) -> Result<Route, NetworkError> {
        let start = network.get_link(from).ok_or(NetworkError::LinkNotFound(from))?;
        let end   = network.get_link(to).ok_or(NetworkError::LinkNotFound(to))?;
        if from == to {
            return Ok(Route { links: vec![], travel_secs: 0.0 });
        }
        self.route(network, start.to, end.from)
    }
}

// ── DijkstraRouter ────────────────────────────────────────────────────────────

/// Dijkstra over free-flow link travel times.
pub struct DijkstraRouter;

impl Router for DijkstraRouter {
    fn route(&self, network: &Network, from: NodeId, to: NodeId) -> Result<Route, NetworkError> {
        dijkstra(network, from, to)
    }
}

#[inline]
fn link_cost_ms(network: &Network, link: LinkId) -> u64 {
    (network.link(link).free_flow_travel_secs() * 1_000.0).round() as u64
}

fn dijkstra(network: &Network, from: NodeId, to: NodeId) -> Result<Route, NetworkError> {
    let n = network.node_count();
    if from.index() >= n || to.index() >= n {
        return Err(NetworkError::NoRoute { from, to });
    }
    if from == to {
        return Ok(Route { links: vec![], travel_secs: 0.0 });
    }

    let mut dist      = vec![u64::MAX; n];
    let mut prev_link = vec![LinkId::INVALID; n];
    dist[from.index()] = 0;

    // Secondary key NodeId ensures deterministic tie-breaking.
    let mut heap: BinaryHeap<Reverse<(u64, NodeId)>> = BinaryHeap::new();
    heap.push(Reverse((0, from)));

    while let Some(Reverse((cost, node))) = heap.pop() {
        if node == to {
            return Ok(reconstruct(network, &prev_link, to, cost));
        }
        if cost > dist[node.index()] {
            continue;
        }
        for &link in network.out_links(node) {
            let next = network.link(link).to;
            let new_cost = cost.saturating_add(link_cost_ms(network, link));
            if new_cost < dist[next.index()] {
                dist[next.index()] = new_cost;
                prev_link[next.index()] = link;
                heap.push(Reverse((new_cost, next)));
            }
        }
    }

    Err(NetworkError::NoRoute { from, to })
}

fn reconstruct(network: &Network, prev_link: &[LinkId], to: NodeId, total_ms: u64) -> Route {
    let mut links = Vec::new();
    let mut cur = to;
    loop {
        let l = prev_link[cur.index()];
        if l == LinkId::INVALID {
            break;
        }
        links.push(l);
        cur = network.link(l).from;
    }
    links.reverse();
    Route { links, travel_secs: total_ms as f64 / 1_000.0 }
}
