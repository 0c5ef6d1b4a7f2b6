//! Unit tests for qsim-network.
//!
//! All tests use hand-built networks; the loader tests read from in-memory
//! cursors.

#[cfg(test)]
mod helpers {
    use qsim_core::{Coord, LinkId, NodeId};
    use crate::{LinkAttributes, Network, NetworkBuilder};

    /// Small network with two alternatives from 0 to 4.
    ///
    /// ```text
    ///   0 ──l0──► 1 ──l1──► 2 ──l2──► 4
    ///   │                             ▲
    ///   └────────l3──► 3 ──l4─────────┘
    /// ```
    ///
    /// Path via 1, 2: 3 × 10 s = 30 s.  Path via 3: 50 s + 10 s = 60 s.
    pub fn grid_network() -> (Network, [NodeId; 5], [LinkId; 5]) {
        let mut b = NetworkBuilder::new();
        let n0 = b.add_node(Coord::new(0.0, 0.0));
        let n1 = b.add_node(Coord::new(100.0, 0.0));
        let n2 = b.add_node(Coord::new(200.0, 0.0));
        let n3 = b.add_node(Coord::new(0.0, 100.0));
        let n4 = b.add_node(Coord::new(200.0, 100.0));

        let l0 = b.add_link(n0, n1, LinkAttributes::new(100.0, 10.0, 1.0));
        let l1 = b.add_link(n1, n2, LinkAttributes::new(100.0, 10.0, 1.0));
        let l2 = b.add_link(n2, n4, LinkAttributes::new(100.0, 10.0, 1.0));
        let l3 = b.add_link(n0, n3, LinkAttributes::new(500.0, 10.0, 1.0));
        let l4 = b.add_link(n3, n4, LinkAttributes::new(100.0, 10.0, 1.0));

        (b.build().unwrap(), [n0, n1, n2, n3, n4], [l0, l1, l2, l3, l4])
    }
}

// ── Builder & network structure ───────────────────────────────────────────────

#[cfg(test)]
mod builder {
    use qsim_core::{Coord, LinkId, NodeId};
    use crate::{LinkAttributes, NetworkBuilder, NetworkError, DEFAULT_CELL_SIZE_M};
    use super::helpers::grid_network;

    #[test]
    fn empty_build() {
        let net = NetworkBuilder::new().build().unwrap();
        assert_eq!(net.node_count(), 0);
        assert_eq!(net.link_count(), 0);
        assert!(net.is_empty());
    }

    #[test]
    fn ids_are_sequential() {
        let mut b = NetworkBuilder::new();
        assert_eq!(b.add_node(Coord::new(0.0, 0.0)), NodeId(0));
        assert_eq!(b.add_node(Coord::new(1.0, 0.0)), NodeId(1));
        assert_eq!(b.add_link(NodeId(0), NodeId(1), LinkAttributes::new(10.0, 1.0, 1.0)), LinkId(0));
        assert_eq!(b.add_link(NodeId(1), NodeId(0), LinkAttributes::new(10.0, 1.0, 1.0)), LinkId(1));
        assert_eq!(b.node_count(), 2);
        assert_eq!(b.link_count(), 2);
    }

    #[test]
    fn in_and_out_links_sorted_by_id() {
        let mut b = NetworkBuilder::new();
        let hub = b.add_node(Coord::new(0.0, 0.0));
        let a = b.add_node(Coord::new(1.0, 0.0));
        let c = b.add_node(Coord::new(0.0, 1.0));
        let attrs = LinkAttributes::new(10.0, 1.0, 1.0);
        let l0 = b.add_link(c, hub, attrs.clone());
        let l1 = b.add_link(hub, a, attrs.clone());
        let l2 = b.add_link(a, hub, attrs.clone());
        let l3 = b.add_link(hub, c, attrs);
        let net = b.build().unwrap();

        assert_eq!(net.in_links(hub), &[l0, l2]);
        assert_eq!(net.out_links(hub), &[l1, l3]);
        assert_eq!(net.in_links(a), &[l1]);
        assert_eq!(net.out_links(c), &[l0]);
    }

    #[test]
    fn storage_derived_from_length_and_lanes() {
        let mut b = NetworkBuilder::new();
        let x = b.add_node(Coord::new(0.0, 0.0));
        let y = b.add_node(Coord::new(1.0, 0.0));
        let l = b.add_link(x, y, LinkAttributes::new(75.0, 10.0, 1.0).with_lanes(2.0));
        let m = b.add_link(y, x, LinkAttributes::new(75.0, 10.0, 1.0).with_storage(3.0));
        let net = b.build().unwrap();
        assert!((net.link(l).storage_capacity - 75.0 * 2.0 / DEFAULT_CELL_SIZE_M).abs() < 1e-9);
        assert_eq!(net.link(m).storage_capacity, 3.0);
    }

    #[test]
    fn custom_cell_size() {
        let mut b = NetworkBuilder::new().effective_cell_size(5.0);
        let x = b.add_node(Coord::new(0.0, 0.0));
        let y = b.add_node(Coord::new(1.0, 0.0));
        let l = b.add_link(x, y, LinkAttributes::new(50.0, 10.0, 1.0));
        let net = b.build().unwrap();
        assert!((net.link(l).storage_capacity - 10.0).abs() < 1e-9);
    }

    #[test]
    fn per_hour_capacity_converted() {
        let attrs = LinkAttributes::per_hour(100.0, 10.0, 3_600.0);
        assert!((attrs.flow_capacity - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_node_rejected() {
        let mut b = NetworkBuilder::new();
        let x = b.add_node(Coord::new(0.0, 0.0));
        b.add_link(x, NodeId(7), LinkAttributes::new(10.0, 1.0, 1.0));
        match b.build() {
            Err(NetworkError::UnknownNode { link, node }) => {
                assert_eq!(link, LinkId(0));
                assert_eq!(node, NodeId(7));
            }
            other => panic!("expected UnknownNode, got {:?}", other.err()),
        }
    }

    #[test]
    fn non_positive_attributes_rejected() {
        for attrs in [
            LinkAttributes::new(0.0, 1.0, 1.0),
            LinkAttributes::new(10.0, -1.0, 1.0),
            LinkAttributes::new(10.0, 1.0, 0.0),
            LinkAttributes::new(10.0, 1.0, 1.0).with_storage(0.0),
            LinkAttributes::new(f64::NAN, 1.0, 1.0),
        ] {
            let mut b = NetworkBuilder::new();
            let x = b.add_node(Coord::new(0.0, 0.0));
            let y = b.add_node(Coord::new(1.0, 0.0));
            b.add_link(x, y, attrs);
            assert!(matches!(b.build(), Err(NetworkError::InvalidLink { .. })));
        }
    }

    #[test]
    fn connectivity() {
        let (net, _, [l0, l1, l2, l3, _]) = grid_network();
        assert!(net.is_connected(l0, l1));
        assert!(net.is_connected(l1, l2));
        assert!(!net.is_connected(l0, l2));
        assert!(!net.is_connected(l3, l0));
        assert!(!net.is_connected(l0, LinkId(99)));
        assert!(net.contains_link(l3));
        assert!(!net.contains_link(LinkId(5)));
        assert!(net.get_link(LinkId(5)).is_none());
    }

    #[test]
    fn free_flow_travel_time() {
        let (net, _, [_, _, _, l3, _]) = grid_network();
        assert!((net.link(l3).free_flow_travel_secs() - 50.0).abs() < 1e-9);
    }
}

// ── Spatial index ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod snap {
    use qsim_core::Coord;
    use crate::Network;
    use super::helpers::grid_network;

    #[test]
    fn nearest_node_exact() {
        let (net, nodes, _) = grid_network();
        assert_eq!(net.nearest_node(Coord::new(200.0, 0.0)), Some(nodes[2]));
    }

    #[test]
    fn nearest_node_approx() {
        let (net, nodes, _) = grid_network();
        assert_eq!(net.nearest_node(Coord::new(190.0, 95.0)), Some(nodes[4]));
    }

    #[test]
    fn k_nearest_ordered_by_distance() {
        let (net, nodes, _) = grid_network();
        let near = net.k_nearest_nodes(Coord::new(10.0, -1.0), 2);
        assert_eq!(near, vec![nodes[0], nodes[1]]);
    }

    #[test]
    fn empty_network_has_no_nearest() {
        assert!(Network::empty().nearest_node(Coord::new(0.0, 0.0)).is_none());
    }
}

// ── Routing ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod routing {
    use qsim_core::NodeId;
    use crate::{DijkstraRouter, NetworkError, Router};
    use super::helpers::grid_network;

    #[test]
    fn shortest_path_selected() {
        let (net, [n0, _, _, _, n4], [l0, l1, l2, _, _]) = grid_network();
        let route = DijkstraRouter.route(&net, n0, n4).unwrap();
        assert_eq!(route.links, vec![l0, l1, l2]);
        assert!((route.travel_secs - 30.0).abs() < 1e-9);
    }

    #[test]
    fn same_node_is_trivial() {
        let (net, [n0, ..], _) = grid_network();
        let route = DijkstraRouter.route(&net, n0, n0).unwrap();
        assert!(route.is_trivial());
        assert_eq!(route.travel_secs, 0.0);
    }

    #[test]
    fn unreachable_is_error() {
        let (net, [n0, _, _, _, n4], _) = grid_network();
        assert!(matches!(
            DijkstraRouter.route(&net, n4, n0),
            Err(NetworkError::NoRoute { .. })
        ));
    }

    #[test]
    fn unknown_node_is_error() {
        let (net, [n0, ..], _) = grid_network();
        assert!(DijkstraRouter.route(&net, n0, NodeId(42)).is_err());
    }

    #[test]
    fn between_links_excludes_endpoints() {
        let (net, _, [l0, l1, l2, _, _]) = grid_network();
        let route = DijkstraRouter.route_between_links(&net, l0, l2).unwrap();
        assert_eq!(route.links, vec![l1]);
        let adjacent = DijkstraRouter.route_between_links(&net, l0, l1).unwrap();
        assert!(adjacent.is_trivial());
    }
}

// ── Partitioning ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod partitioning {
    use qsim_core::{NodeId, PartitionId};
    use crate::{NetworkError, Partitioning};
    use super::helpers::grid_network;

    #[test]
    fn single_owns_everything() {
        let (net, _, links) = grid_network();
        let p = Partitioning::single(&net);
        assert_eq!(p.count(), 1);
        for l in links {
            assert_eq!(p.owner_of_link(&net, l), PartitionId(0));
            assert!(!p.is_split(&net, l));
        }
    }

    #[test]
    fn contiguous_blocks() {
        let (net, _, _) = grid_network();
        let p = Partitioning::contiguous(&net, 2).unwrap();
        // 5 nodes: i * 2 / 5 → 0,0,0,1,1
        assert_eq!(p.nodes_of(PartitionId(0)), vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert_eq!(p.nodes_of(PartitionId(1)), vec![NodeId(3), NodeId(4)]);
    }

    #[test]
    fn link_owned_by_to_node() {
        let (net, _, [l0, _, l2, l3, l4]) = grid_network();
        let p = Partitioning::contiguous(&net, 2).unwrap();
        // l2: 2 → 4 crosses from partition 0 into 1.
        assert_eq!(p.owner_of_link(&net, l2), PartitionId(1));
        assert_eq!(p.upstream_of_link(&net, l2), PartitionId(0));
        assert!(p.is_split(&net, l2));
        assert!(p.is_split(&net, l3));
        assert!(!p.is_split(&net, l4));
        assert!(!p.is_split(&net, l0));
    }

    #[test]
    fn zero_partitions_rejected() {
        let (net, _, _) = grid_network();
        assert!(matches!(Partitioning::contiguous(&net, 0), Err(NetworkError::Partition(_))));
    }

    #[test]
    fn explicit_assignment() {
        let (net, _, [l0, ..]) = grid_network();
        let p = Partitioning::from_assignment(&net, vec![2, 0, 0, 1, 1]).unwrap();
        assert_eq!(p.count(), 3);
        assert_eq!(p.upstream_of_link(&net, l0), PartitionId(2));
        assert!(Partitioning::from_assignment(&net, vec![0, 0]).is_err());
    }
}

// ── CSV loader ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod loader {
    use std::io::Cursor;
    use qsim_core::{LinkId, NodeId};
    use crate::{load_network_reader, NetworkError};

    const NODES: &str = "node_id,x,y\n0,0.0,0.0\n1,1000.0,0.0\n";
    const LINKS: &str = "link_id,from,to,length,free_speed,capacity_per_hour,lanes,storage\n\
                         0,0,1,1000.0,10.0,1800,1,\n\
                         1,1,0,1000.0,10.0,3600,2,50\n";

    #[test]
    fn loads_nodes_and_links() {
        let net = load_network_reader(Cursor::new(NODES), Cursor::new(LINKS)).unwrap();
        assert_eq!(net.node_count(), 2);
        assert_eq!(net.link_count(), 2);

        let l0 = net.link(LinkId(0));
        assert_eq!(l0.from, NodeId(0));
        assert_eq!(l0.to, NodeId(1));
        assert!((l0.flow_capacity - 0.5).abs() < 1e-12);
        assert!((l0.storage_capacity - 1_000.0 / 7.5).abs() < 1e-9);

        let l1 = net.link(LinkId(1));
        assert_eq!(l1.lanes, 2.0);
        assert_eq!(l1.storage_capacity, 50.0);
    }

    #[test]
    fn sparse_node_ids_rejected() {
        let nodes = "node_id,x,y\n0,0,0\n2,1,0\n";
        let links = "link_id,from,to,length,free_speed,capacity_per_hour,lanes,storage\n";
        assert!(matches!(
            load_network_reader(Cursor::new(nodes), Cursor::new(links)),
            Err(NetworkError::Parse(_))
        ));
    }

    #[test]
    fn malformed_row_is_csv_error() {
        let links = "link_id,from,to,length,free_speed,capacity_per_hour,lanes,storage\n0,0,1,abc,10,1800,1,\n";
        assert!(matches!(
            load_network_reader(Cursor::new(NODES), Cursor::new(links)),
            Err(NetworkError::Csv(_))
        ));
    }
}
