//! CSV network loader.
//!
//! # CSV format
//!
//! Two files.  Node and link ids must be dense and appear in ascending order
//! starting at 0, so that the file id equals the in-memory id.
//!
//! ```csv
//! node_id,x,y
//! 0,0.0,0.0
//! 1,1000.0,0.0
//! ```
//!
//! ```csv
//! link_id,from,to,length,free_speed,capacity_per_hour,lanes,storage
//! 0,0,1,1000.0,13.89,1800,1,
//! 1,1,0,1000.0,13.89,1800,2,50
//! ```
//!
//! `storage` may be left empty; it is then derived from length and lanes.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use qsim_core::Coord;

use crate::{LinkAttributes, Network, NetworkBuilder, NetworkError};

// ── CSV records ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct NodeRecord {
    node_id: u32,
    x:       f64,
    y:       f64,
}

#[derive(Deserialize)]
struct LinkRecord {
    link_id:           u32,
    from:              u32,
    to:                u32,
    length:            f64,
    free_speed:        f64,
    capacity_per_hour: f64,
    lanes:             f64,
    storage:           Option<f64>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Load a network from a nodes file and a links file.
pub fn load_network_csv(nodes_path: &Path, links_path: &Path) -> Result<Network, NetworkError> {
    let nodes = std::fs::File::open(nodes_path)?;
    let links = std::fs::File::open(links_path)?;
    load_network_reader(nodes, links)
}

/// Like [`load_network_csv`] but accepts any `Read` sources.
pub fn load_network_reader<N: Read, L: Read>(nodes: N, links: L) -> Result<Network, NetworkError> {
    let mut builder = NetworkBuilder::new();

    for (expected, row) in csv::Reader::from_reader(nodes).deserialize::<NodeRecord>().enumerate() {
        let rec = row?;
        if rec.node_id as usize != expected {
            return Err(NetworkError::Parse(format!(
                "node ids must be dense and ascending: expected {expected}, found {}",
                rec.node_id
            )));
        }
        builder.add_node(Coord::new(rec.x, rec.y));
    }

    for (expected, row) in csv::Reader::from_reader(links).deserialize::<LinkRecord>().enumerate() {
        let rec = row?;
        if rec.link_id as usize != expected {
            return Err(NetworkError::Parse(format!(
                "link ids must be dense and ascending: expected {expected}, found {}",
                rec.link_id
            )));
        }
        let mut attrs = LinkAttributes::per_hour(rec.length, rec.free_speed, rec.capacity_per_hour)
            .with_lanes(rec.lanes);
        if let Some(storage) = rec.storage {
            attrs = attrs.with_storage(storage);
        }
        builder.add_link(qsim_core::NodeId(rec.from), qsim_core::NodeId(rec.to), attrs);
    }

    builder.build()
}
