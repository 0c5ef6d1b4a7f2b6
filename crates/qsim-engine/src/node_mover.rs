//! Moving vehicles across nodes.
//!
//! The mover visits one node's in-links in ascending `LinkId` order (the
//! order `Network::in_links` already has) and, per in-link, moves buffered
//! vehicles while flow capacity and downstream storage allow.  Each move is
//! two-phase: `peek_front` to decide, `pop_front` to commit.

use log::warn;

use qsim_core::{LinkId, NodeId, PartitionId, SimTime};
use qsim_events::{EventBuffer, EventKind};
use qsim_network::Network;

use crate::link_table::{LinkSlot, LinkTable};
use crate::{EngineError, EngineResult, MovableOnNetwork, QVehicle};

/// Stuck handling settings.
#[derive(Copy, Clone, Debug)]
pub struct MoverSettings {
    pub stuck_time_secs:       u32,
    pub remove_stuck_vehicles: bool,
}

/// A vehicle that crossed into a link owned by another partition.
#[derive(Debug)]
pub struct Handoff {
    pub to:         PartitionId,
    pub link:       LinkId,
    pub vehicle:    QVehicle,
    pub entered_at: SimTime,
}

/// Everything the node mover produced besides local moves.
#[derive(Debug, Default)]
pub struct NodeMoveResult {
    pub handoffs: Vec<Handoff>,
    /// Vehicles removed from the network, with the link they were on.
    pub aborted:  Vec<(QVehicle, LinkId)>,
    pub moved:    usize,
}

/// Move vehicles over `node` at `now`.
pub fn move_node(
    node:     NodeId,
    now:      SimTime,
    network:  &Network,
    links:    &mut LinkTable,
    settings: MoverSettings,
    events:   &mut EventBuffer,
    result:   &mut NodeMoveResult,
) -> EngineResult<()> {
    for &in_link in network.in_links(node) {
        if links.local(in_link).is_none() {
            continue;
        }
        move_in_link(node, in_link, now, network, links, settings, events, result)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn move_in_link(
    node:     NodeId,
    in_link:  LinkId,
    now:      SimTime,
    network:  &Network,
    links:    &mut LinkTable,
    settings: MoverSettings,
    events:   &mut EventBuffer,
    result:   &mut NodeMoveResult,
) -> EngineResult<()> {
    loop {
        let (next, pce) = match links.local(in_link).and_then(|q| q.peek_front(now)) {
            None => return Ok(()),
            Some(v) => (v.driver().and_then(|d| d.choose_next_link()), v.pce()),
        };

        let next = next.filter(|l| network.get_link(*l).is_some_and(|link| link.from == node));
        let Some(next) = next else {
            if let Some(v) = links.expect_local(in_link)?.remove_front() {
                warn!("vehicle {} cannot leave link {in_link} at {now}: no valid next link", v.id);
                result.aborted.push((v, in_link));
            }
            continue;
        };

        if !links.has_space_for(next, pce) {
            let q = links.expect_local(in_link)?;
            q.mark_blocked(now);
            if settings.remove_stuck_vehicles && q.blocked_for(now) >= settings.stuck_time_secs {
                if let Some(v) = q.remove_front() {
                    warn!("vehicle {} stuck on link {in_link} since {}s, removing", v.id, settings.stuck_time_secs);
                    result.aborted.push((v, in_link));
                }
                continue;
            }
            return Ok(());
        }

        let Some(mut vehicle) = links.expect_local(in_link)?.pop_front(now) else {
            return Ok(());
        };
        let id = vehicle.id;
        events.emit(now, EventKind::VehicleLeavesLink { vehicle: id, link: in_link });
        vehicle.driver_mut().ok_or(EngineError::NoDriver(id))?.notify_move_over_node(next)?;
        events.emit(now, EventKind::VehicleEntersLink { vehicle: id, link: next });
        result.moved += 1;

        match links.slot(next) {
            Some(LinkSlot::Local(_)) => links.expect_local(next)?.enter(vehicle, now)?,
            Some(LinkSlot::SplitOut(out)) => {
                let to = out.owner;
                if let Some(s) = links.split_out_mut(next) {
                    s.consume(pce);
                }
                result.handoffs.push(Handoff { to, link: next, vehicle, entered_at: now });
            }
            _ => return Err(EngineError::ForeignLink(next)),
        }
    }
}
