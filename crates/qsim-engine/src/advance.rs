//! The standard [`VehicleHandler`] used by partitions during link advance.
//!
//! For each ready vehicle it emits `VehicleEntersTraffic` when the vehicle
//! comes from the waiting list, lets a transit driver serve every stop on the
//! current link, and then decides between buffering and arriving.

use qsim_core::{LinkId, SimTime};
use qsim_events::{EventBuffer, EventKind};
use qsim_transit::TransitSchedule;

use crate::boarding::AccessEgress;
use crate::link_queue::{Disposition, Origin, VehicleHandler};
use crate::transit_driver::{SchedulesStops, StopServices, StopVehicle};
use crate::{Driver, EngineError, EngineResult, MovableOnNetwork, PersonAgent, QVehicle};

pub struct LinkAdvance<'a> {
    pub events:        &'a mut EventBuffer,
    pub access_egress: &'a mut dyn AccessEgress,
    pub schedule:      &'a TransitSchedule,
    /// Transit passengers that got off during this advance.
    pub alighted:      Vec<PersonAgent>,
}

impl<'a> LinkAdvance<'a> {
    pub fn new(
        events:        &'a mut EventBuffer,
        access_egress: &'a mut dyn AccessEgress,
        schedule:      &'a TransitSchedule,
    ) -> Self {
        Self { events, access_egress, schedule, alighted: Vec::new() }
    }
}

impl VehicleHandler for LinkAdvance<'_> {
    fn on_ready(
        &mut self,
        vehicle: &mut QVehicle,
        link:    LinkId,
        origin:  Origin,
        now:     SimTime,
    ) -> EngineResult<Disposition> {
        let QVehicle { id, vehicle_type, driver, cabin, in_traffic } = vehicle;
        let driver = driver.as_mut().ok_or(EngineError::NoDriver(*id))?;

        if origin == Origin::Waiting {
            *in_traffic = true;
            self.events.emit(now, EventKind::VehicleEntersTraffic {
                driver:  driver.id(),
                vehicle: *id,
                link,
                mode:    driver.mode(),
            });
        }

        if let Driver::Transit(transit) = driver {
            while let Some(stop) = transit.next_stop().map(|s| s.stop) {
                let stop_link = self
                    .schedule
                    .facility(stop)
                    .map(|f| f.link)
                    .ok_or(EngineError::UnknownStop(stop))?;
                if stop_link != link {
                    break;
                }
                let mut services = StopServices {
                    access_egress: &mut *self.access_egress,
                    events:        &mut *self.events,
                    alighted:      &mut self.alighted,
                };
                let stop_vehicle = StopVehicle { id: *id, vehicle_type: &**vehicle_type, cabin: &mut *cabin };
                let dwell = transit.handle_transit_stop(stop, now, stop_vehicle, &mut services)?;
                if dwell > 0.0 {
                    return Ok(Disposition::Hold { until: now.offset(dwell.ceil() as u32) });
                }
            }
        }

        Ok(match driver.choose_next_link() {
            Some(_) => Disposition::Buffer,
            None => Disposition::Leave,
        })
    }
}
