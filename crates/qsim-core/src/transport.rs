//! Leg mode enum shared by plans, events and the engine.
//!
//! Which modes are moved over the network is decided by
//! `SimConfig::network_modes`, not by the enum itself.

use std::str::FromStr;

use crate::CoreError;

/// The mode of one leg of a plan.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[non_exhaustive]
pub enum LegMode {
    /// Private vehicle.
    #[default]
    Car,
    /// Scheduled public transit, as passenger.
    Pt,
    /// On foot.
    Walk,
    /// Bicycle.
    Bike,
    /// Passenger in a private vehicle.
    Ride,
}

impl LegMode {
    /// Label used in events and output files.
    pub fn as_str(self) -> &'static str {
        match self {
            LegMode::Car  => "car",
            LegMode::Pt   => "pt",
            LegMode::Walk => "walk",
            LegMode::Bike => "bike",
            LegMode::Ride => "ride",
        }
    }
}

impl FromStr for LegMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "car"  => Ok(LegMode::Car),
            "pt"   => Ok(LegMode::Pt),
            "walk" => Ok(LegMode::Walk),
            "bike" => Ok(LegMode::Bike),
            "ride" => Ok(LegMode::Ride),
            other  => Err(CoreError::Parse(format!("unknown leg mode {other:?}"))),
        }
    }
}

impl std::fmt::Display for LegMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
