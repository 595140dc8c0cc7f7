//! PVT Solution
use crate::{
    navigation::ReceiverSolution,
    prelude::{Epoch, Error, Position},
};

#[cfg(feature = "serde")]
use serde::Serialize;

/// PVT Solution of one epoch
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PVTSolution {
    /// [Epoch] of succesful solving
    pub epoch: Epoch,
    /// Latitude, longitude and altitude above the ellipsoid,
    /// in degrees and meters. None when the solution has no geodetic
    /// counterpart, which may happen to non converged solutions.
    pub lat_long_alt_deg_deg_m: Option<(f64, f64, f64)>,
    /// [ReceiverSolution]
    pub solution: ReceiverSolution,
}

impl PVTSolution {
    /// Builds new [PVTSolution]
    pub(crate) fn new(epoch: Epoch, solution: ReceiverSolution) -> Self {
        let lat_long_alt_deg_deg_m = solution
            .position()
            .ok()
            .map(|position| position.lat_lon_alt_deg_deg_m());
        Self {
            epoch,
            lat_long_alt_deg_deg_m,
            solution,
        }
    }

    /// Returns [Position] of this solution
    pub fn position(&self) -> Result<Position, Error> {
        self.solution.position()
    }

    /// Position in meters ECEF
    pub fn pos_m(&self) -> (f64, f64, f64) {
        self.solution.position_ecef_m
    }

    /// Receiver clock offset (s)
    pub fn clock_offset_s(&self) -> f64 {
        self.solution.clock_bias_s
    }
}
