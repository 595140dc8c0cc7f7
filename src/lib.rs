#![doc = include_str!("../README.md")]
#![cfg_attr(docrs, feature(doc_cfg))]

extern crate gnss_rs as gnss;

pub mod cfg;
pub mod constants;
pub mod corrector;
pub mod ephemeris;
pub mod epoch;
pub mod error;
pub mod navigation;
pub mod position;
pub mod solver;
pub mod store;

mod observation;

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::cfg::{Config, Modeling, SolverOpts, WeightPolicy};
    pub use crate::corrector::{CorrectedRange, RangeCorrector};
    pub use crate::ephemeris::{ClockTerms, Ephemeris, Keplerian, OrbitModel, OrbitalState, StateVector};
    pub use crate::epoch::{EpochBuilder, MeasurementEpoch};
    pub use crate::error::Error;
    pub use crate::navigation::{
        DilutionOfPrecision, Navigation, PVTSolution, ReceiverSolution, SVContribution,
    };
    pub use crate::observation::Observation;
    pub use crate::position::Position;
    pub use crate::solver::{Cancellation, Solver};
    pub use crate::store::{EphemerisStore, SharedEphemeris};
    // re-export
    pub use gnss::prelude::{Constellation, SV};
    pub use hifitime::{Duration, Epoch, TimeScale, Unit};
    pub use nalgebra::Vector3;
}
