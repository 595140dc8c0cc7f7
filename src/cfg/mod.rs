#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::prelude::Duration;

mod modeling;
mod solver;

pub use modeling::Modeling;
pub use solver::SolverOpts;

/// Per vehicle weighting policy, applied to each corrected range
#[derive(Default, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WeightPolicy {
    /// All vehicles contribute equally
    Uniform,
    /// Weight grows with signal strength: 10^((CN0 - ref)/20).
    /// Vehicles without CN0 are not used.
    Cn0,
    /// Weight decreases with Doppler magnitude: 1/(1 + |fd|/ref).
    /// Vehicles without Doppler are not used.
    Doppler,
    /// CN0 based weight when available, Doppler based weight otherwise,
    /// uniform weight when neither is reported.
    #[default]
    Cn0OrDoppler,
}

fn default_epoch_gap() -> f64 {
    1.0
}

fn default_cn0_ref() -> f64 {
    45.0
}

fn default_doppler_ref() -> f64 {
    1000.0
}

fn default_elevation_mask() -> f64 {
    0.0
}

fn default_transit_iterations() -> usize {
    2
}

fn default_warm_start() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Two successive observations belong to the same epoch when
    /// their timestamps differ by less than this value (in seconds).
    #[cfg_attr(feature = "serde", serde(default = "default_epoch_gap"))]
    pub epoch_gap_s: f64,
    /// [WeightPolicy] applied to each vehicle
    #[cfg_attr(feature = "serde", serde(default))]
    pub weight: WeightPolicy,
    /// CN0 (in dB-Hz) for which CN0 based weight is 1.0
    #[cfg_attr(feature = "serde", serde(default = "default_cn0_ref"))]
    pub cn0_ref_dbhz: f64,
    /// Doppler magnitude (in Hz) for which Doppler based weight is 0.5
    #[cfg_attr(feature = "serde", serde(default = "default_doppler_ref"))]
    pub doppler_ref_hz: f64,
    /// Minimal elevation angle (in degrees) for a vehicle to contribute,
    /// once an apriori position is known.
    #[cfg_attr(feature = "serde", serde(default = "default_elevation_mask"))]
    pub elevation_mask_deg: f64,
    /// Minimal CN0 (in dB-Hz) for a vehicle to contribute.
    #[cfg_attr(feature = "serde", serde(default))]
    pub min_cn0_dbhz: Option<f64>,
    /// Number of transmission time refinements
    #[cfg_attr(feature = "serde", serde(default = "default_transit_iterations"))]
    pub transit_iterations: usize,
    /// Use previous solution as initial state of the next epoch
    #[cfg_attr(feature = "serde", serde(default = "default_warm_start"))]
    pub warm_start: bool,
    /// Physical [Modeling]
    #[cfg_attr(feature = "serde", serde(default))]
    pub modeling: Modeling,
    /// Solver customization
    #[cfg_attr(feature = "serde", serde(default))]
    pub solver: SolverOpts,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            epoch_gap_s: default_epoch_gap(),
            weight: WeightPolicy::default(),
            cn0_ref_dbhz: default_cn0_ref(),
            doppler_ref_hz: default_doppler_ref(),
            elevation_mask_deg: default_elevation_mask(),
            min_cn0_dbhz: None,
            transit_iterations: default_transit_iterations(),
            warm_start: default_warm_start(),
            modeling: Modeling::default(),
            solver: SolverOpts::default(),
        }
    }
}

impl Config {
    /// Returns epoch grouping threshold as [Duration]
    pub fn epoch_gap(&self) -> Duration {
        Duration::from_seconds(self.epoch_gap_s)
    }

    /// Copies and returns [Config] with desired [WeightPolicy]
    pub fn with_weight_policy(&self, weight: WeightPolicy) -> Self {
        let mut s = self.clone();
        s.weight = weight;
        s
    }

    /// Copies and returns [Config] with desired elevation mask (in degrees)
    pub fn with_elevation_mask(&self, mask_deg: f64) -> Self {
        let mut s = self.clone();
        s.elevation_mask_deg = mask_deg;
        s
    }
}
