//! Least squares solver options

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const fn default_max_iter() -> usize {
    20
}

const fn default_convergence_threshold() -> f64 {
    1.0E-4
}

const fn default_singular_threshold() -> f64 {
    1.0E-10
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverOpts {
    /// Maximal number of Gauss-Newton iterations
    #[cfg_attr(feature = "serde", serde(default = "default_max_iter"))]
    pub max_iter: usize,
    /// Iteration stops once the position update norm
    /// falls below this value (in meters)
    #[cfg_attr(feature = "serde", serde(default = "default_convergence_threshold"))]
    pub convergence_threshold_m: f64,
    /// Geometry is declared singular when the smallest singular value
    /// of the weighted design matrix, relative to the largest one,
    /// falls below this value.
    #[cfg_attr(feature = "serde", serde(default = "default_singular_threshold"))]
    pub singular_threshold: f64,
    /// Fault exclusion: a solution whose RMS residual (in meters) exceeds this
    /// value is solved again, excluding one vehicle at a time.
    /// Disabled when None.
    #[cfg_attr(feature = "serde", serde(default))]
    pub max_rms_m: Option<f64>,
}

impl Default for SolverOpts {
    fn default() -> Self {
        Self {
            max_iter: default_max_iter(),
            convergence_threshold_m: default_convergence_threshold(),
            singular_threshold: default_singular_threshold(),
            max_rms_m: None,
        }
    }
}
