use thiserror::Error;

use crate::prelude::SV;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// No [Ephemeris](crate::prelude::Ephemeris) frame covers this [SV] at transmission time.
    /// The [SV] is dropped from the ongoing epoch.
    #[error("{0}: no valid ephemeris")]
    MissingEphemeris(SV),

    /// Structurally invalid orbital elements. The [SV] is dropped
    /// and the record should be reported as a data quality issue.
    #[error("{0}: malformed ephemeris ({1})")]
    MalformedEphemeris(SV, &'static str),

    /// Position solving requires at least 4 usable vehicles.
    /// The epoch yields no solution.
    #[error("not enough usable satellites ({0}), 4 required")]
    InsufficientSatellites(usize),

    /// Iteration limit reached without meeting the convergence criterion.
    #[error("iteration limit reached without convergence")]
    NonConvergence,

    /// Normal equations are (nearly) singular: not enough independent
    /// lines of sight, or vehicles nearly coplanar.
    #[error("singular geometry")]
    SingularGeometry,

    /// Observation could not be built from provided values.
    #[error("invalid observation: {0}")]
    InvalidObservation(&'static str),

    /// Bad signal data: transit time is not physically possible.
    #[error("{0}: physical non sense (transit time)")]
    PhysicalNonSense(SV),

    /// Vehicle is below the elevation mask, as seen from the apriori position.
    #[error("{0}: below elevation mask")]
    BelowElevationMask(SV),

    /// Selected weighting policy requires a measurement that is not available.
    #[error("{0}: missing weighting input")]
    MissingWeightInput(SV),

    /// Vehicle rejected by the minimal CN0 criterion.
    #[error("{0}: signal too weak")]
    WeakSignal(SV),

    /// Geodetic coordinates are not defined for this position (zero vector, non finite).
    #[error("degenerate position: geodetic coordinates undefined")]
    DegeneratePosition,

    /// Processing was abandoned by the caller.
    #[error("processing cancelled")]
    Cancelled,
}
