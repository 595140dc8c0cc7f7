//! Weighted least squares navigation
use log::{debug, warn};
use nalgebra::{DMatrix, DVector, Matrix4, Vector4};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod dop;
pub mod solutions;

pub use dop::DilutionOfPrecision;
pub use solutions::PVTSolution;

use crate::{
    cfg::SolverOpts,
    constants::SPEED_OF_LIGHT_M_S,
    prelude::{CorrectedRange, Error, Position, Vector3, SV},
};

/// SV Navigation information
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SVContribution {
    /// [SV] identity
    pub sv: SV,

    /// Postfit residual (in meters)
    pub residual_m: f64,

    /// Weight of this vehicle
    pub weight: f64,

    /// Elevation angle from RX position
    pub elevation_deg: f64,

    /// Azimuth angle from RX position
    pub azimuth_deg: f64,

    /// Satellite clock correction that was applied (in s)
    pub clock_correction_s: f64,
}

/// Receiver position and clock estimate, for one epoch
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReceiverSolution {
    /// Position in meters ECEF
    pub position_ecef_m: (f64, f64, f64),
    /// Receiver clock bias (s)
    pub clock_bias_s: f64,
    /// Root mean square of the weighted postfit residuals (in meters)
    pub rms_m: f64,
    /// Number of vehicles used
    pub sv_used: usize,
    /// True when the iteration met the convergence criterion
    pub converged: bool,
    /// Number of iterations
    pub iterations: usize,
    /// Per vehicle contributions
    pub sv: Vec<SVContribution>,
    /// Vehicles excluded while solving
    pub excluded: Vec<SV>,
    /// [DilutionOfPrecision], when geometry permits
    pub dop: Option<DilutionOfPrecision>,
}

impl ReceiverSolution {
    /// Returns [Position] of this solution
    pub fn position(&self) -> Result<Position, Error> {
        let (x, y, z) = self.position_ecef_m;
        Position::from_ecef(Vector3::new(x, y, z))
    }

    /// Returns state vector (x, y, z, clock bias), all in meters.
    pub fn state(&self) -> Vector4<f64> {
        let (x, y, z) = self.position_ecef_m;
        Vector4::new(x, y, z, self.clock_bias_s * SPEED_OF_LIGHT_M_S)
    }
}

/// Gauss-Newton iteration outcome
#[derive(Debug, Clone, Copy)]
struct Iterate {
    /// (x, y, z, clock bias), all in meters
    state: Vector4<f64>,
    iterations: usize,
    converged: bool,
    singular: bool,
}

/// [Navigation] solves receiver position and clock bias
/// from one set of [CorrectedRange]s.
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    opts: SolverOpts,
}

impl Navigation {
    pub fn new(opts: &SolverOpts) -> Self {
        Self { opts: opts.clone() }
    }

    /// Solves receiver position and clock bias.
    ///
    /// ## Input
    /// - ranges: [CorrectedRange]s of this epoch
    /// - initial: initial state (x, y, z, clock bias) in meters.
    ///   Iteration starts from the Earth center when not provided.
    pub fn solve(
        &self,
        ranges: &[CorrectedRange],
        initial: Option<Vector4<f64>>,
    ) -> Result<ReceiverSolution, Error> {
        if ranges.len() < 4 {
            return Err(Error::InsufficientSatellites(ranges.len()));
        }

        let seed = initial
            .filter(|state| state.iter().all(|v| v.is_finite()))
            .unwrap_or_else(Vector4::zeros);

        let mut used = ranges.to_vec();
        let mut excluded = Vec::new();
        let mut iterate = self.iterate(&used, seed);

        if iterate.singular {
            warn!("{} - retrying without lowest weight vehicle", Error::SingularGeometry);
            if let Some(retry) = self.singular_retry(&used, seed) {
                let (dropped, retried) = retry;
                if !retried.singular {
                    excluded.push(used.remove(dropped).sv);
                    iterate = retried;
                }
            }
            if iterate.singular {
                warn!("{} - returning best available iterate", Error::SingularGeometry);
            }
        }

        if let Some((faulty, retried)) = self.fault_exclusion(&used, seed, &iterate) {
            let sv = used.remove(faulty).sv;
            debug!("fault exclusion: {} excluded", sv);
            excluded.push(sv);
            iterate = retried;
        }

        Ok(self.solution(&used, &iterate, excluded))
    }

    /// Drops the lowest weight vehicle and iterates once more.
    /// Returns the dropped index and new [Iterate].
    fn singular_retry(&self, ranges: &[CorrectedRange], seed: Vector4<f64>) -> Option<(usize, Iterate)> {
        if ranges.len() <= 4 {
            return None;
        }
        let (lowest, _) = ranges
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.weight.total_cmp(&b.weight))?;

        let subset = Self::without(ranges, lowest);
        Some((lowest, self.iterate(&subset, seed)))
    }

    /// Excludes the vehicle that best explains an excessive RMS residual,
    /// when [SolverOpts::max_rms_m] is set.
    ///
    /// Detection is opt-in and compares the weighted RMS to a fixed bound.
    /// It does not run a chi-square test on the weighted sum of squared residuals
    /// (n-4 degrees of freedom): pick a bound consistent with the expected
    /// pseudo range noise and weighting. At most one vehicle is excluded.
    fn fault_exclusion(
        &self,
        ranges: &[CorrectedRange],
        seed: Vector4<f64>,
        current: &Iterate,
    ) -> Option<(usize, Iterate)> {
        let max_rms_m = self.opts.max_rms_m?;

        if !current.converged || current.singular || ranges.len() <= 4 {
            return None;
        }

        let rms_m = Self::rms(&Self::weighted_residuals(ranges, &current.state));
        if rms_m <= max_rms_m {
            return None;
        }

        debug!("rms={:.3}m exceeds {:.3}m: fault exclusion", rms_m, max_rms_m);

        (0..ranges.len())
            .filter_map(|i| {
                let subset = Self::without(ranges, i);
                let iterate = self.iterate(&subset, seed);
                if iterate.converged && !iterate.singular {
                    let ssr = Self::weighted_residuals(&subset, &iterate.state).norm_squared();
                    Some((i, iterate, ssr))
                } else {
                    None
                }
            })
            .min_by(|(_, _, a), (_, _, b)| a.total_cmp(b))
            .map(|(i, iterate, _)| (i, iterate))
    }

    fn without(ranges: &[CorrectedRange], index: usize) -> Vec<CorrectedRange> {
        ranges
            .iter()
            .enumerate()
            .filter_map(|(i, r)| if i == index { None } else { Some(*r) })
            .collect()
    }

    /// Bounded Gauss-Newton iteration
    fn iterate(&self, ranges: &[CorrectedRange], seed: Vector4<f64>) -> Iterate {
        let mut state = seed;

        for iteration in 1..=self.opts.max_iter {
            let (a, y) = Self::weighted_system(ranges, &state);

            let dx = match self.least_squares_step(&a, &y) {
                Some(dx) => dx,
                None => {
                    return Iterate {
                        state,
                        iterations: iteration,
                        converged: false,
                        singular: true,
                    };
                },
            };

            let next = state + dx;
            if !next.iter().all(|v| v.is_finite()) {
                warn!("iteration #{}: non finite update", iteration);
                return Iterate {
                    state,
                    iterations: iteration,
                    converged: false,
                    singular: false,
                };
            }
            state = next;

            let dpos_m = dx.fixed_rows::<3>(0).norm();
            debug!("iteration #{}: |dx|={:.3E}m", iteration, dpos_m);

            if dpos_m < self.opts.convergence_threshold_m {
                return Iterate {
                    state,
                    iterations: iteration,
                    converged: true,
                    singular: false,
                };
            }
        }

        Iterate {
            state,
            iterations: self.opts.max_iter,
            converged: false,
            singular: false,
        }
    }

    /// Unit line of sight from state to vehicle, and geometric distance.
    fn line_of_sight(range: &CorrectedRange, state: &Vector4<f64>) -> (Vector3<f64>, f64) {
        let d = range.position_m - state.fixed_rows::<3>(0);
        let distance = d.norm();
        if distance > 0.0 {
            (d / distance, distance)
        } else {
            (Vector3::zeros(), distance)
        }
    }

    /// Builds weighted design matrix √W.H and weighted prefit residuals √W.r
    fn weighted_system(ranges: &[CorrectedRange], state: &Vector4<f64>) -> (DMatrix<f64>, DVector<f64>) {
        let n = ranges.len();
        let mut a = DMatrix::<f64>::zeros(n, 4);
        let mut y = DVector::<f64>::zeros(n);

        for (i, range) in ranges.iter().enumerate() {
            let (los, distance) = Self::line_of_sight(range, state);
            let w = range.weight;
            a[(i, 0)] = -los[0] * w;
            a[(i, 1)] = -los[1] * w;
            a[(i, 2)] = -los[2] * w;
            a[(i, 3)] = w;
            y[i] = (range.range_m - distance - state[3]) * w;
        }

        (a, y)
    }

    /// Solves A.dx = y in the least squares sense, by QR factorization.
    /// Returns None on (nearly) singular geometry.
    fn least_squares_step(&self, a: &DMatrix<f64>, y: &DVector<f64>) -> Option<Vector4<f64>> {
        let singular_values = a.singular_values();
        let (s_min, s_max) = (singular_values.min(), singular_values.max());

        if !(s_max > 0.0) || s_min / s_max < self.opts.singular_threshold {
            return None;
        }

        let qr = a.clone().qr();
        let qt_y = qr.q().transpose() * y;
        let dx = qr.r().solve_upper_triangular(&qt_y)?;

        Some(Vector4::new(dx[0], dx[1], dx[2], dx[3]))
    }

    /// Weighted postfit residuals
    fn weighted_residuals(ranges: &[CorrectedRange], state: &Vector4<f64>) -> DVector<f64> {
        DVector::from_iterator(
            ranges.len(),
            ranges.iter().map(|range| {
                let (_, distance) = Self::line_of_sight(range, state);
                (range.range_m - distance - state[3]) * range.weight
            }),
        )
    }

    fn rms(weighted_residuals: &DVector<f64>) -> f64 {
        if weighted_residuals.is_empty() {
            return 0.0;
        }
        (weighted_residuals.norm_squared() / weighted_residuals.len() as f64).sqrt()
    }

    /// Unweighted geometry cofactor matrix (Hᵀ.H)⁻¹
    fn cofactor(ranges: &[CorrectedRange], state: &Vector4<f64>) -> Option<Matrix4<f64>> {
        let mut hth = Matrix4::<f64>::zeros();
        for range in ranges {
            let (los, _) = Self::line_of_sight(range, state);
            let h = Vector4::new(-los[0], -los[1], -los[2], 1.0);
            hth += h * h.transpose();
        }
        hth.try_inverse()
    }

    fn solution(&self, ranges: &[CorrectedRange], iterate: &Iterate, excluded: Vec<SV>) -> ReceiverSolution {
        let state = iterate.state;
        let residuals = Self::weighted_residuals(ranges, &state);
        let position = Position::from_ecef(state.fixed_rows::<3>(0).into_owned()).ok();

        let sv = ranges
            .iter()
            .zip(residuals.iter())
            .map(|(range, weighted)| {
                let (elevation_deg, azimuth_deg) = match &position {
                    Some(position) => position.elevation_azimuth_deg(&range.position_m),
                    None => (
                        range.elevation_deg.unwrap_or_default(),
                        range.azimuth_deg.unwrap_or_default(),
                    ),
                };
                SVContribution {
                    sv: range.sv,
                    residual_m: if range.weight > 0.0 {
                        weighted / range.weight
                    } else {
                        0.0
                    },
                    weight: range.weight,
                    elevation_deg,
                    azimuth_deg,
                    clock_correction_s: range.clock_correction_s,
                }
            })
            .collect::<Vec<_>>();

        let dop = match (&position, Self::cofactor(ranges, &state)) {
            (Some(position), Some(q)) => {
                let (lat_rad, lon_rad, _) = position.geodetic();
                Some(DilutionOfPrecision::new(&q, lat_rad, lon_rad))
            },
            _ => None,
        };

        ReceiverSolution {
            position_ecef_m: (state[0], state[1], state[2]),
            clock_bias_s: state[3] / SPEED_OF_LIGHT_M_S,
            rms_m: Self::rms(&residuals),
            sv_used: ranges.len(),
            converged: iterate.converged && !iterate.singular,
            iterations: iterate.iterations,
            sv,
            excluded,
            dop,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::{Constellation, Epoch};
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    const CLOCK_BIAS_S: f64 = 1.234E-4;

    fn receiver() -> Position {
        Position::from_geodetic(43.6, 1.44, 150.0).unwrap()
    }

    /// Vehicle located at (azimuth, elevation, slant range) from RX
    fn vehicle(rx: &Position, azim_deg: f64, elev_deg: f64, slant_m: f64) -> Vector3<f64> {
        let (lat, lon, _) = rx.geodetic();
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        let east = Vector3::new(-sin_lon, cos_lon, 0.0);
        let north = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
        let up = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);

        let (azim, elev) = (azim_deg.to_radians(), elev_deg.to_radians());
        let dir = east * (elev.cos() * azim.sin()) + north * (elev.cos() * azim.cos()) + up * elev.sin();
        rx.ecef() + dir * slant_m
    }

    fn ranges(rx: &Position, geometry: &[(f64, f64)]) -> Vec<CorrectedRange> {
        let t = Epoch::from_gpst_seconds(1.4E9);
        geometry
            .iter()
            .enumerate()
            .map(|(i, (azim, elev))| {
                let position_m = vehicle(rx, *azim, *elev, 21_000_000.0 + 100_000.0 * i as f64);
                CorrectedRange {
                    sv: SV::new(Constellation::GPS, i as u8 + 1),
                    epoch: t,
                    transmission: t,
                    position_m,
                    range_m: (position_m - rx.ecef()).norm() + CLOCK_BIAS_S * SPEED_OF_LIGHT_M_S,
                    weight: 1.0,
                    clock_correction_s: 0.0,
                    elevation_deg: None,
                    azimuth_deg: None,
                }
            })
            .collect()
    }

    const FOUR_SV: [(f64, f64); 4] = [(0.0, 85.0), (10.0, 30.0), (130.0, 25.0), (250.0, 35.0)];

    const EIGHT_SV: [(f64, f64); 8] = [
        (0.0, 85.0),
        (10.0, 30.0),
        (60.0, 50.0),
        (130.0, 25.0),
        (175.0, 60.0),
        (250.0, 35.0),
        (300.0, 15.0),
        (330.0, 70.0),
    ];

    #[test]
    fn four_vehicles_exact_solution() {
        let rx = receiver();
        let ranges = ranges(&rx, &FOUR_SV);

        let solution = Navigation::default().solve(&ranges, None).unwrap();

        let (x, y, z) = solution.position_ecef_m;
        let err = (Vector3::new(x, y, z) - rx.ecef()).norm();

        assert!(solution.converged);
        assert!(err < 1.0E-6, "position error {}m", err);
        assert!((solution.clock_bias_s - CLOCK_BIAS_S).abs() < 1.0E-9);
        assert!(solution.rms_m < 1.0E-6);
        assert_eq!(solution.sv_used, 4);
        assert!(solution.excluded.is_empty());
        assert!(solution.iterations > 1 && solution.iterations <= 20);

        for contrib in solution.sv.iter() {
            assert!(contrib.residual_m.abs() < 1.0E-6);
            assert!(contrib.elevation_deg > 0.0);
        }
    }

    #[test]
    fn insufficient_vehicles() {
        let rx = receiver();
        let ranges = ranges(&rx, &FOUR_SV);

        let navigation = Navigation::default();

        assert_eq!(
            navigation.solve(&ranges[..3], None),
            Err(Error::InsufficientSatellites(3))
        );
        assert_eq!(navigation.solve(&[], None), Err(Error::InsufficientSatellites(0)));
        assert!(navigation.solve(&ranges[..4], None).is_ok());
    }

    #[test]
    fn warm_start() {
        let rx = receiver();
        let ranges = ranges(&rx, &EIGHT_SV);

        let navigation = Navigation::default();
        let cold = navigation.solve(&ranges, None).unwrap();
        let warm = navigation.solve(&ranges, Some(cold.state())).unwrap();

        assert!(warm.converged);
        assert!(warm.iterations < cold.iterations);

        let (x, y, z) = warm.position_ecef_m;
        assert!((Vector3::new(x, y, z) - rx.ecef()).norm() < 1.0E-6);

        // non finite apriori is disregarded
        let nan = Vector4::new(f64::NAN, 0.0, 0.0, 0.0);
        assert!(navigation.solve(&ranges, Some(nan)).unwrap().converged);
    }

    #[test]
    fn singular_geometry() {
        // vehicles evenly spread on a cone around the Z axis:
        // lines of sight from the Earth center share their Z component
        let t = Epoch::from_gpst_seconds(1.4E9);
        let ranges = (0..5)
            .map(|i| {
                let azim = (i as f64 * 72.0).to_radians();
                let position_m = Vector3::new(15.0E6 * azim.cos(), 15.0E6 * azim.sin(), 20.0E6);
                CorrectedRange {
                    sv: SV::new(Constellation::GPS, i as u8 + 1),
                    epoch: t,
                    transmission: t,
                    position_m,
                    range_m: 20.0E6,
                    weight: 1.0 - 0.1 * i as f64,
                    clock_correction_s: 0.0,
                    elevation_deg: None,
                    azimuth_deg: None,
                }
            })
            .collect::<Vec<_>>();

        let solution = Navigation::default().solve(&ranges, None).unwrap();
        assert!(!solution.converged);
        assert!(solution.position_ecef_m.0.is_finite());
        assert!(solution.position_ecef_m.1.is_finite());
        assert!(solution.position_ecef_m.2.is_finite());
        assert!(solution.clock_bias_s.is_finite());
        assert!(solution.excluded.is_empty());
        assert!(solution.dop.is_none());

        // reported as a non converged solution, without geodetic coordinates
        let pvt = PVTSolution::new(t, solution.clone());
        assert_eq!(pvt.epoch, t);
        assert!(!pvt.solution.converged);
        assert!(pvt.lat_long_alt_deg_deg_m.is_none());
        assert_eq!(pvt.solution, solution);
        assert_eq!(pvt.position(), Err(Error::DegeneratePosition));
    }

    #[test]
    fn iteration_limit() {
        let rx = receiver();
        let ranges = ranges(&rx, &EIGHT_SV);

        let mut opts = SolverOpts::default();
        opts.max_iter = 1;

        let solution = Navigation::new(&opts).solve(&ranges, None).unwrap();
        assert!(!solution.converged);
        assert_eq!(solution.iterations, 1);
        assert!(solution.rms_m.is_finite());
    }

    #[test]
    fn weight_monotonicity() {
        let rx = receiver();
        let mut rng = SmallRng::seed_from_u64(0x574c53);

        let mut ranges = ranges(&rx, &EIGHT_SV);
        for range in ranges.iter_mut() {
            range.range_m += rng.random_range(-5.0..5.0);
        }

        let target = 3;
        let navigation = Navigation::default();
        let mut previous = f64::INFINITY;

        for weight in [0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 10.0] {
            ranges[target].weight = weight;
            let solution = navigation.solve(&ranges, None).unwrap();
            assert!(solution.converged);

            let residual = solution.sv[target].residual_m.abs();
            assert!(
                residual <= previous + 1.0E-6,
                "weight={}: residual {} increased (was {})",
                weight,
                residual,
                previous
            );
            previous = residual;
        }
    }

    #[test]
    fn dilution_of_precision() {
        let rx = receiver();
        let ranges = ranges(&rx, &EIGHT_SV);

        let solution = Navigation::default().solve(&ranges, None).unwrap();
        let dop = solution.dop.unwrap();

        assert!(dop.gdop > 1.0 && dop.gdop < 5.0, "gdop={}", dop.gdop);
        assert!((dop.gdop.powi(2) - dop.pdop.powi(2) - dop.tdop.powi(2)).abs() < 1.0E-9);
        assert!((dop.pdop.powi(2) - dop.hdop.powi(2) - dop.vdop.powi(2)).abs() < 1.0E-9);
    }

    #[test]
    fn fault_exclusion() {
        let rx = receiver();
        let mut ranges = ranges(&rx, &EIGHT_SV);
        ranges[5].range_m += 500.0;

        let navigation = Navigation::default();
        let faulty = navigation.solve(&ranges, None).unwrap();
        assert!(faulty.converged);
        assert!(faulty.rms_m > 10.0);
        assert!(faulty.excluded.is_empty());

        let mut opts = SolverOpts::default();
        opts.max_rms_m = Some(10.0);

        let solution = Navigation::new(&opts).solve(&ranges, None).unwrap();
        assert!(solution.converged);
        assert_eq!(solution.excluded, vec![ranges[5].sv]);
        assert_eq!(solution.sv_used, 7);
        assert!(solution.rms_m < 1.0E-6);

        let (x, y, z) = solution.position_ecef_m;
        assert!((Vector3::new(x, y, z) - rx.ecef()).norm() < 1.0E-6);
    }
}
