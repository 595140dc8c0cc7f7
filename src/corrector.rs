//! Pseudo range correction
use log::{debug, warn};
use nalgebra::Rotation3;

use crate::{
    cfg::{Config, Modeling, WeightPolicy},
    constants::{kepler_constants, SPEED_OF_LIGHT_M_S},
    prelude::{
        Duration, Ephemeris, EphemerisStore, Epoch, Error, MeasurementEpoch, Observation,
        OrbitalState, Position, Vector3, SV,
    },
};

/// Maximal transit time that we tolerate (in s)
const MAX_TRANSIT_S: f64 = 0.1;

/// Number of Earth rotation refinements, once an apriori position is known
const EARTH_ROTATION_ITER: usize = 2;

/// Pseudo range corrected for satellite clock and signal transit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedRange {
    /// [SV] identity
    pub sv: SV,
    /// Reception [Epoch]
    pub epoch: Epoch,
    /// Transmission [Epoch]
    pub transmission: Epoch,
    /// Satellite position (in meters), ECEF at reception time
    pub position_m: Vector3<f64>,
    /// Corrected pseudo range (in meters)
    pub range_m: f64,
    /// Weight of this vehicle in the solution
    pub weight: f64,
    /// Satellite clock correction that was applied (in s)
    pub clock_correction_s: f64,
    /// Elevation angle (in degrees), when an apriori position exists
    pub elevation_deg: Option<f64>,
    /// Azimuth angle (in degrees), when an apriori position exists
    pub azimuth_deg: Option<f64>,
}

/// Rotates a position (in meters) about the Z axis by the Earth rotation
/// during signal transit, expressing it in the ECEF frame at reception time.
pub(crate) fn earth_rotation(position_m: &Vector3<f64>, omega_e: f64, transit_s: f64) -> Vector3<f64> {
    let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), -omega_e * transit_s);
    rot * position_m
}

/// [RangeCorrector] turns raw [Observation]s into [CorrectedRange]s.
#[derive(Debug, Clone)]
pub struct RangeCorrector {
    weight: WeightPolicy,
    cn0_ref_dbhz: f64,
    doppler_ref_hz: f64,
    elevation_mask_deg: f64,
    min_cn0_dbhz: Option<f64>,
    transit_iterations: usize,
    modeling: Modeling,
}

impl RangeCorrector {
    pub fn new(cfg: &Config) -> Self {
        Self {
            weight: cfg.weight,
            cn0_ref_dbhz: cfg.cn0_ref_dbhz,
            doppler_ref_hz: cfg.doppler_ref_hz,
            elevation_mask_deg: cfg.elevation_mask_deg,
            min_cn0_dbhz: cfg.min_cn0_dbhz,
            transit_iterations: cfg.transit_iterations,
            modeling: cfg.modeling,
        }
    }

    /// Weight of this [Observation], according to the [WeightPolicy].
    pub fn weight(&self, obs: &Observation) -> Result<f64, Error> {
        let cn0_weight = |cn0: f64| 10.0_f64.powf((cn0 - self.cn0_ref_dbhz) / 20.0);
        let doppler_weight = |doppler: f64| 1.0 / (1.0 + doppler.abs() / self.doppler_ref_hz);

        match self.weight {
            WeightPolicy::Uniform => Ok(1.0),
            WeightPolicy::Cn0 => obs
                .cn0_dbhz
                .map(cn0_weight)
                .ok_or(Error::MissingWeightInput(obs.sv)),
            WeightPolicy::Doppler => obs
                .doppler_hz
                .map(doppler_weight)
                .ok_or(Error::MissingWeightInput(obs.sv)),
            WeightPolicy::Cn0OrDoppler => Ok(obs
                .cn0_dbhz
                .map(cn0_weight)
                .or(obs.doppler_hz.map(doppler_weight))
                .unwrap_or(1.0)),
        }
    }

    /// Satellite clock correction (in s), with desired [Modeling] terms
    fn sv_clock_correction_s(&self, state: &OrbitalState) -> f64 {
        let mut dt = 0.0;
        if self.modeling.sv_clock_bias {
            dt += state.clock_correction_s - state.relativistic_correction_s + state.group_delay_s;
        }
        if self.modeling.relativistic_clock_bias {
            dt += state.relativistic_correction_s;
        }
        if self.modeling.sv_total_group_delay {
            dt -= state.group_delay_s;
        }
        dt
    }

    /// Corrects one [Observation] using the selected [Ephemeris] frame.
    /// The `apriori` receiver [Position] enables the elevation mask
    /// and refines the Earth rotation correction.
    pub fn correct(
        &self,
        obs: &Observation,
        eph: &Ephemeris,
        apriori: Option<&Position>,
    ) -> Result<CorrectedRange, Error> {
        let sv = obs.sv;

        if let (Some(min_cn0), Some(cn0)) = (self.min_cn0_dbhz, obs.cn0_dbhz) {
            if cn0 < min_cn0 {
                return Err(Error::WeakSignal(sv));
            }
        }

        let pseudo_range_m = obs.pseudo_range_m;
        let transit_s = pseudo_range_m / SPEED_OF_LIGHT_M_S;
        if transit_s <= 0.0 || transit_s >= MAX_TRANSIT_S {
            return Err(Error::PhysicalNonSense(sv));
        }

        let weight = self.weight(obs)?;

        let t_rx = obs.reception_epoch();

        let mut t_tx = t_rx - Duration::from_seconds(transit_s);
        let mut state = eph.propagate(t_tx)?;

        for _ in 0..self.transit_iterations {
            let dt_sv = self.sv_clock_correction_s(&state);
            t_tx = t_rx - Duration::from_seconds(transit_s + dt_sv);
            state = eph.propagate(t_tx)?;
        }

        let clock_correction_s = self.sv_clock_correction_s(&state);

        let mut position_m = state.position_m;

        if self.modeling.earth_rotation {
            let (_, omega_e) = kepler_constants(sv.constellation);
            match apriori {
                Some(apriori) => {
                    let rx = apriori.ecef();
                    let mut tau = (position_m - rx).norm() / SPEED_OF_LIGHT_M_S;
                    for _ in 0..EARTH_ROTATION_ITER {
                        let rotated = earth_rotation(&state.position_m, omega_e, tau);
                        tau = (rotated - rx).norm() / SPEED_OF_LIGHT_M_S;
                    }
                    position_m = earth_rotation(&state.position_m, omega_e, tau);
                },
                None => {
                    position_m =
                        earth_rotation(&state.position_m, omega_e, transit_s + clock_correction_s);
                },
            }
        }

        let (elevation_deg, azimuth_deg) = match apriori {
            Some(apriori) => {
                let (elev, azim) = apriori.elevation_azimuth_deg(&position_m);
                if elev < self.elevation_mask_deg {
                    return Err(Error::BelowElevationMask(sv));
                }
                (Some(elev), Some(azim))
            },
            None => (None, None),
        };

        let range_m = pseudo_range_m + SPEED_OF_LIGHT_M_S * clock_correction_s;

        debug!(
            "{}({}) - corrected range={:.3}m dt_sv={:.6E}s weight={:.3}",
            t_rx, sv, range_m, clock_correction_s, weight
        );

        Ok(CorrectedRange {
            sv,
            epoch: t_rx,
            transmission: t_tx,
            position_m,
            range_m,
            weight,
            clock_correction_s,
            elevation_deg,
            azimuth_deg,
        })
    }

    /// Corrects every [Observation] of this [MeasurementEpoch], selecting
    /// [Ephemeris] frames from the [EphemerisStore]. Vehicles that
    /// cannot be corrected are dropped.
    pub fn correct_epoch(
        &self,
        epoch: &MeasurementEpoch,
        store: &EphemerisStore,
        apriori: Option<&Position>,
    ) -> Vec<CorrectedRange> {
        epoch
            .observations
            .iter()
            .filter_map(|obs| {
                let t_tx = obs.reception_epoch()
                    - Duration::from_seconds(obs.pseudo_range_m / SPEED_OF_LIGHT_M_S);

                let corrected = store
                    .lookup(obs.sv, t_tx)
                    .and_then(|eph| self.correct(obs, eph, apriori));

                match corrected {
                    Ok(range) => Some(range),
                    Err(e @ Error::MalformedEphemeris(..)) => {
                        warn!("{} - {}", epoch.epoch, e);
                        None
                    },
                    Err(e) => {
                        debug!("{} - {}", epoch.epoch, e);
                        None
                    },
                }
            })
            .collect()
    }
}
