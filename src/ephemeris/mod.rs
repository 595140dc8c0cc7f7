//! Broadcast ephemeris and orbit propagation
use crate::prelude::{Constellation, Duration, Epoch, Error, TimeScale, Vector3, SV};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub(crate) mod glonass;
pub(crate) mod kepler;

pub use kepler::solve_kepler;

/// Keplerian elements, as broadcast by GPS, Galileo, BeiDou and QZSS.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Keplerian {
    /// Square root of the semi-major axis (in sqrt(m))
    pub sqrt_a: f64,

    /// Eccentricity
    pub eccentricity: f64,

    /// Mean anomaly at reference time (in radians)
    pub m0_rad: f64,

    /// Inclination at reference time (in radians)
    pub i0_rad: f64,

    /// Rate of inclination (in radians/s)
    pub idot_rad_s: f64,

    /// Mean motion correction (in radians/s)
    pub dn_rad_s: f64,

    /// Longitude of ascending node at weekly epoch (in radians)
    pub omega0_rad: f64,

    /// Argument of perigee (in radians)
    pub omega_rad: f64,

    /// Rate of right ascension (in radians/s)
    pub omega_dot_rad_s: f64,

    /// Sine / Cosine (in radians)
    pub cus_cuc_rad: (f64, f64),

    /// Sine / Cosine (in radians)
    pub cis_cic_rad: (f64, f64),

    /// Sine / Cosine (in meters)
    pub crs_crc_m: (f64, f64),
}

/// GLONASS broadcast state vector, expressed in PZ-90.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateVector {
    /// Position (in meters)
    pub position_m: (f64, f64, f64),
    /// Velocity (in m.s⁻¹)
    pub velocity_m_s: (f64, f64, f64),
    /// Luni-solar acceleration (in m.s⁻²)
    pub acceleration_m_s2: (f64, f64, f64),
}

/// Orbit description carried by one [Ephemeris] frame.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrbitModel {
    /// [Keplerian] elements
    Keplerian(Keplerian),
    /// GLONASS [StateVector]
    StateVector(StateVector),
}

impl Default for OrbitModel {
    fn default() -> Self {
        Self::Keplerian(Default::default())
    }
}

/// Onboard clock polynomial
#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClockTerms {
    /// Clock bias (in s)
    pub bias_s: f64,
    /// Clock drift (in s.s⁻¹)
    pub drift_s_s: f64,
    /// Clock drift rate (in s.s⁻²)
    pub drift_rate_s_s2: f64,
    /// Total group delay (in s)
    pub tgd_s: f64,
}

/// Broadcast [Ephemeris] frame.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ephemeris {
    /// [SV]
    pub sv: SV,

    /// Time of Ephemeris, expressed in the constellation timescale
    pub toe: Epoch,

    /// Time of Clock, expressed in the constellation timescale
    pub toc: Epoch,

    /// [OrbitModel]
    pub orbit: OrbitModel,

    /// [ClockTerms]
    pub clock: ClockTerms,

    /// Half validity window, centered on [Self::toe]
    pub validity: Duration,
}

/// Satellite state resolved at transmission time.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OrbitalState {
    /// Transmission [Epoch]
    pub epoch: Epoch,
    /// Position, ECEF (in meters)
    pub position_m: Vector3<f64>,
    /// Satellite clock correction (in s), to add to the pseudo range
    /// once multiplied by the speed of light. Includes the relativistic
    /// term and the group delay.
    pub clock_correction_s: f64,
    /// Relativistic part of [Self::clock_correction_s] (in s)
    pub relativistic_correction_s: f64,
    /// Group delay removed from [Self::clock_correction_s] (in s)
    pub group_delay_s: f64,
}

impl Ephemeris {
    /// Default half validity window for this [Constellation]
    pub fn default_validity(constellation: Constellation) -> Duration {
        match constellation {
            Constellation::Glonass => Duration::from_seconds(15.0 * 60.0),
            _ => Duration::from_seconds(2.0 * 3600.0),
        }
    }

    /// Builds a Keplerian [Ephemeris] from week counter and time of week (in seconds).
    /// Time of clock is assumed equal to time of ephemeris, use [Self::with_toc] otherwise.
    pub fn from_time_of_week(
        sv: SV,
        week: u32,
        toe_s: f64,
        keplerian: Keplerian,
        clock: ClockTerms,
    ) -> Self {
        let timescale = sv.constellation.timescale().unwrap_or(TimeScale::GPST);
        let toe = Epoch::from_time_of_week(week, (toe_s * 1.0E9).round() as u64, timescale);
        Self {
            sv,
            toe,
            toc: toe,
            clock,
            orbit: OrbitModel::Keplerian(keplerian),
            validity: Self::default_validity(sv.constellation),
        }
    }

    /// Builds a GLONASS [Ephemeris] from its reference [Epoch].
    pub fn from_state_vector(sv: SV, toe: Epoch, state: StateVector, clock: ClockTerms) -> Self {
        Self {
            sv,
            toe,
            toc: toe,
            clock,
            orbit: OrbitModel::StateVector(state),
            validity: Self::default_validity(sv.constellation),
        }
    }

    /// Copies and returns [Ephemeris] with a different time of clock.
    pub fn with_toc(&self, toc: Epoch) -> Self {
        let mut s = *self;
        s.toc = toc;
        s
    }

    /// Copies and returns [Ephemeris] with a different half validity window.
    pub fn with_validity(&self, validity: Duration) -> Self {
        let mut s = *self;
        s.validity = validity;
        s
    }

    /// Returns true if this [Ephemeris] frame may be used at this [Epoch]
    pub fn is_valid(&self, t: Epoch) -> bool {
        (t - self.toe).abs() <= self.validity
    }

    /// Returns week counter of the time of ephemeris
    pub fn week(&self) -> u32 {
        self.toe.to_time_of_week().0
    }

    /// Returns ToE in seconds of week
    pub fn weekly_toe_seconds(&self) -> f64 {
        (self.toe.to_time_of_week().1 as f64) / 1.0E9
    }

    /// Verifies this frame is structurally sound.
    pub fn validate(&self) -> Result<(), Error> {
        let malformed = |reason| Err(Error::MalformedEphemeris(self.sv, reason));

        let clock = &self.clock;
        if ![clock.bias_s, clock.drift_s_s, clock.drift_rate_s_s2, clock.tgd_s]
            .iter()
            .all(|v| v.is_finite())
        {
            return malformed("non finite clock terms");
        }

        if self.validity <= Duration::ZERO {
            return malformed("empty validity window");
        }

        match &self.orbit {
            OrbitModel::Keplerian(kepler) => {
                if self.sv.constellation == Constellation::Glonass {
                    return malformed("glonass requires a state vector");
                }
                if !kepler.is_finite() {
                    return malformed("non finite orbital elements");
                }
                if kepler.sqrt_a <= 0.0 {
                    return malformed("non positive semi-major axis");
                }
                if !(0.0..1.0).contains(&kepler.eccentricity) {
                    return malformed("eccentricity out of range");
                }
            },
            OrbitModel::StateVector(state) => {
                if !state.is_finite() {
                    return malformed("non finite state vector");
                }
                let (x, y, z) = state.position_m;
                if (x * x + y * y + z * z).sqrt() < crate::constants::EARTH_SEMI_MAJOR_AXIS_WGS84 {
                    return malformed("state vector below Earth surface");
                }
                if self.validity.to_seconds() > glonass::MAX_SPAN_S {
                    return malformed("validity window exceeds integration span");
                }
            },
        }
        Ok(())
    }

    /// Resolves the satellite state at transmission [Epoch]:
    /// position in ECEF and clock correction.
    ///
    /// Fails with [Error::MalformedEphemeris] on structurally invalid records.
    /// State vector records are integrated over one day at most: within the
    /// validity window this always holds, a request further away from
    /// [Self::toe] returns [Error::MissingEphemeris].
    pub fn propagate(&self, t_tx: Epoch) -> Result<OrbitalState, Error> {
        self.validate()?;
        match &self.orbit {
            OrbitModel::Keplerian(kepler) => kepler::propagate(self, kepler, t_tx),
            OrbitModel::StateVector(state) => glonass::propagate(self, state, t_tx),
        }
    }

    /// Clock polynomial evaluated at transmission time (in s),
    /// without relativistic nor group delay terms.
    pub(crate) fn clock_polynomial_s(&self, t_tx: Epoch) -> f64 {
        let dt = wrap_half_week((t_tx - self.toc).to_seconds());
        self.clock.bias_s + self.clock.drift_s_s * dt + self.clock.drift_rate_s_s2 * dt.powi(2)
    }
}

impl Keplerian {
    fn is_finite(&self) -> bool {
        [
            self.sqrt_a,
            self.eccentricity,
            self.m0_rad,
            self.i0_rad,
            self.idot_rad_s,
            self.dn_rad_s,
            self.omega0_rad,
            self.omega_rad,
            self.omega_dot_rad_s,
            self.cus_cuc_rad.0,
            self.cus_cuc_rad.1,
            self.cis_cic_rad.0,
            self.cis_cic_rad.1,
            self.crs_crc_m.0,
            self.crs_crc_m.1,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

impl StateVector {
    fn is_finite(&self) -> bool {
        let (x, y, z) = self.position_m;
        let (vx, vy, vz) = self.velocity_m_s;
        let (ax, ay, az) = self.acceleration_m_s2;
        [x, y, z, vx, vy, vz, ax, ay, az].iter().all(|v| v.is_finite())
    }
}

/// Wraps a time difference (in s) to the nearest half week boundary.
pub(crate) fn wrap_half_week(dt_s: f64) -> f64 {
    use crate::constants::{HALF_WEEK_SECONDS, WEEK_SECONDS};
    if dt_s > HALF_WEEK_SECONDS {
        dt_s - WEEK_SECONDS
    } else if dt_s < -HALF_WEEK_SECONDS {
        dt_s + WEEK_SECONDS
    } else {
        dt_s
    }
}
