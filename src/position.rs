//! 3D Position coordinates
use crate::{
    constants::{EARTH_FLATTENING_WGS84, EARTH_SEMI_MAJOR_AXIS_WGS84},
    prelude::{Error, Vector3},
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of Bowring refinement passes
const BOWRING_REFINEMENTS: usize = 2;

/// Converts ECEF coordinates (in meters) to geodetic coordinates
/// (latitude [rad], longitude [rad], altitude above the WGS84 ellipsoid [m]),
/// using Bowring's method.
pub fn ecef_to_geodetic(x: f64, y: f64, z: f64) -> Result<(f64, f64, f64), Error> {
    if !(x.is_finite() && y.is_finite() && z.is_finite()) {
        return Err(Error::DegeneratePosition);
    }
    if x == 0.0 && y == 0.0 && z == 0.0 {
        return Err(Error::DegeneratePosition);
    }

    let a = EARTH_SEMI_MAJOR_AXIS_WGS84;
    let f = EARTH_FLATTENING_WGS84;
    let b = a * (1.0 - f);
    let e2 = f * (2.0 - f);
    let ep2 = e2 / (1.0 - e2);

    let p = (x.powi(2) + y.powi(2)).sqrt();
    let lon = y.atan2(x);

    // parametric latitude seed
    let mut beta = (a * z).atan2(b * p);
    let mut lat = 0.0_f64;

    for _ in 0..=BOWRING_REFINEMENTS {
        let (sin_b, cos_b) = beta.sin_cos();
        lat = (z + ep2 * b * sin_b.powi(3)).atan2(p - e2 * a * cos_b.powi(3));
        beta = ((1.0 - f) * lat.sin()).atan2(lat.cos());
    }

    let (sin_lat, cos_lat) = lat.sin_cos();
    let alt = p * cos_lat + z * sin_lat - a * (1.0 - e2 * sin_lat.powi(2)).sqrt();

    Ok((lat, lon, alt))
}

/// Converts geodetic coordinates (latitude [rad], longitude [rad], altitude [m])
/// to ECEF coordinates in meters.
pub fn geodetic_to_ecef(lat_rad: f64, lon_rad: f64, alt_m: f64) -> (f64, f64, f64) {
    let a = EARTH_SEMI_MAJOR_AXIS_WGS84;
    let f = EARTH_FLATTENING_WGS84;
    let e2 = f * (2.0 - f);

    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_lon, cos_lon) = lon_rad.sin_cos();

    // radius of curvature in prime vertical
    let n = a / (1.0 - e2 * sin_lat.powi(2)).sqrt();

    (
        (n + alt_m) * cos_lat * cos_lon,
        (n + alt_m) * cos_lat * sin_lon,
        (n * (1.0 - e2) + alt_m) * sin_lat,
    )
}

/// Receiver [Position], both in ECEF and geodetic coordinates.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Position {
    /// ECEF coordinates in meters
    ecef: (f64, f64, f64),
    /// Geodetic coordinates in radians and meters
    geodetic: (f64, f64, f64),
}

impl Position {
    /// Builds new [Position] from ECEF coordinates expressed in meters.
    /// Fails on zero or non finite vector, for which geodetic coordinates
    /// are not defined.
    pub fn from_ecef(ecef: Vector3<f64>) -> Result<Self, Error> {
        let (x, y, z) = (ecef[0], ecef[1], ecef[2]);
        let geodetic = ecef_to_geodetic(x, y, z)?;
        Ok(Self {
            ecef: (x, y, z),
            geodetic,
        })
    }

    /// Builds new [Position] from geodetic coordinates
    /// - latitude [°]
    /// - longitude [°]
    /// - altitude above the ellipsoid [m]
    pub fn from_geodetic(lat_deg: f64, lon_deg: f64, alt_m: f64) -> Result<Self, Error> {
        if !(lat_deg.is_finite() && lon_deg.is_finite() && alt_m.is_finite()) {
            return Err(Error::DegeneratePosition);
        }
        if lat_deg.abs() > 90.0 {
            return Err(Error::DegeneratePosition);
        }
        let (lat, lon) = (lat_deg.to_radians(), lon_deg.to_radians());
        Ok(Self {
            ecef: geodetic_to_ecef(lat, lon, alt_m),
            geodetic: (lat, lon, alt_m),
        })
    }

    /// Returns ECEF coordinates (in meters).
    pub fn ecef(&self) -> Vector3<f64> {
        Vector3::new(self.ecef.0, self.ecef.1, self.ecef.2)
    }

    /// Returns geodetic coordinates
    /// - latitude [rad]
    /// - longitude [rad]
    /// - altitude above the ellipsoid [m]
    pub fn geodetic(&self) -> (f64, f64, f64) {
        self.geodetic
    }

    /// Returns latitude [°], longitude [°] and altitude [m].
    pub fn lat_lon_alt_deg_deg_m(&self) -> (f64, f64, f64) {
        (
            self.geodetic.0.to_degrees(),
            self.geodetic.1.to_degrees(),
            self.geodetic.2,
        )
    }

    /// Returns (elevation, azimuth) of the target (ECEF, in meters) as seen from [Self],
    /// both in degrees. Azimuth is counted clockwise from North, in [0, 360).
    pub fn elevation_azimuth_deg(&self, target: &Vector3<f64>) -> (f64, f64) {
        let (lat, lon, _) = self.geodetic;
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();

        let d = target - self.ecef();

        let east = -sin_lon * d[0] + cos_lon * d[1];
        let north = -sin_lat * cos_lon * d[0] - sin_lat * sin_lon * d[1] + cos_lat * d[2];
        let up = cos_lat * cos_lon * d[0] + cos_lat * sin_lon * d[1] + sin_lat * d[2];

        let elevation = up.atan2((east.powi(2) + north.powi(2)).sqrt()).to_degrees();
        let azimuth = east.atan2(north).to_degrees().rem_euclid(360.0);

        (elevation, azimuth)
    }
}
