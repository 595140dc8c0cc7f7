//! Physical constants
use crate::prelude::Constellation;

/// Speed of light in m.s⁻¹
pub const SPEED_OF_LIGHT_M_S: f64 = 299_792_458.0;

/// Earth angular velocity, in WGS84 frame rad/s
pub const EARTH_ANGULAR_VEL_RAD: f64 = 7.2921151467E-5;

/// Earth angular velocity, in CGCS2000 frame rad/s
pub const EARTH_ANGULAR_VEL_CGCS2000_RAD: f64 = 7.292115E-5;

/// Earth angular velocity, in PZ-90 frame rad/s
pub const EARTH_ANGULAR_VEL_PZ90_RAD: f64 = 7.292115E-5;

/// Earth gravitational constant as used by GPS (m^3 s-2)
pub const EARTH_GRAVITATION_MU_GPS_M3_S2: f64 = 3.986005E14;

/// Earth gravitational constant as used by Galileo and BeiDou (m^3 s-2)
pub const EARTH_GRAVITATION_MU_M3_S2: f64 = 3.986004418E14;

/// Earth gravitational constant, PZ-90 frame (m^3 s-2)
pub const EARTH_GRAVITATION_MU_PZ90_M3_S2: f64 = 3.9860044E14;

/// Second zonal harmonic, PZ-90 frame
pub const EARTH_J2_PZ90: f64 = 1.0826257E-3;

/// Earth equatorial radius, PZ-90 frame (meters)
pub const EARTH_EQUATORIAL_RADIUS_PZ90_M: f64 = 6378136.0;

/// WGS84 Earth Frame Ellipsoid semi-major axis (meters)
pub const EARTH_SEMI_MAJOR_AXIS_WGS84: f64 = 6378137.0_f64;

/// WGS84 Earth Frame Ellipsoid flattening
pub const EARTH_FLATTENING_WGS84: f64 = 1.0 / 298.257223563;

/// Seconds in one week
pub const WEEK_SECONDS: f64 = 604_800.0;

/// Half a week, in seconds
pub const HALF_WEEK_SECONDS: f64 = WEEK_SECONDS / 2.0;

/// Returns the (gravitational constant, Earth rotation rate) pair
/// that the broadcast orbit model of this [Constellation] was fitted with.
pub(crate) fn kepler_constants(constellation: Constellation) -> (f64, f64) {
    match constellation {
        Constellation::Galileo => (EARTH_GRAVITATION_MU_M3_S2, EARTH_ANGULAR_VEL_RAD),
        Constellation::BeiDou => (EARTH_GRAVITATION_MU_M3_S2, EARTH_ANGULAR_VEL_CGCS2000_RAD),
        Constellation::Glonass => (EARTH_GRAVITATION_MU_PZ90_M3_S2, EARTH_ANGULAR_VEL_PZ90_RAD),
        _ => (EARTH_GRAVITATION_MU_GPS_M3_S2, EARTH_ANGULAR_VEL_RAD),
    }
}
