//! GLONASS state vector propagation
use log::debug;
use nalgebra::{Vector3, Vector6};

use crate::{
    constants::{
        EARTH_ANGULAR_VEL_PZ90_RAD, EARTH_EQUATORIAL_RADIUS_PZ90_M,
        EARTH_GRAVITATION_MU_PZ90_M3_S2, EARTH_J2_PZ90,
    },
    ephemeris::{Ephemeris, OrbitalState, StateVector},
    prelude::{Epoch, Error},
};

/// Integration step (in s)
const STEP_S: f64 = 60.0;

/// Maximal number of integration steps, that is one day of propagation
const MAX_STEPS: usize = 1440;

/// Longest propagation span (in s). State vector records whose validity
/// window extends beyond it are malformed.
pub(crate) const MAX_SPAN_S: f64 = STEP_S * MAX_STEPS as f64;

/// PZ-90 equations of motion, in the rotating frame.
/// `x` is (position, velocity), returns (velocity, acceleration).
fn derivatives(x: &Vector6<f64>, acc_ls: &Vector3<f64>) -> Vector6<f64> {
    let r2 = x[0].powi(2) + x[1].powi(2) + x[2].powi(2);
    let r3 = r2 * r2.sqrt();
    let omg2 = EARTH_ANGULAR_VEL_PZ90_RAD.powi(2);

    // 3/2 J2 mu Ae² / r⁵
    let a = 1.5 * EARTH_J2_PZ90 * EARTH_GRAVITATION_MU_PZ90_M3_S2
        * EARTH_EQUATORIAL_RADIUS_PZ90_M.powi(2)
        / r2
        / r3;
    // 5 z² / r²
    let b = 5.0 * x[2].powi(2) / r2;
    let c = -EARTH_GRAVITATION_MU_PZ90_M3_S2 / r3 - a * (1.0 - b);

    Vector6::new(
        x[3],
        x[4],
        x[5],
        (c + omg2) * x[0] + 2.0 * EARTH_ANGULAR_VEL_PZ90_RAD * x[4] + acc_ls[0],
        (c + omg2) * x[1] - 2.0 * EARTH_ANGULAR_VEL_PZ90_RAD * x[3] + acc_ls[1],
        (c - 2.0 * a) * x[2] + acc_ls[2],
    )
}

/// Single 4th order Runge-Kutta step
fn rk4(x: &Vector6<f64>, acc_ls: &Vector3<f64>, dt: f64) -> Vector6<f64> {
    let k1 = derivatives(x, acc_ls);
    let k2 = derivatives(&(x + k1 * (dt / 2.0)), acc_ls);
    let k3 = derivatives(&(x + k2 * (dt / 2.0)), acc_ls);
    let k4 = derivatives(&(x + k3 * dt), acc_ls);
    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

pub(crate) fn propagate(
    eph: &Ephemeris,
    state: &StateVector,
    t_tx: Epoch,
) -> Result<OrbitalState, Error> {
    let t_k = (t_tx - eph.toe).to_seconds();

    let num_steps = (t_k.abs() / STEP_S).ceil() as usize;
    if num_steps > MAX_STEPS {
        return Err(Error::MissingEphemeris(eph.sv));
    }

    let (x, y, z) = state.position_m;
    let (vx, vy, vz) = state.velocity_m_s;
    let (ax, ay, az) = state.acceleration_m_s2;

    let acc_ls = Vector3::new(ax, ay, az);
    let mut xv = Vector6::new(x, y, z, vx, vy, vz);

    let mut remaining = t_k;
    for _ in 0..num_steps {
        let dt = if remaining.abs() < STEP_S {
            remaining
        } else {
            STEP_S.copysign(remaining)
        };
        xv = rk4(&xv, &acc_ls, dt);
        remaining -= dt;
    }

    let position_m = Vector3::new(xv[0], xv[1], xv[2]);

    let group_delay_s = eph.clock.tgd_s;
    let clock_correction_s = eph.clock_polynomial_s(t_tx) - group_delay_s;

    if !position_m.iter().all(|v| v.is_finite()) || !clock_correction_s.is_finite() {
        return Err(Error::MalformedEphemeris(eph.sv, "non finite propagation"));
    }

    debug!(
        "{}({}) - state vector integration x={:.3}m y={:.3}m z={:.3}m t_k={}s steps={}",
        t_tx, eph.sv, position_m[0], position_m[1], position_m[2], t_k, num_steps
    );

    Ok(OrbitalState {
        epoch: t_tx,
        position_m,
        clock_correction_s,
        relativistic_correction_s: 0.0,
        group_delay_s,
    })
}
