use log::{debug, warn};
use nalgebra::{Rotation3, Vector3};

use crate::{
    constants::{kepler_constants, SPEED_OF_LIGHT_M_S},
    ephemeris::{wrap_half_week, Ephemeris, Keplerian, OrbitalState},
    prelude::{Epoch, Error},
};

/// Maximal number of Newton iterations for the eccentric anomaly
pub const KEPLER_MAX_ITER: usize = 30;

/// Convergence criterion on the eccentric anomaly update (in radians)
pub const KEPLER_TOLERANCE_RAD: f64 = 1.0E-12;

/// Solves Kepler's equation `m = e_k - e * sin(e_k)` for the eccentric anomaly,
/// by Newton iteration seeded at the mean anomaly.
/// Returns (eccentric anomaly in radians, number of iterations).
/// The iteration is bounded by [KEPLER_MAX_ITER]: the last iterate
/// is returned when the criterion is not met.
pub fn solve_kepler(m_rad: f64, e: f64) -> (f64, usize) {
    let mut e_k = m_rad;
    for i in 0..KEPLER_MAX_ITER {
        let f = e_k - e * e_k.sin() - m_rad;
        let f_prime = 1.0 - e * e_k.cos();
        let de_k = f / f_prime;
        e_k -= de_k;
        if de_k.abs() < KEPLER_TOLERANCE_RAD {
            return (e_k, i + 1);
        }
    }
    warn!("kepler solver: iteration limit reached (m={}, e={})", m_rad, e);
    (e_k, KEPLER_MAX_ITER)
}

/// Resolves Kepler equations from [Keplerian] elements
pub(crate) fn propagate(
    eph: &Ephemeris,
    kepler: &Keplerian,
    t_tx: Epoch,
) -> Result<OrbitalState, Error> {
    let (gm_m3_s2, omega_earth) = kepler_constants(eph.sv.constellation);

    let e = kepler.eccentricity;
    let e_2 = e.powi(2);
    let a = kepler.sqrt_a.powi(2);
    let a_3 = a.powi(3);

    let (cus, cuc) = kepler.cus_cuc_rad;
    let (cis, cic) = kepler.cis_cic_rad;
    let (crs, crc) = kepler.crs_crc_m;
    let (i0, idot) = (kepler.i0_rad, kepler.idot_rad_s);
    let (omega0, omega, omega_dot) = (
        kepler.omega0_rad,
        kepler.omega_rad,
        kepler.omega_dot_rad_s,
    );

    let t_k = wrap_half_week((t_tx - eph.toe).to_seconds());

    let n0 = (gm_m3_s2 / a_3).sqrt();
    let n = n0 + kepler.dn_rad_s;
    let m_k = kepler.m0_rad + n * t_k;

    let (e_k, _) = solve_kepler(m_k, e);

    let (sin_e_k, cos_e_k) = e_k.sin_cos();
    let v_k = ((1.0 - e_2).sqrt() * sin_e_k).atan2(cos_e_k - e);

    let phi = v_k + omega;
    let (sin_2phi, cos_2phi) = (2.0 * phi).sin_cos();

    let u_k = phi + cuc * cos_2phi + cus * sin_2phi;
    let r_k = a * (1.0 - e * cos_e_k) + crc * cos_2phi + crs * sin_2phi;
    let i_k = i0 + idot * t_k + cic * cos_2phi + cis * sin_2phi;
    let omega_k =
        omega0 + (omega_dot - omega_earth) * t_k - omega_earth * eph.weekly_toe_seconds();

    let orbital_plane = Vector3::new(r_k * u_k.cos(), r_k * u_k.sin(), 0.0);

    // orbital plane to ECEF rotation matrix
    let rot_x3 = Rotation3::from_axis_angle(&Vector3::x_axis(), i_k);
    let rot_z3 = Rotation3::from_axis_angle(&Vector3::z_axis(), omega_k);
    let position_m = rot_z3 * rot_x3 * orbital_plane;

    let relativistic_const = -2.0 * gm_m3_s2.sqrt() / SPEED_OF_LIGHT_M_S.powi(2);
    let relativistic_correction_s = relativistic_const * e * kepler.sqrt_a * sin_e_k;
    let group_delay_s = eph.clock.tgd_s;

    let clock_correction_s =
        eph.clock_polynomial_s(t_tx) + relativistic_correction_s - group_delay_s;

    if !position_m.iter().all(|v| v.is_finite()) || !clock_correction_s.is_finite() {
        return Err(Error::MalformedEphemeris(eph.sv, "non finite propagation"));
    }

    debug!(
        "{}({}) - kepler solving x={:.3}m y={:.3}m z={:.3}m t_k={}s dt={:.6E}s",
        t_tx, eph.sv, position_m[0], position_m[1], position_m[2], t_k, clock_correction_s
    );

    Ok(OrbitalState {
        epoch: t_tx,
        position_m,
        clock_correction_s,
        relativistic_correction_s,
        group_delay_s,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        prelude::{Duration, SV},
        tests::{gps_ephemeris, init_logger, G01, G02, REFERENCE_TOE_S},
    };
    use rand::{rngs::SmallRng, Rng, SeedableRng};
    use rstest::*;
    use std::f64::consts::PI;

    #[test]
    fn kepler_newton_convergence_sweep() {
        let mut rng = SmallRng::seed_from_u64(0x4b45504c);

        for _ in 0..10_000 {
            let e = rng.random_range(0.0..=0.2);
            let m = rng.random_range(0.0..2.0 * PI);

            let (e_k, iter) = solve_kepler(m, e);
            let residual = (e_k - e * e_k.sin() - m).abs();

            assert!(
                residual < 1.0E-10,
                "e={} m={}: residual {} too large",
                e,
                m,
                residual
            );
            assert!(iter < KEPLER_MAX_ITER, "e={} m={}: iteration limit", e, m);
        }
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(0.0, 1.0)]
    #[case(0.2, 0.0)]
    #[case(0.2, PI)]
    #[case(0.2, 2.0 * PI - 1.0E-9)]
    #[case(0.01, 3.0)]
    fn kepler_newton_edges(#[case] e: f64, #[case] m: f64) {
        let (e_k, _) = solve_kepler(m, e);
        assert!((e_k - e * e_k.sin() - m).abs() < 1.0E-10);
    }

    #[test]
    fn circular_orbit_is_mean_anomaly() {
        let (e_k, iter) = solve_kepler(1.234, 0.0);
        assert_eq!(e_k, 1.234);
        assert_eq!(iter, 1);
    }

    #[test]
    fn propagation_is_deterministic() {
        init_logger();
        for sv in [G01, G02] {
            let eph = gps_ephemeris(sv);
            let t = eph.toe + Duration::from_seconds(1234.567);

            let a = eph.propagate(t).unwrap();
            let b = eph.propagate(t).unwrap();

            assert_eq!(a.position_m[0].to_bits(), b.position_m[0].to_bits());
            assert_eq!(a.position_m[1].to_bits(), b.position_m[1].to_bits());
            assert_eq!(a.position_m[2].to_bits(), b.position_m[2].to_bits());
            assert_eq!(a.clock_correction_s.to_bits(), b.clock_correction_s.to_bits());
        }
    }

    #[test]
    fn propagated_orbit_radius() {
        init_logger();
        let eph = gps_ephemeris(G01);
        for dt_s in [-7200.0, -3600.0, 0.0, 900.0, 7200.0] {
            let t = eph.toe + Duration::from_seconds(dt_s);
            let state = eph.propagate(t).unwrap();
            let radius_km = state.position_m.norm() / 1.0E3;
            assert!(
                radius_km > 26_000.0 && radius_km < 27_000.0,
                "dt={}: invalid MEO radius {}km",
                dt_s,
                radius_km
            );
        }
    }

    #[test]
    fn orbit_at_reference_epoch() {
        // circular orbit, no perturbations: position at toe is fully determined
        // by inclination, right ascension and argument of latitude.
        let eph = gps_ephemeris(SV::new(crate::prelude::Constellation::GPS, 30));
        let kepler = match eph.orbit {
            crate::ephemeris::OrbitModel::Keplerian(kepler) => kepler,
            _ => unreachable!(),
        };
        let mut circular = kepler;
        circular.eccentricity = 0.0;
        circular.cus_cuc_rad = (0.0, 0.0);
        circular.cis_cic_rad = (0.0, 0.0);
        circular.crs_crc_m = (0.0, 0.0);

        let mut eph = eph;
        eph.orbit = crate::ephemeris::OrbitModel::Keplerian(circular);

        let state = eph.propagate(eph.toe).unwrap();

        let a = circular.sqrt_a.powi(2);
        let u = circular.m0_rad + circular.omega_rad;
        let omega = circular.omega0_rad
            - crate::constants::EARTH_ANGULAR_VEL_RAD * REFERENCE_TOE_S;
        let i = circular.i0_rad;

        let expected = Vector3::new(
            a * (u.cos() * omega.cos() - u.sin() * i.cos() * omega.sin()),
            a * (u.cos() * omega.sin() + u.sin() * i.cos() * omega.cos()),
            a * u.sin() * i.sin(),
        );

        let err = (state.position_m - expected).norm();
        assert!(err < 1.0E-6, "position error {}m", err);
    }

    #[test]
    fn clock_correction_terms() {
        let eph = gps_ephemeris(G01);
        let t = eph.toe + Duration::from_seconds(100.0);
        let state = eph.propagate(t).unwrap();

        let polynomial =
            eph.clock.bias_s + eph.clock.drift_s_s * 100.0 + eph.clock.drift_rate_s_s2 * 1.0E4;

        let expected = polynomial + state.relativistic_correction_s - eph.clock.tgd_s;
        assert!((state.clock_correction_s - expected).abs() < 1.0E-15);
        assert_eq!(state.group_delay_s, eph.clock.tgd_s);

        // relativistic term remains within a few tens of nanoseconds on MEO orbits
        assert!(state.relativistic_correction_s.abs() < 100.0E-9);
    }
}
