#![allow(dead_code)]

use std::sync::Arc;

use nalgebra::{SMatrix, Vector3};

use ephem_forces::bodies::MajorBody;
use ephem_forces::constants::{JulianDate, N_MAJOR_BODIES};
use ephem_forces::ephemeris::chebyshev::ChebyshevEphemeris;
use ephem_forces::ephemeris::linear::{LinearEphemeris, LinearMotion};
use ephem_forces::ephemeris::{EphemerisProvider, EphemerisSources};
use ephem_forces::force_model::{ForceModel, ForceModelConfig, ForceTerm};
use ephem_forces::particles::NonGravParams;
use ephem_forces::physical_constants::PhysicalConstants;

/// Provider backed by the synthetic linear ephemerides, DE441 masses.
pub fn synthetic_provider() -> Arc<EphemerisProvider> {
    Arc::new(EphemerisProvider::new(
        EphemerisSources::in_memory(
            Arc::new(LinearEphemeris::synthetic_major_bodies(0.0)),
            Arc::new(LinearEphemeris::synthetic_asteroids(0.0)),
        ),
        PhysicalConstants::de441(),
    ))
}

/// Same geometry as [`synthetic_provider`] but every GM except the sun's is zero.
pub fn sun_only_provider() -> Arc<EphemerisProvider> {
    let mut constants = PhysicalConstants::de441();
    constants.version = "sun-only".into();
    for (i, gm) in constants.major_gm.iter_mut().enumerate() {
        if i != MajorBody::Sun.index() {
            *gm = 0.0;
        }
    }
    for asteroid in constants.asteroids.iter_mut() {
        asteroid.gm = 0.0;
    }
    Arc::new(EphemerisProvider::new(
        EphemerisSources::in_memory(
            Arc::new(LinearEphemeris::synthetic_major_bodies(0.0)),
            Arc::new(LinearEphemeris::synthetic_asteroids(0.0)),
        ),
        constants,
    ))
}

/// Sun at rest at the origin, every other perturber massless and parked far away.
pub fn static_sun_provider() -> Arc<EphemerisProvider> {
    let mut constants = PhysicalConstants::de441();
    constants.version = "static-sun".into();
    let mut majors = LinearEphemeris::new("static-sun", 0.0);
    for body in 0..N_MAJOR_BODIES {
        let position = if body == MajorBody::Sun.index() {
            Vector3::zeros()
        } else {
            constants.major_gm[body] = 0.0;
            Vector3::new(100.0 + body as f64, 0.0, 0.0)
        };
        majors = majors.with_body(body, LinearMotion::at_rest(position));
    }
    let mut asteroids = LinearEphemeris::new("static-asteroids", 0.0);
    for (i, asteroid) in constants.asteroids.iter_mut().enumerate() {
        asteroid.gm = 0.0;
        asteroids = asteroids.with_body(i, LinearMotion::at_rest(Vector3::new(0.0, 200.0 + i as f64, 0.0)));
    }
    Arc::new(EphemerisProvider::new(
        EphemerisSources::in_memory(Arc::new(majors), Arc::new(asteroids)),
        constants,
    ))
}

/// Position and velocity on the circular heliocentric orbit of radius `r` in the xy-plane.
pub fn circular_state(gm: f64, r: f64, t: f64) -> [f64; 6] {
    let n = (gm / (r * r * r)).sqrt();
    let (s, c) = (n * t).sin_cos();
    [r * c, r * s, 0.0, -r * n * s, r * n * c, 0.0]
}

/// Major bodies tabulated over `[start, end]` only; asteroids stay analytic.
pub fn bounded_provider(start: JulianDate, end: JulianDate) -> Arc<EphemerisProvider> {
    let linear = LinearEphemeris::synthetic_major_bodies(0.0);
    let mut table = ChebyshevEphemeris::new("bounded-major-bodies");
    for body in 0..N_MAJOR_BODIES {
        let source = linear.clone();
        table.insert_fit(body, start, end, 4, 6, move |jd| {
            source
                .state(body, jd)
                .map(|s| s.position)
                .unwrap_or_else(|_| Vector3::zeros())
        });
    }
    Arc::new(EphemerisProvider::new(
        EphemerisSources::in_memory(
            Arc::new(table),
            Arc::new(LinearEphemeris::synthetic_asteroids(0.0)),
        ),
        PhysicalConstants::de441(),
    ))
}

pub fn model(provider: Arc<EphemerisProvider>, config: ForceModelConfig) -> ForceModel {
    ForceModel::new(provider, config)
}

/// Acceleration of a single force term, summed if the term appears more than once.
pub fn term_acceleration(
    model: &ForceModel,
    term: ForceTerm,
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    non_grav: &NonGravParams,
    t: JulianDate,
) -> Vector3<f64> {
    model
        .contributions(position, velocity, non_grav, t)
        .unwrap()
        .into_iter()
        .filter(|(k, _)| *k == term)
        .fold(Vector3::zeros(), |acc, (_, c)| acc + c.acceleration)
}

/// Central finite-difference estimate of `[∂a/∂r | ∂a/∂v]` for one force term.
pub fn finite_difference_jacobian(
    model: &ForceModel,
    term: ForceTerm,
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    non_grav: &NonGravParams,
    t: JulianDate,
    delta: f64,
) -> SMatrix<f64, 3, 6> {
    let mut jacobian = SMatrix::<f64, 3, 6>::zeros();
    for axis in 0..6 {
        let mut r_plus = *position;
        let mut r_minus = *position;
        let mut v_plus = *velocity;
        let mut v_minus = *velocity;
        if axis < 3 {
            r_plus[axis] += delta;
            r_minus[axis] -= delta;
        } else {
            v_plus[axis - 3] += delta;
            v_minus[axis - 3] -= delta;
        }
        let plus = term_acceleration(model, term, &r_plus, &v_plus, non_grav, t);
        let minus = term_acceleration(model, term, &r_minus, &v_minus, non_grav, t);
        jacobian.set_column(axis, &((plus - minus) / (2.0 * delta)));
    }
    jacobian
}

/// Compare the analytic Jacobian of `term` with its finite-difference estimate, column by
/// column, relative to the column norm.
pub fn assert_jacobian_matches(
    model: &ForceModel,
    term: ForceTerm,
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
    non_grav: &NonGravParams,
    t: JulianDate,
    tolerance: f64,
) {
    let analytic = model
        .contributions(position, velocity, non_grav, t)
        .unwrap()
        .into_iter()
        .filter(|(k, _)| *k == term)
        .fold(SMatrix::<f64, 3, 6>::zeros(), |acc, (_, c)| {
            acc + c.jacobian.as_matrix()
        });
    let numeric = finite_difference_jacobian(model, term, position, velocity, non_grav, t, 1e-8);

    for axis in 0..6 {
        let a = analytic.column(axis);
        let n = numeric.column(axis);
        let scale = a.norm().max(n.norm()).max(1e-300);
        let diff = (a - n).norm() / scale;
        let (a, n) = (a.transpose(), n.transpose());
        assert!(
            diff < tolerance,
            "{term} jacobian column {axis}: analytic {a} numeric {n} (relative error {diff:e})"
        );
    }
}
