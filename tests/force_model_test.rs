use approx::{assert_abs_diff_eq, assert_relative_eq};
use camino::Utf8PathBuf;
use nalgebra::Vector3;

use ephem_forces::constants::{VLIGHT_AU, N_PERTURBERS};
use ephem_forces::diagnostics::Severity;
use ephem_forces::ephem_forces_errors::ErrorKind;
use ephem_forces::ephemeris::{EphemerisProvider, EphemerisSources};
use ephem_forces::force_model::{ForceModelConfig, ForceTerm, Frame, RelativityModel};
use ephem_forces::particles::{NonGravParams, ParticleSet};
use ephem_forces::physical_constants::PhysicalConstants;

mod common;
use common::*;

#[test]
fn test_newtonian_matches_direct_sum() {
    let provider = synthetic_provider();
    let mut model = model(provider.clone(), ForceModelConfig::newtonian(Frame::Barycentric));
    let t = 12.5;
    let position = Vector3::new(2.0, 1.5, 0.1);
    let velocity = Vector3::new(-0.006, 0.008, 0.0002);

    let bodies = provider.snapshot(t).unwrap();
    assert_eq!(bodies.len(), N_PERTURBERS);
    let expected = bodies.iter().fold(Vector3::<f64>::zeros(), |acc, b| {
        let d = position - b.position;
        acc - b.gm / d.norm().powi(3) * d
    });

    let mut set = ParticleSet::new();
    let i = set.add_real(position, velocity);
    model.evaluate(&mut set, t).unwrap();
    assert_relative_eq!(set.get(i).unwrap().acceleration, expected, max_relative = 1e-13);
}

#[test]
fn test_sun_only_circular_orbit() {
    let provider = sun_only_provider();
    let model = model(provider.clone(), ForceModelConfig::newtonian(Frame::Barycentric));
    let t = 3.0;
    let sun = provider.query(0, t).unwrap();
    let gm = PhysicalConstants::de441().major_gm[0];

    let r = 1.3;
    let u = Vector3::new(0.6, 0.8, 0.0);
    let position = sun.position + r * u;
    let velocity = (gm / r).sqrt() * Vector3::new(-0.8, 0.6, 0.0);

    let total = model
        .total(&position, &velocity, &NonGravParams::default(), t)
        .unwrap();
    assert_relative_eq!(total.acceleration.norm(), gm / (r * r), max_relative = 1e-12);
    assert_abs_diff_eq!(total.acceleration.normalize(), -u, epsilon = 1e-12);
}

#[test]
fn test_evaluation_is_idempotent() {
    let provider = synthetic_provider();
    let mut model = model(provider.clone(), ForceModelConfig::standard(Frame::Barycentric));
    let mut set = ParticleSet::new();
    let i = set.add_real(Vector3::new(1.1, -0.4, 0.05), Vector3::new(0.005, 0.015, 0.0));
    set.set_non_grav(i, NonGravParams::new(1e-9, 3e-10, 0.0)).unwrap();
    let v = set
        .add_variational(i, Vector3::new(1e-4, 0.0, 0.0), Vector3::new(0.0, 1e-6, 0.0))
        .unwrap();

    model.evaluate(&mut set, 7.0).unwrap();
    let first = (set.get(i).unwrap().acceleration, set.get(v).unwrap().acceleration);

    // warm cache
    model.evaluate(&mut set, 7.0).unwrap();
    assert_eq!(set.get(i).unwrap().acceleration, first.0);
    assert_eq!(set.get(v).unwrap().acceleration, first.1);

    // cold cache, after a query at another time
    model.evaluate(&mut set, 8.0).unwrap();
    provider.clear_cache();
    model.evaluate(&mut set, 7.0).unwrap();
    assert_eq!(set.get(i).unwrap().acceleration, first.0);
    assert_eq!(set.get(v).unwrap().acceleration, first.1);
}

#[test]
fn test_variational_acceleration_is_jacobian_product() {
    let mut model = model(synthetic_provider(), ForceModelConfig::standard(Frame::Barycentric));
    let position = Vector3::new(0.9, 0.5, -0.02);
    let velocity = Vector3::new(-0.009, 0.014, 0.0003);
    let ng = NonGravParams::new(2e-9, -1e-9, 1e-10);
    let dr = Vector3::new(1e-3, -2e-3, 5e-4);
    let dv = Vector3::new(1e-5, 2e-5, -3e-5);

    let mut set = ParticleSet::new();
    let i = set.add_real(position, velocity);
    set.set_non_grav(i, ng).unwrap();
    let v = set.add_variational(i, dr, dv).unwrap();
    model.evaluate(&mut set, 2.0).unwrap();

    let total = model.total(&position, &velocity, &ng, 2.0).unwrap();
    assert_relative_eq!(
        set.get(v).unwrap().acceleration,
        total.jacobian.apply(&dr, &dv),
        max_relative = 1e-14
    );
}

#[test]
fn test_newtonian_jacobian() {
    let model = model(synthetic_provider(), ForceModelConfig::standard(Frame::Barycentric));
    assert_jacobian_matches(
        &model,
        ForceTerm::Newtonian,
        &Vector3::new(2.0, 1.5, 0.1),
        &Vector3::new(-0.006, 0.008, 0.0002),
        &NonGravParams::default(),
        4.0,
        1e-6,
    );
}

#[test]
fn test_earth_oblateness_jacobian() {
    let model = model(synthetic_provider(), ForceModelConfig::standard(Frame::Geocentric));
    assert_jacobian_matches(
        &model,
        ForceTerm::EarthOblateness,
        &Vector3::new(5e-5, 3e-5, 1.5e-5),
        &Vector3::new(-1e-3, 2.5e-3, 1e-3),
        &NonGravParams::default(),
        1.0,
        1e-6,
    );
}

#[test]
fn test_solar_oblateness_jacobian() {
    let model = model(synthetic_provider(), ForceModelConfig::standard(Frame::Barycentric));
    assert_jacobian_matches(
        &model,
        ForceTerm::SolarOblateness,
        &Vector3::new(0.3, -0.2, 0.15),
        &Vector3::new(0.01, 0.02, -0.005),
        &NonGravParams::default(),
        1.0,
        1e-6,
    );
}

#[test]
fn test_non_gravitational_jacobian() {
    let model = model(synthetic_provider(), ForceModelConfig::standard(Frame::Barycentric));
    assert_jacobian_matches(
        &model,
        ForceTerm::NonGravitational,
        &Vector3::new(1.2, 0.4, -0.1),
        &Vector3::new(-0.005, 0.014, 0.001),
        &NonGravParams::new(1e-8, 2e-9, 5e-10),
        6.0,
        1e-6,
    );
}

#[test]
fn test_simplified_relativity_jacobian() {
    let config = ForceModelConfig::builder()
        .light_speed(VLIGHT_AU)
        .frame(Frame::Barycentric)
        .relativity(RelativityModel::Simplified)
        .build()
        .unwrap();
    let model = model(synthetic_provider(), config);
    assert_jacobian_matches(
        &model,
        ForceTerm::Relativity,
        &Vector3::new(0.45, 0.2, 0.03),
        &Vector3::new(-0.01, 0.022, 0.001),
        &NonGravParams::default(),
        1.0,
        1e-6,
    );
}

#[test]
fn test_eih_relativity_jacobian() {
    let model = model(synthetic_provider(), ForceModelConfig::standard(Frame::Barycentric));
    assert_jacobian_matches(
        &model,
        ForceTerm::Relativity,
        &Vector3::new(1.5, -0.7, 0.2),
        &Vector3::new(0.007, 0.012, -0.001),
        &NonGravParams::default(),
        9.0,
        1e-6,
    );
}

#[test]
fn test_geocentric_equals_shifted_barycentric() {
    let provider = synthetic_provider();
    let geo = model(provider.clone(), ForceModelConfig::standard(Frame::Geocentric));
    let bary = model(provider.clone(), ForceModelConfig::standard(Frame::Barycentric));
    let t = 5.0;
    let earth = provider.query(3, t).unwrap();
    let earth_velocity = earth.velocity.unwrap();
    let earth_acceleration = earth.acceleration.unwrap();

    let position = Vector3::new(1e-3, 5e-4, 2e-4);
    let velocity = Vector3::new(-1e-4, 3e-4, 0.0);
    let ng = NonGravParams::default();

    let terms = geo.contributions(&position, &velocity, &ng, t).unwrap();
    assert_eq!(
        terms.iter().filter(|(k, _)| *k == ForceTerm::Indirect).count(),
        1
    );

    let a_geo = geo.total(&position, &velocity, &ng, t).unwrap();
    let a_bary = bary
        .total(&(position + earth.position), &(velocity + earth_velocity), &ng, t)
        .unwrap();
    assert_relative_eq!(
        a_geo.acceleration,
        a_bary.acceleration - earth_acceleration,
        max_relative = 1e-12
    );
    assert_relative_eq!(
        a_geo.jacobian.d_position,
        a_bary.jacobian.d_position,
        max_relative = 1e-12
    );
}

#[test]
fn test_missing_frame_is_a_configuration_error() {
    let config =
        ForceModelConfig::from_json_str(r#"{"light_speed": 173.1446, "relativity": "Disabled"}"#)
            .unwrap();
    let mut model = model(synthetic_provider(), config);
    let mut set = ParticleSet::new();
    let i = set.add_real(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.017, 0.0));
    set.get_mut(i).unwrap().acceleration = Vector3::new(9.0, 9.0, 9.0);

    let err = model.evaluate(&mut set, 0.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(set.get(i).unwrap().acceleration, Vector3::new(9.0, 9.0, 9.0));
    assert!(model.messages().is_empty());
}

#[test]
fn test_epoch_outside_coverage_is_logged() {
    let mut model = model(bounded_provider(0.0, 10.0), ForceModelConfig::standard(Frame::Barycentric));
    let mut set = ParticleSet::new();
    let i = set.add_real(Vector3::new(1.0, 0.2, 0.0), Vector3::new(0.0, 0.017, 0.0));

    model.evaluate(&mut set, 5.0).unwrap();
    let inside = set.get(i).unwrap().acceleration;

    let err = model.evaluate(&mut set, 20.0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Data);
    assert_eq!(err.status_code(), 5);
    assert!(model.messages().has_errors());
    assert_eq!(set.get(i).unwrap().acceleration, inside);
}

#[test]
fn test_missing_ephemeris_file() {
    let dir = Utf8PathBuf::from("/nonexistent/ephemerides");
    let provider = EphemerisProvider::new(
        EphemerisSources::from_files(dir.join("planets.csv"), dir.join("asteroids.csv")),
        PhysicalConstants::de441(),
    );
    let mut model = model(
        std::sync::Arc::new(provider),
        ForceModelConfig::newtonian(Frame::Barycentric),
    );
    let mut set = ParticleSet::new();
    set.add_real(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.017, 0.0));

    let err = model.evaluate(&mut set, 0.0).unwrap_err();
    assert_eq!(err.status_code(), 1);
    let logged: Vec<_> = model.messages().messages().map(|m| m.text.clone()).collect();
    assert_eq!(logged.len(), 1);
    assert!(logged[0].contains("planets.csv"));
}

#[test]
fn test_stalled_relativity_iteration_is_a_warning() {
    // a slow light speed and a fast particle close to the sun keep the intermediate velocity
    // from settling within the iteration limit
    let config = ForceModelConfig::builder()
        .light_speed(0.2)
        .frame(Frame::Barycentric)
        .relativity(RelativityModel::Simplified)
        .build()
        .unwrap();
    let mut model = model(static_sun_provider(), config);
    let mut set = ParticleSet::new();
    let i = set.add_real(Vector3::new(0.1, 0.0, 0.0), Vector3::new(0.0, 0.08, 0.0));
    let v = set
        .add_variational(i, Vector3::new(1.0, 0.0, 0.0), Vector3::zeros())
        .unwrap();

    model.evaluate(&mut set, 0.0).unwrap();
    assert!(set.get(i).unwrap().acceleration.iter().all(|x| x.is_finite()));
    assert!(set.get(v).unwrap().acceleration.iter().all(|x| x.is_finite()));

    let warnings: Vec<_> = model
        .messages()
        .messages()
        .filter(|m| m.severity == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].text.contains("did not converge"));
    assert!(!model.messages().has_errors());
}

#[test]
fn test_particle_at_rest_does_not_warn() {
    let config = ForceModelConfig {
        relativity: RelativityModel::Simplified,
        ..ForceModelConfig::standard(Frame::Barycentric)
    };
    let mut model = model(static_sun_provider(), config);
    let mut set = ParticleSet::new();
    set.add_real(Vector3::new(0.7, 0.2, 0.0), Vector3::zeros());

    model.evaluate(&mut set, 0.0).unwrap();
    assert!(model.messages().is_empty());
}

#[test]
fn test_malformed_json_is_a_configuration_error() {
    let err = ForceModelConfig::from_json_str(r#"{"light_speed": "fast""#).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.status_code(), 8);

    let err = PhysicalConstants::from_json_str("{").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
