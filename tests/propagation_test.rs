use approx::{assert_abs_diff_eq, assert_relative_eq};
use itertools::Itertools;

use ephem_forces::diagnostics::Severity;
use ephem_forces::ephem_forces_errors::ErrorKind;
use ephem_forces::force_model::{ForceModelConfig, Frame};
use ephem_forces::dense_output::{NodeTable, RADAU_SPACINGS};
use ephem_forces::integrator::IntegratorSettings;
use ephem_forces::physical_constants::PhysicalConstants;
use ephem_forces::propagation::{
    propagate, propagate_from_epoch, ExitStatus, PropagationRequest, VariationalSeed,
};

mod common;
use common::*;

fn sun_gm() -> f64 {
    PhysicalConstants::de441().major_gm[0]
}

fn two_body_model() -> ephem_forces::force_model::ForceModel {
    model(static_sun_provider(), ForceModelConfig::newtonian(Frame::Barycentric))
}

#[test]
fn test_zero_length_returns_input() {
    let mut model = two_body_model();
    let state = circular_state(sun_gm(), 1.0, 0.0);
    let request = PropagationRequest::new(10.0, 10.0, 1.0, vec![state]);

    let result = propagate(&mut model, &request).unwrap();
    assert_eq!(result.status, ExitStatus::Success);
    assert_eq!(result.n_out, 1);
    assert_eq!(result.times, vec![10.0]);
    assert_eq!(result.state(0, 0), Some(state));
}

#[test]
fn test_circular_orbit_accuracy() {
    let mut model = two_body_model();
    let gm = sun_gm();
    let request = PropagationRequest::new(0.0, 200.0, 1.0, vec![circular_state(gm, 1.0, 0.0)]);

    let result = propagate(&mut model, &request).unwrap();
    assert_eq!(result.status, ExitStatus::Success);
    assert_eq!(result.times[0], 0.0);
    assert_eq!(*result.times.last().unwrap(), 200.0);
    assert!(result.times.iter().tuple_windows().all(|(a, b)| a < b));

    for k in 0..result.n_out {
        let expected = circular_state(gm, 1.0, result.times[k]);
        let actual = result.state(k, 0).unwrap();
        for axis in 0..6 {
            assert_abs_diff_eq!(actual[axis], expected[axis], epsilon = 1e-8);
        }
    }
}

#[test]
fn test_backward_propagation() {
    let mut model = two_body_model();
    let gm = sun_gm();
    let request = PropagationRequest::new(0.0, -50.0, 2.0, vec![circular_state(gm, 1.2, 0.0)]);

    let result = propagate(&mut model, &request).unwrap();
    assert_eq!(result.status, ExitStatus::Success);
    assert!(result.times.iter().tuple_windows().all(|(a, b)| a > b));
    let last = result.state(result.n_out - 1, 0).unwrap();
    let expected = circular_state(gm, 1.2, -50.0);
    for axis in 0..6 {
        assert_abs_diff_eq!(last[axis], expected[axis], epsilon = 1e-8);
    }
}

#[test]
fn test_step_ends_match_accepted_states() {
    let mut model = two_body_model();
    let gm = sun_gm();
    let request = PropagationRequest::new(0.0, 20.0, 4.0, vec![circular_state(gm, 1.0, 0.0)])
        .with_integrator(IntegratorSettings::fixed_step());

    let result = propagate(&mut model, &request).unwrap();
    // five steps of eight Radau samples plus the initial state
    assert_eq!(result.n_out, 41);
    for step in 0..5 {
        let t0 = 4.0 * step as f64;
        for (j, h) in RADAU_SPACINGS[1..].iter().enumerate() {
            assert_relative_eq!(result.times[8 * step + j + 1], t0 + 4.0 * h, max_relative = 1e-14);
        }
        assert_relative_eq!(result.times[8 * step + 8], t0 + 4.0, max_relative = 1e-14);
    }
    // the end sample of the last step is the accepted state at t_end
    let split = PropagationRequest::new(
        16.0,
        20.0,
        4.0,
        vec![result.state(32, 0).unwrap()],
    )
    .with_integrator(IntegratorSettings::fixed_step());
    let rerun = propagate(&mut model, &split).unwrap();
    let (restarted, continued) = (
        rerun.state(rerun.n_out - 1, 0).unwrap(),
        result.state(40, 0).unwrap(),
    );
    for axis in 0..6 {
        assert_abs_diff_eq!(restarted[axis], continued[axis], epsilon = 1e-13);
    }
}

#[test]
fn test_variational_matches_finite_differences() {
    let mut model = two_body_model();
    let nominal = [1.0, 0.1, 0.02, -0.002, 0.0168, 0.0005];
    let delta = 1e-7;
    let mut shifted = nominal;
    shifted[0] += delta;
    shifted[4] += delta * 0.01;

    let seed = VariationalSeed {
        parent: 0,
        state: [1.0, 0.0, 0.0, 0.0, 0.01, 0.0],
    };
    let request = PropagationRequest::new(0.0, 60.0, 1.0, vec![nominal])
        .with_variational(vec![seed])
        .with_integrator(IntegratorSettings::fixed_step())
        .with_nodes(NodeTable::Uniform(1));
    let with_seed = propagate(&mut model, &request).unwrap();
    let perturbed = propagate(
        &mut model,
        &PropagationRequest::new(0.0, 60.0, 1.0, vec![shifted])
            .with_integrator(IntegratorSettings::fixed_step())
            .with_nodes(NodeTable::Uniform(1)),
    )
    .unwrap();

    let k = with_seed.n_out - 1;
    let x = with_seed.state(k, 0).unwrap();
    let dx = with_seed.variational_state(k, 0).unwrap();
    let y = perturbed.state(k, 0).unwrap();
    for axis in 0..6 {
        let numeric = (y[axis] - x[axis]) / delta;
        assert_abs_diff_eq!(dx[axis], numeric, epsilon = 1e-4 * (1.0 + dx[axis].abs()));
    }
}

#[test]
fn test_capacity_exhaustion() {
    let mut model = two_body_model();
    let request = PropagationRequest::new(0.0, 200.0, 1.0, vec![circular_state(sun_gm(), 1.0, 0.0)])
        .with_max_samples(20);

    let result = propagate(&mut model, &request).unwrap();
    assert_eq!(result.status, ExitStatus::CapacityExhausted);
    assert_eq!(result.status.code(), 1);
    assert_eq!(result.n_out, 17);
    assert!(*result.times.last().unwrap() < 200.0);
}

#[test]
fn test_store_grows_when_sized_automatically() {
    let mut model = two_body_model();
    let settings = IntegratorSettings {
        max_dt: 2.0,
        ..IntegratorSettings::default()
    };
    let request = PropagationRequest::new(0.0, 200.0, 50.0, vec![circular_state(sun_gm(), 1.0, 0.0)])
        .with_integrator(settings);

    let result = propagate(&mut model, &request).unwrap();
    assert_eq!(result.status, ExitStatus::Success);
    assert_eq!(*result.times.last().unwrap(), 200.0);
    assert!(result.n_out > 8 * 100);
}

#[test]
fn test_ephemeris_gap_stops_the_run() {
    let mut model = model(bounded_provider(0.0, 10.0), ForceModelConfig::standard(Frame::Barycentric));
    let request = PropagationRequest::new(0.0, 30.0, 1.0, vec![[1.0, 0.2, 0.0, -0.003, 0.016, 0.0]]);

    let result = propagate(&mut model, &request).unwrap();
    assert_eq!(result.status, ExitStatus::Failed(5));
    assert_eq!(result.status.code(), -5);
    assert!(result.n_out >= 1);
    assert!(result.times.iter().all(|t| *t <= 10.0));
    assert!(result.messages.iter().any(|m| m.severity == Severity::Error));
}

#[test]
fn test_rejected_requests() {
    let mut model = two_body_model();
    let state = circular_state(sun_gm(), 1.0, 0.0);

    let err = propagate(&mut model, &PropagationRequest::new(0.0, 10.0, 0.0, vec![state])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Input);

    let mut unconfigured = common::model(static_sun_provider(), ForceModelConfig::default());
    let err = propagate(&mut unconfigured, &PropagationRequest::new(0.0, 10.0, 1.0, vec![state]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn test_epoch_inside_interval() {
    let mut model = two_body_model();
    let gm = sun_gm();
    let epoch = 15.0;
    let request = PropagationRequest::new(0.0, 40.0, 1.0, vec![circular_state(gm, 1.0, epoch)]);

    let result = propagate_from_epoch(&mut model, &request, epoch).unwrap();
    assert_eq!(result.status, ExitStatus::Success);
    assert_eq!(result.n_variational, 6);
    assert_eq!(result.times[0], 0.0);
    assert_eq!(*result.times.last().unwrap(), 40.0);
    assert!(result.times.iter().tuple_windows().all(|(a, b)| a < b));
    assert_eq!(result.times.iter().filter(|t| **t == epoch).count(), 1);

    for k in [0, result.n_out - 1] {
        let expected = circular_state(gm, 1.0, result.times[k]);
        let actual = result.state(k, 0).unwrap();
        for axis in 0..6 {
            assert_abs_diff_eq!(actual[axis], expected[axis], epsilon = 1e-8);
        }
    }

    // at the epoch the variational states are the identity seeds
    let at_epoch = result.times.iter().position(|t| *t == epoch).unwrap();
    for j in 0..6 {
        let seed = result.variational_state(at_epoch, j).unwrap();
        for (axis, value) in seed.iter().enumerate() {
            assert_eq!(*value, if axis == j { 1.0 } else { 0.0 });
        }
    }
}

#[test]
fn test_epoch_outside_interval() {
    let gm = sun_gm();
    for epoch in [-25.0, 70.0] {
        let mut model = two_body_model();
        let request = PropagationRequest::new(0.0, 40.0, 1.0, vec![circular_state(gm, 1.0, epoch)]);

        let result = propagate_from_epoch(&mut model, &request, epoch).unwrap();
        assert_eq!(result.status, ExitStatus::Success);
        assert_eq!(result.times[0], 0.0);
        assert_eq!(*result.times.last().unwrap(), 40.0);
        assert!(result.times.iter().tuple_windows().all(|(a, b)| a < b));
        for k in [0, result.n_out / 2, result.n_out - 1] {
            let expected = circular_state(gm, 1.0, result.times[k]);
            let actual = result.state(k, 0).unwrap();
            for axis in 0..6 {
                assert_abs_diff_eq!(actual[axis], expected[axis], epsilon = 1e-8);
            }
        }
    }
}

#[test]
fn test_epoch_with_empty_interval() {
    let mut model = two_body_model();
    let gm = sun_gm();
    let request = PropagationRequest::new(10.0, 10.0, 1.0, vec![circular_state(gm, 1.0, 0.0)]);

    let result = propagate_from_epoch(&mut model, &request, 0.0).unwrap();
    assert_eq!(result.n_out, 1);
    assert_eq!(result.times, vec![10.0]);
    let expected = circular_state(gm, 1.0, 10.0);
    let actual = result.state(0, 0).unwrap();
    for axis in 0..6 {
        assert_abs_diff_eq!(actual[axis], expected[axis], epsilon = 1e-8);
    }
    assert!(result.variational_state(0, 5).is_some());
}

#[test]
fn test_epoch_inside_interval_respects_capacity() {
    let mut model = two_body_model();
    let epoch = 15.0;
    let request = PropagationRequest::new(0.0, 40.0, 1.0, vec![circular_state(sun_gm(), 1.0, epoch)])
        .with_integrator(IntegratorSettings::fixed_step())
        .with_max_samples(30);

    let result = propagate_from_epoch(&mut model, &request, epoch).unwrap();
    assert_eq!(result.status, ExitStatus::CapacityExhausted);
    assert!(result.n_out <= 30);
    assert_eq!(result.times.len(), result.n_out);
    assert!(result.times.iter().tuple_windows().all(|(a, b)| a < b));
    assert_eq!(result.times.iter().filter(|t| **t == epoch).count(), 1);
}
