//! # Gauss–Radau host integrator
//!
//! A 15th-order predictor/corrector integrator of the IAS15 family for second-order systems
//! `ẍ = a(x, ẋ, t)`.
//!
//! Inside a step of size `dt` starting from `x0, v0, a0`, the acceleration is modelled as
//!
//! ```text
//! a(h) = a0 + Σ_{k=0..6} b_k h^{k+1},      h ∈ [0, 1]
//! ```
//!
//! The seven `b_k` are fitted to the accelerations at the seven interior Radau spacings through
//! the inverse of the node matrix `V[n][k] = h_n^{k+1}`, computed once. Positions and velocities
//! at the nodes are predicted with the same series as the dense output
//! ([`ParticleSeries`]), and the fit is iterated until the `b_6` change stalls or
//! [`IntegratorSettings::max_iterations`] is reached.
//!
//! Step control uses `err = max|b_6| / max|a|` over the real particles and
//! `dt_new = dt · (ε / err)^{1/7}`. A step whose proposal shrinks by more than the safety factor
//! is rejected and retried; `ε = 0` selects fixed steps. The last step is shortened so the run
//! ends exactly on the requested time, in either direction.

use nalgebra::{SMatrix, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    constants::JulianDate,
    dense_output::{DenseOutput, OutputStatus, ParticleSeries, StepPolynomial, RADAU_SPACINGS},
    ephem_forces_errors::EphemForcesError,
    force_model::ForceModel,
    particles::{Particle, ParticleSet},
};

type NodeMatrix = SMatrix<f64, 7, 7>;

/// Something that fills the accelerations of a particle set at a given time.
pub trait AccelerationField {
    fn accelerations(&mut self, particles: &mut ParticleSet, t: JulianDate) -> Result<(), EphemForcesError>;
}

impl AccelerationField for ForceModel {
    fn accelerations(&mut self, particles: &mut ParticleSet, t: JulianDate) -> Result<(), EphemForcesError> {
        self.evaluate(particles, t)
    }
}

/// Tuning of the [`GaussRadauIntegrator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorSettings {
    /// Relative tolerance on `b_6`; zero for fixed steps
    pub epsilon: f64,
    /// Smallest step magnitude (days)
    pub min_dt: f64,
    /// Largest step magnitude (days)
    pub max_dt: f64,
    pub safety_factor: f64,
    /// Corrector iterations per step
    pub max_iterations: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        IntegratorSettings {
            epsilon: 1e-8,
            min_dt: 0.01,
            max_dt: 32.0,
            safety_factor: 0.25,
            max_iterations: 12,
        }
    }
}

impl IntegratorSettings {
    pub fn fixed_step() -> Self {
        IntegratorSettings {
            epsilon: 0.0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), EphemForcesError> {
        let invalid = |msg: &str| Err(EphemForcesError::InvalidConfiguration(msg.into()));
        if !(self.epsilon.is_finite() && self.epsilon >= 0.0) {
            return invalid("epsilon must be finite and >= 0");
        }
        if !(self.min_dt > 0.0 && self.min_dt <= self.max_dt && self.max_dt.is_finite()) {
            return invalid("require 0 < min_dt <= max_dt");
        }
        if !(self.safety_factor > 0.0 && self.safety_factor < 1.0) {
            return invalid("safety_factor must be in (0, 1)");
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be >= 1");
        }
        Ok(())
    }
}

/// How an integration ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegrationOutcome {
    /// Time of the last accepted state
    pub t_reached: JulianDate,
    pub steps: usize,
    pub rejected: usize,
    pub status: OutputStatus,
}

/// Result of the corrector loop of one step.
struct StepAttempt {
    series: Vec<ParticleSeries>,
    error: f64,
}

#[derive(Debug, Clone)]
pub struct GaussRadauIntegrator {
    settings: IntegratorSettings,
    inverse: NodeMatrix,
}

impl GaussRadauIntegrator {
    pub fn new(settings: IntegratorSettings) -> Result<Self, EphemForcesError> {
        settings.validate()?;
        let nodes = NodeMatrix::from_fn(|n, k| RADAU_SPACINGS[n + 1].powi(k as i32 + 1));
        let inverse = nodes.try_inverse().ok_or_else(|| {
            EphemForcesError::InvalidConfiguration("singular Radau node matrix".into())
        })?;
        Ok(GaussRadauIntegrator { settings, inverse })
    }

    pub fn settings(&self) -> &IntegratorSettings {
        &self.settings
    }

    /// Integrate `particles` from `t_start` to `t_end`, recording every accepted step.
    ///
    /// Arguments
    /// -----------------
    /// * `field`: acceleration model, evaluated on the whole particle set.
    /// * `particles`: state at `t_start`; holds the last accepted state on return.
    /// * `t_start`, `t_end`: integration bounds (`t_end < t_start` integrates backward).
    /// * `dt_initial`: first step magnitude (days), clamped to `[min_dt, max_dt]`.
    /// * `output`: receives the initial sample and the samples of each step.
    ///
    /// Return
    /// ----------
    /// * The [`IntegrationOutcome`]; its status is [`OutputStatus::CapacityExhausted`] when the
    ///   run stopped before `t_end` for lack of output room.
    /// * Any error raised by `field`, which aborts the run.
    ///
    /// See also
    /// ------------
    /// * [`DenseOutput::record_step`] – Sampling of an accepted step.
    pub fn integrate<F: AccelerationField + ?Sized>(
        &self,
        field: &mut F,
        particles: &mut ParticleSet,
        t_start: JulianDate,
        t_end: JulianDate,
        dt_initial: f64,
        output: &mut DenseOutput,
    ) -> Result<IntegrationOutcome, EphemForcesError> {
        let s = &self.settings;
        field.accelerations(particles, t_start)?;
        let initial: Vec<[f64; 6]> = particles.iter().map(Particle::state).collect();
        let mut outcome = IntegrationOutcome {
            t_reached: t_start,
            steps: 0,
            rejected: 0,
            status: output.record_initial(t_start, &initial),
        };
        if t_end == t_start || outcome.status == OutputStatus::CapacityExhausted {
            return Ok(outcome);
        }

        let direction = (t_end - t_start).signum();
        let mut dt = direction * dt_initial.abs().clamp(s.min_dt, s.max_dt);
        let mut t = t_start;
        let mut guess = vec![[Vector3::zeros(); 7]; particles.len()];

        while direction * (t_end - t) > 0.0 {
            let remaining = t_end - t;
            let last = dt.abs() >= remaining.abs();
            let dt_step = if last { remaining } else { dt };

            let attempt = self.correct(field, particles, t, dt_step, &guess)?;
            let dt_new = self.next_step_size(dt_step, attempt.error);

            if s.epsilon > 0.0
                && dt_new.abs() < s.safety_factor * dt_step.abs()
                && dt_step.abs() > s.min_dt
            {
                log::debug!("Step of {dt_step} d at JD {t} rejected, retrying with {dt_new} d");
                outcome.rejected += 1;
                let q = dt_new / dt_step;
                guess = attempt.series.iter().map(|p| rescale(&p.b, q)).collect();
                dt = dt_new;
                continue;
            }

            let t_next = if last { t_end } else { t + dt_step };
            for (p, series) in particles.motions_mut().zip(&attempt.series) {
                p.position = series.position(1.0, dt_step);
                p.velocity = series.velocity(1.0, dt_step);
            }
            field.accelerations(particles, t_next)?;

            let q = dt_new / dt_step;
            guess = attempt.series.iter().map(|p| extrapolate(&p.b, q)).collect();
            let step = StepPolynomial {
                t_end: t_next,
                dt: dt_step,
                particles: attempt.series,
            };
            outcome.status = output.record_step(&step);
            outcome.steps += 1;
            outcome.t_reached = t_next;
            t = t_next;
            dt = dt_new;

            if outcome.status == OutputStatus::CapacityExhausted {
                break;
            }
        }
        Ok(outcome)
    }

    /// Fit the step polynomial of a step of size `dt` from the current state of `particles`.
    ///
    /// The particle set is restored to its pre-step state (accelerations included) on return.
    fn correct<F: AccelerationField + ?Sized>(
        &self,
        field: &mut F,
        particles: &mut ParticleSet,
        t: JulianDate,
        dt: f64,
        guess: &[[Vector3<f64>; 7]],
    ) -> Result<StepAttempt, EphemForcesError> {
        let mut series: Vec<ParticleSeries> = particles
            .iter()
            .zip(guess)
            .map(|(p, b)| ParticleSeries {
                x0: p.position,
                v0: p.velocity,
                a0: p.acceleration,
                b: *b,
            })
            .collect();
        let real: Vec<bool> = particles.iter().map(Particle::is_real).collect();
        let mut node_acc = vec![[Vector3::zeros(); 7]; series.len()];
        let mut previous = f64::INFINITY;

        for iteration in 0..self.settings.max_iterations {
            for (n, &h) in RADAU_SPACINGS[1..8].iter().enumerate() {
                for (p, s) in particles.motions_mut().zip(&series) {
                    p.position = s.position(h, dt);
                    p.velocity = s.velocity(h, dt);
                }
                field.accelerations(particles, t + h * dt)?;
                for (acc, p) in node_acc.iter_mut().zip(particles.iter()) {
                    acc[n] = p.acceleration;
                }
            }

            let mut change: f64 = 0.0;
            let mut scale: f64 = 0.0;
            for (s, acc) in series.iter_mut().zip(&node_acc) {
                let rhs = SMatrix::<f64, 7, 3>::from_fn(|n, c| acc[n][c] - s.a0[c]);
                let b = self.inverse * rhs;
                for (k, bk) in s.b.iter_mut().enumerate() {
                    let fitted = Vector3::new(b[(k, 0)], b[(k, 1)], b[(k, 2)]);
                    if k == 6 {
                        change = change.max((fitted - *bk).amax());
                    }
                    *bk = fitted;
                }
                scale = scale.max(acc[6].amax());
            }

            let converged = if scale > 0.0 { change / scale } else { change };
            if converged < 1e-16 || (iteration > 1 && converged >= previous) {
                break;
            }
            previous = converged;
        }

        for (p, s) in particles.motions_mut().zip(&series) {
            p.position = s.x0;
            p.velocity = s.v0;
            p.acceleration = s.a0;
        }

        let (b6, amax) = series
            .iter()
            .zip(&node_acc)
            .zip(&real)
            .filter(|(_, is_real)| **is_real)
            .fold((0.0_f64, 0.0_f64), |(b6, amax), ((s, acc), _)| {
                (b6.max(s.b[6].amax()), amax.max(acc[6].amax()))
            });
        let error = if amax > 0.0 { b6 / amax } else { 0.0 };
        Ok(StepAttempt { series, error })
    }

    /// Proposed size of the next step.
    fn next_step_size(&self, dt: f64, error: f64) -> f64 {
        let s = &self.settings;
        if s.epsilon == 0.0 {
            return dt;
        }
        let mut dt_new = if error > 0.0 && error.is_finite() {
            dt * (s.epsilon / error).powf(1.0 / 7.0)
        } else {
            dt / s.safety_factor
        };
        if (dt_new / dt).abs() > 1.0 / s.safety_factor {
            dt_new = dt / s.safety_factor;
        }
        dt_new.abs().clamp(s.min_dt, s.max_dt).copysign(dt)
    }
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

/// Coefficients of the same polynomial over a step `q` times as long, from the same start.
fn rescale(b: &[Vector3<f64>; 7], q: f64) -> [Vector3<f64>; 7] {
    let mut out = *b;
    for (k, bk) in out.iter_mut().enumerate() {
        *bk *= q.powi(k as i32 + 1);
    }
    out
}

/// Coefficients of the current polynomial re-expanded around the end of the step, for a next
/// step `q` times as long.
fn extrapolate(b: &[Vector3<f64>; 7], q: f64) -> [Vector3<f64>; 7] {
    let mut out = [Vector3::zeros(); 7];
    for (j, next) in out.iter_mut().enumerate() {
        let sum = (j..7).fold(Vector3::<f64>::zeros(), |acc, k| {
            acc + binomial(k + 1, j + 1) * b[k]
        });
        *next = q.powi(j as i32 + 1) * sum;
    }
    out
}

#[cfg(test)]
mod integrator_test {
    use super::*;
    use crate::dense_output::NodeTable;
    use approx::assert_relative_eq;

    /// Unit harmonic oscillator, variational particles follow the same linear law.
    struct Oscillator {
        calls: usize,
    }

    impl AccelerationField for Oscillator {
        fn accelerations(&mut self, particles: &mut ParticleSet, _t: f64) -> Result<(), EphemForcesError> {
            self.calls += 1;
            for p in particles.motions_mut() {
                p.acceleration = -p.position;
            }
            Ok(())
        }
    }

    fn oscillator_set() -> ParticleSet {
        let mut set = ParticleSet::new();
        set.add_real(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0));
        set
    }

    #[test]
    fn test_node_matrix_inverse() {
        let integrator = GaussRadauIntegrator::new(IntegratorSettings::default()).unwrap();
        let nodes = NodeMatrix::from_fn(|n, k| RADAU_SPACINGS[n + 1].powi(k as i32 + 1));
        assert_relative_eq!(nodes * integrator.inverse, NodeMatrix::identity(), epsilon = 1e-9);
    }

    #[test]
    fn test_extrapolation_is_exact_for_polynomials() {
        let b = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(-0.2, 0.0, 0.0),
            Vector3::zeros(),
            Vector3::zeros(),
            Vector3::zeros(),
            Vector3::new(0.01, 0.0, 0.0),
        ];
        let old = ParticleSeries {
            x0: Vector3::zeros(),
            v0: Vector3::zeros(),
            a0: Vector3::new(2.0, 0.0, 0.0),
            b,
        };
        let q = 1.7;
        let next = ParticleSeries {
            a0: old.acceleration(1.0),
            b: extrapolate(&b, q),
            ..old
        };
        for h in [0.0, 0.3, 0.9] {
            assert_relative_eq!(next.acceleration(h), old.acceleration(1.0 + q * h), max_relative = 1e-12);
        }
    }

    #[test]
    fn test_adaptive_oscillator() {
        let integrator = GaussRadauIntegrator::new(IntegratorSettings::default()).unwrap();
        let mut set = oscillator_set();
        let mut field = Oscillator { calls: 0 };
        let mut out = DenseOutput::new(&NodeTable::GaussRadau, 1, 10_000).unwrap();

        let outcome = integrator
            .integrate(&mut field, &mut set, 0.0, 10.0, 0.5, &mut out)
            .unwrap();
        assert_eq!(outcome.status, OutputStatus::Continue);
        assert_eq!(outcome.t_reached, 10.0);
        assert_eq!(*out.times().last().unwrap(), 10.0);
        assert_eq!(out.n_out(), 1 + 8 * outcome.steps);

        let p = set.get(0).unwrap();
        assert_relative_eq!(p.position, Vector3::new(10f64.cos(), 10f64.sin(), 0.0), epsilon = 1e-8);
        assert_relative_eq!(p.velocity, Vector3::new(-10f64.sin(), 10f64.cos(), 0.0), epsilon = 1e-8);

        // intermediate samples lie on the circle too
        for k in 0..out.n_out() {
            let (t, state) = out.sample(k).unwrap();
            assert_relative_eq!(state[0], t.cos(), epsilon = 1e-8);
            assert_relative_eq!(state[4], t.cos(), epsilon = 1e-8);
        }
    }

    #[test]
    fn test_backward_fixed_steps() {
        let integrator = GaussRadauIntegrator::new(IntegratorSettings::fixed_step()).unwrap();
        let mut set = oscillator_set();
        let mut field = Oscillator { calls: 0 };
        let mut out = DenseOutput::new(&NodeTable::Uniform(10), 1, 1000).unwrap();

        let outcome = integrator
            .integrate(&mut field, &mut set, 0.0, -2.0, 0.5, &mut out)
            .unwrap();
        assert_eq!(outcome.steps, 4);
        assert_eq!(outcome.rejected, 0);
        assert_eq!(out.n_out(), 41);
        assert!(out.times().windows(2).all(|w| w[1] < w[0]));
        let p = set.get(0).unwrap();
        assert_relative_eq!(p.position.x, 2f64.cos(), epsilon = 1e-10);
        assert_relative_eq!(p.position.y, -(2f64.sin()), epsilon = 1e-10);
    }

    #[test]
    fn test_zero_length_and_capacity() {
        let integrator = GaussRadauIntegrator::new(IntegratorSettings::fixed_step()).unwrap();
        let mut field = Oscillator { calls: 0 };

        let mut set = oscillator_set();
        let mut out = DenseOutput::new(&NodeTable::GaussRadau, 1, 100).unwrap();
        let outcome = integrator
            .integrate(&mut field, &mut set, 5.0, 5.0, 1.0, &mut out)
            .unwrap();
        assert_eq!(outcome.steps, 0);
        assert_eq!(out.n_out(), 1);
        assert_eq!(out.states(), &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

        let mut set = oscillator_set();
        let mut out = DenseOutput::new(&NodeTable::GaussRadau, 1, 17).unwrap();
        let outcome = integrator
            .integrate(&mut field, &mut set, 0.0, 100.0, 1.0, &mut out)
            .unwrap();
        assert_eq!(outcome.status, OutputStatus::CapacityExhausted);
        assert_eq!(outcome.steps, 2);
        assert_eq!(out.n_out(), 17);
        assert_eq!(outcome.t_reached, 2.0);
    }

    #[test]
    fn test_invalid_settings() {
        let settings = IntegratorSettings {
            min_dt: 1.0,
            max_dt: 0.5,
            ..IntegratorSettings::default()
        };
        assert!(GaussRadauIntegrator::new(settings).is_err());
    }
}
