//! # Dense output of accepted integration steps
//!
//! After each accepted step the integrator hands over a [`StepPolynomial`]: the pre-step state
//! `x0, v0, a0` of every particle and the seven coefficients `b_k` of the acceleration model
//!
//! ```text
//! a(h) = a0 + b0 h + b1 h² + … + b6 h⁷,      h ∈ [0, 1] fraction of the step
//! ```
//!
//! Integrating twice in `h` gives the position and velocity anywhere inside the step. With
//! `dt` the step size, the position weights follow
//!
//! ```text
//! s0 = dt h,  s1 = s0²/2,  s2 = s1 h/3,  s3 = s2 h/2,  s4 = 3 s3 h/5,
//! s5 = 2 s4 h/3,  s6 = 5 s5 h/7,  s7 = 3 s6 h/4,  s8 = 7 s7 h/9
//! x(h) = x0 + s0 v0 + s1 a0 + s2 b0 + … + s8 b6
//! ```
//!
//! and the velocity weights `s0 = dt h`, `s_k = k s_{k-1} h/(k+1)`, with
//! `v(h) = v0 + s0 a0 + s1 b0 + … + s7 b6`.
//!
//! [`DenseOutput`] evaluates these series at the fractions of a [`NodeTable`] and stores one
//! sample per fraction, until the capacity given at construction is reached.

use itertools::Itertools;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::ephem_forces_errors::EphemForcesError;

/// Gauss–Radau spacings of the 15th-order integrator, including both step ends.
pub const RADAU_SPACINGS: [f64; 9] = [
    0.0,
    0.0562625605369221464656521910318,
    0.180240691736892364987579942780,
    0.352624717113169637373907769648,
    0.547153626330555383001448554766,
    0.734210177215410531523210605558,
    0.885320946839095768090359771030,
    0.977520613561287501891174488626,
    1.0,
];

/// Series of one particle over one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleSeries {
    pub x0: Vector3<f64>,
    pub v0: Vector3<f64>,
    pub a0: Vector3<f64>,
    /// Coefficients of `h¹ … h⁷` in the acceleration model
    pub b: [Vector3<f64>; 7],
}

impl ParticleSeries {
    pub fn position(&self, h: f64, dt: f64) -> Vector3<f64> {
        let s = position_weights(h, dt);
        let tail = s[2..]
            .iter()
            .zip(self.b.iter())
            .rev()
            .fold(Vector3::<f64>::zeros(), |acc, (w, b)| acc + *w * b);
        self.x0 + (tail + s[1] * self.a0 + s[0] * self.v0)
    }

    pub fn velocity(&self, h: f64, dt: f64) -> Vector3<f64> {
        let s = velocity_weights(h, dt);
        let tail = s[1..]
            .iter()
            .zip(self.b.iter())
            .rev()
            .fold(Vector3::<f64>::zeros(), |acc, (w, b)| acc + *w * b);
        self.v0 + tail + s[0] * self.a0
    }

    /// Acceleration model at fraction `h`.
    pub fn acceleration(&self, h: f64) -> Vector3<f64> {
        self.b
            .iter()
            .enumerate()
            .fold(self.a0, |acc, (k, b)| acc + h.powi(k as i32 + 1) * b)
    }
}

/// Weights of `v0, a0, b0 … b6` in the position series.
pub fn position_weights(h: f64, dt: f64) -> [f64; 9] {
    let mut s = [0.0; 9];
    s[0] = dt * h;
    s[1] = s[0] * s[0] / 2.;
    s[2] = s[1] * h / 3.;
    s[3] = s[2] * h / 2.;
    s[4] = 3. * s[3] * h / 5.;
    s[5] = 2. * s[4] * h / 3.;
    s[6] = 5. * s[5] * h / 7.;
    s[7] = 3. * s[6] * h / 4.;
    s[8] = 7. * s[7] * h / 9.;
    s
}

/// Weights of `a0, b0 … b6` in the velocity series.
pub fn velocity_weights(h: f64, dt: f64) -> [f64; 8] {
    let mut s = [0.0; 8];
    s[0] = dt * h;
    for k in 1..8 {
        s[k] = k as f64 * s[k - 1] * h / (k as f64 + 1.);
    }
    s
}

/// Polynomial description of one accepted step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPolynomial {
    /// Time at the end of the step
    pub t_end: f64,
    /// Signed size of the step
    pub dt: f64,
    pub particles: Vec<ParticleSeries>,
}

impl StepPolynomial {
    /// Time of fraction `h`.
    pub fn time(&self, h: f64) -> f64 {
        self.t_end + self.dt * (h - 1.0)
    }

    /// State of every particle at fraction `h`, as `[x, y, z, vx, vy, vz]`.
    pub fn interpolate(&self, h: f64) -> Vec<[f64; 6]> {
        self.particles
            .iter()
            .map(|p| {
                let x = p.position(h, self.dt);
                let v = p.velocity(h, self.dt);
                [x.x, x.y, x.z, v.x, v.y, v.z]
            })
            .collect()
    }
}

/// Fractions of each step at which samples are written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum NodeTable {
    /// The eight non-zero Gauss–Radau spacings
    #[default]
    GaussRadau,
    /// `n` equally spaced fractions `1/n, 2/n, …, 1`
    Uniform(usize),
    /// Strictly increasing fractions in `(0, 1]`
    Custom(Vec<f64>),
}

impl NodeTable {
    /// The validated output fractions.
    ///
    /// Return
    /// ----------
    /// * The fractions, or [`EphemForcesError::InvalidNodeTable`] for an empty table, a fraction
    ///   outside `(0, 1]` or a non-increasing sequence.
    pub fn fractions(&self) -> Result<Vec<f64>, EphemForcesError> {
        let nodes = match self {
            NodeTable::GaussRadau => RADAU_SPACINGS[1..].to_vec(),
            NodeTable::Uniform(n) => (1..=*n).map(|k| k as f64 / *n as f64).collect(),
            NodeTable::Custom(nodes) => nodes.clone(),
        };
        if nodes.is_empty() {
            return Err(EphemForcesError::InvalidNodeTable(
                "at least one fraction is required".into(),
            ));
        }
        if let Some(h) = nodes.iter().find(|h| !(**h > 0.0 && **h <= 1.0)) {
            return Err(EphemForcesError::InvalidNodeTable(format!(
                "fraction {h} is outside (0, 1]"
            )));
        }
        if !nodes.iter().tuple_windows().all(|(a, b)| a < b) {
            return Err(EphemForcesError::InvalidNodeTable(
                "fractions must be strictly increasing".into(),
            ));
        }
        Ok(nodes)
    }
}

/// Signal returned to the integration loop after each recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Continue,
    /// The next step would not fit: stop integrating
    CapacityExhausted,
}

/// Bounded store of output samples.
#[derive(Debug, Clone)]
pub struct DenseOutput {
    fractions: Vec<f64>,
    n_particles: usize,
    capacity: usize,
    times: Vec<f64>,
    states: Vec<f64>,
}

impl DenseOutput {
    /// Create an empty store.
    ///
    /// Arguments
    /// -----------------
    /// * `table`: fractions sampled in every step.
    /// * `n_particles`: number of particles per sample.
    /// * `capacity`: maximum number of samples, the initial one included.
    ///
    /// Return
    /// ----------
    /// * The store, or an error for an invalid node table or a zero capacity.
    pub fn new(table: &NodeTable, n_particles: usize, capacity: usize) -> Result<Self, EphemForcesError> {
        let fractions = table.fractions()?;
        if capacity == 0 {
            return Err(EphemForcesError::InvalidRequest(
                "output capacity must hold at least one sample".into(),
            ));
        }
        Ok(DenseOutput {
            fractions,
            n_particles,
            capacity,
            times: Vec::with_capacity(capacity),
            states: Vec::with_capacity(capacity * 6 * n_particles),
        })
    }

    /// Samples written per accepted step.
    pub fn samples_per_step(&self) -> usize {
        self.fractions.len()
    }

    pub fn fractions(&self) -> &[f64] {
        &self.fractions
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples still available.
    pub fn remaining(&self) -> usize {
        self.capacity - self.times.len()
    }

    fn status(&self) -> OutputStatus {
        if self.remaining() < self.samples_per_step() {
            OutputStatus::CapacityExhausted
        } else {
            OutputStatus::Continue
        }
    }

    fn push(&mut self, t: f64, states: &[[f64; 6]]) {
        self.times.push(t);
        self.states.extend(states.iter().flatten());
    }

    /// Record the state before the first step, as a single sample.
    pub fn record_initial(&mut self, t: f64, states: &[[f64; 6]]) -> OutputStatus {
        if self.times.is_empty() {
            self.push(t, states);
        }
        self.status()
    }

    /// Record one sample per fraction of an accepted step.
    ///
    /// Nothing is written when the step does not fit in the remaining capacity.
    ///
    /// Return
    /// ----------
    /// * [`OutputStatus::CapacityExhausted`] when the next step would not fit, else
    ///   [`OutputStatus::Continue`].
    pub fn record_step(&mut self, step: &StepPolynomial) -> OutputStatus {
        if self.remaining() < self.samples_per_step() {
            return OutputStatus::CapacityExhausted;
        }
        for i in 0..self.fractions.len() {
            let h = self.fractions[i];
            let states = step.interpolate(h);
            self.push(step.time(h), &states);
        }
        self.status()
    }

    /// Number of samples written.
    pub fn n_out(&self) -> usize {
        self.times.len()
    }

    pub fn n_particles(&self) -> usize {
        self.n_particles
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Flattened states: sample-major, then particle, then `[x, y, z, vx, vy, vz]`.
    pub fn states(&self) -> &[f64] {
        &self.states
    }

    /// Time and states of sample `k`.
    pub fn sample(&self, k: usize) -> Option<(f64, &[f64])> {
        let width = 6 * self.n_particles;
        let t = *self.times.get(k)?;
        Some((t, &self.states[k * width..(k + 1) * width]))
    }

    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>) {
        (self.times, self.states)
    }
}
