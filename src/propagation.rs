//! # Propagation driver
//!
//! Ties the [`ForceModel`], the [`GaussRadauIntegrator`] and the [`DenseOutput`] together:
//!
//! * [`propagate`] integrates a batch of particles (and their variational companions) from
//!   `t_start` to `t_end`, writing samples at the node fractions of every accepted step;
//! * [`propagate_from_epoch`] starts from states given at an arbitrary epoch, possibly outside
//!   `[t_start, t_end]`, and returns samples ordered from `t_start` to `t_end`.
//!
//! When the output capacity is not given it is sized from the time span and the initial step,
//! and the run is repeated with a larger store when it turns out too small.
//!
//! Fatal data errors raised during the run do not discard the samples already written: they are
//! reported through [`ExitStatus::Failed`] and the message log.
//!
//! ```rust, no_run
//! use std::sync::Arc;
//! use ephem_forces::ephemeris::{EphemerisProvider, EphemerisSources};
//! use ephem_forces::force_model::{ForceModel, ForceModelConfig, Frame};
//! use ephem_forces::physical_constants::PhysicalConstants;
//! use ephem_forces::propagation::{propagate_from_epoch, PropagationRequest};
//!
//! let provider = Arc::new(EphemerisProvider::new(
//!     EphemerisSources::from_env("de441.csv"),
//!     PhysicalConstants::de441(),
//! ));
//! let mut model = ForceModel::new(provider, ForceModelConfig::standard(Frame::Barycentric));
//! let state = [3.33, -0.94, -0.27, 0.003, 0.0088, 0.0036];
//! let request = PropagationRequest::new(2_460_000.5, 2_460_100.5, 20.0, vec![state]);
//! let result = propagate_from_epoch(&mut model, &request, 2_460_050.5).unwrap();
//! println!("{} samples, status {}", result.n_out, result.status.code());
//! ```

use hifitime::Epoch;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    constants::JulianDate,
    dense_output::{DenseOutput, NodeTable, OutputStatus},
    diagnostics::Message,
    ephem_forces_errors::{EphemForcesError, ErrorKind},
    force_model::ForceModel,
    integrator::{GaussRadauIntegrator, IntegratorSettings},
    particles::{NonGravParams, Particle, ParticleSet},
};

/// Number of runs attempted when the output store has to grow
const MAX_SIZING_ATTEMPTS: usize = 5;

/// Initial state of a variational particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariationalSeed {
    /// Index of the real particle in [`PropagationRequest::states`]
    pub parent: usize,
    pub state: [f64; 6],
}

/// Julian date (TDB) of an epoch.
pub fn epoch_to_jd(epoch: &Epoch) -> JulianDate {
    epoch.to_jde_tdb_days()
}

/// Inputs of a propagation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationRequest {
    pub t_start: JulianDate,
    pub t_end: JulianDate,
    /// Initial step magnitude (days)
    pub dt_initial: f64,
    /// Real particle states `[x, y, z, vx, vy, vz]`, in the frame of the force model
    pub states: Vec<[f64; 6]>,
    /// Empty, or one entry per real particle
    #[serde(default)]
    pub non_grav: Vec<NonGravParams>,
    #[serde(default)]
    pub variational: Vec<VariationalSeed>,
    #[serde(default)]
    pub integrator: IntegratorSettings,
    #[serde(default)]
    pub nodes: NodeTable,
    /// Output capacity in samples, for the whole result; sized from the time span when `None`
    #[serde(default)]
    pub max_samples: Option<usize>,
}

impl PropagationRequest {
    pub fn new(t_start: JulianDate, t_end: JulianDate, dt_initial: f64, states: Vec<[f64; 6]>) -> Self {
        PropagationRequest {
            t_start,
            t_end,
            dt_initial,
            states,
            non_grav: Vec::new(),
            variational: Vec::new(),
            integrator: IntegratorSettings::default(),
            nodes: NodeTable::default(),
            max_samples: None,
        }
    }

    /// Same as [`PropagationRequest::new`] with the bounds given as epochs.
    pub fn from_epochs(start: &Epoch, end: &Epoch, dt_initial: f64, states: Vec<[f64; 6]>) -> Self {
        Self::new(epoch_to_jd(start), epoch_to_jd(end), dt_initial, states)
    }

    pub fn with_non_grav(mut self, non_grav: Vec<NonGravParams>) -> Self {
        self.non_grav = non_grav;
        self
    }

    pub fn with_variational(mut self, seeds: Vec<VariationalSeed>) -> Self {
        self.variational = seeds;
        self
    }

    pub fn with_integrator(mut self, settings: IntegratorSettings) -> Self {
        self.integrator = settings;
        self
    }

    pub fn with_nodes(mut self, nodes: NodeTable) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = Some(max_samples);
        self
    }

    /// Six unit seeds per real particle, spanning its position and velocity.
    pub fn identity_seeds(n_particles: usize) -> Vec<VariationalSeed> {
        (0..n_particles)
            .flat_map(|parent| {
                (0..6).map(move |axis| {
                    let mut state = [0.0; 6];
                    state[axis] = 1.0;
                    VariationalSeed { parent, state }
                })
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), EphemForcesError> {
        let invalid = |msg: String| Err(EphemForcesError::InvalidRequest(msg));
        if !(self.t_start.is_finite() && self.t_end.is_finite()) {
            return invalid("integration bounds must be finite".into());
        }
        if !(self.dt_initial.is_finite() && self.dt_initial != 0.0) {
            return invalid(format!("initial step must be finite and non-zero (got {})", self.dt_initial));
        }
        if self.states.is_empty() {
            return invalid("at least one particle state is required".into());
        }
        if self.states.iter().flatten().any(|x| !x.is_finite()) {
            return invalid("particle states must be finite".into());
        }
        if !self.non_grav.is_empty() && self.non_grav.len() != self.states.len() {
            return invalid(format!(
                "{} non-gravitational entries for {} particles",
                self.non_grav.len(),
                self.states.len()
            ));
        }
        if let Some(seed) = self.variational.iter().find(|s| s.parent >= self.states.len()) {
            return invalid(format!("variational seed refers to missing particle {}", seed.parent));
        }
        if self.max_samples == Some(0) {
            return invalid("max_samples must be >= 1".into());
        }
        self.integrator.validate()?;
        self.nodes.fractions()?;
        Ok(())
    }

    fn particle_set(&self) -> Result<ParticleSet, EphemForcesError> {
        let mut set = ParticleSet::new();
        for (i, s) in self.states.iter().enumerate() {
            let index = set.add_real(Vector3::new(s[0], s[1], s[2]), Vector3::new(s[3], s[4], s[5]));
            if let Some(ng) = self.non_grav.get(i) {
                set.set_non_grav(index, *ng)?;
            }
        }
        for seed in &self.variational {
            let s = &seed.state;
            set.add_variational(
                seed.parent,
                Vector3::new(s[0], s[1], s[2]),
                Vector3::new(s[3], s[4], s[5]),
            )?;
        }
        Ok(set)
    }
}

/// Final status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// Output capacity reached before the end time
    CapacityExhausted,
    /// A fatal error stopped the run; holds [`EphemForcesError::status_code`]
    Failed(i32),
}

impl ExitStatus {
    /// Integer status: 0 on success, 1 on capacity exhaustion, the negated error code on failure.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::CapacityExhausted => 1,
            ExitStatus::Failed(code) => -code,
        }
    }

    fn severity(&self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::CapacityExhausted => 1,
            ExitStatus::Failed(_) => 2,
        }
    }

    fn worst(self, other: ExitStatus) -> ExitStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// Samples and status of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PropagationResult {
    pub times: Vec<f64>,
    /// Sample-major: for each sample, the real particles then the variational ones, six values
    /// each
    pub states: Vec<f64>,
    pub n_particles: usize,
    pub n_variational: usize,
    pub n_out: usize,
    pub status: ExitStatus,
    /// Warnings and errors retained during the run
    pub messages: Vec<Message>,
}

impl PropagationResult {
    fn width(&self) -> usize {
        6 * (self.n_particles + self.n_variational)
    }

    /// State of real particle `i` at sample `k`.
    pub fn state(&self, k: usize, i: usize) -> Option<[f64; 6]> {
        if i >= self.n_particles {
            return None;
        }
        self.row(k, i)
    }

    /// State of variational particle `j` at sample `k`.
    pub fn variational_state(&self, k: usize, j: usize) -> Option<[f64; 6]> {
        if j >= self.n_variational {
            return None;
        }
        self.row(k, self.n_particles + j)
    }

    fn row(&self, k: usize, column: usize) -> Option<[f64; 6]> {
        if k >= self.n_out {
            return None;
        }
        let start = k * self.width() + 6 * column;
        let mut out = [0.0; 6];
        out.copy_from_slice(self.states.get(start..start + 6)?);
        Some(out)
    }
}

/// Output of one integration leg.
struct Leg {
    times: Vec<f64>,
    states: Vec<f64>,
    status: ExitStatus,
    /// Last accepted state of every particle, real then variational
    last: Vec<[f64; 6]>,
}

impl Leg {
    fn reversed(mut self, width: usize) -> Self {
        self.times.reverse();
        self.states = self
            .states
            .chunks(width)
            .rev()
            .flatten()
            .copied()
            .collect();
        self
    }

    fn drop_last(mut self, width: usize) -> Self {
        if self.times.pop().is_some() {
            self.states.truncate(self.states.len() - width);
        }
        self
    }
}

fn run_leg_once(
    model: &mut ForceModel,
    integrator: &GaussRadauIntegrator,
    request: &PropagationRequest,
    t0: JulianDate,
    t1: JulianDate,
    capacity: usize,
) -> Result<(Leg, JulianDate), EphemForcesError> {
    let mut particles = request.particle_set()?;
    let mut output = DenseOutput::new(&request.nodes, particles.len(), capacity)?;

    let run = integrator.integrate(model, &mut particles, t0, t1, request.dt_initial, &mut output);
    let (status, t_reached) = match run {
        Ok(outcome) => {
            let status = match outcome.status {
                OutputStatus::CapacityExhausted if outcome.t_reached != t1 => {
                    ExitStatus::CapacityExhausted
                }
                _ => ExitStatus::Success,
            };
            (status, outcome.t_reached)
        }
        Err(e) if e.kind() == ErrorKind::Data => {
            let t_reached = output.times().last().copied().unwrap_or(t0);
            (ExitStatus::Failed(e.status_code()), t_reached)
        }
        Err(e) => return Err(e),
    };

    let last = particles.iter().map(Particle::state).collect();
    let (times, states) = output.into_parts();
    Ok((
        Leg {
            times,
            states,
            status,
            last,
        },
        t_reached,
    ))
}

/// One leg from `t0` to `t1`, growing the output store when it was sized automatically.
fn run_leg(
    model: &mut ForceModel,
    integrator: &GaussRadauIntegrator,
    request: &PropagationRequest,
    t0: JulianDate,
    t1: JulianDate,
) -> Result<Leg, EphemForcesError> {
    let per_step = request.nodes.fractions()?.len();
    if let Some(capacity) = request.max_samples {
        return run_leg_once(model, integrator, request, t0, t1, capacity).map(|(leg, _)| leg);
    }

    let span = (t1 - t0).abs();
    let mut n_steps = ((span / request.dt_initial.abs()) * 1.2).ceil().max(1.0) as usize;
    let mut attempt = 1;
    loop {
        let capacity = n_steps * per_step + 1;
        let (leg, t_reached) = run_leg_once(model, integrator, request, t0, t1, capacity)?;
        if leg.status != ExitStatus::CapacityExhausted || attempt == MAX_SIZING_ATTEMPTS {
            return Ok(leg);
        }
        let covered = (t_reached - t0).abs();
        let factor = if covered > 0.0 {
            (1.5 * span / covered).ceil().max(2.0) as usize
        } else {
            2
        };
        log::debug!(
            "Output store of {capacity} samples exhausted at JD {t_reached}, growing by {factor}"
        );
        n_steps *= factor;
        attempt += 1;
    }
}

fn assemble(
    model: &mut ForceModel,
    request: &PropagationRequest,
    leg: Leg,
    status: ExitStatus,
) -> PropagationResult {
    let n_out = leg.times.len();
    PropagationResult {
        times: leg.times,
        states: leg.states,
        n_particles: request.states.len(),
        n_variational: request.variational.len(),
        n_out,
        status,
        messages: model.messages_mut().drain(),
    }
}

/// Integrate the particles of `request` from `t_start` to `t_end`.
///
/// Arguments
/// -----------------
/// * `model`: force model, its frame applies to the request states.
/// * `request`: states, bounds, integrator settings and output layout.
///
/// Return
/// ----------
/// * The [`PropagationResult`]. A zero-length request yields exactly one sample, the input
///   state. Data errors raised during the run are reported in its status.
/// * A configuration or input error, raised before integrating.
pub fn propagate(model: &mut ForceModel, request: &PropagationRequest) -> Result<PropagationResult, EphemForcesError> {
    request.validate()?;
    model.config().validate()?;
    let integrator = GaussRadauIntegrator::new(request.integrator)?;

    log::info!(
        "Propagating {} particles ({} variational) from JD {} to JD {}",
        request.states.len(),
        request.variational.len(),
        request.t_start,
        request.t_end
    );
    let leg = run_leg(model, &integrator, request, request.t_start, request.t_end)?;
    let status = leg.status;
    let result = assemble(model, request, leg, status);
    log::info!("Propagation finished: {} samples, status {}", result.n_out, result.status.code());
    Ok(result)
}

/// Integrate states given at `epoch` and return samples from `t_start` to `t_end`.
///
/// When `request.variational` is empty, six identity seeds are attached to every particle.
///
/// * `epoch` before `t_start` (on the far side from `t_end`): integrate to `t_start` without
///   output, then to `t_end`.
/// * `epoch` beyond `t_end`: integrate to `t_end` without output, then back to `t_start`, and
///   reverse the samples.
/// * `epoch` inside the interval: integrate backward to `t_start` and forward to `t_end`, and
///   join the reversed first leg with the second, the epoch sample appearing once.
///
/// See also
/// ------------
/// * [`propagate`] – Single-leg run.
pub fn propagate_from_epoch(
    model: &mut ForceModel,
    request: &PropagationRequest,
    epoch: JulianDate,
) -> Result<PropagationResult, EphemForcesError> {
    let mut request = request.clone();
    if request.variational.is_empty() {
        request.variational = PropagationRequest::identity_seeds(request.states.len());
    }
    request.validate()?;
    if !epoch.is_finite() {
        return Err(EphemForcesError::InvalidRequest("epoch must be finite".into()));
    }
    model.config().validate()?;
    let integrator = GaussRadauIntegrator::new(request.integrator)?;
    let width = 6 * (request.states.len() + request.variational.len());
    let (t_start, t_end) = (request.t_start, request.t_end);

    log::info!("Propagating from epoch JD {epoch} over [{t_start}, {t_end}]");

    // first leg without output, its last state seeds the output leg; its store is always
    // sized automatically
    let lead_in = |model: &mut ForceModel, target: JulianDate| -> Result<(PropagationRequest, ExitStatus), EphemForcesError> {
        let mut lead = request.clone();
        lead.max_samples = None;
        let leg = run_leg(model, &integrator, &lead, epoch, target)?;
        let mut next = request.clone();
        let n = request.states.len();
        next.states = leg.last[..n].to_vec();
        for (seed, state) in next.variational.iter_mut().zip(&leg.last[n..]) {
            seed.state = *state;
        }
        Ok((next, leg.status))
    };

    if t_start == t_end {
        let (at_start, status) = lead_in(model, t_start)?;
        if status != ExitStatus::Success {
            return Ok(assemble(model, &request, empty_leg(), status));
        }
        let leg = Leg {
            times: vec![t_start],
            states: at_start
                .states
                .iter()
                .chain(at_start.variational.iter().map(|s| &s.state))
                .flatten()
                .copied()
                .collect(),
            status,
            last: Vec::new(),
        };
        return Ok(assemble(model, &request, leg, status));
    }

    let f = (epoch - t_start) / (t_end - t_start);
    let (leg, status) = if f <= 0.0 {
        let (at_start, lead_status) = lead_in(model, t_start)?;
        if lead_status != ExitStatus::Success {
            return Ok(assemble(model, &request, empty_leg(), lead_status));
        }
        let leg = run_leg(model, &integrator, &at_start, t_start, t_end)?;
        let status = leg.status;
        (leg, status)
    } else if f >= 1.0 {
        let (at_end, lead_status) = lead_in(model, t_end)?;
        if lead_status != ExitStatus::Success {
            return Ok(assemble(model, &request, empty_leg(), lead_status));
        }
        let leg = run_leg(model, &integrator, &at_end, t_end, t_start)?.reversed(width);
        let status = leg.status;
        (leg, status)
    } else {
        let (to_start, to_end) = split_capacity(&request, f);
        let backward = run_leg(model, &integrator, &to_start, epoch, t_start)?
            .reversed(width)
            .drop_last(width);
        let forward = run_leg(model, &integrator, &to_end, epoch, t_end)?;
        let status = backward.status.worst(forward.status);
        let mut leg = backward;
        leg.times.extend(forward.times);
        leg.states.extend(forward.states);
        (leg, status)
    };

    let result = assemble(model, &request, leg, status);
    log::info!("Propagation finished: {} samples, status {}", result.n_out, result.status.code());
    Ok(result)
}

/// Requests of the two legs around an inner epoch. A caller capacity is shared in proportion to
/// the fraction `f` of the interval before the epoch; the epoch sample is written by both legs
/// and kept once, so the joined output holds at most `max_samples` samples.
fn split_capacity(request: &PropagationRequest, f: f64) -> (PropagationRequest, PropagationRequest) {
    let mut to_start = request.clone();
    let mut to_end = request.clone();
    if let Some(total) = request.max_samples {
        let backward = ((f * (total + 1) as f64).round() as usize).clamp(1, total);
        to_start.max_samples = Some(backward);
        to_end.max_samples = Some(total + 1 - backward);
    }
    (to_start, to_end)
}

fn empty_leg() -> Leg {
    Leg {
        times: Vec::new(),
        states: Vec::new(),
        status: ExitStatus::Success,
        last: Vec::new(),
    }
}
