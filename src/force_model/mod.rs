//! # Force model
//!
//! [`ForceModel::evaluate`] computes, for every real particle of a [`ParticleSet`] at one time,
//! the sum of
//!
//! 1. the Newtonian attraction of the 27 catalog perturbers ([`newtonian`]);
//! 2. the J2/J4 zonal harmonics of the Earth and the J2 of the Sun ([`oblateness`]);
//! 3. the empirical radial / transverse / normal acceleration ([`non_grav`]);
//! 4. a post-Newtonian correction, simplified or EIH-PPN ([`relativity`]);
//! 5. in the geocentric frame, the indirect term `-a_earth`.
//!
//! and writes the Jacobian-applied accelerations of the variational particles.
//!
//! ## Evaluation order
//!
//! * The configuration is checked first; a missing light speed or frame aborts the call before
//!   anything is touched.
//! * The whole catalog is queried **once** per call ([`Environment`]), so every term sees the
//!   same perturber snapshot and the same frame offset.
//! * All contributions are computed from the particle positions/velocities before any
//!   acceleration is written. A data error therefore leaves the particle set unchanged.
//!
//! ## Frames
//!
//! In the barycentric frame the particle coordinates are barycentric. In the geocentric frame
//! they are relative to the Earth: the Earth barycentric state is added to every relative vector
//! and the Earth barycentric acceleration is subtracted once, after the direct terms.
//!
//! ## Example
//!
//! ```rust, no_run
//! use std::sync::Arc;
//! use nalgebra::Vector3;
//! use ephem_forces::ephemeris::{EphemerisProvider, EphemerisSources};
//! use ephem_forces::force_model::{ForceModel, ForceModelConfig, Frame};
//! use ephem_forces::particles::ParticleSet;
//! use ephem_forces::physical_constants::PhysicalConstants;
//!
//! let provider = Arc::new(EphemerisProvider::new(
//!     EphemerisSources::from_env("de441.csv"),
//!     PhysicalConstants::de441(),
//! ));
//! let mut model = ForceModel::new(provider, ForceModelConfig::standard(Frame::Barycentric));
//!
//! let mut particles = ParticleSet::new();
//! particles.add_real(Vector3::new(2.5, 0.1, 0.02), Vector3::new(-0.001, 0.011, 0.0));
//! model.evaluate(&mut particles, 2_460_000.5).unwrap();
//! ```

pub mod newtonian;
pub mod non_grav;
pub mod oblateness;
pub mod relativity;

use std::fmt;
use std::ops::{Add, AddAssign};
use std::sync::Arc;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    bodies::MajorBody,
    constants::{JulianDate, N_MAJOR_BODIES, VLIGHT_AU},
    diagnostics::MessageLog,
    ephem_forces_errors::{EphemForcesError, ErrorKind},
    ephemeris::{BodyState, EphemerisProvider, KinematicState},
    particles::{NonGravParams, ParticleSet},
    variational::{StateJacobian, VariationalMatrixBuilder},
};
use oblateness::ZonalHarmonics;
use relativity::MajorBodyField;

/// Coordinate origin of the particle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Barycentric,
    /// Particle states relative to the Earth center
    Geocentric,
}

/// Post-Newtonian correction applied on top of the Newtonian terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RelativityModel {
    Disabled,
    /// Heliocentric one-body correction with an iterated intermediate velocity
    Simplified,
    /// Einstein–Infeld–Hoffmann equations with the PPN parameters β and γ
    EihPpn { beta: f64, gamma: f64 },
}

impl Default for RelativityModel {
    fn default() -> Self {
        RelativityModel::EihPpn {
            beta: 1.0,
            gamma: 1.0,
        }
    }
}

/// Switches of the non-relativistic terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceTerms {
    pub newtonian: bool,
    pub earth_oblateness: bool,
    pub solar_oblateness: bool,
    pub non_gravitational: bool,
}

impl Default for ForceTerms {
    fn default() -> Self {
        ForceTerms {
            newtonian: true,
            earth_oblateness: true,
            solar_oblateness: true,
            non_gravitational: true,
        }
    }
}

impl ForceTerms {
    /// Only the point-mass sum.
    pub fn newtonian_only() -> Self {
        ForceTerms {
            newtonian: true,
            earth_oblateness: false,
            solar_oblateness: false,
            non_gravitational: false,
        }
    }
}

/// Configuration of a [`ForceModel`].
///
/// `light_speed` and `frame` have no default: they must be set explicitly, either through the
/// builder, [`ForceModelConfig::standard`] or the serialized form, and are checked by
/// [`ForceModelConfig::validate`] at every evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ForceModelConfig {
    /// Speed of light (AU/day)
    #[serde(default)]
    pub light_speed: Option<f64>,
    #[serde(default)]
    pub frame: Option<Frame>,
    #[serde(default)]
    pub terms: ForceTerms,
    #[serde(default)]
    pub relativity: RelativityModel,
}

/// The mandatory part of a validated configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedConfig {
    pub light_speed: f64,
    pub frame: Frame,
}

impl ForceModelConfig {
    pub fn builder() -> ForceModelConfigBuilder {
        ForceModelConfigBuilder::new()
    }

    /// Every term, EIH-PPN relativity with β = γ = 1 and the IAU light speed.
    pub fn standard(frame: Frame) -> Self {
        ForceModelConfig {
            light_speed: Some(VLIGHT_AU),
            frame: Some(frame),
            terms: ForceTerms::default(),
            relativity: RelativityModel::default(),
        }
    }

    /// Point-mass sum only.
    pub fn newtonian(frame: Frame) -> Self {
        ForceModelConfig {
            light_speed: Some(VLIGHT_AU),
            frame: Some(frame),
            terms: ForceTerms::newtonian_only(),
            relativity: RelativityModel::Disabled,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, EphemForcesError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check the mandatory entries.
    ///
    /// Return
    /// ----------
    /// * The light speed and the frame, or [`EphemForcesError::MissingConfiguration`] /
    ///   [`EphemForcesError::InvalidConfiguration`].
    pub fn validate(&self) -> Result<ResolvedConfig, EphemForcesError> {
        let light_speed = self
            .light_speed
            .ok_or(EphemForcesError::MissingConfiguration("light speed"))?;
        let frame = self
            .frame
            .ok_or(EphemForcesError::MissingConfiguration("frame selector"))?;
        check_light_speed(light_speed)?;
        check_relativity(&self.relativity)?;
        Ok(ResolvedConfig { light_speed, frame })
    }
}

fn check_light_speed(c: f64) -> Result<(), EphemForcesError> {
    if c.is_finite() && c > 0.0 {
        Ok(())
    } else {
        Err(EphemForcesError::InvalidConfiguration(format!(
            "light speed must be finite and > 0 (got {c})"
        )))
    }
}

fn check_relativity(model: &RelativityModel) -> Result<(), EphemForcesError> {
    match model {
        RelativityModel::EihPpn { beta, gamma } if !(beta.is_finite() && gamma.is_finite()) => {
            Err(EphemForcesError::InvalidConfiguration(
                "PPN parameters must be finite".into(),
            ))
        }
        _ => Ok(()),
    }
}

/// Builder for [`ForceModelConfig`].
///
/// Light speed and frame may be left unset; [`ForceModelConfigBuilder::build`] only rejects
/// values that are set but invalid.
#[derive(Debug, Clone, Default)]
pub struct ForceModelConfigBuilder {
    config: ForceModelConfig,
}

impl ForceModelConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn light_speed(mut self, v: f64) -> Self {
        self.config.light_speed = Some(v);
        self
    }
    pub fn frame(mut self, v: Frame) -> Self {
        self.config.frame = Some(v);
        self
    }
    pub fn newtonian(mut self, on: bool) -> Self {
        self.config.terms.newtonian = on;
        self
    }
    pub fn earth_oblateness(mut self, on: bool) -> Self {
        self.config.terms.earth_oblateness = on;
        self
    }
    pub fn solar_oblateness(mut self, on: bool) -> Self {
        self.config.terms.solar_oblateness = on;
        self
    }
    pub fn non_gravitational(mut self, on: bool) -> Self {
        self.config.terms.non_gravitational = on;
        self
    }
    pub fn relativity(mut self, v: RelativityModel) -> Self {
        self.config.relativity = v;
        self
    }

    pub fn build(self) -> Result<ForceModelConfig, EphemForcesError> {
        if let Some(c) = self.config.light_speed {
            check_light_speed(c)?;
        }
        check_relativity(&self.config.relativity)?;
        Ok(self.config)
    }
}

/// Acceleration of one force term on one particle and its Jacobian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub acceleration: Vector3<f64>,
    pub jacobian: StateJacobian,
}

impl Contribution {
    pub fn new(acceleration: Vector3<f64>, jacobian: StateJacobian) -> Self {
        Contribution {
            acceleration,
            jacobian,
        }
    }

    pub fn zero() -> Self {
        Contribution::new(Vector3::zeros(), StateJacobian::zeros())
    }
}

impl Add for Contribution {
    type Output = Contribution;

    fn add(self, rhs: Contribution) -> Contribution {
        Contribution::new(
            self.acceleration + rhs.acceleration,
            self.jacobian + rhs.jacobian,
        )
    }
}

impl AddAssign for Contribution {
    fn add_assign(&mut self, rhs: Contribution) {
        self.acceleration += rhs.acceleration;
        self.jacobian += rhs.jacobian;
    }
}

/// Label of a force term in a [`ForceModel::contributions`] breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForceTerm {
    Newtonian,
    EarthOblateness,
    SolarOblateness,
    NonGravitational,
    Relativity,
    /// `-a_earth` of the geocentric frame
    Indirect,
}

impl fmt::Display for ForceTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForceTerm::Newtonian => "newtonian",
            ForceTerm::EarthOblateness => "earth oblateness",
            ForceTerm::SolarOblateness => "solar oblateness",
            ForceTerm::NonGravitational => "non-gravitational",
            ForceTerm::Relativity => "relativity",
            ForceTerm::Indirect => "indirect",
        };
        f.write_str(name)
    }
}

/// Perturber snapshot shared by every particle of one evaluation.
#[derive(Debug, Clone)]
pub struct Environment {
    pub time: JulianDate,
    /// The 27 catalog bodies, in index order
    pub bodies: Vec<BodyState>,
    /// Barycentric state of the frame origin (zero in the barycentric frame)
    pub offset: KinematicState,
    /// Mutual field of the major bodies, only filled for EIH-PPN
    pub fields: Vec<MajorBodyField>,
}

impl Environment {
    fn major(&self, body: MajorBody) -> KinematicState {
        let b = &self.bodies[body.index()];
        KinematicState {
            position: b.position,
            velocity: b.velocity.unwrap_or_else(Vector3::zeros),
            acceleration: b.acceleration.unwrap_or_else(Vector3::zeros),
        }
    }
}

/// Force model bound to an ephemeris provider.
#[derive(Debug)]
pub struct ForceModel {
    provider: Arc<EphemerisProvider>,
    config: ForceModelConfig,
    earth: ZonalHarmonics,
    sun: ZonalHarmonics,
    messages: MessageLog,
}

impl ForceModel {
    /// Bind a configuration to a provider. The configuration is validated at evaluation time.
    pub fn new(provider: Arc<EphemerisProvider>, config: ForceModelConfig) -> Self {
        let constants = provider.constants();
        let earth = ZonalHarmonics::from_body(&constants.earth);
        let sun = ZonalHarmonics::from_body(&constants.sun);
        ForceModel {
            provider,
            config,
            earth,
            sun,
            messages: MessageLog::new(),
        }
    }

    pub fn config(&self) -> &ForceModelConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<EphemerisProvider> {
        &self.provider
    }

    /// Warnings and fatal messages retained so far.
    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    pub fn messages_mut(&mut self) -> &mut MessageLog {
        &mut self.messages
    }

    /// Query the catalog once for time `t`.
    ///
    /// Arguments
    /// -----------------
    /// * `t`: Julian date (TDB).
    /// * `frame`: frame of the particle states, selects the offset.
    ///
    /// Return
    /// ----------
    /// * The [`Environment`] shared by all particles, or the data error of the first failing
    ///   query.
    pub fn environment(&self, t: JulianDate, frame: Frame) -> Result<Environment, EphemForcesError> {
        let bodies = self.provider.snapshot(t)?;
        let mut env = Environment {
            time: t,
            bodies,
            offset: KinematicState {
                position: Vector3::zeros(),
                velocity: Vector3::zeros(),
                acceleration: Vector3::zeros(),
            },
            fields: Vec::new(),
        };
        if frame == Frame::Geocentric {
            env.offset = env.major(MajorBody::Earth);
        }
        if let RelativityModel::EihPpn { .. } = self.config.relativity {
            env.fields = relativity::major_body_fields(&env.bodies[..N_MAJOR_BODIES]);
        }
        Ok(env)
    }

    /// Per-term contributions for one particle in a given environment.
    ///
    /// The returned flag is `false` when the simplified relativity iteration did not converge.
    fn particle_terms(
        &self,
        env: &Environment,
        resolved: &ResolvedConfig,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
        non_grav: &NonGravParams,
    ) -> (Vec<(ForceTerm, Contribution)>, bool) {
        let terms = &self.config.terms;
        let mut out = Vec::with_capacity(6);
        let mut converged = true;

        let r = position + env.offset.position;
        let v = velocity + env.offset.velocity;
        let sun = env.major(MajorBody::Sun);
        let earth = env.major(MajorBody::Earth);

        if terms.newtonian {
            out.push((
                ForceTerm::Newtonian,
                newtonian::perturber_sum(&r, &env.bodies),
            ));
        }
        if terms.earth_oblateness {
            out.push((
                ForceTerm::EarthOblateness,
                self.earth.contribution(&(r - earth.position)),
            ));
        }
        if terms.solar_oblateness {
            out.push((
                ForceTerm::SolarOblateness,
                self.sun.contribution(&(r - sun.position)),
            ));
        }
        if terms.non_gravitational && !non_grav.is_zero() {
            out.push((
                ForceTerm::NonGravitational,
                non_grav::radial_transverse_normal(
                    &(r - sun.position),
                    &(v - sun.velocity),
                    non_grav,
                ),
            ));
        }
        match self.config.relativity {
            RelativityModel::Disabled => {}
            RelativityModel::Simplified => {
                let (c, ok) = relativity::simplified(
                    &(r - sun.position),
                    &(v - sun.velocity),
                    env.bodies[MajorBody::Sun.index()].gm,
                    resolved.light_speed,
                );
                converged = ok;
                out.push((ForceTerm::Relativity, c));
            }
            RelativityModel::EihPpn { beta, gamma } => {
                out.push((
                    ForceTerm::Relativity,
                    relativity::eih_ppn(&r, &v, &env.fields, beta, gamma, resolved.light_speed),
                ));
            }
        }
        if resolved.frame == Frame::Geocentric {
            out.push((
                ForceTerm::Indirect,
                Contribution::new(-env.offset.acceleration, StateJacobian::zeros()),
            ));
        }
        (out, converged)
    }

    /// Term-by-term breakdown for a single particle state.
    ///
    /// Arguments
    /// -----------------
    /// * `position`, `velocity`: particle state in the configured frame.
    /// * `non_grav`: the particle's non-gravitational coefficients.
    /// * `t`: Julian date (TDB).
    ///
    /// Return
    /// ----------
    /// * One `(term, contribution)` per active term, in summation order. Their sum is the
    ///   acceleration and Jacobian [`ForceModel::evaluate`] uses for that state.
    pub fn contributions(
        &self,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
        non_grav: &NonGravParams,
        t: JulianDate,
    ) -> Result<Vec<(ForceTerm, Contribution)>, EphemForcesError> {
        let resolved = self.config.validate()?;
        let env = self.environment(t, resolved.frame)?;
        let (terms, _) = self.particle_terms(&env, &resolved, position, velocity, non_grav);
        Ok(terms)
    }

    /// Total acceleration and Jacobian for a single particle state.
    pub fn total(
        &self,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
        non_grav: &NonGravParams,
        t: JulianDate,
    ) -> Result<Contribution, EphemForcesError> {
        Ok(self
            .contributions(position, velocity, non_grav, t)?
            .into_iter()
            .fold(Contribution::zero(), |acc, (_, c)| acc + c))
    }

    /// Evaluate the accelerations of every particle at time `t`.
    ///
    /// Real particles receive the sum of the active force terms, variational particles the
    /// parent's Jacobian applied to their own state. Accelerations are overwritten, so two calls
    /// with the same state and time give identical results.
    ///
    /// Arguments
    /// -----------------
    /// * `particles`: the particle set, in the configured frame.
    /// * `t`: Julian date (TDB).
    ///
    /// Return
    /// ----------
    /// * `Ok(())` on success.
    /// * A configuration error, raised before any query or write.
    /// * A data error from the ephemeris provider. It is recorded in the message log and the
    ///   particle set is left unchanged.
    ///
    /// See also
    /// ------------
    /// * [`ForceModel::contributions`] – Same computation for one particle, term by term.
    /// * [`VariationalMatrixBuilder::propagate`] – Variational accelerations.
    pub fn evaluate(&mut self, particles: &mut ParticleSet, t: JulianDate) -> Result<(), EphemForcesError> {
        let resolved = self.config.validate()?;

        let env = match self.environment(t, resolved.frame) {
            Ok(env) => env,
            Err(e) => {
                if e.kind() == ErrorKind::Data {
                    self.messages
                        .error(format!("force evaluation at JD {t} aborted: {e}"));
                }
                return Err(e);
            }
        };

        let mut results = Vec::with_capacity(particles.n_real());
        let mut stalled = Vec::new();
        for index in particles.real_indices() {
            let Some(p) = particles.get(index) else {
                continue;
            };
            let (terms, converged) =
                self.particle_terms(&env, &resolved, &p.position, &p.velocity, p.non_grav());
            if !converged {
                stalled.push(index);
            }
            let total = terms
                .into_iter()
                .fold(Contribution::zero(), |acc, (_, c)| acc + c);
            results.push((index, total));
        }

        for index in stalled {
            self.messages.warn(format!(
                "post-Newtonian velocity iteration did not converge for particle {index} at JD {t}"
            ));
        }

        particles.reset_accelerations();
        let mut builder = VariationalMatrixBuilder::new();
        for (index, total) in results {
            if let Some(p) = particles.get_mut(index) {
                p.acceleration = total.acceleration;
            }
            builder.accumulate(index, total.jacobian);
        }
        builder.propagate(particles);
        Ok(())
    }
}
