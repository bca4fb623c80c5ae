//! # Test particles and their variational companions
//!
//! A [`ParticleSet`] holds the massless test particles of a run. Two kinds coexist:
//!
//! * **real** particles – trajectories of interest, with optional empirical non-gravitational
//!   coefficients ([`NonGravParams`]);
//! * **variational** particles – tangent-space companions of exactly one real particle. Their
//!   position/velocity are sensitivity directions; their acceleration is the force-model Jacobian
//!   of the parent applied to that direction.
//!
//! The association from a real particle to its variational companions is recorded in
//! [`VariationalLinks`] as particles are added and never changes afterwards.

use std::ops::Deref;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{ephem_forces_errors::EphemForcesError, variational::VariationalLinks};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleKind {
    Real,
    /// Sensitivity direction of the real particle `parent`
    Variational { parent: usize },
}

/// Coefficients of the empirical radial / transverse / normal acceleration (AU/day² at 1 AU).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NonGravParams {
    pub a1: f64,
    pub a2: f64,
    pub a3: f64,
}

impl NonGravParams {
    pub fn new(a1: f64, a2: f64, a3: f64) -> Self {
        NonGravParams { a1, a2, a3 }
    }

    pub fn is_zero(&self) -> bool {
        self.a1 == 0.0 && self.a2 == 0.0 && self.a3 == 0.0
    }
}

/// Mutable part of a particle: what the integrator and the force model write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    /// AU
    pub position: Vector3<f64>,
    /// AU/day
    pub velocity: Vector3<f64>,
    /// AU/day², overwritten by every force evaluation
    pub acceleration: Vector3<f64>,
}

impl Motion {
    fn at(position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Motion {
            position,
            velocity,
            acceleration: Vector3::zeros(),
        }
    }
}

/// A particle of a [`ParticleSet`]. Its kind and parent are fixed at insertion; only its
/// [`Motion`] is reachable mutably.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    motion: Motion,
    kind: ParticleKind,
    non_grav: NonGravParams,
}

impl Deref for Particle {
    type Target = Motion;

    fn deref(&self) -> &Motion {
        &self.motion
    }
}

impl Particle {
    pub fn kind(&self) -> ParticleKind {
        self.kind
    }

    /// Parent index of a variational particle, `None` for a real one.
    pub fn parent(&self) -> Option<usize> {
        match self.kind {
            ParticleKind::Real => None,
            ParticleKind::Variational { parent } => Some(parent),
        }
    }

    /// Non-gravitational coefficients, zero unless set with [`ParticleSet::set_non_grav`].
    pub fn non_grav(&self) -> &NonGravParams {
        &self.non_grav
    }

    pub fn is_real(&self) -> bool {
        self.kind == ParticleKind::Real
    }

    /// Position and velocity as a 6-vector `[x, y, z, vx, vy, vz]`.
    pub fn state(&self) -> [f64; 6] {
        [
            self.position.x,
            self.position.y,
            self.position.z,
            self.velocity.x,
            self.velocity.y,
            self.velocity.z,
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParticleSet {
    particles: Vec<Particle>,
    links: VariationalLinks,
}

impl ParticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a real test particle and return its index.
    pub fn add_real(&mut self, position: Vector3<f64>, velocity: Vector3<f64>) -> usize {
        self.particles.push(Particle {
            motion: Motion::at(position, velocity),
            kind: ParticleKind::Real,
            non_grav: NonGravParams::default(),
        });
        let index = self.particles.len() - 1;
        self.links.register_real(index);
        index
    }

    /// Add a variational particle attached to the real particle `parent`.
    ///
    /// Arguments
    /// -----------------
    /// * `parent`: index of a real particle already in the set.
    /// * `position`, `velocity`: initial sensitivity direction.
    ///
    /// Return
    /// ----------
    /// * The index of the new particle, [`EphemForcesError::ParticleNotFound`] when `parent` does
    ///   not exist or [`EphemForcesError::VariationalParent`] when it is itself variational.
    pub fn add_variational(
        &mut self,
        parent: usize,
        position: Vector3<f64>,
        velocity: Vector3<f64>,
    ) -> Result<usize, EphemForcesError> {
        let owner = self
            .particles
            .get(parent)
            .ok_or(EphemForcesError::ParticleNotFound(parent))?;
        if !owner.is_real() {
            return Err(EphemForcesError::VariationalParent(parent));
        }

        self.particles.push(Particle {
            motion: Motion::at(position, velocity),
            kind: ParticleKind::Variational { parent },
            non_grav: NonGravParams::default(),
        });
        let index = self.particles.len() - 1;
        self.links.link(parent, index);
        Ok(index)
    }

    /// Attach non-gravitational coefficients to a real particle.
    pub fn set_non_grav(&mut self, index: usize, params: NonGravParams) -> Result<(), EphemForcesError> {
        let particle = self
            .particles
            .get_mut(index)
            .ok_or(EphemForcesError::ParticleNotFound(index))?;
        if !particle.is_real() {
            return Err(EphemForcesError::VariationalParent(index));
        }
        particle.non_grav = params;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn n_real(&self) -> usize {
        self.particles.iter().filter(|p| p.is_real()).count()
    }

    pub fn get(&self, index: usize) -> Option<&Particle> {
        self.particles.get(index)
    }

    /// Mutable access to the motion of particle `index`; its kind stays out of reach.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Motion> {
        self.particles.get_mut(index).map(|p| &mut p.motion)
    }

    pub fn as_slice(&self) -> &[Particle] {
        &self.particles
    }

    /// Motions of every particle, in index order.
    pub fn motions_mut(&mut self) -> impl Iterator<Item = &mut Motion> {
        self.particles.iter_mut().map(|p| &mut p.motion)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }

    /// Indices of the real particles, in insertion order.
    pub fn real_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.particles
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_real())
            .map(|(i, _)| i)
    }

    pub fn links(&self) -> &VariationalLinks {
        &self.links
    }

    /// Set every acceleration to zero.
    pub fn reset_accelerations(&mut self) {
        for m in self.motions_mut() {
            m.acceleration = Vector3::zeros();
        }
    }

    /// Flatten the position/velocity of every particle, six values per particle.
    pub fn flat_states(&self) -> Vec<f64> {
        self.particles.iter().flat_map(|p| p.state()).collect()
    }
}
