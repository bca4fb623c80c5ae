//! # Variational equations
//!
//! The acceleration of a variational particle is the linearization of the force model around its
//! parent's state, applied to the variational state:
//!
//! ```text
//! δa = ∂a/∂r · δr + ∂a/∂v · δv
//! ```
//!
//! Every force term produces a [`StateJacobian`] (its `∂a/∂r` and `∂a/∂v` blocks, the latter zero
//! for position-only terms) for each real particle. The [`VariationalMatrixBuilder`] sums the
//! blocks of all active terms per real particle and applies the total to each variational
//! particle listed for that parent in the [`VariationalLinks`]. Real particles never couple to
//! each other.

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use nalgebra::{Matrix3, SMatrix, Vector3};

use crate::particles::ParticleSet;

/// Partial derivatives of an acceleration with respect to position and velocity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateJacobian {
    /// ∂a/∂r
    pub d_position: Matrix3<f64>,
    /// ∂a/∂v
    pub d_velocity: Matrix3<f64>,
}

impl Default for StateJacobian {
    fn default() -> Self {
        Self::zeros()
    }
}

impl StateJacobian {
    pub fn zeros() -> Self {
        StateJacobian {
            d_position: Matrix3::zeros(),
            d_velocity: Matrix3::zeros(),
        }
    }

    pub fn new(d_position: Matrix3<f64>, d_velocity: Matrix3<f64>) -> Self {
        StateJacobian {
            d_position,
            d_velocity,
        }
    }

    /// Jacobian of a term that does not depend on velocity.
    pub fn position_only(d_position: Matrix3<f64>) -> Self {
        StateJacobian {
            d_position,
            d_velocity: Matrix3::zeros(),
        }
    }

    /// `∂a/∂r · δr + ∂a/∂v · δv`
    pub fn apply(&self, delta_position: &Vector3<f64>, delta_velocity: &Vector3<f64>) -> Vector3<f64> {
        self.d_position * delta_position + self.d_velocity * delta_velocity
    }

    /// The 3×6 block `[∂a/∂r | ∂a/∂v]`.
    pub fn as_matrix(&self) -> SMatrix<f64, 3, 6> {
        let mut m = SMatrix::<f64, 3, 6>::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&self.d_position);
        m.fixed_view_mut::<3, 3>(0, 3).copy_from(&self.d_velocity);
        m
    }
}

impl Add for StateJacobian {
    type Output = StateJacobian;

    fn add(self, rhs: StateJacobian) -> StateJacobian {
        StateJacobian {
            d_position: self.d_position + rhs.d_position,
            d_velocity: self.d_velocity + rhs.d_velocity,
        }
    }
}

impl AddAssign for StateJacobian {
    fn add_assign(&mut self, rhs: StateJacobian) {
        self.d_position += rhs.d_position;
        self.d_velocity += rhs.d_velocity;
    }
}

/// Real-particle index → indices of its variational particles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariationalLinks {
    children: BTreeMap<usize, Vec<usize>>,
}

impl VariationalLinks {
    pub(crate) fn register_real(&mut self, real: usize) {
        self.children.entry(real).or_default();
    }

    pub(crate) fn link(&mut self, parent: usize, variational: usize) {
        self.children.entry(parent).or_default().push(variational);
    }

    /// Variational particles attached to `real` (empty when there are none).
    pub fn children(&self, real: usize) -> &[usize] {
        self.children.get(&real).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn n_variational(&self) -> usize {
        self.children.values().map(Vec::len).sum()
    }
}

/// Accumulates per-term Jacobians and applies them to the variational particles.
#[derive(Debug, Clone, Default)]
pub struct VariationalMatrixBuilder {
    jacobians: BTreeMap<usize, StateJacobian>,
}

impl VariationalMatrixBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the Jacobian of one force term for the real particle `real`.
    pub fn accumulate(&mut self, real: usize, jacobian: StateJacobian) {
        *self.jacobians.entry(real).or_default() += jacobian;
    }

    /// Total Jacobian accumulated so far for `real`.
    pub fn jacobian(&self, real: usize) -> StateJacobian {
        self.jacobians.get(&real).copied().unwrap_or_default()
    }

    /// Write `J · [δr; δv]` into the acceleration of every variational particle.
    ///
    /// Variational accelerations are overwritten, not accumulated, so the call is idempotent for
    /// a given set of Jacobians.
    ///
    /// Arguments
    /// -----------------
    /// * `particles`: particle set whose variational particles receive their acceleration.
    ///
    /// See also
    /// ------------
    /// * [`StateJacobian::apply`] – Product applied to each variational state.
    pub fn propagate(&self, particles: &mut ParticleSet) {
        let set: &ParticleSet = particles;
        let updates: Vec<(usize, Vector3<f64>)> = self
            .jacobians
            .iter()
            .flat_map(move |(&real, jac)| {
                set.links().children(real).iter().filter_map(move |&child| {
                    set.get(child)
                        .map(|p| (child, jac.apply(&p.position, &p.velocity)))
                })
            })
            .collect();

        for (child, acceleration) in updates {
            if let Some(p) = particles.get_mut(child) {
                p.acceleration = acceleration;
            }
        }
    }
}
