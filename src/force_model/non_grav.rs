//! Empirical non-gravitational acceleration (radial / transverse / normal).
//!
//! With `d`, `v` the heliocentric position and velocity of the particle:
//!
//! ```text
//! h = d × v                 (orbit normal)
//! t = h × d                 (transverse, in the orbit plane)
//! g = 1 / |d|²
//! a = A1 g d̂ + A2 g t̂ + A3 g ĥ
//! ```
//!
//! The transverse and normal directions are undefined for rectilinear motion; the corresponding
//! parts are then dropped.

use nalgebra::{Matrix3, Vector3};

use crate::{force_model::Contribution, particles::NonGravParams, variational::StateJacobian};

/// Derivative of `x / |x|` with respect to `x`.
fn unit_derivative(unit: &Vector3<f64>, norm: f64) -> Matrix3<f64> {
    (Matrix3::identity() - unit * unit.transpose()) / norm
}

/// Non-gravitational acceleration and its Jacobian.
///
/// Arguments
/// -----------------
/// * `d`: heliocentric position of the particle (AU).
/// * `v`: heliocentric velocity of the particle (AU/day).
/// * `params`: the A1, A2, A3 coefficients.
///
/// Return
/// ----------
/// * The acceleration and `[∂a/∂r | ∂a/∂v]`; zero when every coefficient is zero.
pub fn radial_transverse_normal(
    d: &Vector3<f64>,
    v: &Vector3<f64>,
    params: &NonGravParams,
) -> Contribution {
    if params.is_zero() {
        return Contribution::zero();
    }

    let r2 = d.norm_squared();
    let r = r2.sqrt();
    let g = 1.0 / r2;
    let grad_g = -2.0 / (r2 * r2) * d;

    let radial = d / r;
    let mut acceleration = params.a1 * g * radial;
    let mut d_position =
        params.a1 * (radial * grad_g.transpose() + g * unit_derivative(&radial, r));
    let mut d_velocity = Matrix3::zeros();

    let h = d.cross(v);
    let t = h.cross(d);

    let t_norm = t.norm();
    if params.a2 != 0.0 && t_norm > 0.0 {
        let transverse = t / t_norm;
        let dt_dd = 2.0 * v * d.transpose() - d * v.transpose() - d.dot(v) * Matrix3::identity();
        let dt_dv = r2 * Matrix3::identity() - d * d.transpose();
        let du = unit_derivative(&transverse, t_norm);

        acceleration += params.a2 * g * transverse;
        d_position += params.a2 * (transverse * grad_g.transpose() + g * du * dt_dd);
        d_velocity += params.a2 * g * du * dt_dv;
    }

    let h_norm = h.norm();
    if params.a3 != 0.0 && h_norm > 0.0 {
        let normal = h / h_norm;
        let du = unit_derivative(&normal, h_norm);

        acceleration += params.a3 * g * normal;
        d_position += params.a3 * (normal * grad_g.transpose() - g * du * v.cross_matrix());
        d_velocity += params.a3 * g * du * d.cross_matrix();
    }

    Contribution::new(acceleration, StateJacobian::new(d_position, d_velocity))
}
