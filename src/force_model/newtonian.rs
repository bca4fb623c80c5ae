//! Point-mass attraction of the perturber catalog.
//!
//! For a particle at barycentric position `p` and a perturber of parameter `GM` at `r_k`,
//! with `d = p - r_k`:
//!
//! ```text
//! a      = -GM · d / |d|³
//! ∂a/∂p  =  GM · (3 d dᵀ / |d|⁵ - I / |d|³)
//! ```

use nalgebra::{Matrix3, Vector3};

use crate::{ephemeris::BodyState, force_model::Contribution, variational::StateJacobian};

/// Attraction of a single point mass on a particle at offset `d` from it.
pub fn point_mass(d: &Vector3<f64>, gm: f64) -> Contribution {
    let r2 = d.norm_squared();
    let r = r2.sqrt();
    let r3 = r2 * r;
    let r5 = r3 * r2;

    let acceleration = -gm / r3 * d;
    let d_position = (d * d.transpose()) * (3.0 * gm / r5) - Matrix3::identity() * (gm / r3);
    Contribution::new(acceleration, StateJacobian::position_only(d_position))
}

/// Sum of the point-mass attractions of `bodies` on a particle at barycentric `position`.
///
/// Bodies are summed in slice order, which for a catalog snapshot is the catalog index order.
pub fn perturber_sum(position: &Vector3<f64>, bodies: &[BodyState]) -> Contribution {
    bodies
        .iter()
        .fold(Contribution::zero(), |acc, body| {
            acc + point_mass(&(position - body.position), body.gm)
        })
}

#[cfg(test)]
mod newtonian_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_square() {
        let c = point_mass(&Vector3::new(2.0, 0.0, 0.0), 4.0);
        assert_relative_eq!(c.acceleration, Vector3::new(-1.0, 0.0, 0.0));
        // radial stiffness 2GM/r³, transverse -GM/r³
        assert_relative_eq!(c.jacobian.d_position[(0, 0)], 1.0);
        assert_relative_eq!(c.jacobian.d_position[(1, 1)], -0.5);
        assert_eq!(c.jacobian.d_velocity, Matrix3::zeros());
    }
}
