//! # Body-equatorial frames defined by a fixed pole
//!
//! The zonal-harmonic terms are evaluated in the equatorial frame of the oblate body, whose z
//! axis points along the body's spin pole. A [`PoleFrame`] is built once from the pole right
//! ascension `α` and declination `δ` (working-frame angles) and rotates vectors and Jacobians
//! between the two frames:
//!
//! ```text
//! x_body = (-sin α,        cos α,       0    ) · x
//! y_body = (-cos α sin δ, -sin α sin δ, cos δ) · x
//! z_body = ( cos α cos δ,  sin α cos δ, sin δ) · x
//! ```
//!
//! The matrix is orthonormal, so the inverse rotation is its transpose and a round trip returns
//! the original vector to floating-point precision.

use nalgebra::{Matrix3, Rotation3, Vector3};

use crate::constants::{Degree, Radian, RADEG};

/// Coordinate axis of an elementary rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Elementary rotation of angle `alpha` (radians) about `axis`.
///
/// The rotation is applied to the vector in a fixed frame: `x' = R · x`. A change of basis of
/// angle `θ` is therefore `rotmt(-θ, axis)`.
pub fn rotmt(alpha: Radian, axis: Axis) -> Matrix3<f64> {
    let axis = match axis {
        Axis::X => Vector3::x_axis(),
        Axis::Y => Vector3::y_axis(),
        Axis::Z => Vector3::z_axis(),
    };
    Rotation3::from_axis_angle(&axis, alpha).into()
}

/// Rotation between the working inertial frame and a body-equatorial frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoleFrame {
    /// working → body
    to_body: Matrix3<f64>,
}

impl PoleFrame {
    /// Frame whose z axis points along the pole (`ra`, `dec`, radians).
    pub fn new(ra: Radian, dec: Radian) -> Self {
        use std::f64::consts::FRAC_PI_2;
        // node on the working equator first, then tilt the pole into z
        let to_body = rotmt(-(FRAC_PI_2 - dec), Axis::X) * rotmt(-(FRAC_PI_2 + ra), Axis::Z);
        PoleFrame { to_body }
    }

    pub fn from_degrees(ra: Degree, dec: Degree) -> Self {
        Self::new(ra * RADEG, dec * RADEG)
    }

    /// Pole direction in the working frame.
    pub fn pole(&self) -> Vector3<f64> {
        self.to_body.row(2).transpose()
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.to_body
    }

    pub fn to_body(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.to_body * v
    }

    pub fn to_working(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.to_body.tr_mul(v)
    }

    /// Express a body-frame Jacobian `J'` in the working frame: `Rᵀ J' R`.
    pub fn jacobian_to_working(&self, jacobian: &Matrix3<f64>) -> Matrix3<f64> {
        self.to_body.transpose() * jacobian * self.to_body
    }
}
