//! Zonal-harmonic (J2, J4) acceleration of an oblate body.
//!
//! The particle offset `d` from the body center is rotated into the body-equatorial frame
//! ([`PoleFrame`]), where with `r = |d|` and `c² = z²/r²`:
//!
//! ```text
//! J2: a = GM · 3 J2 R² / (2 r⁵) · [ (5c² - 1) x, (5c² - 1) y, (5c² - 3) z ]
//! J4: a = GM · 5 J4 R⁴ / (8 r⁷) · [ (63c⁴ - 42c² + 3) x, (63c⁴ - 42c² + 3) y, (63c⁴ - 70c² + 15) z ]
//! ```
//!
//! The acceleration is rotated back with the transpose and the body-frame Jacobian `J'` becomes
//! `Rᵀ J' R` in the working frame.

use nalgebra::{Matrix3, Vector3};

use crate::{
    force_model::Contribution, frame::PoleFrame, physical_constants::OblateBody,
    variational::StateJacobian,
};

/// Zonal-harmonic field of one body, with its pole frame resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonalHarmonics {
    pub gm: f64,
    /// Equatorial radius (AU)
    pub radius: f64,
    pub j2: f64,
    pub j4: f64,
    pub frame: PoleFrame,
}

impl ZonalHarmonics {
    pub fn from_body(body: &OblateBody) -> Self {
        let (ra, dec) = body.pole_radians();
        ZonalHarmonics {
            gm: body.gm,
            radius: body.radius_au(),
            j2: body.j2,
            j4: body.j4,
            frame: PoleFrame::new(ra, dec),
        }
    }

    /// Acceleration and Jacobian at offset `d` (working frame) from the body center.
    pub fn contribution(&self, d: &Vector3<f64>) -> Contribution {
        let p = self.frame.to_body(d);
        let (mut acc, mut jac) = j2_body_frame(&p, self.gm * self.j2 * self.radius.powi(2));
        if self.j4 != 0.0 {
            let (acc4, jac4) = j4_body_frame(&p, self.gm * self.j4 * self.radius.powi(4));
            acc += acc4;
            jac += jac4;
        }
        Contribution::new(
            self.frame.to_working(&acc),
            StateJacobian::position_only(self.frame.jacobian_to_working(&jac)),
        )
    }
}

/// J2 term in the body frame; `k = GM·J2·R²`.
fn j2_body_frame(p: &Vector3<f64>, k: f64) -> (Vector3<f64>, Matrix3<f64>) {
    let (x, y, z) = (p.x, p.y, p.z);
    let r2 = p.norm_squared();
    let r = r2.sqrt();
    let c2 = z * z / r2;
    let prefac = k * 1.5 / (r2 * r2 * r);

    let fac = 5.0 * c2 - 1.0;
    let acc = Vector3::new(prefac * fac * x, prefac * fac * y, prefac * (5.0 * c2 - 3.0) * z);

    let dxdx = fac - 5.0 * (7.0 * c2 - 1.0) * x * x / r2;
    let dydy = fac - 5.0 * (7.0 * c2 - 1.0) * y * y / r2;
    let dxdy = -5.0 * (7.0 * c2 - 1.0) * x * y / r2;
    let dxdz = -5.0 * (7.0 * c2 - 3.0) * x * z / r2;
    let dydz = -5.0 * (7.0 * c2 - 3.0) * y * z / r2;
    let dzdz = -(35.0 * c2 * c2 - 30.0 * c2 + 3.0);

    #[rustfmt::skip]
    let jac = Matrix3::new(
        dxdx, dxdy, dxdz,
        dxdy, dydy, dydz,
        dxdz, dydz, dzdz,
    ) * prefac;
    (acc, jac)
}

/// J4 term in the body frame; `k = GM·J4·R⁴`.
fn j4_body_frame(p: &Vector3<f64>, k: f64) -> (Vector3<f64>, Matrix3<f64>) {
    let (x, y, z) = (p.x, p.y, p.z);
    let r2 = p.norm_squared();
    let r = r2.sqrt();
    let c2 = z * z / r2;
    let c4 = c2 * c2;
    let prefac = k * 5.0 / (8.0 * r2 * r2 * r2 * r);

    let fac = 63.0 * c4 - 42.0 * c2 + 3.0;
    let facz = 63.0 * c4 - 70.0 * c2 + 15.0;
    let acc = Vector3::new(prefac * fac * x, prefac * fac * y, prefac * facz * z);

    let lateral = 21.0 * (33.0 * c4 - 18.0 * c2 + 1.0);
    let mixed = -21.0 * (33.0 * c4 - 30.0 * c2 + 5.0);

    let dxdx = fac - lateral * x * x / r2;
    let dydy = fac - lateral * y * y / r2;
    let dxdy = -lateral * x * y / r2;
    let dxdz = mixed * x * z / r2;
    let dydz = mixed * y * z / r2;
    let dzdz = -3.0 * (231.0 * c4 * c2 - 315.0 * c4 + 105.0 * c2 - 5.0);

    #[rustfmt::skip]
    let jac = Matrix3::new(
        dxdx, dxdy, dxdz,
        dxdy, dydy, dydz,
        dxdz, dydz, dzdz,
    ) * prefac;
    (acc, jac)
}
