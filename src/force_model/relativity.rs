//! Post-Newtonian corrections.
//!
//! Two formulations are available:
//!
//! * **simplified**: heliocentric one-body correction where the particle velocity is replaced by
//!   an iteratively solved "intermediate" velocity. Its Jacobian is the one of the
//!   first-order (Damour–Deruelle) form of the same correction,
//!   `f = μ/(r³c²) [ (4μ/r - v²) p + 4 (p·v) v ]`, which agrees with the iterative model to
//!   `O(1/c⁴)`;
//! * **EIH-PPN**: Einstein–Infeld–Hoffmann equations parameterized by the PPN `β` and `γ`,
//!   summed over the major bodies, with barycentric positions and velocities.

use nalgebra::{Matrix3, Vector3};

use crate::{
    constants::SIMPLIFIED_GR_MAX_ITER, ephemeris::BodyState, force_model::Contribution,
    variational::StateJacobian,
};

/// Simplified post-Newtonian correction of the Sun.
///
/// Arguments
/// -----------------
/// * `p`: heliocentric position of the particle (AU).
/// * `v`: heliocentric velocity of the particle (AU/day).
/// * `mu`: GM of the Sun (AU³/day²).
/// * `c`: speed of light (AU/day).
///
/// Return
/// ----------
/// * The correction with its Jacobian, and `false` when the intermediate velocity did not
///   converge within the iteration limit (the last iterate is used).
pub fn simplified(p: &Vector3<f64>, v: &Vector3<f64>, mu: f64, c: f64) -> (Contribution, bool) {
    let c2 = c * c;
    let r = p.norm();
    let r3 = r * r * r;

    let mut vi = *v;
    let mut a = (0.5 * vi.norm_squared() + 3.0 * mu / r) / c2;
    let mut converged = false;
    for _ in 0..SIMPLIFIED_GR_MAX_ITER {
        let previous = vi;
        vi = v / (1.0 - a);
        a = (0.5 * vi.norm_squared() + 3.0 * mu / r) / c2;
        // relative test, also satisfied by a particle at rest
        if (vi - previous).norm_squared() <= f64::EPSILON * f64::EPSILON * vi.norm_squared() {
            converged = true;
            break;
        }
    }

    let vi2 = vi.norm_squared();
    let b = (mu / r - 1.5 * vi2) * mu / (r3 * c2);
    let newtonian = -mu / r3 * p;
    let vidot = newtonian + b * p;
    let d = (vi.dot(&vidot) - 3.0 * mu / r3 * p.dot(v)) / c2;

    let acceleration = b * (1.0 - a) * p - a * newtonian - d * vi;
    (
        Contribution::new(acceleration, first_order_jacobian(p, v, mu, c)),
        converged,
    )
}

/// Jacobian of `μ/(r³c²) [ (4μ/r - v²) p + 4 (p·v) v ]`.
fn first_order_jacobian(p: &Vector3<f64>, v: &Vector3<f64>, mu: f64, c: f64) -> StateJacobian {
    let r2 = p.norm_squared();
    let r = r2.sqrt();
    let prefac = mu / (r2 * r * c * c);
    let radial = 4.0 * mu / r - v.norm_squared();
    let pv = p.dot(v);
    let f = radial * p + 4.0 * pv * v;

    let identity = Matrix3::<f64>::identity();
    let d_position = prefac
        * (radial * identity - 4.0 * mu / (r2 * r) * p * p.transpose() + 4.0 * v * v.transpose())
        - 3.0 * prefac / r2 * f * p.transpose();
    let d_velocity = prefac * (-2.0 * p * v.transpose() + 4.0 * v * p.transpose() + 4.0 * pv * identity);
    StateJacobian::new(d_position, d_velocity)
}

/// A major body as seen by the EIH equations: its state plus the Newtonian field of the other
/// major bodies at its position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MajorBodyField {
    pub gm: f64,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    /// `-Σ_{k≠j} GM_k (r_j - r_k) / r_jk³`
    pub acceleration: Vector3<f64>,
    /// `Σ_{k≠j} GM_k / r_jk`
    pub potential: f64,
}

/// Mutual Newtonian field of the major bodies.
///
/// Bodies without a velocity in the snapshot are taken at rest.
pub fn major_body_fields(majors: &[BodyState]) -> Vec<MajorBodyField> {
    majors
        .iter()
        .enumerate()
        .map(|(j, body)| {
            let (acceleration, potential) = majors
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != j)
                .fold((Vector3::<f64>::zeros(), 0.0), |(acc, pot), (_, other)| {
                    let d = body.position - other.position;
                    let r = d.norm();
                    (acc - other.gm / (r * r * r) * d, pot + other.gm / r)
                });
            MajorBodyField {
                gm: body.gm,
                position: body.position,
                velocity: body.velocity.unwrap_or_else(Vector3::zeros),
                acceleration,
                potential,
            }
        })
        .collect()
}

/// EIH-PPN correction for a particle at barycentric `r`, `v`.
///
/// Arguments
/// -----------------
/// * `r`, `v`: barycentric position (AU) and velocity (AU/day) of the particle.
/// * `fields`: the major bodies, see [`major_body_fields`].
/// * `beta`, `gamma`: PPN parameters (both 1 in general relativity).
/// * `c`: speed of light (AU/day).
///
/// Return
/// ----------
/// * The correction summed over every body in `fields`, with its Jacobian.
pub fn eih_ppn(
    r: &Vector3<f64>,
    v: &Vector3<f64>,
    fields: &[MajorBodyField],
    beta: f64,
    gamma: f64,
    c: f64,
) -> Contribution {
    let c2 = c * c;
    let identity = Matrix3::<f64>::identity();

    // particle potential, shared by every body
    let (potential, grad_potential) =
        fields
            .iter()
            .fold((0.0, Vector3::<f64>::zeros()), |(pot, grad), body| {
                let d = r - body.position;
                let rho = d.norm();
                (pot + body.gm / rho, grad - body.gm / (rho * rho * rho) * d)
            });
    let term0 = -2.0 * (beta + gamma) / c2 * potential;
    let grad_term0 = -2.0 * (beta + gamma) / c2 * grad_potential;
    let term2 = gamma * v.norm_squared() / c2;

    let mut total = Contribution::zero();
    for body in fields {
        let vj = &body.velocity;
        let aj = &body.acceleration;

        let d = r - body.position;
        let rho2 = d.norm_squared();
        let rho = rho2.sqrt();
        let rho3 = rho2 * rho;
        let p = body.gm / rho3;
        let grad_p = -3.0 * body.gm / (rho3 * rho2) * d;

        let d_vj = d.dot(vj);
        let term1 = -(2.0 * beta - 1.0) / c2 * body.potential;
        let term3 = (1.0 + gamma) * vj.norm_squared() / c2;
        let term4 = -2.0 * (1.0 + gamma) / c2 * v.dot(vj);
        let term5 = -1.5 / c2 * d_vj * d_vj / rho2;
        let term6 = -0.5 / c2 * d.dot(aj);
        let factor = term0 + term1 + term2 + term3 + term4 + term5 + term6;

        let grad_term5 = -3.0 / c2 * (d_vj / rho) * (vj / rho - d_vj / rho3 * d);
        let grad_term6 = -0.5 / c2 * aj;
        let grad_factor = grad_term0 + grad_term5 + grad_term6;
        let grad_v_factor = 2.0 * gamma / c2 * v - 2.0 * (1.0 + gamma) / c2 * vj;

        // scaled Newtonian part
        let acc1 = -p * factor * d;
        let dr1 = -d * (factor * grad_p + p * grad_factor).transpose() - p * factor * identity;
        let dv1 = -p * d * grad_v_factor.transpose();

        // velocity-dependent part
        let w = (2.0 + 2.0 * gamma) * v - (1.0 + 2.0 * gamma) * vj;
        let f = d.dot(&w);
        let u = v - vj;
        let acc2 = p * f / c2 * u;
        let dr2 = u * (f * grad_p + p * w).transpose() / c2;
        let dv2 = (p * u * ((2.0 + 2.0 * gamma) * d).transpose() + p * f * identity) / c2;

        // acceleration of the source body
        let k = (3.0 + 4.0 * gamma) * body.gm / (2.0 * c2);
        let acc3 = k / rho * aj;
        let dr3 = -k / rho3 * aj * d.transpose();

        total += Contribution::new(
            acc1 + acc2 + acc3,
            StateJacobian::new(dr1 + dr2 + dr3, dv1 + dv2),
        );
    }
    total
}
