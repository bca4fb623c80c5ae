//! Analytic ephemeris of bodies in uniformly accelerated motion.
//!
//! [`LinearEphemeris`] gives every body a reference state at an epoch and a constant
//! acceleration: `p(t) = p0 + v0·Δt + ½·a·Δt²`. It serves both source roles (major bodies and
//! heliocentric asteroids) and has unlimited time coverage, which makes it the backing source of
//! synthetic scenarios, benchmarks and tests.

use std::collections::BTreeMap;

use nalgebra::Vector3;

use crate::{
    bodies::MajorBody,
    constants::{JulianDate, N_ASTEROIDS, N_MAJOR_BODIES},
    ephem_forces_errors::EphemForcesError,
    ephemeris::{AsteroidEphemeris, KinematicState, MajorBodyEphemeris},
};

#[derive(Debug, Clone, PartialEq)]
pub struct LinearMotion {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
}

impl LinearMotion {
    pub fn at_rest(position: Vector3<f64>) -> Self {
        LinearMotion {
            position,
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
        }
    }

    fn state(&self, dt: f64) -> KinematicState {
        KinematicState {
            position: self.position + self.velocity * dt + self.acceleration * (0.5 * dt * dt),
            velocity: self.velocity + self.acceleration * dt,
            acceleration: self.acceleration,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinearEphemeris {
    name: String,
    epoch: JulianDate,
    bodies: BTreeMap<usize, LinearMotion>,
}

impl LinearEphemeris {
    pub fn new(name: impl Into<String>, epoch: JulianDate) -> Self {
        LinearEphemeris {
            name: name.into(),
            epoch,
            bodies: BTreeMap::new(),
        }
    }

    pub fn with_body(mut self, body: usize, motion: LinearMotion) -> Self {
        self.bodies.insert(body, motion);
        self
    }

    pub fn epoch(&self) -> JulianDate {
        self.epoch
    }

    pub fn state(&self, body: usize, jd: JulianDate) -> Result<KinematicState, EphemForcesError> {
        self.bodies
            .get(&body)
            .map(|m| m.state(jd - self.epoch))
            .ok_or_else(|| {
                EphemForcesError::MalformedEphemeris(format!(
                    "body {body} is missing from the {} ephemeris",
                    self.name
                ))
            })
    }

    /// Deterministic stand-in for the planetary ephemeris.
    ///
    /// The sun drifts slowly near the origin, the planets sit near their mean distances spread
    /// in longitude and latitude, the moon is offset from the Earth by roughly its mean distance.
    /// Every body moves with a small constant velocity and acceleration so that velocity- and
    /// acceleration-dependent terms see non-trivial inputs.
    pub fn synthetic_major_bodies(epoch: JulianDate) -> Self {
        let distances = [
            0.0, 0.387, 0.723, 1.0, 1.0, 1.524, 5.203, 9.537, 19.19, 30.07, 39.48,
        ];
        let mut ephem = LinearEphemeris::new("synthetic-major-bodies", epoch);
        for (i, d) in distances.iter().enumerate().take(N_MAJOR_BODIES) {
            let lon = 0.7 * i as f64 + 0.3;
            let lat = 0.02 * (i as f64 - 5.0);
            let mut position = Vector3::new(d * lon.cos(), d * lon.sin(), d * lat.sin());
            let speed = if *d > 0.0 { 0.0172 / d.sqrt() } else { 1e-6 };
            let mut velocity = Vector3::new(-speed * lon.sin(), speed * lon.cos(), 1e-5 * lat);
            if i == MajorBody::Sun.index() {
                position = Vector3::new(-3.1e-3, 4.2e-3, 1.0e-4);
                velocity = Vector3::new(-5.0e-6, -2.0e-6, 1.0e-7);
            }
            if i == MajorBody::Moon.index() {
                let earth_lon = 0.7 * MajorBody::Earth.index() as f64 + 0.3;
                let earth_lat = 0.02 * (MajorBody::Earth.index() as f64 - 5.0);
                position = Vector3::new(
                    earth_lon.cos() + 1.8e-3,
                    earth_lon.sin() - 1.4e-3,
                    earth_lat.sin() + 2.0e-4,
                );
            }
            let acceleration = -position * (2.9e-4 / (position.norm().powi(3) + 1.0));
            ephem = ephem.with_body(
                i,
                LinearMotion {
                    position,
                    velocity,
                    acceleration,
                },
            );
        }
        ephem
    }

    /// Deterministic stand-in for the heliocentric asteroid ephemeris (main-belt distances).
    pub fn synthetic_asteroids(epoch: JulianDate) -> Self {
        let mut ephem = LinearEphemeris::new("synthetic-asteroids", epoch);
        for i in 0..N_ASTEROIDS {
            let a = 2.2 + 0.08 * i as f64;
            let lon = 1.3 * i as f64;
            let lat = 0.05 * ((i % 5) as f64 - 2.0);
            let speed = 0.0172 / a.sqrt();
            ephem = ephem.with_body(
                i,
                LinearMotion {
                    position: Vector3::new(a * lon.cos(), a * lon.sin(), a * lat.sin()),
                    velocity: Vector3::new(-speed * lon.sin(), speed * lon.cos(), 0.0),
                    acceleration: Vector3::zeros(),
                },
            );
        }
        ephem
    }
}

impl MajorBodyEphemeris for LinearEphemeris {
    fn name(&self) -> &str {
        &self.name
    }

    fn major_body_state(
        &self,
        body: MajorBody,
        jd: JulianDate,
    ) -> Result<KinematicState, EphemForcesError> {
        self.state(body.index(), jd)
    }
}

impl AsteroidEphemeris for LinearEphemeris {
    fn name(&self) -> &str {
        &self.name
    }

    fn heliocentric_position(
        &self,
        asteroid: usize,
        jd: JulianDate,
    ) -> Result<Vector3<f64>, EphemForcesError> {
        Ok(self.state(asteroid, jd)?.position)
    }
}
