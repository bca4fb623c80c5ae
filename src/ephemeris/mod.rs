//! # Perturber ephemerides
//!
//! The [`EphemerisProvider`] answers one question for the force model: *where is perturber `i`
//! at time `t`, and what is its GM?* It owns
//!
//! 1. two backing sources, described by [`EphemerisSources`] and opened lazily through a
//!    [`OnceCell`] the first time they are needed;
//! 2. the versioned [`PhysicalConstants`] table the GM values come from;
//! 3. a cache of the barycentric sun state, guarded by a [`Mutex`], used to translate the
//!    heliocentric asteroid positions and recomputed only when the query time changes.
//!
//! Major bodies are served with position, velocity and acceleration. Asteroids are served with
//! position only; their [`BodyState::velocity`] and [`BodyState::acceleration`] are `None` and are
//! never consumed by velocity-dependent terms.
//!
//! ## Typical usage
//!
//! ```rust, no_run
//! use std::sync::Arc;
//! use ephem_forces::ephemeris::{EphemerisProvider, EphemerisSources};
//! use ephem_forces::physical_constants::PhysicalConstants;
//!
//! let sources = EphemerisSources::from_env("de441.csv");
//! let provider = Arc::new(EphemerisProvider::new(sources, PhysicalConstants::de441()));
//!
//! // 3 is the Earth, 12 the second catalog asteroid
//! let earth = provider.query(3, 2_460_000.5).unwrap();
//! let ceres = provider.query(12, 2_460_000.5).unwrap();
//! ```
//!
//! ## See also
//! ------------
//! * [`ChebyshevEphemeris`](crate::ephemeris::chebyshev::ChebyshevEphemeris) – tabulated source.
//! * [`LinearEphemeris`](crate::ephemeris::linear::LinearEphemeris) – analytic source.

pub mod chebyshev;
pub mod linear;

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use nalgebra::Vector3;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::{
    bodies::{MajorBody, Perturber},
    constants::{GravParam, JulianDate, N_PERTURBERS},
    ephem_forces_errors::EphemForcesError,
    physical_constants::PhysicalConstants,
};
use chebyshev::ChebyshevEphemeris;

/// Environment variable overriding the asteroid ephemeris file
pub const ASTEROID_EPHEMERIS_ENV: &str = "JPL_SB_EPHEM";

/// Asteroid ephemeris file used when [`ASTEROID_EPHEMERIS_ENV`] is not set
pub const DEFAULT_ASTEROID_EPHEMERIS: &str = "sb441-n16.csv";

/// Position, velocity and acceleration of a body (AU, AU/day, AU/day²).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
}

/// Barycentric state and GM of a catalog body at a given time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub gm: GravParam,
    pub position: Vector3<f64>,
    /// `None` for asteroids
    pub velocity: Option<Vector3<f64>>,
    /// `None` for asteroids
    pub acceleration: Option<Vector3<f64>>,
}

impl BodyState {
    fn major(gm: GravParam, state: KinematicState) -> Self {
        BodyState {
            gm,
            position: state.position,
            velocity: Some(state.velocity),
            acceleration: Some(state.acceleration),
        }
    }
}

/// Source of barycentric major-body states.
pub trait MajorBodyEphemeris: Send + Sync {
    fn name(&self) -> &str;

    fn major_body_state(
        &self,
        body: MajorBody,
        jd: JulianDate,
    ) -> Result<KinematicState, EphemForcesError>;
}

/// Source of heliocentric positions of the catalog asteroids.
pub trait AsteroidEphemeris: Send + Sync {
    fn name(&self) -> &str;

    fn heliocentric_position(
        &self,
        asteroid: usize,
        jd: JulianDate,
    ) -> Result<Vector3<f64>, EphemForcesError>;
}

/// Where the major-body source comes from.
#[derive(Clone)]
pub enum MajorBodySource {
    ChebyshevFile(Utf8PathBuf),
    Provided(Arc<dyn MajorBodyEphemeris>),
}

/// Where the asteroid source comes from.
#[derive(Clone)]
pub enum AsteroidSource {
    ChebyshevFile(Utf8PathBuf),
    Provided(Arc<dyn AsteroidEphemeris>),
}

impl fmt::Debug for MajorBodySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MajorBodySource::ChebyshevFile(path) => write!(f, "ChebyshevFile({path})"),
            MajorBodySource::Provided(src) => write!(f, "Provided({})", src.name()),
        }
    }
}

impl fmt::Debug for AsteroidSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsteroidSource::ChebyshevFile(path) => write!(f, "ChebyshevFile({path})"),
            AsteroidSource::Provided(src) => write!(f, "Provided({})", src.name()),
        }
    }
}

/// Description of the two backing sources of an [`EphemerisProvider`].
#[derive(Debug, Clone)]
pub struct EphemerisSources {
    pub major_bodies: MajorBodySource,
    pub asteroids: AsteroidSource,
}

impl EphemerisSources {
    pub fn from_files(major_bodies: impl Into<Utf8PathBuf>, asteroids: impl Into<Utf8PathBuf>) -> Self {
        EphemerisSources {
            major_bodies: MajorBodySource::ChebyshevFile(major_bodies.into()),
            asteroids: AsteroidSource::ChebyshevFile(asteroids.into()),
        }
    }

    /// Major bodies from `major_bodies`; asteroids from the file named by `JPL_SB_EPHEM`, or
    /// [`DEFAULT_ASTEROID_EPHEMERIS`] when the variable is unset.
    pub fn from_env(major_bodies: impl Into<Utf8PathBuf>) -> Self {
        let asteroids = std::env::var(ASTEROID_EPHEMERIS_ENV)
            .unwrap_or_else(|_| DEFAULT_ASTEROID_EPHEMERIS.to_string());
        Self::from_files(major_bodies, asteroids)
    }

    pub fn in_memory(
        major_bodies: Arc<dyn MajorBodyEphemeris>,
        asteroids: Arc<dyn AsteroidEphemeris>,
    ) -> Self {
        EphemerisSources {
            major_bodies: MajorBodySource::Provided(major_bodies),
            asteroids: AsteroidSource::Provided(asteroids),
        }
    }
}

pub struct EphemerisProvider {
    sources: EphemerisSources,
    constants: PhysicalConstants,
    major_bodies: OnceCell<Arc<dyn MajorBodyEphemeris>>,
    asteroids: OnceCell<Arc<dyn AsteroidEphemeris>>,
    /// Last barycentric sun position and the time it was computed for
    sun_cache: Mutex<Option<(JulianDate, Vector3<f64>)>>,
}

impl fmt::Debug for EphemerisProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemerisProvider")
            .field("sources", &self.sources)
            .field("constants", &self.constants.version)
            .field("major_bodies_open", &self.major_bodies.get().is_some())
            .field("asteroids_open", &self.asteroids.get().is_some())
            .finish()
    }
}

impl EphemerisProvider {
    /// Build a provider. No source is opened until the first query.
    ///
    /// Arguments
    /// -----------------
    /// * `sources`: where the major-body and asteroid data come from.
    /// * `constants`: GM tables and oblateness blocks of the dynamical model.
    ///
    /// See also
    /// ------------
    /// * [`EphemerisProvider::query`] – Catalog lookup.
    pub fn new(sources: EphemerisSources, constants: PhysicalConstants) -> Self {
        EphemerisProvider {
            sources,
            constants,
            major_bodies: OnceCell::new(),
            asteroids: OnceCell::new(),
            sun_cache: Mutex::new(None),
        }
    }

    pub fn constants(&self) -> &PhysicalConstants {
        &self.constants
    }

    fn major_body_source(&self) -> Result<&Arc<dyn MajorBodyEphemeris>, EphemForcesError> {
        self.major_bodies.get_or_try_init(|| match &self.sources.major_bodies {
            MajorBodySource::Provided(src) => Ok(Arc::clone(src)),
            MajorBodySource::ChebyshevFile(path) => {
                log::debug!("Opening major-body ephemeris {path}");
                ChebyshevEphemeris::from_csv_file(path)
                    .map(|e| Arc::new(e) as Arc<dyn MajorBodyEphemeris>)
                    .map_err(|e| {
                        EphemForcesError::MajorBodyEphemerisUnavailable(format!("{path}: {e}"))
                    })
            }
        })
    }

    fn asteroid_source(&self) -> Result<&Arc<dyn AsteroidEphemeris>, EphemForcesError> {
        self.asteroids.get_or_try_init(|| match &self.sources.asteroids {
            AsteroidSource::Provided(src) => Ok(Arc::clone(src)),
            AsteroidSource::ChebyshevFile(path) => {
                log::debug!("Opening asteroid ephemeris {path}");
                ChebyshevEphemeris::from_csv_file(path)
                    .map(|e| Arc::new(e) as Arc<dyn AsteroidEphemeris>)
                    .map_err(|e| {
                        EphemForcesError::AsteroidEphemerisUnavailable(format!("{path}: {e}"))
                    })
            }
        })
    }

    /// Barycentric state and GM of a major body.
    pub fn major_body(&self, body: MajorBody, jd: JulianDate) -> Result<BodyState, EphemForcesError> {
        let state = self.major_body_source()?.major_body_state(body, jd)?;
        Ok(BodyState::major(self.constants.major_gm(body), state))
    }

    /// Barycentric sun position, served from the cache when `jd` matches the last request.
    fn sun_position(&self, jd: JulianDate) -> Result<Vector3<f64>, EphemForcesError> {
        let mut cache = self.sun_cache.lock();
        if let Some((t, position)) = *cache {
            if t == jd {
                return Ok(position);
            }
        }
        let position = self
            .major_body_source()?
            .major_body_state(MajorBody::Sun, jd)?
            .position;
        *cache = Some((jd, position));
        Ok(position)
    }

    /// Drop the cached sun state.
    pub fn clear_cache(&self) {
        *self.sun_cache.lock() = None;
    }

    /// Query a catalog entry.
    ///
    /// Arguments
    /// -----------------
    /// * `index`: catalog index in `0..27` (see [`crate::bodies`]).
    /// * `jd`: Julian date (TDB).
    ///
    /// Return
    /// ----------
    /// * The barycentric [`BodyState`] (AU, AU/day, AU/day²) with the GM of the body. Asteroid
    ///   entries carry no velocity nor acceleration.
    /// * [`EphemForcesError::BodyIndexOutOfRange`] for an index outside the catalog, or a data
    ///   error from the backing source.
    pub fn query(&self, index: usize, jd: JulianDate) -> Result<BodyState, EphemForcesError> {
        match Perturber::from_index(index)? {
            Perturber::Major(body) => self.major_body(body, jd),
            Perturber::Asteroid(i) => {
                let gm = self.constants.gm(Perturber::Asteroid(i))?;
                let helio = self.asteroid_source()?.heliocentric_position(i, jd)?;
                let sun = self.sun_position(jd)?;
                Ok(BodyState {
                    gm,
                    position: helio + sun,
                    velocity: None,
                    acceleration: None,
                })
            }
        }
    }

    /// States of the whole catalog at one time, in index order.
    pub fn snapshot(&self, jd: JulianDate) -> Result<Vec<BodyState>, EphemForcesError> {
        (0..N_PERTURBERS).map(|i| self.query(i, jd)).collect()
    }
}
