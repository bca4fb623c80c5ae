//! # Perturber catalog
//!
//! The force model sums contributions over a fixed catalog of [`N_PERTURBERS`] bodies:
//! the [`N_MAJOR_BODIES`] major bodies served by the planetary ephemeris, followed by the
//! [`N_ASTEROIDS`] massive asteroids served by the small-body ephemeris.
//!
//! The ordering is significant: a catalog index selects a row of the GM tables held by
//! [`PhysicalConstants`](crate::physical_constants::PhysicalConstants) and the record of the
//! corresponding backing source.
//!
//! | index | body    | index | body    |
//! |-------|---------|-------|---------|
//! | 0     | Sun     | 6     | Jupiter |
//! | 1     | Mercury | 7     | Saturn  |
//! | 2     | Venus   | 8     | Uranus  |
//! | 3     | Earth   | 9     | Neptune |
//! | 4     | Moon    | 10    | Pluto   |
//! | 5     | Mars    | 11–26 | asteroids (table order) |

use std::fmt;

use crate::{
    constants::{N_ASTEROIDS, N_MAJOR_BODIES, N_PERTURBERS},
    ephem_forces_errors::EphemForcesError,
};

/// Major bodies of the planetary ephemeris, in catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MajorBody {
    Sun,
    Mercury,
    Venus,
    Earth,
    Moon,
    Mars,
    Jupiter,
    Saturn,
    Uranus,
    Neptune,
    Pluto,
}

impl MajorBody {
    pub const ALL: [MajorBody; N_MAJOR_BODIES] = [
        MajorBody::Sun,
        MajorBody::Mercury,
        MajorBody::Venus,
        MajorBody::Earth,
        MajorBody::Moon,
        MajorBody::Mars,
        MajorBody::Jupiter,
        MajorBody::Saturn,
        MajorBody::Uranus,
        MajorBody::Neptune,
        MajorBody::Pluto,
    ];

    /// Catalog index of the body (also its row in the major-body GM table).
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            MajorBody::Sun => "sun",
            MajorBody::Mercury => "mercury",
            MajorBody::Venus => "venus",
            MajorBody::Earth => "earth",
            MajorBody::Moon => "moon",
            MajorBody::Mars => "mars",
            MajorBody::Jupiter => "jupiter",
            MajorBody::Saturn => "saturn",
            MajorBody::Uranus => "uranus",
            MajorBody::Neptune => "neptune",
            MajorBody::Pluto => "pluto",
        }
    }
}

impl TryFrom<usize> for MajorBody {
    type Error = EphemForcesError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        MajorBody::ALL
            .get(index)
            .copied()
            .ok_or(EphemForcesError::BodyIndexOutOfRange {
                index,
                size: N_MAJOR_BODIES,
            })
    }
}

impl fmt::Display for MajorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Entry of the 27-body perturber catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Perturber {
    Major(MajorBody),
    /// Massive asteroid, identified by its row in the asteroid table.
    Asteroid(usize),
}

impl Perturber {
    /// Resolve a catalog index into a perturber.
    ///
    /// Arguments
    /// -----------------
    /// * `index`: catalog index in `0..27`.
    ///
    /// Return
    /// ----------
    /// * The [`Perturber`] or [`EphemForcesError::BodyIndexOutOfRange`].
    pub fn from_index(index: usize) -> Result<Self, EphemForcesError> {
        if index < N_MAJOR_BODIES {
            Ok(Perturber::Major(MajorBody::try_from(index)?))
        } else if index < N_PERTURBERS {
            Ok(Perturber::Asteroid(index - N_MAJOR_BODIES))
        } else {
            Err(EphemForcesError::BodyIndexOutOfRange {
                index,
                size: N_PERTURBERS,
            })
        }
    }

    pub fn index(self) -> usize {
        match self {
            Perturber::Major(body) => body.index(),
            Perturber::Asteroid(i) => N_MAJOR_BODIES + i,
        }
    }

    /// Iterate over the whole catalog in index order.
    pub fn catalog() -> impl Iterator<Item = Perturber> {
        MajorBody::ALL
            .into_iter()
            .map(Perturber::Major)
            .chain((0..N_ASTEROIDS).map(Perturber::Asteroid))
    }
}
