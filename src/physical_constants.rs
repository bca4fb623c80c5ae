//! # Versioned physical constant tables
//!
//! Every constant that characterizes the dynamical model of a run lives in a
//! [`PhysicalConstants`] table: the GM of each catalog body, the oblateness blocks of the Earth
//! and of the Sun (GM, equatorial radius, zonal harmonics, fixed pole orientation). The table is
//! supplied when the [`ForceModel`](crate::force_model::ForceModel) is built, so revising a GM
//! value or a pole only means loading a different table.
//!
//! Two tables are built in:
//!
//! * [`PhysicalConstants::de441`] (the default) – DE440/DE441 masses and the sixteen
//!   `sb441-n16` asteroid masses, Earth pole along the working-frame z axis.
//! * [`PhysicalConstants::de430_legacy`] – the earlier DE430-era masses with the earlier asteroid
//!   selection and a tilted Earth pole.
//!
//! Further tables can be read from JSON with [`PhysicalConstants::from_json_file`].
//!
//! Units
//! -----------------
//! * GM: AU³/day²
//! * radii: kilometers
//! * pole right ascension / declination: degrees

use std::fs::File;
use std::io::BufReader;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::{
    bodies::{MajorBody, Perturber},
    constants::{Degree, GravParam, Kilometer, AU, N_ASTEROIDS, N_MAJOR_BODIES, RADEG},
    ephem_forces_errors::EphemForcesError,
};

/// Zonal-harmonic description of an oblate body with a fixed pole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OblateBody {
    /// GM used by the harmonic terms (AU³/day²)
    pub gm: GravParam,
    /// Equatorial radius (km)
    pub equatorial_radius: Kilometer,
    pub j2: f64,
    /// Fourth zonal harmonic, zero when the body only carries J2
    #[serde(default)]
    pub j4: f64,
    pub pole_ra: Degree,
    pub pole_dec: Degree,
}

impl OblateBody {
    /// Equatorial radius expressed in AU.
    pub fn radius_au(&self) -> f64 {
        self.equatorial_radius / AU
    }

    /// Pole right ascension and declination in radians.
    pub fn pole_radians(&self) -> (f64, f64) {
        (self.pole_ra * RADEG, self.pole_dec * RADEG)
    }
}

/// Catalog asteroid with its gravitational parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsteroidMass {
    pub name: String,
    pub gm: GravParam,
}

/// Versioned table of the physical constants of one dynamical model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConstants {
    pub version: String,
    /// GM of the major bodies, in [`MajorBody`] order
    pub major_gm: [GravParam; N_MAJOR_BODIES],
    /// GM of the massive asteroids, in catalog order
    pub asteroids: Vec<AsteroidMass>,
    pub earth: OblateBody,
    pub sun: OblateBody,
}

fn asteroid_table(entries: &[(&str, f64)]) -> Vec<AsteroidMass> {
    entries
        .iter()
        .map(|(name, gm)| AsteroidMass {
            name: name.to_string(),
            gm: *gm,
        })
        .collect()
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self::de441()
    }
}

impl PhysicalConstants {
    /// DE440/DE441 masses with the sixteen `sb441-n16` asteroids (alphabetical order).
    pub fn de441() -> Self {
        PhysicalConstants {
            version: "DE441".into(),
            major_gm: [
                0.2959122082841196e-03, // sun
                0.4912500194889318e-10, // mercury
                0.7243452332644119e-09, // venus
                0.8887692446707102e-09, // earth
                0.1093189462402435e-10, // moon
                0.9549548829725812e-10, // mars
                0.2825345825225792e-06, // jupiter
                0.8459705993376290e-07, // saturn
                0.1292026564968240e-07, // uranus
                0.1524357347885194e-07, // neptune
                0.2175096464893358e-11, // pluto
            ],
            asteroids: asteroid_table(&[
                ("camilla", 3.2191392075878588e-15),
                ("ceres", 1.3964518123081070e-13),
                ("cybele", 2.0917175955133682e-15),
                ("davida", 8.6836253492286545e-15),
                ("eunomia", 4.5107799051436795e-15),
                ("euphrosyne", 2.4067012218937576e-15),
                ("europa", 5.9824315264869841e-15),
                ("hygiea", 1.2542530761640810e-14),
                ("interamnia", 6.3110343420878887e-15),
                ("iris", 2.5416014973471498e-15),
                ("juno", 4.2823439677995011e-15),
                ("pallas", 3.0471146330043200e-14),
                ("psyche", 3.5445002842488978e-15),
                ("sylvia", 4.8345606546105521e-15),
                ("thisbe", 2.6529436610356353e-15),
                ("vesta", 3.8548000225257904e-14),
            ]),
            earth: OblateBody {
                gm: 0.888769244512563400E-09,
                equatorial_radius: 6378.1366,
                j2: 0.0010826253900,
                j4: -0.000001619898,
                pole_ra: 0.0,
                pole_dec: 90.0,
            },
            sun: OblateBody {
                gm: 0.2959122082841196e-03,
                equatorial_radius: 696000.0,
                j2: 2.196139151652982e-07,
                j4: 0.0,
                pole_ra: 286.13,
                pole_dec: 63.87,
            },
        }
    }

    /// DE430-era masses with the earlier sixteen-asteroid selection (decreasing mass order).
    pub fn de430_legacy() -> Self {
        PhysicalConstants {
            version: "DE430-legacy".into(),
            major_gm: [
                0.295912208285591100E-03, // sun
                0.491248045036476000E-10, // mercury
                0.724345233264412000E-09, // venus
                0.888769244512563400E-09, // earth
                0.109318945074237400E-10, // moon
                0.954954869555077000E-10, // mars
                0.282534584083387000E-06, // jupiter
                0.845970607324503000E-07, // saturn
                0.129202482578296000E-07, // uranus
                0.152435734788511000E-07, // neptune
                0.217844105197418000E-11, // pluto
            ],
            asteroids: asteroid_table(&[
                ("ceres", 1.400476556172344e-13),
                ("vesta", 3.854750187808810e-14),
                ("pallas", 3.104448198938713e-14),
                ("hygiea", 1.235800787294125e-14),
                ("euphrosyne", 6.343280473648602e-15),
                ("interamnia", 5.256168678493662e-15),
                ("davida", 5.198126979457498e-15),
                ("eunomia", 4.678307418350905e-15),
                ("juno", 3.617538317147937e-15),
                ("psyche", 3.411586826193812e-15),
                ("cybele", 3.180659282652541e-15),
                ("thisbe", 2.577114127311047e-15),
                ("doris", 2.531091726015068e-15),
                ("europa", 2.476788101255867e-15),
                ("patientia", 2.295559390637462e-15),
                ("sylvia", 2.199295173574073e-15),
            ]),
            earth: OblateBody {
                gm: 0.888769244512563400E-09,
                equatorial_radius: 6378.1263,
                j2: 0.00108262545,
                j4: -0.000001616,
                pole_ra: 359.87123273,
                pole_dec: 89.88809752,
            },
            sun: OblateBody {
                gm: 0.295912208285591100E-03,
                equatorial_radius: 696000.0,
                j2: 2.1106088532726840e-07,
                j4: 0.0,
                pole_ra: 268.13,
                pole_dec: 63.87,
            },
        }
    }

    /// Read a constant table from a JSON file and validate it.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: location of a JSON document with the [`PhysicalConstants`] layout.
    ///
    /// Return
    /// ----------
    /// * The validated table, or an [`EphemForcesError`] on I/O, parsing or validation failure.
    ///
    /// See also
    /// ------------
    /// * [`PhysicalConstants::from_json_str`] – Same, from an in-memory document.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, EphemForcesError> {
        let reader = BufReader::new(File::open(path)?);
        let table: PhysicalConstants = serde_json::from_reader(reader)?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_json_str(json: &str) -> Result<Self, EphemForcesError> {
        let table: PhysicalConstants = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Check the table dimensions and that every GM and radius is finite and positive.
    pub fn validate(&self) -> Result<(), EphemForcesError> {
        if self.asteroids.len() != N_ASTEROIDS {
            return Err(EphemForcesError::InvalidConfiguration(format!(
                "constant table {} lists {} asteroids, expected {N_ASTEROIDS}",
                self.version,
                self.asteroids.len()
            )));
        }

        let all_gm = self
            .major_gm
            .iter()
            .chain(self.asteroids.iter().map(|a| &a.gm))
            .chain([&self.earth.gm, &self.sun.gm]);
        if let Some(bad) = all_gm.into_iter().find(|gm| !(gm.is_finite() && **gm > 0.0)) {
            return Err(EphemForcesError::InvalidConfiguration(format!(
                "constant table {} holds a non-positive GM ({bad})",
                self.version
            )));
        }

        for body in [&self.earth, &self.sun] {
            if !(body.equatorial_radius.is_finite() && body.equatorial_radius > 0.0) {
                return Err(EphemForcesError::InvalidConfiguration(format!(
                    "constant table {} holds a non-positive equatorial radius",
                    self.version
                )));
            }
        }
        Ok(())
    }

    pub fn major_gm(&self, body: MajorBody) -> GravParam {
        self.major_gm[body.index()]
    }

    /// GM of any catalog entry.
    pub fn gm(&self, perturber: Perturber) -> Result<GravParam, EphemForcesError> {
        match perturber {
            Perturber::Major(body) => Ok(self.major_gm(body)),
            Perturber::Asteroid(i) => self.asteroids.get(i).map(|a| a.gm).ok_or(
                EphemForcesError::BodyIndexOutOfRange {
                    index: perturber.index(),
                    size: N_MAJOR_BODIES + self.asteroids.len(),
                },
            ),
        }
    }
}
