//! Tabulated Chebyshev ephemeris and its interpolation.
//!
//! A [`ChebyshevEphemeris`] stores, for each body of a source, a sequence of
//! [`ChebyshevRecord`]s. Each record covers the interval `[mid - radius, mid + radius]`
//! (Julian dates, TDB) with three arrays of Chebyshev coefficients for the Cartesian position
//! in AU.
//!
//! ## Interpolation
//! The normalized time is `t = (jd - mid) / radius`. Position uses `T_n(t)`, velocity the
//! derivatives `T'_n(t)` scaled by `1 / radius` and acceleration `T''_n(t)` scaled by
//! `1 / radius²`.
//!
//! ## Text layout
//! The table is read from a comma-separated file, one record per line:
//!
//! ```text
//! # body, mid (JD TDB), radius (days), ncoeff, x_0..x_n-1, y_0..y_n-1, z_0..z_n-1
//! 3, 2460000.5, 16.0, 3, 0.98, 0.01, -0.001, 0.12, 0.2, 0.0, 0.05, 0.08, 0.0
//! ```
//!
//! Lines starting with `#` are ignored. `body` is the catalog row within the source: the
//! [`MajorBody`] index for a planetary table, the asteroid row for a small-body table.
//!
//! ## See also
//! ------------
//! * [`ChebyshevRecord::fit`] – build records from an analytic trajectory.
//! * [`EphemerisSources`](crate::ephemeris::EphemerisSources) – how a table file is attached to
//!   a provider.

use std::collections::BTreeMap;
use std::io::Read;

use camino::Utf8Path;
use nalgebra::Vector3;

use crate::{
    bodies::MajorBody,
    constants::JulianDate,
    ephem_forces_errors::EphemForcesError,
    ephemeris::{AsteroidEphemeris, KinematicState, MajorBodyEphemeris},
};

/// One Chebyshev segment (midpoint, half-width and per-axis coefficients).
#[derive(Debug, Clone, PartialEq)]
pub struct ChebyshevRecord {
    /// Midpoint of the record time span (JD TDB)
    pub mid: JulianDate,
    /// Half-width of the record interval (days)
    pub radius: f64,
    /// Chebyshev coefficients for X (AU)
    pub x: Vec<f64>,
    /// Chebyshev coefficients for Y (AU)
    pub y: Vec<f64>,
    /// Chebyshev coefficients for Z (AU)
    pub z: Vec<f64>,
}

impl ChebyshevRecord {
    pub fn start(&self) -> JulianDate {
        self.mid - self.radius
    }

    pub fn end(&self) -> JulianDate {
        self.mid + self.radius
    }

    pub fn covers(&self, jd: JulianDate) -> bool {
        jd >= self.start() && jd <= self.end()
    }

    /// Fit a record to a trajectory by sampling it at the Chebyshev–Gauss nodes.
    ///
    /// Arguments
    /// -----------------
    /// * `mid`, `radius`: interval covered by the record.
    /// * `n_coeff`: number of coefficients per axis (at least 1).
    /// * `position`: trajectory evaluated at a Julian date (AU).
    ///
    /// Return
    /// ----------
    /// * A record reproducing `position` to the truncation error of the series.
    pub fn fit<F>(mid: JulianDate, radius: f64, n_coeff: usize, position: F) -> Self
    where
        F: Fn(JulianDate) -> Vector3<f64>,
    {
        let n = n_coeff.max(1);
        let nodes: Vec<f64> = (0..n)
            .map(|k| (std::f64::consts::PI * (k as f64 + 0.5) / n as f64).cos())
            .collect();
        let samples: Vec<Vector3<f64>> = nodes.iter().map(|t| position(mid + radius * t)).collect();

        let mut coeffs = vec![Vector3::zeros(); n];
        for (j, c) in coeffs.iter_mut().enumerate() {
            for (k, sample) in samples.iter().enumerate() {
                let angle = std::f64::consts::PI * j as f64 * (k as f64 + 0.5) / n as f64;
                *c += sample * angle.cos();
            }
            *c *= 2.0 / n as f64;
        }
        coeffs[0] *= 0.5;

        ChebyshevRecord {
            mid,
            radius,
            x: coeffs.iter().map(|c| c.x).collect(),
            y: coeffs.iter().map(|c| c.y).collect(),
            z: coeffs.iter().map(|c| c.z).collect(),
        }
    }

    /// Evaluate position, velocity and acceleration at a Julian date.
    ///
    /// The caller is responsible for choosing a record that covers `jd`; the normalized time is
    /// clamped to `[-1, 1]`.
    ///
    /// Return
    /// ----------
    /// * A [`KinematicState`] in AU, AU/day and AU/day².
    pub fn interpolate(&self, jd: JulianDate) -> KinematicState {
        let t = ((jd - self.mid) / self.radius).clamp(-1.0, 1.0);
        let n = self.x.len();

        // T_0 = 1, T_1 = t, T_n = 2 t T_{n-1} - T_{n-2}
        let mut poly = vec![0.0; n];
        // T'_n = 2 t T'_{n-1} + 2 T_{n-1} - T'_{n-2}
        let mut deriv = vec![0.0; n];
        // T''_n = 2 t T''_{n-1} + 4 T'_{n-1} - T''_{n-2}
        let mut accel = vec![0.0; n];

        if n > 0 {
            poly[0] = 1.0;
        }
        if n > 1 {
            poly[1] = t;
            deriv[1] = 1.0;
        }
        for i in 2..n {
            poly[i] = 2.0 * t * poly[i - 1] - poly[i - 2];
            deriv[i] = 2.0 * t * deriv[i - 1] + 2.0 * poly[i - 1] - deriv[i - 2];
            accel[i] = 2.0 * t * accel[i - 1] + 4.0 * deriv[i - 1] - accel[i - 2];
        }

        let eval = |basis: &[f64]| -> Vector3<f64> {
            let dot = |coeffs: &[f64]| -> f64 { coeffs.iter().zip(basis).map(|(c, b)| c * b).sum() };
            Vector3::new(dot(&self.x), dot(&self.y), dot(&self.z))
        };

        let vfac = 1.0 / self.radius;
        KinematicState {
            position: eval(&poly),
            velocity: eval(&deriv) * vfac,
            acceleration: eval(&accel) * (vfac * vfac),
        }
    }
}

/// Chebyshev tables of every body of one ephemeris source.
#[derive(Debug, Clone, Default)]
pub struct ChebyshevEphemeris {
    name: String,
    /// Records of each body, sorted by midpoint
    records: BTreeMap<usize, Vec<ChebyshevRecord>>,
}

impl ChebyshevEphemeris {
    pub fn new(name: impl Into<String>) -> Self {
        ChebyshevEphemeris {
            name: name.into(),
            records: BTreeMap::new(),
        }
    }

    /// Append records for `body`, keeping them sorted by midpoint.
    pub fn insert_records(&mut self, body: usize, records: impl IntoIterator<Item = ChebyshevRecord>) {
        let entry = self.records.entry(body).or_default();
        entry.extend(records);
        entry.sort_by(|a, b| a.mid.total_cmp(&b.mid));
    }

    /// Tabulate a trajectory over `[start, end]` with `n_segments` equal records.
    pub fn insert_fit<F>(
        &mut self,
        body: usize,
        start: JulianDate,
        end: JulianDate,
        n_segments: usize,
        n_coeff: usize,
        position: F,
    ) where
        F: Fn(JulianDate) -> Vector3<f64>,
    {
        let n_segments = n_segments.max(1);
        let radius = 0.5 * (end - start) / n_segments as f64;
        let records: Vec<ChebyshevRecord> = (0..n_segments)
            .map(|i| {
                let mid = start + radius * (2 * i + 1) as f64;
                ChebyshevRecord::fit(mid, radius, n_coeff, &position)
            })
            .collect();
        self.insert_records(body, records);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bodies present in the table.
    pub fn bodies(&self) -> impl Iterator<Item = usize> + '_ {
        self.records.keys().copied()
    }

    /// Read a table from a comma-separated file.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: file in the layout described in the module documentation.
    ///
    /// Return
    /// ----------
    /// * The loaded table, named after the file, or an I/O / parsing error.
    ///
    /// See also
    /// ------------
    /// * [`ChebyshevEphemeris::from_csv_reader`] – Same, from any reader.
    pub fn from_csv_file(path: &Utf8Path) -> Result<Self, EphemForcesError> {
        let file = std::fs::File::open(path)?;
        let mut table = Self::from_csv_reader(file)?;
        table.name = path.file_name().unwrap_or(path.as_str()).to_string();
        log::debug!(
            "Loaded Chebyshev ephemeris {} ({} bodies)",
            table.name,
            table.records.len()
        );
        Ok(table)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, EphemForcesError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut table = ChebyshevEphemeris::new("chebyshev");
        for (line, row) in csv_reader.records().enumerate() {
            let row = row?;
            let malformed =
                |what: &str| EphemForcesError::MalformedEphemeris(format!("record {line}: {what}"));

            let field = |i: usize| -> Result<f64, EphemForcesError> {
                row.get(i)
                    .ok_or_else(|| malformed("missing field"))?
                    .parse::<f64>()
                    .map_err(|e| malformed(&e.to_string()))
            };

            let body = row
                .get(0)
                .ok_or_else(|| malformed("missing body"))?
                .parse::<usize>()
                .map_err(|e| malformed(&e.to_string()))?;
            let mid = field(1)?;
            let radius = field(2)?;
            let n_coeff = row
                .get(3)
                .ok_or_else(|| malformed("missing coefficient count"))?
                .parse::<usize>()
                .map_err(|e| malformed(&e.to_string()))?;

            if !(radius > 0.0) {
                return Err(malformed("non-positive half-width"));
            }
            if row.len() != 4 + 3 * n_coeff {
                return Err(malformed(&format!(
                    "expected {} fields, found {}",
                    4 + 3 * n_coeff,
                    row.len()
                )));
            }

            let axis = |offset: usize| -> Result<Vec<f64>, EphemForcesError> {
                (0..n_coeff).map(|i| field(4 + offset * n_coeff + i)).collect()
            };

            let record = ChebyshevRecord {
                mid,
                radius,
                x: axis(0)?,
                y: axis(1)?,
                z: axis(2)?,
            };
            table.insert_records(body, [record]);
        }
        Ok(table)
    }

    /// Locate the record of `body` covering `jd`.
    fn record(&self, body: usize, jd: JulianDate) -> Result<&ChebyshevRecord, EphemForcesError> {
        let out_of_range = || EphemForcesError::EpochOutOfRange {
            epoch: jd,
            source_name: self.name.clone(),
        };
        let records = self.records.get(&body).ok_or_else(|| {
            EphemForcesError::MalformedEphemeris(format!(
                "body {body} is missing from the {} ephemeris",
                self.name
            ))
        })?;

        // first record whose end is not before jd
        let idx = records.partition_point(|r| r.end() < jd);
        records
            .get(idx)
            .filter(|r| r.covers(jd))
            .ok_or_else(out_of_range)
    }

    /// Evaluate the full state of `body` at `jd`.
    pub fn state(&self, body: usize, jd: JulianDate) -> Result<KinematicState, EphemForcesError> {
        Ok(self.record(body, jd)?.interpolate(jd))
    }
}

impl MajorBodyEphemeris for ChebyshevEphemeris {
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

impl AsteroidEphemeris for ChebyshevEphemeris {
    fn name(&self) -> &str {
        &self.name
    }

    fn heliocentric_position(
        &self,
        asteroid: usize,
        jd: JulianDate,
    ) -> Result<Vector3<f64>, EphemForcesError> {
        Ok(self.record(asteroid, jd)?.interpolate(jd).position)
    }
}
