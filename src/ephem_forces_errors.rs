use thiserror::Error;

/// Broad category of an [`EphemForcesError`].
///
/// The force model applies a single policy per category: configuration errors (including
/// unreadable JSON configuration or constant tables) are raised before any accumulation, data errors abort the evaluation after being logged, input errors reject a
/// malformed request before integration starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Data,
    Input,
}

#[derive(Error, Debug)]
pub enum EphemForcesError {
    #[error("Missing force-model configuration: {0}")]
    MissingConfiguration(&'static str),

    #[error("Invalid force-model configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Major-body ephemeris unavailable: {0}")]
    MajorBodyEphemerisUnavailable(String),

    #[error("Asteroid ephemeris unavailable: {0}")]
    AsteroidEphemerisUnavailable(String),

    #[error("Perturber index {index} is outside the catalog (size {size})")]
    BodyIndexOutOfRange { index: usize, size: usize },

    #[error("Epoch JD {epoch} TDB is outside the coverage of the {source_name} ephemeris")]
    EpochOutOfRange { epoch: f64, source_name: String },

    #[error("Malformed ephemeris data: {0}")]
    MalformedEphemeris(String),

    #[error("Particle not found: {0}")]
    ParticleNotFound(usize),

    #[error("Particle {0} is variational and cannot own variational particles")]
    VariationalParent(usize),

    #[error("Invalid dense-output node table: {0}")]
    InvalidNodeTable(String),

    #[error("Invalid propagation request: {0}")]
    InvalidRequest(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV reading error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON reading error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl EphemForcesError {
    /// Category used by the top-level error policy.
    pub fn kind(&self) -> ErrorKind {
        use EphemForcesError::*;
        match self {
            MissingConfiguration(_) | InvalidConfiguration(_) | JsonError(_) => {
                ErrorKind::Configuration
            }
            MajorBodyEphemerisUnavailable(_)
            | AsteroidEphemerisUnavailable(_)
            | BodyIndexOutOfRange { .. }
            | EpochOutOfRange { .. }
            | MalformedEphemeris(_)
            | IoError(_)
            | CsvError(_) => ErrorKind::Data,
            ParticleNotFound(_) | VariationalParent(_) | InvalidNodeTable(_) | InvalidRequest(_) => {
                ErrorKind::Input
            }
        }
    }

    /// Stable integer status reported as the final status of a failed run.
    ///
    /// The ephemeris codes keep their historical values (1: major-body source, 2: asteroid
    /// source, 3: asteroid index, 4: major-body index). Every code is positive; `0` is reserved
    /// for success.
    pub fn status_code(&self) -> i32 {
        use EphemForcesError::*;
        match self {
            MajorBodyEphemerisUnavailable(_) => 1,
            AsteroidEphemerisUnavailable(_) => 2,
            BodyIndexOutOfRange { index, .. } => {
                if *index >= crate::constants::N_MAJOR_BODIES {
                    3
                } else {
                    4
                }
            }
            EpochOutOfRange { .. } => 5,
            MalformedEphemeris(_) | CsvError(_) => 6,
            IoError(_) => 7,
            MissingConfiguration(_) | InvalidConfiguration(_) | JsonError(_) => 8,
            ParticleNotFound(_) | VariationalParent(_) | InvalidNodeTable(_) | InvalidRequest(_) => {
                9
            }
        }
    }
}

impl PartialEq for EphemForcesError {
    fn eq(&self, other: &Self) -> bool {
        use EphemForcesError::*;
        match (self, other) {
            (MissingConfiguration(a), MissingConfiguration(b)) => a == b,
            (InvalidConfiguration(a), InvalidConfiguration(b)) => a == b,
            (MajorBodyEphemerisUnavailable(a), MajorBodyEphemerisUnavailable(b)) => a == b,
            (AsteroidEphemerisUnavailable(a), AsteroidEphemerisUnavailable(b)) => a == b,
            (
                BodyIndexOutOfRange { index: a, size: sa },
                BodyIndexOutOfRange { index: b, size: sb },
            ) => a == b && sa == sb,
            (
                EpochOutOfRange {
                    epoch: a,
                    source_name: na,
                },
                EpochOutOfRange {
                    epoch: b,
                    source_name: nb,
                },
            ) => a == b && na == nb,
            (MalformedEphemeris(a), MalformedEphemeris(b)) => a == b,
            (ParticleNotFound(a), ParticleNotFound(b)) => a == b,
            (VariationalParent(a), VariationalParent(b)) => a == b,
            (InvalidNodeTable(a), InvalidNodeTable(b)) => a == b,
            (InvalidRequest(a), InvalidRequest(b)) => a == b,

            // wrapped errors are not comparable: same variant is enough
            (IoError(_), IoError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (JsonError(_), JsonError(_)) => true,

            _ => false,
        }
    }
}
