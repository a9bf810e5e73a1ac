//! Error types for pilotlog.
//!
//! This module defines all error types used throughout the pilotlog crate,
//! carrying enough context (file, pilot, expected vs. actual value) to build
//! a user-facing message upstream.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for pilotlog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Ledger Errors ===
    /// A ledger file does not exist.
    #[error("ledger not found: {path}")]
    NotFound {
        /// Path of the missing ledger.
        path: PathBuf,
    },

    /// A ledger file or index row already exists where a new one was to be
    /// created.
    #[error("already exists: {path}")]
    AlreadyExists {
        /// Path of the existing ledger, or the pilot name for index rows.
        path: PathBuf,
    },

    /// A ledger file could not be parsed.
    #[error("corrupt ledger {path}: {message}")]
    Corrupt {
        /// Path of the malformed ledger.
        path: PathBuf,
        /// Description of what did not parse.
        message: String,
    },

    // === Lookup Errors ===
    /// A numeric pilot identifier is outside the index.
    #[error("invalid pilot index {index}: the index holds {len} pilots")]
    InvalidIndex {
        /// The 1-based index requested.
        index: usize,
        /// Number of registered pilots.
        len: usize,
    },

    /// No pilot with this name is registered.
    #[error("unknown pilot: {name}")]
    UnknownPilot {
        /// The name that was looked up.
        name: String,
    },

    /// A statistic name does not match any tracked column.
    #[error("unknown statistic '{name}' (expected one of: {expected})")]
    UnknownStatistic {
        /// The statistic name that was looked up.
        name: String,
        /// Comma-separated list of valid statistic names.
        expected: String,
    },

    // === Domain Errors ===
    /// A domain constraint was violated. Recoverable: the caller may retry
    /// with corrected input.
    #[error("validation failed{}: {violation}", pilot_suffix(.pilot.as_deref()))]
    ValidationFailed {
        /// Pilot the rejected value belonged to, when known.
        pilot: Option<String>,
        /// The constraint that was violated.
        violation: Violation,
    },

    /// First-run seeding failed for one pilot.
    #[error("bootstrap failed while registering '{pilot}': {source}")]
    BootstrapFailed {
        /// The pilot being registered when the failure happened.
        pilot: String,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Bootstrap was requested but pilots are already registered.
    #[error("index already holds {pilots} pilots; bootstrap only runs on an empty index")]
    IndexNotEmpty {
        /// Number of registered pilots.
        pilots: usize,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn pilot_suffix(pilot: Option<&str>) -> String {
    pilot.map(|p| format!(" for '{p}'")).unwrap_or_default()
}

/// A violated domain constraint, with the offending and expected values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Violation {
    /// Max speed must be strictly greater than the average speed.
    #[error("max speed ({max}) must be greater than average speed ({average})")]
    MaxNotAboveAverage {
        /// The average speed given.
        average: f64,
        /// The max speed given.
        max: f64,
    },

    /// Max speed must be strictly greater than the floor.
    #[error("max speed ({max}) must be greater than {floor}")]
    MaxBelowFloor {
        /// The max speed given.
        max: f64,
        /// The exclusive lower bound.
        floor: f64,
    },

    /// Average speed must be positive.
    #[error("average speed ({average}) must be greater than 0")]
    AverageNotPositive {
        /// The average speed given.
        average: f64,
    },

    /// Speeds must be finite numbers.
    #[error("{field} ({value}) must be a finite number")]
    NotFinite {
        /// Which speed was rejected.
        field: &'static str,
        /// The value given.
        value: f64,
    },

    /// Positions start at 1.
    #[error("position must be at least 1")]
    ZeroPosition,

    /// The position was already taken by another pilot in this race.
    #[error("position {position} is not available (available: {available:?})")]
    PositionTaken {
        /// The position requested.
        position: u32,
        /// Positions still open in this race.
        available: Vec<u32>,
    },

    /// A race needs exactly one entry per registered pilot.
    #[error("expected {expected} race entries, got {actual}")]
    EntryCount {
        /// Number of registered pilots.
        expected: usize,
        /// Number of entries supplied.
        actual: usize,
    },

    /// A race was committed before every pilot had an entry.
    #[error("race is incomplete: {missing} pilots have no entry")]
    IncompleteRace {
        /// Number of pilots still without an entry.
        missing: usize,
    },

    /// Every pilot in this race already has an entry.
    #[error("race already has an entry for every pilot")]
    RaceFull,

    /// A pilot name cannot be used as a ledger file name.
    #[error("pilot name {name:?} is not usable as a file name")]
    BadName {
        /// The rejected name.
        name: String,
    },
}

/// A specialized Result type for pilotlog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<Violation> for Error {
    fn from(violation: Violation) -> Self {
        Self::ValidationFailed {
            pilot: None,
            violation,
        }
    }
}

impl Error {
    /// Create a corrupt-ledger error.
    #[must_use]
    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Attach a pilot name to a validation error. Other errors pass through.
    #[must_use]
    pub fn for_pilot(self, name: &str) -> Self {
        match self {
            Self::ValidationFailed {
                pilot: None,
                violation,
            } => Self::ValidationFailed {
                pilot: Some(name.to_string()),
                violation,
            },
            other => other,
        }
    }

    /// Check if the caller may retry with corrected input.
    ///
    /// Validation and identifier errors are recoverable; file-system,
    /// corruption and configuration errors are not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ValidationFailed { .. }
                | Self::InvalidIndex { .. }
                | Self::UnknownPilot { .. }
                | Self::UnknownStatistic { .. }
        )
    }

    /// Check if this error reports a missing ledger.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The violated constraint, if this is a validation error.
    #[must_use]
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::ValidationFailed { violation, .. } => Some(violation),
            _ => None,
        }
    }
}
