//! Per-pilot race history.
//!
//! Each pilot owns one ledger file holding one row per race, in race order.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result, Violation};
use crate::ledger::{self, Table};

/// Max speed must be strictly above this value.
pub const MAX_SPEED_FLOOR: f64 = 160.0;

/// A statistic tracked for every race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    /// Finishing position.
    Position,
    /// Average speed over the race.
    AverageSpeed,
    /// Top speed reached in the race.
    MaxSpeed,
}

impl Statistic {
    /// All statistics in ledger column order.
    pub const ALL: [Statistic; 3] = [Self::Position, Self::AverageSpeed, Self::MaxSpeed];

    /// The ledger column header for this statistic.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::Position => "Posición",
            Self::AverageSpeed => "Velocidad Media",
            Self::MaxSpeed => "Velocidad Max",
        }
    }

    /// The snake-case field name for this statistic.
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::Position => "position",
            Self::AverageSpeed => "average_speed",
            Self::MaxSpeed => "max_speed",
        }
    }

    /// Ledger column headers in order.
    #[must_use]
    pub fn columns() -> [&'static str; 3] {
        Self::ALL.map(Self::column)
    }

    fn expected_names() -> String {
        Self::ALL
            .iter()
            .flat_map(|s| [s.column(), s.field()])
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Statistic {
    type Err = Error;

    /// Accepts the column header or the field name, ignoring case and
    /// surrounding whitespace.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|stat| stat.column().to_lowercase() == wanted || stat.field() == wanted)
            .ok_or_else(|| Error::UnknownStatistic {
                name: s.to_string(),
                expected: Self::expected_names(),
            })
    }
}

/// One pilot's result in one race.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RaceEntry {
    /// Finishing position, starting at 1.
    pub position: u32,
    /// Average speed over the race.
    pub average_speed: f64,
    /// Top speed reached in the race.
    pub max_speed: f64,
}

impl RaceEntry {
    /// Create an entry without validating it.
    #[must_use]
    pub fn new(position: u32, average_speed: f64, max_speed: f64) -> Self {
        Self {
            position,
            average_speed,
            max_speed,
        }
    }

    /// Check the per-entry domain rules.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationFailed`] if the position is 0, a speed is
    /// NaN or infinite, the average speed is not positive, the max speed is
    /// not above the average, or the max speed is not above
    /// [`MAX_SPEED_FLOOR`].
    pub fn validate(&self) -> Result<()> {
        if self.position == 0 {
            return Err(Violation::ZeroPosition.into());
        }
        for (field, value) in [
            ("average speed", self.average_speed),
            ("max speed", self.max_speed),
        ] {
            if !value.is_finite() {
                return Err(Violation::NotFinite { field, value }.into());
            }
        }
        if self.average_speed <= 0.0 {
            return Err(Violation::AverageNotPositive {
                average: self.average_speed,
            }
            .into());
        }
        if self.max_speed <= MAX_SPEED_FLOOR {
            return Err(Violation::MaxBelowFloor {
                max: self.max_speed,
                floor: MAX_SPEED_FLOOR,
            }
            .into());
        }
        if self.max_speed <= self.average_speed {
            return Err(Violation::MaxNotAboveAverage {
                average: self.average_speed,
                max: self.max_speed,
            }
            .into());
        }
        Ok(())
    }

    /// The value of one statistic.
    #[must_use]
    pub fn get(&self, stat: Statistic) -> f64 {
        match stat {
            Statistic::Position => f64::from(self.position),
            Statistic::AverageSpeed => self.average_speed,
            Statistic::MaxSpeed => self.max_speed,
        }
    }
}

/// Check that a pilot name can name a ledger file inside the data directory.
///
/// # Errors
///
/// Returns [`Error::ValidationFailed`] for empty names, names starting with
/// `.`, and names containing path separators or control characters.
pub fn validate_name(name: &str) -> Result<()> {
    let bad = name.trim().is_empty()
        || name.starts_with('.')
        || name.chars().any(|c| c == '/' || c == '\\' || c.is_control());
    if bad {
        return Err(Violation::BadName {
            name: name.to_string(),
        }
        .into());
    }
    Ok(())
}

/// A pilot and the full history of their races.
#[derive(Debug, Clone, PartialEq)]
pub struct PilotRecord {
    name: String,
    path: PathBuf,
    columns: Vec<String>,
    races: Vec<RaceEntry>,
}

impl PilotRecord {
    /// Create an empty ledger for `name` at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if a ledger is already at `path`, or
    /// [`Error::ValidationFailed`] if the name is unusable.
    pub fn create(name: &str, path: impl Into<PathBuf>) -> Result<Self> {
        validate_name(name)?;
        let path = path.into();
        let table = ledger::create_empty(&path, &Statistic::columns())?;
        debug!("Created pilot record for {}", name);
        Ok(Self {
            name: name.to_string(),
            path,
            columns: table.columns().to_vec(),
            races: Vec::new(),
        })
    }

    /// Load the ledger for `name` from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no ledger, or
    /// [`Error::Corrupt`] if its content does not parse.
    pub fn load(name: &str, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = ledger::load(&path)?;
        table.expect_columns(&path, &Statistic::columns())?;

        let races = table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| parse_row(&path, i + 1, row))
            .collect::<Result<Vec<_>>>()?;

        debug!("Loaded {} races for {}", races.len(), name);
        Ok(Self {
            name: name.to_string(),
            path,
            columns: table.columns().to_vec(),
            races,
        })
    }

    /// Write the full history to the ledger file.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written.
    pub fn save(&self) -> Result<()> {
        ledger::save(&self.path, &self.to_table()?)
    }

    /// The pilot's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing ledger file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of recorded races.
    #[must_use]
    pub fn race_count(&self) -> usize {
        self.races.len()
    }

    /// The entry for a 1-based race number.
    #[must_use]
    pub fn race(&self, race: usize) -> Option<&RaceEntry> {
        race.checked_sub(1).and_then(|i| self.races.get(i))
    }

    /// Column headers of the ledger, in file order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Validate and append one race. Returns its 1-based race number.
    ///
    /// Position uniqueness across pilots is not checked here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationFailed`] if the entry breaks a speed or
    /// position rule; the history is unchanged in that case.
    pub fn append_race(&mut self, position: u32, average_speed: f64, max_speed: f64) -> Result<usize> {
        self.push(RaceEntry::new(position, average_speed, max_speed))
    }

    /// Validate and append a prepared entry. Returns its 1-based race number.
    ///
    /// # Errors
    ///
    /// Same as [`PilotRecord::append_race`].
    pub fn push(&mut self, entry: RaceEntry) -> Result<usize> {
        entry.validate().map_err(|e| e.for_pilot(&self.name))?;
        self.races.push(entry);
        Ok(self.races.len())
    }

    /// Mean of a statistic over all races, looked up by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStatistic`] if `column` names no tracked
    /// statistic.
    pub fn running_average(&self, column: &str) -> Result<f64> {
        Ok(self.mean(column.parse()?))
    }

    /// Mean of a statistic over all races; 0 for an empty history.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self, stat: Statistic) -> f64 {
        if self.races.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.races.iter().map(|r| r.get(stat)).sum();
        sum / self.races.len() as f64
    }

    /// Values of one statistic ordered by race number.
    #[must_use]
    pub fn series(&self, stat: Statistic) -> Vec<f64> {
        self.races.iter().map(|r| r.get(stat)).collect()
    }

    /// `(race_number, entry)` pairs in race order.
    pub fn history(&self) -> impl Iterator<Item = (usize, &RaceEntry)> + '_ {
        self.races.iter().enumerate().map(|(i, r)| (i + 1, r))
    }

    fn to_table(&self) -> Result<Table> {
        let mut table = Table::new(&Statistic::columns());
        for race in &self.races {
            table.push_row(vec![
                race.position.to_string(),
                race.average_speed.to_string(),
                race.max_speed.to_string(),
            ])?;
        }
        Ok(table)
    }
}

fn parse_row(path: &Path, race: usize, row: &[String]) -> Result<RaceEntry> {
    let cell = |i: usize| row.get(i).map_or("", |s| s.trim());
    let position: u32 = cell(0)
        .parse()
        .map_err(|_| Error::corrupt(path, format!("race {race}: bad position '{}'", cell(0))))?;
    let average_speed: f64 = cell(1).parse().map_err(|_| {
        Error::corrupt(path, format!("race {race}: bad average speed '{}'", cell(1)))
    })?;
    let max_speed: f64 = cell(2)
        .parse()
        .map_err(|_| Error::corrupt(path, format!("race {race}: bad max speed '{}'", cell(2))))?;
    Ok(RaceEntry::new(position, average_speed, max_speed))
}
