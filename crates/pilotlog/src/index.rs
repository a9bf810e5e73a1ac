//! The master index of registered pilots.
//!
//! One row per pilot in registration order, holding the running averages of
//! position and average speed. The index decides which pilots exist.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ledger::{self, Table};

/// Header of the name column.
pub const NAME_COLUMN: &str = "Piloto";
/// Header of the average position column.
pub const AVG_POSITION_COLUMN: &str = "Pos Promedio";
/// Header of the average speed column.
pub const AVG_SPEED_COLUMN: &str = "Vel Promedio";

const COLUMNS: [&str; 3] = [NAME_COLUMN, AVG_POSITION_COLUMN, AVG_SPEED_COLUMN];

/// A user-supplied reference to a pilot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// 1-based row in the master index.
    ByIndex(usize),
    /// Literal display name.
    ByName(String),
}

impl Identifier {
    /// Classify raw input: all-digit input is a row index, anything else a
    /// name.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = trimmed.parse() {
                return Self::ByIndex(index);
            }
        }
        Self::ByName(input.to_string())
    }
}

impl From<&str> for Identifier {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByIndex(index) => write!(f, "#{index}"),
            Self::ByName(name) => f.write_str(name),
        }
    }
}

/// Summary row for one pilot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    /// Display name.
    pub name: String,
    /// Mean of all recorded positions.
    pub avg_position: f64,
    /// Mean of all recorded average speeds.
    pub avg_speed: f64,
}

/// In-memory master index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterIndex {
    entries: Vec<IndexEntry>,
}

impl MasterIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index from its ledger file.
    ///
    /// A file holding only the bare `Piloto` header loads as an empty index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the file is absent, or
    /// [`Error::Corrupt`] if the header or a number does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let table = ledger::load(path)?;
        if table.is_empty() && table.columns() == [NAME_COLUMN] {
            return Ok(Self::new());
        }
        table.expect_columns(path, &COLUMNS)?;

        let mut index = Self::new();
        for (i, row) in table.rows().iter().enumerate() {
            let number = |col: usize| -> Result<f64> {
                row[col].trim().parse().map_err(|_| {
                    Error::corrupt(
                        path,
                        format!("row {}: bad {} '{}'", i + 1, COLUMNS[col], row[col]),
                    )
                })
            };
            let (avg_position, avg_speed) = (number(1)?, number(2)?);
            index
                .register(&row[0], avg_position, avg_speed)
                .map_err(|_| Error::corrupt(path, format!("duplicate pilot '{}'", row[0])))?;
        }
        debug!("Loaded index with {} pilots", index.len());
        Ok(index)
    }

    /// Write the whole index to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut table = Table::new(&COLUMNS);
        for entry in &self.entries {
            table.push_row(vec![
                entry.name.clone(),
                entry.avg_position.to_string(),
                entry.avg_speed.to_string(),
            ])?;
        }
        ledger::save(path, &table)
    }

    /// Create an empty index file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if a file is already there.
    pub fn create_empty(path: &Path) -> Result<Self> {
        ledger::create_empty(path, &COLUMNS)?;
        Ok(Self::new())
    }

    /// Add a pilot row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if `name` is already registered.
    pub fn register(&mut self, name: &str, avg_position: f64, avg_speed: f64) -> Result<()> {
        if self.contains(name) {
            return Err(Error::AlreadyExists {
                path: name.into(),
            });
        }
        self.entries.push(IndexEntry {
            name: name.to_string(),
            avg_position,
            avg_speed,
        });
        Ok(())
    }

    /// Remove a pilot row. Returns whether the row existed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        self.entries.len() != before
    }

    /// Fold one new race into a pilot's running averages.
    ///
    /// `prior_races` is the number of races recorded before this one. Each
    /// mean is updated from its own new value:
    /// `new_mean = (old_mean * n + new_value) / (n + 1)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPilot`] if `name` is not registered.
    #[allow(clippy::cast_precision_loss)]
    pub fn update_aggregates(
        &mut self,
        name: &str,
        new_position: u32,
        new_speed: f64,
        prior_races: usize,
    ) -> Result<()> {
        let entry = self.entry_mut(name)?;
        let n = prior_races as f64;
        entry.avg_position = (entry.avg_position * n + f64::from(new_position)) / (n + 1.0);
        entry.avg_speed = (entry.avg_speed * n + new_speed) / (n + 1.0);
        Ok(())
    }

    /// Overwrite a pilot's averages with freshly recomputed values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownPilot`] if `name` is not registered.
    pub fn set_aggregates(&mut self, name: &str, avg_position: f64, avg_speed: f64) -> Result<()> {
        let entry = self.entry_mut(name)?;
        entry.avg_position = avg_position;
        entry.avg_speed = avg_speed;
        Ok(())
    }

    /// Resolve an identifier to the canonical pilot name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] for an out-of-range row number and
    /// [`Error::UnknownPilot`] for an unregistered name.
    pub fn resolve(&self, identifier: &Identifier) -> Result<&str> {
        match identifier {
            Identifier::ByIndex(index) => index
                .checked_sub(1)
                .and_then(|i| self.entries.get(i))
                .map(|e| e.name.as_str())
                .ok_or(Error::InvalidIndex {
                    index: *index,
                    len: self.entries.len(),
                }),
            Identifier::ByName(name) => self
                .get(name)
                .map(|e| e.name.as_str())
                .ok_or_else(|| Error::UnknownPilot { name: name.clone() }),
        }
    }

    /// Names of all pilots in registration order.
    pub fn all_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// All rows in registration order.
    #[must_use]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Look up a row by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&IndexEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of registered pilots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no pilot is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every row.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut IndexEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::UnknownPilot {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> MasterIndex {
        let mut index = MasterIndex::new();
        index.register("Ana Ruiz", 2.0, 190.0).unwrap();
        index.register("Luis Vega", 1.5, 201.0).unwrap();
        index.register("Marta Sol", 3.0, 175.5).unwrap();
        index
    }

    #[test]
    fn test_identifier_parse() {
        assert_eq!(Identifier::parse("2"), Identifier::ByIndex(2));
        assert_eq!(Identifier::parse(" 12 "), Identifier::ByIndex(12));
        assert_eq!(
            Identifier::parse("Ana Ruiz"),
            Identifier::ByName("Ana Ruiz".to_string())
        );
        assert_eq!(Identifier::parse("-1"), Identifier::ByName("-1".to_string()));
        assert_eq!(Identifier::parse("R2"), Identifier::ByName("R2".to_string()));
    }

    #[test]
    fn test_register_duplicate_fails() {
        let mut index = sample_index();
        let err = index.register("Ana Ruiz", 1.0, 180.0).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_unregister_keeps_order() {
        let mut index = sample_index();

        assert!(index.unregister("Ana Ruiz"));
        assert!(!index.unregister("Ana Ruiz"));
        assert_eq!(index.len(), 2);
        assert_eq!(index.resolve(&Identifier::ByIndex(2)).unwrap(), "Marta Sol");
    }

    #[test]
    fn test_resolve_by_index() {
        let index = sample_index();
        assert_eq!(index.resolve(&Identifier::ByIndex(1)).unwrap(), "Ana Ruiz");
        assert_eq!(index.resolve(&Identifier::ByIndex(3)).unwrap(), "Marta Sol");
    }

    #[test]
    fn test_resolve_index_out_of_range() {
        let index = sample_index();
        for bad in [0, 4, 100] {
            let err = index.resolve(&Identifier::ByIndex(bad)).unwrap_err();
            assert!(matches!(err, Error::InvalidIndex { index, len: 3 } if index == bad));
        }
    }

    #[test]
    fn test_resolve_by_name() {
        let index = sample_index();
        assert_eq!(index.resolve(&"Luis Vega".into()).unwrap(), "Luis Vega");
        let err = index.resolve(&"luis vega".into()).unwrap_err();
        assert!(matches!(err, Error::UnknownPilot { .. }));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let index = sample_index();
        for raw in ["2", "Marta Sol"] {
            let id = Identifier::parse(raw);
            let first = index.resolve(&id).unwrap().to_string();
            let second = index.resolve(&Identifier::parse(&first)).unwrap();
            assert_eq!(index.resolve(&id).unwrap(), first);
            assert_eq!(second, first);
        }
    }

    #[test]
    fn test_update_aggregates_uses_matching_values() {
        let mut index = MasterIndex::new();
        index.register("Ana Ruiz", 2.0, 190.0).unwrap();

        index.update_aggregates("Ana Ruiz", 5, 230.0, 2).unwrap();

        let entry = index.get("Ana Ruiz").unwrap();
        assert!((entry.avg_position - 3.0).abs() < 1e-9);
        // Speed mean moves toward the new speed, not the new position.
        assert!((entry.avg_speed - (190.0 * 2.0 + 230.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_aggregates_from_empty_history() {
        let mut index = MasterIndex::new();
        index.register("Ana Ruiz", 0.0, 0.0).unwrap();

        index.update_aggregates("Ana Ruiz", 4, 201.0, 0).unwrap();

        let entry = index.get("Ana Ruiz").unwrap();
        assert!((entry.avg_position - 4.0).abs() < 1e-9);
        assert!((entry.avg_speed - 201.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_aggregates_unknown_pilot() {
        let mut index = sample_index();
        let err = index.update_aggregates("Nobody", 1, 200.0, 1).unwrap_err();
        assert!(matches!(err, Error::UnknownPilot { .. }));
    }

    #[test]
    fn test_all_names_in_registration_order() {
        let index = sample_index();
        let names: Vec<_> = index.all_names().collect();
        assert_eq!(names, ["Ana Ruiz", "Luis Vega", "Marta Sol"]);
    }

    #[test]
    fn test_clear() {
        let mut index = sample_index();
        index.clear();
        assert!(index.is_empty());
        assert!(index.resolve(&Identifier::ByIndex(1)).is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        let index = sample_index();

        index.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with(",Piloto,Pos Promedio,Vel Promedio\n1,Ana Ruiz,2,190\n"));
        assert_eq!(MasterIndex::load(&path).unwrap(), index);
    }

    #[test]
    fn test_load_first_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        std::fs::write(&path, "Piloto").unwrap();

        assert!(MasterIndex::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_create_empty_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");

        MasterIndex::create_empty(&path).unwrap();

        assert!(MasterIndex::load(&path).unwrap().is_empty());
        assert!(matches!(
            MasterIndex::create_empty(&path),
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_load_duplicate_rows_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        std::fs::write(
            &path,
            ",Piloto,Pos Promedio,Vel Promedio\n1,Ana Ruiz,2,190\n2,Ana Ruiz,1,200\n",
        )
        .unwrap();

        let err = MasterIndex::load(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate pilot"));
    }

    #[test]
    fn test_load_bad_average_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        std::fs::write(
            &path,
            ",Piloto,Pos Promedio,Vel Promedio\n1,Ana Ruiz,fast,190\n",
        )
        .unwrap();

        let err = MasterIndex::load(&path).unwrap_err();
        assert!(err.to_string().contains("Pos Promedio"));
    }
}
