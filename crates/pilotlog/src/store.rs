//! The record store.
//!
//! Owns the master index and coordinates every operation that touches more
//! than one ledger. Two orderings hold everywhere:
//!
//! - a pilot ledger is created before its index row is written, so the
//!   index never names a pilot without a file;
//! - a new race is validated and staged for every pilot before anything is
//!   written, then all pilot ledgers are saved, then the index.
//!
//! Each single-file write is atomic. A registration that fails after its
//! ledger was created removes that ledger again and leaves the index as it
//! was. Race commits spanning several files are not atomic;
//! [`RecordStore::check_consistency`] reports drift left by an interrupted
//! run and [`RecordStore::recompute_aggregates`] repairs it.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result, Violation};
use crate::generate::{BatchSource, NameSource};
use crate::index::{Identifier, MasterIndex};
use crate::pilot::{validate_name, PilotRecord, RaceEntry, Statistic};

/// Tolerance when comparing stored and recomputed averages.
const AGGREGATE_TOLERANCE: f64 = 1e-6;

/// How the entries of a new race are supplied.
pub enum RaceInput<'a> {
    /// Draw every entry from a generated one-race batch.
    Random(&'a mut dyn BatchSource),
    /// One entry per registered pilot, in index order.
    Manual(Vec<RaceEntry>),
}

impl std::fmt::Debug for RaceInput<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Random(_) => f.write_str("Random"),
            Self::Manual(entries) => f.debug_tuple("Manual").field(entries).finish(),
        }
    }
}

/// A race being entered one pilot at a time.
///
/// Obtained from [`RecordStore::begin_race`]. Entries are staged in index
/// order; nothing is written until [`RecordStore::commit_race`].
#[derive(Debug)]
pub struct RaceDraft {
    records: Vec<PilotRecord>,
    staged: Vec<RaceEntry>,
    open_positions: Vec<u32>,
}

impl RaceDraft {
    fn new(records: Vec<PilotRecord>) -> Self {
        let top = u32::try_from(records.len()).unwrap_or(u32::MAX);
        Self {
            staged: Vec::with_capacity(records.len()),
            open_positions: (1..=top).collect(),
            records,
        }
    }

    /// The pilot whose entry is staged next, if any remain.
    #[must_use]
    pub fn next_pilot(&self) -> Option<&str> {
        self.records.get(self.staged.len()).map(PilotRecord::name)
    }

    /// Positions not yet taken in this race, ascending.
    #[must_use]
    pub fn open_positions(&self) -> &[u32] {
        &self.open_positions
    }

    /// Number of pilots still without an entry.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.records.len() - self.staged.len()
    }

    /// Whether every pilot has an entry.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Validate and stage the next pilot's entry.
    ///
    /// On error the draft is unchanged, so the caller can ask again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationFailed`] if the entry breaks a speed rule,
    /// its position is already taken in this race, or the race is full.
    pub fn stage(&mut self, entry: RaceEntry) -> Result<()> {
        let Some(pilot) = self.next_pilot() else {
            return Err(Violation::RaceFull.into());
        };
        let pilot = pilot.to_string();

        entry.validate().map_err(|e| e.for_pilot(&pilot))?;
        let Ok(slot) = self.open_positions.binary_search(&entry.position) else {
            return Err(Error::from(Violation::PositionTaken {
                position: entry.position,
                available: self.open_positions.clone(),
            })
            .for_pilot(&pilot));
        };

        self.open_positions.remove(slot);
        self.staged.push(entry);
        debug!("Staged position {} for {}", entry.position, pilot);
        Ok(())
    }
}

/// An index row that disagrees with its pilot ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum Inconsistency {
    /// The index names a pilot whose ledger is missing.
    MissingLedger {
        /// Pilot name.
        name: String,
        /// Expected ledger path.
        path: PathBuf,
    },
    /// A ledger file in the data directory has no index row.
    OrphanLedger {
        /// Pilot name taken from the file stem.
        name: String,
        /// Path of the unregistered ledger.
        path: PathBuf,
    },
    /// Stored averages differ from the ones recomputed from history.
    AggregateDrift {
        /// Pilot name.
        name: String,
        /// Stored `(avg_position, avg_speed)`.
        stored: (f64, f64),
        /// Recomputed `(avg_position, avg_speed)`.
        actual: (f64, f64),
    },
}

impl Inconsistency {
    /// The pilot this finding is about.
    #[must_use]
    pub fn pilot(&self) -> &str {
        match self {
            Self::MissingLedger { name, .. }
            | Self::OrphanLedger { name, .. }
            | Self::AggregateDrift { name, .. } => name,
        }
    }
}

/// File-backed store of pilots, their histories and the master index.
#[derive(Debug)]
pub struct RecordStore {
    config: Config,
    index: MasterIndex,
}

impl RecordStore {
    /// Open the store described by `config`.
    ///
    /// Creates the data directory and an empty master index when they do not
    /// exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the index
    /// cannot be read.
    pub fn open(config: Config) -> Result<Self> {
        let data_dir = config.data_dir();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).map_err(|source| Error::DirectoryCreate {
                path: data_dir.clone(),
                source,
            })?;
        }

        let index_path = config.index_path();
        let index = match MasterIndex::load(&index_path) {
            Ok(index) => index,
            Err(err) if err.is_not_found() => {
                info!("Creating master index at {}", index_path.display());
                MasterIndex::create_empty(&index_path)?
            }
            Err(err) => return Err(err),
        };

        info!(
            "Opened store at {} with {} pilots",
            data_dir.display(),
            index.len()
        );
        Ok(Self { config, index })
    }

    /// The configuration this store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The master index.
    #[must_use]
    pub fn index(&self) -> &MasterIndex {
        &self.index
    }

    /// Whether no pilot is registered yet.
    #[must_use]
    pub fn is_first_run(&self) -> bool {
        self.index.is_empty()
    }

    /// Ledger path for a pilot.
    #[must_use]
    pub fn pilot_path(&self, name: &str) -> PathBuf {
        self.config.pilot_path(name)
    }

    /// Resolve an identifier and load that pilot's record.
    ///
    /// # Errors
    ///
    /// Returns a lookup error for an unknown identifier and
    /// [`Error::NotFound`] if the ledger is missing.
    pub fn pilot(&self, identifier: &Identifier) -> Result<PilotRecord> {
        let name = self.index.resolve(identifier)?;
        PilotRecord::load(name, self.pilot_path(name))
    }

    /// A pilot's history as `(race, position, average_speed, max_speed)`.
    ///
    /// # Errors
    ///
    /// Same as [`RecordStore::pilot`].
    pub fn history(&self, identifier: &Identifier) -> Result<Vec<(usize, u32, f64, f64)>> {
        let record = self.pilot(identifier)?;
        Ok(record
            .history()
            .map(|(race, e)| (race, e.position, e.average_speed, e.max_speed))
            .collect())
    }

    /// One statistic across all of a pilot's races, in race order.
    ///
    /// # Errors
    ///
    /// Same as [`RecordStore::pilot`].
    pub fn series(&self, identifier: &Identifier, stat: Statistic) -> Result<Vec<f64>> {
        Ok(self.pilot(identifier)?.series(stat))
    }

    /// Seed an empty store with `pilot_count` generated pilots, each with
    /// `race_count` races.
    ///
    /// Every pilot's ledger is created and written before its index row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexNotEmpty`] if pilots are already registered, and
    /// [`Error::BootstrapFailed`] naming the pilot if any step for that pilot
    /// fails. Pilots registered before the failure stay registered.
    pub fn bootstrap<N, B>(
        &mut self,
        race_count: usize,
        pilot_count: usize,
        names: &mut N,
        batches: &mut B,
    ) -> Result<Vec<String>>
    where
        N: NameSource + ?Sized,
        B: BatchSource + ?Sized,
    {
        if !self.index.is_empty() {
            return Err(Error::IndexNotEmpty {
                pilots: self.index.len(),
            });
        }

        info!(
            "Bootstrapping {} pilots with {} races each",
            pilot_count, race_count
        );
        let batch = batches.race_batch(race_count, pilot_count);
        let mut registered = Vec::with_capacity(pilot_count);

        for slot in 0..pilot_count {
            let name = names.candidate_name();
            let entries: Vec<RaceEntry> = batch.pilot(slot).collect();
            let result = self.seed_pilot(&name, race_count, entries);
            if let Err(source) = result {
                warn!("Bootstrap stopped at {}: {}", name, source);
                return Err(Error::BootstrapFailed {
                    pilot: name,
                    source: Box::new(source),
                });
            }
            registered.push(name);
        }

        Ok(registered)
    }

    fn seed_pilot(&mut self, name: &str, race_count: usize, entries: Vec<RaceEntry>) -> Result<()> {
        validate_name(name)?;
        if self.index.contains(name) {
            return Err(Error::AlreadyExists { path: name.into() });
        }
        if entries.len() != race_count {
            return Err(Violation::EntryCount {
                expected: race_count,
                actual: entries.len(),
            }
            .into());
        }
        // Reject bad generated data before the ledger exists.
        for entry in &entries {
            entry.validate().map_err(|e| e.for_pilot(name))?;
        }

        let mut record = PilotRecord::create(name, self.pilot_path(name))?;
        let result = entries
            .into_iter()
            .try_for_each(|entry| record.push(entry).map(drop))
            .and_then(|()| record.save())
            .and_then(|()| self.enroll(&record));
        if let Err(err) = result {
            discard_ledger(record.path());
            return Err(err);
        }

        info!("Registered {} with {} races", name, record.race_count());
        Ok(())
    }

    /// Add an index row for `record` and persist the index. If the index
    /// cannot be written the row is dropped again.
    fn enroll(&mut self, record: &PilotRecord) -> Result<()> {
        self.index.register(
            record.name(),
            record.mean(Statistic::Position),
            record.mean(Statistic::AverageSpeed),
        )?;
        if let Err(err) = self.save_index() {
            self.index.unregister(record.name());
            return Err(err);
        }
        Ok(())
    }

    /// Register a new pilot with an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the pilot is registered or its
    /// ledger already exists, or [`Error::ValidationFailed`] for an unusable
    /// name.
    pub fn register_pilot(&mut self, name: &str) -> Result<PilotRecord> {
        validate_name(name)?;
        if self.index.contains(name) {
            return Err(Error::AlreadyExists { path: name.into() });
        }
        let record = PilotRecord::create(name, self.pilot_path(name))?;
        if let Err(err) = self.enroll(&record) {
            discard_ledger(record.path());
            return Err(err);
        }
        info!("Registered {}", name);
        Ok(record)
    }

    /// Register an existing, unregistered ledger under `name`, with
    /// averages computed from its history. Returns the stored
    /// `(avg_position, avg_speed)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if `name` is registered,
    /// [`Error::NotFound`] or [`Error::Corrupt`] if the ledger cannot be
    /// read, or an I/O error if the index cannot be written. The ledger is
    /// never removed.
    pub fn adopt_ledger(&mut self, name: &str) -> Result<(f64, f64)> {
        validate_name(name)?;
        if self.index.contains(name) {
            return Err(Error::AlreadyExists { path: name.into() });
        }
        let record = PilotRecord::load(name, self.pilot_path(name))?;
        self.enroll(&record)?;
        info!("Adopted ledger for {} with {} races", name, record.race_count());
        Ok((
            record.mean(Statistic::Position),
            record.mean(Statistic::AverageSpeed),
        ))
    }

    /// Load every registered pilot and start staging a new race.
    ///
    /// # Errors
    ///
    /// Returns an error if any pilot's ledger is missing or corrupt.
    pub fn begin_race(&self) -> Result<RaceDraft> {
        let records = self
            .index
            .all_names()
            .map(|name| PilotRecord::load(name, self.pilot_path(name)))
            .collect::<Result<Vec<_>>>()?;
        Ok(RaceDraft::new(records))
    }

    /// Write a fully staged race: every pilot ledger first, then the index.
    ///
    /// Returns the number of pilots updated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationFailed`] if the draft is incomplete (nothing
    /// is written), or an I/O error from a ledger write.
    pub fn commit_race(&mut self, draft: RaceDraft) -> Result<usize> {
        if !draft.is_complete() {
            return Err(Violation::IncompleteRace {
                missing: draft.remaining(),
            }
            .into());
        }

        let RaceDraft {
            mut records,
            staged,
            ..
        } = draft;

        let mut updates = Vec::with_capacity(records.len());
        for (record, entry) in records.iter_mut().zip(&staged) {
            let prior_races = record.race_count();
            record.push(*entry)?;
            updates.push((record.name().to_string(), *entry, prior_races));
        }

        for record in &records {
            record.save()?;
        }
        for (name, entry, prior_races) in &updates {
            self.index
                .update_aggregates(name, entry.position, entry.average_speed, *prior_races)?;
        }
        self.save_index()?;

        info!("Recorded a new race for {} pilots", updates.len());
        Ok(updates.len())
    }

    /// Add one race for every registered pilot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationFailed`] if a manual entry breaks a rule,
    /// positions repeat, or the entry count differs from the pilot count;
    /// nothing is written in that case.
    pub fn add_race_for_all(&mut self, input: RaceInput<'_>) -> Result<usize> {
        let mut draft = self.begin_race()?;
        let pilots = draft.remaining();

        let entries = match input {
            RaceInput::Random(source) => {
                let batch = source.race_batch(1, pilots);
                batch.race(0).map(<[RaceEntry]>::to_vec).unwrap_or_default()
            }
            RaceInput::Manual(entries) => entries,
        };
        if entries.len() != pilots {
            return Err(Violation::EntryCount {
                expected: pilots,
                actual: entries.len(),
            }
            .into());
        }

        for entry in entries {
            draft.stage(entry)?;
        }
        self.commit_race(draft)
    }

    /// Recompute a pilot's averages from the full history and store them.
    ///
    /// # Errors
    ///
    /// Returns a lookup error for an unknown pilot or an error reading its
    /// ledger.
    pub fn recompute_aggregates(&mut self, identifier: &Identifier) -> Result<(f64, f64)> {
        let record = self.pilot(identifier)?;
        let averages = (
            record.mean(Statistic::Position),
            record.mean(Statistic::AverageSpeed),
        );
        self.index
            .set_aggregates(record.name(), averages.0, averages.1)?;
        self.save_index()?;
        debug!("Recomputed averages for {}", record.name());
        Ok(averages)
    }

    /// Compare every index row with its pilot ledger, then look for ledger
    /// files that no index row names.
    ///
    /// # Errors
    ///
    /// Returns an error if a registered ledger exists but cannot be read, or
    /// the data directory cannot be listed.
    pub fn check_consistency(&self) -> Result<Vec<Inconsistency>> {
        let mut findings = Vec::new();
        for entry in self.index.entries() {
            let path = self.pilot_path(&entry.name);
            let record = match PilotRecord::load(&entry.name, &path) {
                Ok(record) => record,
                Err(err) if err.is_not_found() => {
                    warn!("Index names {} but {} is missing", entry.name, path.display());
                    findings.push(Inconsistency::MissingLedger {
                        name: entry.name.clone(),
                        path,
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            let actual = (
                record.mean(Statistic::Position),
                record.mean(Statistic::AverageSpeed),
            );
            let stored = (entry.avg_position, entry.avg_speed);
            if (actual.0 - stored.0).abs() > AGGREGATE_TOLERANCE
                || (actual.1 - stored.1).abs() > AGGREGATE_TOLERANCE
            {
                warn!("Averages for {} drifted from its history", entry.name);
                findings.push(Inconsistency::AggregateDrift {
                    name: entry.name.clone(),
                    stored,
                    actual,
                });
            }
        }

        for path in self.ledger_files()? {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !self.index.contains(name) {
                warn!("{} is not in the index", path.display());
                findings.push(Inconsistency::OrphanLedger {
                    name: name.to_string(),
                    path,
                });
            }
        }
        Ok(findings)
    }

    /// Files in the data directory with the ledger extension, excluding the
    /// index, sorted by path.
    fn ledger_files(&self) -> Result<Vec<PathBuf>> {
        let index_path = self.config.index_path();
        let extension = self.config.ledger_extension();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(self.config.data_dir())? {
            let path = entry?.path();
            if path != index_path
                && path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(extension)
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Delete every ledger and start over with an empty index.
    ///
    /// Removes the ledgers of registered pilots, any other ledger file in the
    /// data directory, and the index itself. Returns the number of files
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be removed or the new index cannot be
    /// created.
    pub fn reset_all(&mut self) -> Result<usize> {
        let mut removed = 0;
        for name in self.index.all_names() {
            if remove_if_present(&self.pilot_path(name))? {
                removed += 1;
            }
        }

        for path in self.ledger_files()? {
            if remove_if_present(&path)? {
                removed += 1;
            }
        }

        let index_path = self.config.index_path();
        self.index.clear();
        remove_if_present(&index_path)?;
        self.index = MasterIndex::create_empty(&index_path)?;

        info!("Removed {} ledger files; store is empty", removed);
        Ok(removed)
    }

    fn save_index(&self) -> Result<()> {
        self.index.save(&self.config.index_path())
    }
}

/// Remove a ledger created by a registration that did not complete.
fn discard_ledger(path: &Path) {
    if let Err(err) = remove_if_present(path) {
        warn!("Could not remove {}: {}", path.display(), err);
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::{Generator, RaceBatch};

    fn open_store(dir: &Path) -> RecordStore {
        RecordStore::open(Config::with_data_dir(dir)).unwrap()
    }

    fn bootstrapped(dir: &Path, races: usize, pilots: usize) -> (RecordStore, Generator) {
        let mut store = open_store(dir);
        let mut generator = Generator::from_seed(250);
        let mut batches = generator.clone();
        store
            .bootstrap(races, pilots, &mut generator, &mut batches)
            .unwrap();
        (store, generator)
    }

    fn positions_in_race(store: &RecordStore, race: usize) -> Vec<u32> {
        let mut positions: Vec<u32> = store
            .index()
            .all_names()
            .map(|name| {
                let record = PilotRecord::load(name, store.pilot_path(name)).unwrap();
                record.race(race).unwrap().position
            })
            .collect();
        positions.sort_unstable();
        positions
    }

    /// Always hands out the same name.
    struct FixedName(&'static str);

    impl NameSource for FixedName {
        fn candidate_name(&mut self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn test_open_creates_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path());

        assert!(store.is_first_run());
        assert!(dir.path().join("datos.csv").exists());
        assert_eq!(store.config().index_path(), dir.path().join("datos.csv"));
    }

    #[test]
    fn test_open_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested/races");

        let store = open_store(&nested);

        assert!(nested.join("datos.csv").exists());
        assert!(store.is_first_run());
    }

    #[test]
    fn test_open_corrupt_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("datos.csv"), ",Nombre\n1,Ana\n").unwrap();

        let err = RecordStore::open(Config::with_data_dir(dir.path())).unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_bootstrap_three_races_five_pilots() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = bootstrapped(dir.path(), 3, 5);

        assert_eq!(store.index().len(), 5);
        for entry in store.index().entries() {
            let record = PilotRecord::load(&entry.name, store.pilot_path(&entry.name)).unwrap();
            assert_eq!(record.race_count(), 3);
            let positions = record.series(Statistic::Position);
            let mean = positions.iter().sum::<f64>() / 3.0;
            assert!((entry.avg_position - mean).abs() < 1e-9);
            assert!((entry.avg_speed - record.mean(Statistic::AverageSpeed)).abs() < 1e-9);
        }
        for race in 1..=3 {
            assert_eq!(positions_in_race(&store, race), vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_bootstrap_persists_index() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = bootstrapped(dir.path(), 2, 4);

        let reopened = open_store(dir.path());

        assert_eq!(reopened.index(), store.index());
        assert!(!reopened.is_first_run());
    }

    #[test]
    fn test_bootstrap_refuses_non_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, mut generator) = bootstrapped(dir.path(), 1, 3);
        let mut batches = generator.clone();

        let err = store
            .bootstrap(1, 3, &mut generator, &mut batches)
            .unwrap_err();
        assert!(matches!(err, Error::IndexNotEmpty { pilots: 3 }));
    }

    #[test]
    fn test_bootstrap_name_collision_with_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        std::fs::write(store.pilot_path("Ana Ruiz"), "stale").unwrap();
        let mut batches = Generator::from_seed(1);

        let err = store
            .bootstrap(2, 3, &mut FixedName("Ana Ruiz"), &mut batches)
            .unwrap_err();

        match err {
            Error::BootstrapFailed { pilot, source } => {
                assert_eq!(pilot, "Ana Ruiz");
                assert!(matches!(*source, Error::AlreadyExists { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.index().is_empty());
        assert!(open_store(dir.path()).is_first_run());
        assert_eq!(
            std::fs::read_to_string(store.pilot_path("Ana Ruiz")).unwrap(),
            "stale"
        );
    }

    #[test]
    fn test_bootstrap_repeated_name_keeps_earlier_pilot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let mut batches = Generator::from_seed(1);

        let err = store
            .bootstrap(2, 3, &mut FixedName("Ana Ruiz"), &mut batches)
            .unwrap_err();

        assert!(matches!(err, Error::BootstrapFailed { .. }));
        // The first pilot is fully registered; no orphan row exists.
        assert_eq!(store.index().len(), 1);
        assert!(store.check_consistency().unwrap().is_empty());
    }

    #[test]
    fn test_register_pilot() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());

        let record = store.register_pilot("Ana Ruiz").unwrap();

        assert_eq!(record.race_count(), 0);
        assert!(store.pilot_path("Ana Ruiz").exists());
        assert!(matches!(
            store.register_pilot("Ana Ruiz"),
            Err(Error::AlreadyExists { .. })
        ));
        assert!(matches!(
            store.register_pilot("../Ana"),
            Err(Error::ValidationFailed { .. })
        ));
        assert_eq!(store.index().len(), 1);
    }

    /// Replace the index file with a directory so saving it fails.
    fn block_index(store: &RecordStore) -> PathBuf {
        let index_path = store.config().index_path();
        std::fs::remove_file(&index_path).unwrap();
        std::fs::create_dir(&index_path).unwrap();
        index_path
    }

    fn ledger_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|e| {
                let path = e.as_ref().unwrap().path();
                path.is_file() && path.extension().and_then(|x| x.to_str()) == Some("csv")
            })
            .count()
    }

    #[test]
    fn test_register_pilot_index_write_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let index_path = block_index(&store);

        let err = store.register_pilot("Ana Ruiz").unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert!(!store.index().contains("Ana Ruiz"));
        assert!(!store.pilot_path("Ana Ruiz").exists());
        assert_eq!(ledger_count(dir.path()), 0);

        std::fs::remove_dir(&index_path).unwrap();
        store.register_pilot("Ana Ruiz").unwrap();
        let reopened = open_store(dir.path());
        assert!(reopened.index().contains("Ana Ruiz"));
        assert!(reopened.check_consistency().unwrap().is_empty());
    }

    #[test]
    fn test_bootstrap_index_write_failure_leaves_no_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        block_index(&store);
        let mut generator = Generator::from_seed(250);
        let mut batches = Generator::from_seed(251);

        let err = store
            .bootstrap(2, 3, &mut generator, &mut batches)
            .unwrap_err();

        match err {
            Error::BootstrapFailed { source, .. } => assert!(matches!(*source, Error::Io(_))),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.is_first_run());
        assert_eq!(ledger_count(dir.path()), 0);
    }

    #[test]
    fn test_check_consistency_reports_orphan_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = bootstrapped(dir.path(), 2, 2);
        let mut stray = PilotRecord::create("Luis Vega", store.pilot_path("Luis Vega")).unwrap();
        stray.append_race(2, 180.0, 200.0).unwrap();
        stray.append_race(1, 190.0, 210.0).unwrap();
        stray.save().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a ledger").unwrap();

        let findings = store.check_consistency().unwrap();

        assert!(matches!(
            &findings[..],
            [Inconsistency::OrphanLedger { name, path }]
                if name == "Luis Vega" && path == &store.pilot_path("Luis Vega")
        ));

        let (avg_position, avg_speed) = store.adopt_ledger("Luis Vega").unwrap();
        assert!((avg_position - 1.5).abs() < 1e-9);
        assert!((avg_speed - 185.0).abs() < 1e-9);
        assert_eq!(store.index().len(), 3);
        assert!(store.check_consistency().unwrap().is_empty());
        assert!(matches!(
            store.adopt_ledger("Luis Vega"),
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_adopt_missing_ledger_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());

        assert!(store.adopt_ledger("Nobody").unwrap_err().is_not_found());
        assert!(store.is_first_run());
    }

    #[test]
    fn test_add_random_race_is_permutation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, mut generator) = bootstrapped(dir.path(), 2, 6);

        let updated = store
            .add_race_for_all(RaceInput::Random(&mut generator))
            .unwrap();

        assert_eq!(updated, 6);
        assert_eq!(positions_in_race(&store, 3), vec![1, 2, 3, 4, 5, 6]);
        assert!(store.check_consistency().unwrap().is_empty());
    }

    #[test]
    fn test_add_manual_race_updates_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let mut seed = PilotRecord::create("Ana Ruiz", store.pilot_path("Ana Ruiz")).unwrap();
        seed.append_race(2, 180.0, 200.0).unwrap();
        seed.append_race(4, 170.0, 190.0).unwrap();
        seed.save().unwrap();
        store.index.register("Ana Ruiz", 3.0, 175.0).unwrap();
        store.register_pilot("Luis Vega").unwrap();

        store
            .add_race_for_all(RaceInput::Manual(vec![
                RaceEntry::new(1, 220.0, 240.0),
                RaceEntry::new(2, 200.0, 215.0),
            ]))
            .unwrap();

        let ana = store.index().get("Ana Ruiz").unwrap();
        assert!((ana.avg_position - (2.0 + 4.0 + 1.0) / 3.0).abs() < 1e-9);
        // Speed mean is fed the new speed, never the new position.
        assert!((ana.avg_speed - (180.0 + 170.0 + 220.0) / 3.0).abs() < 1e-9);
        let luis = store.index().get("Luis Vega").unwrap();
        assert!((luis.avg_position - 2.0).abs() < 1e-9);
        assert!((luis.avg_speed - 200.0).abs() < 1e-9);
        assert_eq!(
            store.series(&"Ana Ruiz".into(), Statistic::Position).unwrap(),
            vec![2.0, 4.0, 1.0]
        );
    }

    #[test]
    fn test_add_manual_race_duplicate_position_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = bootstrapped(dir.path(), 2, 3);
        let before = store.index().clone();

        let err = store
            .add_race_for_all(RaceInput::Manual(vec![
                RaceEntry::new(1, 220.0, 240.0),
                RaceEntry::new(1, 200.0, 215.0),
                RaceEntry::new(3, 190.0, 205.0),
            ]))
            .unwrap_err();

        assert!(err.is_recoverable());
        assert!(matches!(
            err.violation(),
            Some(Violation::PositionTaken { position: 1, .. })
        ));
        assert_eq!(store.index(), &before);
        assert_eq!(open_store(dir.path()).index(), &before);
        for name in before.all_names() {
            let record = PilotRecord::load(name, store.pilot_path(name)).unwrap();
            assert_eq!(record.race_count(), 2);
        }
    }

    #[test]
    fn test_add_manual_race_wrong_count() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = bootstrapped(dir.path(), 1, 3);

        let err = store
            .add_race_for_all(RaceInput::Manual(vec![RaceEntry::new(1, 200.0, 215.0)]))
            .unwrap_err();

        assert!(matches!(
            err.violation(),
            Some(Violation::EntryCount {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_draft_rejects_then_accepts() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = bootstrapped(dir.path(), 1, 2);
        let mut draft = store.begin_race().unwrap();
        let first = draft.next_pilot().unwrap().to_string();

        let err = draft.stage(RaceEntry::new(1, 200.0, 160.0)).unwrap_err();
        assert!(err.to_string().contains(&first));
        assert_eq!(draft.next_pilot(), Some(first.as_str()));

        draft.stage(RaceEntry::new(2, 200.0, 215.0)).unwrap();
        assert_eq!(draft.open_positions().to_vec(), vec![1]);

        let err = draft.stage(RaceEntry::new(2, 190.0, 205.0)).unwrap_err();
        assert!(matches!(
            err.violation(),
            Some(Violation::PositionTaken { available, .. }) if available == &vec![1]
        ));

        draft.stage(RaceEntry::new(1, 210.0, 230.0)).unwrap();
        assert!(draft.is_complete());
        assert!(matches!(
            draft.stage(RaceEntry::new(1, 210.0, 230.0)).unwrap_err().violation(),
            Some(Violation::RaceFull)
        ));

        assert_eq!(store.commit_race(draft).unwrap(), 2);
        assert_eq!(positions_in_race(&store, 2), vec![1, 2]);
    }

    #[test]
    fn test_commit_incomplete_draft_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = bootstrapped(dir.path(), 1, 3);
        let mut draft = store.begin_race().unwrap();
        draft.stage(RaceEntry::new(1, 210.0, 230.0)).unwrap();

        let err = store.commit_race(draft).unwrap_err();

        assert!(matches!(
            err.violation(),
            Some(Violation::IncompleteRace { missing: 2 })
        ));
    }

    #[test]
    fn test_begin_race_missing_ledger_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = bootstrapped(dir.path(), 1, 3);
        let victim = store.index().entries()[1].name.clone();
        std::fs::remove_file(store.pilot_path(&victim)).unwrap();

        let err = store.begin_race().unwrap_err();

        assert!(err.is_not_found());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_history_by_index_and_name() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = bootstrapped(dir.path(), 3, 4);
        let name = store.index().entries()[0].name.clone();

        let by_index = store.history(&Identifier::ByIndex(1)).unwrap();
        let by_name = store.history(&Identifier::ByName(name)).unwrap();

        assert_eq!(by_index, by_name);
        assert_eq!(
            by_index.iter().map(|row| row.0).collect::<Vec<_>>(),
            [1, 2, 3]
        );
    }

    #[test]
    fn test_check_consistency_and_repair() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = bootstrapped(dir.path(), 3, 3);
        let name = store.index().entries()[2].name.clone();
        store.index.set_aggregates(&name, 99.0, 1.0).unwrap();

        let findings = store.check_consistency().unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].pilot(), name);

        let (avg_position, _) = store.recompute_aggregates(&Identifier::ByIndex(3)).unwrap();
        assert!(avg_position <= 3.0);
        assert!(store.check_consistency().unwrap().is_empty());
    }

    #[test]
    fn test_check_consistency_missing_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = bootstrapped(dir.path(), 1, 2);
        let name = store.index().entries()[0].name.clone();
        std::fs::remove_file(store.pilot_path(&name)).unwrap();

        let findings = store.check_consistency().unwrap();

        assert!(matches!(
            &findings[..],
            [Inconsistency::MissingLedger { name: missing, .. }] if missing == &name
        ));
    }

    #[test]
    fn test_reset_all_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = bootstrapped(dir.path(), 2, 5);
        std::fs::write(dir.path().join("orphan.csv"), ",Posición\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        let removed = store.reset_all().unwrap();

        assert_eq!(removed, 6);
        assert!(store.is_first_run());
        assert!(matches!(
            store.index().resolve(&Identifier::ByIndex(1)),
            Err(Error::InvalidIndex { .. })
        ));
        let reopened = open_store(dir.path());
        assert!(reopened.is_first_run());
        assert!(matches!(
            reopened.pilot(&Identifier::ByIndex(1)),
            Err(Error::InvalidIndex { .. })
        ));
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("datos.csv").exists());
    }

    #[test]
    fn test_reset_then_bootstrap_again() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = bootstrapped(dir.path(), 2, 3);
        store.reset_all().unwrap();

        let mut generator = Generator::from_seed(250);
        let names = store
            .bootstrap(1, 2, &mut generator.clone(), &mut generator)
            .unwrap();

        assert_eq!(names.len(), 2);
        assert_eq!(store.index().len(), 2);
    }

    #[test]
    fn test_bootstrap_with_custom_batch() {
        /// Hands out a prepared batch.
        struct Prepared(Option<RaceBatch>);

        impl BatchSource for Prepared {
            fn race_batch(&mut self, _races: usize, _pilots: usize) -> RaceBatch {
                self.0.take().unwrap_or_else(|| RaceBatch::new(Vec::new()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let mut store = open_store(dir.path());
        let mut batches = Prepared(Some(RaceBatch::new(vec![vec![
            RaceEntry::new(1, 200.0, 210.0),
            RaceEntry::new(2, 100.0, 150.0),
        ]])));

        let err = store
            .bootstrap(1, 2, &mut Generator::from_seed(3), &mut batches)
            .unwrap_err();

        // The second pilot's generated entry breaks the speed floor.
        assert!(matches!(err, Error::BootstrapFailed { .. }));
        assert_eq!(store.index().len(), 1);
        // No ledger was created for the rejected pilot.
        let ledgers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(ledgers, 2);
    }
}
