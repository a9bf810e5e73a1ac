//! Resolving user input into pilots and statistics.

use tracing::debug;

use crate::error::{Error, Result};
use crate::index::{Identifier, MasterIndex};
use crate::pilot::{PilotRecord, Statistic};
use crate::store::RecordStore;

/// Resolve raw input to a canonical pilot name.
///
/// # Errors
///
/// Returns [`Error::InvalidIndex`] or [`Error::UnknownPilot`].
pub fn resolve_pilot(identifier: &str, index: &MasterIndex) -> Result<String> {
    index
        .resolve(&Identifier::parse(identifier))
        .map(str::to_string)
}

/// Check that `name` is a statistic tracked by `sample`.
///
/// The name may be a ledger column header or a field name; the resolved
/// column must be present in the sample's ledger header.
///
/// # Errors
///
/// Returns [`Error::UnknownStatistic`] if no column of the record matches.
pub fn resolve_statistic(name: &str, sample: &PilotRecord) -> Result<Statistic> {
    let unknown = || Error::UnknownStatistic {
        name: name.to_string(),
        expected: sample.columns().join(", "),
    };
    let stat: Statistic = name.parse().map_err(|_| unknown())?;
    if !sample.columns().iter().any(|c| c == stat.column()) {
        return Err(unknown());
    }
    debug!("Resolved statistic {} against {}", stat, sample.name());
    Ok(stat)
}

/// Outcome of resolving several identifiers at once.
#[derive(Debug, Default)]
pub struct Selection {
    /// Loaded records in first-resolved order, one per pilot.
    pub pilots: Vec<PilotRecord>,
    /// Inputs that could not be resolved or loaded, with the reason.
    pub failures: Vec<(String, Error)>,
}

impl Selection {
    /// Whether no pilot was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pilots.is_empty()
    }

    /// Canonical names of the selected pilots.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.pilots.iter().map(PilotRecord::name)
    }

    /// Look up a selected pilot by canonical name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PilotRecord> {
        self.pilots.iter().find(|p| p.name() == name)
    }

    /// `(name, values)` for one statistic across every selected pilot.
    #[must_use]
    pub fn series(&self, stat: Statistic) -> Vec<(&str, Vec<f64>)> {
        self.pilots
            .iter()
            .map(|p| (p.name(), p.series(stat)))
            .collect()
    }
}

/// Resolve and load every identifier, collecting failures instead of
/// stopping at the first one.
///
/// A pilot named more than once appears once, at its first position.
pub fn select_many<I, S>(store: &RecordStore, identifiers: I) -> Selection
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut selection = Selection::default();
    for raw in identifiers {
        let raw = raw.as_ref();
        match store.pilot(&Identifier::parse(raw)) {
            Ok(record) => {
                if selection.get(record.name()).is_none() {
                    selection.pilots.push(record);
                }
            }
            Err(err) => {
                debug!("Could not select {}: {}", raw, err);
                selection.failures.push((raw.to_string(), err));
            }
        }
    }
    selection
}
