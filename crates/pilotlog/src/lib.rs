//! `pilotlog` - A flat-file race ledger for a roster of pilots
//!
//! Each pilot's race history lives in its own CSV ledger; a master index
//! keeps every pilot's running average position and speed. The library
//! covers ledger I/O, the record store that keeps the files in step, and
//! the lookup layer used by the `pilotlog` binary.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod generate;
pub mod index;
pub mod ledger;
pub mod logging;
pub mod pilot;
pub mod query;
pub mod store;

pub use config::Config;
pub use error::{Error, Result, Violation};
pub use generate::{BatchSource, Generator, NameSource, RaceBatch};
pub use index::{Identifier, IndexEntry, MasterIndex};
pub use logging::init_logging;
pub use pilot::{PilotRecord, RaceEntry, Statistic};
pub use query::{resolve_pilot, resolve_statistic, select_many, Selection};
pub use store::{Inconsistency, RaceDraft, RaceInput, RecordStore};
