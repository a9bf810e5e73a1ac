//! Synthetic pilots and race results.
//!
//! The store depends on two capabilities: a supply of unique pilot names and
//! a supply of valid [`RaceBatch`]es. [`Generator`] provides both from one
//! seedable `ChaCha8Rng`, so a fixed seed reproduces the same data.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::pilot::RaceEntry;

/// Produces candidate pilot names.
pub trait NameSource {
    /// Return a name not returned before by this source.
    fn candidate_name(&mut self) -> String;
}

/// Produces synthetic race results.
pub trait BatchSource {
    /// Produce `races` races for `pilots` pilots.
    fn race_batch(&mut self, races: usize, pilots: usize) -> RaceBatch;
}

/// Generated results for a block of races.
///
/// `races[r][p]` is pilot `p`'s entry in race `r`. Within a race the
/// positions are a permutation of `1..=pilots`.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceBatch {
    races: Vec<Vec<RaceEntry>>,
}

impl RaceBatch {
    /// Wrap pre-built race rows.
    #[must_use]
    pub fn new(races: Vec<Vec<RaceEntry>>) -> Self {
        Self { races }
    }

    /// Number of races.
    #[must_use]
    pub fn race_count(&self) -> usize {
        self.races.len()
    }

    /// Entries of one race, one per pilot.
    #[must_use]
    pub fn race(&self, race: usize) -> Option<&[RaceEntry]> {
        self.races.get(race).map(Vec::as_slice)
    }

    /// All races of one pilot, in race order.
    pub fn pilot(&self, pilot: usize) -> impl Iterator<Item = RaceEntry> + '_ {
        self.races.iter().filter_map(move |race| race.get(pilot).copied())
    }
}

/// Lowest generated average speed.
pub const MIN_AVERAGE_SPEED: u32 = 151;
/// Highest generated average speed.
pub const MAX_AVERAGE_SPEED: u32 = 249;

const FIRST_NAMES: &[&str] = &[
    "Ana", "Bruno", "Carla", "Diego", "Elena", "Fabio", "Gloria", "Hugo", "Irene", "Javier",
    "Karen", "Lucas", "Marta", "Nicolas", "Olga", "Pablo", "Rosa", "Sergio", "Teresa", "Victor",
];

const LAST_NAMES: &[&str] = &[
    "Alvarez", "Benitez", "Castro", "Dominguez", "Espinoza", "Flores", "Garcia", "Herrera",
    "Ibarra", "Jimenez", "Lopez", "Morales", "Navarro", "Ortega", "Paredes", "Quintero",
    "Ramos", "Salazar", "Torres", "Vargas",
];

/// Seeded generator for names and race batches.
#[derive(Debug, Clone)]
pub struct Generator {
    rng: ChaCha8Rng,
    issued: HashSet<String>,
}

impl Generator {
    /// Create a generator with a fixed seed.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Create a generator seeded from the operating system.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::with_rng(ChaCha8Rng::from_entropy())
    }

    /// Create a generator with `seed` if given, otherwise from entropy.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::from_seed)
    }

    fn with_rng(rng: ChaCha8Rng) -> Self {
        Self {
            rng,
            issued: HashSet::new(),
        }
    }

    /// Draw a pilot count in `min..=max`.
    pub fn pilot_count(&mut self, min: usize, max: usize) -> usize {
        self.rng.gen_range(min..=max.max(min))
    }

    fn race(&mut self, pilots: usize) -> Vec<RaceEntry> {
        let top = u32::try_from(pilots).unwrap_or(u32::MAX);
        let mut positions: Vec<u32> = (1..=top).collect();
        positions.shuffle(&mut self.rng);

        // Best speed goes to first place.
        let mut speeds: Vec<u32> = (0..pilots)
            .map(|_| self.rng.gen_range(MIN_AVERAGE_SPEED..=MAX_AVERAGE_SPEED))
            .collect();
        speeds.sort_unstable_by(|a, b| b.cmp(a));

        positions
            .into_iter()
            .map(|position| {
                let average = speeds[position as usize - 1];
                let max = average + self.rng.gen_range(10..25);
                RaceEntry::new(position, f64::from(average), f64::from(max))
            })
            .collect()
    }
}

impl NameSource for Generator {
    fn candidate_name(&mut self) -> String {
        let combinations = FIRST_NAMES.len() * LAST_NAMES.len();
        loop {
            let first = FIRST_NAMES[self.rng.gen_range(0..FIRST_NAMES.len())];
            let last = LAST_NAMES[self.rng.gen_range(0..LAST_NAMES.len())];
            let mut name = format!("{first} {last}");
            if self.issued.len() >= combinations {
                name = format!("{name} {}", self.issued.len() / combinations + 1);
            }
            if self.issued.insert(name.clone()) {
                return name;
            }
        }
    }
}

impl BatchSource for Generator {
    fn race_batch(&mut self, races: usize, pilots: usize) -> RaceBatch {
        RaceBatch::new((0..races).map(|_| self.race(pilots)).collect())
    }
}
