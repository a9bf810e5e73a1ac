//! `pilotlog` - CLI for the pilot race ledger
//!
//! This binary seeds, queries and extends the ledgers managed by the
//! `pilotlog` library.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{bail, Context};
use clap::Parser;

use pilotlog::cli::{
    CheckCommand, Cli, Command, ConfigCommand, InitCommand, RaceCommand, ResetCommand,
    ShowCommand, StatCommand,
};
use pilotlog::{
    init_logging, resolve_statistic, select_many, Config, Generator, Identifier, Inconsistency,
    RaceInput, RecordStore, Selection,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    // Execute the command
    match cli.command {
        Command::Init(cmd) => handle_init(config, &cmd),
        Command::List(cmd) => handle_list(config, cmd.json),
        Command::Show(cmd) => handle_show(config, &cmd),
        Command::Stat(cmd) => handle_stat(config, &cmd),
        Command::Race(cmd) => handle_race(config, cmd),
        Command::Check(cmd) => handle_check(config, &cmd),
        Command::Reset(cmd) => handle_reset(config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn handle_init(config: Config, cmd: &InitCommand) -> anyhow::Result<()> {
    let mut store = RecordStore::open(config)?;
    if !store.is_first_run() {
        println!(
            "Store already holds {} pilots; use `pilotlog reset --yes` to start over.",
            store.index().len()
        );
        return Ok(());
    }

    let generation = store.config().generation.clone();
    let seed = cmd.seed.or(generation.seed);
    let mut names = Generator::new(seed);
    let mut batches = Generator::new(seed.map(|s| s.wrapping_add(1)));
    let races = cmd.races.unwrap_or(generation.default_races);
    let pilots = cmd
        .pilots
        .unwrap_or_else(|| names.pilot_count(generation.min_pilots, generation.max_pilots));

    let registered = store.bootstrap(races, pilots, &mut names, &mut batches)?;
    println!(
        "Registered {} pilots with {} races each.",
        registered.len(),
        races
    );
    Ok(())
}

fn handle_list(config: Config, json: bool) -> anyhow::Result<()> {
    let store = RecordStore::open(config)?;
    let entries = store.index().entries();

    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No pilots registered. Run `pilotlog init` first.");
        return Ok(());
    }

    println!("{:>3}  {:<28} {:>12} {:>12}", "#", "Piloto", "Pos Promedio", "Vel Promedio");
    for (row, entry) in entries.iter().enumerate() {
        println!(
            "{:>3}  {:<28} {:>12.2} {:>12.2}",
            row + 1,
            entry.name,
            entry.avg_position,
            entry.avg_speed
        );
    }
    Ok(())
}

/// Print every identifier that failed to resolve, then stop if none did.
fn report_selection(selection: &Selection) -> anyhow::Result<()> {
    for (raw, err) in &selection.failures {
        eprintln!("Skipping '{raw}': {err}");
    }
    if selection.is_empty() {
        bail!("none of the given pilots could be selected");
    }
    Ok(())
}

fn handle_show(config: Config, cmd: &ShowCommand) -> anyhow::Result<()> {
    let store = RecordStore::open(config)?;
    let selection = select_many(&store, &cmd.pilots);
    report_selection(&selection)?;

    if cmd.json {
        let pilots: Vec<_> = selection
            .pilots
            .iter()
            .map(|record| {
                let races: Vec<_> = record.history().map(|(_, entry)| entry).collect();
                serde_json::json!({ "name": record.name(), "races": races })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&pilots)?);
        return Ok(());
    }

    for record in &selection.pilots {
        println!("{} ({} races)", record.name(), record.race_count());
        println!("  {:>5} {:>9} {:>16} {:>14}", "Race", "Posición", "Velocidad Media", "Velocidad Max");
        for (race, entry) in record.history() {
            println!(
                "  {:>5} {:>9} {:>16} {:>14}",
                race, entry.position, entry.average_speed, entry.max_speed
            );
        }
        println!();
    }
    Ok(())
}

fn handle_stat(config: Config, cmd: &StatCommand) -> anyhow::Result<()> {
    let store = RecordStore::open(config)?;
    let selection = select_many(&store, &cmd.pilots);
    report_selection(&selection)?;

    let Some(sample) = selection.pilots.first() else {
        return Ok(());
    };
    let stat = resolve_statistic(&cmd.statistic, sample)?;

    println!("{stat}");
    for (name, values) in selection.series(stat) {
        let values: Vec<String> = values.iter().map(ToString::to_string).collect();
        println!("  {name}: {}", values.join(", "));
    }
    Ok(())
}

fn handle_race(config: Config, cmd: RaceCommand) -> anyhow::Result<()> {
    let mut store = RecordStore::open(config)?;
    if store.is_first_run() {
        bail!("no pilots registered; run `pilotlog init` first");
    }

    let updated = if cmd.random {
        let mut generator = Generator::new(cmd.seed.or(store.config().generation.seed));
        store.add_race_for_all(RaceInput::Random(&mut generator))?
    } else {
        store.add_race_for_all(RaceInput::Manual(cmd.entries))?
    };

    println!("Recorded a new race for {updated} pilots.");
    Ok(())
}

fn handle_check(config: Config, cmd: &CheckCommand) -> anyhow::Result<()> {
    let mut store = RecordStore::open(config)?;
    let findings = store.check_consistency()?;
    if findings.is_empty() {
        println!("Index and ledgers agree for {} pilots.", store.index().len());
        return Ok(());
    }

    for finding in &findings {
        match finding {
            Inconsistency::MissingLedger { name, path } => {
                println!("{name}: ledger missing at {}", path.display());
            }
            Inconsistency::OrphanLedger { name, path } => {
                println!("{name}: {} is not in the index", path.display());
            }
            Inconsistency::AggregateDrift {
                name,
                stored,
                actual,
            } => {
                println!(
                    "{name}: index has ({:.4}, {:.4}), history gives ({:.4}, {:.4})",
                    stored.0, stored.1, actual.0, actual.1
                );
            }
        }
    }

    if !cmd.repair {
        bail!(
            "{} inconsistencies found; rerun with --repair to fix averages and adopt unindexed ledgers",
            findings.len()
        );
    }

    let mut unrepaired = 0;
    for finding in &findings {
        match finding {
            Inconsistency::AggregateDrift { name, .. } => {
                store.recompute_aggregates(&Identifier::ByName(name.clone()))?;
                println!("{name}: averages recomputed");
            }
            Inconsistency::OrphanLedger { name, .. } => match store.adopt_ledger(name) {
                Ok(_) => println!("{name}: added to the index"),
                Err(err) => {
                    println!("{name}: cannot adopt ledger: {err}");
                    unrepaired += 1;
                }
            },
            Inconsistency::MissingLedger { .. } => unrepaired += 1,
        }
    }
    if unrepaired > 0 {
        bail!("{unrepaired} inconsistencies could not be repaired");
    }
    Ok(())
}

fn handle_reset(config: Config, cmd: &ResetCommand) -> anyhow::Result<()> {
    let mut store = RecordStore::open(config)?;
    if !cmd.yes {
        println!(
            "This deletes all {} pilot ledgers and the master index.",
            store.index().len()
        );
        println!("Use --yes to confirm.");
        return Ok(());
    }

    let removed = store.reset_all()?;
    println!("Removed {removed} ledger files. The store is empty.");
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Data directory:     {}", config.data_dir().display());
                println!("  Index file:         {}", config.index_path().display());
                println!("  Ledger extension:   {}", config.ledger_extension());
                println!();
                println!("[Generation]");
                match config.generation.seed {
                    Some(seed) => println!("  Seed:               {seed}"),
                    None => println!("  Seed:               (random)"),
                }
                println!("  Default races:      {}", config.generation.default_races);
                println!(
                    "  Pilot range:        {}..={}",
                    config.generation.min_pilots, config.generation.max_pilots
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
