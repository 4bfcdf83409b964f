use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{SetWeightArgs, WeightsArgs, WeightsCommand};
use crate::dqi::{BlockerCategory, WeightEntry, WeightSet};
use crate::store::{self, weights as weight_store};
use crate::util::{ensure_directory, write_json_stdout};

pub fn run(args: WeightsArgs) -> Result<()> {
    let db_path = args.store.resolve_db_path();
    if let Some(parent) = db_path.parent() {
        ensure_directory(parent)?;
    }
    let mut connection = store::open_database(&db_path)?;

    match args.command {
        WeightsCommand::Init => {
            let (created, updated) = init_default_weights(&mut connection)?;
            info!(created, updated, "initialized DQI weights");
            Ok(())
        }
        WeightsCommand::Show(show) => show_weights(&connection, show.json),
        WeightsCommand::Set(set) => set_weight(&connection, &set),
        WeightsCommand::Import(import) => {
            let (created, updated) = import_weights(&mut connection, &import.input)?;
            info!(
                path = %import.input.display(),
                created,
                updated,
                "imported DQI weights"
            );
            Ok(())
        }
    }
}

/// Reads the registry once into an immutable weight set for a scoring pass.
pub fn load_weight_set(connection: &Connection) -> Result<WeightSet> {
    let entries = weight_store::load_weight_entries(connection)?;
    if entries.is_empty() {
        info!("weight registry is empty; using default weights");
        return Ok(WeightSet::default_weights());
    }

    for entry in &entries {
        if BlockerCategory::from_metric_name(&entry.metric_name).is_none() {
            warn!(metric = %entry.metric_name, "ignoring registry entry for unknown metric");
        }
    }

    Ok(WeightSet::from_entries(&entries))
}

pub fn init_default_weights(connection: &mut Connection) -> Result<(usize, usize)> {
    let entries: Vec<WeightEntry> = BlockerCategory::ALL
        .into_iter()
        .map(WeightEntry::default_for)
        .collect();
    upsert_entries(connection, &entries)
}

fn import_weights(connection: &mut Connection, path: &Path) -> Result<(usize, usize)> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let entries: Vec<WeightEntry> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    upsert_entries(connection, &entries)
}

/// Registry keys are stored trimmed so the scorer's exact-name lookup finds them.
fn upsert_entries(connection: &mut Connection, entries: &[WeightEntry]) -> Result<(usize, usize)> {
    let entries: Vec<WeightEntry> = entries
        .iter()
        .map(|entry| WeightEntry {
            metric_name: entry.metric_name.trim().to_string(),
            ..entry.clone()
        })
        .collect();
    for entry in &entries {
        validate_entry(entry)?;
    }

    let tx = connection.transaction()?;
    let mut created = 0_usize;
    let mut updated = 0_usize;
    for entry in &entries {
        if weight_store::upsert_weight_entry(&tx, entry)? {
            created += 1;
        } else {
            updated += 1;
        }
    }
    tx.commit()?;

    Ok((created, updated))
}

fn validate_entry(entry: &WeightEntry) -> Result<()> {
    if BlockerCategory::from_metric_name(&entry.metric_name).is_none() {
        let known: Vec<&str> = BlockerCategory::ALL
            .into_iter()
            .map(BlockerCategory::metric_name)
            .collect();
        bail!(
            "unknown metric {}; expected one of: {}",
            entry.metric_name,
            known.join(", ")
        );
    }
    if !entry.weight.is_finite() || !(0.0..=1.0).contains(&entry.weight) {
        bail!(
            "weight for {} must be within [0, 1], got {}",
            entry.metric_name,
            entry.weight
        );
    }
    Ok(())
}

fn set_weight(connection: &Connection, args: &SetWeightArgs) -> Result<()> {
    let Some(category) = BlockerCategory::from_metric_name(args.metric.trim()) else {
        bail!("unknown metric {}", args.metric);
    };

    let existing = weight_store::load_weight_entries(connection)?
        .into_iter()
        .find(|entry| entry.metric_name == category.metric_name());
    let mut entry = existing.unwrap_or_else(|| WeightEntry::default_for(category));

    if let Some(weight) = args.weight {
        entry.weight = weight;
    }
    if args.active {
        entry.is_active = true;
    }
    if args.inactive {
        entry.is_active = false;
    }
    validate_entry(&entry)?;

    weight_store::upsert_weight_entry(connection, &entry)?;
    let sum = load_weight_set(connection)?.sum();
    info!(
        metric = %entry.metric_name,
        weight = entry.weight,
        is_active = entry.is_active,
        weight_sum = sum,
        "updated DQI weight"
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct WeightReport {
    weight_sum: f64,
    drifts_from_unit_sum: bool,
    weights: Vec<crate::model::WeightManifestEntry>,
}

fn show_weights(connection: &Connection, json: bool) -> Result<()> {
    let weights = load_weight_set(connection)?;
    let report = WeightReport {
        weight_sum: weights.sum(),
        drifts_from_unit_sum: weights.drifts_from_unit_sum(),
        weights: weights.manifest_entries(),
    };

    if json {
        return write_json_stdout(&report);
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    for entry in &report.weights {
        writeln!(
            output,
            "{}\t{:.3}\t{}",
            entry.metric_name, entry.weight, entry.source
        )?;
    }
    writeln!(output, "sum\t{:.6}", report.weight_sum)?;
    if report.drifts_from_unit_sum {
        writeln!(
            output,
            "warning\tactive weights do not sum to 1.0; composite scores are a weighted sum"
        )?;
    }
    output.flush()?;
    Ok(())
}
