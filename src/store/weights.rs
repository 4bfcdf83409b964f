use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::dqi::WeightEntry;
use crate::util::now_utc_string;

pub fn load_weight_entries(connection: &Connection) -> Result<Vec<WeightEntry>> {
    let mut statement = connection.prepare(
        "
        SELECT metric_name, weight, is_active, description
        FROM dqi_weights
        ORDER BY metric_name ASC
        ",
    )?;
    let rows = statement.query_map([], |row| {
        Ok(WeightEntry {
            metric_name: row.get(0)?,
            weight: row.get(1)?,
            is_active: row.get(2)?,
            description: row.get(3)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<WeightEntry>>>()
        .context("failed to load weight registry")
}

/// Returns true when the metric was newly created.
pub fn upsert_weight_entry(connection: &Connection, entry: &WeightEntry) -> Result<bool> {
    let existed: bool = connection
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM dqi_weights WHERE metric_name = ?1)",
            [&entry.metric_name],
            |row| row.get(0),
        )
        .with_context(|| format!("failed to look up weight {}", entry.metric_name))?;

    connection
        .execute(
            "
            INSERT INTO dqi_weights(metric_name, weight, description, is_active, updated_at)
            VALUES(?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(metric_name) DO UPDATE SET
              weight=excluded.weight,
              description=COALESCE(excluded.description, dqi_weights.description),
              is_active=excluded.is_active,
              updated_at=excluded.updated_at
            ",
            params![
                entry.metric_name,
                entry.weight,
                entry.description,
                entry.is_active,
                now_utc_string(),
            ],
        )
        .with_context(|| format!("failed to write weight {}", entry.metric_name))?;

    Ok(!existed)
}
