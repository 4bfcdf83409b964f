use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "0.3.0";

pub fn open_database(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    configure_connection(&connection)?;
    ensure_schema(&connection)?;
    Ok(connection)
}

#[cfg(test)]
pub fn open_in_memory() -> Result<Connection> {
    let connection = Connection::open_in_memory().context("failed to open in-memory database")?;
    ensure_schema(&connection)?;
    Ok(connection)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .busy_timeout(Duration::from_secs(30))
        .context("failed to set busy_timeout")?;
    Ok(())
}

pub fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS studies (
          study_id TEXT PRIMARY KEY,
          study_name TEXT
        );

        CREATE TABLE IF NOT EXISTS sites (
          site_id TEXT PRIMARY KEY,
          study_id TEXT NOT NULL,
          site_number TEXT,
          site_name TEXT,
          FOREIGN KEY(study_id) REFERENCES studies(study_id)
        );

        CREATE TABLE IF NOT EXISTS subjects (
          subject_id TEXT PRIMARY KEY,
          study_id TEXT NOT NULL,
          site_id TEXT NOT NULL,
          external_id TEXT,
          FOREIGN KEY(study_id) REFERENCES studies(study_id),
          FOREIGN KEY(site_id) REFERENCES sites(site_id)
        );

        CREATE TABLE IF NOT EXISTS subject_facts (
          subject_id TEXT PRIMARY KEY,
          missing_visits INTEGER NOT NULL DEFAULT 0,
          missing_pages INTEGER NOT NULL DEFAULT 0,
          open_queries INTEGER NOT NULL DEFAULT 0,
          non_conformant_events INTEGER NOT NULL DEFAULT 0,
          sae_discrepancies INTEGER NOT NULL DEFAULT 0,
          coding_uncoded INTEGER NOT NULL DEFAULT 0,
          edrr_open_issues INTEGER NOT NULL DEFAULT 0,
          sdv_completion_pct REAL,
          pi_signature_completion_pct REAL,
          FOREIGN KEY(subject_id) REFERENCES subjects(subject_id)
        );

        CREATE TABLE IF NOT EXISTS dqi_weights (
          metric_name TEXT PRIMARY KEY,
          weight REAL NOT NULL,
          description TEXT,
          is_active INTEGER NOT NULL DEFAULT 1,
          updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS clean_status (
          subject_id TEXT PRIMARY KEY,
          is_clean INTEGER NOT NULL,
          has_missing_visits INTEGER NOT NULL,
          missing_visits_count INTEGER NOT NULL,
          has_missing_pages INTEGER NOT NULL,
          missing_pages_count INTEGER NOT NULL,
          has_open_queries INTEGER NOT NULL,
          open_queries_count INTEGER NOT NULL,
          has_non_conformant INTEGER NOT NULL,
          non_conformant_count INTEGER NOT NULL,
          has_sae_discrepancies INTEGER NOT NULL,
          sae_discrepancy_count INTEGER NOT NULL,
          sdv_incomplete INTEGER NOT NULL,
          sdv_completion_pct REAL NOT NULL,
          pi_signature_incomplete INTEGER NOT NULL,
          pi_signature_completion_pct REAL NOT NULL,
          has_coding_backlog INTEGER NOT NULL,
          coding_uncoded_count INTEGER NOT NULL,
          has_edrr_issues INTEGER NOT NULL,
          edrr_open_issue_count INTEGER NOT NULL,
          blockers_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS subject_scores (
          subject_id TEXT PRIMARY KEY,
          sae_score REAL NOT NULL,
          missing_visits_score REAL NOT NULL,
          missing_pages_score REAL NOT NULL,
          open_queries_score REAL NOT NULL,
          non_conformant_score REAL NOT NULL,
          sdv_score REAL NOT NULL,
          pi_signature_score REAL NOT NULL,
          coding_score REAL NOT NULL,
          edrr_score REAL NOT NULL,
          composite_score REAL NOT NULL,
          risk_band TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS site_scores (
          site_id TEXT PRIMARY KEY,
          total_subjects INTEGER NOT NULL,
          clean_subjects INTEGER NOT NULL,
          clean_percentage REAL NOT NULL,
          composite_score REAL NOT NULL,
          risk_band TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS study_scores (
          study_id TEXT PRIMARY KEY,
          total_sites INTEGER NOT NULL,
          total_subjects INTEGER NOT NULL,
          clean_subjects INTEGER NOT NULL,
          clean_percentage REAL NOT NULL,
          composite_score REAL NOT NULL,
          readiness_status TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS recompute_runs (
          run_id TEXT PRIMARY KEY,
          started_at TEXT NOT NULL,
          completed_at TEXT NOT NULL,
          requested_study_id TEXT,
          status TEXT NOT NULL,
          studies_completed INTEGER NOT NULL,
          studies_failed INTEGER NOT NULL,
          subjects_skipped INTEGER NOT NULL,
          weight_sum REAL NOT NULL,
          manifest_path TEXT
        );

        CREATE TABLE IF NOT EXISTS audit_chain (
          block_number INTEGER PRIMARY KEY,
          tx_hash TEXT NOT NULL UNIQUE,
          event_type TEXT NOT NULL,
          description TEXT NOT NULL,
          entity_type TEXT NOT NULL,
          entity_id TEXT NOT NULL,
          data_snapshot TEXT NOT NULL,
          data_hash TEXT NOT NULL,
          previous_hash TEXT NOT NULL,
          recorded_by TEXT NOT NULL,
          recorded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sites_study ON sites(study_id);
        CREATE INDEX IF NOT EXISTS idx_subjects_study_site ON subjects(study_id, site_id);
        CREATE INDEX IF NOT EXISTS idx_audit_chain_entity ON audit_chain(entity_type, entity_id);
        ",
        )
        .context("failed to create schema")?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_opened_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

pub fn query_count(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection
        .query_row(sql, [], |row| row.get(0))
        .with_context(|| format!("failed to count rows: {sql}"))?;
    Ok(count)
}
