use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::weights::load_weight_set;
use crate::store::{self, query_count, runs};

pub fn run(args: StatusArgs) -> Result<()> {
    let db_path = args.store.resolve_db_path();
    info!(cache_root = %args.store.cache_root.display(), "status requested");

    if !db_path.exists() {
        warn!(path = %db_path.display(), "database file missing");
        return Ok(());
    }

    let connection = store::open_database(&db_path)?;
    log_status(&connection, &db_path)
}

fn log_status(connection: &Connection, db_path: &Path) -> Result<()> {
    let count = |table: &str| query_count(connection, &format!("SELECT COUNT(*) FROM {table}"));

    info!(
        path = %db_path.display(),
        studies = count("studies")?,
        sites = count("sites")?,
        subjects = count("subjects")?,
        fact_rows = count("subject_facts")?,
        "fact store"
    );

    info!(
        clean_status = count("clean_status")?,
        subject_scores = count("subject_scores")?,
        site_scores = count("site_scores")?,
        study_scores = count("study_scores")?,
        audit_blocks = count("audit_chain")?,
        "computed records"
    );

    let weights = load_weight_set(connection)?;
    let registry_entries = count("dqi_weights")?;
    if weights.drifts_from_unit_sum() {
        warn!(
            registry_entries,
            weight_sum = weights.sum(),
            "active weights do not sum to 1.0"
        );
    } else {
        info!(registry_entries, weight_sum = weights.sum(), "weight registry");
    }

    match runs::latest_run(connection)? {
        Some(run) => info!(
            run_id = %run.run_id,
            status = %run.status,
            started_at = %run.started_at,
            completed_at = %run.completed_at,
            study_id = %run.requested_study_id.unwrap_or_else(|| "(all)".to_string()),
            studies_completed = run.studies_completed,
            studies_failed = run.studies_failed,
            subjects_skipped = run.subjects_skipped,
            manifest = %run.manifest_path.unwrap_or_default(),
            "latest recompute run"
        ),
        None => warn!("no recompute run recorded"),
    }

    Ok(())
}
