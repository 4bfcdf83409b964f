use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use super::pass::recompute;
use crate::cli::RecomputeArgs;
use crate::commands::audit::record_study_snapshot;
use crate::commands::weights::load_weight_set;
use crate::model::RecomputeRunManifest;
use crate::store::{self, runs};
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: RecomputeArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("recompute-{}", utc_compact_string(started_ts));

    let db_path = args.store.resolve_db_path();
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.store.manifest_dir().join(format!(
            "recompute_run_{}.json",
            utc_compact_string(started_ts)
        ))
    });

    info!(
        run_id = %run_id,
        db_path = %db_path.display(),
        study_id = args.study_id.as_deref().unwrap_or("(all)"),
        "starting recompute"
    );

    if let Some(parent) = db_path.parent() {
        crate::util::ensure_directory(parent)?;
    }
    let mut connection = store::open_database(&db_path)?;

    let weights = load_weight_set(&connection)?;
    let weight_sum = weights.sum();
    let mut warnings = Vec::new();
    if weights.drifts_from_unit_sum() {
        warn!(
            weight_sum,
            "active weights do not sum to 1.0; composite scores are off the nominal 0-100 scale"
        );
        warnings.push(format!(
            "active weight sum is {weight_sum:.6}; composites are a weighted sum, not a percentage"
        ));
    }

    let outcome = recompute(&mut connection, args.study_id.as_deref(), &weights)?;

    let mut audit_blocks_recorded = 0_usize;
    if args.record_audit {
        for summary in &outcome.studies {
            match record_study_snapshot(&mut connection, &summary.study_id, &summary.study_score)
            {
                Ok(block) => {
                    audit_blocks_recorded += 1;
                    info!(
                        study_id = %summary.study_id,
                        block_number = block.block_number,
                        tx_hash = %block.tx_hash,
                        "recorded audit block"
                    );
                }
                Err(err) => {
                    warn!(study_id = %summary.study_id, error = %err, "audit record failed");
                    warnings.push(format!(
                        "audit record failed for {}: {err:#}",
                        summary.study_id
                    ));
                }
            }
        }
    }

    for summary in &outcome.studies {
        if !summary.subjects_skipped.is_empty() {
            warnings.push(format!(
                "{}: {} of {} subjects skipped; aggregates use their previous records",
                summary.study_id,
                summary.subjects_skipped.len(),
                summary.subjects_total
            ));
        }
    }

    let status = if outcome.failures.is_empty() {
        "completed"
    } else {
        "completed_with_failures"
    };
    let completed_at = now_utc_string();

    let manifest = RecomputeRunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status: status.to_string(),
        started_at: started_at.clone(),
        completed_at: completed_at.clone(),
        requested_study_id: args.study_id.clone(),
        db_path: db_path.display().to_string(),
        weight_sum,
        weights: weights.manifest_entries(),
        studies: outcome.studies.clone(),
        failures: outcome.failures.clone(),
        audit_blocks_recorded,
        warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote recompute run manifest");

    runs::insert_run(
        &connection,
        &runs::RunRecord {
            run_id,
            started_at,
            completed_at,
            requested_study_id: args.study_id.clone(),
            status: status.to_string(),
            studies_completed: outcome.studies.len(),
            studies_failed: outcome.failures.len(),
            subjects_skipped: outcome.subjects_skipped(),
            weight_sum,
            manifest_path: Some(manifest_path.display().to_string()),
        },
    )?;

    if !outcome.failures.is_empty() {
        let failed: Vec<&str> = outcome
            .failures
            .iter()
            .map(|failure| failure.study_id.as_str())
            .collect();
        bail!(
            "recompute failed for {} study(ies): {}",
            failed.len(),
            failed.join(", ")
        );
    }

    info!(studies = outcome.studies.len(), "recompute completed");
    Ok(())
}
