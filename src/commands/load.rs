use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::cli::LoadArgs;
use crate::model::{LoadRunManifest, TrialExtract};
use crate::store::{self, facts};
use crate::util::{ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadCounts {
    pub studies: usize,
    pub sites: usize,
    pub subjects: usize,
    pub fact_rows_written: usize,
    pub fact_rows_cleared: usize,
}

pub fn run(args: LoadArgs) -> Result<()> {
    let started = Utc::now();
    let run_id = format!("load-{}", utc_compact_string(started));
    let db_path = args.store.resolve_db_path();
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.store
            .manifest_dir()
            .join(format!("load_run_{}.json", utc_compact_string(started)))
    });

    let extract = read_extract(&args.input)?;
    let source_sha256 = sha256_file(&args.input)?;

    if let Some(parent) = db_path.parent() {
        ensure_directory(parent)?;
    }
    let mut connection = store::open_database(&db_path)?;
    let counts = import_extract(&mut connection, &extract)?;

    let manifest = LoadRunManifest {
        manifest_version: 1,
        run_id,
        generated_at: now_utc_string(),
        source_path: args.input.display().to_string(),
        source_sha256,
        db_path: db_path.display().to_string(),
        studies_upserted: counts.studies,
        sites_upserted: counts.sites,
        subjects_upserted: counts.subjects,
        fact_rows_written: counts.fact_rows_written,
        fact_rows_cleared: counts.fact_rows_cleared,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        studies = counts.studies,
        sites = counts.sites,
        subjects = counts.subjects,
        facts_written = counts.fact_rows_written,
        facts_cleared = counts.fact_rows_cleared,
        manifest = %manifest_path.display(),
        "load completed"
    );
    Ok(())
}

fn read_extract(path: &Path) -> Result<TrialExtract> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse extract {}", path.display()))
}

/// Upserts the roster and replaces facts in one transaction.
///
/// A subject listed without facts has its stored facts removed, so the next recompute
/// treats it as having no recorded issues.
pub fn import_extract(connection: &mut Connection, extract: &TrialExtract) -> Result<LoadCounts> {
    validate_extract(extract)?;

    let tx = connection.transaction()?;
    let mut counts = LoadCounts::default();

    for study in &extract.studies {
        facts::upsert_study(&tx, &study.study_id, study.study_name.as_deref())?;
        counts.studies += 1;

        for site in &study.sites {
            facts::upsert_site(
                &tx,
                &study.study_id,
                &facts::SiteRow {
                    site_id: site.site_id.clone(),
                    site_number: site.site_number.clone(),
                    site_name: site.site_name.clone(),
                },
            )?;
            counts.sites += 1;

            for subject in &site.subjects {
                facts::upsert_subject(
                    &tx,
                    &study.study_id,
                    &facts::SubjectRow {
                        subject_id: subject.subject_id.clone(),
                        site_id: site.site_id.clone(),
                        external_id: subject.external_id.clone(),
                    },
                )?;
                counts.subjects += 1;

                match &subject.facts {
                    Some(subject_facts) => {
                        facts::replace_facts(&tx, &subject.subject_id, subject_facts)?;
                        counts.fact_rows_written += 1;
                    }
                    None => {
                        if facts::clear_facts(&tx, &subject.subject_id)? {
                            debug!(subject_id = %subject.subject_id, "cleared stored facts");
                            counts.fact_rows_cleared += 1;
                        }
                    }
                }
            }
        }
    }

    tx.commit()?;
    Ok(counts)
}

fn validate_extract(extract: &TrialExtract) -> Result<()> {
    for study in &extract.studies {
        if study.study_id.trim().is_empty() {
            bail!("extract contains a study with an empty study_id");
        }
        for site in &study.sites {
            if site.site_id.trim().is_empty() {
                bail!("study {} has a site with an empty site_id", study.study_id);
            }
            for subject in &site.subjects {
                if subject.subject_id.trim().is_empty() {
                    bail!("site {} has a subject with an empty subject_id", site.site_id);
                }
                if let Some(subject_facts) = &subject.facts {
                    for (field, value) in [
                        ("sdv_completion_pct", subject_facts.sdv_completion_pct),
                        (
                            "pi_signature_completion_pct",
                            subject_facts.pi_signature_completion_pct,
                        ),
                    ] {
                        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                            bail!(
                                "subject {} has {field} outside [0, 100]: {value}",
                                subject.subject_id
                            );
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
