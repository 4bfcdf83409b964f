use anyhow::{Result, bail};
use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, error, info, warn};

use crate::dqi::{
    FactsPolicy, FactsSource, SubjectOutcome, WeightSet, aggregate_site, aggregate_study,
    evaluate_clean_status, resolve_facts, score_subject,
};
use crate::model::{SkippedSubject, StudyFailure, StudyRunSummary};
use crate::store::{facts, scores};

#[derive(Debug, Default)]
pub struct RecomputeOutcome {
    pub studies: Vec<StudyRunSummary>,
    pub failures: Vec<StudyFailure>,
}

impl RecomputeOutcome {
    pub fn subjects_skipped(&self) -> usize {
        self.studies
            .iter()
            .map(|summary| summary.subjects_skipped.len())
            .sum()
    }
}

/// Recompute one study, or every study when `study_id` is `None`.
///
/// An explicitly requested study that fails is returned as an error. In the all-studies
/// mode each study commits independently and failures are collected instead.
pub fn recompute(
    connection: &mut Connection,
    study_id: Option<&str>,
    weights: &WeightSet,
) -> Result<RecomputeOutcome> {
    let mut outcome = RecomputeOutcome::default();

    if let Some(study_id) = study_id {
        outcome
            .studies
            .push(recompute_study(connection, study_id, weights)?);
        return Ok(outcome);
    }

    let study_ids = facts::list_study_ids(connection)?;
    info!(studies = study_ids.len(), "recomputing all studies");

    for study_id in study_ids {
        match recompute_study(connection, &study_id, weights) {
            Ok(summary) => outcome.studies.push(summary),
            Err(err) => {
                error!(study_id = %study_id, error = %err, "study recompute failed; nothing committed");
                outcome.failures.push(StudyFailure {
                    study_id,
                    reason: format!("{err:#}"),
                });
            }
        }
    }

    Ok(outcome)
}

/// Full overwrite of every record in one study's scope inside a single write transaction.
///
/// Phase 1 scores each subject, phase 2 rolls the stored subject records up per site,
/// phase 3 rolls all subjects up to the study. Returning early drops the transaction,
/// which rolls back everything written for this study.
pub fn recompute_study(
    connection: &mut Connection,
    study_id: &str,
    weights: &WeightSet,
) -> Result<StudyRunSummary> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if facts::find_study(&tx, study_id)?.is_none() {
        bail!("study not found: {study_id}");
    }

    let subjects = facts::list_subjects(&tx, study_id)?;
    let mut subjects_processed = 0_usize;
    let mut subjects_defaulted = 0_usize;
    let mut subjects_at_risk = 0_usize;
    let mut subjects_skipped = Vec::new();

    for subject in &subjects {
        let raw = facts::lookup_facts(&tx, &subject.subject_id)?;
        let (blocker_facts, source) = match resolve_facts(raw.as_ref(), FactsPolicy::AssumeClean) {
            Ok(resolved) => resolved,
            Err(fault) => {
                warn!(
                    study_id = %study_id,
                    subject_id = %subject.subject_id,
                    error = %fault,
                    "skipping subject; previous records left in place"
                );
                subjects_skipped.push(SkippedSubject {
                    subject_id: subject.subject_id.clone(),
                    reason: fault.to_string(),
                });
                continue;
            }
        };

        if source == FactsSource::Defaulted {
            subjects_defaulted += 1;
        }

        let clean_status = evaluate_clean_status(&blocker_facts);
        let score = score_subject(&blocker_facts, weights);
        scores::upsert_clean_status(&tx, &subject.subject_id, &clean_status)?;
        scores::upsert_subject_score(&tx, &subject.subject_id, &score)?;
        if score.risk_band.is_at_risk() {
            subjects_at_risk += 1;
        }
        subjects_processed += 1;
    }

    let outcomes = scores::load_study_outcomes(&tx, study_id)?;
    let sites = facts::list_sites(&tx, study_id)?;
    let mut sites_written = 0_usize;
    let mut sites_skipped_empty = 0_usize;

    for site in &sites {
        let site_outcomes: Vec<SubjectOutcome> = outcomes
            .iter()
            .filter(|(site_id, _)| *site_id == site.site_id)
            .map(|(_, outcome)| *outcome)
            .collect();

        match aggregate_site(&site_outcomes) {
            Some(site_score) => {
                scores::upsert_site_score(&tx, &site.site_id, &site_score)?;
                sites_written += 1;
            }
            None => {
                debug!(site_id = %site.site_id, "site has no subjects; no score written");
                scores::delete_site_score(&tx, &site.site_id)?;
                sites_skipped_empty += 1;
            }
        }
    }

    let study_outcomes: Vec<SubjectOutcome> =
        outcomes.iter().map(|(_, outcome)| *outcome).collect();
    let study_score = aggregate_study(sites.len(), &study_outcomes);
    scores::upsert_study_score(&tx, study_id, &study_score)?;

    tx.commit()?;

    info!(
        study_id = %study_id,
        subjects = subjects.len(),
        processed = subjects_processed,
        skipped = subjects_skipped.len(),
        defaulted = subjects_defaulted,
        at_risk = subjects_at_risk,
        sites = sites_written,
        clean_percentage = study_score.clean_percentage,
        composite_score = study_score.composite_score,
        readiness = study_score.readiness_status.as_str(),
        "study recompute committed"
    );

    Ok(StudyRunSummary {
        study_id: study_id.to_string(),
        subjects_total: subjects.len(),
        subjects_processed,
        subjects_defaulted,
        subjects_skipped,
        sites_written,
        sites_skipped_empty,
        study_score,
    })
}
