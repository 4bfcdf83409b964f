use super::BlockerCategory;
use crate::model::{Blocker, BlockerFacts, CleanStatus};

const COMPLETE_PCT: f64 = 100.0;

fn blocker(kind: BlockerCategory, count: f64) -> Blocker {
    Blocker {
        kind,
        count,
        severity: kind.severity(),
    }
}

/// Strict all-must-pass clean gate. Independent of the weight registry, so a subject
/// can sit in the Low risk band and still fail the gate.
pub fn evaluate_clean_status(facts: &BlockerFacts) -> CleanStatus {
    let sdv_incomplete = facts.sdv_completion_pct < COMPLETE_PCT;
    let pi_signature_incomplete = facts.pi_signature_completion_pct < COMPLETE_PCT;

    let mut blockers = Vec::new();
    if facts.missing_visits > 0 {
        blockers.push(blocker(
            BlockerCategory::MissingVisits,
            f64::from(facts.missing_visits),
        ));
    }
    if facts.missing_pages > 0 {
        blockers.push(blocker(
            BlockerCategory::MissingPages,
            f64::from(facts.missing_pages),
        ));
    }
    if facts.open_queries > 0 {
        blockers.push(blocker(
            BlockerCategory::OpenQueries,
            f64::from(facts.open_queries),
        ));
    }
    if facts.non_conformant_events > 0 {
        blockers.push(blocker(
            BlockerCategory::NonConformant,
            f64::from(facts.non_conformant_events),
        ));
    }
    if facts.sae_discrepancies > 0 {
        blockers.push(blocker(
            BlockerCategory::SaeDiscrepancies,
            f64::from(facts.sae_discrepancies),
        ));
    }
    if sdv_incomplete {
        blockers.push(blocker(
            BlockerCategory::SdvIncomplete,
            COMPLETE_PCT - facts.sdv_completion_pct,
        ));
    }
    if pi_signature_incomplete {
        blockers.push(blocker(
            BlockerCategory::PiSignatureIncomplete,
            COMPLETE_PCT - facts.pi_signature_completion_pct,
        ));
    }
    if facts.coding_uncoded > 0 {
        blockers.push(blocker(
            BlockerCategory::CodingBacklog,
            f64::from(facts.coding_uncoded),
        ));
    }
    if facts.edrr_open_issues > 0 {
        blockers.push(blocker(
            BlockerCategory::EdrrIssues,
            f64::from(facts.edrr_open_issues),
        ));
    }

    let is_clean = !blockers.iter().any(|entry| entry.kind.is_gating());

    CleanStatus {
        is_clean,
        has_missing_visits: facts.missing_visits > 0,
        missing_visits_count: facts.missing_visits,
        has_missing_pages: facts.missing_pages > 0,
        missing_pages_count: facts.missing_pages,
        has_open_queries: facts.open_queries > 0,
        open_queries_count: facts.open_queries,
        has_non_conformant: facts.non_conformant_events > 0,
        non_conformant_count: facts.non_conformant_events,
        has_sae_discrepancies: facts.sae_discrepancies > 0,
        sae_discrepancy_count: facts.sae_discrepancies,
        sdv_incomplete,
        sdv_completion_pct: facts.sdv_completion_pct,
        pi_signature_incomplete,
        pi_signature_completion_pct: facts.pi_signature_completion_pct,
        has_coding_backlog: facts.coding_uncoded > 0,
        coding_uncoded_count: facts.coding_uncoded,
        has_edrr_issues: facts.edrr_open_issues > 0,
        edrr_open_issue_count: facts.edrr_open_issues,
        blockers,
    }
}
