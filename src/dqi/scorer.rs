use super::{BlockerCategory, WeightSet, round_to_cents};
use crate::model::{BlockerFacts, RiskBand, SubjectScore};

const SUB_SCORE_CAP: f64 = 100.0;

fn capped(count: u32, points_per_unit: f64) -> f64 {
    (f64::from(count) * points_per_unit).min(SUB_SCORE_CAP)
}

fn shortfall(completion_pct: f64) -> f64 {
    (SUB_SCORE_CAP - completion_pct).clamp(0.0, SUB_SCORE_CAP)
}

/// Normalized 0-100 sub-score for one category (lower is better).
pub fn sub_scores(facts: &BlockerFacts) -> [(BlockerCategory, f64); 9] {
    [
        (
            BlockerCategory::SaeDiscrepancies,
            capped(facts.sae_discrepancies, 25.0),
        ),
        (
            BlockerCategory::MissingVisits,
            capped(facts.missing_visits, 10.0),
        ),
        (BlockerCategory::OpenQueries, capped(facts.open_queries, 3.0)),
        (BlockerCategory::MissingPages, capped(facts.missing_pages, 5.0)),
        (
            BlockerCategory::NonConformant,
            capped(facts.non_conformant_events, 5.0),
        ),
        (
            BlockerCategory::SdvIncomplete,
            shortfall(facts.sdv_completion_pct),
        ),
        (
            BlockerCategory::PiSignatureIncomplete,
            shortfall(facts.pi_signature_completion_pct),
        ),
        (BlockerCategory::CodingBacklog, capped(facts.coding_uncoded, 2.0)),
        (BlockerCategory::EdrrIssues, capped(facts.edrr_open_issues, 5.0)),
    ]
}

/// Weighted composite for one subject.
///
/// The composite is stored with two decimals and the risk band is read off the stored
/// value, so a persisted 25.00 is always Medium.
pub fn score_subject(facts: &BlockerFacts, weights: &WeightSet) -> SubjectScore {
    let scores = sub_scores(facts);
    let composite: f64 = scores
        .iter()
        .map(|(category, score)| score * weights.weight(*category))
        .sum();
    let composite_score = round_to_cents(composite);

    let lookup = |wanted: BlockerCategory| {
        scores
            .iter()
            .find(|(category, _)| *category == wanted)
            .map(|(_, score)| *score)
            .unwrap_or(0.0)
    };

    SubjectScore {
        sae_score: lookup(BlockerCategory::SaeDiscrepancies),
        missing_visits_score: lookup(BlockerCategory::MissingVisits),
        missing_pages_score: lookup(BlockerCategory::MissingPages),
        open_queries_score: lookup(BlockerCategory::OpenQueries),
        non_conformant_score: lookup(BlockerCategory::NonConformant),
        sdv_score: lookup(BlockerCategory::SdvIncomplete),
        pi_signature_score: lookup(BlockerCategory::PiSignatureIncomplete),
        coding_score: lookup(BlockerCategory::CodingBacklog),
        edrr_score: lookup(BlockerCategory::EdrrIssues),
        composite_score,
        risk_band: RiskBand::from_score(composite_score),
    }
}
