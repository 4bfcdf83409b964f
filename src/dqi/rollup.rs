use super::round_to_cents;
use crate::model::{ReadinessStatus, RiskBand, SiteScore, StudyScore};

/// The stored records of one subject as visible at aggregation time.
///
/// `None` means no record exists yet (never computed); such a subject still counts
/// toward totals but is neither clean nor part of the composite mean.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubjectOutcome {
    pub is_clean: Option<bool>,
    pub composite_score: Option<f64>,
}

struct Tally {
    total: u32,
    clean: u32,
    clean_percentage: f64,
    composite_mean: f64,
}

fn tally(outcomes: &[SubjectOutcome]) -> Tally {
    let total = saturating_u32(outcomes.len());
    let clean = saturating_u32(
        outcomes
            .iter()
            .filter(|outcome| outcome.is_clean == Some(true))
            .count(),
    );
    let clean_percentage = if total == 0 {
        0.0
    } else {
        f64::from(clean) * 100.0 / f64::from(total)
    };

    let scored: Vec<f64> = outcomes
        .iter()
        .filter_map(|outcome| outcome.composite_score)
        .collect();
    let composite_mean = if scored.is_empty() {
        0.0
    } else {
        round_to_cents(scored.iter().sum::<f64>() / scored.len() as f64)
    };

    Tally {
        total,
        clean,
        clean_percentage,
        composite_mean,
    }
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Site rollup. A site without subjects gets no record at all.
pub fn aggregate_site(outcomes: &[SubjectOutcome]) -> Option<SiteScore> {
    if outcomes.is_empty() {
        return None;
    }

    let tally = tally(outcomes);
    Some(SiteScore {
        total_subjects: tally.total,
        clean_subjects: tally.clean,
        clean_percentage: tally.clean_percentage,
        composite_score: tally.composite_mean,
        risk_band: RiskBand::from_score(tally.composite_mean),
    })
}

/// Study rollup over every subject of the study, flattened across sites.
pub fn aggregate_study(total_sites: usize, outcomes: &[SubjectOutcome]) -> StudyScore {
    let tally = tally(outcomes);
    StudyScore {
        total_sites: saturating_u32(total_sites),
        total_subjects: tally.total,
        clean_subjects: tally.clean,
        clean_percentage: tally.clean_percentage,
        composite_score: tally.composite_mean,
        readiness_status: ReadinessStatus::from_clean_percentage(tally.clean_percentage),
    }
}
