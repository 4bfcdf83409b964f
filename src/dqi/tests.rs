use std::collections::BTreeMap;

use super::*;
use crate::model::{BlockerFacts, ReadinessStatus, RiskBand, Severity};

fn clean_facts() -> BlockerFacts {
    BlockerFacts::default()
}

fn outcome(is_clean: bool, composite: f64) -> SubjectOutcome {
    SubjectOutcome {
        is_clean: Some(is_clean),
        composite_score: Some(composite),
    }
}

#[test]
fn default_weights_sum_to_one() {
    let weights = WeightSet::default_weights();
    assert!((weights.sum() - 1.0).abs() < 1e-9);
    assert!(!weights.drifts_from_unit_sum());
    assert_eq!(weights.weight(BlockerCategory::SaeDiscrepancies), 0.25);
    assert_eq!(
        weights.source(BlockerCategory::OpenQueries),
        WeightSource::Default
    );
}

#[test]
fn inactive_registry_entries_fall_back_to_defaults() {
    let entries = vec![
        WeightEntry {
            metric_name: "sae_unresolved_count".to_string(),
            weight: 0.5,
            is_active: false,
            description: None,
        },
        WeightEntry {
            metric_name: "open_queries_count".to_string(),
            weight: 0.3,
            is_active: true,
            description: None,
        },
    ];

    let active = active_weights(&entries);
    assert_eq!(active.len(), 1);
    assert_eq!(active.get(&BlockerCategory::OpenQueries), Some(&0.3));

    let weights = WeightSet::from_entries(&entries);
    assert_eq!(weights.weight(BlockerCategory::SaeDiscrepancies), 0.25);
    assert_eq!(
        weights.source(BlockerCategory::SaeDiscrepancies),
        WeightSource::Default
    );
    assert_eq!(weights.weight(BlockerCategory::OpenQueries), 0.3);
    assert_eq!(
        weights.source(BlockerCategory::OpenQueries),
        WeightSource::Registry
    );
}

#[test]
fn drifting_weight_sum_is_exposed_but_not_corrected() {
    let mut active = BTreeMap::new();
    active.insert(BlockerCategory::SaeDiscrepancies, 0.75);
    let weights = WeightSet::from_active(&active);

    assert!((weights.sum() - 1.5).abs() < 1e-9);
    assert!(weights.drifts_from_unit_sum());

    let facts = BlockerFacts {
        sae_discrepancies: 4,
        ..clean_facts()
    };
    let score = score_subject(&facts, &weights);
    assert_eq!(score.composite_score, 75.0);
    assert_eq!(score.risk_band, RiskBand::Critical);
}

#[test]
fn metric_names_round_trip_through_categories() {
    for category in BlockerCategory::ALL {
        assert_eq!(
            BlockerCategory::from_metric_name(category.metric_name()),
            Some(category)
        );
    }
    assert_eq!(BlockerCategory::from_metric_name("bogus_metric"), None);
    assert_eq!(BlockerCategory::from_metric_name("sae_unresolved_count "), None);
}

#[test]
fn registry_keys_that_match_no_category_are_dropped() {
    let entries = vec![WeightEntry {
        metric_name: " open_queries_count".to_string(),
        weight: 0.9,
        is_active: true,
        description: None,
    }];

    assert!(active_weights(&entries).is_empty());
    let weights = WeightSet::from_entries(&entries);
    assert_eq!(weights.weight(BlockerCategory::OpenQueries), 0.15);
    assert_eq!(
        weights.source(BlockerCategory::OpenQueries),
        WeightSource::Default
    );
}

#[test]
fn sub_scores_are_capped_at_one_hundred() {
    let facts = BlockerFacts {
        missing_visits: 500,
        missing_pages: 500,
        open_queries: 500,
        non_conformant_events: 500,
        sae_discrepancies: 500,
        coding_uncoded: 500,
        edrr_open_issues: 500,
        sdv_completion_pct: 0.0,
        pi_signature_completion_pct: 0.0,
    };

    for (category, score) in sub_scores(&facts) {
        assert!(
            (0.0..=100.0).contains(&score),
            "{} out of range: {score}",
            category.as_str()
        );
        assert_eq!(score, 100.0);
    }

    let score = score_subject(&facts, &WeightSet::default_weights());
    assert_eq!(score.composite_score, 100.0);
    assert_eq!(score.risk_band, RiskBand::Critical);
}

#[test]
fn composite_matches_documented_weighted_sum() {
    let facts = BlockerFacts {
        missing_visits: 2,
        missing_pages: 3,
        open_queries: 7,
        non_conformant_events: 1,
        sae_discrepancies: 1,
        coding_uncoded: 9,
        edrr_open_issues: 4,
        sdv_completion_pct: 80.0,
        pi_signature_completion_pct: 50.0,
    };
    let score = score_subject(&facts, &WeightSet::default_weights());

    assert_eq!(score.sae_score, 25.0);
    assert_eq!(score.missing_visits_score, 20.0);
    assert_eq!(score.missing_pages_score, 15.0);
    assert_eq!(score.open_queries_score, 21.0);
    assert_eq!(score.non_conformant_score, 5.0);
    assert_eq!(score.sdv_score, 20.0);
    assert_eq!(score.pi_signature_score, 50.0);
    assert_eq!(score.coding_score, 18.0);
    assert_eq!(score.edrr_score, 20.0);

    let expected = 25.0 * 0.25
        + 20.0 * 0.15
        + 21.0 * 0.15
        + 15.0 * 0.10
        + 5.0 * 0.10
        + 20.0 * 0.10
        + 50.0 * 0.05
        + 18.0 * 0.05
        + 20.0 * 0.05;
    assert!((score.composite_score - expected).abs() < 0.005);
    assert_eq!(score.risk_band, RiskBand::Low);
}

#[test]
fn single_sae_is_low_band_but_not_clean() {
    let facts = BlockerFacts {
        sae_discrepancies: 1,
        ..clean_facts()
    };

    let score = score_subject(&facts, &WeightSet::default_weights());
    assert_eq!(score.sae_score, 25.0);
    assert_eq!(score.composite_score, 6.25);
    assert_eq!(score.risk_band, RiskBand::Low);

    let status = evaluate_clean_status(&facts);
    assert!(!status.is_clean);
    assert_eq!(status.blockers.len(), 1);
    assert_eq!(status.blockers[0].kind, BlockerCategory::SaeDiscrepancies);
    assert_eq!(status.blockers[0].severity, Severity::Critical);
}

#[test]
fn missing_visits_and_queries_scenario() {
    let facts = BlockerFacts {
        missing_visits: 3,
        open_queries: 2,
        ..clean_facts()
    };

    let score = score_subject(&facts, &WeightSet::default_weights());
    assert_eq!(score.missing_visits_score, 30.0);
    assert_eq!(score.open_queries_score, 6.0);
    assert_eq!(score.composite_score, 5.4);
    assert_eq!(score.risk_band, RiskBand::Low);
    assert!(!evaluate_clean_status(&facts).is_clean);
}

#[test]
fn risk_band_boundaries_are_inclusive_low() {
    assert_eq!(RiskBand::from_score(0.0), RiskBand::Low);
    assert_eq!(RiskBand::from_score(24.99), RiskBand::Low);
    assert_eq!(RiskBand::from_score(25.0), RiskBand::Medium);
    assert_eq!(RiskBand::from_score(49.99), RiskBand::Medium);
    assert_eq!(RiskBand::from_score(50.0), RiskBand::High);
    assert_eq!(RiskBand::from_score(74.99), RiskBand::High);
    assert_eq!(RiskBand::from_score(75.0), RiskBand::Critical);
    assert_eq!(RiskBand::from_score(140.0), RiskBand::Critical);
}

#[test]
fn band_is_read_from_the_stored_two_decimal_composite() {
    // 100 * 0.2499999 rounds to 25.00, which must classify as Medium.
    let mut active = BTreeMap::new();
    for category in BlockerCategory::ALL {
        active.insert(category, 0.0);
    }
    active.insert(BlockerCategory::SdvIncomplete, 0.2499999);
    let weights = WeightSet::from_active(&active);

    let facts = BlockerFacts {
        sdv_completion_pct: 0.0,
        ..clean_facts()
    };
    let score = score_subject(&facts, &weights);
    assert_eq!(score.composite_score, 25.0);
    assert_eq!(score.risk_band, RiskBand::Medium);
}

#[test]
fn clean_gate_requires_every_gating_value_at_ideal() {
    assert!(evaluate_clean_status(&clean_facts()).is_clean);

    let failing = [
        BlockerFacts {
            missing_visits: 1,
            ..clean_facts()
        },
        BlockerFacts {
            missing_pages: 1,
            ..clean_facts()
        },
        BlockerFacts {
            open_queries: 1,
            ..clean_facts()
        },
        BlockerFacts {
            non_conformant_events: 1,
            ..clean_facts()
        },
        BlockerFacts {
            sae_discrepancies: 1,
            ..clean_facts()
        },
        BlockerFacts {
            sdv_completion_pct: 99.5,
            ..clean_facts()
        },
        BlockerFacts {
            pi_signature_completion_pct: 0.0,
            ..clean_facts()
        },
    ];

    for facts in failing {
        let status = evaluate_clean_status(&facts);
        assert!(!status.is_clean, "expected gate failure for {facts:?}");
        assert_eq!(status.blockers.len(), 1);
    }
}

#[test]
fn coding_and_reconciliation_are_advisory() {
    let facts = BlockerFacts {
        coding_uncoded: 12,
        edrr_open_issues: 3,
        ..clean_facts()
    };

    let status = evaluate_clean_status(&facts);
    assert!(status.is_clean);
    assert!(status.has_coding_backlog);
    assert!(status.has_edrr_issues);

    let kinds: Vec<BlockerCategory> = status.blockers.iter().map(|entry| entry.kind).collect();
    assert_eq!(
        kinds,
        vec![BlockerCategory::CodingBacklog, BlockerCategory::EdrrIssues]
    );
    assert!(
        status
            .blockers
            .iter()
            .all(|entry| entry.severity == Severity::Medium)
    );
}

#[test]
fn incomplete_percentages_report_the_shortfall() {
    let facts = BlockerFacts {
        sdv_completion_pct: 62.5,
        pi_signature_completion_pct: 90.0,
        missing_pages: 2,
        ..clean_facts()
    };

    let status = evaluate_clean_status(&facts);
    assert!(status.sdv_incomplete);
    assert!(status.pi_signature_incomplete);

    let sdv = status
        .blockers
        .iter()
        .find(|entry| entry.kind == BlockerCategory::SdvIncomplete)
        .expect("sdv blocker should be listed");
    assert_eq!(sdv.count, 37.5);
    assert_eq!(sdv.severity, Severity::High);

    let pages = status
        .blockers
        .iter()
        .find(|entry| entry.kind == BlockerCategory::MissingPages)
        .expect("missing pages blocker should be listed");
    assert_eq!(pages.severity, Severity::Medium);
}

#[test]
fn blocker_list_serializes_with_type_count_severity() {
    let facts = BlockerFacts {
        missing_visits: 2,
        ..clean_facts()
    };
    let status = evaluate_clean_status(&facts);
    let json = serde_json::to_value(&status.blockers).expect("blockers should serialize");
    assert_eq!(
        json,
        serde_json::json!([{ "type": "missing_visits", "count": 2.0, "severity": "high" }])
    );
}

#[test]
fn absent_facts_default_to_clean_zero_subject() {
    let (facts, source) =
        resolve_facts(None, FactsPolicy::AssumeClean).expect("defaulting never fails");
    assert_eq!(source, FactsSource::Defaulted);
    assert!(evaluate_clean_status(&facts).is_clean);

    let score = score_subject(&facts, &WeightSet::default_weights());
    assert_eq!(score.composite_score, 0.0);
    assert_eq!(score.risk_band, RiskBand::Low);
}

#[test]
fn malformed_fact_rows_are_rejected() {
    let mut raw = RawBlockerFacts::from(&clean_facts());
    raw.open_queries = FactValue::Integer(-2);
    let error = resolve_facts(Some(&raw), FactsPolicy::AssumeClean)
        .expect_err("negative counts are a shape error");
    assert_eq!(
        error,
        FactShapeError::CountOutOfRange {
            field: "open_queries",
            value: -2
        }
    );

    let mut raw = RawBlockerFacts::from(&clean_facts());
    raw.sdv_completion_pct = FactValue::Real(140.0);
    assert!(resolve_facts(Some(&raw), FactsPolicy::AssumeClean).is_err());

    let mut raw = RawBlockerFacts::from(&clean_facts());
    raw.pi_signature_completion_pct = FactValue::Real(f64::NAN);
    assert!(resolve_facts(Some(&raw), FactsPolicy::AssumeClean).is_err());
}

#[test]
fn mistyped_fact_values_are_rejected() {
    let mut raw = RawBlockerFacts::from(&clean_facts());
    raw.open_queries = FactValue::Real(2.5);
    assert_eq!(
        resolve_facts(Some(&raw), FactsPolicy::AssumeClean).expect_err("real count"),
        FactShapeError::UnexpectedType {
            field: "open_queries",
            found: "real"
        }
    );

    let mut raw = RawBlockerFacts::from(&clean_facts());
    raw.missing_pages = FactValue::Null;
    assert!(resolve_facts(Some(&raw), FactsPolicy::AssumeClean).is_err());

    let mut raw = RawBlockerFacts::from(&clean_facts());
    raw.sdv_completion_pct = FactValue::Text;
    assert!(resolve_facts(Some(&raw), FactsPolicy::AssumeClean).is_err());

    let mut raw = RawBlockerFacts::from(&clean_facts());
    raw.pi_signature_completion_pct = FactValue::Integer(90);
    let (facts, _) = resolve_facts(Some(&raw), FactsPolicy::AssumeClean).expect("integer pct");
    assert_eq!(facts.pi_signature_completion_pct, 90.0);
}

#[test]
fn null_percentages_mean_complete() {
    let mut raw = RawBlockerFacts::from(&clean_facts());
    raw.sdv_completion_pct = FactValue::Null;
    raw.pi_signature_completion_pct = FactValue::Null;
    let (facts, source) =
        resolve_facts(Some(&raw), FactsPolicy::AssumeClean).expect("row should validate");
    assert_eq!(source, FactsSource::Recorded);
    assert_eq!(facts.sdv_completion_pct, 100.0);
    assert_eq!(facts.pi_signature_completion_pct, 100.0);
}

#[test]
fn site_with_seven_of_ten_clean() {
    let mut outcomes = vec![outcome(true, 0.0); 7];
    outcomes.extend(vec![outcome(false, 30.0); 3]);

    let site = aggregate_site(&outcomes).expect("non-empty site is scored");
    assert_eq!(site.total_subjects, 10);
    assert_eq!(site.clean_subjects, 7);
    assert_eq!(site.clean_percentage, 70.0);
    assert_eq!(site.composite_score, 9.0);
    assert_eq!(site.risk_band, RiskBand::Low);
}

#[test]
fn site_clean_percentage_is_exact_ratio() {
    for total in 1..=12_usize {
        for clean in 0..=total {
            let mut outcomes = vec![outcome(true, 0.0); clean];
            outcomes.extend(vec![outcome(false, 10.0); total - clean]);
            let site = aggregate_site(&outcomes).expect("non-empty site is scored");
            assert_eq!(
                site.clean_percentage,
                100.0 * clean as f64 / total as f64,
                "clean={clean} total={total}"
            );
        }
    }
}

#[test]
fn empty_site_produces_no_record() {
    assert!(aggregate_site(&[]).is_none());
}

#[test]
fn site_band_uses_averaged_composite() {
    let outcomes = [outcome(false, 40.0), outcome(false, 60.0)];
    let site = aggregate_site(&outcomes).expect("non-empty site is scored");
    assert_eq!(site.composite_score, 50.0);
    assert_eq!(site.risk_band, RiskBand::High);
}

#[test]
fn uncomputed_subjects_count_toward_totals_only() {
    let outcomes = [
        outcome(true, 10.0),
        SubjectOutcome::default(),
        outcome(false, 30.0),
    ];
    let site = aggregate_site(&outcomes).expect("non-empty site is scored");
    assert_eq!(site.total_subjects, 3);
    assert_eq!(site.clean_subjects, 1);
    assert_eq!(site.composite_score, 20.0);
}

#[test]
fn study_composite_is_flat_mean_over_subjects() {
    // Site A: one subject at 80. Site B: three subjects at 0.
    let site_a = [outcome(false, 80.0)];
    let site_b = [outcome(true, 0.0), outcome(true, 0.0), outcome(true, 0.0)];

    let mean_of_sites = (aggregate_site(&site_a).expect("site a").composite_score
        + aggregate_site(&site_b).expect("site b").composite_score)
        / 2.0;
    assert_eq!(mean_of_sites, 40.0);

    let all: Vec<SubjectOutcome> = site_a.iter().chain(site_b.iter()).copied().collect();
    let study = aggregate_study(2, &all);
    assert_eq!(study.total_sites, 2);
    assert_eq!(study.total_subjects, 4);
    assert_eq!(study.clean_subjects, 3);
    assert_eq!(study.clean_percentage, 75.0);
    assert_eq!(study.composite_score, 20.0);
    assert_eq!(study.readiness_status, ReadinessStatus::InProgress);
}

#[test]
fn readiness_thresholds() {
    assert_eq!(
        ReadinessStatus::from_clean_percentage(96.0),
        ReadinessStatus::ReadyForLock
    );
    assert_eq!(
        ReadinessStatus::from_clean_percentage(95.0),
        ReadinessStatus::ReadyForLock
    );
    assert_eq!(
        ReadinessStatus::from_clean_percentage(82.0),
        ReadinessStatus::ReadyForInterim
    );
    assert_eq!(
        ReadinessStatus::from_clean_percentage(50.0),
        ReadinessStatus::InProgress
    );
    assert_eq!(
        ReadinessStatus::from_clean_percentage(40.0),
        ReadinessStatus::NotReady
    );
    assert_eq!(
        ReadinessStatus::ReadyForLock.as_str(),
        "Ready for Database Lock"
    );
    assert_eq!(
        ReadinessStatus::parse("Ready for Interim Analysis"),
        Some(ReadinessStatus::ReadyForInterim)
    );
}

#[test]
fn empty_study_is_not_ready() {
    let study = aggregate_study(1, &[]);
    assert_eq!(study.total_sites, 1);
    assert_eq!(study.total_subjects, 0);
    assert_eq!(study.clean_percentage, 0.0);
    assert_eq!(study.composite_score, 0.0);
    assert_eq!(study.readiness_status, ReadinessStatus::NotReady);
}
