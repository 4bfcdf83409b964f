use super::*;
use crate::audit_chain::{EVENT_DQI_COMPUTED, PendingEvent, verify_chain};
use crate::dqi::{BlockerCategory, FactValue, WeightEntry, evaluate_clean_status};
use crate::model::{BlockerFacts, ReadinessStatus, RiskBand, StudyScore};

use self::facts::{SiteRow, SubjectRow};

fn seed_roster(connection: &rusqlite::Connection) {
    facts::upsert_study(connection, "STUDY-1", Some("Phase II")).expect("study");
    facts::upsert_site(
        connection,
        "STUDY-1",
        &SiteRow {
            site_id: "SITE-1".to_string(),
            site_number: Some("001".to_string()),
            site_name: None,
        },
    )
    .expect("site");
    facts::upsert_subject(
        connection,
        "STUDY-1",
        &SubjectRow {
            subject_id: "SUBJ-1".to_string(),
            site_id: "SITE-1".to_string(),
            external_id: Some("001-0001".to_string()),
        },
    )
    .expect("subject");
}

#[test]
fn schema_is_idempotent_and_versioned() {
    let connection = open_in_memory().expect("in-memory db");
    schema::ensure_schema(&connection).expect("second schema pass");

    let version: String = connection
        .query_row(
            "SELECT value FROM metadata WHERE key = 'db_schema_version'",
            [],
            |row| row.get(0),
        )
        .expect("schema version row");
    assert_eq!(version, schema::DB_SCHEMA_VERSION);
}

#[test]
fn missing_facts_row_is_none() {
    let connection = open_in_memory().expect("in-memory db");
    seed_roster(&connection);

    assert!(
        facts::lookup_facts(&connection, "SUBJ-1")
            .expect("lookup")
            .is_none()
    );

    let stored = BlockerFacts {
        open_queries: 4,
        sdv_completion_pct: 75.0,
        ..BlockerFacts::default()
    };
    facts::replace_facts(&connection, "SUBJ-1", &stored).expect("write facts");
    let raw = facts::lookup_facts(&connection, "SUBJ-1")
        .expect("lookup")
        .expect("row present");
    assert_eq!(raw.open_queries, FactValue::Integer(4));
    assert_eq!(raw.sdv_completion_pct, FactValue::Real(75.0));

    assert!(facts::clear_facts(&connection, "SUBJ-1").expect("clear"));
    assert!(!facts::clear_facts(&connection, "SUBJ-1").expect("clear twice"));
}

#[test]
fn study_upsert_keeps_existing_name_when_absent() {
    let connection = open_in_memory().expect("in-memory db");
    seed_roster(&connection);
    facts::upsert_study(&connection, "STUDY-1", None).expect("re-upsert");

    let study = facts::find_study(&connection, "STUDY-1")
        .expect("lookup")
        .expect("study present");
    assert_eq!(study.study_name.as_deref(), Some("Phase II"));
    assert!(
        facts::find_study(&connection, "STUDY-404")
            .expect("lookup")
            .is_none()
    );
}

#[test]
fn weight_upsert_reports_creation_and_update() {
    let connection = open_in_memory().expect("in-memory db");
    let mut entry = WeightEntry::default_for(BlockerCategory::OpenQueries);

    assert!(weights::upsert_weight_entry(&connection, &entry).expect("insert"));
    entry.weight = 0.2;
    entry.is_active = false;
    entry.description = None;
    assert!(!weights::upsert_weight_entry(&connection, &entry).expect("update"));

    let entries = weights::load_weight_entries(&connection).expect("load");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].weight, 0.2);
    assert!(!entries[0].is_active);
    assert_eq!(
        entries[0].description.as_deref(),
        Some(BlockerCategory::OpenQueries.description())
    );
}

#[test]
fn clean_status_round_trips_with_blockers() {
    let connection = open_in_memory().expect("in-memory db");
    seed_roster(&connection);

    let status = evaluate_clean_status(&BlockerFacts {
        sae_discrepancies: 2,
        pi_signature_completion_pct: 80.0,
        ..BlockerFacts::default()
    });
    scores::upsert_clean_status(&connection, "SUBJ-1", &status).expect("write");

    let loaded = scores::load_clean_status(&connection, "SUBJ-1")
        .expect("read")
        .expect("present");
    assert_eq!(loaded, status);
    assert!(
        scores::load_clean_status(&connection, "SUBJ-2")
            .expect("read")
            .is_none()
    );
}

#[test]
fn study_score_overwrites_previous_record() {
    let connection = open_in_memory().expect("in-memory db");
    let first = StudyScore {
        total_sites: 2,
        total_subjects: 10,
        clean_subjects: 4,
        clean_percentage: 40.0,
        composite_score: 33.1,
        readiness_status: ReadinessStatus::NotReady,
    };
    let second = StudyScore {
        clean_subjects: 9,
        clean_percentage: 90.0,
        composite_score: 3.2,
        readiness_status: ReadinessStatus::ReadyForInterim,
        ..first.clone()
    };

    scores::upsert_study_score(&connection, "STUDY-1", &first).expect("first write");
    scores::upsert_study_score(&connection, "STUDY-1", &second).expect("second write");

    let rows = query_count(&connection, "SELECT COUNT(*) FROM study_scores").expect("count");
    assert_eq!(rows, 1);
    assert_eq!(
        scores::load_study_score(&connection, "STUDY-1").expect("read"),
        Some(second)
    );
}

#[test]
fn unknown_risk_band_in_store_is_an_error() {
    let connection = open_in_memory().expect("in-memory db");
    connection
        .execute(
            "INSERT INTO site_scores VALUES('SITE-X', 1, 1, 100.0, 0.0, 'Severe')",
            [],
        )
        .expect("raw insert");

    let error = scores::load_site_score(&connection, "SITE-X").expect_err("bad band");
    assert!(error.to_string().contains("unknown risk band"));
    assert_eq!(RiskBand::parse("Low"), Some(RiskBand::Low));
}

#[test]
fn audit_chain_appends_and_detects_edits() {
    let mut connection = open_in_memory().expect("in-memory db");

    for clean_percentage in [40.0, 85.0] {
        audit::append_event(
            &mut connection,
            PendingEvent {
                event_type: EVENT_DQI_COMPUTED.to_string(),
                description: "DQI scores computed for STUDY-1".to_string(),
                entity_type: "Study".to_string(),
                entity_id: "STUDY-1".to_string(),
                snapshot: serde_json::json!({ "clean_percentage": clean_percentage }),
                recorded_by: "test".to_string(),
            },
        )
        .expect("append");
    }

    let chain = audit::load_chain(&connection).expect("load chain");
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].previous_hash, chain[0].tx_hash);
    assert!(verify_chain(&chain).is_valid);

    let history = audit::entity_history(&connection, "Study", "STUDY-1").expect("history");
    assert_eq!(history.len(), 2);

    connection
        .execute(
            "UPDATE audit_chain SET data_snapshot = '{\"clean_percentage\":99.0}' WHERE block_number = 1",
            [],
        )
        .expect("tamper");
    let chain = audit::load_chain(&connection).expect("reload chain");
    let verification = verify_chain(&chain);
    assert!(!verification.is_valid);
    assert_eq!(verification.tampered_blocks[0].block_number, 1);
}
