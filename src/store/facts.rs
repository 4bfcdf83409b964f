use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::dqi::{FactValue, RawBlockerFacts};
use crate::model::BlockerFacts;

#[derive(Debug, Clone, PartialEq)]
pub struct StudyRow {
    pub study_id: String,
    pub study_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteRow {
    pub site_id: String,
    pub site_number: Option<String>,
    pub site_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectRow {
    pub subject_id: String,
    pub site_id: String,
    pub external_id: Option<String>,
}

pub fn find_study(connection: &Connection, study_id: &str) -> Result<Option<StudyRow>> {
    connection
        .query_row(
            "SELECT study_id, study_name FROM studies WHERE study_id = ?1",
            [study_id],
            |row| {
                Ok(StudyRow {
                    study_id: row.get(0)?,
                    study_name: row.get(1)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("failed to look up study {study_id}"))
}

pub fn list_study_ids(connection: &Connection) -> Result<Vec<String>> {
    let mut statement =
        connection.prepare("SELECT study_id FROM studies ORDER BY study_id ASC")?;
    let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
    rows.collect::<rusqlite::Result<Vec<String>>>()
        .context("failed to list studies")
}

pub fn list_sites(connection: &Connection, study_id: &str) -> Result<Vec<SiteRow>> {
    let mut statement = connection.prepare(
        "
        SELECT site_id, site_number, site_name
        FROM sites
        WHERE study_id = ?1
        ORDER BY site_id ASC
        ",
    )?;
    let rows = statement.query_map([study_id], |row| {
        Ok(SiteRow {
            site_id: row.get(0)?,
            site_number: row.get(1)?,
            site_name: row.get(2)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<SiteRow>>>()
        .with_context(|| format!("failed to list sites for study {study_id}"))
}

pub fn list_subjects(connection: &Connection, study_id: &str) -> Result<Vec<SubjectRow>> {
    let mut statement = connection.prepare(
        "
        SELECT subject_id, site_id, external_id
        FROM subjects
        WHERE study_id = ?1
        ORDER BY subject_id ASC
        ",
    )?;
    let rows = statement.query_map([study_id], |row| {
        Ok(SubjectRow {
            subject_id: row.get(0)?,
            site_id: row.get(1)?,
            external_id: row.get(2)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<SubjectRow>>>()
        .with_context(|| format!("failed to list subjects for study {study_id}"))
}

/// Column values are read untyped; `resolve_facts` decides whether they have a usable shape.
fn fact_value(row: &Row<'_>, index: usize) -> rusqlite::Result<FactValue> {
    Ok(match row.get_ref(index)? {
        ValueRef::Null => FactValue::Null,
        ValueRef::Integer(value) => FactValue::Integer(value),
        ValueRef::Real(value) => FactValue::Real(value),
        ValueRef::Text(_) => FactValue::Text,
        ValueRef::Blob(_) => FactValue::Blob,
    })
}

/// Stored facts for one subject, or `None` when ingestion never wrote a row.
pub fn lookup_facts(connection: &Connection, subject_id: &str) -> Result<Option<RawBlockerFacts>> {
    connection
        .query_row(
            "
            SELECT
              missing_visits,
              missing_pages,
              open_queries,
              non_conformant_events,
              sae_discrepancies,
              coding_uncoded,
              edrr_open_issues,
              sdv_completion_pct,
              pi_signature_completion_pct
            FROM subject_facts
            WHERE subject_id = ?1
            ",
            [subject_id],
            |row| {
                Ok(RawBlockerFacts {
                    missing_visits: fact_value(row, 0)?,
                    missing_pages: fact_value(row, 1)?,
                    open_queries: fact_value(row, 2)?,
                    non_conformant_events: fact_value(row, 3)?,
                    sae_discrepancies: fact_value(row, 4)?,
                    coding_uncoded: fact_value(row, 5)?,
                    edrr_open_issues: fact_value(row, 6)?,
                    sdv_completion_pct: fact_value(row, 7)?,
                    pi_signature_completion_pct: fact_value(row, 8)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("failed to read facts for subject {subject_id}"))
}

pub fn upsert_study(connection: &Connection, study_id: &str, study_name: Option<&str>) -> Result<()> {
    connection
        .execute(
            "
            INSERT INTO studies(study_id, study_name) VALUES(?1, ?2)
            ON CONFLICT(study_id) DO UPDATE SET
              study_name=COALESCE(excluded.study_name, studies.study_name)
            ",
            params![study_id, study_name],
        )
        .with_context(|| format!("failed to upsert study {study_id}"))?;
    Ok(())
}

pub fn upsert_site(connection: &Connection, study_id: &str, site: &SiteRow) -> Result<()> {
    connection
        .execute(
            "
            INSERT INTO sites(site_id, study_id, site_number, site_name) VALUES(?1, ?2, ?3, ?4)
            ON CONFLICT(site_id) DO UPDATE SET
              study_id=excluded.study_id,
              site_number=COALESCE(excluded.site_number, sites.site_number),
              site_name=COALESCE(excluded.site_name, sites.site_name)
            ",
            params![site.site_id, study_id, site.site_number, site.site_name],
        )
        .with_context(|| format!("failed to upsert site {}", site.site_id))?;
    Ok(())
}

pub fn upsert_subject(connection: &Connection, study_id: &str, subject: &SubjectRow) -> Result<()> {
    connection
        .execute(
            "
            INSERT INTO subjects(subject_id, study_id, site_id, external_id) VALUES(?1, ?2, ?3, ?4)
            ON CONFLICT(subject_id) DO UPDATE SET
              study_id=excluded.study_id,
              site_id=excluded.site_id,
              external_id=COALESCE(excluded.external_id, subjects.external_id)
            ",
            params![
                subject.subject_id,
                study_id,
                subject.site_id,
                subject.external_id
            ],
        )
        .with_context(|| format!("failed to upsert subject {}", subject.subject_id))?;
    Ok(())
}

pub fn replace_facts(connection: &Connection, subject_id: &str, facts: &BlockerFacts) -> Result<()> {
    connection
        .execute(
            "
            INSERT INTO subject_facts(
              subject_id, missing_visits, missing_pages, open_queries, non_conformant_events,
              sae_discrepancies, coding_uncoded, edrr_open_issues,
              sdv_completion_pct, pi_signature_completion_pct
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(subject_id) DO UPDATE SET
              missing_visits=excluded.missing_visits,
              missing_pages=excluded.missing_pages,
              open_queries=excluded.open_queries,
              non_conformant_events=excluded.non_conformant_events,
              sae_discrepancies=excluded.sae_discrepancies,
              coding_uncoded=excluded.coding_uncoded,
              edrr_open_issues=excluded.edrr_open_issues,
              sdv_completion_pct=excluded.sdv_completion_pct,
              pi_signature_completion_pct=excluded.pi_signature_completion_pct
            ",
            params![
                subject_id,
                facts.missing_visits,
                facts.missing_pages,
                facts.open_queries,
                facts.non_conformant_events,
                facts.sae_discrepancies,
                facts.coding_uncoded,
                facts.edrr_open_issues,
                facts.sdv_completion_pct,
                facts.pi_signature_completion_pct,
            ],
        )
        .with_context(|| format!("failed to write facts for subject {subject_id}"))?;
    Ok(())
}

/// Returns true when a row was removed.
pub fn clear_facts(connection: &Connection, subject_id: &str) -> Result<bool> {
    let removed = connection
        .execute(
            "DELETE FROM subject_facts WHERE subject_id = ?1",
            [subject_id],
        )
        .with_context(|| format!("failed to clear facts for subject {subject_id}"))?;
    Ok(removed > 0)
}
