use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::dqi::SubjectOutcome;
use crate::model::{
    Blocker, CleanStatus, ReadinessStatus, RiskBand, SiteScore, StudyScore, SubjectScore,
};

pub fn upsert_clean_status(
    connection: &Connection,
    subject_id: &str,
    status: &CleanStatus,
) -> Result<()> {
    let blockers_json = serde_json::to_string(&status.blockers)
        .with_context(|| format!("failed to serialize blockers for subject {subject_id}"))?;

    connection
        .execute(
            "
            INSERT INTO clean_status(
              subject_id, is_clean,
              has_missing_visits, missing_visits_count,
              has_missing_pages, missing_pages_count,
              has_open_queries, open_queries_count,
              has_non_conformant, non_conformant_count,
              has_sae_discrepancies, sae_discrepancy_count,
              sdv_incomplete, sdv_completion_pct,
              pi_signature_incomplete, pi_signature_completion_pct,
              has_coding_backlog, coding_uncoded_count,
              has_edrr_issues, edrr_open_issue_count,
              blockers_json
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
            ON CONFLICT(subject_id) DO UPDATE SET
              is_clean=excluded.is_clean,
              has_missing_visits=excluded.has_missing_visits,
              missing_visits_count=excluded.missing_visits_count,
              has_missing_pages=excluded.has_missing_pages,
              missing_pages_count=excluded.missing_pages_count,
              has_open_queries=excluded.has_open_queries,
              open_queries_count=excluded.open_queries_count,
              has_non_conformant=excluded.has_non_conformant,
              non_conformant_count=excluded.non_conformant_count,
              has_sae_discrepancies=excluded.has_sae_discrepancies,
              sae_discrepancy_count=excluded.sae_discrepancy_count,
              sdv_incomplete=excluded.sdv_incomplete,
              sdv_completion_pct=excluded.sdv_completion_pct,
              pi_signature_incomplete=excluded.pi_signature_incomplete,
              pi_signature_completion_pct=excluded.pi_signature_completion_pct,
              has_coding_backlog=excluded.has_coding_backlog,
              coding_uncoded_count=excluded.coding_uncoded_count,
              has_edrr_issues=excluded.has_edrr_issues,
              edrr_open_issue_count=excluded.edrr_open_issue_count,
              blockers_json=excluded.blockers_json
            ",
            params![
                subject_id,
                status.is_clean,
                status.has_missing_visits,
                status.missing_visits_count,
                status.has_missing_pages,
                status.missing_pages_count,
                status.has_open_queries,
                status.open_queries_count,
                status.has_non_conformant,
                status.non_conformant_count,
                status.has_sae_discrepancies,
                status.sae_discrepancy_count,
                status.sdv_incomplete,
                status.sdv_completion_pct,
                status.pi_signature_incomplete,
                status.pi_signature_completion_pct,
                status.has_coding_backlog,
                status.coding_uncoded_count,
                status.has_edrr_issues,
                status.edrr_open_issue_count,
                blockers_json,
            ],
        )
        .with_context(|| format!("failed to write clean status for subject {subject_id}"))?;
    Ok(())
}

pub fn upsert_subject_score(
    connection: &Connection,
    subject_id: &str,
    score: &SubjectScore,
) -> Result<()> {
    connection
        .execute(
            "
            INSERT INTO subject_scores(
              subject_id, sae_score, missing_visits_score, missing_pages_score,
              open_queries_score, non_conformant_score, sdv_score, pi_signature_score,
              coding_score, edrr_score, composite_score, risk_band
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(subject_id) DO UPDATE SET
              sae_score=excluded.sae_score,
              missing_visits_score=excluded.missing_visits_score,
              missing_pages_score=excluded.missing_pages_score,
              open_queries_score=excluded.open_queries_score,
              non_conformant_score=excluded.non_conformant_score,
              sdv_score=excluded.sdv_score,
              pi_signature_score=excluded.pi_signature_score,
              coding_score=excluded.coding_score,
              edrr_score=excluded.edrr_score,
              composite_score=excluded.composite_score,
              risk_band=excluded.risk_band
            ",
            params![
                subject_id,
                score.sae_score,
                score.missing_visits_score,
                score.missing_pages_score,
                score.open_queries_score,
                score.non_conformant_score,
                score.sdv_score,
                score.pi_signature_score,
                score.coding_score,
                score.edrr_score,
                score.composite_score,
                score.risk_band.as_str(),
            ],
        )
        .with_context(|| format!("failed to write score for subject {subject_id}"))?;
    Ok(())
}

pub fn upsert_site_score(connection: &Connection, site_id: &str, score: &SiteScore) -> Result<()> {
    connection
        .execute(
            "
            INSERT INTO site_scores(
              site_id, total_subjects, clean_subjects, clean_percentage, composite_score, risk_band
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(site_id) DO UPDATE SET
              total_subjects=excluded.total_subjects,
              clean_subjects=excluded.clean_subjects,
              clean_percentage=excluded.clean_percentage,
              composite_score=excluded.composite_score,
              risk_band=excluded.risk_band
            ",
            params![
                site_id,
                score.total_subjects,
                score.clean_subjects,
                score.clean_percentage,
                score.composite_score,
                score.risk_band.as_str(),
            ],
        )
        .with_context(|| format!("failed to write score for site {site_id}"))?;
    Ok(())
}

pub fn upsert_study_score(
    connection: &Connection,
    study_id: &str,
    score: &StudyScore,
) -> Result<()> {
    connection
        .execute(
            "
            INSERT INTO study_scores(
              study_id, total_sites, total_subjects, clean_subjects,
              clean_percentage, composite_score, readiness_status
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(study_id) DO UPDATE SET
              total_sites=excluded.total_sites,
              total_subjects=excluded.total_subjects,
              clean_subjects=excluded.clean_subjects,
              clean_percentage=excluded.clean_percentage,
              composite_score=excluded.composite_score,
              readiness_status=excluded.readiness_status
            ",
            params![
                study_id,
                score.total_sites,
                score.total_subjects,
                score.clean_subjects,
                score.clean_percentage,
                score.composite_score,
                score.readiness_status.as_str(),
            ],
        )
        .with_context(|| format!("failed to write score for study {study_id}"))?;
    Ok(())
}

pub fn delete_site_score(connection: &Connection, site_id: &str) -> Result<()> {
    connection
        .execute("DELETE FROM site_scores WHERE site_id = ?1", [site_id])
        .with_context(|| format!("failed to clear score for site {site_id}"))?;
    Ok(())
}

fn parse_risk_band(raw: &str) -> Result<RiskBand> {
    RiskBand::parse(raw).ok_or_else(|| anyhow!("unknown risk band in store: {raw}"))
}

fn parse_blockers(raw: &str) -> Result<Vec<Blocker>> {
    serde_json::from_str(raw).with_context(|| format!("failed to parse blockers_json: {raw}"))
}

struct CleanStatusRow {
    status: CleanStatus,
    blockers_json: String,
}

fn clean_status_from_row(row: &Row<'_>) -> rusqlite::Result<CleanStatusRow> {
    Ok(CleanStatusRow {
        status: CleanStatus {
            is_clean: row.get(0)?,
            has_missing_visits: row.get(1)?,
            missing_visits_count: row.get(2)?,
            has_missing_pages: row.get(3)?,
            missing_pages_count: row.get(4)?,
            has_open_queries: row.get(5)?,
            open_queries_count: row.get(6)?,
            has_non_conformant: row.get(7)?,
            non_conformant_count: row.get(8)?,
            has_sae_discrepancies: row.get(9)?,
            sae_discrepancy_count: row.get(10)?,
            sdv_incomplete: row.get(11)?,
            sdv_completion_pct: row.get(12)?,
            pi_signature_incomplete: row.get(13)?,
            pi_signature_completion_pct: row.get(14)?,
            has_coding_backlog: row.get(15)?,
            coding_uncoded_count: row.get(16)?,
            has_edrr_issues: row.get(17)?,
            edrr_open_issue_count: row.get(18)?,
            blockers: Vec::new(),
        },
        blockers_json: row.get(19)?,
    })
}

pub fn load_clean_status(connection: &Connection, subject_id: &str) -> Result<Option<CleanStatus>> {
    let row = connection
        .query_row(
            "
            SELECT
              is_clean,
              has_missing_visits, missing_visits_count,
              has_missing_pages, missing_pages_count,
              has_open_queries, open_queries_count,
              has_non_conformant, non_conformant_count,
              has_sae_discrepancies, sae_discrepancy_count,
              sdv_incomplete, sdv_completion_pct,
              pi_signature_incomplete, pi_signature_completion_pct,
              has_coding_backlog, coding_uncoded_count,
              has_edrr_issues, edrr_open_issue_count,
              blockers_json
            FROM clean_status
            WHERE subject_id = ?1
            ",
            [subject_id],
            clean_status_from_row,
        )
        .optional()
        .with_context(|| format!("failed to read clean status for subject {subject_id}"))?;

    let Some(CleanStatusRow {
        mut status,
        blockers_json,
    }) = row
    else {
        return Ok(None);
    };
    status.blockers = parse_blockers(&blockers_json)?;
    Ok(Some(status))
}

pub fn load_subject_score(
    connection: &Connection,
    subject_id: &str,
) -> Result<Option<SubjectScore>> {
    let row = connection
        .query_row(
            "
            SELECT
              sae_score, missing_visits_score, missing_pages_score, open_queries_score,
              non_conformant_score, sdv_score, pi_signature_score, coding_score, edrr_score,
              composite_score, risk_band
            FROM subject_scores
            WHERE subject_id = ?1
            ",
            [subject_id],
            |row| {
                Ok((
                    [
                        row.get::<_, f64>(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                    ],
                    row.get::<_, String>(10)?,
                ))
            },
        )
        .optional()
        .with_context(|| format!("failed to read score for subject {subject_id}"))?;

    let Some((values, risk_band)) = row else {
        return Ok(None);
    };

    Ok(Some(SubjectScore {
        sae_score: values[0],
        missing_visits_score: values[1],
        missing_pages_score: values[2],
        open_queries_score: values[3],
        non_conformant_score: values[4],
        sdv_score: values[5],
        pi_signature_score: values[6],
        coding_score: values[7],
        edrr_score: values[8],
        composite_score: values[9],
        risk_band: parse_risk_band(&risk_band)?,
    }))
}

pub fn load_site_score(connection: &Connection, site_id: &str) -> Result<Option<SiteScore>> {
    let row = connection
        .query_row(
            "
            SELECT total_subjects, clean_subjects, clean_percentage, composite_score, risk_band
            FROM site_scores
            WHERE site_id = ?1
            ",
            [site_id],
            |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()
        .with_context(|| format!("failed to read score for site {site_id}"))?;

    let Some((total_subjects, clean_subjects, clean_percentage, composite_score, risk_band)) = row
    else {
        return Ok(None);
    };

    Ok(Some(SiteScore {
        total_subjects,
        clean_subjects,
        clean_percentage,
        composite_score,
        risk_band: parse_risk_band(&risk_band)?,
    }))
}

pub fn load_study_score(connection: &Connection, study_id: &str) -> Result<Option<StudyScore>> {
    let row = connection
        .query_row(
            "
            SELECT
              total_sites, total_subjects, clean_subjects,
              clean_percentage, composite_score, readiness_status
            FROM study_scores
            WHERE study_id = ?1
            ",
            [study_id],
            |row| {
                Ok((
                    row.get::<_, u32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()
        .with_context(|| format!("failed to read score for study {study_id}"))?;

    let Some((
        total_sites,
        total_subjects,
        clean_subjects,
        clean_percentage,
        composite_score,
        readiness,
    )) = row
    else {
        return Ok(None);
    };

    let readiness_status = ReadinessStatus::parse(&readiness)
        .ok_or_else(|| anyhow!("unknown readiness status in store: {readiness}"))?;

    Ok(Some(StudyScore {
        total_sites,
        total_subjects,
        clean_subjects,
        clean_percentage,
        composite_score,
        readiness_status,
    }))
}

/// Every subject of the study with whatever records currently exist for it.
pub fn load_study_outcomes(
    connection: &Connection,
    study_id: &str,
) -> Result<Vec<(String, SubjectOutcome)>> {
    let mut statement = connection.prepare(
        "
        SELECT
          subjects.site_id,
          clean_status.is_clean,
          subject_scores.composite_score
        FROM subjects
        LEFT JOIN clean_status ON clean_status.subject_id = subjects.subject_id
        LEFT JOIN subject_scores ON subject_scores.subject_id = subjects.subject_id
        WHERE subjects.study_id = ?1
        ORDER BY subjects.subject_id ASC
        ",
    )?;
    let rows = statement.query_map([study_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            SubjectOutcome {
                is_clean: row.get(1)?,
                composite_score: row.get(2)?,
            },
        ))
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .with_context(|| format!("failed to load subject outcomes for study {study_id}"))
}

#[derive(Debug, Clone)]
pub struct AtRiskRow {
    pub subject_id: String,
    pub external_id: Option<String>,
    pub site_id: String,
    pub composite_score: f64,
    pub risk_band: RiskBand,
    pub is_clean: Option<bool>,
    pub blockers: Vec<Blocker>,
}

/// High and Critical subjects, worst first.
pub fn load_at_risk_subjects(
    connection: &Connection,
    study_id: &str,
    limit: usize,
) -> Result<Vec<AtRiskRow>> {
    let mut statement = connection.prepare(
        "
        SELECT
          subjects.subject_id,
          subjects.external_id,
          subjects.site_id,
          subject_scores.composite_score,
          subject_scores.risk_band,
          clean_status.is_clean,
          clean_status.blockers_json
        FROM subject_scores
        JOIN subjects ON subjects.subject_id = subject_scores.subject_id
        LEFT JOIN clean_status ON clean_status.subject_id = subjects.subject_id
        WHERE subjects.study_id = ?1
          AND subject_scores.risk_band IN ('High', 'Critical')
        ORDER BY subject_scores.composite_score DESC, subjects.subject_id ASC
        LIMIT ?2
        ",
    )?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let mut rows = statement.query(params![study_id, limit])?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        let risk_band: String = row.get(4)?;
        let blockers_json: Option<String> = row.get(6)?;
        out.push(AtRiskRow {
            subject_id: row.get(0)?,
            external_id: row.get(1)?,
            site_id: row.get(2)?,
            composite_score: row.get(3)?,
            risk_band: parse_risk_band(&risk_band)?,
            is_clean: row.get(5)?,
            blockers: match blockers_json {
                Some(raw) => parse_blockers(&raw)?,
                None => Vec::new(),
            },
        });
    }

    Ok(out)
}
