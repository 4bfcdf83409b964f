use std::cmp::Ordering;
use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use serde::Serialize;

use crate::cli::{ReportArgs, ReportCommand};
use crate::model::{Blocker, CleanStatus, RiskBand, SiteScore, StudyScore, SubjectScore};
use crate::store::{self, facts, scores};
use crate::util::write_json_stdout;

#[derive(Debug, Serialize)]
struct StudyReport {
    study_id: String,
    study_name: Option<String>,
    score: Option<StudyScore>,
}

#[derive(Debug, Clone, Serialize)]
struct SiteReportRow {
    site_id: String,
    site_number: Option<String>,
    site_name: Option<String>,
    score: Option<SiteScore>,
}

#[derive(Debug, Serialize)]
struct AtRiskReportRow {
    subject_id: String,
    external_id: Option<String>,
    site_id: String,
    composite_score: f64,
    risk_band: RiskBand,
    is_clean: Option<bool>,
    blockers: Vec<Blocker>,
}

#[derive(Debug, Serialize)]
struct SubjectReport {
    subject_id: String,
    clean_status: Option<CleanStatus>,
    score: Option<SubjectScore>,
}

pub fn run(args: ReportArgs) -> Result<()> {
    let db_path = args.store.resolve_db_path();
    if !db_path.exists() {
        bail!("database not found: {}", db_path.display());
    }
    let connection = store::open_database(&db_path)?;

    match args.command {
        ReportCommand::Study { study_id } => {
            let report = study_report(&connection, &study_id)?;
            if args.json {
                return write_json_stdout(&report);
            }
            print_study(&report)
        }
        ReportCommand::Sites { study_id } => {
            let rows = site_rows(&connection, &study_id)?;
            if args.json {
                return write_json_stdout(&rows);
            }
            print_sites(&rows)
        }
        ReportCommand::AtRisk { study_id, limit } => {
            let rows: Vec<AtRiskReportRow> =
                scores::load_at_risk_subjects(&connection, &study_id, limit)?
                    .into_iter()
                    .map(|row| AtRiskReportRow {
                        subject_id: row.subject_id,
                        external_id: row.external_id,
                        site_id: row.site_id,
                        composite_score: row.composite_score,
                        risk_band: row.risk_band,
                        is_clean: row.is_clean,
                        blockers: row.blockers,
                    })
                    .collect();
            if args.json {
                return write_json_stdout(&rows);
            }
            print_at_risk(&rows)
        }
        ReportCommand::Subject { subject_id } => {
            let report = SubjectReport {
                clean_status: scores::load_clean_status(&connection, &subject_id)?,
                score: scores::load_subject_score(&connection, &subject_id)?,
                subject_id,
            };
            if report.clean_status.is_none() && report.score.is_none() {
                bail!("no computed records for subject {}", report.subject_id);
            }
            if args.json {
                return write_json_stdout(&report);
            }
            print_subject(&report)
        }
    }
}

fn study_report(connection: &Connection, study_id: &str) -> Result<StudyReport> {
    let study = facts::find_study(connection, study_id)?
        .with_context(|| format!("study not found: {study_id}"))?;
    Ok(StudyReport {
        study_id: study.study_id,
        study_name: study.study_name,
        score: scores::load_study_score(connection, study_id)?,
    })
}

fn site_rows(connection: &Connection, study_id: &str) -> Result<Vec<SiteReportRow>> {
    if facts::find_study(connection, study_id)?.is_none() {
        bail!("study not found: {study_id}");
    }

    let mut rows = Vec::new();
    for site in facts::list_sites(connection, study_id)? {
        let score = scores::load_site_score(connection, &site.site_id)?;
        rows.push(SiteReportRow {
            site_id: site.site_id,
            site_number: site.site_number,
            site_name: site.site_name,
            score,
        });
    }
    sort_sites_worst_first(&mut rows);
    Ok(rows)
}

/// Highest composite first; sites without a record go last.
fn sort_sites_worst_first(rows: &mut [SiteReportRow]) {
    rows.sort_by(|left, right| {
        let left_score = left.score.as_ref().map(|score| score.composite_score);
        let right_score = right.score.as_ref().map(|score| score.composite_score);
        match (left_score, right_score) {
            (Some(left_score), Some(right_score)) => right_score
                .partial_cmp(&left_score)
                .unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
        .then_with(|| left.site_id.cmp(&right.site_id))
    });
}

fn print_study(report: &StudyReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "study_id\t{}", report.study_id)?;
    if let Some(name) = &report.study_name {
        writeln!(output, "study_name\t{name}")?;
    }
    match &report.score {
        Some(score) => {
            writeln!(output, "total_sites\t{}", score.total_sites)?;
            writeln!(output, "total_subjects\t{}", score.total_subjects)?;
            writeln!(output, "clean_subjects\t{}", score.clean_subjects)?;
            writeln!(output, "clean_percentage\t{:.2}", score.clean_percentage)?;
            writeln!(output, "composite_score\t{:.2}", score.composite_score)?;
            writeln!(output, "readiness_status\t{}", score.readiness_status.as_str())?;
        }
        None => writeln!(output, "score\tnot computed")?,
    }
    output.flush()?;
    Ok(())
}

fn print_sites(rows: &[SiteReportRow]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(
        output,
        "site_id\tsite_number\tsubjects\tclean\tclean_pct\tcomposite\trisk_band"
    )?;
    for row in rows {
        let site_number = row.site_number.as_deref().unwrap_or("-");
        match &row.score {
            Some(score) => writeln!(
                output,
                "{}\t{}\t{}\t{}\t{:.2}\t{:.2}\t{}",
                row.site_id,
                site_number,
                score.total_subjects,
                score.clean_subjects,
                score.clean_percentage,
                score.composite_score,
                score.risk_band.as_str()
            )?,
            None => writeln!(output, "{}\t{}\tnot computed", row.site_id, site_number)?,
        }
    }
    output.flush()?;
    Ok(())
}

fn print_at_risk(rows: &[AtRiskReportRow]) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "subject_id\tsite_id\tcomposite\trisk_band\tblockers")?;
    for row in rows {
        let blockers: Vec<&str> = row.blockers.iter().map(|blocker| blocker.kind.as_str()).collect();
        writeln!(
            output,
            "{}\t{}\t{:.2}\t{}\t{}",
            row.subject_id,
            row.site_id,
            row.composite_score,
            row.risk_band.as_str(),
            blockers.join(",")
        )?;
    }
    output.flush()?;
    Ok(())
}

fn print_subject(report: &SubjectReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "subject_id\t{}", report.subject_id)?;
    if let Some(status) = &report.clean_status {
        writeln!(output, "is_clean\t{}", status.is_clean)?;
        for blocker in &status.blockers {
            writeln!(
                output,
                "blocker\t{}\t{}\t{}",
                blocker.kind.as_str(),
                blocker.count,
                blocker.severity.as_str()
            )?;
        }
    }
    if let Some(score) = &report.score {
        writeln!(output, "composite_score\t{:.2}", score.composite_score)?;
        writeln!(output, "risk_band\t{}", score.risk_band.as_str())?;
    }
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(site_id: &str, composite: Option<f64>) -> SiteReportRow {
        SiteReportRow {
            site_id: site_id.to_string(),
            site_number: None,
            site_name: None,
            score: composite.map(|composite_score| SiteScore {
                total_subjects: 1,
                clean_subjects: 0,
                clean_percentage: 0.0,
                composite_score,
                risk_band: RiskBand::from_score(composite_score),
            }),
        }
    }

    #[test]
    fn sites_sort_worst_first_with_uncomputed_last() {
        let mut rows = vec![
            site("S-1", Some(12.0)),
            site("S-2", None),
            site("S-3", Some(61.5)),
            site("S-4", Some(12.0)),
        ];
        sort_sites_worst_first(&mut rows);

        let order: Vec<&str> = rows.iter().map(|row| row.site_id.as_str()).collect();
        assert_eq!(order, vec!["S-3", "S-1", "S-4", "S-2"]);
    }

    #[test]
    fn study_report_requires_known_study() {
        let connection = crate::store::open_in_memory().expect("in-memory db");
        assert!(study_report(&connection, "missing").is_err());
        assert!(site_rows(&connection, "missing").is_err());

        facts::upsert_study(&connection, "S1", Some("Pivotal")).expect("study");
        let report = study_report(&connection, "S1").expect("report");
        assert_eq!(report.study_name.as_deref(), Some("Pivotal"));
        assert!(report.score.is_none());
    }
}
