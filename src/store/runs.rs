use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: String,
    pub completed_at: String,
    pub requested_study_id: Option<String>,
    pub status: String,
    pub studies_completed: usize,
    pub studies_failed: usize,
    pub subjects_skipped: usize,
    pub weight_sum: f64,
    pub manifest_path: Option<String>,
}

pub fn insert_run(connection: &Connection, run: &RunRecord) -> Result<()> {
    connection
        .execute(
            "
            INSERT INTO recompute_runs(
              run_id, started_at, completed_at, requested_study_id, status,
              studies_completed, studies_failed, subjects_skipped, weight_sum, manifest_path
            )
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(run_id) DO UPDATE SET
              completed_at=excluded.completed_at,
              status=excluded.status,
              studies_completed=excluded.studies_completed,
              studies_failed=excluded.studies_failed,
              subjects_skipped=excluded.subjects_skipped,
              weight_sum=excluded.weight_sum,
              manifest_path=excluded.manifest_path
            ",
            params![
                run.run_id,
                run.started_at,
                run.completed_at,
                run.requested_study_id,
                run.status,
                run.studies_completed as i64,
                run.studies_failed as i64,
                run.subjects_skipped as i64,
                run.weight_sum,
                run.manifest_path,
            ],
        )
        .with_context(|| format!("failed to record run {}", run.run_id))?;
    Ok(())
}

pub fn latest_run(connection: &Connection) -> Result<Option<RunRecord>> {
    connection
        .query_row(
            "
            SELECT
              run_id, started_at, completed_at, requested_study_id, status,
              studies_completed, studies_failed, subjects_skipped, weight_sum, manifest_path
            FROM recompute_runs
            ORDER BY completed_at DESC, run_id DESC
            LIMIT 1
            ",
            [],
            |row| {
                Ok(RunRecord {
                    run_id: row.get(0)?,
                    started_at: row.get(1)?,
                    completed_at: row.get(2)?,
                    requested_study_id: row.get(3)?,
                    status: row.get(4)?,
                    studies_completed: row.get::<_, i64>(5)?.max(0) as usize,
                    studies_failed: row.get::<_, i64>(6)?.max(0) as usize,
                    subjects_skipped: row.get::<_, i64>(7)?.max(0) as usize,
                    weight_sum: row.get(8)?,
                    manifest_path: row.get(9)?,
                })
            },
        )
        .optional()
        .context("failed to read latest recompute run")
}
