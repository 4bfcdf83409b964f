use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use serde_json::json;
use tracing::{info, warn};

use crate::audit_chain::{ChainBlock, EVENT_DQI_COMPUTED, PendingEvent, verify_chain};
use crate::cli::{AuditArgs, AuditCommand};
use crate::model::StudyScore;
use crate::store::{self, audit as audit_store, scores};
use crate::util::{ensure_directory, write_json_stdout};

const RECORDED_BY: &str = "DQI Computation Service";

pub fn run(args: AuditArgs) -> Result<()> {
    let db_path = args.store.resolve_db_path();
    if let Some(parent) = db_path.parent() {
        ensure_directory(parent)?;
    }
    let mut connection = store::open_database(&db_path)?;

    match args.command {
        AuditCommand::Record { study_id } => {
            let score = scores::load_study_score(&connection, &study_id)?.with_context(|| {
                format!("no study score for {study_id}; run recompute first")
            })?;
            let block = record_study_snapshot(&mut connection, &study_id, &score)?;
            info!(
                study_id = %study_id,
                block_number = block.block_number,
                tx_hash = %block.tx_hash,
                "recorded audit block"
            );
            Ok(())
        }
        AuditCommand::Verify { json } => verify(&connection, json),
        AuditCommand::History {
            entity_type,
            entity_id,
        } => {
            let blocks = audit_store::entity_history(&connection, &entity_type, &entity_id)?;
            write_json_stdout(&blocks)
        }
    }
}

pub fn study_snapshot(study_id: &str, score: &StudyScore) -> serde_json::Value {
    json!({
        "study_id": study_id,
        "total_subjects": score.total_subjects,
        "clean_percentage": score.clean_percentage,
        "composite_score": score.composite_score,
        "readiness_status": score.readiness_status.as_str(),
    })
}

pub fn record_study_snapshot(
    connection: &mut Connection,
    study_id: &str,
    score: &StudyScore,
) -> Result<ChainBlock> {
    audit_store::append_event(
        connection,
        PendingEvent {
            event_type: EVENT_DQI_COMPUTED.to_string(),
            description: format!("DQI computed for study {study_id}"),
            entity_type: "Study".to_string(),
            entity_id: study_id.to_string(),
            snapshot: study_snapshot(study_id, score),
            recorded_by: RECORDED_BY.to_string(),
        },
    )
}

fn verify(connection: &Connection, json: bool) -> Result<()> {
    let blocks = audit_store::load_chain(connection)?;
    let verification = verify_chain(&blocks);

    if json {
        write_json_stdout(&verification)?;
    } else {
        let mut output = io::BufWriter::new(io::stdout().lock());
        writeln!(
            output,
            "blocks\t{}\nvalid\t{}",
            verification.total_blocks, verification.is_valid
        )?;
        for tampered in &verification.tampered_blocks {
            writeln!(
                output,
                "tampered\t{}\t{}",
                tampered.block_number, tampered.reason
            )?;
        }
        for link in &verification.broken_links {
            writeln!(
                output,
                "broken_link\t{}\texpected={}\tactual={}",
                link.block_number, link.expected_previous, link.actual_previous
            )?;
        }
        output.flush()?;
    }

    if !verification.is_valid {
        warn!(
            tampered = verification.tampered_blocks.len(),
            broken_links = verification.broken_links.len(),
            "audit chain verification failed"
        );
        bail!(
            "audit chain is invalid: {} tampered block(s), {} broken link(s)",
            verification.tampered_blocks.len(),
            verification.broken_links.len()
        );
    }

    info!(blocks = verification.total_blocks, "audit chain verified");
    Ok(())
}
