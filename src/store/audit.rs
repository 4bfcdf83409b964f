use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};

use crate::audit_chain::{ChainBlock, PendingEvent, seal_block};
use crate::util::now_utc_string;

const BLOCK_COLUMNS: &str = "
    block_number, tx_hash, event_type, description, entity_type, entity_id,
    data_snapshot, data_hash, previous_hash, recorded_by, recorded_at
";

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<ChainBlock> {
    Ok(ChainBlock {
        block_number: row.get(0)?,
        tx_hash: row.get(1)?,
        event_type: row.get(2)?,
        description: row.get(3)?,
        entity_type: row.get(4)?,
        entity_id: row.get(5)?,
        data_snapshot: row.get(6)?,
        data_hash: row.get(7)?,
        previous_hash: row.get(8)?,
        recorded_by: row.get(9)?,
        recorded_at: row.get(10)?,
    })
}

pub fn latest_block(connection: &Connection) -> Result<Option<ChainBlock>> {
    connection
        .query_row(
            &format!("SELECT {BLOCK_COLUMNS} FROM audit_chain ORDER BY block_number DESC LIMIT 1"),
            [],
            block_from_row,
        )
        .optional()
        .context("failed to read latest audit block")
}

/// Seals and appends one block. The read of the chain head and the insert share one
/// write transaction so two writers cannot fork the chain.
pub fn append_event(connection: &mut Connection, event: PendingEvent) -> Result<ChainBlock> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let previous = latest_block(&tx)?;
    let block = seal_block(previous.as_ref(), event, &now_utc_string());

    tx.execute(
        &format!(
            "INSERT INTO audit_chain({BLOCK_COLUMNS}) VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            block.block_number,
            block.tx_hash,
            block.event_type,
            block.description,
            block.entity_type,
            block.entity_id,
            block.data_snapshot,
            block.data_hash,
            block.previous_hash,
            block.recorded_by,
            block.recorded_at,
        ],
    )
    .with_context(|| format!("failed to append audit block {}", block.block_number))?;

    tx.commit()?;
    Ok(block)
}

pub fn load_chain(connection: &Connection) -> Result<Vec<ChainBlock>> {
    let mut statement = connection.prepare(&format!(
        "SELECT {BLOCK_COLUMNS} FROM audit_chain ORDER BY block_number ASC"
    ))?;
    let rows = statement.query_map([], block_from_row)?;
    rows.collect::<rusqlite::Result<Vec<ChainBlock>>>()
        .context("failed to load audit chain")
}

pub fn entity_history(
    connection: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<ChainBlock>> {
    let mut statement = connection.prepare(&format!(
        "
        SELECT {BLOCK_COLUMNS}
        FROM audit_chain
        WHERE entity_type = ?1 AND entity_id = ?2
        ORDER BY block_number ASC
        "
    ))?;
    let rows = statement.query_map([entity_type, entity_id], block_from_row)?;
    rows.collect::<rusqlite::Result<Vec<ChainBlock>>>()
        .with_context(|| format!("failed to load audit history for {entity_type} {entity_id}"))
}
