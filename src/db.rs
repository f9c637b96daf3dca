use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::entities::{
    Action, ActionStatus, Checkpoint, CheckpointStatus, HierarchyFilter, KeyResult, Objective,
    OrgUnit,
};
use crate::error::OkrError;
use crate::locale::{parse_br_date, parse_decimal, to_canonical};
use crate::schedule::Frequency;

// Numbers are stored as canonical TEXT ("2300.00") and always come back through
// parse_decimal, whatever the column happens to hold.

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Event for audit trail ("Every change is an event")
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Objectives (with their place in the org hierarchy)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS objectives (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            region TEXT NOT NULL,
            sub_region TEXT,
            service_line TEXT,
            service TEXT,
            owner TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Key Results
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS key_results (
            id TEXT PRIMARY KEY,
            objective_id TEXT NOT NULL REFERENCES objectives(id),
            title TEXT NOT NULL,
            unit TEXT NOT NULL DEFAULT '',
            total_target TEXT NOT NULL,
            current_value TEXT NOT NULL DEFAULT '0.00',
            frequency TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            import_hash TEXT UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Checkpoints (written as a whole batch, ordered by period_index)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS checkpoints (
            id TEXT PRIMARY KEY,
            key_result_id TEXT NOT NULL REFERENCES key_results(id),
            period_index INTEGER NOT NULL,
            period_label TEXT NOT NULL,
            target_value TEXT NOT NULL,
            actual_value TEXT,
            due_date TEXT NOT NULL,
            status TEXT NOT NULL,
            UNIQUE(key_result_id, period_index)
        )",
        [],
    )?;

    // ==========================================================================
    // Actions
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS actions (
            id TEXT PRIMARY KEY,
            key_result_id TEXT NOT NULL REFERENCES key_results(id),
            title TEXT NOT NULL,
            responsible TEXT NOT NULL DEFAULT '',
            due_date TEXT,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_key_results_objective ON key_results(objective_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checkpoints_key_result ON checkpoints(key_result_id, period_index)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_actions_key_result ON actions(key_result_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn optional_date_column(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

/// Decimal columns: canonical text, but tolerate whatever a driver stored
fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<f64> {
    let value: rusqlite::types::Value = row.get(idx)?;
    Ok(decimal_value(value))
}

fn optional_decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Option<f64>> {
    let value: rusqlite::types::Value = row.get(idx)?;
    match value {
        rusqlite::types::Value::Null => Ok(None),
        other => Ok(Some(decimal_value(other))),
    }
}

fn decimal_value(value: rusqlite::types::Value) -> f64 {
    use rusqlite::types::Value;

    match value {
        Value::Text(s) => parse_decimal(s.as_str()),
        Value::Real(f) => parse_decimal(f),
        Value::Integer(i) => parse_decimal(i),
        Value::Null | Value::Blob(_) => 0.0,
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// ============================================================================
// OBJECTIVES
// ============================================================================

const OBJECTIVE_COLUMNS: &str =
    "id, title, description, region, sub_region, service_line, service, owner, created_at";

fn row_to_objective(row: &Row) -> rusqlite::Result<Objective> {
    Ok(Objective {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        org_unit: OrgUnit {
            region: row.get(3)?,
            sub_region: row.get(4)?,
            service_line: row.get(5)?,
            service: row.get(6)?,
        },
        owner: row.get(7)?,
        created_at: timestamp_column(row, 8)?,
    })
}

pub fn insert_objective(conn: &Connection, objective: &Objective) -> Result<()> {
    conn.execute(
        "INSERT INTO objectives (
            id, title, description, region, sub_region, service_line, service, owner, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            objective.id,
            objective.title,
            objective.description,
            objective.org_unit.region,
            objective.org_unit.sub_region,
            objective.org_unit.service_line,
            objective.org_unit.service,
            objective.owner,
            objective.created_at.to_rfc3339(),
        ],
    )
    .context("Failed to insert objective")?;

    let event = Event::new(
        "objective_created",
        "objective",
        &objective.id,
        serde_json::json!({ "title": objective.title, "unit": objective.org_unit.path() }),
        &actor_or_system(&objective.owner),
    );
    insert_event(conn, &event)?;

    info!(objective_id = %objective.id, title = %objective.title, "objective created");
    Ok(())
}

pub fn get_objective(conn: &Connection, id: &str) -> Result<Objective> {
    let sql = format!("SELECT {} FROM objectives WHERE id = ?1", OBJECTIVE_COLUMNS);

    conn.query_row(&sql, [id], row_to_objective)
        .optional()?
        .ok_or_else(|| OkrError::not_found("objective", id).into())
}

/// Objectives whose org unit matches `filter`, newest first
pub fn get_objectives(conn: &Connection, filter: &HierarchyFilter) -> Result<Vec<Objective>> {
    let sql = format!(
        "SELECT {} FROM objectives ORDER BY created_at DESC, title",
        OBJECTIVE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let objectives = stmt
        .query_map([], row_to_objective)?
        .collect::<Result<Vec<_>, _>>()?;

    if filter.is_empty() {
        return Ok(objectives);
    }

    Ok(objectives
        .into_iter()
        .filter(|o| filter.matches(&o.org_unit))
        .collect())
}

fn find_objective_by_title(
    conn: &Connection,
    title: &str,
    region: &str,
) -> Result<Option<Objective>> {
    let sql = format!(
        "SELECT {} FROM objectives
         WHERE lower(title) = lower(?1) AND lower(region) = lower(?2)
         LIMIT 1",
        OBJECTIVE_COLUMNS
    );

    Ok(conn
        .query_row(&sql, params![title.trim(), region.trim()], row_to_objective)
        .optional()?)
}

// ============================================================================
// KEY RESULTS
// ============================================================================

const KEY_RESULT_COLUMNS: &str = "kr.id, kr.objective_id, kr.title, kr.unit, kr.total_target, \
     kr.current_value, kr.frequency, kr.start_date, kr.end_date, kr.created_at";

fn row_to_key_result(row: &Row) -> rusqlite::Result<KeyResult> {
    let frequency: String = row.get(6)?;

    Ok(KeyResult {
        id: row.get(0)?,
        objective_id: row.get(1)?,
        title: row.get(2)?,
        unit: row.get(3)?,
        total_target: decimal_column(row, 4)?,
        current_value: decimal_column(row, 5)?,
        frequency: frequency
            .parse::<Frequency>()
            .map_err(|e| conversion_error(6, e))?,
        start_date: date_column(row, 7)?,
        end_date: date_column(row, 8)?,
        created_at: timestamp_column(row, 9)?,
    })
}

/// Insert a key result together with its full checkpoint batch.
///
/// One transaction: readers see either no checkpoints or all of them.
pub fn create_key_result(
    conn: &Connection,
    key_result: &KeyResult,
    actor: &str,
) -> Result<Vec<Checkpoint>> {
    let tx = conn.unchecked_transaction()?;
    let checkpoints = write_key_result(&tx, key_result, None, actor)?;
    tx.commit()?;

    info!(
        key_result_id = %key_result.id,
        checkpoints = checkpoints.len(),
        "key result created"
    );
    Ok(checkpoints)
}

/// Key result row, checkpoint batch and event. The caller owns the transaction.
fn write_key_result(
    conn: &Connection,
    key_result: &KeyResult,
    import_hash: Option<&str>,
    actor: &str,
) -> Result<Vec<Checkpoint>> {
    // Fails with NotFound before anything is written
    get_objective(conn, &key_result.objective_id)?;

    let checkpoints: Vec<Checkpoint> = key_result
        .plan_checkpoints()?
        .into_iter()
        .map(|plan| Checkpoint::from_plan(&key_result.id, plan))
        .collect();

    conn.execute(
        "INSERT INTO key_results (
            id, objective_id, title, unit, total_target, current_value,
            frequency, start_date, end_date, import_hash, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            key_result.id,
            key_result.objective_id,
            key_result.title,
            key_result.unit,
            to_canonical(key_result.total_target),
            to_canonical(key_result.current_value),
            key_result.frequency.as_str(),
            format_date(key_result.start_date),
            format_date(key_result.end_date),
            import_hash,
            key_result.created_at.to_rfc3339(),
        ],
    )
    .context("Failed to insert key result")?;

    insert_checkpoints(conn, &checkpoints)?;

    let event = Event::new(
        "key_result_created",
        "key_result",
        &key_result.id,
        serde_json::json!({
            "objective_id": key_result.objective_id,
            "total_target": to_canonical(key_result.total_target),
            "frequency": key_result.frequency.as_str(),
            "checkpoints": checkpoints.len(),
        }),
        actor,
    );
    insert_event(conn, &event)?;

    debug!(key_result_id = %key_result.id, "key result written");
    Ok(checkpoints)
}

fn insert_checkpoints(conn: &Connection, checkpoints: &[Checkpoint]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO checkpoints (
            id, key_result_id, period_index, period_label, target_value,
            actual_value, due_date, status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;

    for cp in checkpoints {
        stmt.execute(params![
            cp.id,
            cp.key_result_id,
            cp.period_index,
            cp.period_label,
            to_canonical(cp.target_value),
            cp.actual_value.map(to_canonical),
            format_date(cp.due_date),
            cp.status.as_str(),
        ])?;
    }

    Ok(())
}

pub fn get_key_result(conn: &Connection, id: &str) -> Result<KeyResult> {
    let sql = format!("SELECT {} FROM key_results kr WHERE kr.id = ?1", KEY_RESULT_COLUMNS);

    conn.query_row(&sql, [id], row_to_key_result)
        .optional()?
        .ok_or_else(|| OkrError::not_found("key_result", id).into())
}

pub fn get_key_results_for_objective(
    conn: &Connection,
    objective_id: &str,
) -> Result<Vec<KeyResult>> {
    let sql = format!(
        "SELECT {} FROM key_results kr WHERE kr.objective_id = ?1 ORDER BY kr.created_at, kr.title",
        KEY_RESULT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let key_results = stmt
        .query_map([objective_id], row_to_key_result)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(key_results)
}

/// Key results whose objective sits under `filter`
pub fn get_key_results(conn: &Connection, filter: &HierarchyFilter) -> Result<Vec<KeyResult>> {
    let sql = format!(
        "SELECT {}, o.region, o.sub_region, o.service_line, o.service
         FROM key_results kr
         JOIN objectives o ON o.id = kr.objective_id
         ORDER BY o.title, kr.created_at, kr.title",
        KEY_RESULT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map([], |row| {
            let kr = row_to_key_result(row)?;
            let unit = OrgUnit {
                region: row.get(10)?,
                sub_region: row.get(11)?,
                service_line: row.get(12)?,
                service: row.get(13)?,
            };
            Ok((kr, unit))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter(|(_, unit)| filter.matches(unit))
        .map(|(kr, _)| kr)
        .collect())
}

/// Change frequency and/or date range and regenerate the checkpoint batch.
///
/// Recorded actuals belong to the old periods and are dropped with them;
/// the key result's current value is kept.
pub fn reschedule_key_result(
    conn: &Connection,
    id: &str,
    frequency: Frequency,
    start_date: NaiveDate,
    end_date: NaiveDate,
    actor: &str,
) -> Result<(KeyResult, Vec<Checkpoint>)> {
    let mut key_result = get_key_result(conn, id)?;
    key_result.frequency = frequency;
    key_result.start_date = start_date;
    key_result.end_date = end_date;

    // Validate before touching the stored batch
    let checkpoints: Vec<Checkpoint> = key_result
        .plan_checkpoints()?
        .into_iter()
        .map(|plan| Checkpoint::from_plan(&key_result.id, plan))
        .collect();

    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "UPDATE key_results SET frequency = ?1, start_date = ?2, end_date = ?3 WHERE id = ?4",
        params![
            frequency.as_str(),
            format_date(start_date),
            format_date(end_date),
            id
        ],
    )?;

    let removed = tx.execute("DELETE FROM checkpoints WHERE key_result_id = ?1", [id])?;
    insert_checkpoints(&tx, &checkpoints)?;

    let event = Event::new(
        "key_result_rescheduled",
        "key_result",
        id,
        serde_json::json!({
            "frequency": frequency.as_str(),
            "start_date": format_date(start_date),
            "end_date": format_date(end_date),
            "removed_checkpoints": removed,
            "checkpoints": checkpoints.len(),
        }),
        actor,
    );
    insert_event(&tx, &event)?;

    tx.commit()?;

    info!(key_result_id = %id, removed, created = checkpoints.len(), "key result rescheduled");
    Ok((key_result, checkpoints))
}

pub fn count_key_results(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM key_results", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// CHECKPOINTS
// ============================================================================

const CHECKPOINT_COLUMNS: &str = "id, key_result_id, period_index, period_label, target_value, \
     actual_value, due_date, status";

fn row_to_checkpoint(row: &Row) -> rusqlite::Result<Checkpoint> {
    let status: String = row.get(7)?;

    Ok(Checkpoint {
        id: row.get(0)?,
        key_result_id: row.get(1)?,
        period_index: row.get(2)?,
        period_label: row.get(3)?,
        target_value: decimal_column(row, 4)?,
        actual_value: optional_decimal_column(row, 5)?,
        due_date: date_column(row, 6)?,
        status: status
            .parse::<CheckpointStatus>()
            .map_err(|e| conversion_error(7, e))?,
    })
}

/// Checkpoints of a key result in schedule order
pub fn get_checkpoints(conn: &Connection, key_result_id: &str) -> Result<Vec<Checkpoint>> {
    let sql = format!(
        "SELECT {} FROM checkpoints WHERE key_result_id = ?1 ORDER BY period_index",
        CHECKPOINT_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let checkpoints = stmt
        .query_map([key_result_id], row_to_checkpoint)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(checkpoints)
}

pub fn get_checkpoint(conn: &Connection, id: &str) -> Result<Checkpoint> {
    let sql = format!("SELECT {} FROM checkpoints WHERE id = ?1", CHECKPOINT_COLUMNS);

    conn.query_row(&sql, [id], row_to_checkpoint)
        .optional()?
        .ok_or_else(|| OkrError::not_found("checkpoint", id).into())
}

/// Record a user-entered value ("1.234,56") on a checkpoint.
///
/// The raw text must contain at least one digit: the normalizer maps garbage
/// to 0 and that must not be stored as an explicit zero. The key result's
/// current value follows the latest checkpoint that has a recorded value.
pub fn record_checkpoint_value(
    conn: &Connection,
    checkpoint_id: &str,
    raw_value: &str,
    today: NaiveDate,
    actor: &str,
) -> Result<Checkpoint> {
    if !raw_value.chars().any(|c| c.is_ascii_digit()) {
        warn!(
            checkpoint_id = %checkpoint_id,
            raw = %raw_value,
            "rejected non-numeric checkpoint value"
        );
        return Err(OkrError::validation(
            "actual_value",
            format!("'{}' is not a number", raw_value),
        )
        .into());
    }

    let value = parse_decimal(raw_value);
    let mut checkpoint = get_checkpoint(conn, checkpoint_id)?;
    checkpoint.record(value, today);

    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "UPDATE checkpoints SET actual_value = ?1, status = ?2 WHERE id = ?3",
        params![to_canonical(value), checkpoint.status.as_str(), checkpoint_id],
    )?;

    let latest: Option<rusqlite::types::Value> = tx
        .query_row(
            "SELECT actual_value FROM checkpoints
             WHERE key_result_id = ?1 AND actual_value IS NOT NULL
             ORDER BY period_index DESC
             LIMIT 1",
            [&checkpoint.key_result_id],
            |row| row.get(0),
        )
        .optional()?;
    let current_value = latest.map(decimal_value).unwrap_or(0.0);

    tx.execute(
        "UPDATE key_results SET current_value = ?1 WHERE id = ?2",
        params![to_canonical(current_value), checkpoint.key_result_id],
    )?;

    let event = Event::new(
        "checkpoint_recorded",
        "checkpoint",
        checkpoint_id,
        serde_json::json!({
            "key_result_id": checkpoint.key_result_id,
            "raw": raw_value,
            "actual_value": to_canonical(value),
            "status": checkpoint.status.as_str(),
        }),
        actor,
    );
    insert_event(&tx, &event)?;

    tx.commit()?;

    info!(
        checkpoint_id = %checkpoint_id,
        actual = value,
        status = %checkpoint.status,
        "checkpoint recorded"
    );
    Ok(checkpoint)
}

// ============================================================================
// ACTIONS
// ============================================================================

fn row_to_action(row: &Row) -> rusqlite::Result<Action> {
    let status: String = row.get(5)?;

    Ok(Action {
        id: row.get(0)?,
        key_result_id: row.get(1)?,
        title: row.get(2)?,
        responsible: row.get(3)?,
        due_date: optional_date_column(row, 4)?,
        status: status
            .parse::<ActionStatus>()
            .map_err(|e| conversion_error(5, e))?,
        created_at: timestamp_column(row, 6)?,
    })
}

pub fn insert_action(conn: &Connection, action: &Action, actor: &str) -> Result<()> {
    get_key_result(conn, &action.key_result_id)?;

    conn.execute(
        "INSERT INTO actions (id, key_result_id, title, responsible, due_date, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            action.id,
            action.key_result_id,
            action.title,
            action.responsible,
            action.due_date.map(format_date),
            action.status.as_str(),
            action.created_at.to_rfc3339(),
        ],
    )
    .context("Failed to insert action")?;

    let event = Event::new(
        "action_created",
        "action",
        &action.id,
        serde_json::json!({ "key_result_id": action.key_result_id, "title": action.title }),
        actor,
    );
    insert_event(conn, &event)?;

    debug!(action_id = %action.id, "action created");
    Ok(())
}

pub fn get_actions(conn: &Connection, key_result_id: &str) -> Result<Vec<Action>> {
    let mut stmt = conn.prepare(
        "SELECT id, key_result_id, title, responsible, due_date, status, created_at
         FROM actions
         WHERE key_result_id = ?1
         ORDER BY created_at, title",
    )?;

    let actions = stmt
        .query_map([key_result_id], row_to_action)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(actions)
}

pub fn update_action_status(
    conn: &Connection,
    id: &str,
    status: ActionStatus,
    actor: &str,
) -> Result<Action> {
    let updated = conn.execute(
        "UPDATE actions SET status = ?1 WHERE id = ?2",
        params![status.as_str(), id],
    )?;

    if updated == 0 {
        return Err(OkrError::not_found("action", id).into());
    }

    let event = Event::new(
        "action_status_changed",
        "action",
        id,
        serde_json::json!({ "status": status.as_str() }),
        actor,
    );
    insert_event(conn, &event)?;

    conn.query_row(
        "SELECT id, key_result_id, title, responsible, due_date, status, created_at
         FROM actions WHERE id = ?1",
        [id],
        row_to_action,
    )
    .context("Failed to reload action")
}

// ============================================================================
// EVENTS
// ============================================================================

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_column(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn actor_or_system(actor: &str) -> String {
    if actor.trim().is_empty() {
        "system".to_string()
    } else {
        actor.to_string()
    }
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One spreadsheet row: objective + key result, Brazilian numbers and dates
#[derive(Debug, Clone, Deserialize)]
pub struct KeyResultImportRow {
    #[serde(rename = "Objetivo")]
    pub objective: String,
    #[serde(rename = "Regiao")]
    pub region: String,
    #[serde(rename = "Subregiao", default)]
    pub sub_region: String,
    #[serde(rename = "Linha_Servico", default)]
    pub service_line: String,
    #[serde(rename = "Servico", default)]
    pub service: String,
    #[serde(rename = "Resultado_Chave")]
    pub key_result: String,
    #[serde(rename = "Unidade", default)]
    pub unit: String,
    #[serde(rename = "Meta")]
    pub target: String,
    #[serde(rename = "Frequencia")]
    pub frequency: String,
    #[serde(rename = "Inicio")]
    pub start_date: String,
    #[serde(rename = "Fim")]
    pub end_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub rows: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub objectives_created: usize,
}

/// Hash for idempotent re-import (NOT identity: identity is the UUID)
pub fn compute_import_hash(
    objective: &str,
    key_result: &str,
    target: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|{}",
        objective.trim().to_lowercase(),
        key_result.trim().to_lowercase(),
        to_canonical(target),
        format_date(start),
        format_date(end)
    ));
    format!("{:x}", hasher.finalize())
}

pub fn load_import_csv(csv_path: &Path) -> Result<Vec<KeyResultImportRow>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file: {}", csv_path.display()))?;

    let mut rows = Vec::new();
    for (line_num, result) in rdr.deserialize().enumerate() {
        let row: KeyResultImportRow = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, csv_path.display())
        })?;
        rows.push(row);
    }

    Ok(rows)
}

/// Import key results; rows seen before (same hash) are skipped.
///
/// All or nothing: one bad row rolls back every objective and key result
/// written for the file.
pub fn import_key_results(
    conn: &Connection,
    rows: &[KeyResultImportRow],
    actor: &str,
) -> Result<ImportReport> {
    let mut report = ImportReport {
        rows: rows.len(),
        ..Default::default()
    };

    let tx = conn.unchecked_transaction()?;

    for (i, row) in rows.iter().enumerate() {
        let line = i + 2; // 1-indexed + header row

        let target = parse_decimal(row.target.as_str());
        let start = parse_br_date(&row.start_date).ok_or_else(|| {
            OkrError::validation(
                "Inicio",
                format!("line {}: invalid date '{}'", line, row.start_date),
            )
        })?;
        let end = parse_br_date(&row.end_date).ok_or_else(|| {
            OkrError::validation("Fim", format!("line {}: invalid date '{}'", line, row.end_date))
        })?;
        let frequency = row
            .frequency
            .parse::<Frequency>()
            .map_err(OkrError::from)
            .with_context(|| format!("line {}", line))?;

        let hash = compute_import_hash(&row.objective, &row.key_result, target, start, end);

        let seen: Option<String> = tx
            .query_row(
                "SELECT id FROM key_results WHERE import_hash = ?1",
                [&hash],
                |r| r.get(0),
            )
            .optional()?;
        if seen.is_some() {
            report.duplicates += 1;
            continue;
        }

        // Target and range are checked before the objective is touched
        let mut key_result =
            KeyResult::new("", &row.key_result, &row.unit, target, frequency, start, end)
                .with_context(|| format!("line {}", line))?;

        let objective = match find_objective_by_title(&tx, &row.objective, &row.region)? {
            Some(existing) => existing,
            None => {
                let unit = OrgUnit::new(&row.region)
                    .with_sub_region(&row.sub_region)
                    .with_service_line(&row.service_line)
                    .with_service(&row.service);
                let objective = Objective::new(&row.objective, unit)
                    .with_context(|| format!("line {}", line))?
                    .with_owner(actor);
                insert_objective(&tx, &objective)?;
                report.objectives_created += 1;
                objective
            }
        };

        key_result.objective_id = objective.id;
        write_key_result(&tx, &key_result, Some(&hash), actor)?;
        report.inserted += 1;
    }

    tx.commit()?;

    info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        objectives = report.objectives_created,
        "key result import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn seed_objective(conn: &Connection) -> Objective {
        let unit = OrgUnit::new("Sul").with_sub_region("RS").with_service_line("Consultoria");
        let objective = Objective::new("Crescer receita", unit).unwrap();
        insert_objective(conn, &objective).unwrap();
        objective
    }

    fn seed_key_result(conn: &Connection, objective: &Objective) -> KeyResult {
        let kr = KeyResult::new(
            &objective.id,
            "Novos contratos",
            "R$",
            2500.0,
            Frequency::Quarterly,
            date(2025, 1, 1),
            date(2025, 9, 30),
        )
        .unwrap();
        create_key_result(conn, &kr, "tester").unwrap();
        kr
    }

    #[test]
    fn test_create_key_result_persists_checkpoint_batch() {
        let conn = test_db();
        let objective = seed_objective(&conn);
        let kr = seed_key_result(&conn, &objective);

        let stored = get_key_result(&conn, &kr.id).unwrap();
        assert_eq!(stored.total_target, 2500.0);
        assert_eq!(stored.frequency, Frequency::Quarterly);
        assert_eq!(stored.end_date, date(2025, 9, 30));

        let checkpoints = get_checkpoints(&conn, &kr.id).unwrap();
        let targets: Vec<f64> = checkpoints.iter().map(|c| c.target_value).collect();
        assert_eq!(targets, vec![833.33, 1666.67, 2500.0]);
        assert_eq!(checkpoints[0].period_index, 1);
        assert!(checkpoints.iter().all(|c| c.status == CheckpointStatus::Pending));

        // Stored as canonical text
        let raw: String = conn
            .query_row(
                "SELECT target_value FROM checkpoints WHERE key_result_id = ?1 AND period_index = 2",
                [&kr.id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(raw, "1666.67");

        assert_eq!(count_key_results(&conn).unwrap(), 1);
        let events = get_events_for_entity(&conn, "key_result", &kr.id).unwrap();
        assert_eq!(events[0].event_type, "key_result_created");
        assert_eq!(events[0].actor, "tester");
    }

    #[test]
    fn test_create_key_result_requires_objective() {
        let conn = test_db();
        let kr = KeyResult::new(
            "missing",
            "KR",
            "",
            10.0,
            Frequency::Monthly,
            date(2025, 1, 1),
            date(2025, 3, 31),
        )
        .unwrap();

        let err = create_key_result(&conn, &kr, "tester").unwrap_err();
        assert!(matches!(err.downcast_ref::<OkrError>(), Some(OkrError::NotFound { .. })));
        assert_eq!(count_key_results(&conn).unwrap(), 0);
    }

    #[test]
    fn test_record_checkpoint_value_updates_key_result() {
        let conn = test_db();
        let objective = seed_objective(&conn);
        let kr = seed_key_result(&conn, &objective);
        let checkpoints = get_checkpoints(&conn, &kr.id).unwrap();

        let updated = record_checkpoint_value(
            &conn,
            &checkpoints[0].id,
            "900,00",
            date(2025, 3, 20),
            "ana",
        )
        .unwrap();
        assert_eq!(updated.actual_value, Some(900.0));
        assert_eq!(updated.status, CheckpointStatus::Completed);
        assert_eq!(get_key_result(&conn, &kr.id).unwrap().current_value, 900.0);

        // "2.300" is two thousand three hundred, not 2.3
        record_checkpoint_value(
            &conn,
            &checkpoints[1].id,
            "2.300",
            date(2025, 6, 20),
            "ana",
        )
        .unwrap();
        let stored = get_key_result(&conn, &kr.id).unwrap();
        assert_eq!(stored.current_value, 2300.0);
        assert_eq!(stored.progress(), 92.0);

        // Correcting an earlier period doesn't move current value backwards
        record_checkpoint_value(
            &conn,
            &checkpoints[0].id,
            "850",
            date(2025, 6, 21),
            "ana",
        )
        .unwrap();
        assert_eq!(get_key_result(&conn, &kr.id).unwrap().current_value, 2300.0);

        let events = get_events_for_entity(&conn, "checkpoint", &checkpoints[0].id).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_record_checkpoint_rejects_garbage() {
        let conn = test_db();
        let objective = seed_objective(&conn);
        let kr = seed_key_result(&conn, &objective);
        let checkpoints = get_checkpoints(&conn, &kr.id).unwrap();

        let err = record_checkpoint_value(
            &conn,
            &checkpoints[0].id,
            "abc",
            date(2025, 3, 1),
            "ana",
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<OkrError>(), Some(OkrError::Validation { .. })));
        assert_eq!(get_checkpoint(&conn, &checkpoints[0].id).unwrap().actual_value, None);

        let err = record_checkpoint_value(
            &conn,
            "nope",
            "10",
            date(2025, 3, 1),
            "ana",
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<OkrError>(), Some(OkrError::NotFound { .. })));
    }

    #[test]
    fn test_reschedule_replaces_batch() {
        let conn = test_db();
        let objective = seed_objective(&conn);
        let kr = seed_key_result(&conn, &objective);

        let (updated, checkpoints) = reschedule_key_result(
            &conn,
            &kr.id,
            Frequency::Monthly,
            date(2025, 1, 1),
            date(2025, 6, 30),
            "gestor",
        )
        .unwrap();

        assert_eq!(updated.frequency, Frequency::Monthly);
        assert_eq!(checkpoints.len(), 6);

        let stored = get_checkpoints(&conn, &kr.id).unwrap();
        assert_eq!(stored.len(), 6);
        assert_eq!(stored.last().unwrap().target_value, 2500.0);
        assert_eq!(stored[0].period_label, "jan/2025");
    }

    #[test]
    fn test_reschedule_invalid_range_keeps_old_batch() {
        let conn = test_db();
        let objective = seed_objective(&conn);
        let kr = seed_key_result(&conn, &objective);

        let err = reschedule_key_result(
            &conn,
            &kr.id,
            Frequency::Weekly,
            date(2025, 6, 30),
            date(2025, 1, 1),
            "gestor",
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<OkrError>(), Some(OkrError::Schedule(_))));

        assert_eq!(get_checkpoints(&conn, &kr.id).unwrap().len(), 3);
        assert_eq!(get_key_result(&conn, &kr.id).unwrap().frequency, Frequency::Quarterly);
    }

    #[test]
    fn test_hierarchy_filters() {
        let conn = test_db();
        let sul = seed_objective(&conn);
        seed_key_result(&conn, &sul);

        let norte_unit = OrgUnit::new("Norte").with_service("TI");
        let norte = Objective::new("Reduzir custos", norte_unit).unwrap();
        insert_objective(&conn, &norte).unwrap();
        seed_key_result(&conn, &norte);

        let all = HierarchyFilter::default();
        assert_eq!(get_objectives(&conn, &all).unwrap().len(), 2);

        let blank = HierarchyFilter {
            region: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(get_objectives(&conn, &blank).unwrap().len(), 2);
        assert_eq!(get_key_results(&conn, &all).unwrap().len(), 2);

        let only_sul = HierarchyFilter {
            region: Some("sul".to_string()),
            ..Default::default()
        };
        let objectives = get_objectives(&conn, &only_sul).unwrap();
        assert_eq!(objectives.len(), 1);
        assert_eq!(objectives[0].id, sul.id);

        let krs = get_key_results(&conn, &only_sul).unwrap();
        assert_eq!(krs.len(), 1);
        assert_eq!(krs[0].objective_id, sul.id);

        assert_eq!(get_key_results_for_objective(&conn, &norte.id).unwrap().len(), 1);
    }

    #[test]
    fn test_actions() {
        let conn = test_db();
        let objective = seed_objective(&conn);
        let kr = seed_key_result(&conn, &objective);

        let action = Action::new(&kr.id, "Treinar equipe comercial")
            .unwrap()
            .with_due_date(date(2025, 2, 1));
        insert_action(&conn, &action, "gestor").unwrap();

        let actions = get_actions(&conn, &kr.id).unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].due_date, Some(date(2025, 2, 1)));

        let done = update_action_status(&conn, &action.id, ActionStatus::Done, "ana").unwrap();
        assert_eq!(done.status, ActionStatus::Done);

        let err = update_action_status(&conn, "missing", ActionStatus::Done, "ana").unwrap_err();
        assert!(matches!(err.downcast_ref::<OkrError>(), Some(OkrError::NotFound { .. })));

        let orphan = Action::new("missing", "Nada").unwrap();
        assert!(insert_action(&conn, &orphan, "gestor").is_err());
    }

    #[test]
    fn test_decimal_column_tolerates_driver_values() {
        let conn = test_db();
        let objective = seed_objective(&conn);
        let kr = seed_key_result(&conn, &objective);

        // Older rows written as REAL or as Brazilian text still read correctly
        conn.execute("UPDATE key_results SET current_value = 1250.5 WHERE id = ?1", [&kr.id])
            .unwrap();
        assert_eq!(get_key_result(&conn, &kr.id).unwrap().current_value, 1250.5);

        conn.execute("UPDATE key_results SET current_value = '1.250,50' WHERE id = ?1", [&kr.id])
            .unwrap();
        assert_eq!(get_key_result(&conn, &kr.id).unwrap().current_value, 1250.5);
    }

    #[test]
    fn test_import_is_idempotent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "Objetivo,Regiao,Subregiao,Linha_Servico,Servico,Resultado_Chave,Unidade,Meta,Frequencia,Inicio,Fim"
        )
        .unwrap();
        writeln!(
            file,
            "Crescer receita,Sul,RS,Consultoria,,Novos contratos,R$,\"2.500,00\",trimestral,01/01/2025,30/09/2025"
        )
        .unwrap();
        writeln!(
            file,
            "Crescer receita,Sul,RS,Consultoria,,Clientes ativos,clientes,120,mensal,01/01/2025,30/06/2025"
        )
        .unwrap();
        file.flush().unwrap();

        let conn = test_db();
        let rows = load_import_csv(file.path()).unwrap();
        assert_eq!(rows.len(), 2);

        let first = import_key_results(&conn, &rows, "importer").unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.objectives_created, 1);
        assert_eq!(first.duplicates, 0);

        let second = import_key_results(&conn, &rows, "importer").unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(count_key_results(&conn).unwrap(), 2);

        let objectives = get_objectives(&conn, &HierarchyFilter::default()).unwrap();
        assert_eq!(objectives.len(), 1);
        assert_eq!(objectives[0].org_unit.service, None);

        let krs = get_key_results_for_objective(&conn, &objectives[0].id).unwrap();
        let contracts = krs.iter().find(|k| k.title == "Novos contratos").unwrap();
        assert_eq!(contracts.total_target, 2500.0);
        assert_eq!(get_checkpoints(&conn, &contracts.id).unwrap().len(), 3);
    }

    #[test]
    fn test_import_rejects_bad_dates() {
        let conn = test_db();
        let objective = seed_objective(&conn);
        let row = KeyResultImportRow {
            objective: objective.title.clone(),
            region: "Sul".to_string(),
            sub_region: String::new(),
            service_line: String::new(),
            service: String::new(),
            key_result: "KR".to_string(),
            unit: String::new(),
            target: "10".to_string(),
            frequency: "mensal".to_string(),
            start_date: "32/01/2025".to_string(),
            end_date: "30/06/2025".to_string(),
        };

        assert!(import_key_results(&conn, &[row], "importer").is_err());
        assert_eq!(count_key_results(&conn).unwrap(), 0);
    }

    fn import_row(objective: &str, target: &str) -> KeyResultImportRow {
        KeyResultImportRow {
            objective: objective.to_string(),
            region: "Sul".to_string(),
            sub_region: String::new(),
            service_line: String::new(),
            service: String::new(),
            key_result: format!("KR de {}", objective),
            unit: String::new(),
            target: target.to_string(),
            frequency: "mensal".to_string(),
            start_date: "01/01/2025".to_string(),
            end_date: "30/06/2025".to_string(),
        }
    }

    fn count_rows(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_import_bad_row_rolls_back_whole_file() {
        let conn = test_db();
        let rows = vec![import_row("Obj A", "10"), import_row("Obj B", "0")];

        let err = import_key_results(&conn, &rows, "importer").unwrap_err();
        assert!(format!("{:#}", err).contains("line 3"));

        assert!(get_objectives(&conn, &HierarchyFilter::default()).unwrap().is_empty());
        assert_eq!(count_key_results(&conn).unwrap(), 0);
        assert_eq!(count_rows(&conn, "checkpoints"), 0);
        assert_eq!(count_rows(&conn, "events"), 0);

        // The good row alone imports fine afterwards
        let report = import_key_results(&conn, &rows[..1], "importer").unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.objectives_created, 1);
    }

    #[test]
    fn test_import_duplicate_rows_in_same_file() {
        let conn = test_db();
        let rows = vec![import_row("Obj A", "10"), import_row("Obj A", "10,00")];

        let report = import_key_results(&conn, &rows, "importer").unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.objectives_created, 1);
    }

    #[test]
    fn test_failed_checkpoint_write_leaves_nothing_behind() {
        let conn = test_db();
        let objective = seed_objective(&conn);

        // Third insert of the batch fails after two rows went in
        conn.execute_batch(
            "CREATE TEMP TRIGGER fail_third_checkpoint BEFORE INSERT ON checkpoints
             WHEN NEW.period_index = 3
             BEGIN SELECT RAISE(ABORT, 'checkpoint write failed'); END;",
        )
        .unwrap();

        let kr = KeyResult::new(
            &objective.id,
            "Novos contratos",
            "R$",
            2500.0,
            Frequency::Quarterly,
            date(2025, 1, 1),
            date(2025, 9, 30),
        )
        .unwrap();

        assert!(create_key_result(&conn, &kr, "tester").is_err());
        assert_eq!(count_key_results(&conn).unwrap(), 0);
        assert_eq!(count_rows(&conn, "checkpoints"), 0);
        assert!(get_events_for_entity(&conn, "key_result", &kr.id).unwrap().is_empty());
    }

    #[test]
    fn test_failed_reschedule_keeps_old_batch() {
        let conn = test_db();
        let objective = seed_objective(&conn);
        let kr = seed_key_result(&conn, &objective);
        let before = get_checkpoints(&conn, &kr.id).unwrap();

        conn.execute_batch(
            "CREATE TEMP TRIGGER fail_fifth_checkpoint BEFORE INSERT ON checkpoints
             WHEN NEW.period_index = 5
             BEGIN SELECT RAISE(ABORT, 'checkpoint write failed'); END;",
        )
        .unwrap();

        let result = reschedule_key_result(
            &conn,
            &kr.id,
            Frequency::Monthly,
            date(2025, 1, 1),
            date(2025, 6, 30),
            "gestor",
        );
        assert!(result.is_err());

        assert_eq!(get_checkpoints(&conn, &kr.id).unwrap(), before);
        let stored = get_key_result(&conn, &kr.id).unwrap();
        assert_eq!(stored.frequency, Frequency::Quarterly);
        assert_eq!(stored.end_date, date(2025, 9, 30));
    }

    #[test]
    fn test_import_hash() {
        let a = compute_import_hash("Obj", "KR", 10.0, date(2025, 1, 1), date(2025, 2, 1));
        let b = compute_import_hash(" obj ", "kr", 10.0, date(2025, 1, 1), date(2025, 2, 1));
        let c = compute_import_hash("Obj", "KR", 11.0, date(2025, 1, 1), date(2025, 2, 1));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "test_event",
            "key_result",
            "test_id_123",
            serde_json::json!({"test": "data"}),
            "test_actor",
        );
        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "key_result", "test_id_123").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "test_event");
        assert_eq!(events[0].data["test"], "data");
    }
}
