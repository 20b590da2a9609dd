//! Capture entry repository and its owned hand-off subtree.
//!
//! # Responsibility
//! - Persist entries together with requests, runs, suggestions, decisions.
//! - Load an entry as one owned tree with always-present collections.
//!
//! # Invariants
//! - Deleting an entry cascades to its subtree (foreign keys), never to
//!   `placements`.
//! - Every subtree write that implies a state change updates the entry row
//!   in the same transaction.

use crate::model::capture::{CaptureEntry, EntryId, LifecycleState};
use crate::model::handoff::{HandOffRequest, HandOffRun, Suggestion, SuggestionDecision};
use crate::model::placement::Placement;
use crate::model::{decode_or_fallback, WireEnum};
use crate::repo::{ensure_tables, parse_opt_uuid, parse_uuid, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

const ENTRY_SELECT_SQL: &str = "SELECT
    id,
    created_at,
    raw_text,
    input_type,
    source,
    lifecycle_state,
    accepted_suggestion_id,
    legacy_tags
FROM capture_entries";

/// Query options for listing entries, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryListQuery {
    pub state: Option<LifecycleState>,
    /// Case-insensitive substring match on `raw_text`.
    pub text: Option<String>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Entry columns written alongside a subtree change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStateUpdate {
    pub state: LifecycleState,
    pub accepted_suggestion_id: Option<Uuid>,
}

impl EntryStateUpdate {
    pub fn of(entry: &CaptureEntry) -> Self {
        Self {
            state: entry.lifecycle_state,
            accepted_suggestion_id: entry.accepted_suggestion_id,
        }
    }
}

pub trait CaptureRepository {
    fn create_entry(&self, entry: &CaptureEntry) -> RepoResult<EntryId>;
    /// Loads the entry with its full hand-off subtree.
    fn get_entry(&self, id: EntryId) -> RepoResult<Option<CaptureEntry>>;
    fn list_entries(&self, query: &EntryListQuery) -> RepoResult<Vec<CaptureEntry>>;
    fn update_entry_state(&self, id: EntryId, update: EntryStateUpdate) -> RepoResult<()>;
    /// Inserts a request with its runs and applies `update`.
    fn insert_request(
        &self,
        entry_id: EntryId,
        request: &HandOffRequest,
        update: EntryStateUpdate,
    ) -> RepoResult<()>;
    fn insert_run(&self, request_id: Uuid, run: &HandOffRun) -> RepoResult<()>;
    /// Persists status, `completed_at`, and error message of a run.
    fn update_run(&self, run: &HandOffRun) -> RepoResult<()>;
    fn insert_suggestion(&self, run_id: Uuid, suggestion: &Suggestion) -> RepoResult<()>;
    fn insert_decision(
        &self,
        entry_id: EntryId,
        suggestion_id: Uuid,
        decision: &SuggestionDecision,
        update: EntryStateUpdate,
    ) -> RepoResult<()>;
    fn insert_placement(
        &self,
        entry_id: EntryId,
        placement: &Placement,
        update: EntryStateUpdate,
    ) -> RepoResult<()>;
    fn delete_entry(&self, id: EntryId) -> RepoResult<()>;
}

/// SQLite-backed capture repository.
pub struct SqliteCaptureRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCaptureRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(
            conn,
            &[
                "capture_entries",
                "handoff_requests",
                "handoff_runs",
                "suggestions",
                "suggestion_decisions",
                "placements",
            ],
        )?;
        Ok(Self { conn })
    }
}

impl CaptureRepository for SqliteCaptureRepository<'_> {
    fn create_entry(&self, entry: &CaptureEntry) -> RepoResult<EntryId> {
        let legacy_tags = serde_json::to_string(&entry.legacy_tags)
            .map_err(|err| RepoError::InvalidData(format!("legacy_tags encoding: {err}")))?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO capture_entries (
                id,
                created_at,
                raw_text,
                input_type,
                source,
                lifecycle_state,
                accepted_suggestion_id,
                legacy_tags
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                entry.id.to_string(),
                entry.created_at,
                entry.raw_text.as_str(),
                entry.input_type.as_wire(),
                entry.source.as_wire(),
                entry.lifecycle_state.as_wire(),
                entry.accepted_suggestion_id.map(|id| id.to_string()),
                legacy_tags,
            ],
        )?;
        for request in &entry.requests {
            insert_request_tree(&tx, entry.id, request)?;
        }
        tx.commit()?;
        Ok(entry.id)
    }

    fn get_entry(&self, id: EntryId) -> RepoResult<Option<CaptureEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ENTRY_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_entry_row(self.conn, row)?));
        }
        Ok(None)
    }

    fn list_entries(&self, query: &EntryListQuery) -> RepoResult<Vec<CaptureEntry>> {
        let mut sql = format!("{ENTRY_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(state) = query.state {
            sql.push_str(" AND lifecycle_state = ?");
            bind_values.push(Value::Text(state.as_wire().to_string()));
        }
        if let Some(text) = query.text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            sql.push_str(" AND instr(lower(raw_text), lower(?)) > 0");
            bind_values.push(Value::Text(text.to_string()));
        }

        sql.push_str(" ORDER BY created_at DESC, id ASC");
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_entry_row(self.conn, row)?);
        }
        Ok(entries)
    }

    fn update_entry_state(&self, id: EntryId, update: EntryStateUpdate) -> RepoResult<()> {
        apply_entry_update(self.conn, id, update)
    }

    fn insert_request(
        &self,
        entry_id: EntryId,
        request: &HandOffRequest,
        update: EntryStateUpdate,
    ) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        apply_entry_update(&tx, entry_id, update)?;
        insert_request_tree(&tx, entry_id, request)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_run(&self, request_id: Uuid, run: &HandOffRun) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_run_tree(&tx, request_id, run)?;
        tx.commit()?;
        Ok(())
    }

    fn update_run(&self, run: &HandOffRun) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE handoff_runs
             SET status = ?2, completed_at = ?3, error_message = ?4
             WHERE id = ?1;",
            params![
                run.id.to_string(),
                run.status.as_wire(),
                run.completed_at,
                run.error_message.as_deref(),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "hand-off run",
                id: run.id,
            });
        }
        Ok(())
    }

    fn insert_suggestion(&self, run_id: Uuid, suggestion: &Suggestion) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_suggestion_tree(&tx, run_id, suggestion)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_decision(
        &self,
        entry_id: EntryId,
        suggestion_id: Uuid,
        decision: &SuggestionDecision,
        update: EntryStateUpdate,
    ) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        insert_decision_row(&tx, suggestion_id, decision)?;
        apply_entry_update(&tx, entry_id, update)?;
        tx.commit()?;
        Ok(())
    }

    fn insert_placement(
        &self,
        entry_id: EntryId,
        placement: &Placement,
        update: EntryStateUpdate,
    ) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        crate::repo::placement_repo::insert_placement_row(&tx, placement)?;
        apply_entry_update(&tx, entry_id, update)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_entry(&self, id: EntryId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM capture_entries WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "capture entry",
                id,
            });
        }
        Ok(())
    }
}

fn apply_entry_update(conn: &Connection, id: EntryId, update: EntryStateUpdate) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE capture_entries
         SET lifecycle_state = ?2, accepted_suggestion_id = ?3
         WHERE id = ?1;",
        params![
            id.to_string(),
            update.state.as_wire(),
            update.accepted_suggestion_id.map(|value| value.to_string()),
        ],
    )?;
    if changed == 0 {
        return Err(RepoError::NotFound {
            entity: "capture entry",
            id,
        });
    }
    Ok(())
}

fn insert_request_tree(conn: &Connection, entry_id: EntryId, request: &HandOffRequest) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO handoff_requests (id, entry_id, requested_at, requested_by, mode)
         VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            request.id.to_string(),
            entry_id.to_string(),
            request.requested_at,
            request.requested_by.as_wire(),
            request.mode.as_wire(),
        ],
    )?;
    for run in &request.runs {
        insert_run_tree(conn, request.id, run)?;
    }
    Ok(())
}

fn insert_run_tree(conn: &Connection, request_id: Uuid, run: &HandOffRun) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO handoff_runs (
            id,
            request_id,
            started_at,
            completed_at,
            model_id,
            prompt_version,
            input_snapshot,
            status,
            error_message
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        params![
            run.id.to_string(),
            request_id.to_string(),
            run.started_at,
            run.completed_at,
            run.model_id.as_str(),
            run.prompt_version.as_str(),
            run.input_snapshot.as_str(),
            run.status.as_wire(),
            run.error_message.as_deref(),
        ],
    )?;
    for suggestion in &run.suggestions {
        insert_suggestion_tree(conn, run.id, suggestion)?;
    }
    Ok(())
}

fn insert_suggestion_tree(conn: &Connection, run_id: Uuid, suggestion: &Suggestion) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO suggestions (id, run_id, kind, payload_json, confidence)
         VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            suggestion.id.to_string(),
            run_id.to_string(),
            suggestion.kind.as_wire(),
            suggestion.payload_json.as_str(),
            suggestion.confidence,
        ],
    )?;
    for decision in &suggestion.decisions {
        insert_decision_row(conn, suggestion.id, decision)?;
    }
    Ok(())
}

fn insert_decision_row(
    conn: &Connection,
    suggestion_id: Uuid,
    decision: &SuggestionDecision,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO suggestion_decisions (
            id,
            suggestion_id,
            decision,
            decided_at,
            decided_by,
            undo_of_decision_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            decision.id.to_string(),
            suggestion_id.to_string(),
            decision.decision.as_wire(),
            decision.decided_at,
            decision.decided_by.as_wire(),
            decision.undo_of_decision_id.map(|id| id.to_string()),
        ],
    )?;
    Ok(())
}

fn parse_entry_row(conn: &Connection, row: &Row<'_>) -> RepoResult<CaptureEntry> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "capture_entries.id")?;
    let legacy_text: String = row.get("legacy_tags")?;
    let legacy_tags = serde_json::from_str::<Vec<String>>(&legacy_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid legacy tag list in capture_entries.legacy_tags for {id_text}"
        ))
    })?;

    Ok(CaptureEntry {
        id,
        created_at: row.get("created_at")?,
        raw_text: row.get("raw_text")?,
        input_type: decode_or_fallback(&row.get::<_, String>("input_type")?),
        source: decode_or_fallback(&row.get::<_, String>("source")?),
        lifecycle_state: decode_or_fallback(&row.get::<_, String>("lifecycle_state")?),
        accepted_suggestion_id: parse_opt_uuid(
            row.get("accepted_suggestion_id")?,
            "capture_entries.accepted_suggestion_id",
        )?,
        legacy_tags,
        requests: load_requests(conn, &id_text)?,
    })
}

fn load_requests(conn: &Connection, entry_id: &str) -> RepoResult<Vec<HandOffRequest>> {
    let mut stmt = conn.prepare(
        "SELECT id, requested_at, requested_by, mode
         FROM handoff_requests
         WHERE entry_id = ?1
         ORDER BY requested_at ASC, rowid ASC;",
    )?;
    let mut rows = stmt.query([entry_id])?;
    let mut requests = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get("id")?;
        requests.push(HandOffRequest {
            id: parse_uuid(&id_text, "handoff_requests.id")?,
            requested_at: row.get("requested_at")?,
            requested_by: decode_or_fallback(&row.get::<_, String>("requested_by")?),
            mode: decode_or_fallback(&row.get::<_, String>("mode")?),
            runs: load_runs(conn, &id_text)?,
        });
    }
    Ok(requests)
}

fn load_runs(conn: &Connection, request_id: &str) -> RepoResult<Vec<HandOffRun>> {
    let mut stmt = conn.prepare(
        "SELECT
            id,
            started_at,
            completed_at,
            model_id,
            prompt_version,
            input_snapshot,
            status,
            error_message
         FROM handoff_runs
         WHERE request_id = ?1
         ORDER BY started_at ASC, rowid ASC;",
    )?;
    let mut rows = stmt.query([request_id])?;
    let mut runs = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get("id")?;
        runs.push(HandOffRun {
            id: parse_uuid(&id_text, "handoff_runs.id")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            model_id: row.get("model_id")?,
            prompt_version: row.get("prompt_version")?,
            input_snapshot: row.get("input_snapshot")?,
            status: decode_or_fallback(&row.get::<_, String>("status")?),
            error_message: row.get("error_message")?,
            suggestions: load_suggestions(conn, &id_text)?,
        });
    }
    Ok(runs)
}

fn load_suggestions(conn: &Connection, run_id: &str) -> RepoResult<Vec<Suggestion>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, payload_json, confidence
         FROM suggestions
         WHERE run_id = ?1
         ORDER BY rowid ASC;",
    )?;
    let mut rows = stmt.query([run_id])?;
    let mut suggestions = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get("id")?;
        suggestions.push(Suggestion {
            id: parse_uuid(&id_text, "suggestions.id")?,
            kind: decode_or_fallback(&row.get::<_, String>("kind")?),
            payload_json: row.get("payload_json")?,
            confidence: row.get("confidence")?,
            decisions: load_decisions(conn, &id_text)?,
        });
    }
    Ok(suggestions)
}

fn load_decisions(conn: &Connection, suggestion_id: &str) -> RepoResult<Vec<SuggestionDecision>> {
    let mut stmt = conn.prepare(
        "SELECT id, decision, decided_at, decided_by, undo_of_decision_id
         FROM suggestion_decisions
         WHERE suggestion_id = ?1
         ORDER BY decided_at ASC, rowid ASC;",
    )?;
    let mut rows = stmt.query([suggestion_id])?;
    let mut decisions = Vec::new();
    while let Some(row) = rows.next()? {
        let id_text: String = row.get("id")?;
        decisions.push(SuggestionDecision {
            id: parse_uuid(&id_text, "suggestion_decisions.id")?,
            decision: decode_or_fallback(&row.get::<_, String>("decision")?),
            decided_at: row.get("decided_at")?,
            decided_by: decode_or_fallback(&row.get::<_, String>("decided_by")?),
            undo_of_decision_id: parse_opt_uuid(
                row.get("undo_of_decision_id")?,
                "suggestion_decisions.undo_of_decision_id",
            )?,
        });
    }
    Ok(decisions)
}
