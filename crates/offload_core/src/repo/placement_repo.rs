//! Placement audit repository.
//!
//! Placements are written together with the entry state change by
//! [`crate::repo::capture_repo::CaptureRepository::insert_placement`]; this
//! module owns the read side and the shared insert helper.

use crate::model::placement::{Placement, PlacementTargetType};
use crate::model::{decode_or_fallback, WireEnum};
use crate::repo::{ensure_tables, parse_uuid, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const PLACEMENT_SELECT_SQL: &str = "SELECT
    id,
    placed_at,
    target_type,
    target_id,
    source_suggestion_id,
    notes
FROM placements";

pub trait PlacementRepository {
    fn get_placement(&self, id: Uuid) -> RepoResult<Option<Placement>>;
    fn placements_for_suggestion(&self, suggestion_id: Uuid) -> RepoResult<Vec<Placement>>;
    fn placements_for_target(
        &self,
        target_type: PlacementTargetType,
        target_id: Uuid,
    ) -> RepoResult<Vec<Placement>>;
}

pub struct SqlitePlacementRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePlacementRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["placements"])?;
        Ok(Self { conn })
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> RepoResult<Vec<Placement>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut placements = Vec::new();
        while let Some(row) = rows.next()? {
            placements.push(parse_placement_row(row)?);
        }
        Ok(placements)
    }
}

impl PlacementRepository for SqlitePlacementRepository<'_> {
    fn get_placement(&self, id: Uuid) -> RepoResult<Option<Placement>> {
        let sql = format!("{PLACEMENT_SELECT_SQL} WHERE id = ?1;");
        Ok(self.query(&sql, [id.to_string()])?.into_iter().next())
    }

    fn placements_for_suggestion(&self, suggestion_id: Uuid) -> RepoResult<Vec<Placement>> {
        let sql = format!(
            "{PLACEMENT_SELECT_SQL} WHERE source_suggestion_id = ?1 ORDER BY placed_at ASC, rowid ASC;"
        );
        self.query(&sql, [suggestion_id.to_string()])
    }

    fn placements_for_target(
        &self,
        target_type: PlacementTargetType,
        target_id: Uuid,
    ) -> RepoResult<Vec<Placement>> {
        let sql = format!(
            "{PLACEMENT_SELECT_SQL}
             WHERE target_type = ?1 AND target_id = ?2
             ORDER BY placed_at ASC, rowid ASC;"
        );
        self.query(&sql, params![target_type.as_wire(), target_id.to_string()])
    }
}

pub(crate) fn insert_placement_row(conn: &Connection, placement: &Placement) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO placements (
            id,
            placed_at,
            target_type,
            target_id,
            source_suggestion_id,
            notes
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            placement.id.to_string(),
            placement.placed_at,
            placement.target_type.as_wire(),
            placement.target_id.to_string(),
            placement.source_suggestion_id.to_string(),
            placement.notes.as_deref(),
        ],
    )?;
    Ok(())
}

fn parse_placement_row(row: &Row<'_>) -> RepoResult<Placement> {
    let id: String = row.get("id")?;
    let target_id: String = row.get("target_id")?;
    let source_suggestion_id: String = row.get("source_suggestion_id")?;
    Ok(Placement {
        id: parse_uuid(&id, "placements.id")?,
        placed_at: row.get("placed_at")?,
        target_type: decode_or_fallback(&row.get::<_, String>("target_type")?),
        target_id: parse_uuid(&target_id, "placements.target_id")?,
        source_suggestion_id: parse_uuid(&source_suggestion_id, "placements.source_suggestion_id")?,
        notes: row.get("notes")?,
    })
}
