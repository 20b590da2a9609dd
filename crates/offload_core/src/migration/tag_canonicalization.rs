//! Tag canonicalization pass.
//!
//! # Responsibility
//! - Collapse tags whose normalized names collide onto the oldest one.
//! - Move legacy free-text entry tags onto canonical tag records.
//!
//! # Invariants
//! - Associations are unioned, never dropped: every entry/collection that
//!   pointed at a duplicate points at the canonical tag afterwards.
//! - Blank-named tags form one group under the empty key.
//! - Blank legacy names are dropped, never turned into new tags.
//! - Nothing is written unless something changed.

use crate::logging::log_field;
use crate::migration::CanonicalizationError;
use crate::model::tag::{normalize_tag_name, Tag};
use log::{info, warn};
use rusqlite::{params, Connection, Transaction};
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalizationReport {
    /// Duplicate tags folded into a canonical tag.
    pub merged_tags: usize,
    /// Entry/collection links moved onto canonical tags.
    pub relinked_associations: usize,
    pub created_tags: usize,
    /// Entries whose legacy tag list was migrated and cleared.
    pub migrated_entries: usize,
    /// Entries left alone because their legacy list was unreadable.
    pub skipped_entries: usize,
}

impl CanonicalizationReport {
    pub fn changed(&self) -> bool {
        self.merged_tags > 0
            || self.relinked_associations > 0
            || self.created_tags > 0
            || self.migrated_entries > 0
    }
}

/// Runs the pass in one transaction; commits only when something changed.
pub fn canonicalize_tags(
    conn: &mut Connection,
) -> Result<CanonicalizationReport, CanonicalizationError> {
    let started_at = Instant::now();
    let tx = conn.transaction()?;
    let mut report = CanonicalizationReport::default();

    let mut canonical = merge_duplicate_tags(&tx, &mut report)?;
    migrate_legacy_tags(&tx, &mut canonical, &mut report)?;

    if report.changed() {
        tx.commit()?;
        info!(
            "event=tag_canonicalization module=migration status=ok merged={} relinked={} created={} migrated_entries={} skipped_entries={} duration_ms={}",
            report.merged_tags,
            report.relinked_associations,
            report.created_tags,
            report.migrated_entries,
            report.skipped_entries,
            started_at.elapsed().as_millis()
        );
    } else {
        tx.rollback()?;
        info!(
            "event=tag_canonicalization module=migration status=noop skipped_entries={} duration_ms={}",
            report.skipped_entries,
            started_at.elapsed().as_millis()
        );
    }
    Ok(report)
}

/// Returns the normalized-name -> canonical tag id index.
fn merge_duplicate_tags(
    tx: &Transaction<'_>,
    report: &mut CanonicalizationReport,
) -> Result<HashMap<String, String>, CanonicalizationError> {
    let tags = {
        let mut stmt =
            tx.prepare("SELECT id, name FROM tags ORDER BY created_at ASC, rowid ASC;")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let mut canonical: HashMap<String, String> = HashMap::new();
    for (tag_id, name) in tags {
        // Blank names share the empty key and fold like any other group.
        let key = normalize_tag_name(&name).unwrap_or_default();
        match canonical.get(&key).cloned() {
            None => {
                canonical.insert(key, tag_id);
            }
            Some(canonical_id) => {
                report.relinked_associations += tx.execute(
                    "INSERT OR IGNORE INTO entry_tags (entry_id, tag_id)
                     SELECT entry_id, ?1 FROM entry_tags WHERE tag_id = ?2;",
                    params![canonical_id, tag_id],
                )?;
                report.relinked_associations += tx.execute(
                    "INSERT OR IGNORE INTO collection_tags (collection_id, tag_id)
                     SELECT collection_id, ?1 FROM collection_tags WHERE tag_id = ?2;",
                    params![canonical_id, tag_id],
                )?;
                tx.execute("DELETE FROM tags WHERE id = ?1;", [tag_id.as_str()])?;
                report.merged_tags += 1;
            }
        }
    }
    Ok(canonical)
}

fn migrate_legacy_tags(
    tx: &Transaction<'_>,
    canonical: &mut HashMap<String, String>,
    report: &mut CanonicalizationReport,
) -> Result<(), CanonicalizationError> {
    let entries = {
        let mut stmt = tx.prepare(
            "SELECT id, legacy_tags FROM capture_entries WHERE legacy_tags <> '[]' ORDER BY rowid ASC;",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    for (entry_id, legacy_json) in entries {
        let names = match serde_json::from_str::<Vec<String>>(&legacy_json) {
            Ok(names) => names,
            Err(err) => {
                warn!(
                    "event=tag_canonicalization module=migration status=skipped entry_id={} error={}",
                    entry_id,
                    log_field(&err.to_string())
                );
                report.skipped_entries += 1;
                continue;
            }
        };

        for name in names {
            let Some(key) = normalize_tag_name(&name) else {
                continue;
            };
            let tag_id = match canonical.get(&key).cloned() {
                Some(id) => id,
                None => {
                    let tag = Tag::new(&name);
                    tx.execute(
                        "INSERT INTO tags (id, name, created_at) VALUES (?1, ?2, ?3);",
                        params![tag.id.to_string(), tag.name.as_str(), tag.created_at],
                    )?;
                    report.created_tags += 1;
                    let id = tag.id.to_string();
                    canonical.insert(key, id.clone());
                    id
                }
            };
            tx.execute(
                "INSERT OR IGNORE INTO entry_tags (entry_id, tag_id) VALUES (?1, ?2);",
                params![entry_id.as_str(), tag_id],
            )?;
        }

        tx.execute(
            "UPDATE capture_entries SET legacy_tags = '[]' WHERE id = ?1;",
            [entry_id.as_str()],
        )?;
        report.migrated_entries += 1;
    }
    Ok(())
}
