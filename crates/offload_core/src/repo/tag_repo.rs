//! Tag repository.
//!
//! # Invariants
//! - `find_or_create_tag` never creates a second tag for a normalized name;
//!   when duplicates already exist the oldest one wins.
//! - Link inserts are idempotent.

use crate::model::capture::EntryId;
use crate::model::tag::{normalize_tag_name, Tag, TagId};
use crate::repo::{ensure_tables, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

pub trait TagRepository {
    /// All tags, oldest first.
    fn list_tags(&self) -> RepoResult<Vec<Tag>>;
    /// Returns the tag whose normalized name matches `name`, creating it when
    /// absent.
    fn find_or_create_tag(&self, name: &str) -> RepoResult<Tag>;
    fn attach_tag_to_entry(&self, entry_id: EntryId, tag_id: TagId) -> RepoResult<()>;
    fn detach_tag_from_entry(&self, entry_id: EntryId, tag_id: TagId) -> RepoResult<()>;
    fn tags_for_entry(&self, entry_id: EntryId) -> RepoResult<Vec<Tag>>;
    fn attach_tag_to_collection(&self, collection_id: &str, tag_id: TagId) -> RepoResult<()>;
    fn tags_for_collection(&self, collection_id: &str) -> RepoResult<Vec<Tag>>;
}

pub struct SqliteTagRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTagRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_tables(conn, &["tags", "entry_tags", "collection_tags"])?;
        Ok(Self { conn })
    }

    fn query_tags(&self, sql: &str, key: &str) -> RepoResult<Vec<Tag>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([key])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(parse_tag_row(row)?);
        }
        Ok(tags)
    }
}

impl TagRepository for SqliteTagRepository<'_> {
    fn list_tags(&self) -> RepoResult<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM tags ORDER BY created_at ASC, rowid ASC;")?;
        let mut rows = stmt.query([])?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            tags.push(parse_tag_row(row)?);
        }
        Ok(tags)
    }

    fn find_or_create_tag(&self, name: &str) -> RepoResult<Tag> {
        let key = normalize_tag_name(name)
            .ok_or_else(|| RepoError::Validation("tag name must not be blank".to_string()))?;

        let tx = self.conn.unchecked_transaction()?;
        let existing = {
            let mut stmt =
                tx.prepare("SELECT id, name, created_at FROM tags ORDER BY created_at ASC, rowid ASC;")?;
            let mut rows = stmt.query([])?;
            let mut found = None;
            while let Some(row) = rows.next()? {
                let tag = parse_tag_row(row)?;
                if tag.key().as_deref() == Some(key.as_str()) {
                    found = Some(tag);
                    break;
                }
            }
            found
        };
        if let Some(tag) = existing {
            return Ok(tag);
        }

        let tag = Tag::new(name);
        tx.execute(
            "INSERT INTO tags (id, name, created_at) VALUES (?1, ?2, ?3);",
            params![tag.id.to_string(), tag.name.as_str(), tag.created_at],
        )?;
        tx.commit()?;
        Ok(tag)
    }

    fn attach_tag_to_entry(&self, entry_id: EntryId, tag_id: TagId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO entry_tags (entry_id, tag_id) VALUES (?1, ?2);",
            params![entry_id.to_string(), tag_id.to_string()],
        )?;
        Ok(())
    }

    fn detach_tag_from_entry(&self, entry_id: EntryId, tag_id: TagId) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM entry_tags WHERE entry_id = ?1 AND tag_id = ?2;",
            params![entry_id.to_string(), tag_id.to_string()],
        )?;
        Ok(())
    }

    fn tags_for_entry(&self, entry_id: EntryId) -> RepoResult<Vec<Tag>> {
        self.query_tags(
            "SELECT t.id, t.name, t.created_at
             FROM entry_tags et
             INNER JOIN tags t ON t.id = et.tag_id
             WHERE et.entry_id = ?1
             ORDER BY t.created_at ASC, t.rowid ASC;",
            &entry_id.to_string(),
        )
    }

    fn attach_tag_to_collection(&self, collection_id: &str, tag_id: TagId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO collection_tags (collection_id, tag_id) VALUES (?1, ?2);",
            params![collection_id, tag_id.to_string()],
        )?;
        Ok(())
    }

    fn tags_for_collection(&self, collection_id: &str) -> RepoResult<Vec<Tag>> {
        self.query_tags(
            "SELECT t.id, t.name, t.created_at
             FROM collection_tags ct
             INNER JOIN tags t ON t.id = ct.tag_id
             WHERE ct.collection_id = ?1
             ORDER BY t.created_at ASC, t.rowid ASC;",
            collection_id,
        )
    }
}

fn parse_tag_row(row: &Row<'_>) -> RepoResult<Tag> {
    let id: String = row.get("id")?;
    Ok(Tag {
        id: parse_uuid(&id, "tags.id")?,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
    })
}
