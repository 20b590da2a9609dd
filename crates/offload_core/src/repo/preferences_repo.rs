//! Device-local preferences: the consent flag and usage counters.
//!
//! # Invariants
//! - The store owns its connection behind a mutex, so it can be shared as
//!   `Arc<dyn ConsentStore>` / `Arc<dyn UsageCounterStore>`.
//! - Counter updates are single-statement UPSERTs; concurrent increments
//!   are never lost.
//! - A consent read failure is logged and reported as disabled.

use crate::consent::{ConsentStore, CLOUD_AI_CONSENT_KEY};
use crate::repo::{ensure_tables, RepoError, RepoResult};
use crate::usage::{UsageCounter, UsageCounterStore};
use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};

pub struct SqlitePreferenceStore {
    conn: Mutex<Connection>,
}

impl SqlitePreferenceStore {
    /// Takes ownership of a migrated connection.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        ensure_tables(&conn, &["app_settings", "usage_counters"])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_setting(&self, key: &str) -> RepoResult<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM app_settings WHERE key = ?1;",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write_setting(&self, key: &str, value: &str) -> RepoResult<()> {
        self.conn().execute(
            "INSERT INTO app_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![key, value],
        )?;
        Ok(())
    }
}

impl ConsentStore for SqlitePreferenceStore {
    fn is_cloud_ai_enabled(&self) -> bool {
        match self.read_setting(CLOUD_AI_CONSENT_KEY) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(err) => {
                warn!(
                    "event=consent_read module=repo status=error fallback=disabled error={}",
                    err
                );
                false
            }
        }
    }

    fn set_cloud_ai_enabled(&self, enabled: bool) -> RepoResult<()> {
        self.write_setting(CLOUD_AI_CONSENT_KEY, if enabled { "true" } else { "false" })?;
        info!("event=consent_change module=repo status=ok enabled={enabled}");
        Ok(())
    }
}

impl UsageCounterStore for SqlitePreferenceStore {
    fn increment_local(&self, feature: &str) -> RepoResult<UsageCounter> {
        let (local, server) = self.conn().query_row(
            "INSERT INTO usage_counters (feature, local_count, server_count)
             VALUES (?1, 1, 0)
             ON CONFLICT(feature) DO UPDATE SET local_count = local_count + 1
             RETURNING local_count, server_count;",
            [feature],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        to_counter(local, server)
    }

    fn counter(&self, feature: &str) -> RepoResult<UsageCounter> {
        let row = self
            .conn()
            .query_row(
                "SELECT local_count, server_count FROM usage_counters WHERE feature = ?1;",
                [feature],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;
        match row {
            Some((local, server)) => to_counter(local, server),
            None => Ok(UsageCounter::default()),
        }
    }

    fn merge_server_count(&self, feature: &str, server_count: u64) -> RepoResult<UsageCounter> {
        let server_count = i64::try_from(server_count).map_err(|_| {
            RepoError::Validation(format!("server count {server_count} exceeds storage range"))
        })?;
        let (local, server) = self.conn().query_row(
            "INSERT INTO usage_counters (feature, local_count, server_count)
             VALUES (?1, 0, ?2)
             ON CONFLICT(feature) DO UPDATE SET server_count = MAX(server_count, excluded.server_count)
             RETURNING local_count, server_count;",
            params![feature, server_count],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;
        to_counter(local, server)
    }
}

fn to_counter(local: i64, server: i64) -> RepoResult<UsageCounter> {
    let convert = |value: i64, column: &str| {
        u64::try_from(value).map_err(|_| {
            RepoError::InvalidData(format!("negative value {value} in usage_counters.{column}"))
        })
    };
    Ok(UsageCounter {
        local: convert(local, "local_count")?,
        server: convert(server, "server_count")?,
    })
}
