//! SPDX-License-Identifier: MIT OR AGPL-3.0-or-later
//! SQLite store for tracked unit records

use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use thiserror::Error;

use crate::unit::UnitKind;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Unit not found: {0}")]
    UnitNotFound(String),
    #[error("Invalid unit kind in store: {0}")]
    InvalidKind(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One record per written unit file, keyed by `(name, kind)`.
///
/// The content hash is the only datum change detection needs; the
/// timestamps exist for operators reading `skipan status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedUnit {
    pub id: i64,
    pub name: String,
    pub kind: UnitKind,
    pub content_hash: String,
    pub created_at: String,
    pub last_written_at: String,
}

pub struct UnitStore {
    conn: Connection,
}

impl UnitStore {
    /// Open or create the tracking database.
    pub fn open(db_path: &Path) -> Result<Self, StateError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Initialise schema
        conn.execute_batch(include_str!("../../schema.sql"))?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(include_str!("../../schema.sql"))?;
        Ok(Self { conn })
    }

    /// All tracked units, ordered by name then kind.
    pub fn find_all(&self) -> Result<Vec<TrackedUnit>, StateError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, kind, content_hash, created_at, last_written_at
             FROM units ORDER BY name, kind",
        )?;

        let units = stmt
            .query_map([], Self::row_to_unit)?
            .collect::<Result<Vec<_>, _>>()?;
        units.into_iter().collect()
    }

    /// Look up one unit by its `(name, kind)` identity.
    pub fn find(&self, name: &str, kind: UnitKind) -> Result<Option<TrackedUnit>, StateError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, kind, content_hash, created_at, last_written_at
             FROM units WHERE name = ?1 AND kind = ?2",
        )?;

        match stmt.query_row(params![name, kind.as_str()], Self::row_to_unit) {
            Ok(unit) => Ok(Some(unit?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::Database(e)),
        }
    }

    /// Insert a record or update the hash of an existing one.
    pub fn upsert(
        &self,
        name: &str,
        kind: UnitKind,
        content_hash: &str,
    ) -> Result<TrackedUnit, StateError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO units (name, kind, content_hash, created_at, last_written_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (name, kind)
             DO UPDATE SET content_hash = ?3, last_written_at = ?4",
            params![name, kind.as_str(), content_hash, now],
        )?;

        self.find(name, kind)?
            .ok_or_else(|| StateError::UnitNotFound(name.to_string()))
    }

    /// Refresh a record's liveness timestamp without touching the hash.
    pub fn touch(&self, id: i64) -> Result<(), StateError> {
        let now = Utc::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE units SET last_written_at = ?1 WHERE id = ?2",
            params![now, id],
        )?;
        if rows == 0 {
            return Err(StateError::UnitNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Delete a record.
    pub fn delete(&self, id: i64) -> Result<(), StateError> {
        let rows = self
            .conn
            .execute("DELETE FROM units WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StateError::UnitNotFound(id.to_string()));
        }
        Ok(())
    }

    fn row_to_unit(row: &rusqlite::Row) -> Result<Result<TrackedUnit, StateError>, rusqlite::Error> {
        let kind_str: String = row.get(2)?;
        Ok(match UnitKind::from_str(&kind_str) {
            Some(kind) => Ok(TrackedUnit {
                id: row.get(0)?,
                name: row.get(1)?,
                kind,
                content_hash: row.get(3)?,
                created_at: row.get(4)?,
                last_written_at: row.get(5)?,
            }),
            None => Err(StateError::InvalidKind(kind_str)),
        })
    }
}
