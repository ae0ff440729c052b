use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, Transaction, params};

use super::schema::{LINK_TABLE, link_column};
use super::{LinkId, LinkRow};
use crate::error::{StoreError, StoreResult};
use crate::event::Event;

const SNAPSHOT_SELECT: &str =
    "s.native_id, s.title, s.location, s.description, s.start_time, s.end_time, s.completed, s.modified_at";

/// The store's exclusive transaction for one pass.
///
/// Nothing is visible to other connections until [`commit`](Self::commit).
/// Dropping it rolls back.
pub struct StoreTransaction<'a> {
    tx: Transaction<'a>,
    adapters: &'a [String],
    now: DateTime<Utc>,
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        native_id: row.get(0)?,
        title: row.get(1)?,
        location: row.get(2)?,
        description: row.get(3)?,
        start: row.get(4)?,
        end: row.get(5)?,
        completed: row.get(6)?,
        modified_at: row.get(7)?,
    })
}

impl<'a> StoreTransaction<'a> {
    pub(super) fn new(tx: Transaction<'a>, adapters: &'a [String], now: DateTime<Utc>) -> Self {
        StoreTransaction { tx, adapters, now }
    }

    /// Adapter names are interpolated into SQL, so only schema members pass.
    fn table(&self, adapter: &str) -> StoreResult<&'a str> {
        self.adapters
            .iter()
            .find(|a| a.as_str() == adapter)
            .map(String::as_str)
            .ok_or_else(|| StoreError::UnknownAdapter(adapter.to_string()))
    }

    fn link_select(&self) -> String {
        let mut columns = vec!["id".to_string(), "created_at".to_string()];
        columns.extend(self.adapters.iter().map(|a| link_column(a)));
        format!("SELECT {} FROM {LINK_TABLE}", columns.join(", "))
    }

    fn link_from_row(&self, row: &Row<'_>) -> rusqlite::Result<LinkRow> {
        let mut members = Vec::with_capacity(self.adapters.len());
        for (i, adapter) in self.adapters.iter().enumerate() {
            members.push((adapter.clone(), row.get::<_, Option<String>>(i + 2)?));
        }
        Ok(LinkRow {
            id: LinkId(row.get(0)?),
            created_at: row.get(1)?,
            members,
        })
    }

    pub fn find_link_by_native_id(&self, adapter: &str, native_id: &str) -> StoreResult<Option<LinkId>> {
        let table = self.table(adapter)?;
        let id: Option<i64> = self
            .tx
            .query_row(
                &format!("SELECT id FROM {LINK_TABLE} WHERE {} = ?1", link_column(table)),
                params![native_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(LinkId))
    }

    /// New link holding only `native_id` on `adapter`.
    pub fn create_link(&self, adapter: &str, native_id: &str) -> StoreResult<LinkId> {
        let table = self.table(adapter)?;
        self.tx.execute(
            &format!(
                "INSERT INTO {LINK_TABLE} (created_at, {}) VALUES (?1, ?2)",
                link_column(table)
            ),
            params![self.now, native_id],
        )?;
        let link = LinkId(self.tx.last_insert_rowid());
        tracing::debug!(link_id = %link, adapter, native_id, "created link");
        Ok(link)
    }

    pub fn link_members(&self, link: LinkId) -> StoreResult<LinkRow> {
        self.tx
            .query_row(
                &format!("{} WHERE id = ?1", self.link_select()),
                params![link.0],
                |row| self.link_from_row(row),
            )
            .optional()?
            .ok_or(StoreError::UnknownLink(link))
    }

    /// Record `native_id` as the link's member on `adapter`.
    pub fn attach(&self, link: LinkId, adapter: &str, native_id: &str) -> StoreResult<()> {
        let table = self.table(adapter)?;
        let row = self.link_members(link)?;
        match row.native_id(table) {
            Some(existing) if existing == native_id => return Ok(()),
            Some(existing) => {
                return Err(StoreError::AlreadyAttached {
                    link,
                    adapter: table.to_string(),
                    existing: existing.to_string(),
                    native_id: native_id.to_string(),
                });
            }
            None => {}
        }
        self.tx.execute(
            &format!("UPDATE {LINK_TABLE} SET {} = ?1 WHERE id = ?2", link_column(table)),
            params![native_id, link.0],
        )?;
        tracing::debug!(link_id = %link, adapter, native_id, "attached record");
        Ok(())
    }

    /// Clear the link's member on `adapter` and drop its snapshot.
    pub fn detach(&self, link: LinkId, adapter: &str) -> StoreResult<()> {
        let table = self.table(adapter)?;
        let column = link_column(table);
        self.tx.execute(
            &format!(
                "DELETE FROM {table} WHERE native_id = (SELECT {column} FROM {LINK_TABLE} WHERE id = ?1)"
            ),
            params![link.0],
        )?;
        self.tx.execute(
            &format!("UPDATE {LINK_TABLE} SET {column} = NULL WHERE id = ?1"),
            params![link.0],
        )?;
        Ok(())
    }

    /// Last known copy of the link's record on `adapter`.
    pub fn snapshot(&self, link: LinkId, adapter: &str) -> StoreResult<Option<Event>> {
        let table = self.table(adapter)?;
        let event = self
            .tx
            .query_row(
                &format!(
                    "SELECT {SNAPSHOT_SELECT} FROM {table} s \
                     JOIN {LINK_TABLE} l ON l.{} = s.native_id WHERE l.id = ?1",
                    link_column(table)
                ),
                params![link.0],
                event_from_row,
            )
            .optional()?;
        Ok(event)
    }

    pub fn update_snapshot(&self, link: LinkId, adapter: &str, event: &Event) -> StoreResult<()> {
        let table = self.table(adapter)?;
        self.tx.execute(
            &format!(
                "INSERT INTO {table} (native_id, link_id, title, location, description, \
                 start_time, end_time, completed, modified_at, synced_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                 ON CONFLICT(native_id) DO UPDATE SET \
                 link_id = excluded.link_id, title = excluded.title, \
                 location = excluded.location, description = excluded.description, \
                 start_time = excluded.start_time, end_time = excluded.end_time, \
                 completed = excluded.completed, modified_at = excluded.modified_at, \
                 synced_at = excluded.synced_at"
            ),
            params![
                event.native_id,
                link.0,
                event.title,
                event.location,
                event.description,
                event.start,
                event.end,
                event.completed,
                event.modified_at,
                self.now,
            ],
        )?;
        Ok(())
    }

    /// Remove the link once no adapter references it. Returns whether it was
    /// removed.
    pub fn delete_link_if_orphaned(&self, link: LinkId) -> StoreResult<bool> {
        let row = self.link_members(link)?;
        if row.members.iter().any(|(_, id)| id.is_some()) {
            return Ok(false);
        }
        self.tx
            .execute(&format!("DELETE FROM {LINK_TABLE} WHERE id = ?1"), params![link.0])?;
        tracing::debug!(link_id = %link, "removed orphaned link");
        Ok(true)
    }

    /// Every snapshot on `adapter`, with its link.
    pub fn cached_records(&self, adapter: &str) -> StoreResult<Vec<(LinkId, Event)>> {
        let table = self.table(adapter)?;
        let mut stmt = self.tx.prepare(&format!(
            "SELECT s.link_id, {SNAPSHOT_SELECT} FROM {table} s ORDER BY s.link_id"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                let link = LinkId(row.get(0)?);
                let event = Event {
                    native_id: row.get(1)?,
                    title: row.get(2)?,
                    location: row.get(3)?,
                    description: row.get(4)?,
                    start: row.get(5)?,
                    end: row.get(6)?,
                    completed: row.get(7)?,
                    modified_at: row.get(8)?,
                };
                Ok((link, event))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Links missing a member on at least one of `adapters`.
    pub fn incomplete_links(&self, adapters: &[String]) -> StoreResult<Vec<LinkId>> {
        if adapters.is_empty() {
            return Ok(Vec::new());
        }
        let mut conditions = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            conditions.push(format!("{} IS NULL", link_column(self.table(adapter)?)));
        }
        let mut stmt = self.tx.prepare(&format!(
            "SELECT id FROM {LINK_TABLE} WHERE {} ORDER BY id",
            conditions.join(" OR ")
        ))?;
        let ids = stmt
            .query_map([], |row| row.get(0).map(LinkId))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn links(&self) -> StoreResult<Vec<LinkRow>> {
        let mut stmt = self.tx.prepare(&format!("{} ORDER BY id", self.link_select()))?;
        let rows = stmt
            .query_map([], |row| self.link_from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Drop a link and, through the cascade, all of its snapshots.
    pub fn unlink(&self, link: LinkId) -> StoreResult<()> {
        let removed = self
            .tx
            .execute(&format!("DELETE FROM {LINK_TABLE} WHERE id = ?1"), params![link.0])?;
        if removed == 0 {
            return Err(StoreError::UnknownLink(link));
        }
        tracing::info!(link_id = %link, "unlinked");
        Ok(())
    }

    pub fn commit(self) -> StoreResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> StoreResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}
