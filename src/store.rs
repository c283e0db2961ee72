//! Read-only key-value access to Cursor's `state.vscdb`.
//!
//! The database holds two tables with the same `(key, value)` layout:
//!
//! ```sql
//! CREATE TABLE cursorDiskKV (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);
//! CREATE TABLE ItemTable    (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);
//! ```
//!
//! Newer Cursor builds keep conversations in `cursorDiskKV`; older ones wrote some of
//! them to `ItemTable`. Either table may be missing entirely depending on the version.
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use crate::error::{Result, StoreError};

/// One of the two key-value tables in `state.vscdb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// `cursorDiskKV`, where current builds store composer and bubble data.
    CursorDiskKv,
    /// `ItemTable`, the VS Code-wide key-value table.
    ItemTable,
}

impl Table {
    pub const fn name(self) -> &'static str {
        match self {
            Table::CursorDiskKv => "cursorDiskKV",
            Table::ItemTable => "ItemTable",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a single exact-key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Vec<u8>),
    NotFound,
}

/// Uniform read-only lookup over a key-value store.
///
/// Absence is reported as [`Lookup::NotFound`]; an `Err` means the store itself
/// could not be queried.
pub trait KeyValueStore {
    fn lookup(&self, table: Table, key: &str) -> Result<Lookup>;

    /// All keys in `table` starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, table: Table, prefix: &str) -> Result<Vec<String>>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &S {
    fn lookup(&self, table: Table, key: &str) -> Result<Lookup> {
        (**self).lookup(table, key)
    }

    fn keys_with_prefix(&self, table: Table, prefix: &str) -> Result<Vec<String>> {
        (**self).keys_with_prefix(table, prefix)
    }
}

/// [`KeyValueStore`] backed by a read-only SQLite connection.
pub struct SqliteStore {
    conn: Connection,
    tables: HashSet<Table>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.execute_batch("PRAGMA cache_size = -16384;")
            .map_err(|source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_connection(conn).map_err(|e| match e {
            StoreError::Query { source, .. } => StoreError::Open {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Wrap an already-open connection, recording which tables exist.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let names: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
                .map_err(|source| StoreError::Query {
                    table: "sqlite_master",
                    source,
                })?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .and_then(|rows| rows.collect())
                .map_err(|source| StoreError::Query {
                    table: "sqlite_master",
                    source,
                })?;
            names
        };

        let tables = [Table::CursorDiskKv, Table::ItemTable]
            .into_iter()
            .filter(|t| names.iter().any(|n| n == t.name()))
            .collect::<HashSet<_>>();

        if tables.is_empty() {
            tracing::warn!("database has neither cursorDiskKV nor ItemTable");
        }

        Ok(Self { conn, tables })
    }

    pub fn has_table(&self, table: Table) -> bool {
        self.tables.contains(&table)
    }
}

impl KeyValueStore for SqliteStore {
    fn lookup(&self, table: Table, key: &str) -> Result<Lookup> {
        if !self.has_table(table) {
            return Ok(Lookup::NotFound);
        }

        let sql = format!("SELECT value FROM {} WHERE key = ?1", table.name());
        let value = self
            .conn
            .query_row(&sql, [key], |row| {
                Ok(match row.get_ref(0)? {
                    ValueRef::Null => None,
                    ValueRef::Text(bytes) | ValueRef::Blob(bytes) => Some(bytes.to_vec()),
                    ValueRef::Integer(i) => Some(i.to_string().into_bytes()),
                    ValueRef::Real(f) => Some(f.to_string().into_bytes()),
                })
            })
            .optional()
            .map_err(|source| StoreError::Query {
                table: table.name(),
                source,
            })?;

        Ok(match value.flatten() {
            Some(bytes) => Lookup::Found(bytes),
            None => Lookup::NotFound,
        })
    }

    fn keys_with_prefix(&self, table: Table, prefix: &str) -> Result<Vec<String>> {
        if !self.has_table(table) {
            return Ok(Vec::new());
        }

        let pattern = format!("{}%", escape_like(prefix));
        let sql = format!(
            "SELECT key FROM {} WHERE key LIKE ?1 ESCAPE '\\' ORDER BY key",
            table.name()
        );
        let query_err = |source| StoreError::Query {
            table: table.name(),
            source,
        };

        let mut stmt = self.conn.prepare(&sql).map_err(query_err)?;
        let keys: Vec<String> = stmt
            .query_map([&pattern], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect())
            .map_err(query_err)?;

        // LIKE is case-insensitive for ASCII.
        Ok(keys.into_iter().filter(|k| k.starts_with(prefix)).collect())
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// In-memory [`KeyValueStore`], handy for fixtures and for feeding data that was
/// dumped out of a database earlier.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<(Table, String), Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: Table, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.entries.insert((table, key.into()), value.into());
    }

    pub fn with(mut self, table: Table, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.insert(table, key, value);
        self
    }
}

impl KeyValueStore for MemoryStore {
    fn lookup(&self, table: Table, key: &str) -> Result<Lookup> {
        Ok(match self.entries.get(&(table, key.to_string())) {
            Some(v) => Lookup::Found(v.clone()),
            None => Lookup::NotFound,
        })
    }

    fn keys_with_prefix(&self, table: Table, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .keys()
            .filter(|(t, k)| *t == table && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_fixture() -> SqliteStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE cursorDiskKV (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);
             INSERT INTO cursorDiskKV VALUES ('composerData:a', '{\"x\":1}');
             INSERT INTO cursorDiskKV VALUES ('composerData:b', X'7B7D');
             INSERT INTO cursorDiskKV VALUES ('composerDataX', '{}');
             INSERT INTO cursorDiskKV VALUES ('bubbleId:a:1', NULL);",
        )
        .unwrap();
        SqliteStore::from_connection(conn).unwrap()
    }

    #[test]
    fn test_sqlite_lookup_text_and_blob() {
        let store = sqlite_fixture();
        assert_eq!(
            store.lookup(Table::CursorDiskKv, "composerData:a").unwrap(),
            Lookup::Found(b"{\"x\":1}".to_vec())
        );
        assert_eq!(
            store.lookup(Table::CursorDiskKv, "composerData:b").unwrap(),
            Lookup::Found(b"{}".to_vec())
        );
    }

    #[test]
    fn test_sqlite_missing_key_null_value_and_missing_table() {
        let store = sqlite_fixture();
        assert_eq!(
            store.lookup(Table::CursorDiskKv, "nope").unwrap(),
            Lookup::NotFound
        );
        assert_eq!(
            store.lookup(Table::CursorDiskKv, "bubbleId:a:1").unwrap(),
            Lookup::NotFound
        );
        assert!(!store.has_table(Table::ItemTable));
        assert_eq!(
            store.lookup(Table::ItemTable, "composerData:a").unwrap(),
            Lookup::NotFound
        );
    }

    #[test]
    fn test_keys_with_prefix_escapes_like_wildcards() {
        let store = sqlite_fixture();
        let keys = store
            .keys_with_prefix(Table::CursorDiskKv, "composerData:")
            .unwrap();
        assert_eq!(keys, vec!["composerData:a", "composerData:b"]);

        // `_` must not act as a single-character wildcard.
        let keys = store.keys_with_prefix(Table::CursorDiskKv, "composer_").unwrap();
        assert!(keys.is_empty());
    }

    #[test]
    fn test_memory_store_prefix_is_table_scoped() {
        let store = MemoryStore::new()
            .with(Table::CursorDiskKv, "composerData:1", "{}")
            .with(Table::ItemTable, "composerData:2", "{}");
        assert_eq!(
            store
                .keys_with_prefix(Table::ItemTable, "composerData:")
                .unwrap(),
            vec!["composerData:2"]
        );
        assert_eq!(store.lookup(Table::ItemTable, "composerData:1").unwrap(), Lookup::NotFound);
    }
}
