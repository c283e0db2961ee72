//! Shared test utilities for integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use cursor_chat_export::{ExportConfig, OutputFormat, Table};
use rusqlite::{Connection, params};
use serde_json::Value;
use tempfile::TempDir;

/// Builder for a throwaway `state.vscdb` with Cursor's key-value tables
pub struct VscdbBuilder {
    temp_dir: TempDir,
    conn: Connection,
}

impl VscdbBuilder {
    /// Create a database with both `cursorDiskKV` and `ItemTable`
    pub fn new() -> Self {
        Self::with_tables(&[Table::CursorDiskKv, Table::ItemTable])
    }

    /// Create a database with only the given tables
    pub fn with_tables(tables: &[Table]) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let conn = Connection::open(temp_dir.path().join("state.vscdb"))
            .expect("Failed to create database");
        for table in tables {
            conn.execute_batch(&format!(
                "CREATE TABLE {} (key TEXT UNIQUE ON CONFLICT REPLACE, value BLOB);",
                table.name()
            ))
            .expect("Failed to create table");
        }
        Self { temp_dir, conn }
    }

    /// Create a database from arbitrary DDL, for schemas Cursor never writes
    pub fn with_schema(sql: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let conn = Connection::open(temp_dir.path().join("state.vscdb"))
            .expect("Failed to create database");
        conn.execute_batch(sql).expect("Failed to create schema");
        Self { temp_dir, conn }
    }

    /// Insert a raw key/value pair
    pub fn with_raw(self, table: Table, key: &str, value: &[u8]) -> Self {
        self.conn
            .execute(
                &format!("INSERT INTO {} (key, value) VALUES (?1, ?2)", table.name()),
                params![key, value],
            )
            .expect("Failed to insert row");
        self
    }

    /// Store a structural document under `composerData:<id>`
    pub fn with_composer(self, table: Table, id: &str, data: &Value) -> Self {
        let key = format!("composerData:{id}");
        self.with_raw(table, &key, data.to_string().as_bytes())
    }

    /// Store a content document under `bubbleId:<conversation>:<bubble>`
    pub fn with_bubble(self, table: Table, conversation_id: &str, bubble_id: &str, data: &Value) -> Self {
        let key = format!("bubbleId:{conversation_id}:{bubble_id}");
        self.with_raw(table, &key, data.to_string().as_bytes())
    }

    /// Close the connection and hand back the directory holding `state.vscdb`
    pub fn build(self) -> TestDb {
        drop(self.conn);
        TestDb {
            temp_dir: self.temp_dir,
        }
    }
}

impl Default for VscdbBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TestDb {
    temp_dir: TempDir,
}

impl TestDb {
    pub fn path(&self) -> PathBuf {
        self.temp_dir.path().join("state.vscdb")
    }

    /// Export config writing into `target_dir`, quiet, single job
    pub fn config(&self, target_dir: &Path) -> ExportConfig {
        ExportConfig {
            target_dir: target_dir.to_path_buf(),
            db_path: self.path(),
            structure_dir: None,
            conversations: Vec::new(),
            format: OutputFormat::Both,
            jobs: 1,
            force: false,
            verbose: false,
            quiet: true,
        }
    }
}

/// Header list in the `fullConversationHeadersOnly` shape
pub fn headers(entries: &[(&str, i64)]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|(id, kind)| serde_json::json!({"bubbleId": id, "type": kind}))
            .collect(),
    )
}

/// Every file name in `dir`, sorted
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read dir")
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
