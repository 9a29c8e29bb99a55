#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;
use structured_writer::{
    Record,
    db::{Database, SqliteDatabase},
    schema,
};
use tempfile::{TempDir, tempdir};

/// Scratch directory with its own SQLite database, removed on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.temp_dir.path().join("warehouse.sqlite")
    }

    pub fn db(&self) -> SqliteDatabase {
        SqliteDatabase::open(self.sqlite_path())
    }

    pub fn columns(&self, table: &str) -> Vec<String> {
        let mut session = self.db().connect().expect("connect");
        schema::inspect_columns(session.as_mut(), table)
            .expect("inspect")
            .into_iter()
            .collect()
    }

    /// Rows of `table` keyed by column name, ordered by `_id`.
    pub fn rows(&self, table: &str) -> Vec<BTreeMap<String, Option<String>>> {
        let mut session = self.db().connect().expect("connect");
        let (columns, rows) = schema::fetch_rows(session.as_mut(), table).expect("fetch rows");
        rows.into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }

    pub fn tables(&self) -> Vec<String> {
        let mut session = self.db().connect().expect("connect");
        schema::list_tables(session.as_mut()).expect("list tables")
    }
}

pub fn records(value: JsonValue) -> Vec<Record> {
    match value {
        JsonValue::Array(items) => items
            .into_iter()
            .map(|item| Record::from_json(item).expect("object record"))
            .collect(),
        other => panic!("expected an array of records, got {other}"),
    }
}
