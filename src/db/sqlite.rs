use std::path::{Path, PathBuf};

use log::debug;
use rusqlite::{Connection, ErrorCode, ffi, params_from_iter, types::ValueRef};

use super::{Database, Row, Session};
use crate::{
    error::{DbError, DbErrorKind},
    sql::Dialect,
};

const BUSY_TIMEOUT_MS: u32 = 5000;

/// A SQLite database file. Each session opens its own connection.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    path: PathBuf,
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn connect(&self) -> Result<Box<dyn Session>, DbError> {
        let context = format!("opening sqlite database at {}", self.path.display());
        let conn = Connection::open(&self.path).map_err(|err| {
            DbError::new(DbErrorKind::Connection, context.as_str(), err.to_string())
        })?;
        conn.execute_batch(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS};"))
            .map_err(|err| convert(err, &context))?;
        debug!("Opened sqlite session on {}", self.path.display());
        Ok(Box::new(SqliteSession { conn }))
    }
}

struct SqliteSession {
    conn: Connection,
}

fn classify(err: &rusqlite::Error) -> DbErrorKind {
    let (failure, message) = match err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            (failure, message.as_deref().unwrap_or_default())
        }
        rusqlite::Error::SqlInputError { error, msg, .. } => (error, msg.as_str()),
        _ => return DbErrorKind::Other,
    };
    match failure.code {
        ErrorCode::ConstraintViolation
            if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
        {
            DbErrorKind::UniqueViolation
        }
        ErrorCode::CannotOpen | ErrorCode::NotADatabase => DbErrorKind::Connection,
        _ if message.starts_with("duplicate column name") => DbErrorKind::DuplicateColumn,
        _ if message.contains("already exists") => DbErrorKind::DuplicateTable,
        _ => DbErrorKind::Other,
    }
}

fn convert(err: rusqlite::Error, sql: &str) -> DbError {
    DbError::new(classify(&err), sql, err.to_string())
}

fn text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl Session for SqliteSession {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&mut self, sql: &str, params: &[Option<&str>]) -> Result<u64, DbError> {
        self.conn
            .execute(sql, params_from_iter(params.iter()))
            .map(|affected| affected as u64)
            .map_err(|err| convert(err, sql))
    }

    fn query(&mut self, sql: &str, params: &[Option<&str>]) -> Result<Vec<Row>, DbError> {
        let mut statement = self.conn.prepare(sql).map_err(|err| convert(err, sql))?;
        let width = statement.column_count();
        let rows = statement
            .query_map(params_from_iter(params.iter()), |row| {
                (0..width)
                    .map(|idx| row.get_ref(idx).map(text))
                    .collect::<rusqlite::Result<Row>>()
            })
            .map_err(|err| convert(err, sql))?;
        rows.collect::<rusqlite::Result<Vec<Row>>>()
            .map_err(|err| convert(err, sql))
    }

    fn batch(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn.execute_batch(sql).map_err(|err| convert(err, sql))
    }
}
