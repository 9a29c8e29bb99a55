//! Error taxonomy for the writer.
//!
//! Database failures are classified once, at the backend boundary, into a
//! [`DbErrorKind`] so the rest of the crate can decide whether a failure is an
//! expected race (`DuplicateColumn`, `DuplicateTable`, `UniqueViolation`), a
//! per-row problem, or a batch-fatal connectivity loss.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// The driver could not reach the server or lost the connection.
    Connection,
    DuplicateColumn,
    DuplicateTable,
    UniqueViolation,
    Other,
}

impl DbErrorKind {
    /// Races produced by concurrent or repeated migrations.
    pub fn is_already_applied(self) -> bool {
        matches!(
            self,
            DbErrorKind::DuplicateColumn | DbErrorKind::DuplicateTable | DbErrorKind::UniqueViolation
        )
    }
}

#[derive(Debug, Error)]
#[error("{context}: {message}")]
pub struct DbError {
    pub kind: DbErrorKind,
    pub context: String,
    pub message: String,
}

impl DbError {
    pub fn new(kind: DbErrorKind, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn is_connection(&self) -> bool {
        self.kind == DbErrorKind::Connection
    }

    pub(crate) fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// A failure confined to a single record.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("record {index} has no `_id` field")]
    MissingId { index: usize },
    #[error("record {index} has a null `_id`")]
    NullId { index: usize },
    #[error("record {index} (_id={id}) could not be written: {source}")]
    Write {
        index: usize,
        id: String,
        #[source]
        source: DbError,
    },
}

impl RowError {
    pub fn index(&self) -> usize {
        match self {
            RowError::MissingId { index }
            | RowError::NullId { index }
            | RowError::Write { index, .. } => *index,
        }
    }
}

/// A failure that aborts the whole batch.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("predefined schema for table '{table}' failed: {source}")]
    PredefinedSchema {
        table: String,
        #[source]
        source: DbError,
    },
    #[error("invalid GeoJSON input: {0}")]
    InvalidGeoJson(String),
}
