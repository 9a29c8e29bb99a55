//! Column-key sanitization with stable original → column mappings.
//!
//! A [`ColumnSanitizer`] owns the mapping state for one table. Keys that were
//! mapped before are reused verbatim; new keys are transformed, normalized and
//! de-duplicated against every column name already taken.

use std::collections::{BTreeMap, HashSet};

use log::debug;

use crate::{
    identifier::{MAX_IDENTIFIER_LEN, NormalizeOptions, normalize_identifier, truncate_to},
    value::Record,
};

/// Width of the `_NNN` suffix used to de-duplicate column names.
const UNIQUE_SUFFIX_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizeOptions {
    /// Split keys on this separator and reverse the segments before
    /// normalizing (`group/sub/question` → `question/sub/group`).
    pub reverse_separator: Option<String>,
    /// Literal `(from, to)` replacements applied in order.
    pub replacements: Vec<(String, String)>,
    pub maxlen: usize,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            reverse_separator: None,
            replacements: Vec::new(),
            maxlen: MAX_IDENTIFIER_LEN,
        }
    }
}

/// Original field name → SQL column name for a single table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    pairs: BTreeMap<String, String>,
    used: HashSet<String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.pairs.get(original).map(String::as_str)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.used.contains(column)
    }

    /// Records a pair unless `original` is already mapped. Returns whether the
    /// pair was added.
    pub fn insert(&mut self, original: impl Into<String>, column: impl Into<String>) -> bool {
        let original = original.into();
        if self.pairs.contains_key(&original) {
            return false;
        }
        let column = column.into();
        self.used.insert(column.clone());
        self.pairs.insert(original, column);
        true
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(o, c)| (o.as_str(), c.as_str()))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.pairs.values().map(String::as_str)
    }
}

impl<O, C> FromIterator<(O, C)> for ColumnMapping
where
    O: Into<String>,
    C: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (O, C)>>(iter: I) -> Self {
        let mut mapping = ColumnMapping::new();
        for (original, column) in iter {
            mapping.insert(original, column);
        }
        mapping
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSanitizer {
    mapping: ColumnMapping,
    options: SanitizeOptions,
    added: Vec<(String, String)>,
}

impl ColumnSanitizer {
    pub fn new(mapping: ColumnMapping, options: SanitizeOptions) -> Self {
        Self {
            mapping,
            options,
            added: Vec::new(),
        }
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Pairs assigned by this sanitizer, in assignment order.
    pub fn added_pairs(&self) -> &[(String, String)] {
        &self.added
    }

    pub fn into_parts(self) -> (ColumnMapping, Vec<(String, String)>) {
        (self.mapping, self.added)
    }

    /// Renames every key of `record` to its column name.
    pub fn sanitize(&mut self, record: Record) -> Record {
        let mut sanitized = Record::with_capacity(record.len());
        for (original, value) in record {
            let value = value.serialize_compound();
            let column = match self.mapping.get(&original) {
                Some(column) => column.to_string(),
                None => {
                    let column = self.assign(&original);
                    debug!("Mapped field '{original}' to column '{column}'");
                    self.mapping.insert(original.clone(), column.clone());
                    self.added.push((original, column.clone()));
                    column
                }
            };
            sanitized.insert(column, value);
        }
        sanitized
    }

    /// The column name `original` would receive if it were new.
    pub fn candidate(&self, original: &str) -> String {
        let mut key = match self.options.reverse_separator.as_deref() {
            Some(sep) if !sep.is_empty() => reverse_parts(original, sep),
            _ => original.to_string(),
        };
        for (from, to) in &self.options.replacements {
            if !from.is_empty() {
                key = key.replace(from.as_str(), to);
            }
        }
        normalize_identifier(&key, &NormalizeOptions::column_keys(self.options.maxlen))
    }

    fn assign(&self, original: &str) -> String {
        let candidate = self.candidate(original);
        shorten_and_uniquify(&candidate, &self.mapping, self.options.maxlen)
    }
}

/// Sanitizes one record against `mapping`, returning the renamed record and
/// the updated mapping.
pub fn sanitize_record(
    record: Record,
    mapping: &ColumnMapping,
    options: &SanitizeOptions,
) -> (Record, ColumnMapping) {
    let mut sanitizer = ColumnSanitizer::new(mapping.clone(), options.clone());
    let sanitized = sanitizer.sanitize(record);
    let (updated, _) = sanitizer.into_parts();
    (sanitized, updated)
}

fn reverse_parts(key: &str, sep: &str) -> String {
    let mut parts: Vec<&str> = key.split(sep).collect();
    parts.reverse();
    parts.join(sep)
}

/// Truncates `identifier` to `maxlen` and, while it clashes with a taken
/// column, swaps the tail for `_001`, `_002`, ...
fn shorten_and_uniquify(identifier: &str, taken: &ColumnMapping, maxlen: usize) -> String {
    let mut candidate = truncate_to(identifier, maxlen).into_owned();
    let stem = truncate_to(identifier, maxlen.saturating_sub(UNIQUE_SUFFIX_LEN));
    let mut counter = 1usize;
    while taken.contains_column(&candidate) {
        candidate = format!("{stem}_{counter:03}");
        counter += 1;
    }
    candidate
}
