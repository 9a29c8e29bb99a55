//! Spatial writer for GeoJSON features.
//!
//! Geometry is split into two fixed columns, `g__type` and `g__coordinates`
//! (JSON text). Properties are taken as column names verbatim and no mapping
//! table is kept.

use std::{collections::BTreeSet, io};

use log::{debug, info};
use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::{Map, Serializer, Value as JsonValue, ser::Formatter};
use uuid::Uuid;

use crate::{
    db::Database,
    error::WriterError,
    identifier::table_name,
    schema,
    value::{FieldValue, ID_FIELD, Record},
    writer::{SchemaHook, WriteSummary, check_id, prepare_schema, write_rows},
};

pub const GEOMETRY_TYPE_FIELD: &str = "g__type";
pub const GEOMETRY_COORDINATES_FIELD: &str = "g__coordinates";

pub struct GeoJsonDbWriter<D> {
    db: D,
    table: String,
    predefined_schema: Option<SchemaHook>,
}

impl<D: Database> GeoJsonDbWriter<D> {
    pub fn new(db: D, table: &str, suffix: Option<&str>) -> Self {
        Self {
            db,
            table: table_name(table, suffix),
            predefined_schema: None,
        }
    }

    pub fn with_predefined_schema(mut self, hook: SchemaHook) -> Self {
        self.predefined_schema = Some(hook);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Writes a `FeatureCollection` object.
    pub fn handle_collection(&self, collection: JsonValue) -> Result<WriteSummary, WriterError> {
        let JsonValue::Object(mut collection) = collection else {
            return Err(WriterError::InvalidGeoJson(
                "top-level value is not an object".to_string(),
            ));
        };
        match collection.remove("features") {
            Some(JsonValue::Array(features)) => self.handle_features(features),
            Some(_) => Err(WriterError::InvalidGeoJson(
                "`features` is not an array".to_string(),
            )),
            None => Err(WriterError::InvalidGeoJson(
                "missing `features` member".to_string(),
            )),
        }
    }

    pub fn handle_features(&self, features: Vec<JsonValue>) -> Result<WriteSummary, WriterError> {
        let records = features
            .iter()
            .enumerate()
            .map(|(index, feature)| match feature {
                JsonValue::Object(feature) => feature_to_record(index, feature),
                _ => Err(WriterError::InvalidGeoJson(format!(
                    "feature {index} is not an object"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut summary = WriteSummary::default();
        if records.is_empty() {
            info!("No features to write to '{}'", self.table);
            return Ok(summary);
        }

        let existing: BTreeSet<String> = {
            let mut session = self.db.connect()?;
            schema::inspect_columns(session.as_mut(), &self.table)?
        };

        let mut rows = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            match check_id(index, &record) {
                Ok(()) => rows.push((index, record)),
                Err(err) => summary.reject(err),
            }
        }

        summary.new_columns = prepare_schema(
            &self.db,
            &self.table,
            self.predefined_schema.as_ref(),
            &existing,
            rows.iter().flat_map(|(_, row)| row.keys()),
        )?;
        write_rows(&self.db, &self.table, rows, &mut summary)?;
        summary.log(&self.table);
        Ok(summary)
    }
}

/// Flattens one feature into `_id`, the geometry columns and its properties.
pub fn feature_to_record(
    index: usize,
    feature: &Map<String, JsonValue>,
) -> Result<Record, WriterError> {
    let id = match feature.get("id") {
        Some(id) if !id.is_null() => FieldValue::from(id.clone()),
        _ => {
            let generated = deterministic_id(feature).map_err(|err| {
                WriterError::InvalidGeoJson(format!("feature {index} cannot be hashed: {err}"))
            })?;
            info!("Generated deterministic id for feature {index}: {generated}");
            FieldValue::Text(generated)
        }
    };

    let geometry = feature.get("geometry").and_then(JsonValue::as_object);
    let member = |name: &str| {
        geometry
            .and_then(|geometry| geometry.get(name))
            .cloned()
            .map(FieldValue::from)
            .unwrap_or(FieldValue::Null)
    };

    let mut record = Record::new();
    record.insert(ID_FIELD, id);
    record.insert(GEOMETRY_TYPE_FIELD, member("type"));
    record.insert(GEOMETRY_COORDINATES_FIELD, member("coordinates"));
    if let Some(JsonValue::Object(properties)) = feature.get("properties") {
        for (key, value) in properties {
            record.insert(key.as_str(), FieldValue::from(value.clone()));
        }
    }
    Ok(record)
}

/// Stable UUID for a feature without an `id`.
///
/// The feature's `type`, `geometry` and `properties` are written as compact
/// JSON with sorted keys and non-ASCII characters escaped as `\uXXXX`; the
/// id is a v5 UUID in the DNS namespace over the MD5 hex digest of that
/// text. Ids already stored in existing tables were generated this way.
pub fn deterministic_id(feature: &Map<String, JsonValue>) -> serde_json::Result<String> {
    let member = |name: &str| feature.get(name).cloned().unwrap_or(JsonValue::Null);
    let properties = feature
        .get("properties")
        .cloned()
        .unwrap_or_else(|| JsonValue::Object(Map::new()));
    let mut content = Map::new();
    content.insert("geometry".to_string(), member("geometry"));
    content.insert("properties".to_string(), properties);
    content.insert("type".to_string(), member("type"));

    let canonical = canonical_json(&canonicalize(JsonValue::Object(content)))?;
    let hex: String = Md5::digest(&canonical)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    debug!("Feature content hash {hex}");
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_DNS, hex.as_bytes()).to_string())
}

/// Rebuilds objects with sorted keys at every depth.
fn canonicalize(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(String, JsonValue)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonicalize(value)))
                    .collect(),
            )
        }
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

fn canonical_json(value: &JsonValue) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    value.serialize(&mut Serializer::with_formatter(&mut out, AsciiFormatter))?;
    Ok(out)
}

/// Compact output with every character outside printable ASCII written as
/// `\uXXXX` UTF-16 escapes.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for ch in fragment.chars() {
            if matches!(ch, ' '..='~') {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}
