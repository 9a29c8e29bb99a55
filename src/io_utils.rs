//! Input readers that turn files into [`Record`]s.
//!
//! - **Encoding**: inputs are decoded with `encoding_rs`, defaulting to UTF-8.
//! - **Delimiters**: `.tsv` files default to tab, everything else to comma.
//! - **stdin**: the `-` path reads from standard input.
//! - **Formats**: CSV, JSON (an array of objects or JSON lines) and GeoJSON.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;
use serde_json::Value as JsonValue;

use crate::value::{FieldValue, ID_FIELD, Record};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum InputFormat {
    Csv,
    Json,
    Geojson,
}

impl InputFormat {
    /// Guesses the format from the file extension.
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|ext| ext.to_str())?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "tsv" => Some(InputFormat::Csv),
            "json" | "jsonl" | "ndjson" => Some(InputFormat::Json),
            "geojson" => Some(InputFormat::Geojson),
            _ => None,
        }
    }
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

fn open_raw(path: &Path) -> Result<Box<dyn Read>> {
    if is_dash(path) {
        Ok(Box::new(std::io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        )))
    }
}

/// Reads the whole input as text in `encoding`.
pub fn read_text(path: &Path, encoding: &'static Encoding) -> Result<String> {
    let mut decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(open_raw(path)?);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .with_context(|| format!("Decoding {path:?} as {}", encoding.name()))?;
    Ok(text)
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    builder.from_reader(reader)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// CSV rows as text records.
///
/// `_id` comes from `id_column` when the header has it (the column itself is
/// dropped unless it is `_id`), otherwise from the 1-based row number.
pub fn read_csv_records(
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
    id_column: Option<&str>,
) -> Result<Vec<Record>> {
    let mut reader = open_csv_reader(open_raw(path)?, delimiter);
    let headers = decode_record(reader.byte_headers()?, encoding)
        .with_context(|| format!("Decoding headers of {path:?}"))?;
    let id_index = id_column.and_then(|name| headers.iter().position(|header| header == name));

    let mut records = Vec::new();
    for (idx, row) in reader.byte_records().enumerate() {
        let line = idx + 2;
        let row = row.with_context(|| format!("Reading row {line} of {path:?}"))?;
        let fields = decode_record(&row, encoding)
            .with_context(|| format!("Decoding row {line} of {path:?}"))?;

        let mut record = Record::with_capacity(headers.len() + 1);
        match id_index {
            Some(pos) => record.insert(ID_FIELD, fields[pos].as_str()),
            None => record.insert(ID_FIELD, (idx + 1).to_string()),
        }
        for (pos, (header, value)) in headers.iter().zip(fields).enumerate() {
            if Some(pos) == id_index && header != ID_FIELD {
                continue;
            }
            record.insert(header.as_str(), FieldValue::Text(value));
        }
        records.push(record);
    }
    Ok(records)
}

/// A JSON array of objects, or one object per line.
pub fn read_json_records(path: &Path, encoding: &'static Encoding) -> Result<Vec<Record>> {
    let text = read_text(path, encoding)?;
    parse_json_records(&text).with_context(|| format!("Parsing JSON records from {path:?}"))
}

pub fn parse_json_records(text: &str) -> Result<Vec<Record>> {
    let trimmed = text.trim_start_matches('\u{feff}').trim();
    if trimmed.starts_with('[') {
        let values: Vec<JsonValue> = serde_json::from_str(trimmed).context("Parsing JSON array")?;
        return values
            .into_iter()
            .enumerate()
            .map(|(idx, value)| {
                Record::from_json(value).ok_or_else(|| anyhow!("Element {idx} is not an object"))
            })
            .collect();
    }

    let mut records = Vec::new();
    for (idx, line) in trimmed.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: JsonValue = serde_json::from_str(line)
            .with_context(|| format!("Parsing JSON on line {}", idx + 1))?;
        match Record::from_json(value) {
            Some(record) => records.push(record),
            None => bail!("Line {} is not a JSON object", idx + 1),
        }
    }
    Ok(records)
}

pub fn read_json_value(path: &Path, encoding: &'static Encoding) -> Result<JsonValue> {
    let text = read_text(path, encoding)?;
    serde_json::from_str(text.trim_start_matches('\u{feff}'))
        .with_context(|| format!("Parsing JSON from {path:?}"))
}
