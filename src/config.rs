//! YAML configuration for database connections and writer settings.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{identifier::MAX_IDENTIFIER_LEN, writer::WriterOptions};

/// PostgreSQL connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {
    pub host: String,
    #[serde(default = "DbConfig::default_port")]
    pub port: u16,
    pub dbname: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl DbConfig {
    fn default_port() -> u16 {
        5432
    }

    /// libpq-style key/value connection string.
    pub fn conninfo(&self) -> String {
        let mut conninfo = format!(
            "dbname={} user={} host={} port={}",
            self.dbname, self.user, self.host, self.port
        );
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            conninfo.push_str(&format!(" password={password}"));
        }
        conninfo
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    pub use_mapping_table: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_separator: Option<String>,
    /// `[from, to]` pairs; the writer default applies when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replacements: Option<Vec<(String, String)>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxlen: Option<usize>,
}

impl WriterSettings {
    pub fn to_options(&self) -> WriterOptions {
        let defaults = WriterOptions::default();
        WriterOptions {
            suffix: self.suffix.clone(),
            use_mapping_table: self.use_mapping_table,
            reverse_separator: self.reverse_separator.clone(),
            replacements: self.replacements.clone().unwrap_or(defaults.replacements),
            maxlen: self.maxlen.unwrap_or(MAX_IDENTIFIER_LEN),
            predefined_schema: None,
        }
    }
}

impl From<&WriterSettings> for WriterOptions {
    fn from(settings: &WriterSettings) -> Self {
        settings.to_options()
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DbConfig>,
    pub writer: WriterSettings,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader).context("Parsing config YAML")
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Parsing config YAML")
    }
}
