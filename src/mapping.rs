//! Loading the keyword-mapping table.
//!
//! Each record says "a file whose path contains `file_name_contains` belongs
//! to the classification named `database_mapping`". CSV (with a header row)
//! and JSON (an array of objects) are accepted; the format is picked by file
//! extension.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::path::Path;
use tracing::debug;

use crate::error::MappingLoadError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClassificationMapping {
    #[serde(alias = "FileNameContains", alias = "fileNameContains")]
    pub file_name_contains: String,
    #[serde(alias = "DatabaseMapping", alias = "databaseMapping")]
    pub database_mapping: String,
    #[serde(default, alias = "Celebrity", deserialize_with = "flexible_bool")]
    pub celebrity: bool,
    #[serde(
        default = "default_searchable",
        alias = "Searchable",
        deserialize_with = "flexible_bool"
    )]
    pub searchable: bool,
}

fn default_searchable() -> bool {
    true
}

impl ClassificationMapping {
    pub fn new(
        file_name_contains: impl Into<String>,
        database_mapping: impl Into<String>,
        celebrity: bool,
        searchable: bool,
    ) -> Self {
        Self {
            file_name_contains: file_name_contains.into(),
            database_mapping: database_mapping.into(),
            celebrity,
            searchable,
        }
    }

    fn normalized(mut self, path: &Path, record: usize) -> Result<Self, MappingLoadError> {
        self.file_name_contains = self.file_name_contains.trim().to_string();
        self.database_mapping = self.database_mapping.trim().to_string();

        let invalid = |reason: &str| MappingLoadError::InvalidRecord {
            path: path.to_path_buf(),
            record,
            reason: reason.to_string(),
        };
        if self.file_name_contains.is_empty() {
            return Err(invalid("file_name_contains is blank"));
        }
        if self.database_mapping.is_empty() {
            return Err(invalid("database_mapping is blank"));
        }
        Ok(self)
    }
}

pub fn load_mappings(path: &Path) -> Result<Vec<ClassificationMapping>, MappingLoadError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let raw = if is_json {
        read_json(path)?
    } else {
        read_csv(path)?
    };

    let mappings = raw
        .into_iter()
        .enumerate()
        .map(|(index, mapping)| mapping.normalized(path, index + 1))
        .collect::<Result<Vec<_>, _>>()?;

    debug!("Loaded {} mappings from {}", mappings.len(), path.display());
    Ok(mappings)
}

fn read_csv(path: &Path) -> Result<Vec<ClassificationMapping>, MappingLoadError> {
    let file = File::open(path).map_err(|source| MappingLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(file);

    reader
        .deserialize::<ClassificationMapping>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| MappingLoadError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn read_json(path: &Path) -> Result<Vec<ClassificationMapping>, MappingLoadError> {
    let text = fs::read_to_string(path).map_err(|source| MappingLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&text).map_err(|source| MappingLoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Accepts `true`/`false`, `yes`/`no`, `1`/`0` and blank (false), in any case.
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    struct FlexibleBool;

    impl<'de> Visitor<'de> for FlexibleBool {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a boolean, 0/1, yes/no or blank")
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<bool, E> {
            Ok(value)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<bool, E> {
            match value {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(E::invalid_value(de::Unexpected::Unsigned(other), &self)),
            }
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<bool, E> {
            match value {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(E::invalid_value(de::Unexpected::Signed(other), &self)),
            }
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<bool, E> {
            match value.trim().to_ascii_lowercase().as_str() {
                "" | "false" | "no" | "n" | "0" => Ok(false),
                "true" | "yes" | "y" | "1" => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Str(value), &self)),
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }

        fn visit_none<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }
    }

    deserializer.deserialize_any(FlexibleBool)
}
