//! Per-database options used when a client handle is first requested.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Server-side description of a database, serialised in the server's casing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseRecord {
    database_name: String,
    #[serde(default)]
    disabled: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    settings: BTreeMap<String, String>,
}

impl DatabaseRecord {
    /// Creates a record for the named database with default settings.
    #[must_use]
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Self::default()
        }
    }

    /// Marks the database as disabled on creation.
    #[must_use]
    pub const fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Adds a database-level configuration setting.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Returns the database name.
    #[must_use]
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Returns whether the database starts disabled.
    #[must_use]
    pub const fn disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the configured settings.
    #[must_use]
    pub const fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }
}

/// Controls how a database handle is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOptions {
    record: DatabaseRecord,
    skip_creating_database: bool,
}

impl DatabaseOptions {
    /// Options for the named database that create it when missing.
    #[must_use]
    pub fn new(database_name: impl Into<String>) -> Self {
        Self::from_record(DatabaseRecord::new(database_name))
    }

    /// Options built from a full database record.
    #[must_use]
    pub const fn from_record(record: DatabaseRecord) -> Self {
        Self {
            record,
            skip_creating_database: false,
        }
    }

    /// Skips the create-if-absent call when the handle is first built.
    #[must_use]
    pub const fn with_skip_creating_database(mut self, skip: bool) -> Self {
        self.skip_creating_database = skip;
        self
    }

    /// Returns the database name.
    #[must_use]
    pub fn database_name(&self) -> &str {
        self.record.database_name()
    }

    /// Returns the record sent to the server on creation.
    #[must_use]
    pub const fn record(&self) -> &DatabaseRecord {
        &self.record
    }

    /// Returns whether creation is skipped.
    #[must_use]
    pub const fn skip_creating_database(&self) -> bool {
        self.skip_creating_database
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serialises_in_pascal_case() {
        let record = DatabaseRecord::new("Northwind").with_setting("Indexing.MapTimeout", "30");
        let rendered = toml::to_string(&record).expect("serialise record");
        assert!(rendered.contains("DatabaseName = \"Northwind\""), "{rendered}");
        assert!(rendered.contains("Disabled = false"), "{rendered}");
        assert!(rendered.contains("Settings"), "{rendered}");
    }

    #[test]
    fn options_default_to_creating_the_database() {
        let options = DatabaseOptions::new("Northwind");
        assert_eq!(options.database_name(), "Northwind");
        assert!(!options.skip_creating_database());
        assert!(
            DatabaseOptions::new("x")
                .with_skip_creating_database(true)
                .skip_creating_database()
        );
    }
}
