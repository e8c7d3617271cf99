//! Collection definitions and their per-backend names.
//!
//! Every backend stores the same logical collections. The physical names
//! (file, table, column family) are derived here so the backends never
//! disagree about them.

use std::fmt;

/// A named record collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// API key records, keyed by `key`.
    ApiKeys,
    /// Upstream token records, keyed by `token`.
    Tokens,
    /// Runtime settings, keyed by `name`.
    Settings,
}

impl Collection {
    /// All collections.
    pub const ALL: [Self; 3] = [Self::ApiKeys, Self::Tokens, Self::Settings];

    /// Logical collection name. Also the `RocksDB` column family and SQL table name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ApiKeys => "api_keys",
            Self::Tokens => "tokens",
            Self::Settings => "settings",
        }
    }

    /// The JSON field holding each record's unique identifier.
    #[must_use]
    pub const fn id_field(self) -> &'static str {
        match self {
            Self::ApiKeys => "key",
            Self::Tokens => "token",
            Self::Settings => "name",
        }
    }

    /// File name used by the file backend.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::ApiKeys => "api_keys.json",
            Self::Tokens => "tokens.json",
            Self::Settings => "settings.json",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns all column family names for `RocksDB` initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    Collection::ALL.iter().map(|c| c.name()).collect()
}

/// `CREATE TABLE` statements for the SQL backend.
#[must_use]
pub fn sql_schema() -> String {
    Collection::ALL
        .iter()
        .map(|c| {
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    position INTEGER NOT NULL,
                    id TEXT PRIMARY KEY NOT NULL,
                    body TEXT NOT NULL
                );",
                table = c.name()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
