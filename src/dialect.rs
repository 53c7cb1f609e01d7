use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Dialect hint. Only affects lexing details; the grammar is shared.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Dialect {
    #[default]
    Ansi,
    Postgres,
    Tsql,
    Bigquery,
    Mysql,
    Snowflake,
    Hive,
}

impl Dialect {
    /// `#` starts a line comment instead of a temp-table name.
    pub fn hash_comments(&self) -> bool {
        matches!(self, Dialect::Bigquery | Dialect::Mysql)
    }

    /// `"..."` is a string literal instead of a quoted identifier.
    pub fn double_quoted_strings(&self) -> bool {
        matches!(self, Dialect::Bigquery | Dialect::Mysql | Dialect::Hive)
    }

    pub fn bracket_identifiers(&self) -> bool {
        matches!(self, Dialect::Tsql)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn parses_dialect_names_case_insensitively() {
        assert_eq!(Dialect::from_str("TSQL").ok(), Some(Dialect::Tsql));
        assert_eq!(Dialect::from_str("postgres").ok(), Some(Dialect::Postgres));
        assert!(Dialect::from_str("cobol").is_err());
        assert_eq!(Dialect::default().to_string(), "ansi");
    }
}
