//! Defines an enum of the SQL column types that can appear in a schema
//! descriptor, and routines for conversion to and from string.
//!
//! Types are declarative: the engine enforces only column arity on insert,
//! never value/type agreement.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlType {
    Int,
    Varchar,
    Text,
    Date,
    Float,
    Double,
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlType::Int => write!(f, "INT"),
            SqlType::Varchar => write!(f, "VARCHAR"),
            SqlType::Text => write!(f, "TEXT"),
            SqlType::Date => write!(f, "DATE"),
            SqlType::Float => write!(f, "FLOAT"),
            SqlType::Double => write!(f, "DOUBLE"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseSqlTypeError;

impl FromStr for SqlType {
    type Err = ParseSqlTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INT" => Ok(SqlType::Int),
            "VARCHAR" => Ok(SqlType::Varchar),
            "TEXT" => Ok(SqlType::Text),
            "DATE" => Ok(SqlType::Date),
            "FLOAT" => Ok(SqlType::Float),
            "DOUBLE" => Ok(SqlType::Double),
            _ => Err(ParseSqlTypeError),
        }
    }
}

/// One column of a schema descriptor: the column name and its declared type.
pub type ColumnSpec = (String, SqlType);

#[test]
fn test_from_str_roundtrip() {
    for ty in [
        SqlType::Int,
        SqlType::Varchar,
        SqlType::Text,
        SqlType::Date,
        SqlType::Float,
        SqlType::Double,
    ] {
        assert_eq!(SqlType::from_str(&ty.to_string()), Ok(ty));
    }
    assert_eq!(SqlType::from_str("text"), Ok(SqlType::Text));
    assert_eq!(SqlType::from_str("BOGUS"), Err(ParseSqlTypeError));
}

#[test]
fn test_serializes_as_sql_name() {
    assert_eq!(serde_json::to_string(&SqlType::Int).unwrap(), "\"INT\"");
    assert_eq!(
        serde_json::from_str::<SqlType>("\"VARCHAR\"").unwrap(),
        SqlType::Varchar
    );
}
