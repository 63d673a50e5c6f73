//! row encodes and decodes table rows to and from the opaque byte blobs
//! stored as btree values.
//!
//! The blob form is a UTF-8 JSON object mapping column names to tagged
//! values, e.g. `{"age":{"Int":35},"name":{"Text":"Alice"}}`. The tags make
//! the codec self-describing: decoding restores the exact value variants
//! without consulting the schema. The btree never looks inside a blob.

use std::collections::BTreeMap;

use crate::sql_value::SqlValue;

/// A row is a mapping from column name to value. Column ordering for
/// output purposes comes from the schema descriptor, not from the map.
pub type Row = BTreeMap<String, SqlValue>;

/// The synthetic column carrying the btree key when a row is materialized.
/// It is never stored inside the blob.
pub const ROWID_COLUMN: &str = "rowid";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Row codec: cannot decode an empty or whitespace-only blob.")]
    EmptyBlob,
    #[error("Row codec: malformed row blob: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn encode_row(row: &Row) -> Result<Vec<u8>, Error> {
    Ok(serde_json::to_vec(row)?)
}

pub fn decode_row(blob: &[u8]) -> Result<Row, Error> {
    if blob.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(Error::EmptyBlob);
    }
    Ok(serde_json::from_slice(blob)?)
}

#[cfg(test)]
fn sample_row() -> Row {
    Row::from([
        ("name".to_string(), SqlValue::Text("Alice".to_string())),
        ("age".to_string(), SqlValue::Int(35)),
        ("score".to_string(), SqlValue::Real(7.25)),
    ])
}

#[test]
fn test_roundtrip_all_scalar_types() {
    let row = sample_row();
    let blob = encode_row(&row).expect("Should have encoded row.");
    let back = decode_row(&blob).expect("Should have decoded row.");
    assert_eq!(back, row);
}

#[test]
fn test_blob_is_tagged_json_text() {
    let row = Row::from([("age".to_string(), SqlValue::Int(35))]);
    let blob = encode_row(&row).unwrap();
    assert_eq!(std::str::from_utf8(&blob).unwrap(), r#"{"age":{"Int":35}}"#);
}

#[test]
fn test_decode_rejects_empty_blob() {
    assert!(matches!(decode_row(b""), Err(Error::EmptyBlob)));
}

#[test]
fn test_decode_rejects_whitespace_blob() {
    assert!(matches!(decode_row(b"  \n\t "), Err(Error::EmptyBlob)));
}

#[test]
fn test_decode_rejects_malformed_blob() {
    assert!(matches!(decode_row(b"{nope"), Err(Error::Malformed(_))));
}
