//! pagedb is the core of a single-node, file-backed relational data
//! engine: a persistent paged btree storage layer, a system catalog
//! bootstrapped on top of it, and a stack-based bytecode virtual machine
//! that executes compiled statements against it.
//!
//! The SQL front end (lexer, parser, code generator) is an external
//! collaborator; its only contract with this crate is a well-formed
//! [`opcode::Program`] and the schema descriptors handed to
//! `CREATE_TABLE`.

// System layers, bottom up:
//
// "pager" - page-granular I/O against one file per table.
pub mod pager;
// "btree" - ordered key->bytes map over the pager, with splits and merges.
pub mod btree;
// "row" - the codec between named-column rows and opaque byte blobs.
pub mod row;
// "sql_type"/"sql_value" - declarative column types and tagged runtime values.
pub mod sql_type;
pub mod sql_value;
// "table" - one named table bound to one .tbl file.
pub mod table;
// "catalog" - the bootstrapped registry of table names, schemas and roots.
pub mod catalog;
// "opcode"/"vm" - the closed instruction set and the interpreter that
// executes it against tables.
pub mod opcode;
pub mod vm;
// "db" - directory lifecycle for a database of tables.
pub mod db;

pub use db::Database;
pub use opcode::{Opcode, Program};
pub use sql_type::{ColumnSpec, SqlType};
pub use sql_value::SqlValue;
pub use vm::{OutputRow, VirtualMachine};
