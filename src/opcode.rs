//! `opcode` defines the closed instruction set executed by the virtual
//! machine.
//!
//! A compiled statement is a finite ordered sequence of opcodes. The set is
//! fixed: the code generator may only emit instructions listed here, and
//! the machine dispatches over this enum directly. Every `LABEL` name must
//! be unique within a stream and every jump target must name a label.
//!
//! As an example, `SELECT name FROM users WHERE age > 30` compiles to:
//!
//! ```text
//! OPEN_TABLE users
//! SCAN_START
//! LABEL loop
//! SCAN_NEXT
//! JUMP_IF_FALSE end
//! LOAD_COLUMN age
//! LOAD_CONST 30
//! COMPARE_GT
//! JUMP_IF_FALSE skip
//! EMIT_ROW [name]
//! LABEL skip
//! JUMP loop
//! LABEL end
//! SCAN_END
//! ```

use itertools::Itertools;

use crate::sql_type::ColumnSpec;
use crate::sql_value::SqlValue;

/// A compiled statement: the opcode stream fed to the virtual machine.
pub type Program = Vec<Opcode>;

#[derive(Debug, Clone, PartialEq)]
pub enum Opcode {
    // Table and schema operations.
    CreateTable {
        table: String,
        columns: Vec<ColumnSpec>,
    },
    DropTable {
        table: String,
    },
    OpenTable {
        table: String,
    },

    // Scanning.
    ScanStart,
    ScanNext,
    ScanEnd,

    // Data manipulation.
    LoadConst(SqlValue),
    LoadColumn(String),
    InsertRow {
        table: String,
    },
    UpdateRow,
    DeleteRow,
    UpdateColumn(String),

    // Control flow.
    Jump(String),
    JumpIfFalse(String),
    Label(String),

    // Logical operations.
    LogicalAnd,
    LogicalOr,
    LogicalNot,

    // Comparisons.
    CompareEq,
    CompareNeq,
    CompareLt,
    CompareLte,
    CompareGt,
    CompareGte,

    // Output.
    EmitRow(Vec<String>),

    Halt,
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Opcode::CreateTable { table, columns } => {
                let cols = columns
                    .iter()
                    .map(|(name, ty)| format!("{} {}", name, ty))
                    .join(", ");
                write!(f, "CREATE_TABLE {} ({})", table, cols)
            }
            Opcode::DropTable { table } => write!(f, "DROP_TABLE {}", table),
            Opcode::OpenTable { table } => write!(f, "OPEN_TABLE {}", table),
            Opcode::ScanStart => write!(f, "SCAN_START"),
            Opcode::ScanNext => write!(f, "SCAN_NEXT"),
            Opcode::ScanEnd => write!(f, "SCAN_END"),
            Opcode::LoadConst(v) => write!(f, "LOAD_CONST {}", v),
            Opcode::LoadColumn(c) => write!(f, "LOAD_COLUMN {}", c),
            Opcode::InsertRow { table } => write!(f, "INSERT_ROW {}", table),
            Opcode::UpdateRow => write!(f, "UPDATE_ROW"),
            Opcode::DeleteRow => write!(f, "DELETE_ROW"),
            Opcode::UpdateColumn(c) => write!(f, "UPDATE_COLUMN {}", c),
            Opcode::Jump(l) => write!(f, "JUMP {}", l),
            Opcode::JumpIfFalse(l) => write!(f, "JUMP_IF_FALSE {}", l),
            Opcode::Label(l) => write!(f, "LABEL {}", l),
            Opcode::LogicalAnd => write!(f, "LOGICAL_AND"),
            Opcode::LogicalOr => write!(f, "LOGICAL_OR"),
            Opcode::LogicalNot => write!(f, "LOGICAL_NOT"),
            Opcode::CompareEq => write!(f, "COMPARE_EQ"),
            Opcode::CompareNeq => write!(f, "COMPARE_NEQ"),
            Opcode::CompareLt => write!(f, "COMPARE_LT"),
            Opcode::CompareLte => write!(f, "COMPARE_LTE"),
            Opcode::CompareGt => write!(f, "COMPARE_GT"),
            Opcode::CompareGte => write!(f, "COMPARE_GTE"),
            Opcode::EmitRow(cols) => write!(f, "EMIT_ROW [{}]", cols.iter().join(", ")),
            Opcode::Halt => write!(f, "HALT"),
        }
    }
}

#[test]
fn test_display_names_match_stream_form() {
    use crate::sql_type::SqlType;
    assert_eq!(Opcode::ScanNext.to_string(), "SCAN_NEXT");
    assert_eq!(
        Opcode::LoadConst(SqlValue::Int(30)).to_string(),
        "LOAD_CONST 30"
    );
    assert_eq!(
        Opcode::EmitRow(vec!["name".into(), "age".into()]).to_string(),
        "EMIT_ROW [name, age]"
    );
    assert_eq!(
        Opcode::CreateTable {
            table: "users".into(),
            columns: vec![("name".into(), SqlType::Text)],
        }
        .to_string(),
        "CREATE_TABLE users (name TEXT)"
    );
}
