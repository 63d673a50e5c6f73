//! vm executes a compiled opcode stream against the file-backed tables of
//! one database directory.
//!
//! The machine is a stack interpreter. Opening a table materializes its
//! rows into an in-memory buffer ordered by key; a cursor walks that
//! buffer, the operand stack evaluates filter expressions, and row
//! mutations are written back through the table's btree. Emitted rows
//! accumulate in the output buffer in emission order.
//!
//! Execution runs to completion or to the first error; there is no retry
//! and no suspension. Whatever happens, the open table is closed before
//! `run` returns.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;

use crate::btree::RowId;
use crate::catalog::Catalog;
use crate::opcode::{Opcode, Program};
use crate::pager::PageNum;
use crate::row::{decode_row, encode_row, Row, ROWID_COLUMN};
use crate::sql_type::ColumnSpec;
use crate::sql_value::SqlValue;
use crate::table::Table;

/// One emitted result row: projected columns in emission order.
pub type OutputRow = Vec<(String, SqlValue)>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("VM: duplicate label '{0}' in opcode stream.")]
    DuplicateLabel(String),
    #[error("VM: jump to unknown label '{0}'.")]
    UnknownLabel(String),
    #[error("VM: {0} needs more operands than the stack holds.")]
    StackUnderflow(&'static str),
    #[error("VM: {0} requires a current row.")]
    NoCurrentRow(&'static str),
    #[error("VM: {0} requires an open table.")]
    NoOpenTable(&'static str),
    #[error("VM: INSERT_ROW targets '{expected}' but table '{actual}' is open.")]
    WrongTableOpen { expected: String, actual: String },
    #[error("VM: unknown table '{0}'.")]
    UnknownTable(String),
    #[error("VM: table '{0}' already exists.")]
    TableAlreadyExists(String),
    #[error("VM: unknown column '{0}'.")]
    UnknownColumn(String),
    #[error("VM: insert into '{table}' needs {expected} values but the stack holds {available}.")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        available: usize,
    },
    #[error("VM: cannot order {left} against {right}.")]
    IncomparableTypes {
        left: &'static str,
        right: &'static str,
    },
    #[error("VM: row id {0} has no write-back metadata.")]
    MissingRowMetadata(RowId),
    #[error("VM: next row id would exceed the 16-bit key space.")]
    RowIdExhausted,
    #[error("VM: {0}")]
    Storage(#[from] crate::btree::tree::Error),
    #[error("VM: {0}")]
    Catalog(#[from] crate::catalog::Error),
    #[error("VM: {0}")]
    Row(#[from] crate::row::Error),
    #[error("VM: {0}")]
    Io(#[from] std::io::Error),
}

fn type_name(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Int(_) => "INT",
        SqlValue::Real(_) => "REAL",
        SqlValue::Text(_) => "TEXT",
        SqlValue::Bool(_) => "BOOL",
    }
}

pub struct VirtualMachine {
    db_dir: PathBuf,
    code: Program,
    /// Label name -> instruction index, built in one pass before execution.
    labels: HashMap<String, usize>,
    ip: usize,
    /// Set by a handler that moved `ip` itself; suppresses the advance.
    jumped: bool,
    /// The operand stack.
    stack: Vec<SqlValue>,
    /// Materialized rows of the open table, ordered by key. Authoritative
    /// for `current_row` mutations until written back.
    rows: Vec<Row>,
    /// Row id -> leaf page holding the row, for targeted write-back.
    row_pages: HashMap<RowId, PageNum>,
    /// Index into `rows`; -1 before the first `SCAN_NEXT`.
    cursor: isize,
    current_row: Option<Row>,
    output: Vec<OutputRow>,
    current_table: Option<Table>,
    /// Mirrors the catalog; filled lazily per table.
    table_schemas: HashMap<String, Vec<ColumnSpec>>,
}

impl VirtualMachine {
    /// Builds a machine for `code`, indexing labels and validating every
    /// jump target up front. Plan-validity errors surface here rather
    /// than mid-execution.
    pub fn new(db_dir: &Path, code: Program) -> Result<VirtualMachine, Error> {
        let mut labels = HashMap::new();
        for (idx, op) in code.iter().enumerate() {
            if let Opcode::Label(name) = op {
                if labels.insert(name.clone(), idx).is_some() {
                    return Err(Error::DuplicateLabel(name.clone()));
                }
            }
        }
        for op in &code {
            if let Opcode::Jump(target) | Opcode::JumpIfFalse(target) = op {
                if !labels.contains_key(target) {
                    return Err(Error::UnknownLabel(target.clone()));
                }
            }
        }
        Ok(VirtualMachine {
            db_dir: db_dir.to_path_buf(),
            code,
            labels,
            ip: 0,
            jumped: false,
            stack: vec![],
            rows: vec![],
            row_pages: HashMap::new(),
            cursor: -1,
            current_row: None,
            output: vec![],
            current_table: None,
            table_schemas: HashMap::new(),
        })
    }

    /// Runs the program to completion or to the first error. The open
    /// table, if any, is closed on every exit path.
    pub fn run(&mut self) -> Result<(), Error> {
        let result = self.execute();
        let close_result = match self.current_table.take() {
            Some(table) => table.close().map_err(Error::from),
            None => Ok(()),
        };
        result?;
        close_result
    }

    /// The emitted result rows, in emission order.
    pub fn output(&self) -> &[OutputRow] {
        &self.output
    }

    pub fn into_output(self) -> Vec<OutputRow> {
        self.output
    }

    fn execute(&mut self) -> Result<(), Error> {
        while self.ip < self.code.len() {
            let op = self.code[self.ip].clone();
            debug!("ip={}: {}", self.ip, op);
            self.jumped = false;
            match op {
                Opcode::CreateTable { table, columns } => self.op_create_table(table, columns)?,
                Opcode::DropTable { table } => self.op_drop_table(&table)?,
                Opcode::OpenTable { table } => self.op_open_table(&table)?,
                Opcode::ScanStart => self.op_scan_start(),
                Opcode::ScanNext => self.op_scan_next(),
                Opcode::ScanEnd => debug!("SCAN_END: table scan complete"),
                Opcode::LoadConst(value) => self.stack.push(value),
                Opcode::LoadColumn(column) => self.op_load_column(&column)?,
                Opcode::InsertRow { table } => self.op_insert_row(table)?,
                Opcode::UpdateRow => self.op_update_row()?,
                Opcode::DeleteRow => self.op_delete_row()?,
                Opcode::UpdateColumn(column) => self.op_update_column(column)?,
                Opcode::Jump(label) => self.jump_to(&label)?,
                Opcode::JumpIfFalse(label) => self.op_jump_if_false(&label)?,
                Opcode::Label(_) => {}
                Opcode::LogicalAnd => self.op_logical_binary("LOGICAL_AND", |l, r| l && r)?,
                Opcode::LogicalOr => self.op_logical_binary("LOGICAL_OR", |l, r| l || r)?,
                Opcode::LogicalNot => self.op_logical_not()?,
                Opcode::CompareEq => self.op_compare_eq("COMPARE_EQ", false)?,
                Opcode::CompareNeq => self.op_compare_eq("COMPARE_NEQ", true)?,
                Opcode::CompareLt => self.op_compare_ordered("COMPARE_LT", |o| o.is_lt())?,
                Opcode::CompareLte => self.op_compare_ordered("COMPARE_LTE", |o| o.is_le())?,
                Opcode::CompareGt => self.op_compare_ordered("COMPARE_GT", |o| o.is_gt())?,
                Opcode::CompareGte => self.op_compare_ordered("COMPARE_GTE", |o| o.is_ge())?,
                Opcode::EmitRow(columns) => self.op_emit_row(&columns)?,
                Opcode::Halt => {
                    self.ip = self.code.len();
                    self.jumped = true;
                }
            }
            if !self.jumped {
                self.ip += 1;
            }
        }
        Ok(())
    }

    fn pop(&mut self, op: &'static str) -> Result<SqlValue, Error> {
        self.stack.pop().ok_or(Error::StackUnderflow(op))
    }

    fn jump_to(&mut self, label: &str) -> Result<(), Error> {
        let target = self
            .labels
            .get(label)
            .ok_or_else(|| Error::UnknownLabel(label.to_string()))?;
        self.ip = *target;
        self.jumped = true;
        Ok(())
    }

    /// Schema lookup: the VM cache first, then the catalog on disk.
    fn schema_of(&mut self, table: &str) -> Result<Vec<ColumnSpec>, Error> {
        if let Some(columns) = self.table_schemas.get(table) {
            return Ok(columns.clone());
        }
        let catalog = Catalog::open(&self.db_dir)?;
        let columns = catalog
            .get_schema(table)
            .cloned()
            .ok_or_else(|| Error::UnknownTable(table.to_string()))?;
        self.table_schemas.insert(table.to_string(), columns.clone());
        Ok(columns)
    }

    fn op_create_table(&mut self, table: String, columns: Vec<ColumnSpec>) -> Result<(), Error> {
        let mut catalog = Catalog::open(&self.db_dir)?;
        if catalog.get_schema(&table).is_some() {
            return Err(Error::TableAlreadyExists(table));
        }
        // Opening materializes the file with its root initialized to page 1.
        let tbl = Table::open(&self.db_dir, &table)?;
        let root_page = tbl.root_page_num();
        tbl.close()?;
        catalog.create_table(&table, &columns, root_page)?;
        self.table_schemas.insert(table, columns);
        Ok(())
    }

    fn op_drop_table(&mut self, table: &str) -> Result<(), Error> {
        let mut catalog = Catalog::open(&self.db_dir)?;
        if catalog.get_schema(table).is_none() {
            return Err(Error::UnknownTable(table.to_string()));
        }
        if self
            .current_table
            .as_ref()
            .is_some_and(|t| t.name() == table)
        {
            if let Some(open) = self.current_table.take() {
                open.close()?;
            }
            self.rows.clear();
            self.row_pages.clear();
            self.current_row = None;
        }
        Table::remove_file(&self.db_dir, table)?;
        self.table_schemas.remove(table);
        catalog.drop_table(table)?;
        Ok(())
    }

    fn op_open_table(&mut self, table: &str) -> Result<(), Error> {
        // At most one table is open at a time.
        if let Some(open) = self.current_table.take() {
            open.close()?;
        }
        self.schema_of(table)?;
        let mut tbl = Table::open(&self.db_dir, table)?;
        let scanned: Vec<(RowId, Vec<u8>, PageNum)> =
            tbl.scan().collect::<Result<_, _>>()?;
        self.rows.clear();
        self.row_pages.clear();
        for (key, blob, page) in scanned {
            let mut row = decode_row(&blob)?;
            row.insert(ROWID_COLUMN.to_string(), SqlValue::Int(key as i64));
            self.row_pages.insert(key, page);
            self.rows.push(row);
        }
        self.cursor = -1;
        self.current_row = None;
        self.current_table = Some(tbl);
        debug!("OPEN_TABLE: loaded '{}' with {} rows", table, self.rows.len());
        Ok(())
    }

    fn op_scan_start(&mut self) {
        self.cursor = -1;
        self.current_row = None;
    }

    fn op_scan_next(&mut self) {
        self.cursor += 1;
        if self.cursor >= 0 && (self.cursor as usize) < self.rows.len() {
            self.current_row = Some(self.rows[self.cursor as usize].clone());
            self.stack.push(SqlValue::Bool(true));
        } else {
            self.current_row = None;
            self.stack.push(SqlValue::Bool(false));
        }
    }

    fn op_load_column(&mut self, column: &str) -> Result<(), Error> {
        let row = self
            .current_row
            .as_ref()
            .ok_or(Error::NoCurrentRow("LOAD_COLUMN"))?;
        let value = row
            .get(column)
            .cloned()
            .ok_or_else(|| Error::UnknownColumn(column.to_string()))?;
        self.stack.push(value);
        Ok(())
    }

    fn op_jump_if_false(&mut self, label: &str) -> Result<(), Error> {
        let condition = self.pop("JUMP_IF_FALSE")?;
        if !condition.is_truthy() {
            self.jump_to(label)?;
        }
        Ok(())
    }

    fn op_logical_binary(
        &mut self,
        name: &'static str,
        f: fn(bool, bool) -> bool,
    ) -> Result<(), Error> {
        let right = self.pop(name)?;
        let left = self.pop(name)?;
        self.stack
            .push(SqlValue::Bool(f(left.is_truthy(), right.is_truthy())));
        Ok(())
    }

    fn op_logical_not(&mut self) -> Result<(), Error> {
        let value = self.pop("LOGICAL_NOT")?;
        self.stack.push(SqlValue::Bool(!value.is_truthy()));
        Ok(())
    }

    /// Equality accepts any pair of values; `Int` and `Real` compare
    /// numerically, otherwise differing variants are simply unequal.
    fn op_compare_eq(&mut self, name: &'static str, negate: bool) -> Result<(), Error> {
        let right = self.pop(name)?;
        let left = self.pop(name)?;
        let equal = match (left.as_number(), right.as_number()) {
            (Some(l), Some(r)) => l == r,
            _ => left == right,
        };
        self.stack.push(SqlValue::Bool(equal != negate));
        Ok(())
    }

    /// Ordered comparisons require both operands numeric or both strings.
    fn op_compare_ordered(
        &mut self,
        name: &'static str,
        f: fn(std::cmp::Ordering) -> bool,
    ) -> Result<(), Error> {
        let right = self.pop(name)?;
        let left = self.pop(name)?;
        let ordering = match (left.as_number(), right.as_number()) {
            (Some(l), Some(r)) => l.partial_cmp(&r),
            _ => match (&left, &right) {
                (SqlValue::Text(l), SqlValue::Text(r)) => Some(l.cmp(r)),
                _ => None,
            },
        };
        let ordering = ordering.ok_or_else(|| Error::IncomparableTypes {
            left: type_name(&left),
            right: type_name(&right),
        })?;
        self.stack.push(SqlValue::Bool(f(ordering)));
        Ok(())
    }

    fn op_emit_row(&mut self, columns: &[String]) -> Result<(), Error> {
        let row = self
            .current_row
            .as_ref()
            .ok_or(Error::NoCurrentRow("EMIT_ROW"))?;
        let names: Vec<String> = if columns.len() == 1 && columns[0] == "*" {
            // All columns except the synthetic rowid, in schema order.
            let table = self
                .current_table
                .as_ref()
                .ok_or(Error::NoOpenTable("EMIT_ROW"))?;
            let schema = self
                .table_schemas
                .get(table.name())
                .ok_or_else(|| Error::UnknownTable(table.name().to_string()))?;
            schema.iter().map(|(name, _)| name.clone()).collect()
        } else {
            columns.to_vec()
        };
        let mut projected = OutputRow::with_capacity(names.len());
        for name in names {
            let value = row
                .get(&name)
                .cloned()
                .ok_or_else(|| Error::UnknownColumn(name.clone()))?;
            projected.push((name, value));
        }
        self.output.push(projected);
        Ok(())
    }

    fn next_row_id(&mut self) -> Result<RowId, Error> {
        let in_memory = self.row_pages.keys().max().copied();
        let on_disk = match self.current_table.as_mut() {
            Some(table) => table.max_row_id()?,
            None => None,
        };
        match in_memory.into_iter().chain(on_disk).max() {
            None => Ok(1),
            Some(RowId::MAX) => Err(Error::RowIdExhausted),
            Some(max) => Ok(max + 1),
        }
    }

    fn op_insert_row(&mut self, table: String) -> Result<(), Error> {
        match self.current_table.as_ref().map(|t| t.name().to_string()) {
            None => return Err(Error::NoOpenTable("INSERT_ROW")),
            Some(actual) if actual != table => {
                return Err(Error::WrongTableOpen {
                    expected: table,
                    actual,
                })
            }
            Some(_) => {}
        }
        let columns = self.schema_of(&table)?;
        if self.stack.len() < columns.len() {
            return Err(Error::ColumnCountMismatch {
                table,
                expected: columns.len(),
                available: self.stack.len(),
            });
        }
        // Values were pushed in column order, so they pop in reverse.
        let mut row = Row::new();
        for (name, _) in columns.iter().rev() {
            let value = self.pop("INSERT_ROW")?;
            row.insert(name.clone(), value);
        }
        let key = self.next_row_id()?;
        let blob = encode_row(&row)?;
        let tbl = self
            .current_table
            .as_mut()
            .ok_or(Error::NoOpenTable("INSERT_ROW"))?;
        let page = tbl.insert(key, &blob)?;
        self.row_pages.insert(key, page);
        row.insert(ROWID_COLUMN.to_string(), SqlValue::Int(key as i64));
        self.rows.push(row);
        debug!("INSERT_ROW: inserted row id {} into '{}'", key, table);
        Ok(())
    }

    fn op_update_column(&mut self, column: String) -> Result<(), Error> {
        let value = self.pop("UPDATE_COLUMN")?;
        let row = self
            .current_row
            .as_mut()
            .ok_or(Error::NoCurrentRow("UPDATE_COLUMN"))?;
        row.insert(column, value);
        Ok(())
    }

    fn current_row_id(row: &Row, op: &'static str) -> Result<RowId, Error> {
        let id = row
            .get(ROWID_COLUMN)
            .and_then(|v| v.as_int().copied())
            .ok_or(Error::NoCurrentRow(op))?;
        RowId::try_from(id).map_err(|_| Error::RowIdExhausted)
    }

    fn op_update_row(&mut self) -> Result<(), Error> {
        let row = self
            .current_row
            .as_ref()
            .cloned()
            .ok_or(Error::NoCurrentRow("UPDATE_ROW"))?;
        let key = Self::current_row_id(&row, "UPDATE_ROW")?;
        let mut stored = row.clone();
        stored.remove(ROWID_COLUMN);
        let blob = encode_row(&stored)?;
        let page_hint = self
            .row_pages
            .get(&key)
            .copied()
            .ok_or(Error::MissingRowMetadata(key))?;
        let tbl = self
            .current_table
            .as_mut()
            .ok_or(Error::NoOpenTable("UPDATE_ROW"))?;
        let page = tbl.update_row(page_hint, key, &blob)?;
        self.row_pages.insert(key, page);
        // Mirror the write into the materialized view.
        if self.cursor >= 0 {
            if let Some(slot) = self.rows.get_mut(self.cursor as usize) {
                *slot = row;
            }
        }
        debug!("UPDATE_ROW: rewrote row id {}", key);
        Ok(())
    }

    fn op_delete_row(&mut self) -> Result<(), Error> {
        let row = self
            .current_row
            .as_ref()
            .ok_or(Error::NoCurrentRow("DELETE_ROW"))?;
        let key = Self::current_row_id(row, "DELETE_ROW")?;
        if self.cursor < 0 || self.cursor as usize >= self.rows.len() {
            return Err(Error::NoCurrentRow("DELETE_ROW"));
        }
        let tbl = self
            .current_table
            .as_mut()
            .ok_or(Error::NoOpenTable("DELETE_ROW"))?;
        tbl.delete(key)?;
        self.row_pages.remove(&key);
        self.rows.remove(self.cursor as usize);
        // Step back so the next SCAN_NEXT visits the row that slid into
        // this position.
        self.cursor -= 1;
        self.current_row = None;
        debug!("DELETE_ROW: removed row id {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_type::SqlType;

    fn run_program(dir: &Path, code: Program) -> Result<Vec<OutputRow>, Error> {
        let mut vm = VirtualMachine::new(dir, code)?;
        vm.run()?;
        Ok(vm.into_output())
    }

    #[test]
    fn test_duplicate_label_rejected_at_indexing() {
        let dir = tempfile::tempdir().unwrap();
        let code = vec![
            Opcode::Label("a".into()),
            Opcode::Label("a".into()),
        ];
        assert!(matches!(
            VirtualMachine::new(dir.path(), code),
            Err(Error::DuplicateLabel(_))
        ));
    }

    #[test]
    fn test_unknown_jump_target_rejected_at_indexing() {
        let dir = tempfile::tempdir().unwrap();
        let code = vec![Opcode::Jump("nowhere".into())];
        assert!(matches!(
            VirtualMachine::new(dir.path(), code),
            Err(Error::UnknownLabel(_))
        ));
    }

    #[test]
    fn test_compare_pops_right_then_left() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = VirtualMachine::new(
            dir.path(),
            vec![
                Opcode::LoadConst(SqlValue::Int(1)),
                Opcode::LoadConst(SqlValue::Int(2)),
                Opcode::CompareLt,
            ],
        )
        .unwrap();
        vm.run().unwrap();
        assert_eq!(vm.stack, vec![SqlValue::Bool(true)]);
    }

    #[test]
    fn test_mixed_numeric_comparison_widens() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = VirtualMachine::new(
            dir.path(),
            vec![
                Opcode::LoadConst(SqlValue::Int(2)),
                Opcode::LoadConst(SqlValue::Real(2.0)),
                Opcode::CompareEq,
            ],
        )
        .unwrap();
        vm.run().unwrap();
        assert_eq!(vm.stack, vec![SqlValue::Bool(true)]);
    }

    #[test]
    fn test_ordered_comparison_of_mismatched_types_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let code = vec![
            Opcode::LoadConst(SqlValue::Int(1)),
            Opcode::LoadConst(SqlValue::Text("x".into())),
            Opcode::CompareLt,
        ];
        let mut vm = VirtualMachine::new(dir.path(), code).unwrap();
        assert!(matches!(
            vm.run(),
            Err(Error::IncomparableTypes {
                left: "INT",
                right: "TEXT"
            })
        ));
    }

    #[test]
    fn test_equality_across_types_is_false_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = VirtualMachine::new(
            dir.path(),
            vec![
                Opcode::LoadConst(SqlValue::Int(1)),
                Opcode::LoadConst(SqlValue::Text("1".into())),
                Opcode::CompareNeq,
            ],
        )
        .unwrap();
        vm.run().unwrap();
        assert_eq!(vm.stack, vec![SqlValue::Bool(true)]);
    }

    #[test]
    fn test_stack_underflow_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = VirtualMachine::new(dir.path(), vec![Opcode::CompareEq]).unwrap();
        assert!(matches!(
            vm.run(),
            Err(Error::StackUnderflow("COMPARE_EQ"))
        ));
    }

    #[test]
    fn test_logical_ops_use_truthiness() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = VirtualMachine::new(
            dir.path(),
            vec![
                Opcode::LoadConst(SqlValue::Int(7)),
                Opcode::LoadConst(SqlValue::Text("".into())),
                Opcode::LogicalOr,
                Opcode::LogicalNot,
            ],
        )
        .unwrap();
        vm.run().unwrap();
        assert_eq!(vm.stack, vec![SqlValue::Bool(false)]);
    }

    #[test]
    fn test_halt_stops_execution() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = VirtualMachine::new(
            dir.path(),
            vec![
                Opcode::LoadConst(SqlValue::Int(1)),
                Opcode::Halt,
                Opcode::LoadConst(SqlValue::Int(2)),
            ],
        )
        .unwrap();
        vm.run().unwrap();
        assert_eq!(vm.stack, vec![SqlValue::Int(1)]);
    }

    #[test]
    fn test_jump_if_false_pops_condition_and_jumps() {
        let dir = tempfile::tempdir().unwrap();
        let mut vm = VirtualMachine::new(
            dir.path(),
            vec![
                Opcode::LoadConst(SqlValue::Bool(false)),
                Opcode::JumpIfFalse("end".into()),
                Opcode::LoadConst(SqlValue::Int(99)),
                Opcode::Label("end".into()),
            ],
        )
        .unwrap();
        vm.run().unwrap();
        assert!(vm.stack.is_empty());
    }

    #[test]
    fn test_open_unknown_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let code = vec![Opcode::OpenTable {
            table: "missing".into(),
        }];
        let mut vm = VirtualMachine::new(dir.path(), code).unwrap();
        assert!(matches!(vm.run(), Err(Error::UnknownTable(_))));
    }

    #[test]
    fn test_create_insert_and_rowid_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let code = vec![
            Opcode::CreateTable {
                table: "users".into(),
                columns: vec![
                    ("name".into(), SqlType::Text),
                    ("age".into(), SqlType::Int),
                ],
            },
            Opcode::OpenTable {
                table: "users".into(),
            },
            Opcode::LoadConst(SqlValue::Text("Alice".into())),
            Opcode::LoadConst(SqlValue::Int(35)),
            Opcode::InsertRow {
                table: "users".into(),
            },
            Opcode::LoadConst(SqlValue::Text("Bob".into())),
            Opcode::LoadConst(SqlValue::Int(25)),
            Opcode::InsertRow {
                table: "users".into(),
            },
        ];
        run_program(dir.path(), code).unwrap();

        // Reopen and check rowids were assigned sequentially.
        let select = vec![
            Opcode::OpenTable {
                table: "users".into(),
            },
            Opcode::ScanStart,
            Opcode::Label("loop".into()),
            Opcode::ScanNext,
            Opcode::JumpIfFalse("end".into()),
            Opcode::EmitRow(vec!["rowid".into(), "name".into()]),
            Opcode::Jump("loop".into()),
            Opcode::Label("end".into()),
            Opcode::ScanEnd,
        ];
        let output = run_program(dir.path(), select).unwrap();
        assert_eq!(
            output,
            vec![
                vec![
                    ("rowid".to_string(), SqlValue::Int(1)),
                    ("name".to_string(), SqlValue::Text("Alice".into())),
                ],
                vec![
                    ("rowid".to_string(), SqlValue::Int(2)),
                    ("name".to_string(), SqlValue::Text("Bob".into())),
                ],
            ]
        );
    }

    #[test]
    fn test_insert_with_too_few_values_fails() {
        let dir = tempfile::tempdir().unwrap();
        let code = vec![
            Opcode::CreateTable {
                table: "users".into(),
                columns: vec![
                    ("name".into(), SqlType::Text),
                    ("age".into(), SqlType::Int),
                ],
            },
            Opcode::OpenTable {
                table: "users".into(),
            },
            Opcode::LoadConst(SqlValue::Text("only-one".into())),
            Opcode::InsertRow {
                table: "users".into(),
            },
        ];
        let mut vm = VirtualMachine::new(dir.path(), code).unwrap();
        assert!(matches!(
            vm.run(),
            Err(Error::ColumnCountMismatch {
                expected: 2,
                available: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_insert_requires_matching_open_table() {
        let dir = tempfile::tempdir().unwrap();
        let code = vec![
            Opcode::CreateTable {
                table: "users".into(),
                columns: vec![("name".into(), SqlType::Text)],
            },
            Opcode::CreateTable {
                table: "orders".into(),
                columns: vec![("amount".into(), SqlType::Float)],
            },
            Opcode::OpenTable {
                table: "users".into(),
            },
            Opcode::LoadConst(SqlValue::Real(9.5)),
            Opcode::InsertRow {
                table: "orders".into(),
            },
        ];
        let mut vm = VirtualMachine::new(dir.path(), code).unwrap();
        assert!(matches!(vm.run(), Err(Error::WrongTableOpen { .. })));
    }

    #[test]
    fn test_create_existing_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let make = || Opcode::CreateTable {
            table: "users".into(),
            columns: vec![("name".into(), SqlType::Text)],
        };
        run_program(dir.path(), vec![make()]).unwrap();
        let mut vm = VirtualMachine::new(dir.path(), vec![make()]).unwrap();
        assert!(matches!(vm.run(), Err(Error::TableAlreadyExists(_))));
    }
}
