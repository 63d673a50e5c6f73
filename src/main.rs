// Demo driver: exercises the engine end to end with a hand-assembled
// program, the same shape the SQL code generator emits. The real front end
// (tokenizer, parser, codegen, shell) lives outside this crate and only
// hands us opcode streams.

use anyhow::Result;
use itertools::Itertools;

use pagedb::opcode::Opcode;
use pagedb::sql_type::SqlType;
use pagedb::sql_value::SqlValue;
use pagedb::{Database, OutputRow};

fn print_rows(rows: &[OutputRow]) {
    for row in rows {
        println!(
            "   | {} |",
            row.iter()
                .map(|(name, value)| format!("{}: {:10}", name, value.to_string()))
                .join(" | ")
        );
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./demo_db".to_string());
    let dir = std::path::PathBuf::from(dir);
    let db = if dir.is_dir() {
        Database::open(&dir)?
    } else {
        Database::create(&dir)?
    };

    // CREATE TABLE users (name TEXT, age INT), unless a previous run did.
    if !db.tables()?.iter().any(|t| t.as_str() == "users") {
        db.run(vec![Opcode::CreateTable {
            table: "users".to_string(),
            columns: vec![
                ("name".to_string(), SqlType::Text),
                ("age".to_string(), SqlType::Int),
            ],
        }])?;

        // INSERT INTO users VALUES ("Alice", 35), ("Bob", 25), ("Charlie", 40).
        let mut insert = vec![Opcode::OpenTable {
            table: "users".to_string(),
        }];
        for (name, age) in [("Alice", 35), ("Bob", 25), ("Charlie", 40)] {
            insert.push(Opcode::LoadConst(SqlValue::Text(name.to_string())));
            insert.push(Opcode::LoadConst(SqlValue::Int(age)));
            insert.push(Opcode::InsertRow {
                table: "users".to_string(),
            });
        }
        db.run(insert)?;
    }

    // SELECT name, age FROM users WHERE age > 30.
    let select = vec![
        Opcode::OpenTable {
            table: "users".to_string(),
        },
        Opcode::ScanStart,
        Opcode::Label("loop".to_string()),
        Opcode::ScanNext,
        Opcode::JumpIfFalse("end".to_string()),
        Opcode::LoadColumn("age".to_string()),
        Opcode::LoadConst(SqlValue::Int(30)),
        Opcode::CompareGt,
        Opcode::JumpIfFalse("skip".to_string()),
        Opcode::EmitRow(vec!["name".to_string(), "age".to_string()]),
        Opcode::Label("skip".to_string()),
        Opcode::Jump("loop".to_string()),
        Opcode::Label("end".to_string()),
        Opcode::ScanEnd,
    ];
    let rows = db.run(select)?;

    println!("users with age > 30:");
    print_rows(&rows);
    Ok(())
}
