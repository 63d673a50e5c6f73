//! db manages database directories.
//!
//! A database is a directory holding `__catalog.tbl` plus one `.tbl` file
//! per user table. This module owns the directory lifecycle and offers a
//! convenience entry point for running compiled programs against a
//! database; everything else goes through the catalog and the virtual
//! machine.

use std::path::{Path, PathBuf};

use log::info;

use crate::catalog::Catalog;
use crate::opcode::Program;
use crate::vm::{OutputRow, VirtualMachine};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Database: directory '{0}' already exists.")]
    AlreadyExists(PathBuf),
    #[error("Database: directory '{0}' does not exist.")]
    NotFound(PathBuf),
    #[error("Database: {0}")]
    Catalog(#[from] crate::catalog::Error),
    #[error("Database: {0}")]
    Execution(#[from] crate::vm::Error),
    #[error("Database: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Database {
    dir: PathBuf,
}

impl Database {
    /// Creates a new database directory and bootstraps its catalog.
    /// Refuses a directory that already exists.
    pub fn create(dir: &Path) -> Result<Database, Error> {
        if dir.exists() {
            return Err(Error::AlreadyExists(dir.to_path_buf()));
        }
        std::fs::create_dir_all(dir)?;
        Catalog::open(dir)?;
        info!("created database at {}", dir.display());
        Ok(Database {
            dir: dir.to_path_buf(),
        })
    }

    /// Opens an existing database directory, bootstrapping the catalog if
    /// it is missing.
    pub fn open(dir: &Path) -> Result<Database, Error> {
        if !dir.is_dir() {
            return Err(Error::NotFound(dir.to_path_buf()));
        }
        Catalog::open(dir)?;
        Ok(Database {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of the user tables registered in the catalog, sorted.
    pub fn tables(&self) -> Result<Vec<String>, Error> {
        let catalog = Catalog::open(&self.dir)?;
        Ok(catalog.user_table_names())
    }

    /// Executes one compiled statement and returns the rows it emitted.
    pub fn run(&self, program: Program) -> Result<Vec<OutputRow>, Error> {
        let mut vm = VirtualMachine::new(&self.dir, program)?;
        vm.run()?;
        Ok(vm.into_output())
    }

    /// Removes the database directory and every table in it.
    pub fn destroy(self) -> Result<(), Error> {
        std::fs::remove_dir_all(&self.dir)?;
        info!("destroyed database at {}", self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;
    use crate::sql_type::SqlType;

    #[test]
    fn test_create_bootstraps_catalog_file() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("mydb");
        let db = Database::create(&dir).expect("Should have created database.");
        assert!(dir.join("__catalog.tbl").exists());
        assert_eq!(db.tables().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_create_refuses_existing_directory() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("mydb");
        Database::create(&dir).unwrap();
        assert!(matches!(
            Database::create(&dir),
            Err(Error::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_open_requires_directory() {
        let parent = tempfile::tempdir().unwrap();
        assert!(matches!(
            Database::open(&parent.path().join("absent")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_tables_lists_created_tables() {
        let parent = tempfile::tempdir().unwrap();
        let db = Database::create(&parent.path().join("mydb")).unwrap();
        db.run(vec![Opcode::CreateTable {
            table: "users".into(),
            columns: vec![("name".into(), SqlType::Text)],
        }])
        .unwrap();
        db.run(vec![Opcode::CreateTable {
            table: "orders".into(),
            columns: vec![("amount".into(), SqlType::Double)],
        }])
        .unwrap();
        assert_eq!(
            db.tables().unwrap(),
            vec!["orders".to_string(), "users".to_string()]
        );
    }

    #[test]
    fn test_destroy_removes_directory() {
        let parent = tempfile::tempdir().unwrap();
        let dir = parent.path().join("mydb");
        let db = Database::create(&dir).unwrap();
        db.destroy().unwrap();
        assert!(!dir.exists());
    }
}
