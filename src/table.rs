//! represents access to one file-backed database table.
//!
//! A table named `t` lives in the file `t.tbl` inside its database
//! directory. The table owns the btree (and through it the pager and file
//! handle) for its whole lifetime; dropping or closing the table releases
//! the file. Values are opaque row blobs; encoding and decoding is the
//! caller's concern.

use std::path::{Path, PathBuf};

use crate::btree::tree::Error;
use crate::btree::{BTree, RowId, Scan};
use crate::pager::PageNum;

pub struct Table {
    table_name: String,
    btree: BTree,
}

impl Table {
    /// The file name for a table: `<name>.tbl`.
    pub fn file_name(table_name: &str) -> String {
        format!("{}.tbl", table_name)
    }

    pub fn path(db_dir: &Path, table_name: &str) -> PathBuf {
        db_dir.join(Self::file_name(table_name))
    }

    /// Opens the table's file inside `db_dir`, creating it (with an empty
    /// root page) if this is a new table.
    pub fn open(db_dir: &Path, table_name: &str) -> Result<Table, Error> {
        let btree = BTree::open(&Self::path(db_dir, table_name))?;
        Ok(Table {
            table_name: table_name.to_string(),
            btree,
        })
    }

    /// Deletes the table's file. The caller is responsible for removing
    /// the catalog entry.
    pub fn remove_file(db_dir: &Path, table_name: &str) -> std::io::Result<()> {
        std::fs::remove_file(Self::path(db_dir, table_name))
    }

    pub fn name(&self) -> &str {
        &self.table_name
    }

    pub fn root_page_num(&self) -> PageNum {
        self.btree.root_page()
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&mut self) -> Result<bool, Error> {
        self.btree.is_empty()
    }

    /// The largest row id in use, or `None` for an empty table.
    pub fn max_row_id(&mut self) -> Result<Option<RowId>, Error> {
        self.btree.max_key()
    }

    /// Inserts (or overwrites) the blob stored under `key`. Returns the
    /// page number of the leaf holding the row, for write-back metadata.
    pub fn insert(&mut self, key: RowId, blob: &[u8]) -> Result<PageNum, Error> {
        self.btree.insert(key, blob)
    }

    pub fn get(&mut self, key: RowId) -> Result<Option<Vec<u8>>, Error> {
        self.btree.search(key)
    }

    /// Rewrites the blob of an existing row in place. `page_hint` is the
    /// leaf recorded when the row was read; a stale hint falls back to a
    /// fresh descent.
    pub fn update_row(
        &mut self,
        page_hint: PageNum,
        key: RowId,
        blob: &[u8],
    ) -> Result<PageNum, Error> {
        self.btree.update_in_leaf(page_hint, key, blob)
    }

    pub fn delete(&mut self, key: RowId) -> Result<bool, Error> {
        self.btree.delete(key)
    }

    /// In-order traversal of every row: `(key, blob, page_number)`.
    pub fn scan(&mut self) -> Scan<'_> {
        self.btree.scan()
    }

    /// Drops every row, resetting the tree to an empty root.
    pub fn clear(&mut self) -> Result<(), Error> {
        self.btree.clear()
    }

    /// Flushes and fsyncs the table file.
    pub fn close(self) -> Result<(), Error> {
        self.btree.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_tbl_file() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::open(dir.path(), "users").expect("Should have opened table.");
        assert_eq!(table.name(), "users");
        assert_eq!(table.root_page_num(), 1);
        assert!(dir.path().join("users.tbl").exists());
    }

    #[test]
    fn test_insert_scan_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::open(dir.path(), "users").unwrap();
        table.insert(2, b"two").unwrap();
        table.insert(1, b"one").unwrap();
        let rows: Vec<(RowId, Vec<u8>)> = table
            .scan()
            .map(|item| item.map(|(k, v, _)| (k, v)).unwrap())
            .collect();
        assert_eq!(rows, vec![(1, b"one".to_vec()), (2, b"two".to_vec())]);
    }

    #[test]
    fn test_reopen_after_close_sees_same_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut table = Table::open(dir.path(), "users").unwrap();
            table.insert(1, b"persisted").unwrap();
            table.close().unwrap();
        }
        let mut table = Table::open(dir.path(), "users").unwrap();
        assert_eq!(table.get(1).unwrap(), Some(b"persisted".to_vec()));
    }

    #[test]
    fn test_remove_file() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::open(dir.path(), "users").unwrap();
        drop(table);
        Table::remove_file(dir.path(), "users").unwrap();
        assert!(!dir.path().join("users.tbl").exists());
    }

    #[test]
    fn test_max_row_id() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::open(dir.path(), "users").unwrap();
        assert_eq!(table.max_row_id().unwrap(), None);
        table.insert(3, b"x").unwrap();
        table.insert(9, b"y").unwrap();
        assert_eq!(table.max_row_id().unwrap(), Some(9));
    }
}
