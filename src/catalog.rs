//! catalog maintains the distinguished `__catalog` table that maps every
//! table name to its schema descriptor and root page.
//!
//! The catalog is itself an ordinary btree table in `__catalog.tbl`, one
//! record per table. It bootstraps itself: on first open, when its only
//! page is empty, it inserts its own schema at key 1. Schema lookups are
//! served from an in-memory cache refreshed by `load`; every mutation
//! opens, rewrites and closes the underlying table, then reloads the
//! cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, info};

use crate::btree::RowId;
use crate::pager::PageNum;
use crate::row::{decode_row, encode_row, Row};
use crate::sql_type::{ColumnSpec, SqlType};
use crate::sql_value::SqlValue;
use crate::table::Table;

pub const CATALOG_TABLE_NAME: &str = "__catalog";

/// The catalog's own schema: `{table_name, root_page, columns}`, where
/// `columns` holds the described table's schema descriptor as JSON text.
pub fn catalog_schema() -> Vec<ColumnSpec> {
    vec![
        ("table_name".to_string(), SqlType::Text),
        ("root_page".to_string(), SqlType::Int),
        ("columns".to_string(), SqlType::Text),
    ]
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Catalog: {0}")]
    Storage(#[from] crate::btree::tree::Error),
    #[error("Catalog: {0}")]
    Row(#[from] crate::row::Error),
    #[error("Catalog: malformed schema descriptor: {0}")]
    MalformedColumns(#[from] serde_json::Error),
    #[error("Catalog: record is missing or has a mistyped '{0}' field.")]
    MalformedRecord(&'static str),
    #[error("Catalog: refusing to register table '{0}' with root page 0.")]
    RootPageZero(String),
}

pub struct Catalog {
    db_dir: PathBuf,
    /// table name -> schema descriptor, populated by `load`.
    table_schemas: HashMap<String, Vec<ColumnSpec>>,
}

impl Catalog {
    /// Opens (bootstrapping if needed) the catalog of the database rooted
    /// at `db_dir` and loads the schema cache.
    pub fn open(db_dir: &Path) -> Result<Catalog, Error> {
        let mut catalog = Catalog {
            db_dir: db_dir.to_path_buf(),
            table_schemas: HashMap::new(),
        };
        catalog.ensure_bootstrap()?;
        catalog.load()?;
        Ok(catalog)
    }

    /// Inserts the catalog's self-describing record at key 1 when the
    /// catalog's root page is still empty.
    fn ensure_bootstrap(&self) -> Result<(), Error> {
        let mut tbl = Table::open(&self.db_dir, CATALOG_TABLE_NAME)?;
        if tbl.root_page_num() == 1 && tbl.is_empty()? {
            let record = Self::record(CATALOG_TABLE_NAME, 1, &catalog_schema())?;
            tbl.insert(1, &encode_row(&record)?)?;
            info!("bootstrapped {}", CATALOG_TABLE_NAME);
        }
        tbl.close()?;
        Ok(())
    }

    fn record(table_name: &str, root_page: PageNum, columns: &[ColumnSpec]) -> Result<Row, Error> {
        let mut row = Row::new();
        row.insert(
            "table_name".to_string(),
            SqlValue::Text(table_name.to_string()),
        );
        row.insert("root_page".to_string(), SqlValue::Int(root_page as i64));
        row.insert(
            "columns".to_string(),
            SqlValue::Text(serde_json::to_string(columns)?),
        );
        Ok(row)
    }

    fn record_table_name(record: &Row) -> Result<&str, Error> {
        record
            .get("table_name")
            .and_then(|v| v.as_text())
            .map(|s| s.as_str())
            .ok_or(Error::MalformedRecord("table_name"))
    }

    /// Rebuilds the in-memory schema cache from the catalog table.
    pub fn load(&mut self) -> Result<(), Error> {
        self.table_schemas.clear();
        let mut tbl = Table::open(&self.db_dir, CATALOG_TABLE_NAME)?;
        let blobs: Vec<Vec<u8>> = tbl
            .scan()
            .map(|item| item.map(|(_, blob, _)| blob))
            .collect::<Result<_, _>>()?;
        tbl.close()?;
        for blob in blobs {
            let record = decode_row(&blob)?;
            let table_name = Self::record_table_name(&record)?.to_string();
            let columns_json = record
                .get("columns")
                .and_then(|v| v.as_text())
                .ok_or(Error::MalformedRecord("columns"))?;
            let columns: Vec<ColumnSpec> = serde_json::from_str(columns_json)?;
            self.table_schemas.insert(table_name, columns);
        }
        debug!("loaded {} schemas from catalog", self.table_schemas.len());
        Ok(())
    }

    /// Registers a table under the next unused key and reloads the cache.
    pub fn create_table(
        &mut self,
        table_name: &str,
        columns: &[ColumnSpec],
        root_page: PageNum,
    ) -> Result<(), Error> {
        if root_page == 0 {
            return Err(Error::RootPageZero(table_name.to_string()));
        }
        let mut tbl = Table::open(&self.db_dir, CATALOG_TABLE_NAME)?;
        let next_key = tbl.max_row_id()?.unwrap_or(0) + 1;
        let record = Self::record(table_name, root_page, columns)?;
        tbl.insert(next_key, &encode_row(&record)?)?;
        tbl.close()?;
        self.load()?;
        info!("registered table '{}' in catalog", table_name);
        Ok(())
    }

    /// Removes a table's record by rewriting the catalog without it:
    /// survivors are reinserted under fresh sequential keys starting at 1.
    pub fn drop_table(&mut self, table_name: &str) -> Result<(), Error> {
        let mut tbl = Table::open(&self.db_dir, CATALOG_TABLE_NAME)?;
        let blobs: Vec<Vec<u8>> = tbl
            .scan()
            .map(|item| item.map(|(_, blob, _)| blob))
            .collect::<Result<_, _>>()?;
        let mut survivors: Vec<Vec<u8>> = vec![];
        for blob in blobs {
            let record = decode_row(&blob)?;
            if Self::record_table_name(&record)? != table_name {
                survivors.push(blob);
            }
        }
        tbl.clear()?;
        for (idx, blob) in survivors.iter().enumerate() {
            tbl.insert(idx as RowId + 1, blob)?;
        }
        tbl.close()?;
        self.load()?;
        info!("removed table '{}' from catalog", table_name);
        Ok(())
    }

    /// Schema lookup from the in-memory cache.
    pub fn get_schema(&self, table_name: &str) -> Option<&Vec<ColumnSpec>> {
        self.table_schemas.get(table_name)
    }

    /// Names of the user tables (the catalog's own record is excluded),
    /// sorted for stable listings.
    pub fn user_table_names(&self) -> Vec<String> {
        self.table_schemas
            .keys()
            .filter(|name| name.as_str() != CATALOG_TABLE_NAME)
            .cloned()
            .sorted()
            .collect()
    }
}
