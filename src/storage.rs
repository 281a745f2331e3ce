use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

use crate::transport::ImageRecord;

/// Local store of image metadata records, keyed by file name.
pub trait MetadataStore {
    /// Insert the record, replacing any row with the same file name.
    fn upsert(&mut self, record: &ImageRecord) -> Result<()>;

    fn get(&self, file_name: &str) -> Result<Option<ImageRecord>>;

    /// All records, oldest file name first.
    fn list(&self) -> Result<Vec<ImageRecord>>;
}

pub struct SqliteMetadataStore {
    conn: Connection,
}

impl SqliteMetadataStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| anyhow!("failed to open metadata db {}: {}", db_path, e))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS image_records (
              file_name TEXT PRIMARY KEY,
              partition_key TEXT NOT NULL,
              category TEXT NOT NULL,
              description TEXT NOT NULL,
              image_url TEXT NOT NULL,
              ts TEXT NOT NULL,
              count INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_image_records_ts ON image_records(ts);
            "#,
        )?;
        Ok(())
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    let file_name: String = row.get(0)?;
    Ok(ImageRecord {
        partition_key: row.get(1)?,
        row_key: file_name.clone(),
        category: row.get(2)?,
        description: row.get(3)?,
        image_url: row.get(4)?,
        timestamp: row.get(5)?,
        count: row.get(6)?,
        file_name,
    })
}

const SELECT_COLUMNS: &str =
    "SELECT file_name, partition_key, category, description, image_url, ts, count FROM image_records";

impl MetadataStore for SqliteMetadataStore {
    fn upsert(&mut self, record: &ImageRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO image_records(file_name, partition_key, category, description, image_url, ts, count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(file_name) DO UPDATE SET
              partition_key = excluded.partition_key,
              category = excluded.category,
              description = excluded.description,
              image_url = excluded.image_url,
              ts = excluded.ts,
              count = excluded.count
            "#,
            params![
                record.file_name,
                record.partition_key,
                record.category,
                record.description,
                record.image_url,
                record.timestamp,
                record.count
            ],
        )?;
        Ok(())
    }

    fn get(&self, file_name: &str) -> Result<Option<ImageRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} WHERE file_name = ?1", SELECT_COLUMNS))?;
        let record = stmt
            .query_row(params![file_name], record_from_row)
            .optional()?;
        Ok(record)
    }

    fn list(&self) -> Result<Vec<ImageRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{} ORDER BY file_name ASC", SELECT_COLUMNS))?;
        let rows = stmt.query_map([], record_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: BTreeMap<String, ImageRecord>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn upsert(&mut self, record: &ImageRecord) -> Result<()> {
        self.records.insert(record.file_name.clone(), record.clone());
        Ok(())
    }

    fn get(&self, file_name: &str) -> Result<Option<ImageRecord>> {
        Ok(self.records.get(file_name).cloned())
    }

    fn list(&self) -> Result<Vec<ImageRecord>> {
        Ok(self.records.values().cloned().collect())
    }
}
