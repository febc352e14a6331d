use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::segmenter::{PageRecord, Segmentation};

pub const DEFAULT_DB_PATH: &str = "data/segments.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            id           INTEGER PRIMARY KEY,
            source       TEXT NOT NULL,
            page_count   INTEGER NOT NULL,
            group_count  INTEGER NOT NULL,
            processed_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS page_records (
            id            INTEGER PRIMARY KEY,
            document_id   INTEGER NOT NULL REFERENCES documents(id),
            group_id      INTEGER NOT NULL,
            pagenumber    INTEGER NOT NULL,
            category      INTEGER NOT NULL,
            isreviewable  BOOLEAN NOT NULL,
            dos           TEXT NOT NULL,
            provider      TEXT NOT NULL,
            referencekey  INTEGER NOT NULL,
            parentkey     INTEGER NOT NULL,
            lockstatus    TEXT NOT NULL,
            header        TEXT NOT NULL,
            facilitygroup TEXT NOT NULL,
            reviewerid    INTEGER,
            qcreviewerid  INTEGER,
            isduplicate   BOOLEAN NOT NULL,
            UNIQUE(document_id, pagenumber)
        );
        CREATE INDEX IF NOT EXISTS idx_records_document ON page_records(document_id);
        ",
    )?;
    Ok(())
}

// ── Runs ──

/// Stores one run and its records in a single transaction. Returns the document id.
pub fn save_segmentation(conn: &Connection, source: &str, seg: &Segmentation) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO documents (source, page_count, group_count) VALUES (?1, ?2, ?3)",
        params![source, seg.records.len() as i64, seg.groups.len() as i64],
    )?;
    let document_id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO page_records
             (document_id, group_id, pagenumber, category, isreviewable, dos, provider,
              referencekey, parentkey, lockstatus, header, facilitygroup, reviewerid,
              qcreviewerid, isduplicate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )?;
        let group_of_page = seg
            .groups
            .iter()
            .flat_map(|g| g.pages.iter().map(move |_| g.id.0));
        for (r, group_id) in seg.records.iter().zip(group_of_page) {
            stmt.execute(params![
                document_id,
                group_id,
                r.pagenumber,
                r.category,
                r.isreviewable,
                r.dos,
                r.provider,
                r.referencekey as i64,
                r.parentkey as i64,
                r.lockstatus,
                r.header,
                r.facilitygroup,
                r.reviewerid,
                r.qcreviewerid,
                r.isduplicate,
            ])?;
        }
    }
    tx.commit()?;
    Ok(document_id)
}

pub struct DocumentRow {
    pub id: i64,
    pub source: String,
    pub page_count: i64,
    pub group_count: i64,
    pub processed_at: String,
}

pub fn fetch_history(conn: &Connection, limit: usize) -> Result<Vec<DocumentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, source, page_count, group_count, processed_at
         FROM documents
         ORDER BY id DESC
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(DocumentRow {
                id: row.get(0)?,
                source: row.get(1)?,
                page_count: row.get(2)?,
                group_count: row.get(3)?,
                processed_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Records of one stored run in page order. Empty when the id is unknown.
pub fn fetch_records(conn: &Connection, document_id: i64) -> Result<Vec<PageRecord>> {
    let mut stmt = conn.prepare(
        "SELECT pagenumber, category, isreviewable, dos, provider, referencekey, parentkey,
                lockstatus, header, facilitygroup, reviewerid, qcreviewerid, isduplicate
         FROM page_records
         WHERE document_id = ?1
         ORDER BY pagenumber",
    )?;
    let rows = stmt
        .query_map([document_id], |row| {
            Ok(PageRecord {
                pagenumber: row.get(0)?,
                category: row.get(1)?,
                isreviewable: row.get(2)?,
                dos: row.get(3)?,
                provider: row.get(4)?,
                referencekey: row.get::<_, i64>(5)? as u64,
                parentkey: row.get::<_, i64>(6)? as u64,
                lockstatus: row.get(7)?,
                header: row.get(8)?,
                facilitygroup: row.get(9)?,
                reviewerid: row.get(10)?,
                qcreviewerid: row.get(11)?,
                isduplicate: row.get(12)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
