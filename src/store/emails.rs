use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::config;
use crate::error::{PipelineError, Result};
use crate::models::{EmailRecord, StoredEmail};

/// Handle over the relational email store. Constructed by the caller and passed
/// explicitly into the pipeline; the connection closes when the handle drops.
///
/// The existence check and the insert are not atomic against other processes
/// writing the same file.
pub struct EmailStore {
    path: PathBuf,
    conn: Connection,
}

impl EmailStore {
    /// Open the store at `path`, creating the file and schema if needed.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Configuration(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        log::info!("Opening email store at {}", path.display());
        let conn = Connection::open(path)?;
        init_database(&conn)?;
        let store = Self {
            path: path.to_path_buf(),
            conn,
        };
        log::info!("Email store ready: {} emails", store.count()?);
        Ok(store)
    }

    /// Open an existing store; a missing file is a configuration error.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::Configuration(format!(
                "SQLite database file not found at {}",
                path.display()
            )));
        }
        Self::open_or_create(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", config::sqlite::EMAILS_TABLE);
        Ok(self.conn.query_row(&sql, [], |r| r.get(0))?)
    }

    /// Insert `record` unless an identical five-field tuple is already stored.
    // Single-record form of `insert_batch_if_new`; the pipeline always goes through the batch.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn insert_if_new(&mut self, record: &EmailRecord) -> Result<bool> {
        insert_if_new_on(&self.conn, record)
    }

    /// Insert every record not already stored, in one transaction.
    ///
    /// Each record is checked against the store as it stands, including rows added
    /// earlier in this same batch. Nothing persists unless the whole batch commits.
    pub fn insert_batch_if_new(&mut self, records: &[EmailRecord]) -> Result<usize> {
        log::info!("Storing batch of {} emails", records.len());

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted = 0usize;
        let mut skipped_duplicates = 0usize;

        for record in records {
            if insert_if_new_on(&tx, record)? {
                inserted += 1;
            } else {
                skipped_duplicates += 1;
                log::debug!(
                    "Skipping duplicate email: {} @ {:?}",
                    truncate_for_log(record.subject.as_deref().unwrap_or("")),
                    record.timestamp
                );
            }
        }

        tx.commit()?;
        if skipped_duplicates > 0 {
            log::info!(
                "Stored {} emails successfully, {} duplicates skipped",
                inserted,
                skipped_duplicates
            );
        } else {
            log::info!("Stored {} emails successfully", inserted);
        }
        Ok(inserted)
    }

    /// Full scan in insertion (`id`) order.
    pub fn all_emails(&self) -> Result<Vec<StoredEmail>> {
        let sql = format!(
            "SELECT id, sender, subject, body, timestamp, attachment_types FROM {} ORDER BY id ASC",
            config::sqlite::EMAILS_TABLE
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_stored_email)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

fn init_database(conn: &Connection) -> Result<()> {
    // SQLite PRAGMA statements do NOT reliably accept parameters, so we interpolate.
    conn.execute_batch(&format!(
        "\
PRAGMA journal_mode = WAL;\n\
PRAGMA synchronous = NORMAL;\n\
PRAGMA temp_store = MEMORY;\n\
PRAGMA cache_size = {cache_size};\n\
PRAGMA mmap_size = {mmap_size};\n\
PRAGMA busy_timeout = {busy_timeout};\n\
PRAGMA wal_autocheckpoint = {wal_autocheckpoint};\n\
",
        cache_size = config::sqlite::PRAGMA_CACHE_SIZE_KIB_NEG,
        mmap_size = config::sqlite::PRAGMA_MMAP_SIZE_BYTES,
        busy_timeout = config::sqlite::PRAGMA_BUSY_TIMEOUT_MS,
        wal_autocheckpoint = config::sqlite::PRAGMA_WAL_AUTOCHECKPOINT_PAGES,
    ))?;

    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY,
            sender TEXT,
            subject TEXT,
            body TEXT,
            timestamp INTEGER,
            attachment_types TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_timestamp ON {table}(timestamp);
        "#,
        table = config::sqlite::EMAILS_TABLE
    ))?;
    Ok(())
}

// `IS` instead of `=` so NULL values (demo rows, missing headers) compare equal.
fn insert_if_new_on(conn: &Connection, record: &EmailRecord) -> Result<bool> {
    let table = config::sqlite::EMAILS_TABLE;
    let existing: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT id FROM {table} \
                 WHERE timestamp IS ?1 AND sender IS ?2 AND subject IS ?3 \
                 AND body IS ?4 AND attachment_types IS ?5 \
                 LIMIT 1"
            ),
            params![
                record.timestamp,
                record.sender,
                record.subject,
                record.body,
                record.attachment_types
            ],
            |r| r.get(0),
        )
        .optional()?;

    if existing.is_some() {
        return Ok(false);
    }

    conn.execute(
        &format!(
            "INSERT INTO {table} (sender, subject, body, timestamp, attachment_types) \
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        params![
            record.sender,
            record.subject,
            record.body,
            record.timestamp,
            record.attachment_types
        ],
    )?;
    Ok(true)
}

fn row_to_stored_email(r: &Row<'_>) -> rusqlite::Result<StoredEmail> {
    let body: Option<String> = r.get(3)?;
    Ok(StoredEmail {
        id: r.get(0)?,
        record: EmailRecord {
            sender: r.get(1)?,
            subject: r.get(2)?,
            body: body.unwrap_or_default(),
            timestamp: r.get(4)?,
            attachment_types: r.get(5)?,
        },
    })
}

fn truncate_for_log(s: &str) -> String {
    let max = 80usize;
    if s.len() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}
