//! User accounts and per-user detection history.
//!
//! Two interchangeable backends: SQLite (file or shared-cache memory URI)
//! and a plain in-memory store for tests and throwaway sessions.

use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use image::{ImageFormat, RgbImage};
use rusqlite::{params, Connection, ErrorCode};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::open_db_connection;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One stored detection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub username: String,
    /// Local wall-clock time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    pub disease_name: String,
    pub confidence: f32,
    /// Base64 PNG of the annotated image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl HistoryRecord {
    pub fn decode_image(&self) -> Result<Option<RgbImage>> {
        self.image.as_deref().map(decode_image).transpose()
    }
}

pub trait HistoryStore: Send {
    /// Store a record and return its id.
    fn add_detection_record(
        &mut self,
        username: &str,
        disease_name: &str,
        confidence: f32,
        image: Option<&str>,
    ) -> Result<i64>;

    /// Records of one user, most recent first.
    fn detection_history(&mut self, username: &str) -> Result<Vec<HistoryRecord>>;

    /// Returns false when no record had that id.
    fn delete_detection_record(&mut self, id: i64) -> Result<bool>;

    /// Delete a record only if it belongs to `username`.
    fn delete_user_record(&mut self, username: &str, id: i64) -> Result<bool>;
}

pub trait UserStore: Send {
    /// Returns false when the username is taken.
    fn add_user(&mut self, username: &str, password: &str) -> Result<bool>;

    fn verify_user(&mut self, username: &str, password: &str) -> Result<bool>;
}

pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// PNG-encode then base64 an image for storage.
pub fn encode_image(image: &RgbImage) -> Result<String> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(STANDARD.encode(png))
}

pub fn decode_image(encoded: &str) -> Result<RgbImage> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .context("stored image is not valid base64")?;
    let image = image::load_from_memory(&bytes).context("stored image is not decodable")?;
    Ok(image.to_rgb8())
}

fn offset_from_hours(hours: i32) -> Result<FixedOffset> {
    FixedOffset::east_opt(hours * 3600)
        .ok_or_else(|| anyhow!("utc offset of {} hours is out of range", hours))
}

fn local_timestamp(offset: &FixedOffset) -> String {
    let now: DateTime<FixedOffset> = Utc::now().with_timezone(offset);
    now.format(TIMESTAMP_FORMAT).to_string()
}

// ----------------------------------------------------------------------------
// SQLite
// ----------------------------------------------------------------------------

pub struct SqliteStore {
    conn: Connection,
    offset: FixedOffset,
}

impl SqliteStore {
    pub fn open(db_path: &str, utc_offset_hours: i32) -> Result<Self> {
        let conn = open_db_connection(db_path)
            .with_context(|| format!("failed to open history database {}", db_path))?;
        let mut store = Self {
            conn,
            offset: offset_from_hours(utc_offset_hours)?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              username TEXT NOT NULL UNIQUE,
              password_hashed TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS detection_history (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              username TEXT NOT NULL,
              timestamp TEXT NOT NULL,
              disease_name TEXT NOT NULL,
              confidence REAL NOT NULL,
              image_path TEXT,
              FOREIGN KEY (username) REFERENCES users (username) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_history_user_time
              ON detection_history(username, timestamp);
            "#,
        )?;
        Ok(())
    }
}

impl UserStore for SqliteStore {
    fn add_user(&mut self, username: &str, password: &str) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO users (username, password_hashed) VALUES (?1, ?2)",
            params![username, hash_password(password)],
        );
        match inserted {
            Ok(_) => {
                log::info!("user {} registered", username);
                Ok(true)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn verify_user(&mut self, username: &str, password: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT password_hashed FROM users WHERE username = ?1")?;
        let mut rows = stmt.query(params![username])?;
        match rows.next()? {
            Some(row) => {
                let stored: String = row.get(0)?;
                Ok(stored == hash_password(password))
            }
            None => Ok(false),
        }
    }
}

impl HistoryStore for SqliteStore {
    fn add_detection_record(
        &mut self,
        username: &str,
        disease_name: &str,
        confidence: f32,
        image: Option<&str>,
    ) -> Result<i64> {
        let timestamp = local_timestamp(&self.offset);
        self.conn.execute(
            r#"
            INSERT INTO detection_history (username, timestamp, disease_name, confidence, image_path)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![username, timestamp, disease_name, confidence as f64, image],
        )?;
        let id = self.conn.last_insert_rowid();
        log::info!(
            "detection {} saved for {} at {}: {} ({:.2})",
            id,
            username,
            timestamp,
            disease_name,
            confidence
        );
        Ok(id)
    }

    fn detection_history(&mut self, username: &str) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, username, timestamp, disease_name, confidence, image_path
            FROM detection_history
            WHERE username = ?1
            ORDER BY timestamp DESC, id DESC
            "#,
        )?;
        let mut rows = stmt.query(params![username])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let confidence: f64 = row.get(4)?;
            out.push(HistoryRecord {
                id: row.get(0)?,
                username: row.get(1)?,
                timestamp: row.get(2)?,
                disease_name: row.get(3)?,
                confidence: confidence as f32,
                image: row.get(5)?,
            });
        }
        Ok(out)
    }

    fn delete_detection_record(&mut self, id: i64) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM detection_history WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn delete_user_record(&mut self, username: &str, id: i64) -> Result<bool> {
        let removed = self.conn.execute(
            "DELETE FROM detection_history WHERE id = ?1 AND username = ?2",
            params![id, username],
        )?;
        Ok(removed > 0)
    }
}

// ----------------------------------------------------------------------------
// In-memory
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct InMemoryStore {
    users: Vec<(String, String)>,
    records: Vec<HistoryRecord>,
    next_id: i64,
    offset: FixedOffset,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            records: Vec::new(),
            next_id: 1,
            offset: FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl InMemoryStore {
    pub fn with_offset_hours(hours: i32) -> Result<Self> {
        Ok(Self {
            offset: offset_from_hours(hours)?,
            ..Self::default()
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl UserStore for InMemoryStore {
    fn add_user(&mut self, username: &str, password: &str) -> Result<bool> {
        if self.users.iter().any(|(name, _)| name == username) {
            return Ok(false);
        }
        self.users
            .push((username.to_string(), hash_password(password)));
        Ok(true)
    }

    fn verify_user(&mut self, username: &str, password: &str) -> Result<bool> {
        Ok(self
            .users
            .iter()
            .any(|(name, hash)| name == username && *hash == hash_password(password)))
    }
}

impl HistoryStore for InMemoryStore {
    fn add_detection_record(
        &mut self,
        username: &str,
        disease_name: &str,
        confidence: f32,
        image: Option<&str>,
    ) -> Result<i64> {
        let id = self.next_id;
        self.next_id += 1;
        self.records.push(HistoryRecord {
            id,
            username: username.to_string(),
            timestamp: local_timestamp(&self.offset),
            disease_name: disease_name.to_string(),
            confidence,
            image: image.map(str::to_string),
        });
        Ok(id)
    }

    fn detection_history(&mut self, username: &str) -> Result<Vec<HistoryRecord>> {
        let mut out: Vec<HistoryRecord> = self
            .records
            .iter()
            .filter(|r| r.username == username)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    fn delete_detection_record(&mut self, id: i64) -> Result<bool> {
        let before = self.records.len();
        self.records.retain(|r| r.id != id);
        Ok(self.records.len() != before)
    }

    fn delete_user_record(&mut self, username: &str, id: i64) -> Result<bool> {
        let before = self.records.len();
        self.records
            .retain(|r| !(r.id == id && r.username == username));
        Ok(self.records.len() != before)
    }
}
