//! Persistent audio library on Sled.
//!
//! Two trees: `records` (id -> JSON [`LibraryRecord`]) and `audio` (id -> encoded audio blob).
//! Writes are upserts by id and touch both trees in one transaction; listing is newest first.

use crate::error::CoreResult;
use crate::language::Language;
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionResult;
use sled::{Db, Transactional, Tree};
use std::path::Path;
use tracing::info;

const RECORDS_TREE: &str = "records";
const AUDIO_TREE: &str = "audio";

/// Metadata stored next to each saved clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryRecord {
    pub id: String,
    pub text: String,
    pub language: Language,
    /// Persona id the clip was generated with.
    pub voice: String,
    pub speed: f32,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Container of the stored blob, e.g. `audio/wav`.
    pub mime_type: String,
}

/// A record with its audio blob.
#[derive(Debug, Clone)]
pub struct LibraryItem {
    pub record: LibraryRecord,
    pub audio: Vec<u8>,
}

/// Keyed clip storage, independent of the in-memory history.
pub struct Library {
    db: Db,
    records: Tree,
    audio: Tree,
}

impl Library {
    /// Opens or creates a library at `path`.
    pub fn open_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> CoreResult<Self> {
        let records = db.open_tree(RECORDS_TREE)?;
        let audio = db.open_tree(AUDIO_TREE)?;
        Ok(Self { db, records, audio })
    }

    /// Insert or replace the clip stored under `record.id`.
    pub fn save(&self, record: &LibraryRecord, audio: &[u8]) -> CoreResult<()> {
        let key = record.id.as_bytes();
        let json = serde_json::to_vec(record)?;
        (&self.records, &self.audio).transaction(
            |(records, blobs)| -> ConflictableTransactionResult<()> {
                blobs.insert(key, audio)?;
                records.insert(key, json.as_slice())?;
                Ok(())
            },
        )?;
        self.db.flush()?;
        info!(id = %record.id, bytes = audio.len(), "💾 saved clip to library");
        Ok(())
    }

    /// Every record, newest first.
    pub fn list(&self) -> CoreResult<Vec<LibraryRecord>> {
        let mut out = Vec::new();
        for kv in self.records.iter() {
            let (_, v) = kv?;
            out.push(serde_json::from_slice::<LibraryRecord>(&v)?);
        }
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(out)
    }

    pub fn load(&self, id: &str) -> CoreResult<Option<LibraryItem>> {
        let Some(raw) = self.records.get(id.as_bytes())? else {
            return Ok(None);
        };
        let record: LibraryRecord = serde_json::from_slice(&raw)?;
        let audio = self
            .audio
            .get(id.as_bytes())?
            .map(|iv| iv.to_vec())
            .unwrap_or_default();
        Ok(Some(LibraryItem { record, audio }))
    }

    /// Remove a clip. Returns false when nothing was stored under `id`.
    pub fn delete(&self, id: &str) -> CoreResult<bool> {
        let key = id.as_bytes();
        let existed = (&self.records, &self.audio).transaction(
            |(records, blobs)| -> ConflictableTransactionResult<bool> {
                blobs.remove(key)?;
                Ok(records.remove(key)?.is_some())
            },
        )?;
        self.db.flush()?;
        if existed {
            info!(id = %id, "library clip deleted");
        }
        Ok(existed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
