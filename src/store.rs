use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use uuid::Uuid;

/// Bundled seed fixture. Used both to populate a fresh workspace and as the
/// read fallback when a stored collection is missing or unreadable.
const SEED_JSON: &str = include_str!("../seed.json");

const LAST_SYNC_KEY: &str = "last_sync";
const SESSION_SECRET_KEY: &str = "session_secret";
const FRESHNESS_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Users,
    Activities,
    Portfolios,
    Notifications,
    Analytics,
    Events,
    UploadedFiles,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Users,
        Collection::Activities,
        Collection::Portfolios,
        Collection::Notifications,
        Collection::Analytics,
        Collection::Events,
        Collection::UploadedFiles,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Activities => "activities",
            Collection::Portfolios => "portfolios",
            Collection::Notifications => "notifications",
            Collection::Analytics => "analytics",
            Collection::Events => "events",
            Collection::UploadedFiles => "uploaded_files",
        }
    }
}

/// `add` refuses to append a record whose id is already present.
#[derive(Debug)]
pub struct DuplicateId(pub String);

impl fmt::Display for DuplicateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record with id '{}' already exists", self.0)
    }
}

impl std::error::Error for DuplicateId {}

fn seed_document() -> &'static Value {
    static SEED: OnceLock<Value> = OnceLock::new();
    SEED.get_or_init(|| serde_json::from_str(SEED_JSON).expect("bundled seed.json is valid"))
}

fn seed_collection(c: Collection) -> Vec<Value> {
    seed_document()
        .get(c.key())
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Keyed JSON store over a per-workspace SQLite file. Each collection is one
/// row of the `storage` table holding a JSON array; `last_sync` and
/// `session_secret` share the table as scalar rows.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(workspace: &Path) -> anyhow::Result<Store> {
        std::fs::create_dir_all(workspace)?;
        let conn = Connection::open(workspace.join("tracker.sqlite3"))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS storage(
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        let store = Store { conn };
        store.initialize()?;
        Ok(store)
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        self.conn
            .query_row("SELECT value FROM storage WHERE key = ?", [key], |r| {
                r.get(0)
            })
            .optional()
            .ok()
            .flatten()
    }

    fn write_raw(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO storage(key, value) VALUES(?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )?;
        Ok(())
    }

    /// Seed every collection unless the `last_sync` marker is younger than
    /// 24 hours. Idempotent; returns whether a reseed happened. This and
    /// `reset` are the only bulk-overwrite paths.
    pub fn initialize(&self) -> anyhow::Result<bool> {
        let now = Utc::now().timestamp_millis();
        if let Some(raw) = self.read_raw(LAST_SYNC_KEY) {
            if let Ok(ts) = raw.parse::<i64>() {
                if now - ts < FRESHNESS_WINDOW_MS {
                    return Ok(false);
                }
            }
        }
        self.write_seed()?;
        self.write_raw(LAST_SYNC_KEY, &now.to_string())?;
        Ok(true)
    }

    /// Unconditionally restore every collection to the bundled seed. The
    /// session secret survives so outstanding tokens stay valid.
    pub fn reset(&self) -> anyhow::Result<()> {
        self.write_seed()?;
        self.write_raw(LAST_SYNC_KEY, &Utc::now().timestamp_millis().to_string())
    }

    fn write_seed(&self) -> anyhow::Result<()> {
        for c in Collection::ALL {
            self.save(c, &seed_collection(c))?;
        }
        Ok(())
    }

    /// Read a collection. Never errors: a missing row, an unreadable store,
    /// or corrupted JSON all fall back to the bundled seed.
    pub fn collection(&self, c: Collection) -> Vec<Value> {
        if let Some(raw) = self.read_raw(c.key()) {
            if let Ok(Value::Array(items)) = serde_json::from_str(&raw) {
                return items;
            }
        }
        seed_collection(c)
    }

    /// Like `collection`, but deserialized; records that no longer parse as
    /// `T` are skipped rather than failing the whole read.
    pub fn typed<T: serde::de::DeserializeOwned>(&self, c: Collection) -> Vec<T> {
        self.collection(c)
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect()
    }

    pub fn save(&self, c: Collection, items: &[Value]) -> anyhow::Result<()> {
        self.write_raw(c.key(), &serde_json::to_string(items)?)
    }

    pub fn find(&self, c: Collection, id: &str) -> Option<Value> {
        self.collection(c)
            .into_iter()
            .find(|v| record_id(v) == Some(id))
    }

    pub fn add(&self, c: Collection, item: Value) -> anyhow::Result<()> {
        let id = item
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("record has no id"))?
            .to_string();
        let mut items = self.collection(c);
        if items.iter().any(|v| record_id(v) == Some(id.as_str())) {
            return Err(DuplicateId(id).into());
        }
        items.push(item);
        self.save(c, &items)
    }

    /// Shallow merge: top-level keys of `patch` overwrite the record's keys;
    /// list-valued fields are replaced whole, never merged element-wise.
    pub fn update(&self, c: Collection, id: &str, patch: &Value) -> anyhow::Result<Option<Value>> {
        let mut items = self.collection(c);
        let Some(slot) = items.iter_mut().find(|v| record_id(v) == Some(id)) else {
            return Ok(None);
        };
        if let (Some(obj), Some(patch_obj)) = (slot.as_object_mut(), patch.as_object()) {
            for (k, v) in patch_obj {
                obj.insert(k.clone(), v.clone());
            }
        }
        let updated = slot.clone();
        self.save(c, &items)?;
        Ok(Some(updated))
    }

    pub fn remove(&self, c: Collection, id: &str) -> anyhow::Result<bool> {
        let items = self.collection(c);
        let before = items.len();
        let kept: Vec<Value> = items
            .into_iter()
            .filter(|v| record_id(v) != Some(id))
            .collect();
        if kept.len() == before {
            return Ok(false);
        }
        self.save(c, &kept)?;
        Ok(true)
    }

    /// Per-store token-signing secret, minted on first use.
    pub fn session_secret(&self) -> anyhow::Result<String> {
        if let Some(secret) = self.read_raw(SESSION_SECRET_KEY) {
            return Ok(secret);
        }
        let secret = Uuid::new_v4().to_string();
        self.write_raw(SESSION_SECRET_KEY, &secret)?;
        Ok(secret)
    }
}

fn record_id(v: &Value) -> Option<&str> {
    v.get("id").and_then(Value::as_str)
}
