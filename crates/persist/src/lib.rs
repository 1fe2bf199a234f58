//! Palate persistence: minimal SQLite key-value store for the onboarding
//! profile seed. Keep code tiny and predictable.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use metrics::{counter, histogram};

/// Storage keys for the onboarding seed.
pub mod keys {
    pub const ONBOARDING_DONE: &str = "onboarding_done";
    pub const DISPLAY_NAME: &str = "display_name";
    pub const GOAL: &str = "goal";
    pub const HOME_FOOD: &str = "home_food";
    pub const CUISINES: &str = "cuisines";
    pub const ALLERGENS: &str = "allergens";
}

/// Key→string storage. Lists go through JSON strings; see [`ProfileSeed`].
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed store. Simple, synchronous; the seed is written once per
/// onboarding and read once per startup.
pub struct SqliteStore {
    db: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("PALATE_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path)
            .with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        db.pragma_update(None, "synchronous", &"NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS profile_seed (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .context("creating profile_seed table")?;
        let me = Self { db: std::sync::Mutex::new(db) };
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(me)
    }
}

impl Store for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let started = std::time::Instant::now();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT value FROM profile_seed WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        let out = match rows.next()? {
            Some(row) => Some(row.get::<_, String>(0)?),
            None => None,
        };
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let started = std::time::Instant::now();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO profile_seed(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemStore {
    map: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.map.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// The answers the onboarding wizard persists. Optional fields are only
/// written when set, so a fresh seed stays sparse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileSeed {
    pub name: String,
    pub goal: Option<String>,
    pub home_food: Option<String>,
    pub cuisines: Vec<String>,
    pub allergens: Vec<String>,
}

impl ProfileSeed {
    pub fn save(&self, store: &dyn Store) -> Result<()> {
        store.put(keys::ONBOARDING_DONE, "true")?;
        store.put(keys::DISPLAY_NAME, self.name.trim())?;
        if let Some(goal) = self.goal.as_deref().filter(|g| !g.is_empty()) {
            store.put(keys::GOAL, goal)?;
        }
        if let Some(food) = self.home_food.as_deref().filter(|f| !f.is_empty()) {
            store.put(keys::HOME_FOOD, food)?;
        }
        if !self.cuisines.is_empty() {
            store.put(keys::CUISINES, &serde_json::to_string(&self.cuisines)?)?;
        }
        if !self.allergens.is_empty() {
            store.put(keys::ALLERGENS, &serde_json::to_string(&self.allergens)?)?;
        }
        Ok(())
    }

    pub fn load(store: &dyn Store) -> Result<Self> {
        let list = |key: &str| -> Result<Vec<String>> {
            Ok(match store.get(key)? {
                Some(raw) => serde_json::from_str(&raw)
                    .with_context(|| format!("decoding {} list", key))?,
                None => Vec::new(),
            })
        };
        Ok(Self {
            name: store.get(keys::DISPLAY_NAME)?.unwrap_or_default(),
            goal: store.get(keys::GOAL)?,
            home_food: store.get(keys::HOME_FOOD)?,
            cuisines: list(keys::CUISINES)?,
            allergens: list(keys::ALLERGENS)?,
        })
    }
}

/// True when a completed onboarding seed is on disk.
pub fn onboarding_complete(store: &dyn Store) -> bool {
    matches!(store.get(keys::ONBOARDING_DONE), Ok(Some(v)) if v == "true")
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".palate");
        let _ = std::fs::create_dir_all(&p);
        p.push("palate.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "palate.db".to_string()
}
