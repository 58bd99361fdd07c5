use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use {
    anyhow::Result,
    serde::{Deserialize, Serialize},
};

/// A session the gateway should know about across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// JSON file-backed index mapping session name → SessionRecord.
pub struct SessionMetadata {
    path: PathBuf,
    entries: HashMap<String, SessionRecord>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl SessionMetadata {
    /// Load metadata from disk, or create an empty index. A corrupt file is
    /// treated as empty.
    pub fn load(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let data = fs::read_to_string(&path)?;
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist metadata to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, data)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&SessionRecord> {
        self.entries.get(name)
    }

    /// Insert or update a record. An existing record keeps its creation time.
    pub fn upsert(&mut self, name: &str, webhook_url: Option<String>) -> &SessionRecord {
        let now = now_ms();
        self.entries
            .entry(name.to_string())
            .and_modify(|e| {
                e.webhook_url = webhook_url.clone();
                e.updated_at = now;
            })
            .or_insert_with(|| SessionRecord {
                name: name.to_string(),
                webhook_url,
                created_at: now,
                updated_at: now,
            })
    }

    /// Remove a record. Returns it if found.
    pub fn remove(&mut self, name: &str) -> Option<SessionRecord> {
        self.entries.remove(name)
    }

    /// All records, oldest first.
    pub fn list(&self) -> Vec<SessionRecord> {
        let mut entries: Vec<_> = self.entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        entries
    }
}
