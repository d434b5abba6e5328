use anyhow::Result;
use async_trait::async_trait;
use shared::domain::PurifierRecord;
use storage::Storage;
use tokio::sync::Mutex;

pub const DEFAULT_SNAPSHOT_SLOT: &str = "purifiers";

/// A single named slot holding the serialized collection.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> Result<Option<String>>;
    async fn save(&self, payload: &str) -> Result<()>;
}

pub struct SqliteSnapshotStore {
    storage: Storage,
    slot: String,
}

impl SqliteSnapshotStore {
    pub fn new(storage: Storage, slot: impl Into<String>) -> Self {
        Self {
            storage,
            slot: slot.into(),
        }
    }

    pub async fn open(database_url: &str, slot: impl Into<String>) -> Result<Self> {
        Ok(Self::new(Storage::new(database_url).await?, slot))
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn load(&self) -> Result<Option<String>> {
        self.storage.read_slot(&self.slot).await
    }

    async fn save(&self, payload: &str) -> Result<()> {
        self.storage.write_slot(&self.slot, payload).await
    }
}

/// Process-local store, used when nothing should outlive the session.
#[derive(Default)]
pub struct MemorySnapshotStore {
    payload: Mutex<Option<String>>,
}

impl MemorySnapshotStore {
    pub fn with_payload(payload: impl Into<String>) -> Self {
        Self {
            payload: Mutex::new(Some(payload.into())),
        }
    }

    pub async fn payload(&self) -> Option<String> {
        self.payload.lock().await.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<String>> {
        Ok(self.payload.lock().await.clone())
    }

    async fn save(&self, payload: &str) -> Result<()> {
        *self.payload.lock().await = Some(payload.to_string());
        Ok(())
    }
}

pub fn encode_snapshot(records: &[PurifierRecord]) -> serde_json::Result<String> {
    serde_json::to_string(records)
}

pub fn decode_snapshot(payload: &str) -> serde_json::Result<Vec<PurifierRecord>> {
    serde_json::from_str(payload)
}

#[cfg(test)]
#[path = "tests/snapshot_tests.rs"]
mod tests;
