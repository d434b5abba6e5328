use std::{fmt, sync::Arc};

use chrono::Utc;
use indexmap::IndexMap;
use shared::domain::{
    next_sequential_id, next_stamp, ListFilter, Location, NewPurifier, PurifierId,
    PurifierRecord,
};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    error::{RegistryError, SyncError},
    snapshot::{decode_snapshot, encode_snapshot, SnapshotStore},
    transport::RecordService,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Where the startup collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSource {
    Remote,
    LocalCache,
    BuiltinDefaults,
}

impl fmt::Display for SeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Remote => "remote",
            Self::LocalCache => "local cache",
            Self::BuiltinDefaults => "built-in defaults",
        })
    }
}

/// Startup recovery strategies, tried first to last until one yields a collection.
pub const RECOVERY_ORDER: [SeedSource; 3] = [
    SeedSource::Remote,
    SeedSource::LocalCache,
    SeedSource::BuiltinDefaults,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Initialize,
    Add,
    ToggleStatus,
    Update,
    Remove,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initialize => "initialize",
            Self::Add => "add",
            Self::ToggleStatus => "toggle status",
            Self::Update => "update",
            Self::Remove => "remove",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Initialized {
        source: SeedSource,
        records: Vec<PurifierRecord>,
    },
    CollectionChanged {
        records: Vec<PurifierRecord>,
    },
    SyncFailed {
        operation: Operation,
        error: SyncError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedReport {
    pub source: SeedSource,
    pub remote_error: Option<SyncError>,
}

/// A mutation that was applied locally, plus the remote failure if sync did not succeed.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<T> {
    pub value: T,
    pub sync_error: Option<SyncError>,
}

impl<T> Applied<T> {
    pub fn is_synced(&self) -> bool {
        self.sync_error.is_none()
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

pub struct RegistryBuilder {
    store: Arc<dyn SnapshotStore>,
    remote: Option<Arc<dyn RecordService>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl RegistryBuilder {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            remote: None,
            events,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn RecordService>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Subscribing here also delivers the `Initialized` event.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub async fn initialize(self) -> PurifierRegistry {
        let registry = PurifierRegistry {
            records: RwLock::new(IndexMap::new()),
            writer: Mutex::new(()),
            remote: self.remote,
            store: self.store,
            events: self.events,
            seed: SeedReport {
                source: SeedSource::BuiltinDefaults,
                remote_error: None,
            },
        };
        registry.seed().await
    }
}

/// Owns the authoritative in-process purifier collection.
///
/// Mutations are serialized through a single writer gate; each one validates,
/// optionally round-trips to the record service, applies the result locally,
/// rewrites the full snapshot and broadcasts the new collection.
pub struct PurifierRegistry {
    records: RwLock<IndexMap<PurifierId, PurifierRecord>>,
    writer: Mutex<()>,
    remote: Option<Arc<dyn RecordService>>,
    store: Arc<dyn SnapshotStore>,
    events: broadcast::Sender<RegistryEvent>,
    seed: SeedReport,
}

impl PurifierRegistry {
    pub fn builder(store: Arc<dyn SnapshotStore>) -> RegistryBuilder {
        RegistryBuilder::new(store)
    }

    pub fn seed_report(&self) -> &SeedReport {
        &self.seed
    }

    pub fn is_remote_backed(&self) -> bool {
        self.remote.is_some()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    async fn seed(mut self) -> Self {
        let mut remote_error = None;
        let mut seeded = None;
        for source in RECOVERY_ORDER {
            if let Some(records) = self.recover_from(source, &mut remote_error).await {
                seeded = Some((source, records));
                break;
            }
        }
        let (source, records) =
            seeded.unwrap_or_else(|| (SeedSource::BuiltinDefaults, builtin_defaults()));

        let collection = collect_valid(records, source);
        info!(%source, count = collection.len(), "purifier registry initialized");
        let snapshot: Vec<_> = collection.values().cloned().collect();
        *self.records.get_mut() = collection;
        if source == SeedSource::Remote {
            self.persist(&snapshot).await;
        }

        if let Some(error) = &remote_error {
            self.emit(RegistryEvent::SyncFailed {
                operation: Operation::Initialize,
                error: error.clone(),
            });
        }
        self.emit(RegistryEvent::Initialized {
            source,
            records: snapshot,
        });
        self.seed = SeedReport {
            source,
            remote_error,
        };
        self
    }

    async fn recover_from(
        &self,
        source: SeedSource,
        remote_error: &mut Option<SyncError>,
    ) -> Option<Vec<PurifierRecord>> {
        match source {
            SeedSource::Remote => {
                let remote = self.remote.as_ref()?;
                match remote.fetch_all().await {
                    Ok(records) => Some(records),
                    Err(error) => {
                        warn!(%error, "record service unreachable, falling back to local cache");
                        *remote_error = Some(error);
                        None
                    }
                }
            }
            SeedSource::LocalCache => {
                let payload = match self.store.load().await {
                    Ok(payload) => payload?,
                    Err(error) => {
                        warn!(error = %format!("{error:#}"), "local cache unreadable");
                        return None;
                    }
                };
                match decode_snapshot(&payload) {
                    Ok(records) if !records.is_empty() => Some(records),
                    Ok(_) => None,
                    Err(error) => {
                        warn!(%error, "local cache is corrupt, ignoring it");
                        None
                    }
                }
            }
            SeedSource::BuiltinDefaults => Some(builtin_defaults()),
        }
    }

    /// Upsert: replaces a record with the same id in place, otherwise appends.
    pub async fn add(&self, input: NewPurifier) -> Result<Applied<PurifierRecord>, RegistryError> {
        let fields = input.validate()?;
        let _writer = self.writer.lock().await;

        let previous_stamp = self
            .records
            .read()
            .await
            .get(&fields.id)
            .map(|existing| existing.last_updated);
        let local = fields.stamped(next_stamp(previous_stamp));

        let outcome = match &self.remote {
            Some(remote) => Some(remote.upsert(&local).await),
            None => None,
        };
        let (record, sync_error) = reconcile(Operation::Add, local, outcome);

        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        debug!(purifier_id = %record.id, "purifier added");
        self.publish(Operation::Add, sync_error.as_ref()).await;
        Ok(Applied {
            value: record,
            sync_error,
        })
    }

    pub async fn toggle_status(
        &self,
        id: &str,
    ) -> Result<Applied<PurifierRecord>, RegistryError> {
        let id = id.trim();
        let _writer = self.writer.lock().await;

        let current = self
            .records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let local = PurifierRecord {
            status: !current.status,
            last_updated: next_stamp(Some(current.last_updated)),
            ..current
        };

        let outcome = match &self.remote {
            Some(remote) => Some(remote.set_status(&local.id, local.status).await),
            None => None,
        };
        let (record, sync_error) = reconcile(Operation::ToggleStatus, local, outcome);

        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        debug!(purifier_id = %record.id, status = record.status, "purifier toggled");
        self.publish(Operation::ToggleStatus, sync_error.as_ref())
            .await;
        Ok(Applied {
            value: record,
            sync_error,
        })
    }

    /// Replaces name, location and status of an existing record.
    pub async fn update(
        &self,
        record: PurifierRecord,
    ) -> Result<Applied<PurifierRecord>, RegistryError> {
        let fields = NewPurifier::from(record).validate()?;
        let _writer = self.writer.lock().await;

        let previous_stamp = self
            .records
            .read()
            .await
            .get(&fields.id)
            .map(|existing| existing.last_updated)
            .ok_or_else(|| RegistryError::NotFound(fields.id.to_string()))?;
        let local = fields.stamped(next_stamp(Some(previous_stamp)));

        let outcome = match &self.remote {
            Some(remote) => Some(remote.replace(&local).await),
            None => None,
        };
        let (record, sync_error) = reconcile(Operation::Update, local, outcome);

        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        debug!(purifier_id = %record.id, "purifier updated");
        self.publish(Operation::Update, sync_error.as_ref()).await;
        Ok(Applied {
            value: record,
            sync_error,
        })
    }

    /// Returns the removed record, if any. An id not held locally leaves the
    /// collection and the snapshot untouched, but is still deleted on the record
    /// service so records only the service knows about can be removed.
    pub async fn remove(&self, id: &str) -> Applied<Option<PurifierRecord>> {
        let id = id.trim();
        let _writer = self.writer.lock().await;

        let held = self.records.read().await.get(id).map(|r| r.id.clone());
        let Some(target) = held else {
            debug!(purifier_id = id, "remove of purifier not held locally");
            let sync_error = match (&self.remote, PurifierId::parse(id)) {
                (Some(remote), Ok(remote_id)) => remote.delete(&remote_id).await.err(),
                _ => None,
            };
            if let Some(error) = &sync_error {
                warn!(purifier_id = id, %error, "remote delete failed");
                self.emit(RegistryEvent::SyncFailed {
                    operation: Operation::Remove,
                    error: error.clone(),
                });
            }
            return Applied {
                value: None,
                sync_error,
            };
        };

        let sync_error = match &self.remote {
            Some(remote) => remote.delete(&target).await.err(),
            None => None,
        };
        if let Some(error) = &sync_error {
            warn!(purifier_id = %target, %error, "remote delete failed, removing locally");
        }

        let removed = self.records.write().await.shift_remove(&target);
        debug!(purifier_id = %target, "purifier removed");
        self.publish(Operation::Remove, sync_error.as_ref()).await;
        Applied {
            value: removed,
            sync_error,
        }
    }

    /// Snapshot of the records matching every predicate set in `filter`, in display order.
    pub async fn list(&self, filter: &ListFilter) -> Vec<PurifierRecord> {
        self.records
            .read()
            .await
            .values()
            .filter(|record| record.matches(filter))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &str) -> Option<PurifierRecord> {
        self.records.read().await.get(id.trim()).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// A `PWR-NNN` id not used by any current record.
    pub async fn next_id(&self) -> PurifierId {
        next_sequential_id(self.records.read().await.keys())
    }

    async fn publish(&self, operation: Operation, sync_error: Option<&SyncError>) {
        let snapshot: Vec<_> = self.records.read().await.values().cloned().collect();
        self.persist(&snapshot).await;
        if let Some(error) = sync_error {
            self.emit(RegistryEvent::SyncFailed {
                operation,
                error: error.clone(),
            });
        }
        self.emit(RegistryEvent::CollectionChanged { records: snapshot });
    }

    /// Rewrites the whole collection; failures are logged, never surfaced.
    async fn persist(&self, records: &[PurifierRecord]) {
        let payload = match encode_snapshot(records) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "failed to encode purifier snapshot");
                return;
            }
        };
        if let Err(error) = self.store.save(&payload).await {
            warn!(error = %format!("{error:#}"), "failed to write purifier snapshot");
        }
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Picks the record to keep after a remote call: the service's answer when it is
/// usable, otherwise the optimistic local one alongside the reason.
fn reconcile(
    operation: Operation,
    local: PurifierRecord,
    outcome: Option<Result<PurifierRecord, SyncError>>,
) -> (PurifierRecord, Option<SyncError>) {
    let remote = match outcome {
        None => return (local, None),
        Some(Ok(remote)) => remote,
        Some(Err(error)) => {
            warn!(%operation, purifier_id = %local.id, %error, "remote sync failed, keeping local change");
            return (local, Some(error));
        }
    };

    if remote.id != local.id {
        let error = SyncError::Mismatch {
            requested: local.id.clone(),
            returned: remote.id,
        };
        warn!(%operation, %error, "ignoring mismatched service response");
        return (local, Some(error));
    }

    match remote.validated() {
        Ok(mut remote) => {
            // Never let a lagging service clock move the stamp backwards.
            remote.last_updated = remote.last_updated.max(local.last_updated);
            if remote != local {
                info!(
                    %operation,
                    purifier_id = %remote.id,
                    status = remote.status,
                    "local record reconciled with record service"
                );
            }
            (remote, None)
        }
        Err(error) => {
            warn!(%operation, purifier_id = %local.id, %error, "service returned invalid purifier");
            (local, Some(SyncError::InvalidRecord(error)))
        }
    }
}

/// Drops invalid records and collapses duplicate ids, keeping the first position
/// and the last value.
fn collect_valid(
    records: Vec<PurifierRecord>,
    source: SeedSource,
) -> IndexMap<PurifierId, PurifierRecord> {
    let mut collection = IndexMap::with_capacity(records.len());
    for record in records {
        let raw_id = record.id.clone();
        match record.validated() {
            Ok(record) => {
                if collection.insert(record.id.clone(), record).is_some() {
                    warn!(%source, purifier_id = %raw_id, "duplicate purifier id collapsed");
                }
            }
            Err(error) => warn!(%source, purifier_id = %raw_id, %error, "skipping invalid purifier"),
        }
    }
    collection
}

/// Cold-start collection used only when neither the service nor the cache has data.
pub fn builtin_defaults() -> Vec<PurifierRecord> {
    let now = Utc::now();
    [
        ("PWR-001", "Office Purifier", "Main Office", false),
        ("PWR-002", "Warehouse Purifier", "Storage Facility", true),
    ]
    .into_iter()
    .filter_map(|(id, name, site, status)| {
        Some(PurifierRecord {
            id: PurifierId::parse(id).ok()?,
            name: name.to_string(),
            location: Location::site(site),
            status,
            last_updated: now,
        })
    })
    .collect()
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
