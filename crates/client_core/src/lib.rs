//! Client-side purifier registry and its synchronization with the record
//! service and the local snapshot cache.

pub mod error;
pub mod registry;
pub mod snapshot;
pub mod transport;

pub use error::{RegistryError, SyncError};
pub use registry::{
    builtin_defaults, Applied, Operation, PurifierRegistry, RegistryBuilder, RegistryEvent,
    SeedReport, SeedSource, RECOVERY_ORDER,
};
pub use snapshot::{
    MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore, DEFAULT_SNAPSHOT_SLOT,
};
pub use transport::{HttpRecordService, RecordService};
