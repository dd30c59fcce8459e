mod adapter;
mod schema;
mod sqlite;
mod store;

pub use adapter::{BackupInfo, StorageAdapter};
pub use schema::{
    backup_key, backup_prefix, project_key, ImportSummary, LegacyCensus, LegacyTokenState,
    PersistedProjectStorage, StorageMetadata, CURRENT_VERSION, MAX_STORAGE_BYTES,
};
pub use sqlite::SqliteStore;
pub use store::{KeyValueStore, MemoryStore};
