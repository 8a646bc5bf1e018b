pub mod backend;
pub mod blob;
pub mod manager;
pub mod memory;
pub mod object_store;
pub mod structured;
pub mod timeseries;

pub use backend::{BackendKind, StorageBackend, StorageMetadata};
pub use blob::BlobBackend;
pub use manager::StorageManager;
pub use memory::MemoryBackend;
pub use object_store::{FsObjectStore, ObjectStore};
pub use structured::StructuredBackend;
pub use timeseries::TimeSeriesBackend;
