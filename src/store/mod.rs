pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use traits::{CatalogStore, JobStore, ScheduleStore, ScheduledJobFilter, UpdateLogFilter};
