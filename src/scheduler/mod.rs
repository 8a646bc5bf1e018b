pub mod manager;
pub mod trigger;

pub use manager::ScheduledUpdateManager;
pub use trigger::{build_trigger, TriggerSpec, DEFAULT_INTERVAL};
