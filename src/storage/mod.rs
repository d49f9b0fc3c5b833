//! Storage traits and the in-memory backend.
//!
//! The engine reads survey and trigger configuration, submission counts,
//! and device history through these traits; production deployments
//! provide their own implementations.

mod memory;
mod traits;

pub use memory::InMemoryStores;
pub use traits::{
    AnalyticsStore, DeviceHistoryStore, ImpressionLog, StorageError, SurveyRepository, TriggerRepository,
};
