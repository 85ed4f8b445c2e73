//! In-Memory Study Document Store
//!
//! Stands in for the external document store: point lookups by
//! session/task/device id, range-window scans on time fields, and guarded
//! conditional updates. Task transitions are compare-and-set inside a single
//! lock region, so a racing duplicate transition matches zero documents and
//! reports back as a lost race instead of a second terminal write.

pub mod provision;
pub mod store;

pub use store::{StoreError, StudyStore};
