//! Records - read-only access to project records
//!
//! Characters and the scene outline are edited elsewhere; the pipeline only
//! reads them.

mod memory;
mod sqlite;
mod traits;
mod types;

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;
pub use traits::RecordStore;
pub use types::{CharacterSummary, SceneOutline};

#[cfg(test)]
pub use traits::MockRecordStore;

#[cfg(test)]
mod tests;
