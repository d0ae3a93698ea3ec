//! Reading progress persistence
//!
//! Stores one session record (document, cursor and voice parameters) under
//! a fixed key:
//! - `FileProgressStore` keeps it as `<dir>/<key>.json`
//! - `MemoryProgressStore` keeps it in process, for tests and ephemeral runs

pub mod error;
pub mod progress;

pub use error::PersistenceError;
pub use progress::{FileProgressStore, MemoryProgressStore, ProgressStore};
