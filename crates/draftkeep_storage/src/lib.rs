#![forbid(unsafe_code)]

pub mod file;
pub mod memory;
pub mod repo;

pub use file::FileStorage;
pub use memory::InMemoryStorage;
pub use repo::{StorageAdapter, StorageError};
