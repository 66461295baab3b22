//! # turnauth-storage
//!
//! Storage abstraction for turnauth.
//!
//! The authorization engine persists in-flight sign-in sessions through the
//! [`Storage`] trait, a plain read/write/delete contract over JSON values.
//! Durable backends live outside this workspace; [`MemoryStorage`] is provided
//! for tests and single-process hosts.

mod error;
mod memory;
mod traits;

pub use error::{ErrorCategory, StorageError};
pub use memory::MemoryStorage;
pub use traits::{Storage, StoreItems};

/// Type alias for storage results.
pub type StorageResult<T> = Result<T, StorageError>;
