//! # petrinet-storage
//!
//! Durable instance persistence for petrinet.
//!
//! [`FileAdapter`] implements [`petrinet_core::PersistenceAdapter`] by
//! keeping one checksummed JSON file per instance.

pub mod error;
pub mod file;

pub use error::StorageError;
pub use file::FileAdapter;
