//! Object persistors for docsync.
//!
//! Every backend implements the [`Persistor`] capability contract, keyed by
//! `(location, key)`. A location is a logical directory (usually a unit id);
//! keys are slash-separated paths inside it. All operations work on single
//! objects; there is no multi-object transaction.
//!
//! Backends:
//! - [`FsPersistor`]: local directory tree (primary store)
//! - [`MemoryPersistor`]: in-process map with injectable timestamps
//! - [`WebDavPersistor`]: WebDAV endpoint over HTTP
//! - [`S3Persistor`]: S3-compatible object store

pub mod error;
pub mod fs;
pub mod memory;
pub mod persistor;
pub mod s3;
pub mod webdav;

mod path;

pub use error::{StorageError, StorageResult};
pub use fs::FsPersistor;
pub use memory::MemoryPersistor;
pub use persistor::{GetOptions, Persistor, PutOptions, slice_range};
pub use s3::{S3Persistor, S3Settings};
pub use webdav::WebDavPersistor;
