//! Interfaces to the subsystems around the payment pipeline.
//!
//! The catalog, user directory and blob storage are owned by other parts of
//! the platform; the pipeline consumes them through these traits and never
//! assumes anything about their implementation.

pub mod blob;
pub mod catalog;
pub mod directory;

pub use blob::{BlobStore, FsBlobStore, InMemoryBlobStore, StoredBlob};
pub use catalog::{CourseCatalog, CourseSnapshot, InMemoryCatalog};
pub use directory::{InMemoryDirectory, UserDirectory, UserProfile};
