//! Filesystem-backed storage engine
//!
//! The engine owns the data directory and is the sole mutator of it.
//! Split by concern:
//! - `paths`: bucket/key to filesystem path resolution and traversal safety
//! - `stripes`: fixed-size mutex array guarding rename critical sections
//! - `sidecar`: per-object JSON metadata, written atomically
//! - `fs`: bucket/object CRUD, listing, copy
//! - `multipart`: staged multipart uploads on disk
//! - `gc`: background sweep of abandoned multipart staging

mod fs;
pub mod gc;
mod multipart;
pub mod paths;
mod sidecar;
mod stripes;
mod traits;

pub use fs::FsStore;
pub use traits::{BodyStream, ByteRange, ObjectStore, StorageError};
