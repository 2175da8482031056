//! Object-storage-agnostic contract for shipping the content-store file off
//! to durable storage once an extraction or restoration run completes.

mod error;
mod local;
mod metadata;
mod sink;

pub use error::SnapshotError;
pub use local::LocalDirSnapshotSink;
pub use metadata::SnapshotMetadata;
pub use sink::SnapshotSink;
