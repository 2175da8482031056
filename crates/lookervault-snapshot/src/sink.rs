use std::path::Path;

use crate::error::SnapshotError;
use crate::metadata::SnapshotMetadata;

/// Destination for the content-store file once extraction or restoration
/// has finished with it. Implementations are object-storage-agnostic; a
/// real deployment backs this with S3/GCS/Azure Blob, none of which this
/// crate depends on directly (see [`crate::local::LocalDirSnapshotSink`]
/// for the reference implementation used in tests).
pub trait SnapshotSink: Send + Sync {
    /// Uploads the file at `path`, naming it with `prefix` and the current
    /// time per [`SnapshotMetadata::filename_for`].
    fn upload(&self, path: &Path, prefix: &str) -> Result<SnapshotMetadata, SnapshotError>;

    /// Lists snapshots previously uploaded under `prefix`, newest first.
    fn list(&self, prefix: &str) -> Result<Vec<SnapshotMetadata>, SnapshotError>;

    /// Downloads the snapshot named `reference` (a filename returned by
    /// `upload`/`list`) to `dest`.
    fn download(&self, reference: &str, dest: &Path) -> Result<(), SnapshotError>;

    /// Deletes the snapshot named `reference`.
    fn delete(&self, reference: &str) -> Result<(), SnapshotError>;
}
