use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::SnapshotError;
use crate::metadata::SnapshotMetadata;
use crate::sink::SnapshotSink;

/// `SnapshotSink` backed by a plain local directory. Used by integration
/// tests to exercise the upload/list/download/delete contract without a
/// real object-storage SDK.
///
/// Each snapshot is stored as its own file alongside a `.crc32c` sidecar
/// recording the checksum and uncompressed size, so `download` can verify
/// integrity without re-reading the whole directory.
pub struct LocalDirSnapshotSink {
    dir: PathBuf,
    gzip: bool,
}

impl LocalDirSnapshotSink {
    pub fn new(dir: impl Into<PathBuf>, gzip: bool) -> Self {
        Self {
            dir: dir.into(),
            gzip,
        }
    }

    fn sidecar_path(&self, filename: &str) -> PathBuf {
        self.dir.join(format!("{filename}.crc32c"))
    }

    fn write_sidecar(&self, filename: &str, crc: u32, size_bytes: u64) -> Result<(), SnapshotError> {
        let contents = format!("crc32c={crc:08x}\nsize={size_bytes}\n");
        fs::write(self.sidecar_path(filename), contents)?;
        Ok(())
    }

    fn read_sidecar(&self, filename: &str) -> Result<(u32, u64), SnapshotError> {
        let raw = fs::read_to_string(self.sidecar_path(filename))
            .map_err(|_| SnapshotError::NotFound(filename.to_string()))?;
        let mut crc = None;
        let mut size = None;
        for line in raw.lines() {
            if let Some(v) = line.strip_prefix("crc32c=") {
                crc = u32::from_str_radix(v, 16).ok();
            } else if let Some(v) = line.strip_prefix("size=") {
                size = v.parse().ok();
            }
        }
        match (crc, size) {
            (Some(crc), Some(size)) => Ok((crc, size)),
            _ => Err(SnapshotError::Malformed(filename.to_string())),
        }
    }
}

impl SnapshotSink for LocalDirSnapshotSink {
    fn upload(&self, path: &Path, prefix: &str) -> Result<SnapshotMetadata, SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        let raw = fs::read(path)?;
        let crc = crc32c::crc32c(&raw);
        let size_bytes = raw.len() as u64;
        let created_at = Utc::now();
        let filename = SnapshotMetadata::filename_for(prefix, created_at, self.gzip);
        let dest = self.dir.join(&filename);

        if self.gzip {
            let file = File::create(&dest)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&raw)?;
            encoder.finish()?;
        } else {
            fs::write(&dest, &raw)?;
        }
        self.write_sidecar(&filename, crc, size_bytes)?;

        Ok(SnapshotMetadata {
            filename,
            prefix: prefix.to_string(),
            created_at,
            size_bytes,
            crc32c: crc,
            gzip: self.gzip,
        })
    }

    fn list(&self, prefix: &str) -> Result<Vec<SnapshotMetadata>, SnapshotError> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().into_owned();
            if filename.ends_with(".crc32c") {
                continue;
            }
            let (file_prefix, created_at, gzip) = match SnapshotMetadata::parse_filename(&filename)
            {
                Ok(parsed) => parsed,
                Err(_) => continue,
            };
            if file_prefix != prefix {
                continue;
            }
            let (crc, size_bytes) = self.read_sidecar(&filename)?;
            out.push(SnapshotMetadata {
                filename,
                prefix: file_prefix,
                created_at,
                size_bytes,
                crc32c: crc,
                gzip,
            });
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    fn download(&self, reference: &str, dest: &Path) -> Result<(), SnapshotError> {
        let src = self.dir.join(reference);
        let (expected_crc, _) = self.read_sidecar(reference)?;
        let (_, _, gzip) = SnapshotMetadata::parse_filename(reference)?;

        let raw = if gzip {
            let file = File::open(&src).map_err(|_| SnapshotError::NotFound(reference.to_string()))?;
            let mut decoder = GzDecoder::new(file);
            let mut buf = Vec::new();
            decoder.read_to_end(&mut buf)?;
            buf
        } else {
            fs::read(&src).map_err(|_| SnapshotError::NotFound(reference.to_string()))?
        };

        let actual_crc = crc32c::crc32c(&raw);
        if actual_crc != expected_crc {
            return Err(SnapshotError::ChecksumMismatch {
                reference: reference.to_string(),
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, raw)?;
        Ok(())
    }

    fn delete(&self, reference: &str) -> Result<(), SnapshotError> {
        let path = self.dir.join(reference);
        fs::remove_file(&path).map_err(|_| SnapshotError::NotFound(reference.to_string()))?;
        let _ = fs::remove_file(self.sidecar_path(reference));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_source(dir: &Path, contents: &[u8]) -> PathBuf {
        let path = dir.join("content.db");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn upload_list_download_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), b"hello lookervault");

        let sink = LocalDirSnapshotSink::new(tmp.path(), false);
        let uploaded = sink.upload(&source, "lookervault").unwrap();
        assert_eq!(uploaded.prefix, "lookervault");
        assert!(!uploaded.gzip);

        let listed = sink.list("lookervault").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].filename, uploaded.filename);

        let dest = tmp.path().join("restored.db");
        sink.download(&uploaded.filename, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"hello lookervault");
    }

    #[test]
    fn gzip_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), b"compressible payload payload payload");

        let sink = LocalDirSnapshotSink::new(tmp.path(), true);
        let uploaded = sink.upload(&source, "nightly").unwrap();
        assert!(uploaded.filename.ends_with(".db.gz"));

        let dest = tmp.path().join("restored.db");
        sink.download(&uploaded.filename, &dest).unwrap();
        assert_eq!(
            fs::read(&dest).unwrap(),
            b"compressible payload payload payload"
        );
    }

    #[test]
    fn download_detects_checksum_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), b"original");

        let sink = LocalDirSnapshotSink::new(tmp.path(), false);
        let uploaded = sink.upload(&source, "prefix").unwrap();

        fs::write(tmp.path().join(&uploaded.filename), b"corrupted!").unwrap();

        let dest = tmp.path().join("restored.db");
        let err = sink.download(&uploaded.filename, &dest).unwrap_err();
        assert!(matches!(err, SnapshotError::ChecksumMismatch { .. }));
    }

    #[test]
    fn delete_removes_snapshot_and_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), b"to be deleted");

        let sink = LocalDirSnapshotSink::new(tmp.path(), false);
        let uploaded = sink.upload(&source, "prefix").unwrap();
        sink.delete(&uploaded.filename).unwrap();

        assert!(sink.list("prefix").unwrap().is_empty());
        assert!(sink.download(&uploaded.filename, &tmp.path().join("x")).is_err());
    }

    #[test]
    fn list_only_returns_matching_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let source = write_source(src_dir.path(), b"data");

        let sink = LocalDirSnapshotSink::new(tmp.path(), false);
        sink.upload(&source, "alpha").unwrap();
        sink.upload(&source, "beta").unwrap();

        assert_eq!(sink.list("alpha").unwrap().len(), 1);
        assert_eq!(sink.list("beta").unwrap().len(), 1);
        assert_eq!(sink.list("gamma").unwrap().len(), 0);
    }
}
