//! The archive collector (C10): downloads a site archive, verifies it,
//! and extracts it into a workspace directory. Grounded in
//! `publisher/worker/collector.py`'s `ZIPCollector` - a bad archive is bad
//! on every retry, so every failure here is a no-retry error.

use crate::utils::errors::PublishError;
use std::path::Path;
use tracing::{debug, warn};

/// Downloads the archive at `url`, validates it, and extracts its
/// contents into `working_dir`.
pub async fn collect(client: &reqwest::Client, url: &str, working_dir: &Path) -> Result<(), PublishError> {
    let bytes = download(client, url).await?;
    let archive_path = std::env::temp_dir().join(format!("publisher-archive-{}.zip", uuid::Uuid::new_v4()));
    std::fs::write(&archive_path, &bytes)?;
    let result = validate_and_extract(&archive_path, working_dir);
    let _ = std::fs::remove_file(&archive_path);
    result
}

async fn download(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, PublishError> {
    debug!(%url, "downloading archive");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| PublishError::Transport(format!("archive download failed: {e}")))?;
    if !response.status().is_success() {
        return Err(PublishError::Archive(format!(
            "archive download returned status {}",
            response.status()
        )));
    }
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| PublishError::Transport(format!("archive download failed: {e}")))
}

fn validate_and_extract(archive_path: &Path, working_dir: &Path) -> Result<(), PublishError> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| PublishError::Archive(format!("not a valid zip file: {e}")))?;

    debug!("checking archive entry names and CRCs");
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| PublishError::Archive(format!("corrupt zip entry: {e}")))?;
        let name = entry.name();
        if name.contains("..") || name.starts_with('/') {
            warn!(name, "invalid filename in archive");
            return Err(PublishError::Security(format!("invalid filename in archive: {name}")));
        }
        if reject_absolute_or_rooted(name) {
            warn!(name, "rejecting archive entry outside working directory");
            return Err(PublishError::Security(format!("invalid filename in archive: {name}")));
        }
    }

    // `ZipArchive::by_index` already verifies the entry's CRC-32 against
    // its declared value as it decompresses, so fully reading every entry
    // once is the Rust-side equivalent of Python's `zfile.testzip()`.
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| PublishError::Archive(format!("corrupt zip entry: {e}")))?;
        let mut sink = std::io::sink();
        std::io::copy(&mut entry, &mut sink)
            .map_err(|e| PublishError::Archive(format!("CRC check failed for {}: {e}", entry.name())))?;
    }

    debug!(dir = %working_dir.display(), "extracting archive");
    archive
        .extract(working_dir)
        .map_err(|e| PublishError::Archive(format!("extraction failed: {e}")))?;
    Ok(())
}

fn reject_absolute_or_rooted(name: &str) -> bool {
    Path::new(name).components().any(|c| matches!(c, std::path::Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_zip_with_entry(path: &Path, name: &str, content: &[u8]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer.start_file(name, zip::write::SimpleFileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_a_well_formed_archive() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("site.zip");
        write_zip_with_entry(&archive_path, "index.html", b"hello world");

        let out_dir = TempDir::new().unwrap();
        validate_and_extract(&archive_path, out_dir.path()).unwrap();

        let extracted = std::fs::read(out_dir.path().join("index.html")).unwrap();
        assert_eq!(extracted, b"hello world");
    }

    #[test]
    fn rejects_path_traversal_entries() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("evil.zip");
        write_zip_with_entry(&archive_path, "../evil.sh", b"#!/bin/sh");

        let out_dir = TempDir::new().unwrap();
        let err = validate_and_extract(&archive_path, out_dir.path()).unwrap_err();
        assert!(err.is_no_retry());
    }

    #[test]
    fn rejects_absolute_path_entries() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("rooted.zip");
        write_zip_with_entry(&archive_path, "/etc/passwd", b"root:x:0:0");

        let out_dir = TempDir::new().unwrap();
        let err = validate_and_extract(&archive_path, out_dir.path()).unwrap_err();
        assert!(err.is_no_retry());
    }

    #[test]
    fn rejects_a_file_that_is_not_a_zip_archive() {
        let dir = TempDir::new().unwrap();
        let archive_path = dir.path().join("not-a-zip.bin");
        std::fs::write(&archive_path, b"this is not a zip file").unwrap();

        let out_dir = TempDir::new().unwrap();
        let err = validate_and_extract(&archive_path, out_dir.path()).unwrap_err();
        assert!(err.is_no_retry());
    }
}
