// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Bundle extraction.
//!
//! Bundles wrap their content in one top-level folder, so the first path
//! component of every entry is dropped on extraction.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Failed to decompress zip file: {0}")]
pub struct ArchiveError(pub String);

impl From<io::Error> for ArchiveError {
    fn from(e: io::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(e: zip::result::ZipError) -> Self {
        Self(e.to_string())
    }
}

/// Extract `archive` into `destination` off the async runtime.
pub async fn extract_bundle(archive: &Path, destination: &Path) -> Result<usize, ArchiveError> {
    let archive = archive.to_path_buf();
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || extract_stripped(&archive, &destination))
        .await
        .map_err(|e| ArchiveError(e.to_string()))?
}

/// Returns the number of files written.
fn extract_stripped(archive: &Path, destination: &Path) -> Result<usize, ArchiveError> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let mut written = 0;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let Some(enclosed) = entry.enclosed_name() else {
            return Err(ArchiveError(format!("unsafe entry path {}", entry.name())));
        };
        let stripped: PathBuf = enclosed.components().skip(1).collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }
        let target = destination.join(stripped);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        written += 1;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
            }
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn bundle(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(fs::File::create(path).unwrap());
        for (name, body) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn strips_top_level_folder() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("b.zip");
        bundle(
            &archive,
            &[
                ("app-master/index.js", "console.log(1)"),
                ("app-master/public/index.html", "<html/>"),
            ],
        );
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let count = extract_bundle(&archive, &out).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(fs::read_to_string(out.join("index.js")).unwrap(), "console.log(1)");
        assert!(out.join("public/index.html").exists());
    }

    #[tokio::test]
    async fn garbage_is_a_decompress_error() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("b.zip");
        fs::write(&archive, b"not a zip").unwrap();
        let err = extract_bundle(&archive, dir.path()).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to decompress zip file: "));
    }
}
