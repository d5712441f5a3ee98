// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HTTP fetch of dapp bundles.

use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to download dapp {link} with err code: {status}")]
    Status { link: String, status: u16 },
    #[error("Failed to download dapp {link} with error: {message}")]
    Transport { link: String, message: String },
    #[error("Failed to write bundle {path}: {message}")]
    Io { path: String, message: String },
}

/// Streams bundles to disk. The timeout covers the whole transfer.
#[derive(Clone)]
pub struct BundleDownloader {
    client: reqwest::Client,
}

impl BundleDownloader {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DownloadError::Transport {
                link: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Download `link` into `destination`. A partial file is removed on failure.
    pub async fn download(&self, link: &str, destination: &Path) -> Result<u64, DownloadError> {
        let result = self.fetch(link, destination).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(destination).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %destination.display(), error = %e, "Failed to remove partial bundle");
                }
            }
        }
        result
    }

    async fn fetch(&self, link: &str, destination: &Path) -> Result<u64, DownloadError> {
        let transport = |e: reqwest::Error| DownloadError::Transport {
            link: link.to_string(),
            message: e.to_string(),
        };
        let io = |e: std::io::Error| DownloadError::Io {
            path: destination.display().to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(link).send().await.map_err(transport)?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DownloadError::Status {
                link: link.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(destination).await.map_err(io)?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            file.write_all(&chunk).await.map_err(io)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io)?;

        debug!(link = %link, bytes = written, "Bundle downloaded");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_body_to_destination() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/app.zip")
            .with_status(200)
            .with_body("bundle-bytes")
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("d1.zip");

        let downloader = BundleDownloader::new(Duration::from_secs(5)).unwrap();
        let bytes = downloader
            .download(&format!("{}/app.zip", server.url()), &destination)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, 12);
        assert_eq!(std::fs::read(&destination).unwrap(), b"bundle-bytes");
    }

    #[tokio::test]
    async fn non_ok_status_is_reported_with_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing.zip")
            .with_status(404)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("d1.zip");
        let link = format!("{}/missing.zip", server.url());

        let err = BundleDownloader::new(Duration::from_secs(5))
            .unwrap()
            .download(&link, &destination)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Failed to download dapp {} with err code: 404", link)
        );
        assert!(!destination.exists());
    }
}
