//! Download of the published reference snapshot

use crate::error::{Error, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

/// Fetches the reference database file over HTTP
pub struct SnapshotFetcher {
    client: Client,
}

impl SnapshotFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client })
    }

    /// Download `url` to `path`. The previous file is only replaced once the
    /// new one is fully written and looks like a SQLite database.
    pub async fn fetch(&self, url: &str, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        info!("Downloading reference snapshot from {}", url);

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Download {
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        if !bytes.starts_with(SQLITE_HEADER) {
            return Err(Error::InvalidImport(format!(
                "{} is not a SQLite database",
                url
            )));
        }

        let partial = partial_path(path);
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, path).await?;

        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        info!("Reference snapshot saved to {}", path.display());
        Ok(bytes.len() as u64)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_fetch_replaces_file() {
        let mut body = SQLITE_HEADER.to_vec();
        body.extend_from_slice(&[0u8; 84]);
        let expected = body.clone();
        let base = serve(Router::new().route(
            "/database.db",
            get(move || {
                let body = body.clone();
                async move { body }
            }),
        ))
        .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.db");
        std::fs::write(&path, b"stale").unwrap();

        let fetcher = SnapshotFetcher::new().unwrap();
        let written = fetcher.fetch(&format!("{}/database.db", base), &path).await.unwrap();

        assert_eq!(written, expected.len() as u64);
        assert_eq!(std::fs::read(&path).unwrap(), expected);
        assert!(!partial_path(&path).exists());
    }

    #[tokio::test]
    async fn test_fetch_keeps_file_on_failure() {
        let base = serve(
            Router::new()
                .route("/missing.db", get(|| async { StatusCode::NOT_FOUND }))
                .route("/page.db", get(|| async { "<html>not a database</html>" })),
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.db");
        std::fs::write(&path, b"previous").unwrap();
        let fetcher = SnapshotFetcher::new().unwrap();

        let missing = fetcher.fetch(&format!("{}/missing.db", base), &path).await;
        assert!(matches!(missing, Err(Error::Download { status: 404 })));

        let page = fetcher.fetch(&format!("{}/page.db", base), &path).await;
        assert!(matches!(page, Err(Error::InvalidImport(_))));

        assert_eq!(std::fs::read(&path).unwrap(), b"previous");
    }
}
