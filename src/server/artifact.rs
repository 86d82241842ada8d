//! Fetching the server jar named by `jarUrl`.
//!
//! The jar is streamed into a uniquely named part file next to its
//! destination and renamed into place once complete, so an interrupted
//! download never leaves a truncated `server.jar` behind.

use crate::error::{Error, Result};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// File name of the server artifact inside a server directory
pub const JAR_FILE: &str = "server.jar";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client used for artifact downloads
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("mcs-manager/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Transport(format!("Failed to build HTTP client: {}", e)))
}

/// Make sure `<dir>/server.jar` exists, downloading it from `url` if needed.
///
/// An existing jar is kept as is.
pub async fn ensure_jar(http: &reqwest::Client, url: &str, dir: &Path) -> Result<()> {
    let dest = dir.join(JAR_FILE);
    if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
        tracing::debug!(path = %dest.display(), "Server jar already present");
        return Ok(());
    }

    let part = dir.join(format!("{}.{}.part", JAR_FILE, Uuid::new_v4().simple()));
    let result = download(http, url, &part).await;
    let result = match result {
        Ok(bytes) => tokio::fs::rename(&part, &dest)
            .await
            .map(|_| bytes)
            .map_err(|e| Error::Download(format!("Failed to move {} into place: {}", JAR_FILE, e))),
        Err(e) => Err(e),
    };

    match result {
        Ok(bytes) => {
            tracing::info!(url, path = %dest.display(), bytes, "Downloaded server jar");
            Ok(())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&part).await;
            tracing::error!(url, error = %e, "Failed to download server jar");
            Err(e)
        }
    }
}

async fn download(http: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let response = http
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(|e| Error::Download(format!("Failed to fetch {}: {}", url, e)))?;

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| Error::Download(format!("Failed to create {}: {}", dest.display(), e)))?;

    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| Error::Download(format!("Error reading {}: {}", url, e)))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::Download(format!("Error writing {}: {}", dest.display(), e)))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| Error::Download(format!("Error writing {}: {}", dest.display(), e)))?;

    Ok(written)
}
