// src/feed/download.rs

//! Fetches a feed export to local disk.

use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// Stream `url` into `dest`, returning the number of bytes written.
///
/// The body is stored as served (compressed exports stay compressed) and
/// only replaces `dest` once fully received.
pub async fn download_feed(client: &reqwest::Client, url: &str, dest: &Path) -> Result<u64> {
    let context = format!("feed download {url}");
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::transport(&context, format!("error making request: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::transport(
            &context,
            format!("unexpected status code: {}", status.as_u16()),
        ));
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = dest.with_extension("part");
    let mut file = tokio::fs::File::create(&tmp).await?;

    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AppError::transport(&context, format!("error reading body: {e}")))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, dest).await?;
    log::info!("Downloaded {} ({} bytes) to {}", url, written, dest.display());
    Ok(written)
}
