//! Append-only NDJSON journals backing the local sinks.
//!
//! A flush appends one line per entry, so its cost follows the batch size
//! rather than the size of the file. Readers replay the journal and may
//! compact it with [`rewrite`].

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

fn encode<'a, T, I>(entries: I) -> Result<Vec<u8>>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut buffer = Vec::new();
    for entry in entries {
        serde_json::to_writer(&mut buffer, entry)?;
        buffer.push(b'\n');
    }
    Ok(buffer)
}

/// Append entries in a single write.
pub async fn append<'a, T, I>(path: &Path, entries: I) -> Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let buffer = encode(entries)?;
    if buffer.is_empty() {
        return Ok(());
    }
    ensure_parent(path).await?;

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    Ok(())
}

/// Replace the journal atomically (write to temp, then rename).
pub async fn rewrite<'a, T, I>(path: &Path, entries: I) -> Result<()>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let buffer = encode(entries)?;
    ensure_parent(path).await?;

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&buffer).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Read every entry, or `None` when the journal does not exist.
///
/// A torn final line (no trailing newline) is dropped with a warning.
pub async fn replay<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AppError::Io(e)),
    };

    let complete = bytes.ends_with(b"\n");
    let lines: Vec<&[u8]> = bytes.split(|b| *b == b'\n').collect();
    let last = lines.len().saturating_sub(1);

    let mut entries = Vec::with_capacity(lines.len());
    for (number, line) in lines.into_iter().enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice(line) {
            Ok(entry) => entries.push(entry),
            Err(e) if number == last && !complete => {
                log::warn!("Dropping torn last line of {}: {}", path.display(), e);
            }
            Err(e) => {
                return Err(AppError::store(
                    format!("{} line {}", path.display(), number + 1),
                    e,
                ));
            }
        }
    }
    Ok(Some(entries))
}
