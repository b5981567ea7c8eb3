//! Per-page download state machine
//!
//! Drives one page image from `Pending` through `Fetching` and `Writing`
//! to `Verified`, or to `Failed`. The two guarantees callers rely on:
//! a previously completed page (non-empty file at the target path) is
//! never re-fetched, and a zero-byte or missing file is never reported as
//! downloaded. Bodies are written in fixed-size chunks to a temp file and
//! atomically renamed into place, so interruption cannot leave a verified
//! artifact with a truncated body.

use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::app::fetch::Fetch;
use crate::app::models::{LocalArtifact, PageImage};
use crate::constants::files;
use crate::errors::{DownloadError, DownloadResult};

/// Terminal outcome of driving one page through the state machine
#[derive(Debug)]
pub enum ItemOutcome {
    /// Target already existed with non-zero size; no fetch was issued
    Skipped(LocalArtifact),
    /// Fetched, written and verified non-empty
    Verified(LocalArtifact),
    /// Fetch or verification failed; no artifact claims success
    Failed,
}

impl ItemOutcome {
    /// The artifact, when one exists
    pub fn artifact(&self) -> Option<&LocalArtifact> {
        match self {
            ItemOutcome::Skipped(a) | ItemOutcome::Verified(a) => Some(a),
            ItemOutcome::Failed => None,
        }
    }
}

/// Drive one page image to a local path.
///
/// Failure is a value, not an error: a failed page must not abort its
/// chapter, so the only way this surfaces problems is `ItemOutcome::Failed`.
pub async fn download_page<F: Fetch>(
    fetcher: &mut F,
    page: &PageImage,
    destination: &Path,
) -> ItemOutcome {
    // Idempotent resume: an existing non-empty file short-circuits the
    // whole state machine before any fetch.
    if let Ok(metadata) = tokio::fs::metadata(destination).await {
        if metadata.len() > 0 {
            debug!(
                ordinal = page.ordinal,
                path = %destination.display(),
                "page already present, skipping"
            );
            return ItemOutcome::Skipped(LocalArtifact {
                ordinal: page.ordinal,
                file_path: destination.to_path_buf(),
                byte_size: metadata.len(),
            });
        }
    }

    match fetch_and_write(fetcher, page, destination).await {
        Ok(artifact) => {
            info!(
                ordinal = page.ordinal,
                bytes = artifact.byte_size,
                "page verified"
            );
            ItemOutcome::Verified(artifact)
        }
        Err(e) => {
            warn!(ordinal = page.ordinal, url = %page.source_url, "page failed: {}", e);
            ItemOutcome::Failed
        }
    }
}

/// Fetching → Writing → verification, with atomic temp-file rename
async fn fetch_and_write<F: Fetch>(
    fetcher: &mut F,
    page: &PageImage,
    destination: &Path,
) -> DownloadResult<LocalArtifact> {
    let result = fetcher.fetch(&page.source_url).await?;

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let temp_path = destination.with_extension(format!(
        "{}{}",
        destination
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or(""),
        files::TEMP_FILE_SUFFIX
    ));

    let write_result = write_chunked(&temp_path, &result.content).await;
    if let Err(e) = write_result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    tokio::fs::rename(&temp_path, destination).await.map_err(|_| {
        DownloadError::AtomicOperationFailed {
            temp_path: temp_path.clone(),
            final_path: destination.to_path_buf(),
        }
    })?;

    // Writing → Verified only if the file exists with size > 0; an empty
    // body demotes the download to failure even though the transport
    // reported success.
    let metadata = tokio::fs::metadata(destination).await?;
    if metadata.len() == 0 {
        let _ = tokio::fs::remove_file(destination).await;
        return Err(DownloadError::ArtifactInvalid {
            path: destination.to_path_buf(),
        });
    }

    Ok(LocalArtifact {
        ordinal: page.ordinal,
        file_path: destination.to_path_buf(),
        byte_size: metadata.len(),
    })
}

/// Stream the body to disk in fixed-size chunks
async fn write_chunked(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path).await?;
    for chunk in content.chunks(files::WRITE_CHUNK_SIZE) {
        file.write_all(chunk).await?;
    }
    file.flush().await?;
    Ok(())
}
