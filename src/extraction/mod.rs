//! Archive extraction with password support
//!
//! This module decodes ZIP, 7z, RAR, and tar-family archives into a job's
//! working directory. The container format is detected from the file's
//! content signature, never the name. Encrypted archives without a usable
//! password are reported as password-required with no partial output left
//! behind; the retry loop lives in the job layer.

mod rar;
mod sevenz;
mod signature;
mod tar;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

// Re-exports
pub use rar::RarDecoder;
pub use sevenz::SevenZipDecoder;
pub use signature::detect_archive_type;
pub use tar::TarDecoder;
pub use zip::ZipDecoder;

use crate::error::{Error, ExtractError, Result};
use crate::types::{ArchiveType, JobId};
use std::path::{Path, PathBuf};
use tokio::task::spawn_blocking;
use tracing::{info, warn};

/// Result of one extraction attempt
#[must_use]
#[derive(Debug)]
pub enum ExtractOutcome {
    /// Decoding succeeded; paths of all extracted files
    Extracted(Vec<PathBuf>),
    /// The archive is encrypted and the supplied password (if any) did not
    /// open it; the destination directory is left empty
    PasswordRequired,
    /// The content signature matched no supported container format; the
    /// destination directory is left untouched
    Unsupported,
}

/// Unified archive extraction dispatcher
///
/// Detects the container format by signature and routes to the appropriate
/// decoder (ZIP, 7z, RAR, or tar family). Decoding runs on a blocking thread
/// so other jobs keep making progress. One password attempt per call — the
/// job layer owns the password-required retry loop.
///
/// On a password failure any partially written output is discarded before
/// `PasswordRequired` is returned, so the destination is empty on every
/// non-success outcome. Decode failures (corruption, traversal entries,
/// I/O errors) are returned as errors; the caller cleans up both working
/// paths on that path.
///
/// # Example
/// ```no_run
/// use unpack_relay::extraction::{extract_archive, ExtractOutcome};
/// use unpack_relay::types::JobId;
/// use std::path::Path;
///
/// # async fn example() -> unpack_relay::error::Result<()> {
/// match extract_archive(
///     JobId(1),
///     Path::new("photos.zip"),
///     Path::new("/tmp/extract"),
///     None,
/// )
/// .await?
/// {
///     ExtractOutcome::Extracted(files) => println!("extracted {} files", files.len()),
///     ExtractOutcome::PasswordRequired => println!("password needed"),
///     ExtractOutcome::Unsupported => println!("not an archive we know"),
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_archive(
    job_id: JobId,
    archive_path: &Path,
    dest_path: &Path,
    password: Option<&str>,
) -> Result<ExtractOutcome> {
    let Some(archive_type) = detect_archive_type(archive_path)? else {
        info!(
            job_id = job_id.0,
            ?archive_path,
            "no supported container signature found"
        );
        return Ok(ExtractOutcome::Unsupported);
    };

    info!(
        job_id = job_id.0,
        ?archive_path,
        ?archive_type,
        has_password = password.is_some(),
        "dispatching extraction to appropriate decoder"
    );

    // Decoding is CPU/IO bound; keep it off the async runtime
    let archive_owned = archive_path.to_path_buf();
    let dest_owned = dest_path.to_path_buf();
    let password_owned = password.map(str::to_owned);

    let result = spawn_blocking(move || {
        let password = password_owned.as_deref();
        match archive_type {
            ArchiveType::Zip => ZipDecoder::extract(&archive_owned, &dest_owned, password),
            ArchiveType::SevenZip => {
                SevenZipDecoder::extract(&archive_owned, &dest_owned, password)
            }
            ArchiveType::Rar => RarDecoder::extract(&archive_owned, &dest_owned, password),
            ArchiveType::Tar | ArchiveType::TarGz | ArchiveType::TarBz2 => {
                TarDecoder::extract(&archive_owned, &dest_owned, archive_type)
            }
        }
    })
    .await
    .map_err(|e| {
        Error::Extract(ExtractError::DecodeFailed {
            archive: archive_path.to_path_buf(),
            reason: format!("extraction task panicked: {}", e),
        })
    })?;

    match result {
        Ok(files) => Ok(ExtractOutcome::Extracted(files)),
        Err(Error::Extract(ExtractError::WrongPassword { .. })) => {
            // A mid-extraction mismatch may have written entries already;
            // the password-required contract guarantees an empty destination
            discard_partial_output(dest_path).await;
            Ok(ExtractOutcome::PasswordRequired)
        }
        Err(e) => Err(e),
    }
}

/// Remove and recreate the destination so a retry starts from an empty dir
async fn discard_partial_output(dest_path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dest_path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(?dest_path, error = %e, "failed to discard partial extraction output");
    }
    if let Err(e) = tokio::fs::create_dir_all(dest_path).await {
        warn!(?dest_path, error = %e, "failed to recreate extraction directory");
    }
}
