use crate::error::{Error, ExtractError, Result};
use crate::types::ArchiveType;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Archive decoder for the tar family (plain, gzip, bzip2)
pub struct TarDecoder;

impl TarDecoder {
    /// Decode a tar-family archive into the destination directory
    ///
    /// `archive_type` selects the compression wrapper; tar containers have no
    /// password support, so the engine never routes an encrypted retry here.
    pub fn extract(
        archive_path: &Path,
        dest_path: &Path,
        archive_type: ArchiveType,
    ) -> Result<Vec<PathBuf>> {
        debug!(?archive_path, ?archive_type, ?dest_path, "attempting tar extraction");

        std::fs::create_dir_all(dest_path)?;

        let file = std::fs::File::open(archive_path)?;

        let reader: Box<dyn Read> = match archive_type {
            ArchiveType::Tar => Box::new(file),
            ArchiveType::TarGz => Box::new(GzDecoder::new(file)),
            ArchiveType::TarBz2 => Box::new(BzDecoder::new(file)),
            other => {
                return Err(Error::Extract(ExtractError::DecodeFailed {
                    archive: archive_path.to_path_buf(),
                    reason: format!("{:?} is not a tar-family format", other),
                }));
            }
        };

        let mut archive = tar::Archive::new(reader);
        let mut extracted_files = Vec::new();

        let entries = archive.entries().map_err(|e| {
            Error::Extract(ExtractError::DecodeFailed {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to read tar entries: {}", e),
            })
        })?;

        for entry in entries {
            let mut entry = entry.map_err(|e| {
                Error::Extract(ExtractError::DecodeFailed {
                    archive: archive_path.to_path_buf(),
                    reason: format!("failed to read tar entry: {}", e),
                })
            })?;

            let entry_path = entry
                .path()
                .map_err(|e| {
                    Error::Extract(ExtractError::DecodeFailed {
                        archive: archive_path.to_path_buf(),
                        reason: format!("failed to read tar entry name: {}", e),
                    })
                })?
                .into_owned();

            // unpack_in refuses writes outside dest and reports them by
            // returning false; treat that as a traversal attempt
            let unpacked = entry.unpack_in(dest_path).map_err(|e| {
                Error::Extract(ExtractError::DecodeFailed {
                    archive: archive_path.to_path_buf(),
                    reason: format!("failed to unpack tar entry: {}", e),
                })
            })?;

            if !unpacked {
                return Err(Error::Extract(ExtractError::UnsafePath {
                    archive: archive_path.to_path_buf(),
                    entry: entry_path.display().to_string(),
                }));
            }

            if entry.header().entry_type().is_file() {
                extracted_files.push(dest_path.join(entry_path));
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "tar extraction successful"
        );

        Ok(extracted_files)
    }
}
