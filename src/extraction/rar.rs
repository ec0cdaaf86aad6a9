use crate::error::{Error, ExtractError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Archive decoder for RAR files
pub struct RarDecoder;

impl RarDecoder {
    /// Check if an unrar error indicates a password problem
    fn is_password_error(error_msg: &str) -> bool {
        error_msg.contains("password")
            || error_msg.contains("encrypted")
            || error_msg.contains("ERAR_BAD_PASSWORD")
            || error_msg.contains("ERAR_MISSING_PASSWORD")
    }

    /// Convert an unrar error to our error type, checking for password errors
    fn convert_unrar_error(e: unrar::error::UnrarError, archive_path: &Path) -> Error {
        let err_str = e.to_string();
        if Self::is_password_error(&err_str) {
            Error::Extract(ExtractError::WrongPassword {
                archive: archive_path.to_path_buf(),
            })
        } else {
            Error::Extract(ExtractError::DecodeFailed {
                archive: archive_path.to_path_buf(),
                reason: err_str,
            })
        }
    }

    /// Decode a RAR archive into the destination directory
    ///
    /// Password failures surface as `WrongPassword`; entries whose stored
    /// name climbs out of the destination are rejected as unsafe.
    pub fn extract(
        archive_path: &Path,
        dest_path: &Path,
        password: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        debug!(
            ?archive_path,
            has_password = password.is_some(),
            ?dest_path,
            "attempting RAR extraction"
        );

        std::fs::create_dir_all(dest_path)?;

        let archive = match password {
            None => unrar::Archive::new(archive_path),
            Some(password) => unrar::Archive::with_password(archive_path, password.as_bytes()),
        };

        let processor = archive
            .open_for_processing()
            .map_err(|e| Self::convert_unrar_error(e, archive_path))?;

        let mut extracted_files = Vec::new();

        // Process each entry using the state machine interface
        let mut at_header = processor;
        loop {
            // Read the next header - transitions to BeforeFile state
            let at_file = match at_header.read_header() {
                Ok(Some(entry_processor)) => entry_processor,
                Ok(None) => break, // No more entries
                Err(e) => return Err(Self::convert_unrar_error(e, archive_path)),
            };

            let header = at_file.entry();

            // Any parent/root component in the stored name is a traversal
            // attempt; refuse the archive rather than writing outside dest
            let entry_name = Path::new(&header.filename).to_path_buf();
            if entry_name
                .components()
                .any(|c| !matches!(c, std::path::Component::Normal(_)))
            {
                return Err(Error::Extract(ExtractError::UnsafePath {
                    archive: archive_path.to_path_buf(),
                    entry: entry_name.display().to_string(),
                }));
            }

            let file_path = dest_path.join(&entry_name);

            if header.is_directory() {
                // Directory entries are created without content extraction
                std::fs::create_dir_all(&file_path)?;
                at_header = at_file.skip().map_err(|e| {
                    Error::Extract(ExtractError::DecodeFailed {
                        archive: archive_path.to_path_buf(),
                        reason: format!("failed to skip directory: {}", e),
                    })
                })?;
            } else {
                // Extract the file - transitions back to BeforeHeader state
                at_header = at_file
                    .extract_to(&file_path)
                    .map_err(|e| Self::convert_unrar_error(e, archive_path))?;
                extracted_files.push(file_path);
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "RAR extraction successful"
        );

        Ok(extracted_files)
    }
}
