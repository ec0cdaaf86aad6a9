use crate::error::{Error, ExtractError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Archive decoder for ZIP files
pub struct ZipDecoder;

impl ZipDecoder {
    /// Check whether the archive contains at least one encrypted entry
    ///
    /// Used to report a missing password before any extraction is attempted,
    /// so no partial output is ever written for an encrypted archive.
    /// Opening an encrypted entry without a password fails up front, before
    /// any data is read, which is exactly the signal needed here.
    pub fn has_encrypted_entries(archive_path: &Path) -> Result<bool> {
        let file = std::fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            Error::Extract(ExtractError::DecodeFailed {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to read ZIP archive: {}", e),
            })
        })?;

        for i in 0..archive.len() {
            if let Err(e) = archive.by_index(i) {
                let err_str = e.to_string();
                if err_str.contains("password")
                    || err_str.contains("Password")
                    || err_str.contains("encrypted")
                {
                    return Ok(true);
                }
                return Err(Error::Extract(ExtractError::DecodeFailed {
                    archive: archive_path.to_path_buf(),
                    reason: format!("failed to read ZIP entry: {}", e),
                }));
            }
        }

        Ok(false)
    }

    /// Open a ZIP entry by index, handling password decryption if needed
    fn open_entry<'a>(
        archive: &'a mut zip::ZipArchive<std::fs::File>,
        index: usize,
        password: Option<&str>,
        archive_path: &Path,
    ) -> Result<zip::read::ZipFile<'a>> {
        match password {
            None => archive.by_index(index).map_err(|e| {
                let err_str = e.to_string();
                if err_str.contains("password")
                    || err_str.contains("Password")
                    || err_str.contains("encrypted")
                {
                    Error::Extract(ExtractError::WrongPassword {
                        archive: archive_path.to_path_buf(),
                    })
                } else {
                    Error::Extract(ExtractError::DecodeFailed {
                        archive: archive_path.to_path_buf(),
                        reason: format!("failed to read ZIP entry: {}", e),
                    })
                }
            }),
            Some(password) => archive
                .by_index_decrypt(index, password.as_bytes())
                .map_err(|e| {
                    let err_str = e.to_string();
                    if err_str.contains("password")
                        || err_str.contains("Password")
                        || err_str.contains("encrypted")
                    {
                        Error::Extract(ExtractError::WrongPassword {
                            archive: archive_path.to_path_buf(),
                        })
                    } else {
                        Error::Extract(ExtractError::DecodeFailed {
                            archive: archive_path.to_path_buf(),
                            reason: format!("failed to read ZIP entry: {}", e),
                        })
                    }
                })?
                .map_err(|_| {
                    Error::Extract(ExtractError::WrongPassword {
                        archive: archive_path.to_path_buf(),
                    })
                }),
        }
    }

    /// Extract a single ZIP entry to disk, creating directories as needed
    ///
    /// Directory entries are created without content extraction. Entries
    /// whose stored name escapes the destination are rejected outright.
    fn extract_entry(
        mut file: zip::read::ZipFile,
        dest_path: &Path,
        archive_path: &Path,
    ) -> Result<Option<PathBuf>> {
        let file_path = match file.enclosed_name() {
            Some(path) => dest_path.join(path),
            None => {
                return Err(Error::Extract(ExtractError::UnsafePath {
                    archive: archive_path.to_path_buf(),
                    entry: file.name().to_string(),
                }));
            }
        };

        if file.is_dir() {
            std::fs::create_dir_all(&file_path)?;
            return Ok(None);
        }

        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut outfile = std::fs::File::create(&file_path)?;

        std::io::copy(&mut file, &mut outfile).map_err(|e| {
            let err_str = e.to_string();
            if err_str.contains("password")
                || err_str.contains("Password")
                || err_str.contains("encrypted")
            {
                Error::Extract(ExtractError::WrongPassword {
                    archive: archive_path.to_path_buf(),
                })
            } else {
                Error::Io(std::io::Error::other(format!(
                    "failed to extract file: {}",
                    e
                )))
            }
        })?;

        Ok(Some(file_path))
    }

    /// Decode a ZIP archive into the destination directory
    ///
    /// With no password supplied, encrypted archives are reported as
    /// `WrongPassword` before any entry is written.
    pub fn extract(
        archive_path: &Path,
        dest_path: &Path,
        password: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        debug!(
            ?archive_path,
            has_password = password.is_some(),
            ?dest_path,
            "attempting ZIP extraction"
        );

        if password.is_none() && Self::has_encrypted_entries(archive_path)? {
            return Err(Error::Extract(ExtractError::WrongPassword {
                archive: archive_path.to_path_buf(),
            }));
        }

        std::fs::create_dir_all(dest_path)?;

        let file = std::fs::File::open(archive_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            Error::Extract(ExtractError::DecodeFailed {
                archive: archive_path.to_path_buf(),
                reason: format!("failed to read ZIP archive: {}", e),
            })
        })?;

        let mut extracted_files = Vec::new();

        for i in 0..archive.len() {
            let file = Self::open_entry(&mut archive, i, password, archive_path)?;

            if let Some(file_path) = Self::extract_entry(file, dest_path, archive_path)? {
                extracted_files.push(file_path);
            }
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "ZIP extraction successful"
        );

        Ok(extracted_files)
    }
}
