use crate::error::{Error, ExtractError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Archive decoder for 7z files
pub struct SevenZipDecoder;

impl SevenZipDecoder {
    /// Decode a 7z archive into the destination directory
    ///
    /// The 7z container reports missing or wrong passwords on the first
    /// decode attempt; those are surfaced as `WrongPassword` so the caller
    /// can discard any partial output and prompt the owner.
    pub fn extract(
        archive_path: &Path,
        dest_path: &Path,
        password: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        debug!(
            ?archive_path,
            has_password = password.is_some(),
            ?dest_path,
            "attempting 7z extraction"
        );

        std::fs::create_dir_all(dest_path)?;

        use sevenz_rust::Password;
        let result = match password {
            None => sevenz_rust::decompress_file(archive_path, dest_path),
            Some(password) => {
                let pw = Password::from(password);
                sevenz_rust::decompress_file_with_password(archive_path, dest_path, pw)
            }
        };

        match result {
            Ok(()) => {
                // 7z entry names are not sanitized by the decoder; verify
                // nothing landed outside the destination
                Self::validate_extracted_paths(dest_path)?;

                let extracted_files = Self::collect_extracted_files(dest_path)?;

                info!(
                    ?archive_path,
                    extracted_count = extracted_files.len(),
                    "7z extraction successful"
                );
                Ok(extracted_files)
            }
            Err(e) => {
                let err_str = e.to_string();
                if err_str.contains("password")
                    || err_str.contains("encrypted")
                    || err_str.contains("Wrong password")
                    || err_str.contains("PasswordRequired")
                {
                    Err(Error::Extract(ExtractError::WrongPassword {
                        archive: archive_path.to_path_buf(),
                    }))
                } else {
                    Err(Error::Extract(ExtractError::DecodeFailed {
                        archive: archive_path.to_path_buf(),
                        reason: format!("failed to extract 7z archive: {}", e),
                    }))
                }
            }
        }
    }

    /// Validate that all extracted files are within the destination directory.
    /// Escapes are reported as unsafe-path decode errors.
    fn validate_extracted_paths(dest_path: &Path) -> Result<()> {
        let canonical_dest = dest_path.canonicalize()?;

        fn check_dir(dir: &Path, canonical_dest: &Path) -> Result<()> {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                let canonical = path.canonicalize()?;

                if !canonical.starts_with(canonical_dest) {
                    return Err(Error::Extract(ExtractError::UnsafePath {
                        archive: dir.to_path_buf(),
                        entry: canonical.display().to_string(),
                    }));
                }

                if path.is_dir() {
                    check_dir(&path, canonical_dest)?;
                }
            }
            Ok(())
        }

        check_dir(dest_path, &canonical_dest)
    }

    /// Recursively collect all files (not directories) from a directory
    pub(crate) fn collect_extracted_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        fn visit_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();

                if path.is_dir() {
                    visit_dir(&path, files)?;
                } else {
                    files.push(path);
                }
            }
            Ok(())
        }

        visit_dir(dir, &mut files)?;
        Ok(files)
    }
}
