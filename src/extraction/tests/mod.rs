use crate::error::{Error, ExtractError};
use crate::extraction::*;
use crate::types::{ArchiveType, JobId};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a valid ZIP archive containing a single file with the given name and content
fn create_zip_archive(archive_path: &Path, file_name: &str, content: &[u8]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    writer.start_file(file_name, options).unwrap();
    std::io::Write::write_all(&mut writer, content).unwrap();
    writer.finish().unwrap();
}

/// Create a valid ZIP archive containing multiple entries; names ending in
/// '/' become directory entries
fn create_zip_archive_multi(archive_path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(name.trim_end_matches('/'), options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            std::io::Write::write_all(&mut writer, content).unwrap();
        }
    }
    writer.finish().unwrap();
}

/// Create a password-encrypted ZIP using the deprecated ZipCrypto method
/// (only encryption method supported for writing by zip 0.6)
fn create_encrypted_zip(archive_path: &Path, file_name: &str, content: &[u8], password: &[u8]) {
    use ::zip::unstable::write::FileOptionsExt;
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options = ::zip::write::FileOptions::default()
        .compression_method(::zip::CompressionMethod::Stored)
        .with_deprecated_encryption(password);
    writer.start_file(file_name, options).unwrap();
    std::io::Write::write_all(&mut writer, content).unwrap();
    writer.finish().unwrap();
}

/// Create a gzip-compressed tar archive from (name, content) pairs
fn create_tar_gz(archive_path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = ::tar::Builder::new(encoder);
    for (name, content) in entries {
        let mut header = ::tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Create a valid 7z archive from a source directory using sevenz_rust
fn create_7z_archive(archive_path: &Path, source_dir: &Path) {
    sevenz_rust::compress_to_path(source_dir, archive_path).unwrap();
}

fn file_names(files: &[PathBuf]) -> Vec<String> {
    files
        .iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect()
}

// ===========================================================================
// Signature routing through the dispatcher
// ===========================================================================

#[tokio::test]
async fn extract_archive_decodes_a_zip() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("photos.zip");
    create_zip_archive(&archive, "photo.jpg", b"not really a jpeg");
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(1), &archive, &dest, None)
        .await
        .unwrap();

    match outcome {
        ExtractOutcome::Extracted(files) => {
            assert_eq!(files.len(), 1);
            assert!(files[0].ends_with("photo.jpg"));
            assert_eq!(std::fs::read(&files[0]).unwrap(), b"not really a jpeg");
        }
        other => panic!("expected Extracted, got {other:?}"),
    }
}

#[tokio::test]
async fn extract_archive_routes_by_signature_not_extension() {
    let temp_dir = TempDir::new().unwrap();

    // A gzip-compressed tar mislabeled as .zip must still extract
    let archive = temp_dir.path().join("mislabeled.zip");
    create_tar_gz(&archive, &[("inner/readme.txt", b"hello")]);
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(2), &archive, &dest, None)
        .await
        .unwrap();

    match outcome {
        ExtractOutcome::Extracted(files) => {
            assert_eq!(file_names(&files), vec!["readme.txt"]);
            assert_eq!(
                std::fs::read_to_string(&files[0]).unwrap(),
                "hello",
                "content must survive the gzip+tar round trip"
            );
        }
        other => panic!("expected Extracted, got {other:?}"),
    }
}

#[tokio::test]
async fn extract_archive_unknown_signature_is_unsupported_and_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("document.zip");
    std::fs::write(&archive, b"%PDF-1.7 this is really a pdf").unwrap();
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(3), &archive, &dest, None)
        .await
        .unwrap();

    assert!(matches!(outcome, ExtractOutcome::Unsupported));
    assert!(
        !dest.exists() || std::fs::read_dir(&dest).unwrap().next().is_none(),
        "unsupported input must leave the destination empty"
    );
}

#[tokio::test]
async fn extract_archive_corrupt_zip_is_a_decode_error() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("broken.zip");
    // Valid local-file signature, garbage after it
    std::fs::write(&archive, b"PK\x03\x04garbage garbage garbage").unwrap();
    let dest = temp_dir.path().join("extracted");

    let result = extract_archive(JobId(4), &archive, &dest, None).await;

    match result {
        Err(Error::Extract(ExtractError::DecodeFailed { archive: a, .. })) => {
            assert_eq!(a, archive);
        }
        other => panic!("expected DecodeFailed, got {other:?}"),
    }
}

// ===========================================================================
// Password flow
// ===========================================================================

#[tokio::test]
async fn encrypted_zip_without_password_reports_password_required_before_extracting() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("secret.zip");
    create_encrypted_zip(&archive, "payload.txt", b"top secret", b"s3cret");
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(5), &archive, &dest, None)
        .await
        .unwrap();

    assert!(matches!(outcome, ExtractOutcome::PasswordRequired));
    assert_eq!(
        std::fs::read_dir(&dest).unwrap().count(),
        0,
        "no partial output may be written for an encrypted archive"
    );
}

#[tokio::test]
async fn encrypted_zip_with_wrong_password_reports_password_required_and_discards_output() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("secret.zip");
    create_encrypted_zip(&archive, "payload.txt", b"top secret", b"s3cret");
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(6), &archive, &dest, Some("nope"))
        .await
        .unwrap();

    assert!(matches!(outcome, ExtractOutcome::PasswordRequired));
    assert_eq!(
        std::fs::read_dir(&dest).unwrap().count(),
        0,
        "partial output must be discarded on a password mismatch"
    );
}

#[tokio::test]
async fn encrypted_zip_with_correct_password_extracts() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("secret.zip");
    create_encrypted_zip(&archive, "payload.txt", b"top secret", b"s3cret");
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(7), &archive, &dest, Some("s3cret"))
        .await
        .unwrap();

    match outcome {
        ExtractOutcome::Extracted(files) => {
            assert_eq!(files.len(), 1);
            assert_eq!(std::fs::read(&files[0]).unwrap(), b"top secret");
        }
        other => panic!("expected Extracted, got {other:?}"),
    }
}

#[tokio::test]
async fn plain_zip_ignores_a_stale_password() {
    // An owner-retained password must not break unencrypted archives
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("open.zip");
    create_zip_archive(&archive, "readme.txt", b"open data");
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(8), &archive, &dest, Some("leftover"))
        .await
        .unwrap();

    assert!(
        matches!(outcome, ExtractOutcome::Extracted(ref files) if files.len() == 1),
        "unencrypted entries extract regardless of the supplied password"
    );
}

// ===========================================================================
// Traversal rejection and directory entries
// ===========================================================================

#[tokio::test]
async fn zip_entry_escaping_dest_is_rejected_without_writing() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("evil.zip");
    create_zip_archive_multi(
        &archive,
        &[("ok.txt", b"fine" as &[u8]), ("../escape.txt", b"evil")],
    );
    let dest = temp_dir.path().join("extract").join("inner");
    std::fs::create_dir_all(&dest).unwrap();

    let result = extract_archive(JobId(9), &archive, &dest, None).await;

    match result {
        Err(Error::Extract(ExtractError::UnsafePath { entry, .. })) => {
            assert!(entry.contains("escape.txt"), "offending entry: {entry}");
        }
        other => panic!("expected UnsafePath, got {other:?}"),
    }
    assert!(
        !temp_dir.path().join("extract").join("escape.txt").exists(),
        "nothing may be written outside the destination"
    );
}

#[tokio::test]
async fn zip_directory_entries_become_directories() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("tree.zip");
    create_zip_archive_multi(
        &archive,
        &[
            ("photos/", b"" as &[u8]),
            ("photos/a.jpg", b"aa"),
            ("docs/notes.txt", b"nn"),
        ],
    );
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(10), &archive, &dest, None)
        .await
        .unwrap();

    match outcome {
        ExtractOutcome::Extracted(files) => {
            let mut names = file_names(&files);
            names.sort();
            assert_eq!(
                names,
                vec!["a.jpg", "notes.txt"],
                "directory entries must not appear in the file list"
            );
            assert!(dest.join("photos").is_dir());
        }
        other => panic!("expected Extracted, got {other:?}"),
    }
}

// ===========================================================================
// Other container formats
// ===========================================================================

#[tokio::test]
async fn tar_gz_preserves_nested_structure() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("bundle.tgz");
    create_tar_gz(
        &archive,
        &[
            ("a/b/deep.txt", b"deep" as &[u8]),
            ("top.txt", b"top"),
        ],
    );
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(11), &archive, &dest, None)
        .await
        .unwrap();

    match outcome {
        ExtractOutcome::Extracted(files) => {
            assert_eq!(files.len(), 2);
            assert!(dest.join("a").join("b").join("deep.txt").is_file());
            assert!(dest.join("top.txt").is_file());
        }
        other => panic!("expected Extracted, got {other:?}"),
    }
}

#[tokio::test]
async fn sevenz_archive_extracts_through_the_dispatcher() {
    let temp_dir = TempDir::new().unwrap();

    let src_dir = temp_dir.path().join("source");
    std::fs::create_dir_all(&src_dir).unwrap();
    std::fs::write(src_dir.join("hello.txt"), b"Hello, world!").unwrap();

    let archive = temp_dir.path().join("test.7z");
    create_7z_archive(&archive, &src_dir);
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(12), &archive, &dest, None)
        .await
        .unwrap();

    match outcome {
        ExtractOutcome::Extracted(files) => {
            assert_eq!(files.len(), 1);
            assert_eq!(
                std::fs::read_to_string(&files[0]).unwrap(),
                "Hello, world!"
            );
        }
        other => panic!("expected Extracted, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_zip_extracts_to_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("empty.zip");
    let file = std::fs::File::create(&archive).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    writer.finish().unwrap();
    let dest = temp_dir.path().join("extracted");

    let outcome = extract_archive(JobId(13), &archive, &dest, None)
        .await
        .unwrap();

    match outcome {
        ExtractOutcome::Extracted(files) => {
            assert!(files.is_empty(), "an empty archive yields no files");
        }
        other => panic!("expected Extracted, got {other:?}"),
    }
}

// ===========================================================================
// ZipDecoder unit behavior
// ===========================================================================

#[test]
fn has_encrypted_entries_distinguishes_plain_from_encrypted() {
    let temp_dir = TempDir::new().unwrap();

    let plain = temp_dir.path().join("plain.zip");
    create_zip_archive(&plain, "a.txt", b"aa");
    assert!(!ZipDecoder::has_encrypted_entries(&plain).unwrap());

    let encrypted = temp_dir.path().join("enc.zip");
    create_encrypted_zip(&encrypted, "a.txt", b"aa", b"pw");
    assert!(ZipDecoder::has_encrypted_entries(&encrypted).unwrap());
}

#[test]
fn detect_archive_type_reads_magic_bytes() {
    let temp_dir = TempDir::new().unwrap();

    let zip_path = temp_dir.path().join("real.dat");
    create_zip_archive(&zip_path, "x", b"x");
    assert_eq!(
        detect_archive_type(&zip_path).unwrap(),
        Some(ArchiveType::Zip)
    );

    let tgz_path = temp_dir.path().join("real.zip");
    create_tar_gz(&tgz_path, &[("x", b"x")]);
    assert_eq!(
        detect_archive_type(&tgz_path).unwrap(),
        Some(ArchiveType::TarGz),
        "content wins over the file name"
    );

    let text = temp_dir.path().join("note.rar");
    std::fs::write(&text, b"just text pretending to be rar").unwrap();
    assert_eq!(detect_archive_type(&text).unwrap(), None);
}
