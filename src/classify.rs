//! File classification — MIME labels and semantic categories
//!
//! Maps extracted file paths to a content-type label and a semantic category
//! (image, video, document). Deterministic and total: unknown files become
//! documents with a generic binary label.

use std::path::Path;

use crate::types::{ClassifiedFile, ContentCategory};

/// Generic fallback label for files no lookup can identify
const GENERIC_BINARY: &str = "application/octet-stream";

/// Well-known extension table for formats commonly misreported by generic
/// MIME lookups (office documents, plain text, ebooks). Consulted only when
/// the generic guess comes back unknown or as the generic binary label.
const KNOWN_EXTENSIONS: &[(&[&str], &str)] = &[
    (&["pdf"], "application/pdf"),
    (
        &["doc", "docx"],
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (
        &["xls", "xlsx"],
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (
        &["ppt", "pptx"],
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    (&["txt", "log", "csv", "md"], "text/plain"),
    (&["html", "htm"], "text/html"),
    (&["epub"], "application/epub+zip"),
];

/// Classify a file by path and size
///
/// Resolution order:
/// 1. the well-known extension table, overriding a generic/unknown guess
/// 2. system MIME guess by extension
/// 3. fallback to `application/octet-stream`
///
/// Never fails. Size-ceiling filtering is the caller's responsibility — files
/// over the configured limit should be skipped before classification.
pub fn classify(path: &Path, byte_size: u64) -> ClassifiedFile {
    let display_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    let guessed = mime_guess::from_path(path).first().map(|m| m.to_string());

    let mime_label = match guessed {
        Some(mime) if mime != GENERIC_BINARY => mime,
        _ => known_extension_label(&display_name)
            .unwrap_or(GENERIC_BINARY)
            .to_string(),
    };

    let category = if mime_label.starts_with("image/") {
        ContentCategory::Image
    } else if mime_label.starts_with("video/") {
        ContentCategory::Video
    } else {
        ContentCategory::Document
    };

    ClassifiedFile {
        path: path.to_path_buf(),
        display_name,
        byte_size,
        category,
        mime_label,
    }
}

/// Look up the override table by file extension (case-insensitive)
fn known_extension_label(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_lowercase();
    let (_, ext) = lower.rsplit_once('.')?;
    KNOWN_EXTENSIONS
        .iter()
        .find(|(exts, _)| exts.contains(&ext))
        .map(|(_, label)| *label)
}
