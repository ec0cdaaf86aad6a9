//! Archive format detection by content signature
//!
//! Formats are identified from magic bytes rather than the file name, so a
//! mislabeled upload (a `.zip` that is really gzip data) still routes to the
//! right decoder and a renamed unsupported blob is rejected up front.

use std::io::Read;
use std::path::Path;

use crate::types::ArchiveType;

/// Length of a tar header block; the ustar magic lives inside the first block
const TAR_BLOCK_LEN: usize = 512;
/// Offset of the "ustar" magic within a tar header block
const USTAR_MAGIC_OFFSET: usize = 257;

/// Detect the archive container format from the file's leading bytes
///
/// Returns `Ok(None)` when no supported signature matches — the caller
/// reports the archive as unsupported. Only I/O failures are errors.
pub fn detect_archive_type(path: &Path) -> crate::Result<Option<ArchiveType>> {
    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; TAR_BLOCK_LEN];
    let mut filled = 0;

    // A short file is fine; match on whatever prefix is available
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(sniff(&header[..filled]))
}

/// Match a header prefix against the supported container signatures
pub(crate) fn sniff(header: &[u8]) -> Option<ArchiveType> {
    // ZIP local-file, empty-archive, and spanned markers all share "PK"
    if header.len() >= 4
        && (header.starts_with(b"PK\x03\x04")
            || header.starts_with(b"PK\x05\x06")
            || header.starts_with(b"PK\x07\x08"))
    {
        return Some(ArchiveType::Zip);
    }

    // RAR v4 ends the marker with 0x00, v5 with 0x01 0x00; the shared
    // 7-byte prefix covers both
    if header.len() >= 7 && header.starts_with(b"Rar!\x1A\x07") {
        return Some(ArchiveType::Rar);
    }

    if header.len() >= 6 && header.starts_with(b"7z\xBC\xAF\x27\x1C") {
        return Some(ArchiveType::SevenZip);
    }

    if header.len() >= 2 && header.starts_with(b"\x1F\x8B") {
        return Some(ArchiveType::TarGz);
    }

    if header.len() >= 3 && header.starts_with(b"BZh") {
        return Some(ArchiveType::TarBz2);
    }

    if header.len() >= USTAR_MAGIC_OFFSET + 5
        && &header[USTAR_MAGIC_OFFSET..USTAR_MAGIC_OFFSET + 5] == b"ustar"
    {
        return Some(ArchiveType::Tar);
    }

    None
}
