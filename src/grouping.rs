//! Grouping engine — packs classified files into bounded upload batches
//!
//! Visual media (images and videos) is kept together in mixed-media batches;
//! everything else travels in document batches. Batches honor a maximum file
//! count and, for visual media, a maximum cumulative byte size.

use tracing::debug;

use crate::types::{Batch, BatchKind, ClassifiedFile};

/// Partition classified files into ordered upload batches
///
/// Files are split into a visual partition (images and videos) and a document
/// partition, preserving input order within each. Visual files are packed
/// greedily: a file joins the current batch unless doing so would exceed
/// `max_batch_count`, or would push the byte total over `max_batch_bytes`
/// while the batch is non-empty. Document files are packed by count only.
///
/// Guarantees:
/// - no batch is empty
/// - no file is omitted or duplicated
/// - a single file larger than `max_batch_bytes` gets its own batch rather
///   than being dropped
/// - all visual batches precede all document batches
pub fn group_files(
    files: Vec<ClassifiedFile>,
    max_batch_count: usize,
    max_batch_bytes: u64,
) -> Vec<Batch> {
    let (visual, documents): (Vec<_>, Vec<_>) = files.into_iter().partition(|f| f.is_visual());

    let mut batches = pack(visual, BatchKind::MixedMedia, max_batch_count, Some(max_batch_bytes));
    batches.extend(pack(documents, BatchKind::Documents, max_batch_count, None));

    debug!(
        batch_count = batches.len(),
        "grouped files into {} batch(es)",
        batches.len()
    );

    batches
}

/// Greedy in-order packing with a count limit and an optional byte cap
fn pack(
    files: Vec<ClassifiedFile>,
    kind: BatchKind,
    max_count: usize,
    max_bytes: Option<u64>,
) -> Vec<Batch> {
    let max_count = max_count.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<ClassifiedFile> = Vec::new();
    let mut current_bytes: u64 = 0;

    for file in files {
        let over_count = current.len() >= max_count;
        let over_bytes = match max_bytes {
            // Only a non-empty batch closes on the byte cap; the first file
            // always fits so oversized files are never dropped.
            Some(cap) => !current.is_empty() && current_bytes + file.byte_size > cap,
            None => false,
        };

        if over_count || over_bytes {
            batches.push(Batch {
                kind,
                files: std::mem::take(&mut current),
                byte_total: current_bytes,
            });
            current_bytes = 0;
        }

        current_bytes += file.byte_size;
        current.push(file);
    }

    if !current.is_empty() {
        batches.push(Batch {
            kind,
            files: current,
            byte_total: current_bytes,
        });
    }

    batches
}
