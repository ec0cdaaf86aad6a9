//! Transport trait — the outbound messaging collaborator
//!
//! The job engine never talks to a messaging service directly. It drives this
//! trait, which covers the four operations the core needs: fetching the
//! inbound archive, staging files for upload, delivering grouped messages,
//! and posting/editing status text.

use async_trait::async_trait;
use std::path::Path;

use crate::types::{ContentCategory, MessageRef, OwnerId, SourceRef, UploadHandle};

/// Byte-level progress callback for downloads: `(bytes_done, bytes_total)`
///
/// Invoked from the transport's transfer loop; implementations must be cheap
/// and non-blocking — the engine coalesces updates on its side.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// Video geometry and duration forwarded to the transport so grouped videos
/// render and stream correctly at the receiving end
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VideoAttributes {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Duration in whole seconds
    pub duration_seconds: u64,
}

/// Per-file metadata attached to an upload
#[derive(Clone, Debug)]
pub struct UploadMetadata {
    /// File name shown to the recipient
    pub display_name: String,
    /// Resolved MIME label
    pub mime_label: String,
    /// Semantic category
    pub category: ContentCategory,
    /// Geometry and duration, present for probed videos
    pub video: Option<VideoAttributes>,
}

/// Outbound message transport
///
/// Contract notes:
/// - `upload_single` stages a file's bytes with the messaging service and
///   returns a handle; it does not deliver a visible message by itself.
/// - `upload_group` delivers previously staged files as one grouped message.
///   A single-element group delivers a standalone message; this is also the
///   per-item fallback path when a grouped send fails.
/// - `notify` and `edit_status` failures during progress reporting are
///   logged and ignored by the engine — they never abort a job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the inbound archive to `dest`, reporting byte-level progress
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails or the source is gone; the
    /// engine maps this to a terminal `TransferFailed` for the job.
    async fn download(
        &self,
        source: &SourceRef,
        dest: &Path,
        progress: ProgressFn<'_>,
    ) -> crate::Result<()>;

    /// Stage one file for delivery, returning a handle for grouping
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails; the engine records the file as
    /// failed and continues with the rest of the batch.
    async fn upload_single(
        &self,
        path: &Path,
        metadata: &UploadMetadata,
    ) -> crate::Result<UploadHandle>;

    /// Deliver staged files as one grouped message to the owner
    ///
    /// # Errors
    ///
    /// Returns an error if the grouped send fails; the engine falls back to
    /// delivering the handles one by one.
    async fn upload_group(&self, owner: OwnerId, handles: Vec<UploadHandle>) -> crate::Result<()>;

    /// Post a new message to the owner, returning a reference for later edits
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be sent.
    async fn notify(&self, owner: OwnerId, text: &str) -> crate::Result<MessageRef>;

    /// Edit a previously posted status message in place
    ///
    /// # Errors
    ///
    /// Returns an error if the edit fails (e.g. the message was deleted).
    async fn edit_status(&self, message: MessageRef, text: &str) -> crate::Result<()>;
}
