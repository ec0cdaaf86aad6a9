//! Core types and events for unpack-relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque identifier for the user who submitted an archive
///
/// Scope of the "one active job per owner" constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl OwnerId {
    /// Create a new OwnerId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<OwnerId> for i64 {
    fn from(id: OwnerId) -> Self {
        id.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for OwnerId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for a job, allocated at admission
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle state
///
/// Transitions are strictly forward except `AwaitingPassword -> Extracting`
/// (password retry) and any state `-> Cancelling -> Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Admitted, waiting for its owner's queue slot
    Pending,
    /// Fetching the archive to local storage
    Downloading,
    /// Decoding the archive into the working directory
    Extracting,
    /// Parked, waiting for the owner to supply a password
    AwaitingPassword,
    /// Walking and classifying extracted files
    Collecting,
    /// Delivering grouped files through the transport
    Uploading,
    /// Cancellation observed, cleanup in progress
    Cancelling,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully (including cancellation)
    Failed,
}

impl JobState {
    /// Whether the job has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Stage at which a job failure occurred
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Archive download
    Download,
    /// Archive decoding
    Extract,
    /// File walk and classification
    Collect,
    /// File upload and delivery
    Upload,
}

/// Archive container format detected from the file's content signature
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    /// ZIP archive
    Zip,
    /// 7-Zip archive
    SevenZip,
    /// RAR archive (v4 or v5)
    Rar,
    /// Uncompressed tar
    Tar,
    /// Gzip-compressed tar
    TarGz,
    /// Bzip2-compressed tar
    TarBz2,
}

/// Opaque handle to the inbound archive message
///
/// Owned by the transport layer; jobs hold a read-only reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceRef {
    /// Transport-level message identifier
    pub message_id: i64,
    /// Original archive file name as reported by the sender
    pub file_name: String,
    /// Archive size in bytes as reported by the transport
    pub size_bytes: u64,
}

/// Opaque reference to an outbound status message, used for in-place edits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub i64);

/// Opaque token for a file staged with the transport, used for grouped delivery
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadHandle(pub u64);

/// Semantic category of an extracted file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    /// Still image
    Image,
    /// Video
    Video,
    /// Everything else
    Document,
}

/// A file produced by the classifier; immutable once built
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifiedFile {
    /// Absolute path inside the job's extraction directory
    pub path: PathBuf,
    /// File name shown to the recipient
    pub display_name: String,
    /// Size in bytes
    pub byte_size: u64,
    /// Semantic category
    pub category: ContentCategory,
    /// Resolved MIME label
    pub mime_label: String,
}

impl ClassifiedFile {
    /// Whether the file belongs in a visual-media batch
    pub fn is_visual(&self) -> bool {
        matches!(
            self.category,
            ContentCategory::Image | ContentCategory::Video
        )
    }
}

/// Kind of an upload batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    /// Images and videos delivered together as one grouped message
    MixedMedia,
    /// Non-visual files
    Documents,
}

/// An ordered group of files delivered together as one upload unit
#[derive(Clone, Debug)]
pub struct Batch {
    /// Batch kind
    pub kind: BatchKind,
    /// Files in delivery order
    pub files: Vec<ClassifiedFile>,
    /// Cumulative byte size of the files
    pub byte_total: u64,
}

/// Outcome of submitting an archive to the dispatcher
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The owner was idle; the job started immediately
    Started {
        /// The admitted job
        job: JobId,
    },
    /// The owner already has an active job; queued behind it
    Queued {
        /// The admitted job
        job: JobId,
        /// 1-based position in the owner's pending queue
        position: usize,
    },
}

/// Summary of a job for status queries and events
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSummary {
    /// Job identifier
    pub id: JobId,
    /// Archive file name
    pub archive_name: String,
    /// Current lifecycle state
    pub state: JobState,
    /// When the job was admitted
    pub submitted_at: DateTime<Utc>,
}

/// Answer to a per-owner status query
#[derive(Clone, Debug)]
pub enum OwnerStatus {
    /// No active, pending, or parked jobs
    Idle,
    /// A job is currently executing for this owner
    Active {
        /// The executing job
        job: JobSummary,
        /// Number of jobs waiting behind it
        pending: usize,
        /// Number of jobs parked awaiting a password
        parked: usize,
    },
    /// No job is executing but some are waiting (transient) or parked
    Queued {
        /// Number of jobs in the pending queue
        pending: usize,
        /// Number of jobs parked awaiting a password
        parked: usize,
    },
}

/// A file excluded from delivery because it exceeds the size ceiling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkippedFile {
    /// File name shown to the recipient
    pub display_name: String,
    /// Size in bytes
    pub byte_size: u64,
}

/// A file whose delivery failed; the job continues without it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FailedUpload {
    /// File name shown to the recipient
    pub display_name: String,
    /// Transport failure description
    pub reason: String,
}

/// Completion summary for a finished job
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobReport {
    /// Archive file name
    pub archive_name: String,
    /// Files delivered, by category
    pub images: usize,
    /// Files delivered, by category
    pub videos: usize,
    /// Files delivered, by category
    pub documents: usize,
    /// Files excluded for exceeding the size ceiling
    pub skipped: Vec<SkippedFile>,
    /// Files whose delivery failed
    pub failed: Vec<FailedUpload>,
}

impl JobReport {
    /// Total number of files delivered
    pub fn delivered(&self) -> usize {
        self.images + self.videos + self.documents
    }
}

/// Counts of jobs affected by a cancel-all request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CancelReport {
    /// Whether an active job was signalled
    pub active: bool,
    /// Pending jobs removed
    pub queued: usize,
    /// Parked jobs deleted
    pub parked: usize,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job admitted to an owner's queue
    Submitted {
        /// Job ID
        job: JobId,
        /// Owner ID
        owner: OwnerId,
        /// Archive file name
        archive: String,
        /// 1-based queue position (0 = started immediately)
        position: usize,
    },

    /// Job began executing
    Started {
        /// Job ID
        job: JobId,
    },

    /// Download progress update
    Downloading {
        /// Job ID
        job: JobId,
        /// Bytes fetched so far
        bytes_done: u64,
        /// Total bytes expected
        bytes_total: u64,
    },

    /// Archive decoding started
    Extracting {
        /// Job ID
        job: JobId,
        /// Detected container format
        format: ArchiveType,
    },

    /// Job parked awaiting a password
    PasswordRequested {
        /// Job ID
        job: JobId,
    },

    /// Extraction directory walked and classified
    Collected {
        /// Job ID
        job: JobId,
        /// Usable files found
        files: usize,
        /// Files skipped for exceeding the size ceiling
        skipped: usize,
    },

    /// Upload progress update
    Uploading {
        /// Job ID
        job: JobId,
        /// Files delivered so far
        sent: usize,
        /// Total files to deliver
        total: usize,
    },

    /// Job finished successfully
    Completed {
        /// Job ID
        job: JobId,
        /// Completion summary
        report: JobReport,
    },

    /// Job finished unsuccessfully
    Failed {
        /// Job ID
        job: JobId,
        /// Stage where the failure occurred
        stage: Stage,
        /// Error message
        error: String,
    },

    /// Job cancelled by the owner
    Cancelled {
        /// Job ID
        job: JobId,
        /// Files delivered before cancellation was observed
        sent: usize,
        /// Total files that were to be delivered
        total: usize,
    },

    /// Graceful shutdown initiated
    Shutdown,
}
