//! Configuration types for unpack-relay

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Hard per-file ceiling: extracted files larger than this are skipped, never uploaded
pub const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Local storage layout (working directories)
///
/// Groups settings for where archives and extraction output live on disk.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for per-job working paths (default: "./work")
    ///
    /// Each job owns `work_dir/job_<id>/` exclusively; the subtree is removed
    /// on every exit path.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
        }
    }
}

/// Size and batching ceilings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum size of an inbound archive, checked before any processing
    /// (default: 2 GiB)
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,

    /// Maximum size of a single extracted file; larger files are skipped and
    /// reported (default: 2 GiB)
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Maximum number of files per upload batch (default: 10)
    #[serde(default = "default_max_batch_count")]
    pub max_batch_count: usize,

    /// Maximum cumulative bytes per visual-media batch (default: 2 GiB)
    ///
    /// A batch may exceed this by exactly one file when its very first file is
    /// already over the cap — single-file batches are never dropped.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_archive_bytes: default_max_archive_bytes(),
            max_file_bytes: default_max_file_bytes(),
            max_batch_count: default_max_batch_count(),
            max_batch_bytes: default_max_batch_bytes(),
        }
    }
}

/// Default per-owner grouping behavior
///
/// Owners can override these at runtime via the dispatcher's preference
/// operations; this config seeds the initial values.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupingConfig {
    /// Whether files are grouped into batches at all (default: true)
    ///
    /// When disabled, every file is delivered individually in collect order.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

/// Password handling for encrypted archives
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Retain an owner-supplied password for subsequent archives from the same
    /// owner (default: false — cleared after one extraction attempt)
    #[serde(default)]
    pub retain_across_jobs: bool,
}

/// External tool paths (ffprobe, ffmpeg)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to ffprobe executable (auto-detected if None)
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Path to ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Search PATH for missing binaries (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: None,
            ffmpeg_path: None,
            search_path: default_true(),
        }
    }
}

/// Status-message progress reporting
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum interval between status-message edits (default: 2s)
    ///
    /// Progress callbacks arriving faster than this are coalesced; only the
    /// most recent value is delivered.
    #[serde(default = "default_min_edit_interval", with = "duration_secs")]
    pub min_edit_interval: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_edit_interval: default_min_edit_interval(),
        }
    }
}

/// Top-level configuration
///
/// Fields are organized into logical sub-configs:
/// - [`storage`](StorageConfig) — working directories
/// - [`limits`](LimitsConfig) — size and batching ceilings
/// - [`grouping`](GroupingConfig) — default batching behavior
/// - [`passwords`](PasswordConfig) — password retention policy
/// - [`tools`](ToolsConfig) — external binary paths
/// - [`progress`](ProgressConfig) — status-edit throttling
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Working directory layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Size and batching ceilings
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Default grouping behavior
    #[serde(default)]
    pub grouping: GroupingConfig,

    /// Password retention policy
    #[serde(default)]
    pub passwords: PasswordConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Status-edit throttling
    #[serde(default)]
    pub progress: ProgressConfig,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./work")
}

fn default_max_archive_bytes() -> u64 {
    MAX_FILE_BYTES
}

fn default_max_file_bytes() -> u64 {
    MAX_FILE_BYTES
}

fn default_max_batch_count() -> usize {
    10
}

fn default_max_batch_bytes() -> u64 {
    MAX_FILE_BYTES
}

fn default_true() -> bool {
    true
}

fn default_min_edit_interval() -> Duration {
    Duration::from_secs(2)
}

/// Serialize/deserialize a Duration as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
