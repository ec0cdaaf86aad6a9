//! Media inspection and repair via external tools
//!
//! This module wraps the media-inspection collaborator: reading geometry,
//! duration, and audio presence from videos, and muxing a silent audio track
//! into muted videos so they deliver as proper videos rather than animations.
//! Implementations can use external binaries or provide stub functionality
//! for graceful degradation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::config::ToolsConfig;

/// Geometry, duration, and audio presence for a media file
#[must_use]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MediaProbe {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Duration in seconds (0 for still images)
    pub duration_seconds: f64,
    /// Whether the file carries at least one audio stream
    pub has_audio_stream: bool,
}

/// Capabilities of a media inspector implementation
#[derive(Debug, Clone, Copy)]
pub struct MediaCapabilities {
    /// Can read geometry/duration/audio presence
    pub can_probe: bool,
    /// Can mux a silent audio track into a muted video
    pub can_mux: bool,
}

/// Trait for media inspection and silent-audio repair
///
/// # Examples
///
/// ```no_run
/// use unpack_relay::media::{CliMediaInspector, MediaInspector};
/// use unpack_relay::config::ToolsConfig;
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let inspector = CliMediaInspector::from_config(&ToolsConfig::default())
///     .expect("ffprobe/ffmpeg not found");
///
/// let probe = inspector.probe(Path::new("clip.mp4")).await?;
/// if !probe.has_audio_stream {
///     inspector.mux_silent_audio(Path::new("clip.mp4")).await?;
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait MediaInspector: Send + Sync {
    /// Read geometry, duration, and audio presence from a media file
    ///
    /// # Errors
    ///
    /// Returns an error if the tool fails to execute or its output cannot be
    /// parsed. Callers degrade gracefully: a failed probe means no video
    /// metadata and no silent-audio repair, never a failed job.
    async fn probe(&self, path: &Path) -> crate::Result<MediaProbe>;

    /// Mux a silent stereo audio track into a muted video, replacing the file
    /// in place (the video stream is copied, not re-encoded)
    ///
    /// # Errors
    ///
    /// Returns an error if the mux fails; the original file is left intact.
    async fn mux_silent_audio(&self, path: &Path) -> crate::Result<()>;

    /// Query capabilities of this inspector
    fn capabilities(&self) -> MediaCapabilities;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// CLI-based media inspector using external ffprobe/ffmpeg binaries
pub struct CliMediaInspector {
    ffprobe_path: PathBuf,
    ffmpeg_path: Option<PathBuf>,
}

impl CliMediaInspector {
    /// Create a new CLI inspector with explicit binary paths
    ///
    /// `ffmpeg_path` is optional: without it the inspector can probe but not
    /// repair muted videos.
    pub fn new(ffprobe_path: PathBuf, ffmpeg_path: Option<PathBuf>) -> Self {
        Self {
            ffprobe_path,
            ffmpeg_path,
        }
    }

    /// Build an inspector from tool configuration
    ///
    /// Uses explicitly configured paths first; falls back to searching PATH
    /// when `search_path` is enabled. Returns `None` if ffprobe cannot be
    /// found at all (ffmpeg is optional).
    pub fn from_config(tools: &ToolsConfig) -> Option<Self> {
        let ffprobe = tools.ffprobe_path.clone().or_else(|| {
            tools
                .search_path
                .then(|| which::which("ffprobe").ok())
                .flatten()
        })?;

        let ffmpeg = tools.ffmpeg_path.clone().or_else(|| {
            tools
                .search_path
                .then(|| which::which("ffmpeg").ok())
                .flatten()
        });

        Some(Self::new(ffprobe, ffmpeg))
    }

    /// Run ffprobe with JSON output and parse the `streams` array
    async fn run_ffprobe(&self, args: &[&str], path: &Path) -> crate::Result<serde_json::Value> {
        let output = Command::new(&self.ffprobe_path)
            .args(args)
            .arg(path)
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(crate::Error::ExternalTool(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout).map_err(crate::Error::Serialization)
    }
}

#[async_trait]
impl MediaInspector for CliMediaInspector {
    async fn probe(&self, path: &Path) -> crate::Result<MediaProbe> {
        // Geometry and duration from the first stream that reports them
        let geometry = self
            .run_ffprobe(
                &[
                    "-v",
                    "error",
                    "-show_entries",
                    "stream=width,height,duration",
                    "-of",
                    "json",
                ],
                path,
            )
            .await?;

        let streams = geometry
            .get("streams")
            .and_then(|s| s.as_array())
            .cloned()
            .unwrap_or_default();

        let first = streams
            .iter()
            .find(|s| s.get("width").is_some())
            .or(streams.first());

        let (width, height, duration_seconds) = match first {
            Some(stream) => (
                stream.get("width").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                stream.get("height").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                stream
                    .get("duration")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(0.0),
            ),
            None => (0, 0, 0.0),
        };

        // Audio presence from a dedicated audio-stream query
        let audio = self
            .run_ffprobe(
                &[
                    "-v",
                    "error",
                    "-select_streams",
                    "a",
                    "-show_entries",
                    "stream=index",
                    "-of",
                    "json",
                ],
                path,
            )
            .await?;

        let has_audio_stream = audio
            .get("streams")
            .and_then(|s| s.as_array())
            .is_some_and(|streams| !streams.is_empty());

        debug!(
            ?path,
            width, height, has_audio_stream, "probed media geometry"
        );

        Ok(MediaProbe {
            width,
            height,
            duration_seconds,
            has_audio_stream,
        })
    }

    async fn mux_silent_audio(&self, path: &Path) -> crate::Result<()> {
        let ffmpeg = self.ffmpeg_path.as_ref().ok_or_else(|| {
            crate::Error::NotSupported(
                "silent-audio repair requires external ffmpeg binary. \
                 Configure ffmpeg_path in config or ensure ffmpeg is in PATH."
                    .into(),
            )
        })?;

        let mut temp = path.as_os_str().to_owned();
        temp.push(".silent_fixed.mp4");
        let temp = PathBuf::from(temp);

        let output = Command::new(ffmpeg)
            .arg("-y")
            .arg("-i")
            .arg(path)
            .args([
                "-f",
                "lavfi",
                "-i",
                "anullsrc=channel_layout=stereo:sample_rate=48000",
                "-c:v",
                "copy",
                "-c:a",
                "aac",
                "-shortest",
            ])
            .arg(&temp)
            .output()
            .await
            .map_err(|e| crate::Error::ExternalTool(format!("failed to execute ffmpeg: {}", e)))?;

        if !output.status.success() {
            // Remove the partial temp file before surfacing the failure
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(crate::Error::ExternalTool(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tokio::fs::rename(&temp, path).await?;
        debug!(?path, "muxed silent audio track");
        Ok(())
    }

    fn capabilities(&self) -> MediaCapabilities {
        MediaCapabilities {
            can_probe: true,
            can_mux: self.ffmpeg_path.is_some(),
        }
    }

    fn name(&self) -> &'static str {
        "cli-ffmpeg"
    }
}

/// No-op media inspector used when ffprobe/ffmpeg are unavailable
///
/// Provides graceful degradation: probing and muxing return
/// `Error::NotSupported`, so jobs deliver videos without geometry metadata
/// or silent-audio repair instead of failing.
pub struct NoOpMediaInspector;

#[async_trait]
impl MediaInspector for NoOpMediaInspector {
    async fn probe(&self, _path: &Path) -> crate::Result<MediaProbe> {
        Err(crate::Error::NotSupported(
            "media probing requires external ffprobe binary. \
             Configure ffprobe_path in config or ensure ffprobe is in PATH."
                .into(),
        ))
    }

    async fn mux_silent_audio(&self, _path: &Path) -> crate::Result<()> {
        Err(crate::Error::NotSupported(
            "silent-audio repair requires external ffmpeg binary. \
             Configure ffmpeg_path in config or ensure ffmpeg is in PATH."
                .into(),
        ))
    }

    fn capabilities(&self) -> MediaCapabilities {
        MediaCapabilities {
            can_probe: false,
            can_mux: false,
        }
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
