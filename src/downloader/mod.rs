pub mod classify;
pub mod extractor;
pub mod gate;
pub mod identity;
pub mod manager;
pub mod options;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod ytdlp;

use serde::{Deserialize, Serialize};
use crate::errors::{AppError, Result};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Output shape requested by the user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Audio,
    Video,
}

impl MediaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Audio => "audio",
            MediaFormat::Video => "video",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "audio" => Ok(MediaFormat::Audio),
            "video" => Ok(MediaFormat::Video),
            other => Err(AppError::Validation(format!("Unknown format: {}", other))),
        }
    }
}

/// Lowest and highest video heights accepted as a quality selector.
pub const MIN_HEIGHT: u32 = 144;
pub const MAX_HEIGHT: u32 = 4320;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Best,
    Height(u32),
}

impl Quality {
    pub fn height(height: u32) -> Result<Self> {
        if !(MIN_HEIGHT..=MAX_HEIGHT).contains(&height) {
            return Err(AppError::Validation(format!(
                "Video height {} outside {}..={}",
                height, MIN_HEIGHT, MAX_HEIGHT
            )));
        }
        Ok(Quality::Height(height))
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => f.write_str("best"),
            Quality::Height(h) => write!(f, "{}p", h),
        }
    }
}

impl FromStr for Quality {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim().to_lowercase();
        if value == "best" {
            return Ok(Quality::Best);
        }
        let digits = value.strip_suffix('p').unwrap_or(&value);
        let height = digits
            .parse::<u32>()
            .map_err(|_| AppError::Validation(format!("Unknown quality: {}", s)))?;
        Quality::height(height)
    }
}

/// One user submission. Immutable once built; the URL is stored trimmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadRequest {
    url: String,
    format: MediaFormat,
    quality: Quality,
    playlist_items: Option<NonZeroUsize>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, format: MediaFormat, quality: Quality) -> Self {
        Self {
            url: url.into().trim().to_string(),
            format,
            quality,
            playlist_items: None,
        }
    }

    pub fn with_playlist_items(mut self, cap: NonZeroUsize) -> Self {
        self.playlist_items = Some(cap);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn format(&self) -> MediaFormat {
        self.format
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn playlist_items(&self) -> Option<NonZeroUsize> {
        self.playlist_items
    }
}

/// Short fingerprint of a request; doubles as the output directory name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self(format!("{}-{}", self.0, suffix))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    InvalidSource,
    Copyright,
    Private,
    Unavailable,
    RegionRestricted,
    Network,
    ArtifactMissing,
    ArtifactTooLarge,
    TooLong,
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidSource => "invalid-source",
            FailureKind::Copyright => "copyright",
            FailureKind::Private => "private",
            FailureKind::Unavailable => "unavailable",
            FailureKind::RegionRestricted => "region-restricted",
            FailureKind::Network => "network",
            FailureKind::ArtifactMissing => "artifact-missing",
            FailureKind::ArtifactTooLarge => "artifact-too-large",
            FailureKind::TooLong => "too-long",
            FailureKind::Unknown => "unknown",
        }
    }

    /// Only transient connectivity failures are worth re-issuing unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Network)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SingleMedia {
    pub file_path: PathBuf,
    pub title: String,
    pub duration_seconds: u64,
    pub uploader: String,
    pub thumbnail_url: Option<String>,
    pub file_size_bytes: u64,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistMedia {
    pub file_paths: Vec<PathBuf>,
    pub title: String,
    pub item_count: usize,
    pub output_dir: PathBuf,
}

/// Result of one request. Produced exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ExtractionOutcome {
    SingleMedia(SingleMedia),
    PlaylistMedia(PlaylistMedia),
    Failure(Failure),
    Cancelled,
}

impl ExtractionOutcome {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ExtractionOutcome::Failure(Failure::new(kind, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::SingleMedia(_) | ExtractionOutcome::PlaylistMedia(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ExtractionOutcome::Failure(failure) => Some(failure.kind),
            _ => None,
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            ExtractionOutcome::SingleMedia(_) | ExtractionOutcome::PlaylistMedia(_) => JobState::Succeeded,
            ExtractionOutcome::Failure(_) => JobState::Failed,
            ExtractionOutcome::Cancelled => JobState::Cancelled,
        }
    }

    /// Directory the caller must clean up once the artifacts are consumed.
    pub fn artifact_dir(&self) -> Option<&Path> {
        match self {
            ExtractionOutcome::SingleMedia(media) => Some(&media.output_dir),
            ExtractionOutcome::PlaylistMedia(media) => Some(&media.output_dir),
            _ => None,
        }
    }

    /// Releases the artifacts of a successful outcome. No-op for failures.
    pub async fn cleanup(&self) {
        if let Some(dir) = self.artifact_dir() {
            crate::utils::cleanup(dir).await;
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed | JobState::Cancelled)
    }
}

/// Progress report forwarded to the caller's sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressUpdate {
    pub request_id: RequestId,
    pub percent: String,
    pub speed: String,
    pub eta: String,
    pub percent_value: f64,
}

/// Receives progress updates on the coordinating runtime, never on the extraction thread.
pub type ProgressSink = Box<dyn FnMut(ProgressUpdate) + Send + 'static>;

/// The caller-facing surface: submit a request, cancel it by id.
#[async_trait::async_trait]
pub trait Downloader {
    async fn submit(&self, request: DownloadRequest, on_progress: Option<ProgressSink>) -> Result<manager::DownloadHandle>;
    async fn cancel(&self, request_id: &RequestId) -> Result<()>;
    fn get_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quality_selectors() {
        assert_eq!("best".parse::<Quality>().unwrap(), Quality::Best);
        assert_eq!("720".parse::<Quality>().unwrap(), Quality::Height(720));
        assert_eq!("1080p".parse::<Quality>().unwrap(), Quality::Height(1080));
        assert!("12".parse::<Quality>().is_err());
        assert!("hd".parse::<Quality>().is_err());
    }

    #[test]
    fn failure_kinds_use_stable_names() {
        assert_eq!(FailureKind::ArtifactTooLarge.to_string(), "artifact-too-large");
        assert_eq!(
            serde_json::to_string(&FailureKind::RegionRestricted).unwrap(),
            "\"region-restricted\""
        );
        assert!(FailureKind::Network.is_retryable());
        assert!(!FailureKind::Copyright.is_retryable());
    }

    #[test]
    fn request_urls_are_trimmed_once() {
        let padded = DownloadRequest::new("  https://youtu.be/abc12345678\n", MediaFormat::Audio, Quality::Best);
        assert_eq!(padded.url(), "https://youtu.be/abc12345678");
        let clean = DownloadRequest::new("https://youtu.be/abc12345678", MediaFormat::Audio, Quality::Best);
        assert_eq!(
            identity::identify(padded.url(), padded.format(), padded.quality()),
            identity::identify(clean.url(), clean.format(), clean.quality())
        );
    }

    #[test]
    fn outcome_reports_terminal_state() {
        assert_eq!(ExtractionOutcome::Cancelled.state(), JobState::Cancelled);
        let failed = ExtractionOutcome::failure(FailureKind::Network, "timed out");
        assert_eq!(failed.state(), JobState::Failed);
        assert_eq!(failed.failure_kind(), Some(FailureKind::Network));
        assert!(failed.artifact_dir().is_none());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }
}
