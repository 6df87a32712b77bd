use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use super::options::ExtractorOptions;

/// Signal returned from a progress hook to make the extractor stop immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aborted;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("extraction aborted by progress hook")]
    Aborted,

    #[error("{message}")]
    Failed { message: String },

    #[error("failed to launch extractor: {0}")]
    Launch(#[source] std::io::Error),

    #[error("unreadable extractor output: {0}")]
    Output(String),
}

impl ExtractorError {
    pub fn failed(message: impl Into<String>) -> Self {
        ExtractorError::Failed { message: message.into() }
    }
}

impl From<Aborted> for ExtractorError {
    fn from(_: Aborted) -> Self {
        ExtractorError::Aborted
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TickStatus {
    Downloading,
    Finished,
    Error,
}

/// One invocation of the extractor's progress hook.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressTick {
    pub status: TickStatus,
    pub percent: String,
    pub speed: String,
    pub eta: String,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
}

impl ProgressTick {
    pub fn downloading(percent: impl Into<String>, speed: impl Into<String>, eta: impl Into<String>) -> Self {
        Self {
            status: TickStatus::Downloading,
            percent: percent.into(),
            speed: speed.into(),
            eta: eta.into(),
            downloaded_bytes: None,
            total_bytes: None,
        }
    }

    pub fn finished() -> Self {
        Self {
            status: TickStatus::Finished,
            percent: "100%".to_string(),
            speed: "N/A".to_string(),
            eta: "N/A".to_string(),
            downloaded_bytes: None,
            total_bytes: None,
        }
    }
}

/// Hook the extractor calls during the blocking download. Returning `Err(Aborted)` stops it.
pub type ProgressHook<'a> = dyn FnMut(&ProgressTick) -> Result<(), Aborted> + Send + 'a;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequestedDownload {
    pub filepath: Option<PathBuf>,
}

/// The extractor's info dictionary, reduced to the fields this crate reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawResult {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    /// Path the extractor prepared for this entry before post-processing.
    #[serde(default)]
    pub filename: Option<PathBuf>,
    #[serde(default)]
    pub requested_downloads: Option<Vec<RequestedDownload>>,
    /// Present for multi-item results; `None` items are entries the extractor failed on.
    #[serde(default)]
    pub entries: Option<Vec<Option<RawResult>>>,
}

impl RawResult {
    pub fn is_playlist(&self) -> bool {
        self.entries.is_some()
    }

    /// Path this entry was written to, rendering `<title>.<ext>` under `output_dir` when the
    /// extractor did not report one.
    pub fn prepared_filename(&self, output_dir: &Path) -> Option<PathBuf> {
        if let Some(path) = &self.filename {
            return Some(path.clone());
        }
        let title = self.title.as_deref()?;
        let ext = self.ext.as_deref()?;
        let stem: String = title
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
            .collect();
        Some(output_dir.join(format!("{}.{}", stem, ext)))
    }

    /// Final file paths reported after post-processing.
    pub fn final_filepaths(&self) -> Vec<PathBuf> {
        self.requested_downloads
            .iter()
            .flatten()
            .filter_map(|d| d.filepath.clone())
            .collect()
    }
}

/// Metadata returned by a non-downloading probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaMetadata {
    pub title: String,
    pub duration_seconds: u64,
    pub uploader: String,
    pub thumbnail_url: Option<String>,
    pub is_playlist: bool,
    pub entry_count: usize,
}

impl From<&RawResult> for MediaMetadata {
    fn from(raw: &RawResult) -> Self {
        Self {
            title: crate::utils::sanitize_title(raw.title.as_deref().unwrap_or("Unknown")),
            duration_seconds: raw.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
            uploader: raw.uploader.clone().unwrap_or_else(|| "Unknown".to_string()),
            thumbnail_url: raw.thumbnail.clone(),
            is_playlist: raw.is_playlist(),
            entry_count: raw.entries.as_ref().map(Vec::len).unwrap_or(1),
        }
    }
}

/// Opaque, synchronous media extractor.
///
/// Both calls block the current thread for the whole network/transcode operation and must be
/// invoked from a worker context. The progress hook is the only way to interrupt a download.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract_metadata(&self, url: &str, cookie_file: Option<&Path>) -> Result<RawResult, ExtractorError>;

    fn extract_and_download(
        &self,
        url: &str,
        options: &ExtractorOptions,
        hook: &mut ProgressHook<'_>,
    ) -> Result<RawResult, ExtractorError>;
}
