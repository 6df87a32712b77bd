use std::path::{Path, PathBuf};
use crate::utils::sanitize_title;
use super::extractor::RawResult;
use super::{ExtractionOutcome, FailureKind, PlaylistMedia, SingleMedia};

/// Turns a raw extractor result into an [`ExtractionOutcome`] by locating the produced files on
/// disk and enforcing the size and playlist limits. Never touches the network.
#[derive(Debug, Clone)]
pub struct ArtifactResolver {
    output_dir: PathBuf,
    final_extension: Option<String>,
    size_limit_bytes: u64,
    playlist_cap: usize,
}

impl ArtifactResolver {
    /// `final_extension` is the extension post-processing gives the file (e.g. `mp3` for audio
    /// extraction), or `None` to keep the one the extractor reported.
    pub fn new(output_dir: &Path, final_extension: Option<&str>, size_limit_bytes: u64, playlist_cap: usize) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            final_extension: final_extension.map(str::to_string),
            size_limit_bytes,
            playlist_cap: playlist_cap.max(1),
        }
    }

    pub fn resolve(&self, raw: &RawResult) -> ExtractionOutcome {
        match &raw.entries {
            Some(entries) => self.resolve_playlist(raw, entries),
            None => self.resolve_single(raw),
        }
    }

    fn resolve_playlist(&self, raw: &RawResult, entries: &[Option<RawResult>]) -> ExtractionOutcome {
        let mut file_paths = Vec::new();

        for entry in entries.iter().take(self.playlist_cap).flatten() {
            let Some(path) = self.locate(entry) else {
                log::warn!("[RESOLVE] playlist entry {:?} produced no file, skipping", entry.title);
                continue;
            };
            match std::fs::metadata(&path) {
                Ok(meta) if meta.len() > self.size_limit_bytes => {
                    log::warn!("[RESOLVE] playlist entry {:?} is {} bytes, over the limit; dropping", path, meta.len());
                    crate::utils::cleanup_blocking(&path);
                }
                Ok(_) => file_paths.push(path),
                Err(e) => log::warn!("[RESOLVE] cannot stat {:?}: {}", path, e),
            }
        }

        let item_count = file_paths.len();
        ExtractionOutcome::PlaylistMedia(PlaylistMedia {
            file_paths,
            title: sanitize_title(raw.title.as_deref().unwrap_or("Playlist")),
            item_count,
            output_dir: self.output_dir.clone(),
        })
    }

    fn resolve_single(&self, raw: &RawResult) -> ExtractionOutcome {
        let Some(path) = self.locate(raw) else {
            return ExtractionOutcome::failure(FailureKind::ArtifactMissing, "File not created");
        };

        let file_size = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                return ExtractionOutcome::failure(
                    FailureKind::ArtifactMissing,
                    format!("Cannot read produced file {:?}: {}", path, e),
                )
            }
        };

        if file_size > self.size_limit_bytes {
            crate::utils::cleanup_blocking(&path);
            return ExtractionOutcome::failure(
                FailureKind::ArtifactTooLarge,
                format!("File size {} exceeds limit {}", file_size, self.size_limit_bytes),
            );
        }

        ExtractionOutcome::SingleMedia(SingleMedia {
            file_path: path,
            title: sanitize_title(raw.title.as_deref().unwrap_or("Unknown")),
            duration_seconds: raw.duration.map(|d| d.max(0.0).round() as u64).unwrap_or(0),
            uploader: raw.uploader.clone().unwrap_or_else(|| "Unknown".to_string()),
            thumbnail_url: raw.thumbnail.clone(),
            file_size_bytes: file_size,
            output_dir: self.output_dir.clone(),
        })
    }

    /// Existing file for `entry`: the prepared filename with the final extension applied, then any
    /// post-processed path the extractor reported.
    fn locate(&self, entry: &RawResult) -> Option<PathBuf> {
        let prepared = entry.prepared_filename(&self.output_dir).map(|path| match &self.final_extension {
            Some(ext) => path.with_extension(ext),
            None => path,
        });

        prepared
            .into_iter()
            .chain(entry.final_filepaths())
            .find(|path| path.is_file())
    }
}
