use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::config::AppConfig;
use super::{MediaFormat, Quality};

/// Post-download processing steps requested from the extractor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PostProcessor {
    ExtractAudio { codec: String, bitrate_kbps: u32 },
    EmbedMetadata,
    EmbedThumbnail,
}

/// Everything the extractor needs for one download. Built by [`OptionBuilder`], never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractorOptions {
    pub format_selector: String,
    pub output_dir: PathBuf,
    pub output_template: PathBuf,
    pub postprocessors: Vec<PostProcessor>,
    pub merge_output_format: Option<String>,
    pub write_thumbnail: bool,
    pub socket_timeout: Duration,
    pub retries: u32,
    pub fragment_retries: u32,
    pub skip_unavailable_fragments: bool,
    pub cookie_file: Option<PathBuf>,
    pub playlist_end: Option<usize>,
}

impl ExtractorOptions {
    /// Extension the produced file ends up with after post-processing, when it differs from the
    /// downloaded container.
    pub fn final_extension(&self) -> Option<&str> {
        self.postprocessors.iter().find_map(|pp| match pp {
            PostProcessor::ExtractAudio { codec, .. } => Some(audio_extension(codec)),
            _ => None,
        })
    }

    /// Renders the options as yt-dlp command line arguments (without the URL).
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--format".to_string(),
            self.format_selector.clone(),
            "--output".to_string(),
            self.output_template.to_string_lossy().to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout.as_secs().to_string(),
            "--retries".to_string(),
            self.retries.to_string(),
            "--fragment-retries".to_string(),
            self.fragment_retries.to_string(),
            "--no-warnings".to_string(),
        ];

        if self.skip_unavailable_fragments {
            args.push("--skip-unavailable-fragments".to_string());
        } else {
            args.push("--abort-on-unavailable-fragments".to_string());
        }

        if let Some(container) = &self.merge_output_format {
            args.push("--merge-output-format".to_string());
            args.push(container.clone());
        }

        if self.write_thumbnail {
            args.push("--write-thumbnail".to_string());
        }

        for pp in &self.postprocessors {
            match pp {
                PostProcessor::ExtractAudio { codec, bitrate_kbps } => {
                    args.push("--extract-audio".to_string());
                    args.push("--audio-format".to_string());
                    args.push(codec.clone());
                    args.push("--audio-quality".to_string());
                    args.push(format!("{}K", bitrate_kbps));
                }
                PostProcessor::EmbedMetadata => args.push("--embed-metadata".to_string()),
                PostProcessor::EmbedThumbnail => args.push("--embed-thumbnail".to_string()),
            }
        }

        if let Some(cookies) = &self.cookie_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().to_string());
        }

        if let Some(end) = self.playlist_end {
            args.push("--playlist-end".to_string());
            args.push(end.to_string());
        }

        args
    }
}

/// File extension yt-dlp writes for a given `--audio-format` codec.
pub fn audio_extension(codec: &str) -> &str {
    match codec {
        "aac" | "alac" => "m4a",
        "vorbis" => "ogg",
        other => other,
    }
}

/// Maps (format, quality, output dir, cookies) to extractor options. Pure: no I/O.
#[derive(Debug, Clone)]
pub struct OptionBuilder {
    socket_timeout: Duration,
    retries: u32,
    fragment_retries: u32,
    audio_codec: String,
    audio_bitrate_kbps: u32,
    container: String,
}

impl OptionBuilder {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            socket_timeout: Duration::from_secs(config.socket_timeout_secs),
            retries: config.retries,
            fragment_retries: config.fragment_retries,
            audio_codec: config.audio_codec.clone(),
            audio_bitrate_kbps: config.audio_bitrate_kbps,
            container: "mp4".to_string(),
        }
    }

    pub fn build(
        &self,
        format: MediaFormat,
        quality: Quality,
        output_dir: &Path,
        cookie_file: Option<&Path>,
    ) -> ExtractorOptions {
        let mut options = ExtractorOptions {
            format_selector: String::new(),
            output_dir: output_dir.to_path_buf(),
            output_template: output_dir.join("%(title)s.%(ext)s"),
            postprocessors: Vec::new(),
            merge_output_format: None,
            write_thumbnail: false,
            socket_timeout: self.socket_timeout,
            retries: self.retries,
            fragment_retries: self.fragment_retries,
            skip_unavailable_fragments: true,
            cookie_file: cookie_file.map(Path::to_path_buf),
            playlist_end: None,
        };

        match format {
            MediaFormat::Audio => {
                options.format_selector = "bestaudio/best".to_string();
                options.postprocessors = vec![
                    PostProcessor::ExtractAudio {
                        codec: self.audio_codec.clone(),
                        bitrate_kbps: self.audio_bitrate_kbps,
                    },
                    PostProcessor::EmbedMetadata,
                    PostProcessor::EmbedThumbnail,
                ];
                options.write_thumbnail = true;
            }
            MediaFormat::Video => {
                let c = &self.container;
                options.format_selector = match quality {
                    Quality::Best => format!("bestvideo[ext={c}]+bestaudio[ext=m4a]/best[ext={c}]/best"),
                    Quality::Height(h) => format!(
                        "bestvideo[height<={h}][ext={c}]+bestaudio[ext=m4a]/best[height<={h}][ext={c}]/best[height<={h}]"
                    ),
                };
                options.merge_output_format = Some(c.clone());
            }
        }

        options
    }

    pub fn build_with_playlist_end(
        &self,
        format: MediaFormat,
        quality: Quality,
        output_dir: &Path,
        cookie_file: Option<&Path>,
        playlist_end: usize,
    ) -> ExtractorOptions {
        let mut options = self.build(format, quality, output_dir, cookie_file);
        options.playlist_end = Some(playlist_end);
        options
    }
}
