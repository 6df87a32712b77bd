//! Download orchestration for a chat-driven video downloader.
//!
//! A [`DownloadManager`] turns a [`DownloadRequest`] into an [`ExtractionOutcome`]: it admits the
//! request through a bounded concurrency gate, drives a blocking [`Extractor`] on a worker thread
//! while forwarding throttled progress, honours cancellation requested by id from any task, and
//! removes partial artifacts whenever a request does not succeed.

pub mod config;
pub mod downloader;
pub mod errors;
pub mod security;
pub mod utils;

pub use config::AppConfig;
pub use downloader::extractor::{Extractor, ExtractorError, MediaMetadata};
pub use downloader::manager::{DownloadHandle, DownloadManager};
pub use downloader::ytdlp::YtDlpExtractor;
pub use downloader::{
    DownloadRequest, Downloader, ExtractionOutcome, Failure, FailureKind, MediaFormat, ProgressSink, ProgressUpdate,
    Quality, RequestId,
};
pub use errors::{AppError, Result};
