#![allow(dead_code)]

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tubefetch::downloader::extractor::{Extractor, ExtractorError, ProgressHook, ProgressTick, RawResult};
use tubefetch::downloader::options::ExtractorOptions;
use tubefetch::{AppConfig, DownloadManager};

pub const VIDEO_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
pub const SHORT_URL: &str = "https://youtu.be/abc12345678";
pub const PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=PLtest1234";

/// Scripted extractor: emits the configured ticks, then writes files the way yt-dlp would.
#[derive(Debug, Clone)]
pub struct StubExtractor {
    pub title: String,
    /// Extension reported in the raw result (the downloaded container).
    pub ext: String,
    /// Extension of the file actually written; differs from `ext` after audio extraction.
    pub written_ext: String,
    pub bytes: usize,
    pub ticks: Vec<f64>,
    pub tick_delay: Duration,
    pub playlist_entries: Option<usize>,
    pub fail_with: Option<String>,
    pub hold_until_cancel: bool,
    pub duration: f64,
    pub active: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub ticks_fired: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
    pub seen_options: Arc<Mutex<Vec<ExtractorOptions>>>,
    pub seen_urls: Arc<Mutex<Vec<String>>>,
}

impl Default for StubExtractor {
    fn default() -> Self {
        Self {
            title: "Test Track".to_string(),
            ext: "webm".to_string(),
            written_ext: "mp3".to_string(),
            bytes: 1_024,
            ticks: vec![10.0, 50.0, 100.0],
            tick_delay: Duration::from_millis(1),
            playlist_entries: None,
            fail_with: None,
            hold_until_cancel: false,
            duration: 212.0,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            ticks_fired: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
            seen_options: Arc::new(Mutex::new(Vec::new())),
            seen_urls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StubExtractor {
    fn enter(&self) -> ActiveGuard {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ActiveGuard(self.active.clone())
    }

    fn tick(&self, hook: &mut ProgressHook<'_>, percent: f64) -> Result<(), ExtractorError> {
        std::thread::sleep(self.tick_delay);
        hook(&ProgressTick::downloading(format!("{:5.1}%", percent), "1.00MiB/s", "00:10"))?;
        self.ticks_fired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write_entry(&self, dir: &Path, title: &str) -> RawResult {
        let path = dir.join(format!("{}.{}", title, self.written_ext));
        std::fs::write(&path, vec![0u8; self.bytes]).expect("write stub artifact");
        RawResult {
            id: Some(format!("id-{}", title)),
            title: Some(title.to_string()),
            duration: Some(self.duration),
            uploader: Some("Stub Uploader".to_string()),
            ext: Some(self.ext.clone()),
            filename: Some(dir.join(format!("{}.{}", title, self.ext))),
            ..Default::default()
        }
    }
}

impl Extractor for StubExtractor {
    fn name(&self) -> &str {
        "stub"
    }

    fn extract_metadata(&self, _url: &str, _cookie_file: Option<&Path>) -> Result<RawResult, ExtractorError> {
        if let Some(message) = &self.fail_with {
            return Err(ExtractorError::failed(message.clone()));
        }
        Ok(RawResult {
            title: Some(self.title.clone()),
            duration: Some(self.duration),
            uploader: Some("Stub Uploader".to_string()),
            ..Default::default()
        })
    }

    fn extract_and_download(
        &self,
        url: &str,
        options: &ExtractorOptions,
        hook: &mut ProgressHook<'_>,
    ) -> Result<RawResult, ExtractorError> {
        let _guard = self.enter();
        self.seen_options.lock().push(options.clone());
        self.seen_urls.lock().push(url.to_string());
        let dir = options.output_dir.clone();
        std::fs::write(dir.join("partial.part"), b"partial").expect("write partial file");

        for percent in &self.ticks {
            self.tick(hook, *percent)?;
        }

        if self.hold_until_cancel {
            let last = self.ticks.last().copied().unwrap_or(0.0);
            for _ in 0..5_000 {
                self.tick(hook, last)?;
            }
            return Err(ExtractorError::failed("stub was never cancelled"));
        }

        if let Some(message) = &self.fail_with {
            return Err(ExtractorError::failed(message.clone()));
        }

        std::fs::remove_file(dir.join("partial.part")).expect("remove partial file");
        hook(&ProgressTick::finished())?;

        match self.playlist_entries {
            Some(count) => {
                let produced = count.min(options.playlist_end.unwrap_or(count));
                let entries = (0..produced)
                    .map(|i| Some(self.write_entry(&dir, &format!("Item {:02}", i))))
                    .collect();
                Ok(RawResult {
                    title: Some("Stub Playlist".to_string()),
                    entries: Some(entries),
                    ..Default::default()
                })
            }
            None => Ok(self.write_entry(&dir, &self.title)),
        }
    }
}

pub struct Harness {
    pub manager: DownloadManager,
    pub stub: StubExtractor,
    pub temp: TempDir,
}

impl Harness {
    pub fn temp_root(&self) -> PathBuf {
        self.temp.path().join("jobs")
    }

    pub fn job_dirs(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.temp_root()) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn harness(stub: StubExtractor, tweak: impl FnOnce(&mut AppConfig)) -> Harness {
    let temp = TempDir::new().expect("temp dir");
    let mut config = AppConfig {
        temp_dir: temp.path().join("jobs"),
        ..AppConfig::default()
    };
    tweak(&mut config);
    let manager = DownloadManager::new(&config, Arc::new(stub.clone())).expect("manager");
    Harness { manager, stub, temp }
}

/// Polls `condition` until it holds or a few seconds pass.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
