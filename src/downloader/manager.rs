use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use crate::config::AppConfig;
use crate::errors::Result;
use crate::security::InputValidator;
use crate::utils::ScopedDir;
use super::classify::classify;
use super::extractor::{Aborted, Extractor, ExtractorError, MediaMetadata, ProgressTick, TickStatus};
use super::gate::ConcurrencyGate;
use super::identity::identify;
use super::options::OptionBuilder;
use super::progress::{clean_field, parse_percent, ProgressThrottle};
use super::registry::{CancellationRegistry, JobSnapshot, Registration};
use super::resolver::ArtifactResolver;
use super::{
    DownloadRequest, Downloader, ExtractionOutcome, Failure, FailureKind, JobState, ProgressSink, ProgressUpdate,
    RequestId,
};

#[derive(Debug)]
struct RunnerSettings {
    temp_dir: PathBuf,
    max_playlist_items: usize,
    max_artifact_size_bytes: u64,
    progress_step_percent: u32,
    max_duration_seconds: u64,
    unique_request_ids: bool,
    cookie_file: Option<PathBuf>,
}

/// Runs download requests against a blocking [`Extractor`].
///
/// Each request gets a private output directory, a registry entry that a concurrent
/// [`cancel`](Self::cancel) can flip, and a slot in the concurrency gate. The extractor call runs
/// on the blocking thread pool; its progress hook checks the cancellation flag on every tick and
/// pushes throttled updates through a channel that a separate task drains into the caller's sink.
/// Failed and cancelled requests have their directory removed before the outcome is returned.
#[derive(Clone)]
pub struct DownloadManager {
    extractor: Arc<dyn Extractor>,
    gate: ConcurrencyGate,
    registry: Arc<CancellationRegistry>,
    options: Arc<OptionBuilder>,
    validator: Arc<InputValidator>,
    settings: Arc<RunnerSettings>,
}

/// A submitted request: its id (for [`DownloadManager::cancel`]) and the pending outcome.
#[derive(Debug)]
pub struct DownloadHandle {
    id: RequestId,
    task: JoinHandle<ExtractionOutcome>,
}

impl DownloadHandle {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub async fn outcome(self) -> ExtractionOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("[RUNNER] job {} task failed: {}", self.id, e);
                ExtractionOutcome::failure(FailureKind::Unknown, format!("Download task failed: {}", e))
            }
        }
    }
}

impl DownloadManager {
    pub fn new(config: &AppConfig, extractor: Arc<dyn Extractor>) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.temp_dir)?;

        log::info!(
            "[RUNNER] {} ready: {} concurrent downloads, temp dir {:?}",
            extractor.name(),
            config.max_concurrent_downloads,
            config.temp_dir
        );

        Ok(Self {
            extractor,
            gate: ConcurrencyGate::new(config.max_concurrent_downloads),
            registry: Arc::new(CancellationRegistry::new()),
            options: Arc::new(OptionBuilder::new(config)),
            validator: Arc::new(InputValidator::new()),
            settings: Arc::new(RunnerSettings {
                temp_dir: config.temp_dir.clone(),
                max_playlist_items: config.max_playlist_items,
                max_artifact_size_bytes: config.max_artifact_size_bytes,
                progress_step_percent: config.progress_step_percent,
                max_duration_seconds: config.max_duration_seconds(),
                unique_request_ids: config.unique_request_ids,
                cookie_file: config.cookie_file.clone(),
            }),
        })
    }

    /// Fingerprint of `request`. The id a job actually runs under may carry a collision suffix;
    /// use [`DownloadHandle::id`] for that.
    pub fn request_id(&self, request: &DownloadRequest) -> RequestId {
        identify(request.url(), request.format(), request.quality())
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    pub fn temp_dir(&self) -> &Path {
        &self.settings.temp_dir
    }

    /// Requests cancellation of an in-flight job. Unknown or finished ids are ignored.
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.registry.cancel(id)
    }

    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        self.registry.snapshot()
    }

    /// Runs one request to completion.
    pub async fn run(
        &self,
        request: DownloadRequest,
        cookie_file: Option<PathBuf>,
        on_progress: Option<ProgressSink>,
    ) -> ExtractionOutcome {
        if let Err(failure) = self.check_source(&request) {
            return ExtractionOutcome::Failure(failure);
        }
        let registration = self.register(&request);
        self.execute(registration, request, cookie_file, on_progress).await
    }

    /// Admits a request and runs it on a background task. The returned id can be cancelled
    /// immediately, even while the job is still queued at the gate.
    pub fn start(
        &self,
        request: DownloadRequest,
        cookie_file: Option<PathBuf>,
        on_progress: Option<ProgressSink>,
    ) -> DownloadHandle {
        if let Err(failure) = self.check_source(&request) {
            return DownloadHandle {
                id: self.request_id(&request),
                task: tokio::spawn(async move { ExtractionOutcome::Failure(failure) }),
            };
        }

        let registration = self.register(&request);
        let id = registration.id().clone();
        let manager = self.clone();
        let task = tokio::spawn(async move { manager.execute(registration, request, cookie_file, on_progress).await });
        DownloadHandle { id, task }
    }

    /// Non-downloading metadata probe.
    pub async fn probe(&self, url: &str, cookie_file: Option<PathBuf>) -> std::result::Result<MediaMetadata, Failure> {
        let url = url.trim();
        self.validator
            .validate_url(url)
            .map_err(|e| Failure::new(FailureKind::InvalidSource, e.to_string()))?;

        let extractor = self.extractor.clone();
        let url = url.to_string();
        let cookie_file = self.effective_cookie_file(cookie_file);
        let result = tokio::task::spawn_blocking(move || extractor.extract_metadata(&url, cookie_file.as_deref())).await;

        match result {
            Ok(Ok(raw)) => Ok(MediaMetadata::from(&raw)),
            Ok(Err(e)) => Err(classify(&e).unwrap_or_else(|| Failure::new(FailureKind::Unknown, e.to_string()))),
            Err(e) => Err(Failure::new(FailureKind::Unknown, format!("Probe task failed: {}", e))),
        }
    }

    /// Probes `url` and rejects media longer than the configured maximum duration.
    pub async fn check_duration(&self, url: &str, cookie_file: Option<PathBuf>) -> std::result::Result<MediaMetadata, Failure> {
        let metadata = self.probe(url, cookie_file).await?;
        let limit = self.settings.max_duration_seconds;
        if limit > 0 && metadata.duration_seconds > limit {
            return Err(Failure::new(
                FailureKind::TooLong,
                format!("Video too long ({} min). Max: {} min.", metadata.duration_seconds / 60, limit / 60),
            ));
        }
        Ok(metadata)
    }

    fn check_source(&self, request: &DownloadRequest) -> std::result::Result<(), Failure> {
        self.validator.validate_url(request.url()).map_err(|e| {
            log::warn!("[RUNNER] rejected {:?}: {}", request.url(), e);
            Failure::new(FailureKind::InvalidSource, e.to_string())
        })
    }

    /// The per-request cookie file, else the configured one. A file that fails validation is
    /// dropped so the download still runs anonymously.
    fn effective_cookie_file(&self, cookie_file: Option<PathBuf>) -> Option<PathBuf> {
        let path = cookie_file.or_else(|| self.settings.cookie_file.clone())?;
        match self.validator.validate_cookie_file(&path) {
            Ok(()) => Some(path),
            Err(e) => {
                log::warn!("[RUNNER] ignoring cookie file {:?}: {}", path, e);
                None
            }
        }
    }

    fn register(&self, request: &DownloadRequest) -> Registration {
        self.registry
            .register(self.request_id(request), request.url(), self.settings.unique_request_ids)
    }

    async fn execute(
        &self,
        registration: Registration,
        request: DownloadRequest,
        cookie_file: Option<PathBuf>,
        on_progress: Option<ProgressSink>,
    ) -> ExtractionOutcome {
        let id = registration.id().clone();
        let outcome = self.execute_inner(&registration, &request, cookie_file, on_progress).await;
        registration.set_state(outcome.state());

        match &outcome {
            ExtractionOutcome::SingleMedia(media) => {
                log::info!("[RUNNER] job {} succeeded: {:?} ({} bytes)", id, media.file_path, media.file_size_bytes)
            }
            ExtractionOutcome::PlaylistMedia(media) => {
                log::info!("[RUNNER] job {} succeeded: {} playlist items", id, media.item_count)
            }
            ExtractionOutcome::Failure(failure) => log::warn!("[RUNNER] job {} failed: {}", id, failure),
            ExtractionOutcome::Cancelled => log::info!("[RUNNER] job {} cancelled", id),
        }

        drop(registration);
        outcome
    }

    async fn execute_inner(
        &self,
        registration: &Registration,
        request: &DownloadRequest,
        cookie_file: Option<PathBuf>,
        on_progress: Option<ProgressSink>,
    ) -> ExtractionOutcome {
        let id = registration.id().clone();
        let flag = registration.flag();

        let output_dir = match ScopedDir::create_unique(&self.settings.temp_dir, id.as_str()).await {
            Ok(dir) => dir,
            Err(e) => {
                return ExtractionOutcome::failure(FailureKind::Unknown, format!("Cannot create output directory: {}", e))
            }
        };

        let permit = tokio::select! {
            permit = self.gate.acquire() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    output_dir.remove().await;
                    return ExtractionOutcome::failure(FailureKind::Unknown, e.to_string());
                }
            },
            _ = flag.cancelled() => {
                log::info!("[RUNNER] job {} cancelled while queued", id);
                output_dir.remove().await;
                return ExtractionOutcome::Cancelled;
            }
        };

        if flag.is_cancelled() {
            drop(permit);
            output_dir.remove().await;
            return ExtractionOutcome::Cancelled;
        }
        registration.set_state(JobState::Running);

        let playlist_cap = request
            .playlist_items()
            .map(|n| n.get().min(self.settings.max_playlist_items))
            .unwrap_or(self.settings.max_playlist_items);
        let cookie_file = self.effective_cookie_file(cookie_file);
        let options = self.options.build_with_playlist_end(
            request.format(),
            request.quality(),
            output_dir.path(),
            cookie_file.as_deref(),
            playlist_cap,
        );
        let resolver = ArtifactResolver::new(
            output_dir.path(),
            options.final_extension(),
            self.settings.max_artifact_size_bytes,
            playlist_cap,
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_progress(rx, on_progress));

        let extractor = self.extractor.clone();
        let url = request.url().to_string();
        let step = self.settings.progress_step_percent;
        let hook_id = id.clone();
        let hook_flag = flag.clone();

        log::info!("[RUNNER] job {} running {} ({}, {})", id, url, request.format(), request.quality());
        // The worker owns the slot and the directory so that neither is released while the
        // extractor may still be writing, even if this future is dropped.
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut throttle = ProgressThrottle::new(step);
            let mut hook = move |tick: &ProgressTick| -> std::result::Result<(), Aborted> {
                if hook_flag.is_cancelled() {
                    return Err(Aborted);
                }
                if tick.status == TickStatus::Downloading {
                    if let Some(value) = parse_percent(&tick.percent) {
                        if throttle.admit(value) {
                            let _ = tx.send(ProgressUpdate {
                                request_id: hook_id.clone(),
                                percent: clean_field(&tick.percent),
                                speed: clean_field(&tick.speed),
                                eta: clean_field(&tick.eta),
                                percent_value: value,
                            });
                        }
                    }
                }
                Ok(())
            };
            let result = extractor
                .extract_and_download(&url, &options, &mut hook)
                .map(|raw| resolver.resolve(&raw));
            (output_dir, result)
        })
        .await;

        if let Err(e) = forwarder.await {
            log::warn!("[RUNNER] progress forwarder for {} failed: {}", id, e);
        }

        let (output_dir, result) = match result {
            Ok(finished) => finished,
            Err(e) => {
                // The guard was dropped with the worker, which already removed the directory.
                return ExtractionOutcome::failure(FailureKind::Unknown, format!("Extractor worker failed: {}", e));
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(ExtractorError::Aborted) => ExtractionOutcome::Cancelled,
            Err(e) => match classify(&e) {
                Some(failure) => ExtractionOutcome::Failure(failure),
                None => ExtractionOutcome::Cancelled,
            },
        };

        if outcome.is_success() {
            output_dir.persist();
        } else {
            output_dir.remove().await;
        }
        outcome
    }
}

async fn forward_progress(mut rx: mpsc::UnboundedReceiver<ProgressUpdate>, mut sink: Option<ProgressSink>) {
    while let Some(update) = rx.recv().await {
        if let Some(sink) = sink.as_mut() {
            sink(update);
        }
    }
}

#[async_trait::async_trait]
impl Downloader for DownloadManager {
    async fn submit(&self, request: DownloadRequest, on_progress: Option<ProgressSink>) -> Result<DownloadHandle> {
        Ok(self.start(request, None, on_progress))
    }

    async fn cancel(&self, request_id: &RequestId) -> Result<()> {
        self.registry.cancel(request_id);
        Ok(())
    }

    fn get_name(&self) -> &str {
        self.extractor.name()
    }
}
