use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tubefetch::utils::{ensure_dir_exists, format_duration};
use tubefetch::{
    AppConfig, DownloadManager, DownloadRequest, ExtractionOutcome, MediaFormat, ProgressSink, ProgressUpdate, Quality,
    YtDlpExtractor,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the per-user one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a video, short or playlist
    Fetch {
        url: String,

        #[arg(short, long, default_value = "audio")]
        format: MediaFormat,

        /// `best` or a height such as `720`
        #[arg(short, long, default_value = "best")]
        quality: Quality,

        /// Netscape cookie file for age-gated or members-only media
        #[arg(long)]
        cookies: Option<PathBuf>,

        /// Maximum number of playlist entries to download
        #[arg(long)]
        playlist_items: Option<NonZeroUsize>,

        /// Where finished files are moved
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Print media metadata without downloading
    Probe {
        url: String,

        #[arg(long)]
        cookies: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Probe { url, cookies } => {
            let manager = build_manager(&config)?;
            match manager.probe(&url, cookies).await {
                Ok(metadata) => {
                    println!("{}", serde_json::to_string_pretty(&metadata)?);
                    info!("Duration: {}", format_duration(metadata.duration_seconds));
                    Ok(())
                }
                Err(failure) => anyhow::bail!("{}", failure),
            }
        }
        Command::Fetch {
            url,
            format,
            quality,
            cookies,
            playlist_items,
            output_dir,
        } => {
            let manager = build_manager(&config)?;
            let mut request = DownloadRequest::new(url, format, quality);
            if let Some(cap) = playlist_items {
                request = request.with_playlist_items(cap);
            }
            fetch(&manager, request, cookies, &output_dir).await
        }
    }
}

fn build_manager(config: &AppConfig) -> anyhow::Result<DownloadManager> {
    let extractor = Arc::new(YtDlpExtractor::new(config));
    DownloadManager::new(config, extractor).context("Failed to initialise download manager")
}

async fn fetch(
    manager: &DownloadManager,
    request: DownloadRequest,
    cookies: Option<PathBuf>,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("Connecting...");

    let bar = pb.clone();
    let on_progress: ProgressSink = Box::new(move |update: ProgressUpdate| {
        bar.set_position(update.percent_value.round() as u64);
        bar.set_message(format!("Speed: {} | ETA: {}", update.speed, update.eta));
    });

    let handle = manager.start(request, cookies, Some(on_progress));
    let id = handle.id().clone();

    let canceller = manager.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling {}", id);
            canceller.cancel(&id);
        }
    });

    let outcome = handle.outcome().await;
    interrupt.abort();
    pb.finish_and_clear();

    let delivered = match &outcome {
        ExtractionOutcome::SingleMedia(media) => vec![media.file_path.clone()],
        ExtractionOutcome::PlaylistMedia(media) => media.file_paths.clone(),
        ExtractionOutcome::Failure(_) | ExtractionOutcome::Cancelled => Vec::new(),
    };

    let moved = deliver(&delivered, output_dir).await;
    outcome.cleanup().await;
    let moved = moved?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "result": &outcome,
            "delivered": moved,
        }))?
    );

    match outcome {
        ExtractionOutcome::Failure(failure) => anyhow::bail!("{}", failure),
        ExtractionOutcome::Cancelled => anyhow::bail!("Download cancelled"),
        _ => Ok(()),
    }
}

/// Moves artifacts out of the job directory, copying when a rename crosses filesystems.
async fn deliver(files: &[PathBuf], output_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if files.is_empty() {
        return Ok(Vec::new());
    }
    ensure_dir_exists(output_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", output_dir))?;

    let mut moved = Vec::with_capacity(files.len());
    for file in files {
        let Some(name) = file.file_name() else { continue };
        let target = output_dir.join(name);
        if tokio::fs::rename(file, &target).await.is_err() {
            tokio::fs::copy(file, &target)
                .await
                .with_context(|| format!("Failed to move {:?} to {:?}", file, target))?;
        }
        info!("📁 Saved {:?}", target);
        moved.push(target);
    }
    Ok(moved)
}
