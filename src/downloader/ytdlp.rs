use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use crate::config::AppConfig;
use super::extractor::{Extractor, ExtractorError, ProgressHook, ProgressTick, RawResult, TickStatus};
use super::options::ExtractorOptions;
use super::progress::clean_field;

/// Marker prefixed to every progress line so it can be told apart from yt-dlp's other output.
const PROGRESS_MARKER: &str = "TFPROG";
const STDERR_TAIL: usize = 50;

/// `Extractor` backed by the `yt-dlp` executable.
pub struct YtDlpExtractor {
    name: String,
    ytdlp_path: String,
}

enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl YtDlpExtractor {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            name: "yt-dlp".to_string(),
            ytdlp_path: config.ytdlp_path.clone(),
        }
    }

    fn progress_template() -> String {
        format!(
            "download:{}|%(progress.status)s|%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s",
            PROGRESS_MARKER
        )
    }

    fn download_args(options: &ExtractorOptions, url: &str) -> Vec<String> {
        let mut args = options.to_args();
        args.extend([
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            Self::progress_template(),
            "--dump-single-json".to_string(),
            "--no-simulate".to_string(),
            url.to_string(),
        ]);
        args
    }
}

/// Parses one line written through [`YtDlpExtractor::progress_template`].
pub fn parse_progress_line(line: &str) -> Option<ProgressTick> {
    let payload = line.trim().strip_prefix(PROGRESS_MARKER)?.strip_prefix('|')?;
    let fields: Vec<&str> = payload.split('|').collect();
    if fields.len() < 6 {
        return None;
    }

    let status = match fields[0].trim() {
        "downloading" => TickStatus::Downloading,
        "finished" => TickStatus::Finished,
        _ => TickStatus::Error,
    };
    let bytes = |raw: &str| raw.trim().parse::<f64>().ok().map(|v| v as u64);

    Some(ProgressTick {
        status,
        percent: clean_field(fields[1]),
        speed: clean_field(fields[2]),
        eta: clean_field(fields[3]),
        downloaded_bytes: bytes(fields[4]),
        total_bytes: bytes(fields[5]),
    })
}

/// Condenses yt-dlp's stderr into a diagnostic message, preferring `ERROR:` lines.
pub fn error_summary(stderr_tail: &VecDeque<String>) -> String {
    let errors: Vec<&str> = stderr_tail
        .iter()
        .map(String::as_str)
        .filter(|line| line.starts_with("ERROR:"))
        .collect();
    if !errors.is_empty() {
        return errors.join("\n");
    }
    stderr_tail
        .back()
        .cloned()
        .unwrap_or_else(|| "yt-dlp exited without output".to_string())
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: R,
    tx: mpsc::Sender<OutputLine>,
    wrap: fn(String) -> OutputLine,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(|line| line.ok()) {
            if tx.send(wrap(line)).is_err() {
                break;
            }
        }
    })
}

impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn extract_metadata(&self, url: &str, cookie_file: Option<&Path>) -> Result<RawResult, ExtractorError> {
        log::info!("🔍 [YTDLP] probing {}", url);
        let mut cmd = Command::new(&self.ytdlp_path);
        cmd.args(["--dump-single-json", "--skip-download", "--flat-playlist", "--no-warnings"]);
        if let Some(cookies) = cookie_file {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.arg(url).stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = cmd.output().map_err(ExtractorError::Launch)?;
        if !output.status.success() {
            let stderr: VecDeque<String> = String::from_utf8_lossy(&output.stderr).lines().map(str::to_string).collect();
            let message = error_summary(&stderr);
            log::error!("❌ [YTDLP] probe failed: {}", message);
            return Err(ExtractorError::failed(message));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| ExtractorError::Output(e.to_string()))
    }

    fn extract_and_download(
        &self,
        url: &str,
        options: &ExtractorOptions,
        hook: &mut ProgressHook<'_>,
    ) -> Result<RawResult, ExtractorError> {
        let args = Self::download_args(options, url);
        log::info!("⬇️ [YTDLP] running {} {}", self.ytdlp_path, args.join(" "));

        let mut child = Command::new(&self.ytdlp_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ExtractorError::Launch)?;

        let (tx, rx) = mpsc::channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, tx.clone(), OutputLine::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, tx.clone(), OutputLine::Stderr));
        }
        drop(tx);

        let mut json_line: Option<String> = None;
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
        let mut aborted = false;

        for line in rx.iter() {
            let text = match &line {
                OutputLine::Stdout(text) | OutputLine::Stderr(text) => text,
            };

            if let Some(tick) = parse_progress_line(text) {
                if hook(&tick).is_err() {
                    log::info!("🛑 [YTDLP] hook requested abort, stopping yt-dlp");
                    aborted = true;
                    break;
                }
                continue;
            }

            match line {
                OutputLine::Stdout(text) if text.trim_start().starts_with('{') => json_line = Some(text),
                OutputLine::Stdout(text) => log::debug!("[YTDLP] stdout: {}", text),
                OutputLine::Stderr(text) => {
                    log::debug!("[YTDLP] stderr: {}", text);
                    if stderr_tail.len() == STDERR_TAIL {
                        stderr_tail.pop_front();
                    }
                    stderr_tail.push_back(text);
                }
            }
        }

        if aborted {
            if let Err(e) = child.kill() {
                log::warn!("[YTDLP] failed to kill yt-dlp: {}", e);
            }
            let _ = child.wait();
            drop(rx);
            for reader in readers {
                let _ = reader.join();
            }
            return Err(ExtractorError::Aborted);
        }

        let status = child.wait().map_err(ExtractorError::Launch)?;
        for reader in readers {
            let _ = reader.join();
        }

        if !status.success() {
            let message = error_summary(&stderr_tail);
            log::error!("❌ [YTDLP] download failed ({}): {}", status, message);
            return Err(ExtractorError::failed(message));
        }

        let json = json_line.ok_or_else(|| ExtractorError::Output("yt-dlp printed no info JSON".to_string()))?;
        let raw: RawResult = serde_json::from_str(&json).map_err(|e| ExtractorError::Output(e.to_string()))?;
        log::info!("✅ [YTDLP] finished {:?}", raw.title);
        Ok(raw)
    }
}
