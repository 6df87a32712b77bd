use crate::errors::{AppError, Result};
use regex::Regex;
use url::Url;
use std::path::{Component, Path};

const MAX_URL_LEN: usize = 2000;

const SUPPORTED_DOMAINS: &[&str] = &["youtube.com", "youtu.be"];

const SOURCE_PATTERNS: &[&str] = &[
    r"^https?://(?:www\.|m\.|music\.)?youtube\.com/watch\?(?:.*&)?v=[\w-]{11}",
    r"^https?://(?:www\.|m\.)?youtube\.com/shorts/[\w-]{11}",
    r"^https?://youtu\.be/[\w-]{11}",
    r"^https?://(?:www\.|m\.|music\.)?youtube\.com/(?:playlist|watch)\?(?:.*&)?list=[\w-]+",
];

/// Cheap pre-flight checks on user input before anything reaches the extractor.
pub struct InputValidator {
    patterns: Vec<Regex>,
}

impl Default for InputValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl InputValidator {
    pub fn new() -> Self {
        Self::with_patterns(SOURCE_PATTERNS)
    }

    /// Validator accepting any http(s) URL whose host is listed in `SUPPORTED_DOMAINS` and that
    /// matches one of `patterns`. Patterns that fail to compile are skipped.
    pub fn with_patterns(patterns: &[&str]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("[VALIDATE] ignoring bad source pattern {:?}: {}", p, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn validate_url(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("URL cannot be empty".to_string()));
        }
        if url.len() > MAX_URL_LEN {
            return Err(AppError::Validation(format!("URL too long (max {} characters)", MAX_URL_LEN)));
        }

        let parsed_url = Url::parse(url)
            .map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

        if !matches!(parsed_url.scheme(), "http" | "https") {
            return Err(AppError::Validation(format!("Unsupported scheme: {}", parsed_url.scheme())));
        }

        let host = parsed_url.host_str()
            .ok_or_else(|| AppError::Validation("URL must have a host".to_string()))?;

        let is_supported = SUPPORTED_DOMAINS.iter().any(|domain| {
            host == *domain || host.ends_with(&format!(".{}", domain))
        });
        if !is_supported {
            return Err(AppError::Validation(format!("Unsupported platform: {}", host)));
        }

        if !self.patterns.iter().any(|re| re.is_match(url)) {
            return Err(AppError::Validation("Not a video, short or playlist link".to_string()));
        }

        Ok(())
    }

    pub fn validate_cookie_file(&self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(AppError::Validation("Cookie file path cannot be empty".to_string()));
        }
        if path.to_string_lossy().contains('\0') {
            return Err(AppError::Validation("Null bytes not allowed in file path".to_string()));
        }
        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(AppError::Validation("Path traversal detected".to_string()));
        }
        if !path.is_file() {
            return Err(AppError::NotFound(format!("Cookie file {:?} does not exist", path)));
        }
        Ok(())
    }
}
