//! Maps extractor error text to a [`FailureKind`].
//!
//! The extractor only reports free-form messages, so classification is a best-effort substring
//! match. Rules are checked top to bottom against the lower-cased message and the first hit wins;
//! more specific phrases therefore come before generic ones ("blocked it in your country" and
//! "service unavailable" before "unavailable").

use super::extractor::ExtractorError;
use super::{Failure, FailureKind};

pub const CLASSIFICATION_TABLE: &[(&str, FailureKind)] = &[
    ("copyright", FailureKind::Copyright),
    ("private video", FailureKind::Private),
    ("video is private", FailureKind::Private),
    ("private", FailureKind::Private),
    ("members-only", FailureKind::Private),
    ("not available in your country", FailureKind::RegionRestricted),
    ("blocked it in your country", FailureKind::RegionRestricted),
    ("geo restriction", FailureKind::RegionRestricted),
    ("geo-restricted", FailureKind::RegionRestricted),
    ("made this video available in your country", FailureKind::RegionRestricted),
    ("service unavailable", FailureKind::Network),
    ("http error 5", FailureKind::Network),
    ("unavailable", FailureKind::Unavailable),
    ("not available", FailureKind::Unavailable),
    ("has been removed", FailureKind::Unavailable),
    ("does not exist", FailureKind::Unavailable),
    ("unsupported url", FailureKind::InvalidSource),
    ("is not a valid url", FailureKind::InvalidSource),
    ("timed out", FailureKind::Network),
    ("connection reset", FailureKind::Network),
    ("connection refused", FailureKind::Network),
    ("connection aborted", FailureKind::Network),
    ("network is unreachable", FailureKind::Network),
    ("temporary failure in name resolution", FailureKind::Network),
    ("name or service not known", FailureKind::Network),
    ("unable to download webpage", FailureKind::Network),
    ("remote end closed connection", FailureKind::Network),
];

pub fn classify_message(message: &str) -> FailureKind {
    let lowered = message.to_lowercase();
    CLASSIFICATION_TABLE
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, kind)| *kind)
        .unwrap_or(FailureKind::Unknown)
}

/// Classifies an extractor error. Returns `None` for [`ExtractorError::Aborted`], which is a
/// cancellation rather than a failure.
pub fn classify(error: &ExtractorError) -> Option<Failure> {
    match error {
        ExtractorError::Aborted => None,
        ExtractorError::Failed { message } => Some(Failure::new(classify_message(message), message.clone())),
        ExtractorError::Launch(_) | ExtractorError::Output(_) => {
            Some(Failure::new(FailureKind::Unknown, error.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_known_upstream_messages() {
        let cases = [
            ("ERROR: [youtube] abc: Video unavailable. This video contains content from SME, who has blocked it on copyright grounds", FailureKind::Copyright),
            ("ERROR: [youtube] abc: Private video. Sign in if you've been granted access", FailureKind::Private),
            ("ERROR: [youtube] abc: Video unavailable", FailureKind::Unavailable),
            ("ERROR: [youtube] abc: The uploader has not made this video available in your country", FailureKind::RegionRestricted),
            ("ERROR: [youtube] abc: Video unavailable. The uploader has blocked it in your country", FailureKind::RegionRestricted),
            ("ERROR: Unsupported URL: https://example.com", FailureKind::InvalidSource),
            ("ERROR: Unable to download webpage: <urlopen error [Errno -3] Temporary failure in name resolution>", FailureKind::Network),
            ("ERROR: unable to download video data: HTTP Error 503: Service Unavailable", FailureKind::Network),
            ("ERROR: The read operation timed out", FailureKind::Network),
            ("ERROR: Postprocessing: ffprobe and ffmpeg not found", FailureKind::Unknown),
        ];
        for (message, expected) in cases {
            assert_eq!(classify_message(message), expected, "{}", message);
        }
    }

    #[test]
    fn aborts_are_not_failures() {
        assert!(classify(&ExtractorError::Aborted).is_none());
    }

    #[test]
    fn unknown_failures_keep_the_original_message() {
        let failure = classify(&ExtractorError::failed("something odd happened")).unwrap();
        assert_eq!(failure.kind, FailureKind::Unknown);
        assert_eq!(failure.message, "something odd happened");
    }

    #[test]
    fn launch_errors_are_unknown() {
        let err = ExtractorError::Launch(std::io::Error::new(std::io::ErrorKind::NotFound, "yt-dlp"));
        assert_eq!(classify(&err).unwrap().kind, FailureKind::Unknown);
    }
}
