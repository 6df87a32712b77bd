use sha2::{Digest, Sha256};
use super::{MediaFormat, Quality, RequestId};

/// Hex characters kept from the digest.
pub const REQUEST_ID_LEN: usize = 12;

/// Derives the request fingerprint from (url, format, quality).
pub fn identify(url: &str, format: MediaFormat, quality: Quality) -> RequestId {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update([0u8]);
    hasher.update(format.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(quality.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());
    RequestId::new(&digest[..REQUEST_ID_LEN])
}

/// Short random suffix used when an identical request is already in flight.
pub fn collision_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_requests_share_an_id() {
        let a = identify("https://youtu.be/abc12345678", MediaFormat::Audio, Quality::Best);
        let b = identify("https://youtu.be/abc12345678", MediaFormat::Audio, Quality::Best);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), REQUEST_ID_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn any_component_changes_the_id() {
        let base = identify("https://youtu.be/abc12345678", MediaFormat::Video, Quality::Best);
        assert_ne!(base, identify("https://youtu.be/abc12345679", MediaFormat::Video, Quality::Best));
        assert_ne!(base, identify("https://youtu.be/abc12345678", MediaFormat::Audio, Quality::Best));
        assert_ne!(base, identify("https://youtu.be/abc12345678", MediaFormat::Video, Quality::Height(720)));
    }

    #[test]
    fn suffix_extends_the_id() {
        let id = identify("https://youtu.be/abc12345678", MediaFormat::Audio, Quality::Best);
        let suffix = collision_suffix();
        assert_eq!(suffix.len(), 6);
        assert_eq!(id.with_suffix(&suffix).as_str(), format!("{}-{}", id, suffix));
    }
}
