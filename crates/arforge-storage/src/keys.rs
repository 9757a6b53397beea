//! Shared key generation for storage backends.
//!
//! Key format: `{owner}/{submission_id}/{asset}.{ext}`.

use arforge_core::{sanitize_filename, AssetKind};
use uuid::Uuid;

/// Generate the canonical storage key for one asset of a submission.
///
/// The owner segment is sanitized so an externally supplied principal
/// identifier cannot introduce extra path segments. All backends and the
/// pipeline must use this format for consistency.
pub fn asset_key(owner: &str, submission_id: Uuid, kind: AssetKind, extension: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        sanitize_filename(owner),
        submission_id,
        kind.as_str(),
        extension
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_key_layout() {
        let id = Uuid::new_v4();
        let key = asset_key("alice", id, AssetKind::Image, "png");
        assert_eq!(key, format!("alice/{}/image.png", id));
    }

    #[test]
    fn test_owner_segment_is_sanitized() {
        let id = Uuid::new_v4();
        let key = asset_key("../bob", id, AssetKind::Marker, "mind");
        assert!(!key.contains(".."));
        assert!(key.ends_with(&format!("/{}/marker.mind", id)));
    }
}
