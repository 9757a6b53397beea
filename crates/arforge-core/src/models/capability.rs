use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The operation a capability grant authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityOp {
    Read,
    Write,
}

/// A short-lived, scope-limited permission to perform one operation against
/// one storage key.
///
/// Grants are transient: they are derived per request from the canonical key
/// and must never be persisted as record state. A grant generated against an
/// object that does not yet exist is only meaningful for `Write`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityGrant {
    /// Canonical storage key this grant authorizes.
    pub key: String,
    pub operation: CapabilityOp,
    /// Signed URL carrying the capability.
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl CapabilityGrant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_check() {
        let now = Utc::now();
        let grant = CapabilityGrant {
            key: "alice/id/image.png".to_string(),
            operation: CapabilityOp::Write,
            url: "https://storage.example/signed".to_string(),
            expires_at: now + Duration::minutes(15),
        };
        assert!(!grant.is_expired_at(now));
        assert!(grant.is_expired_at(now + Duration::minutes(16)));
    }
}
