use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Reference to a document held by the object store.
///
/// The store owns the bytes; the calling application persists only `object_key`
/// alongside its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub object_key: String,
    pub owner_record_id: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// Time-limited read capability for one stored object. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub object_key: String,
    /// Signed reference usable directly by a client until `expires_at`.
    pub url: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessGrant {
    pub fn ttl(&self) -> Duration {
        self.expires_at - self.issued_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_expiry_is_issued_at_plus_ttl() {
        let issued_at = Utc::now();
        let grant = AccessGrant {
            object_key: "proj-42/plan.pdf".to_string(),
            url: "memory://documents/proj-42/plan.pdf".to_string(),
            issued_at,
            expires_at: issued_at + Duration::seconds(600),
        };
        assert_eq!(grant.ttl(), Duration::seconds(600));
        assert!(!grant.is_expired_at(issued_at + Duration::seconds(599)));
        assert!(grant.is_expired_at(issued_at + Duration::seconds(600)));
    }
}
