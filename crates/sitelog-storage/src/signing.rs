//! HMAC-signed access grants for backends without native presigning.
//!
//! A grant URL has the form
//! `memory://{bucket}/{key}?expires={unix_seconds}&signature={hex}` where the
//! signature is HMAC-SHA256 over `{key}\n{expires}`. Expiry is checked when the
//! grant is used, not when it is issued.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Why a presented grant was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrantRejection {
    #[error("grant is malformed")]
    Malformed,
    #[error("grant signature is invalid")]
    BadSignature,
    #[error("grant expired at {0}")]
    Expired(DateTime<Utc>),
}

#[derive(Clone)]
pub struct GrantSigner {
    scheme_prefix: String,
    key: Vec<u8>,
}

impl GrantSigner {
    /// `bucket` becomes the URL authority; `key` is the HMAC secret.
    pub fn new(bucket: &str, key: impl AsRef<[u8]>) -> Self {
        Self {
            scheme_prefix: format!("memory://{}/", bucket),
            key: key.as_ref().to_vec(),
        }
    }

    fn mac(&self, object_key: &str, expires: i64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
        mac.update(object_key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    /// Signed URL for `object_key` valid until `expires_at`
    pub fn sign(&self, object_key: &str, expires_at: DateTime<Utc>) -> String {
        let expires = expires_at.timestamp();
        let signature = hex::encode(self.mac(object_key, expires).finalize().into_bytes());
        format!(
            "{}{}?expires={}&signature={}",
            self.scheme_prefix, object_key, expires, signature
        )
    }

    /// Check a presented URL at time `now` and return the object key it grants.
    pub fn verify(&self, url: &str, now: DateTime<Utc>) -> Result<String, GrantRejection> {
        let rest = url
            .strip_prefix(&self.scheme_prefix)
            .ok_or(GrantRejection::Malformed)?;
        let (object_key, query) = rest.split_once('?').ok_or(GrantRejection::Malformed)?;

        let mut expires: Option<i64> = None;
        let mut signature: Option<&str> = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", value)) => expires = value.parse().ok(),
                Some(("signature", value)) => signature = Some(value),
                _ => return Err(GrantRejection::Malformed),
            }
        }
        let expires = expires.ok_or(GrantRejection::Malformed)?;
        let signature = signature
            .and_then(|s| hex::decode(s).ok())
            .ok_or(GrantRejection::Malformed)?;

        self.mac(object_key, expires)
            .verify_slice(&signature)
            .map_err(|_| GrantRejection::BadSignature)?;

        let expires_at =
            DateTime::<Utc>::from_timestamp(expires, 0).ok_or(GrantRejection::Malformed)?;
        if now >= expires_at {
            return Err(GrantRejection::Expired(expires_at));
        }
        Ok(object_key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn signer() -> GrantSigner {
        GrantSigner::new("documents", "0123456789abcdef0123456789abcdef")
    }

    #[test]
    fn valid_grant_verifies_until_expiry() {
        let now = Utc::now();
        let url = signer().sign("proj-42/plan.pdf", now + Duration::seconds(600));
        assert!(url.starts_with("memory://documents/proj-42/plan.pdf?expires="));

        assert_eq!(
            signer().verify(&url, now).unwrap(),
            "proj-42/plan.pdf".to_string()
        );
        assert!(matches!(
            signer().verify(&url, now + Duration::seconds(601)),
            Err(GrantRejection::Expired(_))
        ));
    }

    #[test]
    fn tampered_grants_are_rejected() {
        let now = Utc::now();
        let url = signer().sign("proj-42/plan.pdf", now + Duration::seconds(60));

        let other_key = url.replace("plan.pdf", "budget.xlsx");
        assert_eq!(
            signer().verify(&other_key, now),
            Err(GrantRejection::BadSignature)
        );

        let other_signer = GrantSigner::new("documents", "another-secret-another-secret-xx");
        assert_eq!(
            other_signer.verify(&url, now),
            Err(GrantRejection::BadSignature)
        );

        assert_eq!(
            signer().verify("memory://documents/proj-42/plan.pdf", now),
            Err(GrantRejection::Malformed)
        );
    }
}
