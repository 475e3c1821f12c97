//! Webhook signature verification.
//!
//! Inbound provider callbacks carry an HMAC-SHA256 of the raw request body
//! in the `X-Webhook-Signature` header, hex-encoded. Verification uses a
//! constant-time comparison. When no shared secret is configured the
//! request is accepted with a logged warning — an explicit degraded
//! posture, not a silent bypass.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use apteka_common::error::AppError;

/// Header carrying the hex-encoded HMAC of the request body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex signature for a body. Used by tests and by outbound
/// webhook registration tooling.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a request body against the signature header.
pub fn verify(
    secret: Option<&str>,
    signature_header: Option<&str>,
    body: &[u8],
) -> Result<(), AppError> {
    let Some(secret) = secret else {
        tracing::warn!("WEBHOOK_SECRET not configured, accepting unauthenticated webhook");
        return Ok(());
    };

    let header = signature_header
        .ok_or_else(|| AppError::Auth("Missing webhook signature header".to_string()))?;

    let signature = hex::decode(header)
        .map_err(|_| AppError::Auth("Webhook signature is not valid hex".to_string()))?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| AppError::Auth("Webhook signature mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-webhook-secret";

    #[test]
    fn test_valid_signature_accepted() {
        let body = br#"{"update_id": 1}"#;
        let signature = sign(SECRET, body);
        assert!(verify(Some(SECRET), Some(&signature), body).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let signature = sign(SECRET, br#"{"update_id": 1}"#);
        let result = verify(Some(SECRET), Some(&signature), br#"{"update_id": 2}"#);
        assert!(matches!(result, Err(AppError::Auth(_))));
    }

    #[test]
    fn test_missing_header_rejected_when_secret_configured() {
        let result = verify(Some(SECRET), None, b"{}");
        assert!(matches!(result, Err(AppError::Auth(_))));
    }

    #[test]
    fn test_garbage_header_rejected() {
        let result = verify(Some(SECRET), Some("not-hex!!"), b"{}");
        assert!(matches!(result, Err(AppError::Auth(_))));
    }

    #[test]
    fn test_no_secret_accepts_with_warning() {
        assert!(verify(None, None, b"{}").is_ok());
        assert!(verify(None, Some("anything"), b"{}").is_ok());
    }
}
