//! Update validator: authenticates a webhook request, then parses its body into an
//! [`InboundUpdate`].
//!
//! Authentication always runs first, so an unauthenticated body is never parsed. Nothing here
//! touches shared state.

use std::fmt;
use std::str::FromStr;

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::core::{InboundUpdate, Result, WebhookError};

type HmacSha256 = Hmac<Sha256>;

/// Header Telegram sends with the `secret_token` given to `setWebhook`.
pub const SECRET_TOKEN_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Header carrying `sha256=<hex>` of HMAC-SHA256(secret, body).
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// How inbound requests prove they come from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// Shared secret echoed verbatim in [`SECRET_TOKEN_HEADER`].
    #[default]
    SecretToken,
    /// HMAC-SHA256 body signature in [`SIGNATURE_HEADER`].
    HmacSha256,
}

impl FromStr for AuthScheme {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secret_token" | "secret-token" => Ok(Self::SecretToken),
            "hmac_sha256" | "hmac-sha256" | "hmac" => Ok(Self::HmacSha256),
            other => Err(WebhookError::StartupConfig(format!(
                "WEBHOOK_AUTH must be secret_token or hmac_sha256, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SecretToken => f.write_str("secret_token"),
            Self::HmacSha256 => f.write_str("hmac_sha256"),
        }
    }
}

/// Authenticates and parses webhook requests.
#[derive(Clone)]
pub struct UpdateValidator {
    secret: String,
    scheme: AuthScheme,
}

impl fmt::Debug for UpdateValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateValidator")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl UpdateValidator {
    pub fn new(secret: impl Into<String>, scheme: AuthScheme) -> Self {
        Self {
            secret: secret.into(),
            scheme,
        }
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    /// Authenticates the request, then parses the body.
    ///
    /// Fails with [`WebhookError::Authentication`] on a missing or mismatched credential and with
    /// [`WebhookError::MalformedPayload`] when the body is not a valid update.
    pub fn validate(&self, headers: &HeaderMap, body: &[u8]) -> Result<InboundUpdate> {
        self.authenticate(headers, body)?;
        parse_update(body)
    }

    /// Checks the request credential only.
    pub fn authenticate(&self, headers: &HeaderMap, body: &[u8]) -> Result<()> {
        match self.scheme {
            AuthScheme::SecretToken => {
                let token = header_str(headers, SECRET_TOKEN_HEADER)?;
                if constant_time_eq(token.as_bytes(), self.secret.as_bytes()) {
                    Ok(())
                } else {
                    Err(WebhookError::Authentication(
                        "secret token mismatch".to_string(),
                    ))
                }
            }
            AuthScheme::HmacSha256 => {
                let header = header_str(headers, SIGNATURE_HEADER)?;
                let hex_sig = header.strip_prefix("sha256=").unwrap_or(header);
                let signature = hex::decode(hex_sig.trim()).map_err(|_| {
                    WebhookError::Authentication("signature is not valid hex".to_string())
                })?;
                let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
                    .map_err(|e| WebhookError::Authentication(e.to_string()))?;
                mac.update(body);
                mac.verify_slice(&signature)
                    .map_err(|_| WebhookError::Authentication("signature mismatch".to_string()))
            }
        }
    }
}

/// Signs a payload with HMAC-SHA256 and returns the header value (`sha256=<hex>`).
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Parses a body into an [`InboundUpdate`].
///
/// The body must be a JSON object whose `update_id` is a non-negative integer or a non-empty
/// string; the identifier is its string form.
pub fn parse_update(body: &[u8]) -> Result<InboundUpdate> {
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| WebhookError::MalformedPayload(format!("invalid JSON: {e}")))?;

    let object = payload.as_object().ok_or_else(|| {
        WebhookError::MalformedPayload("payload must be a JSON object".to_string())
    })?;

    let id = match object.get("update_id") {
        Some(Value::Number(n)) => n.as_u64().map(|n| n.to_string()),
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
    .ok_or_else(|| {
        WebhookError::MalformedPayload(
            "update_id must be a non-negative integer or a non-empty string".to_string(),
        )
    })?;

    Ok(InboundUpdate::new(id, payload))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .ok_or_else(|| WebhookError::Authentication(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| WebhookError::Authentication(format!("{name} header is not valid ASCII")))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "s3cr3t";
    const BODY: &[u8] = br#"{"update_id": 1001, "message": {"chat": {"id": 5}, "text": "hi"}}"#;

    fn headers_with(name: &'static str, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_secret_token_accepted() {
        let validator = UpdateValidator::new(SECRET, AuthScheme::SecretToken);
        let update = validator
            .validate(&headers_with(SECRET_TOKEN_HEADER, SECRET), BODY)
            .unwrap();
        assert_eq!(update.id(), "1001");
        assert_eq!(update.chat_id(), Some(5));
    }

    #[test]
    fn test_secret_token_missing_or_wrong() {
        let validator = UpdateValidator::new(SECRET, AuthScheme::SecretToken);
        assert!(matches!(
            validator.validate(&HeaderMap::new(), BODY),
            Err(WebhookError::Authentication(_))
        ));
        assert!(matches!(
            validator.validate(&headers_with(SECRET_TOKEN_HEADER, "s3cr3"), BODY),
            Err(WebhookError::Authentication(_))
        ));
    }

    #[test]
    fn test_auth_checked_before_parse() {
        let validator = UpdateValidator::new(SECRET, AuthScheme::SecretToken);
        let result = validator.validate(&headers_with(SECRET_TOKEN_HEADER, "nope"), b"not json");
        assert!(matches!(result, Err(WebhookError::Authentication(_))));
    }

    #[test]
    fn test_hmac_signature_accepted_with_and_without_prefix() {
        let validator = UpdateValidator::new(SECRET, AuthScheme::HmacSha256);
        let signed = sign_payload(SECRET, BODY);
        assert!(validator
            .validate(&headers_with(SIGNATURE_HEADER, &signed), BODY)
            .is_ok());

        let bare = signed.trim_start_matches("sha256=").to_string();
        assert!(validator
            .validate(&headers_with(SIGNATURE_HEADER, &bare), BODY)
            .is_ok());
    }

    #[test]
    fn test_hmac_signature_rejected() {
        let validator = UpdateValidator::new(SECRET, AuthScheme::HmacSha256);
        let wrong_key = sign_payload("other", BODY);
        assert!(matches!(
            validator.validate(&headers_with(SIGNATURE_HEADER, &wrong_key), BODY),
            Err(WebhookError::Authentication(_))
        ));

        let signed = sign_payload(SECRET, BODY);
        assert!(matches!(
            validator.validate(&headers_with(SIGNATURE_HEADER, &signed), br#"{"update_id": 2}"#),
            Err(WebhookError::Authentication(_))
        ));

        assert!(matches!(
            validator.validate(&headers_with(SIGNATURE_HEADER, "sha256=zz"), BODY),
            Err(WebhookError::Authentication(_))
        ));
    }

    #[test]
    fn test_parse_update_string_id_kept_verbatim() {
        let plain = parse_update(br#"{"update_id": "upd-1"}"#).unwrap();
        let padded = parse_update(br#"{"update_id": "upd-1 "}"#).unwrap();
        assert_eq!(plain.id(), "upd-1");
        assert_eq!(padded.id(), "upd-1 ");
        assert_ne!(plain.id(), padded.id());
    }

    #[test]
    fn test_parse_update_rejects_bad_payloads() {
        let bodies: [&[u8]; 7] = [
            b"not json",
            br#"[1, 2, 3]"#,
            br#"{"message": {}}"#,
            br#"{"update_id": -1}"#,
            br#"{"update_id": 1.5}"#,
            br#"{"update_id": ""}"#,
            br#"{"update_id": null}"#,
        ];
        for body in bodies {
            assert!(
                matches!(parse_update(body), Err(WebhookError::MalformedPayload(_))),
                "expected malformed for {}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn test_auth_scheme_from_str() {
        assert_eq!("secret_token".parse::<AuthScheme>().unwrap(), AuthScheme::SecretToken);
        assert_eq!("HMAC-SHA256".parse::<AuthScheme>().unwrap(), AuthScheme::HmacSha256);
        assert!("basic".parse::<AuthScheme>().is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let validator = UpdateValidator::new(SECRET, AuthScheme::SecretToken);
        assert!(!format!("{validator:?}").contains(SECRET));
    }
}
