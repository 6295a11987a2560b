//! Stateless signed approval tokens.
//!
//! A token is `<payload>.<signature>` where the payload is the base64url
//! encoding of the JSON claims and the signature is an HMAC-SHA256 over the
//! encoded payload. Nothing is persisted server-side: validity is computable
//! from the token, the signing secret, and the clock. The trade-off is that a
//! leaked token cannot be revoked before its natural expiry; the only lever
//! is a shorter validity window.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

use crate::config::{ApprovalConfig, ConfigError, Environment};
use crate::domain::quote::QuoteId;

type HmacSha256 = Hmac<Sha256>;

const DEV_FALLBACK_SECRET: &[u8] = b"printshop-dev-only-signing-secret";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token could not be decoded")]
    Malformed,
    #[error("token signature does not verify")]
    InvalidSignature,
    #[error("token validity window has passed")]
    Expired,
}

/// One token authorizes either decision on one quote; the redeeming endpoint
/// picks the action. The narrow variants exist for single-action links.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenScope {
    Approve,
    Reject,
    ApproveOrReject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenAction {
    Approve,
    Reject,
    Verify,
}

impl TokenScope {
    pub fn permits(self, action: TokenAction) -> bool {
        match action {
            // Any authentic token may be used for a read-only view.
            TokenAction::Verify => true,
            TokenAction::Approve => matches!(self, Self::Approve | Self::ApproveOrReject),
            TokenAction::Reject => matches!(self, Self::Reject | Self::ApproveOrReject),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub quote_id: QuoteId,
    pub scope: TokenScope,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenClaims {
    /// A token is valid strictly before `expires_at`; at the expiry instant
    /// it is already expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    dev_fallback: bool,
}

impl TokenCodec {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self { secret: secret.as_ref().to_vec(), dev_fallback: false }
    }

    /// Production fails closed without a configured secret. Non-production
    /// falls back to a fixed development secret and warns on every mint.
    pub fn from_config(approval: &ApprovalConfig) -> Result<Self, ConfigError> {
        match &approval.signing_secret {
            Some(secret) => Ok(Self::new(secret.expose_secret().as_bytes())),
            None if approval.environment == Environment::Production => {
                Err(ConfigError::Validation(
                    "approval.signing_secret is required when approval.environment = production"
                        .to_string(),
                ))
            }
            None => Ok(Self { secret: DEV_FALLBACK_SECRET.to_vec(), dev_fallback: true }),
        }
    }

    pub fn mint(
        &self,
        quote_id: &QuoteId,
        scope: TokenScope,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> String {
        if self.dev_fallback {
            warn!(
                quote_id = %quote_id,
                "minting approval token with the development fallback secret"
            );
        }

        let claims = TokenClaims {
            quote_id: quote_id.clone(),
            scope,
            issued_at: now,
            expires_at: now + validity,
        };
        // Claims are a fixed struct; serialization cannot fail.
        let payload_json = serde_json::to_vec(&claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(payload_json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()));

        format!("{payload}.{signature}")
    }

    /// Checks structure and authenticity only; expiry is the caller's concern
    /// when it needs the claims of an expired-but-authentic token.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature_bytes =
            URL_SAFE_NO_PAD.decode(signature).map_err(|_| TokenError::Malformed)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| TokenError::InvalidSignature)?;
        mac.update(payload.as_bytes());
        // verify_slice compares in constant time.
        mac.verify_slice(&signature_bytes).map_err(|_| TokenError::InvalidSignature)?;

        let payload_json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| TokenError::Malformed)?;
        serde_json::from_slice(&payload_json).map_err(|_| TokenError::Malformed)
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let claims = self.decode(token)?;
        if claims.is_expired(now) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return Vec::new(),
        };
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").field("dev_fallback", &self.dev_fallback).finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::quote::QuoteId;

    use super::{TokenAction, TokenCodec, TokenError, TokenScope};

    fn codec() -> TokenCodec {
        TokenCodec::new("unit-test-secret")
    }

    #[test]
    fn mint_then_verify_round_trips_quote_id_and_scope() {
        let now = Utc::now();
        let quote_id = QuoteId("Q-100".to_string());
        let token = codec().mint(&quote_id, TokenScope::ApproveOrReject, Duration::days(7), now);

        let claims = codec().verify(&token, now + Duration::days(6)).expect("token verifies");
        assert_eq!(claims.quote_id, quote_id);
        assert_eq!(claims.scope, TokenScope::ApproveOrReject);
        assert_eq!(claims.expires_at, now + Duration::days(7));
    }

    #[test]
    fn verification_fails_expired_at_and_after_the_window_boundary() {
        let now = Utc::now();
        let token =
            codec().mint(&QuoteId("Q-101".to_string()), TokenScope::ApproveOrReject, Duration::days(7), now);

        // Exclusive validity: the expiry instant itself is already expired.
        assert_eq!(codec().verify(&token, now + Duration::days(7)), Err(TokenError::Expired));
        assert_eq!(
            codec().verify(&token, now + Duration::days(7) + Duration::seconds(1)),
            Err(TokenError::Expired)
        );
        assert!(codec()
            .verify(&token, now + Duration::days(7) - Duration::seconds(1))
            .is_ok());
    }

    #[test]
    fn tampered_payload_fails_with_invalid_signature() {
        let now = Utc::now();
        let token =
            codec().mint(&QuoteId("Q-102".to_string()), TokenScope::ApproveOrReject, Duration::days(7), now);

        let (payload, signature) = token.split_once('.').expect("token has two parts");
        let bytes = payload.as_bytes().to_vec();
        for index in 0..bytes.len() {
            let mut tampered_payload = bytes.clone();
            // Substitute a different character from the base64url alphabet so
            // the failure is attributable to the signature, not the encoding.
            tampered_payload[index] = if tampered_payload[index] == b'A' { b'B' } else { b'A' };
            let tampered =
                format!("{}.{}", String::from_utf8_lossy(&tampered_payload), signature);
            assert_eq!(
                codec().verify(&tampered, now),
                Err(TokenError::InvalidSignature),
                "byte {index} substitution must not verify"
            );
        }
    }

    #[test]
    fn foreign_secret_fails_with_invalid_signature() {
        let now = Utc::now();
        let token =
            codec().mint(&QuoteId("Q-103".to_string()), TokenScope::ApproveOrReject, Duration::days(7), now);

        let other = TokenCodec::new("some-other-secret");
        assert_eq!(other.verify(&token, now), Err(TokenError::InvalidSignature));
    }

    #[test]
    fn garbage_tokens_fail_as_malformed() {
        for garbage in ["", "not-a-token", "a.b", "only-one-part", "%%%.%%%"] {
            let result = codec().verify(garbage, Utc::now());
            assert!(
                matches!(result, Err(TokenError::Malformed | TokenError::InvalidSignature)),
                "`{garbage}` should not verify"
            );
        }
    }

    #[test]
    fn scope_permits_expected_actions() {
        assert!(TokenScope::ApproveOrReject.permits(TokenAction::Approve));
        assert!(TokenScope::ApproveOrReject.permits(TokenAction::Reject));
        assert!(TokenScope::ApproveOrReject.permits(TokenAction::Verify));
        assert!(!TokenScope::Approve.permits(TokenAction::Reject));
        assert!(!TokenScope::Reject.permits(TokenAction::Approve));
        assert!(TokenScope::Reject.permits(TokenAction::Verify));
    }
}
