use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::claims::{Claims, TokenKind};
use crate::{config::JwtConfig, error::ApiError, state::AppState};

/// Holds JWT signing and verification keys with config data. Stateless:
/// any instance built from the same secret validates any token it signed.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            refresh_ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_minutes as u64) * 60),
        }
    }
}

impl JwtKeys {
    fn sign_with_kind(&self, user_id: i64, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: i64) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: i64) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    /// Sign the access + refresh pair returned by register and login.
    pub fn issue_pair(&self, user_id: i64) -> anyhow::Result<(String, String)> {
        Ok((self.sign_access(user_id)?, self.sign_refresh(user_id)?))
    }

    /// Check signature, expiry, issuer and audience. Expiry is exclusive:
    /// a token is dead the second its `exp` passes, no leeway.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|_| ApiError::token("Invalid or expired token"))?;
        debug!(user_id = data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    /// Verify and additionally require the claim's kind, so a refresh token
    /// cannot be presented where an access token is expected or vice versa.
    pub fn verify_kind(&self, token: &str, expected: TokenKind) -> Result<Claims, ApiError> {
        let claims = self.verify(token)?;
        if claims.kind != expected {
            return Err(match expected {
                TokenKind::Access => ApiError::token("Access token required"),
                TokenKind::Refresh => ApiError::token("Refresh token required"),
            });
        }
        Ok(claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, ApiError> {
        self.verify_kind(token, TokenKind::Refresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn make_keys() -> JwtKeys {
        JwtKeys::from_ref(&AppState::fake())
    }

    #[tokio::test]
    async fn sign_and_verify_access_token() {
        let keys = make_keys();
        let token = keys.sign_access(42).expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[tokio::test]
    async fn issue_pair_kinds_differ() {
        let keys = make_keys();
        let (access, refresh) = keys.issue_pair(7).expect("pair");
        assert_eq!(keys.verify(&access).unwrap().kind, TokenKind::Access);
        assert_eq!(keys.verify(&refresh).unwrap().kind, TokenKind::Refresh);
    }

    #[tokio::test]
    async fn verify_refresh_rejects_access_token() {
        let keys = make_keys();
        let token = keys.sign_access(1).expect("sign access");
        let err = keys.verify_refresh(&token).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn verify_access_kind_rejects_refresh_token() {
        let keys = make_keys();
        let token = keys.sign_refresh(1).expect("sign refresh");
        let err = keys.verify_kind(&token, TokenKind::Access).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tampered_token_fails() {
        let keys = make_keys();
        let mut token = keys.sign_access(1).expect("sign access");
        // Flip a character in the payload segment.
        let dot = token.find('.').unwrap() + 1;
        let payload_char = token[dot..dot + 1].to_string();
        let replacement = if payload_char == "A" { "B" } else { "A" };
        token.replace_range(dot..dot + 1, replacement);
        assert!(keys.verify(&token).is_err());
    }

    #[tokio::test]
    async fn garbage_token_fails() {
        let keys = make_keys();
        assert!(keys.verify("definitely.not.a-jwt").is_err());
    }

    fn sign_with_exp(keys: &JwtKeys, exp: OffsetDateTime) -> String {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: 1,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
            kind: TokenKind::Access,
        };
        encode(&Header::default(), &claims, &keys.encoding).expect("encode")
    }

    #[tokio::test]
    async fn expiry_boundary_is_exclusive() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();

        let alive = sign_with_exp(&keys, now + TimeDuration::seconds(5));
        assert!(keys.verify(&alive).is_ok());

        let dead = sign_with_exp(&keys, now - TimeDuration::seconds(1));
        assert!(keys.verify(&dead).is_err());
    }

    #[tokio::test]
    async fn other_secret_rejects_token() {
        let keys = make_keys();
        let other = JwtKeys {
            encoding: EncodingKey::from_secret(b"different-secret"),
            decoding: DecodingKey::from_secret(b"different-secret"),
            ..keys.clone()
        };
        let token = keys.sign_access(1).expect("sign access");
        assert!(other.verify(&token).is_err());
    }
}
