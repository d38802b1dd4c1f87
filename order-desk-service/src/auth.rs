//! Admin panel authentication: a shared password exchanged for an HS256 bearer token.

use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

pub const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

pub struct AuthConfig {
    password: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthConfig {
    pub fn new(password: &str, secret: &str) -> Self {
        Self {
            password: password.to_string(),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn check_password(&self, password: &str) -> bool {
        !self.password.is_empty() && password == self.password
    }

    pub fn issue(&self, subject: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: subject.to_string(),
            exp: (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation).map(|data| data.claims)
    }
}

fn unauthorized(detail: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": detail }))).into_response()
}

/// Rejects requests without a valid bearer token and exposes the claims to handlers.
pub async fn require_admin(
    State(auth): State<Arc<AuthConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let Some(token) = token else {
        debug!("request without bearer token");
        return unauthorized("Not authenticated");
    };

    match auth.verify(token.trim()) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            warn!(error = %e, "rejected bearer token");
            unauthorized("Недействительный токен")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify() {
        let auth = AuthConfig::new("secret-pass", "signing-key");
        let token = auth.issue("admin").unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert!(claims.exp > Utc::now().timestamp() + 23 * 3600);
    }

    #[test]
    fn foreign_and_expired_tokens_fail() {
        let auth = AuthConfig::new("p", "signing-key");
        let other = AuthConfig::new("p", "different-key");
        assert!(auth.verify(&other.issue("admin").unwrap()).is_err());

        let expired = encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                sub: "admin".to_string(),
                exp: Utc::now().timestamp() - 3600,
            },
            &EncodingKey::from_secret(b"signing-key"),
        )
        .unwrap();
        assert!(auth.verify(&expired).is_err());
    }

    #[test]
    fn password_check() {
        let auth = AuthConfig::new("admin123", "k");
        assert!(auth.check_password("admin123"));
        assert!(!auth.check_password("admin"));
        assert!(!AuthConfig::new("", "k").check_password(""));
    }
}
