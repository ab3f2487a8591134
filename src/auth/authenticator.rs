use std::sync::Arc;

use axum::http::{header, HeaderMap};

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::metrics::AUTH_FAILURES;

use super::{TokenValidator, UserDirectory, UserIdentity};

/// Validates a handshake's credential and resolves it to a user identity.
///
/// Rejection happens before any registry mutation; registering the
/// connection is the transport layer's job after a successful handshake.
pub struct ConnectionAuthenticator {
    validator: TokenValidator,
    directory: Arc<dyn UserDirectory>,
    cookie_name: String,
}

impl ConnectionAuthenticator {
    pub fn new(config: &AuthConfig, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            validator: TokenValidator::new(&config.jwt),
            directory,
            cookie_name: config.cookie_name.clone(),
        }
    }

    /// Authenticate an inbound handshake from its request headers.
    #[tracing::instrument(name = "auth.handshake", skip(self, headers))]
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<UserIdentity, AppError> {
        let token = self.extract_token(headers).ok_or_else(|| {
            AUTH_FAILURES.inc();
            AppError::Auth("Missing authentication token".to_string())
        })?;

        let claims = self.validator.validate(&token).map_err(|e| {
            AUTH_FAILURES.inc();
            tracing::warn!(error = %e, "Token validation failed");
            e
        })?;

        let identity = self.directory.lookup(claims.user_id()).await.map_err(|e| {
            AUTH_FAILURES.inc();
            tracing::warn!(user_id = %claims.user_id(), error = %e, "Identity resolution failed");
            e
        })?;

        tracing::debug!(user_id = %identity.id, "Handshake authenticated");
        Ok(identity)
    }

    /// Extract the token from the credential cookie or Authorization header
    fn extract_token(&self, headers: &HeaderMap) -> Option<String> {
        // Primary carrier: the signed cookie
        if let Some(cookie_header) = headers.get(header::COOKIE) {
            if let Ok(raw) = cookie_header.to_str() {
                for parsed in cookie::Cookie::split_parse(raw).flatten() {
                    if parsed.name() == self.cookie_name {
                        return Some(parsed.value().to_string());
                    }
                }
            }
        }

        // Fallback: Bearer token for non-browser clients
        if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
            if let Ok(auth_str) = auth_header.to_str() {
                if let Some(token) = auth_str.strip_prefix("Bearer ") {
                    return Some(token.to_string());
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use axum::http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn test_authenticator() -> ConnectionAuthenticator {
        let config = AuthConfig {
            jwt: JwtConfig {
                secret: "test-secret".to_string(),
                issuer: None,
                audience: None,
            },
            cookie_name: "chattu-token".to_string(),
        };
        let directory =
            Arc::new(StaticUserDirectoryFixture::default()) as Arc<dyn UserDirectory>;
        ConnectionAuthenticator::new(&config, directory)
    }

    #[derive(Default)]
    struct StaticUserDirectoryFixture;

    #[async_trait::async_trait]
    impl UserDirectory for StaticUserDirectoryFixture {
        async fn lookup(&self, user_id: &str) -> Result<UserIdentity, AppError> {
            if user_id == "u1" {
                Ok(UserIdentity::new("u1", "Alice"))
            } else {
                Err(AppError::Auth("Unknown user".to_string()))
            }
        }
    }

    fn signed_token(sub: &str) -> String {
        let claims = crate::auth::Claims {
            sub: sub.to_string(),
            exp: chrono::Utc::now().timestamp() + 3600,
            iat: chrono::Utc::now().timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_cookie_handshake_succeeds() {
        let auth = test_authenticator();
        let mut headers = HeaderMap::new();
        let cookie = format!("other=x; chattu-token={}", signed_token("u1"));
        headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());

        let identity = auth.authenticate(&headers).await.unwrap();
        assert_eq!(identity.id, "u1");
        assert_eq!(identity.name, "Alice");
    }

    #[tokio::test]
    async fn test_bearer_fallback() {
        let auth = test_authenticator();
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", signed_token("u1"));
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&bearer).unwrap(),
        );

        assert!(auth.authenticate(&headers).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let auth = test_authenticator();
        let headers = HeaderMap::new();
        assert!(auth.authenticate(&headers).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_subject_rejected() {
        let auth = test_authenticator();
        let mut headers = HeaderMap::new();
        let cookie = format!("chattu-token={}", signed_token("u2"));
        headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());

        assert!(auth.authenticate(&headers).await.is_err());
    }
}
