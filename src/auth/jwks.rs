//! Bearer token verification against the identity provider's key set.
//!
//! The key set is fetched over HTTP and cached for a configurable TTL. A
//! token signed with a key id missing from the cache triggers a refetch, at
//! most once per [`REFRESH_COOLDOWN`], so rotated keys are picked up without
//! letting bogus key ids hammer the provider.
//!
//! Only one fetch is in flight at a time. Requests that queue behind a failed
//! fetch fail straight away for [`FAILURE_BACKOFF`] instead of each waiting
//! out their own timeout.

use std::fmt;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

pub const REFRESH_COOLDOWN: Duration = Duration::from_secs(60);
pub const FAILURE_BACKOFF: Duration = Duration::from_secs(5);

/// Identity facts extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    /// Stable subject id issued by the provider
    pub subject: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// Informational only; account roles are never taken from it
    pub role: Option<String>,
}

/// Why a token was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    Malformed,
    Expired,
    SignatureInvalid,
    ClaimsRejected,
    UnknownKey,
    ProviderUnavailable,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            VerifyError::Malformed => "Malformed token",
            VerifyError::Expired => "Token has expired",
            VerifyError::SignatureInvalid => "Invalid token signature",
            VerifyError::ClaimsRejected => "Token claims rejected",
            VerifyError::UnknownKey => "Token signed with an unknown key",
            VerifyError::ProviderUnavailable => "Identity provider unavailable",
        };
        f.write_str(text)
    }
}

impl std::error::Error for VerifyError {}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            ErrorKind::InvalidSignature => VerifyError::SignatureInvalid,
            ErrorKind::InvalidIssuer
            | ErrorKind::ImmatureSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::MissingRequiredClaim(_) => VerifyError::ClaimsRejected,
            _ => VerifyError::Malformed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    role: Option<String>,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

enum Lookup {
    Hit(Jwk),
    /// Fresh cache without the key, refetched too recently to try again
    Miss,
    Refetch,
}

pub struct JwksVerifier {
    client: reqwest::Client,
    jwks_url: String,
    secret_key: Option<String>,
    issuer: Option<String>,
    ttl: Duration,
    cache: RwLock<Option<CachedKeys>>,
    /// Held for the duration of a fetch; remembers when the last one failed
    refresh: Mutex<Option<Instant>>,
}

impl JwksVerifier {
    pub fn new(
        jwks_url: impl Into<String>,
        secret_key: Option<String>,
        issuer: Option<String>,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            jwks_url: jwks_url.into(),
            secret_key,
            issuer,
            ttl,
            cache: RwLock::new(None),
            refresh: Mutex::new(None),
        })
    }

    /// Verify a compact RS256 token and extract its identity claims.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, VerifyError> {
        let header = decode_header(token).map_err(|_| VerifyError::Malformed)?;
        let kid = header.kid.ok_or(VerifyError::Malformed)?;

        let jwk = self.key_for(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|_| VerifyError::UnknownKey)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let claims = decode::<Claims>(token, &key, &validation)?.claims;
        if claims.sub.trim().is_empty() {
            return Err(VerifyError::Malformed);
        }
        let role = claims
            .metadata
            .and_then(|m| m.role)
            .or(claims.role);

        Ok(VerifiedToken {
            subject: claims.sub,
            email: claims.email.filter(|e| !e.trim().is_empty()),
            name: claims.name.filter(|n| !n.trim().is_empty()),
            role,
        })
    }

    fn lookup(&self, cached: &CachedKeys, kid: &str) -> Lookup {
        let age = cached.fetched_at.elapsed();
        if age >= self.ttl {
            return Lookup::Refetch;
        }
        match cached.keys.find(kid) {
            Some(jwk) => Lookup::Hit(jwk.clone()),
            None if age < REFRESH_COOLDOWN => Lookup::Miss,
            None => Lookup::Refetch,
        }
    }

    async fn cached_lookup(&self, kid: &str) -> Option<Lookup> {
        let cache = self.cache.read().await;
        cache.as_ref().map(|cached| self.lookup(cached, kid))
    }

    async fn key_for(&self, kid: &str) -> Result<Jwk, VerifyError> {
        match self.cached_lookup(kid).await {
            Some(Lookup::Hit(jwk)) => return Ok(jwk),
            Some(Lookup::Miss) => return Err(VerifyError::UnknownKey),
            Some(Lookup::Refetch) | None => {}
        }

        let mut last_failure = self.refresh.lock().await;

        // A fetch may have completed while we queued for the lock
        match self.cached_lookup(kid).await {
            Some(Lookup::Hit(jwk)) => return Ok(jwk),
            Some(Lookup::Miss) => return Err(VerifyError::UnknownKey),
            Some(Lookup::Refetch) | None => {}
        }
        if matches!(*last_failure, Some(at) if at.elapsed() < FAILURE_BACKOFF) {
            return Err(VerifyError::ProviderUnavailable);
        }

        let keys = match self.fetch().await {
            Ok(keys) => keys,
            Err(e) => {
                *last_failure = Some(Instant::now());
                return Err(e);
            }
        };
        *last_failure = None;

        let found = keys.find(kid).cloned();
        *self.cache.write().await = Some(CachedKeys {
            keys,
            fetched_at: Instant::now(),
        });

        found.ok_or(VerifyError::UnknownKey)
    }

    async fn fetch(&self) -> Result<JwkSet, VerifyError> {
        tracing::debug!(url = %self.jwks_url, "fetching identity provider key set");

        let mut request = self.client.get(&self.jwks_url);
        if let Some(secret) = &self.secret_key {
            request = request.bearer_auth(secret);
        }

        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                tracing::warn!(error = %e, "identity provider key set request failed");
                VerifyError::ProviderUnavailable
            })?;

        response.json::<JwkSet>().await.map_err(|e| {
            tracing::warn!(error = %e, "identity provider returned an unreadable key set");
            VerifyError::ProviderUnavailable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mint_token, mint_token_with, TokenOptions, JWKS_BODY};

    async fn verifier_for(server: &mockito::ServerGuard) -> JwksVerifier {
        JwksVerifier::new(
            format!("{}/v1/jwks", server.url()),
            Some("sk_test_secret".to_string()),
            None,
            Duration::from_secs(3600),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_verify_extracts_claims() {
        let mut server = mockito::Server::new_async().await;
        let _keys = server
            .mock("GET", "/v1/jwks")
            .match_header("authorization", "Bearer sk_test_secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(JWKS_BODY)
            .create_async()
            .await;

        let verifier = verifier_for(&server).await;
        let token = mint_token_with(TokenOptions {
            subject: "user_abc",
            email: Some("abc@example.com"),
            name: Some("Abby"),
            role_metadata: Some("organizer"),
            ..TokenOptions::default()
        });

        let verified = verifier.verify(&token).await.unwrap();
        assert_eq!(verified.subject, "user_abc");
        assert_eq!(verified.email.as_deref(), Some("abc@example.com"));
        assert_eq!(verified.name.as_deref(), Some("Abby"));
        assert_eq!(verified.role.as_deref(), Some("organizer"));
    }

    #[tokio::test]
    async fn test_key_set_is_cached() {
        let mut server = mockito::Server::new_async().await;
        let keys = server
            .mock("GET", "/v1/jwks")
            .with_status(200)
            .with_body(JWKS_BODY)
            .expect(1)
            .create_async()
            .await;

        let verifier = verifier_for(&server).await;
        for subject in ["user_1", "user_2", "user_3"] {
            let token = mint_token(subject, None);
            assert_eq!(verifier.verify(&token).await.unwrap().subject, subject);
        }

        keys.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_kid_is_not_refetched_within_cooldown() {
        let mut server = mockito::Server::new_async().await;
        let keys = server
            .mock("GET", "/v1/jwks")
            .with_status(200)
            .with_body(JWKS_BODY)
            .expect(1)
            .create_async()
            .await;

        let verifier = verifier_for(&server).await;
        verifier.verify(&mint_token("user_1", None)).await.unwrap();

        let rotated = mint_token_with(TokenOptions {
            kid: "rotated-key",
            ..TokenOptions::default()
        });
        assert_eq!(
            verifier.verify(&rotated).await.unwrap_err(),
            VerifyError::UnknownKey
        );

        keys.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejections() {
        let mut server = mockito::Server::new_async().await;
        let _keys = server
            .mock("GET", "/v1/jwks")
            .with_status(200)
            .with_body(JWKS_BODY)
            .create_async()
            .await;

        let verifier = verifier_for(&server).await;

        assert_eq!(
            verifier.verify("not-a-token").await.unwrap_err(),
            VerifyError::Malformed
        );

        let expired = mint_token_with(TokenOptions {
            expires_in: -3600,
            ..TokenOptions::default()
        });
        assert_eq!(
            verifier.verify(&expired).await.unwrap_err(),
            VerifyError::Expired
        );

        let forged = mint_token_with(TokenOptions {
            rogue_key: true,
            ..TokenOptions::default()
        });
        assert_eq!(
            verifier.verify(&forged).await.unwrap_err(),
            VerifyError::SignatureInvalid
        );

        for subject in ["", "   "] {
            let anonymous = mint_token_with(TokenOptions {
                subject,
                ..TokenOptions::default()
            });
            assert_eq!(
                verifier.verify(&anonymous).await.unwrap_err(),
                VerifyError::Malformed
            );
        }
    }

    #[tokio::test]
    async fn test_issuer_is_checked_when_configured() {
        let mut server = mockito::Server::new_async().await;
        let _keys = server
            .mock("GET", "/v1/jwks")
            .with_status(200)
            .with_body(JWKS_BODY)
            .create_async()
            .await;

        let verifier = JwksVerifier::new(
            format!("{}/v1/jwks", server.url()),
            None,
            Some("https://clerk.teamfinder.test".to_string()),
            Duration::from_secs(3600),
            Duration::from_secs(2),
        )
        .unwrap();

        let foreign = mint_token_with(TokenOptions {
            issuer: Some("https://elsewhere.test"),
            ..TokenOptions::default()
        });
        assert_eq!(
            verifier.verify(&foreign).await.unwrap_err(),
            VerifyError::ClaimsRejected
        );

        let ours = mint_token_with(TokenOptions {
            issuer: Some("https://clerk.teamfinder.test"),
            ..TokenOptions::default()
        });
        assert!(verifier.verify(&ours).await.is_ok());
    }

    #[tokio::test]
    async fn test_provider_failure_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _keys = server
            .mock("GET", "/v1/jwks")
            .with_status(503)
            .create_async()
            .await;

        let verifier = verifier_for(&server).await;
        assert_eq!(
            verifier.verify(&mint_token("user_1", None)).await.unwrap_err(),
            VerifyError::ProviderUnavailable
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_retried_immediately() {
        let mut server = mockito::Server::new_async().await;
        let keys = server
            .mock("GET", "/v1/jwks")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let verifier = verifier_for(&server).await;
        for subject in ["user_1", "user_2"] {
            assert_eq!(
                verifier.verify(&mint_token(subject, None)).await.unwrap_err(),
                VerifyError::ProviderUnavailable
            );
        }

        keys.assert_async().await;
    }

    #[tokio::test]
    async fn test_silent_provider_holds_callers_for_one_timeout() {
        // Accepts connections through the backlog but never answers
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let timeout = Duration::from_secs(1);
        let verifier = JwksVerifier::new(
            format!("http://{}/v1/jwks", silent.local_addr().unwrap()),
            None,
            None,
            Duration::from_secs(3600),
            timeout,
        )
        .unwrap();

        let token = mint_token("user_1", None);
        let started = Instant::now();
        let outcomes = tokio::join!(
            verifier.verify(&token),
            verifier.verify(&token),
            verifier.verify(&token),
            verifier.verify(&token),
        );
        let elapsed = started.elapsed();

        for outcome in [outcomes.0, outcomes.1, outcomes.2, outcomes.3] {
            assert_eq!(outcome.unwrap_err(), VerifyError::ProviderUnavailable);
        }
        assert!(
            elapsed < timeout * 2,
            "callers queued behind each other: {:?}",
            elapsed
        );
    }
}
