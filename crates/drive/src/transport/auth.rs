//! OAuth access tokens for the HTTP transport.

use crate::credentials::{Credentials, DRIVE_SCOPE, ServiceAccountKey, StoredToken};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Lifetime requested for service account assertions; the maximum allowed.
const ASSERTION_LIFETIME: Duration = Duration::hours(1);
/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::seconds(60);

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    /// `None` when the issuer didn't say; such a token is used until rejected.
    expires_at: Option<OffsetDateTime>,
}
impl AccessToken {
    fn is_fresh(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_none_or(|expires_at| now + EXPIRY_MARGIN < expires_at)
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Hands out bearer tokens, fetching a new one when the cached token is
/// about to expire. Concurrent callers wait for a single refresh.
pub(super) struct Authenticator {
    client: reqwest::Client,
    credentials: Credentials,
    token: Mutex<Option<AccessToken>>,
}

impl Authenticator {
    pub(super) fn new(client: reqwest::Client, credentials: Credentials) -> Self {
        let token = match &credentials {
            Credentials::Stored(stored) => stored.access_token.clone().map(|value| AccessToken {
                value,
                expires_at: stored.expires_at(),
            }),
            Credentials::ServiceAccount(_) => None,
        };
        Self {
            client,
            credentials,
            token: Mutex::new(token),
        }
    }

    /// A bearer token valid for at least [`EXPIRY_MARGIN`].
    pub(super) async fn token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        let now = OffsetDateTime::now_utc();
        if let Some(token) = guard.as_ref().filter(|token| token.is_fresh(now)) {
            return Ok(token.value.clone());
        }
        let token = match &self.credentials {
            Credentials::ServiceAccount(key) => self.exchange_assertion(key, now).await?,
            Credentials::Stored(stored) => self.refresh(stored, now).await?,
        };
        tracing::debug!(expires_at = ?token.expires_at, "Obtained access token");
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    /// Forget the cached token, e.g. after the server rejected it.
    pub(super) async fn invalidate(&self) {
        self.token.lock().await.take();
    }

    async fn exchange_assertion(&self, key: &ServiceAccountKey, now: OffsetDateTime) -> Result<AccessToken> {
        let assertion = sign_assertion(key, now)?;
        let form = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
        self.request_token(&key.token_uri, &form, now).await
    }

    async fn refresh(&self, stored: &StoredToken, now: OffsetDateTime) -> Result<AccessToken> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) =
            (&stored.refresh_token, &stored.client_id, &stored.client_secret)
        else {
            exn::bail!(ErrorKind::Credentials(
                "stored access token expired and cannot be refreshed".to_string()
            ));
        };
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];
        self.request_token(&stored.token_uri, &form, now).await
    }

    async fn request_token(&self, token_uri: &str, form: &[(&str, &str)], now: OffsetDateTime) -> Result<AccessToken> {
        let failed = || ErrorKind::Credentials(format!("token request to {token_uri} failed"));
        let response = self
            .client
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(super::http::request_error)
            .or_raise(failed)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            exn::bail!(ErrorKind::Credentials(format!("token endpoint returned {status}: {body}")));
        }
        let token: TokenResponse = response.json().await.or_raise(failed)?;
        Ok(AccessToken {
            value: token.access_token,
            expires_at: token.expires_in.map(|secs| now + Duration::seconds(secs)),
        })
    }
}

/// Self-signed RS256 assertion for the service account flow.
fn sign_assertion(key: &ServiceAccountKey, now: OffsetDateTime) -> Result<String> {
    let invalid_key = || ErrorKind::Credentials(format!("invalid private key for {}", key.client_email));
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    let claims = Claims {
        iss: &key.client_email,
        scope: DRIVE_SCOPE,
        aud: &key.token_uri,
        iat: now.unix_timestamp(),
        exp: (now + ASSERTION_LIFETIME).unix_timestamp(),
    };
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).or_raise(invalid_key)?;
    jsonwebtoken::encode(&header, &claims, &encoding_key).or_raise(invalid_key)
}
