use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::Error;
use crate::types::SubjectId;

/// Identity-provider endpoint configuration.
///
/// Required fields are constructor parameters, so a client cannot exist
/// with a missing endpoint. Endpoints derive from the issuer and can be
/// overridden individually when a tenant deviates from the standard
/// layout.
///
/// ```rust,ignore
/// use videre_gate::ProviderConfig;
///
/// let config = ProviderConfig::new(
///     "my-client-id",
///     "https://id.example.com".parse()?,
///     "https://gate.example.com/".parse()?,
/// );
/// let config = config.with_scopes(vec!["openid".into(), "email".into()]);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProviderConfig {
    pub(crate) client_id: String,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) userinfo_url: Url,
    pub(crate) logout_url: Url,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
}

fn derived(issuer: &Url, path: &str) -> Url {
    let base = issuer.as_str().trim_end_matches('/');
    format!("{base}/{path}")
        .parse()
        .expect("issuer URL joined with a fixed path is a valid URL")
}

impl ProviderConfig {
    /// Create a provider configuration from the tenant issuer URL.
    #[must_use]
    pub fn new(client_id: impl Into<String>, issuer: Url, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            auth_url: derived(&issuer, "authorize"),
            token_url: derived(&issuer, "oauth/token"),
            userinfo_url: derived(&issuer, "userinfo"),
            logout_url: derived(&issuer, "v2/logout"),
            redirect_uri,
            scopes: vec!["openid".into(), "profile".into(), "email".into()],
        }
    }

    /// Override the authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    /// Override the token exchange endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the userinfo endpoint.
    #[must_use]
    pub fn with_userinfo_url(mut self, url: Url) -> Self {
        self.userinfo_url = url;
        self
    }

    /// Override the logout endpoint.
    #[must_use]
    pub fn with_logout_url(mut self, url: Url) -> Self {
        self.logout_url = url;
        self
    }

    /// Override the requested scopes (default: `openid profile email`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Optional steer for the authorization redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginHint {
    /// Land the user on the provider's signup screen.
    Signup,
    /// Skip the account chooser and go straight to Google.
    Google,
}

/// Authorization URL plus the handshake material to stash until the
/// callback returns.
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: Url,
    pub state: String,
    pub code_verifier: String,
}

/// Token response from the provider token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Profile from the provider userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Profile {
    pub sub: SubjectId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
}

impl Profile {
    #[must_use]
    pub fn new(sub: SubjectId) -> Self {
        Self {
            sub,
            name: None,
            email: None,
            email_verified: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Claims lifted from an id token payload without signature
/// verification. Display material only; nothing here is trusted for
/// authorization decisions.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct IdTokenClaims {
    pub sub: SubjectId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Decode the payload segment of a JWT-shaped id token.
///
/// No signature check. Returns `None` for anything not shaped like
/// `header.payload.signature` with a JSON payload.
#[must_use]
pub fn parse_id_token_claims(id_token: &str) -> Option<IdTokenClaims> {
    let mut segments = id_token.split('.');
    let _header = segments.next()?;
    let payload = segments.next()?;
    if segments.next().is_none() || payload.is_empty() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

// ── Handshake material ─────────────────────────────────────────────

/// 64-character URL-safe PKCE code verifier (RFC 7636, 43-128 chars).
fn generate_code_verifier() -> String {
    let random_bytes: [u8; 48] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// S256 code challenge: `BASE64URL(SHA256(verifier))`.
fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// 22-character URL-safe anti-forgery state token.
fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// HTTP client for the identity provider's documented endpoints.
pub struct ProviderClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl ProviderClient {
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (connection pool reuse, test plumbing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Build the authorization redirect with PKCE and anti-forgery state.
    ///
    /// The redirect URI is always the explicitly configured one; it is
    /// never inferred from the page the user happens to be on.
    #[must_use]
    pub fn authorization_url(&self, hint: Option<LoginHint>) -> AuthorizationRequest {
        let state = generate_state();
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        let scope = self.config.scopes.join(" ");

        let mut url = self.config.auth_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", self.config.redirect_uri.as_str())
                .append_pair("state", &state)
                .append_pair("code_challenge", &code_challenge)
                .append_pair("code_challenge_method", "S256")
                .append_pair("scope", &scope);
            match hint {
                Some(LoginHint::Signup) => {
                    pairs.append_pair("screen_hint", "signup");
                }
                Some(LoginHint::Google) => {
                    pairs.append_pair("connection", "google-oauth2");
                }
                None => {}
            }
        }

        AuthorizationRequest {
            url,
            state,
            code_verifier,
        }
    }

    /// Exchange an authorization code for tokens using PKCE.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] on transport failure, [`Error::Provider`] when
    /// the token endpoint rejects the exchange.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let response = Self::ensure_success(response, "token exchange").await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    /// One refresh-token grant. Rotation policy stays with the provider.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] on transport failure, [`Error::Provider`] when
    /// the grant is refused.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, Error> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let response = Self::ensure_success(response, "token refresh").await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    /// Fetch the user's profile with an access token.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] on transport failure, [`Error::Provider`] when
    /// the userinfo endpoint rejects the token.
    pub async fn get_user_info(&self, access_token: &str) -> Result<Profile, Error> {
        let response = self
            .http
            .get(self.config.userinfo_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "userinfo request").await?;
        response.json::<Profile>().await.map_err(Into::into)
    }

    /// Provider logout URL with an explicit return address.
    #[must_use]
    pub fn logout_url(&self, return_to: &Url) -> Url {
        let mut url = self.config.logout_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("returnTo", return_to.as_str());
        url
    }

    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(Error::Provider {
            operation,
            status: Some(status),
            detail,
        })
    }
}
