//! OAuth 2.0 authorization-code providers and the registry the routes resolve them from.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use storefront_core::config::{AuthConfig, ProviderCredentials};
use storefront_core::domain::account::ExternalIdentity;
use storefront_core::identity::{AuthError, IdentityProvider};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Google,
    Facebook,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::Facebook => "Facebook",
        }
    }
}

#[derive(Clone, Debug)]
struct ProviderEndpoints {
    authorize_url: &'static str,
    token_url: &'static str,
    userinfo_url: &'static str,
    scope: &'static str,
    fields: Option<&'static str>,
}

impl ProviderEndpoints {
    fn for_kind(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Google => Self {
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth",
                token_url: "https://oauth2.googleapis.com/token",
                userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo",
                scope: "openid email profile",
                fields: None,
            },
            ProviderKind::Facebook => Self {
                authorize_url: "https://www.facebook.com/v19.0/dialog/oauth",
                token_url: "https://graph.facebook.com/v19.0/oauth/access_token",
                userinfo_url: "https://graph.facebook.com/v19.0/me",
                scope: "email public_profile",
                fields: Some("name,email,picture"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// Google answers with `sub`, the Graph API with `id`.
#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(alias = "id")]
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

pub struct OAuthProvider {
    kind: ProviderKind,
    client_id: String,
    client_secret: SecretString,
    endpoints: ProviderEndpoints,
    client: Client,
}

impl std::fmt::Debug for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProvider")
            .field("kind", &self.kind)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .finish()
    }
}

impl OAuthProvider {
    pub fn new(
        kind: ProviderKind,
        client_id: impl Into<String>,
        client_secret: SecretString,
        client: Client,
    ) -> Self {
        Self {
            kind,
            client_id: client_id.into(),
            client_secret,
            endpoints: ProviderEndpoints::for_kind(kind),
            client,
        }
    }

    fn from_credentials(
        kind: ProviderKind,
        credentials: &ProviderCredentials,
        client: &Client,
    ) -> Option<Self> {
        if !credentials.is_enabled() {
            return None;
        }
        let client_id = credentials.client_id.clone()?;
        let client_secret = credentials.client_secret.clone()?;
        Some(Self::new(kind, client_id, client_secret, client.clone()))
    }

    async fn fetch_user_info(
        &self,
        token: &TokenResponse,
    ) -> Result<UserInfo, AuthError> {
        let mut request = self.client.get(self.endpoints.userinfo_url);
        if let Some(fields) = self.endpoints.fields {
            request = request.query(&[("fields", fields)]);
        }
        let scheme = token.token_type.as_deref().unwrap_or("Bearer");
        let response = request
            .header("Authorization", format!("{scheme} {}", token.access_token))
            .send()
            .await
            .map_err(|error| AuthError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "user info endpoint returned {}",
                response.status()
            )));
        }
        response.json().await.map_err(|error| AuthError::InvalidResponse(error.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for OAuthProvider {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, AuthError> {
        let url = Url::parse_with_params(
            self.endpoints.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", self.endpoints.scope),
                ("state", state),
            ],
        )
        .map_err(|error| AuthError::Configuration(error.to_string()))?;
        Ok(url.into())
    }

    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<ExternalIdentity, AuthError> {
        let response = self
            .client
            .post(self.endpoints.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|error| {
                error!(
                    event_name = "login.provider.token_exchange_failed",
                    provider = self.name(),
                    error = %error,
                    "token exchange request failed"
                );
                AuthError::Transport(error.to_string())
            })?;

        if !response.status().is_success() {
            return Err(AuthError::CodeRejected(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse =
            response.json().await.map_err(|error| AuthError::InvalidResponse(error.to_string()))?;
        if token.access_token.is_empty() {
            return Err(AuthError::InvalidResponse(
                "token endpoint returned empty access token".to_string(),
            ));
        }

        let user = self.fetch_user_info(&token).await?;
        if user.sub.trim().is_empty() {
            return Err(AuthError::InvalidResponse("user info has no subject".to_string()));
        }

        Ok(ExternalIdentity {
            provider: self.name().to_string(),
            provider_key: user.sub,
            email: user.email.filter(|email| !email.trim().is_empty()),
            display_name: user.name,
        })
    }
}

/// Enabled identity providers, looked up case-insensitively by scheme name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn from_config(auth: &AuthConfig, client: Client) -> Self {
        let mut registry = Self::default();
        for (kind, credentials) in
            [(ProviderKind::Google, &auth.google), (ProviderKind::Facebook, &auth.facebook)]
        {
            if let Some(provider) = OAuthProvider::from_credentials(kind, credentials, &client) {
                registry = registry.with_provider(Arc::new(provider));
            }
        }
        info!(
            event_name = "system.bootstrap.providers_registered",
            correlation_id = "bootstrap",
            providers = %registry.names().join(","),
            "external login providers registered"
        );
        registry
    }

    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.retain(|existing| !existing.name().eq_ignore_ascii_case(provider.name()));
        self.providers.push(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn IdentityProvider>> {
        let name = name.trim();
        self.providers.iter().find(|provider| provider.name().eq_ignore_ascii_case(name)).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|provider| provider.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn IdentityProvider>> {
        self.providers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Absolute URL the provider redirects back to, e.g. `{base}/signin-google`.
pub fn callback_uri(base_url: &str, provider: &str) -> String {
    format!("{}/signin-{}", base_url.trim_end_matches('/'), provider.to_ascii_lowercase())
}
