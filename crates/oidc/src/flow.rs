//! The authorization-code-with-PKCE flow: login initiation, callback
//! completion (code-for-token exchange) and request-time authentication.

use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    serde::Deserialize,
    tracing::{debug, info, warn},
    url::Url,
};

use crate::{
    discovery::DiscoveryCache,
    error::AuthError,
    identity,
    pkce::{self, PkceChallenge},
    store::{self, PendingLoginStore, TakeError},
    types::{ProviderConfig, TokenSet, UserIdentity},
};

/// Timeout applied to every outbound provider call.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// A started login: the URL the browser must navigate to, plus the state
/// token now keyed in the pending-login store.
#[derive(Debug, Clone)]
pub struct LoginStart {
    pub auth_url: Url,
    pub state: String,
}

/// A completed login: tokens from the provider and the resolved identity.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub tokens: TokenSet,
    pub identity: UserIdentity,
}

/// Coordinates the OIDC flow for a single provider configuration.
///
/// Shared across request tasks; discovery metadata is populated lazily at
/// most once and the pending-login store is internally synchronized.
pub struct AuthFlow {
    config: ProviderConfig,
    http: reqwest::Client,
    discovery: DiscoveryCache,
    pending: Arc<PendingLoginStore>,
}

impl AuthFlow {
    pub fn new(config: ProviderConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let discovery = DiscoveryCache::new(config.issuer.clone(), http.clone());
        Self {
            config,
            http,
            discovery,
            pending: Arc::new(PendingLoginStore::new()),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn pending(&self) -> &PendingLoginStore {
        &self.pending
    }

    /// Shared handle to the pending-login store, for the sweeper task.
    pub fn pending_store(&self) -> Arc<PendingLoginStore> {
        Arc::clone(&self.pending)
    }

    /// Start a login: generate the PKCE pair and state, record the pending
    /// attempt, and build the provider authorization URL. The caller hands
    /// the URL back to the client; no redirect happens here.
    pub async fn begin_login(&self) -> Result<LoginStart, AuthError> {
        let meta = self.discovery.get().await?;
        let endpoint = meta
            .authorization_endpoint
            .as_deref()
            .ok_or_else(|| {
                AuthError::DiscoveryFailed("no authorization_endpoint in discovery".into())
            })?;

        let challenge = PkceChallenge::generate();
        let state = pkce::generate_state();
        let auth_url = authorize_url(endpoint, &self.config, &challenge.challenge, &state)?;

        self.pending
            .put(&state, &challenge.verifier, store::DEFAULT_TTL);
        info!(pending = self.pending.len(), "login initiated");

        Ok(LoginStart { auth_url, state })
    }

    /// Drive the callback state machine: consume the pending login for
    /// `state`, exchange the code, and resolve the caller's identity.
    pub async fn complete_login(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> Result<LoginSession, AuthError> {
        let state = state.ok_or(AuthError::StateMissing)?;

        let verifier = self.pending.take_if_valid(state).map_err(|e| match e {
            TakeError::NotFound => AuthError::CodeVerifierMissing,
            TakeError::Expired => AuthError::CodeVerifierExpired,
        })?;
        debug!("pending login consumed");

        let tokens = self.exchange_code(code, &verifier).await?;
        info!(
            has_id_token = tokens.id_token.is_some(),
            token_type = tokens.token_type.as_deref().unwrap_or("-"),
            "token exchange succeeded"
        );

        let identity = self.resolve_identity(&tokens).await;
        info!(subject = %identity.subject, "identity resolved");

        Ok(LoginSession { tokens, identity })
    }

    /// Exchange an authorization code for tokens, bound to the PKCE
    /// verifier and the exact redirect URI registered with the provider.
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenSet, AuthError> {
        let meta = self
            .discovery
            .get()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;
        let endpoint = meta
            .token_endpoint
            .as_deref()
            .ok_or_else(|| AuthError::TokenExchangeFailed("no token_endpoint in discovery".into()))?;

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("code_verifier", verifier),
        ];

        let resp = self
            .http
            .post(endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp
                .json::<ProviderErrorBody>()
                .await
                .map(|body| body.detail())
                .unwrap_or_else(|_| format!("token endpoint returned {status}"));
            warn!(%status, detail, "token exchange rejected by provider");
            return Err(AuthError::TokenExchangeFailed(detail));
        }

        resp.json::<TokenSet>()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))
    }

    /// Resolve an identity from a token set. Degrades, never fails.
    pub async fn resolve_identity(&self, tokens: &TokenSet) -> UserIdentity {
        identity::resolve(
            &self.discovery,
            &self.http,
            &tokens.access_token,
            tokens.id_token.as_deref(),
            self.config.allow_unverified_id_token,
        )
        .await
    }

    /// Authenticate an inbound bearer credential.
    ///
    /// A structurally valid JWT carrying a `sub` claim is used directly
    /// (no network call); anything else is validated against the userinfo
    /// endpoint. A degraded (`"unknown"`) identity is a failure here: this
    /// path guards protected resources.
    pub async fn authenticate_bearer(&self, token: &str) -> Result<UserIdentity, AuthError> {
        if let Some(claims) = identity::decode_jwt_claims(token)
            && claims.get("sub").is_some()
        {
            let identity = identity::from_claims(&claims);
            if !identity.is_unknown() {
                debug!(subject = %identity.subject, "bearer authenticated from JWT claims");
                return Ok(identity);
            }
        }

        match identity::from_userinfo(&self.discovery, &self.http, token).await {
            Some(identity) if !identity.is_unknown() => {
                debug!(subject = %identity.subject, "bearer authenticated via userinfo");
                Ok(identity)
            },
            _ => Err(AuthError::Unauthenticated),
        }
    }
}

/// Compose the provider authorization URL. Pure function of its inputs.
pub fn authorize_url(
    endpoint: &str,
    config: &ProviderConfig,
    challenge: &str,
    state: &str,
) -> Result<Url, AuthError> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| AuthError::DiscoveryFailed(format!("bad authorization endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("scope", &config.scope)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("state", state);
    Ok(url)
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

impl ProviderErrorBody {
    fn detail(&self) -> String {
        match (&self.error, &self.error_description) {
            (Some(e), Some(d)) => format!("{e}: {d}"),
            (Some(e), None) => e.clone(),
            (None, Some(d)) => d.clone(),
            (None, None) => "unspecified provider error".to_string(),
        }
    }
}
