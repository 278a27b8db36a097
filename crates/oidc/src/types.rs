use {
    secrecy::SecretString,
    serde::{Deserialize, Serialize},
};

/// OpenID Connect provider configuration, loaded once at startup.
///
/// `redirect_uri` must exactly match the URI registered with the provider
/// (scheme, host, port and path) or the token exchange will be rejected.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub scope: String,
    /// Base URL the callback handler redirects browsers back to.
    pub frontend_url: String,
    /// Accept identity claims from an ID token whose signature has not been
    /// verified. Matches the historical behavior of this deployment; turn
    /// off to skip the fallback and degrade to a minimal identity instead.
    pub allow_unverified_id_token: bool,
}

/// Provider endpoints published at `/.well-known/openid-configuration`.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryMetadata {
    pub issuer: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: Option<String>,
    pub userinfo_endpoint: Option<String>,
}

/// Token endpoint response for the authorization-code grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
}

/// Normalized identity of an authenticated principal.
///
/// Always produced by the identity resolver, never constructed ad hoc.
/// `subject` is always populated; the sentinel `"unknown"` marks a degraded
/// resolution and must be treated as unauthenticated by protected routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(rename = "sub")]
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Provider-specific claims passed through opaquely.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserIdentity {
    pub const UNKNOWN_SUBJECT: &'static str = "unknown";

    pub fn unknown() -> Self {
        Self {
            subject: Self::UNKNOWN_SUBJECT.to_string(),
            email: None,
            display_name: None,
            extra: serde_json::Map::new(),
        }
    }

    /// True when resolution degraded and no id-bearing claim was found.
    pub fn is_unknown(&self) -> bool {
        self.subject == Self::UNKNOWN_SUBJECT
    }
}
