//! Environment-derived configuration for the gateway process.

use {anyhow::Context, secrecy::SecretString, ticklist_oidc::ProviderConfig};

/// HTTP-surface configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: String,
    pub port: u16,
    /// Origin the browser-facing frontend is served from; used for CORS and
    /// post-login redirects.
    pub frontend_url: String,
    pub database_url: String,
    /// Mark the session cookie `Secure` (HTTPS-only deployments).
    pub cookie_secure: bool,
    /// Explicit cookie domain; host-only when unset.
    pub cookie_domain: Option<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let port = env_var("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);
        Self {
            bind: env_var("BIND").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            frontend_url: env_var("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:ticklist.db".to_string()),
            cookie_secure: env_flag("COOKIE_SECURE", false),
            cookie_domain: env_var("COOKIE_DOMAIN"),
        }
    }
}

/// Build the OIDC provider configuration from `OIDC_*` variables.
///
/// The redirect URI defaults to this server's callback route and must match
/// the value registered with the provider exactly.
pub fn provider_from_env(gateway: &GatewayConfig) -> anyhow::Result<ProviderConfig> {
    let issuer = env_var("OIDC_ISSUER").context("OIDC_ISSUER is required")?;
    let client_id = env_var("OIDC_CLIENT_ID").context("OIDC_CLIENT_ID is required")?;
    let client_secret = env_var("OIDC_CLIENT_SECRET").unwrap_or_default();

    let redirect_uri = env_var("OIDC_REDIRECT_URI")
        .unwrap_or_else(|| format!("http://localhost:{}/auth/callback", gateway.port));

    Ok(ProviderConfig {
        issuer,
        client_id,
        client_secret: SecretString::from(client_secret),
        redirect_uri,
        scope: env_var("OIDC_SCOPE").unwrap_or_else(|| "openid profile email".to_string()),
        frontend_url: gateway.frontend_url.clone(),
        allow_unverified_id_token: env_flag("OIDC_ALLOW_UNVERIFIED_ID_TOKEN", true),
    })
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_flag(key: &str, default: bool) -> bool {
    env_var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}
