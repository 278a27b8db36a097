//! Provider metadata discovery with lazy once-per-process caching, plus
//! best-effort resolution of the userinfo endpoint when discovery omits it.

use {
    tokio::sync::OnceCell,
    tracing::{debug, warn},
    url::Url,
};

use crate::{error::AuthError, types::DiscoveryMetadata};

/// Conventional userinfo paths probed, in order, when the discovery document
/// does not advertise one. Bounded and fixed so tests stay deterministic.
const USERINFO_PROBE_PATHS: &[&str] = &[
    "/userinfo",
    "/api/userinfo",
    "/oauth/userinfo",
    "/api/v1/userinfo",
    "/connect/userinfo",
];

/// Cached OIDC discovery metadata for a single issuer.
///
/// The document is fetched at most once per process; a failed fetch leaves
/// the cache unset so the next caller retries. Concurrent first accesses are
/// serialized by the cell, so duplicate fetches cannot race.
pub struct DiscoveryCache {
    issuer: String,
    http: reqwest::Client,
    metadata: OnceCell<DiscoveryMetadata>,
}

impl DiscoveryCache {
    pub fn new(issuer: String, http: reqwest::Client) -> Self {
        Self {
            issuer,
            http,
            metadata: OnceCell::new(),
        }
    }

    /// Fetch (or return the cached) discovery document.
    pub async fn get(&self) -> Result<&DiscoveryMetadata, AuthError> {
        self.metadata
            .get_or_try_init(|| async {
                let url = discovery_url(&self.issuer)?;
                debug!(%url, "fetching provider discovery document");
                let resp = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| AuthError::DiscoveryFailed(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(AuthError::DiscoveryFailed(format!(
                        "discovery endpoint returned {}",
                        resp.status()
                    )));
                }
                let meta: DiscoveryMetadata = resp
                    .json()
                    .await
                    .map_err(|e| AuthError::DiscoveryFailed(e.to_string()))?;
                debug!(
                    userinfo = meta.userinfo_endpoint.as_deref().unwrap_or("-"),
                    "discovery completed"
                );
                Ok(meta)
            })
            .await
    }

    /// Discovery document if one has been (or can now be) fetched; discovery
    /// failure on this path degrades to `None` rather than erroring.
    pub async fn try_get(&self) -> Option<&DiscoveryMetadata> {
        self.get().await.ok()
    }

    /// Resolve the userinfo endpoint for a caller holding `bearer`.
    ///
    /// Prefers the discovered `userinfo_endpoint`; otherwise probes the
    /// conventional paths with an authenticated GET and accepts the first
    /// success. `None` means every candidate failed and the caller must
    /// handle degraded identity resolution.
    pub async fn userinfo_endpoint(&self, bearer: &str) -> Option<Url> {
        if let Some(meta) = self.try_get().await
            && let Some(endpoint) = meta.userinfo_endpoint.as_deref()
            && let Ok(url) = Url::parse(endpoint)
        {
            return Some(url);
        }

        let origin = issuer_origin(&self.issuer)?;
        for path in USERINFO_PROBE_PATHS {
            let candidate = format!("{origin}{path}");
            match self
                .http
                .get(&candidate)
                .bearer_auth(bearer)
                .header("accept", "application/json")
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    debug!(endpoint = %candidate, "userinfo endpoint found by probe");
                    return Url::parse(&candidate).ok();
                },
                Ok(resp) => {
                    debug!(endpoint = %candidate, status = %resp.status(), "userinfo probe rejected");
                },
                Err(e) => {
                    debug!(endpoint = %candidate, error = %e, "userinfo probe failed");
                },
            }
        }

        warn!("no userinfo endpoint found for issuer");
        None
    }
}

fn discovery_url(issuer: &str) -> Result<Url, AuthError> {
    let mut url =
        Url::parse(issuer).map_err(|e| AuthError::DiscoveryFailed(format!("bad issuer: {e}")))?;
    url.set_path("/.well-known/openid-configuration");
    url.set_query(None);
    Ok(url)
}

fn issuer_origin(issuer: &str) -> Option<String> {
    let url = Url::parse(issuer).ok()?;
    Some(url.origin().ascii_serialization())
}
