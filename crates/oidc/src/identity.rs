//! Normalizes provider claims into a [`UserIdentity`].
//!
//! The same mapping backs both the callback path and request-time
//! authentication, so the precedence rules live in exactly one place.

use {
    base64::Engine,
    base64::engine::general_purpose::URL_SAFE_NO_PAD,
    serde_json::Value,
    tracing::{debug, warn},
};

use crate::{discovery::DiscoveryCache, types::UserIdentity};

/// Resolve an identity from a fresh token set.
///
/// Prefers the userinfo endpoint (typically the most complete source);
/// falls back to decoding the ID token's claims segment when allowed, and
/// finally degrades to the minimal `"unknown"` identity rather than
/// failing. Callers must treat that sentinel as unauthenticated.
pub async fn resolve(
    discovery: &DiscoveryCache,
    http: &reqwest::Client,
    access_token: &str,
    id_token: Option<&str>,
    allow_unverified_id_token: bool,
) -> UserIdentity {
    if let Some(identity) = from_userinfo(discovery, http, access_token).await {
        return identity;
    }

    if !allow_unverified_id_token {
        warn!("userinfo unavailable and unverified ID tokens are disabled; identity degraded");
        return UserIdentity::unknown();
    }

    match id_token.and_then(decode_jwt_claims) {
        Some(claims) => {
            debug!("identity resolved from ID token claims");
            from_claims(&claims)
        },
        None => {
            warn!("no usable userinfo response or ID token; identity degraded");
            UserIdentity::unknown()
        },
    }
}

/// Fetch and map the userinfo document, or `None` on any failure.
pub async fn from_userinfo(
    discovery: &DiscoveryCache,
    http: &reqwest::Client,
    access_token: &str,
) -> Option<UserIdentity> {
    let endpoint = discovery.userinfo_endpoint(access_token).await?;
    let resp = http
        .get(endpoint.clone())
        .bearer_auth(access_token)
        .header("accept", "application/json")
        .send()
        .await
        .ok()?;
    if !resp.status().is_success() {
        debug!(endpoint = %endpoint, status = %resp.status(), "userinfo request rejected");
        return None;
    }
    let claims: Value = resp.json().await.ok()?;
    Some(from_claims(&claims))
}

/// Map a claims object to a [`UserIdentity`] with fixed precedence:
/// subject from `id`, else `sub`, else `email`; display name from `name`,
/// else `displayName`, else `username`, else `email`. Everything else is
/// passed through opaquely.
pub fn from_claims(claims: &Value) -> UserIdentity {
    let subject = claim_string(claims, "id")
        .or_else(|| claim_string(claims, "sub"))
        .or_else(|| claim_string(claims, "email"))
        .unwrap_or_else(|| UserIdentity::UNKNOWN_SUBJECT.to_string());

    let display_name = claim_string(claims, "name")
        .or_else(|| claim_string(claims, "displayName"))
        .or_else(|| claim_string(claims, "username"))
        .or_else(|| claim_string(claims, "email"));

    let email = claim_string(claims, "email");

    let mut extra = serde_json::Map::new();
    if let Some(map) = claims.as_object() {
        for (key, value) in map {
            if !matches!(key.as_str(), "id" | "sub" | "email" | "name") {
                extra.insert(key.clone(), value.clone());
            }
        }
    }

    UserIdentity {
        subject,
        email,
        display_name,
        extra,
    }
}

/// Decode the payload segment of a JWT without verifying its signature.
///
/// Returns `None` unless the token has three segments and a JSON object
/// payload. Trust decisions belong to the caller.
pub fn decode_jwt_claims(token: &str) -> Option<Value> {
    let mut segments = token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);
    segments.next()?; // signature must exist, even though it is not checked
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.is_object().then_some(claims)
}

fn claim_string(claims: &Value, key: &str) -> Option<String> {
    match claims.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn encode_jwt(claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn subject_prefers_id_over_email() {
        let identity = from_claims(&json!({ "id": "u-1", "email": "a@b.c" }));
        assert_eq!(identity.subject, "u-1");
        assert_eq!(identity.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn subject_falls_back_to_sub_then_email() {
        let identity = from_claims(&json!({ "sub": "s-9", "email": "a@b.c" }));
        assert_eq!(identity.subject, "s-9");

        let identity = from_claims(&json!({ "email": "a@b.c" }));
        assert_eq!(identity.subject, "a@b.c");
    }

    #[test]
    fn numeric_id_is_coerced_to_string() {
        let identity = from_claims(&json!({ "id": 42 }));
        assert_eq!(identity.subject, "42");
    }

    #[test]
    fn empty_claims_degrade_to_unknown() {
        let identity = from_claims(&json!({}));
        assert!(identity.is_unknown());
        assert!(identity.email.is_none());
        assert!(identity.display_name.is_none());
    }

    #[test]
    fn display_name_precedence() {
        let identity = from_claims(&json!({
            "id": "u-1",
            "name": "Ada L",
            "displayName": "ada",
            "username": "alovelace",
        }));
        assert_eq!(identity.display_name.as_deref(), Some("Ada L"));

        let identity = from_claims(&json!({ "id": "u-1", "username": "alovelace" }));
        assert_eq!(identity.display_name.as_deref(), Some("alovelace"));
    }

    #[test]
    fn provider_claims_pass_through_opaquely() {
        let identity = from_claims(&json!({
            "id": "u-1",
            "roles": ["admin"],
            "businessUnit": "ops",
        }));
        assert_eq!(identity.extra["roles"], json!(["admin"]));
        assert_eq!(identity.extra["businessUnit"], json!("ops"));
        assert!(!identity.extra.contains_key("id"));
    }

    #[test]
    fn decodes_unverified_jwt_payload() {
        let token = encode_jwt(&json!({ "sub": "s-1", "email": "a@b.c" }));
        let claims = decode_jwt_claims(&token).unwrap();
        assert_eq!(claims["sub"], "s-1");
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert!(decode_jwt_claims("opaque-access-token").is_none());
        assert!(decode_jwt_claims("a.b").is_none());
        assert!(decode_jwt_claims("a.!!!.c").is_none());
        assert!(decode_jwt_claims("a.b.c.d").is_none());
    }

    #[tokio::test]
    async fn resolve_falls_back_to_id_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let discovery = DiscoveryCache::new(server.url(), http.clone());
        let id_token = encode_jwt(&json!({ "sub": "s-7", "name": "Seven" }));

        let identity = resolve(&discovery, &http, "opaque", Some(&id_token), true).await;
        assert_eq!(identity.subject, "s-7");
        assert_eq!(identity.display_name.as_deref(), Some("Seven"));
    }

    #[tokio::test]
    async fn resolve_skips_fallback_when_disallowed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let discovery = DiscoveryCache::new(server.url(), http.clone());
        let id_token = encode_jwt(&json!({ "sub": "s-7" }));

        let identity = resolve(&discovery, &http, "opaque", Some(&id_token), false).await;
        assert!(identity.is_unknown());
    }

    #[tokio::test]
    async fn resolve_prefers_userinfo() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/.well-known/openid-configuration")
            .with_status(200)
            .with_body(
                json!({ "userinfo_endpoint": format!("{}/userinfo", server.url()) }).to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/userinfo")
            .with_status(200)
            .with_body(json!({ "id": "u-42", "email": "u@x.y" }).to_string())
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let discovery = DiscoveryCache::new(server.url(), http.clone());
        let id_token = encode_jwt(&json!({ "sub": "ignored" }));

        let identity = resolve(&discovery, &http, "tok", Some(&id_token), true).await;
        assert_eq!(identity.subject, "u-42");
    }
}
