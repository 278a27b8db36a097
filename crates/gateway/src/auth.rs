//! Authentication routes and the request authenticator used by every
//! protected endpoint.

use {
    axum::{
        Json,
        extract::{FromRequestParts, Query, State},
        http::{StatusCode, header, request::Parts},
        response::{IntoResponse, Redirect, Response},
    },
    axum_extra::extract::cookie::{Cookie, CookieJar, SameSite},
    serde::Deserialize,
    serde_json::json,
    tracing::{info, warn},
};

use ticklist_oidc::{AuthError, UserIdentity};

use crate::{config::GatewayConfig, state::AppState};

/// Name of the HTTP-only session cookie carrying the access token.
pub const SESSION_COOKIE: &str = "access_token";

const SESSION_COOKIE_DAYS: i64 = 7;

// ── Routes ──────────────────────────────────────────────────────────────────

/// `GET /auth/login`: start a login and hand the authorization URL back to
/// the client as JSON. The client navigates there itself.
pub async fn login(State(state): State<AppState>) -> Response {
    match state.flow.begin_login().await {
        Ok(start) => Json(json!({ "authUrl": start.auth_url.as_str() })).into_response(),
        Err(AuthError::DiscoveryFailed(detail)) => {
            warn!(detail, "login unavailable: provider discovery failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "Authentication service is currently unavailable",
                    "code": "AUTH_SERVER_UNAVAILABLE",
                })),
            )
                .into_response()
        },
        Err(e) => {
            warn!(error = %e, "failed to initiate login");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to initiate login",
                    "code": "LOGIN_ERROR",
                })),
            )
                .into_response()
        },
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

/// `GET /auth/callback`: complete the provider redirect.
///
/// Success sets the session cookie and redirects to the frontend's
/// post-login route; every failure becomes a machine-readable `error` code
/// on the frontend login route. Provider detail stays in the logs.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Response {
    let frontend = &state.config.frontend_url;

    let Some(code) = params.code.as_deref() else {
        // Provider error or idempotent re-entry. The frontend runs its own
        // auth check on /protected either way.
        let authenticated = jar.get(SESSION_COOKIE).is_some();
        info!(authenticated, "callback without code");
        return Redirect::to(&format!("{frontend}/protected")).into_response();
    };

    match state.flow.complete_login(code, params.state.as_deref()).await {
        Ok(session) => {
            info!(subject = %session.identity.subject, "login completed");
            let jar = jar.add(session_cookie(&state.config, &session.tokens.access_token));
            (jar, Redirect::to(&format!("{frontend}/callback"))).into_response()
        },
        Err(e) => {
            warn!(error = %e, "callback failed");
            Redirect::to(&format!("{frontend}/login?error={}", e.redirect_code()))
                .into_response()
        },
    }
}

/// `GET /auth/me`: current caller identity, via the request authenticator.
pub async fn me(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    Json(json!({ "user": user }))
}

/// `POST /auth/logout`: unconditionally clear the session cookie.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let jar = jar.remove(removal_cookie(&state.config));
    info!("session cookie cleared");
    (jar, Json(json!({ "message": "Logged out successfully" }))).into_response()
}

// ── Cookies ─────────────────────────────────────────────────────────────────

fn session_cookie(config: &GatewayConfig, token: &str) -> Cookie<'static> {
    let mut builder = Cookie::build((SESSION_COOKIE, token.to_string()))
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::days(SESSION_COOKIE_DAYS));
    if let Some(domain) = &config.cookie_domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

/// Cookie with the same scope as [`session_cookie`] so removal matches.
fn removal_cookie(config: &GatewayConfig) -> Cookie<'static> {
    let mut builder = Cookie::build(SESSION_COOKIE).path("/");
    if let Some(domain) = &config.cookie_domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

// ── Request authenticator ───────────────────────────────────────────────────

/// Extractor that resolves the caller's identity or rejects with 401.
///
/// Credential comes from the session cookie, else an `Authorization: Bearer`
/// header. Routes taking this extractor cannot run unauthenticated.
pub struct AuthUser(pub UserIdentity);

pub enum AuthRejection {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let message = match self {
            Self::MissingToken => "Access token required",
            Self::InvalidToken => "Invalid or expired token",
        };
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthRejection::MissingToken)?;
        match state.flow.authenticate_bearer(&token).await {
            Ok(identity) => Ok(Self(identity)),
            Err(_) => Err(AuthRejection::InvalidToken),
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return Some(cookie.value().to_string());
    }
    parts
        .headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}
