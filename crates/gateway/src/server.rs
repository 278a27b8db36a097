//! Router assembly and the listening loop.

use {
    anyhow::Context,
    axum::{
        Router,
        extract::Request,
        http::{HeaderValue, header},
        middleware::{self, Next},
        response::Response,
        routing::{get, post, put},
    },
    tower_http::cors::CorsLayer,
    tracing::info,
    url::Url,
};

use crate::{auth, state::AppState, todos_api};

pub fn router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.frontend_url)?;

    let router = Router::new()
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        .route("/api/health", get(health))
        .route("/api/protected", get(todos_api::protected))
        .route("/api/todos", get(todos_api::list).post(todos_api::create))
        .route(
            "/api/todos/{id}",
            put(todos_api::update).delete(todos_api::remove),
        )
        .layer(middleware::from_fn(no_store_headers))
        .layer(cors)
        .with_state(state);

    Ok(router)
}

/// Bind and serve until the task is cancelled.
pub async fn start(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.bind, state.config.port);
    let app = router(state)?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// Auth and API responses must never be cached by browsers or edges.
async fn no_store_headers(req: Request, next: Next) -> Response {
    let sensitive =
        req.uri().path().starts_with("/auth/") || req.uri().path().starts_with("/api/");
    let mut resp = next.run(req).await;
    if sensitive {
        let headers = resp.headers_mut();
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate, private"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }
    resp
}

/// Allow exactly the frontend origin, with credentials.
fn cors_layer(frontend_url: &str) -> anyhow::Result<CorsLayer> {
    let url = Url::parse(frontend_url).context("invalid FRONTEND_URL")?;
    let origin = url.origin().ascii_serialization();
    let origin: HeaderValue = origin
        .parse()
        .context("frontend origin is not a valid header value")?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}
