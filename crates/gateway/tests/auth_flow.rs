//! End-to-end exercise of the login flow and the protected todo API against
//! a mock provider and an in-memory store.

use std::sync::Arc;

use {
    secrecy::SecretString,
    serde_json::{Value, json},
    ticklist_gateway::{AppState, GatewayConfig, server},
    ticklist_oidc::{AuthFlow, ProviderConfig},
    ticklist_todos::SqliteTodoStore,
    url::Url,
};

const FRONTEND: &str = "http://localhost:5173";

async fn mock_provider() -> mockito::ServerGuard {
    let mut server = mockito::Server::new_async().await;
    let base = server.url();
    server
        .mock("GET", "/.well-known/openid-configuration")
        .with_status(200)
        .with_body(
            json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
                "token_endpoint": format!("{base}/oauth/token"),
                "userinfo_endpoint": format!("{base}/userinfo"),
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(
            json!({ "access_token": "at-e2e", "token_type": "Bearer", "expires_in": 3600 })
                .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/userinfo")
        .match_header("authorization", "Bearer at-e2e")
        .with_status(200)
        .with_body(
            json!({
                "id": "user-42",
                "email": "dev@example.com",
                "displayName": "Dev User",
                "roles": ["member"],
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
}

async fn spawn_gateway(issuer: &str) -> String {
    let config = GatewayConfig {
        bind: "127.0.0.1".to_string(),
        port: 0,
        frontend_url: FRONTEND.to_string(),
        database_url: "sqlite::memory:".to_string(),
        cookie_secure: false,
        cookie_domain: None,
    };
    let provider = ProviderConfig {
        issuer: issuer.to_string(),
        client_id: "ticklist-web".to_string(),
        client_secret: SecretString::from("test-secret".to_string()),
        redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        scope: "openid profile email".to_string(),
        frontend_url: FRONTEND.to_string(),
        allow_unverified_id_token: true,
    };
    let todos = SqliteTodoStore::in_memory().await.unwrap();
    let state = AppState::new(AuthFlow::new(provider), Arc::new(todos), config);
    let app = server::router(state).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn location(resp: &reqwest::Response) -> String {
    resp.headers()["location"].to_str().unwrap().to_string()
}

#[tokio::test]
async fn full_login_todo_and_logout_round_trip() {
    let provider = mock_provider().await;
    let base = spawn_gateway(&provider.url()).await;
    let http = client();

    // Login hands back the provider authorization URL.
    let body: Value = http
        .get(format!("{base}/auth/login"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let auth_url = Url::parse(body["authUrl"].as_str().unwrap()).unwrap();
    assert!(auth_url.as_str().starts_with(&provider.url()));
    let state = auth_url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    // Provider redirects back; the callback sets the session cookie.
    let resp = http
        .get(format!("{base}/auth/callback?code=fake-code&state={state}"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_redirection());
    assert_eq!(location(&resp), format!("{FRONTEND}/callback"));
    let set_cookie = resp.headers()["set-cookie"].to_str().unwrap();
    assert!(set_cookie.starts_with("access_token="));
    assert!(set_cookie.contains("HttpOnly"));

    // Identity comes back through the cookie.
    let me: Value = http
        .get(format!("{base}/auth/me"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["user"]["sub"], "user-42");
    assert_eq!(me["user"]["email"], "dev@example.com");
    assert_eq!(me["user"]["roles"], json!(["member"]));

    // Todo CRUD under the resolved subject.
    let created: Value = http
        .post(format!("{base}/api/todos"))
        .json(&json!({ "title": "ship it", "description": "end to end" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["title"], "ship it");
    assert_eq!(created["userId"], "user-42");
    assert_eq!(created["isCompleted"], false);
    let todo_id = created["id"].as_str().unwrap().to_string();

    let listed: Value = http
        .get(format!("{base}/api/todos"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let toggled: Value = http
        .put(format!("{base}/api/todos/{todo_id}"))
        .json(&json!({ "isCompleted": true }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["isCompleted"], true);

    let resp = http
        .delete(format!("{base}/api/todos/{todo_id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    // Logout clears the credential; /auth/me is 401 afterwards.
    let resp = http
        .post(format!("{base}/auth/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = http.get(format!("{base}/auth/me")).send().await.unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn callback_error_codes_redirect_to_login() {
    let provider = mock_provider().await;
    let base = spawn_gateway(&provider.url()).await;
    let http = client();

    // code present, state missing
    let resp = http
        .get(format!("{base}/auth/callback?code=abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        location(&resp),
        format!("{FRONTEND}/login?error=state_missing")
    );

    // state that was never issued
    let resp = http
        .get(format!("{base}/auth/callback?code=abc&state=forged"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        location(&resp),
        format!("{FRONTEND}/login?error=code_verifier_missing")
    );

    // no code at all: neutral landing, the frontend decides
    let resp = http
        .get(format!("{base}/auth/callback"))
        .send()
        .await
        .unwrap();
    assert_eq!(location(&resp), format!("{FRONTEND}/protected"));
}

#[tokio::test]
async fn protected_routes_reject_missing_and_bad_credentials() {
    let provider = mock_provider().await;
    let base = spawn_gateway(&provider.url()).await;
    let http = client();

    let resp = http.get(format!("{base}/api/todos")).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Access token required");

    let resp = http
        .get(format!("{base}/api/protected"))
        .header("authorization", "Bearer not-a-real-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn bearer_header_works_without_cookie() {
    let provider = mock_provider().await;
    let base = spawn_gateway(&provider.url()).await;
    let http = client();

    let me: Value = http
        .get(format!("{base}/auth/me"))
        .header("authorization", "Bearer at-e2e")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["user"]["sub"], "user-42");
}

#[tokio::test]
async fn create_requires_title() {
    let provider = mock_provider().await;
    let base = spawn_gateway(&provider.url()).await;
    let http = client();

    let resp = http
        .post(format!("{base}/api/todos"))
        .header("authorization", "Bearer at-e2e")
        .json(&json!({ "description": "no title" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Title is required");
}
