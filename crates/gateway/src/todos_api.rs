//! Todo CRUD routes. Every route authenticates via [`AuthUser`]; the store
//! is keyed by the resolved subject.

use {
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Deserialize,
    serde_json::json,
    tracing::error,
};

use ticklist_todos::{NewTodo, StoreError, TodoPatch};

use crate::{auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateTodoBody {
    title: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTodoBody {
    title: Option<String>,
    description: Option<String>,
    is_completed: Option<bool>,
}

/// `POST /api/todos`
pub async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<CreateTodoBody>,
) -> Response {
    let Some(title) = body.title.filter(|t| !t.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Title is required" })),
        )
            .into_response();
    };

    match state
        .todos
        .create(NewTodo {
            title,
            description: body.description,
            user_id: user.subject,
        })
        .await
    {
        Ok(todo) => (StatusCode::CREATED, Json(todo)).into_response(),
        Err(e) => store_error(e),
    }
}

/// `GET /api/todos`
pub async fn list(State(state): State<AppState>, AuthUser(user): AuthUser) -> Response {
    match state.todos.find_all(&user.subject).await {
        Ok(todos) => Json(todos).into_response(),
        Err(e) => store_error(e),
    }
}

/// `PUT /api/todos/{id}`: completion toggle when `isCompleted` is present,
/// otherwise a title/description update.
pub async fn update(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateTodoBody>,
) -> Response {
    let patch = if let Some(is_completed) = body.is_completed {
        TodoPatch {
            is_completed: Some(is_completed),
            ..Default::default()
        }
    } else {
        TodoPatch {
            title: body.title,
            description: body.description,
            ..Default::default()
        }
    };

    match state.todos.update(&id, patch).await {
        Ok(Some(todo)) => Json(todo).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Todo not found" })),
        )
            .into_response(),
        Err(e) => store_error(e),
    }
}

/// `DELETE /api/todos/{id}`
pub async fn remove(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<String>,
) -> Response {
    match state.todos.delete(&id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error(e),
    }
}

/// `GET /api/protected`: smoke route exercising the authenticator.
pub async fn protected(AuthUser(user): AuthUser) -> Json<serde_json::Value> {
    Json(json!({
        "message": "This is protected content",
        "user": user,
    }))
}

fn store_error(e: StoreError) -> Response {
    error!(error = %e, "todo store operation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": e.to_string() })),
    )
        .into_response()
}
