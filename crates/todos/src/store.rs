//! Todo persistence over SQLite, keyed by the authenticated subject.

use std::str::FromStr;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    thiserror::Error,
    tracing::info,
    uuid::Uuid,
};

use crate::types::{NewTodo, Todo, TodoPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Repository over todo records. `user_id` is the opaque subject string
/// produced by the identity resolver.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn create(&self, todo: NewTodo) -> Result<Todo, StoreError>;
    /// All todos for `user_id`, newest first.
    async fn find_all(&self, user_id: &str) -> Result<Vec<Todo>, StoreError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Todo>, StoreError>;
    /// Apply `patch`; `None` means the todo does not exist.
    async fn update(&self, id: &str, patch: TodoPatch) -> Result<Option<Todo>, StoreError>;
    /// True when a row was deleted.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS todos (
    id           TEXT PRIMARY KEY,
    title        TEXT NOT NULL,
    description  TEXT,
    is_completed INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL,
    user_id      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_todos_user ON todos (user_id, created_at);";

/// SQLite-backed [`TodoStore`].
pub struct SqliteTodoStore {
    pool: SqlitePool,
}

impl SqliteTodoStore {
    /// Open (creating if missing) the database at `url` and ensure the
    /// schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(sqlx::Error::from)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::init(pool).await
    }

    /// Private in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        // A second connection would see a different empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        info!("todo store ready");
        Ok(Self { pool })
    }
}

#[derive(sqlx::FromRow)]
struct TodoRow {
    id: String,
    title: String,
    description: Option<String>,
    is_completed: bool,
    created_at: DateTime<Utc>,
    user_id: String,
}

impl From<TodoRow> for Todo {
    fn from(row: TodoRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            is_completed: row.is_completed,
            created_at: row.created_at,
            user_id: row.user_id,
        }
    }
}

#[async_trait]
impl TodoStore for SqliteTodoStore {
    async fn create(&self, todo: NewTodo) -> Result<Todo, StoreError> {
        let record = Todo {
            id: Uuid::new_v4().to_string(),
            title: todo.title,
            description: todo.description,
            is_completed: false,
            created_at: Utc::now(),
            user_id: todo.user_id,
        };
        sqlx::query(
            "INSERT INTO todos (id, title, description, is_completed, created_at, user_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.is_completed)
        .bind(record.created_at)
        .bind(&record.user_id)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_all(&self, user_id: &str) -> Result<Vec<Todo>, StoreError> {
        let rows = sqlx::query_as::<_, TodoRow>(
            "SELECT id, title, description, is_completed, created_at, user_id
             FROM todos WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Todo::from).collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Todo>, StoreError> {
        let row = sqlx::query_as::<_, TodoRow>(
            "SELECT id, title, description, is_completed, created_at, user_id
             FROM todos WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Todo::from))
    }

    async fn update(&self, id: &str, patch: TodoPatch) -> Result<Option<Todo>, StoreError> {
        let result = sqlx::query(
            "UPDATE todos SET
                 title        = COALESCE(?, title),
                 description  = COALESCE(?, description),
                 is_completed = COALESCE(?, is_completed)
             WHERE id = ?",
        )
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(patch.is_completed)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM todos WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_todo(title: &str, user: &str) -> NewTodo {
        NewTodo {
            title: title.to_string(),
            description: None,
            user_id: user.to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_list_scoped_by_user() {
        let store = SqliteTodoStore::in_memory().await.unwrap();
        store.create(new_todo("a", "user-1")).await.unwrap();
        store.create(new_todo("b", "user-1")).await.unwrap();
        store.create(new_todo("c", "user-2")).await.unwrap();

        let mine = store.find_all("user-1").await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|t| t.user_id == "user-1"));
        assert!(mine.iter().all(|t| !t.is_completed));

        assert_eq!(store.find_all("user-2").await.unwrap().len(), 1);
        assert!(store.find_all("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn newest_first_ordering() {
        let store = SqliteTodoStore::in_memory().await.unwrap();
        let first = store.create(new_todo("first", "u")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create(new_todo("second", "u")).await.unwrap();

        let all = store.find_all("u").await.unwrap();
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);
    }

    #[tokio::test]
    async fn patch_updates_only_given_fields() {
        let store = SqliteTodoStore::in_memory().await.unwrap();
        let todo = store
            .create(NewTodo {
                title: "write tests".into(),
                description: Some("for the store".into()),
                user_id: "u".into(),
            })
            .await
            .unwrap();

        let toggled = store
            .update(
                &todo.id,
                TodoPatch {
                    is_completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(toggled.is_completed);
        assert_eq!(toggled.title, "write tests");
        assert_eq!(toggled.description.as_deref(), Some("for the store"));

        let renamed = store
            .update(
                &todo.id,
                TodoPatch {
                    title: Some("write more tests".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(renamed.title, "write more tests");
        assert!(renamed.is_completed);
    }

    #[tokio::test]
    async fn update_missing_todo_is_none() {
        let store = SqliteTodoStore::in_memory().await.unwrap();
        let result = store
            .update("no-such-id", TodoPatch::default())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_reports_whether_row_existed() {
        let store = SqliteTodoStore::in_memory().await.unwrap();
        let todo = store.create(new_todo("x", "u")).await.unwrap();

        assert!(store.delete(&todo.id).await.unwrap());
        assert!(!store.delete(&todo.id).await.unwrap());
        assert!(store.find_by_id(&todo.id).await.unwrap().is_none());
    }
}
