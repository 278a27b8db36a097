pub mod store;
pub mod types;

pub use store::{SqliteTodoStore, StoreError, TodoStore};
pub use types::{NewTodo, Todo, TodoPatch};
