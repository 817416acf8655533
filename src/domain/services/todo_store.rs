#[cfg(test)]
#[path = "todo_store_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Todo;
use crate::domain::models::TodoId;
use crate::domain::models::TodoSnapshot;

/// Fields to merge into an existing todo. `None` keeps the current value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

/// Ordered todo list, rewritten in full to a single JSON file on every
/// mutation. Writes are best-effort: a failed write is logged and the
/// in-memory list stays authoritative until the next successful write.
pub struct TodoStore {
    file_path: path::PathBuf,
    todos: Vec<Todo>,
}

impl TodoStore {
    pub fn new(file_path: path::PathBuf) -> TodoStore {
        return TodoStore {
            file_path,
            todos: vec![],
        };
    }

    pub async fn from_config() -> TodoStore {
        let file_path = path::PathBuf::from(Config::get(ConfigKey::StoreFile));
        return TodoStore::load(file_path).await;
    }

    /// Loads the list from disk. A missing or unreadable file yields an
    /// empty store.
    pub async fn load(file_path: path::PathBuf) -> TodoStore {
        let mut store = TodoStore::new(file_path);
        if !store.file_path.exists() {
            return store;
        }

        match fs::read_to_string(&store.file_path).await {
            Ok(payload) => match serde_json::from_str::<Vec<Todo>>(&payload) {
                Ok(todos) => {
                    store.todos = todos;
                }
                Err(err) => {
                    tracing::warn!(error = ?err, path = ?store.file_path, "Todo file is not valid JSON, starting empty");
                }
            },
            Err(err) => {
                tracing::warn!(error = ?err, path = ?store.file_path, "Failed to read todo file");
            }
        }

        return store;
    }

    pub fn file_path(&self) -> &path::Path {
        return &self.file_path;
    }

    pub fn list(&self) -> &[Todo] {
        return &self.todos;
    }

    pub fn len(&self) -> usize {
        return self.todos.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.todos.is_empty();
    }

    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        return self.todos.iter().find(|todo| return todo.id == id);
    }

    pub fn contains(&self, id: TodoId) -> bool {
        return self.get(id).is_some();
    }

    /// A freshly generated id that no todo in the store uses yet.
    pub fn unused_id(&self) -> TodoId {
        loop {
            let id = Todo::generate_id();
            if !self.contains(id) {
                return id;
            }
        }
    }

    /// Most recently inserted todo.
    pub fn last(&self) -> Option<&Todo> {
        return self.todos.last();
    }

    pub fn snapshot(&self) -> Vec<TodoSnapshot> {
        return self
            .todos
            .iter()
            .map(|todo| return todo.snapshot())
            .collect();
    }

    pub async fn add(&mut self, todo: Todo) -> Result<()> {
        if todo.title.trim().is_empty() {
            bail!("Todo title can't be empty");
        }
        if self.contains(todo.id) {
            bail!(format!("A todo with id {} already exists", todo.id));
        }

        self.todos.push(todo);
        self.persist().await;

        return Ok(());
    }

    /// Returns false when no todo has the id.
    pub async fn update(&mut self, id: TodoId, patch: TodoPatch) -> bool {
        let todo = match self.todos.iter_mut().find(|todo| return todo.id == id) {
            Some(todo) => todo,
            None => return false,
        };

        if let Some(title) = patch.title {
            if !title.trim().is_empty() {
                todo.title = title;
            }
        }
        if let Some(completed) = patch.completed {
            todo.completed = completed;
        }

        self.persist().await;
        return true;
    }

    /// Returns false when no todo has the id.
    pub async fn delete(&mut self, id: TodoId) -> bool {
        let before = self.todos.len();
        self.todos.retain(|todo| return todo.id != id);
        if self.todos.len() == before {
            return false;
        }

        self.persist().await;
        return true;
    }

    async fn persist(&self) {
        if let Err(err) = self.write().await {
            tracing::warn!(error = ?err, path = ?self.file_path, "Failed to persist todos");
        }
    }

    async fn write(&self) -> Result<()> {
        let payload = serde_json::to_string(&self.todos)?;

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.file_path.with_extension("json.partial");
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;
        drop(file);
        fs::rename(tmp_path, &self.file_path).await?;

        return Ok(());
    }
}
