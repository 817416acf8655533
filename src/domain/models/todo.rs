#[cfg(test)]
#[path = "todo_test.rs"]
mod tests;

use chrono::Utc;
use rand::Rng;
use serde_derive::Deserialize;
use serde_derive::Serialize;

pub type TodoId = i64;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatedBy {
    #[default]
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: TodoId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_by: CreatedBy,
}

impl Todo {
    pub fn new(id: TodoId, title: &str, created_by: CreatedBy) -> Todo {
        return Todo {
            id,
            title: title.to_string(),
            description: None,
            completed: false,
            created_by,
        };
    }

    pub fn with_description(mut self, description: &str) -> Todo {
        if !description.trim().is_empty() {
            self.description = Some(description.to_string());
        }

        return self;
    }

    /// Millisecond clock with a random tie-break, so rapid sequential creates
    /// rarely collide. Callers still check the store for uniqueness.
    pub fn generate_id() -> TodoId {
        let jitter: i64 = rand::thread_rng().gen_range(0..1000);
        return Utc::now().timestamp_millis() + jitter;
    }

    pub fn snapshot(&self) -> TodoSnapshot {
        return TodoSnapshot {
            id: self.id,
            title: self.title.to_string(),
            completed: self.completed,
        };
    }
}

/// The minimal view of a todo that is shared with the model server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoSnapshot {
    pub id: TodoId,
    pub title: String,
    pub completed: bool,
}
