use super::TodoId;

/// A single todo list mutation extracted from a model reply or a user message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operation {
    Add {
        title: String,
    },
    Delete {
        id: TodoId,
    },
    Update {
        id: TodoId,
        title: Option<String>,
        completed: Option<bool>,
    },
}

impl Operation {
    pub fn add(title: &str) -> Operation {
        return Operation::Add {
            title: title.to_string(),
        };
    }

    pub fn delete(id: TodoId) -> Operation {
        return Operation::Delete { id };
    }
}
