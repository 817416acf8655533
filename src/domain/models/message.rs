#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use chrono::DateTime;
use chrono::Local;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use uuid::Uuid;

use super::Author;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Normal,
    Error,
}

/// A single chat entry. Messages are append-only, so there are no setters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub author: Author,
    pub text: String,
    pub timestamp: DateTime<Local>,
    mtype: MessageType,
}

impl Message {
    pub fn new(author: Author, text: &str) -> Message {
        return Message::new_with_type(author, MessageType::Normal, text);
    }

    pub fn new_with_type(author: Author, mtype: MessageType, text: &str) -> Message {
        return Message {
            id: Uuid::new_v4().simple().to_string(),
            author,
            text: text.to_string().replace('\t', "  "),
            timestamp: Local::now(),
            mtype,
        };
    }

    pub fn message_type(&self) -> MessageType {
        return self.mtype;
    }
}
