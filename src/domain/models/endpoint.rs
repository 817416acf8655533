use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use thiserror::Error;

use super::ModelId;
use super::TodoSnapshot;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Model server URL not set. Set TODOPILOT_SERVER_URL (e.g. http://192.168.1.10:3333)")]
    Unset,
    #[error("Can't reach model server at {url}")]
    Unreachable { url: String },
    #[error("{message}")]
    Server { message: String },
}

pub struct CompletionPrompt {
    pub model: ModelId,
    pub user_message: String,
    pub todos: Vec<TodoSnapshot>,
}

impl CompletionPrompt {
    pub fn new(model: ModelId, user_message: &str, todos: Vec<TodoSnapshot>) -> CompletionPrompt {
        return CompletionPrompt {
            model,
            user_message: user_message.to_string(),
            todos,
        };
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub id: String,
    pub label: String,
    pub filename: String,
    pub downloaded: bool,
    pub size_bytes: Option<u64>,
}

#[async_trait]
pub trait Endpoint {
    /// The resolved server address, if there is one.
    fn base_url(&self) -> Option<String>;

    /// Bounded time readiness probe. Every failure mode, timeouts included,
    /// resolves to `false`.
    async fn health_check(&self) -> bool;

    /// Models the server can serve, and whether their weights are on disk.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, EndpointError>;

    /// Requests a single completion for the user message. The full reply
    /// text is returned once the server has finished generating.
    async fn get_completion(&self, prompt: CompletionPrompt) -> Result<String, EndpointError>;
}

pub type EndpointBox = Box<dyn Endpoint + Send + Sync>;
