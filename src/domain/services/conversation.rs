#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::Mutex;

use super::ActionExecutor;
use super::ExecutionSummary;
use super::Interpretation;
use super::Interpreter;
use super::TodoStore;
use crate::domain::models::Author;
use crate::domain::models::CompletionPrompt;
use crate::domain::models::EndpointBox;
use crate::domain::models::EndpointError;
use crate::domain::models::Message;
use crate::domain::models::MessageType;
use crate::domain::models::ModelId;
use crate::domain::models::ModelInfo;
use crate::domain::models::Operation;
use crate::domain::models::Todo;

pub const GREETING: &str = "Hello! I can help you manage your todos. Just tell me what to do.";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingReply,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The reply was interpreted and recorded.
    Replied,
    /// The server failed, an error message was recorded.
    Failed,
    /// The server isn't ready. The message was handled locally, if possible.
    Offline,
    /// Another request was in flight, nothing was recorded.
    Dropped,
    /// The session was reset while waiting, the reply was thrown away.
    Discarded,
    /// Blank input.
    Ignored,
}

/// Releases the in-flight flag on every exit path.
struct ReplyGuard<'a> {
    awaiting_reply: &'a AtomicBool,
}

impl<'a> ReplyGuard<'a> {
    fn acquire(awaiting_reply: &'a AtomicBool) -> Option<ReplyGuard<'a>> {
        if awaiting_reply
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        return Some(ReplyGuard { awaiting_reply });
    }
}

impl Drop for ReplyGuard<'_> {
    fn drop(&mut self) {
        self.awaiting_reply.store(false, Ordering::SeqCst);
    }
}

/// One chat with the assistant. At most one completion request is in flight
/// at a time, sends made meanwhile are dropped.
pub struct Conversation {
    endpoint: EndpointBox,
    model: ModelId,
    store: Mutex<TodoStore>,
    messages: Mutex<Vec<Message>>,
    awaiting_reply: AtomicBool,
    ready: AtomicBool,
    generation: AtomicU64,
}

impl Conversation {
    pub fn new(endpoint: EndpointBox, model: ModelId, store: TodoStore) -> Conversation {
        return Conversation {
            endpoint,
            model,
            store: Mutex::new(store),
            messages: Mutex::new(vec![]),
            awaiting_reply: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        };
    }

    pub fn state(&self) -> SessionState {
        if self.awaiting_reply.load(Ordering::SeqCst) {
            return SessionState::AwaitingReply;
        }

        return SessionState::Idle;
    }

    pub fn is_ready(&self) -> bool {
        return self.ready.load(Ordering::SeqCst);
    }

    pub fn model(&self) -> ModelId {
        return self.model;
    }

    pub fn set_model(&mut self, model: ModelId) {
        tracing::debug!(model = model.to_string(), "Switching model");
        self.model = model;
    }

    pub fn base_url(&self) -> Option<String> {
        return self.endpoint.base_url();
    }

    pub async fn messages(&self) -> Vec<Message> {
        return self.messages.lock().await.clone();
    }

    pub async fn todos(&self) -> Vec<Todo> {
        return self.store.lock().await.list().to_vec();
    }

    pub async fn models(&self) -> Result<Vec<ModelInfo>, EndpointError> {
        return self.endpoint.list_models().await;
    }

    /// Checks the server again and records the outcome in the chat. Calling
    /// this after a failure is how a retry happens. A successful connection
    /// starts the chat over with a single greeting.
    pub async fn connect(&self) -> Result<(), EndpointError> {
        let res = self.probe().await;
        self.ready.store(res.is_ok(), Ordering::SeqCst);

        match &res {
            Ok(()) => {
                let mut messages = self.messages.lock().await;
                messages.clear();
                messages.push(Message::new(Author::Assistant, GREETING));
                drop(messages);
                self.model_notice().await;
            }
            Err(err) => {
                tracing::warn!(error = ?err, "Model server is not ready");
                self.push(Message::new_with_type(
                    Author::Assistant,
                    MessageType::Error,
                    &format!("Failed to connect to the model server. {err}"),
                ))
                .await;
            }
        }

        return res;
    }

    /// Clears the chat. A reply still in flight is discarded when it lands.
    pub async fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().await.clear();
    }

    pub async fn send(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored;
        }

        let _guard = match ReplyGuard::acquire(&self.awaiting_reply) {
            Some(guard) => guard,
            None => {
                tracing::debug!(text, "Dropping message sent while awaiting a reply");
                return SendOutcome::Dropped;
            }
        };

        let generation = self.generation.load(Ordering::SeqCst);
        self.push(Message::new(Author::User, text)).await;

        if !self.is_ready() {
            return self.send_offline(text).await;
        }

        let snapshot = self.store.lock().await.snapshot();
        let prompt = CompletionPrompt::new(self.model, text, snapshot);
        let res = self.endpoint.get_completion(prompt).await;

        if generation != self.generation.load(Ordering::SeqCst) {
            tracing::debug!("Discarding reply for a reset session");
            return SendOutcome::Discarded;
        }

        let reply = match res {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(error = ?err, "Completion request failed");
                self.push(Message::new_with_type(
                    Author::Assistant,
                    MessageType::Error,
                    &format!("Server error: {err}"),
                ))
                .await;
                return SendOutcome::Failed;
            }
        };

        tracing::debug!(reply, "Model reply");
        let answer = self.apply(&reply, text).await;
        self.push(Message::new(Author::Assistant, &answer)).await;

        return SendOutcome::Replied;
    }

    async fn send_offline(&self, text: &str) -> SendOutcome {
        let mut store = self.store.lock().await;
        let interpretation = Interpreter::interpret("", text, store.list());

        if interpretation.operations().is_empty() {
            drop(store);
            self.push(Message::new_with_type(
                Author::Assistant,
                MessageType::Error,
                "The model server isn't reachable right now. Retry the connection and try again.",
            ))
            .await;
            return SendOutcome::Offline;
        }

        let summary = ActionExecutor::execute(&mut store, interpretation.operations()).await;
        drop(store);
        self.push(Message::new(
            Author::Assistant,
            &summarize(&interpretation, summary),
        ))
        .await;

        return SendOutcome::Offline;
    }

    /// Interprets a reply and applies it, returning the assistant's answer.
    async fn apply(&self, reply: &str, text: &str) -> String {
        let mut store = self.store.lock().await;

        match Interpreter::interpret(reply, text, store.list()) {
            Interpretation::Chat(answer) => return answer,
            interpretation => {
                let summary =
                    ActionExecutor::execute(&mut store, interpretation.operations()).await;
                return summarize(&interpretation, summary);
            }
        }
    }

    async fn probe(&self) -> Result<(), EndpointError> {
        let url = self.endpoint.base_url().ok_or(EndpointError::Unset)?;
        if !self.endpoint.health_check().await {
            return Err(EndpointError::Unreachable { url });
        }

        return Ok(());
    }

    async fn model_notice(&self) {
        let models = match self.endpoint.list_models().await {
            Ok(models) => models,
            Err(err) => {
                tracing::debug!(error = ?err, "Unable to list models");
                return;
            }
        };

        let model_id = self.model.to_string();
        if let Some(info) = models.iter().find(|info| return info.id == model_id) {
            if !info.downloaded {
                self.push(Message::new(
                    Author::Assistant,
                    &format!(
                        "{} isn't downloaded on the server yet, so the first reply may take a while.",
                        self.model.label()
                    ),
                ))
                .await;
            }
        }
    }

    async fn push(&self, message: Message) {
        self.messages.lock().await.push(message);
    }
}

/// The delete-last fallback names the task it removed.
fn summarize(interpretation: &Interpretation, summary: ExecutionSummary) -> String {
    if let Interpretation::Heuristic(ops) = interpretation {
        if let [Operation::Delete { id }] = ops.as_slice() {
            if summary.deleted == 1 {
                return format!("Deleted last task #{id}.");
            }
        }
    }

    return summary.message();
}
