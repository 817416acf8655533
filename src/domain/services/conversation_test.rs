use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use super::Conversation;
use super::SendOutcome;
use super::SessionState;
use super::GREETING;
use crate::domain::models::Author;
use crate::domain::models::CompletionPrompt;
use crate::domain::models::CreatedBy;
use crate::domain::models::Endpoint;
use crate::domain::models::EndpointError;
use crate::domain::models::MessageType;
use crate::domain::models::ModelId;
use crate::domain::models::ModelInfo;
use crate::domain::models::Todo;
use crate::domain::models::TodoSnapshot;
use crate::domain::services::TodoStore;

type Requests = Arc<std::sync::Mutex<Vec<(ModelId, String, Vec<TodoSnapshot>)>>>;

struct FakeEndpoint {
    url: Option<String>,
    healthy: bool,
    models: Vec<ModelInfo>,
    replies: std::sync::Mutex<VecDeque<Result<String, EndpointError>>>,
    gate: Option<Arc<Notify>>,
    requests: Requests,
}

impl FakeEndpoint {
    fn healthy(replies: Vec<Result<String, EndpointError>>) -> FakeEndpoint {
        return FakeEndpoint {
            url: Some("http://127.0.0.1:3333".to_string()),
            healthy: true,
            models: vec![],
            replies: std::sync::Mutex::new(replies.into()),
            gate: None,
            requests: Arc::new(std::sync::Mutex::new(vec![])),
        };
    }
}

#[async_trait]
impl Endpoint for FakeEndpoint {
    fn base_url(&self) -> Option<String> {
        return self.url.clone();
    }

    async fn health_check(&self) -> bool {
        return self.healthy;
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, EndpointError> {
        return Ok(self.models.clone());
    }

    async fn get_completion(&self, prompt: CompletionPrompt) -> Result<String, EndpointError> {
        self.requests
            .lock()
            .unwrap()
            .push((prompt.model, prompt.user_message, prompt.todos));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        return self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| return Ok("{}".to_string()));
    }
}

async fn store_with(dir: &TempDir, todos: Vec<Todo>) -> Result<TodoStore> {
    let mut store = TodoStore::load(dir.path().join("todos.json")).await;
    for todo in todos {
        store.add(todo).await?;
    }

    return Ok(store);
}

async fn texts(conversation: &Conversation) -> Vec<(Author, String)> {
    return conversation
        .messages()
        .await
        .iter()
        .map(|message| return (message.author, message.text.to_string()))
        .collect();
}

#[tokio::test]
async fn it_greets_when_connected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let conversation = Conversation::new(
        Box::new(FakeEndpoint::healthy(vec![])),
        ModelId::Qwen15,
        store_with(&dir, vec![]).await?,
    );

    conversation.connect().await?;

    assert!(conversation.is_ready());
    assert_eq!(
        texts(&conversation).await,
        vec![(Author::Assistant, GREETING.to_string())]
    );

    return Ok(());
}

#[tokio::test]
async fn it_reports_an_unset_endpoint() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut endpoint = FakeEndpoint::healthy(vec![]);
    endpoint.url = None;
    let conversation = Conversation::new(
        Box::new(endpoint),
        ModelId::Qwen15,
        store_with(&dir, vec![]).await?,
    );

    let res = conversation.connect().await;

    assert_eq!(res, Err(EndpointError::Unset));
    assert!(!conversation.is_ready());
    let messages = conversation.messages().await;
    assert_eq!(messages[0].message_type(), MessageType::Error);
    assert!(messages[0].text.contains("TODOPILOT_SERVER_URL"));

    return Ok(());
}

#[tokio::test]
async fn it_reports_an_unreachable_endpoint_and_retries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut endpoint = FakeEndpoint::healthy(vec![]);
    endpoint.healthy = false;
    let conversation = Conversation::new(
        Box::new(endpoint),
        ModelId::Qwen15,
        store_with(&dir, vec![]).await?,
    );

    let res = conversation.connect().await;
    assert_eq!(
        res,
        Err(EndpointError::Unreachable {
            url: "http://127.0.0.1:3333".to_string()
        })
    );
    insta::assert_snapshot!(conversation.messages().await[0].text, @"Failed to connect to the model server. Can't reach model server at http://127.0.0.1:3333");

    let res = conversation.connect().await;
    assert!(res.is_err());
    assert_eq!(conversation.messages().await.len(), 2);

    return Ok(());
}

#[tokio::test]
async fn it_greets_once_after_repeated_connects() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let conversation = Conversation::new(
        Box::new(FakeEndpoint::healthy(vec![])),
        ModelId::Qwen15,
        store_with(&dir, vec![]).await?,
    );

    conversation.connect().await?;
    conversation.send("hello").await;
    conversation.connect().await?;

    assert_eq!(
        texts(&conversation).await,
        vec![(Author::Assistant, GREETING.to_string())]
    );

    return Ok(());
}

#[tokio::test]
async fn it_mentions_models_that_are_not_downloaded() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut endpoint = FakeEndpoint::healthy(vec![]);
    endpoint.models = vec![ModelInfo {
        id: "phi3".to_string(),
        label: "Phi-3 mini (IQ1_S)".to_string(),
        filename: "Phi-3-mini-4k-instruct-IQ1_S.gguf".to_string(),
        downloaded: false,
        size_bytes: None,
    }];
    let conversation = Conversation::new(
        Box::new(endpoint),
        ModelId::Phi3,
        store_with(&dir, vec![]).await?,
    );

    conversation.connect().await?;

    let messages = conversation.messages().await;
    assert_eq!(messages.len(), 2);
    insta::assert_snapshot!(messages[1].text, @"Phi-3 mini (IQ1_S) isn't downloaded on the server yet, so the first reply may take a while.");

    return Ok(());
}

#[tokio::test]
async fn it_applies_structured_replies() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let endpoint = FakeEndpoint::healthy(vec![Ok(
        r#"[{"action":"update","id":5,"completed":true},{"action":"add","title":"Eggs"}]"#
            .to_string(),
    )]);
    let requests = endpoint.requests.clone();
    let conversation = Conversation::new(
        Box::new(endpoint),
        ModelId::Qwen15Q4,
        store_with(
            &dir,
            vec![Todo::new(5, "X", CreatedBy::User).with_description("private")],
        )
        .await?,
    );
    conversation.connect().await?;

    let outcome = conversation.send("finish X and add eggs").await;

    assert_eq!(outcome, SendOutcome::Replied);
    assert_eq!(conversation.state(), SessionState::Idle);

    let todos = conversation.todos().await;
    assert_eq!(todos.len(), 2);
    assert!(todos[0].completed);
    assert_eq!(todos[1].title, "Eggs");
    assert_eq!(todos[1].created_by, CreatedBy::Assistant);

    let messages = texts(&conversation).await;
    assert_eq!(
        messages[1..],
        [
            (Author::User, "finish X and add eggs".to_string()),
            (
                Author::Assistant,
                "Done. Added 1, deleted 0, updated 1.".to_string()
            ),
        ]
    );

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, ModelId::Qwen15Q4);
    assert_eq!(requests[0].1, "finish X and add eggs");
    assert_eq!(
        requests[0].2,
        vec![TodoSnapshot {
            id: 5,
            title: "X".to_string(),
            completed: false,
        }]
    );

    return Ok(());
}

#[tokio::test]
async fn it_surfaces_server_errors() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let endpoint = FakeEndpoint::healthy(vec![Err(EndpointError::Server {
        message: "Unknown modelId: llama".to_string(),
    })]);
    let conversation = Conversation::new(
        Box::new(endpoint),
        ModelId::Qwen15,
        store_with(&dir, vec![]).await?,
    );
    conversation.connect().await?;

    let outcome = conversation.send("hello").await;

    assert_eq!(outcome, SendOutcome::Failed);
    assert_eq!(conversation.state(), SessionState::Idle);
    let messages = conversation.messages().await;
    let last = messages.last().unwrap();
    assert_eq!(last.text, "Server error: Unknown modelId: llama");
    assert_eq!(last.message_type(), MessageType::Error);

    return Ok(());
}

#[tokio::test]
async fn it_echoes_chat_replies() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let endpoint = FakeEndpoint::healthy(vec![
        Ok(r#"{"reply":"Hi there!"}"#.to_string()),
        Ok("{}".to_string()),
    ]);
    let conversation = Conversation::new(
        Box::new(endpoint),
        ModelId::Qwen15,
        store_with(&dir, vec![]).await?,
    );
    conversation.connect().await?;

    conversation.send("Hello").await;
    conversation.send("Hmm").await;

    let messages = texts(&conversation).await;
    assert_eq!(messages[2], (Author::Assistant, "Hi there!".to_string()));
    assert_eq!(
        messages[4],
        (
            Author::Assistant,
            "I'm sorry, I didn't understand that. Please try again.".to_string()
        )
    );
    assert!(conversation.todos().await.is_empty());

    return Ok(());
}

#[tokio::test]
async fn it_drops_sends_while_awaiting_a_reply() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = Arc::new(Notify::new());
    let mut endpoint =
        FakeEndpoint::healthy(vec![Ok(r#"{"action":"add","title":"Milk"}"#.to_string())]);
    endpoint.gate = Some(gate.clone());
    let requests = endpoint.requests.clone();
    let conversation = Conversation::new(
        Box::new(endpoint),
        ModelId::Qwen15,
        store_with(&dir, vec![]).await?,
    );
    conversation.connect().await?;

    let first = conversation.send("add milk");
    let second = async {
        while conversation.state() != SessionState::AwaitingReply {
            tokio::task::yield_now().await;
        }

        let outcome = conversation.send("add eggs").await;
        let user_messages = conversation
            .messages()
            .await
            .iter()
            .filter(|message| return message.author == Author::User)
            .count();

        gate.notify_one();
        return (outcome, user_messages);
    };

    let (first, (second, user_messages)) = tokio::join!(first, second);

    assert_eq!(first, SendOutcome::Replied);
    assert_eq!(second, SendOutcome::Dropped);
    assert_eq!(user_messages, 1);
    assert_eq!(requests.lock().unwrap().len(), 1);
    assert_eq!(conversation.state(), SessionState::Idle);

    let todos = conversation.todos().await;
    assert_eq!(todos.len(), 1);
    assert_eq!(todos[0].title, "Milk");

    return Ok(());
}

#[tokio::test]
async fn it_discards_replies_after_reset() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = Arc::new(Notify::new());
    let mut endpoint =
        FakeEndpoint::healthy(vec![Ok(r#"{"action":"add","title":"Milk"}"#.to_string())]);
    endpoint.gate = Some(gate.clone());
    let conversation = Conversation::new(
        Box::new(endpoint),
        ModelId::Qwen15,
        store_with(&dir, vec![]).await?,
    );
    conversation.connect().await?;

    let send = conversation.send("add milk");
    let reset = async {
        while conversation.state() != SessionState::AwaitingReply {
            tokio::task::yield_now().await;
        }

        conversation.reset().await;
        gate.notify_one();
    };

    let (outcome, _) = tokio::join!(send, reset);

    assert_eq!(outcome, SendOutcome::Discarded);
    assert!(conversation.messages().await.is_empty());
    assert!(conversation.todos().await.is_empty());
    assert_eq!(conversation.state(), SessionState::Idle);

    return Ok(());
}

#[tokio::test]
async fn it_falls_back_locally_when_offline() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let endpoint = FakeEndpoint::healthy(vec![]);
    let requests = endpoint.requests.clone();
    let conversation = Conversation::new(
        Box::new(endpoint),
        ModelId::Qwen15,
        store_with(&dir, vec![Todo::new(1, "Old", CreatedBy::User)]).await?,
    );

    let outcome = conversation.send("add milk and eggs").await;
    assert_eq!(outcome, SendOutcome::Offline);
    let titles = conversation
        .todos()
        .await
        .iter()
        .map(|todo| return todo.title.to_string())
        .collect::<Vec<String>>();
    assert_eq!(titles, vec!["Old", "milk", "eggs"]);

    let last_id = conversation.todos().await[2].id;
    conversation.send("delete the last one").await;
    assert_eq!(conversation.todos().await.len(), 2);

    let outcome = conversation.send("what's up?").await;
    assert_eq!(outcome, SendOutcome::Offline);

    let messages = texts(&conversation).await;
    assert_eq!(
        messages[1],
        (Author::Assistant, "Added 2 task(s).".to_string())
    );
    assert_eq!(
        messages[3],
        (Author::Assistant, format!("Deleted last task #{last_id}."))
    );
    insta::assert_snapshot!(messages[5].1, @"The model server isn't reachable right now. Retry the connection and try again.");
    assert!(requests.lock().unwrap().is_empty());

    return Ok(());
}

#[tokio::test]
async fn it_ignores_blank_messages() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let conversation = Conversation::new(
        Box::new(FakeEndpoint::healthy(vec![])),
        ModelId::Qwen15,
        store_with(&dir, vec![]).await?,
    );

    assert_eq!(conversation.send("   ").await, SendOutcome::Ignored);
    assert!(conversation.messages().await.is_empty());

    return Ok(());
}
