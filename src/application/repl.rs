#[cfg(test)]
#[path = "repl_test.rs"]
mod tests;

use std::str::FromStr;

use anyhow::Result;
use strum::IntoEnumIterator;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use yansi::Paint;

use crate::domain::models::Author;
use crate::domain::models::Message;
use crate::domain::models::MessageType;
use crate::domain::models::ModelId;
use crate::domain::models::ModelInfo;
use crate::domain::models::SlashCommand;
use crate::domain::models::Todo;
use crate::domain::services::Conversation;
use crate::domain::services::SendOutcome;

pub fn help_text() -> String {
    let text = r#"
COMMANDS:
- /todos (/t) - Lists your todos.
- /models (/ml) - Lists the models the server can run, and whether they are downloaded.
- /model (/m) [MODEL_NAME,MODEL_INDEX] - Switches the active model. You can pass either the model name, or the index from /models.
- /retry (/r) - Checks the model server connection again.
- /reset - Clears the chat history.
- /quit /exit (/q) - Exit Todopilot.
- /help (/h) - Provides this help menu.

Anything else is sent to the assistant, e.g. "add buy milk and call mom" or "delete the last task".
        "#;

    return text.trim().to_string();
}

pub fn format_todos(todos: &[Todo]) -> String {
    if todos.is_empty() {
        return "There are no todos yet. Ask me to add one!".to_string();
    }

    return todos
        .iter()
        .map(|todo| {
            let check = if todo.completed { "x" } else { " " };
            let mut line = format!("- [{check}] ({}) {}", todo.id, todo.title);
            if let Some(description) = &todo.description {
                line = format!("{line}: {description}");
            }
            return line;
        })
        .collect::<Vec<String>>()
        .join("\n");
}

pub fn format_models(models: &[ModelInfo], active: ModelId) -> String {
    if models.is_empty() {
        return "The model server didn't report any models.".to_string();
    }

    let active = active.to_string();
    return models
        .iter()
        .enumerate()
        .map(|(idx, model)| {
            let n = idx + 1;
            let mut line = format!("- ({n}) {} [{}]", model.label, model.id);
            if !model.downloaded {
                line = format!("{line}, not downloaded");
            }
            if model.id == active {
                line = format!("{line} (active)");
            }
            return line;
        })
        .collect::<Vec<String>>()
        .join("\n");
}

/// Resolves a model by name or by its one based index in the catalogue.
pub fn resolve_model(name: &str) -> Option<ModelId> {
    if let Ok(idx) = name.parse::<usize>() {
        if idx < 1 {
            return None;
        }
        return ModelId::iter().nth(idx - 1);
    }

    return ModelId::from_str(&name.to_lowercase()).ok();
}

fn format_message(message: &Message) -> String {
    let text = format!("{}: {}", message.author.to_string(), message.text);
    if message.message_type() == MessageType::Error {
        return Paint::red(text).to_string();
    }

    return text;
}

/// Line oriented chat over stdin and stdout.
pub struct Repl {
    conversation: Conversation,
    printed: usize,
}

impl Repl {
    pub fn new(conversation: Conversation) -> Repl {
        return Repl {
            conversation,
            printed: 0,
        };
    }

    pub async fn start(&mut self) -> Result<()> {
        let _ = self.conversation.connect().await;
        self.print_new().await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            prompt().await?;
            let line = match lines.next_line().await? {
                Some(line) => line,
                None => break,
            };

            if !self.handle(&line).await? {
                break;
            }
            self.print_new().await?;
        }

        return Ok(());
    }

    /// Handles a line of input. Returns false once the user asks to leave.
    async fn handle(&mut self, line: &str) -> Result<bool> {
        let cmd = match SlashCommand::parse(line) {
            Some(cmd) => cmd,
            None => {
                let outcome = self.conversation.send(line).await;
                tracing::debug!(outcome = ?outcome, "Message handled");
                if outcome == SendOutcome::Dropped {
                    print_line("Still waiting on the last reply.").await?;
                }
                return Ok(true);
            }
        };

        if cmd.is_quit() {
            return Ok(false);
        }

        if cmd.is_help() {
            print_line(&help_text()).await?;
        } else if cmd.is_todo_list() {
            print_line(&format_todos(&self.conversation.todos().await)).await?;
        } else if cmd.is_model_list() {
            match self.conversation.models().await {
                Ok(models) => {
                    print_line(&format_models(&models, self.conversation.model())).await?;
                }
                Err(err) => {
                    print_line(&Paint::red(format!("Unable to list models. {err}")).to_string())
                        .await?;
                }
            }
        } else if cmd.is_model_set() {
            self.set_model(&cmd.args.join(" ")).await?;
        } else if cmd.is_retry() {
            let _ = self.conversation.connect().await;
        } else if cmd.is_reset() {
            self.conversation.reset().await;
            self.printed = 0;
            print_line("Chat cleared.").await?;
        }

        return Ok(true);
    }

    async fn set_model(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            let model = self.conversation.model();
            print_line(&format!("Active model is {} [{model}].", model.label())).await?;
            return Ok(());
        }

        match resolve_model(name) {
            Some(model) => {
                self.conversation.set_model(model);
                print_line(&format!("Switched to {} [{model}].", model.label())).await?;
            }
            None => {
                let names = ModelId::iter()
                    .map(|model| return model.to_string())
                    .collect::<Vec<String>>()
                    .join(", ");
                let msg = format!("{name} is not a known model. Possible values are: {names}");
                print_line(&Paint::red(msg).to_string()).await?;
            }
        }

        return Ok(());
    }

    async fn print_new(&mut self) -> Result<()> {
        let messages = self.conversation.messages().await;
        for message in messages.iter().skip(self.printed) {
            if message.author == Author::User {
                continue;
            }
            print_line(&format_message(message)).await?;
        }
        self.printed = messages.len();

        return Ok(());
    }
}

async fn prompt() -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(b"> ").await?;
    stdout.flush().await?;
    return Ok(());
}

async fn print_line(text: &str) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{text}\n").as_bytes()).await?;
    stdout.flush().await?;
    return Ok(());
}
