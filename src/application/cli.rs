use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use yansi::Paint;

use super::repl::format_models;
use super::repl::format_todos;
use super::repl::help_text;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::CreatedBy;
use crate::domain::models::EndpointError;
use crate::domain::models::ModelId;
use crate::domain::models::Todo;
use crate::domain::models::TodoId;
use crate::domain::services::TodoPatch;
use crate::domain::services::TodoStore;
use crate::infrastructure::endpoints::EndpointManager;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    let name = cmd.get_name().to_string();
    generate(gen, cmd, name, &mut io::stdout());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn active_model() -> Result<ModelId> {
    let name = Config::get(ConfigKey::Model);
    return name
        .parse::<ModelId>()
        .map_err(|_| return anyhow::anyhow!("Unknown model '{name}'"));
}

async fn print_health() -> Result<()> {
    let endpoint = EndpointManager::get();
    let url = match endpoint.base_url() {
        Some(url) => url,
        None => return Err(EndpointError::Unset.into()),
    };

    if !endpoint.health_check().await {
        bail!(format!("Can't reach model server at {url}"));
    }

    println!("Model server at {url} is ready.");
    return Ok(());
}

async fn print_models() -> Result<()> {
    let models = EndpointManager::get().list_models().await?;
    println!("{}", format_models(&models, active_model()?));
    return Ok(());
}

fn todo_id(matches: &ArgMatches) -> Result<TodoId> {
    return match matches.get_one::<TodoId>("id") {
        Some(id) => Ok(*id),
        None => bail!("A todo id is required"),
    };
}

async fn run_todos(matches: &ArgMatches) -> Result<()> {
    let mut store = TodoStore::from_config().await;

    match matches.subcommand() {
        Some(("add", add_matches)) => {
            let title = add_matches
                .get_many::<String>("title")
                .map(|words| return words.cloned().collect::<Vec<String>>().join(" "))
                .unwrap_or_default();

            let mut todo = Todo::new(store.unused_id(), title.trim(), CreatedBy::User);
            if let Some(description) = add_matches.get_one::<String>("description") {
                todo = todo.with_description(description);
            }

            let id = todo.id;
            store.add(todo).await?;
            println!("Added todo {id}");
        }
        Some(("delete", delete_matches)) => {
            let id = todo_id(delete_matches)?;
            if !store.delete(id).await {
                bail!(format!("No todo with id {id}"));
            }
            println!("Deleted todo {id}");
        }
        Some(("complete", complete_matches)) => {
            let id = todo_id(complete_matches)?;
            let completed = !complete_matches.get_flag("undo");
            let patch = TodoPatch {
                completed: Some(completed),
                ..Default::default()
            };
            if !store.update(id, patch).await {
                bail!(format!("No todo with id {id}"));
            }
            println!("Updated todo {id}");
        }
        _ => {
            println!("{}", format_todos(store.list()));
        }
    }

    return Ok(());
}

fn arg_todo_id() -> Arg {
    return Arg::new("id")
        .help("Todo ID")
        .value_parser(value_parser!(TodoId))
        .required(true);
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_todos() -> Command {
    return Command::new("todos")
        .about("Manage todos without the assistant.")
        .subcommand(Command::new("list").about("List all todos with their ids."))
        .subcommand(
            Command::new("add")
                .about("Add a todo.")
                .arg(
                    Arg::new("title")
                        .help("Title of the todo")
                        .num_args(1..)
                        .required(true),
                )
                .arg(
                    Arg::new("description")
                        .short('d')
                        .long("description")
                        .help("Optional longer description")
                        .num_args(1),
                ),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a todo by ID.")
                .arg(arg_todo_id()),
        )
        .subcommand(
            Command::new("complete")
                .about("Mark a todo as completed by ID.")
                .arg(arg_todo_id())
                .arg(
                    Arg::new("undo")
                        .long("undo")
                        .help("Mark the todo as not completed instead.")
                        .action(ArgAction::SetTrue),
                ),
        );
}

pub fn build() -> Command {
    let commands_text = help_text()
        .split('\n')
        .map(|line| {
            if line.starts_with('-') {
                return format!("  {line}");
            }
            if line.starts_with("COMMANDS:") {
                return Paint::new(format!("CHAT {line}"))
                    .underline()
                    .bold()
                    .to_string();
            }
            return line.to_string();
        })
        .collect::<Vec<String>>()
        .join("\n");

    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("todopilot")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(commands_text)
        .arg_required_else_help(false)
        .subcommand(Command::new("chat").about("Start a chat with the assistant. This is the default."))
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(Command::new("health").about("Checks whether the model server is reachable."))
        .subcommand(Command::new("models").about("Lists the models the model server can run."))
        .subcommand(subcommand_todos())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("TODOPILOT_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(
            Arg::new(ConfigKey::ServerURL.to_string())
                .short('u')
                .long(ConfigKey::ServerURL.to_string())
                .env("TODOPILOT_SERVER_URL")
                .num_args(1)
                .help("Model server URL. Takes precedence over dev-host.")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::DevHost.to_string())
                .long(ConfigKey::DevHost.to_string())
                .env("TODOPILOT_DEV_HOST")
                .num_args(1)
                .help("Address of the development host, used to infer the model server URL when server-url is unset.")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::Model.to_string())
                .short('m')
                .long(ConfigKey::Model.to_string())
                .env("TODOPILOT_MODEL")
                .num_args(1)
                .help(format!("The model the server should use for completions. [default: {}]", Config::default(ConfigKey::Model)))
                .value_parser(PossibleValuesParser::new(ModelId::VARIANTS))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::HealthCheckTimeout.to_string())
                .long(ConfigKey::HealthCheckTimeout.to_string())
                .env("TODOPILOT_HEALTH_CHECK_TIMEOUT")
                .num_args(1)
                .help(format!("Time to wait in milliseconds before timing out a model server health check. [default: {}]", Config::default(ConfigKey::HealthCheckTimeout)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::CompletionTimeout.to_string())
                .long(ConfigKey::CompletionTimeout.to_string())
                .env("TODOPILOT_COMPLETION_TIMEOUT")
                .num_args(1)
                .help(format!("Time to wait in milliseconds for a completion from the model server. [default: {}]", Config::default(ConfigKey::CompletionTimeout)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::StoreFile.to_string())
                .long(ConfigKey::StoreFile.to_string())
                .env("TODOPILOT_STORE_FILE")
                .num_args(1)
                .help(format!("Path to the JSON file todos are saved in. [default: {}]", Config::default(ConfigKey::StoreFile)))
                .global(true),
        );
}

/// Parses arguments and runs one shot commands. Returns true when the chat
/// should start.
pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
            return Ok(false);
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("health", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            print_health().await?;
            return Ok(false);
        }
        Some(("models", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            print_models().await?;
            return Ok(false);
        }
        Some(("todos", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
            run_todos(subcmd_matches).await?;
            return Ok(false);
        }
        Some(("chat", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
        }
        _ => {
            Config::load(build(), vec![&matches]).await?;
        }
    }

    return Ok(true);
}

/// The model chosen by configuration, falling back to the default.
pub fn configured_model() -> ModelId {
    return active_model().unwrap_or_else(|err| {
        tracing::warn!(error = ?err, "Falling back to the default model");
        return ModelId::default();
    });
}
