#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::env;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::Arg;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

use crate::domain::models::ModelId;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    CompletionTimeout,
    ConfigFile,
    DevHost,
    HealthCheckTimeout,
    Model,
    ServerURL,
    StoreFile,
}

fn app_dir(base: Option<path::PathBuf>) -> path::PathBuf {
    return base.unwrap_or_else(env::temp_dir).join("todopilot");
}

fn find_arg(cmd: &Command, key: ConfigKey) -> Option<&Arg> {
    let name = key.to_string();
    return cmd
        .get_arguments()
        .find(|arg| return arg.get_long() == Some(name.as_str()));
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    pub fn default(key: ConfigKey) -> String {
        return match key {
            ConfigKey::CompletionTimeout => "120000".to_string(),
            ConfigKey::DevHost => "".to_string(),
            ConfigKey::HealthCheckTimeout => "1500".to_string(),
            ConfigKey::Model => ModelId::default().to_string(),
            ConfigKey::ServerURL => "".to_string(),

            // Paths
            ConfigKey::ConfigFile => app_dir(dirs::config_dir())
                .join("config.toml")
                .to_string_lossy()
                .to_string(),
            ConfigKey::StoreFile => app_dir(dirs::cache_dir())
                .join("todos.json")
                .to_string_lossy()
                .to_string(),
        };
    }

    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                if key == ConfigKey::ConfigFile {
                    continue;
                }

                let val = match doc.get(&key.to_string()) {
                    Some(val) => val,
                    None => continue,
                };

                // Use clap value parsers to do validation.
                let possible_values = find_arg(&cmd, key)
                    .map(|arg| {
                        return arg
                            .get_possible_values()
                            .iter()
                            .map(|e| return e.get_name().to_string())
                            .collect::<Vec<String>>();
                    })
                    .unwrap_or_default();

                if let Some(val_int) = val.as_integer() {
                    Config::set(key, &val_int.to_string());
                } else if let Some(val_str) = val.as_str() {
                    if val_str.is_empty() {
                        continue;
                    }
                    if !possible_values.is_empty() && !possible_values.contains(&val_str.to_string())
                    {
                        bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nPossible values are: {}", possible_values.join(", ")));
                    }
                    Config::set(key, val_str);
                } else {
                    bail!(format!("config.toml has an invalid type for key '{key}'"));
                }
            }
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::set(key, val)
                }
            }
        }

        tracing::debug!(
            server_url = Config::get(ConfigKey::ServerURL),
            dev_host = Config::get(ConfigKey::DevHost),
            model = Config::get(ConfigKey::Model),
            store_file = Config::get(ConfigKey::StoreFile),
            "config"
        );

        return Ok(());
    }

    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let arg = find_arg(&cmd, key)?;
                let mut description = arg
                    .get_help()
                    .map(|help| return help.to_string())
                    .unwrap_or_default();

                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                if !arg.get_possible_values().is_empty() {
                    let possible_values = arg
                        .get_possible_values()
                        .iter()
                        .map(|e| return e.get_name())
                        .collect::<Vec<_>>()
                        .join(", ");
                    description = format!("{description} [possible values: {possible_values}]");
                }

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i64>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}
