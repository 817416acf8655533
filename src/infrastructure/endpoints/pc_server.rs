#[cfg(test)]
#[path = "pc_server_test.rs"]
mod tests;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::base_url;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::CompletionPrompt;
use crate::domain::models::Endpoint;
use crate::domain::models::EndpointError;
use crate::domain::models::ModelInfo;
use crate::domain::models::TodoSnapshot;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    ok: serde_json::Value,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest {
    model_id: String,
    user_msg: String,
    todos: Vec<TodoSnapshot>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ModelListResponse {
    pub models: Vec<ModelInfo>,
}

fn parse_millis(value: &str, fallback: u64) -> Duration {
    return Duration::from_millis(value.parse::<u64>().unwrap_or(fallback));
}

/// Client for the companion model server that runs on a workstation.
pub struct PcServer {
    url: Option<String>,
    health_check_timeout: Duration,
    completion_timeout: Duration,
}

impl Default for PcServer {
    fn default() -> PcServer {
        return PcServer {
            url: base_url::resolve_from_config(),
            health_check_timeout: parse_millis(&Config::get(ConfigKey::HealthCheckTimeout), 1500),
            completion_timeout: parse_millis(&Config::get(ConfigKey::CompletionTimeout), 120_000),
        };
    }
}

impl PcServer {
    fn url(&self) -> Result<&str, EndpointError> {
        return self.url.as_deref().ok_or(EndpointError::Unset);
    }

    fn unreachable(&self, err: reqwest::Error) -> EndpointError {
        tracing::error!(error = ?err, "Model server request failed");
        return EndpointError::Unreachable {
            url: self.url.clone().unwrap_or_default(),
        };
    }

    /// Decodes a JSON body. Error statuses carry `{ "error": "..." }`.
    async fn decode<T: DeserializeOwned>(&self, res: reqwest::Response) -> Result<T, EndpointError> {
        let status = res.status();
        let body = res.text().await.map_err(|err| return self.unreachable(err))?;
        tracing::debug!(status = status.as_u16(), body, "Model server response");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|res| return res.error)
                .unwrap_or_else(|| return fallback_error(status));
            return Err(EndpointError::Server { message });
        }

        return serde_json::from_str::<T>(&body).map_err(|err| {
            tracing::error!(error = ?err, "Malformed model server response");
            return EndpointError::Server {
                message: format!("Malformed response from model server: {err}"),
            };
        });
    }
}

fn fallback_error(status: StatusCode) -> String {
    return format!("Model server responded with status {}", status.as_u16());
}

#[async_trait]
impl Endpoint for PcServer {
    fn base_url(&self) -> Option<String> {
        return self.url.clone();
    }

    async fn health_check(&self) -> bool {
        let url = match self.url() {
            Ok(url) => url,
            Err(_) => return false,
        };

        let res = reqwest::Client::new()
            .get(format!("{url}/health"))
            .timeout(self.health_check_timeout)
            .send()
            .await;

        let res = match res {
            Ok(res) => res,
            Err(err) => {
                tracing::warn!(error = ?err, url, "Model server is not running");
                return false;
            }
        };

        if res.status() != StatusCode::OK {
            tracing::warn!(status = res.status().as_u16(), "Model server health check failed");
            return false;
        }

        match res.json::<HealthResponse>().await {
            Ok(body) => return body.ok == serde_json::Value::Bool(true),
            Err(err) => {
                tracing::warn!(error = ?err, "Model server health check returned a bad body");
                return false;
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, EndpointError> {
        let url = self.url()?;
        let res = reqwest::Client::new()
            .get(format!("{url}/models"))
            .timeout(self.health_check_timeout)
            .send()
            .await
            .map_err(|err| return self.unreachable(err))?;

        let list: ModelListResponse = self.decode(res).await?;
        return Ok(list.models);
    }

    async fn get_completion(&self, prompt: CompletionPrompt) -> Result<String, EndpointError> {
        let url = self.url()?;
        let req = CompletionRequest {
            model_id: prompt.model.to_string(),
            user_msg: prompt.user_message,
            todos: prompt.todos,
        };
        tracing::debug!(body = ?req, "Completion request");

        let res = reqwest::Client::new()
            .post(format!("{url}/todo"))
            .timeout(self.completion_timeout)
            .json(&req)
            .send()
            .await
            .map_err(|err| return self.unreachable(err))?;

        let completion: CompletionResponse = self.decode(res).await?;
        return Ok(completion.text.unwrap_or_default());
    }
}
