use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::credentials::CredentialError;
use super::credentials::TokenProvider;
use super::descriptor::ItemId;

/// Snapshot of an item's director variables, keyed by variable name
pub type ItemAttributes = BTreeMap<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum DirectorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Director returned {status} for {url}: {body}")]
    Status {
        status: StatusCode,
        url: String,
        body: String,
    },

    #[error("Failed to decode director response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Director credentials unavailable: {0}")]
    Credentials(#[from] CredentialError),
}

/// One variable of a director item
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemVariable {
    pub var_name: String,

    #[serde(default)]
    pub value: Value,
}

/// Body of `POST /api/v1/items/{id}/commands`
#[derive(Debug, Serialize)]
struct CommandRequest<'a> {
    #[serde(rename = "async")]
    is_async: bool,
    command: &'a str,
    #[serde(rename = "tParams")]
    params: Value,
}

/// Operations c4hearth needs from a Control4 director
///
/// This trait allows for mocking the director for testing purposes
#[async_trait]
pub trait DirectorApi: Send + Sync {
    /// List every item of a category, as loosely typed JSON
    async fn get_items_by_category(&self, category: &str) -> Result<Vec<Value>, DirectorError>;

    /// Fetch the variables of a single item
    async fn get_item_variables(
        &self,
        item_id: &ItemId,
    ) -> Result<Vec<ItemVariable>, DirectorError>;

    /// Send a command with parameters to an item
    async fn send_item_command(
        &self,
        item_id: &ItemId,
        command: &str,
        params: Value,
    ) -> Result<(), DirectorError>;
}

/// Builds director handles bound to the current credentials.
///
/// Every call must produce a handle that uses the token valid *now*; callers
/// build one per operation instead of keeping one around.
pub trait DirectorConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn DirectorApi>, DirectorError>;
}

/// Director REST client for a single token
pub struct Director {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl Director {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, token: String) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn check_status(
        response: reqwest::Response,
        url: String,
    ) -> Result<reqwest::Response, DirectorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(DirectorError::Status { status, url, body })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DirectorError> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        let response = Self::check_status(response, url).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl DirectorApi for Director {
    async fn get_items_by_category(&self, category: &str) -> Result<Vec<Value>, DirectorError> {
        self.get_json(&format!("/categories/{}", category)).await
    }

    async fn get_item_variables(
        &self,
        item_id: &ItemId,
    ) -> Result<Vec<ItemVariable>, DirectorError> {
        self.get_json(&format!("/items/{}/variables", item_id)).await
    }

    async fn send_item_command(
        &self,
        item_id: &ItemId,
        command: &str,
        params: Value,
    ) -> Result<(), DirectorError> {
        let url = self.url(&format!("/items/{}/commands", item_id));
        debug!("POST {} command={}", url, command);

        let body = CommandRequest {
            is_async: true,
            command,
            params,
        };
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::check_status(response, url).await?;
        Ok(())
    }
}

/// Connector for a real director reachable over HTTP(S)
pub struct HttpDirectorConnector {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpDirectorConnector {
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, DirectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            tokens,
        })
    }
}

impl DirectorConnector for HttpDirectorConnector {
    fn connect(&self) -> Result<Box<dyn DirectorApi>, DirectorError> {
        let token = self.tokens.bearer_token()?;
        Ok(Box::new(Director::new(
            self.client.clone(),
            self.base_url.clone(),
            token,
        )))
    }
}

/// List the items of a category.
pub async fn get_items_of_category(
    director: &dyn DirectorApi,
    category: &str,
) -> Result<Vec<Value>, DirectorError> {
    director.get_items_by_category(category).await
}

/// Fetch an item's variables as a name -> value map.
///
/// If the director reports a variable twice, the later value wins.
pub async fn director_get_entry_variables(
    director: &dyn DirectorApi,
    item_id: &ItemId,
) -> Result<ItemAttributes, DirectorError> {
    let variables = director.get_item_variables(item_id).await?;
    Ok(variables
        .into_iter()
        .map(|variable| (variable.var_name, variable.value))
        .collect())
}

/// A director call recorded by [`MockDirector`]
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum DirectorCall {
    ItemsByCategory(String),
    ItemVariables(ItemId),
    Command {
        item_id: ItemId,
        command: String,
        params: Value,
    },
}

/// Mock director for testing
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MockDirector {
    pub items: Vec<Value>,
    pub variables: std::collections::HashMap<ItemId, Vec<ItemVariable>>,
    pub fail_variables: bool,
    pub fail_commands: bool,
    pub calls: Arc<std::sync::Mutex<Vec<DirectorCall>>>,
}

#[cfg(test)]
impl MockDirector {
    pub fn with_items(items: Vec<Value>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<DirectorCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: DirectorCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(url: &str) -> DirectorError {
        DirectorError::Status {
            status: StatusCode::UNAUTHORIZED,
            url: url.to_string(),
            body: "token expired".to_string(),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl DirectorApi for MockDirector {
    async fn get_items_by_category(&self, category: &str) -> Result<Vec<Value>, DirectorError> {
        self.record(DirectorCall::ItemsByCategory(category.to_string()));
        Ok(self.items.clone())
    }

    async fn get_item_variables(
        &self,
        item_id: &ItemId,
    ) -> Result<Vec<ItemVariable>, DirectorError> {
        self.record(DirectorCall::ItemVariables(item_id.clone()));
        if self.fail_variables {
            return Err(Self::failure("/variables"));
        }
        Ok(self.variables.get(item_id).cloned().unwrap_or_default())
    }

    async fn send_item_command(
        &self,
        item_id: &ItemId,
        command: &str,
        params: Value,
    ) -> Result<(), DirectorError> {
        self.record(DirectorCall::Command {
            item_id: item_id.clone(),
            command: command.to_string(),
            params,
        });
        if self.fail_commands {
            return Err(Self::failure("/commands"));
        }
        Ok(())
    }
}

/// Mock connector that counts how many handles were built
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockConnector {
    pub director: MockDirector,
    pub connections: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockConnector {
    pub fn new(director: MockDirector) -> Self {
        Self {
            director,
            connections: Default::default(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl DirectorConnector for MockConnector {
    fn connect(&self) -> Result<Box<dyn DirectorApi>, DirectorError> {
        self.connections
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(Box::new(self.director.clone()))
    }
}
