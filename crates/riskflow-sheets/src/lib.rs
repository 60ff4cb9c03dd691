use std::env;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use riskflow_config::{BackendConfig, BackendProviderKind, ensure_workspace_config};
use riskflow_core::{ChecklistRecord, FieldPayload};
use riskflow_store::{
    CHECKLIST_CACHE_SLOT, CacheError, FetchError, MemoryRecordStore, RecordStore, SnapshotCache,
    UpdateError, decode_records,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const SHEETS_STORE_NAME: &str = "sheets";

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("backend endpoint is not configured")]
    MissingEndpoint,
    #[error("missing sheet API key in {0}")]
    MissingApiKey(String),
    #[error("config load failed: {0}")]
    Config(#[from] riskflow_config::ConfigError),
    #[error("http client setup failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Shared key the sheet script checks on every call. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_env(name: &str) -> Result<Self, SheetsError> {
        env::var(name)
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .map(Self)
            .ok_or_else(|| SheetsError::MissingApiKey(name.to_owned()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Checklist backend served by a spreadsheet web app.
///
/// Reads are `GET <endpoint>?action=read&sheet=..&key=..`; writes are a JSON
/// `POST` with `action: "updateFields"`. Both answer with an
/// `{ ok, data, error, message }` envelope, and `ok: false` fails the call
/// whatever the HTTP status says.
#[derive(Debug, Clone)]
pub struct SheetsRecordStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: ApiKey,
}

impl SheetsRecordStore {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: ApiKey,
        timeout: Duration,
    ) -> Result<Self, SheetsError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, SheetsError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or(SheetsError::MissingEndpoint)?;
        let api_key = ApiKey::from_env(&config.api_key_env)?;

        Self::new(
            endpoint,
            api_key,
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RecordStore for SheetsRecordStore {
    async fn fetch_all(&self, sheet: &str) -> Result<Vec<ChecklistRecord>, FetchError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("action", "read"),
                ("sheet", sheet),
                ("key", self.api_key.expose()),
            ])
            .send()
            .await
            .map_err(|err| FetchError::Transport(redacted(err)))?;

        let status = response.status();
        let envelope = match response.json::<Envelope>().await {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => return Err(FetchError::Decode(redacted(err))),
            Err(_) => return Err(FetchError::Transport(format!("HTTP {status}"))),
        };

        if !envelope.ok {
            return Err(FetchError::Remote(envelope.failure_message("read")));
        }

        let Value::Array(rows) = envelope.data else {
            tracing::warn!(sheet, "read response data is not an array; treating as empty");
            return Ok(Vec::new());
        };

        let records = decode_records(&rows);
        tracing::info!(sheet, rows = rows.len(), records = records.len(), "fetched checklist");
        Ok(records)
    }

    async fn update_fields(
        &self,
        sheet: &str,
        key: &str,
        fields: &FieldPayload,
    ) -> Result<(), UpdateError> {
        let request = UpdateFieldsRequest {
            action: "updateFields",
            sheet,
            key: self.api_key.expose(),
            code: key,
            fields,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| UpdateError::Transport(redacted(err)))?;

        let status = response.status();
        let envelope = match response.json::<Envelope>().await {
            Ok(envelope) => envelope,
            Err(err) if status.is_success() => {
                return Err(UpdateError::Remote(format!(
                    "malformed response: {}",
                    redacted(err)
                )));
            }
            Err(_) => return Err(UpdateError::Transport(format!("HTTP {status}"))),
        };

        if !envelope.ok {
            return Err(UpdateError::from_remote_message(
                envelope.failure_message("updateFields"),
            ));
        }

        Ok(())
    }

    fn store_name(&self) -> &str {
        SHEETS_STORE_NAME
    }
}

#[derive(Debug, Serialize)]
struct UpdateFieldsRequest<'a> {
    action: &'static str,
    sheet: &'a str,
    key: &'a str,
    code: &'a str,
    fields: &'a FieldPayload,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    message: Value,
}

impl Envelope {
    /// `error`, then `message`, then a generic text naming the operation.
    fn failure_message(&self, operation: &str) -> String {
        [&self.error, &self.message]
            .into_iter()
            .find_map(message_text)
            .unwrap_or_else(|| format!("{operation} failed"))
    }
}

/// Read URLs carry the API key in their query string.
fn redacted(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

pub struct LoadedRecordStore {
    pub store: Arc<dyn RecordStore>,
    pub store_name: String,
    pub sheet: String,
}

/// Builds the backend named in `.riskflow/config.toml`, writing a default
/// config first when none exists.
///
/// The `memory` provider starts from the workspace's cached snapshot, so
/// offline runs see the last fetched checklist.
pub fn load_record_store_from_config(
    workspace_root: impl AsRef<Path>,
) -> Result<LoadedRecordStore, SheetsError> {
    let workspace_root = workspace_root.as_ref();
    let config = ensure_workspace_config(workspace_root)?;
    let sheet = config.backend.sheet.clone();

    match config.backend.provider {
        BackendProviderKind::Http => {
            let store = SheetsRecordStore::from_config(&config.backend)?;
            Ok(LoadedRecordStore {
                store: Arc::new(store),
                store_name: BackendProviderKind::Http.as_str().to_owned(),
                sheet,
            })
        }
        BackendProviderKind::Memory => {
            let seed = SnapshotCache::open(workspace_root)?
                .load(CHECKLIST_CACHE_SLOT)?
                .unwrap_or_default();
            tracing::info!(records = seed.len(), "using in-memory backend");
            Ok(LoadedRecordStore {
                store: Arc::new(MemoryRecordStore::with_records(sheet.clone(), seed)),
                store_name: BackendProviderKind::Memory.as_str().to_owned(),
                sheet,
            })
        }
    }
}
