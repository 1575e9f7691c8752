pub mod frame;
pub mod paths;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

/// Unique identifier for a task.
pub type TaskId = String;

/// Lifecycle state reported by the task service.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Idle,
    Started,
    Finished,
    Error,
    Canceled,
}

impl TaskState {
    /// The task ran and will not produce more output.
    pub fn is_complete(self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Error | TaskState::Canceled
        )
    }

    pub fn is_running(self) -> bool {
        self == TaskState::Started
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Idle => "IDLE",
            TaskState::Started => "STARTED",
            TaskState::Finished => "FINISHED",
            TaskState::Error => "ERROR",
            TaskState::Canceled => "CANCELED",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task as returned by `/api/task` and `/api/tasks`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub command: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub is_pty: bool,
    /// Template the task was launched from, empty for ad-hoc tasks.
    #[serde(default)]
    pub template_place: String,
    pub state: TaskState,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub links: Vec<TaskLink>,
}

impl Task {
    /// Label if set, otherwise the command line.
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.command
        } else {
            &self.label
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskLink {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Body of `POST /api/add`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub command: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub is_pty: bool,
    #[serde(default)]
    pub is_only_combined: bool,
    #[serde(default)]
    pub is_single_instance: bool,
    #[serde(default)]
    pub is_start_on_boot: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub template_place: String,
    /// Template variable values keyed by placeholder.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    /// Start the task right after it is queued.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_run: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVariable {
    /// Human readable prompt.
    pub name: String,
    /// Placeholder the value is bound to.
    pub value: String,
    #[serde(default)]
    pub default_value: String,
}

/// A saved task recipe, as listed by `/api/templates`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// `/`-separated folder under the service's template root.
    #[serde(default)]
    pub place: String,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: Vec<TemplateVariable>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub is_pty: bool,
    #[serde(default)]
    pub is_only_combined: bool,
    #[serde(default)]
    pub is_single_instance: bool,
    #[serde(default)]
    pub is_start_on_boot: bool,
}

impl Template {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.place
        } else {
            &self.name
        }
    }

    /// `key` is the template's id or its place.
    pub fn matches(&self, key: &str) -> bool {
        (!self.id.is_empty() && self.id == key) || self.place == key
    }

    /// Keys in `values` that name none of the template's placeholders.
    pub fn unknown_variables<'a>(&self, values: &'a BTreeMap<String, String>) -> Vec<&'a str> {
        values
            .keys()
            .filter(|key| !self.variables.iter().any(|v| &v.value == *key))
            .map(String::as_str)
            .collect()
    }

    /// Request that queues this template. Placeholders missing from
    /// `values` take their default.
    pub fn new_task(&self, values: &BTreeMap<String, String>) -> NewTask {
        let variables = self
            .variables
            .iter()
            .map(|v| {
                let value = values.get(&v.value).unwrap_or(&v.default_value);
                (v.value.clone(), value.clone())
            })
            .collect();
        NewTask {
            command: self.command.clone(),
            label: self.label.clone(),
            group: self.group.clone(),
            is_pty: self.is_pty,
            is_only_combined: self.is_only_combined,
            is_single_instance: self.is_single_instance,
            is_start_on_boot: self.is_start_on_boot,
            template_place: self.place.clone(),
            variables,
            is_run: false,
        }
    }
}

/// Terminal geometry sent with a resize frame.
///
/// `x`/`y` are the viewport size in pixels.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtyScreenSize {
    pub x: u32,
    pub y: u32,
    pub cols: u16,
    pub rows: u16,
}

/// Every JSON response from the task service is `{"result": ..}` or `{"error": ".."}`.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ApiEnvelope<T> {
    Error { error: String },
    Result { result: T },
}

impl<T> ApiEnvelope<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            ApiEnvelope::Result { result } => Ok(result),
            ApiEnvelope::Error { error } => Err(error),
        }
    }
}

#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("unsupported server scheme: {0}")]
    UnsupportedScheme(String),
}

/// Socket URL for a task's live log: `ws(s)://<host>/ws?id=<task_id>`.
///
/// `server` is the HTTP base of the task service; `https` maps to `wss`.
pub fn socket_url(server: &Url, task_id: &str) -> Result<Url, EndpointError> {
    let scheme = match server.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };
    let mut url = server.clone();
    url.set_scheme(scheme)
        .map_err(|()| EndpointError::UnsupportedScheme(server.scheme().to_string()))?;
    url.set_path("/ws");
    url.set_query(None);
    url.set_fragment(None);
    url.query_pairs_mut().append_pair("id", task_id);
    Ok(url)
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}
