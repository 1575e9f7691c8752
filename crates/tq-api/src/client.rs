use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use tq_protocol::{ApiEnvelope, NewTask, Task, TaskId, Template};

use crate::error::{ApiError, ApiResult};

/// Which captured output of a task to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogStream {
    #[default]
    Combined,
    Stdout,
    Stderr,
}

impl LogStream {
    fn path(self) -> &'static str {
        match self {
            LogStream::Combined => "/api/task/combined",
            LogStream::Stdout => "/api/task/stdout",
            LogStream::Stderr => "/api/task/stderr",
        }
    }
}

/// HTTP client for the task service.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: Url) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tq/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        Ok(self.base.join(path)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> ApiResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let response = self.http.get(url).query(query).send().await?;
        read_envelope(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        read_envelope(response).await
    }

    pub async fn tasks(&self) -> ApiResult<Vec<Task>> {
        self.get("/api/tasks", &[]).await
    }

    pub async fn task(&self, id: &str) -> ApiResult<Task> {
        self.get("/api/task", &[("id", id)]).await
    }

    /// Queue a new task and return its id.
    pub async fn add(&self, task: &NewTask) -> ApiResult<TaskId> {
        self.post("/api/add", task).await
    }

    /// Queue a copy of an existing task and return the new id.
    pub async fn clone_task(&self, id: &str) -> ApiResult<TaskId> {
        self.post("/api/clone", &json!({ "id": id })).await
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        self.post::<_, Value>("/api/delete", &json!({ "id": id }))
            .await
            .map(drop)
    }

    pub async fn run(&self, id: &str) -> ApiResult<()> {
        self.post::<_, Value>("/api/task/run", &json!({ "id": id }))
            .await
            .map(drop)
    }

    pub async fn kill(&self, id: &str) -> ApiResult<()> {
        self.post::<_, Value>("/api/task/kill", &json!({ "id": id }))
            .await
            .map(drop)
    }

    /// Deliver a signal by name, e.g. `SIGINT`.
    pub async fn signal(&self, id: &str, signal: &str) -> ApiResult<()> {
        self.post::<_, Value>("/api/task/signal", &json!({ "id": id, "signal": signal }))
            .await
            .map(drop)
    }

    /// Write `data` to the task's stdin.
    pub async fn send(&self, id: &str, data: &str) -> ApiResult<()> {
        self.post::<_, Value>("/api/task/send", &json!({ "id": id, "data": data }))
            .await
            .map(drop)
    }

    /// An empty label clears it.
    pub async fn set_label(&self, id: &str, label: &str) -> ApiResult<()> {
        self.post::<_, Value>("/api/task/setLabel", &json!({ "id": id, "label": label }))
            .await
            .map(drop)
    }

    pub async fn templates(&self) -> ApiResult<Vec<Template>> {
        self.get("/api/templates", &[]).await
    }

    /// Create a template, or rewrite the one stored at `prev_place`.
    pub async fn set_template(&self, template: &Template, prev_place: Option<&str>) -> ApiResult<()> {
        let mut body = json!({ "template": template });
        if let Some(prev_place) = prev_place {
            body["prevPlace"] = json!(prev_place);
        }
        self.post::<_, Value>("/api/templates/set", &body)
            .await
            .map(drop)
    }

    pub async fn remove_template(&self, place: &str) -> ApiResult<()> {
        self.post::<_, Value>("/api/templates/remove", &json!({ "place": place }))
            .await
            .map(drop)
    }

    /// Move a template folder. The target must not exist or be empty.
    pub async fn move_template(&self, from: &str, to: &str) -> ApiResult<()> {
        self.post::<_, Value>("/api/templates/move", &json!({ "from": from, "to": to }))
            .await
            .map(drop)
    }

    /// Raw captured output. Not wrapped in an envelope.
    pub async fn log(&self, id: &str, stream: LogStream) -> ApiResult<Vec<u8>> {
        let url = self.endpoint(stream.path())?;
        debug!(%url, "GET");
        let response = self.http.get(url).query(&[("id", id)]).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            if let Ok(envelope) = serde_json::from_slice::<ApiEnvelope<Value>>(&body) {
                if let Err(message) = envelope.into_result() {
                    return Err(ApiError::Api { message });
                }
            }
            return Err(ApiError::Http { status });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// `{"error"}` wins over the HTTP status; a non-2xx without one is an HTTP
/// error; otherwise `result` must decode as `T`.
async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();
    let body = response.bytes().await?;
    let envelope = serde_json::from_slice::<ApiEnvelope<Value>>(&body).ok();

    let result = match envelope {
        Some(envelope) => match envelope.into_result() {
            Ok(result) => result,
            Err(message) => return Err(ApiError::Api { message }),
        },
        None if !status.is_success() => return Err(ApiError::Http { status }),
        None => {
            return Err(ApiError::Decode {
                message: "response has neither result nor error".to_string(),
            });
        }
    };
    if !status.is_success() {
        return Err(ApiError::Http { status });
    }
    serde_json::from_value(result).map_err(|e| ApiError::Decode {
        message: e.to_string(),
    })
}
