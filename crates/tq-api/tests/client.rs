use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tq_api::{ApiClient, ApiError, LogStream};
use tq_protocol::{NewTask, TaskState, Template, TemplateVariable};
use url::Url;

type Calls = Arc<Mutex<Vec<(&'static str, Value)>>>;

fn task_json(id: &str, state: &str) -> Value {
    json!({
        "id": id,
        "command": "sleep 10",
        "label": "",
        "group": "",
        "isPty": false,
        "state": state,
        "error": "",
        "createdAt": "2024-05-01T12:00:00Z",
        "startedAt": null,
        "finishedAt": null,
        "links": []
    })
}

async fn list(_: State<Calls>) -> Json<Value> {
    Json(json!({ "result": [task_json("t1", "STARTED"), task_json("t2", "FINISHED")] }))
}

async fn one(Query(q): Query<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    match q.get("id").map(String::as_str) {
        Some("t1") => (StatusCode::OK, Json(json!({ "result": task_json("t1", "IDLE") }))),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "task not found" })),
        ),
    }
}

fn recorder(name: &'static str, reply: Value) -> axum::routing::MethodRouter<Calls> {
    post(move |State(calls): State<Calls>, Json(body): Json<Value>| {
        let reply = reply.clone();
        async move {
            calls.lock().unwrap().push((name, body));
            Json(reply)
        }
    })
}

async fn templates() -> Json<Value> {
    Json(json!({ "result": [
        {
            "place": "ops/deploy",
            "command": "deploy.sh $TARGET",
            "name": "Deploy",
            "id": "tpl-1",
            "variables": [{ "name": "Target", "value": "TARGET", "defaultValue": "staging" }],
            "label": "",
            "group": "ops",
            "isPty": true,
            "isOnlyCombined": false,
            "isSingleInstance": true,
            "isStartOnBoot": false
        },
        { "place": "misc/backup", "command": "backup", "variables": null }
    ]}))
}

async fn combined(Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    match q.get("id").map(String::as_str) {
        Some("t1") => (StatusCode::OK, "line one\nline two\n").into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_server() -> Result<(ApiClient, Calls)> {
    let calls: Calls = Arc::default();
    let app = Router::new()
        .route("/api/tasks", get(list))
        .route("/api/task", get(one))
        .route("/api/add", recorder("add", json!({ "result": "t9" })))
        .route("/api/delete", recorder("delete", json!({ "result": "ok" })))
        .route("/api/task/run", recorder("run", json!({ "result": "ok" })))
        .route("/api/task/kill", recorder("kill", json!({ "error": "task is not running" })))
        .route("/api/task/signal", recorder("signal", json!({ "result": "ok" })))
        .route("/api/task/send", recorder("send", json!({ "result": null })))
        .route("/api/task/combined", get(combined))
        .route("/api/task/stdout", get(|| async { StatusCode::BAD_GATEWAY }))
        .route("/api/clone", recorder("clone", json!({ "result": "t10" })))
        .route("/api/task/setLabel", recorder("label", json!({ "result": "ok" })))
        .route("/api/templates", get(templates))
        .route("/api/templates/set", recorder("set", json!({ "result": "ok" })))
        .route(
            "/api/templates/remove",
            recorder("remove", json!({ "error": "template_not_found" })),
        )
        .route("/api/templates/move", recorder("move", json!({ "result": "ok" })))
        .with_state(calls.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let client = ApiClient::new(Url::parse(&format!("http://{addr}"))?)?;
    Ok((client, calls))
}

#[tokio::test]
async fn lists_and_fetches_tasks() -> Result<()> {
    let (client, _) = spawn_server().await?;

    let tasks = client.tasks().await?;
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].state, TaskState::Started);
    assert!(tasks[1].state.is_complete());

    let task = client.task("t1").await?;
    assert_eq!(task.id, "t1");
    assert_eq!(task.state, TaskState::Idle);
    Ok(())
}

#[tokio::test]
async fn error_body_wins_over_status() -> Result<()> {
    let (client, _) = spawn_server().await?;
    match client.task("missing").await {
        Err(ApiError::Api { message }) => assert_eq!(message, "task not found"),
        other => panic!("expected api error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn actions_post_expected_bodies() -> Result<()> {
    let (client, calls) = spawn_server().await?;

    let id = client
        .add(&NewTask {
            command: "make".to_string(),
            is_pty: true,
            ..NewTask::default()
        })
        .await?;
    assert_eq!(id, "t9");
    client.run("t9").await?;
    client.signal("t9", "SIGINT").await?;
    client.send("t9", "y\n").await?;
    client.delete("t9").await?;

    let kill = client.kill("t9").await;
    assert!(matches!(kill, Err(ApiError::Api { ref message }) if message == "task is not running"));

    let calls = calls.lock().unwrap().clone();
    let names: Vec<&str> = calls.iter().map(|(n, _)| *n).collect();
    assert_eq!(names, ["add", "run", "signal", "send", "delete", "kill"]);
    assert_eq!(calls[0].1["command"], "make");
    assert_eq!(calls[0].1["isPty"], true);
    assert_eq!(calls[1].1, json!({ "id": "t9" }));
    assert_eq!(calls[2].1, json!({ "id": "t9", "signal": "SIGINT" }));
    assert_eq!(calls[3].1, json!({ "id": "t9", "data": "y\n" }));
    Ok(())
}

#[tokio::test]
async fn downloads_raw_log() -> Result<()> {
    let (client, _) = spawn_server().await?;
    let log = client.log("t1", LogStream::Combined).await?;
    assert_eq!(log, b"line one\nline two\n");

    match client.log("nope", LogStream::Combined).await {
        Err(ApiError::Http { status }) => assert_eq!(status.as_u16(), 404),
        other => panic!("expected http error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn status_without_envelope_is_http_error() -> Result<()> {
    let (client, _) = spawn_server().await?;
    let err = client.log("t1", LogStream::Stdout).await.unwrap_err();
    assert!(matches!(err, ApiError::Http { status } if status.as_u16() == 502));
    assert!(err.is_transient());
    Ok(())
}

#[tokio::test]
async fn unreachable_server_is_transport_error() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let client = ApiClient::new(Url::parse(&format!("http://{addr}"))?)?;
    let err = client.tasks().await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
    assert!(err.is_transient());
    Ok(())
}

#[tokio::test]
async fn clones_and_labels_tasks() -> Result<()> {
    let (client, calls) = spawn_server().await?;

    assert_eq!(client.clone_task("t1").await?, "t10");
    client.set_label("t10", "nightly").await?;
    client.set_label("t10", "").await?;

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls[0], ("clone", json!({ "id": "t1" })));
    assert_eq!(calls[1], ("label", json!({ "id": "t10", "label": "nightly" })));
    assert_eq!(calls[2], ("label", json!({ "id": "t10", "label": "" })));
    Ok(())
}

#[tokio::test]
async fn lists_templates() -> Result<()> {
    let (client, _) = spawn_server().await?;

    let templates = client.templates().await?;
    assert_eq!(templates.len(), 2);
    let deploy = &templates[0];
    assert!(deploy.matches("tpl-1"));
    assert!(deploy.is_pty && deploy.is_single_instance);
    assert_eq!(deploy.variables[0].default_value, "staging");
    assert_eq!(templates[1].display_name(), "misc/backup");
    assert!(templates[1].variables.is_empty());
    Ok(())
}

#[tokio::test]
async fn template_changes_post_expected_bodies() -> Result<()> {
    let (client, calls) = spawn_server().await?;

    let template = Template {
        place: "ops/build".to_string(),
        command: "make $TARGET".to_string(),
        name: "Build".to_string(),
        variables: vec![TemplateVariable {
            name: "Target".to_string(),
            value: "TARGET".to_string(),
            default_value: "all".to_string(),
        }],
        ..Template::default()
    };
    client.set_template(&template, None).await?;
    client.set_template(&template, Some("ops/old-build")).await?;
    client.move_template("ops/build", "ci/build").await?;
    let removed = client.remove_template("ci/missing").await;
    assert!(
        matches!(removed, Err(ApiError::Api { ref message }) if message == "template_not_found")
    );

    let calls = calls.lock().unwrap().clone();
    let names: Vec<&str> = calls.iter().map(|(n, _)| *n).collect();
    assert_eq!(names, ["set", "set", "move", "remove"]);
    assert_eq!(calls[0].1["template"]["place"], "ops/build");
    assert_eq!(calls[0].1["template"]["variables"][0]["defaultValue"], "all");
    assert!(calls[0].1.get("prevPlace").is_none());
    assert_eq!(calls[1].1["prevPlace"], "ops/old-build");
    assert_eq!(calls[2].1, json!({ "from": "ops/build", "to": "ci/build" }));
    assert_eq!(calls[3].1, json!({ "place": "ci/missing" }));
    Ok(())
}
