use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::{Context, bail};
use tokio::sync::mpsc;
use tq_api::{ApiClient, LogStream};
use tq_protocol::{NewTask, Task, Template};
use tq_session::{SessionController, StatusBanner, TaskSnapshot, WsConnector};

use crate::config::ClientConfig;
use crate::event_loop;
use crate::format::{format_runtime, format_time, truncate};
use crate::stream::RawSurface;
use crate::terminal::{self, TerminalGuard};
use crate::tui::TuiSurface;

fn api_client(config: &ClientConfig) -> anyhow::Result<ApiClient> {
    Ok(ApiClient::new(config.server_url()?)?)
}

async fn fetch_task(api: &ApiClient, id: &str) -> anyhow::Result<Task> {
    api.task(id)
        .await
        .with_context(|| format!("failed to fetch task {id}"))
}

fn connector(config: &ClientConfig) -> anyhow::Result<WsConnector> {
    Ok(WsConnector::new(config.server_url()?, config.outbound_queue.max(1)))
}

/// Full-screen live view of a task.
pub async fn task_attach(config: &ClientConfig, id: String, view: bool) -> anyhow::Result<()> {
    let api = api_client(config)?;
    let task = fetch_task(&api, &id).await?;

    let surface = TuiSurface::new(io::stdout(), terminal::current_size(), task.display_name(), view);
    let (changed_tx, mut changed_rx) = mpsc::unbounded_channel();
    let session = SessionController::new(
        TaskSnapshot::from(&task),
        surface.clone(),
        connector(config)?,
        config.session_config(),
    )
    .on_task_changed(move |id| {
        let _ = changed_tx.send(id.to_string());
    });

    let guard = TerminalGuard::setup()?;
    let handle = tq_session::spawn(session, 64);
    let result = event_loop::run(&api, &handle, &surface, view).await;
    handle.shutdown().await;
    drop(guard);

    if let Ok(id) = changed_rx.try_recv() {
        match api.task(&id).await {
            Ok(task) => println!("detached from {id} ({})", task.state),
            Err(e) => tracing::warn!(task_id = %id, error = %e, "failed to refresh task"),
        }
    }
    result
}

/// Stream a task's output to stdout until the server closes the log.
pub async fn task_tail(config: &ClientConfig, id: String) -> anyhow::Result<()> {
    let api = api_client(config)?;
    let task = fetch_task(&api, &id).await?;

    let session = SessionController::new(
        TaskSnapshot::from(&task),
        RawSurface::new(io::stdout(), terminal::current_size()),
        connector(config)?,
        config.session_config(),
    );
    let handle = tq_session::spawn(session, 16);
    let mut status = handle.status();

    let ended = tokio::select! {
        ended = status.wait_for(|s| s.state.is_down() && !s.replaying_history) => {
            ended.ok().map(|s| s.clone())
        }
        _ = tokio::signal::ctrl_c() => None,
    };
    handle.shutdown().await;

    match ended.and_then(|s| s.banner()) {
        Some(StatusBanner::ConnectionLost) => bail!("lost connection to task {id}"),
        _ => Ok(()),
    }
}

/// List tasks.
pub async fn task_list(config: &ClientConfig, group: Option<String>) -> anyhow::Result<()> {
    let api = api_client(config)?;
    let mut tasks = api.tasks().await.context("failed to list tasks")?;
    if let Some(group) = &group {
        tasks.retain(|t| &t.group == group);
    }
    if tasks.is_empty() {
        println!("no tasks");
        return Ok(());
    }

    println!(
        "{:<36}  {:<9}  {:<19}  {:<8}  NAME",
        "ID", "STATE", "CREATED", "RUNTIME"
    );
    for task in &tasks {
        println!(
            "{:<36}  {:<9}  {:<19}  {:<8}  {}",
            task.id,
            task.state,
            format_time(task.created_at.as_ref()),
            format_runtime(task),
            truncate(task.display_name(), 48),
        );
    }
    Ok(())
}

/// Print one task.
pub async fn task_show(config: &ClientConfig, id: String) -> anyhow::Result<()> {
    let api = api_client(config)?;
    let task = fetch_task(&api, &id).await?;

    println!("ID:        {}", task.id);
    println!("Command:   {}", task.command);
    println!("Label:     {}", if task.label.is_empty() { "-" } else { &task.label });
    println!("Group:     {}", if task.group.is_empty() { "-" } else { &task.group });
    println!("State:     {}", task.state);
    println!("PTY:       {}", if task.is_pty { "yes" } else { "no" });
    if !task.template_place.is_empty() {
        println!("Template:  {}", task.template_place);
    }
    println!("Created:   {}", format_time(task.created_at.as_ref()));
    println!("Started:   {}", format_time(task.started_at.as_ref()));
    println!("Finished:  {}", format_time(task.finished_at.as_ref()));
    println!("Runtime:   {}", format_runtime(&task));
    if !task.error.is_empty() {
        println!("Error:     {}", task.error);
    }
    for link in &task.links {
        let title = if link.title.is_empty() { &link.name } else { &link.title };
        println!("Link:      {title} <{}>", link.url);
    }
    Ok(())
}

/// Queue a task and print its id.
pub async fn task_add(config: &ClientConfig, task: NewTask) -> anyhow::Result<()> {
    if task.command.trim().is_empty() {
        bail!("command must not be empty");
    }
    let api = api_client(config)?;
    let id = api.add(&task).await.context("failed to add task")?;
    println!("{id}");
    Ok(())
}

pub async fn task_clone(config: &ClientConfig, id: String) -> anyhow::Result<()> {
    let api = api_client(config)?;
    let new_id = api
        .clone_task(&id)
        .await
        .with_context(|| format!("failed to clone task {id}"))?;
    println!("{new_id}");
    Ok(())
}

pub async fn task_label(config: &ClientConfig, id: String, label: String) -> anyhow::Result<()> {
    let api = api_client(config)?;
    api.set_label(&id, label.trim())
        .await
        .with_context(|| format!("failed to label task {id}"))?;
    Ok(())
}

pub async fn task_run(config: &ClientConfig, id: String) -> anyhow::Result<()> {
    let api = api_client(config)?;
    api.run(&id)
        .await
        .with_context(|| format!("failed to start task {id}"))?;
    println!("task {id} started");
    Ok(())
}

pub async fn task_kill(config: &ClientConfig, id: String) -> anyhow::Result<()> {
    let api = api_client(config)?;
    api.kill(&id)
        .await
        .with_context(|| format!("failed to kill task {id}"))?;
    println!("task {id} killed");
    Ok(())
}

pub async fn task_signal(config: &ClientConfig, id: String, signal: String) -> anyhow::Result<()> {
    let signal = normalize_signal(&signal);
    let api = api_client(config)?;
    api.signal(&id, &signal)
        .await
        .with_context(|| format!("failed to send {signal} to task {id}"))?;
    println!("sent {signal} to task {id}");
    Ok(())
}

/// Write `data` to the task's stdin.
pub async fn task_send(config: &ClientConfig, id: String, data: String) -> anyhow::Result<()> {
    let api = api_client(config)?;
    api.send(&id, &data)
        .await
        .with_context(|| format!("failed to send input to task {id}"))?;
    Ok(())
}

pub async fn task_delete(config: &ClientConfig, id: String) -> anyhow::Result<()> {
    let api = api_client(config)?;
    api.delete(&id)
        .await
        .with_context(|| format!("failed to delete task {id}"))?;
    println!("task {id} deleted");
    Ok(())
}

/// Dump a task's captured log to stdout.
pub async fn task_log(config: &ClientConfig, id: String, stream: LogStream) -> anyhow::Result<()> {
    let api = api_client(config)?;
    let log = api
        .log(&id, stream)
        .await
        .with_context(|| format!("failed to download log of task {id}"))?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&log)?;
    stdout.flush()?;
    Ok(())
}

pub async fn template_list(config: &ClientConfig) -> anyhow::Result<()> {
    let api = api_client(config)?;
    let mut templates = api.templates().await.context("failed to list templates")?;
    if templates.is_empty() {
        println!("no templates");
        return Ok(());
    }
    templates.sort_by(|a, b| a.place.cmp(&b.place));

    println!("{:<28}  {:<20}  {:<24}  COMMAND", "PLACE", "NAME", "VARIABLES");
    for template in &templates {
        let variables = template
            .variables
            .iter()
            .map(|v| v.value.as_str())
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<28}  {:<20}  {:<24}  {}",
            truncate(&template.place, 28),
            truncate(template.display_name(), 20),
            truncate(&variables, 24),
            truncate(&template.command, 48),
        );
    }
    Ok(())
}

pub async fn template_save(
    config: &ClientConfig,
    template: Template,
    prev_place: Option<String>,
) -> anyhow::Result<()> {
    if template.command.trim().is_empty() {
        bail!("command must not be empty");
    }
    let api = api_client(config)?;
    api.set_template(&template, prev_place.as_deref())
        .await
        .with_context(|| format!("failed to save template {}", template.place))?;
    println!("template {} saved", template.place);
    Ok(())
}

pub async fn template_remove(config: &ClientConfig, place: String) -> anyhow::Result<()> {
    let api = api_client(config)?;
    api.remove_template(&place)
        .await
        .with_context(|| format!("failed to remove template {place}"))?;
    println!("template {place} removed");
    Ok(())
}

pub async fn template_move(config: &ClientConfig, from: String, to: String) -> anyhow::Result<()> {
    let api = api_client(config)?;
    api.move_template(&from, &to)
        .await
        .with_context(|| format!("failed to move template {from} to {to}"))?;
    println!("template {from} moved to {to}");
    Ok(())
}

/// Queue a task from the template whose id or place is `key` and print its id.
pub async fn template_launch(
    config: &ClientConfig,
    key: String,
    values: BTreeMap<String, String>,
    run: bool,
) -> anyhow::Result<()> {
    let api = api_client(config)?;
    let templates = api.templates().await.context("failed to list templates")?;
    let Some(template) = templates.iter().find(|t| t.matches(&key)) else {
        bail!("template {key} not found");
    };
    let unknown = template.unknown_variables(&values);
    if !unknown.is_empty() {
        bail!(
            "template {} has no variable {}",
            template.display_name(),
            unknown.join(", ")
        );
    }

    let task = NewTask {
        is_run: run,
        ..template.new_task(&values)
    };
    let id = api
        .add(&task)
        .await
        .with_context(|| format!("failed to launch template {key}"))?;
    tracing::info!(task_id = %id, template = %template.place, "launched template");
    println!("{id}");
    Ok(())
}

/// Parse `KEY=VALUE`; the value may be empty or contain `=`.
pub fn parse_variable(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{arg}`")),
    }
}

/// `int`, `INT` and `SIGINT` all mean `SIGINT`.
fn normalize_signal(signal: &str) -> String {
    let upper = signal.trim().to_ascii_uppercase();
    if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{upper}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_names() {
        assert_eq!(normalize_signal("int"), "SIGINT");
        assert_eq!(normalize_signal("SIGTERM"), "SIGTERM");
        assert_eq!(normalize_signal(" hup "), "SIGHUP");
    }

    #[test]
    fn variable_arguments() {
        assert_eq!(
            parse_variable("TAG=v1=rc"),
            Ok(("TAG".to_string(), "v1=rc".to_string()))
        );
        assert_eq!(parse_variable("EMPTY="), Ok(("EMPTY".to_string(), String::new())));
        assert!(parse_variable("=x").is_err());
        assert!(parse_variable("TAG").is_err());
    }
}
