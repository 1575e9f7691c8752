mod commands;
mod config;
mod event_loop;
mod format;
mod keybindings;
mod logging;
mod renderer;
mod status_bar;
mod stream;
mod terminal;
mod tui;

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tq_api::LogStream;
use tq_protocol::{NewTask, Template, TemplateVariable};

use crate::config::ClientConfig;

#[derive(Parser)]
#[command(name = "tq", version, about = "Terminal client for the task queue")]
struct Cli {
    /// Task service base URL, e.g. http://127.0.0.1:8080
    #[arg(long, global = true, env = "TQ_SERVER")]
    server: Option<String>,

    /// Config file (default: ~/.config/tq/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a live terminal view of a task
    Attach {
        /// Task ID
        id: String,

        /// View-only mode (no input)
        #[arg(long)]
        view: bool,
    },

    /// Stream a task's output to stdout until it ends
    Tail {
        /// Task ID
        id: String,
    },

    /// List tasks
    List {
        /// Only tasks in this group
        #[arg(long)]
        group: Option<String>,
    },

    /// Show task details
    Show {
        /// Task ID
        id: String,
    },

    /// Queue a new task
    Add {
        /// Command line to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        #[arg(long)]
        label: Option<String>,

        #[arg(long)]
        group: Option<String>,

        /// Run the command in a pseudo-terminal
        #[arg(long)]
        pty: bool,

        /// Keep only the combined log, not separate stdout/stderr
        #[arg(long)]
        only_combined: bool,

        /// Refuse to start while another instance is running
        #[arg(long)]
        single_instance: bool,

        /// Start when the service boots
        #[arg(long)]
        start_on_boot: bool,
    },

    /// Queue a copy of an existing task
    Clone {
        /// Task ID
        id: String,
    },

    /// Set a task's label; omit the label to clear it
    Label {
        /// Task ID
        id: String,

        #[arg(default_value = "")]
        label: String,
    },

    /// List or edit task templates
    Templates {
        #[command(subcommand)]
        action: Option<TemplateCommands>,
    },

    /// Queue a task from a template
    Launch {
        /// Template ID or place
        template: String,

        /// Template variable, repeatable
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = commands::parse_variable)]
        vars: Vec<(String, String)>,

        /// Start the task right away
        #[arg(long)]
        run: bool,
    },

    /// Start a queued task
    Run {
        /// Task ID
        id: String,
    },

    /// Kill a running task
    Kill {
        /// Task ID
        id: String,
    },

    /// Send a signal to a running task
    Signal {
        /// Task ID
        id: String,

        /// Signal name, e.g. SIGINT or hup
        signal: String,
    },

    /// Write text to a task's stdin
    Send {
        /// Task ID
        id: String,

        data: String,
    },

    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },

    /// Print a task's captured log
    Log {
        /// Task ID
        id: String,

        #[arg(long, value_enum, default_value_t = StreamArg::Combined)]
        stream: StreamArg,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// List templates
    List,

    /// Create a template, or rewrite one with --prev-place
    Save {
        /// Folder for the template, e.g. ops/deploy
        place: String,

        /// Command line, may reference variables
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        #[arg(long)]
        name: Option<String>,

        /// Place of the template being rewritten
        #[arg(long)]
        prev_place: Option<String>,

        /// Variable with its default value, repeatable
        #[arg(long = "var", value_name = "KEY=DEFAULT", value_parser = commands::parse_variable)]
        vars: Vec<(String, String)>,

        #[arg(long)]
        label: Option<String>,

        #[arg(long)]
        group: Option<String>,

        #[arg(long)]
        pty: bool,

        #[arg(long)]
        only_combined: bool,

        #[arg(long)]
        single_instance: bool,

        #[arg(long)]
        start_on_boot: bool,
    },

    /// Delete a template
    Remove {
        place: String,
    },

    /// Move a template to another folder
    Move {
        from: String,
        to: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StreamArg {
    Combined,
    Stdout,
    Stderr,
}

impl From<StreamArg> for LogStream {
    fn from(arg: StreamArg) -> Self {
        match arg {
            StreamArg::Combined => LogStream::Combined,
            StreamArg::Stdout => LogStream::Stdout,
            StreamArg::Stderr => LogStream::Stderr,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(server) = cli.server {
        config.server = server;
    }
    if cli.log_file.is_some() {
        config.log_file = cli.log_file;
    }
    let interactive = matches!(cli.command, Commands::Attach { .. });
    logging::init(config.log_file.as_deref(), interactive)?;

    match cli.command {
        Commands::Attach { id, view } => commands::task_attach(&config, id, view).await,
        Commands::Tail { id } => commands::task_tail(&config, id).await,
        Commands::List { group } => commands::task_list(&config, group).await,
        Commands::Show { id } => commands::task_show(&config, id).await,
        Commands::Add {
            command,
            label,
            group,
            pty,
            only_combined,
            single_instance,
            start_on_boot,
        } => {
            let task = NewTask {
                command: command.join(" "),
                label: label.unwrap_or_default(),
                group: group.unwrap_or_default(),
                is_pty: pty,
                is_only_combined: only_combined,
                is_single_instance: single_instance,
                is_start_on_boot: start_on_boot,
                ..NewTask::default()
            };
            commands::task_add(&config, task).await
        }
        Commands::Clone { id } => commands::task_clone(&config, id).await,
        Commands::Label { id, label } => commands::task_label(&config, id, label).await,
        Commands::Templates { action } => match action.unwrap_or(TemplateCommands::List) {
            TemplateCommands::List => commands::template_list(&config).await,
            TemplateCommands::Save {
                place,
                command,
                name,
                prev_place,
                vars,
                label,
                group,
                pty,
                only_combined,
                single_instance,
                start_on_boot,
            } => {
                let template = Template {
                    place,
                    command: command.join(" "),
                    name: name.unwrap_or_default(),
                    variables: vars
                        .into_iter()
                        .map(|(key, default_value)| TemplateVariable {
                            name: key.clone(),
                            value: key,
                            default_value,
                        })
                        .collect(),
                    label: label.unwrap_or_default(),
                    group: group.unwrap_or_default(),
                    is_pty: pty,
                    is_only_combined: only_combined,
                    is_single_instance: single_instance,
                    is_start_on_boot: start_on_boot,
                    ..Template::default()
                };
                commands::template_save(&config, template, prev_place).await
            }
            TemplateCommands::Remove { place } => commands::template_remove(&config, place).await,
            TemplateCommands::Move { from, to } => commands::template_move(&config, from, to).await,
        },
        Commands::Launch {
            template,
            vars,
            run,
        } => {
            let values: BTreeMap<String, String> = vars.into_iter().collect();
            commands::template_launch(&config, template, values, run).await
        }
        Commands::Run { id } => commands::task_run(&config, id).await,
        Commands::Kill { id } => commands::task_kill(&config, id).await,
        Commands::Signal { id, signal } => commands::task_signal(&config, id, signal).await,
        Commands::Send { id, data } => commands::task_send(&config, id, data).await,
        Commands::Delete { id } => commands::task_delete(&config, id).await,
        Commands::Log { id, stream } => commands::task_log(&config, id, stream.into()).await,
    }
}
