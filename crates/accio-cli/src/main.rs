//! accio CLI: terminal dashboard for runs, workflows and jobs on an Accio gateway.

mod render;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use accio::client::api::WORKFLOWS_PER_PAGE;
use accio::client::thunks::{self, GetJob};
use accio::format::progress_percent;
use accio::models::{RunMetadataPatch, RunQuery};
use accio::status::node_has_logs;
use accio::store::Store;
use accio::{
    describe_node, describe_run, views, Classifier, Client, ClientConfig, FailureNotice, LoadState,
    LogTarget, Pending,
};

#[derive(Parser)]
#[command(
    name = "accio",
    about = "Browse and monitor runs, workflows and jobs on an Accio gateway",
    version,
    author
)]
struct Cli {
    /// Gateway base URL
    #[arg(long, global = true, env = "ACCIO_SERVER")]
    server: Option<String>,
    /// Configuration file (default: ~/.config/accio/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the access token
    Login {
        #[arg(long, env = "ACCIO_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Forget the stored access token
    Logout,
    /// Check whether the stored token is accepted
    Whoami,
    /// List runs
    Runs {
        /// Free-text search
        #[arg(long, short)]
        query: Option<String>,
        #[arg(long, short, default_value_t = 1)]
        page: u32,
        /// Only children of this run
        #[arg(long)]
        parent: Option<String>,
        /// Only runs of this workflow
        #[arg(long)]
        workflow: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show a run with its parameters, nodes and children
    Run {
        id: String,
        /// Print the raw JSON export instead
        #[arg(long)]
        json: bool,
    },
    /// Follow a run until it completes
    Watch {
        id: String,
        /// Polling interval in seconds
        #[arg(long, short)]
        interval: Option<u64>,
    },
    /// Print the logs of a node
    Logs {
        id: String,
        node: String,
        /// Read stderr instead of stdout
        #[arg(long)]
        stderr: bool,
        /// Keep printing new lines until the run completes
        #[arg(long, short)]
        follow: bool,
        /// Download the whole log file here
        #[arg(long, short, conflicts_with = "follow")]
        output: Option<PathBuf>,
    },
    /// Show artifacts and metrics produced by a node
    Outputs { id: String, node: String },
    /// Edit the name, notes or tags of a run
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        notes: Option<String>,
        /// Comma-separated tags; replaces the current ones
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
    },
    /// Kill a run
    Kill {
        id: String,
        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Show a workflow and its latest runs
    Workflow {
        id: String,
        #[arg(long)]
        version: Option<String>,
        /// Print the node graph
        #[arg(long)]
        graph: bool,
    },
    /// List workflows
    Workflows {
        /// Free-text search
        #[arg(long, short)]
        query: Option<String>,
        #[arg(long, short, default_value_t = 1)]
        page: u32,
    },
    /// List available operators
    Operators,
    /// List jobs
    Jobs {
        #[arg(long, short, default_value_t = 1)]
        page: u32,
        /// Label selector, e.g. team=ml,env!=dev
        #[arg(long, short)]
        labels: Option<String>,
    },
    /// Show a job and its state history
    Job { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config, cli.server)?;
    let client = Client::new(&config)?;

    match cli.command {
        Commands::Login { password } => cmd_login(&client, password).await?,
        Commands::Logout => {
            client.logout()?;
            println!("Logged out.");
        }
        Commands::Whoami => cmd_whoami(&client).await?,
        Commands::Runs {
            query,
            page,
            parent,
            workflow,
            owner,
        } => {
            let query = RunQuery {
                page,
                per_page: config.runs_per_page,
                q: query,
                parent,
                workflow,
                owner,
            };
            cmd_runs(&client, query).await?;
        }
        Commands::Run { id, json } => cmd_run(&client, id, json).await?,
        Commands::Watch { id, interval } => {
            let period = interval.map(Duration::from_secs).unwrap_or(config.poll_interval);
            cmd_watch(&client, id, period).await?;
        }
        Commands::Logs {
            id,
            node,
            stderr,
            follow,
            output,
        } => {
            let classifier = if stderr { Classifier::Stderr } else { Classifier::Stdout };
            match output {
                Some(path) => cmd_download_logs(&client, &id, &node, classifier, path).await?,
                None => cmd_logs(&client, id, node, classifier, follow, config.poll_interval).await?,
            }
        }
        Commands::Outputs { id, node } => cmd_outputs(&client, id, node).await?,
        Commands::Edit {
            id,
            name,
            notes,
            tags,
        } => cmd_edit(&client, &id, RunMetadataPatch { name, notes, tags }).await?,
        Commands::Kill { id, yes } => cmd_kill(&client, &id, yes).await?,
        Commands::Workflow { id, version, graph } => cmd_workflow(&client, id, version, graph).await?,
        Commands::Workflows { query, page } => {
            let list = settle(client.list_workflows(query.as_deref(), page), "workflows").await?;
            if list.results.is_empty() {
                println!("No workflows found.");
            } else {
                println!("{}", render::workflows_table(&list.results));
                println!(
                    "{}",
                    render::pagination(page, list.total_count, WORKFLOWS_PER_PAGE)
                );
            }
        }
        Commands::Operators => {
            let operators = settle(client.list_operators(), "operators").await?;
            println!("{}", render::operators_table(&operators));
        }
        Commands::Jobs { page, labels } => cmd_jobs(&client, page, labels).await?,
        Commands::Job { name } => cmd_job(&client, &name).await?,
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>, server: Option<String>) -> Result<ClientConfig> {
    let config = match path.or_else(ClientConfig::default_path) {
        Some(path) => ClientConfig::load(&path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    Ok(config.with_env_overrides().with_overrides(server, None))
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn notice_error(notice: &FailureNotice) -> anyhow::Error {
    match notice.status {
        Some(status) => anyhow::anyhow!("{} (HTTP {status})", notice.message),
        None => anyhow::anyhow!("{}", notice.message),
    }
}

/// Awaits a one-shot request, turning a failure into the generic notice.
async fn settle<T: Send + 'static>(pending: Pending<T>, what: &str) -> Result<T> {
    match pending.await {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => {
            tracing::debug!(error = %e, "request failed");
            Err(notice_error(&e.notice(what)))
        }
        None => bail!("request for {what} was cancelled"),
    }
}

fn loaded<T>(state: LoadState<T>) -> Result<T> {
    match state {
        LoadState::Loaded(data) => Ok(data),
        LoadState::Failed(notice) => Err(notice_error(&notice)),
        other => bail!("view stopped while {}", other.name()),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

// ─── Command implementations ──────────────────────────────────────────────────

async fn cmd_login(client: &Client, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            print!("Password: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line.trim_end_matches(['\r', '\n']).to_string()
        }
    };
    if settle(client.authenticate(&password), "authentication").await? {
        println!("✓ Logged in to {}", client.base_url());
        Ok(())
    } else {
        bail!("Invalid password")
    }
}

async fn cmd_whoami(client: &Client) -> Result<()> {
    let authenticated = settle(client.check_authenticated(), "authentication").await?;
    let token = if client.tokens().load().is_some() { "stored" } else { "none" };
    println!("Gateway: {}", client.base_url());
    println!("Token:   {token} ({})", client.tokens().path().display());
    println!("Status:  {}", if authenticated { "authenticated" } else { "anonymous" });
    Ok(())
}

async fn cmd_runs(client: &Client, query: RunQuery) -> Result<()> {
    let per_page = query.per_page;
    let page = query.page;
    let view = views::run_list(client, query);
    let list = loaded(view.settled().await)?;

    if list.results.is_empty() {
        println!("No runs found.");
        return Ok(());
    }
    println!("{}", render::runs_table(&list.results, Utc::now()));
    println!("{}", render::pagination(page, list.total_count, per_page));
    Ok(())
}

async fn cmd_run(client: &Client, id: String, json: bool) -> Result<()> {
    if json {
        let bytes = settle(client.download_run(&id), "run").await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let view = views::run_view(client, id.clone());
    let detail = loaded(view.settled().await)?;
    let now = Utc::now();
    let run = &detail.run;

    println!("{}", render::run_summary(&detail, now));
    if !run.params.is_empty() {
        println!("{}", render::params_table(run));
    }
    let nodes = run.state.nodes_by_start();
    if !nodes.is_empty() {
        println!("{}", render::nodes_table(&nodes, now));
        print!("{}", render::node_errors(&nodes));
    }
    if run.has_children() {
        let children = views::children(client, id);
        let runs = loaded(children.settled().await)?;
        println!("── Child runs ({}) ──", runs.len());
        println!("{}", render::children_table(&runs, now));
    }
    Ok(())
}

async fn cmd_watch(client: &Client, id: String, period: Duration) -> Result<()> {
    let watch = views::run_watch(client, id, period);
    let mut changes = watch.changes();

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{prefix} [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );

    loop {
        let state = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                bar.abandon_with_message("interrupted");
                break;
            }
            state = changes.next() => match state {
                Some(state) => state,
                None => break,
            },
        };
        match state {
            LoadState::Loaded(run) => {
                let display = describe_run(&run.state, Utc::now());
                bar.set_prefix(run.display_name());
                bar.set_position(progress_percent(run.state.progress) as u64);
                bar.set_message(format!(
                    "{}  {}",
                    render::status_cell(&display),
                    display.duration_text()
                ));
                if run.state.is_completed() {
                    bar.finish();
                    let nodes = run.state.nodes_by_start();
                    println!("{}", render::nodes_table(&nodes, Utc::now()));
                    print!("{}", render::node_errors(&nodes));
                    break;
                }
            }
            LoadState::Failed(notice) => bar.println(notice_error(&notice).to_string()),
            LoadState::Idle | LoadState::Loading => {}
        }
    }
    watch.unmount().await;
    Ok(())
}

async fn cmd_logs(
    client: &Client,
    id: String,
    node: String,
    classifier: Classifier,
    follow: bool,
    period: Duration,
) -> Result<()> {
    let run = settle(client.get_run(&id), "run").await?;
    let Some(state) = run.state.node(&node) else {
        bail!("Run {id} has no node named {node}");
    };
    if !node_has_logs(state) {
        bail!("Node {node} has no logs ({})", describe_node(state, Utc::now()).label);
    }

    let mut target = LogTarget {
        run_id: id.clone(),
        node,
        classifier,
        stream: follow,
    };
    target.stream = follow && target.is_live(&run);
    let mut tail = views::log_tail(client, target.clone(), period);
    if !target.stream {
        for line in loaded(tail.settled().await)? {
            println!("{}", render::log_line(&line));
        }
        return Ok(());
    }

    let status = views::run_watch(client, id, period);
    let mut lines_rx = tail.subscribe();
    let mut status_rx = status.subscribe();
    let mut printed = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = lines_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = lines_rx.borrow_and_update().clone();
                match state {
                    LoadState::Loaded(lines) => {
                        for line in lines.iter().skip(printed) {
                            println!("{}", render::log_line(line));
                        }
                        printed = printed.max(lines.len());
                        if !tail.identity().stream {
                            break;
                        }
                    }
                    LoadState::Failed(notice) => eprintln!("{}", notice_error(&notice)),
                    LoadState::Idle | LoadState::Loading => {}
                }
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    continue;
                }
                let finished = status_rx
                    .borrow_and_update()
                    .data()
                    .is_some_and(|run| !target.is_live(run));
                if finished && tail.identity().stream {
                    tail.set_identity(LogTarget { stream: false, ..target.clone() });
                }
            }
        }
    }
    status.unmount().await;
    tail.unmount().await;
    Ok(())
}

async fn cmd_download_logs(
    client: &Client,
    id: &str,
    node: &str,
    classifier: Classifier,
    path: PathBuf,
) -> Result<()> {
    let bytes = settle(client.download_logs(id, node, classifier), "logs").await?;
    std::fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;
    println!("Saved {} bytes of {classifier} to {}", bytes.len(), path.display());
    Ok(())
}

async fn cmd_outputs(client: &Client, id: String, node: String) -> Result<()> {
    let view = views::node_outputs(client, id, node);
    let outputs = loaded(view.settled().await)?;
    if outputs.artifacts.is_empty() && outputs.metrics.is_empty() {
        println!("No outputs.");
        return Ok(());
    }
    if !outputs.artifacts.is_empty() {
        println!("{}", render::artifacts_table(&outputs.artifacts));
    }
    if !outputs.metrics.is_empty() {
        println!("{}", render::metrics_table(&outputs.metrics));
    }
    Ok(())
}

async fn cmd_edit(client: &Client, id: &str, patch: RunMetadataPatch) -> Result<()> {
    if patch.is_empty() {
        bail!("Nothing to change: pass --name, --notes or --tags");
    }
    settle(client.update_run(id, &patch), "run").await?;
    println!("✓ Updated run {id}");
    Ok(())
}

async fn cmd_kill(client: &Client, id: &str, yes: bool) -> Result<()> {
    if !yes && !confirm(&format!("Kill run {id}?"))? {
        println!("Aborted.");
        return Ok(());
    }
    settle(client.kill_run(id), "run").await?;
    println!("✓ Kill requested for run {id}");
    Ok(())
}

async fn cmd_workflow(
    client: &Client,
    id: String,
    version: Option<String>,
    graph: bool,
) -> Result<()> {
    let view = views::workflow_view(client, id, version);
    let loaded_view = loaded(view.settled().await)?;
    let workflow = &loaded_view.workflow;

    println!("{}", render::workflow_summary(workflow));
    if !workflow.params.is_empty() {
        println!("{}", render::workflow_params_table(workflow));
    }
    if graph {
        print!("{}", render::workflow_graph(workflow));
    }
    if !loaded_view.last_runs.is_empty() {
        println!("── Latest runs ──");
        println!("{}", render::runs_table(&loaded_view.last_runs, Utc::now()));
    }
    Ok(())
}

async fn cmd_jobs(client: &Client, page: u32, labels: Option<String>) -> Result<()> {
    let store = Mutex::new(Store::new());
    if let Err(notice) = thunks::fetch_jobs(client, &store, page, labels).await {
        return Err(notice_error(&notice));
    }
    let store = store.lock().unwrap_or_else(|e| e.into_inner());
    let state = store.state();
    if state.list.ids.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }
    println!("{}", render::jobs_table(&state.rows(), Utc::now()));
    println!(
        "{}",
        render::pagination(state.list.page, state.list.total_count, client.per_page())
    );
    Ok(())
}

async fn cmd_job(client: &Client, name: &str) -> Result<()> {
    let store = Mutex::new(Store::new());
    if let GetJob::Failed(notice) = thunks::get_job(client, &store, name).await {
        return Err(notice_error(&notice));
    }
    let store = store.lock().unwrap_or_else(|e| e.into_inner());
    let Some(job) = store.state().job(name) else {
        bail!("Job {name} not found");
    };
    println!("{}", render::job_summary(job, Utc::now()));
    if !job.history.is_empty() {
        println!("{}", render::job_history_table(job));
    }
    Ok(())
}
