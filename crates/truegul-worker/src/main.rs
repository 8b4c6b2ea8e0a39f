//! TrueGul ML Worker
//!
//! Consumes writing-analysis tasks from the task stream, scores and reviews
//! each writing, and reports the outcome to the task's callback URL. Also
//! serves the synchronous analyze API.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use truegul_core::{AnalysisTask, WritingKind};
use truegul_inference::ModelLoaders;
use truegul_worker::config::{Overrides, QueueBackend};
use truegul_worker::mq::TaskPublisher;
use truegul_worker::routes::{self, AppState};
use truegul_worker::{bootstrap, CallbackClient, Settings, TaskProcessor};

#[derive(Parser, Debug)]
#[command(name = "truegul-worker")]
#[command(about = "TrueGul writing analysis worker", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "truegul.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug)]
struct OverrideArgs {
    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", global = true)]
    redis_url: Option<String>,

    /// Shared secret sent with every callback
    #[arg(long, env = "ML_CALLBACK_SECRET", global = true, hide_env_values = true)]
    callback_secret: Option<String>,

    /// Consumer identity within the group
    #[arg(long, env = "CONSUMER_NAME", global = true)]
    consumer_name: Option<String>,

    /// HTTP listen port
    #[arg(short = 'P', long, global = true)]
    port: Option<u16>,
}

impl From<OverrideArgs> for Overrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            redis_url: args.redis_url,
            callback_secret: args.callback_secret,
            consumer_name: args.consumer_name,
            port: args.port,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the queue worker and the HTTP API (default)
    Serve,

    /// Publish one analysis task to the task stream
    Submit {
        #[arg(long)]
        task_id: String,

        #[arg(long)]
        writing_id: String,

        /// essay or cover_letter
        #[arg(long, default_value = "essay")]
        writing_type: String,

        #[arg(long)]
        callback_url: String,

        /// Text to analyze
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        content: Option<String>,

        /// Read the text to analyze from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Resolve a model key through the loader chain and print its local path
    Resolve {
        key: String,

        /// Resolve a directory instead of a single file
        #[arg(long)]
        directory: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    let mut settings = Settings::load(Some(&cli.config))?;
    settings.apply(cli.overrides.into());
    let settings = settings.finalize()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::Submit {
            task_id,
            writing_id,
            writing_type,
            callback_url,
            content,
            file,
        } => {
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(file)) => std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?,
                (None, None) => anyhow::bail!("either --content or --file is required"),
            };
            let kind: WritingKind = writing_type.parse()?;
            let task = AnalysisTask::new(task_id, writing_id, content, kind, callback_url);
            submit(&settings, task).await
        }
        Command::Resolve { key, directory } => resolve(&settings, &key, directory).await,
    }
}

async fn serve(settings: Settings) -> Result<()> {
    info!("Starting TrueGul ML worker");
    info!(
        "Queue: {} stream={} group={} consumer={}",
        settings.queue.backend,
        settings.queue.stream_name,
        settings.queue.consumer_group,
        settings.queue.consumer_name
    );

    let metrics_handle = init_metrics()?;

    info!("Loading models...");
    let services = bootstrap::build_services(&settings).await?;
    info!("Models loaded successfully");

    let consumer = bootstrap::build_consumer(&settings.queue)?;
    let callback = Arc::new(CallbackClient::from_config(&settings.callback)?);
    let processor = TaskProcessor::new(consumer, services.clone(), callback);

    processor
        .start()
        .await
        .context("failed to connect task consumer")?;

    let served = if settings.server.enabled {
        run_server(&settings, AppState::new(services, Some(metrics_handle))).await
    } else {
        shutdown_signal().await;
        Ok(())
    };

    warn!("Shutdown signal received, stopping worker...");
    processor.shutdown().await;

    info!("Worker shutdown complete");
    served
}

async fn run_server(settings: &Settings, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn submit(settings: &Settings, task: AnalysisTask) -> Result<()> {
    if settings.queue.backend.parse::<QueueBackend>()? != QueueBackend::Redis {
        anyhow::bail!("submit requires the redis queue backend");
    }

    let publisher = TaskPublisher::connect(&settings.queue.redis_url, &settings.queue.stream_name).await?;
    let id = publisher.publish(&task).await?;

    info!("Published task {} to {}", task.task_id, settings.queue.stream_name);
    println!("{}", id);
    Ok(())
}

async fn resolve(settings: &Settings, key: &str, directory: bool) -> Result<()> {
    let loaders = ModelLoaders::from_config(&settings.model_loader)?;

    let resolved = if directory {
        loaders.ensure_directory(key).await?
    } else {
        loaders.ensure_file(key).await?
    };

    match resolved {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => {
            println!("not found");
            std::process::exit(1);
        }
    }
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("truegul=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("truegul=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "truegul_tasks_total",
        "Tasks processed, by outcome status"
    );
    metrics::describe_histogram!(
        "truegul_task_latency_ms",
        metrics::Unit::Milliseconds,
        "Detection plus feedback latency in milliseconds"
    );
    metrics::describe_counter!(
        "truegul_callbacks_total",
        "Callback delivery attempts, by outcome"
    );
    metrics::describe_counter!(
        "truegul_consumer_errors_total",
        "Failed reads from the task stream"
    );
    metrics::describe_counter!(
        "truegul_malformed_messages_total",
        "Messages acknowledged without a callback because the task could not be decoded"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
