use anyhow::Result;
use clap::Parser;
use flowforge::{config::Config, server::run_server};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser)]
#[command(name = "flowforge")]
#[command(about = "HTTP service that builds and edits agent/workflow YAML from prompts")]
struct Args {
    /// Database file path
    #[arg(long, default_value = "./.flowforge/flowforge.db")]
    database_path: String,

    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value = "8001")]
    port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory for server log files (also the source for /api/logs/stream)
    #[arg(long, default_value = "./.flowforge/logs")]
    log_dir: String,

    /// Intent classification service endpoint
    #[arg(long, default_value = "http://localhost:8005/chat")]
    classifier_url: String,

    /// Agents generation service endpoint
    #[arg(long, default_value = "http://localhost:8003/chat")]
    agents_url: String,

    /// Workflow generation service endpoint
    #[arg(long, default_value = "http://localhost:8004/chat")]
    workflow_url: String,

    /// YAML editing service endpoint
    #[arg(long, default_value = "http://localhost:8002/chat")]
    editor_url: String,

    /// Timeout for classification calls in seconds
    #[arg(long, default_value = "30")]
    classify_timeout_secs: u64,

    /// Timeout for generation calls in seconds
    #[arg(long, default_value = "150")]
    generate_timeout_secs: u64,

    /// Timeout for editing calls in seconds
    #[arg(long, default_value = "60")]
    edit_timeout_secs: u64,

    /// Number of background orchestration workers
    #[arg(long, default_value = "4")]
    worker_count: usize,

    /// External YAML validator executable
    #[arg(long, default_value = "flowforge-validate")]
    validator_command: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing with both console and file logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    std::fs::create_dir_all(&args.log_dir)?;

    // A stable file name so the log-tail endpoint has a fixed source.
    let file_appender = tracing_appender::rolling::never(&args.log_dir, "server.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter.clone()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(env_filter),
        )
        .init();

    info!("Starting Flowforge server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", args.database_path);
    info!("Server: {}:{}", args.host, args.port);
    info!("Background workers: {}", args.worker_count);

    let config = Config {
        database_path: args.database_path,
        host: args.host,
        port: args.port,
        log_dir: args.log_dir,
        classifier_url: args.classifier_url,
        agents_url: args.agents_url,
        workflow_url: args.workflow_url,
        editor_url: args.editor_url,
        classify_timeout_secs: args.classify_timeout_secs,
        generate_timeout_secs: args.generate_timeout_secs,
        edit_timeout_secs: args.edit_timeout_secs,
        worker_count: args.worker_count,
        validator_command: args.validator_command,
    };

    run_server(config).await?;

    Ok(())
}
