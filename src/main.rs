use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "itemhub")]
#[command(version, about = "Item CRUD service with concurrent batch processing")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(long, global = true, default_value = itemhub::config::CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Keep items in memory instead of SQLite
        #[arg(long)]
        in_memory: bool,

        /// Maximum concurrent processing tasks
        #[arg(long)]
        max_workers: Option<usize>,

        /// Simulated work per item in milliseconds
        #[arg(long)]
        processing_delay_ms: Option<u64>,

        /// Failure policy: wait_all, cancel_on_failure
        #[arg(long)]
        failure_policy: Option<String>,

        /// Enable permissive CORS for local frontends
        #[arg(long)]
        dev: bool,
    },
    /// Create the database file and schema
    Init {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Process every stored item once and print the result as JSON
    Process {
        /// Database path
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the resolved configuration as TOML
    Show,
    /// Validate configuration and list any problems
    Validate,
}

fn setup_logging(verbose: bool, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("itemhub=debug,tower_http=debug,warn")
        } else {
            EnvFilter::new("itemhub=info,warn")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.log_format)?;

    let mut config = cmd::resolve_config(&cli.config)?;

    match &cli.command {
        Commands::Serve {
            host,
            port,
            db_path,
            in_memory,
            max_workers,
            processing_delay_ms,
            failure_policy,
            dev,
        } => {
            let overrides = cmd::ServeOverrides {
                host: host.clone(),
                port: *port,
                db_path: db_path.clone(),
                in_memory: *in_memory,
                max_workers: *max_workers,
                processing_delay_ms: *processing_delay_ms,
                failure_policy: failure_policy.clone(),
            };
            overrides.apply(&mut config)?;
            cmd::cmd_serve(config, *dev).await?;
        }
        Commands::Init { db_path } => {
            if let Some(path) = db_path {
                config.storage.db_path = path.clone();
            }
            cmd::cmd_init(&config)?;
        }
        Commands::Process { db_path } => {
            if let Some(path) = db_path {
                config.storage.db_path = path.clone();
            }
            cmd::cmd_process(&config).await?;
        }
        Commands::Config { command } => cmd::cmd_config(&cli.config, &config, command.clone())?,
    }

    Ok(())
}
