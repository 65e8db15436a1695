//! HTTP server command - `itemhub serve`.

use std::path::PathBuf;

use anyhow::Result;
use itemhub::batch::FailurePolicy;
use itemhub::config::ServiceConfig;

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Default)]
pub struct ServeOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<PathBuf>,
    pub in_memory: bool,
    pub max_workers: Option<usize>,
    pub processing_delay_ms: Option<u64>,
    pub failure_policy: Option<String>,
}

impl ServeOverrides {
    pub fn apply(self, config: &mut ServiceConfig) -> Result<()> {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = self.db_path {
            config.storage.db_path = path;
        }
        if self.in_memory {
            config.storage.in_memory = true;
        }
        if let Some(workers) = self.max_workers {
            config.batch.max_workers = workers;
        }
        if let Some(delay) = self.processing_delay_ms {
            config.batch.processing_delay_ms = delay;
        }
        if let Some(policy) = self.failure_policy {
            config.batch.failure_policy = policy.parse::<FailurePolicy>()?;
        }
        Ok(())
    }
}

pub async fn cmd_serve(config: ServiceConfig, dev: bool) -> Result<()> {
    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  - {}", problem);
        }
        anyhow::bail!("Refusing to start with an invalid configuration");
    }

    itemhub::server::start_server(config, dev).await
}
