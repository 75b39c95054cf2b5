use std::sync::Arc;

use seqalign::api::{ApiServer, AppState};
use seqalign::config::ServiceConfig;
use seqalign::job::JobRegistry;
use seqalign::logging;
use seqalign::pipeline::PipelineExecutor;
use seqalign::retention::RetentionSweeper;
use seqalign::runner::ProcessRunner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env_or_default()?;

    let (logging_config, _log_guard) = logging::init_logging(&config.log_dir)?;

    tracing::info!(
        work_dir = %config.pipeline.work_dir.display(),
        publish_dir = %config.publish_dir.display(),
        reference = %config.pipeline.tools.reference.display(),
        max_reads = config.pipeline.downsample.max_reads,
        retention_secs = config.retention.max_age_secs,
        abort_on = ?config.pipeline.abort_on,
        "Starting seqalign"
    );

    let sweeper = Arc::new(RetentionSweeper::new(
        config.publish_dir.clone(),
        config.retention.clone(),
    ));
    let executor = Arc::new(PipelineExecutor::new(
        config.pipeline.clone(),
        Arc::new(ProcessRunner::new()),
        sweeper,
    ));
    let registry = Arc::new(JobRegistry::new(executor));

    let state = AppState::new(registry).with_logging_config(logging_config.clone());
    let server = ApiServer::new(config.api.clone(), state).with_static_dir(&config.static_dir);

    let cancel_token = server.cancel_token();
    logging_config.start_retention_cleanup(cancel_token.clone());

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        tracing::info!("Received Ctrl-C, shutting down");
        cancel_token.cancel();
    });

    server.run().await?;

    tracing::info!("seqalign stopped");
    Ok(())
}
