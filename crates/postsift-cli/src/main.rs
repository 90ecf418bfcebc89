//! postsift
//!
//! Streams Bluesky posts through a fastText classifier and prints the ones
//! it is confident are about programming.

use anyhow::Result;
use clap::Parser;
use postsift_classifiers::{Classifier, ScoringChannel};
use postsift_cli::dataset::{self, DatasetFiles, NEGATIVE_LABEL};
use postsift_cli::feed::FeedClient;
use postsift_cli::train;
use postsift_cli::{Cli, Commands, LogFormat, PostsiftConfig};
use postsift_stream::{
    CommandConnector, EventFilter, FileConnector, JsonLinesSink, PipelineDriver, SourceConnector,
    StreamCollector,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format);

    let config = PostsiftConfig::load(&cli.config, &cli)?;
    info!(config = %cli.config, "Configuration loaded");

    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr)?;
    }

    match &cli.command {
        Commands::Watch { replay, .. } => watch(&config, replay.as_deref()).await,
        Commands::Collect { force, replay, .. } => {
            collect(&config, *force, replay.as_deref()).await
        }
        Commands::Prepare { .. } => prepare(&config),
        Commands::Train { .. } => train(&config).await,
    }
}

fn connector_for(config: &PostsiftConfig, replay: Option<&Path>) -> Arc<dyn SourceConnector> {
    match replay {
        Some(path) => Arc::new(FileConnector::new(path)),
        None => Arc::new(CommandConnector::new(config.relay.clone())),
    }
}

fn pipeline(config: &PostsiftConfig, replay: Option<&Path>) -> PipelineDriver {
    let collector = StreamCollector::new(
        EventFilter::new(config.filter.clone()),
        config.report.clone(),
    );
    PipelineDriver::new(
        connector_for(config, replay),
        collector,
        config.reconnect.clone(),
    )
}

/// Live mode: report confident matches on stdout until the firehose ends or
/// a shutdown signal arrives
async fn watch(config: &PostsiftConfig, replay: Option<&Path>) -> Result<()> {
    info!(
        classifier = %config.classifier.display(),
        label = %config.report.target_label,
        threshold = config.report.threshold,
        "Starting classifier"
    );
    let classifier: Arc<dyn Classifier> = Arc::new(ScoringChannel::spawn(&config.classifier)?);

    let mut driver = pipeline(config, replay);
    let mut sink = JsonLinesSink::stdout();

    tokio::select! {
        result = driver.run_live(classifier.clone(), &mut sink) => result?,
        _ = shutdown_signal() => {
            warn!("Shutdown signal received, stopping pipeline...");
            classifier.close().await;
        }
    }

    let stats = driver.collector().stats();
    info!(
        received = stats.received,
        classified = stats.classified,
        reported = stats.reported,
        reconnects = driver.reconnects(),
        "Pipeline finished"
    );
    Ok(())
}

/// Build train.json from the positive feed plus as many firehose posts
async fn collect(config: &PostsiftConfig, force: bool, replay: Option<&Path>) -> Result<()> {
    let files = DatasetFiles::new(&config.dataset.data_dir);
    let train_json = files.train_json();
    if train_json.exists() && !force {
        info!(path = %train_json.display(), "Training set exists, skipping collection");
        return Ok(());
    }
    files.ensure_dir()?;

    let feed = FeedClient::new(&config.dataset.feed_url)?;
    let positives = feed.download(&config.dataset.feed_name).await?;
    if positives.is_empty() {
        anyhow::bail!("feed {} returned no posts", config.dataset.feed_name);
    }

    let mut driver = pipeline(config, replay);
    let negatives = tokio::select! {
        result = driver.collect(positives.len(), NEGATIVE_LABEL) => result?,
        _ = shutdown_signal() => anyhow::bail!("collection interrupted"),
    };
    info!(
        positives = positives.len(),
        negatives = negatives.len(),
        "Fetched firehose posts"
    );

    let samples = dataset::build_training_set(positives, negatives, &mut rand::thread_rng());
    dataset::write_samples(&train_json, &samples)?;
    info!(path = %train_json.display(), samples = samples.len(), "Wrote training set");
    Ok(())
}

fn prepare(config: &PostsiftConfig) -> Result<()> {
    let files = DatasetFiles::new(&config.dataset.data_dir);
    dataset::prepare(&files, config.dataset.test_split, &mut rand::thread_rng())?;
    Ok(())
}

async fn train(config: &PostsiftConfig) -> Result<()> {
    let files = DatasetFiles::new(&config.dataset.data_dir);
    let summary = tokio::select! {
        result = train::train(&config.train, &files) => result?,
        _ = shutdown_signal() => anyhow::bail!("training interrupted"),
    };
    info!(
        test_lines = summary.test_lines,
        misclassified = summary.misclassified,
        "Training finished"
    );
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
///
/// Logs go to stderr so stdout carries only report lines.
fn init_tracing(verbose: bool, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("postsift=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("postsift=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Install the Prometheus exporter and describe postsift metrics
fn init_metrics(addr: SocketAddr) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "postsift_events_total",
        "Firehose events seen, by filter outcome"
    );
    metrics::describe_histogram!(
        "postsift_classify_latency_us",
        metrics::Unit::Microseconds,
        "Normalize plus classifier round trip per event"
    );
    metrics::describe_counter!(
        "postsift_reports_total",
        "Events reported as matching the target label"
    );
    metrics::describe_counter!(
        "postsift_source_reconnects_total",
        "Firehose reconnect attempts"
    );
    metrics::describe_counter!(
        "postsift_classifier_errors_total",
        "Classifier failures by kind (parse, exit)"
    );

    info!(addr = %addr, "Metrics exporter listening");
    Ok(())
}
