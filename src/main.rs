//! Fraud Risk Lab - Main Entry Point
//!
//! Serves the scoring core over NATS request/reply. Requests are handled by
//! a bounded pool of tasks; the CPU-bound core calls run on the blocking
//! thread pool.

use anyhow::{Context, Result};
use fraud_risk_lab::{
    api::{self, Endpoint, Envelope},
    config::{AppConfig, LoggingConfig},
    consumer::RequestConsumer,
    engine::RiskLab,
    producer::ReplyProducer,
    service_metrics::{MetricsReporter, ServiceMetrics},
    types::model::ModelKind,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    info!("Starting Fraud Risk Lab");
    info!(
        count = config.dataset.count,
        seed = config.dataset.seed,
        flag_threshold = config.dataset.flag_threshold,
        artifacts = %config.models.artifacts_dir,
        "Configuration loaded successfully"
    );

    let lab = Arc::new(RiskLab::new(&config));

    // Warm the tree ensemble session so the first dashboard load is fast.
    // Failures are cached and reported per request.
    {
        let lab = lab.clone();
        tokio::task::spawn_blocking(move || match lab.dataset(ModelKind::TreeEnsemble) {
            Ok(dataset) => info!(records = dataset.len(), "Tree ensemble session warmed"),
            Err(e) => warn!(error = %e, "Tree ensemble unavailable"),
        });
    }

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats.subject_prefix);
    let producer = ReplyProducer::new(client.clone());
    let metrics = Arc::new(ServiceMetrics::new());

    if config.service.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.service.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let num_workers = config.service.workers.max(1);
    info!(workers = num_workers, "Starting request loop");
    for endpoint in Endpoint::ALL {
        debug!(subject = %endpoint.subject(consumer.prefix()), "Serving");
    }

    let semaphore = Arc::new(Semaphore::new(num_workers));
    let prefix: Arc<str> = Arc::from(config.nats.subject_prefix.as_str());
    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Worker pool closed")?;

        let lab = lab.clone();
        let producer = producer.clone();
        let metrics = metrics.clone();
        let prefix = prefix.clone();

        tokio::spawn(async move {
            let start = Instant::now();
            let request_id = Uuid::new_v4();

            let Some(reply) = message.reply.clone() else {
                warn!(subject = %message.subject, "Request without reply subject, dropping");
                drop(permit);
                return;
            };

            let endpoint = Endpoint::from_subject(&prefix, message.subject.as_str());
            let envelope = match endpoint {
                Some(endpoint) => {
                    let payload = message.payload.clone();
                    match tokio::task::spawn_blocking(move || api::handle(&lab, endpoint, &payload))
                        .await
                    {
                        Ok(envelope) => envelope,
                        Err(e) => {
                            error!(endpoint = endpoint.name(), error = %e, "Request handler panicked");
                            Envelope::failure(&api::ApiError::Internal(e.to_string()))
                        }
                    }
                }
                None => Envelope::failure(&api::ApiError::BadRequest(format!(
                    "unknown endpoint {}",
                    message.subject
                ))),
            };

            let endpoint_name = endpoint.map(|e| e.name()).unwrap_or("unknown");
            let error_kind = envelope.error.as_ref().map(|e| e.kind.clone());
            metrics.record_request(endpoint_name, start.elapsed(), error_kind.as_deref());

            match &error_kind {
                Some(kind) => warn!(
                    request_id = %request_id,
                    endpoint = endpoint_name,
                    kind = %kind,
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "Request failed"
                ),
                None => debug!(
                    request_id = %request_id,
                    endpoint = endpoint_name,
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "Request handled"
                ),
            }

            if let Err(e) = producer.reply(reply, &envelope).await {
                error!(
                    request_id = %request_id,
                    endpoint = endpoint_name,
                    error = %e,
                    "Failed to publish response"
                );
            }

            drop(permit);
        });
    }

    info!("Request loop ended, shutting down...");
    metrics.print_summary();

    Ok(())
}
