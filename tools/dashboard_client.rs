//! Dashboard Client
//!
//! Walks every API endpoint over NATS request/reply, the way the dashboard
//! does on load, and logs a short digest of each response.

use anyhow::{bail, Result};
use fraud_risk_lab::api::{ApiRequest, Endpoint, Envelope};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Attribution endpoints can take a while on first call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

fn digest(endpoint: Endpoint, data: &Value) -> String {
    match endpoint {
        Endpoint::Transactions => format!(
            "{} transactions, {} fraud",
            data["transactions"].as_array().map_or(0, Vec::len),
            data["totalFraud"]
        ),
        Endpoint::Evaluate => format!(
            "tp={} fp={} fn={} tn={} f1={}",
            data["tp"], data["fp"], data["fn"], data["tn"], data["f1"]
        ),
        Endpoint::Roc => format!("{} points", data.as_array().map_or(0, Vec::len)),
        Endpoint::Features | Endpoint::ShapGlobal => data
            .as_array()
            .and_then(|items| items.first())
            .map(|top| format!("top feature {} ({})", top["feature"], top["importance"]))
            .unwrap_or_else(|| "no features".to_string()),
        Endpoint::ShapTransaction => format!(
            "base={} output={} top={}",
            data["baseValue"], data["outputValue"], data["features"][0]["feature"]
        ),
        Endpoint::Summary => format!(
            "total={} fraud={} flagged={}",
            data["total"], data["totalFraud"], data["flagged"]
        ),
        Endpoint::Compare => format!(
            "treeEnsemble f1={} neuralNet f1={}",
            data["treeEnsemble"]["metrics"]["f1"], data["neuralNet"]["metrics"]["f1"]
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dashboard_client=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let prefix = args.get(2).map(|s| s.as_str()).unwrap_or("fraud.api");
    let model = args.get(3).map(|s| s.as_str()).unwrap_or("treeEnsemble");
    let threshold: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(0.5);
    let index: usize = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(0);

    info!(
        nats_url = %nats_url,
        prefix = %prefix,
        model = %model,
        threshold = threshold,
        index = index,
        "Starting dashboard client"
    );

    let request = ApiRequest {
        model: Some(model.to_string()),
        threshold: Some(threshold),
        index: Some(index),
    };
    let payload = serde_json::to_vec(&request)?;

    let client = match async_nats::ConnectOptions::new()
        .request_timeout(Some(REQUEST_TIMEOUT))
        .connect(nats_url)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Printing requests only.");
            for endpoint in Endpoint::ALL {
                info!(
                    subject = %endpoint.subject(prefix),
                    body = %String::from_utf8_lossy(&payload),
                    "Would send"
                );
            }
            return Ok(());
        }
    };

    let mut failures = 0;
    for endpoint in Endpoint::ALL {
        let start = Instant::now();
        let message = client
            .request(endpoint.subject(prefix), payload.clone().into())
            .await?;
        let envelope: Envelope = serde_json::from_slice(&message.payload)?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match (&envelope.data, &envelope.error) {
            (Some(data), _) if envelope.ok => {
                info!(endpoint = endpoint.name(), elapsed_ms = elapsed_ms, "{}", digest(endpoint, data));
            }
            (_, Some(error)) => {
                failures += 1;
                warn!(
                    endpoint = endpoint.name(),
                    kind = %error.kind,
                    elapsed_ms = elapsed_ms,
                    "{}",
                    error.message
                );
            }
            _ => bail!("malformed response from {}", endpoint.name()),
        }
    }

    info!(
        endpoints = Endpoint::ALL.len(),
        failures = failures,
        "Completed dashboard walk"
    );
    Ok(())
}
