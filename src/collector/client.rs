use crate::config::types::{CollectorConfig, NodeConfig};
use crate::ingest::record::RetrievalRecord;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector returned status {status}: {message}")]
    Collector { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, SubmitError>;

/// Shared bearer token, refreshed by the registration heartbeat.
pub type SharedToken = Arc<RwLock<String>>;

/// One delivery cycle's outbound payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Submission<'a> {
    node_id: &'a str,
    fil_address: &'a str,
    bandwidth_logs: &'a [RetrievalRecord],
}

/// HTTP transport to the telemetry collector.
#[derive(Debug, Clone)]
pub struct CollectorClient {
    url: String,
    node_id: String,
    wallet_address: String,
    token: SharedToken,
    client: reqwest::Client,
}

impl CollectorClient {
    pub fn new(config: &CollectorConfig, node: &NodeConfig, token: SharedToken) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            url: config.url.clone(),
            node_id: node.id.clone(),
            wallet_address: node.wallet_address.clone(),
            token,
            client,
        })
    }

    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    /// Submit one batch of retrieval records. Any non-success response is
    /// an error; the caller decides what to retain for retry.
    pub async fn submit(&self, records: &[RetrievalRecord]) -> Result<()> {
        let body = Submission {
            node_id: &self.node_id,
            fil_address: &self.wallet_address,
            bandwidth_logs: records,
        };

        let token = self.token.read().await.clone();
        let response = self
            .client
            .post(&self.url)
            .header("Authentication", token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SubmitError::Collector {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}
