use crate::config::types::InfluxConfig;
use crate::ingest::record::RetrievalRecord;
use tracing::debug;

/// Best-effort time-series sink. One point per retrieval record, written
/// with the raw nginx short keys. Failures are logged and never feed back
/// into the delivery loop's retry decisions.
#[derive(Debug, Clone)]
pub struct InfluxSink {
    write_url: String,
    node_id: String,
    client: reqwest::Client,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig, node_id: String) -> Self {
        Self {
            write_url: format!("http://{}/write?db={}", config.addr, config.database),
            node_id,
            client: reqwest::Client::new(),
        }
    }

    /// Write one point per record. Fire-and-forget: errors are logged,
    /// nothing is retained for retry.
    pub async fn write_points(&self, records: &[RetrievalRecord]) {
        if records.is_empty() {
            return;
        }

        let body: String = records
            .iter()
            .map(|r| self.line_for(r))
            .collect::<Vec<_>>()
            .join("\n");

        match self.client.post(&self.write_url).body(body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(count = records.len(), "Wrote retrieval points to influx");
            }
            Ok(response) => {
                debug!(status = %response.status(), "Influx rejected retrieval points");
            }
            Err(err) => {
                debug!(error = %err, "Failed to write retrieval points to influx");
            }
        }
    }

    /// Line-protocol encoding of one record. The field schema is fixed to
    /// the nginx short keys; anything outside it is stripped.
    fn line_for(&self, record: &RetrievalRecord) -> String {
        let request = if record.file_path.is_empty() {
            format!("/ipfs/{}", record.cid)
        } else {
            format!("/ipfs/{}/{}", record.cid, record.file_path)
        };

        format!(
            "http,spdy={},method=GET,type=1 addr={},b={}i,lt={},r={},ref={},rid={},rt={},s={},ua={},ucs={}",
            escape_tag(&self.node_id),
            quote_field(&record.client_address),
            record.num_bytes_sent,
            quote_field(&record.local_time),
            quote_field(&request),
            quote_field(&record.referrer),
            quote_field(&record.request_id),
            quote_field(&record.request_duration.to_string()),
            quote_field("200"),
            quote_field(&record.user_agent),
            record.cache_hit,
        )
    }
}

fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(' ', "\\ ")
        .replace('=', "\\=")
}

fn quote_field(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
