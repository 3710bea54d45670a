use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub source: SourceConfig,
    pub collector: CollectorConfig,
    #[serde(default)]
    pub influx: Option<InfluxConfig>,
    pub registration: RegistrationConfig,
}

/// Identity of this node, issued by the orchestrator at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub wallet_address: String,
    pub token: String,
    #[serde(default)]
    pub operator_email: Option<String>,
    /// Network deployment tag; "local" shortens the registration cadence.
    #[serde(default = "default_network")]
    pub network: String,
}

fn default_network() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Access log written by the web server. Needs read+write permission
    /// because rotation is truncation-in-place.
    pub path: PathBuf,
    /// Content identifier that marks synthetic test traffic.
    #[serde(default)]
    pub testing_cid: Option<String>,
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_poll_floor")]
    pub poll_floor: Duration,
    #[serde(default = "default_max_log_size")]
    pub max_log_size: u64,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_poll_floor() -> Duration {
    Duration::from_secs(1)
}

fn default_max_log_size() -> u64 {
    1024 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub url: String,
    #[serde(with = "humantime_serde", default = "default_submit_interval")]
    pub submit_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_submit_floor")]
    pub submit_floor: Duration,
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_submit_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_submit_floor() -> Duration {
    Duration::from_secs(5)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    /// host:port of the time-series sink, no scheme.
    pub addr: String,
    #[serde(default = "default_influx_db")]
    pub database: String,
}

fn default_influx_db() -> String {
    "bandwatch".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    pub orchestrator_url: String,
    /// Directory the orchestrator-issued cert/key pair is persisted to.
    pub ssl_dir: PathBuf,
    /// Address for the inbound register-check endpoint.
    #[serde(default = "default_check_listen")]
    pub check_listen: String,
}

fn default_check_listen() -> String {
    "0.0.0.0:10369".to_string()
}
