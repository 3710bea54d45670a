pub mod server;

use crate::collector::client::SharedToken;
use crate::config::types::{NodeConfig, RegistrationConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use x509_parser::pem::parse_x509_pem;

const CERT_FILE: &str = "node.crt";
const KEY_FILE: &str = "node.key";

/// Certificates within this window of expiry are discarded for reissue.
const EXPIRY_MARGIN_SECS: i64 = 5 * 24 * 60 * 60;

const DEREGISTER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("orchestrator returned status {status}: {message}")]
    Orchestrator { status: u16, message: String },

    #[error("orchestrator response missing credentials: {0}")]
    Credentials(String),

    #[error("certificate parse failed: {0}")]
    Cert(String),
}

/// How a registration attempt concluded. `RestartRequired` is a terminal
/// state: the caller exits and the external supervisor restarts the
/// process, which then comes up with (or without) the persisted
/// credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    RestartRequired,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody<'a> {
    node_id: &'a str,
    version: &'a str,
    fil_wallet_address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    operator_email: Option<&'a str>,
    host_stats: HostStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HostStats {
    hostname: String,
    uptime_secs: u64,
}

#[derive(Debug, Deserialize)]
struct IssuedCredentials {
    cert: Option<String>,
    key: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Periodic handshake with the orchestrator: initial cert issuance,
/// steady-state re-registration (token refresh), and shutdown
/// deregistration. The ingestion core only ever sees the shared token.
pub struct Registrar {
    config: RegistrationConfig,
    node: NodeConfig,
    token: SharedToken,
    client: reqwest::Client,
    started: Instant,
}

impl Registrar {
    pub fn new(config: RegistrationConfig, node: NodeConfig, token: SharedToken) -> Self {
        Self {
            config,
            node,
            token,
            // No default timeout: initial cert issuance can take minutes.
            client: reqwest::Client::new(),
            started: Instant::now(),
        }
    }

    pub fn network(&self) -> &str {
        &self.node.network
    }

    fn cert_path(&self) -> PathBuf {
        self.config.ssl_dir.join(CERT_FILE)
    }

    fn key_path(&self) -> PathBuf {
        self.config.ssl_dir.join(KEY_FILE)
    }

    fn register_body(&self) -> RegisterBody<'_> {
        RegisterBody {
            node_id: &self.node.id,
            version: env!("CARGO_PKG_VERSION"),
            fil_wallet_address: &self.node.wallet_address,
            operator_email: self.node.operator_email.as_deref(),
            host_stats: HostStats {
                hostname: hostname::get()
                    .ok()
                    .and_then(|h| h.to_str().map(str::to_string))
                    .unwrap_or_default(),
                uptime_secs: self.started.elapsed().as_secs(),
            },
        }
    }

    /// Register with the orchestrator. On the first run without issued
    /// credentials this requests a cert/key pair, persists it, and returns
    /// `RestartRequired`. With credentials present, an `initial` call also
    /// checks cert expiry before re-registering for a fresh token.
    pub async fn register(&self, initial: bool) -> Result<RegistrationOutcome, RegistrationError> {
        if !self.cert_path().exists() {
            return self.request_credentials().await;
        }

        if initial {
            let pem = std::fs::read(self.cert_path())?;
            let not_after = cert_not_after(&pem)?;
            let now = chrono::Utc::now().timestamp();

            if now > not_after - EXPIRY_MARGIN_SECS {
                warn!("Certificate close to expiry, removing credentials for reissue");
                let _ = std::fs::remove_file(self.cert_path());
                let _ = std::fs::remove_file(self.key_path());
                return Ok(RegistrationOutcome::RestartRequired);
            }

            info!(not_after = not_after, "Certificate still valid");
        }

        debug!("Re-registering with orchestrator");
        let response = self
            .client
            .post(format!(
                "{}/register?ssl=done",
                self.config.orchestrator_url
            ))
            .json(&self.register_body())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RegistrationError::Orchestrator {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let refreshed: TokenResponse = response.json().await?;
        *self.token.write().await = refreshed.token;
        info!("Re-registration successful, token refreshed");

        Ok(RegistrationOutcome::Registered)
    }

    async fn request_credentials(&self) -> Result<RegistrationOutcome, RegistrationError> {
        std::fs::create_dir_all(&self.config.ssl_dir)?;

        info!("Registering with orchestrator, requesting TLS credentials (can take several minutes)");
        let response = self
            .client
            .post(format!("{}/register", self.config.orchestrator_url))
            .json(&self.register_body())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RegistrationError::Orchestrator {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let issued: IssuedCredentials = response.json().await?;
        let (cert, key) = match (issued.cert, issued.key) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => (cert, key),
            _ => {
                return Err(RegistrationError::Credentials(
                    issued
                        .error
                        .unwrap_or_else(|| "empty cert or key received".to_string()),
                ))
            }
        };

        std::fs::write(self.cert_path(), cert)?;
        std::fs::write(self.key_path(), key)?;
        info!("TLS credentials persisted, restart required to pick them up");

        Ok(RegistrationOutcome::RestartRequired)
    }

    /// Best-effort shutdown notification with a hard timeout.
    pub async fn deregister(&self) {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct DeregisterBody<'a> {
            node_id: &'a str,
        }

        info!("De-registering from orchestrator");
        let result = self
            .client
            .post(format!("{}/deregister", self.config.orchestrator_url))
            .timeout(DEREGISTER_TIMEOUT)
            .json(&DeregisterBody {
                node_id: &self.node.id,
            })
            .send()
            .await;

        match result {
            Ok(_) => info!("De-registered successfully"),
            Err(err) => warn!(error = %err, "De-registration failed"),
        }
    }
}

/// notAfter of the first certificate in a PEM bundle, as a unix timestamp.
fn cert_not_after(pem_bytes: &[u8]) -> Result<i64, RegistrationError> {
    let (_, pem) =
        parse_x509_pem(pem_bytes).map_err(|e| RegistrationError::Cert(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| RegistrationError::Cert(e.to_string()))?;
    Ok(cert.validity().not_after.timestamp())
}

/// Steady-state cadence: every 4 to 6 minutes, jittered so a fleet does
/// not re-register in lockstep. The "local" network runs on one minute.
pub fn heartbeat_delay(network: &str) -> Duration {
    if network == "local" {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(4 * 60 + fastrand::u64(0..=2 * 60))
    }
}

/// Re-register on the heartbeat cadence forever. Failures here are logged
/// and retried; only the initial registration attempt is fatal.
pub async fn run_heartbeat(registrar: std::sync::Arc<Registrar>) {
    loop {
        tokio::time::sleep(heartbeat_delay(registrar.network())).await;

        if let Err(err) = registrar.register(false).await {
            warn!(error = %err, "Re-registration failed, will retry");
        }
    }
}
