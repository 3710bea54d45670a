use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    use std::io::Read;

    let mut file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let mut yaml_string = String::new();
    file.read_to_string(&mut yaml_string)?;

    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(&yaml_string);

    let mut config: Config = serde_yaml::from_str(&yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        ))
    })?;

    config.source.path = expand_tilde(&config.source.path);
    config.registration.ssl_dir = expand_tilde(&config.registration.ssl_dir);

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.node.id.is_empty() {
        errors.push("node.id must not be empty".to_string());
    }
    if config.node.wallet_address.is_empty() {
        errors.push("node.wallet_address must not be empty".to_string());
    }
    if !config.collector.url.starts_with("http://") && !config.collector.url.starts_with("https://")
    {
        errors.push(format!(
            "collector.url must be an http(s) URL, got '{}'",
            config.collector.url
        ));
    }
    if !config.registration.orchestrator_url.starts_with("http://")
        && !config.registration.orchestrator_url.starts_with("https://")
    {
        errors.push(format!(
            "registration.orchestrator_url must be an http(s) URL, got '{}'",
            config.registration.orchestrator_url
        ));
    }
    if config.source.poll_floor > config.source.poll_interval {
        errors.push("source.poll_floor must not exceed source.poll_interval".to_string());
    }
    if config.collector.submit_floor > config.collector.submit_interval {
        errors.push("collector.submit_floor must not exceed collector.submit_interval".to_string());
    }
    if config.source.max_log_size == 0 {
        errors.push("source.max_log_size must be greater than zero".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_YAML: &str = r#"
node:
  id: node-1234
  wallet_address: f1abcdef
  token: secret-token
source:
  path: /var/log/nginx/node-access.log
  testing_cid: bafyTEST
collector:
  url: https://collector.example.com/nodes/logs
registration:
  orchestrator_url: https://orchestrator.example.com
  ssl_dir: /var/lib/bandwatch/ssl
"#;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(VALID_YAML);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.node.id, "node-1234");
        assert_eq!(config.source.testing_cid.as_deref(), Some("bafyTEST"));
        // Defaults
        assert_eq!(config.source.poll_interval.as_secs(), 10);
        assert_eq!(config.collector.submit_interval.as_secs(), 60);
        assert_eq!(config.collector.timeout.as_secs(), 30);
        assert_eq!(config.source.max_log_size, 1024 * 1024 * 1024);
        assert!(config.influx.is_none());
    }

    #[test]
    fn test_intervals_parse_humantime() {
        let yaml = VALID_YAML.replace(
            "collector:\n  url: https://collector.example.com/nodes/logs",
            "collector:\n  url: https://collector.example.com/nodes/logs\n  submit_interval: 2m\n  timeout: 15s",
        );
        let file = write_config(&yaml);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.collector.submit_interval.as_secs(), 120);
        assert_eq!(config.collector.timeout.as_secs(), 15);
    }

    #[test]
    fn test_malformed_yaml_reports_file_context() {
        let file = write_config("node: [not, a, mapping");
        let err = load_config(file.path()).unwrap_err();

        assert!(matches!(err, ConfigError::Io(_)));
        // The YAML error is wrapped with the offending file's path.
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_validation_rejects_bad_url() {
        let yaml = VALID_YAML.replace(
            "url: https://collector.example.com/nodes/logs",
            "url: not-a-url",
        );
        let file = write_config(&yaml);
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationList(_)));
    }

    #[test]
    fn test_validation_rejects_empty_node_id() {
        let yaml = VALID_YAML.replace("id: node-1234", "id: \"\"");
        let file = write_config(&yaml);
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_env_expansion_in_token() {
        std::env::set_var("BW_TEST_TOKEN", "from-env");
        let yaml = VALID_YAML.replace("token: secret-token", "token: $env{BW_TEST_TOKEN}");
        let file = write_config(&yaml);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.node.token, "from-env");
        std::env::remove_var("BW_TEST_TOKEN");
    }
}
