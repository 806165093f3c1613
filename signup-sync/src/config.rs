use contact_upsert::config::{Config as ContactUpsertConfig, ValidationError};
use serde::Deserialize;
use std::fs::File;

/// Environment variable consulted when the config file carries no token.
pub const ACCESS_TOKEN_ENV: &str = "HUBSPOT_ACCESS_TOKEN";

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    pub sentry_dsn: Option<String>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".into()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Self::default_level(),
            sentry_dsn: None,
        }
    }
}

#[derive(Clone, Deserialize, Debug, Default, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default)]
    pub contact_upsert: ContactUpsertConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let mut config: Config = serde_yaml::from_reader(file)?;
        config.fill_access_token(|key| std::env::var(key).ok());
        config.contact_upsert.validate()?;

        Ok(config)
    }

    /// Takes the access token from `lookup(ACCESS_TOKEN_ENV)` when the file
    /// leaves it unset.
    fn fill_access_token(&mut self, lookup: impl FnOnce(&str) -> Option<String>) {
        let crm = &mut self.contact_upsert.crm;
        if crm.token().is_none() {
            crm.access_token = lookup(ACCESS_TOKEN_ENV).filter(|t| !t.is_empty());
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    ValidationError(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn full_config() {
        let yaml = r#"
            logging:
                level: debug
                sentry_dsn: https://key@sentry.example.com/1
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            contact_upsert:
                listener:
                    host: 0.0.0.0
                    port: 8080
                admin_listener:
                    host: 127.0.0.1
                    port: 8081
                crm:
                    access_token: pat-from-file
                payload:
                    properties:
                        pool_id: pool_id
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.common.logging.level, "debug");
        assert_eq!(
            config.common.logging.sentry_dsn.as_deref(),
            Some("https://key@sentry.example.com/1")
        );
        assert_eq!(
            config.common.metrics,
            Some(MetricsConfig {
                statsd_host: "127.0.0.1".into(),
                statsd_port: 8125
            })
        );
        assert_eq!(config.contact_upsert.listener.port, 8080);
        assert_eq!(config.contact_upsert.crm.token(), Some("pat-from-file"));
        assert_eq!(config.contact_upsert.payload.properties.pool_id, "pool_id");
    }

    #[test]
    fn empty_config_uses_defaults() {
        let tmp = write_tmp_file("{}");
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.common, CommonConfig::default());
        assert_eq!(config.common.logging.level, "info");
        assert_eq!(config.contact_upsert.webhook_path, "/api/webhook");
    }

    #[test]
    fn token_falls_back_to_environment() {
        let mut config: Config = serde_yaml::from_str("{}").unwrap();
        config.fill_access_token(|key| {
            assert_eq!(key, ACCESS_TOKEN_ENV);
            Some("pat-from-env".into())
        });
        assert_eq!(config.contact_upsert.crm.token(), Some("pat-from-env"));
    }

    #[test]
    fn file_token_wins_over_environment() {
        let mut config: Config =
            serde_yaml::from_str("contact_upsert: {crm: {access_token: pat-from-file}}").unwrap();
        config.fill_access_token(|_| Some("pat-from-env".into()));
        assert_eq!(config.contact_upsert.crm.token(), Some("pat-from-file"));
    }

    #[test]
    fn empty_environment_token_is_unset() {
        let mut config: Config = serde_yaml::from_str("{}").unwrap();
        config.fill_access_token(|_| Some(String::new()));
        assert_eq!(config.contact_upsert.crm.token(), None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let tmp = write_tmp_file("contact_upsert: {webhook_path: no-slash}");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ValidationError(
                ValidationError::InvalidWebhookPath(_)
            ))
        ));

        let tmp = write_tmp_file("contact_upsert: [");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));

        assert!(matches!(
            Config::from_file(std::path::Path::new("/nonexistent/signup-sync.yaml")),
            Err(ConfigError::LoadError(_))
        ));
    }
}
