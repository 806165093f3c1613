use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

/// CRM property keys the handler always writes. Configurable property keys
/// must not collide with these.
pub const RESERVED_PROPERTIES: &[&str] = &["email", "firstname", "lastname", "company"];

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener and admin listener cannot share {0}")]
    ListenerConflict(String),

    #[error("Webhook path must start with '/': {0}")]
    InvalidWebhookPath(String),

    #[error("Empty payload field name for {0}")]
    EmptyFieldName(&'static str),

    #[error("Payload field name used twice: {0}")]
    DuplicateFieldName(String),

    #[error("Empty CRM property key for {0}")]
    EmptyPropertyKey(&'static str),

    #[error("CRM property key collides with another property: {0}")]
    DuplicatePropertyKey(String),
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }

    fn is_wildcard(&self) -> bool {
        matches!(self.host.as_str(), "0.0.0.0" | "::" | "[::]" | "")
    }

    /// Whether binding both listeners would fight over the same socket. A
    /// wildcard host claims the port on every interface.
    pub fn overlaps(&self, other: &Listener) -> bool {
        self.port == other.port
            && (self.host == other.host || self.is_wildcard() || other.is_wildcard())
    }

    fn default_admin() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3001,
        }
    }
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

/// Connection settings for the CRM REST API.
#[derive(Clone, Deserialize, PartialEq)]
pub struct CrmConfig {
    /// Base URL the `/crm/v3/...` paths are joined onto.
    #[serde(default = "CrmConfig::default_base_url")]
    pub base_url: Url,
    /// Private-app access token. Requests fail with a configuration error
    /// while this is unset.
    #[serde(default)]
    pub access_token: Option<String>,
}

impl CrmConfig {
    fn default_base_url() -> Url {
        Url::parse("https://api.hubapi.com").expect("static url is valid")
    }

    /// The configured token, ignoring empty strings.
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

impl Default for CrmConfig {
    fn default() -> Self {
        CrmConfig {
            base_url: Self::default_base_url(),
            access_token: None,
        }
    }
}

// Hand-written so the token never ends up in logs.
impl std::fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmConfig")
            .field("base_url", &self.base_url.as_str())
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Names of the inbound JSON fields carrying each logical value.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct FieldMapping {
    pub pool_id: String,
    pub business_name: String,
    pub full_name: String,
    pub email: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        FieldMapping {
            pool_id: "pool_id".into(),
            business_name: "business_name".into(),
            full_name: "full_name".into(),
            email: "email_address".into(),
        }
    }
}

impl FieldMapping {
    fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("pool_id", &self.pool_id),
            ("business_name", &self.business_name),
            ("full_name", &self.full_name),
            ("email", &self.email),
        ];

        let mut seen = HashSet::new();
        for (logical, name) in fields {
            if name.is_empty() {
                return Err(ValidationError::EmptyFieldName(logical));
            }
            if !seen.insert(name.as_str()) {
                return Err(ValidationError::DuplicateFieldName(name.clone()));
            }
        }
        Ok(())
    }
}

/// CRM property keys for the values that differ between payload variants.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PropertyMapping {
    /// Property receiving the pool identifier.
    pub pool_id: String,
    /// Property receiving `lead_source_value`.
    pub lead_source: String,
    pub lead_source_value: String,
}

impl Default for PropertyMapping {
    fn default() -> Self {
        PropertyMapping {
            pool_id: "pool_id__phil_only_".into(),
            lead_source: "source__latest_".into(),
            lead_source_value: "Lite Sign up".into(),
        }
    }
}

impl PropertyMapping {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.pool_id.is_empty() {
            return Err(ValidationError::EmptyPropertyKey("pool_id"));
        }
        if self.lead_source.is_empty() {
            return Err(ValidationError::EmptyPropertyKey("lead_source"));
        }

        for key in [&self.pool_id, &self.lead_source] {
            if RESERVED_PROPERTIES.contains(&key.as_str()) {
                return Err(ValidationError::DuplicatePropertyKey(key.clone()));
            }
        }
        if self.pool_id == self.lead_source {
            return Err(ValidationError::DuplicatePropertyKey(self.pool_id.clone()));
        }
        Ok(())
    }
}

/// How an inbound payload maps onto a CRM contact.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct PayloadMapping {
    #[serde(default)]
    pub fields: FieldMapping,
    #[serde(default)]
    pub properties: PropertyMapping,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for webhook traffic
    #[serde(default)]
    pub listener: Listener,
    /// Listener for `/health` and `/ready`
    #[serde(default = "Listener::default_admin")]
    pub admin_listener: Listener,
    #[serde(default = "Config::default_webhook_path")]
    pub webhook_path: String,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub payload: PayloadMapping,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            admin_listener: Listener::default_admin(),
            webhook_path: Self::default_webhook_path(),
            crm: CrmConfig::default(),
            payload: PayloadMapping::default(),
        }
    }
}

impl Config {
    fn default_webhook_path() -> String {
        "/api/webhook".into()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener.overlaps(&self.admin_listener) {
            return Err(ValidationError::ListenerConflict(format!(
                "{}:{}",
                self.listener.host, self.listener.port
            )));
        }

        if !self.webhook_path.starts_with('/') {
            return Err(ValidationError::InvalidWebhookPath(
                self.webhook_path.clone(),
            ));
        }

        self.payload.fields.validate()?;
        self.payload.properties.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
listener:
    host: "0.0.0.0"
    port: 8080
admin_listener:
    host: "127.0.0.1"
    port: 8081
webhook_path: /hooks/mailparser
crm:
    base_url: "http://crm.internal:9000"
    access_token: pat-na1-abc
payload:
    fields:
        pool_id: pool
        business_name: company_name
        full_name: name
        email: email
    properties:
        pool_id: pool_id
        lead_source: lead_source__latest_
        lead_source_value: Pool Sign up
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.webhook_path, "/hooks/mailparser");
        assert_eq!(config.crm.base_url.as_str(), "http://crm.internal:9000/");
        assert_eq!(config.crm.token(), Some("pat-na1-abc"));
        assert_eq!(config.payload.fields.business_name, "company_name");
        assert_eq!(config.payload.properties.pool_id, "pool_id");
        assert_eq!(
            config.payload.properties.lead_source_value,
            "Pool Sign up"
        );
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config, Config::default());

        assert_eq!(config.listener.port, 3000);
        assert_eq!(config.admin_listener.port, 3001);
        assert_eq!(config.webhook_path, "/api/webhook");
        assert_eq!(config.crm.base_url.as_str(), "https://api.hubapi.com/");
        assert_eq!(config.crm.token(), None);
        assert_eq!(config.payload.fields.email, "email_address");
        assert_eq!(config.payload.properties.pool_id, "pool_id__phil_only_");
        assert_eq!(config.payload.properties.lead_source, "source__latest_");
    }

    #[test]
    fn test_partial_mapping_keeps_other_defaults() {
        let yaml = r#"
payload:
    properties:
        pool_id: pool_id
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.payload.properties.pool_id, "pool_id");
        assert_eq!(config.payload.properties.lead_source, "source__latest_");
        assert_eq!(config.payload.fields, FieldMapping::default());
    }

    #[test]
    fn test_listener_overlap() {
        let listener = |host: &str, port| Listener {
            host: host.into(),
            port,
        };

        assert!(listener("0.0.0.0", 3000).overlaps(&listener("127.0.0.1", 3000)));
        assert!(listener("10.0.0.5", 3000).overlaps(&listener("::", 3000)));
        assert!(listener("127.0.0.1", 3000).overlaps(&listener("127.0.0.1", 3000)));
        assert!(!listener("127.0.0.1", 3000).overlaps(&listener("10.0.0.5", 3000)));
        assert!(!listener("0.0.0.0", 3000).overlaps(&listener("0.0.0.0", 3001)));
    }

    #[test]
    fn test_empty_token_is_unset() {
        let config: Config = serde_yaml::from_str("crm: {access_token: ''}").unwrap();
        assert_eq!(config.crm.token(), None);
    }

    #[test]
    fn test_debug_redacts_token() {
        let config: Config =
            serde_yaml::from_str("crm: {access_token: super-secret}").unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_validation_errors() {
        let base_config = Config::default();

        let mut config = base_config.clone();
        config.listener.port = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidPort
        ));

        let mut config = base_config.clone();
        config.admin_listener = config.listener.clone();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::ListenerConflict(_)
        ));

        let mut config = base_config.clone();
        config.admin_listener.port = config.listener.port;
        assert_eq!(config.listener.host, "0.0.0.0");
        assert_eq!(config.admin_listener.host, "127.0.0.1");
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::ListenerConflict(_)
        ));

        let mut config = base_config.clone();
        config.webhook_path = "api/webhook".into();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidWebhookPath(_)
        ));

        let mut config = base_config.clone();
        config.payload.fields.full_name = "".into();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::EmptyFieldName("full_name")
        ));

        let mut config = base_config.clone();
        config.payload.fields.email = "pool_id".into();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::DuplicateFieldName(_)
        ));

        let mut config = base_config.clone();
        config.payload.properties.lead_source = "".into();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::EmptyPropertyKey("lead_source")
        ));

        let mut config = base_config.clone();
        config.payload.properties.pool_id = "company".into();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::DuplicatePropertyKey(_)
        ));

        let mut config = base_config;
        config.payload.properties.lead_source = config.payload.properties.pool_id.clone();
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::DuplicatePropertyKey(_)
        ));
    }

    #[test]
    fn test_deserialization_errors() {
        assert!(serde_yaml::from_str::<Config>("crm: {base_url: not-a-url}").is_err());
        assert!(serde_yaml::from_str::<Config>("listener: {host: 0.0.0.0, port: http}").is_err());
        assert!(serde_yaml::from_str::<Config>("listener: {host: 0.0.0.0}").is_err());
    }
}
