use crate::error::ConfigError;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use swim_broker::{BrokerOptions, ConnectionSettings};
use swim_registry_http::{HttpRegistryClient, HttpRegistryClientOptions};

/// Default API prefix of the Subscription Manager.
pub use swim_registry_http::DEFAULT_BASE_PATH as DEFAULT_SM_BASE_PATH;

const fn default_true() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_base_path() -> String {
    DEFAULT_SM_BASE_PATH.to_string()
}

/// Where and how to reach the Subscription Manager.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Host (and optional port).
    pub host: String,

    /// Use https.
    #[serde(default = "default_true")]
    pub https: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Verify the server certificate.
    #[serde(default = "default_true")]
    pub verify: bool,

    /// API prefix.
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

impl RegistryConfig {
    /// The request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// HTTP client options for one client's credentials.
    #[must_use]
    pub fn client_options(&self, username: &str, password: &str) -> HttpRegistryClientOptions {
        HttpRegistryClientOptions {
            base_path: self.base_path.clone(),
            host: self.host.clone(),
            https: self.https,
            password: password.to_string(),
            timeout: self.timeout(),
            username: username.to_string(),
            verify: self.verify,
        }
    }

    /// Builds an HTTP registry client for one client's credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not form a valid URL or the HTTP client
    /// cannot be built.
    pub fn client(
        &self,
        username: &str,
        password: &str,
    ) -> Result<HttpRegistryClient, swim_registry_http::Error> {
        HttpRegistryClient::new(self.client_options(username, password))
    }
}

/// Logging section.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive such as `info,swim_pubsub=debug`.
    pub filter: Option<String>,
}

/// Configuration of a publishing or subscribing app.
///
/// ```yaml
/// broker:
///   host: broker.swim.example:5671
///   cert_db: /secrets/ca.pem
///   cert_file: /secrets/client.pem
///   cert_key: /secrets/client.key
/// subscription_manager:
///   host: sm.swim.example:8443
///   verify: false
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Broker section.
    pub broker: BrokerOptions,

    /// Subscription Manager section.
    pub subscription_manager: RegistryConfig,

    /// Logging section.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reads a configuration from a `.yml` or `.yaml` file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Extension` for any other extension, and IO or YAML
    /// errors otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let is_yaml = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| matches!(extension, "yml" | "yaml"));
        if !is_yaml {
            return Err(ConfigError::Extension(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_yaml(&contents)
    }

    /// Parses a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Yaml` if the text is not a valid configuration.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Broker connection settings derived from the broker section.
    #[must_use]
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings::from(self.broker.clone())
    }
}
