use std::path::PathBuf;

use serde::Deserialize;

/// Broker connection options as they appear in configuration files.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct BrokerOptions {
    /// Host (and optional port) of the broker.
    pub host: String,

    /// Path to the trusted CA database.
    #[serde(default)]
    pub cert_db: Option<PathBuf>,

    /// Path to the client certificate.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// Path to the client key.
    #[serde(default)]
    pub cert_key: Option<PathBuf>,

    /// Password of the client key.
    #[serde(default)]
    pub cert_password: Option<String>,

    /// SASL user.
    #[serde(default)]
    pub sasl_user: Option<String>,

    /// SASL password.
    #[serde(default)]
    pub sasl_password: Option<String>,

    /// Space separated SASL mechanisms.
    #[serde(default)]
    pub allowed_mechs: Option<String>,
}

/// How a connection authenticates to the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Security {
    /// No TLS, no SASL.
    Plain,

    /// Mutual TLS with a client certificate.
    Tls {
        /// Trusted CA database.
        cert_db: PathBuf,
        /// Client certificate.
        cert_file: PathBuf,
        /// Client key.
        cert_key: PathBuf,
        /// Client key password.
        cert_password: String,
    },

    /// SASL over TLS.
    Sasl {
        /// Trusted CA database.
        cert_db: PathBuf,
        /// SASL user.
        user: String,
        /// SASL password.
        password: String,
        /// Space separated list of allowed mechanisms.
        allowed_mechs: String,
    },
}

/// Resolved connection settings for a broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Host (and optional port) of the broker.
    pub host: String,

    /// Authentication mode.
    pub security: Security,
}

impl ConnectionSettings {
    /// Plain settings for the given host.
    pub fn plain(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            security: Security::Plain,
        }
    }

    /// Broker URL; `amqps` whenever a CA database is in use.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = match self.security {
            Security::Plain => "amqp",
            Security::Tls { .. } | Security::Sasl { .. } => "amqps",
        };

        format!("{scheme}://{}", self.host)
    }
}

impl From<BrokerOptions> for ConnectionSettings {
    fn from(options: BrokerOptions) -> Self {
        let BrokerOptions {
            host,
            cert_db,
            cert_file,
            cert_key,
            cert_password,
            sasl_user,
            sasl_password,
            allowed_mechs,
        } = options;

        let security = match (cert_db, cert_file, cert_key, sasl_user, sasl_password) {
            (Some(cert_db), Some(cert_file), Some(cert_key), _, _) => Security::Tls {
                cert_db,
                cert_file,
                cert_key,
                cert_password: cert_password.unwrap_or_else(|| " ".to_string()),
            },
            (Some(cert_db), _, _, Some(user), Some(password)) => Security::Sasl {
                cert_db,
                user,
                password,
                allowed_mechs: allowed_mechs.unwrap_or_else(|| "PLAIN".to_string()),
            },
            _ => Security::Plain,
        };

        Self { host, security }
    }
}
