use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::oauth::auth::{ClientAuthMethod, ClientConfig};
use crate::oauth::error::{ConfigError, StoreError};
use crate::oauth::storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use crate::oauth::transport::{DEFAULT_TIMEOUT, DEFAULT_USER_AGENT};

/// Environment variable that overrides `client.client_secret`.
pub const CLIENT_SECRET_ENV: &str = "OAUTH2CLIENT_CLIENT_SECRET";

const APP_DIR: &str = "oauth2client";
const CONFIG_FILE: &str = "config.toml";

/// Errors loading the configuration file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid client configuration: {0}")]
    Client(#[from] ConfigError),

    #[error("cannot determine the user config directory; pass --config")]
    NoConfigDir,
}

/// Top-level application configuration.
///
/// ```toml
/// [client]
/// client_id = "my-app"
/// authorization_endpoint = "https://auth.example/authorize"
/// token_endpoint = "https://auth.example/token"
/// redirect_uri = "http://127.0.0.1:51121/callback"
/// scopes = ["profile"]
///
/// [resource]
/// url = "https://api.example/me"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub client: ClientSettings,
    #[serde(default)]
    pub resource: ResourceSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub flow: FlowSettings,
}

/// OAuth client registration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub auth_method: ClientAuthMethod,
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_method", &self.auth_method)
            .finish()
    }
}

/// Protected resource fetched after authorization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceSettings {
    pub url: Option<String>,
}

/// Credential store backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Memory,
    Keyring,
}

/// Credential store selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Override the credential directory of the file backend.
    pub dir: Option<PathBuf>,
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// Authorization flow settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSettings {
    /// Key under which the credential is stored.
    pub user_id: String,
    /// Lifetime of an issued state token in seconds.
    pub state_ttl_secs: u64,
    /// How long the loopback listener waits for the redirect.
    pub callback_timeout_secs: u64,
    /// Open the authorization URL in the default browser.
    pub open_browser: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            user_id: "default".to_string(),
            state_ttl_secs: 600,
            callback_timeout_secs: 300,
            open_browser: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from
    /// `{config_dir}/oauth2client/config.toml` when `path` is `None`.
    ///
    /// The client secret is taken from [`CLIENT_SECRET_ENV`] when set.
    pub fn load(path: Option<&Path>) -> Result<Self, LoadError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path().ok_or(LoadError::NoConfigDir)?,
        };

        let contents = std::fs::read_to_string(&path).map_err(|source| LoadError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config = Self::from_toml(&contents).map_err(|source| LoadError::Parse {
            path: path.clone(),
            source,
        })?;
        config.apply_secret_override(std::env::var(CLIENT_SECRET_ENV).ok());

        // Fail at startup rather than mid-flow.
        config.client_config()?;

        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// `{config_dir}/oauth2client/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Replace the configured secret with `secret` when it is non-empty.
    pub fn apply_secret_override(&mut self, secret: Option<String>) {
        if let Some(secret) = secret.filter(|s| !s.is_empty()) {
            self.client.client_secret = Some(secret);
        }
    }

    /// Validate the `[client]` section.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let c = &self.client;
        let mut builder = ClientConfig::builder()
            .client_id(&c.client_id)
            .authorization_endpoint(&c.authorization_endpoint)
            .token_endpoint(&c.token_endpoint)
            .redirect_uri(&c.redirect_uri)
            .scopes(c.scopes.iter().cloned())
            .auth_method(c.auth_method);
        if let Some(secret) = &c.client_secret {
            builder = builder.client_secret(secret);
        }
        builder.build()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs.max(1))
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.flow.state_ttl_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.flow.callback_timeout_secs)
    }
}

impl StorageSettings {
    /// Open the configured backend.
    pub fn open(&self) -> Result<Arc<dyn CredentialStore>, StoreError> {
        match self.backend {
            StorageBackend::File => {
                let store = match &self.dir {
                    Some(dir) => FileCredentialStore::new(dir)?,
                    None => FileCredentialStore::app_data()?,
                };
                Ok(Arc::new(store))
            }
            StorageBackend::Memory => Ok(Arc::new(MemoryCredentialStore::new())),
            StorageBackend::Keyring => open_keyring(),
        }
    }
}

#[cfg(feature = "keyring")]
fn open_keyring() -> Result<Arc<dyn CredentialStore>, StoreError> {
    use crate::oauth::storage::KeyringCredentialStore;

    if !KeyringCredentialStore::is_available() {
        return Err(StoreError::Keyring("no system keyring available".into()));
    }
    Ok(Arc::new(KeyringCredentialStore::new()))
}

#[cfg(not(feature = "keyring"))]
fn open_keyring() -> Result<Arc<dyn CredentialStore>, StoreError> {
    Err(StoreError::Keyring(
        "keyring backend requires the `keyring` feature".into(),
    ))
}
