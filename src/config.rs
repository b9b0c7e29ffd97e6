//! Configuration for the geckos3 server
//!
//! Every field is settable via a CLI flag or its `GECKOS3_*` environment
//! variable; flags win over the environment, which wins over the defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on
    pub listen_addr: SocketAddr,

    /// Root directory owned by this process; one subdirectory per bucket
    pub data_dir: PathBuf,

    /// SigV4 access key ID (required when auth is enabled)
    pub access_key_id: Option<String>,

    /// SigV4 secret access key (required when auth is enabled)
    pub secret_access_key: Option<String>,

    /// Require SigV4 authentication on every request
    pub auth: bool,

    /// Write per-object JSON metadata sidecars. When off, object attributes
    /// are reconstructed from filesystem stat on read-back.
    pub metadata: bool,

    /// fsync object data and parent directories on commit
    pub fsync: bool,

    /// How often the multipart garbage collector sweeps staging directories
    pub multipart_gc_interval: Duration,

    /// Age past which an abandoned multipart staging directory is reaped
    pub multipart_max_age: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            data_dir: PathBuf::from("./data"),
            access_key_id: None,
            secret_access_key: None,
            auth: false,
            metadata: true,
            fsync: false,
            multipart_gc_interval: Duration::from_secs(3600),
            multipart_max_age: Duration::from_secs(24 * 3600),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:9000".parse().expect("static default address")
}

impl Config {
    /// True when every request must carry a valid SigV4 signature.
    pub fn auth_enabled(&self) -> bool {
        self.auth
    }

    /// Check that the configuration is runnable. Called once at startup;
    /// a failure here is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth {
            let key_ok = self.access_key_id.as_deref().is_some_and(|k| !k.is_empty());
            let secret_ok = self
                .secret_access_key
                .as_deref()
                .is_some_and(|s| !s.is_empty());
            if !key_ok || !secret_ok {
                return Err(ConfigError::MissingCredentials);
            }
        }
        if self.multipart_gc_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "multipart GC interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("auth is enabled but access key or secret key is not set")]
    MissingCredentials,

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
