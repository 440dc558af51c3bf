//! Configuration data types for testpod.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::engine::{
    DEFAULT_POLL_INTERVAL, DEFAULT_READINESS_TIMEOUT, ImageReference, ReadinessPolicy,
};
use crate::error::{ConfigError, Result};
use crate::pool::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_ACTIVE, DEFAULT_MAX_IDLE, DEFAULT_WAIT_TIMEOUT,
    PoolSettings,
};

/// Environment variable consulted when no service address is configured.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Internal port probed when none is configured.
pub const DEFAULT_SERVICE_PORT: &str = "6379/tcp";

/// TLS settings for a remote container engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Require TLS client authentication against the engine.
    pub verify: bool,

    /// Directory holding `cert.pem`, `key.pem` and `ca.pem`.
    pub cert_path: Option<Utf8PathBuf>,
}

/// Readiness polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Overall readiness timeout in milliseconds.
    pub timeout_ms: u64,

    /// Interval between inspections in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: duration_millis(DEFAULT_READINESS_TIMEOUT),
            poll_interval_ms: duration_millis(DEFAULT_POLL_INTERVAL),
        }
    }
}

impl ReadinessConfig {
    /// Convert to the policy consumed by the lifecycle controller.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when either value is zero.
    pub fn policy(&self) -> Result<ReadinessPolicy> {
        require_non_zero("readiness.timeout_ms", self.timeout_ms)?;
        require_non_zero("readiness.poll_interval_ms", self.poll_interval_ms)?;

        Ok(ReadinessPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        })
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of connections kept idle between borrows.
    pub max_idle: usize,

    /// Maximum number of connections alive at once.
    pub max_active: usize,

    /// Idle eviction threshold in seconds.
    pub idle_timeout_secs: u64,

    /// Dial timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// Time to wait for a free connection in milliseconds.
    pub wait_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
            max_active: DEFAULT_MAX_ACTIVE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            connect_timeout_ms: duration_millis(DEFAULT_CONNECT_TIMEOUT),
            wait_timeout_ms: duration_millis(DEFAULT_WAIT_TIMEOUT),
        }
    }
}

impl PoolConfig {
    /// Convert to validated pool settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `max_idle` is zero or
    /// `max_active` is below it.
    pub fn settings(&self) -> Result<PoolSettings> {
        let settings = PoolSettings {
            max_idle: self.max_idle,
            max_active: self.max_active,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            wait_timeout: Duration::from_millis(self.wait_timeout_ms),
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// The service under test.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Image to provision, e.g. `redis:7-alpine`.
    pub image: Option<String>,

    /// Internal port spec to resolve, e.g. `6379/tcp`.
    pub port: String,

    /// Address of an already running service, used by `ping`.
    pub address: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            image: None,
            port: String::from(DEFAULT_SERVICE_PORT),
            address: None,
        }
    }
}

impl ServiceConfig {
    /// Parse the configured image reference.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when no image is configured.
    pub fn image_reference(&self) -> Result<ImageReference> {
        let image = self.image.as_deref().ok_or_else(|| ConfigError::MissingRequired {
            field: String::from("service.image"),
        })?;
        ImageReference::parse(image)
    }

    /// Resolve the address of an existing service.
    ///
    /// Uses `service.address`, falling back to `DATABASE_URL`. Both accept
    /// `host:port` or a URL such as `redis://host:port/0`. Any userinfo
    /// before `@` in the URL is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when neither is set and
    /// `ConfigError::InvalidValue` when the value has no port.
    pub fn endpoint<E: mockable::Env>(&self, env: &E) -> Result<Endpoint> {
        let (field, raw) = match self.address.as_deref().filter(|value| !value.is_empty()) {
            Some(address) => ("service.address", String::from(address)),
            None => (
                DATABASE_URL_ENV,
                env.string(DATABASE_URL_ENV)
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| ConfigError::MissingRequired {
                        field: String::from("service.address"),
                    })?,
            ),
        };

        let authority = raw
            .split_once("://")
            .map_or(raw.as_str(), |(_, rest)| rest)
            .split('/')
            .next()
            .unwrap_or_default();
        // Credentials never reach the endpoint or error text.
        let host_port = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host_port)| host_port);

        Endpoint::parse(host_port).ok_or_else(|| {
            ConfigError::InvalidValue {
                field: String::from(field),
                reason: format!("expected host:port, got '{host_port}'"),
            }
            .into()
        })
    }
}

/// Root harness configuration.
///
/// Loaded with layered precedence (lowest to highest): defaults,
/// configuration file, environment variables, command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `TESTPOD_CONFIG_PATH` environment variable
/// 2. `.testpod.toml` in the current working directory
/// 3. `.testpod.toml` in the home directory
/// 4. `~/.config/testpod/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "TESTPOD",
    post_merge_hook,
    discovery(
        app_name = "testpod",
        env_var = "TESTPOD_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".testpod.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct HarnessConfig {
    /// The container engine socket path or URL.
    pub engine_socket: Option<String>,

    /// Engine TLS configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub tls: TlsConfig,

    /// Readiness polling configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub readiness: ReadinessConfig,

    /// Connection pool configuration.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub pool: PoolConfig,

    /// Service under test.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub service: ServiceConfig,
}

impl PostMergeHook for HarnessConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Blank strings from the environment mean "unset".
        if self.engine_socket.as_deref().is_some_and(|socket| socket.trim().is_empty()) {
            self.engine_socket = None;
        }
        if self.service.image.as_deref().is_some_and(|image| image.trim().is_empty()) {
            self.service.image = None;
        }
        Ok(())
    }
}

fn require_non_zero(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field: String::from(field),
            reason: String::from("must be greater than zero"),
        }
        .into());
    }
    Ok(())
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
