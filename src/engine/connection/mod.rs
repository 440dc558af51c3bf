//! Socket resolution and container engine connection.
//!
//! The engine endpoint is taken from configuration when present, otherwise
//! from the conventional `DOCKER_HOST`, `CONTAINER_HOST` and `PODMAN_HOST`
//! variables, otherwise from the platform default. Remote engines may
//! require TLS client certificates, which are located the way the Docker
//! CLI locates them: a directory holding `cert.pem`, `key.pem` and `ca.pem`.

mod error_classification;
mod health_check;

use bollard::Docker;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;

use self::error_classification::classify_connection_error;
use crate::error::{ConfigError, TestpodError};

/// Environment variable names checked in fallback order after configuration sources.
const FALLBACK_ENV_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Enables TLS when set to any non-empty value.
const TLS_VERIFY_ENV: &str = "DOCKER_TLS_VERIFY";

/// Directory holding the TLS client certificate material.
const CERT_PATH_ENV: &str = "DOCKER_CERT_PATH";

const CERT_FILE: &str = "cert.pem";
const KEY_FILE: &str = "key.pem";
const CA_FILE: &str = "ca.pem";

/// Connection timeout in seconds for Docker/Podman API connections.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Timeout in seconds for health check operations.
const HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;

/// Default socket path for Unix platforms.
#[cfg(unix)]
const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

/// Default socket path for Windows platforms.
#[cfg(windows)]
const DEFAULT_SOCKET: &str = "npipe:////./pipe/docker_engine";

/// Resolves container engine endpoints and TLS settings from the environment.
///
/// # Type Parameters
///
/// * `E` - An environment provider implementing the `mockable::Env` trait,
///   allowing for testable environment variable access.
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Creates a new socket resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Resolves the socket endpoint from fallback environment variables.
    ///
    /// Checks `DOCKER_HOST`, `CONTAINER_HOST` and `PODMAN_HOST` in order and
    /// returns the first non-empty value.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }

    /// Resolves TLS client material for the engine connection.
    ///
    /// TLS is enabled when `config_verify` is set or `DOCKER_TLS_VERIFY` is
    /// non-empty. The certificate directory comes from `config_cert_path`,
    /// falling back to `DOCKER_CERT_PATH`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when TLS is enabled without a
    /// certificate directory, and `ConfigError::InvalidValue` when the
    /// directory cannot be opened or lacks one of the required files.
    pub fn resolve_tls(
        &self,
        config_verify: bool,
        config_cert_path: Option<&Utf8Path>,
    ) -> Result<Option<TlsMaterials>, TestpodError> {
        let env_verify = self
            .env
            .string(TLS_VERIFY_ENV)
            .is_some_and(|value| !value.is_empty());

        if !config_verify && !env_verify {
            return Ok(None);
        }

        let cert_dir = config_cert_path
            .map(Utf8Path::to_path_buf)
            .or_else(|| {
                self.env
                    .string(CERT_PATH_ENV)
                    .filter(|value| !value.is_empty())
                    .map(Utf8PathBuf::from)
            })
            .ok_or_else(|| {
                TestpodError::from(ConfigError::MissingRequired {
                    field: String::from("tls.cert_path"),
                })
            })?;

        TlsMaterials::from_dir(&cert_dir).map(Some)
    }

    /// Returns the platform default socket path.
    ///
    /// On Unix systems, this is `unix:///var/run/docker.sock`.
    /// On Windows systems, this is `npipe:////./pipe/docker_engine`.
    #[must_use]
    pub const fn default_socket() -> &'static str {
        DEFAULT_SOCKET
    }
}

/// TLS client certificate material for a remote engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterials {
    /// Client certificate.
    pub cert: Utf8PathBuf,
    /// Client private key.
    pub key: Utf8PathBuf,
    /// Certificate authority bundle.
    pub ca: Utf8PathBuf,
}

impl TlsMaterials {
    /// Locate `cert.pem`, `key.pem` and `ca.pem` inside `cert_dir`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the directory cannot be
    /// opened or any of the three files is missing.
    pub fn from_dir(cert_dir: &Utf8Path) -> Result<Self, TestpodError> {
        let dir = Dir::open_ambient_dir(cert_dir, ambient_authority()).map_err(|error| {
            TestpodError::from(ConfigError::InvalidValue {
                field: String::from("tls.cert_path"),
                reason: format!("cannot open '{cert_dir}': {error}"),
            })
        })?;

        if let Some(missing) = [CERT_FILE, KEY_FILE, CA_FILE]
            .into_iter()
            .find(|file_name| !dir.exists(file_name))
        {
            return Err(TestpodError::from(ConfigError::InvalidValue {
                field: String::from("tls.cert_path"),
                reason: format!("'{cert_dir}' does not contain {missing}"),
            }));
        }

        Ok(Self {
            cert: cert_dir.join(CERT_FILE),
            key: cert_dir.join(KEY_FILE),
            ca: cert_dir.join(CA_FILE),
        })
    }
}

/// Classifies socket endpoint types for connection handling.
enum SocketType {
    /// Unix socket or Windows named pipe with explicit scheme.
    Socket,
    /// HTTP, HTTPS, or TCP endpoint (TCP is rewritten to HTTP).
    Http,
    /// Bare path without scheme prefix.
    BarePath,
}

impl SocketType {
    fn is_socket_scheme(socket: &str) -> bool {
        socket.starts_with("unix://") || socket.starts_with("npipe://")
    }

    fn is_http_scheme(socket: &str) -> bool {
        socket.starts_with("tcp://")
            || socket.starts_with("http://")
            || socket.starts_with("https://")
    }

    fn classify(socket: &str) -> Self {
        match (Self::is_socket_scheme(socket), Self::is_http_scheme(socket)) {
            (true, _) => Self::Socket,
            (_, true) => Self::Http,
            _ => Self::BarePath,
        }
    }
}

/// Connects to container engines and drives container lifecycles.
///
/// Connection supports Unix sockets, Windows named pipes, HTTP and HTTPS
/// endpoints, with or without TLS client certificates.
pub struct EngineConnector;

impl EngineConnector {
    /// Connect to the container engine at the specified socket path.
    ///
    /// Supports the following endpoint formats:
    /// - Unix sockets: `unix:///path/to/socket`
    /// - Windows named pipes: `npipe:////./pipe/name`
    /// - TCP: `tcp://host:port` (treated as HTTP connection)
    /// - HTTP: `http://host:port`
    /// - HTTPS: `https://host:port`
    /// - Bare paths: Paths starting with `\\` or `//` are treated as Windows
    ///   named pipes. All other paths are treated as Unix sockets.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::SocketNotFound` or
    /// `ContainerError::PermissionDenied` when the socket path is unusable,
    /// and `ContainerError::ConnectionFailed` for any other failure.
    pub fn connect(socket: &str) -> Result<Docker, TestpodError> {
        let socket_uri = match SocketType::classify(socket) {
            SocketType::Socket => String::from(socket),
            SocketType::Http => rewrite_scheme(socket, "http://"),
            SocketType::BarePath => Self::normalize_bare_path(socket),
        };

        let connected = match SocketType::classify(&socket_uri) {
            SocketType::Http => Docker::connect_with_http(
                &socket_uri,
                CONNECTION_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            SocketType::Socket | SocketType::BarePath => Docker::connect_with_socket(
                &socket_uri,
                CONNECTION_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
        };

        connected.map_err(|error| TestpodError::from(classify_connection_error(&error, &socket_uri)))
    }

    /// Connect to a remote engine using TLS client certificates.
    ///
    /// `tcp://` and `http://` endpoints are rewritten to `https://`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `socket` is not a network
    /// endpoint, and `ContainerError::ConnectionFailed` when the TLS client
    /// cannot be built.
    pub fn connect_with_tls(socket: &str, tls: &TlsMaterials) -> Result<Docker, TestpodError> {
        if !matches!(SocketType::classify(socket), SocketType::Http) {
            return Err(TestpodError::from(ConfigError::InvalidValue {
                field: String::from("engine_socket"),
                reason: format!("TLS requires a tcp:// or https:// endpoint, got '{socket}'"),
            }));
        }

        let https_socket = rewrite_scheme(socket, "https://");
        Docker::connect_with_ssl(
            &https_socket,
            tls.key.as_std_path(),
            tls.cert.as_std_path(),
            tls.ca.as_std_path(),
            CONNECTION_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|error| TestpodError::from(classify_connection_error(&error, &https_socket)))
    }

    /// Connect using the resolved socket and optional TLS material.
    ///
    /// # Errors
    ///
    /// See [`Self::connect`] and [`Self::connect_with_tls`].
    pub fn connect_with_fallback<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
        tls: Option<&TlsMaterials>,
    ) -> Result<Docker, TestpodError> {
        let socket = Self::resolve_socket(config_socket, resolver);
        tracing::debug!(socket = %socket, tls = tls.is_some(), "connecting to container engine");

        match tls {
            Some(materials) => Self::connect_with_tls(&socket, materials),
            None => Self::connect(&socket),
        }
    }

    /// Resolves the socket endpoint without establishing a connection.
    ///
    /// Resolution order:
    /// 1. `config_socket` (from CLI, config file, or `TESTPOD_ENGINE_SOCKET`)
    /// 2. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST` (via resolver)
    /// 3. Platform default socket
    ///
    /// The resolved value doubles as the host hint for endpoint resolution.
    #[must_use]
    pub fn resolve_socket<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> String {
        config_socket
            .filter(|socket| !socket.is_empty())
            .map(String::from)
            .or_else(|| resolver.resolve_from_env())
            .unwrap_or_else(|| String::from(SocketResolver::<E>::default_socket()))
    }

    /// Normalize a bare socket path to a URI with the appropriate scheme.
    ///
    /// Detection is based on path syntax, not the current platform.
    fn normalize_bare_path(path: &str) -> String {
        if path.starts_with("\\\\") || path.starts_with("//") {
            format!("npipe://{path}")
        } else {
            format!("unix://{path}")
        }
    }
}

/// Replace the scheme of a network endpoint.
fn rewrite_scheme(socket: &str, scheme: &str) -> String {
    socket
        .split_once("://")
        .map_or_else(|| format!("{scheme}{socket}"), |(_, rest)| format!("{scheme}{rest}"))
}
