//! Semantic error types for the testpod harness.
//!
//! Each stage of the provisioning workflow owns a `thiserror` enum describing
//! the conditions a caller might inspect or retry. [`TestpodError`] aggregates
//! them so the harness facade can surface a single failed result carrying the
//! specific kind, while the binary converts to `eyre::Report` at its boundary.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// These are always reported before any I/O against the container engine or
/// the target service takes place.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error while merging layers.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised by the container engine connection and lifecycle controller.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// The image is not available locally and could not be pulled.
    #[error("image '{image}' is unavailable: {message}")]
    ImageUnavailable {
        /// The `name:tag` reference that was requested.
        image: String,
        /// A description of the lookup or pull failure.
        message: String,
    },

    /// Creating or starting the container failed.
    #[error("failed to start container for image '{image}': {message}")]
    StartFailed {
        /// The image the container was created from.
        image: String,
        /// A description of the failure.
        message: String,
    },

    /// The container did not reach the running state within the timeout.
    #[error("container '{container_id}' not running after {timeout_ms} ms")]
    NotReady {
        /// The ID of the container that was polled.
        container_id: String,
        /// The readiness timeout in milliseconds.
        timeout_ms: u128,
    },

    /// Inspecting the container failed while waiting for readiness.
    #[error("failed to inspect container '{container_id}': {message}")]
    InspectFailed {
        /// The ID of the inspected container.
        container_id: String,
        /// A description of the inspection failure.
        message: String,
    },

    /// Force-removing the container failed.
    #[error("failed to remove container '{container_id}': {message}")]
    RemoveFailed {
        /// The ID of the container.
        container_id: String,
        /// A description of the removal failure.
        message: String,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },

    /// A Tokio runtime for a blocking operation could not be created.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the runtime failure.
        message: String,
    },
}

/// Errors raised while mapping an internal port to an external endpoint.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// The container publishes no binding for the requested internal port.
    #[error("port '{port}' is not published by the container")]
    PortNotPublished {
        /// The internal port spec, e.g. `6379/tcp`.
        port: String,
    },

    /// The binding list for the port exists but carries no usable entry.
    #[error("port '{port}' has no host binding entries")]
    NoBindingEntries {
        /// The internal port spec, e.g. `6379/tcp`.
        port: String,
    },
}

/// Errors raised by service client implementations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Opening a connection to the service failed.
    #[error("failed to dial '{address}': {message}")]
    DialFailed {
        /// The `host:port` that was dialed.
        address: String,
        /// A description of the dial failure.
        message: String,
    },

    /// Opening a connection did not complete within the connect timeout.
    #[error("dialing '{address}' timed out after {timeout_ms} ms")]
    DialTimeout {
        /// The `host:port` that was dialed.
        address: String,
        /// The connect timeout in milliseconds.
        timeout_ms: u128,
    },

    /// The liveness round trip failed.
    #[error("service probe failed: {message}")]
    ProbeFailed {
        /// A description of the probe failure.
        message: String,
    },
}

/// Errors raised by the connection pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The eager dial-and-close at build time failed.
    #[error("endpoint '{endpoint}' is unreachable: {message}")]
    EndpointUnreachable {
        /// The endpoint that was dialed.
        endpoint: String,
        /// A description of the dial failure.
        message: String,
    },

    /// Borrowing a connection failed because dialing, probing or waiting for
    /// a free slot failed.
    #[error("failed to borrow connection from pool: {message}")]
    ExhaustedOrDialFailed {
        /// A description of the underlying failure.
        message: String,
    },
}

/// Top-level error type for testpod.
///
/// Aggregates all stage-specific errors so the harness facade returns a single
/// type that still identifies which stage failed.
#[derive(Debug, Error)]
pub enum TestpodError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred during container operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// An error occurred while resolving the service endpoint.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// An error occurred inside the connection pool.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// An error occurred talking to the service directly.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// A specialised `Result` type for testpod operations.
pub type Result<T> = std::result::Result<T, TestpodError>;
