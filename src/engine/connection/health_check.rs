//! Engine preflight: ping with a timeout before any provisioning.

use std::time::Duration;

use bollard::Docker;

use super::{EngineConnector, HEALTH_CHECK_TIMEOUT_SECS, SocketResolver, TlsMaterials};
use crate::error::{ContainerError, TestpodError};

impl EngineConnector {
    async fn ping_with_timeout(docker: &Docker) -> Result<(), TestpodError> {
        let timeout = Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS);

        tokio::time::timeout(timeout, docker.ping())
            .await
            .map_err(|_| {
                TestpodError::from(ContainerError::HealthCheckTimeout {
                    seconds: HEALTH_CHECK_TIMEOUT_SECS,
                })
            })?
            .map_err(|error| {
                TestpodError::from(ContainerError::HealthCheckFailed {
                    message: error.to_string(),
                })
            })?;
        Ok(())
    }

    /// Verify the container engine is responsive (async version).
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::HealthCheckFailed` if the engine does not
    /// respond correctly, or `ContainerError::HealthCheckTimeout` if it does
    /// not respond within ten seconds.
    pub async fn health_check_async(docker: &Docker) -> Result<(), TestpodError> {
        Self::ping_with_timeout(docker).await
    }

    /// Verify the container engine is responsive.
    ///
    /// Creates a dedicated Tokio runtime; prefer
    /// [`Self::health_check_async`] inside an async context.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::RuntimeCreationFailed` if the runtime cannot
    /// be created, otherwise see [`Self::health_check_async`].
    pub fn health_check(docker: &Docker) -> Result<(), TestpodError> {
        let rt = Self::create_runtime()?;
        rt.block_on(Self::health_check_async(docker))
    }

    /// Create a Tokio runtime for synchronous entry points.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::RuntimeCreationFailed` when the runtime
    /// cannot be built.
    pub fn create_runtime() -> Result<tokio::runtime::Runtime, TestpodError> {
        tokio::runtime::Runtime::new().map_err(|error| {
            TestpodError::from(ContainerError::RuntimeCreationFailed {
                message: error.to_string(),
            })
        })
    }

    /// Connect using fallback resolution and verify the engine responds
    /// (async version).
    ///
    /// # Errors
    ///
    /// Returns any connection error from [`Self::connect_with_fallback`] and
    /// any health check error from [`Self::health_check_async`].
    pub async fn connect_and_verify_async<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
        tls: Option<&TlsMaterials>,
    ) -> Result<Docker, TestpodError> {
        let docker = Self::connect_with_fallback(config_socket, resolver, tls)?;
        Self::ping_with_timeout(&docker).await?;
        tracing::debug!("container engine responded to ping");
        Ok(docker)
    }

    /// Connect using fallback resolution and verify the engine responds.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::RuntimeCreationFailed` if the runtime cannot
    /// be created, otherwise see [`Self::connect_and_verify_async`].
    pub fn connect_and_verify<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
        tls: Option<&TlsMaterials>,
    ) -> Result<Docker, TestpodError> {
        let rt = Self::create_runtime()?;
        rt.block_on(Self::connect_and_verify_async(config_socket, resolver, tls))
    }
}
