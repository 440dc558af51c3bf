//! Provisioning, readiness polling and teardown of service containers.
//!
//! A container moves through `Created → Starting → {Running | Failed}` and
//! finally `Removed`. Removal is only reachable through
//! [`EngineConnector::release_async`], which is idempotent and force-removes
//! regardless of the running state.
//!
//! Starting a container only tells us the runtime has begun bringing it up,
//! so readiness is observed by polling inspection at a fixed interval bounded
//! by an overall timeout.

use std::time::Duration;

use bollard::models::{
    ContainerCreateBody, ContainerInspectResponse, ContainerStateStatusEnum, HostConfig, PortMap,
};
use tokio::time::{sleep, timeout};

use super::EngineConnector;
use super::image::{ImageReference, resolve_image_id};
use super::runtime::ContainerRuntime;
use crate::endpoint::{HostBinding, PortBindings};
use crate::error::{ContainerError, TestpodError};

const NOT_FOUND_STATUS: u16 = 404;

/// Default interval between readiness inspections.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default overall readiness timeout.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle state of a provisioned container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningState {
    /// Created by the runtime but not yet started.
    Created,
    /// Start was issued; the runtime is bringing the container up.
    Starting,
    /// The runtime reports the container running.
    Running,
    /// The container exited or died before becoming ready.
    Failed,
    /// The container was removed. Terminal.
    Removed,
}

/// A container owned by a single harness scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    id: String,
    image: ImageReference,
    state: RunningState,
    port_bindings: PortBindings,
}

impl ContainerHandle {
    /// Create a handle for a container that has just been created.
    #[must_use]
    pub fn new(id: impl Into<String>, image: ImageReference) -> Self {
        Self {
            id: id.into(),
            image,
            state: RunningState::Created,
            port_bindings: PortBindings::new(),
        }
    }

    /// Return the container ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Return the image the container was created from.
    #[must_use]
    pub const fn image(&self) -> &ImageReference {
        &self.image
    }

    /// Return the last observed lifecycle state.
    #[must_use]
    pub const fn state(&self) -> RunningState {
        self.state
    }

    /// Return the published port bindings from the last inspection.
    #[must_use]
    pub const fn port_bindings(&self) -> &PortBindings {
        &self.port_bindings
    }

    /// Attach port bindings, e.g. when reconstructing a handle in tests.
    #[must_use]
    pub fn with_port_bindings(mut self, port_bindings: PortBindings) -> Self {
        self.port_bindings = port_bindings;
        self
    }

    /// Override the lifecycle state.
    #[must_use]
    pub const fn with_state(mut self, state: RunningState) -> Self {
        self.state = state;
        self
    }
}

/// Bounds for readiness polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Overall time allowed for the container to report running.
    pub timeout: Duration,

    /// Interval between inspections.
    pub poll_interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_READINESS_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What a single inspection says about readiness.
enum Observation {
    Running(PortBindings),
    Pending,
    Exited(String),
}

impl EngineConnector {
    /// Create and start a container for `image` (async version).
    ///
    /// The image is resolved against the local image list and pulled once if
    /// absent. All exposed ports are published to ephemeral host ports. If
    /// start fails, the partially created container is removed before the
    /// error is returned.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ImageUnavailable` when the image cannot be
    /// found or pulled, and `ContainerError::StartFailed` when the engine
    /// rejects the create or start request.
    pub async fn provision_async<R: ContainerRuntime>(
        runtime: &R,
        image: &ImageReference,
    ) -> Result<ContainerHandle, TestpodError> {
        let image_id = resolve_image_id(runtime, image).await?;

        let response = runtime
            .create_container(None, build_service_body(&image_id))
            .await
            .map_err(|error| start_failed(image, format!("create failed: {error}")))?;

        let mut handle = ContainerHandle::new(response.id, image.clone());
        tracing::debug!(container_id = %handle.id(), image = %image, "container created");

        if let Err(error) = runtime.start_container(handle.id()).await {
            let start_error = start_failed(image, format!("start failed: {error}"));
            Self::release_logged(runtime, &mut handle).await;
            return Err(start_error);
        }

        handle.state = RunningState::Starting;
        tracing::info!(container_id = %handle.id(), image = %image, "container started");
        Ok(handle)
    }

    /// Create and start a container for `image`.
    ///
    /// This synchronous helper blocks on [`Self::provision_async`] using an
    /// existing Tokio runtime handle supplied by the caller.
    ///
    /// # Errors
    ///
    /// See [`Self::provision_async`].
    pub fn provision<R: ContainerRuntime>(
        rt: &tokio::runtime::Handle,
        runtime: &R,
        image: &ImageReference,
    ) -> Result<ContainerHandle, TestpodError> {
        rt.block_on(Self::provision_async(runtime, image))
    }

    /// Poll until the runtime reports the container running (async version).
    ///
    /// On success the handle's port bindings are refreshed from the final
    /// inspection. On any failure the container is released before the error
    /// is returned, so a timed-out container is never left behind.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::NotReady` when `policy.timeout` elapses,
    /// `ContainerError::StartFailed` when the container exits before becoming
    /// ready, and `ContainerError::InspectFailed` when inspection fails.
    pub async fn await_running_async<R: ContainerRuntime>(
        runtime: &R,
        handle: &mut ContainerHandle,
        policy: ReadinessPolicy,
    ) -> Result<(), TestpodError> {
        let result = Self::poll_until_running(runtime, handle, policy).await;

        if result.is_err() {
            Self::release_logged(runtime, handle).await;
        }

        result
    }

    /// Poll until the runtime reports the container running.
    ///
    /// This synchronous helper blocks the calling thread on
    /// [`Self::await_running_async`] using the supplied runtime handle.
    ///
    /// # Errors
    ///
    /// See [`Self::await_running_async`].
    pub fn await_running<R: ContainerRuntime>(
        rt: &tokio::runtime::Handle,
        runtime: &R,
        handle: &mut ContainerHandle,
        policy: ReadinessPolicy,
    ) -> Result<(), TestpodError> {
        rt.block_on(Self::await_running_async(runtime, handle, policy))
    }

    /// Force-remove the container (async version).
    ///
    /// Idempotent: a handle already in the removed state is left untouched
    /// and a `404` from the runtime counts as already removed.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::RemoveFailed` when the runtime rejects the
    /// removal for any other reason. The handle keeps its state in that case.
    pub async fn release_async<R: ContainerRuntime>(
        runtime: &R,
        handle: &mut ContainerHandle,
    ) -> Result<(), TestpodError> {
        if handle.state == RunningState::Removed {
            return Ok(());
        }

        match runtime.remove_container(handle.id(), true).await {
            Ok(()) => {}
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: NOT_FOUND_STATUS,
                ..
            }) => {
                tracing::debug!(container_id = %handle.id(), "container already gone");
            }
            Err(error) => {
                return Err(TestpodError::from(ContainerError::RemoveFailed {
                    container_id: String::from(handle.id()),
                    message: error.to_string(),
                }));
            }
        }

        handle.state = RunningState::Removed;
        tracing::info!(container_id = %handle.id(), "container removed");
        Ok(())
    }

    /// Force-remove the container.
    ///
    /// This synchronous helper blocks on [`Self::release_async`] using the
    /// supplied runtime handle.
    ///
    /// # Errors
    ///
    /// See [`Self::release_async`].
    pub fn release<R: ContainerRuntime>(
        rt: &tokio::runtime::Handle,
        runtime: &R,
        handle: &mut ContainerHandle,
    ) -> Result<(), TestpodError> {
        rt.block_on(Self::release_async(runtime, handle))
    }

    /// Release the container, logging instead of returning any failure.
    pub(crate) async fn release_logged<R: ContainerRuntime>(
        runtime: &R,
        handle: &mut ContainerHandle,
    ) {
        if let Err(error) = Self::release_async(runtime, handle).await {
            tracing::warn!(
                container_id = %handle.id(),
                error = %error,
                "failed to release container"
            );
        }
    }

    async fn poll_until_running<R: ContainerRuntime>(
        runtime: &R,
        handle: &mut ContainerHandle,
        policy: ReadinessPolicy,
    ) -> Result<(), TestpodError> {
        let container_id = String::from(handle.id());

        timeout(policy.timeout, Self::inspect_until_running(runtime, handle, policy))
            .await
            .map_err(|_| {
                TestpodError::from(ContainerError::NotReady {
                    container_id,
                    timeout_ms: policy.timeout.as_millis(),
                })
            })?
    }

    async fn inspect_until_running<R: ContainerRuntime>(
        runtime: &R,
        handle: &mut ContainerHandle,
        policy: ReadinessPolicy,
    ) -> Result<(), TestpodError> {
        loop {
            let inspect = runtime.inspect_container(handle.id()).await.map_err(|error| {
                TestpodError::from(ContainerError::InspectFailed {
                    container_id: String::from(handle.id()),
                    message: error.to_string(),
                })
            })?;

            match observe(inspect) {
                Observation::Running(port_bindings) => {
                    handle.port_bindings = port_bindings;
                    handle.state = RunningState::Running;
                    tracing::info!(container_id = %handle.id(), "container running");
                    return Ok(());
                }
                Observation::Exited(status) => {
                    handle.state = RunningState::Failed;
                    return Err(start_failed(
                        &handle.image,
                        format!("container '{}' {status} before becoming ready", handle.id),
                    ));
                }
                Observation::Pending => sleep(policy.poll_interval).await,
            }
        }
    }
}

fn observe(inspect: ContainerInspectResponse) -> Observation {
    let state = inspect.state.unwrap_or_default();

    if state.running.unwrap_or(false) {
        let ports = inspect
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default();
        return Observation::Running(convert_port_map(ports));
    }

    match state.status {
        Some(ContainerStateStatusEnum::EXITED) => Observation::Exited(String::from("exited")),
        Some(ContainerStateStatusEnum::DEAD) => Observation::Exited(String::from("died")),
        _ => Observation::Pending,
    }
}

/// Convert the runtime's port map, dropping ports that are exposed but not
/// published.
fn convert_port_map(ports: PortMap) -> PortBindings {
    ports
        .into_iter()
        .filter_map(|(port, bindings)| {
            bindings.map(|entries| {
                let converted = entries
                    .into_iter()
                    .map(|entry| {
                        HostBinding::new(
                            entry.host_ip.unwrap_or_default(),
                            entry.host_port.unwrap_or_default(),
                        )
                    })
                    .collect();
                (port, converted)
            })
        })
        .collect()
}

fn build_service_body(image_id: &str) -> ContainerCreateBody {
    ContainerCreateBody {
        image: Some(String::from(image_id)),
        host_config: Some(HostConfig {
            publish_all_ports: Some(true),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}

fn start_failed(image: &ImageReference, message: impl Into<String>) -> TestpodError {
    TestpodError::from(ContainerError::StartFailed {
        image: image.to_string(),
        message: message.into(),
    })
}
