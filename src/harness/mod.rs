//! Scoped "provision, use, release" workflow for a containerised service.
//!
//! [`Harness::with_service`] starts a container from an image, waits for it
//! to run, resolves the published endpoint for one internal port, builds a
//! [`ServicePool`] against it, and hands the pool to a test body. The
//! container is force-removed afterwards whether the body succeeds, fails or
//! panics; a panic is resumed once removal has been attempted. If the scope
//! future is dropped before it finishes, removal is spawned onto the current
//! tokio runtime instead.

use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;

use futures_util::FutureExt;

use crate::endpoint;
use crate::engine::{
    ContainerHandle, ContainerRuntime, EngineConnector, ImageReference, ReadinessPolicy,
    RunningState,
};
use crate::error::TestpodError;
use crate::pool::{PoolSettings, ServicePool};
use crate::service::ServiceDialer;

/// Harness-wide settings shared by every scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessSettings {
    /// Readiness polling bounds applied after start.
    pub readiness: ReadinessPolicy,

    /// The engine address, used to replace wildcard bind hosts.
    ///
    /// Typically the resolved engine socket, e.g. `tcp://192.0.2.1:2375`.
    pub runtime_host_hint: Option<String>,
}

/// Provisions service containers and yields pools connected to them.
pub struct Harness<R: ContainerRuntime + 'static, D: ServiceDialer> {
    runtime: Arc<R>,
    dialer: Arc<D>,
    settings: HarnessSettings,
}

impl<R: ContainerRuntime + 'static, D: ServiceDialer> Harness<R, D> {
    /// Create a harness from an engine client and a service dialer.
    #[must_use]
    pub fn new(runtime: R, dialer: D, settings: HarnessSettings) -> Self {
        Self {
            runtime: Arc::new(runtime),
            dialer: Arc::new(dialer),
            settings,
        }
    }

    /// Return the harness settings.
    #[must_use]
    pub const fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Run `body` against a freshly provisioned service (async version).
    ///
    /// # Errors
    ///
    /// Returns the first failure among pool settings validation,
    /// provisioning, readiness, endpoint resolution, pool construction and
    /// the body itself. Release failures are logged and never returned.
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future after the container exists spawns its
    /// removal onto the current tokio runtime. Outside a runtime the
    /// container is left behind and a warning is logged.
    ///
    /// # Panics
    ///
    /// Resumes a panic raised by `body` after the container is released.
    pub async fn with_service<T, E, F, Fut>(
        &self,
        image: &ImageReference,
        internal_port: &str,
        pool_settings: PoolSettings,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(ServicePool<D>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TestpodError>,
    {
        pool_settings.validate().map_err(TestpodError::from)?;

        let runtime = self.runtime.as_ref();
        let handle = EngineConnector::provision_async(runtime, image).await?;
        let mut guard = ReleaseGuard::new(Arc::clone(&self.runtime), handle);

        // A failed readiness wait has already released the container.
        if let Err(error) =
            EngineConnector::await_running_async(runtime, &mut guard.handle, self.settings.readiness)
                .await
        {
            guard.disarm();
            return Err(E::from(error));
        }

        let outcome = match self.connect(&guard.handle, internal_port, pool_settings).await {
            Ok(pool) => {
                let closer = pool.clone();
                let result = AssertUnwindSafe(async move { body(pool).await })
                    .catch_unwind()
                    .await;
                closer.close();
                result
            }
            Err(error) => Ok(Err(E::from(error))),
        };

        EngineConnector::release_logged(runtime, &mut guard.handle).await;
        guard.disarm();

        outcome.unwrap_or_else(|panic| resume_unwind(panic))
    }

    /// Run `body` against a freshly provisioned service.
    ///
    /// Blocks the calling thread on [`Self::with_service`] using the
    /// supplied runtime handle.
    ///
    /// # Errors
    ///
    /// See [`Self::with_service`].
    ///
    /// # Panics
    ///
    /// Resumes a panic raised by `body` after the container is released.
    pub fn with_service_blocking<T, E, F, Fut>(
        &self,
        rt: &tokio::runtime::Handle,
        image: &ImageReference,
        internal_port: &str,
        pool_settings: PoolSettings,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(ServicePool<D>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TestpodError>,
    {
        rt.block_on(self.with_service(image, internal_port, pool_settings, body))
    }

    async fn connect(
        &self,
        handle: &ContainerHandle,
        internal_port: &str,
        pool_settings: PoolSettings,
    ) -> Result<ServicePool<D>, TestpodError> {
        let service_endpoint = endpoint::resolve(
            handle,
            internal_port,
            self.settings.runtime_host_hint.as_deref(),
        )?;
        tracing::info!(
            container_id = %handle.id(),
            port = internal_port,
            endpoint = %service_endpoint,
            "service endpoint resolved"
        );

        ServicePool::build(Arc::clone(&self.dialer), service_endpoint, pool_settings).await
    }
}

/// Releases a container whose scope was dropped before finishing.
struct ReleaseGuard<R: ContainerRuntime + 'static> {
    runtime: Arc<R>,
    handle: ContainerHandle,
    armed: bool,
}

impl<R: ContainerRuntime + 'static> ReleaseGuard<R> {
    const fn new(runtime: Arc<R>, handle: ContainerHandle) -> Self {
        Self {
            runtime,
            handle,
            armed: true,
        }
    }

    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<R: ContainerRuntime + 'static> Drop for ReleaseGuard<R> {
    fn drop(&mut self) {
        if !self.armed || self.handle.state() == RunningState::Removed {
            return;
        }

        let container_id = String::from(self.handle.id());
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                container_id = %container_id,
                "scope dropped outside a tokio runtime; container not released"
            );
            return;
        };

        tracing::info!(container_id = %container_id, "scope dropped; releasing container");
        let runtime = Arc::clone(&self.runtime);
        let mut handle = self.handle.clone();
        drop(rt.spawn(async move {
            EngineConnector::release_logged(runtime.as_ref(), &mut handle).await;
        }));
    }
}
