//! The container runtime seam consumed by the lifecycle controller.
//!
//! Only the handful of engine operations the harness needs are exposed, so
//! provisioning logic can be exercised against a mock without a live daemon.

use std::future::Future;
use std::pin::Pin;

use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse, ImageSummary,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptionsBuilder, InspectContainerOptions, ListImagesOptions,
    RemoveContainerOptionsBuilder, StartContainerOptions,
};
use futures_util::TryStreamExt;

/// Boxed future type returned by [`ContainerRuntime`] implementors.
pub type RuntimeFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, bollard::errors::Error>> + Send + 'a>>;

/// Behaviour required from a container engine client.
pub trait ContainerRuntime: Send + Sync {
    /// List images available locally.
    fn list_images(&self) -> RuntimeFuture<'_, Vec<ImageSummary>>;

    /// Pull `name:tag` from its registry, waiting for the pull to finish.
    fn pull_image(&self, name: &str, tag: &str) -> RuntimeFuture<'_, ()>;

    /// Create a container from `Bollard` options and body payload.
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> RuntimeFuture<'_, ContainerCreateResponse>;

    /// Start a created container.
    fn start_container(&self, container_id: &str) -> RuntimeFuture<'_, ()>;

    /// Inspect a container's state and network settings.
    fn inspect_container(&self, container_id: &str) -> RuntimeFuture<'_, ContainerInspectResponse>;

    /// Remove a container, killing it first when `force` is set.
    fn remove_container(&self, container_id: &str, force: bool) -> RuntimeFuture<'_, ()>;
}

impl ContainerRuntime for Docker {
    fn list_images(&self) -> RuntimeFuture<'_, Vec<ImageSummary>> {
        Box::pin(async move { Self::list_images(self, None::<ListImagesOptions>).await })
    }

    fn pull_image(&self, name: &str, tag: &str) -> RuntimeFuture<'_, ()> {
        let options = CreateImageOptionsBuilder::new()
            .from_image(name)
            .tag(tag)
            .build();

        Box::pin(async move {
            Self::create_image(self, Some(options), None, None)
                .try_collect::<Vec<_>>()
                .await
                .map(|_| ())
        })
    }

    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> RuntimeFuture<'_, ContainerCreateResponse> {
        Box::pin(async move { Self::create_container(self, options, config).await })
    }

    fn start_container(&self, container_id: &str) -> RuntimeFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            Self::start_container(self, &container_id_owned, None::<StartContainerOptions>).await
        })
    }

    fn inspect_container(&self, container_id: &str) -> RuntimeFuture<'_, ContainerInspectResponse> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move {
            Self::inspect_container(self, &container_id_owned, None::<InspectContainerOptions>)
                .await
        })
    }

    fn remove_container(&self, container_id: &str, force: bool) -> RuntimeFuture<'_, ()> {
        let container_id_owned = String::from(container_id);
        let options = RemoveContainerOptionsBuilder::new()
            .force(force)
            .v(true)
            .build();

        Box::pin(async move {
            Self::remove_container(self, &container_id_owned, Some(options)).await
        })
    }
}
