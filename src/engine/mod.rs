//! Container engine connection and service container lifecycle.
//!
//! The socket endpoint is resolved through a priority-based fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `TESTPOD_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock` on Unix)
//!
//! Lifecycle operations are written against the [`ContainerRuntime`] seam,
//! which `bollard::Docker` implements.

mod connection;
mod image;
mod lifecycle;
mod runtime;

#[cfg(test)]
pub(crate) mod test_support;

pub use connection::{EngineConnector, SocketResolver, TlsMaterials};
pub use image::{DEFAULT_TAG, ImageReference};
pub use lifecycle::{
    ContainerHandle, DEFAULT_POLL_INTERVAL, DEFAULT_READINESS_TIMEOUT, ReadinessPolicy,
    RunningState,
};
pub use runtime::{ContainerRuntime, RuntimeFuture};
