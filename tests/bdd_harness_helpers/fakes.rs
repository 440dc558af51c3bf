//! In-memory engine and service doubles for harness scenarios.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bollard::models::{
    ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse, ContainerState,
    ContainerStateStatusEnum, ImageSummary, NetworkSettings, PortBinding,
};
use bollard::query_parameters::CreateContainerOptions;
use testpod::endpoint::Endpoint;
use testpod::engine::{ContainerRuntime, RuntimeFuture};
use testpod::error::ServiceError;
use testpod::service::{ServiceConnection, ServiceDialer, ServiceFuture};

const CONTAINER_ID: &str = "bdd-container";

/// Engine calls observed by a [`ScriptedRuntime`].
#[derive(Debug, Default)]
pub(crate) struct RuntimeCounters {
    pub(crate) pulls: AtomicUsize,
    pub(crate) removes: AtomicUsize,
}

/// A runtime that publishes `6379/tcp` on `0.0.0.0:49153` once running.
pub(crate) struct ScriptedRuntime {
    image: String,
    image_cached: bool,
    becomes_running: bool,
    pulled: AtomicBool,
    counters: Arc<RuntimeCounters>,
}

impl ScriptedRuntime {
    pub(crate) fn new(
        image: String,
        image_cached: bool,
        becomes_running: bool,
    ) -> (Self, Arc<RuntimeCounters>) {
        let counters = Arc::new(RuntimeCounters::default());
        let runtime = Self {
            image,
            image_cached,
            becomes_running,
            pulled: AtomicBool::new(false),
            counters: Arc::clone(&counters),
        };
        (runtime, counters)
    }

    fn inspection(&self) -> ContainerInspectResponse {
        if !self.becomes_running {
            return ContainerInspectResponse {
                id: Some(String::from(CONTAINER_ID)),
                state: Some(ContainerState {
                    running: Some(false),
                    status: Some(ContainerStateStatusEnum::CREATED),
                    ..ContainerState::default()
                }),
                ..ContainerInspectResponse::default()
            };
        }

        let mut ports = HashMap::new();
        ports.insert(
            String::from("6379/tcp"),
            Some(vec![PortBinding {
                host_ip: Some(String::from("0.0.0.0")),
                host_port: Some(String::from("49153")),
            }]),
        );
        ContainerInspectResponse {
            id: Some(String::from(CONTAINER_ID)),
            state: Some(ContainerState {
                running: Some(true),
                status: Some(ContainerStateStatusEnum::RUNNING),
                ..ContainerState::default()
            }),
            network_settings: Some(NetworkSettings {
                ports: Some(ports),
                ..NetworkSettings::default()
            }),
            ..ContainerInspectResponse::default()
        }
    }
}

impl ContainerRuntime for ScriptedRuntime {
    fn list_images(&self) -> RuntimeFuture<'_, Vec<ImageSummary>> {
        let available = self.image_cached || self.pulled.load(Ordering::SeqCst);
        let images = if available {
            vec![ImageSummary {
                id: String::from("sha256:cafe"),
                repo_tags: vec![self.image.clone()],
                ..ImageSummary::default()
            }]
        } else {
            Vec::new()
        };
        Box::pin(async move { Ok(images) })
    }

    fn pull_image(&self, _name: &str, _tag: &str) -> RuntimeFuture<'_, ()> {
        self.counters.pulls.fetch_add(1, Ordering::SeqCst);
        self.pulled.store(true, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn create_container(
        &self,
        _options: Option<CreateContainerOptions>,
        _config: ContainerCreateBody,
    ) -> RuntimeFuture<'_, ContainerCreateResponse> {
        Box::pin(async {
            Ok(ContainerCreateResponse {
                id: String::from(CONTAINER_ID),
                warnings: vec![],
            })
        })
    }

    fn start_container(&self, _container_id: &str) -> RuntimeFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn inspect_container(&self, _container_id: &str) -> RuntimeFuture<'_, ContainerInspectResponse> {
        let inspection = self.inspection();
        Box::pin(async move { Ok(inspection) })
    }

    fn remove_container(&self, _container_id: &str, _force: bool) -> RuntimeFuture<'_, ()> {
        self.counters.removes.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

/// A connection that always answers its probe.
#[derive(Debug)]
pub(crate) struct LoopbackConnection;

impl ServiceConnection for LoopbackConnection {
    fn probe(&mut self) -> ServiceFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

/// Dials [`LoopbackConnection`]s, or refuses every dial.
pub(crate) struct LoopbackDialer {
    pub(crate) refuse: bool,
}

impl ServiceDialer for LoopbackDialer {
    type Connection = LoopbackConnection;

    fn dial(&self, endpoint: &Endpoint) -> ServiceFuture<'_, LoopbackConnection> {
        let address = endpoint.to_string();
        let refuse = self.refuse;
        Box::pin(async move {
            if refuse {
                Err(ServiceError::DialFailed {
                    address,
                    message: String::from("connection refused"),
                })
            } else {
                Ok(LoopbackConnection)
            }
        })
    }
}
