//! Scripted container runtime used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bollard::models::{
    ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse, ContainerState,
    ContainerStateStatusEnum, ImageSummary, NetworkSettings, PortBinding,
};
use bollard::query_parameters::CreateContainerOptions;
use mockall::mock;

use super::runtime::{ContainerRuntime, RuntimeFuture};

pub(crate) const CONTAINER_ID: &str = "container-123";
pub(crate) const IMAGE_ID: &str = "sha256:feedface";

mock! {
    #[derive(Debug)]
    pub(crate) Runtime {}

    impl ContainerRuntime for Runtime {
        fn list_images<'a>(&'a self) -> RuntimeFuture<'a, Vec<ImageSummary>>;
        fn pull_image<'a>(&'a self, name: &str, tag: &str) -> RuntimeFuture<'a, ()>;
        fn create_container<'a>(
            &'a self,
            options: Option<CreateContainerOptions>,
            config: ContainerCreateBody,
        ) -> RuntimeFuture<'a, ContainerCreateResponse>;
        fn start_container<'a>(&'a self, container_id: &str) -> RuntimeFuture<'a, ()>;
        fn inspect_container<'a>(
            &'a self,
            container_id: &str,
        ) -> RuntimeFuture<'a, ContainerInspectResponse>;
        fn remove_container<'a>(
            &'a self,
            container_id: &str,
            force: bool,
        ) -> RuntimeFuture<'a, ()>;
    }
}

/// Counts of runtime calls observed by a scripted runtime.
#[derive(Debug, Default)]
pub(crate) struct RuntimeCalls {
    pub(crate) pulls: AtomicUsize,
    pub(crate) creates: AtomicUsize,
    pub(crate) inspects: AtomicUsize,
    pub(crate) removes: AtomicUsize,
    pub(crate) last_body: Mutex<Option<ContainerCreateBody>>,
}

impl RuntimeCalls {
    pub(crate) fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Builder for a mock runtime that follows a fixed script.
pub(crate) struct RuntimeScript {
    pub(crate) local_images: Vec<ImageSummary>,
    pub(crate) pulled_images: Vec<ImageSummary>,
    pub(crate) pull_fails: bool,
    pub(crate) create_fails: bool,
    pub(crate) start_fails: bool,
    pub(crate) inspections: Vec<ContainerInspectResponse>,
    pub(crate) remove_status: Option<u16>,
}

impl Default for RuntimeScript {
    fn default() -> Self {
        Self {
            local_images: vec![image_summary(IMAGE_ID, &["redis:latest"])],
            pulled_images: Vec::new(),
            pull_fails: false,
            create_fails: false,
            start_fails: false,
            inspections: vec![running_inspect("6379/tcp", "0.0.0.0", "49153")],
            remove_status: None,
        }
    }
}

impl RuntimeScript {
    pub(crate) fn build(self) -> (MockRuntime, Arc<RuntimeCalls>) {
        let calls = Arc::new(RuntimeCalls::default());
        let mut runtime = MockRuntime::new();

        let pulled = Arc::new(AtomicUsize::new(0));
        let pulled_for_list = Arc::clone(&pulled);
        let local_images = self.local_images;
        let pulled_images = self.pulled_images;
        runtime.expect_list_images().returning(move || {
            let listed = if pulled_for_list.load(Ordering::SeqCst) > 0 {
                pulled_images.clone()
            } else {
                local_images.clone()
            };
            Box::pin(async move { Ok(listed) })
        });

        let calls_for_pull = Arc::clone(&calls);
        let pull_fails = self.pull_fails;
        runtime.expect_pull_image().returning(move |_, _| {
            calls_for_pull.pulls.fetch_add(1, Ordering::SeqCst);
            if pull_fails {
                return Box::pin(async { Err(server_error(404, "pull access denied")) });
            }
            pulled.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });

        let calls_for_create = Arc::clone(&calls);
        let create_fails = self.create_fails;
        runtime
            .expect_create_container()
            .returning(move |_, config| {
                calls_for_create.creates.fetch_add(1, Ordering::SeqCst);
                if let Ok(mut body) = calls_for_create.last_body.lock() {
                    *body = Some(config);
                }
                if create_fails {
                    return Box::pin(async { Err(bollard::errors::Error::RequestTimeoutError) });
                }
                Box::pin(async {
                    Ok(ContainerCreateResponse {
                        id: String::from(CONTAINER_ID),
                        warnings: vec![],
                    })
                })
            });

        let start_fails = self.start_fails;
        runtime.expect_start_container().returning(move |_| {
            if start_fails {
                return Box::pin(async { Err(server_error(500, "port allocation failed")) });
            }
            Box::pin(async { Ok(()) })
        });

        let calls_for_inspect = Arc::clone(&calls);
        let inspections = Arc::new(Mutex::new(self.inspections));
        runtime.expect_inspect_container().returning(move |_| {
            calls_for_inspect.inspects.fetch_add(1, Ordering::SeqCst);
            let next = inspections.lock().ok().and_then(|mut queue| {
                if queue.len() > 1 {
                    Some(queue.remove(0))
                } else {
                    queue.first().cloned()
                }
            });
            Box::pin(async move { Ok(next.unwrap_or_else(pending_inspect)) })
        });

        let calls_for_remove = Arc::clone(&calls);
        let remove_status = self.remove_status;
        runtime.expect_remove_container().returning(move |_, _| {
            calls_for_remove.removes.fetch_add(1, Ordering::SeqCst);
            match remove_status {
                Some(status) => Box::pin(async move { Err(server_error(status, "removal failed")) }),
                None => Box::pin(async { Ok(()) }),
            }
        });

        (runtime, calls)
    }
}

pub(crate) fn server_error(status_code: u16, message: &str) -> bollard::errors::Error {
    bollard::errors::Error::DockerResponseServerError {
        status_code,
        message: String::from(message),
    }
}

pub(crate) fn image_summary(id: &str, repo_tags: &[&str]) -> ImageSummary {
    ImageSummary {
        id: String::from(id),
        repo_tags: repo_tags.iter().map(|tag| String::from(*tag)).collect(),
        ..ImageSummary::default()
    }
}

pub(crate) fn running_inspect(port: &str, host_ip: &str, host_port: &str) -> ContainerInspectResponse {
    let mut ports = HashMap::new();
    ports.insert(
        String::from(port),
        Some(vec![PortBinding {
            host_ip: Some(String::from(host_ip)),
            host_port: Some(String::from(host_port)),
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

pub(crate) fn pending_inspect() -> ContainerInspectResponse {
    ContainerInspectResponse {
        id: Some(String::from(CONTAINER_ID)),
        state: Some(ContainerState {
            running: Some(false),
            status: Some(ContainerStateStatusEnum::CREATED),
            ..ContainerState::default()
        }),
        ..ContainerInspectResponse::default()
    }
}

pub(crate) fn exited_inspect() -> ContainerInspectResponse {
    ContainerInspectResponse {
        id: Some(String::from(CONTAINER_ID)),
        state: Some(ContainerState {
            running: Some(false),
            status: Some(ContainerStateStatusEnum::EXITED),
            exit_code: Some(1),
            ..ContainerState::default()
        }),
        ..ContainerInspectResponse::default()
    }
}
