//! Given/when steps for harness scenarios.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rstest_bdd_macros::{given, when};
use testpod::engine::{ImageReference, ReadinessPolicy};
use testpod::error::{ContainerError, EndpointError, PoolError, TestpodError};
use testpod::harness::{Harness, HarnessSettings};
use testpod::pool::PoolSettings;

use super::StepResult;
use super::fakes::{LoopbackDialer, ScriptedRuntime};
use super::state::{HarnessState, WorkflowOutcome};

#[given("the engine host is {host}")]
fn given_engine_host(harness_state: &HarnessState, host: String) {
    harness_state.host_hint.set(host);
}

#[given("the image {image} is cached locally")]
fn given_image_cached(harness_state: &HarnessState, image: String) {
    harness_state.image.set(image);
    harness_state.image_cached.set(true);
}

#[given("the image {image} is not cached locally")]
fn given_image_not_cached(harness_state: &HarnessState, image: String) {
    harness_state.image.set(image);
    harness_state.image_cached.set(false);
}

#[given("the container reaches the running state")]
fn given_container_runs(harness_state: &HarnessState) {
    harness_state.becomes_running.set(true);
}

#[given("the container never reaches the running state")]
fn given_container_never_runs(harness_state: &HarnessState) {
    harness_state.becomes_running.set(false);
}

#[given("the service refuses connections")]
fn given_service_refuses(harness_state: &HarnessState) {
    harness_state.refuse_connections.set(true);
}

#[when("a body runs against port {port}")]
fn when_body_runs(harness_state: &HarnessState, port: String) -> StepResult<()> {
    let image_name = harness_state
        .image
        .get()
        .ok_or_else(|| String::from("image should be configured"))?;
    let image =
        ImageReference::parse(&image_name).map_err(|e| format!("invalid image reference: {e}"))?;

    let (runtime, counters) = ScriptedRuntime::new(
        image_name,
        harness_state.image_cached.get().unwrap_or(true),
        harness_state.becomes_running.get().unwrap_or(true),
    );
    let dialer = LoopbackDialer {
        refuse: harness_state.refuse_connections.get().unwrap_or(false),
    };
    let settings = HarnessSettings {
        readiness: ReadinessPolicy {
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
        },
        runtime_host_hint: harness_state.host_hint.get(),
    };
    let harness = Harness::new(runtime, dialer, settings);

    let body_ran = Arc::new(AtomicBool::new(false));
    let body_flag = Arc::clone(&body_ran);
    let tokio_runtime =
        tokio::runtime::Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;

    let result: Result<String, TestpodError> = harness.with_service_blocking(
        tokio_runtime.handle(),
        &image,
        &port,
        PoolSettings::default(),
        |pool| async move {
            body_flag.store(true, Ordering::SeqCst);
            let conn = pool.get().await?;
            drop(conn);
            Ok(pool.endpoint().to_string())
        },
    );

    harness_state.outcome.set(classify(result));
    harness_state.body_ran.set(body_ran.load(Ordering::SeqCst));
    harness_state.pulls.set(counters.pulls.load(Ordering::SeqCst));
    harness_state.removes.set(counters.removes.load(Ordering::SeqCst));
    Ok(())
}

fn classify(result: Result<String, TestpodError>) -> WorkflowOutcome {
    match result {
        Ok(endpoint) => WorkflowOutcome::Endpoint(endpoint),
        Err(TestpodError::Container(ContainerError::NotReady { .. })) => {
            WorkflowOutcome::ReadinessTimeout
        }
        Err(TestpodError::Endpoint(EndpointError::PortNotPublished { .. })) => {
            WorkflowOutcome::PortNotPublished
        }
        Err(TestpodError::Pool(PoolError::EndpointUnreachable { .. })) => {
            WorkflowOutcome::EndpointUnreachable
        }
        Err(other) => WorkflowOutcome::Other(other.to_string()),
    }
}
