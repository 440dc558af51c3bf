//! Assertion helpers for harness behavioural tests.

use rstest_bdd_macros::then;

use super::StepResult;
use super::state::{HarnessState, WorkflowOutcome};

fn outcome(harness_state: &HarnessState) -> StepResult<WorkflowOutcome> {
    harness_state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))
}

fn expect_outcome(harness_state: &HarnessState, expected: &WorkflowOutcome) -> StepResult<()> {
    let actual = outcome(harness_state)?;
    if actual == *expected {
        Ok(())
    } else {
        Err(format!("expected {expected:?}, got {actual:?}"))
    }
}

#[then("the body saw endpoint {endpoint}")]
fn body_saw_endpoint(harness_state: &HarnessState, endpoint: String) -> StepResult<()> {
    expect_outcome(harness_state, &WorkflowOutcome::Endpoint(endpoint))
}

#[then("the workflow fails with a readiness timeout")]
fn workflow_fails_with_readiness_timeout(harness_state: &HarnessState) -> StepResult<()> {
    expect_outcome(harness_state, &WorkflowOutcome::ReadinessTimeout)
}

#[then("the workflow fails because the port is not published")]
fn workflow_fails_port_not_published(harness_state: &HarnessState) -> StepResult<()> {
    expect_outcome(harness_state, &WorkflowOutcome::PortNotPublished)
}

#[then("the workflow fails because the endpoint is unreachable")]
fn workflow_fails_endpoint_unreachable(harness_state: &HarnessState) -> StepResult<()> {
    expect_outcome(harness_state, &WorkflowOutcome::EndpointUnreachable)
}

#[then("the body did not run")]
fn body_did_not_run(harness_state: &HarnessState) -> StepResult<()> {
    if harness_state.body_ran.get().unwrap_or(false) {
        Err(String::from("body should not have run"))
    } else {
        Ok(())
    }
}

#[then("the container was removed {count} time")]
fn container_removed_times(harness_state: &HarnessState, count: usize) -> StepResult<()> {
    let removes = harness_state.removes.get().unwrap_or(0);
    if removes == count {
        Ok(())
    } else {
        Err(format!("expected {count} removals, got {removes}"))
    }
}

#[then("the image was pulled {count} time")]
fn image_pulled_times(harness_state: &HarnessState, count: usize) -> StepResult<()> {
    let pulls = harness_state.pulls.get().unwrap_or(0);
    if pulls == count {
        Ok(())
    } else {
        Err(format!("expected {count} pulls, got {pulls}"))
    }
}
