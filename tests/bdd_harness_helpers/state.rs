//! Scenario state for harness behavioural tests.

use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// How a harness run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum WorkflowOutcome {
    /// The body returned the endpoint it was handed.
    Endpoint(String),
    /// The engine never reported the container running in time.
    ReadinessTimeout,
    /// The requested port had no binding.
    PortNotPublished,
    /// The eager dial against the endpoint failed.
    EndpointUnreachable,
    /// Any other failure, rendered for the assertion message.
    Other(String),
}

#[derive(Default, ScenarioState)]
pub(crate) struct HarnessState {
    pub(crate) host_hint: Slot<String>,
    pub(crate) image: Slot<String>,
    pub(crate) image_cached: Slot<bool>,
    pub(crate) becomes_running: Slot<bool>,
    pub(crate) refuse_connections: Slot<bool>,
    pub(crate) outcome: Slot<WorkflowOutcome>,
    pub(crate) body_ran: Slot<bool>,
    pub(crate) pulls: Slot<usize>,
    pub(crate) removes: Slot<usize>,
}

#[fixture]
pub(crate) fn harness_state() -> HarnessState {
    let state = HarnessState::default();
    state.image.set(String::from("redis:7"));
    state.image_cached.set(true);
    state.becomes_running.set(true);
    state.refuse_connections.set(false);
    state.body_ran.set(false);
    state
}
