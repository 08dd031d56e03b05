//! Generic bounded polling state machine.
//!
//! One run drives a [`StateProbe`] on a fixed cadence until the probe
//! classifies the resource into a target state, the deadline passes, or the
//! caller cancels. Retry is expressed purely as continued observation; the
//! poller never re-issues the mutating call that started the run.

use async_trait::async_trait;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::client::ClientError;
use crate::error::ConvergeError;
use crate::settings::ConvergeSettings;

/// One classified probe result.
#[derive(Debug)]
pub struct Observation<T> {
    /// Payload handed back to the caller when `state` is a target; ignored
    /// for pending states.
    pub output: T,
    /// State tag the probe assigned to what it saw.
    pub state: &'static str,
}

/// Queries the external system once and classifies the result.
///
/// Probes may block on I/O without an internal timeout; the run's deadline is
/// enforced around them. A probe that performs a mutation per tick (removal
/// probes do) must fold transient refusals into a pending classification
/// rather than returning an error: any error terminates the run immediately.
#[async_trait]
pub trait StateProbe: Send {
    type Output: Send;

    async fn observe(&mut self) -> Result<Observation<Self::Output>, ClientError>;
}

/// Which state tags keep a run polling and which end it successfully.
#[derive(Debug, Clone, Copy)]
pub struct ConvergePlan<'a> {
    pub pending: &'a [&'a str],
    pub target: &'a [&'a str],
    pub settings: ConvergeSettings,
}

/// Run `probe` until it reports one of the plan's target states.
///
/// `id` is used for log and error context only. Probes are strictly
/// sequential: the next one starts only after the previous returned.
pub async fn wait_for_state<P: StateProbe>(
    id: &str,
    mut probe: P,
    plan: ConvergePlan<'_>,
    cancel: &CancellationToken,
) -> Result<P::Output, ConvergeError> {
    plan.settings.validate()?;

    let deadline = Instant::now() + plan.settings.timeout;
    let mut last_state = "unknown";

    debug!(
        resource = id,
        target = ?plan.target,
        timeout = ?plan.settings.timeout,
        "waiting for state"
    );

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(cancelled(id)),
        _ = sleep(plan.settings.initial_delay) => {}
    }

    loop {
        let observation = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(id)),
            _ = sleep_until(deadline) => return Err(timed_out(id, last_state)),
            result = probe.observe() => result?,
        };
        last_state = observation.state;
        trace!(resource = id, state = observation.state, "probe result");

        if plan.target.contains(&observation.state) {
            return Ok(observation.output);
        }
        if !plan.pending.contains(&observation.state) {
            return Err(ConvergeError::UnexpectedState {
                id: id.to_string(),
                state: observation.state.to_string(),
            });
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(id)),
            _ = sleep_until(deadline) => return Err(timed_out(id, last_state)),
            _ = sleep(plan.settings.min_interval) => {}
        }
    }
}

fn cancelled(id: &str) -> ConvergeError {
    ConvergeError::Cancelled { id: id.to_string() }
}

fn timed_out(id: &str, last_state: &str) -> ConvergeError {
    ConvergeError::Timeout {
        id: id.to_string(),
        last_state: last_state.to_string(),
    }
}
