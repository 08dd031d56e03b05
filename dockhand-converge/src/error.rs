//! Convergence error taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::client::ClientError;

/// Errors surfaced by a convergence run or a reconciler.
///
/// Every variant is terminal for the run it came from; retrying past the
/// configured timeout is always the caller's decision, never the engine's.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Poller parameters that can never complete, e.g. a minimum interval
    /// longer than the timeout. Fails fast, nothing is probed.
    #[error("invalid converge settings: {0}")]
    InvalidSettings(String),

    /// Deadline exceeded while the resource was still pending.
    #[error("timeout while waiting for state: {id} last seen `{last_state}`")]
    Timeout { id: String, last_state: String },

    /// The probe classified the resource into a state that is neither pending
    /// nor a target.
    #[error("unexpected state `{state}` for {id}")]
    UnexpectedState { id: String, state: String },

    /// The caller cancelled the run. Mutations already issued are not rolled
    /// back.
    #[error("converge cancelled for {id}")]
    Cancelled { id: String },

    /// The engine failed in a way no pending classification covers. The
    /// underlying message is preserved verbatim.
    #[error(transparent)]
    Probe(#[from] ClientError),

    /// A service did not reach its desired replica count in time.
    #[error("service {id} did not converge after {timeout:?}")]
    DidNotConverge { id: String, timeout: Duration },
}
