//! dockhand-converge: convergence engine for eventually-consistent engine
//! resources.
//!
//! A mutating call against the container engine (create/remove/update)
//! returning does not mean the engine has settled: a created network may not
//! be inspectable yet, a removal may be refused while dependents drain, a
//! service schedules its tasks long after the create call. Each reconciler
//! pairs the mutating call with a bounded polling run
//! ([`poller::wait_for_state`]) that probes the engine until a caller-defined
//! terminal classification is reached.

pub mod client;
pub mod error;
pub mod poller;
pub mod reconciler;
pub mod settings;

pub use client::{ClientError, EngineClient};
pub use error::ConvergeError;
pub use poller::{wait_for_state, ConvergePlan, Observation, StateProbe};
pub use settings::ConvergeSettings;
