//! Engine client capability consumed by the reconcilers.
//!
//! Transport, encoding and authentication are the host's concern; the
//! reconcilers only need these calls and the error messages they produce. The
//! payload types carry the fields the convergence logic reads, nothing more.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Removal is refused with this substring while a network still has attached
/// endpoints. Matched verbatim against the engine's message; do not reword.
pub const NETWORK_ACTIVE_ENDPOINTS: &str = "has active endpoints";

/// Removal is refused with this substring while a volume is still mounted by
/// a live container. Matched verbatim against the engine's message; do not
/// reword.
pub const VOLUME_IN_USE: &str = "volume is in use";

/// Errors from the engine client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The engine does not know the resource.
    #[error("no such {kind}: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The engine rejected the call; the message is the engine's, verbatim.
    #[error("{0}")]
    Api(String),

    /// The engine could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ClientError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    /// Whether this removal failure is one of the recognized transient
    /// dependency conflicts and should be retried by continued polling.
    pub fn is_transient_removal(&self, pattern: &str) -> bool {
        matches!(self, ClientError::Api(message) if message.contains(pattern))
    }
}

/// Parameters for creating a network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: Option<String>,
    pub options: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub internal: bool,
    pub attachable: bool,
    pub ingress: bool,
    pub ipv6: bool,
}

/// Observed network state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkState {
    pub id: String,
    pub name: String,
    pub driver: String,
    /// `local`, `swarm` or `overlay`. Overlay networks expose their driver
    /// options late; see the network reconciler.
    pub scope: String,
    pub options: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    pub internal: bool,
    pub attachable: bool,
    pub ingress: bool,
    pub ipv6: bool,
}

/// Parameters for creating a volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub driver: Option<String>,
    pub driver_opts: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

/// Observed volume state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeState {
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    pub labels: HashMap<String, String>,
}

/// Desired service shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    /// Replicated mode task count; `None` for global services, which cannot
    /// be converged on.
    pub replicas: Option<u64>,
    pub labels: HashMap<String, String>,
}

/// Observed service state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceState {
    pub id: String,
    pub name: String,
    pub image: String,
    pub replicas: Option<u64>,
    pub labels: HashMap<String, String>,
    /// Present while an update or rollback is in flight.
    pub update_status: Option<UpdateStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    Updating,
    Completed,
    Paused,
    RollbackStarted,
    RollbackCompleted,
    RollbackPaused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub phase: UpdatePhase,
    pub message: String,
}

/// Scheduler progression of a swarm task. Ordering matters: later phases are
/// further along, and phases past `Running` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    New,
    Allocated,
    Pending,
    Assigned,
    Accepted,
    Preparing,
    Ready,
    Starting,
    Running,
    Complete,
    Shutdown,
    Failed,
    Rejected,
}

impl TaskPhase {
    /// Whether the phase is past `Running` and the task will not run again.
    pub fn is_terminal(self) -> bool {
        self > TaskPhase::Running
    }
}

/// One swarm task of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub id: String,
    /// Slot the scheduler placed the task in; restarts leave several tasks
    /// per slot.
    pub slot: u64,
    /// Empty until the task is assigned to a node.
    pub node_id: String,
    pub desired_phase: TaskPhase,
    pub phase: TaskPhase,
}

/// One swarm node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeState {
    pub id: String,
    pub down: bool,
}

/// Calls the reconcilers need from the container engine.
///
/// `inspect_*` reports absence as [`ClientError::NotFound`] so probes can
/// classify visibility lag; every other error is opaque to the reconcilers
/// apart from its message.
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<String, ClientError>;
    async fn inspect_network(&self, id: &str) -> Result<NetworkState, ClientError>;
    async fn remove_network(&self, id: &str) -> Result<(), ClientError>;

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<String, ClientError>;
    async fn inspect_volume(&self, name: &str) -> Result<VolumeState, ClientError>;
    async fn remove_volume(&self, name: &str, force: bool) -> Result<(), ClientError>;

    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, ClientError>;
    async fn update_service(&self, id: &str, spec: &ServiceSpec) -> Result<(), ClientError>;
    async fn inspect_service(&self, id: &str) -> Result<ServiceState, ClientError>;
    async fn remove_service(&self, id: &str) -> Result<(), ClientError>;

    /// Tasks of one service whose desired state is running.
    async fn list_tasks(&self, service_id: &str) -> Result<Vec<TaskState>, ClientError>;
    async fn list_nodes(&self) -> Result<Vec<NodeState>, ClientError>;
}
