//! Service reconciler.
//!
//! Creating or updating a swarm service returns before any task is scheduled.
//! With a converge config the reconciler polls the engine's task list until
//! the desired replica count is running, mirroring the scheduler's task
//! phases; without one the mutating call is trusted as-is.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use dockhand_state::{current_version, Attrs, LabelSet, ManagedResource, ResourceKind, StateBag};

use crate::client::{
    ClientError, EngineClient, ServiceSpec, ServiceState, TaskState, UpdatePhase,
};
use crate::error::ConvergeError;
use crate::poller::{wait_for_state, ConvergePlan, Observation, StateProbe};
use crate::settings::ConvergeSettings;

use super::state_tags::{ALL_FIELDS, PENDING};

/// Scheduler phases that keep a service-create run polling.
const CREATE_PENDING: &[&str] = &[
    "new",
    "allocated",
    "pending",
    "assigned",
    "accepted",
    "preparing",
    "ready",
    "starting",
    "creating",
    "paused",
];
const CREATE_TARGET: &[&str] = &["running", "complete"];

const UPDATE_PENDING: &[&str] = &["creating", "updating"];
const UPDATE_TARGET: &[&str] = &["completed"];

/// Deadline and cadence for waiting on a service to reach its desired state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConvergeConfig {
    pub timeout: Duration,
    /// Pause before the first convergence check.
    pub delay: Duration,
}

impl Default for ServiceConvergeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            delay: Duration::from_secs(7),
        }
    }
}

pub struct ServiceReconciler {
    client: Arc<dyn EngineClient>,
    settings: ConvergeSettings,
}

impl ServiceReconciler {
    pub fn new(client: Arc<dyn EngineClient>, settings: ConvergeSettings) -> Self {
        Self { client, settings }
    }

    /// Create the service; with a converge config, wait until all replicas
    /// run. A service that cannot converge is removed again rather than left
    /// half-created; a cancelled wait leaves it in place.
    pub async fn create(
        &self,
        spec: &ServiceSpec,
        converge: Option<ServiceConvergeConfig>,
        cancel: &CancellationToken,
    ) -> Result<ManagedResource, ConvergeError> {
        let id = self.client.create_service(spec).await?;
        info!(service = %id, name = %spec.name, "service created");

        if let Some(config) = converge {
            info!(service = %id, timeout = ?config.timeout, "waiting for service to converge");
            let plan = ConvergePlan {
                pending: CREATE_PENDING,
                target: CREATE_TARGET,
                settings: self.converge_settings(config),
            };
            let probe = ServiceCreateProbe {
                client: self.client.as_ref(),
                id: &id,
                progress: ReplicaProgress::default(),
            };
            if let Err(err) = wait_for_state(&id, probe, plan, cancel).await {
                // Cancellation is not a convergence failure: the caller gave
                // up on the wait, and mutations already issued stay in place.
                if matches!(err, ConvergeError::Cancelled { .. }) {
                    return Err(err);
                }
                warn!(service = %id, error = %err, "service did not converge, removing it");
                if let Err(remove_err) = self.client.remove_service(&id).await {
                    return Err(ConvergeError::Probe(remove_err));
                }
                return Err(match err {
                    ConvergeError::Timeout { .. } => ConvergeError::DidNotConverge {
                        id: id.clone(),
                        timeout: config.timeout,
                    },
                    other => other,
                });
            }
        }

        self.read(&id, cancel).await
    }

    /// Update the service; with a converge config, wait for the update to
    /// complete, honoring engine-side rollbacks.
    pub async fn update(
        &self,
        id: &str,
        spec: &ServiceSpec,
        converge: Option<ServiceConvergeConfig>,
        cancel: &CancellationToken,
    ) -> Result<ManagedResource, ConvergeError> {
        self.client.update_service(id, spec).await?;
        info!(service = %id, "service update submitted");

        if let Some(config) = converge {
            info!(service = %id, timeout = ?config.timeout, "waiting for service update to converge");
            let plan = ConvergePlan {
                pending: UPDATE_PENDING,
                target: UPDATE_TARGET,
                settings: self.converge_settings(config),
            };
            let probe = ServiceUpdateProbe {
                client: self.client.as_ref(),
                id,
                progress: ReplicaProgress::default(),
                rollback: false,
            };
            if let Err(err) = wait_for_state(id, probe, plan, cancel).await {
                return Err(match err {
                    ConvergeError::Timeout { .. } => ConvergeError::DidNotConverge {
                        id: id.to_string(),
                        timeout: config.timeout,
                    },
                    other => other,
                });
            }
        }

        self.read(id, cancel).await
    }

    /// Confirm the service is visible and capture its final observed shape.
    pub async fn read(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<ManagedResource, ConvergeError> {
        info!(
            service = %id,
            timeout = ?self.settings.timeout,
            "waiting for service to expose all fields"
        );
        let plan = ConvergePlan {
            pending: &[PENDING],
            target: &[ALL_FIELDS],
            settings: self.settings,
        };
        let probe = ServiceReadProbe {
            client: self.client.as_ref(),
            id,
        };
        let state = wait_for_state(id, probe, plan, cancel).await?;
        Ok(ManagedResource {
            id: id.to_string(),
            kind: ResourceKind::Service,
            state: service_state_bag(&state),
        })
    }

    /// Remove the service. A service the engine no longer knows counts as
    /// removed.
    pub async fn remove(&self, id: &str) -> Result<(), ConvergeError> {
        match self.client.remove_service(id).await {
            Ok(()) => {
                info!(service = %id, "service removed");
                Ok(())
            }
            Err(err) if err.is_not_found() => {
                info!(service = %id, "service already removed");
                Ok(())
            }
            Err(err) => Err(ConvergeError::Probe(err)),
        }
    }

    fn converge_settings(&self, config: ServiceConvergeConfig) -> ConvergeSettings {
        ConvergeSettings {
            timeout: config.timeout,
            min_interval: self.settings.min_interval,
            initial_delay: config.delay,
        }
    }
}

struct ServiceCreateProbe<'a> {
    client: &'a dyn EngineClient,
    id: &'a str,
    progress: ReplicaProgress,
}

#[async_trait]
impl StateProbe for ServiceCreateProbe<'_> {
    type Output = ();

    async fn observe(&mut self) -> Result<Observation<()>, ClientError> {
        let service = self.client.inspect_service(self.id).await?;
        let tasks = self.client.list_tasks(self.id).await?;
        let active = active_nodes(self.client).await?;

        let state = if self.progress.update(&service, &tasks, &active)? {
            "running"
        } else {
            "creating"
        };
        Ok(Observation { output: (), state })
    }
}

struct ServiceUpdateProbe<'a> {
    client: &'a dyn EngineClient,
    id: &'a str,
    progress: ReplicaProgress,
    rollback: bool,
}

#[async_trait]
impl StateProbe for ServiceUpdateProbe<'_> {
    type Output = ();

    async fn observe(&mut self) -> Result<Observation<()>, ClientError> {
        let service = self.client.inspect_service(self.id).await?;

        let mut rollback_message = String::new();
        if let Some(status) = &service.update_status {
            debug!(service = %self.id, phase = ?status.phase, "update status");
            match status.phase {
                UpdatePhase::Updating => self.rollback = false,
                UpdatePhase::Completed => {
                    return Ok(Observation {
                        output: (),
                        state: "completed",
                    })
                }
                UpdatePhase::RollbackStarted => {
                    self.rollback = true;
                    rollback_message = status.message.clone();
                }
                UpdatePhase::RollbackCompleted => {
                    return Err(ClientError::Api(format!(
                        "service rollback completed: {}",
                        status.message
                    )))
                }
                UpdatePhase::Paused => {
                    return Err(ClientError::Api(format!(
                        "service update paused: {}",
                        status.message
                    )))
                }
                UpdatePhase::RollbackPaused => {
                    return Err(ClientError::Api(format!(
                        "service rollback paused: {}",
                        status.message
                    )))
                }
            }
        }

        let tasks = self.client.list_tasks(self.id).await?;
        let active = active_nodes(self.client).await?;

        if self.progress.update(&service, &tasks, &active)? {
            if self.rollback {
                // All replicas running again, but on the rolled-back spec.
                return Err(ClientError::Api(format!(
                    "service rollback completed: {rollback_message}"
                )));
            }
            Ok(Observation {
                output: (),
                state: "completed",
            })
        } else {
            Ok(Observation {
                output: (),
                state: "updating",
            })
        }
    }
}

struct ServiceReadProbe<'a> {
    client: &'a dyn EngineClient,
    id: &'a str,
}

#[async_trait]
impl StateProbe for ServiceReadProbe<'_> {
    type Output = ServiceState;

    async fn observe(&mut self) -> Result<Observation<ServiceState>, ClientError> {
        match self.client.inspect_service(self.id).await {
            Ok(service) => Ok(Observation {
                output: service,
                state: ALL_FIELDS,
            }),
            Err(err) if err.is_not_found() => {
                debug!(service = %self.id, "service not visible yet");
                Ok(Observation {
                    output: ServiceState::default(),
                    state: PENDING,
                })
            }
            Err(err) => Err(err),
        }
    }
}

/// Tracks replica convergence across probe ticks.
///
/// Tasks are grouped by slot on active nodes, favoring the task with the
/// lowest desired phase (restarts leave several tasks per slot), with the
/// observed phase breaking ties (start-first updates). Once converged, a
/// later tick with a non-running task flips the run back to pending.
#[derive(Debug, Default)]
struct ReplicaProgress {
    done: bool,
}

impl ReplicaProgress {
    /// Whether the desired replica count is currently running.
    fn update(
        &mut self,
        service: &ServiceState,
        tasks: &[TaskState],
        active_nodes: &HashSet<String>,
    ) -> Result<bool, ClientError> {
        let Some(replicas) = service.replicas else {
            return Err(ClientError::Api(format!(
                "service {} has no replica count",
                service.id
            )));
        };

        let by_slot = tasks_by_slot(tasks, active_nodes);

        // If a converged state was reached, check it is still converged.
        if self.done
            && by_slot
                .values()
                .any(|task| task.phase != crate::client::TaskPhase::Running)
        {
            self.done = false;
        }

        let running = by_slot
            .values()
            .filter(|task| {
                !task.desired_phase.is_terminal() && task.phase == crate::client::TaskPhase::Running
            })
            .count() as u64;

        if !self.done {
            debug!(running, replicas, "service convergence progress");
            if running == replicas {
                info!(replicas, "all replicas running");
                self.done = true;
            }
        }

        Ok(running == replicas)
    }
}

/// Pick the representative task per slot, ignoring tasks on inactive nodes.
fn tasks_by_slot<'a>(
    tasks: &'a [TaskState],
    active_nodes: &HashSet<String>,
) -> HashMap<u64, &'a TaskState> {
    let mut by_slot: HashMap<u64, &TaskState> = HashMap::new();
    for task in tasks {
        if let Some(existing) = by_slot.get(&task.slot) {
            if existing.desired_phase < task.desired_phase {
                continue;
            }
            if existing.desired_phase == task.desired_phase && existing.phase <= task.phase {
                continue;
            }
        }
        // An unassigned task has no node yet and still counts for its slot.
        if !task.node_id.is_empty() && !active_nodes.contains(&task.node_id) {
            continue;
        }
        by_slot.insert(task.slot, task);
    }
    by_slot
}

async fn active_nodes(client: &dyn EngineClient) -> Result<HashSet<String>, ClientError> {
    Ok(client
        .list_nodes()
        .await?
        .into_iter()
        .filter(|node| !node.down)
        .map(|node| node.id)
        .collect())
}

/// Encode the final observed service shape at the current schema version.
fn service_state_bag(state: &ServiceState) -> StateBag {
    let mut attrs = Attrs::new();
    attrs.insert("name".to_string(), json!(state.name));
    attrs.insert("image".to_string(), json!(state.image));
    if let Some(replicas) = state.replicas {
        attrs.insert("replicas".to_string(), json!(replicas));
    }
    attrs.insert(
        "labels".to_string(),
        LabelSet::from_map(&state.labels).to_attr_records(),
    );
    StateBag::new(current_version(ResourceKind::Service), attrs)
}
