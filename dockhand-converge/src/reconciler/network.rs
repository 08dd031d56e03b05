//! Network reconciler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dockhand_state::{current_version, Attrs, LabelSet, ManagedResource, ResourceKind, StateBag};

use crate::client::{
    ClientError, EngineClient, NetworkSpec, NetworkState, NETWORK_ACTIVE_ENDPOINTS,
};
use crate::error::ConvergeError;
use crate::poller::{wait_for_state, ConvergePlan, Observation, StateProbe};
use crate::settings::ConvergeSettings;

use super::state_tags::{ALL_FIELDS, PENDING, REMOVED};

/// Network scope whose driver options are exposed some time after creation.
/// An empty option map is only final for the other scopes.
const OVERLAY_SCOPE: &str = "overlay";

pub struct NetworkReconciler {
    client: Arc<dyn EngineClient>,
    settings: ConvergeSettings,
}

impl NetworkReconciler {
    pub fn new(client: Arc<dyn EngineClient>, settings: ConvergeSettings) -> Self {
        Self { client, settings }
    }

    /// Create the network, then wait until the engine exposes all its fields.
    pub async fn create(
        &self,
        spec: &NetworkSpec,
        cancel: &CancellationToken,
    ) -> Result<ManagedResource, ConvergeError> {
        let id = self.client.create_network(spec).await?;
        info!(network = %id, name = %spec.name, "network created");
        self.read(&id, cancel).await
    }

    /// Confirm the network is fully visible and capture its final observed
    /// shape. The persisted state is built from the last observation, not
    /// from a snapshot taken right after the create call.
    pub async fn read(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<ManagedResource, ConvergeError> {
        info!(
            network = %id,
            timeout = ?self.settings.timeout,
            "waiting for network to expose all fields"
        );
        let plan = ConvergePlan {
            pending: &[PENDING],
            target: &[ALL_FIELDS],
            settings: self.settings,
        };
        let probe = NetworkReadProbe {
            client: self.client.as_ref(),
            id,
        };
        let state = wait_for_state(id, probe, plan, cancel).await?;
        Ok(ManagedResource {
            id: id.to_string(),
            kind: ResourceKind::Network,
            state: network_state_bag(&state),
        })
    }

    /// Remove the network, retrying while dependents still hold endpoints.
    pub async fn remove(&self, id: &str, cancel: &CancellationToken) -> Result<(), ConvergeError> {
        info!(
            network = %id,
            timeout = ?self.settings.timeout,
            "waiting for network to be removed"
        );
        let plan = ConvergePlan {
            pending: &[PENDING],
            target: &[REMOVED],
            settings: self.settings,
        };
        let probe = NetworkRemoveProbe {
            client: self.client.as_ref(),
            id,
        };
        wait_for_state(id, probe, plan, cancel).await?;
        Ok(())
    }
}

struct NetworkReadProbe<'a> {
    client: &'a dyn EngineClient,
    id: &'a str,
}

#[async_trait]
impl StateProbe for NetworkReadProbe<'_> {
    type Output = NetworkState;

    async fn observe(&mut self) -> Result<Observation<NetworkState>, ClientError> {
        let network = match self.client.inspect_network(self.id).await {
            Ok(network) => network,
            // Not visible yet: the engine is eventually consistent after a
            // create, so absence here is lag, not loss.
            Err(err) if err.is_not_found() => {
                debug!(network = %self.id, "network not visible yet");
                return Ok(Observation {
                    output: NetworkState::default(),
                    state: PENDING,
                });
            }
            Err(err) => return Err(err),
        };

        if network.scope == OVERLAY_SCOPE && network.options.is_empty() {
            debug!(network = %self.id, "overlay driver options not exposed yet");
            return Ok(Observation {
                output: NetworkState::default(),
                state: PENDING,
            });
        }

        debug!(network = %self.id, "all network fields exposed");
        Ok(Observation {
            output: network,
            state: ALL_FIELDS,
        })
    }
}

struct NetworkRemoveProbe<'a> {
    client: &'a dyn EngineClient,
    id: &'a str,
}

#[async_trait]
impl StateProbe for NetworkRemoveProbe<'_> {
    type Output = ();

    async fn observe(&mut self) -> Result<Observation<()>, ClientError> {
        match self.client.inspect_network(self.id).await {
            Err(err) if err.is_not_found() => {
                info!(network = %self.id, "network already removed");
                return Ok(Observation {
                    output: (),
                    state: REMOVED,
                });
            }
            Err(err) => return Err(err),
            Ok(_) => {}
        }

        match self.client.remove_network(self.id).await {
            Ok(()) => Ok(Observation {
                output: (),
                state: REMOVED,
            }),
            // Dependent containers detach asynchronously; keep re-issuing
            // the removal until the engine lets go.
            Err(err) if err.is_transient_removal(NETWORK_ACTIVE_ENDPOINTS) => {
                debug!(network = %self.id, "network still has active endpoints");
                Ok(Observation {
                    output: (),
                    state: PENDING,
                })
            }
            Err(err) => Err(err),
        }
    }
}

/// Encode the final observed network shape at the current schema version.
fn network_state_bag(state: &NetworkState) -> StateBag {
    let mut attrs = Attrs::new();
    attrs.insert("name".to_string(), json!(state.name));
    attrs.insert("driver".to_string(), json!(state.driver));
    attrs.insert("scope".to_string(), json!(state.scope));
    attrs.insert("options".to_string(), json!(state.options));
    attrs.insert("internal".to_string(), json!(state.internal));
    attrs.insert("attachable".to_string(), json!(state.attachable));
    attrs.insert("ingress".to_string(), json!(state.ingress));
    attrs.insert("ipv6".to_string(), json!(state.ipv6));
    attrs.insert(
        "labels".to_string(),
        LabelSet::from_map(&state.labels).to_attr_records(),
    );
    StateBag::new(current_version(ResourceKind::Network), attrs)
}
