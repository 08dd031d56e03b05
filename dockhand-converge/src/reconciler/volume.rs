//! Volume reconciler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use dockhand_state::{current_version, Attrs, LabelSet, ManagedResource, ResourceKind, StateBag};

use crate::client::{ClientError, EngineClient, VolumeSpec, VolumeState, VOLUME_IN_USE};
use crate::error::ConvergeError;
use crate::poller::{wait_for_state, ConvergePlan, Observation, StateProbe};
use crate::settings::ConvergeSettings;

use super::state_tags::{IN_USE, REMOVED};

pub struct VolumeReconciler {
    client: Arc<dyn EngineClient>,
    settings: ConvergeSettings,
}

impl VolumeReconciler {
    pub fn new(client: Arc<dyn EngineClient>, settings: ConvergeSettings) -> Self {
        Self { client, settings }
    }

    /// Create the volume and capture its observed shape. Volumes are visible
    /// immediately after creation, so no polling is involved.
    pub async fn create(&self, spec: &VolumeSpec) -> Result<ManagedResource, ConvergeError> {
        let name = self.client.create_volume(spec).await?;
        info!(volume = %name, "volume created");
        let state = self.client.inspect_volume(&name).await?;
        Ok(ManagedResource {
            id: name,
            kind: ResourceKind::Volume,
            state: volume_state_bag(&state),
        })
    }

    /// Remove the volume, retrying while a container still uses it.
    ///
    /// Each tick re-issues a forced remove; the engine answers "volume is in
    /// use" until the last consumer is gone.
    pub async fn remove(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ConvergeError> {
        info!(
            volume = %name,
            timeout = ?self.settings.timeout,
            "waiting for volume to be removed"
        );
        let plan = ConvergePlan {
            pending: &[IN_USE],
            target: &[REMOVED],
            settings: self.settings,
        };
        let probe = VolumeRemoveProbe {
            client: self.client.as_ref(),
            name,
        };
        wait_for_state(name, probe, plan, cancel).await?;
        Ok(())
    }
}

struct VolumeRemoveProbe<'a> {
    client: &'a dyn EngineClient,
    name: &'a str,
}

#[async_trait]
impl StateProbe for VolumeRemoveProbe<'_> {
    type Output = ();

    async fn observe(&mut self) -> Result<Observation<()>, ClientError> {
        match self.client.remove_volume(self.name, true).await {
            Ok(()) => {
                info!(volume = %self.name, "volume removed");
                Ok(Observation {
                    output: (),
                    state: REMOVED,
                })
            }
            Err(err) if err.is_not_found() => {
                info!(volume = %self.name, "volume already removed");
                Ok(Observation {
                    output: (),
                    state: REMOVED,
                })
            }
            Err(err) if err.is_transient_removal(VOLUME_IN_USE) => {
                debug!(volume = %self.name, "volume still in use");
                Ok(Observation {
                    output: (),
                    state: IN_USE,
                })
            }
            Err(err) => Err(err),
        }
    }
}

/// Encode the observed volume shape at the current schema version.
fn volume_state_bag(state: &VolumeState) -> StateBag {
    let mut attrs = Attrs::new();
    attrs.insert("name".to_string(), json!(state.name));
    attrs.insert("driver".to_string(), json!(state.driver));
    attrs.insert("mountpoint".to_string(), json!(state.mountpoint));
    attrs.insert(
        "labels".to_string(),
        LabelSet::from_map(&state.labels).to_attr_records(),
    );
    StateBag::new(current_version(ResourceKind::Volume), attrs)
}
