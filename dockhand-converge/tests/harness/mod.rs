//! In-memory engine for integration tests.
//!
//! The fake answers the [`EngineClient`] calls from scripted state: visibility
//! lag and busy-removal refusals are expressed as tick counters that count
//! down once per call, and service task lists are replayed one snapshot per
//! `list_tasks` call (the last snapshot repeats).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use dockhand_converge::client::{
    ClientError, EngineClient, NetworkSpec, NetworkState, NodeState, ServiceSpec, ServiceState,
    TaskState, VolumeSpec, VolumeState, NETWORK_ACTIVE_ENDPOINTS, VOLUME_IN_USE,
};

#[derive(Default)]
struct Inner {
    networks: HashMap<String, NetworkState>,
    volumes: HashMap<String, VolumeState>,
    services: HashMap<String, ServiceState>,
    /// Task snapshots per service, consumed one per `list_tasks` call.
    task_scripts: HashMap<String, Vec<Vec<TaskState>>>,
    nodes: Vec<NodeState>,

    /// `inspect_network` answers not-found this many more times.
    network_visibility_lag: u32,
    /// Overlay inspects hide the option map this many more times.
    overlay_options_lag: u32,
    /// Remaining "has active endpoints" refusals per network.
    network_busy_ticks: HashMap<String, u32>,
    /// Remaining "volume is in use" refusals per volume.
    volume_busy_ticks: HashMap<String, u32>,
    /// Overrides every `remove_volume` answer when set.
    volume_remove_error: Option<ClientError>,

    next_id: u32,
    inspect_network_calls: usize,
    remove_network_calls: usize,
    remove_volume_calls: usize,
    list_tasks_calls: usize,
}

/// Scripted engine double shared between a test and the reconciler under test.
#[derive(Default)]
pub struct FakeEngine {
    inner: Mutex<Inner>,
}

/// Route reconciler logs through the captured test writer, filtered by
/// `RUST_LOG`. Repeated calls within one test binary are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
impl FakeEngine {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn set_network_visibility_lag(&self, ticks: u32) {
        self.lock().network_visibility_lag = ticks;
    }

    pub fn set_overlay_options_lag(&self, ticks: u32) {
        self.lock().overlay_options_lag = ticks;
    }

    pub fn set_network_busy_ticks(&self, id: &str, ticks: u32) {
        self.lock().network_busy_ticks.insert(id.to_string(), ticks);
    }

    pub fn set_volume_busy_ticks(&self, name: &str, ticks: u32) {
        self.lock()
            .volume_busy_ticks
            .insert(name.to_string(), ticks);
    }

    pub fn set_volume_remove_error(&self, err: ClientError) {
        self.lock().volume_remove_error = Some(err);
    }

    pub fn set_nodes(&self, nodes: Vec<NodeState>) {
        self.lock().nodes = nodes;
    }

    pub fn set_service(&self, state: ServiceState) {
        self.lock().services.insert(state.id.clone(), state);
    }

    /// Queue the task snapshots `list_tasks` will replay for a service.
    pub fn script_tasks(&self, service_id: &str, snapshots: Vec<Vec<TaskState>>) {
        self.lock()
            .task_scripts
            .insert(service_id.to_string(), snapshots);
    }

    pub fn has_network(&self, id: &str) -> bool {
        self.lock().networks.contains_key(id)
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.lock().volumes.contains_key(name)
    }

    pub fn has_service(&self, id: &str) -> bool {
        self.lock().services.contains_key(id)
    }

    pub fn inspect_network_calls(&self) -> usize {
        self.lock().inspect_network_calls
    }

    pub fn remove_network_calls(&self) -> usize {
        self.lock().remove_network_calls
    }

    pub fn remove_volume_calls(&self) -> usize {
        self.lock().remove_volume_calls
    }

    pub fn list_tasks_calls(&self) -> usize {
        self.lock().list_tasks_calls
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<String, ClientError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = format!("net-{}", inner.next_id);
        let scope = if spec.driver.as_deref() == Some("overlay") {
            "overlay"
        } else {
            "local"
        };
        let state = NetworkState {
            id: id.clone(),
            name: spec.name.clone(),
            driver: spec.driver.clone().unwrap_or_else(|| "bridge".to_string()),
            scope: scope.to_string(),
            options: spec.options.clone(),
            labels: spec.labels.clone(),
            internal: spec.internal,
            attachable: spec.attachable,
            ingress: spec.ingress,
            ipv6: spec.ipv6,
        };
        inner.networks.insert(id.clone(), state);
        Ok(id)
    }

    async fn inspect_network(&self, id: &str) -> Result<NetworkState, ClientError> {
        let mut inner = self.lock();
        inner.inspect_network_calls += 1;
        if inner.network_visibility_lag > 0 {
            inner.network_visibility_lag -= 1;
            return Err(ClientError::not_found("network", id));
        }
        let mut state = inner
            .networks
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::not_found("network", id))?;
        if state.scope == "overlay" && inner.overlay_options_lag > 0 {
            inner.overlay_options_lag -= 1;
            state.options.clear();
        }
        Ok(state)
    }

    async fn remove_network(&self, id: &str) -> Result<(), ClientError> {
        let mut inner = self.lock();
        inner.remove_network_calls += 1;
        if let Some(ticks) = inner.network_busy_ticks.get_mut(id) {
            if *ticks > 0 {
                *ticks -= 1;
                return Err(ClientError::Api(format!(
                    "error while removing network: network {id} {NETWORK_ACTIVE_ENDPOINTS}"
                )));
            }
        }
        inner
            .networks
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("network", id))
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<String, ClientError> {
        let mut inner = self.lock();
        let state = VolumeState {
            name: spec.name.clone(),
            driver: spec.driver.clone().unwrap_or_else(|| "local".to_string()),
            mountpoint: format!("/var/lib/engine/volumes/{}", spec.name),
            labels: spec.labels.clone(),
        };
        inner.volumes.insert(spec.name.clone(), state);
        Ok(spec.name.clone())
    }

    async fn inspect_volume(&self, name: &str) -> Result<VolumeState, ClientError> {
        self.lock()
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::not_found("volume", name))
    }

    async fn remove_volume(&self, name: &str, _force: bool) -> Result<(), ClientError> {
        let mut inner = self.lock();
        inner.remove_volume_calls += 1;
        if let Some(err) = &inner.volume_remove_error {
            return Err(err.clone());
        }
        if let Some(ticks) = inner.volume_busy_ticks.get_mut(name) {
            if *ticks > 0 {
                *ticks -= 1;
                return Err(ClientError::Api(format!(
                    "unable to remove volume: {VOLUME_IN_USE} - [running-container]"
                )));
            }
        }
        inner
            .volumes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("volume", name))
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<String, ClientError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = format!("svc-{}", inner.next_id);
        let state = ServiceState {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            replicas: spec.replicas,
            labels: spec.labels.clone(),
            update_status: None,
        };
        inner.services.insert(id.clone(), state);
        Ok(id)
    }

    async fn update_service(&self, id: &str, spec: &ServiceSpec) -> Result<(), ClientError> {
        let mut inner = self.lock();
        let service = inner
            .services
            .get_mut(id)
            .ok_or_else(|| ClientError::not_found("service", id))?;
        service.image = spec.image.clone();
        service.replicas = spec.replicas;
        service.labels = spec.labels.clone();
        Ok(())
    }

    async fn inspect_service(&self, id: &str) -> Result<ServiceState, ClientError> {
        self.lock()
            .services
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::not_found("service", id))
    }

    async fn remove_service(&self, id: &str) -> Result<(), ClientError> {
        self.lock()
            .services
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ClientError::not_found("service", id))
    }

    async fn list_tasks(&self, service_id: &str) -> Result<Vec<TaskState>, ClientError> {
        let mut inner = self.lock();
        inner.list_tasks_calls += 1;
        let Some(script) = inner.task_scripts.get_mut(service_id) else {
            return Ok(Vec::new());
        };
        if script.len() > 1 {
            Ok(script.remove(0))
        } else {
            Ok(script.first().cloned().unwrap_or_default())
        }
    }

    async fn list_nodes(&self) -> Result<Vec<NodeState>, ClientError> {
        Ok(self.lock().nodes.clone())
    }
}
