//! In-memory cluster for lifecycle tests
//!
//! Stores created objects, answers label-selector listings and records
//! deletions in order. Creates and deletes can be made to fail by object
//! name.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use podwright_common::kube_utils::ObjectMeta;
use podwright_common::Result;
use podwright_pod::k8s::{Pod, Secret, Service};

use crate::client::{api_error, ClusterClient, PodEvent, PodEventStream, ResourceKind};

#[derive(Default)]
struct State {
    pods: BTreeMap<String, Pod>,
    secrets: BTreeMap<String, Secret>,
    services: BTreeMap<String, Service>,
    deleted: Vec<(ResourceKind, String)>,
    fail_create: BTreeSet<String>,
    fail_delete: BTreeSet<String>,
    events: Vec<PodEvent>,
}

impl State {
    fn metadata(&self, kind: ResourceKind) -> Vec<&ObjectMeta> {
        match kind {
            ResourceKind::Pod => self.pods.values().map(|p| &p.metadata).collect(),
            ResourceKind::Secret => self.secrets.values().map(|s| &s.metadata).collect(),
            ResourceKind::Service => self.services.values().map(|s| &s.metadata).collect(),
        }
    }

    fn remove(&mut self, kind: ResourceKind, name: &str) -> bool {
        match kind {
            ResourceKind::Pod => self.pods.remove(name).is_some(),
            ResourceKind::Secret => self.secrets.remove(name).is_some(),
            ResourceKind::Service => self.services.remove(name).is_some(),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub(crate) fn fail_create_of(&self, name: &str) {
        self.state.lock().unwrap().fail_create.insert(name.to_string());
    }

    pub(crate) fn fail_delete_of(&self, name: &str) {
        self.state.lock().unwrap().fail_delete.insert(name.to_string());
    }

    pub(crate) fn push_event(&self, event: PodEvent) {
        self.state.lock().unwrap().events.push(event);
    }

    pub(crate) fn pods(&self) -> Vec<Pod> {
        self.state.lock().unwrap().pods.values().cloned().collect()
    }

    pub(crate) fn services(&self) -> Vec<Service> {
        self.state.lock().unwrap().services.values().cloned().collect()
    }

    /// Names of live objects of `kind`, sorted
    pub(crate) fn names(&self, kind: ResourceKind) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .metadata(kind)
            .into_iter()
            .map(|m| m.name.clone())
            .collect()
    }

    /// Successful deletes in call order
    pub(crate) fn deleted(&self) -> Vec<(ResourceKind, String)> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn check_create(&self, state: &State, name: &str, exists: bool) -> Result<()> {
        if state.fail_create.contains(name) {
            return Err(api_error(500, &format!("injected create failure for {name}")));
        }
        if exists {
            return Err(api_error(409, &format!("{name} already exists")));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create_pod(&self, pod: &Pod) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let exists = state.pods.contains_key(pod.name());
        self.check_create(&state, pod.name(), exists)?;
        state.pods.insert(pod.name().to_string(), pod.clone());
        Ok(())
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let exists = state.secrets.contains_key(secret.name());
        self.check_create(&state, secret.name(), exists)?;
        state
            .secrets
            .insert(secret.name().to_string(), secret.clone());
        Ok(())
    }

    async fn create_service(&self, service: &Service) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let name = service.metadata.name.clone();
        let exists = state.services.contains_key(&name);
        self.check_create(&state, &name, exists)?;
        state.services.insert(name, service.clone());
        Ok(())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>> {
        let (key, value) = selector.split_once('=').unwrap_or((selector, ""));
        let state = self.state.lock().unwrap();
        Ok(state
            .metadata(kind)
            .into_iter()
            .filter(|m| m.namespace == namespace)
            .filter(|m| m.labels.get(key).map(String::as_str) == Some(value))
            .map(|m| m.name.clone())
            .collect())
    }

    async fn delete(&self, kind: ResourceKind, _namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delete.contains(name) {
            return Err(api_error(500, &format!("injected delete failure for {name}")));
        }
        if state.remove(kind, name) {
            state.deleted.push((kind, name.to_string()));
        }
        Ok(())
    }

    async fn watch_pod_events(
        &self,
        _namespace: &str,
        _pod: &str,
        _timeout_secs: u32,
    ) -> Result<PodEventStream> {
        let events = self.state.lock().unwrap().events.clone();
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }
}
