//! Cluster API boundary
//!
//! Provides a trait-based abstraction over the pod, secret and service verbs
//! the controller needs, allowing tests to mock Kubernetes interactions while
//! production code uses real API calls.

use std::fmt;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::api::core::v1::{
    Event as K8sEvent, Pod as K8sPod, Secret as K8sSecret, Service as K8sService,
};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, PostParams, WatchEvent, WatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use podwright_common::{Error, Result};
use podwright_pod::k8s::{Pod, Secret, Service};

/// Object kinds the controller creates and reclaims
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Pod,
    Secret,
    Service,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Pod => "Pod",
            ResourceKind::Secret => "Secret",
            ResourceKind::Service => "Service",
        })
    }
}

/// One cluster event about a unit pod
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodEvent {
    /// Normal or Warning
    pub type_: String,
    /// Machine-readable reason (e.g. "Pulled", "BackOff")
    pub reason: String,
    /// Human-readable message
    pub message: String,
    /// Reporting component
    pub source: String,
    /// How often the event was seen
    pub count: i32,
    /// Last time the event was seen, RFC 3339
    pub last_seen: Option<String>,
}

impl From<K8sEvent> for PodEvent {
    fn from(event: K8sEvent) -> Self {
        Self {
            type_: event.type_.unwrap_or_default(),
            reason: event.reason.unwrap_or_default(),
            message: event.message.unwrap_or_default(),
            source: event
                .source
                .and_then(|s| s.component)
                .or(event.reporting_component)
                .unwrap_or_default(),
            count: event.count.unwrap_or(1),
            last_seen: event.last_timestamp.map(|t| t.0.to_string()),
        }
    }
}

/// Stream of pod events; ends when the server closes the watch
pub type PodEventStream = BoxStream<'static, Result<PodEvent>>;

/// Trait abstracting the cluster operations of the controller
///
/// Every call is scoped to one namespace. `list` filters with a label
/// selector and returns object names; `delete` treats an already-missing
/// object as success.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Submit a pod
    async fn create_pod(&self, pod: &Pod) -> Result<()>;

    /// Create a secret
    async fn create_secret(&self, secret: &Secret) -> Result<()>;

    /// Create a service
    async fn create_service(&self, service: &Service) -> Result<()>;

    /// Names of the objects of `kind` matching `selector`
    async fn list(&self, kind: ResourceKind, namespace: &str, selector: &str)
        -> Result<Vec<String>>;

    /// Delete one object by name
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()>;

    /// Watch events whose involved object is `pod`
    async fn watch_pod_events(
        &self,
        namespace: &str,
        pod: &str,
        timeout_secs: u32,
    ) -> Result<PodEventStream>;
}

/// Production implementation using kube-rs
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Create a new client wrapper
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn create<K, T>(&self, kind: ResourceKind, namespace: &str, object: &T) -> Result<()>
    where
        T: Serialize,
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + fmt::Debug
            + Serialize
            + DeserializeOwned,
        K::DynamicType: Default,
    {
        let object: K = to_openapi(kind, object)?;
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let created = api.create(&PostParams::default(), &object).await?;
        debug!(kind = %kind, name = %created.name_any(), namespace, "created object");
        Ok(())
    }

    async fn list_names<K>(&self, namespace: &str, selector: &str) -> Result<Vec<String>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + fmt::Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default().labels(selector)).await?;
        Ok(list.items.iter().map(ResourceExt::name_any).collect())
    }

    async fn delete_named<K>(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + fmt::Debug + DeserializeOwned,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api
            .delete(name, &DeleteParams::background())
            .await
            .map_err(Error::from)
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(kind = %kind, name, "object already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Convert a podwright object to its k8s-openapi counterpart
fn to_openapi<T: Serialize, K: DeserializeOwned>(kind: ResourceKind, object: &T) -> Result<K> {
    let value = serde_json::to_value(object)
        .map_err(|e| Error::serialization_for_kind(kind.to_string(), e.to_string()))?;
    serde_json::from_value(value)
        .map_err(|e| Error::serialization_for_kind(kind.to_string(), e.to_string()))
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create_pod(&self, pod: &Pod) -> Result<()> {
        self.create::<K8sPod, _>(ResourceKind::Pod, &pod.metadata.namespace, pod)
            .await
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        self.create::<K8sSecret, _>(ResourceKind::Secret, &secret.metadata.namespace, secret)
            .await
    }

    async fn create_service(&self, service: &Service) -> Result<()> {
        self.create::<K8sService, _>(ResourceKind::Service, &service.metadata.namespace, service)
            .await
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<String>> {
        match kind {
            ResourceKind::Pod => self.list_names::<K8sPod>(namespace, selector).await,
            ResourceKind::Secret => self.list_names::<K8sSecret>(namespace, selector).await,
            ResourceKind::Service => self.list_names::<K8sService>(namespace, selector).await,
        }
    }

    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<()> {
        match kind {
            ResourceKind::Pod => self.delete_named::<K8sPod>(kind, namespace, name).await,
            ResourceKind::Secret => self.delete_named::<K8sSecret>(kind, namespace, name).await,
            ResourceKind::Service => self.delete_named::<K8sService>(kind, namespace, name).await,
        }
    }

    async fn watch_pod_events(
        &self,
        namespace: &str,
        pod: &str,
        timeout_secs: u32,
    ) -> Result<PodEventStream> {
        let api: Api<K8sEvent> = Api::namespaced(self.client.clone(), namespace);
        let params = WatchParams::default()
            .fields(&format!("involvedObject.name={pod}"))
            .timeout(timeout_secs);
        let stream = api.watch(&params, "0").await?;

        Ok(stream
            .filter_map(|event| async move {
                match event {
                    Ok(WatchEvent::Added(e)) | Ok(WatchEvent::Modified(e)) => {
                        Some(Ok(PodEvent::from(e)))
                    }
                    Ok(WatchEvent::Deleted(_)) | Ok(WatchEvent::Bookmark(_)) => None,
                    Ok(WatchEvent::Error(status)) => Some(Err(kube::Error::Api(status).into())),
                    Err(e) => Some(Err(e.into())),
                }
            })
            .boxed())
    }
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, message: &str) -> Error {
    Error::from(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "Test".to_string(),
        code,
    }))
}
