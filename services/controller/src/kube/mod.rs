//! Kubernetes API client.
//!
//! A thin REST client over the handful of endpoints the controller uses:
//! listing pods, replica sets, deployments and nodes, and merge-patching a
//! pod's deletion-cost annotation.

pub mod wire;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};
use zonecost_events::{annotations, Node, ObjectKey, Replica, ReplicaGroup, Workload};

use crate::cluster::{ClusterError, ClusterResult, ReplicaWriter};

/// Page size for list calls.
const LIST_LIMIT: usize = 500;

/// Connection settings for [`KubeClient`].
#[derive(Debug, Clone)]
pub struct KubeConfig {
    /// API server base URL, e.g. `https://10.96.0.1:443`.
    pub api_url: String,
    pub token: Option<String>,
    /// PEM bundle to trust in addition to the system roots.
    pub ca_pem: Option<Vec<u8>>,
    /// Restrict pod, replica set and deployment listing to one namespace.
    pub namespace: Option<String>,
    pub timeout: Duration,
}

impl KubeConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token: None,
            ca_pem: None,
            namespace: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Kubernetes REST client.
#[derive(Debug, Clone)]
pub struct KubeClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    namespace: Option<String>,
}

impl KubeClient {
    /// Build a client. Fails if the CA bundle does not parse.
    pub fn new(config: &KubeConfig) -> ClusterResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if let Some(pem) = &config.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| ClusterError::Invalid(format!("CA bundle: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            namespace: config.namespace.clone(),
        })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub async fn list_pods(&self) -> ClusterResult<Vec<Replica>> {
        let path = self.collection_path("/api/v1", "pods");
        let pods: Vec<wire::Pod> = self.list_all(&path).await?;
        Ok(convert_all(pods, "pod"))
    }

    pub async fn list_replica_sets(&self) -> ClusterResult<Vec<ReplicaGroup>> {
        let path = self.collection_path("/apis/apps/v1", "replicasets");
        let sets: Vec<wire::ReplicaSet> = self.list_all(&path).await?;
        Ok(convert_all(sets, "replicaset"))
    }

    pub async fn list_deployments(&self) -> ClusterResult<Vec<Workload>> {
        let path = self.collection_path("/apis/apps/v1", "deployments");
        let deployments: Vec<wire::Deployment> = self.list_all(&path).await?;
        Ok(convert_all(deployments, "deployment"))
    }

    /// Read one pod straight from the API server.
    pub async fn get_pod(&self, key: &ObjectKey) -> ClusterResult<Replica> {
        let path = pod_path(key);
        let pod: wire::Pod = match self.send(self.request(Method::GET, &path), &path).await {
            Err(ClusterError::NotFound { .. }) => return Err(ClusterError::not_found("pod", key)),
            other => other?,
        };
        Replica::try_from(pod)
    }

    /// Nodes are cluster scoped and always listed in full.
    pub async fn list_nodes(&self) -> ClusterResult<Vec<Node>> {
        let nodes: Vec<wire::NodeObject> = self.list_all("/api/v1/nodes").await?;
        Ok(nodes.into_iter().map(Node::from).collect())
    }

    fn collection_path(&self, prefix: &str, resource: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{prefix}/namespaces/{ns}/{resource}"),
            None => format!("{prefix}/{resource}"),
        }
    }

    /// Follow `continue` tokens until the list is complete.
    async fn list_all<T: DeserializeOwned>(&self, path: &str) -> ClusterResult<Vec<T>> {
        let mut items = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut query = vec![("limit", LIST_LIMIT.to_string())];
            if let Some(token) = continue_token.take() {
                query.push(("continue", token));
            }

            let request = self.request(Method::GET, path).query(&query);
            let page: wire::List<T> = self.send(request, path).await?;
            items.extend(page.items);

            match page.metadata.continue_token {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => break,
            }
        }

        debug!(path, count = items.len(), "listed objects");
        Ok(items)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> ClusterResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| ClusterError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, what));
        }

        response
            .json()
            .await
            .map_err(|e| ClusterError::Invalid(format!("{what}: {e}")))
    }
}

fn pod_path(key: &ObjectKey) -> String {
    format!("/api/v1/namespaces/{}/pods/{}", key.namespace, key.name)
}

/// Convert listed objects, logging and skipping any that do not convert.
fn convert_all<W, T>(objects: Vec<W>, kind: &str) -> Vec<T>
where
    T: TryFrom<W, Error = ClusterError>,
{
    let mut converted = Vec::with_capacity(objects.len());
    for object in objects {
        match T::try_from(object) {
            Ok(value) => converted.push(value),
            Err(e) => warn!(kind, error = %e, "skipping unconvertible object"),
        }
    }
    converted
}

/// Map an API error response onto [`ClusterError`].
fn status_error(status: StatusCode, body: &str, what: &str) -> ClusterError {
    let message = serde_json::from_str::<wire::Status>(body)
        .map(|s| s.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("{status}"));

    match status {
        StatusCode::NOT_FOUND => ClusterError::NotFound {
            kind: "object",
            name: what.to_string(),
        },
        StatusCode::CONFLICT => ClusterError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ClusterError::Rejected(message)
        }
        _ => ClusterError::Transport(format!("{status}: {message}")),
    }
}

#[async_trait]
impl ReplicaWriter for KubeClient {
    async fn fetch_replica(&self, key: &ObjectKey) -> ClusterResult<Replica> {
        self.get_pod(key).await
    }

    async fn patch_deletion_cost(&self, replica: &Replica, cost: i32) -> ClusterResult<Replica> {
        let path = pod_path(&replica.key);
        // uid and resourceVersion act as preconditions: a mismatch is a 409.
        let patch = json!({
            "metadata": {
                "uid": replica.uid.to_string(),
                "resourceVersion": replica.resource_version.as_str(),
                "annotations": {
                    (annotations::POD_DELETION_COST): cost.to_string(),
                },
            },
        });

        let request = self
            .request(Method::PATCH, &path)
            .header(reqwest::header::CONTENT_TYPE, "application/merge-patch+json")
            .body(patch.to_string());

        let pod: wire::Pod = match self.send(request, &path).await {
            Err(ClusterError::NotFound { .. }) => {
                return Err(ClusterError::not_found("pod", &replica.key));
            }
            other => other?,
        };
        debug!(pod = %replica.key, cost, "patched deletion cost");
        Replica::try_from(pod)
    }
}
