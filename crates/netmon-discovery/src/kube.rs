//! Pod address discovery through the Kubernetes core/v1 API.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::TargetSource;
use crate::config::ClusterConfig;
use crate::error::{DiscoveryError, DiscoveryResult};

const DEFAULT_PAGE_SIZE: u32 = 500;

/// Subset of a core/v1 `PodList`.
#[derive(Debug, Default, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
    #[serde(default)]
    pub metadata: ListMeta,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMeta {
    #[serde(rename = "continue", default)]
    pub continue_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: PodMeta,
    #[serde(default)]
    pub status: Option<PodStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodMeta {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PodStatus {
    #[serde(rename = "podIP", default)]
    pub pod_ip: Option<String>,
}

/// Addresses of every pod that has one, in list order.
///
/// Pods that have not been assigned an address yet are logged and skipped.
pub fn pod_addresses(list: &PodList) -> Vec<String> {
    list.items
        .iter()
        .filter_map(|pod| {
            let ip = pod
                .status
                .as_ref()
                .and_then(|s| s.pod_ip.as_deref())
                .map(str::trim)
                .filter(|ip| !ip.is_empty());
            if ip.is_none() {
                warn!(pod = %pod.metadata.name, "missing IP address for pod");
            }
            ip.map(str::to_string)
        })
        .collect()
}

/// Where to get cluster settings from on each call.
#[derive(Debug, Clone)]
enum ConfigSource {
    InCluster,
    Static(ClusterConfig),
}

/// Lists pod addresses from the API server.
///
/// In-cluster settings are re-read on every call, so a rotated
/// service-account token is picked up without a restart.
#[derive(Debug, Clone)]
pub struct KubeDiscovery {
    source: ConfigSource,
    page_size: u32,
    timeout: Option<Duration>,
}

impl KubeDiscovery {
    /// Use the pod's own service account.
    pub fn in_cluster() -> Self {
        Self {
            source: ConfigSource::InCluster,
            page_size: DEFAULT_PAGE_SIZE,
            timeout: None,
        }
    }

    /// Use fixed settings (out-of-cluster runs, tests).
    pub fn with_config(config: ClusterConfig) -> Self {
        Self {
            source: ConfigSource::Static(config),
            page_size: DEFAULT_PAGE_SIZE,
            timeout: None,
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Bound each page request, overriding the resolved config's timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn resolve_config(&self) -> DiscoveryResult<ClusterConfig> {
        let config = match &self.source {
            ConfigSource::InCluster => ClusterConfig::in_cluster()?,
            ConfigSource::Static(config) => config.clone(),
        };
        Ok(match self.timeout {
            Some(timeout) => config.with_timeout(timeout),
            None => config,
        })
    }

    /// Fetch every page, appending addresses to `out` as pages arrive so a
    /// failure part-way keeps what was already gathered.
    async fn collect(&self, namespace: &str, out: &mut Vec<String>) -> DiscoveryResult<()> {
        let config = self.resolve_config()?;
        let client = config.client()?;
        let url = pods_url(&config.base_url, namespace)?;

        let mut continue_token: Option<String> = None;
        loop {
            let mut request = client
                .get(url.clone())
                .query(&[("limit", self.page_size.to_string())]);
            if let Some(token) = &continue_token {
                request = request.query(&[("continue", token)]);
            }
            if let Some(bearer) = &config.token {
                request = request.bearer_auth(bearer);
            }

            let resp = request.send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(DiscoveryError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let bytes = resp.bytes().await?;
            let page: PodList = serde_json::from_slice(&bytes)?;
            debug!(%namespace, pods = page.items.len(), "pod list page received");
            out.extend(pod_addresses(&page));

            match page.metadata.continue_token {
                Some(token) if !token.is_empty() => continue_token = Some(token),
                _ => return Ok(()),
            }
        }
    }
}

/// `{base}/api/v1/namespaces/{namespace}/pods`, with `namespace` encoded as
/// a single path segment.
fn pods_url(base_url: &str, namespace: &str) -> DiscoveryResult<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| DiscoveryError::Config(format!("invalid API URL {base_url:?}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| DiscoveryError::Config(format!("API URL {base_url:?} cannot be a base")))?
        .pop_if_empty()
        .extend(["api", "v1", "namespaces", namespace, "pods"]);
    Ok(url)
}

impl TargetSource for KubeDiscovery {
    async fn list_targets(&self, namespace: &str) -> Vec<String> {
        let mut targets = Vec::new();
        if let Err(e) = self.collect(namespace, &mut targets).await {
            error!(%namespace, error = %e, partial = targets.len(), "could not list pods");
        }
        info!(%namespace, ips = ?targets, "discovered pod IPs");
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use axum::Json;
    use axum::Router;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use serde_json::json;

    fn pod(name: &str, ip: Option<&str>) -> serde_json::Value {
        match ip {
            Some(ip) => json!({ "metadata": { "name": name }, "status": { "podIP": ip } }),
            None => json!({ "metadata": { "name": name }, "status": { "phase": "Pending" } }),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn pods_without_ip_are_excluded() {
        let list: PodList = serde_json::from_value(json!({
            "items": [
                pod("a", Some("10.0.0.5")),
                pod("b", None),
                pod("c", Some("")),
                { "metadata": { "name": "d" } },
                pod("e", Some("fd00::9")),
            ]
        }))
        .unwrap();

        assert_eq!(pod_addresses(&list), vec!["10.0.0.5", "fd00::9"]);
    }

    #[test]
    fn empty_list_decodes() {
        let list: PodList = serde_json::from_value(json!({ "kind": "PodList" })).unwrap();
        assert!(pod_addresses(&list).is_empty());
        assert!(list.metadata.continue_token.is_none());
    }

    #[tokio::test]
    async fn lists_namespace_with_bearer_token() {
        let app = Router::new().route(
            "/api/v1/namespaces/netmon/pods",
            get(|headers: HeaderMap| async move {
                let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
                if auth != Some("Bearer s3cret") {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                Json(json!({
                    "items": [pod("a", Some("10.0.0.5")), pod("b", None), pod("c", Some("10.0.0.9"))]
                }))
                .into_response()
            }),
        );
        let base = serve(app).await;

        let discovery = KubeDiscovery::with_config(ClusterConfig::new(base).with_token("s3cret"));
        assert_eq!(discovery.list_targets("netmon").await, vec!["10.0.0.5", "10.0.0.9"]);
    }

    #[tokio::test]
    async fn follows_continue_tokens() {
        let app = Router::new().route(
            "/api/v1/namespaces/netmon/pods",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("limit").map(String::as_str), Some("2"));
                match q.get("continue").map(String::as_str) {
                    None => Json(json!({
                        "metadata": { "continue": "page2" },
                        "items": [pod("a", Some("10.0.0.1")), pod("b", Some("10.0.0.2"))]
                    })),
                    Some("page2") => Json(json!({
                        "metadata": { "continue": "" },
                        "items": [pod("c", Some("10.0.0.3"))]
                    })),
                    Some(other) => panic!("unexpected continue token {other}"),
                }
            }),
        );
        let base = serve(app).await;

        let discovery = KubeDiscovery::with_config(ClusterConfig::new(base)).page_size(2);
        assert_eq!(
            discovery.list_targets("netmon").await,
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );
    }

    #[tokio::test]
    async fn failure_mid_pagination_keeps_earlier_pages() {
        let app = Router::new().route(
            "/api/v1/namespaces/netmon/pods",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                let resp: Response = if q.contains_key("continue") {
                    (StatusCode::GONE, "continue token expired").into_response()
                } else {
                    Json(json!({
                        "metadata": { "continue": "next" },
                        "items": [pod("a", Some("10.0.0.1"))]
                    }))
                    .into_response()
                };
                resp
            }),
        );
        let base = serve(app).await;

        let discovery = KubeDiscovery::with_config(ClusterConfig::new(base));
        assert_eq!(discovery.list_targets("netmon").await, vec!["10.0.0.1"]);

        let mut partial = Vec::new();
        let err = discovery.collect("netmon", &mut partial).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Status { status: 410, .. }));
        assert_eq!(partial, vec!["10.0.0.1"]);
    }

    #[tokio::test]
    async fn forbidden_yields_no_targets() {
        let app = Router::new().route(
            "/api/v1/namespaces/netmon/pods",
            get(|| async { (StatusCode::FORBIDDEN, "pods is forbidden") }),
        );
        let base = serve(app).await;

        let discovery = KubeDiscovery::with_config(ClusterConfig::new(base));
        assert!(discovery.list_targets("netmon").await.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_yields_no_targets() {
        let app = Router::new().route(
            "/api/v1/namespaces/netmon/pods",
            get(|| async { "{not json" }),
        );
        let base = serve(app).await;

        let discovery = KubeDiscovery::with_config(ClusterConfig::new(base));
        let mut out = Vec::new();
        let err = discovery.collect("netmon", &mut out).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Decode(_)));
        assert!(discovery.list_targets("netmon").await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_api_yields_no_targets() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let discovery = KubeDiscovery::with_config(ClusterConfig::new(format!("http://{addr}")));
        assert!(discovery.list_targets("netmon").await.is_empty());
    }

    #[test]
    fn namespace_is_a_single_path_segment() {
        let url = pods_url("https://10.96.0.1:6443", "netmon").unwrap();
        assert_eq!(url.as_str(), "https://10.96.0.1:6443/api/v1/namespaces/netmon/pods");

        let url = pods_url("https://10.96.0.1:443", "a/b").unwrap();
        assert_eq!(url.path(), "/api/v1/namespaces/a%2Fb/pods");

        let url = pods_url("https://10.96.0.1:443", "../../healthz").unwrap();
        assert_eq!(url.path(), "/api/v1/namespaces/..%2F..%2Fhealthz/pods");

        let url = pods_url("http://127.0.0.1:8001/proxy", "netmon").unwrap();
        assert_eq!(url.path(), "/proxy/api/v1/namespaces/netmon/pods");
    }

    #[test]
    fn malformed_api_url_is_a_config_error() {
        assert!(matches!(
            pods_url("not a url", "netmon"),
            Err(DiscoveryError::Config(_))
        ));
    }

    #[tokio::test]
    async fn namespace_with_slash_cannot_reach_other_paths() {
        let app = Router::new()
            .route(
                "/api/v1/namespaces/a/b/pods",
                get(|| async { Json(json!({ "items": [pod("x", Some("10.9.9.9"))] })) }),
            )
            .route(
                "/api/v1/namespaces/{namespace}/pods",
                get(|| async { Json(json!({ "items": [pod("y", Some("10.0.0.7"))] })) }),
            );
        let base = serve(app).await;

        let discovery = KubeDiscovery::with_config(ClusterConfig::new(base));
        assert_eq!(discovery.list_targets("a/b").await, vec!["10.0.0.7"]);
    }

    #[tokio::test]
    async fn hung_api_is_bounded_by_timeout() {
        // Accept the connection but never answer.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let discovery = KubeDiscovery::with_config(ClusterConfig::new(format!("http://{addr}")))
            .timeout(Duration::from_millis(200));
        let mut out = Vec::new();
        let err = tokio::time::timeout(Duration::from_secs(5), discovery.collect("netmon", &mut out))
            .await
            .expect("discovery outlived its timeout")
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Request(e) if e.is_timeout()));
        assert!(out.is_empty());
    }
}
