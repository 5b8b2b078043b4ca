//! HTTP handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::ApiState;

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let families = state.registry.snapshot().await;
    let body = netmon_metrics::render_prometheus(&families);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use netmon_metrics::{Labels, MetricKind, MetricRegistry};
    use tower::ServiceExt;

    use crate::build_router;

    async fn get_body(registry: MetricRegistry, uri: &str) -> (StatusCode, String, Option<String>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = build_router(registry).oneshot(req).await.unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get("content-type")
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap(), content_type)
    }

    #[tokio::test]
    async fn metrics_empty_registry() {
        let (status, body, _) = get_body(MetricRegistry::new(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn metrics_renders_registry_contents() {
        let registry = MetricRegistry::new();
        registry
            .describe("ping_status", "Ping reachability.", MetricKind::Gauge)
            .await
            .unwrap();
        registry
            .set("ping_status", &Labels::new().with("ip", "10.0.0.5"), 1.0)
            .await
            .unwrap();
        registry
            .add("ping_count_total", &Labels::new().with("ip", "10.0.0.5"), 5.0)
            .await
            .unwrap();

        let (status, body, content_type) = get_body(registry, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/plain"));
        assert!(body.contains("# TYPE ping_status gauge"));
        assert!(body.contains("ping_status{ip=\"10.0.0.5\"} 1\n"));
        assert!(body.contains("ping_count_total{ip=\"10.0.0.5\"} 5\n"));
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let (status, body, _) = get_body(MetricRegistry::new(), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (status, _, _) = get_body(MetricRegistry::new(), "/api/v1/deployments").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
