use std::net::SocketAddr;

use anyhow::Context as _;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::SecondsFormat;
use docbench_core::poller::{MetricsReader, MetricsSnapshot, SnapshotState};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const INDEX_HTML: &str = include_str!("../../assets/dashboard.html");

#[derive(Debug)]
pub(crate) struct DashboardServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl DashboardServer {
    pub(crate) async fn start(
        bind_addr: SocketAddr,
        reader: MetricsReader,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("failed to bind dashboard: {bind_addr}"))?;
        let addr = listener
            .local_addr()
            .context("failed to resolve dashboard address")?;

        let app = router(reader);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = serve.await {
                tracing::warn!(error = %err, "dashboard server failed");
            }
        });

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    pub(crate) fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub(crate) async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        let _ = self.task.await;
    }
}

fn router(reader: MetricsReader) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/index.html", get(index))
        .route("/api/metrics", get(metrics))
        .fallback(not_found)
        .with_state(reader)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

#[derive(Debug, Default, Deserialize)]
struct MetricsQuery {
    /// Fetch a new snapshot instead of serving the cached one.
    #[serde(default)]
    refresh: bool,
}

async fn metrics(
    State(reader): State<MetricsReader>,
    Query(query): Query<MetricsQuery>,
) -> impl IntoResponse {
    let snapshot = if query.refresh {
        reader.refresh().await
    } else {
        reader.latest()
    };
    Json(metrics_body(&snapshot))
}

fn metrics_body(snapshot: &MetricsSnapshot) -> serde_json::Value {
    let last_updated = snapshot
        .captured_at
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    match &snapshot.state {
        SnapshotState::Ok(m) => json!({
            "ok": true,
            "docCount": m.doc_count,
            "opcounters": {
                "insert": m.opcounters.insert,
                "query": m.opcounters.query,
                "update": m.opcounters.update,
                "delete": m.opcounters.delete,
                "getmore": m.opcounters.getmore,
                "command": m.opcounters.command,
            },
            "connections": {
                "current": m.connections.current,
                "available": m.connections.available,
                "totalCreated": m.connections.total_created,
                "active": m.connections.active,
            },
            "lastUpdated": last_updated,
        }),
        SnapshotState::Failed { error } => json!({
            "ok": false,
            "error": error,
            "lastUpdated": last_updated,
        }),
    }
}
