//! 健康檢查端點：傳輸層連線中時 `GET /healthz` 回 200，否則回 500

use crate::domain::ports::Connectivity;
use crate::utils::error::{Result, SourceError};
use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub fn router(connectivity: Arc<dyn Connectivity>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .with_state(connectivity)
}

async fn healthz(State(connectivity): State<Arc<dyn Connectivity>>) -> (StatusCode, &'static str) {
    if connectivity.is_connected() {
        (StatusCode::OK, "ok")
    } else {
        tracing::warn!("⚠️ Health check failed: transport disconnected");
        (StatusCode::INTERNAL_SERVER_ERROR, "transport disconnected")
    }
}

/// 先綁定監聽埠，埠被佔用時啟動直接失敗
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| SourceError::StartupError {
            message: format!("binding health check listener on {}: {}", addr, e),
        })
}

pub async fn serve(
    listener: TcpListener,
    connectivity: Arc<dyn Connectivity>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "🩺 Health check listening");
    }
    axum::serve(listener, router(connectivity))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(SourceError::IoError)
}

/// 在 `work` 執行期間提供健康檢查，`work` 結束後一併停止
///
/// 健康檢查服務自行中止時，提前以錯誤結束 `work`
pub async fn run_alongside<W>(
    listener: TcpListener,
    connectivity: Arc<dyn Connectivity>,
    work: W,
) -> Result<()>
where
    W: Future<Output = Result<()>>,
{
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let mut health = tokio::spawn(serve(listener, connectivity, async move {
        let _ = stopped.await;
    }));

    tokio::select! {
        outcome = work => {
            let _ = stop.send(());
            let stopped_cleanly = joined(health.await);
            outcome.and(stopped_cleanly)
        }
        finished = &mut health => {
            joined(finished)?;
            Err(SourceError::StartupError {
                message: "health check server stopped unexpectedly".to_string(),
            })
        }
    }
}

fn joined(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    result.map_err(|e| SourceError::StartupError {
        message: format!("health check task: {}", e),
    })?
}
