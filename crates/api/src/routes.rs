use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use teletest_domain::{ModuleRunRepository, TaskQueue};

use crate::connection::ConnectionManager;
use crate::handlers::{
    executions::{clear_queue, enqueue_execution, list_execution_runs, queue_size},
    health::health_check,
    metrics::render_metrics,
    websocket::{device_ws, execution_ws},
};

/// API应用状态
///
/// 显式上下文对象，在启动时构造一次并传给所有 handler，
/// 不依赖任何进程级全局变量。
#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionManager>,
    pub task_queue: Arc<dyn TaskQueue>,
    pub module_runs: Arc<dyn ModuleRunRepository>,
    pub metrics: PrometheusHandle,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查与指标
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        // 执行管理API
        .route("/api/executions/{id}/enqueue", post(enqueue_execution))
        .route("/api/executions/{id}/runs", get(list_execution_runs))
        // 队列管理API
        .route("/api/queue/size", get(queue_size))
        .route("/api/queue/clear", post(clear_queue))
        // 实时状态流
        .route("/ws/executions/{id}", get(execution_ws))
        .route("/ws/devices", get(device_ws))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
