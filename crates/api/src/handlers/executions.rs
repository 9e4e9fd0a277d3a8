use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::routes::AppState;

/// 提交一次执行
///
/// 请求体即 flow_data；入队成功返回 202，队列不可用返回 503。
/// 队列接口自身永不抛错，这里只看布尔结果。
pub async fn enqueue_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
    Json(flow_data): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if state.task_queue.enqueue(&execution_id, &flow_data).await {
        info!("Execution {} queued", execution_id);
        (
            StatusCode::ACCEPTED,
            Json(json!({ "queued": true, "execution_id": execution_id })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "queued": false, "execution_id": execution_id })),
        )
    }
}

/// 查询一次执行下的全部模块运行记录
pub async fn list_execution_runs(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.module_runs.list_by_execution(&execution_id).await {
        Ok(runs) => {
            let views: Vec<_> = runs.iter().map(|r| r.to_view()).collect();
            (StatusCode::OK, Json(json!({ "module_runs": views })))
        }
        Err(e) => {
            error!("Failed to list runs for execution {}: {}", execution_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "查询模块运行记录失败" })),
            )
        }
    }
}

/// 队列管理：当前深度
pub async fn queue_size(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "size": state.task_queue.size().await }))
}

/// 队列管理：清空
pub async fn clear_queue(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "cleared": state.task_queue.clear().await }))
}
