use axum::extract::State;

use crate::routes::AppState;

/// Prometheus 文本格式的指标导出
pub async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}
