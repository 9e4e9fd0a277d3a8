use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::{ConnectionManager, OUTBOUND_BUFFER};
use crate::routes::AppState;

/// 订阅某次执行的状态流
pub async fn execution_ws(
    ws: WebSocketUpgrade,
    Path(execution_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| {
        handle_socket(socket, state.connections, Some(execution_id))
    })
}

/// 订阅设备维度的更新流（通过入站消息细化兴趣集）
pub async fn device_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.connections, None))
}

/// 单连接的收发循环
///
/// 出站走专属 writer 任务 + 有界通道，接收循环只阻塞本连接；
/// 任何一侧断开即注销连接。
async fn handle_socket(
    socket: WebSocket,
    manager: Arc<ConnectionManager>,
    execution_id: Option<String>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let id = manager.connect(tx, execution_id).await;

    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if ws_tx.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => {
                manager.handle_client_message(id, text.as_str()).await;
            }
            Message::Close(_) => {
                debug!("Connection {} sent close frame", id);
                break;
            }
            // Ping/Pong 由 axum 底层处理，二进制帧不在协议里
            _ => {}
        }
    }

    manager.disconnect(id).await;
    writer.abort();
}
