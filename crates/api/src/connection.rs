use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use teletest_domain::{StatusEvent, StatusPublisher};

/// 每个连接的出站缓冲容量
///
/// 广播对满缓冲采取丢弃策略：慢连接只会丢自己的事件，
/// 绝不拖慢对其他连接的投递。
pub const OUTBOUND_BUFFER: usize = 64;

pub type ConnectionId = u64;

/// 客户端入站消息
///
/// 封闭的标签枚举，未知 type 落入 Unknown 分支：记日志后忽略，
/// 不回错误也不断开连接。
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribeDevice {
        device_id: String,
    },
    UnsubscribeDevice {
        device_id: String,
    },
    StartPreview {
        device_id: String,
        #[serde(default)]
        quality: Option<String>,
    },
    StopPreview {
        device_id: String,
    },
    #[serde(other)]
    Unknown,
}

struct ConnectionHandle {
    sender: mpsc::Sender<String>,
    /// 执行维度订阅；None 表示只挂在设备更新组上
    execution_id: Option<String>,
    /// 设备兴趣集；空集合即通配，收所有设备的更新
    device_filter: HashSet<String>,
    /// 正在预览的设备（预览媒体流由设备层传输，这里只登记意图）
    preview_devices: HashSet<String>,
    dropped: u64,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    execution_groups: HashMap<String, HashSet<ConnectionId>>,
}

/// 连接管理器
///
/// 维护在线连接及其订阅范围，把状态事件扇出给感兴趣的订阅者。
/// 所有公共方法都不向调用方抛错。
#[derive(Default)]
pub struct ConnectionManager {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册连接
    ///
    /// 给定 execution_id 时加入对应执行组；所有连接都同时挂在
    /// 未限定的设备更新组上。
    pub async fn connect(
        &self,
        sender: mpsc::Sender<String>,
        execution_id: Option<String>,
    ) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut registry = self.registry.write().await;
        if let Some(execution_id) = &execution_id {
            registry
                .execution_groups
                .entry(execution_id.clone())
                .or_default()
                .insert(id);
        }
        registry.connections.insert(
            id,
            ConnectionHandle {
                sender,
                execution_id: execution_id.clone(),
                device_filter: HashSet::new(),
                preview_devices: HashSet::new(),
                dropped: 0,
            },
        );
        info!(
            "Connection {} registered (execution: {:?}, total: {})",
            id,
            execution_id,
            registry.connections.len()
        );
        id
    }

    /// 注销连接，可重复调用
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut registry = self.registry.write().await;
        if let Some(handle) = registry.connections.remove(&id) {
            if let Some(execution_id) = &handle.execution_id {
                if let Some(group) = registry.execution_groups.get_mut(execution_id) {
                    group.remove(&id);
                    if group.is_empty() {
                        registry.execution_groups.remove(execution_id);
                    }
                }
            }
            if handle.dropped > 0 {
                warn!(
                    "Connection {} closed with {} dropped events",
                    id, handle.dropped
                );
            }
            info!(
                "Connection {} unregistered (total: {})",
                id,
                registry.connections.len()
            );
        }
    }

    pub async fn subscribe_device(&self, id: ConnectionId, device_id: &str) {
        let mut registry = self.registry.write().await;
        if let Some(handle) = registry.connections.get_mut(&id) {
            handle.device_filter.insert(device_id.to_string());
            debug!("Connection {} subscribed to device {}", id, device_id);
        }
    }

    pub async fn unsubscribe_device(&self, id: ConnectionId, device_id: &str) {
        let mut registry = self.registry.write().await;
        if let Some(handle) = registry.connections.get_mut(&id) {
            handle.device_filter.remove(device_id);
            debug!("Connection {} unsubscribed from device {}", id, device_id);
        }
    }

    /// 处理一条客户端入站消息
    ///
    /// 坏 JSON 记日志后丢弃，连接保持打开；未知 type 同样只记日志。
    pub async fn handle_client_message(&self, id: ConnectionId, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::SubscribeDevice { device_id }) => {
                self.subscribe_device(id, &device_id).await;
            }
            Ok(ClientMessage::UnsubscribeDevice { device_id }) => {
                self.unsubscribe_device(id, &device_id).await;
            }
            Ok(ClientMessage::StartPreview { device_id, quality }) => {
                info!(
                    "Connection {} requested preview of {} (quality: {:?})",
                    id, device_id, quality
                );
                let mut registry = self.registry.write().await;
                if let Some(handle) = registry.connections.get_mut(&id) {
                    handle.preview_devices.insert(device_id);
                }
            }
            Ok(ClientMessage::StopPreview { device_id }) => {
                let mut registry = self.registry.write().await;
                if let Some(handle) = registry.connections.get_mut(&id) {
                    handle.preview_devices.remove(&device_id);
                }
            }
            Ok(ClientMessage::Unknown) => {
                debug!("Ignoring unrecognized message type from connection {}", id);
            }
            Err(e) => {
                warn!("Malformed message from connection {}: {}", id, e);
            }
        }
    }

    /// 扇出一个状态事件
    ///
    /// 执行维度事件只进对应执行组；设备维度事件进设备更新组，
    /// 按各连接的兴趣集过滤（空集 = 通配）。投递用 try_send，
    /// 缓冲满即丢弃该连接的这一条，计数并继续投别的连接。
    pub async fn broadcast(&self, event: &StatusEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize status event: {}", e);
                return;
            }
        };

        let mut registry = self.registry.write().await;
        match event {
            StatusEvent::ModuleUpdate { execution_id, .. } => {
                let targets: Vec<ConnectionId> = registry
                    .execution_groups
                    .get(execution_id)
                    .map(|group| group.iter().copied().collect())
                    .unwrap_or_default();
                for id in targets {
                    Self::deliver(&mut registry, id, &payload);
                }
            }
            StatusEvent::DeviceUpdate { device_id, .. } => {
                let targets: Vec<ConnectionId> = registry
                    .connections
                    .iter()
                    .filter(|(_, handle)| {
                        handle.device_filter.is_empty() || handle.device_filter.contains(device_id)
                    })
                    .map(|(id, _)| *id)
                    .collect();
                for id in targets {
                    Self::deliver(&mut registry, id, &payload);
                }
            }
        }
    }

    fn deliver(registry: &mut Registry, id: ConnectionId, payload: &str) {
        if let Some(handle) = registry.connections.get_mut(&id) {
            match handle.sender.try_send(payload.to_string()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    handle.dropped += 1;
                    counter!("teletest_ws_dropped_events_total").increment(1);
                    debug!("Outbound buffer full for connection {}, event dropped", id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // 连接已断，等 disconnect 清理
                    debug!("Connection {} channel closed", id);
                }
            }
        }
    }

    /// 某个连接当前登记的预览设备
    pub async fn preview_devices(&self, id: ConnectionId) -> Vec<String> {
        let registry = self.registry.read().await;
        registry
            .connections
            .get(&id)
            .map(|handle| handle.preview_devices.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        self.registry.read().await.connections.len()
    }
}

#[async_trait]
impl StatusPublisher for ConnectionManager {
    async fn publish(&self, event: StatusEvent) {
        self.broadcast(&event).await;
    }
}
