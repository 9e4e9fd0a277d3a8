//! 状态事件
//!
//! 扇出层投递给 WebSocket 订阅者的事件，序列化后即为线上格式。

use serde::{Deserialize, Serialize};

use crate::entities::ModuleRunView;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// 某次执行内一个模块运行的状态变化，只投递给该执行的订阅者
    ModuleUpdate {
        execution_id: String,
        module_run: ModuleRunView,
    },
    /// 面向设备维度的更新，投递给设备组中关注该设备（或未设过滤器）的连接
    DeviceUpdate {
        device_id: String,
        payload: serde_json::Value,
    },
}

impl StatusEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            StatusEvent::ModuleUpdate { .. } => "module_update",
            StatusEvent::DeviceUpdate { .. } => "device_update",
        }
    }
}
