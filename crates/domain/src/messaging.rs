use std::time::Duration;

use async_trait::async_trait;

use crate::entities::ExecutionTask;
use crate::events::StatusEvent;

/// 任务队列抽象接口
///
/// 契约：公共接口绝不向外抛错。传输层故障统一降级为 false / None / 0 并记日志。
/// 投递语义为至多一次：没有确认与重投，消费者取走后崩溃即丢失该任务。
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 构造执行信封并追加到队列尾部；任何传输故障返回 false
    async fn enqueue(&self, execution_id: &str, flow_data: &serde_json::Value) -> bool;

    /// 阻塞式出队
    ///
    /// timeout 为零表示无限等待；超时或传输故障返回 None。
    /// 多个消费者竞争时每个任务只会被先成功出队的那个拿到。
    async fn dequeue(&self, timeout: Duration) -> Option<ExecutionTask>;

    /// 当前队列长度，故障时降级为 0
    async fn size(&self) -> u32;

    /// 清空队列，故障时返回 false
    async fn clear(&self) -> bool;
}

/// 状态发布端口
///
/// Worker 通过它把模块运行状态推给扇出层；发布失败不回传错误，
/// 慢连接、断连都由扇出层自行消化。
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, event: StatusEvent);
}
