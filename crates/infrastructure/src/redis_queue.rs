use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use redis::aio::ConnectionManager;
use tracing::{debug, error, warn};

use teletest_domain::{ExecutionTask, TaskQueue};
use teletest_errors::TeletestResult;

/// Redis 列表任务队列
///
/// RPUSH 入队、BLPOP 出队，依赖 Redis 本身保证同一元素只被一个消费者弹出。
/// 没有可见性超时，没有重投：消费者拿到任务后崩溃，任务即丢失（至多一次投递）。
pub struct RedisTaskQueue {
    /// 连接管理器内部自带断线重连，克隆开销很低
    conn: ConnectionManager,
    queue_name: String,
}

impl RedisTaskQueue {
    /// 建立到 Redis 的连接并绑定队列名
    pub async fn connect(url: &str, queue_name: impl Into<String>) -> TeletestResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let queue_name = queue_name.into();
        debug!("Connected to redis task queue '{}'", queue_name);
        Ok(Self { conn, queue_name })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, execution_id: &str, flow_data: &serde_json::Value) -> bool {
        let task = ExecutionTask::new(execution_id, flow_data.clone());
        let payload = match task.serialize() {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    "Failed to serialize task for execution {}: {}",
                    execution_id, e
                );
                return false;
            }
        };

        let mut conn = self.conn.clone();
        let reply: Result<i64, redis::RedisError> = redis::cmd("RPUSH")
            .arg(&self.queue_name)
            .arg(payload)
            .query_async(&mut conn)
            .await;
        match reply {
            Ok(len) => {
                debug!(
                    "Enqueued execution {} to '{}' (depth: {})",
                    execution_id, self.queue_name, len
                );
                counter!("teletest_queue_enqueued_total").increment(1);
                true
            }
            Err(e) => {
                error!(
                    "Failed to enqueue execution {} to '{}': {}",
                    execution_id, self.queue_name, e
                );
                counter!("teletest_queue_enqueue_errors_total").increment(1);
                false
            }
        }
    }

    async fn dequeue(&self, timeout: Duration) -> Option<ExecutionTask> {
        // BLPOP 的超时以秒计，0 表示无限阻塞，与本接口的约定一致
        let mut conn = self.conn.clone();
        let reply: Result<Option<(String, String)>, redis::RedisError> = redis::cmd("BLPOP")
            .arg(&self.queue_name)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await;

        match reply {
            Ok(Some((_, payload))) => match ExecutionTask::deserialize(&payload) {
                Ok(task) => {
                    counter!("teletest_queue_dequeued_total").increment(1);
                    Some(task)
                }
                Err(e) => {
                    // 无法解码的消息记日志后丢弃，不能让消费者循环崩溃
                    warn!("Dropping undecodable task payload: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Dequeue from '{}' failed: {}", self.queue_name, e);
                None
            }
        }
    }

    async fn size(&self) -> u32 {
        let mut conn = self.conn.clone();
        let reply: Result<u32, redis::RedisError> = redis::cmd("LLEN")
            .arg(&self.queue_name)
            .query_async(&mut conn)
            .await;
        match reply {
            Ok(len) => len,
            Err(e) => {
                warn!("Failed to read size of '{}': {}", self.queue_name, e);
                0
            }
        }
    }

    async fn clear(&self) -> bool {
        let mut conn = self.conn.clone();
        let reply: Result<i64, redis::RedisError> = redis::cmd("DEL")
            .arg(&self.queue_name)
            .query_async(&mut conn)
            .await;
        match reply {
            Ok(_) => {
                debug!("Cleared queue '{}'", self.queue_name);
                true
            }
            Err(e) => {
                error!("Failed to clear queue '{}': {}", self.queue_name, e);
                false
            }
        }
    }
}
