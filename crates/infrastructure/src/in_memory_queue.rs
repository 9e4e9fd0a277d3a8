use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error};

use teletest_domain::{ExecutionTask, TaskQueue};

/// 内存任务队列实现
///
/// 适用于嵌入式部署和测试场景，语义与 Redis 实现对齐：FIFO、
/// 竞争消费、至多一次投递。多个消费者同时阻塞在 dequeue 时，
/// 每条任务只会唤醒并交给其中一个。
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    queue: Mutex<VecDeque<ExecutionTask>>,
    notify: Notify,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pop(&self) -> Option<ExecutionTask> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, execution_id: &str, flow_data: &serde_json::Value) -> bool {
        let task = ExecutionTask::new(execution_id, flow_data.clone());
        // 入队前先走一遍线格式，保持与 Redis 实现一致的失败面
        if let Err(e) = task.serialize() {
            error!(
                "Failed to serialize task for execution {}: {}",
                execution_id, e
            );
            return false;
        }
        {
            let mut queue = self
                .queue
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            queue.push_back(task);
        }
        self.notify.notify_one();
        counter!("teletest_queue_enqueued_total").increment(1);
        debug!("Enqueued execution {} to in-memory queue", execution_id);
        true
    }

    async fn dequeue(&self, timeout: Duration) -> Option<ExecutionTask> {
        let deadline = (!timeout.is_zero()).then(|| Instant::now() + timeout);
        loop {
            // 先登记唤醒，再查队列，避免在两者之间入队的任务丢失通知
            let notified = self.notify.notified();
            if let Some(task) = self.pop() {
                counter!("teletest_queue_dequeued_total").increment(1);
                return Some(task);
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    if tokio::time::timeout(deadline - now, notified).await.is_err() {
                        let task = self.pop();
                        if task.is_some() {
                            counter!("teletest_queue_dequeued_total").increment(1);
                        }
                        return task;
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn size(&self) -> u32 {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len() as u32
    }

    async fn clear(&self) -> bool {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let purged = queue.len();
        queue.clear();
        debug!("Purged {} tasks from in-memory queue", purged);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_enqueue_then_dequeue() {
        let queue = InMemoryTaskQueue::new();

        assert!(queue.enqueue("exec-1", &json!({"flow": "x"})).await);
        assert_eq!(queue.size().await, 1);

        let task = queue.dequeue(Duration::from_secs(1)).await.unwrap();
        assert_eq!(task.execution_id, "exec-1");
        assert_eq!(task.kind, "execution");
        assert_eq!(task.flow_data, json!({"flow": "x"}));
        assert_eq!(task.priority, 1);

        assert_eq!(queue.size().await, 0);
    }

    #[tokio::test]
    async fn test_dequeue_timeout_on_empty_queue() {
        let queue = InMemoryTaskQueue::new();

        let start = std::time::Instant::now();
        let result = queue.dequeue(Duration::from_millis(100)).await;
        let elapsed = start.elapsed();

        assert!(result.is_none());
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_zero_timeout_blocks_until_item_arrives() {
        let queue = Arc::new(InMemoryTaskQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                // timeout 为零表示无限等待
                queue.dequeue(Duration::ZERO).await
            })
        };

        // 延迟入队，阻塞中的消费者应当被唤醒并拿到任务
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(queue.enqueue("exec-blocked", &json!({})).await);

        let task = tokio::time::timeout(Duration::from_secs(2), consumer)
            .await
            .expect("blocked dequeue should wake up")
            .unwrap()
            .unwrap();
        assert_eq!(task.execution_id, "exec-blocked");
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InMemoryTaskQueue::new();
        for i in 0..5 {
            queue.enqueue(&format!("exec-{i}"), &json!({})).await;
        }
        for i in 0..5 {
            let task = queue.dequeue(Duration::from_secs(1)).await.unwrap();
            assert_eq!(task.execution_id, format!("exec-{i}"));
        }
    }

    #[tokio::test]
    async fn test_competing_consumers_each_item_delivered_once() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        const TOTAL: usize = 20;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(task) = queue.dequeue(Duration::from_millis(200)).await {
                    got.push(task.id);
                }
                got
            }));
        }

        for i in 0..TOTAL {
            queue.enqueue(&format!("exec-{i}"), &json!({})).await;
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        let before = all.len();
        all.dedup();
        // 每条任务恰好投递一次：无丢失、无重复
        assert_eq!(before, TOTAL);
        assert_eq!(all.len(), TOTAL);
    }

    #[tokio::test]
    async fn test_clear_empties_queue() {
        let queue = InMemoryTaskQueue::new();
        for i in 0..3 {
            queue.enqueue(&format!("exec-{i}"), &json!({})).await;
        }
        assert_eq!(queue.size().await, 3);

        assert!(queue.clear().await);
        assert_eq!(queue.size().await, 0);
        assert!(queue.dequeue(Duration::from_millis(50)).await.is_none());
    }
}
