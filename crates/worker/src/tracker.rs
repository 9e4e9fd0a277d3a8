use std::sync::Arc;

use tracing::{debug, warn};

use teletest_domain::{ModuleRun, ModuleRunRepository, StatusEvent, StatusPublisher};
use teletest_errors::TeletestResult;

/// 模块运行生命周期跟踪器
///
/// 每次状态转换先改实体（实体自身拒绝终态后的转换）、再持久化、
/// 最后向扇出层发布快照。发布是尽力而为的，不参与事务。
pub struct ModuleRunTracker {
    repository: Arc<dyn ModuleRunRepository>,
    publisher: Arc<dyn StatusPublisher>,
}

impl ModuleRunTracker {
    pub fn new(
        repository: Arc<dyn ModuleRunRepository>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self {
            repository,
            publisher,
        }
    }

    /// 新建 QUEUED 记录并广播初始状态
    pub async fn create(&self, run: &ModuleRun) -> TeletestResult<()> {
        self.repository.insert(run).await?;
        self.publish(run).await;
        Ok(())
    }

    pub async fn mark_running(&self, run: &mut ModuleRun) -> TeletestResult<()> {
        run.mark_running()?;
        self.persist_and_publish(run).await;
        Ok(())
    }

    pub async fn mark_completed(
        &self,
        run: &mut ModuleRun,
        success: bool,
        result: serde_json::Value,
        duration_ms: i64,
    ) -> TeletestResult<()> {
        run.mark_completed(success, result, duration_ms)?;
        self.persist_and_publish(run).await;
        Ok(())
    }

    pub async fn mark_failed(
        &self,
        run: &mut ModuleRun,
        error_message: impl Into<String>,
    ) -> TeletestResult<()> {
        run.mark_failed(error_message)?;
        self.persist_and_publish(run).await;
        Ok(())
    }

    async fn persist_and_publish(&self, run: &ModuleRun) {
        // 实体转换已经成功，持久化失败只记日志，不回滚内存状态
        if let Err(e) = self.repository.update(run).await {
            warn!("Failed to persist module run {}: {}", run.id, e);
        }
        self.publish(run).await;
    }

    async fn publish(&self, run: &ModuleRun) {
        debug!(
            "Publishing status for run {}: {}",
            run.id,
            run.status.as_str()
        );
        self.publisher
            .publish(StatusEvent::ModuleUpdate {
                execution_id: run.execution_id.clone(),
                module_run: run.to_view(),
            })
            .await;
    }
}
