use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use teletest_domain::{ModuleRun, ModuleRunRepository};
use teletest_errors::{TeletestError, TeletestResult};

/// 内存模块运行仓储
///
/// 嵌入式部署和测试用；生产部署换成数据库实现，接口不变。
#[derive(Debug, Default)]
pub struct InMemoryModuleRunRepository {
    runs: Arc<RwLock<HashMap<String, ModuleRun>>>,
}

impl InMemoryModuleRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModuleRunRepository for InMemoryModuleRunRepository {
    async fn insert(&self, run: &ModuleRun) -> TeletestResult<()> {
        let mut runs = self.runs.write().await;
        runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn update(&self, run: &ModuleRun) -> TeletestResult<()> {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&run.id) {
            Some(existing) => {
                *existing = run.clone();
                Ok(())
            }
            None => Err(TeletestError::ModuleRunNotFound { id: run.id.clone() }),
        }
    }

    async fn get_by_id(&self, id: &str) -> TeletestResult<Option<ModuleRun>> {
        let runs = self.runs.read().await;
        Ok(runs.get(id).cloned())
    }

    async fn list_by_execution(&self, execution_id: &str) -> TeletestResult<Vec<ModuleRun>> {
        let runs = self.runs.read().await;
        let mut found: Vec<ModuleRun> = runs
            .values()
            .filter(|r| r.execution_id == execution_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }
}
