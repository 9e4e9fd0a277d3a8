//! 领域仓储抽象
//!
//! 模块运行记录的持久化接口；存储的崩溃一致性由具体实现负责

use async_trait::async_trait;

use crate::entities::ModuleRun;
use teletest_errors::TeletestResult;

#[async_trait]
pub trait ModuleRunRepository: Send + Sync {
    async fn insert(&self, run: &ModuleRun) -> TeletestResult<()>;
    async fn update(&self, run: &ModuleRun) -> TeletestResult<()>;
    async fn get_by_id(&self, id: &str) -> TeletestResult<Option<ModuleRun>>;
    async fn list_by_execution(&self, execution_id: &str) -> TeletestResult<Vec<ModuleRun>>;
}
