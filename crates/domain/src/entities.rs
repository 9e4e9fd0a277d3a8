use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teletest_errors::{TeletestError, TeletestResult};
use uuid::Uuid;

/// 队列上的执行任务信封
///
/// 入队后不可变；每个任务最多被一个消费者取走一次，没有确认和重投机制。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTask {
    #[serde(rename = "type", default = "ExecutionTask::default_kind")]
    pub kind: String,
    pub id: String,
    pub execution_id: String,
    pub flow_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub priority: i32,
}

impl ExecutionTask {
    pub fn new(execution_id: impl Into<String>, flow_data: serde_json::Value) -> Self {
        Self {
            kind: Self::default_kind(),
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
            flow_data,
            created_at: Utc::now(),
            priority: 1,
        }
    }

    fn default_kind() -> String {
        "execution".to_string()
    }

    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
    pub fn deserialize(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// 执行流描述，由调用方随任务携带
///
/// 解析采取宽松策略：结构不合法时上报 InvalidFlow，由编排器转为 mark_failed，
/// 绝不让 Worker 因为一条坏数据崩溃。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowData {
    #[serde(default)]
    pub modules: Vec<ModuleRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRequest {
    pub module: String,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl FlowData {
    pub fn parse(value: &serde_json::Value) -> TeletestResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| TeletestError::InvalidFlow(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ModuleRunStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ModuleRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleRunStatus::Queued => "QUEUED",
            ModuleRunStatus::Running => "RUNNING",
            ModuleRunStatus::Completed => "COMPLETED",
            ModuleRunStatus::Failed => "FAILED",
        }
    }
}

/// 一次模块执行的生命周期记录
///
/// 不变式：completed_at 当且仅当处于终态时有值；duration_ms 只在 COMPLETED 下有值；
/// 终态之后的任何转换都会被拒绝（返回 InvalidStateTransition，记录保持原样）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRun {
    pub id: String,
    pub execution_id: String,
    pub module_id: String,
    pub module_name: String,
    pub device_id: Option<String>,
    pub status: ModuleRunStatus,
    pub success: bool,
    pub error_message: Option<String>,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModuleRun {
    pub fn new(execution_id: impl Into<String>, request: &ModuleRequest) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        Self {
            id: id.clone(),
            execution_id: execution_id.into(),
            module_id: request.module_id.clone().unwrap_or(id),
            module_name: request.module.clone(),
            device_id: request.device_id.clone(),
            status: ModuleRunStatus::Queued,
            success: false,
            error_message: None,
            parameters: request.parameters.clone(),
            result: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.status,
            ModuleRunStatus::Completed | ModuleRunStatus::Failed
        )
    }

    fn guard_not_terminal(&self) -> TeletestResult<()> {
        if self.is_finished() {
            return Err(TeletestError::InvalidStateTransition {
                run_id: self.id.clone(),
                status: self.status.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// QUEUED -> RUNNING
    pub fn mark_running(&mut self) -> TeletestResult<()> {
        self.guard_not_terminal()?;
        self.status = ModuleRunStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// RUNNING -> COMPLETED
    ///
    /// success 按执行器的判定原样记录：一个模块可以"执行完成"但"判定失败"，
    /// 两个维度互相独立。
    pub fn mark_completed(
        &mut self,
        success: bool,
        result: serde_json::Value,
        duration_ms: i64,
    ) -> TeletestResult<()> {
        self.guard_not_terminal()?;
        let now = Utc::now();
        self.status = ModuleRunStatus::Completed;
        self.success = success;
        self.result = Some(result);
        self.duration_ms = Some(duration_ms);
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// QUEUED/RUNNING -> FAILED（派发失败时允许从 QUEUED 直接进入）
    pub fn mark_failed(&mut self, error_message: impl Into<String>) -> TeletestResult<()> {
        self.guard_not_terminal()?;
        let now = Utc::now();
        self.status = ModuleRunStatus::Failed;
        self.success = false;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn to_view(&self) -> ModuleRunView {
        ModuleRunView {
            id: self.id.clone(),
            module_id: self.module_id.clone(),
            module_name: self.module_name.clone(),
            device_id: self.device_id.clone(),
            status: self.status.as_str().to_string(),
            success: self.success,
            error_message: self.error_message.clone(),
            parameters: self.parameters.clone(),
            result: self.result.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_ms: self.duration_ms,
            created_at: self.created_at,
        }
    }
}

/// 对外暴露的模块运行快照，时间戳序列化为 ISO-8601 或 null
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRunView {
    pub id: String,
    pub module_id: String,
    pub module_name: String,
    pub device_id: Option<String>,
    pub status: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}
