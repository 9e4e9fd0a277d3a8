use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

/// 应用配置
///
/// 加载顺序：内置默认值 -> TOML 配置文件 -> TELETEST__ 前缀的环境变量，
/// 后者覆盖前者。加载完成后统一做一次校验。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub message_queue: MessageQueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageQueueType {
    Redis,
    InMemory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQueueConfig {
    pub r#type: MessageQueueType,
    pub url: String,
    pub task_queue: String,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            r#type: MessageQueueType::InMemory,
            url: "redis://127.0.0.1:6379".to_string(),
            task_queue: "teletest:executions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub worker_count: usize,
    /// 出队轮询超时（秒）；0 表示无限阻塞，Worker 将无法及时响应关闭
    pub poll_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            poll_timeout_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// 仿真命令器是否固定成功
    pub simulated_should_succeed: bool,
    /// 仿真命令器的单步延迟（毫秒）
    pub simulated_latency_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            simulated_should_succeed: true,
            simulated_latency_ms: 0,
        }
    }
}

impl AppConfig {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default()).context("内置默认配置非法")?);
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        builder = builder.add_source(Environment::with_prefix("TELETEST").separator("__"));

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("解析配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.bind_address.trim().is_empty() {
            anyhow::bail!("api.bind_address 不能为空");
        }
        if self.worker.worker_count == 0 {
            anyhow::bail!("worker.worker_count 必须大于 0");
        }
        if self.message_queue.task_queue.trim().is_empty() {
            anyhow::bail!("message_queue.task_queue 不能为空");
        }
        if self.message_queue.r#type == MessageQueueType::Redis
            && self.message_queue.url.trim().is_empty()
        {
            anyhow::bail!("message_queue.url 不能为空");
        }
        Ok(())
    }
}
