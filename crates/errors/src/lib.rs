use thiserror::Error;

#[derive(Debug, Error)]
pub enum TeletestError {
    #[error("模块参数无效: {0}")]
    InvalidModuleParams(String),
    #[error("消息队列错误: {0}")]
    MessageQueue(String),
    #[error("设备命令执行错误: {device_id} - {message}")]
    DeviceCommand { device_id: String, message: String },
    #[error("非法状态转换: 模块运行 {run_id} 已处于终态 {status}")]
    InvalidStateTransition { run_id: String, status: String },
    #[error("执行流解析失败: {0}")]
    InvalidFlow(String),
    #[error("模块运行记录未找到: {id}")]
    ModuleRunNotFound { id: String },
    #[error("不支持的模块类型: {0}")]
    UnsupportedModule(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("广播通道错误: {0}")]
    Broadcast(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type TeletestResult<T> = Result<T, TeletestError>;

impl TeletestError {
    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidModuleParams(msg.into())
    }
    pub fn queue_error<S: Into<String>>(msg: S) -> Self {
        Self::MessageQueue(msg.into())
    }
    pub fn device_error<D: Into<String>, S: Into<String>>(device_id: D, msg: S) -> Self {
        Self::DeviceCommand {
            device_id: device_id.into(),
            message: msg.into(),
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    /// 校验类错误在下发前抛出，调用方直接拒绝请求，不进入队列
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TeletestError::InvalidModuleParams(_) | TeletestError::InvalidFlow(_)
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TeletestError::MessageQueue(_)
                | TeletestError::Broadcast(_)
                | TeletestError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for TeletestError {
    fn from(err: serde_json::Error) -> Self {
        TeletestError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for TeletestError {
    fn from(err: redis::RedisError) -> Self {
        TeletestError::MessageQueue(err.to_string())
    }
}

impl From<anyhow::Error> for TeletestError {
    fn from(err: anyhow::Error) -> Self {
        TeletestError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests;
