//! 设备命令端口
//!
//! 设备控制协议对本系统是黑盒：这里只约定命令与结构化单步结果，
//! 传输细节、重试与退避都由具体实现负责。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use teletest_errors::TeletestResult;

/// 一次呼叫的时间窗口参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallWindow {
    /// 接通后保持通话的时长（秒）
    pub talk_window_s: u64,
    /// 等待振铃接通的超时（秒）
    pub ring_timeout_s: u64,
    /// 语音信箱检测超时（秒）
    pub voicemail_timeout_s: u64,
}

/// 单步呼叫结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStepResult {
    pub connected: bool,
    /// 实际通话时长（秒）；未接通时为 0
    pub duration_s: f64,
    #[serde(default)]
    pub detail: Option<String>,
}

/// 单条短信结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsStepResult {
    pub delivered: bool,
    #[serde(default)]
    pub detail: Option<String>,
}

/// 单项网络探测结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub success: bool,
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl ProbeResult {
    pub fn failed(detail: impl Into<String>) -> Self {
        let message: String = detail.into();
        Self {
            success: false,
            detail: serde_json::json!({ "error": message }),
        }
    }
}

/// 单次吞吐采样
///
/// success 由设备命令层给出，本系统不在其上追加判定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfSample {
    pub success: bool,
    #[serde(default)]
    pub throughput_mbps: Option<f64>,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub detail: serde_json::Value,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceCommander: Send + Sync {
    /// 拨打一次电话并等待其结束，返回单步结果
    async fn place_call(
        &self,
        device_id: &str,
        number: &str,
        window: &CallWindow,
    ) -> TeletestResult<CallStepResult>;

    /// 发送一条短信
    async fn send_sms(&self, device_id: &str, recipient: &str) -> TeletestResult<SmsStepResult>;

    /// 网络注册状态探测
    async fn check_registration(&self, device_id: &str) -> TeletestResult<ProbeResult>;

    /// 信号强度探测
    async fn check_signal(&self, device_id: &str) -> TeletestResult<ProbeResult>;

    /// IP 地址与路由探测
    async fn check_ip_route(&self, device_id: &str) -> TeletestResult<ProbeResult>;

    /// 对指定服务器跑一次限时吞吐采样
    async fn run_perf_sample(
        &self,
        device_id: &str,
        server_ip: &str,
        port: u16,
        duration_s: u64,
    ) -> TeletestResult<PerfSample>;
}

/// 仿真设备命令器
///
/// 真实的设备控制传输由外部组件接入；嵌入式部署和演示环境用这个
/// 固定应答的实现跑通整条链路。
pub struct SimulatedCommander {
    should_succeed: bool,
    latency_ms: u64,
}

impl SimulatedCommander {
    pub fn new(should_succeed: bool, latency_ms: u64) -> Self {
        Self {
            should_succeed,
            latency_ms,
        }
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

#[async_trait]
impl DeviceCommander for SimulatedCommander {
    async fn place_call(
        &self,
        _device_id: &str,
        _number: &str,
        window: &CallWindow,
    ) -> TeletestResult<CallStepResult> {
        self.simulate_latency().await;
        Ok(CallStepResult {
            connected: self.should_succeed,
            duration_s: if self.should_succeed {
                window.talk_window_s as f64
            } else {
                0.0
            },
            detail: None,
        })
    }

    async fn send_sms(&self, _device_id: &str, _recipient: &str) -> TeletestResult<SmsStepResult> {
        self.simulate_latency().await;
        Ok(SmsStepResult {
            delivered: self.should_succeed,
            detail: None,
        })
    }

    async fn check_registration(&self, _device_id: &str) -> TeletestResult<ProbeResult> {
        self.simulate_latency().await;
        Ok(ProbeResult {
            success: self.should_succeed,
            detail: serde_json::json!({ "state": if self.should_succeed { "registered" } else { "searching" } }),
        })
    }

    async fn check_signal(&self, _device_id: &str) -> TeletestResult<ProbeResult> {
        self.simulate_latency().await;
        Ok(ProbeResult {
            success: self.should_succeed,
            detail: serde_json::json!({ "rsrp": if self.should_succeed { -95 } else { -130 } }),
        })
    }

    async fn check_ip_route(&self, _device_id: &str) -> TeletestResult<ProbeResult> {
        self.simulate_latency().await;
        Ok(ProbeResult {
            success: self.should_succeed,
            detail: serde_json::json!({ "ip": "10.64.0.2" }),
        })
    }

    async fn run_perf_sample(
        &self,
        _device_id: &str,
        _server_ip: &str,
        _port: u16,
        _duration_s: u64,
    ) -> TeletestResult<PerfSample> {
        self.simulate_latency().await;
        Ok(PerfSample {
            success: self.should_succeed,
            throughput_mbps: self.should_succeed.then_some(87.5),
            latency_ms: self.should_succeed.then_some(18.0),
            detail: serde_json::Value::Null,
        })
    }
}
