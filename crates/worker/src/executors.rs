use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use teletest_errors::{TeletestError, TeletestResult};

use crate::device::{CallStepResult, CallWindow, DeviceCommander, SmsStepResult};

/// 呼叫模块的缺省通话窗口（秒）
const DEFAULT_TALK_WINDOW_S: u64 = 30;
/// 振铃超时下限（秒）
const MIN_RING_TIMEOUT_S: u64 = 45;
/// 语音信箱检测缺省超时（秒）
const DEFAULT_VOICEMAIL_TIMEOUT_S: u64 = 40;
/// 吞吐采样缺省时长（秒）
const DEFAULT_PERF_DURATION_S: u64 = 10;
/// 吞吐采样缺省端口
const DEFAULT_PERF_PORT: u16 = 5201;

/// 模块执行上下文
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub run_id: String,
    pub execution_id: String,
    pub device_id: String,
    pub parameters: serde_json::Value,
}

/// 模块执行产出
///
/// success 是模块自身的判定；result 是带 {module, success, ...} 信封的完整指标
#[derive(Debug, Clone)]
pub struct ModuleReport {
    pub success: bool,
    pub result: serde_json::Value,
}

/// 模块执行器接口
///
/// 参数校验失败快速返回错误，由编排器转为 mark_failed；
/// 设备层面的失败一律折叠进结果，不得作为错误抛出。
#[async_trait]
pub trait ModuleExecutor: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, context: &ModuleContext) -> TeletestResult<ModuleReport>;
}

/// 执行器注册表，按模块名分发
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn ModuleExecutor>>,
}

impl ExecutorRegistry {
    /// 注册全部四个标准模块
    pub fn with_standard_modules(commander: Arc<dyn DeviceCommander>) -> Self {
        let mut registry = Self {
            executors: HashMap::new(),
        };
        registry.register(Arc::new(CallTestExecutor::new(Arc::clone(&commander))));
        registry.register(Arc::new(SmsTestExecutor::new(Arc::clone(&commander))));
        registry.register(Arc::new(NetworkCheckExecutor::new(Arc::clone(&commander))));
        registry.register(Arc::new(NetworkPerfExecutor::new(commander)));
        registry
    }

    pub fn register(&mut self, executor: Arc<dyn ModuleExecutor>) {
        info!("注册模块执行器: {}", executor.name());
        self.executors.insert(executor.name().to_string(), executor);
    }

    pub fn get(&self, module_name: &str) -> Option<Arc<dyn ModuleExecutor>> {
        self.executors.get(module_name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.executors.keys().cloned().collect()
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(
    module: &str,
    parameters: &serde_json::Value,
) -> TeletestResult<T> {
    serde_json::from_value(parameters.clone())
        .map_err(|e| TeletestError::invalid_params(format!("{module}: {e}")))
}

/// 零保护的成功率：total 为 0 时返回 0.0，绝不触发除零
fn success_rate(successful: u32, total: u32) -> f64 {
    if total > 0 {
        f64::from(successful) / f64::from(total)
    } else {
        0.0
    }
}

/// 语音呼叫测试
///
/// 顺序拨打 calls 次电话；只要有一次接通即判定成功（宽松口径，
/// 与短信模块的严格口径相反）。
pub struct CallTestExecutor {
    commander: Arc<dyn DeviceCommander>,
}

impl CallTestExecutor {
    pub fn new(commander: Arc<dyn DeviceCommander>) -> Self {
        Self { commander }
    }
}

#[async_trait]
impl ModuleExecutor for CallTestExecutor {
    fn name(&self) -> &str {
        "call_test"
    }

    async fn execute(&self, context: &ModuleContext) -> TeletestResult<ModuleReport> {
        let params: CallTestParams = parse_params(self.name(), &context.parameters)?;
        params.validate()?;
        let window = params.window();

        info!(
            "Running call_test: run_id={}, device={}, number={}, calls={}",
            context.run_id, context.device_id, params.number, params.calls
        );

        let mut steps: Vec<CallStepResult> = Vec::with_capacity(params.calls as usize);
        for attempt in 1..=params.calls {
            let step = match self
                .commander
                .place_call(&context.device_id, &params.number, &window)
                .await
            {
                Ok(step) => step,
                Err(e) => {
                    // 设备层失败折叠为一次未接通的呼叫
                    warn!(
                        "call attempt {}/{} failed on {}: {}",
                        attempt, params.calls, context.device_id, e
                    );
                    CallStepResult {
                        connected: false,
                        duration_s: 0.0,
                        detail: Some(e.to_string()),
                    }
                }
            };
            steps.push(step);
        }

        let total = params.calls;
        let successful = steps.iter().filter(|s| s.connected).count() as u32;
        let dropped = total.saturating_sub(successful);

        // 平均时长只统计上报了非零时长的呼叫
        let timed: Vec<f64> = steps
            .iter()
            .map(|s| s.duration_s)
            .filter(|d| *d > 0.0)
            .collect();
        let avg_duration = if timed.is_empty() {
            0.0
        } else {
            timed.iter().sum::<f64>() / timed.len() as f64
        };

        let success = successful > 0;
        let result = json!({
            "module": self.name(),
            "success": success,
            "total_calls": total,
            "successful_calls": successful,
            "dropped_calls": dropped,
            "avg_duration": avg_duration,
            "success_rate": success_rate(successful, total),
            "steps": steps,
        });

        Ok(ModuleReport { success, result })
    }
}

/// 短信测试
///
/// 全部送达才判定成功（严格口径）。
pub struct SmsTestExecutor {
    commander: Arc<dyn DeviceCommander>,
}

impl SmsTestExecutor {
    pub fn new(commander: Arc<dyn DeviceCommander>) -> Self {
        Self { commander }
    }
}

#[async_trait]
impl ModuleExecutor for SmsTestExecutor {
    fn name(&self) -> &str {
        "sms_test"
    }

    async fn execute(&self, context: &ModuleContext) -> TeletestResult<ModuleReport> {
        let params: SmsTestParams = parse_params(self.name(), &context.parameters)?;
        params.validate()?;

        info!(
            "Running sms_test: run_id={}, device={}, recipient={}, count={}",
            context.run_id, context.device_id, params.recipient, params.count
        );

        let mut steps: Vec<SmsStepResult> = Vec::with_capacity(params.count as usize);
        for attempt in 1..=params.count {
            let step = match self
                .commander
                .send_sms(&context.device_id, &params.recipient)
                .await
            {
                Ok(step) => step,
                Err(e) => {
                    warn!(
                        "sms attempt {}/{} failed on {}: {}",
                        attempt, params.count, context.device_id, e
                    );
                    SmsStepResult {
                        delivered: false,
                        detail: Some(e.to_string()),
                    }
                }
            };
            steps.push(step);
        }

        let total = params.count;
        let delivered = steps.iter().filter(|s| s.delivered).count() as u32;
        let success = delivered == total;

        let result = json!({
            "module": self.name(),
            "success": success,
            "total_sms": total,
            "delivered_count": delivered,
            "success_rate": success_rate(delivered, total),
            "steps": steps,
        });

        Ok(ModuleReport { success, result })
    }
}

/// 网络状态检查
///
/// 注册、信号、IP/路由三项独立探测，整体判定取三者逻辑与。
pub struct NetworkCheckExecutor {
    commander: Arc<dyn DeviceCommander>,
}

impl NetworkCheckExecutor {
    pub fn new(commander: Arc<dyn DeviceCommander>) -> Self {
        Self { commander }
    }
}

#[async_trait]
impl ModuleExecutor for NetworkCheckExecutor {
    fn name(&self) -> &str {
        "network_check"
    }

    async fn execute(&self, context: &ModuleContext) -> TeletestResult<ModuleReport> {
        info!(
            "Running network_check: run_id={}, device={}",
            context.run_id, context.device_id
        );

        let registration = self
            .commander
            .check_registration(&context.device_id)
            .await
            .unwrap_or_else(|e| crate::device::ProbeResult::failed(e.to_string()));
        let signal = self
            .commander
            .check_signal(&context.device_id)
            .await
            .unwrap_or_else(|e| crate::device::ProbeResult::failed(e.to_string()));
        let ip_route = self
            .commander
            .check_ip_route(&context.device_id)
            .await
            .unwrap_or_else(|e| crate::device::ProbeResult::failed(e.to_string()));

        let probes = [&registration, &signal, &ip_route];
        let passed = probes.iter().filter(|p| p.success).count();
        // 三项探测独立执行，整体成功要求全部通过
        let success = passed == probes.len();

        let result = json!({
            "module": self.name(),
            "success": success,
            "device_id": context.device_id,
            "summary": { "passed": passed, "total": probes.len() },
            "registration": registration,
            "signal": signal,
            "ip_route": ip_route,
        });

        Ok(ModuleReport { success, result })
    }
}

/// 网络吞吐测试
///
/// 连续跑 repeats 次限时采样，只汇总原始指标，不在设备层判定之上
/// 追加自己的成败口径。
pub struct NetworkPerfExecutor {
    commander: Arc<dyn DeviceCommander>,
}

impl NetworkPerfExecutor {
    pub fn new(commander: Arc<dyn DeviceCommander>) -> Self {
        Self { commander }
    }
}

#[async_trait]
impl ModuleExecutor for NetworkPerfExecutor {
    fn name(&self) -> &str {
        "network_perf"
    }

    async fn execute(&self, context: &ModuleContext) -> TeletestResult<ModuleReport> {
        let params: NetworkPerfParams = parse_params(self.name(), &context.parameters)?;
        params.validate()?;

        info!(
            "Running network_perf: run_id={}, device={}, server={}:{}, repeats={}",
            context.run_id, context.device_id, params.server_ip, params.port, params.repeats
        );

        let mut samples = Vec::with_capacity(params.repeats as usize);
        for attempt in 1..=params.repeats {
            let sample = match self
                .commander
                .run_perf_sample(
                    &context.device_id,
                    &params.server_ip,
                    params.port,
                    params.duration_s,
                )
                .await
            {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(
                        "perf sample {}/{} failed on {}: {}",
                        attempt, params.repeats, context.device_id, e
                    );
                    crate::device::PerfSample {
                        success: false,
                        throughput_mbps: None,
                        latency_ms: None,
                        detail: json!({ "error": e.to_string() }),
                    }
                }
            };
            samples.push(sample);
        }

        let success = samples.iter().all(|s| s.success);
        let result = json!({
            "module": self.name(),
            "success": success,
            "server_ip": params.server_ip,
            "port": params.port,
            "duration_s": params.duration_s,
            "repeats": params.repeats,
            "samples": samples,
        });

        Ok(ModuleReport { success, result })
    }
}

/// 呼叫测试参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTestParams {
    /// 被叫号码
    pub number: String,
    /// 拨打次数
    pub calls: u32,
    /// 通话时长（秒），优先于 interval
    pub duration: Option<u64>,
    /// 呼叫间隔（秒），duration 缺省时作为通话窗口
    pub interval: Option<u64>,
    /// 振铃超时覆盖（秒）
    pub ring_timeout: Option<u64>,
    /// 语音信箱超时覆盖（秒）
    pub voicemail_timeout: Option<u64>,
}

impl CallTestParams {
    fn validate(&self) -> TeletestResult<()> {
        if self.number.trim().is_empty() {
            return Err(TeletestError::invalid_params("call_test: number 不能为空"));
        }
        if self.calls == 0 {
            return Err(TeletestError::invalid_params("call_test: calls 必须大于 0"));
        }
        Ok(())
    }

    fn window(&self) -> CallWindow {
        let talk_window_s = self
            .duration
            .or(self.interval)
            .unwrap_or(DEFAULT_TALK_WINDOW_S);
        CallWindow {
            talk_window_s,
            ring_timeout_s: self
                .ring_timeout
                .unwrap_or_else(|| talk_window_s.max(MIN_RING_TIMEOUT_S)),
            voicemail_timeout_s: self.voicemail_timeout.unwrap_or(DEFAULT_VOICEMAIL_TIMEOUT_S),
        }
    }
}

/// 短信测试参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsTestParams {
    /// 收件号码
    pub recipient: String,
    /// 发送条数
    pub count: u32,
}

impl SmsTestParams {
    fn validate(&self) -> TeletestResult<()> {
        if self.recipient.trim().is_empty() {
            return Err(TeletestError::invalid_params("sms_test: recipient 不能为空"));
        }
        if self.count == 0 {
            return Err(TeletestError::invalid_params("sms_test: count 必须大于 0"));
        }
        Ok(())
    }
}

/// 吞吐测试参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkPerfParams {
    /// 对端测速服务器地址
    pub server_ip: String,
    #[serde(default = "NetworkPerfParams::default_port")]
    pub port: u16,
    #[serde(default = "NetworkPerfParams::default_duration")]
    pub duration_s: u64,
    /// 采样次数
    pub repeats: u32,
}

impl NetworkPerfParams {
    fn default_port() -> u16 {
        DEFAULT_PERF_PORT
    }
    fn default_duration() -> u64 {
        DEFAULT_PERF_DURATION_S
    }

    fn validate(&self) -> TeletestResult<()> {
        if self.server_ip.trim().is_empty() {
            return Err(TeletestError::invalid_params(
                "network_perf: server_ip 不能为空",
            ));
        }
        if self.repeats == 0 {
            return Err(TeletestError::invalid_params(
                "network_perf: repeats 必须大于 0",
            ));
        }
        Ok(())
    }
}
