use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use teletest_domain::{ExecutionTask, FlowData, ModuleRequest, ModuleRun, TaskQueue};

use crate::executors::{ExecutorRegistry, ModuleContext};
use crate::tracker::ModuleRunTracker;

/// Worker服务
///
/// 固定大小的 Worker 池，每个 Worker 循环执行
/// "出队 -> 把一个执行流里的模块逐个跑完 -> 继续出队"。
/// 单个 Worker 串行执行模块，不同 Worker 并行处理不同任务；
/// 队列不提供设备级互斥，同一设备的命令串行化由设备命令层负责。
pub struct WorkerService {
    worker_count: usize,
    poll_timeout: Duration,
    task_queue: Arc<dyn TaskQueue>,
    registry: Arc<ExecutorRegistry>,
    tracker: Arc<ModuleRunTracker>,
}

/// Worker服务构建器
pub struct WorkerServiceBuilder {
    worker_count: usize,
    poll_timeout: Duration,
    task_queue: Arc<dyn TaskQueue>,
    registry: Arc<ExecutorRegistry>,
    tracker: Arc<ModuleRunTracker>,
}

impl WorkerServiceBuilder {
    pub fn new(
        task_queue: Arc<dyn TaskQueue>,
        registry: Arc<ExecutorRegistry>,
        tracker: Arc<ModuleRunTracker>,
    ) -> Self {
        Self {
            worker_count: 2,
            poll_timeout: Duration::from_secs(1),
            task_queue,
            registry,
            tracker,
        }
    }

    /// 设置Worker数量
    pub fn worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    /// 设置出队轮询超时
    ///
    /// 有限超时让 Worker 有机会响应关闭信号；零值会无限阻塞在队列上。
    pub fn poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn build(self) -> WorkerService {
        WorkerService {
            worker_count: self.worker_count,
            poll_timeout: self.poll_timeout,
            task_queue: self.task_queue,
            registry: self.registry,
            tracker: self.tracker,
        }
    }
}

impl WorkerService {
    pub fn builder(
        task_queue: Arc<dyn TaskQueue>,
        registry: Arc<ExecutorRegistry>,
        tracker: Arc<ModuleRunTracker>,
    ) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(task_queue, registry, tracker)
    }

    /// 启动 Worker 池，返回各 Worker 的句柄
    pub fn start(self: Arc<Self>, shutdown_tx: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        info!("Starting worker pool with {} workers", self.worker_count);
        (0..self.worker_count)
            .map(|index| {
                let service = Arc::clone(&self);
                let mut shutdown_rx = shutdown_tx.subscribe();
                let worker_id = format!("worker-{index}");
                tokio::spawn(async move {
                    info!("{} started", worker_id);
                    loop {
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                info!("{} received shutdown signal", worker_id);
                                break;
                            }
                            task = service.task_queue.dequeue(service.poll_timeout) => {
                                if let Some(task) = task {
                                    service.process_task(&worker_id, task).await;
                                }
                            }
                        }
                    }
                    info!("{} stopped", worker_id);
                })
            })
            .collect()
    }

    /// 处理一个执行任务：解析执行流，逐个模块跑到底
    ///
    /// 执行器抛出的任何错误都在这里收口为 mark_failed，绝不穿透 Worker 循环。
    pub async fn process_task(&self, worker_id: &str, task: ExecutionTask) {
        info!(
            "{} picked up execution {} (task {})",
            worker_id, task.execution_id, task.id
        );
        counter!("teletest_worker_tasks_total").increment(1);

        let flow = match FlowData::parse(&task.flow_data) {
            Ok(flow) => flow,
            Err(e) => {
                // 没有可失败的模块记录，只能记日志丢弃
                error!(
                    "Execution {} carries unparseable flow_data, dropping: {}",
                    task.execution_id, e
                );
                counter!("teletest_worker_bad_flows_total").increment(1);
                return;
            }
        };

        if flow.modules.is_empty() {
            debug!("Execution {} has no modules, nothing to run", task.execution_id);
            return;
        }

        for request in &flow.modules {
            self.run_module(&task.execution_id, request).await;
        }
    }

    async fn run_module(&self, execution_id: &str, request: &ModuleRequest) {
        let mut run = ModuleRun::new(execution_id, request);
        if let Err(e) = self.tracker.create(&run).await {
            warn!("Failed to record module run {}: {}", run.id, e);
        }

        // 派发前的两道检查：设备存在、模块已注册；失败直接 QUEUED -> FAILED
        let device_id = match &run.device_id {
            Some(device_id) => device_id.clone(),
            None => {
                let msg = format!("模块 {} 缺少 device_id", run.module_name);
                self.fail_run(&mut run, msg).await;
                return;
            }
        };
        let executor = match self.registry.get(&run.module_name) {
            Some(executor) => executor,
            None => {
                let msg = format!("不支持的模块类型: {}", run.module_name);
                self.fail_run(&mut run, msg).await;
                return;
            }
        };

        if let Err(e) = self.tracker.mark_running(&mut run).await {
            error!("Failed to mark run {} running: {}", run.id, e);
            return;
        }

        let context = ModuleContext {
            run_id: run.id.clone(),
            execution_id: execution_id.to_string(),
            device_id,
            parameters: run.parameters.clone(),
        };

        let started = Instant::now();
        match executor.execute(&context).await {
            Ok(report) => {
                let duration_ms = started.elapsed().as_millis() as i64;
                info!(
                    "Module run {} completed: module={}, success={}, duration={}ms",
                    run.id, run.module_name, report.success, duration_ms
                );
                counter!("teletest_worker_runs_completed_total").increment(1);
                if let Err(e) = self
                    .tracker
                    .mark_completed(&mut run, report.success, report.result, duration_ms)
                    .await
                {
                    error!("Failed to complete run {}: {}", run.id, e);
                }
            }
            Err(e) => {
                warn!(
                    "Module run {} failed: module={}, error={}",
                    run.id, run.module_name, e
                );
                counter!("teletest_worker_runs_failed_total").increment(1);
                self.fail_run(&mut run, e.to_string()).await;
            }
        }
    }

    async fn fail_run(&self, run: &mut ModuleRun, message: String) {
        if let Err(e) = self.tracker.mark_failed(run, message).await {
            error!("Failed to mark run {} failed: {}", run.id, e);
        }
    }
}
