use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use teletest_api::{create_routes, AppState, ConnectionManager};
use teletest_domain::{ModuleRunRepository, StatusPublisher, TaskQueue};
use teletest_infrastructure::{InMemoryModuleRunRepository, InMemoryTaskQueue, RedisTaskQueue};
use teletest_worker::{
    DeviceCommander, ExecutorRegistry, ModuleRunTracker, SimulatedCommander, WorkerService,
};

use crate::config::{AppConfig, MessageQueueType};

/// 应用实例
///
/// 所有共享组件在这里构造一次，显式传给 API 层和 Worker 池，
/// 不存在进程级的隐式全局状态。
pub struct Application {
    config: AppConfig,
    state: AppState,
    worker_service: Arc<WorkerService>,
    /// 应用内部的关闭广播，Worker 池和 HTTP 服务都订阅它
    shutdown_tx: broadcast::Sender<()>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let metrics_handle = PrometheusBuilder::new()
            .install_recorder()
            .context("安装 Prometheus 指标导出器失败")?;

        let task_queue: Arc<dyn TaskQueue> = match config.message_queue.r#type {
            MessageQueueType::InMemory => {
                info!("Using in-memory task queue");
                Arc::new(InMemoryTaskQueue::new())
            }
            MessageQueueType::Redis => {
                info!("Using redis task queue at {}", config.message_queue.url);
                Arc::new(
                    RedisTaskQueue::connect(
                        &config.message_queue.url,
                        config.message_queue.task_queue.clone(),
                    )
                    .await
                    .context("连接 Redis 任务队列失败")?,
                )
            }
        };

        let module_runs: Arc<dyn ModuleRunRepository> =
            Arc::new(InMemoryModuleRunRepository::new());
        let connections = Arc::new(ConnectionManager::new());

        // 真实设备传输由外部接入；这里按配置挂仿真命令器
        let commander: Arc<dyn DeviceCommander> = Arc::new(SimulatedCommander::new(
            config.device.simulated_should_succeed,
            config.device.simulated_latency_ms,
        ));
        let registry = Arc::new(ExecutorRegistry::with_standard_modules(commander));
        let tracker = Arc::new(ModuleRunTracker::new(
            Arc::clone(&module_runs),
            Arc::clone(&connections) as Arc<dyn StatusPublisher>,
        ));
        let worker_service = Arc::new(
            WorkerService::builder(Arc::clone(&task_queue), registry, tracker)
                .worker_count(config.worker.worker_count)
                .poll_timeout(Duration::from_secs(config.worker.poll_timeout_seconds))
                .build(),
        );

        let state = AppState {
            connections,
            task_queue,
            module_runs,
            metrics: metrics_handle,
        };

        let (shutdown_tx, _) = broadcast::channel(16);
        Ok(Self {
            config,
            state,
            worker_service,
            shutdown_tx,
        })
    }

    /// 运行应用直到外部关闭信号到来
    pub async fn run(&self, mut external_shutdown: broadcast::Receiver<()>) -> Result<()> {
        let worker_handles = Arc::clone(&self.worker_service).start(&self.shutdown_tx);

        let router = create_routes(self.state.clone());
        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("监听 {} 失败", self.config.api.bind_address))?;
        info!("API server listening on {}", self.config.api.bind_address);

        let mut server_shutdown = self.shutdown_tx.subscribe();
        let server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.recv().await;
                })
                .await
        });

        // 等外部关闭信号，再向内部组件转发
        let _ = external_shutdown.recv().await;
        info!("开始关闭应用组件");
        let _ = self.shutdown_tx.send(());

        for handle in worker_handles {
            if let Err(e) = handle.await {
                warn!("Worker task ended abnormally: {}", e);
            }
        }
        match server.await {
            Ok(result) => result.context("HTTP 服务异常退出")?,
            Err(e) => warn!("HTTP server task ended abnormally: {}", e),
        }

        info!("应用已停止");
        Ok(())
    }
}
