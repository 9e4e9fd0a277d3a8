pub mod device;
pub mod executors;
pub mod service;
pub mod tracker;

#[cfg(test)]
mod executors_test;

pub use device::{
    CallStepResult, CallWindow, DeviceCommander, PerfSample, ProbeResult, SimulatedCommander,
    SmsStepResult,
};
pub use executors::{
    CallTestExecutor, ExecutorRegistry, ModuleContext, ModuleExecutor, ModuleReport,
    NetworkCheckExecutor, NetworkPerfExecutor, SmsTestExecutor,
};
pub use service::{WorkerService, WorkerServiceBuilder};
pub use tracker::ModuleRunTracker;
