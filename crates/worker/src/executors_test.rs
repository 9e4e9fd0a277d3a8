use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::json;

use teletest_errors::TeletestError;

use crate::device::{
    CallStepResult, MockDeviceCommander, PerfSample, ProbeResult, SmsStepResult,
};
use crate::executors::{
    CallTestExecutor, ExecutorRegistry, ModuleContext, ModuleExecutor, NetworkCheckExecutor,
    NetworkPerfExecutor, SmsTestExecutor,
};

fn context(parameters: serde_json::Value) -> ModuleContext {
    ModuleContext {
        run_id: "run-1".to_string(),
        execution_id: "exec-1".to_string(),
        device_id: "emulator-5554".to_string(),
        parameters,
    }
}

#[tokio::test]
async fn test_call_test_rejects_empty_number() {
    let executor = CallTestExecutor::new(Arc::new(MockDeviceCommander::new()));
    let err = executor
        .execute(&context(json!({"number": "  ", "calls": 2})))
        .await
        .unwrap_err();
    assert!(matches!(err, TeletestError::InvalidModuleParams(_)));
}

#[tokio::test]
async fn test_call_test_rejects_zero_calls() {
    let executor = CallTestExecutor::new(Arc::new(MockDeviceCommander::new()));
    let err = executor
        .execute(&context(json!({"number": "10086", "calls": 0})))
        .await
        .unwrap_err();
    assert!(matches!(err, TeletestError::InvalidModuleParams(_)));
}

#[tokio::test]
async fn test_call_test_rejects_missing_params() {
    // 缺少必填字段同样走快速失败，不触发任何设备命令
    let executor = CallTestExecutor::new(Arc::new(MockDeviceCommander::new()));
    let err = executor.execute(&context(json!({}))).await.unwrap_err();
    assert!(matches!(err, TeletestError::InvalidModuleParams(_)));
}

#[tokio::test]
async fn test_call_test_all_zero_duration_means_failure() {
    // 场景：两次呼叫时长都是 0 -> avg 0.0，successful == 0 -> 整体失败
    let mut mock = MockDeviceCommander::new();
    mock.expect_place_call().times(2).returning(|_, _, _| {
        Ok(CallStepResult {
            connected: false,
            duration_s: 0.0,
            detail: None,
        })
    });

    let executor = CallTestExecutor::new(Arc::new(mock));
    let report = executor
        .execute(&context(json!({"number": "10086", "calls": 2})))
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.result["module"], "call_test");
    assert_eq!(report.result["avg_duration"], 0.0);
    assert_eq!(report.result["successful_calls"], 0);
    assert_eq!(report.result["dropped_calls"], 2);
    assert_eq!(report.result["success_rate"], 0.0);
}

#[tokio::test]
async fn test_call_test_loose_success_and_avg_over_timed_steps() {
    // 3 次呼叫，2 次接通（10s 与 20s），1 次失败：
    // 宽松口径下整体成功，平均时长只统计非零时长的步骤
    let counter = AtomicU32::new(0);
    let mut mock = MockDeviceCommander::new();
    mock.expect_place_call().times(3).returning(move |_, _, _| {
        let i = counter.fetch_add(1, Ordering::SeqCst);
        Ok(match i {
            0 => CallStepResult {
                connected: true,
                duration_s: 10.0,
                detail: None,
            },
            1 => CallStepResult {
                connected: false,
                duration_s: 0.0,
                detail: Some("no answer".to_string()),
            },
            _ => CallStepResult {
                connected: true,
                duration_s: 20.0,
                detail: None,
            },
        })
    });

    let executor = CallTestExecutor::new(Arc::new(mock));
    let report = executor
        .execute(&context(json!({"number": "10086", "calls": 3})))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.result["successful_calls"], 2);
    assert_eq!(report.result["dropped_calls"], 1);
    assert_eq!(report.result["avg_duration"], 15.0);
    let rate = report.result["success_rate"].as_f64().unwrap();
    assert!((rate - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_call_test_device_error_folded_into_result() {
    // 设备层错误不往外抛，折叠为一次未接通
    let mut mock = MockDeviceCommander::new();
    mock.expect_place_call()
        .times(1)
        .returning(|_, _, _| Err(TeletestError::device_error("emulator-5554", "adb offline")));

    let executor = CallTestExecutor::new(Arc::new(mock));
    let report = executor
        .execute(&context(json!({"number": "10086", "calls": 1})))
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.result["successful_calls"], 0);
    let detail = report.result["steps"][0]["detail"].as_str().unwrap();
    assert!(detail.contains("adb offline"));
}

#[tokio::test]
async fn test_call_window_derivation_from_interval() {
    // talk_window 取 interval，ring_timeout = max(talk_window, 45)，voicemail 缺省 40
    let mut mock = MockDeviceCommander::new();
    mock.expect_place_call()
        .withf(|_, number, window| {
            number == "10086"
                && window.talk_window_s == 20
                && window.ring_timeout_s == 45
                && window.voicemail_timeout_s == 40
        })
        .times(1)
        .returning(|_, _, _| {
            Ok(CallStepResult {
                connected: true,
                duration_s: 20.0,
                detail: None,
            })
        });

    let executor = CallTestExecutor::new(Arc::new(mock));
    let report = executor
        .execute(&context(
            json!({"number": "10086", "calls": 1, "interval": 20}),
        ))
        .await
        .unwrap();
    assert!(report.success);
}

#[tokio::test]
async fn test_call_window_duration_beats_interval_and_overrides_apply() {
    // 显式 duration 优先于 interval；ring_timeout 取 max(60, 45) = 60；覆盖 voicemail
    let mut mock = MockDeviceCommander::new();
    mock.expect_place_call()
        .withf(|_, _, window| {
            window.talk_window_s == 60
                && window.ring_timeout_s == 60
                && window.voicemail_timeout_s == 15
        })
        .times(1)
        .returning(|_, _, _| {
            Ok(CallStepResult {
                connected: true,
                duration_s: 60.0,
                detail: None,
            })
        });

    let executor = CallTestExecutor::new(Arc::new(mock));
    executor
        .execute(&context(json!({
            "number": "10086",
            "calls": 1,
            "duration": 60,
            "interval": 20,
            "voicemail_timeout": 15
        })))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_sms_strict_success_requires_all_delivered() {
    // 场景：3 条短信送达 2 条 -> 严格口径判定失败，success_rate ≈ 0.667
    let counter = AtomicU32::new(0);
    let mut mock = MockDeviceCommander::new();
    mock.expect_send_sms().times(3).returning(move |_, _| {
        let i = counter.fetch_add(1, Ordering::SeqCst);
        Ok(SmsStepResult {
            delivered: i != 1,
            detail: None,
        })
    });

    let executor = SmsTestExecutor::new(Arc::new(mock));
    let report = executor
        .execute(&context(json!({"recipient": "+1555", "count": 3})))
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.result["module"], "sms_test");
    assert_eq!(report.result["delivered_count"], 2);
    assert_eq!(report.result["total_sms"], 3);
    let rate = report.result["success_rate"].as_f64().unwrap();
    assert!((rate - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_sms_success_when_all_delivered() {
    let mut mock = MockDeviceCommander::new();
    mock.expect_send_sms().times(2).returning(|_, _| {
        Ok(SmsStepResult {
            delivered: true,
            detail: None,
        })
    });

    let executor = SmsTestExecutor::new(Arc::new(mock));
    let report = executor
        .execute(&context(json!({"recipient": "+1555", "count": 2})))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.result["success_rate"], 1.0);
}

#[tokio::test]
async fn test_sms_rejects_empty_recipient_and_zero_count() {
    let executor = SmsTestExecutor::new(Arc::new(MockDeviceCommander::new()));
    assert!(executor
        .execute(&context(json!({"recipient": "", "count": 2})))
        .await
        .is_err());

    let executor = SmsTestExecutor::new(Arc::new(MockDeviceCommander::new()));
    assert!(executor
        .execute(&context(json!({"recipient": "+1555", "count": 0})))
        .await
        .is_err());
}

#[tokio::test]
async fn test_network_check_single_probe_failure_fails_overall() {
    // 场景：信号探测失败，注册与 IP 正常 -> 2/3 通过仍判定失败
    let mut mock = MockDeviceCommander::new();
    mock.expect_check_registration().times(1).returning(|_| {
        Ok(ProbeResult {
            success: true,
            detail: json!({"state": "registered"}),
        })
    });
    mock.expect_check_signal().times(1).returning(|_| {
        Ok(ProbeResult {
            success: false,
            detail: json!({"rsrp": -130}),
        })
    });
    mock.expect_check_ip_route().times(1).returning(|_| {
        Ok(ProbeResult {
            success: true,
            detail: json!({"ip": "10.0.0.2"}),
        })
    });

    let executor = NetworkCheckExecutor::new(Arc::new(mock));
    let report = executor.execute(&context(json!({}))).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.result["summary"]["passed"], 2);
    assert_eq!(report.result["summary"]["total"], 3);
    assert_eq!(report.result["registration"]["success"], true);
    assert_eq!(report.result["signal"]["success"], false);
    assert_eq!(report.result["ip_route"]["success"], true);
}

#[tokio::test]
async fn test_network_check_all_probes_pass() {
    let mut mock = MockDeviceCommander::new();
    mock.expect_check_registration().returning(|_| {
        Ok(ProbeResult {
            success: true,
            detail: json!({}),
        })
    });
    mock.expect_check_signal().returning(|_| {
        Ok(ProbeResult {
            success: true,
            detail: json!({}),
        })
    });
    mock.expect_check_ip_route().returning(|_| {
        Ok(ProbeResult {
            success: true,
            detail: json!({}),
        })
    });

    let executor = NetworkCheckExecutor::new(Arc::new(mock));
    let report = executor.execute(&context(json!({}))).await.unwrap();
    assert!(report.success);
}

#[tokio::test]
async fn test_network_check_probe_error_becomes_failed_probe() {
    let mut mock = MockDeviceCommander::new();
    mock.expect_check_registration()
        .returning(|_| Err(TeletestError::device_error("emulator-5554", "timeout")));
    mock.expect_check_signal().returning(|_| {
        Ok(ProbeResult {
            success: true,
            detail: json!({}),
        })
    });
    mock.expect_check_ip_route().returning(|_| {
        Ok(ProbeResult {
            success: true,
            detail: json!({}),
        })
    });

    let executor = NetworkCheckExecutor::new(Arc::new(mock));
    let report = executor.execute(&context(json!({}))).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.result["registration"]["success"], false);
    let error = report.result["registration"]["detail"]["error"]
        .as_str()
        .unwrap();
    assert!(error.contains("timeout"));
}

#[tokio::test]
async fn test_network_perf_collects_raw_samples() {
    let mut mock = MockDeviceCommander::new();
    mock.expect_run_perf_sample()
        .withf(|_, server, port, duration| server == "192.168.1.10" && *port == 5201 && *duration == 10)
        .times(2)
        .returning(|_, _, _, _| {
            Ok(PerfSample {
                success: true,
                throughput_mbps: Some(94.2),
                latency_ms: Some(12.0),
                detail: json!({}),
            })
        });

    let executor = NetworkPerfExecutor::new(Arc::new(mock));
    let report = executor
        .execute(&context(
            json!({"server_ip": "192.168.1.10", "repeats": 2}),
        ))
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.result["module"], "network_perf");
    assert_eq!(report.result["samples"].as_array().unwrap().len(), 2);
    assert_eq!(report.result["samples"][0]["throughput_mbps"], 94.2);
}

#[tokio::test]
async fn test_network_perf_validation_and_error_capture() {
    let executor = NetworkPerfExecutor::new(Arc::new(MockDeviceCommander::new()));
    assert!(executor
        .execute(&context(json!({"server_ip": "192.168.1.10", "repeats": 0})))
        .await
        .is_err());

    let mut mock = MockDeviceCommander::new();
    mock.expect_run_perf_sample()
        .times(1)
        .returning(|_, _, _, _| Err(TeletestError::device_error("emulator-5554", "iperf missing")));
    let executor = NetworkPerfExecutor::new(Arc::new(mock));
    let report = executor
        .execute(&context(
            json!({"server_ip": "192.168.1.10", "repeats": 1}),
        ))
        .await
        .unwrap();
    assert!(!report.success);
    assert_eq!(report.result["samples"][0]["success"], false);
}

#[tokio::test]
async fn test_registry_dispatch_by_module_name() {
    let registry = ExecutorRegistry::with_standard_modules(Arc::new(MockDeviceCommander::new()));
    let mut names = registry.list();
    names.sort();
    assert_eq!(
        names,
        vec!["call_test", "network_check", "network_perf", "sms_test"]
    );
    assert!(registry.get("call_test").is_some());
    assert!(registry.get("bluetooth_test").is_none());
}
