#[cfg(test)]
mod error_tests {
    use crate::*;

    #[test]
    fn test_teletest_error_display() {
        // Test InvalidModuleParams error
        let params_error = TeletestError::InvalidModuleParams("number 不能为空".to_string());
        assert_eq!(params_error.to_string(), "模块参数无效: number 不能为空");

        // Test MessageQueue error
        let mq_error = TeletestError::MessageQueue("Connection refused".to_string());
        assert_eq!(mq_error.to_string(), "消息队列错误: Connection refused");

        // Test DeviceCommand error
        let device_error = TeletestError::DeviceCommand {
            device_id: "emulator-5554".to_string(),
            message: "dial failed".to_string(),
        };
        assert_eq!(
            device_error.to_string(),
            "设备命令执行错误: emulator-5554 - dial failed"
        );

        // Test InvalidStateTransition error
        let state_error = TeletestError::InvalidStateTransition {
            run_id: "run-1".to_string(),
            status: "COMPLETED".to_string(),
        };
        assert_eq!(
            state_error.to_string(),
            "非法状态转换: 模块运行 run-1 已处于终态 COMPLETED"
        );

        // Test UnsupportedModule error
        let module_error = TeletestError::UnsupportedModule("bluetooth_test".to_string());
        assert_eq!(module_error.to_string(), "不支持的模块类型: bluetooth_test");

        // Test Configuration error
        let config_error = TeletestError::Configuration("Missing required field".to_string());
        assert_eq!(config_error.to_string(), "配置错误: Missing required field");

        // Test Internal error
        let internal_error = TeletestError::Internal("Unexpected error".to_string());
        assert_eq!(internal_error.to_string(), "内部错误: Unexpected error");
    }

    #[test]
    fn test_error_classification() {
        // 校验类错误
        assert!(TeletestError::invalid_params("calls 必须大于 0").is_validation());
        assert!(TeletestError::InvalidFlow("missing modules".to_string()).is_validation());
        assert!(!TeletestError::queue_error("down").is_validation());

        // 可重试错误
        assert!(TeletestError::queue_error("down").is_retryable());
        assert!(TeletestError::Broadcast("channel closed".to_string()).is_retryable());
        assert!(TeletestError::Timeout("dequeue".to_string()).is_retryable());
        assert!(!TeletestError::invalid_params("bad").is_retryable());
        assert!(!TeletestError::Internal("boom".to_string()).is_retryable());
    }

    #[test]
    fn test_constructor_helpers() {
        let err = TeletestError::device_error("device-1", "no signal");
        match err {
            TeletestError::DeviceCommand { device_id, message } => {
                assert_eq!(device_id, "device-1");
                assert_eq!(message, "no signal");
            }
            _ => panic!("expected DeviceCommand variant"),
        }

        let err = TeletestError::config_error("bad port");
        assert!(matches!(err, TeletestError::Configuration(_)));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: TeletestError = json_err.into();
        assert!(matches!(err, TeletestError::Serialization(_)));
    }

    #[test]
    fn test_from_anyhow_error() {
        let err: TeletestError = anyhow::anyhow!("wrapped").into();
        assert!(matches!(err, TeletestError::Internal(_)));
        assert_eq!(err.to_string(), "内部错误: wrapped");
    }
}
