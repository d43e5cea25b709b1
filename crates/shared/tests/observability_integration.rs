//! 可观测性模块集成测试
//!
//! 测试指标记录与统一初始化入口。

// ============================================================================
// 指标记录测试
// ============================================================================

mod metrics_tests {
    use order_shared::observability::metrics::{
        record_fetch_error, record_message_outcome, record_side_effect_error,
    };

    #[test]
    fn test_record_message_outcome() {
        // 未安装 recorder 时记录指标不应 panic
        record_message_outcome("cached", 0.3);
        record_message_outcome("requeued", 0.31);
        record_message_outcome("dead_lettered", 0.001);
    }

    #[test]
    fn test_record_errors() {
        record_fetch_error();
        record_side_effect_error("store");
        record_side_effect_error("requeue");
        record_side_effect_error("dead_letter");
        record_side_effect_error("commit");
    }

    #[test]
    fn test_metrics_with_edge_cases() {
        record_message_outcome("", 0.0);
        record_message_outcome("cached", 999.99);
        record_message_outcome("cached", 0.000001);
    }
}

// ============================================================================
// 初始化测试
// ============================================================================

mod init_tests {
    use order_shared::config::ObservabilityConfig;
    use order_shared::observability::{self, ObservabilityGuard};

    #[tokio::test]
    async fn test_init_without_metrics_and_reinit_fails() {
        let config = ObservabilityConfig {
            log_level: "debug".to_string(),
            log_format: "json".to_string(),
            metrics_enabled: false,
            ..Default::default()
        };

        let guard = observability::init("order-worker-test", &config).await;
        assert!(guard.is_ok());

        // 全局 subscriber 只能设置一次
        let again = observability::init("order-worker-test", &config).await;
        assert!(again.is_err());
    }

    #[test]
    fn test_empty_guard_drop() {
        let guard = ObservabilityGuard::empty();
        drop(guard);
    }
}
