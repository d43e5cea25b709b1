//! 环境变量配置加载测试
//!
//! 进程环境变量是全局状态，所有场景放在同一个测试函数中顺序执行，
//! 且本文件不包含其他测试。

use std::env;

use order_shared::config::AppConfig;

const MANAGED_VARS: &[&str] = &[
    "KAFKA_BROKERS",
    "KAFKA_TOPIC",
    "DLQ_TOPIC",
    "WORKER_GROUP",
    "REDIS_ADDR",
    "ORDER_SERVICE_ADDR",
    "CACHE_SERVICE_ADDR",
    "ORDER__KAFKA__ORDER_TOPIC",
    "ORDER__WORKER__MAX_RETRIES",
    "ORDER_ENV",
    "CONFIG_DIR",
];

fn reset_env() {
    let empty_dir = env::temp_dir().join("order-pipeline-config-test-missing");
    unsafe {
        for var in MANAGED_VARS {
            env::remove_var(var);
        }
        // 指向不存在的目录，所有配置文件都是可选的
        env::set_var("CONFIG_DIR", empty_dir);
    }
}

fn set_flat_vars() {
    unsafe {
        env::set_var("KAFKA_BROKERS", "kafka-1:9092, kafka-2:9092");
        env::set_var("KAFKA_TOPIC", "orders-env");
        env::set_var("DLQ_TOPIC", "orders-env-dlq");
        env::set_var("WORKER_GROUP", "worker-env");
        env::set_var("REDIS_ADDR", "redis-env:6379");
    }
}

#[test]
fn test_load_from_environment() {
    // 扁平变量提供全部必需项
    reset_env();
    set_flat_vars();
    unsafe {
        env::set_var("ORDER_SERVICE_ADDR", "127.0.0.1:6051");
    }

    let config = AppConfig::load("order-worker").expect("扁平环境变量应足以加载配置");
    assert_eq!(config.service_name, "order-worker");
    assert_eq!(config.kafka.broker_list(), vec!["kafka-1:9092", "kafka-2:9092"]);
    assert_eq!(config.kafka.order_topic, "orders-env");
    assert_eq!(config.kafka.dead_letter_topic, "orders-env-dlq");
    assert_eq!(config.kafka.consumer_group, "worker-env");
    assert_eq!(config.redis.addr, "redis-env:6379");
    assert_eq!(config.service.order_socket_addr().unwrap().port(), 6051);
    assert_eq!(config.service.cache_addr, "0.0.0.0:50052");
    assert_eq!(config.worker.max_retries, 3);

    // 扁平变量优先于 ORDER__ 前缀变量
    unsafe {
        env::set_var("ORDER__KAFKA__ORDER_TOPIC", "orders-prefixed");
        env::set_var("ORDER__WORKER__MAX_RETRIES", "5");
    }
    let config = AppConfig::load("order-worker").unwrap();
    assert_eq!(config.kafka.order_topic, "orders-env");
    assert_eq!(config.worker.max_retries, 5);

    // 空的扁平变量视为未设置，回落到前缀变量
    unsafe {
        env::set_var("KAFKA_TOPIC", "");
    }
    let config = AppConfig::load("order-worker").unwrap();
    assert_eq!(config.kafka.order_topic, "orders-prefixed");

    // 缺少死信 topic 时加载失败
    reset_env();
    set_flat_vars();
    unsafe {
        env::remove_var("DLQ_TOPIC");
    }
    let err = AppConfig::load("order-worker").unwrap_err();
    assert_eq!(err.code(), "CONFIG_ERROR");

    // 空白的必需值同样失败
    unsafe {
        env::set_var("DLQ_TOPIC", "orders-env-dlq");
        env::set_var("ORDER__REDIS__ADDR", "  ");
        env::remove_var("REDIS_ADDR");
    }
    let err = AppConfig::load("order-worker").unwrap_err();
    assert!(err.to_string().contains("redis.addr"));

    unsafe {
        env::remove_var("ORDER__REDIS__ADDR");
    }
    reset_env();
}
