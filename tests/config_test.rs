//! 内核配置集成测试
//!
//! 测试配置文件加载、校验以及配置驱动的内核构建

use chips_kernel::{
    ChipsKernel, CoreError, KernelConfig, LoggerConfig, RotationStrategy, StaticModuleLibrary,
};
use tempfile::TempDir;

/// 测试完整的 YAML 配置加载
#[tokio::test]
async fn test_load_yaml_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("kernel.yaml");
    tokio::fs::write(
        &path,
        r#"
module_dirs:
  - ./modules
  - /opt/chips/modules
max_aux_threads: 16
max_connections: 512
cpu_cores: 8
logging:
  level: debug
  json_format: true
  rotation: hourly
"#,
    )
    .await
    .unwrap();

    let config = KernelConfig::from_file(&path).await.unwrap();

    assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(config.module_dirs.len(), 2);
    assert_eq!(config.max_aux_threads, 16);
    assert_eq!(config.max_connections, Some(512));
    assert_eq!(config.cpu_cores, Some(8));
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json_format);
    assert!(config.validate().is_ok());

    let logger = LoggerConfig::from_log_config(&config.logging);
    assert_eq!(logger.rotation, RotationStrategy::Hourly);
    assert!(logger.json_format);
    assert!(logger.file_output.is_none());
}

/// 测试 JSON 配置按扩展名识别
#[tokio::test]
async fn test_load_json_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("kernel.json");
    tokio::fs::write(
        &path,
        r#"{"max_aux_threads": 4, "logging": {"level": "warn", "file_output": true, "log_dir": "/var/log/chips"}}"#,
    )
    .await
    .unwrap();

    let config = KernelConfig::from_file(&path).await.unwrap();

    assert_eq!(config.max_aux_threads, 4);
    assert!(config.module_dirs.is_empty());
    assert!(config.max_connections.is_none());
    assert!(config.validate().is_ok());

    let logger = LoggerConfig::from_log_config(&config.logging);
    assert_eq!(logger.level, "warn");
    assert_eq!(
        logger.file_output.as_deref(),
        Some(std::path::Path::new("/var/log/chips"))
    );
}

/// 测试空文件使用默认值
#[tokio::test]
async fn test_empty_mapping_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("kernel.yaml");
    tokio::fs::write(&path, "{}\n").await.unwrap();

    let config = KernelConfig::from_file(&path).await.unwrap();
    let defaults = KernelConfig::default();

    assert_eq!(config.max_aux_threads, defaults.max_aux_threads);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.rotation, "daily");
}

/// 测试缺失文件和格式错误
#[tokio::test]
async fn test_load_errors() {
    let temp_dir = TempDir::new().unwrap();

    let err = KernelConfig::from_file(temp_dir.path().join("absent.yaml"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ConfigLoadFailed(_)));

    let bad_yaml = temp_dir.path().join("bad.yaml");
    tokio::fs::write(&bad_yaml, "max_aux_threads: [unclosed\n")
        .await
        .unwrap();
    let err = KernelConfig::from_file(&bad_yaml).await.unwrap_err();
    assert!(matches!(err, CoreError::Yaml(_)));

    let bad_json = temp_dir.path().join("bad.json");
    tokio::fs::write(&bad_json, "{\"max_aux_threads\": \"many\"}")
        .await
        .unwrap();
    let err = KernelConfig::from_file(&bad_json).await.unwrap_err();
    assert!(matches!(err, CoreError::Json(_)));
}

/// 测试校验一次报告全部问题
#[tokio::test]
async fn test_validation_reports_every_problem() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("kernel.yaml");
    tokio::fs::write(
        &path,
        r#"
max_aux_threads: 0
cpu_cores: 0
logging:
  level: loud
  file_output: true
"#,
    )
    .await
    .unwrap();

    let config = KernelConfig::from_file(&path).await.unwrap();
    match config.validate().unwrap_err() {
        CoreError::InvalidConfigValue { key, reason } => {
            for field in ["max_aux_threads", "cpu_cores", "logging.level", "logging.log_dir"] {
                assert!(key.contains(field), "缺少 {field}: {key}");
            }
            assert!(reason.contains("loud"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let err = ChipsKernel::with_config(&config, Box::new(StaticModuleLibrary::new()))
        .err()
        .unwrap();
    assert!(matches!(err, CoreError::InvalidConfigValue { .. }));
}

/// 测试配置驱动内核的线程预算和模块目录
#[tokio::test]
async fn test_kernel_built_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let module_dir = temp_dir.path().join("modules");
    tokio::fs::create_dir(&module_dir).await.unwrap();

    let path = temp_dir.path().join("kernel.yaml");
    tokio::fs::write(
        &path,
        format!(
            "module_dirs:\n  - {}\nmax_aux_threads: 6\ncpu_cores: 2\n",
            module_dir.display()
        ),
    )
    .await
    .unwrap();

    let config = KernelConfig::from_file(&path).await.unwrap();
    let kernel = ChipsKernel::with_config(&config, Box::new(StaticModuleLibrary::new())).unwrap();

    let budget = kernel.thread_budget().await;
    assert_eq!(budget.min_required_threads, 0);
    assert_eq!(budget.total_pool_size, 6);

    // 空的模块目录在启动时加载，不激活任何模块
    kernel.start().await.unwrap();
    assert!(kernel.active_modules().await.is_empty());
    assert!(kernel.stop().await.is_clean());
}
