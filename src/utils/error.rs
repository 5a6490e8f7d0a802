//! 薯片微内核错误类型定义
//!
//! 本模块定义了内核中使用的所有错误类型。校验和依赖解析错误会一次性收集全部问题，
//! 调用方可以据此一次修正所有输入。

use thiserror::Error;

use crate::core::state::KernelState;
use crate::module::dependency::UnmetDependency;
use crate::module::metadata::ModuleDescriptor;
use crate::module::validator::DescriptorFailure;
use crate::subsystem::SubsystemKind;

/// 薯片内核核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 模块描述与依赖错误 ====================

    /// 模块描述无效（收集整批模块的全部结构问题）
    #[error("模块描述无效: {}", format_descriptor_failures(.failures))]
    InvalidDescriptor {
        /// 每个模块的校验失败详情
        failures: Vec<DescriptorFailure>,
    },

    /// 存在未满足的依赖
    #[error("存在未满足的依赖: {}", format_unmet(.modules))]
    UnmetDependencies {
        /// 每个无法放置的模块及其未满足的依赖项
        modules: Vec<UnmetDependency>,
    },

    /// 模块初始化失败
    #[error("模块初始化失败: '{}' v{} - {source}", .descriptor.name, .descriptor.version)]
    ModuleInitFailed {
        /// 失败模块的描述
        descriptor: ModuleDescriptor,
        /// 模块返回的错误
        #[source]
        source: Box<CoreError>,
    },

    // ==================== 模块管理错误 ====================

    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    /// 模块已加载
    #[error("模块已加载: '{0}'")]
    ModuleAlreadyLoaded(String),

    /// 模块加载失败
    #[error("模块加载失败: '{module_id}' - {reason}")]
    ModuleLoadFailed {
        /// 模块标识（名称或代码单元路径）
        module_id: String,
        /// 失败原因
        reason: String,
    },

    // ==================== 内核与子系统错误 ====================

    /// 子系统启动失败
    #[error("子系统启动失败: {subsystem} - {reason}")]
    SubsystemStartFailed {
        /// 失败的子系统
        subsystem: SubsystemKind,
        /// 失败原因
        reason: String,
    },

    /// 当前内核状态不允许该操作
    #[error("内核状态 {state} 下不允许执行 '{operation}'")]
    InvalidState {
        /// 被拒绝的操作
        operation: &'static str,
        /// 当前状态
        state: KernelState,
    },

    /// 任务引擎未运行
    #[error("任务引擎未运行")]
    EngineNotRunning,

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        /// 配置键
        key: String,
        /// 失败原因
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// 内核操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

fn format_descriptor_failures(failures: &[DescriptorFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_unmet(modules: &[UnmetDependency]) -> String {
    modules
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    pub const MODULE_NOT_FOUND: &str = "MODULE-001";
    pub const MODULE_INIT_FAILED: &str = "MODULE-002";
    pub const MODULE_LOAD_FAILED: &str = "MODULE-003";
    pub const MODULE_ALREADY_LOADED: &str = "MODULE-004";
    pub const MODULE_INVALID_DESCRIPTOR: &str = "MODULE-005";
    pub const MODULE_UNMET_DEPENDENCIES: &str = "MODULE-006";

    // 内核错误 (KERNEL-xxx)
    pub const KERNEL_SUBSYSTEM_START_FAILED: &str = "KERNEL-001";
    pub const KERNEL_INVALID_STATE: &str = "KERNEL-002";
    pub const KERNEL_ENGINE_NOT_RUNNING: &str = "KERNEL-003";
    pub const KERNEL_INIT_FAILED: &str = "KERNEL-004";
    pub const KERNEL_INTERNAL: &str = "KERNEL-005";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";

    // IO 与序列化错误 (IO-xxx)
    pub const IO_ERROR: &str = "IO-001";
    pub const SERIALIZATION_ERROR: &str = "IO-002";

    pub const UNKNOWN: &str = "UNKNOWN";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidDescriptor { .. } => error_code::MODULE_INVALID_DESCRIPTOR,
            CoreError::UnmetDependencies { .. } => error_code::MODULE_UNMET_DEPENDENCIES,
            CoreError::ModuleInitFailed { .. } => error_code::MODULE_INIT_FAILED,
            CoreError::ModuleNotFound(_) => error_code::MODULE_NOT_FOUND,
            CoreError::ModuleAlreadyLoaded(_) => error_code::MODULE_ALREADY_LOADED,
            CoreError::ModuleLoadFailed { .. } => error_code::MODULE_LOAD_FAILED,
            CoreError::SubsystemStartFailed { .. } => error_code::KERNEL_SUBSYSTEM_START_FAILED,
            CoreError::InvalidState { .. } => error_code::KERNEL_INVALID_STATE,
            CoreError::EngineNotRunning => error_code::KERNEL_ENGINE_NOT_RUNNING,
            CoreError::InitFailed(_) => error_code::KERNEL_INIT_FAILED,
            CoreError::Internal(_) => error_code::KERNEL_INTERNAL,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::Io(_) => error_code::IO_ERROR,
            CoreError::Json(_) | CoreError::Yaml(_) => error_code::SERIALIZATION_ERROR,
            CoreError::Other(_) => error_code::UNKNOWN,
        }
    }

    /// 是否为加载前即可发现的输入错误（描述无效或依赖未满足）
    ///
    /// 这类错误在任何副作用发生前被检测出来，修正输入后可直接重试。
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidDescriptor { .. } | CoreError::UnmetDependencies { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::DependencySpec;
    use crate::module::validator::{ValidationError, ValidationErrorCode};

    #[test]
    fn test_error_display() {
        let err = CoreError::ModuleNotFound("logger".to_string());
        assert_eq!(err.to_string(), "模块未找到: 'logger'");

        let err = CoreError::InvalidConfigValue {
            key: "max_aux_threads".to_string(),
            reason: "必须大于等于 1".to_string(),
        };
        assert!(err.to_string().contains("max_aux_threads"));
    }

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            CoreError::ModuleNotFound("x".into()).error_code(),
            error_code::MODULE_NOT_FOUND
        );
        assert_eq!(
            CoreError::EngineNotRunning.error_code(),
            error_code::KERNEL_ENGINE_NOT_RUNNING
        );
        assert_eq!(
            CoreError::InvalidState {
                operation: "start",
                state: KernelState::Running,
            }
            .error_code(),
            error_code::KERNEL_INVALID_STATE
        );
    }

    #[test]
    fn test_invalid_descriptor_lists_every_module() {
        let err = CoreError::InvalidDescriptor {
            failures: vec![
                DescriptorFailure::new(
                    "a",
                    vec![ValidationError::new("name", "不能为空", ValidationErrorCode::EmptyField)],
                ),
                DescriptorFailure::new(
                    "b",
                    vec![ValidationError::new(
                        "dependencies",
                        "必须是数组",
                        ValidationErrorCode::InvalidType,
                    )],
                ),
            ],
        };

        let message = err.to_string();
        assert!(message.contains("a"));
        assert!(message.contains("dependencies"));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_unmet_dependencies_display() {
        let descriptor = ModuleDescriptor::new("web", "1.0", "service").depends_on_type("db");
        let err = CoreError::UnmetDependencies {
            modules: vec![UnmetDependency {
                descriptor,
                unmet: vec![DependencySpec::typed("db")],
            }],
        };

        let message = err.to_string();
        assert!(message.contains("web"));
        assert!(message.contains("db"));
        assert_eq!(err.error_code(), error_code::MODULE_UNMET_DEPENDENCIES);
    }

    #[test]
    fn test_init_failure_keeps_source() {
        use std::error::Error as _;

        let err = CoreError::ModuleInitFailed {
            descriptor: ModuleDescriptor::new("cache", "2.0", "store"),
            source: Box::new(CoreError::InitFailed("连接失败".into())),
        };

        assert!(err.to_string().contains("cache"));
        assert!(err.source().is_some());
        assert!(!err.is_input_error());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CoreError = io.into();
        assert_eq!(err.error_code(), error_code::IO_ERROR);
    }
}
