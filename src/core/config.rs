//! 内核配置
//!
//! 定义内核的配置结构和加载逻辑。配置文件按扩展名识别：`.json` 为 JSON，其余按 YAML 解析。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::{CoreError, Result};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 内核配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 模块目录列表
    #[serde(default)]
    pub module_dirs: Vec<PathBuf>,

    /// 辅助线程上限（工作池在最低需求之外的线程数）
    #[serde(default = "default_max_aux_threads")]
    pub max_aux_threads: usize,

    /// 网络服务器最大连接数
    #[serde(default)]
    pub max_connections: Option<usize>,

    /// 覆盖探测到的 CPU 核心数
    #[serde(default)]
    pub cpu_cores: Option<usize>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,
}

fn default_max_aux_threads() -> usize {
    100
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            module_dirs: vec![],
            max_aux_threads: default_max_aux_threads(),
            max_connections: None,
            cpu_cores: None,
            logging: LogConfig::default(),
        }
    }
}

impl KernelConfig {
    /// 创建配置构建器
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::new()
    }

    /// 从文件加载配置
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            CoreError::ConfigLoadFailed(format!("无法读取 {}: {}", path.display(), e))
        })?;

        let mut config: KernelConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.config_path = Some(path);
        Ok(config)
    }

    /// 校验配置，一次报告全部问题
    pub fn validate(&self) -> Result<()> {
        let mut problems: Vec<(&str, String)> = Vec::new();

        if self.max_aux_threads == 0 {
            problems.push(("max_aux_threads", "必须大于 0".to_string()));
        }
        if self.max_connections == Some(0) {
            problems.push(("max_connections", "必须大于 0".to_string()));
        }
        if self.cpu_cores == Some(0) {
            problems.push(("cpu_cores", "必须大于 0".to_string()));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            problems.push((
                "logging.level",
                format!("无法识别的日志级别 '{}'", self.logging.level),
            ));
        }
        if self.logging.file_output && self.logging.log_dir.is_none() {
            problems.push(("logging.log_dir", "启用文件日志时必须指定目录".to_string()));
        }

        if problems.is_empty() {
            return Ok(());
        }

        let key = problems
            .iter()
            .map(|(k, _)| *k)
            .collect::<Vec<_>>()
            .join(", ");
        let reason = problems
            .iter()
            .map(|(k, r)| format!("{}: {}", k, r))
            .collect::<Vec<_>>()
            .join("; ");
        Err(CoreError::InvalidConfigValue { key, reason })
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self {
            config: KernelConfig::default(),
        }
    }

    /// 添加模块目录
    pub fn module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.module_dirs.push(dir.into());
        self
    }

    /// 设置辅助线程上限
    pub fn max_aux_threads(mut self, count: usize) -> Self {
        self.config.max_aux_threads = count;
        self
    }

    /// 设置最大连接数
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = Some(count);
        self
    }

    /// 覆盖 CPU 核心数
    pub fn cpu_cores(mut self, cores: usize) -> Self {
        self.config.cpu_cores = Some(cores);
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> KernelConfig {
        self.config
    }
}
