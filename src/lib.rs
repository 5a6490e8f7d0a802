//! # Chips Kernel - 薯片微内核
//!
//! 薯片微内核负责把一组可插拔模块和协作子系统组织成一个进程：
//!
//! - **模块依赖解析**: 模块自报名称、版本、类型和依赖，内核按依赖顺序初始化
//! - **整批加载**: 一批模块要么全部激活，要么全部回滚，与文件枚举顺序无关
//! - **级联卸载**: 卸载模块时一并卸载失去依赖的模块，同类型的其他提供者会被保留
//! - **子系统编排**: 任务引擎、纤程调度器、事件控制器、事件守护进程和网络服务器按固定顺序启停
//! - **线程预算**: 根据接入的子系统自动调整任务引擎的工作池大小
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_kernel::{ChipsKernel, EventBus, KernelConfig, StaticModuleLibrary};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = KernelConfig::default();
//!     let kernel = ChipsKernel::with_config(&config, Box::new(StaticModuleLibrary::new()))?;
//!     kernel.set_event_controller(Some(Arc::new(EventBus::new())), true).await?;
//!
//!     kernel.start().await?;
//!     kernel.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## 模块结构
//!
//! - `core` - 配置、线程预算、内核上下文与生命周期编排
//! - `module` - 模块描述、依赖解析、注册表和模块库
//! - `subsystem` - 子系统接口以及默认的任务引擎和事件总线
//! - `utils` - 错误类型、ID 和日志

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod module;
pub mod subsystem;
pub mod utils;

// 重导出常用类型，方便使用
pub use crate::core::{
    ChipsKernel, KernelConfig, KernelConfigBuilder, KernelContext, KernelState, LogConfig,
    ShutdownReport, ThreadBudget,
};

pub use module::{
    DependencyResolver, DependencySpec, DescriptorValidator, KernelModule, Module, ModuleApi,
    ModuleDescriptor, ModuleFactory, ModuleId, ModuleLibrary, ModuleSource, StaticModuleLibrary,
    UnloadCascader,
};

pub use subsystem::{
    kernel_events, Event, EventBus, EventController, EventDaemon, FiberMessageCenter,
    FiberScheduler, Server, Subsystem, SubsystemKind, TaskEngine, WorkerPool,
};

pub use utils::logger::{LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};
pub use utils::{error_code, generate_uuid, CoreError, Result};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
