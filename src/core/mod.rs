//! 核心模块
//!
//! 包含内核配置、线程预算、内核上下文和生命周期编排。

pub mod budget;
pub mod config;
pub mod context;
pub mod kernel;
pub mod state;

pub use budget::{detect_cpu_cores, ThreadBudget};
pub use config::{KernelConfig, KernelConfigBuilder, LogConfig};
pub use context::KernelContext;
pub use kernel::ChipsKernel;
pub use state::{KernelState, ShutdownReport};
