//! 线程预算
//!
//! 根据已接入的子系统计算任务引擎的工作池大小：
//!
//! ```text
//! min_required = (纤程调度器 ? cores : 0) + (事件控制器 ? 2 : 0) + (事件守护进程 ? 1 : 0)
//! total        = min_required + max_aux_threads
//! ```

use serde::Serialize;

use crate::subsystem::SubsystemPresence;

/// 事件控制器占用的线程数
pub const EVENT_CONTROLLER_THREADS: usize = 2;

/// 事件守护进程占用的线程数
pub const EVENT_DAEMON_THREADS: usize = 1;

/// 无法探测 CPU 核心数时使用的值
pub const FALLBACK_CPU_CORES: usize = 4;

/// 线程预算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThreadBudget {
    /// 已接入子系统的最低线程需求
    pub min_required_threads: usize,
    /// 工作池总大小
    pub total_pool_size: usize,
}

impl ThreadBudget {
    /// 计算线程预算
    pub fn compute(presence: SubsystemPresence, cores: usize, max_aux_threads: usize) -> Self {
        let mut min_required_threads = 0;
        if presence.fiber_scheduler {
            min_required_threads += cores;
        }
        if presence.event_controller {
            min_required_threads += EVENT_CONTROLLER_THREADS;
        }
        if presence.event_daemon {
            min_required_threads += EVENT_DAEMON_THREADS;
        }

        Self {
            min_required_threads,
            total_pool_size: min_required_threads + max_aux_threads,
        }
    }
}

/// 探测 CPU 核心数
pub fn detect_cpu_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(FALLBACK_CPU_CORES)
}
