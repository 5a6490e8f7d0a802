//! 内核状态

use serde::Serialize;

use crate::subsystem::SubsystemKind;

/// 内核生命周期状态
///
/// `Stopped → Starting → Running → Stopping → Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KernelState {
    /// 已停止
    #[default]
    Stopped,
    /// 启动中
    Starting,
    /// 运行中
    Running,
    /// 停止中
    Stopping,
}

impl KernelState {
    /// 是否处于运行状态
    pub fn is_running(&self) -> bool {
        matches!(self, KernelState::Running)
    }
}

impl std::fmt::Display for KernelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelState::Stopped => write!(f, "stopped"),
            KernelState::Starting => write!(f, "starting"),
            KernelState::Running => write!(f, "running"),
            KernelState::Stopping => write!(f, "stopping"),
        }
    }
}

/// 停止过程中记录的失败
///
/// 停止是尽力而为的：某一步失败只会被记录，后续步骤照常执行。
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// 失败的步骤及错误描述
    pub failures: Vec<(SubsystemKind, String)>,
}

impl ShutdownReport {
    /// 是否全部步骤都成功
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, subsystem: SubsystemKind, reason: impl Into<String>) {
        self.failures.push((subsystem, reason.into()));
    }
}
