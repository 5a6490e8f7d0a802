//! 内核子系统
//!
//! 内核协调一组固定的协作组件：始终存在的任务引擎，以及可选的纤程调度器、
//! 纤程消息中心、事件控制器、事件守护进程和网络服务器。
//!
//! 每个子系统槽位带有所有权标记：[`SubsystemSlot::Owned`] 由内核在替换或析构时调用
//! [`Subsystem::close`] 释放；[`SubsystemSlot::Borrowed`] 由调用方自行负责。

pub mod engine;
pub mod event;
pub mod event_bus;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::core::context::KernelContext;
use crate::utils::Result;

pub use engine::{WorkerPool, WorkerPoolStats};
pub use event::{kernel_events, Event, KERNEL_SENDER};
pub use event_bus::{DispatchStats, EventBus, EventCallback};

// ============================================================================
// 子系统标识
// ============================================================================

/// 子系统种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemKind {
    /// 任务引擎
    TaskEngine,
    /// 纤程调度器
    FiberScheduler,
    /// 纤程消息中心
    FiberMessageCenter,
    /// 事件控制器
    EventController,
    /// 事件守护进程
    EventDaemon,
    /// 网络服务器
    Server,
}

impl std::fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubsystemKind::TaskEngine => "task-engine",
            SubsystemKind::FiberScheduler => "fiber-scheduler",
            SubsystemKind::FiberMessageCenter => "fiber-message-center",
            SubsystemKind::EventController => "event-controller",
            SubsystemKind::EventDaemon => "event-daemon",
            SubsystemKind::Server => "server",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// 子系统接口
// ============================================================================

/// 所有子系统的公共接口
pub trait Subsystem: Send + Sync {
    /// 释放子系统持有的资源
    ///
    /// 只有持有所有权的一方会调用。默认不做任何事。
    fn close(&self) {}
}

/// 任务引擎
#[async_trait]
pub trait TaskEngine: Subsystem {
    /// 启动引擎
    async fn start(&self) -> Result<()>;

    /// 停止引擎
    async fn stop(&self) -> Result<()>;

    /// 设置工作池大小（运行中也可调整）
    fn set_pool_size(&self, size: usize);

    /// 当前工作池大小
    fn pool_size(&self) -> usize;

    /// 提交工作项
    ///
    /// # Errors
    ///
    /// 引擎未运行时返回 `CoreError::EngineNotRunning`
    fn submit(&self, work: BoxFuture<'static, ()>) -> Result<JoinHandle<()>>;
}

/// 纤程调度器
#[async_trait]
pub trait FiberScheduler: Subsystem {
    /// 以指定数量的调度线程启动
    async fn start(&self, ctx: &KernelContext, workers: usize) -> Result<()>;

    /// 停止调度器
    async fn stop(&self) -> Result<()>;
}

/// 纤程消息中心（内核只负责持有，不参与启停）
pub trait FiberMessageCenter: Subsystem {}

/// 事件控制器
#[async_trait]
pub trait EventController: Subsystem {
    /// 启动事件分发
    async fn start(&self, ctx: &KernelContext) -> Result<()>;

    /// 停止事件分发
    async fn stop(&self) -> Result<()>;

    /// 调度一个事件
    fn schedule(&self, event: Event);
}

/// 事件守护进程
#[async_trait]
pub trait EventDaemon: Subsystem {
    /// 启动守护进程，事件经由 `controller` 调度
    async fn start(&self, ctx: &KernelContext, controller: Arc<dyn EventController>) -> Result<()>;

    /// 停止守护进程
    async fn stop(&self) -> Result<()>;
}

/// 网络服务器
#[async_trait]
pub trait Server: Subsystem {
    /// 设置最大连接数（在启动前调用）
    fn set_max_connection_count(&self, count: usize);

    /// 启动服务器
    async fn start(&self, ctx: &KernelContext) -> Result<()>;

    /// 停止服务器
    async fn stop(&self) -> Result<()>;
}

// ============================================================================
// 所有权标记的槽位
// ============================================================================

/// 带所有权标记的子系统句柄
pub enum SubsystemSlot<T: ?Sized> {
    /// 内核持有所有权，替换或析构时调用 `close`
    Owned(Arc<T>),
    /// 调用方保留所有权
    Borrowed(Arc<T>),
}

impl<T: ?Sized> SubsystemSlot<T> {
    /// 根据所有权标记创建槽位
    pub fn new(instance: Arc<T>, owned: bool) -> Self {
        if owned {
            SubsystemSlot::Owned(instance)
        } else {
            SubsystemSlot::Borrowed(instance)
        }
    }

    /// 获取实例
    pub fn get(&self) -> &Arc<T> {
        match self {
            SubsystemSlot::Owned(instance) | SubsystemSlot::Borrowed(instance) => instance,
        }
    }

    /// 内核是否持有所有权
    pub fn is_owned(&self) -> bool {
        matches!(self, SubsystemSlot::Owned(_))
    }
}

impl<T: ?Sized + Subsystem> SubsystemSlot<T> {
    /// 放弃槽位，仅在持有所有权时关闭实例
    pub fn release(self) {
        if let SubsystemSlot::Owned(instance) = self {
            instance.close();
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for SubsystemSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubsystemSlot::Owned(_) => write!(f, "Owned(..)"),
            SubsystemSlot::Borrowed(_) => write!(f, "Borrowed(..)"),
        }
    }
}

// ============================================================================
// 已接入的子系统集合
// ============================================================================

/// 当前接入了哪些可选子系统（用于线程预算）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubsystemPresence {
    /// 纤程调度器
    pub fiber_scheduler: bool,
    /// 事件控制器
    pub event_controller: bool,
    /// 事件守护进程
    pub event_daemon: bool,
}

/// 内核已接入的子系统
#[derive(Debug)]
pub struct Subsystems {
    pub(crate) engine: SubsystemSlot<dyn TaskEngine>,
    pub(crate) fiber_scheduler: Option<SubsystemSlot<dyn FiberScheduler>>,
    pub(crate) message_center: Option<SubsystemSlot<dyn FiberMessageCenter>>,
    pub(crate) event_controller: Option<SubsystemSlot<dyn EventController>>,
    pub(crate) event_daemon: Option<SubsystemSlot<dyn EventDaemon>>,
    pub(crate) server: Option<SubsystemSlot<dyn Server>>,
}

impl Subsystems {
    /// 以任务引擎创建，其余子系统为空
    pub fn new(engine: SubsystemSlot<dyn TaskEngine>) -> Self {
        Self {
            engine,
            fiber_scheduler: None,
            message_center: None,
            event_controller: None,
            event_daemon: None,
            server: None,
        }
    }

    /// 可选子系统接入情况
    pub fn presence(&self) -> SubsystemPresence {
        SubsystemPresence {
            fiber_scheduler: self.fiber_scheduler.is_some(),
            event_controller: self.event_controller.is_some(),
            event_daemon: self.event_daemon.is_some(),
        }
    }

    /// 任务引擎
    pub fn engine(&self) -> &Arc<dyn TaskEngine> {
        self.engine.get()
    }

    /// 事件控制器
    pub fn event_controller(&self) -> Option<&Arc<dyn EventController>> {
        self.event_controller.as_ref().map(SubsystemSlot::get)
    }

    /// 释放全部持有所有权的子系统
    pub(crate) fn release_all(&mut self) {
        if let Some(slot) = self.server.take() {
            slot.release();
        }
        if let Some(slot) = self.event_daemon.take() {
            slot.release();
        }
        if let Some(slot) = self.event_controller.take() {
            slot.release();
        }
        if let Some(slot) = self.message_center.take() {
            slot.release();
        }
        if let Some(slot) = self.fiber_scheduler.take() {
            slot.release();
        }
        if let SubsystemSlot::Owned(ref engine) = self.engine {
            engine.close();
        }
    }
}

/// 替换可选槽位，释放旧实例
pub(crate) fn replace_slot<T: ?Sized + Subsystem>(
    slot: &mut Option<SubsystemSlot<T>>,
    next: Option<SubsystemSlot<T>>,
) {
    if let Some(previous) = std::mem::replace(slot, next) {
        previous.release();
    }
}
