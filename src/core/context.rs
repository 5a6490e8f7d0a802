//! 内核上下文
//!
//! 传递给模块和子系统的内核视图。上下文持有子系统的共享引用以及调用时可见的
//! 模块快照，模块在 `initialize` 中通过它查询依赖的能力对象，无需重新进入内核锁。

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::module::instance::{LoadedModule, ModuleApi};
use crate::subsystem::{Event, EventController, FiberMessageCenter, FiberScheduler, TaskEngine};
use crate::utils::Result;

/// 内核上下文
#[derive(Clone)]
pub struct KernelContext {
    engine: Arc<dyn TaskEngine>,
    fiber_scheduler: Option<Arc<dyn FiberScheduler>>,
    message_center: Option<Arc<dyn FiberMessageCenter>>,
    event_controller: Option<Arc<dyn EventController>>,
    modules: Vec<Arc<LoadedModule>>,
}

impl KernelContext {
    /// 以任务引擎创建上下文，其余子系统为空
    pub fn new(engine: Arc<dyn TaskEngine>) -> Self {
        Self {
            engine,
            fiber_scheduler: None,
            message_center: None,
            event_controller: None,
            modules: Vec::new(),
        }
    }

    /// 设置纤程调度器
    pub fn with_fiber_scheduler(mut self, scheduler: Option<Arc<dyn FiberScheduler>>) -> Self {
        self.fiber_scheduler = scheduler;
        self
    }

    /// 设置纤程消息中心
    pub fn with_message_center(mut self, center: Option<Arc<dyn FiberMessageCenter>>) -> Self {
        self.message_center = center;
        self
    }

    /// 设置事件控制器
    pub fn with_event_controller(mut self, controller: Option<Arc<dyn EventController>>) -> Self {
        self.event_controller = controller;
        self
    }

    /// 设置可见的模块（依赖顺序）
    pub fn with_modules(mut self, modules: Vec<Arc<LoadedModule>>) -> Self {
        self.modules = modules;
        self
    }

    /// 追加一个可见模块（批量加载时每初始化一个模块调用一次）
    pub(crate) fn push_module(&mut self, module: Arc<LoadedModule>) {
        self.modules.push(module);
    }

    /// 任务引擎
    pub fn engine(&self) -> &Arc<dyn TaskEngine> {
        &self.engine
    }

    /// 纤程调度器
    pub fn fiber_scheduler(&self) -> Option<&Arc<dyn FiberScheduler>> {
        self.fiber_scheduler.as_ref()
    }

    /// 纤程消息中心
    pub fn message_center(&self) -> Option<&Arc<dyn FiberMessageCenter>> {
        self.message_center.as_ref()
    }

    /// 事件控制器
    pub fn event_controller(&self) -> Option<&Arc<dyn EventController>> {
        self.event_controller.as_ref()
    }

    /// 可见模块（依赖顺序）
    pub fn modules(&self) -> &[Arc<LoadedModule>] {
        &self.modules
    }

    /// 向任务引擎提交工作项
    pub fn submit(&self, work: BoxFuture<'static, ()>) -> Result<JoinHandle<()>> {
        self.engine.submit(work)
    }

    /// 调度事件，没有事件控制器时返回 `false`
    pub fn schedule_event(&self, event: Event) -> bool {
        match &self.event_controller {
            Some(controller) => {
                controller.schedule(event);
                true
            }
            None => false,
        }
    }

    /// 按名称获取模块能力对象
    pub fn module_api(&self, name: &str) -> Option<ModuleApi> {
        self.modules
            .iter()
            .find(|m| m.name() == name)
            .and_then(|m| m.module.api(self))
    }

    /// 按类型获取模块能力对象
    ///
    /// 同类型有多个模块时取依赖顺序中最后一个；该模块不提供能力对象时返回 `None`。
    pub fn module_api_by_type(&self, module_type: &str) -> Option<ModuleApi> {
        self.modules
            .iter()
            .rev()
            .find(|m| m.descriptor.module_type == module_type)
            .and_then(|m| m.module.api(self))
    }

    /// 按类型获取全部模块能力对象（依赖顺序）
    pub fn module_apis_by_type(&self, module_type: &str) -> Vec<ModuleApi> {
        self.modules
            .iter()
            .filter(|m| m.descriptor.module_type == module_type)
            .filter_map(|m| m.module.api(self))
            .collect()
    }
}

impl std::fmt::Debug for KernelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelContext")
            .field("fiber_scheduler", &self.fiber_scheduler.is_some())
            .field("message_center", &self.message_center.is_some())
            .field("event_controller", &self.event_controller.is_some())
            .field(
                "modules",
                &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
