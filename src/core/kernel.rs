//! 内核编排器
//!
//! [`ChipsKernel`] 协调子系统的启停、线程预算以及模块的批量加载与级联卸载。
//!
//! 所有修改状态的操作（启动、停止、加载、卸载、替换子系统）持有写锁直到完成，
//! 相互之间以及与读取串行执行；只读取模块能力对象的查询持有读锁，可以并发。
//!
//! # 示例
//!
//! ```rust,no_run
//! use chips_kernel::{ChipsKernel, KernelConfig, StaticModuleLibrary};
//!
//! #[tokio::main]
//! async fn main() -> chips_kernel::Result<()> {
//!     let config = KernelConfig::builder().module_dir("./modules").build();
//!     let kernel = ChipsKernel::with_config(&config, Box::new(StaticModuleLibrary::new()))?;
//!
//!     // 启动时加载配置中的模块目录
//!     kernel.start().await?;
//!     let report = kernel.stop().await;
//!     assert!(report.is_clean());
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::core::budget::{detect_cpu_cores, ThreadBudget};
use crate::core::config::KernelConfig;
use crate::core::context::KernelContext;
use crate::core::state::{KernelState, ShutdownReport};
use crate::module::instance::ModuleApi;
use crate::module::loader::{ModuleLibrary, ModuleSource};
use crate::module::manager::ModuleManager;
use crate::module::metadata::ModuleDescriptor;
use crate::module::parser::ManifestParser;
use crate::subsystem::{
    kernel_events, replace_slot, Event, EventController, EventDaemon, FiberMessageCenter,
    FiberScheduler, Server, SubsystemKind, SubsystemSlot, Subsystems, TaskEngine, WorkerPool,
};
use crate::utils::{CoreError, Result};

struct KernelInner {
    state: KernelState,
    subsystems: Subsystems,
    modules: ModuleManager,
    cpu_cores: usize,
    max_aux_threads: usize,
    max_connections: Option<usize>,
    module_dirs: Vec<PathBuf>,
}

impl KernelInner {
    fn context(&self) -> KernelContext {
        let subsystems = &self.subsystems;
        let base = KernelContext::new(Arc::clone(subsystems.engine()))
            .with_fiber_scheduler(subsystems.fiber_scheduler.as_ref().map(|s| Arc::clone(s.get())))
            .with_message_center(subsystems.message_center.as_ref().map(|s| Arc::clone(s.get())))
            .with_event_controller(subsystems.event_controller().cloned());
        self.modules.view(&base)
    }

    fn require_state(&self, expected: KernelState, operation: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CoreError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// 模块在启动过程中和运行时都可以加载
    fn require_loadable(&self, operation: &'static str) -> Result<()> {
        match self.state {
            KernelState::Starting | KernelState::Running => Ok(()),
            state => Err(CoreError::InvalidState { operation, state }),
        }
    }

    /// 重新计算线程预算并调整工作池大小
    fn apply_budget(&self) -> ThreadBudget {
        let budget = ThreadBudget::compute(
            self.subsystems.presence(),
            self.cpu_cores,
            self.max_aux_threads,
        );
        self.subsystems.engine().set_pool_size(budget.total_pool_size);
        debug!(
            min_threads = budget.min_required_threads,
            pool_size = budget.total_pool_size,
            max_aux_threads = self.max_aux_threads,
            "线程预算已更新"
        );
        budget
    }

    fn emit(&self, event_type: &str, data: serde_json::Value) {
        if let Some(controller) = self.subsystems.event_controller() {
            debug!(event_type = %event_type, "发出内核事件");
            controller.schedule(Event::kernel(event_type, data));
        }
    }

    /// 任务引擎之后的启动序列：纤程调度器 → 配置的模块目录 → 事件控制器 → 事件守护进程 → 网络服务器
    ///
    /// 已启动的可选子系统记录在 `started` 中，供失败时回滚。
    async fn start_sequence(&mut self, started: &mut Vec<SubsystemKind>) -> Result<()> {
        let ctx = self.context();
        self.start_fiber_scheduler(&ctx, started)
            .await
            .map_err(start_failure)?;

        let loaded = self.load_configured().await?;
        if !loaded.is_empty() {
            info!(modules = loaded.len(), "启动阶段已加载模块");
        }

        // 之后启动的子系统可以看到刚加载的模块
        let ctx = self.context();
        self.start_services(&ctx, started)
            .await
            .map_err(start_failure)
    }

    async fn start_fiber_scheduler(
        &self,
        ctx: &KernelContext,
        started: &mut Vec<SubsystemKind>,
    ) -> std::result::Result<(), (SubsystemKind, CoreError)> {
        if let Some(scheduler) = &self.subsystems.fiber_scheduler {
            info!(subsystem = %SubsystemKind::FiberScheduler, workers = self.cpu_cores, "启动子系统");
            scheduler
                .get()
                .start(ctx, self.cpu_cores)
                .await
                .map_err(|e| (SubsystemKind::FiberScheduler, e))?;
            started.push(SubsystemKind::FiberScheduler);
        }
        Ok(())
    }

    async fn start_services(
        &self,
        ctx: &KernelContext,
        started: &mut Vec<SubsystemKind>,
    ) -> std::result::Result<(), (SubsystemKind, CoreError)> {
        let subsystems = &self.subsystems;

        if let Some(controller) = subsystems.event_controller() {
            info!(subsystem = %SubsystemKind::EventController, "启动子系统");
            controller
                .start(ctx)
                .await
                .map_err(|e| (SubsystemKind::EventController, e))?;
            started.push(SubsystemKind::EventController);
        }

        if let Some(daemon) = &subsystems.event_daemon {
            info!(subsystem = %SubsystemKind::EventDaemon, "启动子系统");
            let controller = subsystems.event_controller().cloned().ok_or_else(|| {
                (
                    SubsystemKind::EventDaemon,
                    CoreError::InitFailed("事件守护进程需要事件控制器".to_string()),
                )
            })?;
            daemon
                .get()
                .start(ctx, controller)
                .await
                .map_err(|e| (SubsystemKind::EventDaemon, e))?;
            started.push(SubsystemKind::EventDaemon);
        }

        if let Some(server) = &subsystems.server {
            info!(subsystem = %SubsystemKind::Server, "启动子系统");
            if let Some(count) = self.max_connections {
                server.get().set_max_connection_count(count);
            }
            server
                .get()
                .start(ctx)
                .await
                .map_err(|e| (SubsystemKind::Server, e))?;
            started.push(SubsystemKind::Server);
        }

        Ok(())
    }

    /// 整批加载模块并发出加载事件
    ///
    /// 启动过程中事件控制器尚未启动，不发出单独的加载事件，模块数量体现在 `kernel.started` 中。
    async fn load_sources(
        &mut self,
        sources: Vec<ModuleSource>,
        operation: &'static str,
    ) -> Result<Vec<ModuleDescriptor>> {
        self.require_loadable(operation)?;

        let base = self.context();
        let added = self.modules.load_batch(sources, &base).await?;

        if self.state == KernelState::Running {
            for module in &added {
                let descriptor = &module.descriptor;
                self.emit(
                    kernel_events::MODULE_LOADED,
                    json!({
                        "name": descriptor.name,
                        "version": descriptor.version,
                        "type": descriptor.module_type,
                    }),
                );
            }
        }
        Ok(added.iter().map(|m| m.descriptor.clone()).collect())
    }

    /// 扫描目录并将其中全部模块清单作为一个批次加载
    async fn load_dirs(&mut self, dirs: &[PathBuf]) -> Result<Vec<ModuleDescriptor>> {
        self.require_loadable("load_modules_from_dirs")?;
        let manifests = ManifestParser::scan_dirs(dirs).await?;
        info!(dirs = dirs.len(), manifests = manifests.len(), "从目录加载模块");
        self.load_sources(
            manifests.into_iter().map(ModuleSource::Unit).collect(),
            "load_modules_from_dirs",
        )
        .await
    }

    async fn load_configured(&mut self) -> Result<Vec<ModuleDescriptor>> {
        if self.module_dirs.is_empty() {
            return Ok(Vec::new());
        }
        let dirs = self.module_dirs.clone();
        self.load_dirs(&dirs).await
    }

    /// 逆序停止：服务器 → 事件守护进程 → 事件控制器 → 全部模块 → 纤程调度器 → 任务引擎
    ///
    /// 只停止 `started` 中列出的可选子系统；每一步的失败都记录下来，不影响后续步骤。
    async fn shutdown(&mut self, started: &[SubsystemKind]) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let ctx = self.context();
        let subsystems = &self.subsystems;

        if started.contains(&SubsystemKind::Server) {
            if let Some(server) = &subsystems.server {
                record_stop(&mut report, SubsystemKind::Server, server.get().stop().await);
            }
        }
        if started.contains(&SubsystemKind::EventDaemon) {
            if let Some(daemon) = &subsystems.event_daemon {
                record_stop(&mut report, SubsystemKind::EventDaemon, daemon.get().stop().await);
            }
        }
        if started.contains(&SubsystemKind::EventController) {
            if let Some(controller) = subsystems.event_controller() {
                record_stop(&mut report, SubsystemKind::EventController, controller.stop().await);
            }
        }

        self.modules.unload_all(&ctx).await;

        let subsystems = &self.subsystems;
        if started.contains(&SubsystemKind::FiberScheduler) {
            if let Some(scheduler) = &subsystems.fiber_scheduler {
                record_stop(
                    &mut report,
                    SubsystemKind::FiberScheduler,
                    scheduler.get().stop().await,
                );
            }
        }
        record_stop(&mut report, SubsystemKind::TaskEngine, subsystems.engine().stop().await);

        report
    }

    fn wired(&self) -> Vec<SubsystemKind> {
        let mut kinds = Vec::new();
        if self.subsystems.fiber_scheduler.is_some() {
            kinds.push(SubsystemKind::FiberScheduler);
        }
        if self.subsystems.event_controller.is_some() {
            kinds.push(SubsystemKind::EventController);
        }
        if self.subsystems.event_daemon.is_some() {
            kinds.push(SubsystemKind::EventDaemon);
        }
        if self.subsystems.server.is_some() {
            kinds.push(SubsystemKind::Server);
        }
        kinds
    }
}

fn start_failure((subsystem, e): (SubsystemKind, CoreError)) -> CoreError {
    CoreError::SubsystemStartFailed {
        subsystem,
        reason: e.to_string(),
    }
}

fn record_stop(report: &mut ShutdownReport, subsystem: SubsystemKind, result: Result<()>) {
    match result {
        Ok(()) => debug!(subsystem = %subsystem, "子系统已停止"),
        Err(e) => {
            warn!(subsystem = %subsystem, error = %e, "子系统停止失败，继续停止其余部分");
            report.record(subsystem, e.to_string());
        }
    }
}

/// 薯片微内核
pub struct ChipsKernel {
    inner: RwLock<KernelInner>,
}

impl ChipsKernel {
    /// 以默认配置和模块库创建内核
    ///
    /// 任务引擎为内核持有的 [`WorkerPool`]。
    pub fn new(library: Box<dyn ModuleLibrary>) -> Self {
        let defaults = KernelConfig::default();
        Self::build(&defaults, detect_cpu_cores(), library)
    }

    /// 根据配置创建内核
    ///
    /// # Errors
    ///
    /// 配置校验失败时返回 `InvalidConfigValue`
    pub fn with_config(config: &KernelConfig, library: Box<dyn ModuleLibrary>) -> Result<Self> {
        config.validate()?;
        let cores = config.cpu_cores.unwrap_or_else(detect_cpu_cores);
        Ok(Self::build(config, cores, library))
    }

    fn build(config: &KernelConfig, cpu_cores: usize, library: Box<dyn ModuleLibrary>) -> Self {
        let engine: Arc<dyn TaskEngine> = Arc::new(WorkerPool::default());
        let inner = KernelInner {
            state: KernelState::Stopped,
            subsystems: Subsystems::new(SubsystemSlot::Owned(engine)),
            modules: ModuleManager::new(library),
            cpu_cores,
            max_aux_threads: config.max_aux_threads,
            max_connections: config.max_connections,
            module_dirs: config.module_dirs.clone(),
        };
        let budget = inner.apply_budget();
        info!(
            cpu_cores,
            pool_size = budget.total_pool_size,
            "内核已创建"
        );

        Self {
            inner: RwLock::new(inner),
        }
    }

    // ==================== 生命周期 ====================

    /// 启动内核
    ///
    /// 先启动任务引擎和纤程调度器，然后整批加载配置中的模块目录，
    /// 最后依次启动事件控制器、事件守护进程和网络服务器。
    ///
    /// # Errors
    ///
    /// - 内核不处于停止状态时返回 `InvalidState`
    /// - 任一子系统启动失败时返回 `SubsystemStartFailed`
    /// - 模块目录加载失败时返回对应的加载错误
    ///
    /// 失败时已启动的部分全部逆序停止，内核回到停止状态。
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.require_state(KernelState::Stopped, "start")?;
        inner.state = KernelState::Starting;

        let budget = inner.apply_budget();
        info!(
            pool_size = budget.total_pool_size,
            min_threads = budget.min_required_threads,
            "启动内核"
        );

        if let Err(e) = inner.subsystems.engine().start().await {
            error!(subsystem = %SubsystemKind::TaskEngine, error = %e, "任务引擎启动失败");
            inner.state = KernelState::Stopped;
            return Err(CoreError::SubsystemStartFailed {
                subsystem: SubsystemKind::TaskEngine,
                reason: e.to_string(),
            });
        }

        let mut started = Vec::new();
        if let Err(e) = inner.start_sequence(&mut started).await {
            error!(error = %e, error_code = e.error_code(), "内核启动失败，回滚");
            inner.state = KernelState::Stopping;
            let report = inner.shutdown(&started).await;
            inner.state = KernelState::Stopped;
            if !report.is_clean() {
                warn!(failures = report.failures.len(), "回滚过程中存在停止失败");
            }
            return Err(e);
        }

        inner.state = KernelState::Running;
        inner.emit(
            kernel_events::STARTED,
            json!({
                "version": crate::VERSION,
                "pool_size": budget.total_pool_size,
                "modules": inner.modules.registry().len(),
            }),
        );
        info!("内核已启动");
        Ok(())
    }

    /// 停止内核
    ///
    /// 尽力而为：每一步的失败都记录在返回的报告中，不会中断后续步骤。
    /// 已停止的内核直接返回空报告。
    pub async fn stop(&self) -> ShutdownReport {
        let mut inner = self.inner.write().await;
        if inner.state == KernelState::Stopped {
            return ShutdownReport::default();
        }

        info!("停止内核");
        inner.state = KernelState::Stopping;
        let wired = inner.wired();
        let report = inner.shutdown(&wired).await;
        inner.state = KernelState::Stopped;

        if report.is_clean() {
            info!("内核已停止");
        } else {
            warn!(failures = report.failures.len(), "内核已停止，部分步骤失败");
        }
        report
    }

    // ==================== 模块 ====================

    /// 整批加载模块
    ///
    /// 返回本批次激活的依赖跟踪模块描述（初始化顺序）。失败时内核的模块集合与调用前完全一致。
    #[instrument(skip_all, fields(batch_size = sources.len()))]
    pub async fn load_modules(&self, sources: Vec<ModuleSource>) -> Result<Vec<ModuleDescriptor>> {
        let mut inner = self.inner.write().await;
        inner.require_state(KernelState::Running, "load_modules")?;
        inner.load_sources(sources, "load_modules").await
    }

    /// 加载单个模块，不透明单元返回 `None`
    pub async fn load_module(&self, source: ModuleSource) -> Result<Option<ModuleDescriptor>> {
        Ok(self.load_modules(vec![source]).await?.into_iter().next())
    }

    /// 扫描目录并将其中全部模块清单作为一个批次加载
    ///
    /// 配置中的模块目录在 [`start`](Self::start) 时已经加载，这里用于运行时追加。
    ///
    /// # Errors
    ///
    /// 任一目录无法读取时返回 IO 错误，此时不加载任何模块
    pub async fn load_modules_from_dirs(&self, dirs: &[PathBuf]) -> Result<Vec<ModuleDescriptor>> {
        let mut inner = self.inner.write().await;
        inner.require_state(KernelState::Running, "load_modules_from_dirs")?;
        inner.load_dirs(dirs).await
    }

    /// 卸载模块（级联卸载失去依赖的模块），返回实际卸载的名称
    ///
    /// # Errors
    ///
    /// 模块不存在时返回 `ModuleNotFound`，内核状态不变
    #[instrument(skip(self))]
    pub async fn unload_module(&self, name: &str) -> Result<Vec<String>> {
        let mut inner = self.inner.write().await;
        inner.require_state(KernelState::Running, "unload_module")?;

        let base = inner.context();
        let unloaded = inner.modules.unload(name, &base).await?;
        for unloaded_name in &unloaded {
            inner.emit(kernel_events::MODULE_UNLOADED, json!({ "name": unloaded_name }));
        }
        Ok(unloaded)
    }

    // ==================== 子系统 ====================

    /// 替换任务引擎（仅在停止状态）
    pub async fn set_task_engine(&self, engine: Arc<dyn TaskEngine>, owned: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.require_state(KernelState::Stopped, "set_task_engine")?;
        let previous = std::mem::replace(
            &mut inner.subsystems.engine,
            SubsystemSlot::new(engine, owned),
        );
        previous.release();
        inner.apply_budget();
        Ok(())
    }

    /// 设置纤程调度器（仅在停止状态）
    pub async fn set_fiber_scheduler(
        &self,
        scheduler: Option<Arc<dyn FiberScheduler>>,
        owned: bool,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.require_state(KernelState::Stopped, "set_fiber_scheduler")?;
        replace_slot(
            &mut inner.subsystems.fiber_scheduler,
            scheduler.map(|s| SubsystemSlot::new(s, owned)),
        );
        inner.apply_budget();
        Ok(())
    }

    /// 设置纤程消息中心（仅在停止状态）
    pub async fn set_fiber_message_center(
        &self,
        center: Option<Arc<dyn FiberMessageCenter>>,
        owned: bool,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.require_state(KernelState::Stopped, "set_fiber_message_center")?;
        replace_slot(
            &mut inner.subsystems.message_center,
            center.map(|c| SubsystemSlot::new(c, owned)),
        );
        inner.apply_budget();
        Ok(())
    }

    /// 设置事件控制器（仅在停止状态）
    pub async fn set_event_controller(
        &self,
        controller: Option<Arc<dyn EventController>>,
        owned: bool,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.require_state(KernelState::Stopped, "set_event_controller")?;
        replace_slot(
            &mut inner.subsystems.event_controller,
            controller.map(|c| SubsystemSlot::new(c, owned)),
        );
        inner.apply_budget();
        Ok(())
    }

    /// 设置事件守护进程（仅在停止状态）
    pub async fn set_event_daemon(
        &self,
        daemon: Option<Arc<dyn EventDaemon>>,
        owned: bool,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.require_state(KernelState::Stopped, "set_event_daemon")?;
        replace_slot(
            &mut inner.subsystems.event_daemon,
            daemon.map(|d| SubsystemSlot::new(d, owned)),
        );
        inner.apply_budget();
        Ok(())
    }

    /// 设置网络服务器（仅在停止状态）
    pub async fn set_server(&self, server: Option<Arc<dyn Server>>, owned: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.require_state(KernelState::Stopped, "set_server")?;
        replace_slot(
            &mut inner.subsystems.server,
            server.map(|s| SubsystemSlot::new(s, owned)),
        );
        inner.apply_budget();
        Ok(())
    }

    /// 设置辅助线程上限，运行中的工作池立即调整
    pub async fn set_max_aux_threads(&self, count: usize) -> Result<ThreadBudget> {
        if count == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "max_aux_threads".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        let mut inner = self.inner.write().await;
        inner.max_aux_threads = count;
        Ok(inner.apply_budget())
    }

    /// 设置网络服务器最大连接数，下次启动时生效
    pub async fn set_max_server_connections(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(CoreError::InvalidConfigValue {
                key: "max_connections".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        self.inner.write().await.max_connections = Some(count);
        Ok(())
    }

    // ==================== 查询 ====================

    /// 当前状态
    pub async fn state(&self) -> KernelState {
        self.inner.read().await.state
    }

    /// 当前线程预算
    pub async fn thread_budget(&self) -> ThreadBudget {
        let inner = self.inner.read().await;
        ThreadBudget::compute(
            inner.subsystems.presence(),
            inner.cpu_cores,
            inner.max_aux_threads,
        )
    }

    /// 内核上下文快照
    pub async fn context(&self) -> KernelContext {
        self.inner.read().await.context()
    }

    /// 已激活的依赖跟踪模块描述（依赖顺序）
    pub async fn active_modules(&self) -> Vec<ModuleDescriptor> {
        self.inner.read().await.modules.registry().active_descriptors()
    }

    /// 模块库中已加载的全部代码单元
    pub async fn loaded_units(&self) -> Vec<String> {
        self.inner.read().await.modules.loaded_units()
    }

    /// 按名称获取模块能力对象
    pub async fn module_api(&self, name: &str) -> Option<ModuleApi> {
        self.inner.read().await.context().module_api(name)
    }

    /// 按类型获取模块能力对象（同类型取依赖顺序中最后一个）
    pub async fn module_api_by_type(&self, module_type: &str) -> Option<ModuleApi> {
        self.inner.read().await.context().module_api_by_type(module_type)
    }

    /// 按类型获取全部模块能力对象（依赖顺序）
    pub async fn module_apis_by_type(&self, module_type: &str) -> Vec<ModuleApi> {
        self.inner.read().await.context().module_apis_by_type(module_type)
    }
}

impl Drop for ChipsKernel {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.state != KernelState::Stopped {
            warn!(state = %inner.state, "内核未停止即被析构");
        }
        inner.modules.abandon_all();
        inner.subsystems.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::loader::StaticModuleLibrary;
    use crate::subsystem::{EventBus, Subsystem};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn kernel(cores: usize, aux: usize) -> ChipsKernel {
        let config = KernelConfig::builder()
            .cpu_cores(cores)
            .max_aux_threads(aux)
            .build();
        ChipsKernel::with_config(&config, Box::new(StaticModuleLibrary::new())).unwrap()
    }

    #[derive(Default)]
    struct Fiber {
        workers: AtomicUsize,
    }

    impl Subsystem for Fiber {}

    #[async_trait]
    impl FiberScheduler for Fiber {
        async fn start(&self, _ctx: &KernelContext, workers: usize) -> Result<()> {
            self.workers.store(workers, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_thread_budget_follows_subsystems() {
        let kernel = kernel(4, 10);
        assert_eq!(kernel.thread_budget().await.total_pool_size, 10);

        kernel
            .set_fiber_scheduler(Some(Arc::new(Fiber::default())), true)
            .await
            .unwrap();
        kernel
            .set_event_controller(Some(Arc::new(EventBus::new())), true)
            .await
            .unwrap();

        let budget = kernel.thread_budget().await;
        assert_eq!(budget.min_required_threads, 6);
        assert_eq!(budget.total_pool_size, 16);
        assert_eq!(kernel.context().await.engine().pool_size(), 16);

        let budget = kernel.set_max_aux_threads(2).await.unwrap();
        assert_eq!(budget.total_pool_size, 8);
        assert!(kernel.set_max_aux_threads(0).await.is_err());
    }

    #[tokio::test]
    async fn test_start_stop_cycle() {
        let kernel = kernel(2, 1);
        let fiber = Arc::new(Fiber::default());
        kernel.set_fiber_scheduler(Some(fiber.clone()), false).await.unwrap();

        kernel.start().await.unwrap();
        assert_eq!(kernel.state().await, KernelState::Running);
        assert_eq!(fiber.workers.load(Ordering::SeqCst), 2);

        let err = kernel.start().await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { operation: "start", .. }));

        let err = kernel.set_server(None, false).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));

        assert!(kernel.stop().await.is_clean());
        assert_eq!(kernel.state().await, KernelState::Stopped);
        assert!(kernel.stop().await.is_clean());

        kernel.start().await.unwrap();
        kernel.stop().await;
    }

    #[tokio::test]
    async fn test_module_operations_require_running() {
        let kernel = kernel(1, 1);
        let err = kernel.load_modules(Vec::new()).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        let err = kernel.unload_module("a").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        let err = kernel.load_modules_from_dirs(&[]).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_with_config_rejects_invalid() {
        let config = KernelConfig::builder().max_aux_threads(0).build();
        let result = ChipsKernel::with_config(&config, Box::new(StaticModuleLibrary::new()));
        assert!(matches!(result, Err(CoreError::InvalidConfigValue { .. })));
    }
}
