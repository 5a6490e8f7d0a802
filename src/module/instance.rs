//! 模块接口
//!
//! 代码单元加载后得到一个 [`Module`]。实现了 [`KernelModule`] 能力的模块会参与依赖跟踪，
//! 由内核按依赖顺序初始化和清理；其余模块是不参与依赖跟踪的不透明单元。

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::core::context::KernelContext;
use crate::module::metadata::{ModuleDescriptor, ModuleId};
use crate::utils::Result;

/// 模块对外暴露的能力对象，调用方按具体接口类型向下转型
pub type ModuleApi = Arc<dyn Any + Send + Sync>;

/// 已加载的代码单元
pub trait Module: Send + Sync {
    /// 代码单元标识
    fn id(&self) -> ModuleId;

    /// 获取依赖跟踪能力
    ///
    /// 默认返回 `None`，表示该单元不参与依赖跟踪。
    fn as_kernel_module(self: Arc<Self>) -> Option<Arc<dyn KernelModule>> {
        None
    }
}

/// 参与依赖跟踪的模块
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use chips_kernel::{KernelContext, KernelModule, Module, ModuleApi, ModuleDescriptor, ModuleId};
///
/// struct Cache;
///
/// impl Module for Cache {
///     fn id(&self) -> ModuleId {
///         ModuleId::new("cache", "1.0")
///     }
///
///     fn as_kernel_module(self: Arc<Self>) -> Option<Arc<dyn KernelModule>> {
///         Some(self)
///     }
/// }
///
/// #[async_trait]
/// impl KernelModule for Cache {
///     fn dependency_info(&self) -> serde_json::Value {
///         ModuleDescriptor::new("cache", "1.0", "store").to_value()
///     }
///
///     async fn initialize(&self, _ctx: &KernelContext) -> chips_kernel::Result<()> {
///         Ok(())
///     }
///
///     async fn cleanup(&self, _ctx: &KernelContext) {}
///
///     fn api(&self, _ctx: &KernelContext) -> Option<ModuleApi> {
///         None
///     }
/// }
/// ```
#[async_trait]
pub trait KernelModule: Module {
    /// 自报的依赖描述（动态对象，加载前会被校验）
    fn dependency_info(&self) -> Value;

    /// 初始化模块
    ///
    /// 调用时其全部依赖都已初始化，可通过 `ctx` 查询依赖模块的能力对象。
    async fn initialize(&self, ctx: &KernelContext) -> Result<()>;

    /// 清理模块（卸载前调用，依赖模块此时仍然可用）
    async fn cleanup(&self, ctx: &KernelContext);

    /// 模块的能力对象
    fn api(&self, ctx: &KernelContext) -> Option<ModuleApi>;
}

/// 已激活的依赖跟踪模块
///
/// 追加到注册表后不再修改。
#[derive(Clone)]
pub struct LoadedModule {
    /// 校验后的模块描述
    pub descriptor: ModuleDescriptor,
    /// 模块实例
    pub module: Arc<dyn KernelModule>,
    /// 底层代码单元名称（用于从模块库释放）
    pub unit: String,
    /// 激活时间
    pub loaded_at: DateTime<Utc>,
}

impl LoadedModule {
    /// 创建已激活模块记录
    pub fn new(descriptor: ModuleDescriptor, module: Arc<dyn KernelModule>, unit: String) -> Self {
        Self {
            descriptor,
            module,
            unit,
            loaded_at: Utc::now(),
        }
    }

    /// 模块名称
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

impl AsRef<ModuleDescriptor> for LoadedModule {
    fn as_ref(&self) -> &ModuleDescriptor {
        &self.descriptor
    }
}

impl AsRef<ModuleDescriptor> for Arc<LoadedModule> {
    fn as_ref(&self) -> &ModuleDescriptor {
        &self.descriptor
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("descriptor", &self.descriptor)
            .field("unit", &self.unit)
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}
