//! 模块库
//!
//! 负责代码单元的加载与释放。内核只通过 [`ModuleLibrary`] 接口使用模块库，
//! 默认实现 [`StaticModuleLibrary`] 以编译期注册的工厂作为代码单元来源。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::module::instance::Module;
use crate::module::parser::ManifestParser;
use crate::utils::{CoreError, Result};

/// 创建模块实例的函数
pub type CreateFn = Arc<dyn Fn() -> Result<Arc<dyn Module>> + Send + Sync>;

/// 释放模块实例时调用的函数
pub type FreeFn = Arc<dyn Fn(&Arc<dyn Module>) + Send + Sync>;

/// 模块工厂
///
/// `create` 创建模块实例；`free` 在单元被释放时调用。
#[derive(Clone)]
pub struct ModuleFactory {
    create: CreateFn,
    free: Option<FreeFn>,
}

impl ModuleFactory {
    /// 以创建函数构造工厂
    pub fn new<F>(create: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Module>> + Send + Sync + 'static,
    {
        Self {
            create: Arc::new(create),
            free: None,
        }
    }

    /// 设置释放函数
    pub fn with_free<F>(mut self, free: F) -> Self
    where
        F: Fn(&Arc<dyn Module>) + Send + Sync + 'static,
    {
        self.free = Some(Arc::new(free));
        self
    }

    /// 创建模块实例
    pub fn create(&self) -> Result<Arc<dyn Module>> {
        (self.create)()
    }
}

impl std::fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFactory")
            .field("has_free", &self.free.is_some())
            .finish()
    }
}

/// 批量加载的候选来源
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// 代码单元清单文件
    Unit(PathBuf),
    /// 直接给出的工厂
    Factory(ModuleFactory),
}

/// 加载得到的代码单元
#[derive(Clone)]
pub struct LoadedUnit {
    /// 单元名称（模块库内唯一）
    pub name: String,
    /// 模块实例
    pub module: Arc<dyn Module>,
}

impl std::fmt::Debug for LoadedUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedUnit").field("name", &self.name).finish()
    }
}

/// 模块库接口
#[async_trait]
pub trait ModuleLibrary: Send + Sync {
    /// 从清单加载代码单元
    async fn load_from_unit(&mut self, path: &Path) -> Result<LoadedUnit>;

    /// 从工厂加载代码单元
    fn load_from_factory(&mut self, factory: ModuleFactory) -> Result<LoadedUnit>;

    /// 释放代码单元
    ///
    /// # Errors
    ///
    /// 单元未加载时返回 `CoreError::ModuleNotFound`
    fn unload(&mut self, name: &str) -> Result<()>;

    /// 获取已加载的代码单元
    fn get_loaded(&self, name: &str) -> Option<Arc<dyn Module>>;

    /// 按加载顺序的逆序释放全部代码单元，返回释放数量
    fn unload_all(&mut self) -> usize;

    /// 已加载单元名称（加载顺序）
    fn loaded_names(&self) -> Vec<String>;
}

struct UnitRecord {
    name: String,
    module: Arc<dyn Module>,
    free: Option<FreeFn>,
}

impl UnitRecord {
    fn release(self) {
        if let Some(free) = &self.free {
            free(&self.module);
        }
        debug!(unit = %self.name, "代码单元已释放");
    }
}

/// 静态模块库
///
/// 工厂按入口名称注册，清单中的 `entry` 字段引用这些名称。
#[derive(Default)]
pub struct StaticModuleLibrary {
    factories: HashMap<String, ModuleFactory>,
    loaded: Vec<UnitRecord>,
}

impl StaticModuleLibrary {
    /// 创建空的模块库
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工厂
    pub fn register(&mut self, entry: impl Into<String>, factory: ModuleFactory) -> &mut Self {
        let entry = entry.into();
        if self.factories.insert(entry.clone(), factory).is_some() {
            warn!(entry = %entry, "覆盖已注册的模块工厂");
        }
        self
    }

    /// 注册工厂（构建器形式）
    pub fn with_factory(mut self, entry: impl Into<String>, factory: ModuleFactory) -> Self {
        self.register(entry, factory);
        self
    }

    /// 已注册的入口名称（排序）
    pub fn entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self.factories.keys().cloned().collect();
        entries.sort();
        entries
    }

    fn admit(&mut self, name: Option<String>, factory: &ModuleFactory) -> Result<LoadedUnit> {
        let module = factory.create()?;
        let name = name.unwrap_or_else(|| module.id().name);

        if self.loaded.iter().any(|u| u.name == name) {
            if let Some(free) = &factory.free {
                free(&module);
            }
            return Err(CoreError::ModuleAlreadyLoaded(name));
        }

        self.loaded.push(UnitRecord {
            name: name.clone(),
            module: Arc::clone(&module),
            free: factory.free.clone(),
        });
        debug!(unit = %name, "代码单元已加载");
        Ok(LoadedUnit { name, module })
    }
}

#[async_trait]
impl ModuleLibrary for StaticModuleLibrary {
    async fn load_from_unit(&mut self, path: &Path) -> Result<LoadedUnit> {
        let manifest = ManifestParser::parse_file(path).await?;
        let factory = self
            .factories
            .get(&manifest.entry)
            .cloned()
            .ok_or_else(|| CoreError::ModuleLoadFailed {
                module_id: path.display().to_string(),
                reason: format!("未注册的入口 '{}'", manifest.entry),
            })?;

        self.admit(manifest.name, &factory)
    }

    fn load_from_factory(&mut self, factory: ModuleFactory) -> Result<LoadedUnit> {
        self.admit(None, &factory)
    }

    fn unload(&mut self, name: &str) -> Result<()> {
        let position = self
            .loaded
            .iter()
            .position(|u| u.name == name)
            .ok_or_else(|| CoreError::ModuleNotFound(name.to_string()))?;
        self.loaded.remove(position).release();
        Ok(())
    }

    fn get_loaded(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.loaded
            .iter()
            .find(|u| u.name == name)
            .map(|u| Arc::clone(&u.module))
    }

    fn unload_all(&mut self) -> usize {
        let count = self.loaded.len();
        while let Some(unit) = self.loaded.pop() {
            unit.release();
        }
        if count > 0 {
            info!(count, "已释放全部代码单元");
        }
        count
    }

    fn loaded_names(&self) -> Vec<String> {
        self.loaded.iter().map(|u| u.name.clone()).collect()
    }
}
