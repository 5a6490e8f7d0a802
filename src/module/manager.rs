//! 模块管理器
//!
//! 组合模块库与注册表，实现整批加载和级联卸载。
//!
//! 批量加载是一个事务：新初始化的模块先累积在本地列表中，全部成功后才并入注册表；
//! 任何一步失败都会逆序清理已初始化的模块并释放本批次加载的全部代码单元，
//! 调用前已激活的模块不受影响。

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::core::context::KernelContext;
use crate::module::dependency::DependencyResolver;
use crate::module::instance::{KernelModule, LoadedModule};
use crate::module::loader::{LoadedUnit, ModuleLibrary, ModuleSource};
use crate::module::metadata::ModuleDescriptor;
use crate::module::registry::ModuleRegistry;
use crate::module::validator::DescriptorValidator;
use crate::utils::{CoreError, Result};

/// 已校验、等待初始化的依赖跟踪模块
struct Candidate {
    descriptor: ModuleDescriptor,
    module: Arc<dyn KernelModule>,
    unit: String,
}

impl AsRef<ModuleDescriptor> for Candidate {
    fn as_ref(&self) -> &ModuleDescriptor {
        &self.descriptor
    }
}

/// 模块管理器
pub struct ModuleManager {
    registry: ModuleRegistry,
    library: Box<dyn ModuleLibrary>,
}

impl ModuleManager {
    /// 以模块库创建管理器
    pub fn new(library: Box<dyn ModuleLibrary>) -> Self {
        Self {
            registry: ModuleRegistry::new(),
            library,
        }
    }

    /// 注册表
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// 模块库中已加载的全部代码单元名称
    pub fn loaded_units(&self) -> Vec<String> {
        self.library.loaded_names()
    }

    /// 以注册表快照构造模块可见视图
    pub fn view(&self, base: &KernelContext) -> KernelContext {
        base.clone().with_modules(self.registry.snapshot())
    }

    /// 整批加载模块
    ///
    /// 返回本批次新激活的依赖跟踪模块（初始化顺序）。
    ///
    /// # Errors
    ///
    /// - 代码单元加载失败时返回模块库的错误
    /// - 描述校验失败时返回 `InvalidDescriptor`（包含整批全部问题）
    /// - 依赖无法满足时返回 `UnmetDependencies`
    /// - 模块初始化失败时返回 `ModuleInitFailed`
    ///
    /// 任一错误发生时注册表和模块库都恢复到调用前的状态。
    #[instrument(skip_all, fields(batch_size = sources.len()))]
    pub async fn load_batch(
        &mut self,
        sources: Vec<ModuleSource>,
        base: &KernelContext,
    ) -> Result<Vec<Arc<LoadedModule>>> {
        // 1. 加载代码单元
        let mut units: Vec<LoadedUnit> = Vec::with_capacity(sources.len());
        for source in sources {
            let loaded = match source {
                ModuleSource::Unit(path) => self.library.load_from_unit(&path).await,
                ModuleSource::Factory(factory) => self.library.load_from_factory(factory),
            };
            match loaded {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    error!(error = %e, "代码单元加载失败，释放本批次已加载的单元");
                    self.release_units(&units);
                    return Err(e);
                }
            }
        }

        // 2. 区分依赖跟踪模块与不透明单元
        let mut tracked: Vec<(String, Arc<dyn KernelModule>)> = Vec::new();
        let mut opaque = 0usize;
        for unit in &units {
            match Arc::clone(&unit.module).as_kernel_module() {
                Some(module) => tracked.push((unit.name.clone(), module)),
                None => opaque += 1,
            }
        }
        debug!(tracked = tracked.len(), opaque, "代码单元分类完成");

        // 3. 校验全部描述
        let infos: Vec<_> = tracked
            .iter()
            .map(|(unit, module)| (unit.clone(), module.dependency_info()))
            .collect();
        let descriptors = match DescriptorValidator::parse_batch(
            infos.iter().map(|(unit, info)| (unit.clone(), info)),
        ) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                error!(error = %e, "模块描述校验失败");
                self.release_units(&units);
                return Err(e);
            }
        };

        // 4. 解析依赖顺序
        let candidates: Vec<Candidate> = descriptors
            .into_iter()
            .zip(tracked)
            .map(|(descriptor, (unit, module))| Candidate {
                descriptor,
                module,
                unit,
            })
            .collect();
        let ordered =
            match DependencyResolver::resolve(candidates, &self.registry.active_descriptors()) {
                Ok(ordered) => ordered,
                Err(e) => {
                    error!(error = %e, "依赖解析失败");
                    self.release_units(&units);
                    return Err(e);
                }
            };

        // 5. 按顺序初始化，失败时回滚本批次
        let mut view = self.view(base);
        let mut added: Vec<Arc<LoadedModule>> = Vec::with_capacity(ordered.len());

        for candidate in ordered {
            let span = crate::module_span!(
                "initialize",
                candidate.descriptor.name,
                candidate.descriptor.version
            );
            let initialized = candidate.module.initialize(&view).instrument(span).await;
            match initialized {
                Ok(()) => {
                    let loaded = Arc::new(LoadedModule::new(
                        candidate.descriptor,
                        candidate.module,
                        candidate.unit,
                    ));
                    view.push_module(Arc::clone(&loaded));
                    added.push(loaded);
                }
                Err(e) => {
                    error!(
                        module = %candidate.descriptor.name,
                        version = %candidate.descriptor.version,
                        error = %e,
                        "模块初始化失败，回滚本批次"
                    );
                    Self::cleanup_reverse(&added, &view).await;
                    self.release_units(&units);
                    return Err(CoreError::ModuleInitFailed {
                        descriptor: candidate.descriptor,
                        source: Box::new(e),
                    });
                }
            }
        }

        // 6. 提交
        if let Err(e) = self.registry.extend(added.clone()) {
            error!(error = %e, "注册表拒绝本批次，回滚");
            Self::cleanup_reverse(&added, &view).await;
            self.release_units(&units);
            return Err(e);
        }

        info!(
            activated = added.len(),
            opaque,
            total = self.registry.len(),
            "模块批次加载完成"
        );
        Ok(added)
    }

    /// 卸载模块，返回实际卸载的名称（依赖跟踪模块按卸载执行顺序）
    ///
    /// 依赖跟踪模块会级联卸载失去依赖的模块；不透明单元直接释放。
    /// 名称既可以是模块名称，也可以是代码单元名称。
    ///
    /// # Errors
    ///
    /// 名称不对应任何模块或代码单元时返回 `ModuleNotFound`，不产生任何副作用
    #[instrument(skip(self, base))]
    pub async fn unload(&mut self, name: &str, base: &KernelContext) -> Result<Vec<String>> {
        let target = self
            .registry
            .iter()
            .find(|m| m.name() == name || m.unit == name)
            .map(|m| m.name().to_string());

        if let Some(target) = target {
            let plan = self.registry.plan_unload(&target)?;
            let view = self.view(base);

            Self::cleanup_reverse(&plan.unload, &view).await;
            for module in plan.unload.iter().rev() {
                self.release_unit(&module.unit);
            }
            self.registry.apply(&plan);

            let mut names = plan.unload_names();
            names.reverse();
            info!(target = %target, unloaded = ?names, "模块已卸载");
            return Ok(names);
        }

        if self.library.get_loaded(name).is_some() {
            self.library.unload(name)?;
            info!(unit = %name, "不透明代码单元已卸载");
            return Ok(vec![name.to_string()]);
        }

        Err(CoreError::ModuleNotFound(name.to_string()))
    }

    /// 卸载全部模块：依赖跟踪模块逆序清理并释放，随后释放剩余的不透明单元
    ///
    /// 返回卸载的依赖跟踪模块名称（卸载执行顺序）。
    pub async fn unload_all(&mut self, base: &KernelContext) -> Vec<String> {
        let view = self.view(base);
        let modules = self.registry.take_all();

        Self::cleanup_reverse(&modules, &view).await;
        for module in modules.iter().rev() {
            self.release_unit(&module.unit);
        }
        let opaque = self.library.unload_all();

        let names: Vec<String> = modules.iter().rev().map(|m| m.name().to_string()).collect();
        if !names.is_empty() || opaque > 0 {
            info!(tracked = names.len(), opaque, "全部模块已卸载");
        }
        names
    }

    /// 不执行清理直接释放全部代码单元（内核析构时使用）
    pub fn abandon_all(&mut self) -> usize {
        let abandoned = self.registry.take_all().len();
        if abandoned > 0 {
            warn!(count = abandoned, "依赖跟踪模块未经清理即被释放");
        }
        self.library.unload_all()
    }

    async fn cleanup_reverse(modules: &[Arc<LoadedModule>], view: &KernelContext) {
        for module in modules.iter().rev() {
            let span = crate::module_span!("cleanup", module.name(), module.descriptor.version);
            module.module.cleanup(view).instrument(span).await;
        }
    }

    fn release_unit(&mut self, unit: &str) {
        if let Err(e) = self.library.unload(unit) {
            warn!(unit = %unit, error = %e, "释放代码单元失败");
        }
    }

    fn release_units(&mut self, units: &[LoadedUnit]) {
        for unit in units.iter().rev() {
            self.release_unit(&unit.name);
        }
    }
}
