//! 模块注册表
//!
//! 按激活顺序保存依赖跟踪模块。注册表顺序本身就是依赖顺序：
//! 位置 i 处模块的每个依赖都由位置小于 i 的某个模块满足。
//! 该不变式在追加时检查，级联卸载依靠它只需从目标位置向后扫描。

use std::sync::Arc;

use tracing::debug;

use crate::module::dependency::UnmetDependency;
use crate::module::instance::LoadedModule;
use crate::module::metadata::ModuleDescriptor;
use crate::utils::{CoreError, Result};

/// 卸载计划
#[derive(Debug, Clone, Default)]
pub struct UnloadPlan {
    /// 卸载后保留的模块（仍为依赖顺序）
    pub keep: Vec<Arc<LoadedModule>>,
    /// 需要卸载的模块（按注册表顺序，实际卸载时逆序执行）
    pub unload: Vec<Arc<LoadedModule>>,
}

impl UnloadPlan {
    /// 需要卸载的模块名称
    pub fn unload_names(&self) -> Vec<String> {
        self.unload.iter().map(|m| m.name().to_string()).collect()
    }
}

/// 级联卸载计算器
#[derive(Debug, Clone, Copy, Default)]
pub struct UnloadCascader;

impl UnloadCascader {
    /// 计算卸载目标模块时必须一并卸载的模块
    ///
    /// 目标之前的模块不受影响；目标之后的每个模块按同样的名称/类型匹配规则
    /// 针对当前保留集合重新检查，仍满足则保留，否则一并卸载。
    /// 同类型还有其他提供者时，依赖该类型的模块不会被卸载。
    ///
    /// # Errors
    ///
    /// 目标不在注册表中时返回 `CoreError::ModuleNotFound`，不产生任何副作用
    pub fn compute_unload_set(modules: &[Arc<LoadedModule>], target: &str) -> Result<UnloadPlan> {
        let position = modules
            .iter()
            .position(|m| m.name() == target)
            .ok_or_else(|| CoreError::ModuleNotFound(target.to_string()))?;

        let mut keep: Vec<Arc<LoadedModule>> = modules[..position].to_vec();
        let mut unload = vec![Arc::clone(&modules[position])];

        for module in &modules[position + 1..] {
            let still_met = module
                .descriptor
                .dependencies_met(keep.iter().map(|k| &k.descriptor));

            if still_met {
                keep.push(Arc::clone(module));
            } else {
                debug!(module = %module.name(), target = %target, "依赖随目标一并失效，级联卸载");
                unload.push(Arc::clone(module));
            }
        }

        Ok(UnloadPlan { keep, unload })
    }
}

/// 模块注册表
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: Vec<Arc<LoadedModule>>,
}

impl ModuleRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加已初始化的模块
    ///
    /// # Errors
    ///
    /// 模块依赖未被已注册模块满足、或同名模块已注册时返回错误，注册表保持不变
    pub fn append(&mut self, module: Arc<LoadedModule>) -> Result<()> {
        if self.find(module.name()).is_some() {
            return Err(CoreError::ModuleAlreadyLoaded(module.name().to_string()));
        }

        let unmet = module
            .descriptor
            .unmet_dependencies(self.modules.iter().map(|m| &m.descriptor));
        if !unmet.is_empty() {
            return Err(CoreError::UnmetDependencies {
                modules: vec![UnmetDependency {
                    descriptor: module.descriptor.clone(),
                    unmet,
                }],
            });
        }

        self.modules.push(module);
        Ok(())
    }

    /// 按顺序追加一批模块，任一失败则整批不追加
    pub fn extend(&mut self, batch: Vec<Arc<LoadedModule>>) -> Result<()> {
        let mut staged = self.clone();
        for module in batch {
            staged.append(module)?;
        }
        *self = staged;
        Ok(())
    }

    /// 查找模块位置
    pub fn find(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name() == name)
    }

    /// 按名称获取模块
    pub fn get(&self, name: &str) -> Option<&Arc<LoadedModule>> {
        self.modules.iter().find(|m| m.name() == name)
    }

    /// 按依赖顺序迭代
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<LoadedModule>> {
        self.modules.iter()
    }

    /// 已注册模块数量
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// 已激活模块的描述快照
    pub fn active_descriptors(&self) -> Vec<ModuleDescriptor> {
        self.modules.iter().map(|m| m.descriptor.clone()).collect()
    }

    /// 已激活模块快照
    pub fn snapshot(&self) -> Vec<Arc<LoadedModule>> {
        self.modules.clone()
    }

    /// 计算卸载计划
    pub fn plan_unload(&self, target: &str) -> Result<UnloadPlan> {
        UnloadCascader::compute_unload_set(&self.modules, target)
    }

    /// 用计划中的保留集合替换注册表
    pub fn apply(&mut self, plan: &UnloadPlan) {
        self.modules = plan.keep.clone();
    }

    /// 取出全部模块并清空注册表
    pub fn take_all(&mut self) -> Vec<Arc<LoadedModule>> {
        std::mem::take(&mut self.modules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::KernelContext;
    use crate::module::instance::{KernelModule, Module, ModuleApi};
    use crate::module::metadata::ModuleId;
    use async_trait::async_trait;
    use serde_json::Value;

    struct StubModule(ModuleDescriptor);

    impl Module for StubModule {
        fn id(&self) -> ModuleId {
            self.0.id()
        }
    }

    #[async_trait]
    impl KernelModule for StubModule {
        fn dependency_info(&self) -> Value {
            self.0.to_value()
        }

        async fn initialize(&self, _ctx: &KernelContext) -> Result<()> {
            Ok(())
        }

        async fn cleanup(&self, _ctx: &KernelContext) {}

        fn api(&self, _ctx: &KernelContext) -> Option<ModuleApi> {
            None
        }
    }

    fn loaded(descriptor: ModuleDescriptor) -> Arc<LoadedModule> {
        let unit = descriptor.name.clone();
        let module = Arc::new(StubModule(descriptor.clone()));
        Arc::new(LoadedModule::new(descriptor, module, unit))
    }

    fn registry_of(descriptors: Vec<ModuleDescriptor>) -> ModuleRegistry {
        let mut registry = ModuleRegistry::new();
        for d in descriptors {
            registry.append(loaded(d)).unwrap();
        }
        registry
    }

    fn names(modules: &[Arc<LoadedModule>]) -> Vec<&str> {
        modules.iter().map(|m| m.name()).collect()
    }

    // ==================== 追加测试 ====================

    #[test]
    fn test_append_enforces_order_invariant() {
        let mut registry = registry_of(vec![ModuleDescriptor::new("a", "1.0", "base")]);

        let err = registry
            .append(loaded(ModuleDescriptor::new("c", "1.0", "app").depends_on("b")))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnmetDependencies { .. }));
        assert_eq!(registry.len(), 1);

        registry
            .append(loaded(ModuleDescriptor::new("b", "1.0", "svc").depends_on("a")))
            .unwrap();
        assert_eq!(registry.find("b"), Some(1));
    }

    #[test]
    fn test_append_rejects_duplicate_name() {
        let mut registry = registry_of(vec![ModuleDescriptor::new("a", "1.0", "base")]);
        let err = registry
            .append(loaded(ModuleDescriptor::new("a", "2.0", "base")))
            .unwrap_err();
        assert!(matches!(err, CoreError::ModuleAlreadyLoaded(_)));
    }

    #[test]
    fn test_extend_is_all_or_nothing() {
        let mut registry = registry_of(vec![ModuleDescriptor::new("a", "1.0", "base")]);
        let batch = vec![
            loaded(ModuleDescriptor::new("b", "1.0", "svc").depends_on("a")),
            loaded(ModuleDescriptor::new("c", "1.0", "app").depends_on("missing")),
        ];

        assert!(registry.extend(batch).is_err());
        assert_eq!(names(&registry.snapshot()), vec!["a"]);
    }

    // ==================== 级联卸载测试 ====================

    #[test]
    fn test_cascade_keeps_dependent_with_other_type_provider() {
        let registry = registry_of(vec![
            ModuleDescriptor::new("x", "1.0", "T"),
            ModuleDescriptor::new("y", "1.0", "T"),
            ModuleDescriptor::new("z", "1.0", "app").depends_on_type("T"),
        ]);

        let plan = registry.plan_unload("x").unwrap();
        assert_eq!(names(&plan.unload), vec!["x"]);
        assert_eq!(names(&plan.keep), vec!["y", "z"]);
    }

    #[test]
    fn test_cascade_removes_broken_dependent() {
        let registry = registry_of(vec![
            ModuleDescriptor::new("x", "1.0", "T"),
            ModuleDescriptor::new("z", "1.0", "app").depends_on_type("T"),
        ]);

        let plan = registry.plan_unload("x").unwrap();
        assert_eq!(names(&plan.unload), vec!["x", "z"]);
        assert!(plan.keep.is_empty());
    }

    #[test]
    fn test_cascade_is_transitive() {
        let registry = registry_of(vec![
            ModuleDescriptor::new("base", "1.0", "core"),
            ModuleDescriptor::new("a", "1.0", "svc").depends_on("base"),
            ModuleDescriptor::new("other", "1.0", "misc"),
            ModuleDescriptor::new("b", "1.0", "app").depends_on("a"),
        ]);

        let plan = registry.plan_unload("a").unwrap();
        assert_eq!(names(&plan.keep), vec!["base", "other"]);
        assert_eq!(plan.unload_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_cascade_leaves_earlier_modules() {
        let registry = registry_of(vec![
            ModuleDescriptor::new("a", "1.0", "base"),
            ModuleDescriptor::new("b", "1.0", "svc").depends_on("a"),
        ]);

        let plan = registry.plan_unload("b").unwrap();
        assert_eq!(names(&plan.keep), vec!["a"]);
        assert_eq!(names(&plan.unload), vec!["b"]);
    }

    #[test]
    fn test_unload_missing_module_is_noop() {
        let registry = registry_of(vec![
            ModuleDescriptor::new("a", "1.0", "base"),
            ModuleDescriptor::new("b", "1.0", "svc").depends_on("a"),
        ]);
        let before = registry.active_descriptors();

        let err = registry.plan_unload("ghost").unwrap_err();
        assert!(matches!(err, CoreError::ModuleNotFound(ref name) if name == "ghost"));
        assert_eq!(registry.active_descriptors(), before);
    }

    #[test]
    fn test_apply_and_take_all() {
        let mut registry = registry_of(vec![
            ModuleDescriptor::new("x", "1.0", "T"),
            ModuleDescriptor::new("z", "1.0", "app").depends_on_type("T"),
        ]);

        let plan = registry.plan_unload("x").unwrap();
        registry.apply(&plan);
        assert!(registry.is_empty());

        let mut registry = registry_of(vec![ModuleDescriptor::new("a", "1.0", "base")]);
        let taken = registry.take_all();
        assert_eq!(taken.len(), 1);
        assert!(registry.is_empty());
    }
}
