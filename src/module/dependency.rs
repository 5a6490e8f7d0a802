//! 模块依赖解析
//!
//! 采用不动点（边缘扩展）算法：依赖是否满足取决于一个不断增长的“已满足”集合，
//! 而不是静态的边表。
//!
//! 1. `satisfied := active`，`remaining := pending`
//! 2. 扫描 `remaining`，依赖全部满足的模块移入结果并加入 `satisfied`
//! 3. 直到某一轮扫描没有任何进展
//! 4. 仍有剩余则失败，并对每个剩余模块单独诊断未满足的依赖项
//!
//! 循环依赖和缺失依赖都表现为“依赖始终无法满足”，不做区分。

use tracing::{debug, warn};

use crate::module::metadata::{DependencySpec, ModuleDescriptor};
use crate::utils::{CoreError, Result};

/// 单个模块的未满足依赖报告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetDependency {
    /// 无法放置的模块
    pub descriptor: ModuleDescriptor,
    /// 最终仍未满足的依赖项（按声明顺序）
    pub unmet: Vec<DependencySpec>,
}

impl std::fmt::Display for UnmetDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unmet: Vec<String> = self.unmet.iter().map(|d| d.to_string()).collect();
        write!(
            f,
            "{} v{} 缺少 [{}]",
            self.descriptor.name,
            self.descriptor.version,
            unmet.join(", ")
        )
    }
}

/// 依赖解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// 计算待加载模块的初始化顺序
    ///
    /// 泛型参数允许调用方携带模块实例一起排序，返回的顺序中每个元素的依赖
    /// 都已由 `active` 或其之前的元素满足。同一轮中可放置的模块保持 `pending` 中的相对顺序。
    ///
    /// # Arguments
    ///
    /// * `pending` - 待解析的模块
    /// * `active` - 已激活模块的描述
    ///
    /// # Errors
    ///
    /// 有模块无法放置时返回 `CoreError::UnmetDependencies`，列出每个模块的全部未满足依赖
    pub fn resolve<T>(pending: Vec<T>, active: &[ModuleDescriptor]) -> Result<Vec<T>>
    where
        T: AsRef<ModuleDescriptor>,
    {
        let mut satisfied: Vec<ModuleDescriptor> = active.to_vec();
        let mut remaining = pending;
        let mut ordered = Vec::with_capacity(remaining.len());
        let mut pass = 0usize;

        loop {
            pass += 1;
            let mut progressed = false;
            let mut index = 0;

            while index < remaining.len() {
                if remaining[index].as_ref().dependencies_met(&satisfied) {
                    let item = remaining.remove(index);
                    satisfied.push(item.as_ref().clone());
                    ordered.push(item);
                    progressed = true;
                } else {
                    index += 1;
                }
            }

            debug!(
                pass,
                ordered = ordered.len(),
                remaining = remaining.len(),
                "依赖解析轮次完成"
            );

            if !progressed || remaining.is_empty() {
                break;
            }
        }

        if remaining.is_empty() {
            return Ok(ordered);
        }

        let modules = Self::diagnose(&remaining, &satisfied);
        warn!(unresolved = modules.len(), "存在无法满足依赖的模块");
        Err(CoreError::UnmetDependencies { modules })
    }

    /// 诊断剩余模块在最终已满足集合下的未满足依赖（不修改任何状态）
    pub fn diagnose<T>(remaining: &[T], satisfied: &[ModuleDescriptor]) -> Vec<UnmetDependency>
    where
        T: AsRef<ModuleDescriptor>,
    {
        remaining
            .iter()
            .map(|item| {
                let descriptor = item.as_ref();
                UnmetDependency {
                    descriptor: descriptor.clone(),
                    unmet: descriptor.unmet_dependencies(satisfied),
                }
            })
            .collect()
    }

    /// 检查一个顺序是否满足“依赖先于依赖者”
    pub fn verify_order<T>(order: &[T], active: &[ModuleDescriptor]) -> bool
    where
        T: AsRef<ModuleDescriptor>,
    {
        let mut seen: Vec<&ModuleDescriptor> = active.iter().collect();
        for item in order {
            let descriptor = item.as_ref();
            if !descriptor.dependencies_met(seen.iter().copied()) {
                return false;
            }
            seen.push(descriptor);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn module(name: &str, module_type: &str) -> ModuleDescriptor {
        ModuleDescriptor::new(name, "1.0", module_type)
    }

    fn names(order: &[ModuleDescriptor]) -> Vec<&str> {
        order.iter().map(|d| d.name.as_str()).collect()
    }

    fn position(order: &[ModuleDescriptor], name: &str) -> usize {
        order.iter().position(|d| d.name == name).unwrap()
    }

    // ==================== 顺序测试 ====================

    #[test]
    fn test_resolve_chain_in_reverse_input_order() {
        let pending = vec![
            module("c", "app").depends_on("b"),
            module("b", "svc").depends_on("a"),
            module("a", "base"),
        ];

        let order = DependencyResolver::resolve(pending, &[]).unwrap();
        assert_eq!(names(&order), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_resolve_diamond() {
        let pending = vec![
            module("top", "app").depends_on("left").depends_on("right"),
            module("left", "svc").depends_on("base"),
            module("right", "svc").depends_on("base"),
            module("base", "core"),
        ];

        let order = DependencyResolver::resolve(pending, &[]).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "base") < position(&order, "left"));
        assert!(position(&order, "base") < position(&order, "right"));
        assert!(position(&order, "left") < position(&order, "top"));
        assert!(position(&order, "right") < position(&order, "top"));
        assert!(DependencyResolver::verify_order(&order, &[]));
    }

    #[test]
    fn test_resolve_against_active_set() {
        let active = vec![module("db", "storage")];
        let pending = vec![module("web", "service").depends_on_type("storage")];

        let order = DependencyResolver::resolve(pending, &active).unwrap();
        assert_eq!(names(&order), vec!["web"]);
        assert!(DependencyResolver::verify_order(&order, &active));
    }

    #[test]
    fn test_independent_modules_keep_pending_order() {
        let pending = vec![module("x", "t"), module("y", "t"), module("z", "t")];
        let order = DependencyResolver::resolve(pending, &[]).unwrap();
        assert_eq!(names(&order), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_mixed_named_and_typed_scenario() {
        let pending = vec![
            module("c", "app").depends_on_version("a", "1.0"),
            module("b", "app").depends_on_type("svc"),
            module("a", "svc"),
        ];

        let order = DependencyResolver::resolve(pending, &[]).unwrap();
        assert_eq!(position(&order, "a"), 0);
        assert!(DependencyResolver::verify_order(&order, &[]));
    }

    #[test]
    fn test_empty_pending() {
        let order = DependencyResolver::resolve(Vec::<ModuleDescriptor>::new(), &[]).unwrap();
        assert!(order.is_empty());
    }

    // ==================== 失败诊断测试 ====================

    #[test]
    fn test_missing_type_provider() {
        let pending = vec![module("a", "app").depends_on_type("T")];

        let err = DependencyResolver::resolve(pending, &[]).unwrap_err();
        match err {
            CoreError::UnmetDependencies { modules } => {
                assert_eq!(modules.len(), 1);
                assert_eq!(modules[0].descriptor.name, "a");
                assert_eq!(modules[0].unmet, vec![DependencySpec::typed("T")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_version_mismatch_is_unmet() {
        let active = vec![ModuleDescriptor::new("a", "2.0", "svc")];
        let pending = vec![module("b", "app").depends_on_version("a", "1.0")];

        let err = DependencyResolver::resolve(pending, &active).unwrap_err();
        assert!(matches!(err, CoreError::UnmetDependencies { .. }));
    }

    #[test]
    fn test_cycle_reported_as_unmet() {
        let pending = vec![
            module("a", "t").depends_on("b"),
            module("b", "t").depends_on("a"),
            module("free", "t"),
        ];

        let err = DependencyResolver::resolve(pending, &[]).unwrap_err();
        match err {
            CoreError::UnmetDependencies { modules } => {
                let unresolved: Vec<&str> =
                    modules.iter().map(|m| m.descriptor.name.as_str()).collect();
                assert_eq!(unresolved, vec!["a", "b"]);
                assert_eq!(modules[0].unmet, vec![DependencySpec::named("b")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_dependency_reported_as_unmet() {
        let pending = vec![module("me", "t").depends_on("me")];
        assert!(DependencyResolver::resolve(pending, &[]).is_err());
    }

    #[test]
    fn test_diagnose_lists_only_final_unmet_entries() {
        // b 可以被满足，c 依赖 b 和缺失的 d：报告中 c 只列出 d
        let pending = vec![
            module("c", "app").depends_on("b").depends_on("d"),
            module("b", "svc"),
        ];

        let err = DependencyResolver::resolve(pending, &[]).unwrap_err();
        match err {
            CoreError::UnmetDependencies { modules } => {
                assert_eq!(modules.len(), 1);
                assert_eq!(modules[0].unmet, vec![DependencySpec::named("d")]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // ==================== 随机生成的无环图 ====================

    /// 分层随机图：每个模块只依赖更早层的模块（按名称、精确版本或类型）
    fn random_layered(rng: &mut StdRng) -> Vec<ModuleDescriptor> {
        let layers = rng.gen_range(2..8);
        let mut built: Vec<ModuleDescriptor> = Vec::new();

        for layer in 0..layers {
            let width = rng.gen_range(1..6);
            let mut current = Vec::with_capacity(width);
            for i in 0..width {
                let mut d = ModuleDescriptor::new(
                    format!("m{}_{}", layer, i),
                    format!("{}.0", rng.gen_range(1..3)),
                    format!("t{}", layer),
                );
                if !built.is_empty() {
                    for _ in 0..rng.gen_range(0..4) {
                        let Some(target) = built.choose(rng) else { break };
                        d = if rng.gen_bool(0.3) {
                            d.depends_on_version(target.name.clone(), target.version.clone())
                        } else {
                            d.depends_on(target.name.clone())
                        };
                    }
                    if rng.gen_bool(0.5) {
                        let earlier = rng.gen_range(0..layer);
                        d = d.depends_on_type(format!("t{}", earlier));
                    }
                }
                current.push(d);
            }
            built.extend(current);
        }
        built
    }

    #[test]
    fn test_random_acyclic_graphs_resolve_in_any_input_order() {
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut all = random_layered(&mut rng);

            // 部分前缀作为已激活模块
            let active_len = if rng.gen_bool(0.3) { rng.gen_range(0..all.len()) } else { 0 };
            let mut pending = all.split_off(active_len);
            let active = all;
            pending.shuffle(&mut rng);

            let order = DependencyResolver::resolve(pending.clone(), &active)
                .unwrap_or_else(|e| panic!("seed {seed}: {e}"));
            assert_eq!(order.len(), pending.len(), "seed {seed}");
            assert!(
                DependencyResolver::verify_order(&order, &active),
                "seed {seed}: {:?}",
                names(&order)
            );

            let mut expected = names(&pending);
            let mut actual = names(&order);
            expected.sort_unstable();
            actual.sort_unstable();
            assert_eq!(actual, expected, "seed {seed}");
        }
    }

    #[test]
    fn test_random_graphs_with_missing_provider_fail_whole_batch() {
        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut pending = random_layered(&mut rng);
            let broken = rng.gen_range(0..pending.len());
            pending[broken] = pending[broken].clone().depends_on("absent");
            let broken_name = pending[broken].name.clone();
            pending.shuffle(&mut rng);

            match DependencyResolver::resolve(pending, &[]) {
                Err(CoreError::UnmetDependencies { modules }) => {
                    assert!(
                        modules.iter().any(|m| m.descriptor.name == broken_name),
                        "seed {seed}"
                    );
                }
                other => panic!("seed {seed}: unexpected {:?}", other.map(|o| o.len())),
            }
        }
    }

    #[test]
    fn test_verify_order_detects_violation() {
        let order = vec![module("b", "svc").depends_on("a"), module("a", "base")];
        assert!(!DependencyResolver::verify_order(&order, &[]));
    }

    #[test]
    fn test_unmet_display() {
        let report = UnmetDependency {
            descriptor: module("web", "service"),
            unmet: vec![DependencySpec::typed("db"), DependencySpec::named("auth")],
        };
        assert_eq!(report.to_string(), "web v1.0 缺少 [type:db, auth]");
    }
}
