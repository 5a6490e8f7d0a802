//! 模块描述定义
//!
//! 模块自报的身份与依赖信息。描述以动态 JSON 对象的形式从模块取得，
//! 经 [`crate::module::validator`] 校验后转换为这里的强类型结构。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 已加载代码单元的标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    /// 模块名称
    pub name: String,
    /// 模块版本
    pub version: String,
}

impl ModuleId {
    /// 创建模块标识
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// 依赖声明
///
/// 两种形式互斥：按名称（可选精确版本）依赖某个模块，或依赖任意一个指定类型的模块。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// 依赖指定名称的模块
    Named {
        /// 模块名称
        name: String,
        /// 精确版本（可选）
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// 依赖任意一个指定类型的模块
    Typed {
        /// 模块类型
        #[serde(rename = "type")]
        module_type: String,
    },
}

impl DependencySpec {
    /// 按名称依赖，不限版本
    pub fn named(name: impl Into<String>) -> Self {
        DependencySpec::Named {
            name: name.into(),
            version: None,
        }
    }

    /// 按名称和精确版本依赖
    pub fn named_version(name: impl Into<String>, version: impl Into<String>) -> Self {
        DependencySpec::Named {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    /// 按类型依赖
    pub fn typed(module_type: impl Into<String>) -> Self {
        DependencySpec::Typed {
            module_type: module_type.into(),
        }
    }

    /// 检查单个模块是否满足此依赖
    pub fn is_met_by(&self, candidate: &ModuleDescriptor) -> bool {
        match self {
            DependencySpec::Named { name, version } => {
                candidate.name == *name
                    && version.as_ref().map_or(true, |v| candidate.version == *v)
            }
            DependencySpec::Typed { module_type } => candidate.module_type == *module_type,
        }
    }

    /// 检查一组模块中是否存在满足此依赖的模块
    pub fn is_satisfied_by<'a, I>(&self, satisfied: I) -> bool
    where
        I: IntoIterator<Item = &'a ModuleDescriptor>,
    {
        satisfied.into_iter().any(|m| self.is_met_by(m))
    }

    fn to_value(&self) -> Value {
        match self {
            DependencySpec::Named {
                name,
                version: Some(version),
            } => json!({ "name": name, "version": version }),
            DependencySpec::Named {
                name,
                version: None,
            } => json!({ "name": name }),
            DependencySpec::Typed { module_type } => json!({ "type": module_type }),
        }
    }
}

impl std::fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencySpec::Named {
                name,
                version: Some(version),
            } => write!(f, "{} v{}", name, version),
            DependencySpec::Named {
                name,
                version: None,
            } => write!(f, "{}", name),
            DependencySpec::Typed { module_type } => write!(f, "type:{}", module_type),
        }
    }
}

/// 模块描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// 模块名称
    pub name: String,

    /// 模块版本
    pub version: String,

    /// 能力类别，多个模块可以共享同一类型
    #[serde(rename = "type")]
    pub module_type: String,

    /// 依赖声明（有序）
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
}

impl ModuleDescriptor {
    /// 创建无依赖的模块描述
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        module_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            module_type: module_type.into(),
            dependencies: Vec::new(),
        }
    }

    /// 添加按名称的依赖
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(DependencySpec::named(name));
        self
    }

    /// 添加按名称和精确版本的依赖
    pub fn depends_on_version(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        self.dependencies
            .push(DependencySpec::named_version(name, version));
        self
    }

    /// 添加按类型的依赖
    pub fn depends_on_type(mut self, module_type: impl Into<String>) -> Self {
        self.dependencies.push(DependencySpec::typed(module_type));
        self
    }

    /// 模块标识
    pub fn id(&self) -> ModuleId {
        ModuleId::new(self.name.clone(), self.version.clone())
    }

    /// 转换为模块自报描述所用的动态对象
    pub fn to_value(&self) -> Value {
        let dependencies: Vec<Value> = self.dependencies.iter().map(|d| d.to_value()).collect();
        json!({
            "name": self.name,
            "version": self.version,
            "type": self.module_type,
            "dependencies": dependencies,
        })
    }

    /// 计算在给定集合下仍未满足的依赖（按声明顺序）
    pub fn unmet_dependencies<'a, I>(&self, satisfied: I) -> Vec<DependencySpec>
    where
        I: IntoIterator<Item = &'a ModuleDescriptor>,
        I::IntoIter: Clone,
    {
        let satisfied = satisfied.into_iter();
        self.dependencies
            .iter()
            .filter(|dep| !dep.is_satisfied_by(satisfied.clone()))
            .cloned()
            .collect()
    }

    /// 给定集合是否满足全部依赖（空依赖总是满足）
    pub fn dependencies_met<'a, I>(&self, satisfied: I) -> bool
    where
        I: IntoIterator<Item = &'a ModuleDescriptor>,
        I::IntoIter: Clone,
    {
        let satisfied = satisfied.into_iter();
        self.dependencies
            .iter()
            .all(|dep| dep.is_satisfied_by(satisfied.clone()))
    }
}

impl AsRef<ModuleDescriptor> for ModuleDescriptor {
    fn as_ref(&self) -> &ModuleDescriptor {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_dependency_matching() {
        let a = ModuleDescriptor::new("a", "1.0", "svc");

        assert!(DependencySpec::named("a").is_met_by(&a));
        assert!(DependencySpec::named_version("a", "1.0").is_met_by(&a));
        assert!(!DependencySpec::named_version("a", "2.0").is_met_by(&a));
        assert!(!DependencySpec::named("b").is_met_by(&a));
    }

    #[test]
    fn test_named_version_is_exact() {
        let a = ModuleDescriptor::new("a", "1.0.1", "svc");
        assert!(!DependencySpec::named_version("a", "1.0").is_met_by(&a));
    }

    #[test]
    fn test_typed_dependency_matching() {
        let x = ModuleDescriptor::new("x", "1.0", "storage");
        assert!(DependencySpec::typed("storage").is_met_by(&x));
        assert!(!DependencySpec::typed("svc").is_met_by(&x));
    }

    #[test]
    fn test_unmet_dependencies_in_order() {
        let active = vec![ModuleDescriptor::new("a", "1.0", "svc")];
        let d = ModuleDescriptor::new("d", "1.0", "app")
            .depends_on_type("db")
            .depends_on("a")
            .depends_on_version("a", "9.9");

        let unmet = d.unmet_dependencies(&active);
        assert_eq!(
            unmet,
            vec![
                DependencySpec::typed("db"),
                DependencySpec::named_version("a", "9.9"),
            ]
        );
        assert!(!d.dependencies_met(&active));
    }

    #[test]
    fn test_empty_dependencies_always_met() {
        let d = ModuleDescriptor::new("solo", "1.0", "app");
        assert!(d.dependencies_met(&Vec::<ModuleDescriptor>::new()));
    }

    #[test]
    fn test_to_value_shape() {
        let d = ModuleDescriptor::new("c", "1.0", "app")
            .depends_on_version("a", "1.0")
            .depends_on_type("svc");

        let value = d.to_value();
        assert_eq!(value["name"], "c");
        assert_eq!(value["type"], "app");
        assert_eq!(value["dependencies"][0], json!({"name": "a", "version": "1.0"}));
        assert_eq!(value["dependencies"][1], json!({"type": "svc"}));

        let parsed: ModuleDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn test_display() {
        assert_eq!(DependencySpec::named("a").to_string(), "a");
        assert_eq!(DependencySpec::named_version("a", "1.0").to_string(), "a v1.0");
        assert_eq!(DependencySpec::typed("svc").to_string(), "type:svc");
        assert_eq!(ModuleId::new("a", "1.0").to_string(), "a v1.0");
    }
}
