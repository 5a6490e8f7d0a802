//! 模块管理模块
//!
//! 包含模块管理系统的核心组件：
//! - 模块描述与校验
//! - 依赖解析
//! - 注册表与级联卸载
//! - 模块库与清单解析
//! - 批量加载事务

pub mod dependency;
pub mod instance;
pub mod loader;
pub mod manager;
pub mod metadata;
pub mod parser;
pub mod registry;
pub mod validator;

// 重导出常用类型
pub use dependency::{DependencyResolver, UnmetDependency};
pub use instance::{KernelModule, LoadedModule, Module, ModuleApi};
pub use loader::{LoadedUnit, ModuleFactory, ModuleLibrary, ModuleSource, StaticModuleLibrary};
pub use manager::ModuleManager;
pub use metadata::{DependencySpec, ModuleDescriptor, ModuleId};
pub use parser::{ManifestParser, ModuleManifest};
pub use registry::{ModuleRegistry, UnloadCascader, UnloadPlan};
pub use validator::{DescriptorFailure, DescriptorValidator, ValidationError, ValidationErrorCode};
