//! 模块清单解析器
//!
//! 代码单元以 YAML 清单描述：`entry` 指向模块库中注册的工厂，`name` 可选地覆盖单元名称。
//!
//! ```yaml
//! entry: cache
//! name: cache-primary
//! description: 主缓存
//! ```
//!
//! 目录扫描收集两类清单：目录下直接存放的 `*.yaml` / `*.yml` 文件，以及直接子目录中的
//! `module.yaml`。结果按路径排序。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::utils::{CoreError, Result};

/// 子目录形式的模块清单文件名
pub const MODULE_MANIFEST_FILENAME: &str = "module.yaml";

/// 模块清单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// 工厂入口名称
    pub entry: String,

    /// 单元名称（缺省时使用模块自报的名称）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// 描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// 模块清单解析器
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestParser;

impl ManifestParser {
    /// 从文件解析清单
    ///
    /// # Errors
    ///
    /// - 文件无法读取时返回 IO 错误
    /// - 内容不是合法 YAML 时返回 YAML 错误
    /// - 字段校验失败时返回 `ModuleLoadFailed`
    pub async fn parse_file(path: &Path) -> Result<ModuleManifest> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_string(&content).map_err(|e| match e {
            CoreError::ModuleLoadFailed { reason, .. } => CoreError::ModuleLoadFailed {
                module_id: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// 从字符串解析清单
    pub fn parse_string(content: &str) -> Result<ModuleManifest> {
        let manifest: ModuleManifest = serde_yaml::from_str(content)?;
        Self::validate(&manifest)?;
        Ok(manifest)
    }

    /// 校验清单字段
    pub fn validate(manifest: &ModuleManifest) -> Result<()> {
        let mut errors: Vec<&str> = Vec::new();

        if manifest.entry.trim().is_empty() {
            errors.push("入口名称不能为空");
        }
        if manifest.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            errors.push("单元名称不能为空字符串");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ModuleLoadFailed {
                module_id: manifest.entry.clone(),
                reason: errors.join("; "),
            })
        }
    }

    /// 扫描目录收集清单路径
    ///
    /// # Errors
    ///
    /// 任一目录不存在或无法读取时返回 IO 错误
    pub async fn scan_dirs(dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut manifests = Vec::new();

        for dir in dirs {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    let manifest = path.join(MODULE_MANIFEST_FILENAME);
                    if tokio::fs::try_exists(&manifest).await? {
                        manifests.push(manifest);
                    } else {
                        trace!(path = %path.display(), "子目录中没有 module.yaml，跳过");
                    }
                } else if is_manifest_file(&path) {
                    manifests.push(path);
                }
            }
        }

        manifests.sort();
        debug!(count = manifests.len(), "扫描到模块清单");
        Ok(manifests)
    }
}

fn is_manifest_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}
