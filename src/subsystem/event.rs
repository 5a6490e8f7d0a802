//! 内核事件
//!
//! 事件控制器调度的事件结构，以及内核自身发出的生命周期事件类型。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::generate_uuid;

/// 内核作为事件发送方时使用的标识
pub const KERNEL_SENDER: &str = "kernel";

/// 内核生命周期事件类型
pub mod kernel_events {
    /// 内核启动完成
    pub const STARTED: &str = "kernel.started";
    /// 模块已加载
    pub const MODULE_LOADED: &str = "kernel.module.loaded";
    /// 模块已卸载
    pub const MODULE_UNLOADED: &str = "kernel.module.unloaded";
}

/// 事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// 事件唯一标识
    pub event_id: String,

    /// 事件类型（格式: category.name，如 kernel.started）
    pub event_type: String,

    /// 发送方
    pub sender: String,

    /// 事件数据
    #[serde(default)]
    pub data: Value,

    /// 事件时间戳
    pub timestamp: DateTime<Utc>,

    /// 扩展元数据
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl Event {
    /// 创建新事件
    pub fn new(event_type: impl Into<String>, sender: impl Into<String>, data: Value) -> Self {
        Self {
            event_id: generate_uuid(),
            event_type: event_type.into(),
            sender: sender.into(),
            data,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// 创建由内核发出的事件
    pub fn kernel(event_type: impl Into<String>, data: Value) -> Self {
        Self::new(event_type, KERNEL_SENDER, data)
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// 事件类型是否匹配订阅模式
    ///
    /// 支持 `*`（全部）和 `prefix.*`（前缀下的任意类型）。
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }

        if let Some(prefix) = pattern.strip_suffix(".*") {
            return self.event_type.len() > prefix.len() + 1
                && self.event_type.starts_with(prefix)
                && self.event_type.as_bytes()[prefix.len()] == b'.';
        }

        self.event_type == pattern
    }
}
