//! ID 生成工具
//!
//! 事件 ID 与订阅 ID 均使用 UUID v4。

/// 生成 UUID v4 格式的 ID
///
/// 用于事件 ID、订阅 ID 等需要全局唯一性的场景
pub fn generate_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 检查字符串是否为合法的 UUID
pub fn is_valid_uuid(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_uuid() {
        let uuid = generate_uuid();
        assert_eq!(uuid.len(), 36); // UUID v4 格式长度
        assert!(is_valid_uuid(&uuid));
    }

    #[test]
    fn test_generate_uuid_uniqueness() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_uuid()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_is_valid_uuid_rejects_garbage() {
        assert!(!is_valid_uuid(""));
        assert!(!is_valid_uuid("not-a-uuid"));
    }
}
