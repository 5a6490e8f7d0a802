//! 模块描述校验器
//!
//! 在模块参与依赖解析前检查其自报描述的结构：
//!
//! - `name`, `version`, `type` 为非空字符串
//! - `dependencies` 为数组
//! - 每个依赖项要么是 `{name, version?}`，要么是 `{type}`，二者恰好居其一
//!
//! 校验不会在第一个错误处停止，调用方一次即可看到全部结构问题。

use serde_json::{Map, Value};

use crate::module::metadata::ModuleDescriptor;
use crate::utils::{CoreError, Result};

/// 验证错误详情
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// 错误字段路径（如 `dependencies[1].name`）
    pub field: String,
    /// 错误消息
    pub message: String,
    /// 错误码
    pub code: ValidationErrorCode,
}

impl ValidationError {
    /// 创建新的验证错误
    pub fn new(
        field: impl Into<String>,
        message: impl Into<String>,
        code: ValidationErrorCode,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.field, self.message)
    }
}

/// 验证错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// 缺少必填字段
    MissingField,
    /// 字段为空
    EmptyField,
    /// 字段类型错误
    InvalidType,
    /// 依赖项不符合任何一种形式
    InvalidFormat,
    /// 依赖项同时符合两种形式
    AmbiguousVariant,
}

impl std::fmt::Display for ValidationErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationErrorCode::MissingField => write!(f, "MISSING_FIELD"),
            ValidationErrorCode::EmptyField => write!(f, "EMPTY_FIELD"),
            ValidationErrorCode::InvalidType => write!(f, "INVALID_TYPE"),
            ValidationErrorCode::InvalidFormat => write!(f, "INVALID_FORMAT"),
            ValidationErrorCode::AmbiguousVariant => write!(f, "AMBIGUOUS_VARIANT"),
        }
    }
}

/// 验证结果
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// 是否通过验证
    pub is_valid: bool,
    /// 验证错误列表
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// 创建成功的验证结果
    pub fn success() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// 添加错误
    pub fn add_error(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }
}

/// 单个模块的描述校验失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorFailure {
    /// 模块标识（描述本身可能无效，因此取自代码单元）
    pub module: String,
    /// 全部校验错误
    pub errors: Vec<ValidationError>,
}

impl DescriptorFailure {
    /// 创建校验失败记录
    pub fn new(module: impl Into<String>, errors: Vec<ValidationError>) -> Self {
        Self {
            module: module.into(),
            errors,
        }
    }
}

impl std::fmt::Display for DescriptorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let errors: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}: {}", self.module, errors.join(", "))
    }
}

/// 模块描述校验器
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorValidator;

impl DescriptorValidator {
    /// 校验描述结构，收集全部错误
    pub fn validate(descriptor: &Value) -> ValidationResult {
        let mut result = ValidationResult::success();

        let Some(object) = descriptor.as_object() else {
            result.add_error(ValidationError::new(
                "$",
                "模块描述必须是对象",
                ValidationErrorCode::InvalidType,
            ));
            return result;
        };

        for field in ["name", "version", "type"] {
            Self::check_required_string(object, field, field, &mut result);
        }

        match object.get("dependencies") {
            None => result.add_error(ValidationError::new(
                "dependencies",
                "缺少依赖列表",
                ValidationErrorCode::MissingField,
            )),
            Some(Value::Array(entries)) => {
                for (index, entry) in entries.iter().enumerate() {
                    Self::check_dependency(index, entry, &mut result);
                }
            }
            Some(_) => result.add_error(ValidationError::new(
                "dependencies",
                "依赖列表必须是数组",
                ValidationErrorCode::InvalidType,
            )),
        }

        result
    }

    /// 描述结构是否有效
    pub fn is_valid(descriptor: &Value) -> bool {
        Self::validate(descriptor).is_valid
    }

    /// 校验并转换为强类型描述
    pub fn parse(descriptor: &Value) -> std::result::Result<ModuleDescriptor, Vec<ValidationError>> {
        let result = Self::validate(descriptor);
        if !result.is_valid {
            return Err(result.errors);
        }

        serde_json::from_value(descriptor.clone()).map_err(|e| {
            vec![ValidationError::new(
                "$",
                e.to_string(),
                ValidationErrorCode::InvalidFormat,
            )]
        })
    }

    /// 校验一批描述
    ///
    /// 每个描述都会被检查；只要有任何一个失败，返回汇总了全部失败的
    /// `CoreError::InvalidDescriptor`。
    pub fn parse_batch<'a, I>(descriptors: I) -> Result<Vec<ModuleDescriptor>>
    where
        I: IntoIterator<Item = (String, &'a Value)>,
    {
        let mut parsed = Vec::new();
        let mut failures = Vec::new();

        for (module, value) in descriptors {
            match Self::parse(value) {
                Ok(descriptor) => parsed.push(descriptor),
                Err(errors) => failures.push(DescriptorFailure::new(module, errors)),
            }
        }

        if failures.is_empty() {
            Ok(parsed)
        } else {
            Err(CoreError::InvalidDescriptor { failures })
        }
    }

    fn check_required_string(
        object: &Map<String, Value>,
        key: &str,
        path: &str,
        result: &mut ValidationResult,
    ) {
        match object.get(key) {
            None => result.add_error(ValidationError::new(
                path,
                "缺少必填字段",
                ValidationErrorCode::MissingField,
            )),
            Some(value) => Self::check_non_empty_string(value, path, result),
        }
    }

    fn check_non_empty_string(value: &Value, path: &str, result: &mut ValidationResult) {
        match value.as_str() {
            Some("") => result.add_error(ValidationError::new(
                path,
                "不能为空",
                ValidationErrorCode::EmptyField,
            )),
            Some(_) => {}
            None => result.add_error(ValidationError::new(
                path,
                "必须是字符串",
                ValidationErrorCode::InvalidType,
            )),
        }
    }

    fn check_dependency(index: usize, entry: &Value, result: &mut ValidationResult) {
        let path = format!("dependencies[{}]", index);

        let Some(object) = entry.as_object() else {
            result.add_error(ValidationError::new(
                path,
                "依赖项必须是对象",
                ValidationErrorCode::InvalidType,
            ));
            return;
        };

        let has_name = object.contains_key("name");
        let has_type = object.contains_key("type");

        match (has_name, has_type) {
            (true, true) => result.add_error(ValidationError::new(
                path,
                "依赖项不能同时声明 name 和 type",
                ValidationErrorCode::AmbiguousVariant,
            )),
            (false, false) => result.add_error(ValidationError::new(
                path,
                "依赖项必须声明 name 或 type",
                ValidationErrorCode::InvalidFormat,
            )),
            (true, false) => {
                Self::check_required_string(object, "name", &format!("{}.name", path), result);
                if let Some(version) = object.get("version") {
                    Self::check_non_empty_string(version, &format!("{}.version", path), result);
                }
            }
            (false, true) => {
                Self::check_required_string(object, "type", &format!("{}.type", path), result);
                if object.contains_key("version") {
                    result.add_error(ValidationError::new(
                        format!("{}.version", path),
                        "按类型的依赖不能声明版本",
                        ValidationErrorCode::AmbiguousVariant,
                    ));
                }
            }
        }
    }
}
