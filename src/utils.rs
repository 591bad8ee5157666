use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

/// 自定义错误类型
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to parse schema {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Schema root in {path:?} must be a JSON object")]
    NotAnObject { path: PathBuf },

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON for `{field}`: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Cannot edit mixed values of `{field}` without choosing a concrete value")]
    MixedValue { field: String },

    #[error("Name must not be empty")]
    EmptyName,

    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    #[error("Unknown subgroup '{name}' in group {group}")]
    UnknownSubgroup { group: String, name: String },

    #[error("Unknown tab: {0}")]
    UnknownTab(String),

    #[error("Tab '{0}' already exists")]
    DuplicateTab(String),

    #[error("Duplicate keys in request: {0}")]
    DuplicateKeys(String),

    #[error("Save blocked: {errors} validation error(s)")]
    SaveBlocked { errors: usize },

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SchemaError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        SchemaError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// 排序值缺失或无法转换时使用的默认值
pub const FALLBACK_ORDER: i64 = 10_000;

/// 宽松的整数转换
///
/// 接受整数、可精确截断的浮点数、以及可解析为整数的字符串，
/// 其余情况返回 `None`。
pub fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// 排序用的整数值，无法转换时退回 [`FALLBACK_ORDER`]
pub fn safe_int(value: Option<&Value>) -> i64 {
    value.and_then(coerce_int).unwrap_or(FALLBACK_ORDER)
}

/// 宽松的浮点转换（用于 min/max 比较）
pub fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// 删除字段并保持其余字段的相对顺序
///
/// 返回被删除的值
pub fn remove_field(map: &mut Map<String, Value>, field: &str) -> Option<Value> {
    if !map.contains_key(field) {
        return None;
    }
    let mut removed = None;
    let old = std::mem::take(map);
    for (k, v) in old {
        if k == field {
            removed = Some(v);
        } else {
            map.insert(k, v);
        }
    }
    removed
}

/// 读取字符串字段，空字符串视为缺失
pub fn non_empty_str<'a>(map: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    map.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// 创建文件备份
pub fn create_backup(file_path: &Path) -> Result<PathBuf, SchemaError> {
    if !file_path.exists() {
        return Err(SchemaError::io(
            file_path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "original file does not exist"),
        ));
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
    let backup_path = file_path.with_extension(format!("{}.bak", timestamp));

    std::fs::copy(file_path, &backup_path).map_err(|e| SchemaError::io(file_path, e))?;

    Ok(backup_path)
}
