/// schema 文件 IO 实现
///
/// 提供基于文件系统的默认读写实现，以及统一的 JSON 渲染格式
/// （2 空格缩进，非 ASCII 字符原样保留）。
use std::path::Path;

use serde_json::Value;

use super::traits::{SchemaReader, SchemaWriter};
use crate::utils::SchemaError;

/// 默认的 schema 文件读取器（基于 std::fs）
#[derive(Debug, Clone, Default)]
pub struct DefaultSchemaReader;

impl SchemaReader for DefaultSchemaReader {
    fn read(&self, path: &Path) -> Result<String, SchemaError> {
        std::fs::read_to_string(path).map_err(|e| SchemaError::io(path, e))
    }
}

/// 默认的 schema 文件写入器（基于 std::fs）
#[derive(Debug, Clone, Default)]
pub struct DefaultSchemaWriter;

impl SchemaWriter for DefaultSchemaWriter {
    fn write(&self, text: &str, path: &Path) -> Result<(), SchemaError> {
        // 确保父目录存在
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SchemaError::io(path, e))?;
        }

        std::fs::write(path, text).map_err(|e| SchemaError::io(path, e))
    }
}

/// 渲染为持久化格式的 JSON 文本
pub fn render_json(value: &Value, trailing_newline: bool) -> Result<String, SchemaError> {
    let mut text = serde_json::to_string_pretty(value)?;
    if trailing_newline {
        text.push('\n');
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_default_reader_and_writer() {
        let temp_dir = TempDir::new().unwrap();
        let test_file = temp_dir.path().join("nested").join("schema.json");

        let writer = DefaultSchemaWriter;
        writer.write("{\"a\": 1}", &test_file).unwrap();

        let reader = DefaultSchemaReader;
        assert_eq!(reader.read(&test_file).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_reader_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = DefaultSchemaReader.read(&temp_dir.path().join("missing.json"));
        assert!(matches!(result, Err(SchemaError::Io { .. })));
    }

    #[test]
    fn test_render_json_format() {
        let text = render_json(&json!({"title": "手风琴", "n": [1]}), true).unwrap();
        assert_eq!(text, "{\n  \"title\": \"手风琴\",\n  \"n\": [\n    1\n  ]\n}\n");

        let text = render_json(&json!({}), false).unwrap();
        assert_eq!(text, "{}");
    }
}
