/// IO 抽象层 - trait 定义
///
/// Store 只依赖这两个 trait 读写持久化文件，便于在测试中注入内存实现
/// 或模拟写入失败。
use std::path::Path;

use crate::utils::SchemaError;

/// schema 文件读取 trait
///
/// # 职责
/// - 从存储中读取 schema 文件的 UTF-8 文本
/// - 不负责解析，仅负责 IO
pub trait SchemaReader {
    /// 读取 schema 文件内容
    ///
    /// # 参数
    /// * `path` - 文件路径
    fn read(&self, path: &Path) -> Result<String, SchemaError>;
}

/// schema 文件写入 trait
///
/// # 职责
/// - 将已序列化的文本写入存储
/// - 不负责序列化，仅负责 IO
pub trait SchemaWriter {
    /// 写入 schema 文件内容
    ///
    /// # 参数
    /// * `text` - 要写入的 JSON 文本
    /// * `path` - 目标文件路径
    fn write(&self, text: &str, path: &Path) -> Result<(), SchemaError>;
}
