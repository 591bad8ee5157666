/// IO 抽象层模块
///
/// 该模块提供了 schema 文件读写的抽象接口，遵循依赖倒置原则。
/// 支持依赖注入、测试 mock 和替换 IO 实现（如内存 IO）。
///
/// # 架构设计
///
/// - **traits**: 定义 Reader/Writer trait 接口
/// - **json_io**: 基于文件系统的默认实现，以及 JSON 文本渲染
///
/// # 使用示例
///
/// ```rust,ignore
/// use schema_ide::io::{DefaultSchemaReader, SchemaReader};
///
/// let reader = DefaultSchemaReader;
/// let text = reader.read(Path::new("accordion.json"))?;
/// ```
pub mod traits;
pub mod json_io;

// === 导出 trait 定义 ===
pub use traits::{SchemaReader, SchemaWriter};

// === 导出默认实现 ===
pub use json_io::{render_json, DefaultSchemaReader, DefaultSchemaWriter};
