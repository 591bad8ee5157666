/// 编辑器层模块
///
/// 该模块在 [`SchemaStore`](crate::store::SchemaStore) 之上提供可撤销的编辑接口。
/// 遵循"修改-保存分离"原则，所有修改操作仅在内存中进行，需要显式调用保存。
///
/// # 架构设计
///
/// - **command**: 命令变体、前置条件检查与执行前快照
/// - **history**: 线性撤销/重做历史
/// - **session**: 会话上下文（存储 + 历史）
/// - **bulk**: 多选批量编辑的便捷函数
///
/// # 使用示例
///
/// ```rust,ignore
/// use schema_ide::editor::{bulk_move, SchemaSession};
///
/// let mut session = SchemaSession::open_file("accordion.json")?;
/// bulk_move(&mut session, &["titleColor", "titleSize"], "header", Some("typography"))?;
/// println!("{}", session.history().summary());
///
/// session.undo()?;
/// session.save(|warnings| warnings.is_empty())?;
/// ```
pub mod bulk;
pub mod command;
pub mod history;
pub mod session;

// === 导出公共接口 ===
pub use bulk::{bulk_move, bulk_set_field, bulk_set_fields, move_step, reorder_sequence, sort_and_rewrite_orders};
pub use command::{AppliedCommand, Command, Snapshot};
pub use history::EditHistory;
pub use session::SchemaSession;
