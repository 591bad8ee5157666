/// 编辑会话模块
///
/// [`SchemaSession`] 把文档存储与编辑历史组合为一个显式构造的上下文对象，
/// 打开文件时创建，关闭文件时销毁。所有修改经由 [`Command`] 执行，
/// 因此都可以撤销/重做。
use std::path::Path;

use log::{debug, info};

use super::command::{AppliedCommand, Command};
use super::history::EditHistory;
use crate::config::EditorConfig;
use crate::store::{SchemaStore, StoreEvent};
use crate::utils::SchemaError;
use crate::validation::{has_errors, Issue};

/// 编辑会话
///
/// # 使用示例
///
/// ```rust,ignore
/// use schema_ide::{Command, SchemaSession};
///
/// let mut session = SchemaSession::open_file("accordion.json")?;
/// session.execute(Command::set_field(vec!["titleColor".into()], "label", "Title".into()))?;
/// session.undo()?;
/// session.save(|warnings| warnings.is_empty())?;
/// ```
#[derive(Debug, Default)]
pub struct SchemaSession {
    store: SchemaStore,
    history: EditHistory,
}

impl SchemaSession {
    /// 基于已加载的存储创建会话
    pub fn new(store: SchemaStore) -> Self {
        Self {
            store,
            history: EditHistory::new(),
        }
    }

    /// 使用指定配置创建空会话
    pub fn with_config(config: EditorConfig) -> Self {
        Self::new(SchemaStore::with_config(config))
    }

    /// 打开文件并创建会话
    pub fn open_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Ok(Self::new(SchemaStore::open(path)?))
    }

    /// 在当前会话中打开另一个文件
    ///
    /// 成功时清空编辑历史；失败时会话保持原状态。
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), SchemaError> {
        self.store.load(path)?;
        self.history.clear();
        Ok(())
    }

    /// 关闭当前文档，回到空会话
    pub fn close(&mut self) {
        info!("关闭 schema {:?}", self.store.path());
        let config = self.store.config().clone();
        self.store = SchemaStore::with_config(config);
        self.history.clear();
    }

    pub fn store(&self) -> &SchemaStore {
        &self.store
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn is_dirty(&self) -> bool {
        self.store.is_dirty()
    }

    /// 注册变更通知回调
    pub fn subscribe(&mut self, observer: impl FnMut(&StoreEvent) + 'static) {
        self.store.subscribe(observer);
    }

    /// 设置属性字段的序列化顺序（不进入编辑历史）
    pub fn set_attribute_key_order<S: AsRef<str>>(&mut self, keys: &[S]) {
        self.store.set_attribute_key_order(keys);
    }

    // --- 命令执行 -------------------------------------------------------

    /// 检查并执行命令，作为一个独立条目压入历史
    pub fn execute(&mut self, command: Command) -> Result<(), SchemaError> {
        let applied = AppliedCommand::apply(command, &mut self.store)?;
        debug!("执行命令: {}", applied);
        self.history.push(applied);
        Ok(())
    }

    /// 撤销最近一次命令，返回其描述
    pub fn undo(&mut self) -> Result<String, SchemaError> {
        let entry = self.history.undo()?;
        entry.undo(&mut self.store);
        debug!("撤销命令: {}", entry);
        Ok(entry.text())
    }

    /// 重做最近一次撤销的命令，返回其描述
    pub fn redo(&mut self) -> Result<String, SchemaError> {
        let entry = self.history.redo()?;
        let text = entry.text();
        if let Err(e) = entry.redo(&mut self.store) {
            entry.undo(&mut self.store);
            self.history.revert_redo();
            return Err(e);
        }
        debug!("重做命令: {}", text);
        Ok(text)
    }

    /// 重新编号全部排序值；有变化时作为可撤销条目记录
    pub fn normalize_all(&mut self) -> bool {
        let command = Command::NormalizeAll;
        let snapshot = command.snapshot(&self.store);
        if !self.store.normalize_orders_all() {
            return false;
        }
        let applied = AppliedCommand::from_parts(command, snapshot);
        debug!("执行命令: {}", applied);
        self.history.push(applied);
        true
    }

    // --- 校验与保存 -----------------------------------------------------

    /// 规范化排序后校验
    pub fn validate(&mut self) -> Vec<Issue> {
        self.normalize_all();
        self.store.validate()
    }

    /// 规范化、校验并保存
    ///
    /// # 参数
    /// - `confirm`: 存在警告时调用，返回 false 表示取消保存
    ///
    /// # 返回
    /// 已保存返回 `Ok(true)`，用户取消返回 `Ok(false)`；
    /// 存在错误级别问题时返回 [`SchemaError::SaveBlocked`]
    pub fn save<F>(&mut self, confirm: F) -> Result<bool, SchemaError>
    where
        F: FnOnce(&[Issue]) -> bool,
    {
        let issues = self.validate();
        if has_errors(&issues) {
            let errors = issues.iter().filter(|i| i.is_error()).count();
            return Err(SchemaError::SaveBlocked { errors });
        }
        if !issues.is_empty() && !confirm(&issues) {
            info!("保存已取消: {} 条警告", issues.len());
            return Ok(false);
        }
        self.store.save()?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> SchemaSession {
        SchemaSession::new(
            SchemaStore::from_value(json!({
                "tabs": [{"name": "settings", "order": 1, "groups": [
                    {"id": "g1", "title": "G1", "order": 1}
                ]}],
                "attributes": {
                    "a": {"group": "g1", "order": 5, "label": "A"},
                    "b": {"group": "g1", "order": 5, "label": "B"}
                }
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_execute_undo_redo() {
        let mut session = session();
        let before = session.store().to_document();
        session
            .execute(Command::set_field(vec!["a".into()], "label", json!("Changed")))
            .unwrap();
        let after = session.store().to_document();

        assert_eq!(session.undo().unwrap(), "Set label");
        assert_eq!(session.store().to_document(), before);
        assert_eq!(session.redo().unwrap(), "Set label");
        assert_eq!(session.store().to_document(), after);
        assert!(matches!(session.redo(), Err(SchemaError::NothingToRedo)));
    }

    #[test]
    fn test_failed_command_is_not_recorded() {
        let mut session = session();
        let result = session.execute(Command::DeleteGroup {
            id: "missing".into(),
            dest: None,
        });
        assert!(result.is_err());
        assert!(session.history().is_empty());
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_validate_normalizes_first() {
        let mut session = session();
        let issues = session.validate();
        assert!(issues.iter().all(|i| !i.message.contains("Duplicate order")));
        assert_eq!(session.store().attribute("a").unwrap()["order"], 1);
        assert_eq!(session.history().undo_text().as_deref(), Some("Normalize all orders"));

        session.undo().unwrap();
        assert_eq!(session.store().attribute("b").unwrap()["order"], 5);
        assert!(session.normalize_all());
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_save_blocked_on_errors() {
        // 缺少必需的顶层字段
        let mut session = session();
        assert!(matches!(
            session.save(|_| true),
            Err(SchemaError::SaveBlocked { errors }) if errors > 0
        ));
    }

    #[test]
    fn test_close_resets() {
        let mut session = session();
        session.execute(Command::DeleteAttributes { keys: vec!["a".into()] }).unwrap();
        session.close();
        assert!(session.store().attributes().is_empty());
        assert!(!session.history().can_undo());
    }
}
