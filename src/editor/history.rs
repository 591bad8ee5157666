/// 编辑历史模块
///
/// 线性撤销/重做栈。每次执行的命令作为独立条目记录，从不合并，
/// 保证撤销粒度与用户可见的操作一一对应。
use super::command::AppliedCommand;
use crate::utils::SchemaError;

/// 编辑历史
///
/// # 实现细节
/// - 所有条目按执行顺序存储在 changes 向量中
/// - undo_stack / redo_stack 中存储的是索引而非实际数据
/// - 压入新条目会清空重做栈，被丢弃的条目同时从 changes 中移除
#[derive(Debug, Clone, Default)]
pub struct EditHistory {
    /// 所有条目的完整记录（包括已撤销但仍可重做的）
    changes: Vec<AppliedCommand>,
    /// 撤销栈（存储 changes 中的索引）
    undo_stack: Vec<usize>,
    /// 重做栈（存储 changes 中的索引）
    redo_stack: Vec<usize>,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个已执行的命令
    pub fn push(&mut self, entry: AppliedCommand) {
        // 重做栈中的索引总是 changes 的尾部
        if let Some(&first) = self.redo_stack.iter().min() {
            self.changes.truncate(first);
        }
        self.redo_stack.clear();
        let index = self.changes.len();
        self.changes.push(entry);
        self.undo_stack.push(index);
    }

    /// 弹出最近一次可撤销的条目并移入重做栈
    ///
    /// # 返回
    /// 返回需要撤销的条目，没有可撤销的操作时返回 [`SchemaError::NothingToUndo`]
    pub fn undo(&mut self) -> Result<&AppliedCommand, SchemaError> {
        let index = self.undo_stack.pop().ok_or(SchemaError::NothingToUndo)?;
        self.redo_stack.push(index);
        Ok(&self.changes[index])
    }

    /// 弹出最近一次撤销的条目并移回撤销栈
    pub fn redo(&mut self) -> Result<&AppliedCommand, SchemaError> {
        let index = self.redo_stack.pop().ok_or(SchemaError::NothingToRedo)?;
        self.undo_stack.push(index);
        Ok(&self.changes[index])
    }

    /// 重做执行失败时把条目放回重做栈
    pub(crate) fn revert_redo(&mut self) {
        if let Some(index) = self.undo_stack.pop() {
            self.redo_stack.push(index);
        }
    }

    /// 当前有效条目的数量（撤销栈的大小）
    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    /// 按执行顺序遍历当前有效的条目
    pub fn iter(&self) -> impl Iterator<Item = &AppliedCommand> {
        self.undo_stack.iter().map(|&idx| &self.changes[idx])
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// 下一次撤销对应的描述
    pub fn undo_text(&self) -> Option<String> {
        self.undo_stack.last().map(|&idx| self.changes[idx].text())
    }

    /// 下一次重做对应的描述
    pub fn redo_text(&self) -> Option<String> {
        self.redo_stack.last().map(|&idx| self.changes[idx].text())
    }

    pub fn clear(&mut self) {
        self.changes.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// 生成历史摘要
    pub fn summary(&self) -> String {
        format!(
            "历史条目总数: {}, 有效条目: {}, 可撤销: {}, 可重做: {}",
            self.changes.len(),
            self.undo_stack.len(),
            self.can_undo(),
            self.can_redo()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::command::{Command, Snapshot};
    use serde_json::json;

    fn entry(field: &str) -> AppliedCommand {
        AppliedCommand::from_parts(
            Command::set_field(vec!["a".into()], field, json!(1)),
            Snapshot::default(),
        )
    }

    #[test]
    fn test_history_basic() {
        let mut history = EditHistory::new();
        assert!(history.is_empty());
        assert!(matches!(history.undo(), Err(SchemaError::NothingToUndo)));

        history.push(entry("label"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.undo_text().as_deref(), Some("Set label"));
    }

    #[test]
    fn test_undo_redo() {
        let mut history = EditHistory::new();
        history.push(entry("a"));
        history.push(entry("b"));
        history.push(entry("c"));

        assert_eq!(history.undo().unwrap().text(), "Set c");
        assert_eq!(history.undo().unwrap().text(), "Set b");
        assert_eq!(history.len(), 1);
        assert!(history.can_redo());

        assert_eq!(history.redo().unwrap().text(), "Set b");
        assert_eq!(history.len(), 2);
        assert_eq!(history.redo_text().as_deref(), Some("Set c"));
    }

    #[test]
    fn test_push_clears_redo() {
        let mut history = EditHistory::new();
        history.push(entry("a"));
        history.push(entry("b"));
        history.undo().unwrap();
        assert!(history.can_redo());

        history.push(entry("c"));
        assert!(!history.can_redo());
        assert!(matches!(history.redo(), Err(SchemaError::NothingToRedo)));
        let texts: Vec<_> = history.iter().map(AppliedCommand::text).collect();
        assert_eq!(texts, vec!["Set a", "Set c"]);
    }

    #[test]
    fn test_push_drops_discarded_entries() {
        let mut history = EditHistory::new();
        for field in ["a", "b", "c"] {
            history.push(entry(field));
            history.undo().unwrap();
        }
        assert!(history.summary().contains("历史条目总数: 1, 有效条目: 0"));

        history.push(entry("d"));
        history.push(entry("e"));
        history.undo().unwrap();
        history.push(entry("f"));
        assert!(history.summary().contains("历史条目总数: 2, 有效条目: 2"));
        let texts: Vec<_> = history.iter().map(AppliedCommand::text).collect();
        assert_eq!(texts, vec!["Set d", "Set f"]);
    }

    #[test]
    fn test_entries_never_merge() {
        let mut history = EditHistory::new();
        history.push(entry("label"));
        history.push(entry("label"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_clear_and_summary() {
        let mut history = EditHistory::new();
        history.push(entry("a"));
        history.clear();
        assert!(!history.can_undo());
        assert!(history.summary().contains("历史条目总数: 0"));
    }
}
