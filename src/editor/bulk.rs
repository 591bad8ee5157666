/// 批量编辑辅助函数
///
/// 检查器与属性列表中常用的多选操作。每个函数构造一个命令并在会话中执行，
/// 产生一条独立的历史记录。
use serde_json::{Map, Value};

use super::command::Command;
use super::session::SchemaSession;
use crate::store::SortBy;
use crate::utils::SchemaError;

fn owned<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    keys.iter().map(|k| k.as_ref().to_string()).collect()
}

/// 为多个属性设置同一字段
pub fn bulk_set_field<S: AsRef<str>>(
    session: &mut SchemaSession,
    keys: &[S],
    field: &str,
    value: Value,
) -> Result<(), SchemaError> {
    session.execute(Command::set_field(owned(keys), field, value))
}

/// 为多个属性合并字段并删除字段
pub fn bulk_set_fields<S: AsRef<str>>(
    session: &mut SchemaSession,
    keys: &[S],
    updates: Map<String, Value>,
    remove: &[S],
    text: &str,
) -> Result<(), SchemaError> {
    session.execute(Command::EditFields {
        keys: owned(keys),
        updates,
        remove: owned(remove),
        text: text.to_string(),
    })
}

/// 把多个属性移动到组/子分组
pub fn bulk_move<S: AsRef<str>>(
    session: &mut SchemaSession,
    keys: &[S],
    group: &str,
    subgroup: Option<&str>,
) -> Result<(), SchemaError> {
    session.execute(Command::Move {
        keys: owned(keys),
        group: group.to_string(),
        subgroup: subgroup.filter(|s| !s.is_empty()).map(str::to_string),
    })
}

/// 按键名或标签排序后重写桶内 order
pub fn sort_and_rewrite_orders(
    session: &mut SchemaSession,
    group: &str,
    subgroup: Option<&str>,
    by: SortBy,
) -> Result<(), SchemaError> {
    session.execute(Command::SortBucket {
        group: group.to_string(),
        subgroup: subgroup.filter(|s| !s.is_empty()).map(str::to_string),
        by,
    })
}

/// 把属性在桶内上移或下移一位
///
/// # 返回
/// 属性已在边界或不在桶内时不产生历史记录，返回 `Ok(false)`
pub fn move_step(
    session: &mut SchemaSession,
    group: &str,
    subgroup: Option<&str>,
    key: &str,
    direction: i32,
) -> Result<bool, SchemaError> {
    let bucket = subgroup.unwrap_or("");
    let Some(ordered_keys) = session.store().stepped_bucket_keys(group, bucket, key, direction) else {
        return Ok(false);
    };
    reorder_sequence(session, group, subgroup, &ordered_keys)?;
    Ok(true)
}

/// 按给定序列重写 order（从 1 开始）
pub fn reorder_sequence<S: AsRef<str>>(
    session: &mut SchemaSession,
    group: &str,
    subgroup: Option<&str>,
    ordered_keys: &[S],
) -> Result<(), SchemaError> {
    session.execute(Command::Reorder {
        group: group.to_string(),
        subgroup: subgroup.filter(|s| !s.is_empty()).map(str::to_string),
        ordered_keys: owned(ordered_keys),
    })
}
