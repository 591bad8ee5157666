/// 可撤销命令模块
///
/// 每个 [`Command`] 变体对应一次用户可见的操作。执行前先检查前置条件，
/// 再对将要修改的实体做快照（只包含受影响的属性，结构性命令额外包含标签页树），
/// 因此撤销可以精确还原包括被删除字段在内的原状态。
use serde_json::{Map, Value};

use crate::model::{attr_group, attr_subgroup, in_bucket, Layout, Tab};
use crate::store::{NewAttribute, SchemaStore, SortBy};
use crate::utils::{remove_field, SchemaError};

/// 命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 合并字段并删除字段
    EditFields {
        keys: Vec<String>,
        updates: Map<String, Value>,
        remove: Vec<String>,
        /// 历史记录中显示的描述
        text: String,
    },
    /// 移动属性到组/子分组
    Move {
        keys: Vec<String>,
        group: String,
        subgroup: Option<String>,
    },
    /// 按给定顺序重写桶内 order
    Reorder {
        group: String,
        subgroup: Option<String>,
        ordered_keys: Vec<String>,
    },
    /// 按键名或标签排序后重写桶内 order
    SortBucket {
        group: String,
        subgroup: Option<String>,
        by: SortBy,
    },
    /// 重新编号单个桶
    NormalizeBucket { group: String, subgroup: Option<String> },
    /// 重新编号全部排序值
    NormalizeAll,
    RenameSubgroup { group: String, old: String, new: String },
    DeleteGroup { id: String, dest: Option<String> },
    DeleteSubgroup {
        group: String,
        name: String,
        dest: Option<String>,
    },
    DeleteAttributes { keys: Vec<String> },
    CreateAttribute(NewAttribute),
    MoveGroupToTab { id: String, tab: String },
    MoveSubgroupToGroup { subgroup: String, from: String, to: String },
    ReorderGroups { tab: String, ordered: Vec<String> },
    ReorderSubgroups { group: String, ordered: Vec<String> },
}

fn ensure_unique(keys: &[String]) -> Result<(), SchemaError> {
    let mut dups: Vec<&str> = Vec::new();
    for (idx, key) in keys.iter().enumerate() {
        if keys[..idx].contains(key) && !dups.contains(&key.as_str()) {
            dups.push(key);
        }
    }
    if dups.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::DuplicateKeys(dups.join(", ")))
    }
}

fn keys_where(store: &SchemaStore, pred: &dyn Fn(&Value) -> bool) -> Vec<String> {
    store
        .attributes()
        .iter()
        .filter(|(_, attr)| pred(attr))
        .map(|(key, _)| key.clone())
        .collect()
}

fn bucket_of(subgroup: &Option<String>) -> &str {
    subgroup.as_deref().unwrap_or("")
}

impl Command {
    /// 设置单个字段（对应批量设置字段操作）
    pub fn set_field(keys: Vec<String>, field: &str, value: Value) -> Self {
        let mut updates = Map::new();
        updates.insert(field.to_string(), value);
        Command::EditFields {
            keys,
            updates,
            remove: Vec::new(),
            text: format!("Set {}", field),
        }
    }

    /// 历史记录中显示的描述
    pub fn text(&self) -> String {
        match self {
            Command::EditFields { text, .. } => text.clone(),
            Command::Move { .. } => "Move to group/subgroup".into(),
            Command::Reorder { .. } => "Reorder attributes".into(),
            Command::SortBucket { by, .. } => format!("Sort by {} and rewrite order", by),
            Command::NormalizeBucket { .. } => "Normalize order".into(),
            Command::NormalizeAll => "Normalize all orders".into(),
            Command::RenameSubgroup { .. } => "Rename subgroup".into(),
            Command::DeleteGroup { .. } => "Delete group".into(),
            Command::DeleteSubgroup { .. } => "Delete subgroup".into(),
            Command::DeleteAttributes { keys } if keys.len() == 1 => "Delete attribute".into(),
            Command::DeleteAttributes { .. } => "Delete attributes".into(),
            Command::CreateAttribute(_) => "Create attribute".into(),
            Command::MoveGroupToTab { .. } => "Move group to tab".into(),
            Command::MoveSubgroupToGroup { .. } => "Move subgroup to group".into(),
            Command::ReorderGroups { .. } => "Reorder groups".into(),
            Command::ReorderSubgroups { .. } => "Reorder subgroups".into(),
        }
    }

    /// 是否会修改标签页/组/子分组结构
    fn is_structural(&self) -> bool {
        !matches!(
            self,
            Command::EditFields { .. }
                | Command::Reorder { .. }
                | Command::SortBucket { .. }
                | Command::NormalizeBucket { .. }
                | Command::DeleteAttributes { .. }
        )
    }

    /// 检查前置条件；失败时文档未被修改
    pub fn check(&self, store: &SchemaStore) -> Result<(), SchemaError> {
        let require_group = |id: &str| {
            if store.has_group(id) {
                Ok(())
            } else {
                Err(SchemaError::UnknownGroup(id.to_string()))
            }
        };
        match self {
            Command::EditFields { keys, .. } | Command::Move { keys, .. } | Command::DeleteAttributes { keys } => {
                ensure_unique(keys)
            }
            Command::Reorder { ordered_keys, .. } => ensure_unique(ordered_keys),
            Command::SortBucket { .. } | Command::NormalizeBucket { .. } | Command::NormalizeAll => Ok(()),
            Command::RenameSubgroup { group, .. }
            | Command::DeleteSubgroup { group, .. }
            | Command::DeleteGroup { id: group, .. }
            | Command::MoveGroupToTab { id: group, .. } => require_group(group.as_str()),
            Command::CreateAttribute(new) => {
                if new.key.trim().is_empty() {
                    Err(SchemaError::EmptyName)
                } else {
                    Ok(())
                }
            }
            Command::MoveSubgroupToGroup { subgroup, from, .. } => {
                if subgroup.is_empty() {
                    return Err(SchemaError::EmptyName);
                }
                require_group(from.as_str())?;
                let in_use = store
                    .attributes()
                    .values()
                    .any(|attr| in_bucket(attr, from, subgroup));
                if !in_use && !store.subgroup_names(from).contains(subgroup) {
                    return Err(SchemaError::UnknownSubgroup {
                        group: from.clone(),
                        name: subgroup.clone(),
                    });
                }
                Ok(())
            }
            Command::ReorderGroups { tab, ordered } => {
                if store.tab(tab).is_none() {
                    return Err(SchemaError::UnknownTab(tab.clone()));
                }
                ensure_unique(ordered)
            }
            Command::ReorderSubgroups { group, ordered } => {
                require_group(group.as_str())?;
                ensure_unique(ordered)
            }
        }
    }

    /// 受影响的属性键
    fn touched_keys(&self, store: &SchemaStore) -> Vec<String> {
        match self {
            Command::EditFields { keys, .. } | Command::Move { keys, .. } | Command::DeleteAttributes { keys } => {
                keys.clone()
            }
            Command::Reorder { ordered_keys, .. } => ordered_keys.clone(),
            Command::SortBucket { group, subgroup, .. } | Command::NormalizeBucket { group, subgroup } => {
                keys_where(store, &|attr| in_bucket(attr, group, bucket_of(subgroup)))
            }
            Command::NormalizeAll => store.attributes().keys().cloned().collect(),
            Command::RenameSubgroup { old, .. } if old.is_empty() => Vec::new(),
            Command::RenameSubgroup { group, old, .. } => keys_where(store, &|attr| in_bucket(attr, group, old)),
            Command::DeleteGroup { id, .. } => keys_where(store, &|attr| attr_group(attr) == id),
            Command::DeleteSubgroup { group, name, .. } => keys_where(store, &|attr| in_bucket(attr, group, name)),
            Command::CreateAttribute(new) => vec![new.key.clone()],
            Command::MoveSubgroupToGroup { subgroup, from, .. } => {
                keys_where(store, &|attr| attr_group(attr) == from && attr_subgroup(attr) == subgroup)
            }
            Command::MoveGroupToTab { .. } | Command::ReorderGroups { .. } | Command::ReorderSubgroups { .. } => {
                Vec::new()
            }
        }
    }

    /// 对将要修改的实体做快照
    pub fn snapshot(&self, store: &SchemaStore) -> Snapshot {
        let attributes = self
            .touched_keys(store)
            .into_iter()
            .map(|key| {
                let state = store
                    .attributes()
                    .get_full(&key)
                    .map(|(index, _, value)| (index, value.clone()));
                (key, state)
            })
            .collect();
        let structure = self.is_structural().then(|| StructureSnapshot {
            tabs: store.doc.tabs.clone(),
            layout: store.doc.layout,
            attributes_declared: store.doc.attributes_declared,
            raw_attributes: store.doc.meta.get("attributes").cloned(),
        });
        Snapshot { attributes, structure }
    }

    /// 正向执行
    pub fn apply(&self, store: &mut SchemaStore) -> Result<(), SchemaError> {
        match self {
            Command::EditFields { keys, updates, remove, .. } => {
                store.set_attribute_values(keys, updates, remove);
            }
            Command::Move { keys, group, subgroup } => {
                store.move_attributes(keys, group, subgroup.as_deref());
            }
            Command::Reorder { group, subgroup, ordered_keys } => {
                let members: Vec<&String> = ordered_keys
                    .iter()
                    .filter(|key| {
                        store
                            .attribute(key.as_str())
                            .map_or(false, |attr| in_bucket(attr, group, bucket_of(subgroup)))
                    })
                    .collect();
                store.assign_orders(&members);
            }
            Command::SortBucket { group, subgroup, by } => {
                let sorted = store.sorted_bucket_keys(group, bucket_of(subgroup), *by);
                store.assign_orders(&sorted);
            }
            Command::NormalizeBucket { group, subgroup } => {
                store.normalize_orders(group, bucket_of(subgroup));
            }
            Command::NormalizeAll => {
                store.normalize_orders_all();
            }
            Command::RenameSubgroup { group, old, new } => store.rename_subgroup(group, old, new)?,
            Command::DeleteGroup { id, dest } => store.remove_group(id, dest.as_deref())?,
            Command::DeleteSubgroup { group, name, dest } => store.remove_subgroup(group, name, dest.as_deref())?,
            Command::DeleteAttributes { keys } => {
                store.delete_attributes(keys);
            }
            Command::CreateAttribute(new) => {
                store.create_attribute(new.clone())?;
            }
            Command::MoveGroupToTab { id, tab } => store.move_group_to_tab(id, tab)?,
            Command::MoveSubgroupToGroup { subgroup, from, to } => store.move_subgroup_to_group(subgroup, from, to)?,
            Command::ReorderGroups { tab, ordered } => store.reorder_groups_in_tab(tab, ordered)?,
            Command::ReorderSubgroups { group, ordered } => store.reorder_subgroups(group, ordered)?,
        }
        Ok(())
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// 标签页树的快照
#[derive(Debug, Clone, PartialEq)]
struct StructureSnapshot {
    tabs: Vec<Tab>,
    layout: Layout,
    attributes_declared: bool,
    raw_attributes: Option<Value>,
}

/// 命令执行前的状态
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    /// 属性键 → (在属性表中的位置, 原定义)；`None` 表示执行前不存在
    attributes: Vec<(String, Option<(usize, Value)>)>,
    structure: Option<StructureSnapshot>,
}

impl Snapshot {
    /// 快照中包含的属性数量
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn has_structure(&self) -> bool {
        self.structure.is_some()
    }

    /// 还原到快照时的状态
    pub fn restore(&self, store: &mut SchemaStore) {
        if let Some(structure) = &self.structure {
            let doc = &mut store.doc;
            doc.tabs = structure.tabs.clone();
            doc.layout = structure.layout;
            doc.attributes_declared = structure.attributes_declared;
            match &structure.raw_attributes {
                Some(raw) => {
                    doc.meta.insert("attributes".into(), raw.clone());
                }
                None => {
                    remove_field(&mut doc.meta, "attributes");
                }
            }
        }

        let attrs = &mut store.doc.attributes;
        for (key, state) in &self.attributes {
            if state.is_none() {
                attrs.shift_remove(key);
            }
        }
        let mut present: Vec<(&String, usize, &Value)> = self
            .attributes
            .iter()
            .filter_map(|(key, state)| state.as_ref().map(|(index, value)| (key, *index, value)))
            .collect();
        present.sort_by_key(|(_, index, _)| *index);
        for (key, index, value) in present {
            let limit = if attrs.contains_key(key.as_str()) {
                attrs.len().saturating_sub(1)
            } else {
                attrs.len()
            };
            attrs.shift_insert(index.min(limit), key.clone(), value.clone());
        }
        store.mark_dirty();
    }
}

/// 已执行的命令及其执行前快照
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedCommand {
    command: Command,
    snapshot: Snapshot,
}

impl AppliedCommand {
    /// 检查、快照并执行命令
    ///
    /// 执行失败时还原快照，文档保持不变。
    pub fn apply(command: Command, store: &mut SchemaStore) -> Result<Self, SchemaError> {
        command.check(store)?;
        let snapshot = command.snapshot(store);
        if let Err(e) = command.apply(store) {
            snapshot.restore(store);
            return Err(e);
        }
        Ok(Self { command, snapshot })
    }

    pub(crate) fn from_parts(command: Command, snapshot: Snapshot) -> Self {
        Self { command, snapshot }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn text(&self) -> String {
        self.command.text()
    }

    /// 撤销：还原执行前的快照
    pub fn undo(&self, store: &mut SchemaStore) {
        self.snapshot.restore(store);
    }

    /// 重做：先还原快照再重新执行，可重复调用
    pub fn redo(&self, store: &mut SchemaStore) -> Result<(), SchemaError> {
        self.snapshot.restore(store);
        self.command.apply(store)
    }
}

impl std::fmt::Display for AppliedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)
    }
}
