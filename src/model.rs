/// 文档模型模块
///
/// 定义 tabs → groups → subgroups 的类型化结构。属性（attribute）本身保持为
/// 原始 JSON 对象，以便容纳任意自定义字段；这里只提供按字段读取的辅助函数。
///
/// 组与属性之间、组与标签页之间的关联全部是字符串外键（group id、subgroup 名称），
/// 使用时按名称查找，从不缓存引用。
use serde_json::{json, Map, Value};

use crate::utils::{safe_int, FALLBACK_ORDER};

/// 默认标签页
pub const DEFAULT_TAB: &str = "settings";

/// 属性字段的默认序列化顺序
pub const DEFAULT_ATTRIBUTE_KEY_ORDER: &[&str] = &[
    "type",
    "default",
    "label",
    "description",
    "group",
    "subgroup",
    "order",
    "control",
    "controlId",
    "min",
    "max",
    "units",
    "scaleType",
    "options",
    "showWhen",
    "alignmentType",
    "state",
    "appliesTo",
    "cssVar",
    "cssProperty",
    "responsive",
    "themeable",
    "outputsCSS",
    "visibleOnSidebar",
];

/// 常见但不参与默认排序的标准字段（不算作自定义字段）
pub const EXTRA_STANDARD_FIELDS: &[&str] = &[
    "unit",
    "disabledWhen",
    "dependsOn",
    "needsMapping",
    "reason",
    "step",
    "transformValue",
    "variants",
];

/// 是否为标准属性字段
pub fn is_standard_field(field: &str) -> bool {
    DEFAULT_ATTRIBUTE_KEY_ORDER.contains(&field) || EXTRA_STANDARD_FIELDS.contains(&field)
}

/// 组字段的固定序列化顺序
pub const GROUP_KEY_ORDER: &[&str] = &[
    "title",
    "description",
    "order",
    "initialOpen",
    "tab",
    "subgroups",
];

/// 顶层字段的首选顺序
pub const TOP_LEVEL_ORDER: &[&str] = &[
    "$schema",
    "title",
    "version",
    "description",
    "blockType",
    "blockName",
    "manualSyncRequired",
    "tabs",
    "attributes",
];

/// 允许的属性类型
pub const ALLOWED_TYPES: &[&str] = &["string", "number", "boolean", "object", "array"];

/// 文档持久化时采用的结构形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// 源文件既没有 `tabs` 也没有 `groups`
    #[default]
    Empty,
    /// 旧格式：顶层 `groups` 映射
    LegacyGroups,
    /// `tabs` 列表（持久化的权威形式）
    Tabs,
}

/// 子分组，始终规范化为 `{name, order}` 对象形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subgroup {
    pub name: String,
    pub order: i64,
}

impl Subgroup {
    pub fn new(name: impl Into<String>, order: i64) -> Self {
        Self {
            name: name.into(),
            order,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "name": self.name, "order": self.order })
    }
}

/// 属性分组
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// 全文档唯一的组 ID
    pub id: String,
    /// 除 `id`/`tab`/`subgroups` 以外的所有字段（title、order、initialOpen 及自定义字段）
    pub fields: Map<String, Value>,
    pub subgroups: Vec<Subgroup>,
    /// 旧格式下源文件是否显式声明了 `tab`
    pub tab_declared: bool,
}

impl Group {
    /// 创建新组（title 缺省为 id，initialOpen 为 false）
    pub fn new(id: impl Into<String>, title: &str, order: i64) -> Self {
        let id = id.into();
        let mut fields = Map::new();
        let title = if title.is_empty() { id.as_str() } else { title };
        fields.insert("title".into(), Value::String(title.to_string()));
        fields.insert("order".into(), Value::from(order));
        fields.insert("initialOpen".into(), Value::Bool(false));
        Self {
            id,
            fields,
            subgroups: Vec::new(),
            tab_declared: true,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.fields.get("title").and_then(Value::as_str)
    }

    /// 排序值（缺失或无法转换时为回退值）
    pub fn order(&self) -> i64 {
        safe_int(self.fields.get("order"))
    }

    pub fn set_order(&mut self, order: i64) {
        self.fields.insert("order".into(), Value::from(order));
    }

    pub fn has_subgroup(&self, name: &str) -> bool {
        self.subgroups.iter().any(|sg| sg.name == name)
    }

    pub fn subgroup_mut(&mut self, name: &str) -> Option<&mut Subgroup> {
        self.subgroups.iter_mut().find(|sg| sg.name == name)
    }

    /// 按 (order, name) 排序后的子分组
    pub fn sorted_subgroups(&self) -> Vec<Subgroup> {
        let mut entries = self.subgroups.clone();
        entries.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        entries
    }

    /// 在末尾追加子分组；已存在时返回 false
    pub fn push_subgroup(&mut self, name: &str) -> bool {
        if name.is_empty() || self.has_subgroup(name) {
            return false;
        }
        let next = self
            .subgroups
            .iter()
            .map(|sg| sg.order)
            .max()
            .unwrap_or(0)
            + 1;
        self.subgroups.push(Subgroup::new(name, next));
        true
    }

    /// 删除子分组并保持剩余子分组的相对顺序
    pub fn remove_subgroup(&mut self, name: &str) -> Option<Subgroup> {
        let index = self.subgroups.iter().position(|sg| sg.name == name)?;
        Some(self.subgroups.remove(index))
    }

    /// 按当前 order 稳定排序后重写为 1 起始的连续序号
    pub fn renumber_subgroups(&mut self) {
        self.subgroups.sort_by_key(|sg| sg.order);
        for (idx, sg) in self.subgroups.iter_mut().enumerate() {
            sg.order = idx as i64 + 1;
        }
    }

    /// `tabs[].groups[]` 中的条目形式
    pub fn to_tab_entry(&self) -> Value {
        let mut out = Map::new();
        out.insert("id".into(), Value::String(self.id.clone()));
        for (k, v) in &self.fields {
            out.insert(k.clone(), v.clone());
        }
        out.insert("subgroups".into(), self.subgroups_value());
        Value::Object(out)
    }

    /// 旧格式顶层 `groups` 映射中的条目形式
    pub fn to_legacy_entry(&self, tab: &str) -> Value {
        let mut out = self.fields.clone();
        if self.tab_declared {
            out.insert("tab".into(), Value::String(tab.to_string()));
        }
        out.insert("subgroups".into(), self.subgroups_value());
        Value::Object(out)
    }

    fn subgroups_value(&self) -> Value {
        Value::Array(self.subgroups.iter().map(Subgroup::to_value).collect())
    }
}

/// 标签页
#[derive(Debug, Clone, PartialEq)]
pub struct Tab {
    /// 标签页名称（唯一）
    pub name: String,
    /// 除 `name`/`groups` 以外的字段（order 及自定义字段）
    pub fields: Map<String, Value>,
    pub groups: Vec<Group>,
}

impl Tab {
    pub fn new(name: impl Into<String>, order: i64) -> Self {
        let mut fields = Map::new();
        fields.insert("order".into(), Value::from(order));
        Self {
            name: name.into(),
            fields,
            groups: Vec::new(),
        }
    }

    pub fn order(&self) -> i64 {
        safe_int(self.fields.get("order"))
    }

    pub fn set_order(&mut self, order: i64) {
        self.fields.insert("order".into(), Value::from(order));
    }

    /// 下一个可用的组序号
    pub fn next_group_order(&self) -> i64 {
        self.groups
            .iter()
            .map(Group::order)
            .filter(|&o| o != FALLBACK_ORDER)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// 按当前 order 稳定排序后重写为 1 起始的连续序号
    pub fn renumber_groups(&mut self) {
        self.groups.sort_by_key(Group::order);
        for (idx, group) in self.groups.iter_mut().enumerate() {
            group.set_order(idx as i64 + 1);
        }
    }

    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("name".into(), Value::String(self.name.clone()));
        for (k, v) in &self.fields {
            out.insert(k.clone(), v.clone());
        }
        out.insert(
            "groups".into(),
            Value::Array(self.groups.iter().map(Group::to_tab_entry).collect()),
        );
        Value::Object(out)
    }
}

/// 组的只读视图（附带所属标签页名称）
#[derive(Debug, Clone, Copy)]
pub struct GroupRef<'a> {
    pub tab: &'a str,
    pub group: &'a Group,
}

// === 属性字段读取 ===

/// 属性所属的组 ID（缺失时为空字符串）
pub fn attr_group(attr: &Value) -> &str {
    attr.get("group").and_then(Value::as_str).unwrap_or("")
}

/// 属性所属的子分组名称（缺失、null 或空字符串时为空字符串）
pub fn attr_subgroup(attr: &Value) -> &str {
    attr.get("subgroup").and_then(Value::as_str).unwrap_or("")
}

/// 属性的排序值（用于排序，缺失时为回退值）
pub fn attr_order(attr: &Value) -> i64 {
    safe_int(attr.get("order"))
}

/// 属性是否属于指定的 (group, subgroup) 桶
pub fn in_bucket(attr: &Value, group: &str, subgroup: &str) -> bool {
    attr.is_object() && attr_group(attr) == group && attr_subgroup(attr) == subgroup
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_push_subgroup() {
        let mut group = Group::new("g1", "", 1);
        assert_eq!(group.title(), Some("g1"));
        assert!(group.push_subgroup("a"));
        assert!(group.push_subgroup("b"));
        assert!(!group.push_subgroup("a"));
        assert!(!group.push_subgroup(""));
        assert_eq!(group.subgroups[1], Subgroup::new("b", 2));
    }

    #[test]
    fn test_renumber_groups_is_stable() {
        let mut tab = Tab::new("settings", 1);
        tab.groups.push(Group::new("b", "B", 5));
        tab.groups.push(Group::new("a", "A", 5));
        tab.groups.push(Group::new("c", "C", 2));
        tab.renumber_groups();

        let ids: Vec<_> = tab.groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(tab.groups[2].order(), 3);
    }

    #[test]
    fn test_legacy_entry_omits_undeclared_tab() {
        let mut group = Group::new("g1", "G", 1);
        group.tab_declared = false;
        let entry = group.to_legacy_entry("settings");
        assert!(entry.get("tab").is_none());

        group.tab_declared = true;
        assert_eq!(group.to_legacy_entry("style")["tab"], "style");
    }

    #[test]
    fn test_attr_accessors() {
        let attr = json!({"group": "g1", "subgroup": null, "order": "3"});
        assert_eq!(attr_group(&attr), "g1");
        assert_eq!(attr_subgroup(&attr), "");
        assert_eq!(attr_order(&attr), 3);
        assert!(in_bucket(&attr, "g1", ""));
        assert!(!in_bucket(&json!("text"), "", ""));
    }
}
