/// 排序/序列化引擎
///
/// 把 schema 文档规范化为固定的键顺序与嵌套顺序，用于落盘和差异对比。
///
/// # 规则
/// - 顶层字段：首选顺序 → 原文档中的其他字段（保持原相对顺序）→ 新增字段
/// - `tabs` 按 `order` 稳定排序，组、子分组同理
/// - `attributes` 按 (tab 名称, 组 order, 组 id, subgroup, 属性 order, 属性键) 全序排列
/// - 每个属性的字段按当前属性键顺序输出，未列出的字段追加在后面
///
/// [`canonicalize`] 是纯函数：相同输入产生相同输出，且对自身输出再次调用结果不变。
use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::model::{DEFAULT_ATTRIBUTE_KEY_ORDER, DEFAULT_TAB, GROUP_KEY_ORDER, TOP_LEVEL_ORDER};
use crate::utils::safe_int;

/// 规范化参数
#[derive(Debug, Clone, Copy)]
pub struct CanonicalOptions<'a> {
    /// 属性字段的输出顺序（为空时使用默认顺序）
    pub attribute_key_order: &'a [String],
    /// 加载时原文档的顶层字段顺序
    pub original_top_order: &'a [String],
    /// 未指定标签页的组归入的标签页
    pub default_tab: &'a str,
}

impl Default for CanonicalOptions<'_> {
    fn default() -> Self {
        Self {
            attribute_key_order: &[],
            original_top_order: &[],
            default_tab: DEFAULT_TAB,
        }
    }
}

/// 生成文档的规范化形式
pub fn canonicalize(document: &Value, options: &CanonicalOptions<'_>) -> Value {
    let Some(root) = document.as_object() else {
        return document.clone();
    };

    let groups = GroupIndex::build(root, options.default_tab);
    let mut ordered = Map::new();

    for &key in TOP_LEVEL_ORDER {
        if let Some(value) = root.get(key) {
            ordered.insert(key.to_string(), order_top_value(key, value, &groups, options));
        }
        // 旧格式的 `groups` 占据 `tabs` 的位置
        if key == "tabs" {
            if let Some(value) = root.get("groups") {
                ordered.insert("groups".into(), order_top_value("groups", value, &groups, options));
            }
        }
    }
    for key in options.original_top_order {
        if !ordered.contains_key(key) {
            if let Some(value) = root.get(key) {
                ordered.insert(key.clone(), order_top_value(key, value, &groups, options));
            }
        }
    }
    for (key, value) in root {
        if !ordered.contains_key(key) {
            ordered.insert(key.clone(), order_top_value(key, value, &groups, options));
        }
    }

    Value::Object(ordered)
}

fn order_top_value(
    key: &str,
    value: &Value,
    groups: &GroupIndex<'_>,
    options: &CanonicalOptions<'_>,
) -> Value {
    match key {
        "tabs" => ordered_tabs(value),
        "groups" => ordered_groups(value),
        "attributes" => ordered_attributes(value, groups, options),
        _ => value.clone(),
    }
}

/// 按给定的首选顺序重排对象字段，其余字段保持原顺序追加
pub fn reorder_fields<'k>(
    map: &Map<String, Value>,
    preferred: impl IntoIterator<Item = &'k str>,
) -> Map<String, Value> {
    let mut out = Map::new();
    for key in preferred {
        if let Some(value) = map.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }
    for (key, value) in map {
        if !out.contains_key(key) {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

fn order_key(value: &Value) -> i64 {
    safe_int(value.get("order"))
}

/// 按 order 稳定排序（相同 order 保持插入顺序）
fn sorted_by_order(items: &[Value]) -> Vec<&Value> {
    let mut sorted: Vec<&Value> = items.iter().collect();
    sorted.sort_by_key(|item| order_key(item));
    sorted
}

fn ordered_tabs(tabs: &Value) -> Value {
    let Some(tabs) = tabs.as_array() else {
        return tabs.clone();
    };
    let out = sorted_by_order(tabs)
        .into_iter()
        .map(|tab| {
            let Some(tab_map) = tab.as_object() else {
                return tab.clone();
            };
            let mut tab_out = reorder_fields(tab_map, ["name", "order"]);
            // `groups` 永远位于标签页对象末尾
            tab_out = tab_out.into_iter().filter(|(k, _)| k != "groups").collect();
            let groups = match tab_map.get("groups") {
                Some(Value::Array(groups)) => Value::Array(
                    sorted_by_order(groups)
                        .into_iter()
                        .map(|g| ordered_group_def(g, true))
                        .collect(),
                ),
                Some(other) => other.clone(),
                None => Value::Array(Vec::new()),
            };
            tab_out.insert("groups".into(), groups);
            Value::Object(tab_out)
        })
        .collect();
    Value::Array(out)
}

fn ordered_groups(groups: &Value) -> Value {
    let Some(groups) = groups.as_object() else {
        return groups.clone();
    };
    let mut items: Vec<(&String, &Value)> = groups.iter().collect();
    items.sort_by(|a, b| order_key(a.1).cmp(&order_key(b.1)).then_with(|| a.0.cmp(b.0)));
    Value::Object(
        items
            .into_iter()
            .map(|(id, def)| (id.clone(), ordered_group_def(def, false)))
            .collect(),
    )
}

fn ordered_group_def(group: &Value, with_id: bool) -> Value {
    let Some(map) = group.as_object() else {
        return group.clone();
    };
    let preferred = with_id
        .then_some("id")
        .into_iter()
        .chain(GROUP_KEY_ORDER.iter().copied());
    let mut out = reorder_fields(map, preferred);
    if let Some(Value::Array(subgroups)) = map.get("subgroups") {
        let sorted = sorted_by_order(subgroups)
            .into_iter()
            .map(|sg| match sg.as_object() {
                Some(sg_map) => Value::Object(reorder_fields(sg_map, ["name", "order"])),
                None => sg.clone(),
            })
            .collect();
        out.insert("subgroups".into(), Value::Array(sorted));
    }
    Value::Object(out)
}

fn ordered_attributes(
    attrs: &Value,
    groups: &GroupIndex<'_>,
    options: &CanonicalOptions<'_>,
) -> Value {
    let Some(attrs) = attrs.as_object() else {
        return attrs.clone();
    };

    let mut items: Vec<(AttributeSortKey<'_>, &String, &Value)> = attrs
        .iter()
        .map(|(key, attr)| (AttributeSortKey::new(key, attr, groups), key, attr))
        .collect();
    items.sort_by(|a, b| a.0.cmp(&b.0));

    let key_order: Vec<&str> = if options.attribute_key_order.is_empty() {
        DEFAULT_ATTRIBUTE_KEY_ORDER.to_vec()
    } else {
        options.attribute_key_order.iter().map(String::as_str).collect()
    };

    Value::Object(
        items
            .into_iter()
            .map(|(_, key, attr)| {
                let value = match attr.as_object() {
                    Some(map) => Value::Object(reorder_fields(map, key_order.iter().copied())),
                    None => attr.clone(),
                };
                (key.clone(), value)
            })
            .collect(),
    )
}

/// 组 ID → (标签页名称, 组 order) 查找表
struct GroupIndex<'a> {
    entries: HashMap<&'a str, (&'a str, i64)>,
    default_tab: &'a str,
}

impl<'a> GroupIndex<'a> {
    fn build(root: &'a Map<String, Value>, default_tab: &'a str) -> Self {
        let mut entries = HashMap::new();
        if let Some(Value::Object(groups)) = root.get("groups") {
            for (id, def) in groups {
                let tab = def
                    .get("tab")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(default_tab);
                entries.insert(id.as_str(), (tab, order_key(def)));
            }
        }
        // tabs 优先于旧格式
        if let Some(Value::Array(tabs)) = root.get("tabs") {
            for tab in tabs {
                let tab_name = tab
                    .get("name")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(default_tab);
                let Some(Value::Array(groups)) = tab.get("groups") else {
                    continue;
                };
                for group in groups {
                    let id = group
                        .get("id")
                        .or_else(|| group.get("name"))
                        .and_then(Value::as_str)
                        .filter(|id| !id.is_empty());
                    if let Some(id) = id {
                        entries.insert(id, (tab_name, order_key(group)));
                    }
                }
            }
        }
        Self {
            entries,
            default_tab,
        }
    }

    fn lookup(&self, id: &str) -> (&'a str, i64) {
        self.entries
            .get(id)
            .copied()
            .unwrap_or((self.default_tab, crate::utils::FALLBACK_ORDER))
    }
}

/// 属性排序键：(tab, 组 order, 组 id, subgroup, 属性 order, 属性键)
#[derive(Debug, PartialEq, Eq)]
struct AttributeSortKey<'a> {
    tab: &'a str,
    group_order: i64,
    group: &'a str,
    subgroup: &'a str,
    order: i64,
    key: &'a str,
}

impl<'a> AttributeSortKey<'a> {
    fn new(key: &'a str, attr: &'a Value, groups: &GroupIndex<'a>) -> Self {
        let group = attr.get("group").and_then(Value::as_str).unwrap_or("");
        let (tab, group_order) = groups.lookup(group);
        Self {
            tab,
            group_order,
            group,
            subgroup: attr.get("subgroup").and_then(Value::as_str).unwrap_or(""),
            order: order_key(attr),
            key,
        }
    }
}

impl Ord for AttributeSortKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.tab, self.group_order, self.group, self.subgroup, self.order, self.key).cmp(&(
            other.tab,
            other.group_order,
            other.group,
            other.subgroup,
            other.order,
            other.key,
        ))
    }
}

impl PartialOrd for AttributeSortKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
