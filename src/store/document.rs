/// 源 JSON ↔ 类型化文档树
///
/// 加载时把 `tabs` 或旧格式 `groups` 统一转换为 `Vec<Tab>`，子分组统一为
/// `{name, order}` 形式；输出时根据 [`Layout`] 决定写回 `tabs` 还是 `groups`。
use indexmap::IndexMap;
use log::warn;
use serde_json::{Map, Value};

use crate::model::{Group, Layout, Subgroup, Tab};
use crate::utils::{coerce_int, remove_field};

/// 类型化的 schema 文档
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDocument {
    /// 除 tabs/groups/attributes 以外的顶层字段（元数据与自定义字段）
    pub meta: Map<String, Value>,
    /// 加载时的顶层字段顺序
    pub top_order: Vec<String>,
    pub layout: Layout,
    pub tabs: Vec<Tab>,
    pub attributes: IndexMap<String, Value>,
    /// 文档是否带有 `attributes` 映射
    pub attributes_declared: bool,
}

impl SchemaDocument {
    /// 从源 JSON 根对象构建
    pub fn from_map(mut root: Map<String, Value>, default_tab: &str) -> Self {
        let top_order: Vec<String> = root.keys().cloned().collect();
        let mut doc = SchemaDocument {
            top_order,
            ..SchemaDocument::default()
        };

        match remove_field(&mut root, "tabs") {
            Some(Value::Array(tabs)) => {
                doc.layout = Layout::Tabs;
                for (idx, tab) in tabs.into_iter().enumerate() {
                    doc.adopt_tab(tab, idx, default_tab);
                }
            }
            Some(_) => warn!("`tabs` 不是列表，已忽略"),
            None => {}
        }

        match remove_field(&mut root, "groups") {
            Some(Value::Object(groups)) => {
                if doc.layout != Layout::Tabs {
                    doc.layout = Layout::LegacyGroups;
                }
                for (id, def) in groups {
                    doc.adopt_legacy_group(id, def, default_tab);
                }
            }
            Some(_) => warn!("`groups` 不是对象，已忽略"),
            None => {}
        }

        match remove_field(&mut root, "attributes") {
            Some(Value::Object(attrs)) => {
                doc.attributes = attrs.into_iter().collect();
                doc.attributes_declared = true;
            }
            // 保留原值，交由校验报告
            Some(other) => {
                root.insert("attributes".into(), other);
            }
            None => {}
        }

        doc.meta = root;
        doc
    }

    fn adopt_tab(&mut self, tab: Value, index: usize, default_tab: &str) {
        let Value::Object(mut tab) = tab else {
            warn!("tabs[{}] 不是对象，已忽略", index);
            return;
        };
        let name = match remove_field(&mut tab, "name") {
            Some(Value::String(name)) if !name.is_empty() => name,
            _ => default_tab.to_string(),
        };
        let groups = remove_field(&mut tab, "groups");

        let t = match self.tabs.iter().position(|t| t.name == name) {
            Some(t) => t,
            None => {
                self.tabs.push(Tab {
                    name: name.clone(),
                    fields: tab,
                    groups: Vec::new(),
                });
                self.tabs.len() - 1
            }
        };

        let Some(Value::Array(groups)) = groups else {
            return;
        };
        for group in groups {
            let Value::Object(mut group) = group else {
                warn!("标签页 {} 中存在非对象的组定义，已忽略", name);
                continue;
            };
            let id = match group.get("id").or_else(|| group.get("name")) {
                Some(Value::String(id)) if !id.is_empty() => id.clone(),
                _ => {
                    warn!("标签页 {} 中存在缺少 id 的组，已忽略", name);
                    continue;
                }
            };
            if self.find_group(&id).is_some() {
                warn!("重复的组 ID {}，已忽略后出现的定义", id);
                continue;
            }
            remove_field(&mut group, "id");
            let subgroups = remove_field(&mut group, "subgroups");
            remove_field(&mut group, "tab");
            self.tabs[t].groups.push(Group {
                id,
                fields: group,
                subgroups: parse_subgroups(subgroups.as_ref()),
                tab_declared: true,
            });
        }
    }

    fn adopt_legacy_group(&mut self, id: String, def: Value, default_tab: &str) {
        // tabs 为权威来源，已存在的组不覆盖
        if self.find_group(&id).is_some() {
            return;
        }
        let Value::Object(mut def) = def else {
            warn!("组 {} 的定义不是对象，已忽略", id);
            return;
        };
        let declared_tab = match remove_field(&mut def, "tab") {
            Some(Value::String(tab)) if !tab.is_empty() => Some(tab),
            _ => None,
        };
        let subgroups = remove_field(&mut def, "subgroups");
        let tab_name = declared_tab.clone().unwrap_or_else(|| default_tab.to_string());

        let t = match self.tabs.iter().position(|t| t.name == tab_name) {
            Some(t) => t,
            None => {
                let order = self.tabs.len() as i64 + 1;
                self.tabs.push(Tab::new(tab_name, order));
                self.tabs.len() - 1
            }
        };
        self.tabs[t].groups.push(Group {
            id,
            fields: def,
            subgroups: parse_subgroups(subgroups.as_ref()),
            tab_declared: declared_tab.is_some(),
        });
    }

    /// 查找组所在位置 (标签页下标, 组下标)
    pub fn find_group(&self, id: &str) -> Option<(usize, usize)> {
        self.tabs.iter().enumerate().find_map(|(t, tab)| {
            tab.groups
                .iter()
                .position(|g| g.id == id)
                .map(|g| (t, g))
        })
    }

    pub fn group_mut(&mut self, id: &str) -> Option<&mut Group> {
        let (t, g) = self.find_group(id)?;
        Some(&mut self.tabs[t].groups[g])
    }

    pub fn tab_index(&self, name: &str) -> Option<usize> {
        self.tabs.iter().position(|t| t.name == name)
    }

    /// 转换回 JSON 文档
    ///
    /// 顶层字段按加载时的顺序输出，新出现的字段追加在后面。
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        for key in &self.top_order {
            self.emit_key(key, &mut out);
        }
        for key in ["tabs", "groups", "attributes"] {
            self.emit_key(key, &mut out);
        }
        for key in self.meta.keys() {
            self.emit_key(key, &mut out);
        }
        Value::Object(out)
    }

    fn emit_key(&self, key: &str, out: &mut Map<String, Value>) {
        if out.contains_key(key) {
            return;
        }
        match key {
            "tabs" if self.layout == Layout::Tabs => {
                out.insert(
                    key.into(),
                    Value::Array(self.tabs.iter().map(Tab::to_value).collect()),
                );
            }
            "groups" if self.layout == Layout::LegacyGroups => {
                let groups = self
                    .tabs
                    .iter()
                    .flat_map(|tab| {
                        tab.groups
                            .iter()
                            .map(move |g| (g.id.clone(), g.to_legacy_entry(&tab.name)))
                    })
                    .collect();
                out.insert(key.into(), Value::Object(groups));
            }
            "attributes" if self.attributes_declared => {
                let attrs = self
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                out.insert(key.into(), Value::Object(attrs));
            }
            "tabs" | "groups" => {}
            _ => {
                if let Some(value) = self.meta.get(key) {
                    out.insert(key.into(), value.clone());
                }
            }
        }
    }

    /// 可写的属性表；文档原本没有合法的 `attributes` 时创建
    pub fn attributes_mut(&mut self) -> &mut IndexMap<String, Value> {
        if !self.attributes_declared {
            remove_field(&mut self.meta, "attributes");
            self.attributes_declared = true;
        }
        &mut self.attributes
    }
}

/// 规范化子分组列表为 `{name, order}` 对象形式
///
/// 缺失或无法转换的 order 使用列表中的位置（从 1 开始）。
fn parse_subgroups(value: Option<&Value>) -> Vec<Subgroup> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let position = idx as i64 + 1;
            match item {
                Value::Object(obj) => {
                    let name = match obj.get("name") {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    };
                    let order = obj.get("order").and_then(coerce_int).unwrap_or(position);
                    Subgroup::new(name, order)
                }
                Value::String(s) => Subgroup::new(s.clone(), position),
                other => Subgroup::new(other.to_string(), position),
            }
        })
        .collect()
}
