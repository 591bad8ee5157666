/// 属性变更、桶内排序以及检查器输入解析
///
/// 属性按 (group, subgroup) 划分为“桶”，`order` 只需在桶内唯一。
use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::SchemaStore;
use crate::model::{attr_group, attr_order, attr_subgroup, in_bucket, is_standard_field, Group, Tab};
use crate::utils::{remove_field, SchemaError};

/// 多选时表示取值不一致的占位文本
pub const MIXED_SENTINEL: &str = "<mixed>";

/// 待创建属性的参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttribute {
    pub key: String,
    pub group: String,
    /// 为空时使用 key
    pub label: String,
    pub subgroup: Option<String>,
    pub attr_type: String,
    /// 为空时追加到桶的末尾
    pub order: Option<i64>,
}

impl Default for NewAttribute {
    fn default() -> Self {
        Self {
            key: String::new(),
            group: String::new(),
            label: String::new(),
            subgroup: None,
            attr_type: "string".to_string(),
            order: None,
        }
    }
}

impl NewAttribute {
    pub fn new(key: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            group: group.into(),
            ..Self::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn subgroup(mut self, subgroup: impl Into<String>) -> Self {
        let subgroup = subgroup.into();
        self.subgroup = if subgroup.is_empty() { None } else { Some(subgroup) };
        self
    }

    pub fn attr_type(mut self, attr_type: impl Into<String>) -> Self {
        self.attr_type = attr_type.into();
        self
    }

    pub fn order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}

/// 桶内排序方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Key,
    Label,
}

impl std::fmt::Display for SortBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortBy::Key => write!(f, "key"),
            SortBy::Label => write!(f, "label"),
        }
    }
}

/// 多个属性上同一字段的取值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 所有属性都没有该字段
    Absent,
    /// 所有属性取值相同
    Uniform(Value),
    /// 取值不一致
    Mixed,
}

impl FieldValue {
    /// 检查器中显示的文本
    pub fn display_text(&self) -> String {
        match self {
            FieldValue::Absent => String::new(),
            FieldValue::Uniform(Value::String(s)) => s.clone(),
            FieldValue::Uniform(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
            FieldValue::Mixed => MIXED_SENTINEL.to_string(),
        }
    }
}

/// 属性过滤器：(属性键, 属性字段) → 是否处理
pub type AttributeFilter<'a> = &'a dyn Fn(&str, &Map<String, Value>) -> bool;

impl SchemaStore {
    // --- 创建 / 删除 ----------------------------------------------------

    /// 创建属性
    ///
    /// 属性已存在时不做修改并返回现有定义。未指定 order 时取桶内最大值 + 1，
    /// 桶内存在非整数 order 时取桶内数量 + 1。
    pub fn create_attribute(&mut self, new: NewAttribute) -> Result<&Value, SchemaError> {
        if new.key.trim().is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if !self.doc.attributes.contains_key(&new.key) {
            let subgroup = new.subgroup.as_deref().unwrap_or("");
            if !new.group.is_empty() {
                self.ensure_group_index(&new.group);
                self.ensure_subgroup(&new.group, subgroup);
            }
            let order = match new.order {
                Some(order) => order,
                None => self.next_bucket_order(&new.group, subgroup),
            };

            let mut attr = Map::new();
            attr.insert("type".into(), Value::String(new.attr_type.clone()));
            attr.insert("default".into(), Value::String(String::new()));
            let label = if new.label.is_empty() { &new.key } else { &new.label };
            attr.insert("label".into(), Value::String(label.clone()));
            attr.insert("group".into(), Value::String(new.group.clone()));
            attr.insert("order".into(), Value::from(order));
            if !subgroup.is_empty() {
                attr.insert("subgroup".into(), Value::String(subgroup.to_string()));
            }
            self.doc.attributes_mut().insert(new.key.clone(), Value::Object(attr));
            self.mark_dirty();
        }
        self.doc
            .attributes
            .get(&new.key)
            .ok_or_else(|| SchemaError::InvalidFieldValue {
                field: new.key.clone(),
                reason: "attribute could not be created".into(),
            })
    }

    fn next_bucket_order(&self, group: &str, subgroup: &str) -> i64 {
        let orders: Vec<Option<&Value>> = self
            .doc
            .attributes
            .values()
            .filter(|attr| in_bucket(attr, group, subgroup))
            .map(|attr| attr.get("order"))
            .collect();
        let mut max = 0;
        for order in &orders {
            match order {
                None => {}
                Some(v) => match v.as_i64() {
                    Some(n) => max = max.max(n),
                    None => return orders.len() as i64 + 1,
                },
            }
        }
        max + 1
    }

    /// 删除单个属性，返回被删除的定义
    pub fn delete_attribute(&mut self, key: &str) -> Option<Value> {
        let removed = self.doc.attributes.shift_remove(key);
        if removed.is_some() {
            self.mark_dirty();
        }
        removed
    }

    /// 删除多个属性，返回实际删除的数量
    pub fn delete_attributes<S: AsRef<str>>(&mut self, keys: &[S]) -> usize {
        let mut count = 0;
        for key in keys {
            if self.delete_attribute(key.as_ref()).is_some() {
                count += 1;
            }
        }
        count
    }

    // --- 字段修改 -------------------------------------------------------

    /// 对每个指定属性合并 `updates` 并删除 `remove` 中的字段；不存在的键被跳过
    pub fn set_attribute_values<K, R>(&mut self, keys: &[K], updates: &Map<String, Value>, remove: &[R])
    where
        K: AsRef<str>,
        R: AsRef<str>,
    {
        let mut touched = false;
        for key in keys {
            let Some(Value::Object(attr)) = self.doc.attributes.get_mut(key.as_ref()) else {
                continue;
            };
            for (field, value) in updates {
                attr.insert(field.clone(), value.clone());
            }
            for field in remove {
                remove_field(attr, field.as_ref());
            }
            touched = true;
        }
        if touched {
            self.mark_dirty();
        }
    }

    /// 把属性移动到指定组/子分组（目标不存在时创建）
    ///
    /// 未给定子分组时删除属性的 `subgroup` 字段。
    pub fn move_attributes<S: AsRef<str>>(&mut self, keys: &[S], group: &str, subgroup: Option<&str>) {
        let subgroup = subgroup.filter(|s| !s.is_empty());
        if !group.is_empty() {
            self.ensure_group_index(group);
        }
        let mut updates = Map::new();
        updates.insert("group".into(), Value::String(group.to_string()));
        match subgroup {
            Some(subgroup) => {
                if !group.is_empty() {
                    self.ensure_subgroup(group, subgroup);
                }
                updates.insert("subgroup".into(), Value::String(subgroup.to_string()));
                self.set_attribute_values(keys, &updates, &[] as &[&str]);
            }
            None => self.set_attribute_values(keys, &updates, &["subgroup"]),
        }
    }

    /// 从所有（或经过滤的）属性中删除字段
    pub fn delete_keys_from_attributes<S: AsRef<str>>(&mut self, fields: &[S], filter: Option<AttributeFilter<'_>>) {
        for (key, attr) in self.doc.attributes.iter_mut() {
            let Value::Object(attr) = attr else {
                continue;
            };
            if filter.is_some_and(|f| !f(key, attr)) {
                continue;
            }
            for field in fields {
                remove_field(attr, field.as_ref());
            }
        }
        self.mark_dirty();
    }

    /// 为所有（或经过滤的）属性设置字段
    pub fn add_key_to_attributes(&mut self, field: &str, value: Value, filter: Option<AttributeFilter<'_>>) {
        for (key, attr) in self.doc.attributes.iter_mut() {
            let Value::Object(attr) = attr else {
                continue;
            };
            if filter.is_some_and(|f| !f(key, attr)) {
                continue;
            }
            attr.insert(field.to_string(), value.clone());
        }
        if !self.attribute_key_order.iter().any(|k| k == field) {
            self.attribute_key_order.push(field.to_string());
        }
        self.mark_dirty();
    }

    // --- 桶内排序 -------------------------------------------------------

    /// 桶内的 (key, order)，按 (order, key) 排序
    fn bucket_members(&self, group: &str, subgroup: &str) -> Vec<(String, i64)> {
        let mut members: Vec<(String, i64)> = self
            .doc
            .attributes
            .iter()
            .filter(|(_, attr)| in_bucket(attr, group, subgroup))
            .map(|(key, attr)| (key.clone(), attr_order(attr)))
            .collect();
        members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        members
    }

    /// 桶内属性键（显示顺序）
    pub fn bucket_keys(&self, group: &str, subgroup: &str) -> Vec<String> {
        self.bucket_members(group, subgroup)
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }

    /// 桶内属性键按键名或标签排序后的结果
    pub fn sorted_bucket_keys(&self, group: &str, subgroup: &str, by: SortBy) -> Vec<String> {
        let mut keys = self.bucket_keys(group, subgroup);
        match by {
            SortBy::Key => keys.sort(),
            SortBy::Label => {
                let label = |key: &str| -> String {
                    self.doc
                        .attributes
                        .get(key)
                        .and_then(|attr| attr.get("label"))
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string()
                };
                keys.sort_by(|a, b| match label(a.as_str()).cmp(&label(b.as_str())) {
                    Ordering::Equal => a.cmp(b),
                    other => other,
                });
            }
        }
        keys
    }

    /// 把某个属性在桶内上移（`direction < 0`）或下移一位后的键顺序
    ///
    /// 属性不在桶内或已在边界时返回 `None`。
    pub fn stepped_bucket_keys(&self, group: &str, subgroup: &str, key: &str, direction: i32) -> Option<Vec<String>> {
        let mut keys = self.bucket_keys(group, subgroup);
        let idx = keys.iter().position(|k| k == key)?;
        let target = (idx as i64 + i64::from(direction)).clamp(0, keys.len() as i64 - 1) as usize;
        if target == idx {
            return None;
        }
        let moved = keys.remove(idx);
        keys.insert(target, moved);
        Some(keys)
    }

    /// 按给定顺序把 `order` 重写为 1 起始的连续序号；不存在的键被跳过但占用序号
    pub fn assign_orders<S: AsRef<str>>(&mut self, ordered_keys: &[S]) {
        let mut touched = false;
        for (idx, key) in ordered_keys.iter().enumerate() {
            if let Some(Value::Object(attr)) = self.doc.attributes.get_mut(key.as_ref()) {
                attr.insert("order".into(), Value::from(idx as i64 + 1));
                touched = true;
            }
        }
        if touched {
            self.mark_dirty();
        }
    }

    /// 重新编号单个桶；返回是否有变化
    pub fn normalize_orders(&mut self, group: &str, subgroup: &str) -> bool {
        let members = self.bucket_members(group, subgroup);
        let changed = self.renumber_members(&members);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    fn renumber_members(&mut self, members: &[(String, i64)]) -> bool {
        let mut changed = false;
        for (idx, (key, _)) in members.iter().enumerate() {
            let order = Value::from(idx as i64 + 1);
            if let Some(Value::Object(attr)) = self.doc.attributes.get_mut(key) {
                if attr.get("order") != Some(&order) {
                    attr.insert("order".into(), order);
                    changed = true;
                }
            }
        }
        changed
    }

    /// 重新编号全部排序值：标签页、各标签页内的组、各组的子分组以及每个属性桶
    ///
    /// 组与子分组按原 order 稳定排序，属性以键名打破平局。重复调用结果不变。
    /// 返回是否有变化。
    pub fn normalize_orders_all(&mut self) -> bool {
        let before = self.doc.tabs.clone();
        self.doc.tabs.sort_by_key(Tab::order);
        for (idx, tab) in self.doc.tabs.iter_mut().enumerate() {
            if tab.fields.get("order") != Some(&Value::from(idx as i64 + 1)) {
                tab.set_order(idx as i64 + 1);
            }
            tab.renumber_groups();
            tab.groups.iter_mut().for_each(Group::renumber_subgroups);
        }
        let mut changed = self.doc.tabs != before;

        let mut buckets: Vec<(String, String)> = Vec::new();
        for attr in self.doc.attributes.values().filter(|attr| attr.is_object()) {
            let bucket = (attr_group(attr).to_string(), attr_subgroup(attr).to_string());
            if !buckets.contains(&bucket) {
                buckets.push(bucket);
            }
        }
        for (group, subgroup) in &buckets {
            let members = self.bucket_members(group, subgroup);
            changed |= self.renumber_members(&members);
        }

        if changed {
            self.mark_dirty();
        }
        changed
    }

    // --- 多选字段读取 ---------------------------------------------------

    /// 字段在多个属性上的共同取值（不存在的属性被忽略）
    pub fn common_value<S: AsRef<str>>(&self, keys: &[S], field: &str) -> FieldValue {
        let mut values = keys
            .iter()
            .filter_map(|key| self.doc.attributes.get(key.as_ref()))
            .map(|attr| attr.get(field));
        let Some(first) = values.next() else {
            return FieldValue::Absent;
        };
        if values.any(|v| v != first) {
            return FieldValue::Mixed;
        }
        match first {
            Some(value) => FieldValue::Uniform(value.clone()),
            None => FieldValue::Absent,
        }
    }

    /// 计算把属性的自定义字段整体替换为 `custom` 所需的 (updates, removals)
    pub fn custom_field_edit(&self, key: &str, custom: &Map<String, Value>) -> (Map<String, Value>, Vec<String>) {
        let removals = self
            .doc
            .attributes
            .get(key)
            .and_then(Value::as_object)
            .map(|attr| {
                attr.keys()
                    .filter(|field| !is_standard_field(field) && !custom.contains_key(*field))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        (custom.clone(), removals)
    }

    /// 单个属性的自定义字段（非标准字段）
    pub fn custom_fields(&self, key: &str) -> Map<String, Value> {
        self.doc
            .attributes
            .get(key)
            .and_then(Value::as_object)
            .map(|attr| {
                attr.iter()
                    .filter(|(field, _)| !is_standard_field(field))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// 解析检查器中输入的 JSON 字段值
///
/// # 参数
/// - `field`: 字段名（用于错误信息）
/// - `text`: 输入文本
///
/// # 返回
/// 空文本返回 `None`（表示删除字段）；占位文本 `<mixed>` 与非法 JSON 返回错误。
pub fn parse_field_input(field: &str, text: &str) -> Result<Option<Value>, SchemaError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed == MIXED_SENTINEL {
        return Err(SchemaError::MixedValue {
            field: field.to_string(),
        });
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| SchemaError::InvalidFieldValue {
            field: field.to_string(),
            reason: e.to_string(),
        })
}

/// 解析自定义字段 JSON（必须是对象，空文本视为空对象）
pub fn parse_custom_fields(text: &str) -> Result<Map<String, Value>, SchemaError> {
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    match parse_field_input("custom", text)? {
        Some(Value::Object(map)) => Ok(map),
        _ => Err(SchemaError::InvalidFieldValue {
            field: "custom".into(),
            reason: "custom fields JSON must be an object".into(),
        }),
    }
}

/// 宽松解析：合法 JSON 按 JSON 解析，否则作为普通字符串；空文本为空字符串
pub fn parse_loose_value(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SchemaStore {
        SchemaStore::from_value(json!({
            "tabs": [{"name": "settings", "order": 1, "groups": [
                {"id": "g1", "title": "G1", "order": 1, "subgroups": [{"name": "s1", "order": 1}]}
            ]}],
            "attributes": {
                "zeta": {"group": "g1", "order": 2, "label": "Alpha"},
                "alpha": {"group": "g1", "order": 2, "label": "Zulu"},
                "mid": {"group": "g1", "order": 7, "label": "Mike"},
                "s_one": {"group": "g1", "subgroup": "s1", "order": 1},
                "s_two": {"group": "g1", "subgroup": "s1", "order": 2, "myField": true}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_create_attribute_appends_to_bucket() {
        let mut store = store();
        let attr = store
            .create_attribute(NewAttribute::new("newKey", "g1").subgroup("s1"))
            .unwrap();
        assert_eq!(attr["order"], 3);
        assert_eq!(attr["label"], "newKey");
        assert_eq!(attr["type"], "string");
        assert_eq!(attr["subgroup"], "s1");
    }

    #[test]
    fn test_create_attribute_existing_is_untouched() {
        let mut store = store();
        let attr = store
            .create_attribute(NewAttribute::new("mid", "other").label("New"))
            .unwrap();
        assert_eq!(attr["label"], "Mike");
        assert!(!store.has_group("other"));
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_create_attribute_non_integer_orders_counts() {
        let mut store = SchemaStore::from_value(json!({
            "attributes": {"a": {"group": "g", "order": "x"}, "b": {"group": "g", "order": 5}}
        }))
        .unwrap();
        let attr = store.create_attribute(NewAttribute::new("c", "g")).unwrap();
        assert_eq!(attr["order"], 3);
        assert!(store.has_group("g"));
    }

    #[test]
    fn test_create_attribute_replaces_malformed_attributes() {
        let mut store = SchemaStore::from_value(json!({"attributes": "broken"})).unwrap();
        store.create_attribute(NewAttribute::new("a", "g")).unwrap();
        assert_eq!(store.to_document()["attributes"]["a"]["order"], 1);
    }

    #[test]
    fn test_set_attribute_values_skips_missing() {
        let mut store = store();
        let mut updates = Map::new();
        updates.insert("label".into(), json!("Changed"));
        store.set_attribute_values(&["mid", "ghost"], &updates, &["order"]);
        let mid = store.attribute("mid").unwrap();
        assert_eq!(mid["label"], "Changed");
        assert!(mid.get("order").is_none());
        assert!(store.attribute("ghost").is_none());
    }

    #[test]
    fn test_move_attributes_clears_subgroup() {
        let mut store = store();
        store.move_attributes(&["s_one"], "g2", None);
        let attr = store.attribute("s_one").unwrap();
        assert_eq!(attr["group"], "g2");
        assert!(attr.get("subgroup").is_none());
        assert!(store.has_group("g2"));

        store.move_attributes(&["mid"], "g2", Some("extra"));
        assert_eq!(store.attribute("mid").unwrap()["subgroup"], "extra");
        assert_eq!(store.subgroup_names("g2"), vec!["extra"]);
    }

    #[test]
    fn test_bucket_keys_ties_broken_by_key() {
        let store = store();
        assert_eq!(store.bucket_keys("g1", ""), vec!["alpha", "zeta", "mid"]);
        assert_eq!(store.sorted_bucket_keys("g1", "", SortBy::Key), vec!["alpha", "mid", "zeta"]);
        assert_eq!(store.sorted_bucket_keys("g1", "", SortBy::Label), vec!["zeta", "mid", "alpha"]);
    }

    #[test]
    fn test_stepped_bucket_keys() {
        let store = store();
        assert_eq!(
            store.stepped_bucket_keys("g1", "", "mid", -1),
            Some(vec!["alpha".to_string(), "mid".to_string(), "zeta".to_string()])
        );
        assert_eq!(store.stepped_bucket_keys("g1", "", "alpha", -1), None);
        assert_eq!(store.stepped_bucket_keys("g1", "", "ghost", 1), None);
    }

    #[test]
    fn test_normalize_orders_all_is_idempotent() {
        let mut store = store();
        assert!(store.normalize_orders_all());
        let first = store.to_document();
        assert_eq!(store.attribute("alpha").unwrap()["order"], 1);
        assert_eq!(store.attribute("zeta").unwrap()["order"], 2);
        assert_eq!(store.attribute("mid").unwrap()["order"], 3);

        assert!(!store.normalize_orders_all());
        assert_eq!(store.to_document(), first);
    }

    #[test]
    fn test_normalize_single_bucket() {
        let mut store = store();
        assert!(store.normalize_orders("g1", ""));
        assert!(!store.normalize_orders("g1", "s1"));
    }

    #[test]
    fn test_delete_and_add_keys_with_filter() {
        let mut store = store();
        let only_subgrouped = |_: &str, attr: &Map<String, Value>| attr.contains_key("subgroup");
        store.add_key_to_attributes("themeable", json!(true), Some(&only_subgrouped));
        assert_eq!(store.attribute("s_one").unwrap()["themeable"], true);
        assert!(store.attribute("mid").unwrap().get("themeable").is_none());

        store.delete_keys_from_attributes(&["label"], None);
        assert!(store.attributes().values().all(|a| a.get("label").is_none()));
    }

    #[test]
    fn test_delete_attributes() {
        let mut store = store();
        assert_eq!(store.delete_attributes(&["mid", "ghost", "zeta"]), 2);
        assert_eq!(store.attributes().len(), 3);
        assert!(store.delete_attribute("mid").is_none());
    }

    #[test]
    fn test_common_value() {
        let store = store();
        assert_eq!(store.common_value(&["zeta", "alpha"], "order"), FieldValue::Uniform(json!(2)));
        assert_eq!(store.common_value(&["zeta", "mid"], "order"), FieldValue::Mixed);
        assert_eq!(store.common_value(&["zeta", "s_two"], "myField"), FieldValue::Mixed);
        assert_eq!(store.common_value(&["zeta", "alpha"], "units"), FieldValue::Absent);
        assert_eq!(FieldValue::Mixed.display_text(), "<mixed>");
    }

    #[test]
    fn test_parse_field_input() {
        assert_eq!(parse_field_input("min", "  ").unwrap(), None);
        assert_eq!(parse_field_input("min", "3").unwrap(), Some(json!(3)));
        assert!(matches!(parse_field_input("min", "<mixed>"), Err(SchemaError::MixedValue { .. })));
        assert!(matches!(
            parse_field_input("options", "[1,"),
            Err(SchemaError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn test_custom_fields() {
        let store = store();
        assert_eq!(store.custom_fields("s_two").len(), 1);

        let custom = parse_custom_fields(r#"{"other": 1}"#).unwrap();
        let (updates, removals) = store.custom_field_edit("s_two", &custom);
        assert_eq!(updates["other"], 1);
        assert_eq!(removals, vec!["myField".to_string()]);
        assert!(parse_custom_fields("[1]").is_err());
        assert!(parse_custom_fields("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_loose_value() {
        assert_eq!(parse_loose_value("12"), json!(12));
        assert_eq!(parse_loose_value("plain text"), json!("plain text"));
        assert_eq!(parse_loose_value(""), json!(""));
    }
}
