/// 标签页、组、子分组的变更操作
use serde_json::Value;

use super::SchemaStore;
use crate::model::{attr_group, attr_subgroup, Group, Layout, Tab};
use crate::utils::{remove_field, SchemaError};

impl SchemaStore {
    /// 查找或创建标签页，返回其下标（名称为空时使用默认标签页）
    fn ensure_tab_index(&mut self, name: &str) -> usize {
        let name = if name.is_empty() {
            self.config.default_tab.clone()
        } else {
            name.to_string()
        };
        if let Some(t) = self.doc.tab_index(&name) {
            return t;
        }
        let order = self.next_tab_order();
        self.doc.tabs.push(Tab::new(name, order));
        self.mark_dirty();
        self.doc.tabs.len() - 1
    }

    fn next_tab_order(&self) -> i64 {
        self.doc.tabs.iter().map(Tab::order).max().unwrap_or(0) + 1
    }

    /// 确保标签页存在，返回实际使用的名称
    pub fn ensure_tab(&mut self, name: &str) -> String {
        let t = self.ensure_tab_index(name);
        self.doc.tabs[t].name.clone()
    }

    /// 显式添加标签页
    ///
    /// 名称会去除首尾空白并转为小写；添加后文档以 `tabs` 形式持久化。
    pub fn add_tab(&mut self, name: &str) -> Result<String, SchemaError> {
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if self.doc.tab_index(&name).is_some() {
            return Err(SchemaError::DuplicateTab(name));
        }
        let order = self.next_tab_order();
        self.doc.tabs.push(Tab::new(name.clone(), order));
        self.doc.layout = Layout::Tabs;
        self.mark_dirty();
        Ok(name)
    }

    /// 查找或在默认标签页末尾创建组，返回 (标签页下标, 组下标)
    pub(crate) fn ensure_group_index(&mut self, id: &str) -> (usize, usize) {
        if let Some(found) = self.doc.find_group(id) {
            return found;
        }
        let default_tab = self.config.default_tab.clone();
        self.insert_group(Group::new(id, "", 0), &default_tab)
    }

    fn insert_group(&mut self, mut group: Group, tab: &str) -> (usize, usize) {
        let t = self.ensure_tab_index(tab);
        group.set_order(self.doc.tabs[t].next_group_order());
        self.doc.tabs[t].groups.push(group);
        if self.doc.layout == Layout::Empty {
            self.doc.layout = Layout::Tabs;
        }
        self.mark_dirty();
        (t, self.doc.tabs[t].groups.len() - 1)
    }

    /// 返回已有的组，或在默认标签页末尾创建
    pub fn ensure_group(&mut self, id: &str) -> &Group {
        let (t, g) = self.ensure_group_index(id);
        &self.doc.tabs[t].groups[g]
    }

    /// 在指定标签页中创建组（标签页不存在时一并创建）；组已存在时直接返回
    pub fn create_group(&mut self, id: &str, title: &str, tab: &str) -> Result<&Group, SchemaError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        let (t, g) = match self.doc.find_group(id) {
            Some(found) => found,
            None => self.insert_group(Group::new(id, title.trim(), 0), tab.trim()),
        };
        Ok(&self.doc.tabs[t].groups[g])
    }

    /// 确保子分组存在（追加到组的末尾）
    pub fn ensure_subgroup(&mut self, group_id: &str, name: &str) {
        if name.is_empty() {
            return;
        }
        let (t, g) = self.ensure_group_index(group_id);
        if self.doc.tabs[t].groups[g].push_subgroup(name) {
            self.mark_dirty();
        }
    }

    fn require_group(&self, id: &str) -> Result<(usize, usize), SchemaError> {
        self.doc
            .find_group(id)
            .ok_or_else(|| SchemaError::UnknownGroup(id.to_string()))
    }

    /// 把组移动到另一个标签页（末尾），未知标签页会被创建
    ///
    /// 源标签页与目标标签页的组序号都重写为连续序号。
    pub fn move_group_to_tab(&mut self, id: &str, tab: &str) -> Result<(), SchemaError> {
        let (from, g) = self.require_group(id)?;
        let to = self.ensure_tab_index(tab);
        let group = &mut self.doc.tabs[from].groups[g];
        group.tab_declared = true;
        if from == to {
            self.mark_dirty();
            return Ok(());
        }

        let mut group = self.doc.tabs[from].groups.remove(g);
        self.doc.tabs[from].renumber_groups();
        let dest = &mut self.doc.tabs[to];
        dest.renumber_groups();
        group.set_order(dest.groups.len() as i64 + 1);
        dest.groups.push(group);
        self.mark_dirty();
        Ok(())
    }

    /// 按给定顺序重排标签页内的组，未列出的组按原相对顺序追加在末尾
    pub fn reorder_groups_in_tab<S: AsRef<str>>(&mut self, tab: &str, ordered: &[S]) -> Result<(), SchemaError> {
        let t = self
            .doc
            .tab_index(tab)
            .ok_or_else(|| SchemaError::UnknownTab(tab.to_string()))?;
        let tab = &mut self.doc.tabs[t];
        let mut rest = std::mem::take(&mut tab.groups);
        rest.sort_by_key(Group::order);

        let mut groups = Vec::with_capacity(rest.len());
        for id in ordered.iter().map(AsRef::as_ref) {
            if let Some(pos) = rest.iter().position(|g| g.id == id) {
                groups.push(rest.remove(pos));
            }
        }
        groups.extend(rest);
        for (idx, group) in groups.iter_mut().enumerate() {
            group.set_order(idx as i64 + 1);
        }
        tab.groups = groups;
        self.mark_dirty();
        Ok(())
    }

    /// 按给定顺序重排组内的子分组，未列出的子分组按原相对顺序追加在末尾
    pub fn reorder_subgroups<S: AsRef<str>>(&mut self, group_id: &str, ordered: &[S]) -> Result<(), SchemaError> {
        let (t, g) = self.require_group(group_id)?;
        let group = &mut self.doc.tabs[t].groups[g];
        let mut rest = group.sorted_subgroups();

        let mut subgroups = Vec::with_capacity(rest.len());
        for name in ordered.iter().map(AsRef::as_ref) {
            if let Some(pos) = rest.iter().position(|sg| sg.name == name) {
                subgroups.push(rest.remove(pos));
            }
        }
        subgroups.extend(rest);
        for (idx, sg) in subgroups.iter_mut().enumerate() {
            sg.order = idx as i64 + 1;
        }
        group.subgroups = subgroups;
        self.mark_dirty();
        Ok(())
    }

    /// 把子分组连同其中的属性移动到另一个组
    pub fn move_subgroup_to_group(&mut self, subgroup: &str, from: &str, to: &str) -> Result<(), SchemaError> {
        if subgroup.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if from == to {
            return Ok(());
        }
        let (t, g) = self.require_group(from)?;
        let source = &mut self.doc.tabs[t].groups[g];
        if source.remove_subgroup(subgroup).is_some() {
            source.renumber_subgroups();
        }
        self.ensure_subgroup(to, subgroup);

        for attr in self.doc.attributes.values_mut() {
            if attr_group(attr) == from && attr_subgroup(attr) == subgroup {
                if let Some(map) = attr.as_object_mut() {
                    map.insert("group".into(), Value::String(to.to_string()));
                }
            }
        }
        self.mark_dirty();
        Ok(())
    }

    /// 重命名子分组，并改写组内引用旧名称的属性
    ///
    /// 新旧名称任一为空时不做任何修改；新名称已存在时两个子分组合并。
    pub fn rename_subgroup(&mut self, group_id: &str, old: &str, new: &str) -> Result<(), SchemaError> {
        if old.is_empty() || new.is_empty() || new == old {
            return Ok(());
        }
        let (t, g) = self.require_group(group_id)?;
        let group = &mut self.doc.tabs[t].groups[g];
        if group.has_subgroup(new) {
            group.remove_subgroup(old);
        } else if let Some(sg) = group.subgroup_mut(old) {
            sg.name = new.to_string();
        }

        for attr in self.doc.attributes.values_mut() {
            if attr_group(attr) == group_id && attr_subgroup(attr) == old {
                if let Some(map) = attr.as_object_mut() {
                    map.insert("subgroup".into(), Value::String(new.to_string()));
                }
            }
        }
        self.mark_dirty();
        Ok(())
    }

    /// 删除子分组
    ///
    /// 给定 `dest` 时其中的属性转移到 `dest` 子分组，否则清除属性的 `subgroup` 字段。
    pub fn remove_subgroup(&mut self, group_id: &str, name: &str, dest: Option<&str>) -> Result<(), SchemaError> {
        let (t, g) = self.require_group(group_id)?;
        self.doc.tabs[t].groups[g].remove_subgroup(name);

        let dest = dest.filter(|d| !d.is_empty() && *d != name);
        if let Some(dest) = dest {
            self.ensure_subgroup(group_id, dest);
        }
        for attr in self.doc.attributes.values_mut() {
            if attr_group(attr) != group_id || attr_subgroup(attr) != name || name.is_empty() {
                continue;
            }
            let Some(map) = attr.as_object_mut() else {
                continue;
            };
            match dest {
                Some(dest) => {
                    map.insert("subgroup".into(), Value::String(dest.to_string()));
                }
                None => {
                    remove_field(map, "subgroup");
                }
            }
        }
        self.mark_dirty();
        Ok(())
    }

    /// 删除组
    ///
    /// 组内属性不会被删除：给定 `dest` 时转移到 `dest` 组（`dest` 未声明的子分组被清除），
    /// 否则属性的 `group` 置为空字符串并清除 `subgroup`。
    pub fn remove_group(&mut self, id: &str, dest: Option<&str>) -> Result<(), SchemaError> {
        self.require_group(id)?;
        let dest = dest.filter(|d| !d.is_empty() && *d != id);
        let dest_subgroups: Vec<String> = match dest {
            Some(dest) => {
                let (t, g) = self.ensure_group_index(dest);
                self.doc.tabs[t].groups[g]
                    .subgroups
                    .iter()
                    .map(|sg| sg.name.clone())
                    .collect()
            }
            None => Vec::new(),
        };

        for attr in self.doc.attributes.values_mut() {
            if attr_group(attr) != id {
                continue;
            }
            let Some(map) = attr.as_object_mut() else {
                continue;
            };
            map.insert("group".into(), Value::String(dest.unwrap_or("").to_string()));
            let keep = matches!(map.get("subgroup"), Some(Value::String(sg)) if dest_subgroups.contains(sg));
            if !keep {
                remove_field(map, "subgroup");
            }
        }

        let (t, g) = self.require_group(id)?;
        self.doc.tabs[t].groups.remove(g);
        self.mark_dirty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SchemaStore {
        SchemaStore::from_value(json!({
            "tabs": [
                {"name": "settings", "order": 1, "groups": [
                    {"id": "g1", "title": "G1", "order": 1, "subgroups": [{"name": "s1", "order": 1}, {"name": "s2", "order": 2}]},
                    {"id": "g2", "title": "G2", "order": 2, "subgroups": [{"name": "s1", "order": 1}]}
                ]},
                {"name": "style", "order": 2, "groups": [
                    {"id": "g3", "title": "G3", "order": 1}
                ]}
            ],
            "attributes": {
                "a": {"group": "g1", "subgroup": "s1", "order": 1},
                "b": {"group": "g1", "subgroup": "s2", "order": 1},
                "c": {"group": "g2", "order": 1}
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_ensure_group_creates_in_default_tab() {
        let mut store = SchemaStore::from_value(json!({"attributes": {}})).unwrap();
        assert_eq!(store.layout(), Layout::Empty);
        let group = store.ensure_group("new");
        assert_eq!(group.order(), 1);
        assert_eq!(group.title(), Some("new"));
        assert_eq!(store.layout(), Layout::Tabs);
        assert_eq!(store.group("new").map(|g| g.tab), Some("settings"));
        assert!(store.is_dirty());

        store.ensure_group("new");
        assert_eq!(store.groups().len(), 1);
    }

    #[test]
    fn test_add_tab() {
        let mut store = store();
        assert_eq!(store.add_tab("  Advanced ").unwrap(), "advanced");
        assert_eq!(store.tab("advanced").map(Tab::order), Some(3));
        assert!(matches!(store.add_tab("STYLE"), Err(SchemaError::DuplicateTab(_))));
        assert!(matches!(store.add_tab("  "), Err(SchemaError::EmptyName)));
    }

    #[test]
    fn test_create_group_in_new_tab() {
        let mut store = store();
        store.create_group("g4", "", "layout").unwrap();
        let group = store.group("g4").unwrap();
        assert_eq!(group.tab, "layout");
        assert_eq!(group.group.title(), Some("g4"));
        assert_eq!(store.tab("layout").map(Tab::order), Some(3));
    }

    #[test]
    fn test_move_group_to_tab_renumbers() {
        let mut store = store();
        store.move_group_to_tab("g1", "style").unwrap();
        assert_eq!(store.group("g1").map(|g| g.tab), Some("style"));
        assert_eq!(store.group("g1").map(|g| g.group.order()), Some(2));
        assert_eq!(store.group("g2").map(|g| g.group.order()), Some(1));
        assert!(store.move_group_to_tab("nope", "style").is_err());
    }

    #[test]
    fn test_move_group_to_unknown_tab_creates_it() {
        let mut store = store();
        store.move_group_to_tab("g2", "advanced").unwrap();
        let tab = store.tab("advanced").unwrap();
        assert_eq!(tab.order(), 3);
        assert_eq!(tab.groups.len(), 1);
        assert_eq!(tab.groups[0].id, "g2");
        assert_eq!(tab.groups[0].order(), 1);
        assert_eq!(store.group("g1").map(|g| g.group.order()), Some(1));
        assert_eq!(store.tab("settings").unwrap().groups.len(), 1);
    }

    #[test]
    fn test_reorder_groups_appends_omitted() {
        let mut store = store();
        store.create_group("g5", "", "settings").unwrap();
        store.reorder_groups_in_tab("settings", &["g5", "g1"]).unwrap();
        let ids: Vec<_> = store.tab("settings").unwrap().groups.iter().map(|g| (g.id.clone(), g.order())).collect();
        assert_eq!(
            ids,
            vec![("g5".to_string(), 1), ("g1".to_string(), 2), ("g2".to_string(), 3)]
        );
    }

    #[test]
    fn test_reorder_subgroups_keeps_omitted() {
        let mut store = store();
        store.ensure_subgroup("g1", "s3");
        store.reorder_subgroups("g1", &["s3", "s1"]).unwrap();
        assert_eq!(store.subgroup_names("g1"), vec!["s3", "s1", "s2"]);
    }

    #[test]
    fn test_rename_subgroup_rewrites_attributes() {
        let mut store = store();
        store.rename_subgroup("g1", "s1", "main").unwrap();
        assert_eq!(store.attribute("a").unwrap()["subgroup"], "main");
        assert_eq!(store.subgroup_names("g1"), vec!["main", "s2"]);
        // 其他组中的同名子分组不受影响
        assert_eq!(store.subgroup_names("g2"), vec!["s1"]);
    }

    #[test]
    fn test_rename_subgroup_to_empty_is_noop() {
        let mut store = store();
        store.rename_subgroup("g1", "s1", "").unwrap();
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_rename_unassigned_bucket_is_noop() {
        let mut store = store();
        store.rename_subgroup("g2", "", "x").unwrap();
        assert!(store.attribute("c").unwrap().get("subgroup").is_none());
        assert_eq!(store.subgroup_names("g2"), vec!["s1"]);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_rename_subgroup_merges_existing() {
        let mut store = store();
        store.rename_subgroup("g1", "s1", "s2").unwrap();
        assert_eq!(store.subgroup_names("g1"), vec!["s2"]);
        assert_eq!(store.attribute("a").unwrap()["subgroup"], "s2");
    }

    #[test]
    fn test_move_subgroup_to_group() {
        let mut store = store();
        store.move_subgroup_to_group("s2", "g1", "g3").unwrap();
        assert_eq!(store.subgroup_names("g1"), vec!["s1"]);
        assert_eq!(store.subgroup_names("g3"), vec!["s2"]);
        assert_eq!(store.attribute("b").unwrap()["group"], "g3");
        assert_eq!(store.attribute("a").unwrap()["group"], "g1");
    }

    #[test]
    fn test_remove_subgroup_clears_or_reassigns() {
        let mut store = store();
        store.remove_subgroup("g1", "s1", None).unwrap();
        assert!(store.attribute("a").unwrap().get("subgroup").is_none());

        store.remove_subgroup("g1", "s2", Some("other")).unwrap();
        assert_eq!(store.attribute("b").unwrap()["subgroup"], "other");
        assert_eq!(store.subgroup_names("g1"), vec!["other"]);
    }

    #[test]
    fn test_remove_group_without_dest_unassigns() {
        let mut store = store();
        store.remove_group("g1", None).unwrap();
        assert!(!store.has_group("g1"));
        assert_eq!(store.attributes().len(), 3);
        for key in ["a", "b"] {
            let attr = store.attribute(key).unwrap();
            assert_eq!(attr["group"], "");
            assert!(attr.get("subgroup").is_none());
        }
    }

    #[test]
    fn test_remove_group_with_dest_keeps_declared_subgroups() {
        let mut store = store();
        store.remove_group("g1", Some("g2")).unwrap();
        let a = store.attribute("a").unwrap();
        assert_eq!(a["group"], "g2");
        assert_eq!(a["subgroup"], "s1");
        let b = store.attribute("b").unwrap();
        assert_eq!(b["group"], "g2");
        assert!(b.get("subgroup").is_none());
    }
}
