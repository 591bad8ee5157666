/// 校验引擎
///
/// 对 schema 文档执行一组相互独立的规则检查，返回问题列表（错误/警告）。
/// 校验结果始终以数据形式返回，不作为错误抛出，也不会修改输入文档。
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::{ALLOWED_TYPES, DEFAULT_TAB};
use crate::utils::{coerce_float, coerce_int};

/// 必需的顶层字段
pub const REQUIRED_TOP_LEVEL_KEYS: &[&str] = &[
    "$schema",
    "title",
    "version",
    "description",
    "blockType",
    "blockName",
    "manualSyncRequired",
    "attributes",
];

/// 需要 `options` 列表的控件
pub const SELECT_CONTROL: &str = "SelectControl";

/// 问题级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Error,
    Warning,
}

impl std::fmt::Display for IssueLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueLevel::Error => write!(f, "error"),
            IssueLevel::Warning => write!(f, "warning"),
        }
    }
}

/// 单条校验问题
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub level: IssueLevel,
    /// 点分路径定位符，如 `attributes.foo.group`
    pub path: String,
    pub message: String,
}

impl Issue {
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warning,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == IssueLevel::Error
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.level, self.path, self.message)
    }
}

/// 是否存在错误级别的问题（存在时保存会被阻止）
pub fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(Issue::is_error)
}

/// 筛选指定级别的问题
pub fn issues_at(issues: &[Issue], level: IssueLevel) -> Vec<&Issue> {
    issues.iter().filter(|i| i.level == level).collect()
}

/// 校验 schema 文档
pub fn validate(document: &Value) -> Vec<Issue> {
    let mut issues = Vec::new();

    let Some(root) = document.as_object() else {
        issues.push(Issue::error("$", "Schema root must be an object"));
        return issues;
    };

    require_keys(root, &mut issues);

    let Some(attributes) = root.get("attributes").and_then(Value::as_object) else {
        issues.push(Issue::error(
            "attributes",
            "`attributes` must be an object (dict)",
        ));
        return issues;
    };

    let groups = extract_groups(root);
    validate_groups(&groups, &mut issues);
    validate_attributes(attributes, &groups, &mut issues);
    validate_orders(attributes, &mut issues);
    issues
}

/// 提取组定义：优先使用顶层 `groups` 映射，否则从 `tabs` 构建
fn extract_groups(root: &Map<String, Value>) -> Map<String, Value> {
    if let Some(Value::Object(groups)) = root.get("groups") {
        return groups.clone();
    }

    let mut groups = Map::new();
    let Some(Value::Array(tabs)) = root.get("tabs") else {
        return groups;
    };
    for tab in tabs.iter().filter_map(Value::as_object) {
        let tab_name = tab.get("name").and_then(Value::as_str).unwrap_or(DEFAULT_TAB);
        let Some(Value::Array(tab_groups)) = tab.get("groups") else {
            continue;
        };
        for group in tab_groups.iter().filter_map(Value::as_object) {
            let id = group
                .get("id")
                .or_else(|| group.get("name"))
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty());
            let Some(id) = id else {
                continue;
            };
            let mut copy: Map<String, Value> = group
                .iter()
                .filter(|(k, _)| k.as_str() != "id")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            copy.insert("tab".into(), Value::String(tab_name.to_string()));
            groups.insert(id.to_string(), Value::Object(copy));
        }
    }
    groups
}

fn require_keys(root: &Map<String, Value>, issues: &mut Vec<Issue>) {
    for &key in REQUIRED_TOP_LEVEL_KEYS {
        if !root.contains_key(key) {
            issues.push(Issue::error(key, format!("Missing top-level key `{}`", key)));
        }
    }

    if !root.contains_key("groups") && !root.contains_key("tabs") {
        issues.push(Issue::error(
            "groups/tabs",
            "Missing either `groups` or `tabs` top-level key",
        ));
    }
}

fn validate_groups(groups: &Map<String, Value>, issues: &mut Vec<Issue>) {
    for (gid, group) in groups {
        let Some(group) = group.as_object() else {
            issues.push(Issue::error(
                format!("groups.{}", gid),
                "Group definition must be an object",
            ));
            continue;
        };
        if !group.contains_key("title") {
            issues.push(Issue::warning(
                format!("groups.{}.title", gid),
                "Group missing `title`",
            ));
        }
        if !group.contains_key("order") {
            issues.push(Issue::warning(
                format!("groups.{}.order", gid),
                "Group missing `order`",
            ));
        }
        if !group.contains_key("tab") {
            issues.push(Issue::warning(
                format!("groups.{}.tab", gid),
                "Group missing `tab` (will default to settings; set explicitly to organize tabs)",
            ));
        }
        match group.get("subgroups") {
            None | Some(Value::Null) | Some(Value::Array(_)) => {}
            Some(_) => issues.push(Issue::warning(
                format!("groups.{}.subgroups", gid),
                "`subgroups` should be a list of subgroup names",
            )),
        }
    }
}

fn validate_attributes(
    attributes: &Map<String, Value>,
    groups: &Map<String, Value>,
    issues: &mut Vec<Issue>,
) {
    for (key, attr) in attributes {
        let Some(attr) = attr.as_object() else {
            issues.push(Issue::error(
                format!("attributes.{}", key),
                "Attribute definition must be an object",
            ));
            continue;
        };

        let group = attr.get("group").and_then(Value::as_str).filter(|g| !g.is_empty());
        let resolved = group.and_then(|g| groups.get(g).map(|def| (g, def)));
        if resolved.is_none() {
            issues.push(Issue::error(
                format!("attributes.{}.group", key),
                format!("`group` is missing or unknown ({})", display_value(attr.get("group"))),
            ));
        }

        if let Some((gid, def)) = resolved {
            check_subgroup(key, attr, gid, def, issues);
        }
        check_type(key, attr, issues);
        check_order(key, attr, issues);
        check_options(key, attr, issues);
        check_number_bounds(key, attr, issues);
        check_units(key, attr, issues);
        check_outputs_css(key, attr, issues);
        check_show_when(key, attr, attributes, issues);
    }
}

fn check_subgroup(
    key: &str,
    attr: &Map<String, Value>,
    gid: &str,
    group: &Value,
    issues: &mut Vec<Issue>,
) {
    let subgroup = match attr.get("subgroup") {
        None | Some(Value::Null) => return,
        Some(Value::String(s)) if s.is_empty() => return,
        Some(value) => value,
    };
    let Some(Value::Array(declared)) = group.get("subgroups") else {
        return;
    };
    let names: Vec<String> = declared
        .iter()
        .map(|sg| match sg {
            Value::Object(obj) => obj.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    let declared = subgroup
        .as_str()
        .map(|s| names.iter().any(|n| n == s))
        .unwrap_or(false);
    if !declared {
        issues.push(Issue::warning(
            format!("attributes.{}.subgroup", key),
            format!(
                "Subgroup '{}' not declared in groups.{}.subgroups",
                display_value(Some(subgroup)),
                gid
            ),
        ));
    }
}

fn check_type(key: &str, attr: &Map<String, Value>, issues: &mut Vec<Issue>) {
    let Some(attr_type) = attr.get("type").filter(|t| is_truthy(t)) else {
        return;
    };
    let allowed = attr_type
        .as_str()
        .map(|t| ALLOWED_TYPES.contains(&t))
        .unwrap_or(false);
    if !allowed {
        issues.push(Issue::warning(
            format!("attributes.{}.type", key),
            format!(
                "Unexpected type `{}` (expected one of {})",
                display_value(Some(attr_type)),
                sorted_allowed_types()
            ),
        ));
    }
}

fn sorted_allowed_types() -> String {
    let mut types = ALLOWED_TYPES.to_vec();
    types.sort_unstable();
    types.join(", ")
}

fn check_order(key: &str, attr: &Map<String, Value>, issues: &mut Vec<Issue>) {
    if let Some(order) = attr.get("order") {
        if coerce_int(order).is_none() {
            issues.push(Issue::error(
                format!("attributes.{}.order", key),
                "`order` must be an integer",
            ));
        }
    }
}

fn check_options(key: &str, attr: &Map<String, Value>, issues: &mut Vec<Issue>) {
    if attr.get("control").and_then(Value::as_str) != Some(SELECT_CONTROL) {
        return;
    }
    let has_options = matches!(attr.get("options"), Some(Value::Array(opts)) if !opts.is_empty());
    if !has_options {
        issues.push(Issue::error(
            format!("attributes.{}.options", key),
            "`SelectControl` requires non-empty `options` list",
        ));
    }
}

fn check_number_bounds(key: &str, attr: &Map<String, Value>, issues: &mut Vec<Issue>) {
    if attr.get("type").and_then(Value::as_str) != Some("number") {
        return;
    }
    let (Some(min), Some(max)) = (
        attr.get("min").filter(|v| !v.is_null()),
        attr.get("max").filter(|v| !v.is_null()),
    ) else {
        return;
    };
    match (coerce_float(min), coerce_float(max)) {
        (Some(min), Some(max)) => {
            if min > max {
                issues.push(Issue::error(
                    format!("attributes.{}.minmax", key),
                    "`min` cannot be greater than `max`",
                ));
            }
        }
        _ => issues.push(Issue::warning(
            format!("attributes.{}.minmax", key),
            "Unable to compare `min` and `max` (non-numeric values)",
        )),
    }
}

fn check_units(key: &str, attr: &Map<String, Value>, issues: &mut Vec<Issue>) {
    let units = match attr.get("units") {
        None | Some(Value::Null) => return,
        Some(units) => units,
    };
    match units.as_array() {
        Some(list) if list.iter().all(Value::is_string) => {
            if list.is_empty() {
                issues.push(Issue::warning(
                    format!("attributes.{}.units", key),
                    "`units` list is empty",
                ));
            }
        }
        _ => issues.push(Issue::warning(
            format!("attributes.{}.units", key),
            "`units` should be a non-empty list of strings",
        )),
    }
}

fn check_outputs_css(key: &str, attr: &Map<String, Value>, issues: &mut Vec<Issue>) {
    if attr.get("outputsCSS") != Some(&Value::Bool(true)) {
        return;
    }
    let has_var = attr.get("cssVar").map(is_truthy).unwrap_or(false);
    let has_property = attr.get("cssProperty").map(is_truthy).unwrap_or(false);
    if !has_var && !has_property {
        issues.push(Issue::warning(
            format!("attributes.{}.outputsCSS", key),
            "`outputsCSS` is true but cssVar/cssProperty are missing",
        ));
    }
}

fn check_show_when(
    key: &str,
    attr: &Map<String, Value>,
    attributes: &Map<String, Value>,
    issues: &mut Vec<Issue>,
) {
    let Some(Value::Object(show_when)) = attr.get("showWhen") else {
        return;
    };
    for dep in show_when.keys() {
        if !attributes.contains_key(dep) {
            issues.push(Issue::warning(
                format!("attributes.{}.showWhen", key),
                format!("Condition references missing attribute `{}`", dep),
            ));
        }
    }
}

/// 同一 (group, subgroup) 桶内的重复 order：每组重复值报告一条警告
fn validate_orders(attributes: &Map<String, Value>, issues: &mut Vec<Issue>) {
    let mut buckets: IndexMap<(String, String), IndexMap<String, Vec<&str>>> = IndexMap::new();
    for (key, attr) in attributes {
        let Some(attr) = attr.as_object() else {
            continue;
        };
        let order = match attr.get("order") {
            None | Some(Value::Null) => continue,
            Some(order) => display_value(Some(order)),
        };
        let group = match attr.get("group") {
            None | Some(Value::Null) => String::new(),
            value => display_value(value),
        };
        let subgroup = match attr.get("subgroup") {
            None | Some(Value::Null) => String::new(),
            value => display_value(value),
        };
        buckets
            .entry((group, subgroup))
            .or_default()
            .entry(order)
            .or_default()
            .push(key.as_str());
    }

    for ((group, subgroup), orders) in buckets {
        for (order, keys) in orders {
            if keys.len() > 1 {
                issues.push(Issue::warning(
                    format!("group={}/subgroup={}", group, subgroup),
                    format!("Duplicate order `{}` for attributes: {}", order, keys.join(", ")),
                ));
            }
        }
    }
}

/// 问题信息中使用的值显示形式：字符串原样输出，缺失显示为 None
fn display_value(value: Option<&Value>) -> String {
    match value {
        None => "None".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// JSON 值的真值判断（null、false、0、空字符串/列表/对象为假）
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
