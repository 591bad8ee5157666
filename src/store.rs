/// schema 文档存储模块
///
/// [`SchemaStore`] 独占持有加载的文档树，提供结构访问器与结构/属性变更操作。
/// 所有变更仅修改内存状态并标记 dirty，需要显式调用保存。
///
/// # 模块划分
///
/// - **document**: 源 JSON ↔ 类型化文档树的转换（含旧格式 `groups` 的处理）
/// - **structure**: 标签页、组、子分组的变更操作
/// - **attributes**: 属性变更、排序规范化以及检查器输入解析
///
/// # 使用示例
///
/// ```rust,ignore
/// use schema_ide::SchemaStore;
///
/// let mut store = SchemaStore::open("accordion.json")?;
/// store.move_attributes(&["titleColor"], "colors", Some("header"));
/// store.normalize_orders_all();
/// store.save()?;
/// ```
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::info;
use serde_json::Value;

use crate::config::EditorConfig;
use crate::io::{render_json, DefaultSchemaReader, DefaultSchemaWriter, SchemaReader, SchemaWriter};
use crate::model::{GroupRef, Layout, Subgroup, Tab, DEFAULT_ATTRIBUTE_KEY_ORDER};
use crate::ordering::{canonicalize, CanonicalOptions};
use crate::utils::{create_backup, SchemaError};
use crate::validation::{validate, Issue};

mod attributes;
mod document;
mod structure;

pub use attributes::{parse_custom_fields, parse_field_input, parse_loose_value, FieldValue, NewAttribute, SortBy, MIXED_SENTINEL};
pub use document::SchemaDocument;

/// Store 发出的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// 文档路径已变化（加载新文件）
    PathChanged(PathBuf),
    /// 文档内容或 dirty 状态已变化
    Changed,
}

type Observer = Box<dyn FnMut(&StoreEvent)>;

/// schema 文档存储
pub struct SchemaStore {
    /// 文件路径
    path: PathBuf,
    config: EditorConfig,
    pub(crate) doc: SchemaDocument,
    dirty: bool,
    /// 当前会话的属性字段序列化顺序（不写入文档本身）
    attribute_key_order: Vec<String>,
    observers: Vec<Observer>,
}

impl std::fmt::Debug for SchemaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaStore")
            .field("path", &self.path)
            .field("dirty", &self.dirty)
            .field("layout", &self.doc.layout)
            .field("tabs", &self.doc.tabs.len())
            .field("attributes", &self.doc.attributes.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::with_config(EditorConfig::default())
    }
}

impl SchemaStore {
    /// 创建空的存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用指定配置创建空的存储
    pub fn with_config(config: EditorConfig) -> Self {
        let attribute_key_order = config.attribute_key_order.clone();
        Self {
            path: PathBuf::new(),
            config,
            doc: SchemaDocument::default(),
            dirty: false,
            attribute_key_order,
            observers: Vec::new(),
        }
    }

    /// 打开并加载 schema 文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let mut store = Self::new();
        store.load(path)?;
        Ok(store)
    }

    /// 从内存中的 JSON 值构建存储（路径为空）
    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let mut store = Self::new();
        store.install(PathBuf::new(), value)?;
        Ok(store)
    }

    // --- 加载 / 保存 ---------------------------------------------------

    /// 加载 schema 文件
    ///
    /// 解析失败时返回错误，之前加载的文档保持不变。
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), SchemaError> {
        self.load_with(path.as_ref(), &DefaultSchemaReader)
    }

    /// 使用自定义 Reader 加载 schema 文件
    pub fn load_with(&mut self, path: &Path, reader: &dyn SchemaReader) -> Result<(), SchemaError> {
        let text = reader.read(path)?;
        let value: Value = serde_json::from_str(&text).map_err(|source| SchemaError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        self.install(path.to_path_buf(), value)?;
        info!(
            "已加载 schema {:?}: {} 个标签页, {} 个属性",
            path,
            self.doc.tabs.len(),
            self.doc.attributes.len()
        );
        Ok(())
    }

    fn install(&mut self, path: PathBuf, value: Value) -> Result<(), SchemaError> {
        let Value::Object(root) = value else {
            return Err(SchemaError::NotAnObject { path });
        };
        self.doc = SchemaDocument::from_map(root, &self.config.default_tab);
        self.path = path;
        self.rebuild_attribute_key_order();
        self.dirty = false;
        self.emit(StoreEvent::PathChanged(self.path.clone()));
        self.emit(StoreEvent::Changed);
        Ok(())
    }

    /// 以规范化形式保存到原路径
    pub fn save(&mut self) -> Result<(), SchemaError> {
        self.save_with(&DefaultSchemaWriter)
    }

    /// 使用自定义 Writer 保存
    ///
    /// 写入失败时 dirty 标记保持不变。
    pub fn save_with(&mut self, writer: &dyn SchemaWriter) -> Result<(), SchemaError> {
        let text = self.render()?;
        if self.config.backup_on_save && self.path.exists() {
            let backup = create_backup(&self.path)?;
            info!("已创建备份文件: {:?}", backup);
        }
        writer.write(&text, &self.path)?;
        self.dirty = false;
        info!("已保存 schema {:?}", self.path);
        self.emit(StoreEvent::Changed);
        Ok(())
    }

    /// 渲染为将要写入磁盘的文本
    pub fn render(&self) -> Result<String, SchemaError> {
        render_json(&self.canonical_document(), self.config.trailing_newline)
    }

    /// 当前文档的规范化形式
    pub fn canonical_document(&self) -> Value {
        let options = CanonicalOptions {
            attribute_key_order: &self.attribute_key_order,
            original_top_order: &self.doc.top_order,
            default_tab: &self.config.default_tab,
        };
        canonicalize(&self.to_document(), &options)
    }

    /// 当前文档的 JSON 视图（未规范化排序）
    pub fn to_document(&self) -> Value {
        self.doc.to_value()
    }

    /// 文档的深拷贝
    pub fn clone_document(&self) -> Value {
        self.to_document()
    }

    /// 校验当前文档
    pub fn validate(&self) -> Vec<Issue> {
        validate(&self.to_document())
    }

    // --- dirty 追踪与通知 ----------------------------------------------

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// 标记为已修改（仅在状态变化时通知）
    pub fn mark_dirty(&mut self) {
        if !self.dirty {
            self.dirty = true;
            self.emit(StoreEvent::Changed);
        }
    }

    /// 注册变更通知回调
    pub fn subscribe(&mut self, observer: impl FnMut(&StoreEvent) + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn emit(&mut self, event: StoreEvent) {
        for observer in self.observers.iter_mut() {
            observer(&event);
        }
    }

    // --- 访问器 ---------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn layout(&self) -> Layout {
        self.doc.layout
    }

    pub fn default_tab(&self) -> &str {
        &self.config.default_tab
    }

    /// 全部属性（键 → 原始 JSON 定义）
    pub fn attributes(&self) -> &IndexMap<String, Value> {
        &self.doc.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.doc.attributes.get(key)
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.doc.tabs
    }

    pub fn tab(&self, name: &str) -> Option<&Tab> {
        self.doc.tabs.iter().find(|t| t.name == name)
    }

    /// 全部组（按标签页顺序），附带所属标签页名称
    pub fn groups(&self) -> Vec<GroupRef<'_>> {
        self.doc
            .tabs
            .iter()
            .flat_map(|tab| {
                tab.groups.iter().map(move |group| GroupRef {
                    tab: tab.name.as_str(),
                    group,
                })
            })
            .collect()
    }

    pub fn group(&self, id: &str) -> Option<GroupRef<'_>> {
        let (t, g) = self.doc.find_group(id)?;
        let tab = &self.doc.tabs[t];
        Some(GroupRef {
            tab: tab.name.as_str(),
            group: &tab.groups[g],
        })
    }

    pub fn has_group(&self, id: &str) -> bool {
        self.doc.find_group(id).is_some()
    }

    /// 组的子分组（按 order, name 排序）；未知组返回空列表
    pub fn subgroup_entries(&self, group_id: &str) -> Vec<Subgroup> {
        self.group(group_id)
            .map(|g| g.group.sorted_subgroups())
            .unwrap_or_default()
    }

    pub fn subgroup_names(&self, group_id: &str) -> Vec<String> {
        self.subgroup_entries(group_id)
            .into_iter()
            .map(|sg| sg.name)
            .collect()
    }

    // --- 属性键顺序 -----------------------------------------------------

    pub fn attribute_key_order(&self) -> &[String] {
        &self.attribute_key_order
    }

    /// 设置属性字段顺序：去重后追加缺失的默认字段与文档中出现的字段
    pub fn set_attribute_key_order<S: AsRef<str>>(&mut self, keys: &[S]) {
        let mut ordered: Vec<String> = Vec::new();
        for key in keys.iter().map(AsRef::as_ref) {
            if !key.is_empty() && !ordered.iter().any(|k| k == key) {
                ordered.push(key.to_string());
            }
        }
        for key in DEFAULT_ATTRIBUTE_KEY_ORDER {
            if !ordered.iter().any(|k| k == key) {
                ordered.push(key.to_string());
            }
        }
        self.attribute_key_order = ordered;
        self.extend_key_order_from_document();
        self.mark_dirty();
    }

    /// 由配置的初始顺序加上文档中出现的字段重新计算
    fn rebuild_attribute_key_order(&mut self) {
        self.attribute_key_order = self.config.attribute_key_order.clone();
        self.extend_key_order_from_document();
    }

    fn extend_key_order_from_document(&mut self) {
        for attr in self.doc.attributes.values() {
            let Some(map) = attr.as_object() else {
                continue;
            };
            for key in map.keys() {
                if !self.attribute_key_order.iter().any(|k| k == key) {
                    self.attribute_key_order.push(key.clone());
                }
            }
        }
    }
}
