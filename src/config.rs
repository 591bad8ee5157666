use serde::{Deserialize, Serialize};

use crate::model::{DEFAULT_ATTRIBUTE_KEY_ORDER, DEFAULT_TAB};

/// 编辑器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// 未指定标签页的组所在的标签页
    pub default_tab: String,
    /// 属性字段序列化顺序的初始值
    pub attribute_key_order: Vec<String>,
    /// 保存前是否创建带时间戳的备份
    pub backup_on_save: bool,
    /// 输出文件是否以换行结尾
    pub trailing_newline: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_tab: DEFAULT_TAB.to_string(),
            attribute_key_order: DEFAULT_ATTRIBUTE_KEY_ORDER
                .iter()
                .map(|k| k.to_string())
                .collect(),
            backup_on_save: false,
            trailing_newline: true,
        }
    }
}

#[cfg(feature = "cli")]
impl EditorConfig {
    /// 从可选的 `schema-ide` 配置文件和 `SCHEMA_IDE_*` 环境变量加载配置
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // 默认值
        config = config.add_source(config::Config::try_from(&EditorConfig::default())?);

        // 配置文件（可选）
        config = config.add_source(config::File::with_name("schema-ide").required(false));

        // 环境变量覆盖
        config = config.add_source(
            config::Environment::with_prefix("SCHEMA_IDE")
                .prefix_separator("_")
                .list_separator(",")
                .with_list_parse_key("attribute_key_order")
                .try_parsing(true),
        );

        let editor_config: EditorConfig = config.build()?.try_deserialize()?;
        Ok(editor_config)
    }
}
