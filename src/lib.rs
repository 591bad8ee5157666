pub mod config;
pub mod editor;
pub mod io;
pub mod model;
pub mod ordering;
pub mod store;
pub mod utils;
pub mod validation;

// 重新导出主要结构
pub use config::EditorConfig;
pub use editor::{AppliedCommand, Command, EditHistory, SchemaSession};
pub use model::{Group, GroupRef, Layout, Subgroup, Tab};
pub use ordering::{canonicalize, CanonicalOptions};
pub use store::{FieldValue, NewAttribute, SchemaStore, SortBy, StoreEvent};
pub use utils::SchemaError;
pub use validation::{validate, Issue, IssueLevel};

// 常量定义
pub const SUPPORTED_EXTENSIONS: &[&str] = &["json"];
