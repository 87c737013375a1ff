//! 序列化上下文
//!
//! 首次渲染时把页面分类等事实拍成扁平快照，随客户端发起的后续评估请求一起
//! 回传，由同一套解析器以上下文模式读取。快照只在该请求内使用，从不持久化。
//!
//! 线上格式：`{ "url": "...", "facts": { "<key>": { "value": ..., "sub_type": ... } } }`

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use validator::Validate;

use crate::host::{ArchiveTerm, PageFlag, PageState};

pub const KEY_POST_ID: &str = "post_id";
pub const KEY_CATEGORY_ARCHIVE: &str = "is_category";
pub const KEY_TAG_ARCHIVE: &str = "is_tag";
pub const KEY_TAX_ARCHIVE: &str = "is_tax";
pub const KEY_PAGED: &str = "paged";
pub const KEY_TEMPLATE: &str = "template";
pub const KEY_URL: &str = "url";

/// 事实取值上限，实时与快照两种模式共用；超限的事实在两种模式下都视为无法检查
pub const MAX_URL_LEN: usize = 65_536;
pub const MAX_TEMPLATE_LEN: usize = 1024;
pub const MAX_PAGE_NUMBER: u32 = 1_000_000;

pub const CATEGORY: &str = "category";
pub const POST_TAG: &str = "post_tag";

/// 线上传输的上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedContext {
    /// 原始页面 URL
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub facts: BTreeMap<String, ContextEntry>,
}

/// 上下文中的单个事实
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
}

impl ContextEntry {
    fn new(value: Value) -> Self {
        Self {
            value,
            sub_type: None,
        }
    }
}

impl SerializedContext {
    /// 从实时页面状态生成快照
    pub fn capture(page: &dyn PageState) -> Self {
        ContextSnapshot::capture(page).to_wire()
    }

    /// 类型与范围校验
    ///
    /// 类型不符或超出范围的条目被丢弃，效果与缺失相同（相关条件行直接放行）。
    pub fn sanitize(&self) -> ContextSnapshot {
        let mut snapshot = ContextSnapshot {
            url: self.url.clone(),
            ..Default::default()
        };

        for (key, entry) in &self.facts {
            match key.as_str() {
                KEY_POST_ID => snapshot.queried_post_id = id_or_none(&entry.value),
                KEY_CATEGORY_ARCHIVE => snapshot.category_archive = id_or_none(&entry.value),
                KEY_TAG_ARCHIVE => snapshot.tag_archive = id_or_none(&entry.value),
                KEY_TAX_ARCHIVE => {
                    snapshot.tax_archive = id_or_none(&entry.value).map(|term_id| ArchiveTerm {
                        taxonomy: if term_id == 0 {
                            String::new()
                        } else {
                            entry.sub_type.clone().unwrap_or_default()
                        },
                        term_id,
                    })
                }
                KEY_PAGED => {
                    snapshot.page_number = entry
                        .value
                        .as_u64()
                        .and_then(|n| u32::try_from(n).ok())
                }
                KEY_TEMPLATE => {
                    snapshot.template = match &entry.value {
                        Value::Null => Some(String::new()),
                        Value::String(s) => Some(s.clone()),
                        _ => None,
                    }
                }
                other => match (PageFlag::from_key(other), entry.value.as_bool()) {
                    (Some(flag), Some(set)) => {
                        snapshot.flags.insert(flag, set);
                    }
                    (Some(_), None) => debug!(key = other, "non-boolean flag in context, dropping"),
                    (None, _) => debug!(key = other, "unknown context key, ignoring"),
                },
            }
        }

        if let Err(errors) = snapshot.validate() {
            warn!(errors = %errors, "serialized context failed validation, dropping fields");
            let fields = errors.field_errors();
            if fields.contains_key("url") {
                snapshot.url = None;
            }
            if fields.contains_key("page_number") {
                snapshot.page_number = None;
            }
            if fields.contains_key("template") {
                snapshot.template = None;
            }
        }

        snapshot
    }
}

/// 数值 ID；`false` / `null` 表示“无”，编码为 0；其他类型视为缺失
fn id_or_none(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(false) | Value::Null => Some(0),
        _ => None,
    }
}

/// 校验后的类型化快照
///
/// 每个字段为 None 表示快照里没有该事实；ID 为 0、模板为空串表示“存在但为空”。
#[derive(Debug, Clone, Default, PartialEq, Validate)]
pub struct ContextSnapshot {
    #[validate(length(max = 65536))]
    pub url: Option<String>,
    pub flags: BTreeMap<PageFlag, bool>,
    pub queried_post_id: Option<u64>,
    pub category_archive: Option<u64>,
    pub tag_archive: Option<u64>,
    pub tax_archive: Option<ArchiveTerm>,
    #[validate(range(min = 1, max = 1000000))]
    pub page_number: Option<u32>,
    #[validate(length(max = 1024))]
    pub template: Option<String>,
}

impl ContextSnapshot {
    /// 读取实时页面的全部事实
    pub fn capture(page: &dyn PageState) -> Self {
        let flags = PageFlag::ALL
            .into_iter()
            .map(|flag| (flag, page.is(flag)))
            .collect();

        let archive = page.archive_term();
        let archive_id = |taxonomy: &str| {
            archive
                .as_ref()
                .filter(|term| term.taxonomy == taxonomy)
                .map(|term| term.term_id)
                .unwrap_or(0)
        };
        let tax_archive = archive
            .clone()
            .filter(|term| term.taxonomy != CATEGORY && term.taxonomy != POST_TAG)
            .unwrap_or(ArchiveTerm {
                taxonomy: String::new(),
                term_id: 0,
            });

        Self {
            url: Some(page.url()),
            flags,
            queried_post_id: Some(page.queried_post_id().unwrap_or(0)),
            category_archive: Some(archive_id(CATEGORY)),
            tag_archive: Some(archive_id(POST_TAG)),
            tax_archive: Some(tax_archive),
            page_number: Some(page.page_number().max(1)),
            template: Some(page.template().unwrap_or_default()),
        }
    }

    /// 转为线上格式
    pub fn to_wire(&self) -> SerializedContext {
        let mut facts = BTreeMap::new();

        for (flag, set) in &self.flags {
            facts.insert(flag.key().to_string(), ContextEntry::new(json!(set)));
        }
        if let Some(id) = self.queried_post_id {
            facts.insert(KEY_POST_ID.to_string(), ContextEntry::new(none_or_id(id)));
        }
        if let Some(id) = self.category_archive {
            facts.insert(KEY_CATEGORY_ARCHIVE.to_string(), ContextEntry::new(none_or_id(id)));
        }
        if let Some(id) = self.tag_archive {
            facts.insert(KEY_TAG_ARCHIVE.to_string(), ContextEntry::new(none_or_id(id)));
        }
        if let Some(term) = &self.tax_archive {
            facts.insert(
                KEY_TAX_ARCHIVE.to_string(),
                ContextEntry {
                    value: none_or_id(term.term_id),
                    sub_type: (!term.taxonomy.is_empty()).then(|| term.taxonomy.clone()),
                },
            );
        }
        if let Some(paged) = self.page_number {
            facts.insert(KEY_PAGED.to_string(), ContextEntry::new(json!(paged)));
        }
        if let Some(template) = &self.template {
            let value = if template.is_empty() {
                Value::Null
            } else {
                json!(template)
            };
            facts.insert(KEY_TEMPLATE.to_string(), ContextEntry::new(value));
        }

        SerializedContext {
            url: self.url.clone(),
            facts,
        }
    }

    /// 当前归档项（若属于指定 taxonomy），None 表示快照中没有相应条目
    pub fn archive_term_id(&self, taxonomy: &str) -> Option<Option<u64>> {
        let non_zero = |id: u64| (id != 0).then_some(id);
        match taxonomy {
            CATEGORY => self.category_archive.map(non_zero),
            POST_TAG => self.tag_archive.map(non_zero),
            other => self.tax_archive.as_ref().map(|term| {
                (term.taxonomy == other)
                    .then_some(term.term_id)
                    .and_then(non_zero)
            }),
        }
    }

    /// 快照中归档类目标对应的键
    pub fn archive_key(taxonomy: &str) -> &'static str {
        match taxonomy {
            CATEGORY => KEY_CATEGORY_ARCHIVE,
            POST_TAG => KEY_TAG_ARCHIVE,
            _ => KEY_TAX_ARCHIVE,
        }
    }
}

fn none_or_id(id: u64) -> Value {
    if id == 0 { json!(false) } else { json!(id) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockPageState;

    fn category_archive_page() -> MockPageState {
        let mut page = MockPageState::new();
        page.expect_is()
            .returning(|flag| matches!(flag, PageFlag::Archive));
        page.expect_queried_post_id().return_const(None::<u64>);
        page.expect_archive_term().returning(|| {
            Some(ArchiveTerm {
                taxonomy: "category".into(),
                term_id: 12,
            })
        });
        page.expect_url().returning(|| "/category/news/page/2".to_string());
        page.expect_page_number().return_const(2_u32);
        page.expect_template().return_const(None::<String>);
        page
    }

    #[test]
    fn test_capture_emits_every_key() {
        let wire = SerializedContext::capture(&category_archive_page());

        assert_eq!(wire.url.as_deref(), Some("/category/news/page/2"));
        assert_eq!(wire.facts["is_category"].value, json!(12));
        assert_eq!(wire.facts["is_tag"].value, json!(false));
        assert_eq!(wire.facts["is_tax"].value, json!(false));
        assert_eq!(wire.facts["post_id"].value, json!(false));
        assert_eq!(wire.facts["is_archive"].value, json!(true));
        assert_eq!(wire.facts["is_front_page"].value, json!(false));
        assert_eq!(wire.facts["paged"].value, json!(2));
        assert_eq!(wire.facts["template"].value, Value::Null);
    }

    #[test]
    fn test_sanitize_inverts_capture() {
        let snapshot = ContextSnapshot::capture(&category_archive_page());
        assert_eq!(snapshot.to_wire().sanitize(), snapshot);
        assert_eq!(snapshot.archive_term_id("category"), Some(Some(12)));
        assert_eq!(snapshot.archive_term_id("post_tag"), Some(None));
        assert_eq!(snapshot.archive_term_id("genre"), Some(None));
    }

    #[test]
    fn test_sanitize_drops_bad_entries() {
        let wire: SerializedContext = serde_json::from_value(json!({
            "url": "x".repeat(MAX_URL_LEN + 1),
            "facts": {
                "is_front_page": {"value": "yes"},
                "is_search": {"value": true},
                "paged": {"value": 0},
                "post_id": {"value": [1, 2]},
                "is_tax": {"value": "7", "sub_type": "genre"},
                "mystery": {"value": 1}
            }
        }))
        .unwrap();

        let snapshot = wire.sanitize();
        assert_eq!(snapshot.url, None);
        assert_eq!(snapshot.page_number, None);
        assert_eq!(snapshot.queried_post_id, None);
        assert_eq!(snapshot.flags.get(&PageFlag::FrontPage), None);
        assert_eq!(snapshot.flags.get(&PageFlag::Search), Some(&true));
        assert_eq!(snapshot.archive_term_id("genre"), Some(Some(7)));
        assert_eq!(snapshot.archive_term_id("category"), None);
    }

    #[test]
    fn test_validation_bounds_match_shared_limits() {
        let at_limit = ContextSnapshot {
            url: Some("u".repeat(MAX_URL_LEN)),
            page_number: Some(MAX_PAGE_NUMBER),
            template: Some("t".repeat(MAX_TEMPLATE_LEN)),
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());

        let over_limit = ContextSnapshot {
            url: Some("u".repeat(MAX_URL_LEN + 1)),
            page_number: Some(MAX_PAGE_NUMBER + 1),
            template: Some("t".repeat(MAX_TEMPLATE_LEN + 1)),
            ..Default::default()
        };
        let errors = over_limit.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("url"));
        assert!(fields.contains_key("page_number"));
        assert!(fields.contains_key("template"));
    }
}
