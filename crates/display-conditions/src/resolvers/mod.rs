//! 条件目标与事实解析
//!
//! 每个事实域一组目标（字符串键 <-> 枚举）和一个解析器。解析器只负责
//! 给出当前值，比较与多值合并由 [`crate::matcher`] 完成。

mod content;
mod visitor;

pub use content::{ContentResolver, ContentTarget};
pub use visitor::{Device, VisitorResolver, VisitorTarget, classify_device};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::context::{
    ContextSnapshot, KEY_PAGED, KEY_POST_ID, KEY_TEMPLATE, KEY_URL, MAX_PAGE_NUMBER,
    MAX_TEMPLATE_LEN, MAX_URL_LEN,
};
use crate::error::ConditionError;
use crate::geo::GeoLocation;
use crate::host::{ContentStore, PageFlag, PageState, Post, VisitorState};
use crate::models::Subject;
use crate::operators::Comparator;
use crate::value::{FactValue, ValueType};

/// 等值比较族
pub const EQUALITY: &[Comparator] = &[Comparator::Is, Comparator::IsNot];

/// 字符串比较族
pub const TEXTUAL: &[Comparator] = &[
    Comparator::Contains,
    Comparator::NotContains,
    Comparator::StartsWith,
    Comparator::NotStartsWith,
    Comparator::EndsWith,
    Comparator::NotEndsWith,
    Comparator::Is,
    Comparator::IsNot,
];

/// 数值比较族
pub const ORDERING: &[Comparator] = &[
    Comparator::Equals,
    Comparator::GreaterThan,
    Comparator::LessThan,
];

/// 无法检查的原因，调用方一律按通过处理
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoCheck {
    /// 目标键未注册
    UnknownTarget(String),
    /// 序列化上下文缺少该键
    MissingFromContext(&'static str),
    /// 实时值超出快照可携带的范围
    OutOfRange(&'static str),
}

impl NoCheck {
    /// 指标标签
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownTarget(_) => "unknown_target",
            Self::MissingFromContext(_) => "missing_context_key",
            Self::OutOfRange(_) => "out_of_range",
        }
    }
}

impl fmt::Display for NoCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTarget(key) => write!(f, "unknown target {}", key),
            Self::MissingFromContext(key) => write!(f, "context has no {}", key),
            Self::OutOfRange(key) => write!(f, "{} out of range", key),
        }
    }
}

pub type Resolution = std::result::Result<FactValue, NoCheck>;

/// 条件目标：字符串键可解析、可还原，并声明取值形态
pub trait ConditionTarget: FromStr<Err = ConditionError> + fmt::Display + Sized {
    fn value_type(&self) -> ValueType;

    /// 行上未给比较符时使用的比较符
    fn default_comparator(&self) -> Comparator {
        Comparator::Is
    }

    /// 授权界面可选的比较符，引擎求值时不校验
    fn allowed_comparators(&self) -> &'static [Comparator] {
        EQUALITY
    }

    /// 目标目录（参数化目标给出默认实例）
    fn catalog() -> Vec<Self>;
}

/// 事实解析器
pub trait FactResolver {
    type Target: ConditionTarget;

    fn resolve(
        &self,
        target: &Self::Target,
        subject: &Subject,
        cache: &mut ResolveCache,
    ) -> Resolution;
}

/// 单次检查内的查询缓存
///
/// 同一次检查中多行引用同一篇文章或访客位置时只查询一次宿主。
#[derive(Debug, Default)]
pub struct ResolveCache {
    posts: HashMap<u64, Option<Post>>,
    location: Option<Option<GeoLocation>>,
    lookups: usize,
}

impl ResolveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post(&mut self, store: &dyn ContentStore, id: u64) -> Option<&Post> {
        let lookups = &mut self.lookups;
        self.posts
            .entry(id)
            .or_insert_with(|| {
                *lookups += 1;
                store.post(id)
            })
            .as_ref()
    }

    pub fn location(&mut self, visitor: &dyn VisitorState) -> Option<&GeoLocation> {
        let lookups = &mut self.lookups;
        self.location
            .get_or_insert_with(|| {
                *lookups += 1;
                visitor.location()
            })
            .as_ref()
    }

    /// 实际发往宿主的查询次数
    pub fn lookups(&self) -> usize {
        self.lookups
    }
}

/// 内容事实的来源
///
/// 实时模式直接询问宿主；快照模式只读取序列化上下文，缺键时返回 [`NoCheck`]。
#[derive(Clone, Copy)]
pub enum FactSource<'a> {
    Live(&'a dyn PageState),
    Snapshot(&'a ContextSnapshot),
}

impl<'a> FactSource<'a> {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Live(_) => "live",
            Self::Snapshot(_) => "snapshot",
        }
    }

    pub fn flag(&self, flag: PageFlag) -> Result<bool, NoCheck> {
        match self {
            Self::Live(page) => Ok(page.is(flag)),
            Self::Snapshot(snapshot) => snapshot
                .flags
                .get(&flag)
                .copied()
                .ok_or(NoCheck::MissingFromContext(flag.key())),
        }
    }

    pub fn queried_post_id(&self) -> Result<Option<u64>, NoCheck> {
        match self {
            Self::Live(page) => Ok(page.queried_post_id().filter(|id| *id != 0)),
            Self::Snapshot(snapshot) => snapshot
                .queried_post_id
                .map(|id| (id != 0).then_some(id))
                .ok_or(NoCheck::MissingFromContext(KEY_POST_ID)),
        }
    }

    /// 当前归档项 ID（仅当归档属于指定 taxonomy）
    pub fn archive_term_id(&self, taxonomy: &str) -> Result<Option<u64>, NoCheck> {
        match self {
            Self::Live(page) => Ok(page
                .archive_term()
                .filter(|term| term.taxonomy == taxonomy && term.term_id != 0)
                .map(|term| term.term_id)),
            Self::Snapshot(snapshot) => snapshot
                .archive_term_id(taxonomy)
                .ok_or(NoCheck::MissingFromContext(ContextSnapshot::archive_key(
                    taxonomy,
                ))),
        }
    }

    pub fn url(&self) -> Result<String, NoCheck> {
        match self {
            Self::Live(page) => {
                let url = page.url();
                if url.chars().count() > MAX_URL_LEN {
                    return Err(NoCheck::OutOfRange(KEY_URL));
                }
                Ok(url)
            }
            Self::Snapshot(snapshot) => snapshot
                .url
                .clone()
                .ok_or(NoCheck::MissingFromContext(KEY_URL)),
        }
    }

    pub fn page_number(&self) -> Result<u32, NoCheck> {
        match self {
            Self::Live(page) => Some(page.page_number().max(1))
                .filter(|n| *n <= MAX_PAGE_NUMBER)
                .ok_or(NoCheck::OutOfRange(KEY_PAGED)),
            Self::Snapshot(snapshot) => snapshot
                .page_number
                .ok_or(NoCheck::MissingFromContext(KEY_PAGED)),
        }
    }

    pub fn template(&self) -> Result<Option<String>, NoCheck> {
        match self {
            Self::Live(page) => match page.template() {
                Some(t) if t.chars().count() > MAX_TEMPLATE_LEN => {
                    Err(NoCheck::OutOfRange(KEY_TEMPLATE))
                }
                template => Ok(template.filter(|t| !t.is_empty())),
            },
            Self::Snapshot(snapshot) => snapshot
                .template
                .as_ref()
                .map(|t| (!t.is_empty()).then(|| t.clone()))
                .ok_or(NoCheck::MissingFromContext(KEY_TEMPLATE)),
        }
    }
}

impl fmt::Debug for FactSource<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live(_) => f.write_str("FactSource::Live"),
            Self::Snapshot(snapshot) => f.debug_tuple("FactSource::Snapshot").field(snapshot).finish(),
        }
    }
}
