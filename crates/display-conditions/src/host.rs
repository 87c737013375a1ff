//! 宿主协作方接口
//!
//! 页面分类、文章查询与访客状态由宿主提供，引擎只通过这些 trait 读取。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::geo::GeoLocation;
use crate::models::Subject;

/// 页面分类标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageFlag {
    FrontPage,
    Singular,
    Archive,
    Search,
    NotFound,
    Attachment,
    Feed,
    Amp,
}

impl PageFlag {
    pub const ALL: [PageFlag; 8] = [
        Self::FrontPage,
        Self::Singular,
        Self::Archive,
        Self::Search,
        Self::NotFound,
        Self::Attachment,
        Self::Feed,
        Self::Amp,
    ];

    /// 目标键，同时也是序列化上下文中的键
    pub fn key(&self) -> &'static str {
        match self {
            Self::FrontPage => "is_front_page",
            Self::Singular => "is_singular",
            Self::Archive => "is_archive",
            Self::Search => "is_search",
            Self::NotFound => "is_404",
            Self::Attachment => "is_attachment",
            Self::Feed => "is_feed",
            Self::Amp => "is_amp",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.key() == key)
    }
}

/// 当前展示的归档项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveTerm {
    pub taxonomy: String,
    pub term_id: u64,
}

/// 文章详情
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub post_type: String,
    #[serde(default)]
    pub author_id: Option<u64>,
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: String,
    /// taxonomy -> term ids
    #[serde(default)]
    pub terms: BTreeMap<String, Vec<u64>>,
}

/// 当前页面的实时状态
#[cfg_attr(test, mockall::automock)]
pub trait PageState {
    fn is(&self, flag: PageFlag) -> bool;
    fn queried_post_id(&self) -> Option<u64>;
    fn archive_term(&self) -> Option<ArchiveTerm>;
    fn url(&self) -> String;
    /// 分页序号，从 1 开始
    fn page_number(&self) -> u32;
    fn template(&self) -> Option<String>;
}

/// 文章查询
#[cfg_attr(test, mockall::automock)]
pub trait ContentStore {
    fn post(&self, id: u64) -> Option<Post>;
}

/// 当前访客状态
#[cfg_attr(test, mockall::automock)]
pub trait VisitorState {
    fn is_logged_in(&self) -> bool;
    fn roles(&self) -> Vec<String>;
    fn locale(&self) -> Option<String>;
    fn user_agent(&self) -> Option<String>;
    fn referrer(&self) -> Option<String>;
    fn browser_width(&self) -> Option<u32>;
    /// 本次会话的页面浏览数
    fn page_impressions(&self) -> u64;
    /// 该访客看过指定展示单元的次数
    fn unit_impressions(&self, subject: &Subject) -> u64;
    fn is_first_visit(&self) -> bool;
    fn location(&self) -> Option<GeoLocation>;
}
