//! 宿主协作方的内存实现
//!
//! HTTP 服务用它们承载请求体与目录文件，测试与基准也直接使用。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

use crate::error::{ConditionError, Result};
use crate::geo::GeoLocation;
use crate::host::{ArchiveTerm, ContentStore, PageFlag, PageState, Post, VisitorState};
use crate::models::Subject;

/// 静态页面状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticPage {
    #[serde(default)]
    pub flags: BTreeSet<PageFlag>,
    #[serde(default)]
    pub queried_post_id: Option<u64>,
    #[serde(default)]
    pub archive: Option<ArchiveTerm>,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_page_number")]
    pub page_number: u32,
    #[serde(default)]
    pub template: Option<String>,
}

fn default_page_number() -> u32 {
    1
}

impl StaticPage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            page_number: 1,
            ..Default::default()
        }
    }

    pub fn with_flag(mut self, flag: PageFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn with_post(mut self, post_id: u64) -> Self {
        self.queried_post_id = Some(post_id);
        self
    }

    pub fn with_archive(mut self, taxonomy: impl Into<String>, term_id: u64) -> Self {
        self.archive = Some(ArchiveTerm {
            taxonomy: taxonomy.into(),
            term_id,
        });
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_page_number(mut self, page_number: u32) -> Self {
        self.page_number = page_number;
        self
    }
}

impl PageState for StaticPage {
    fn is(&self, flag: PageFlag) -> bool {
        self.flags.contains(&flag)
    }

    fn queried_post_id(&self) -> Option<u64> {
        self.queried_post_id
    }

    fn archive_term(&self) -> Option<ArchiveTerm> {
        self.archive.clone()
    }

    fn url(&self) -> String {
        self.url.clone()
    }

    fn page_number(&self) -> u32 {
        self.page_number
    }

    fn template(&self) -> Option<String> {
        self.template.clone()
    }
}

/// 文章目录
#[derive(Debug, Clone, Default)]
pub struct PostCatalog {
    posts: HashMap<u64, Post>,
}

impl PostCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, post: Post) {
        self.posts.insert(post.id, post);
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// 从 JSON 数组加载
    pub fn from_json(json: &str) -> Result<Self> {
        let posts: Vec<Post> = serde_json::from_str(json)?;
        Ok(posts.into_iter().collect())
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConditionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let catalog = Self::from_json(&json)?;
        info!(path = %path.display(), posts = catalog.len(), "文章目录已加载");
        Ok(catalog)
    }
}

impl FromIterator<Post> for PostCatalog {
    fn from_iter<I: IntoIterator<Item = Post>>(iter: I) -> Self {
        Self {
            posts: iter.into_iter().map(|post| (post.id, post)).collect(),
        }
    }
}

impl ContentStore for PostCatalog {
    fn post(&self, id: u64) -> Option<Post> {
        self.posts.get(&id).cloned()
    }
}

/// 访客画像
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisitorProfile {
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub browser_width: Option<u32>,
    #[serde(default)]
    pub page_impressions: u64,
    /// 键为展示单元，例如 "ad:7"
    #[serde(default)]
    pub unit_impressions: BTreeMap<String, u64>,
    #[serde(default)]
    pub first_visit: bool,
    #[serde(default)]
    pub location: Option<GeoLocation>,
}

impl VisitorState for VisitorProfile {
    fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    fn roles(&self) -> Vec<String> {
        self.roles.clone()
    }

    fn locale(&self) -> Option<String> {
        self.locale.clone()
    }

    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn referrer(&self) -> Option<String> {
        self.referrer.clone()
    }

    fn browser_width(&self) -> Option<u32> {
        self.browser_width
    }

    fn page_impressions(&self) -> u64 {
        self.page_impressions
    }

    fn unit_impressions(&self, subject: &Subject) -> u64 {
        self.unit_impressions
            .get(&subject.to_string())
            .copied()
            .unwrap_or(0)
    }

    fn is_first_visit(&self) -> bool {
        self.first_visit
    }

    fn location(&self) -> Option<GeoLocation> {
        self.location.clone()
    }
}
