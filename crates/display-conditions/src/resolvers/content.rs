//! 内容事实：当前页面及其查询对象

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use super::{
    ConditionTarget, EQUALITY, FactResolver, FactSource, ORDERING, ResolveCache, Resolution,
    TEXTUAL,
};
use crate::context::{CATEGORY, POST_TAG};
use crate::error::ConditionError;
use crate::host::{ContentStore, PageFlag, Post};
use crate::models::Subject;
use crate::operators::Comparator;
use crate::value::{FactValue, ValueType};

/// 内容条件目标
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentTarget {
    PostType,
    Author,
    /// 指定文章/页面
    PostIds,
    ParentPage,
    /// 文章所属的分类项（按 taxonomy）
    Taxonomy(String),
    /// 当前归档页对应的分类项（按 taxonomy）
    Archive(String),
    PageTemplate,
    /// 分页序号
    Pagination,
    /// 发布至今的天数
    ContentAge,
    PostContent,
    Url,
    Flag(PageFlag),
}

impl ContentTarget {
    fn post_fact(&self, post: Option<&Post>, now: DateTime<Utc>) -> FactValue {
        let Some(post) = post else {
            return FactValue::empty();
        };
        match self {
            Self::PostType => FactValue::one(post.post_type.as_str()),
            Self::Author => FactValue::maybe(post.author_id),
            Self::ParentPage => FactValue::maybe(post.parent_id.filter(|id| *id != 0)),
            Self::Taxonomy(taxonomy) => {
                FactValue::many(post.terms.get(taxonomy).into_iter().flatten().copied())
            }
            Self::ContentAge => {
                FactValue::maybe(post.published_at.map(|at| (now - at).num_days()))
            }
            Self::PostContent => FactValue::one(post.content.as_str()),
            _ => FactValue::empty(),
        }
    }
}

impl ConditionTarget for ContentTarget {
    fn value_type(&self) -> ValueType {
        match self {
            Self::PostType | Self::Author | Self::Taxonomy(_) | Self::PageTemplate => {
                ValueType::MultiSelect
            }
            Self::PostIds | Self::ParentPage | Self::Archive(_) => ValueType::Lookup,
            Self::Pagination | Self::ContentAge => ValueType::Number,
            Self::PostContent | Self::Url => ValueType::Text,
            Self::Flag(_) => ValueType::Flag,
        }
    }

    fn default_comparator(&self) -> Comparator {
        match self {
            Self::Pagination => Comparator::Equals,
            Self::ContentAge => Comparator::GreaterThan,
            Self::PostContent | Self::Url => Comparator::Contains,
            _ => Comparator::Is,
        }
    }

    fn allowed_comparators(&self) -> &'static [Comparator] {
        match self {
            Self::Pagination | Self::ContentAge => ORDERING,
            Self::PostContent | Self::Url => TEXTUAL,
            _ => EQUALITY,
        }
    }

    fn catalog() -> Vec<Self> {
        let mut targets = vec![
            Self::PostType,
            Self::Author,
            Self::PostIds,
            Self::ParentPage,
            Self::Taxonomy(CATEGORY.to_string()),
            Self::Taxonomy(POST_TAG.to_string()),
            Self::Archive(CATEGORY.to_string()),
            Self::Archive(POST_TAG.to_string()),
            Self::PageTemplate,
            Self::Pagination,
            Self::ContentAge,
            Self::PostContent,
            Self::Url,
        ];
        targets.extend(PageFlag::ALL.into_iter().map(Self::Flag));
        targets
    }
}

impl FromStr for ContentTarget {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let target = match s {
            "post_type" => Self::PostType,
            "author" => Self::Author,
            "post_ids" => Self::PostIds,
            "parent_page" => Self::ParentPage,
            "category" => Self::Taxonomy(CATEGORY.to_string()),
            "tag" => Self::Taxonomy(POST_TAG.to_string()),
            "category_archive" => Self::Archive(CATEGORY.to_string()),
            "tag_archive" => Self::Archive(POST_TAG.to_string()),
            "page_template" => Self::PageTemplate,
            "pagination" => Self::Pagination,
            "content_age" => Self::ContentAge,
            "post_content" => Self::PostContent,
            "url" => Self::Url,
            other => {
                if let Some(taxonomy) = other.strip_prefix("taxonomy_").filter(|t| !t.is_empty()) {
                    Self::Taxonomy(taxonomy.to_string())
                } else if let Some(taxonomy) =
                    other.strip_prefix("archive_").filter(|t| !t.is_empty())
                {
                    Self::Archive(taxonomy.to_string())
                } else if let Some(flag) = PageFlag::from_key(other) {
                    Self::Flag(flag)
                } else {
                    return Err(ConditionError::UnknownTarget(other.to_string()));
                }
            }
        };
        Ok(target)
    }
}

impl fmt::Display for ContentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostType => f.write_str("post_type"),
            Self::Author => f.write_str("author"),
            Self::PostIds => f.write_str("post_ids"),
            Self::ParentPage => f.write_str("parent_page"),
            Self::Taxonomy(t) if t == CATEGORY => f.write_str("category"),
            Self::Taxonomy(t) if t == POST_TAG => f.write_str("tag"),
            Self::Taxonomy(t) => write!(f, "taxonomy_{}", t),
            Self::Archive(t) if t == CATEGORY => f.write_str("category_archive"),
            Self::Archive(t) if t == POST_TAG => f.write_str("tag_archive"),
            Self::Archive(t) => write!(f, "archive_{}", t),
            Self::PageTemplate => f.write_str("page_template"),
            Self::Pagination => f.write_str("pagination"),
            Self::ContentAge => f.write_str("content_age"),
            Self::PostContent => f.write_str("post_content"),
            Self::Url => f.write_str("url"),
            Self::Flag(flag) => f.write_str(flag.key()),
        }
    }
}

/// 内容事实解析器
///
/// 页面级事实来自 [`FactSource`]，文章级事实先取查询对象 ID，再经缓存向宿主查询文章。
pub struct ContentResolver<'a> {
    source: FactSource<'a>,
    store: &'a dyn ContentStore,
    now: DateTime<Utc>,
}

impl<'a> ContentResolver<'a> {
    pub fn new(source: FactSource<'a>, store: &'a dyn ContentStore, now: DateTime<Utc>) -> Self {
        Self { source, store, now }
    }
}

impl FactResolver for ContentResolver<'_> {
    type Target = ContentTarget;

    fn resolve(
        &self,
        target: &ContentTarget,
        _subject: &Subject,
        cache: &mut ResolveCache,
    ) -> Resolution {
        let fact = match target {
            ContentTarget::Flag(flag) => FactValue::Flag(self.source.flag(*flag)?),
            ContentTarget::Url => FactValue::one(self.source.url()?),
            ContentTarget::Pagination => FactValue::one(self.source.page_number()?),
            ContentTarget::PageTemplate => FactValue::maybe(self.source.template()?),
            ContentTarget::Archive(taxonomy) => {
                FactValue::maybe(self.source.archive_term_id(taxonomy)?)
            }
            ContentTarget::PostIds => FactValue::maybe(self.source.queried_post_id()?),
            ContentTarget::PostType
            | ContentTarget::Author
            | ContentTarget::ParentPage
            | ContentTarget::Taxonomy(_)
            | ContentTarget::ContentAge
            | ContentTarget::PostContent => {
                let post = match self.source.queried_post_id()? {
                    Some(id) => cache.post(self.store, id),
                    None => None,
                };
                target.post_fact(post, self.now)
            }
        };
        Ok(fact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextSnapshot;
    use crate::host::{ArchiveTerm, MockContentStore, MockPageState};
    use crate::resolvers::NoCheck;
    use crate::value::Scalar;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn article() -> Post {
        Post {
            id: 42,
            post_type: "post".into(),
            author_id: Some(3),
            parent_id: None,
            published_at: Some(now() - Duration::days(10)),
            content: "A story about ducks".into(),
            terms: BTreeMap::from([
                ("category".to_string(), vec![3, 7]),
                ("genre".to_string(), vec![11]),
            ]),
        }
    }

    fn store() -> MockContentStore {
        let mut store = MockContentStore::new();
        store
            .expect_post()
            .returning(|id| (id == 42).then(article));
        store
    }

    #[test]
    fn test_target_keys_round_trip() {
        for key in [
            "post_type",
            "category",
            "tag",
            "taxonomy_genre",
            "category_archive",
            "tag_archive",
            "archive_genre",
            "content_age",
            "is_404",
            "is_front_page",
        ] {
            let target: ContentTarget = key.parse().unwrap();
            assert_eq!(target.to_string(), key);
        }
        assert_eq!(
            "tag".parse::<ContentTarget>().unwrap(),
            ContentTarget::Taxonomy("post_tag".into())
        );
    }

    #[test]
    fn test_unknown_target() {
        assert!("weather".parse::<ContentTarget>().is_err());
        assert!("taxonomy_".parse::<ContentTarget>().is_err());
    }

    #[test]
    fn test_catalog_entries_parse_back() {
        for target in ContentTarget::catalog() {
            let parsed: ContentTarget = target.to_string().parse().unwrap();
            assert_eq!(parsed, target);
        }
    }

    #[test]
    fn test_resolve_post_facts_live() {
        let mut page = MockPageState::new();
        page.expect_queried_post_id().return_const(Some(42u64));
        let store = store();
        let resolver = ContentResolver::new(FactSource::Live(&page), &store, now());
        let mut cache = ResolveCache::new();
        let subject = Subject::ad(1);

        let categories = resolver
            .resolve(&"category".parse().unwrap(), &subject, &mut cache)
            .unwrap();
        assert_eq!(categories, FactValue::many([3i64, 7]));

        let age = resolver
            .resolve(&ContentTarget::ContentAge, &subject, &mut cache)
            .unwrap();
        assert_eq!(age, FactValue::one(10i64));

        let post_type = resolver
            .resolve(&ContentTarget::PostType, &subject, &mut cache)
            .unwrap();
        assert_eq!(post_type, FactValue::List(vec![Scalar::from("post")]));

        assert_eq!(cache.lookups(), 1);
    }

    #[test]
    fn test_resolve_without_queried_object() {
        let mut page = MockPageState::new();
        page.expect_queried_post_id().return_const(None::<u64>);
        let store = MockContentStore::new();
        let resolver = ContentResolver::new(FactSource::Live(&page), &store, now());

        let fact = resolver
            .resolve(&ContentTarget::Author, &Subject::ad(1), &mut ResolveCache::new())
            .unwrap();
        assert_eq!(fact, FactValue::empty());
    }

    #[test]
    fn test_resolve_archive_from_snapshot() {
        let snapshot = ContextSnapshot {
            category_archive: Some(0),
            tax_archive: Some(ArchiveTerm {
                taxonomy: "genre".into(),
                term_id: 11,
            }),
            ..Default::default()
        };
        let store = MockContentStore::new();
        let resolver = ContentResolver::new(FactSource::Snapshot(&snapshot), &store, now());
        let mut cache = ResolveCache::new();
        let subject = Subject::ad(1);

        let genre = resolver
            .resolve(&ContentTarget::Archive("genre".into()), &subject, &mut cache)
            .unwrap();
        assert_eq!(genre, FactValue::one(11u64));

        let category = resolver
            .resolve(&ContentTarget::Archive("category".into()), &subject, &mut cache)
            .unwrap();
        assert_eq!(category, FactValue::empty());

        let missing = resolver.resolve(&ContentTarget::Archive("post_tag".into()), &subject, &mut cache);
        assert_eq!(missing, Err(NoCheck::MissingFromContext("is_tag")));
    }

    #[test]
    fn test_snapshot_without_post_id_cannot_check_post_facts() {
        let snapshot = ContextSnapshot::default();
        let store = MockContentStore::new();
        let resolver = ContentResolver::new(FactSource::Snapshot(&snapshot), &store, now());

        let result = resolver.resolve(
            &ContentTarget::Taxonomy("category".into()),
            &Subject::ad(1),
            &mut ResolveCache::new(),
        );
        assert_eq!(result, Err(NoCheck::MissingFromContext("post_id")));
    }
}
