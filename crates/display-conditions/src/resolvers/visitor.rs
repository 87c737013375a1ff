//! 访客事实
//!
//! 访客事实总是读取当前访客状态，与页面事实的求值模式无关。

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use super::{ConditionTarget, EQUALITY, FactResolver, ORDERING, ResolveCache, Resolution, TEXTUAL};
use crate::error::ConditionError;
use crate::host::VisitorState;
use crate::models::Subject;
use crate::operators::Comparator;
use crate::value::{FactValue, ValueType};

static TABLET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ipad|tablet|kindle|silk/|playbook").expect("tablet pattern")
});

static ANDROID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)android").expect("android pattern"));

static MOBILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)mobi|iphone|ipod|blackberry|opera mini|iemobile|windows phone")
        .expect("mobile pattern")
});

/// 设备类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Mobile,
    Tablet,
    Desktop,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Desktop => "desktop",
        }
    }
}

/// 按 User-Agent 判断设备类别，不带 mobile 标记的 Android 视为平板
pub fn classify_device(user_agent: &str) -> Device {
    let android = ANDROID.is_match(user_agent);
    let mobile = MOBILE.is_match(user_agent);
    if TABLET.is_match(user_agent) || (android && !mobile) {
        Device::Tablet
    } else if mobile || android {
        Device::Mobile
    } else {
        Device::Desktop
    }
}

/// 访客条件目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitorTarget {
    LoggedIn,
    NewVisitor,
    Role,
    BrowserLanguage,
    Device,
    UserAgent,
    ReferrerUrl,
    BrowserWidth,
    PageImpressions,
    /// 当前展示单元已展示的次数
    AdImpressions,
    GeoLocation,
    GeoRadius,
}

impl VisitorTarget {
    pub const ALL: [VisitorTarget; 12] = [
        Self::LoggedIn,
        Self::NewVisitor,
        Self::Role,
        Self::BrowserLanguage,
        Self::Device,
        Self::UserAgent,
        Self::ReferrerUrl,
        Self::BrowserWidth,
        Self::PageImpressions,
        Self::AdImpressions,
        Self::GeoLocation,
        Self::GeoRadius,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::LoggedIn => "logged_in",
            Self::NewVisitor => "new_visitor",
            Self::Role => "role",
            Self::BrowserLanguage => "browser_language",
            Self::Device => "device",
            Self::UserAgent => "user_agent",
            Self::ReferrerUrl => "referrer_url",
            Self::BrowserWidth => "browser_width",
            Self::PageImpressions => "page_impressions",
            Self::AdImpressions => "ad_impressions",
            Self::GeoLocation => "geo_location",
            Self::GeoRadius => "geo_radius",
        }
    }
}

impl ConditionTarget for VisitorTarget {
    fn value_type(&self) -> ValueType {
        match self {
            Self::LoggedIn | Self::NewVisitor => ValueType::Flag,
            Self::Role | Self::Device => ValueType::MultiSelect,
            Self::BrowserLanguage => ValueType::Select,
            Self::UserAgent | Self::ReferrerUrl => ValueType::Text,
            Self::BrowserWidth | Self::PageImpressions | Self::AdImpressions => ValueType::Number,
            Self::GeoLocation | Self::GeoRadius => ValueType::Record,
        }
    }

    fn default_comparator(&self) -> Comparator {
        match self {
            Self::UserAgent | Self::ReferrerUrl => Comparator::Contains,
            Self::BrowserWidth | Self::PageImpressions => Comparator::GreaterThan,
            Self::AdImpressions | Self::GeoRadius => Comparator::LessThan,
            _ => Comparator::Is,
        }
    }

    fn allowed_comparators(&self) -> &'static [Comparator] {
        match self {
            Self::UserAgent | Self::ReferrerUrl => TEXTUAL,
            Self::BrowserWidth | Self::PageImpressions | Self::AdImpressions | Self::GeoRadius => {
                ORDERING
            }
            _ => EQUALITY,
        }
    }

    fn catalog() -> Vec<Self> {
        Self::ALL.to_vec()
    }
}

impl FromStr for VisitorTarget {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|target| target.key() == s)
            .ok_or_else(|| ConditionError::UnknownTarget(s.to_string()))
    }
}

impl fmt::Display for VisitorTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// 访客事实解析器
pub struct VisitorResolver<'a> {
    visitor: &'a dyn VisitorState,
}

impl<'a> VisitorResolver<'a> {
    pub fn new(visitor: &'a dyn VisitorState) -> Self {
        Self { visitor }
    }
}

impl FactResolver for VisitorResolver<'_> {
    type Target = VisitorTarget;

    fn resolve(
        &self,
        target: &VisitorTarget,
        subject: &Subject,
        cache: &mut ResolveCache,
    ) -> Resolution {
        let visitor = self.visitor;
        let fact = match target {
            VisitorTarget::LoggedIn => FactValue::Flag(visitor.is_logged_in()),
            VisitorTarget::NewVisitor => FactValue::Flag(visitor.is_first_visit()),
            VisitorTarget::Role => FactValue::many(visitor.roles()),
            VisitorTarget::BrowserLanguage => FactValue::maybe(
                visitor
                    .locale()
                    .as_deref()
                    .and_then(primary_language),
            ),
            VisitorTarget::Device => {
                let user_agent = visitor.user_agent().unwrap_or_default();
                FactValue::one(classify_device(&user_agent).as_str())
            }
            VisitorTarget::UserAgent => FactValue::maybe(visitor.user_agent()),
            VisitorTarget::ReferrerUrl => FactValue::maybe(visitor.referrer()),
            VisitorTarget::BrowserWidth => FactValue::maybe(visitor.browser_width()),
            VisitorTarget::PageImpressions => FactValue::one(visitor.page_impressions()),
            VisitorTarget::AdImpressions => FactValue::one(visitor.unit_impressions(subject)),
            VisitorTarget::GeoLocation => FactValue::Place(cache.location(visitor).cloned()),
            VisitorTarget::GeoRadius => {
                FactValue::Position(cache.location(visitor).and_then(|l| l.point()))
            }
        };
        Ok(fact)
    }
}

/// "de-DE" / "de_DE" -> "de"
fn primary_language(locale: &str) -> Option<String> {
    locale
        .split(['-', '_'])
        .next()
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoLocation;
    use crate::host::MockVisitorState;
    use crate::value::Scalar;

    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148";
    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)";
    const ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile Safari/537.36";
    const ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 14; SM-X710) Safari/537.36";
    const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

    #[test]
    fn test_classify_device() {
        assert_eq!(classify_device(IPHONE), Device::Mobile);
        assert_eq!(classify_device(IPAD), Device::Tablet);
        assert_eq!(classify_device(ANDROID_PHONE), Device::Mobile);
        assert_eq!(classify_device(ANDROID_TABLET), Device::Tablet);
        assert_eq!(classify_device(FIREFOX), Device::Desktop);
        assert_eq!(classify_device(""), Device::Desktop);
    }

    #[test]
    fn test_target_keys() {
        for target in VisitorTarget::ALL {
            assert_eq!(target.key().parse::<VisitorTarget>().unwrap(), target);
        }
        assert!("shoe_size".parse::<VisitorTarget>().is_err());
    }

    #[test]
    fn test_primary_language() {
        assert_eq!(primary_language("de-DE").as_deref(), Some("de"));
        assert_eq!(primary_language("pt_BR").as_deref(), Some("pt"));
        assert_eq!(primary_language("EN").as_deref(), Some("en"));
        assert_eq!(primary_language(""), None);
    }

    #[test]
    fn test_resolve_visitor_facts() {
        let mut visitor = MockVisitorState::new();
        visitor
            .expect_roles()
            .returning(|| vec!["editor".to_string(), "subscriber".to_string()]);
        visitor
            .expect_locale()
            .returning(|| Some("fr-CA".to_string()));
        visitor
            .expect_user_agent()
            .returning(|| Some(IPHONE.to_string()));
        visitor
            .expect_unit_impressions()
            .withf(|subject| *subject == Subject::ad(7))
            .return_const(4u64);

        let resolver = VisitorResolver::new(&visitor);
        let subject = Subject::ad(7);
        let mut cache = ResolveCache::new();

        let roles = resolver
            .resolve(&VisitorTarget::Role, &subject, &mut cache)
            .unwrap();
        assert_eq!(roles, FactValue::many(["editor", "subscriber"]));

        let language = resolver
            .resolve(&VisitorTarget::BrowserLanguage, &subject, &mut cache)
            .unwrap();
        assert_eq!(language, FactValue::List(vec![Scalar::from("fr")]));

        let device = resolver
            .resolve(&VisitorTarget::Device, &subject, &mut cache)
            .unwrap();
        assert_eq!(device, FactValue::one("mobile"));

        let impressions = resolver
            .resolve(&VisitorTarget::AdImpressions, &subject, &mut cache)
            .unwrap();
        assert_eq!(impressions, FactValue::one(4u64));
    }

    #[test]
    fn test_geo_targets_share_one_lookup() {
        let mut visitor = MockVisitorState::new();
        visitor.expect_location().times(1).returning(|| {
            Some(GeoLocation {
                country: Some("DE".into()),
                latitude: Some(52.52),
                longitude: Some(13.405),
                ..Default::default()
            })
        });

        let resolver = VisitorResolver::new(&visitor);
        let subject = Subject::ad(1);
        let mut cache = ResolveCache::new();

        let place = resolver
            .resolve(&VisitorTarget::GeoLocation, &subject, &mut cache)
            .unwrap();
        assert!(matches!(place, FactValue::Place(Some(_))));

        let position = resolver
            .resolve(&VisitorTarget::GeoRadius, &subject, &mut cache)
            .unwrap();
        assert!(matches!(position, FactValue::Position(Some(_))));
    }
}
