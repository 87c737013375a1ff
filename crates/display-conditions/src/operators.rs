//! 比较符与连接词定义

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConditionError;

/// 条件比较符
///
/// 持久化时使用 `as_str` 的键，解析时同时接受历史别名。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Comparator {
    // 等值比较
    #[serde(rename = "is")]
    Is,
    #[serde(rename = "is_not")]
    IsNot,

    // 字符串操作（大小写不敏感）
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "does_not_contain")]
    NotContains,
    #[serde(rename = "starts_with")]
    StartsWith,
    #[serde(rename = "does_not_start_with")]
    NotStartsWith,
    #[serde(rename = "ends_with")]
    EndsWith,
    #[serde(rename = "does_not_end_with")]
    NotEndsWith,

    // 数值比较（严格，不含等号）
    #[serde(rename = "greater_than")]
    GreaterThan,
    #[serde(rename = "less_than")]
    LessThan,
    #[serde(rename = "equals")]
    Equals,
}

/// 交叉积结果的合并策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// 至少一对成立
    Any,
    /// 每一对都必须成立
    All,
}

impl Comparator {
    pub const ALL: [Comparator; 11] = [
        Self::Is,
        Self::IsNot,
        Self::Contains,
        Self::NotContains,
        Self::StartsWith,
        Self::NotStartsWith,
        Self::EndsWith,
        Self::NotEndsWith,
        Self::GreaterThan,
        Self::LessThan,
        Self::Equals,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Is => "is",
            Self::IsNot => "is_not",
            Self::Contains => "contains",
            Self::NotContains => "does_not_contain",
            Self::StartsWith => "starts_with",
            Self::NotStartsWith => "does_not_start_with",
            Self::EndsWith => "ends_with",
            Self::NotEndsWith => "does_not_end_with",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Equals => "equals",
        }
    }

    /// 合并策略只由比较符身份决定，与取值个数无关。
    /// 只有 `is_not` 使用 All，其余否定比较符仍然是 Any。
    pub fn policy(&self) -> MatchPolicy {
        match self {
            Self::IsNot => MatchPolicy::All,
            _ => MatchPolicy::Any,
        }
    }

    /// 是否为数值比较符
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::GreaterThan | Self::LessThan | Self::Equals)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let comparator = match s.trim() {
            "is" => Self::Is,
            "is_not" => Self::IsNot,
            "contains" | "contain" => Self::Contains,
            "does_not_contain" | "contain_not" => Self::NotContains,
            "starts_with" | "start" => Self::StartsWith,
            "does_not_start_with" | "start_not" => Self::NotStartsWith,
            "ends_with" | "end" => Self::EndsWith,
            "does_not_end_with" | "end_not" => Self::NotEndsWith,
            "greater_than" | "older_than" | "gt" => Self::GreaterThan,
            "less_than" | "newer_than" | "lt" => Self::LessThan,
            "equals" | "equal" => Self::Equals,
            other => return Err(ConditionError::UnknownComparator(other.to_string())),
        };
        Ok(comparator)
    }
}

/// 连接词：描述本行与**下一行**的关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    /// 宽松解析：只有 "or"（不区分大小写）是 Or，其余一律视为 And
    pub fn parse_lenient(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("or") {
            Self::Or
        } else {
            Self::And
        }
    }
}

impl<'de> Deserialize<'de> for Connector {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(raw.as_str().map(Self::parse_lenient).unwrap_or_default())
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "and"),
            Self::Or => write!(f, "or"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("older_than".parse::<Comparator>().unwrap(), Comparator::GreaterThan);
        assert_eq!("newer_than".parse::<Comparator>().unwrap(), Comparator::LessThan);
        assert_eq!("contain_not".parse::<Comparator>().unwrap(), Comparator::NotContains);
        assert_eq!("equal".parse::<Comparator>().unwrap(), Comparator::Equals);
        assert!("regex".parse::<Comparator>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for comparator in Comparator::ALL {
            assert_eq!(comparator.to_string().parse::<Comparator>().unwrap(), comparator);
        }
    }

    #[test]
    fn test_only_is_not_uses_all_policy() {
        for comparator in Comparator::ALL {
            let expected = if comparator == Comparator::IsNot {
                MatchPolicy::All
            } else {
                MatchPolicy::Any
            };
            assert_eq!(comparator.policy(), expected, "{}", comparator);
        }
    }

    #[test]
    fn test_serialize_uses_stored_key() {
        assert_eq!(
            serde_json::to_string(&Comparator::NotStartsWith).unwrap(),
            "\"does_not_start_with\""
        );
    }

    #[test]
    fn test_connector_is_lenient() {
        let or: Connector = serde_json::from_str("\"OR\"").unwrap();
        let and: Connector = serde_json::from_str("\"and\"").unwrap();
        let garbage: Connector = serde_json::from_str("\"xor\"").unwrap();
        let null: Connector = serde_json::from_str("null").unwrap();
        let number: Connector = serde_json::from_str("1").unwrap();
        let object: Connector = serde_json::from_str(r#"{"or": true}"#).unwrap();
        assert_eq!(number, Connector::And);
        assert_eq!(object, Connector::And);
        assert_eq!(or, Connector::Or);
        assert_eq!(and, Connector::And);
        assert_eq!(garbage, Connector::And);
        assert_eq!(null, Connector::And);
    }
}
