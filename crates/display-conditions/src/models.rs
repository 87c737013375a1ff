//! 展示条件领域模型

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::ConditionError;
use crate::operators::Connector;

/// 条件行：持久化的最小单位
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionRow {
    /// 事实键，如 `category`、`url`、`logged_in`
    #[serde(default, alias = "type", deserialize_with = "string_or_none")]
    pub target: Option<String>,
    /// 比较符键，缺省时使用目标的默认比较符
    #[serde(default, alias = "operator", deserialize_with = "string_or_none")]
    pub condition: Option<String>,
    /// 本行与下一行的关系
    #[serde(default)]
    pub connector: Connector,
    #[serde(default)]
    pub values: Value,
    /// 查找类目标的授权值（ID 列表）
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "ids_or_none"
    )]
    pub selected_ids: Option<Vec<Value>>,
}

/// 非字符串视为缺失，该行随后在分组时被跳过
fn string_or_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// 单个标量视为只含一个元素的列表
fn ids_or_none<'de, D>(deserializer: D) -> Result<Option<Vec<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::Array(ids) => Some(ids),
        scalar => Some(vec![scalar]),
    })
}

impl ConditionRow {
    pub fn new(target: impl Into<String>, condition: impl Into<String>, values: Value) -> Self {
        Self {
            target: Some(target.into()),
            condition: Some(condition.into()),
            connector: Connector::And,
            values,
            selected_ids: None,
        }
    }

    pub fn or(mut self) -> Self {
        self.connector = Connector::Or;
        self
    }

    pub fn with_selected_ids(mut self, ids: Vec<Value>) -> Self {
        self.selected_ids = Some(ids);
        self
    }

    /// 从任意 JSON 值解析条件行，非对象报错
    pub fn from_value(value: Value) -> Result<Self, ConditionError> {
        if !value.is_object() {
            return Err(ConditionError::ParseError(format!("条件行不是对象: {}", value)));
        }
        serde_json::from_value(value).map_err(|e| ConditionError::ParseError(e.to_string()))
    }
}

/// 规则集：一个展示单元在一个事实域上的有序条件行
///
/// 反序列化是宽松的：无法解析的行保留为空行（分组时跳过），
/// 非数组的规则集视为没有规则。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RuleSet(pub Vec<ConditionRow>);

impl<'de> Deserialize<'de> for RuleSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let rows = match Value::deserialize(deserializer)? {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => {
                warn!(value = %other, "规则集不是数组，按无规则处理");
                Vec::new()
            }
        };

        Ok(Self(
            rows.into_iter()
                .enumerate()
                .map(|(index, raw)| {
                    ConditionRow::from_value(raw).unwrap_or_else(|e| {
                        warn!(row = index, error = %e, "条件行格式错误，已跳过");
                        ConditionRow::default()
                    })
                })
                .collect(),
        ))
    }
}

impl RuleSet {
    pub fn new(rows: Vec<ConditionRow>) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> &[ConditionRow] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<Vec<ConditionRow>> for RuleSet {
    fn from(rows: Vec<ConditionRow>) -> Self {
        Self(rows)
    }
}

/// 一个展示单元的两套独立规则集
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitRules {
    #[serde(default)]
    pub content: Option<RuleSet>,
    #[serde(default)]
    pub visitor: Option<RuleSet>,
}

/// 事实域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactDomain {
    Content,
    Visitor,
}

impl FactDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Visitor => "visitor",
        }
    }
}

impl fmt::Display for FactDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 展示单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// 单个广告
    Ad,
    /// 广告组
    Group,
    /// 自动插入位
    Placement,
}

impl FromStr for UnitKind {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ad" => Ok(Self::Ad),
            "group" => Ok(Self::Group),
            "placement" => Ok(Self::Placement),
            other => Err(ConditionError::UnknownUnitKind(other.to_string())),
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ad => write!(f, "ad"),
            Self::Group => write!(f, "group"),
            Self::Placement => write!(f, "placement"),
        }
    }
}

/// 被评估的展示单元
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub kind: UnitKind,
    pub id: u64,
}

impl Subject {
    pub fn new(kind: UnitKind, id: u64) -> Self {
        Self { kind, id }
    }

    pub fn ad(id: u64) -> Self {
        Self::new(UnitKind::Ad, id)
    }

    pub fn placement(id: u64) -> Self {
        Self::new(UnitKind::Placement, id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// 带追踪的评估结果
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub passed: bool,
    pub domain: FactDomain,
    pub subject: Subject,
    /// 实际求值过的非空分组数
    pub groups_evaluated: usize,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_us: i64,
}

impl EvaluationResult {
    pub fn new(domain: FactDomain, subject: Subject) -> Self {
        Self {
            passed: false,
            domain,
            subject,
            groups_evaluated: 0,
            evaluation_trace: Vec::new(),
            evaluation_time_us: 0,
        }
    }
}
