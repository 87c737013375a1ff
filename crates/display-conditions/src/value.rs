//! 事实值与取值形态

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

use crate::geo::{GeoLocation, GeoPoint};

/// 目标事实的取值形态
///
/// 决定授权界面使用的输入控件，以及匹配前如何把存储值规整为标量。
/// 引擎不会用它来校验比较符是否合法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// 自由文本
    Text,
    /// 数值
    Number,
    /// 有限枚举中的单选
    Select,
    /// 有限枚举中的多选
    MultiSelect,
    /// 布尔标记（出现即为真，忽略存储值）
    Flag,
    /// 实体查找，存储的是 ID
    Lookup,
    /// 由多个带类型子字段组成的小记录
    Record,
}

/// 参与比较的标量值
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Scalar {
    /// 按目标取值形态把 JSON 值规整为标量
    ///
    /// 文本形态保留原始字符串；数值形态做防御性整数转换；
    /// 其余形态中可解析为整数的字符串视为 ID。
    pub fn from_json(value: &Value, value_type: ValueType) -> Option<Self> {
        match value {
            Value::Null | Value::Array(_) | Value::Object(_) => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => match value_type {
                ValueType::Text => Some(Self::Text(n.to_string())),
                _ => Some(Self::Int(
                    n.as_i64()
                        .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                        .unwrap_or(0),
                )),
            },
            Value::String(s) => match value_type {
                ValueType::Text => Some(Self::Text(s.clone())),
                ValueType::Number => Some(Self::Int(cast_int(s))),
                _ => Some(
                    s.trim()
                        .parse::<i64>()
                        .map(Self::Int)
                        .unwrap_or_else(|_| Self::Text(s.clone())),
                ),
            },
        }
    }

    /// 把单值或数组展开为标量序列，无法规整的元素被丢弃
    pub fn list_from_json(value: &Value, value_type: ValueType) -> Vec<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| Self::from_json(item, value_type))
                .collect(),
            other => Self::from_json(other, value_type).into_iter().collect(),
        }
    }

    /// 按取值形态规整解析器给出的当前值，使其与存储值的规整方式一致
    pub fn normalize(self, value_type: ValueType) -> Self {
        match (self, value_type) {
            (Self::Text(s), ValueType::Text) => Self::Text(s),
            (Self::Text(s), ValueType::Number) => Self::Int(cast_int(&s)),
            (Self::Text(s), _) => match s.trim().parse::<i64>() {
                Ok(n) => Self::Int(n),
                Err(_) => Self::Text(s),
            },
            (other, _) => other,
        }
    }

    /// 防御性整数转换：取前导整数部分，无法解析时为 0
    pub fn as_int(&self) -> i64 {
        match self {
            Self::Bool(b) => i64::from(*b),
            Self::Int(n) => *n,
            Self::Text(s) => cast_int(s),
        }
    }

    /// 字符串形式（布尔真为 "1"，假为空串）
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Bool(true) => Cow::Borrowed("1"),
            Self::Bool(false) => Cow::Borrowed(""),
            Self::Int(n) => Cow::Owned(n.to_string()),
            Self::Text(s) => Cow::Borrowed(s),
        }
    }
}

/// 取字符串的前导整数（可带符号），例如 "12px" -> 12，"abc" -> 0
fn cast_int(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let mut end = 0;
    for (i, c) in trimmed.char_indices() {
        if c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+')) {
            end = i + c.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse().unwrap_or(0)
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u64> for Scalar {
    fn from(n: u64) -> Self {
        Self::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<u32> for Scalar {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// 解析器给出的当前事实值
#[derive(Debug, Clone, PartialEq)]
pub enum FactValue {
    /// 零个或多个标量（单值事实是单元素序列）
    List(Vec<Scalar>),
    /// 布尔标记
    Flag(bool),
    /// 访客所在地（国家/地区/城市）
    Place(Option<GeoLocation>),
    /// 访客坐标
    Position(Option<GeoPoint>),
}

impl FactValue {
    pub fn one(value: impl Into<Scalar>) -> Self {
        Self::List(vec![value.into()])
    }

    pub fn empty() -> Self {
        Self::List(Vec::new())
    }

    pub fn maybe<T: Into<Scalar>>(value: Option<T>) -> Self {
        Self::List(value.map(Into::into).into_iter().collect())
    }

    pub fn many<T: Into<Scalar>>(values: impl IntoIterator<Item = T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}
