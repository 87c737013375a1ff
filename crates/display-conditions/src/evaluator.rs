//! 比较符求值
//!
//! 纯函数：输入两个（可能缺失的）标量，输出布尔结果，无 I/O。

use crate::operators::Comparator;
use crate::value::Scalar;

/// 比较符求值器
pub struct ComparatorEvaluator;

impl ComparatorEvaluator {
    /// 对一对值求值
    ///
    /// # Arguments
    /// * `current` - 解析器给出的当前值，缺失时为 None
    /// * `acceptable` - 规则中配置的可接受值，缺失时为 None
    /// * `comparator` - 比较符
    pub fn compare(
        current: Option<&Scalar>,
        acceptable: Option<&Scalar>,
        comparator: Comparator,
    ) -> bool {
        match comparator {
            Comparator::Is => Self::equals(current, acceptable),
            Comparator::IsNot => !Self::equals(current, acceptable),
            Comparator::Contains => Self::contains(current, acceptable),
            // 缺失操作数时 contains 为 false，这里是简单取反，因此为 true
            Comparator::NotContains => !Self::contains(current, acceptable),
            Comparator::StartsWith => Self::starts_with(current, acceptable),
            Comparator::NotStartsWith => !Self::starts_with(current, acceptable),
            Comparator::EndsWith => Self::ends_with(current, acceptable),
            Comparator::NotEndsWith => !Self::ends_with(current, acceptable),
            Comparator::GreaterThan => Self::as_int(current) > Self::as_int(acceptable),
            Comparator::LessThan => Self::as_int(current) < Self::as_int(acceptable),
            Comparator::Equals => Self::as_int(current) == Self::as_int(acceptable),
        }
    }

    /// 严格类型相等：Int(5) 与 Text("5") 不相等
    pub fn equals(a: Option<&Scalar>, b: Option<&Scalar>) -> bool {
        a == b
    }

    /// 大小写不敏感的子串包含；任一操作数缺失时为 false
    pub fn contains(haystack: Option<&Scalar>, needle: Option<&Scalar>) -> bool {
        match (haystack, needle) {
            (Some(haystack), Some(needle)) => haystack
                .as_text()
                .to_lowercase()
                .contains(&needle.as_text().to_lowercase()),
            _ => false,
        }
    }

    /// 大小写不敏感的前缀比较：取 a 的前 len(b) 个字符与 b 比较
    pub fn starts_with(a: Option<&Scalar>, b: Option<&Scalar>) -> bool {
        let (a, b) = (Self::lower(a), Self::lower(b));
        let prefix: String = a.chars().take(b.chars().count()).collect();
        prefix == b
    }

    /// 大小写不敏感的后缀比较：取 a 的后 len(b) 个字符与 b 比较
    pub fn ends_with(a: Option<&Scalar>, b: Option<&Scalar>) -> bool {
        let (a, b) = (Self::lower(a), Self::lower(b));
        let a_len = a.chars().count();
        let b_len = b.chars().count();
        let suffix: String = a.chars().skip(a_len.saturating_sub(b_len)).collect();
        suffix == b
    }

    fn lower(value: Option<&Scalar>) -> String {
        value
            .map(|v| v.as_text().to_lowercase())
            .unwrap_or_default()
    }

    fn as_int(value: Option<&Scalar>) -> i64 {
        value.map(Scalar::as_int).unwrap_or(0)
    }
}
