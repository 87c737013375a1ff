//! 多值匹配
//!
//! 当前值与可接受值都可能是多个：先各自规整为非空序列，
//! 再对完整交叉积逐对求值，最后按比较符的合并策略得出单个结果。

use serde_json::Value;

use crate::evaluator::ComparatorEvaluator;
use crate::geo;
use crate::operators::{Comparator, MatchPolicy};
use crate::value::{FactValue, Scalar, ValueType};

/// 多值匹配器
pub struct MultiValueMatcher;

impl MultiValueMatcher {
    /// 交叉积匹配
    ///
    /// 空序列视为一个缺失的操作数，因此交叉积至少有一对。
    pub fn matches(currents: &[Scalar], acceptable: &[Scalar], comparator: Comparator) -> bool {
        let currents = Self::arrayify(currents);
        let acceptable = Self::arrayify(acceptable);

        let results: Vec<bool> = currents
            .iter()
            .flat_map(|current| {
                acceptable
                    .iter()
                    .map(move |wanted| ComparatorEvaluator::compare(*current, *wanted, comparator))
            })
            .collect();

        match comparator.policy() {
            // 结果必须收敛为唯一的 true
            MatchPolicy::All => results.iter().all(|r| *r),
            MatchPolicy::Any => results.iter().any(|r| *r),
        }
    }

    /// 将解析出的事实与一行的存储值比较
    ///
    /// 标记类事实忽略存储值，可接受值恒为 true；
    /// 记录类事实交给地理模块按子字段比较。
    pub fn matches_fact(
        fact: &FactValue,
        comparator: Comparator,
        acceptable: &Value,
        value_type: ValueType,
    ) -> bool {
        match fact {
            FactValue::List(currents) => {
                let currents: Vec<Scalar> = currents
                    .iter()
                    .cloned()
                    .map(|current| current.normalize(value_type))
                    .collect();
                let acceptable = Scalar::list_from_json(acceptable, value_type);
                Self::matches(&currents, &acceptable, comparator)
            }
            FactValue::Flag(set) => {
                Self::matches(&[Scalar::Bool(*set)], &[Scalar::Bool(true)], comparator)
            }
            FactValue::Place(location) => {
                geo::match_place(location.as_ref(), comparator, acceptable)
            }
            FactValue::Position(point) => geo::match_radius(*point, comparator, acceptable),
        }
    }

    fn arrayify(values: &[Scalar]) -> Vec<Option<&Scalar>> {
        if values.is_empty() {
            vec![None]
        } else {
            values.iter().map(Some).collect()
        }
    }
}
