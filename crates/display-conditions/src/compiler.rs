//! 规则集分组
//!
//! 把持久化的扁平条件行列表转换为 OR-of-AND 分组。连接词描述的是本行与
//! **下一行** 的关系：`and` 让下一行留在当前分组，`or` 在本行之后关闭当前分组。

use serde_json::Value;
use std::borrow::Cow;
use tracing::debug;

use crate::models::{ConditionRow, RuleSet};
use crate::operators::{Comparator, Connector};
use crate::value::ValueType;

/// 通过校验的条件行
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRow {
    /// 在原始规则集中的位置
    pub index: usize,
    pub target: String,
    /// None 表示使用目标的默认比较符
    pub comparator: Option<Comparator>,
    pub values: Value,
    pub selected_ids: Option<Vec<Value>>,
}

impl CompiledRow {
    /// 用于比较的可接受值：查找类目标优先使用 selected_ids
    pub fn acceptable(&self, value_type: ValueType) -> Cow<'_, Value> {
        match (&self.selected_ids, value_type) {
            (Some(ids), ValueType::Lookup) if !ids.is_empty() => {
                Cow::Owned(Value::Array(ids.clone()))
            }
            _ => Cow::Borrowed(&self.values),
        }
    }
}

/// 分组结果
///
/// 保留空分组（畸形行被跳过但其 `or` 连接词仍然生效时产生），求值时跳过它们。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleGroups {
    pub groups: Vec<Vec<CompiledRow>>,
    /// 被跳过的畸形行数
    pub skipped: usize,
}

impl RuleGroups {
    /// 分组总数（含空分组）
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// 是否没有任何非空分组
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(Vec::is_empty)
    }

    /// 非空分组
    pub fn non_empty(&self) -> impl Iterator<Item = &[CompiledRow]> {
        self.groups
            .iter()
            .filter(|group| !group.is_empty())
            .map(Vec::as_slice)
    }
}

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 按连接词分组
    ///
    /// 缺少目标或比较符无法识别的行被跳过，但它的连接词照常参与分组。
    /// 最后一行的连接词不会被读取。
    pub fn group(rule_set: &RuleSet) -> RuleGroups {
        let rows = rule_set.rows();
        let mut result = RuleGroups {
            groups: vec![Vec::new()],
            skipped: 0,
        };

        for (index, row) in rows.iter().enumerate() {
            match Self::compile_row(index, row) {
                Some(compiled) => {
                    if let Some(group) = result.groups.last_mut() {
                        group.push(compiled);
                    }
                }
                None => result.skipped += 1,
            }

            let is_last = index + 1 == rows.len();
            if row.connector == Connector::Or && !is_last {
                result.groups.push(Vec::new());
            }
        }

        result
    }

    fn compile_row(index: usize, row: &ConditionRow) -> Option<CompiledRow> {
        let target = match row.target.as_deref().map(str::trim) {
            Some(target) if !target.is_empty() => target.to_string(),
            _ => {
                debug!(row = index, "condition row without target, skipping");
                return None;
            }
        };

        let comparator = match row.condition.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<Comparator>() {
                Ok(comparator) => Some(comparator),
                Err(e) => {
                    debug!(row = index, target = %target, error = %e, "skipping condition row");
                    return None;
                }
            },
        };

        Some(CompiledRow {
            index,
            target,
            comparator,
            values: row.values.clone(),
            selected_ids: row.selected_ids.clone(),
        })
    }
}
