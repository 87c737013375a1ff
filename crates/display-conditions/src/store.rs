//! 规则集存储
//!
//! 使用 DashMap 保存每个展示单元的内容/访客规则集，可从 JSON 文件批量加载。

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{ConditionError, Result};
use crate::models::{Subject, UnitRules};

/// 文件中的一条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUnit {
    pub subject: Subject,
    #[serde(flatten)]
    pub rules: UnitRules,
}

/// 规则集存储
#[derive(Clone, Default)]
pub struct RuleSetStore {
    units: Arc<DashMap<Subject, UnitRules>>,
}

impl RuleSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// 写入（或替换）一个展示单元的规则
    pub fn insert(&self, subject: Subject, rules: UnitRules) {
        if self.units.insert(subject, rules).is_some() {
            info!(subject = %subject, "展示条件已更新");
        }
    }

    pub fn remove(&self, subject: &Subject) -> bool {
        let removed = self.units.remove(subject).is_some();
        if !removed {
            warn!(subject = %subject, "删除不存在的展示条件");
        }
        removed
    }

    pub fn get(&self, subject: &Subject) -> Option<UnitRules> {
        self.units.get(subject).map(|entry| entry.value().clone())
    }

    /// 展示单元的规则，未配置时为空规则（即总是展示）
    pub fn rules_for(&self, subject: &Subject) -> UnitRules {
        self.get(subject).unwrap_or_default()
    }

    /// 从 JSON 数组批量加载，返回加载的单元数
    ///
    /// 单条记录无法解析（如 subject 缺失）时跳过该记录，不影响其他单元。
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<usize> {
        let records: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let mut count = 0;
        for (index, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<StoredUnit>(record) {
                Ok(unit) => {
                    self.units.insert(unit.subject, unit.rules);
                    count += 1;
                }
                Err(e) => warn!(record = index, error = %e, "展示条件记录格式错误，已跳过"),
            }
        }
        info!("批量加载展示条件完成: {} 个单元", count);
        Ok(count)
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConditionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.load_from_json(&json)
    }
}
