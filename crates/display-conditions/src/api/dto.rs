//! 请求与响应 DTO

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::context::SerializedContext;
use crate::executor::DisplayDecision;
use crate::memory::VisitorProfile;
use crate::models::{FactDomain, Subject, UnitKind, UnitRules};
use crate::operators::Comparator;
use crate::value::ValueType;

use super::error::{ApiError, Result};

/// 单个事实域允许的最大条件行数
pub const MAX_ROWS_PER_DOMAIN: usize = 200;

/// 展示单元标识
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRef {
    #[validate(length(min = 1, max = 32, message = "单元类型不能为空"))]
    pub kind: String,
    #[validate(range(min = 1, message = "单元 ID 必须大于 0"))]
    pub id: u64,
}

impl SubjectRef {
    pub fn to_subject(&self) -> Result<Subject> {
        let kind: UnitKind = self.kind.parse()?;
        Ok(Subject::new(kind, self.id))
    }
}

/// 异步评估请求
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    #[validate(nested)]
    pub subject: SubjectRef,
    #[serde(default)]
    pub context: SerializedContext,
    #[serde(default)]
    pub visitor: VisitorProfile,
    /// 内联规则；缺省时使用存储中的规则
    #[serde(default)]
    #[validate(custom(function = "validate_rules"))]
    pub rules: Option<UnitRules>,
    /// 是否返回逐行追踪
    #[serde(default)]
    pub trace: bool,
}

fn validate_rules(rules: &UnitRules) -> std::result::Result<(), ValidationError> {
    let too_long = [&rules.content, &rules.visitor]
        .into_iter()
        .flatten()
        .any(|set| set.len() > MAX_ROWS_PER_DOMAIN);
    if too_long {
        return Err(ValidationError::new("too_many_rows"));
    }
    Ok(())
}

impl EvaluateRequest {
    pub fn checked_subject(&self) -> Result<Subject> {
        self.validate().map_err(ApiError::from)?;
        self.subject.to_subject()
    }
}

/// 评估结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResponse {
    pub subject: Subject,
    #[serde(flatten)]
    pub decision: DisplayDecision,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

/// 目标目录条目
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    pub domain: FactDomain,
    pub key: String,
    pub value_type: ValueType,
    pub default_comparator: Comparator,
    pub allowed_comparators: Vec<Comparator>,
}

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }
}
